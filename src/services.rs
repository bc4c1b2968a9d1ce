//! Banner-based service detection
//!
//! Open TCP ports get one connection and a short read for an unsolicited
//! banner; request/response protocols that stay quiet (HTTP family) get
//! a single minimal probe and one more read. Classification runs the
//! banner through an ordered signature table, first match wins, with
//! more specific patterns placed before generic fallbacks.

use crate::config::ScanOptions;
use crate::scanner::{PortProbeResult, Protocol};
use futures::future::join_all;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

/// Longest banner kept; anything past this is noise for our patterns.
const MAX_BANNER_LEN: usize = 2048;

/// Ports that speak request/response protocols worth one unsolicited probe
const HTTP_PROBE_PORTS: [u16; 5] = [80, 443, 8000, 8080, 8888];

/// One entry of the ordered signature table. `ports` restricts a generic
/// pattern (like a bare `220` greeting) to the ports where it is
/// meaningful.
struct ServiceSignature {
    service: &'static str,
    pattern: Regex,
    ports: Option<&'static [u16]>,
}

impl ServiceSignature {
    fn new(service: &'static str, pattern: &str, ports: Option<&'static [u16]>) -> Self {
        Self {
            service,
            // Table patterns are static; a bad one is a programming error
            // caught by the table test below.
            pattern: Regex::new(pattern).expect("invalid service signature"),
            ports,
        }
    }
}

/// Ordered rule table: specific before generic. First match wins.
static SIGNATURES: Lazy<Vec<ServiceSignature>> = Lazy::new(|| {
    vec![
        ServiceSignature::new("ssh", r"^SSH-", None),
        ServiceSignature::new("vnc", r"^RFB ", None),
        ServiceSignature::new("redis", r"\+PONG|-ERR unknown command|redis_version", None),
        ServiceSignature::new(
            "mysql",
            r"mysql_native_password|caching_sha2_password|MariaDB",
            None,
        ),
        ServiceSignature::new("pop3", r"^\+OK", None),
        ServiceSignature::new("imap", r"^\* OK", None),
        ServiceSignature::new("smtp", r"(?i)^220[ -].*(smtp|esmtp|postfix|exim|sendmail)", None),
        ServiceSignature::new(
            "ftp",
            r"(?i)^220[ -].*(ftp|filezilla|vsftpd|proftpd|pure-ftpd)",
            None,
        ),
        ServiceSignature::new("http", r"(?i)HTTP/\d|^Server:|<!DOCTYPE|<html", None),
        ServiceSignature::new("telnet", r"(?i)login:|telnet", None),
        // Bare 220 greetings carry no protocol name; fall back to the
        // conventional port meaning.
        ServiceSignature::new("smtp", r"^220[ -]", Some(&[25, 465, 587, 2525])),
        ServiceSignature::new("ftp", r"^220[ -]", Some(&[21])),
    ]
});

/// Version extraction patterns, evaluated in order; the first capture wins.
static VERSION_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"OpenSSH[_/]([^\r\n]+)",
        r"SSH-[\d.]+-([^\r\n]+)",
        r"Microsoft-IIS/([\d.]+)",
        r"nginx/([\d.]+[\w-]*)",
        r"Apache/([\d.]+[\w().\- ]*)",
        r"(?i)Server:\s*([^\r\n]+)",
        r"MariaDB[- ]([\d.]+[\w-]*)",
        r"redis_version:([\d.]+)",
        r"ProFTPD ([\d.]+[\w-]*)",
        r"vsFTPd ([\d.]+[\w-]*)",
        r"FileZilla Server ([\d.]+[\w-]*)",
        r"Postfix(?: \(([^)]+)\))?",
        r"RFB ([\d.]+)",
        r"^220[ -]([^\r\n]+)",
        r"^\+OK ([^\r\n]+)",
        r"^\* OK ([^\r\n]+)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("invalid version pattern"))
    .collect()
});

/// Well-known port → service fallback for ports that yield no banner
static PORT_SERVICES: Lazy<HashMap<u16, &'static str>> = Lazy::new(|| {
    HashMap::from([
        (21, "ftp"),
        (22, "ssh"),
        (23, "telnet"),
        (25, "smtp"),
        (53, "domain"),
        (80, "http"),
        (110, "pop3"),
        (111, "rpcbind"),
        (135, "msrpc"),
        (139, "netbios-ssn"),
        (143, "imap"),
        (443, "https"),
        (445, "microsoft-ds"),
        (465, "smtps"),
        (587, "submission"),
        (993, "imaps"),
        (995, "pop3s"),
        (1433, "ms-sql-s"),
        (1723, "pptp"),
        (3306, "mysql"),
        (3389, "ms-wbt-server"),
        (5432, "postgresql"),
        (5900, "vnc"),
        (6379, "redis"),
        (8080, "http-proxy"),
    ])
});

/// Classify a banner against the ordered signature table. Returns the
/// service name and an extracted version string when one is present.
pub fn classify(banner: &str, port: u16) -> Option<(&'static str, Option<String>)> {
    for sig in SIGNATURES.iter() {
        if let Some(ports) = sig.ports {
            if !ports.contains(&port) {
                continue;
            }
        }
        if sig.pattern.is_match(banner) {
            return Some((sig.service, extract_version(banner)));
        }
    }
    None
}

/// Static port → service fallback when no banner was obtained
pub fn fallback_service(port: u16) -> Option<&'static str> {
    PORT_SERVICES.get(&port).copied()
}

fn extract_version(banner: &str) -> Option<String> {
    for pattern in VERSION_PATTERNS.iter() {
        if let Some(captures) = pattern.captures(banner) {
            if let Some(version) = captures.get(1) {
                let version = version.as_str().trim();
                if !version.is_empty() {
                    return Some(version.to_string());
                }
            }
        }
    }
    None
}

/// Banner grabber and classifier for a host's open TCP ports
pub struct ServiceDetector {
    options: ScanOptions,
}

impl ServiceDetector {
    pub fn new(options: ScanOptions) -> Self {
        Self { options }
    }

    /// Fill service name, version and banner into every Open TCP result,
    /// bounded by the service worker pool.
    pub async fn detect_services(
        &self,
        results: &mut [PortProbeResult],
        cancel: &CancellationToken,
    ) {
        let open_tcp: Vec<(IpAddr, u16)> = results
            .iter()
            .filter(|r| r.protocol == Protocol::Tcp && r.state.is_open())
            .map(|r| (r.addr, r.port))
            .collect();
        if open_tcp.is_empty() {
            return;
        }

        let semaphore = Arc::new(Semaphore::new(self.options.service_concurrency));
        let read_timeout = self.options.banner_timeout;
        let connect_timeout = self.options.connect_timeout;

        let tasks = open_tcp.into_iter().map(|(addr, port)| {
            let semaphore = semaphore.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let _permit = semaphore.acquire().await.ok()?;
                if cancel.is_cancelled() {
                    return None;
                }
                let banner = grab_banner(addr, port, connect_timeout, read_timeout).await;
                Some((port, banner))
            })
        });

        let mut banners: HashMap<u16, Option<String>> = HashMap::new();
        for joined in join_all(tasks).await {
            if let Ok(Some((port, banner))) = joined {
                banners.insert(port, banner);
            }
        }

        for result in results
            .iter_mut()
            .filter(|r| r.protocol == Protocol::Tcp && r.state.is_open())
        {
            let banner = banners.get(&result.port).cloned().flatten();
            match banner {
                Some(banner) => {
                    match classify(&banner, result.port) {
                        Some((service, version)) => {
                            result.service = Some(service.to_string());
                            result.version = version;
                        }
                        None => {
                            result.service = fallback_service(result.port).map(String::from);
                        }
                    }
                    result.banner = Some(banner);
                }
                None => {
                    result.service = fallback_service(result.port).map(String::from);
                }
            }
        }
    }
}

/// Connect and wait briefly for an unsolicited banner. Quiet HTTP-family
/// ports get one `GET /` probe and a second read.
async fn grab_banner(
    addr: IpAddr,
    port: u16,
    connect_timeout: Duration,
    read_timeout: Duration,
) -> Option<String> {
    let target = SocketAddr::new(addr, port);
    let mut stream = match timeout(connect_timeout, TcpStream::connect(target)).await {
        Ok(Ok(stream)) => stream,
        _ => return None,
    };

    let mut buf = vec![0u8; MAX_BANNER_LEN];
    if let Ok(Ok(n)) = timeout(read_timeout, stream.read(&mut buf)).await {
        if n > 0 {
            return Some(clean_banner(&buf[..n]));
        }
    }

    if HTTP_PROBE_PORTS.contains(&port) {
        let request = format!("GET / HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n", addr);
        if stream.write_all(request.as_bytes()).await.is_err() {
            return None;
        }
        if let Ok(Ok(n)) = timeout(read_timeout, stream.read(&mut buf)).await {
            if n > 0 {
                return Some(clean_banner(&buf[..n]));
            }
        }
    }

    None
}

fn clean_banner(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_ssh_banner_with_distro_version() {
        let banner = "SSH-2.0-OpenSSH_8.2p1 Ubuntu-4ubuntu0.3";
        let (service, version) = classify(banner, 22).unwrap();
        assert_eq!(service, "ssh");
        let version = version.unwrap();
        assert!(version.contains("8.2"));
        assert!(version.contains("Ubuntu"));
    }

    #[test]
    fn test_http_server_header() {
        let banner = "HTTP/1.1 200 OK\r\nServer: nginx/1.18.0\r\n\r\n";
        let (service, version) = classify(banner, 80).unwrap();
        assert_eq!(service, "http");
        assert_eq!(version.unwrap(), "1.18.0");
    }

    #[test]
    fn test_specific_rules_win_over_generic_greeting() {
        // A 220 greeting naming ESMTP must classify as smtp even on a
        // non-mail port.
        let (service, _) = classify("220 mail.example.org ESMTP Postfix", 2000).unwrap();
        assert_eq!(service, "smtp");
    }

    #[test]
    fn test_bare_220_falls_back_by_port() {
        let (on_ftp, _) = classify("220 ready", 21).unwrap();
        assert_eq!(on_ftp, "ftp");
        let (on_mail, _) = classify("220 ready", 25).unwrap();
        assert_eq!(on_mail, "smtp");
        assert!(classify("220 ready", 9999).is_none());
    }

    #[test]
    fn test_pop3_imap_redis_vnc() {
        assert_eq!(classify("+OK Dovecot ready.", 110).unwrap().0, "pop3");
        assert_eq!(classify("* OK IMAP4rev1 ready", 143).unwrap().0, "imap");
        assert_eq!(classify("+PONG", 6379).unwrap().0, "redis");
        let (vnc, version) = classify("RFB 003.008", 5900).unwrap();
        assert_eq!(vnc, "vnc");
        assert_eq!(version.unwrap(), "003.008");
    }

    #[test]
    fn test_fallback_table_for_silent_ports() {
        assert_eq!(fallback_service(3389), Some("ms-wbt-server"));
        assert_eq!(fallback_service(3306), Some("mysql"));
        assert_eq!(fallback_service(49152), None);
    }

    #[test]
    fn test_unmatched_banner_is_none() {
        assert!(classify("hello world", 12345).is_none());
    }

    #[tokio::test]
    async fn test_grab_banner_reads_unsolicited_greeting() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let _ = socket.write_all(b"SSH-2.0-OpenSSH_9.6\r\n").await;
            }
        });

        let banner = grab_banner(
            "127.0.0.1".parse().unwrap(),
            port,
            Duration::from_secs(1),
            Duration::from_secs(1),
        )
        .await
        .unwrap();
        assert!(banner.starts_with("SSH-2.0-OpenSSH_9.6"));
    }

    #[tokio::test]
    async fn test_detect_services_annotates_open_ports() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            loop {
                if let Ok((mut socket, _)) = listener.accept().await {
                    let _ = socket
                        .write_all(b"220 files.example.org FTP server (vsFTPd 3.0.3)\r\n")
                        .await;
                }
            }
        });

        let addr: IpAddr = "127.0.0.1".parse().unwrap();
        let mut results = vec![crate::scanner::PortProbeResult::new(
            addr,
            port,
            Protocol::Tcp,
            crate::scanner::PortState::Open,
        )];

        let detector = ServiceDetector::new(ScanOptions::default());
        detector
            .detect_services(&mut results, &CancellationToken::new())
            .await;

        assert_eq!(results[0].service.as_deref(), Some("ftp"));
        assert!(results[0].banner.as_deref().unwrap().contains("vsFTPd"));
    }
}
