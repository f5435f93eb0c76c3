//! Outbound file-event notifications.
//!
//! The downstream viewer is told about files materialized under, or removed
//! from, the storage root. Delivery is best-effort: failures are logged and
//! never reach the caller.

use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, info, warn};

const PROBE_PATH: &str = "/loader/test";
const ADDED_PATH: &str = "/fs/addedFile";
const DELETED_PATH: &str = "/fs/deletedFile";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Receiver of file events. Paths are relative to the storage root.
pub trait EventNotifier: Send + Sync {
    fn file_added(&self, relative_path: &str);
    fn file_deleted(&self, relative_path: &str);
}

/// Notifier that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl EventNotifier for NoopNotifier {
    fn file_added(&self, relative_path: &str) {
        debug!(path = relative_path, "Notification disabled, dropping addedFile");
    }

    fn file_deleted(&self, relative_path: &str) {
        debug!(path = relative_path, "Notification disabled, dropping deletedFile");
    }
}

/// HTTP notifier. The origin (`https://host` or `http://host`) is probed on
/// first use and cached for the process lifetime; if neither scheme answers,
/// every later event is dropped.
pub struct HttpNotifier {
    host: String,
    agent: ureq::Agent,
    origin: OnceLock<Option<String>>,
}

impl HttpNotifier {
    /// `host` is `name[:port]` with no scheme.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            agent: ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build(),
            origin: OnceLock::new(),
        }
    }

    /// Resolved origin, probing on first call.
    pub fn origin(&self) -> Option<&str> {
        self.origin.get_or_init(|| self.probe_origin()).as_deref()
    }

    fn probe_origin(&self) -> Option<String> {
        let mut failures = Vec::new();
        for scheme in ["https", "http"] {
            let origin = format!("{}://{}", scheme, self.host);
            match self.agent.get(&format!("{}{}", origin, PROBE_PATH)).call() {
                // Any HTTP answer, even an error status, proves the origin.
                Ok(_) | Err(ureq::Error::Status(..)) => {
                    info!(origin = %origin, "Notification origin resolved");
                    return Some(origin);
                }
                Err(err) => failures.push(format!("{}: {}", scheme, err)),
            }
        }
        warn!(
            host = %self.host,
            errors = %failures.join("; "),
            "Notification endpoint unreachable, notifications disabled"
        );
        None
    }

    fn send(&self, endpoint: &str, relative_path: &str) {
        let Some(origin) = self.origin() else {
            return;
        };
        let url = event_url(origin, endpoint, relative_path);
        debug!(url = %url, "Sending notification");
        match self.agent.get(&url).call() {
            Ok(_) => {}
            Err(ureq::Error::Status(code, _)) => {
                warn!(url = %url, status = code, "Notification rejected");
            }
            Err(err) => {
                warn!(url = %url, error = %err, "Notification failed");
            }
        }
    }
}

impl EventNotifier for HttpNotifier {
    fn file_added(&self, relative_path: &str) {
        self.send(ADDED_PATH, relative_path);
    }

    fn file_deleted(&self, relative_path: &str) {
        self.send(DELETED_PATH, relative_path);
    }
}

fn event_url(origin: &str, endpoint: &str, relative_path: &str) -> String {
    format!(
        "{}{}?filepath={}",
        origin,
        endpoint,
        urlencoding::encode(relative_path)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::sync::mpsc;
    use std::thread;

    /// Minimal HTTP server answering 200 to every request and reporting
    /// each request line.
    fn start_mock_server(requests: usize) -> (String, mpsc::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let host = format!("127.0.0.1:{}", listener.local_addr().unwrap().port());
        let (tx, rx) = mpsc::channel();

        thread::spawn(move || {
            for stream in listener.incoming().take(requests) {
                let Ok(mut stream) = stream else { continue };
                // Drop TLS handshakes so https probes fail fast.
                let mut first = [0u8; 1];
                if stream.peek(&mut first).map(|n| n == 0 || first[0] == 0x16).unwrap_or(true) {
                    continue;
                }
                let mut reader = BufReader::new(stream.try_clone().unwrap());
                let mut request_line = String::new();
                let _ = reader.read_line(&mut request_line);
                loop {
                    let mut header = String::new();
                    let _ = reader.read_line(&mut header);
                    if header == "\r\n" || header.is_empty() {
                        break;
                    }
                }
                let _ = tx.send(request_line.trim_end().to_string());
                let _ = stream
                    .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
            }
        });

        (host, rx)
    }

    #[test]
    fn test_event_url_encodes_path() {
        assert_eq!(
            event_url("http://viewer:1441", ADDED_PATH, "ab12cd34ef/x y.dcm"),
            "http://viewer:1441/fs/addedFile?filepath=ab12cd34ef%2Fx%20y.dcm"
        );
    }

    #[test]
    fn test_unreachable_host_disables_notifications() {
        // Reserve a port, then free it so nothing listens there.
        let port = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
        let notifier = HttpNotifier::new(format!("127.0.0.1:{}", port));

        assert_eq!(notifier.origin(), None);
        notifier.file_added("a/b.dcm");
        assert_eq!(notifier.origin(), None);
    }

    #[test]
    fn test_falls_back_to_http_and_caches_origin() {
        // The https probe is dropped by the plain server; the http probe and
        // two events follow.
        let (host, requests) = start_mock_server(4);
        let notifier = HttpNotifier::new(host.clone());

        assert_eq!(notifier.origin(), Some(format!("http://{}", host).as_str()));
        notifier.file_added("g1/one.dcm");
        notifier.file_deleted("g1/one.dcm");

        let seen: Vec<String> = requests.iter().take(3).collect();
        assert_eq!(seen[0], "GET /loader/test HTTP/1.1");
        assert_eq!(seen[1], "GET /fs/addedFile?filepath=g1%2Fone.dcm HTTP/1.1");
        assert_eq!(seen[2], "GET /fs/deletedFile?filepath=g1%2Fone.dcm HTTP/1.1");
    }
}
