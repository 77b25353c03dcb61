//! A scriptable HTTP server for exercising range streaming in tests.
//!
//! The server binds an ephemeral localhost port, serves a single byte blob
//! with `Range` support, and follows a per-request script of [`Behavior`]s
//! so tests can stage truncations, bad statuses, redirects, and servers
//! that ignore ranges. Every response carries `Connection: close`, so each
//! request arrives on a fresh connection in arrival order.
//!
//! ```rust
//! use hstream_http::testing::{Behavior, TestServer};
//! use hstream_http::RangeReader;
//! use std::io::Read;
//!
//! let server = TestServer::serve_scripted(b"0123456789".to_vec(), vec![
//!     Behavior::Truncate(4),
//! ]);
//!
//! let mut out = Vec::new();
//! RangeReader::open(&server.url()).unwrap().read_to_end(&mut out).unwrap();
//! assert_eq!(out, b"0123456789");
//! ```

use std::collections::VecDeque;
use std::io::{self, BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

/// How the server answers one request.
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Honor the request, range and all.
    Normal,
    /// Honor the request but close the connection after this many body
    /// bytes, despite advertising the full length.
    Truncate(usize),
    /// Answer with this status and an empty body.
    Status(u16),
    /// Answer `302 Found` pointing at the given path.
    Redirect(String),
    /// Serve the whole blob as `200` even if a range was requested.
    IgnoreRange,
}

/// One request as the server saw it.
#[derive(Debug, Clone)]
pub struct Request {
    pub path: String,
    /// The raw `Range` header value, if one was sent.
    pub range: Option<String>,
}

/// A single-threaded test server; see the [module docs](self).
pub struct TestServer {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<Request>>>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl TestServer {
    /// Serves `body` with no scripted behaviors.
    pub fn serve(body: Vec<u8>) -> TestServer {
        TestServer::serve_scripted(body, Vec::new())
    }

    /// Serves `body`, answering the first requests according to `script`
    /// and any further requests normally.
    pub fn serve_scripted(body: Vec<u8>, script: Vec<Behavior>) -> TestServer {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind test server");
        let addr = listener.local_addr().expect("test server address");
        let requests = Arc::new(Mutex::new(Vec::new()));
        let stop = Arc::new(AtomicBool::new(false));

        let handle = {
            let requests = Arc::clone(&requests);
            let stop = Arc::clone(&stop);
            thread::spawn(move || run(listener, body, script.into(), requests, stop))
        };

        TestServer {
            addr,
            requests,
            stop,
            handle: Some(handle),
        }
    }

    /// The URL of the served blob.
    pub fn url(&self) -> String {
        self.url_for("/blob")
    }

    pub fn url_for(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Every request received so far, in arrival order.
    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().expect("request log").clone()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        // Unblock the accept loop.
        let _ = TcpStream::connect(self.addr);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn run(
    listener: TcpListener,
    body: Vec<u8>,
    mut script: VecDeque<Behavior>,
    requests: Arc<Mutex<Vec<Request>>>,
    stop: Arc<AtomicBool>,
) {
    for conn in listener.incoming() {
        if stop.load(Ordering::SeqCst) {
            break;
        }
        let Ok(stream) = conn else { continue };
        let _ = handle(stream, &body, &mut script, &requests);
    }
}

fn handle(
    mut stream: TcpStream,
    body: &[u8],
    script: &mut VecDeque<Behavior>,
    requests: &Mutex<Vec<Request>>,
) -> io::Result<()> {
    let mut reader = BufReader::new(stream.try_clone()?);

    let mut request_line = String::new();
    reader.read_line(&mut request_line)?;
    if request_line.trim().is_empty() {
        // The shutdown wake-up, or a probe that sent nothing.
        return Ok(());
    }

    let path = request_line
        .split_whitespace()
        .nth(1)
        .unwrap_or("/")
        .to_string();

    let mut range = None;
    loop {
        let mut header = String::new();
        reader.read_line(&mut header)?;
        let header = header.trim_end();
        if header.is_empty() {
            break;
        }
        if let Some((name, value)) = header.split_once(':') {
            if name.eq_ignore_ascii_case("range") {
                range = Some(value.trim().to_string());
            }
        }
    }

    requests.lock().expect("request log").push(Request {
        path,
        range: range.clone(),
    });

    let behavior = script.pop_front().unwrap_or(Behavior::Normal);
    respond(&mut stream, body, range.as_deref(), behavior)
}

fn respond(
    stream: &mut TcpStream,
    body: &[u8],
    range: Option<&str>,
    behavior: Behavior,
) -> io::Result<()> {
    match &behavior {
        Behavior::Status(code) => {
            write!(
                stream,
                "HTTP/1.1 {code} Scripted\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
            )
        }
        Behavior::Redirect(path) => {
            write!(
                stream,
                "HTTP/1.1 302 Found\r\nLocation: {path}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
            )
        }
        Behavior::Normal | Behavior::Truncate(_) | Behavior::IgnoreRange => {
            let start = match behavior {
                Behavior::IgnoreRange => None,
                _ => range.and_then(range_start),
            };

            let slice = match start {
                Some(start) if start >= body.len() as u64 => {
                    return write!(
                        stream,
                        "HTTP/1.1 416 Range Not Satisfiable\r\nContent-Range: bytes */{}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                        body.len()
                    );
                }
                Some(start) => {
                    write!(
                        stream,
                        "HTTP/1.1 206 Partial Content\r\nContent-Length: {}\r\nContent-Range: bytes {}-{}/{}\r\nConnection: close\r\n\r\n",
                        body.len() as u64 - start,
                        start,
                        body.len() - 1,
                        body.len()
                    )?;
                    &body[start as usize..]
                }
                None => {
                    write!(
                        stream,
                        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                        body.len()
                    )?;
                    body
                }
            };

            let sent = match behavior {
                Behavior::Truncate(cut) => &slice[..cut.min(slice.len())],
                _ => slice,
            };
            stream.write_all(sent)?;
            stream.flush()
        }
    }
}

/// First byte of a `bytes=<start>-[<end>]` header value. Suffix ranges
/// (`bytes=-n`) are not produced by the readers under test.
fn range_start(value: &str) -> Option<u64> {
    let spec = value.strip_prefix("bytes=")?;
    let (start, _) = spec.split_once('-')?;
    start.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::range_start;

    #[test]
    fn range_start_forms() {
        assert_eq!(range_start("bytes=0-"), Some(0));
        assert_eq!(range_start("bytes=17-"), Some(17));
        assert_eq!(range_start("bytes=5-9"), Some(5));
        assert_eq!(range_start("bytes=-5"), None);
        assert_eq!(range_start("lines=1-"), None);
    }
}
