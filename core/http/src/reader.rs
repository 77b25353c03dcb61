use std::io::{self, Read};
use std::sync::OnceLock;
use std::time::Duration;

use log::{trace, warn};
use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, CONTENT_RANGE, RANGE};
use reqwest::{redirect, StatusCode, Url};

use crate::error::{Error, Result};
use crate::{MAX_REDIRECTS, USER_AGENT};

/// Configuration for [`RangeReader`] connections.
///
/// The defaults match what [`RangeReader::open()`] uses: the crate's user
/// agent, a 30 second connect timeout, no whole-request timeout (bodies
/// stream for as long as they need to), and up to [`MAX_REDIRECTS`]
/// redirects per request.
///
/// ```rust
/// use std::time::Duration;
/// use hstream_http::Options;
///
/// let options = Options::new()
///     .connect_timeout(Duration::from_secs(5))
///     .user_agent("example/1.0");
/// ```
#[derive(Debug, Clone)]
pub struct Options {
    connect_timeout: Duration,
    user_agent: String,
    max_redirects: usize,
    client: Option<Client>,
}

impl Default for Options {
    fn default() -> Options {
        Options {
            connect_timeout: Duration::from_secs(30),
            user_agent: USER_AGENT.into(),
            max_redirects: MAX_REDIRECTS,
            client: None,
        }
    }
}

impl Options {
    pub fn new() -> Options {
        Options::default()
    }

    /// Time allowed for establishing each connection.
    pub fn connect_timeout(mut self, timeout: Duration) -> Options {
        self.connect_timeout = timeout;
        self
    }

    /// The `User-Agent` sent with every request.
    pub fn user_agent(mut self, agent: impl Into<String>) -> Options {
        self.user_agent = agent.into();
        self
    }

    /// Maximum redirects followed per request.
    pub fn max_redirects(mut self, max: usize) -> Options {
        self.max_redirects = max;
        self
    }

    /// Use a preconfigured client instead of building one from the other
    /// options, which are then ignored.
    pub fn client(mut self, client: Client) -> Options {
        self.client = Some(client);
        self
    }

    fn build_client(&self) -> Result<Client> {
        if let Some(client) = &self.client {
            return Ok(client.clone());
        }

        let client = Client::builder()
            .user_agent(self.user_agent.clone())
            .redirect(redirect::Policy::limited(self.max_redirects))
            .connect_timeout(self.connect_timeout)
            .timeout(None)
            .build()?;

        Ok(client)
    }
}

/// The process-wide client used by readers opened without explicit
/// [`Options`]. Initialization happens at most once and is idempotent; a
/// failure to initialize is reported by each open attempt.
fn shared_client() -> Result<Client> {
    static SHARED: OnceLock<Client> = OnceLock::new();

    if let Some(client) = SHARED.get() {
        return Ok(client.clone());
    }

    let client = Options::default().build_client()?;
    Ok(SHARED.get_or_init(|| client).clone())
}

/// A blocking reader over an HTTP resource that survives truncated
/// responses.
///
/// The reader presents the resource as a single logical byte stream. Each
/// underlying request/response pair is a *session*; when a session's body
/// ends before the resource does (a connection reset, a proxy giving up,
/// a server closing early), the reader silently opens a new session with
/// `Range: bytes=<offset>-` at the next undelivered byte and keeps going.
/// Resumption is attempted only while progress is being made: a session
/// that dies without delivering a single byte surfaces
/// [`Error::Truncated`] instead of retrying forever.
///
/// Seeking is supported by discarding the current session and opening the
/// next one at the requested offset. Seeking relative to the end is not:
/// the resource length is only known when the server chooses to reveal it.
///
/// ```rust,no_run
/// use hstream_http::RangeReader;
///
/// # fn main() -> Result<(), hstream_http::Error> {
/// let mut reader = RangeReader::open("https://example.com/large.bin")?;
/// let mut chunk = [0u8; 8192];
/// let n = reader.read(&mut chunk)?;
/// assert!(n <= chunk.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct RangeReader {
    url: Url,
    client: Client,
    /// Absolute offset of the next byte to hand to the caller.
    offset: u64,
    /// The live session, if any. `None` between sessions and after EOF.
    session: Option<Response>,
    /// Bytes delivered from the live session; resumption is gated on this.
    delivered: u64,
    /// Total resource length, once a response reveals it.
    total: Option<u64>,
    /// Set when the previous session died without delivering a byte. One
    /// such stall earns a retry; two in a row surface as truncation.
    stalled: bool,
    at_eof: bool,
}

impl RangeReader {
    /// Opens `url` at offset zero and drives the transport until the
    /// response status is known.
    pub fn open(url: &str) -> Result<RangeReader> {
        RangeReader::open_at(url, 0)
    }

    /// Opens `url` with the first session starting at `offset`. A nonzero
    /// offset sends `Range: bytes=<offset>-` and requires a `206` answer.
    pub fn open_at(url: &str, offset: u64) -> Result<RangeReader> {
        RangeReader::with_client(url, offset, shared_client()?)
    }

    /// Opens `url` at `offset` with a client built from `options`.
    pub fn open_with(url: &str, offset: u64, options: Options) -> Result<RangeReader> {
        RangeReader::with_client(url, offset, options.build_client()?)
    }

    fn with_client(url: &str, offset: u64, client: Client) -> Result<RangeReader> {
        let url = Url::parse(url).map_err(|e| Error::Url {
            url: url.into(),
            reason: e.to_string(),
        })?;

        let mut reader = RangeReader {
            url,
            client,
            offset,
            session: None,
            delivered: 0,
            total: None,
            stalled: false,
            at_eof: false,
        };

        reader.start_session()?;
        Ok(reader)
    }

    /// The absolute offset of the next byte a read will deliver.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// The total resource length, if any response has revealed it.
    pub fn total_length(&self) -> Option<u64> {
        self.total
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Repositions the stream. The current session, if any, is dropped;
    /// the next read opens a new one at `offset`.
    pub fn seek_to(&mut self, offset: u64) {
        if offset == self.offset {
            return;
        }

        self.session = None;
        self.delivered = 0;
        self.offset = offset;
        self.stalled = false;
        self.at_eof = false;
    }

    /// Reads up to `buf.len()` bytes, resuming across truncated sessions.
    /// Returns `Ok(0)` only at the true end of the resource.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() || self.at_eof {
            return Ok(0);
        }

        loop {
            if self.session.is_none() {
                if let Some(total) = self.total {
                    if self.offset >= total {
                        self.at_eof = true;
                        return Ok(0);
                    }
                }

                self.start_session()?;
                if self.at_eof {
                    return Ok(0);
                }
            }

            let Some(session) = self.session.as_mut() else {
                continue;
            };
            match session.read(buf) {
                Ok(0) => {
                    // The transport delivered this session's body in full.
                    // Short of the resource length, that is a truncation
                    // the server did not even report.
                    self.session = None;
                    match self.total {
                        Some(total) if self.offset < total => {
                            self.resume("body ended short of the resource length", None)?;
                        }
                        _ => {
                            self.at_eof = true;
                            return Ok(0);
                        }
                    }
                }
                Ok(n) => {
                    self.offset += n as u64;
                    self.delivered += n as u64;
                    self.stalled = false;
                    return Ok(n);
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    self.session = None;
                    self.resume("transport error mid-body", Some(e))?;
                }
            }
        }
    }

    /// Reopens at the current offset. A session that made progress always
    /// earns a reopen; a stalled one earns a single retry before the
    /// failure surfaces as [`Error::Truncated`].
    fn resume(&mut self, why: &str, source: Option<io::Error>) -> Result<()> {
        if self.delivered == 0 {
            if self.stalled {
                return Err(Error::Truncated {
                    offset: self.offset,
                    source,
                });
            }
            self.stalled = true;
        }

        warn!(
            "resuming `{}` at offset {}: {}",
            self.url, self.offset, why
        );
        self.start_session()
    }

    /// Starts a session at the current offset and drives the transport
    /// until the status is known. On success either a live session is in
    /// place or `at_eof` is set (a satisfiable-but-empty tail).
    fn start_session(&mut self) -> Result<()> {
        self.session = None;
        self.delivered = 0;

        trace!("requesting `{}` from offset {}", self.url, self.offset);

        let mut request = self.client.get(self.url.clone());
        if self.offset > 0 {
            request = request.header(RANGE, format!("bytes={}-", self.offset));
        }

        let response = request.send()?;
        let status = response.status();

        if self.offset == 0 {
            if !status.is_success() {
                return Err(Error::Status { status, offset: 0 });
            }

            if status == StatusCode::PARTIAL_CONTENT {
                if let (_, Some(total)) = content_range(response.headers()) {
                    self.total = Some(total);
                }
            } else if let Some(length) = response.content_length() {
                self.total = Some(length);
            }
        } else {
            match status {
                StatusCode::PARTIAL_CONTENT => {
                    let (start, total) = content_range(response.headers());
                    if let Some(start) = start {
                        if start != self.offset {
                            return Err(Error::RangeIgnored {
                                offset: self.offset,
                            });
                        }
                    }
                    if let Some(total) = total {
                        self.total = Some(total);
                    }
                }
                StatusCode::RANGE_NOT_SATISFIABLE => {
                    // An unsatisfiable range that starts exactly at the
                    // stream length is end-of-stream, not a failure. The
                    // length comes from an earlier session or from the
                    // `bytes */<total>` shape of this very response.
                    let total = self.total.or_else(|| content_range(response.headers()).1);
                    if total == Some(self.offset) {
                        self.total = total;
                        self.at_eof = true;
                        return Ok(());
                    }
                    return Err(Error::RangeNotSatisfiable {
                        offset: self.offset,
                    });
                }
                s if s.is_success() => {
                    return Err(Error::RangeIgnored {
                        offset: self.offset,
                    });
                }
                s => {
                    return Err(Error::Status {
                        status: s,
                        offset: self.offset,
                    });
                }
            }
        }

        self.session = Some(response);
        Ok(())
    }
}

impl Read for RangeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        RangeReader::read(self, buf).map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }
}

/// Extracts `(start, total)` from a `Content-Range` header of the shape
/// `bytes <start>-<end>/<total>`, where either side may be `*`.
fn content_range(headers: &HeaderMap) -> (Option<u64>, Option<u64>) {
    let Some(value) = headers.get(CONTENT_RANGE).and_then(|v| v.to_str().ok()) else {
        return (None, None);
    };

    let Some(rest) = value.strip_prefix("bytes") else {
        return (None, None);
    };
    let rest = rest.trim_start();

    let Some((range, total)) = rest.split_once('/') else {
        return (None, None);
    };

    let start = range
        .split_once('-')
        .and_then(|(start, _)| start.trim().parse().ok());
    let total = total.trim().parse().ok();

    (start, total)
}

#[cfg(test)]
mod tests {
    use super::content_range;
    use reqwest::header::{HeaderMap, HeaderValue, CONTENT_RANGE};

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_RANGE, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn complete_content_range() {
        let headers = headers_with("bytes 100-199/1234");
        assert_eq!(content_range(&headers), (Some(100), Some(1234)));
    }

    #[test]
    fn unknown_total() {
        let headers = headers_with("bytes 0-499/*");
        assert_eq!(content_range(&headers), (Some(0), None));
    }

    #[test]
    fn unsatisfied_range_shape() {
        let headers = headers_with("bytes */30000");
        assert_eq!(content_range(&headers), (None, Some(30000)));
    }

    #[test]
    fn missing_header() {
        assert_eq!(content_range(&HeaderMap::new()), (None, None));
    }

    #[test]
    fn malformed_values() {
        assert_eq!(content_range(&headers_with("pages 1-2/3")), (None, None));
        assert_eq!(content_range(&headers_with("bytes mangled")), (None, None));
    }
}
