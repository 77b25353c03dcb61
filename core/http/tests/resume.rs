use std::io::Read;

use hstream_http::testing::{Behavior, TestServer};
use hstream_http::{Error, RangeReader};

fn blob(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

fn read_all(reader: &mut RangeReader) -> Vec<u8> {
    let mut out = Vec::new();
    reader.read_to_end(&mut out).expect("read to eof");
    out
}

#[test]
fn full_read_without_interference() {
    let body = blob(30_000);
    let server = TestServer::serve(body.clone());

    let mut reader = RangeReader::open(&server.url()).unwrap();
    assert_eq!(reader.total_length(), Some(30_000));
    assert_eq!(read_all(&mut reader), body);

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].range, None);
}

#[test]
fn resumes_across_a_truncation_sweep() {
    // Truncate the first response at every offset around a typical block
    // boundary; the caller must always end up with the whole resource.
    let body = blob(30_000);
    let boundary = 16_384usize;

    for cut in boundary - 4..=boundary + 4 {
        let server =
            TestServer::serve_scripted(body.clone(), vec![Behavior::Truncate(cut)]);

        let mut reader = RangeReader::open(&server.url()).unwrap();
        assert_eq!(read_all(&mut reader), body, "cut at {cut}");

        let requests = server.requests();
        assert_eq!(requests.len(), 2, "cut at {cut}");
        assert_eq!(
            requests[1].range.as_deref(),
            Some(format!("bytes={cut}-").as_str()),
            "cut at {cut}"
        );
    }
}

#[test]
fn resumes_repeatedly_while_progress_is_made() {
    let body = blob(10_000);
    let server = TestServer::serve_scripted(
        body.clone(),
        vec![Behavior::Truncate(1_000), Behavior::Truncate(1_000)],
    );

    let mut reader = RangeReader::open(&server.url()).unwrap();
    assert_eq!(read_all(&mut reader), body);

    let ranges: Vec<_> = server.requests().into_iter().map(|r| r.range).collect();
    assert_eq!(
        ranges,
        vec![
            None,
            Some("bytes=1000-".to_string()),
            Some("bytes=2000-".to_string()),
        ]
    );
}

#[test]
fn a_stalled_session_earns_one_retry() {
    let body = blob(5_000);
    let server = TestServer::serve_scripted(body.clone(), vec![Behavior::Truncate(0)]);

    let mut reader = RangeReader::open(&server.url()).unwrap();
    assert_eq!(read_all(&mut reader), body);

    let requests = server.requests();
    assert_eq!(requests.len(), 2);
    // No progress was made, so the retry starts over without a range.
    assert_eq!(requests[1].range, None);
}

#[test]
fn two_consecutive_stalls_surface_truncation() {
    let body = blob(5_000);
    let server = TestServer::serve_scripted(
        body,
        vec![Behavior::Truncate(0), Behavior::Truncate(0)],
    );

    let mut reader = RangeReader::open(&server.url()).unwrap();
    let mut out = [0u8; 512];
    let err = RangeReader::read(&mut reader, &mut out).unwrap_err();
    assert!(matches!(err, Error::Truncated { offset: 0, .. }), "{err:?}");
}

#[test]
fn open_surfaces_status_failures() {
    let server = TestServer::serve_scripted(blob(100), vec![Behavior::Status(404)]);
    let err = RangeReader::open(&server.url()).unwrap_err();
    assert_eq!(err.status().map(|s| s.as_u16()), Some(404));
}

#[test]
fn ranged_open_sends_range_and_reads_the_tail() {
    let body = blob(4_096);
    let server = TestServer::serve(body.clone());

    let mut reader = RangeReader::open_at(&server.url(), 100).unwrap();
    assert_eq!(reader.total_length(), Some(4_096));
    assert_eq!(read_all(&mut reader), body[100..]);

    let requests = server.requests();
    assert_eq!(requests[0].range.as_deref(), Some("bytes=100-"));
}

#[test]
fn a_server_ignoring_ranges_is_refused() {
    let server = TestServer::serve_scripted(blob(4_096), vec![Behavior::IgnoreRange]);
    let err = RangeReader::open_at(&server.url(), 100).unwrap_err();
    assert!(matches!(err, Error::RangeIgnored { offset: 100 }), "{err:?}");
}

#[test]
fn opening_exactly_at_the_end_is_eof() {
    let body = blob(2_048);
    let server = TestServer::serve(body);

    let mut reader = RangeReader::open_at(&server.url(), 2_048).unwrap();
    let mut buf = [0u8; 16];
    assert_eq!(RangeReader::read(&mut reader, &mut buf).unwrap(), 0);
}

#[test]
fn opening_past_the_end_is_an_error() {
    let server = TestServer::serve(blob(2_048));
    let err = RangeReader::open_at(&server.url(), 2_053).unwrap_err();
    assert!(
        matches!(err, Error::RangeNotSatisfiable { offset: 2_053 }),
        "{err:?}"
    );
}

#[test]
fn follows_redirects() {
    let body = blob(1_024);
    let server = TestServer::serve_scripted(
        body.clone(),
        vec![Behavior::Redirect("/real".to_string())],
    );

    let mut reader = RangeReader::open(&server.url()).unwrap();
    assert_eq!(read_all(&mut reader), body);

    let paths: Vec<_> = server.requests().into_iter().map(|r| r.path).collect();
    assert_eq!(paths, vec!["/blob".to_string(), "/real".to_string()]);
}

#[test]
fn seeking_opens_the_next_session_at_the_target() {
    let body = blob(30_000);
    let server = TestServer::serve(body.clone());

    let mut reader = RangeReader::open(&server.url()).unwrap();
    let mut head = [0u8; 10];
    reader.read_exact(&mut head).unwrap();
    assert_eq!(head, body[..10]);

    reader.seek_to(20_000);
    assert_eq!(reader.offset(), 20_000);

    let mut tail = [0u8; 100];
    reader.read_exact(&mut tail).unwrap();
    assert_eq!(tail, body[20_000..20_100]);

    let requests = server.requests();
    assert_eq!(requests[1].range.as_deref(), Some("bytes=20000-"));
}

#[test]
fn empty_resource_reads_as_eof() {
    let server = TestServer::serve(Vec::new());
    let mut reader = RangeReader::open(&server.url()).unwrap();
    let mut buf = [0u8; 8];
    assert_eq!(RangeReader::read(&mut reader, &mut buf).unwrap(), 0);
}

#[test]
fn a_naive_single_request_falls_short_where_the_reader_does_not() {
    let body = blob(30_000);
    let cut = 16_384;
    let server =
        TestServer::serve_scripted(body.clone(), vec![Behavior::Truncate(cut)]);

    // One plain GET against the truncating server: the body never arrives
    // in full, whether the client notices the short read or not.
    let naive = reqwest::blocking::Client::builder()
        .timeout(None)
        .build()
        .unwrap();
    let mut out = Vec::new();
    let short = match naive.get(server.url()).send().unwrap().read_to_end(&mut out) {
        Ok(_) => out.len() < body.len(),
        Err(_) => true,
    };
    assert!(short, "naive read unexpectedly produced the full body");

    // The resuming reader against the same script delivers everything.
    let server =
        TestServer::serve_scripted(body.clone(), vec![Behavior::Truncate(cut)]);
    let mut reader = RangeReader::open(&server.url()).unwrap();
    assert_eq!(read_all(&mut reader), body);
}
