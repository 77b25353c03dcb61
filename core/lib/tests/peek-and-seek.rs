//! Peeks never move the offset; seeks land exactly where they claim.

use std::io::{Read, SeekFrom};

use hstream::{Mode, Stream};

fn fixture(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 256) as u8).collect()
}

fn file_stream(data: &[u8], dir: &tempfile::TempDir) -> Stream {
    let path = dir.path().join("fixture.bin");
    std::fs::write(&path, data).unwrap();
    Stream::open(path.to_str().unwrap(), Mode::Read).unwrap()
}

#[test]
fn peeking_preserves_the_offset() {
    let original = fixture(30_000);
    let dir = tempfile::tempdir().unwrap();
    let mut stream = file_stream(&original, &dir);

    let mut head = [0u8; 200];
    stream.read_exact(&mut head).unwrap();
    assert_eq!(head[..], original[..200]);
    assert_eq!(stream.tell(), 200);

    let mut peeked = [0u8; 700];
    let k = stream.peek(&mut peeked).unwrap();
    assert!(k > 0);
    assert_eq!(stream.tell(), 200, "peek moved the offset");
    assert_eq!(peeked[..k], original[200..200 + k]);

    // The peeked bytes are a prefix of what a read delivers next.
    let mut read = [0u8; 800];
    stream.read_exact(&mut read).unwrap();
    assert_eq!(read[..], original[200..1000]);
    assert_eq!(stream.tell(), 1000);
}

#[test]
fn seek_skip_and_reread() {
    let original = fixture(30_000);
    let dir = tempfile::tempdir().unwrap();
    let mut stream = file_stream(&original, &dir);

    let mut head = [0u8; 200];
    stream.read_exact(&mut head).unwrap();

    assert_eq!(stream.seek(SeekFrom::Current(800)).unwrap(), 1000);

    let mut rest = Vec::new();
    stream.read_to_end(&mut rest).unwrap();
    assert_eq!(rest, original[1000..]);

    // Back to 200; the re-read must produce the original positions
    // 200..1000.
    assert_eq!(stream.seek(SeekFrom::Start(200)).unwrap(), 200);
    assert_eq!(stream.tell(), 200);

    let mut again = [0u8; 800];
    stream.read_exact(&mut again).unwrap();
    assert_eq!(again[..], original[200..1000]);
}

#[test]
fn seek_from_end_on_a_file() {
    let original = fixture(4_096);
    let dir = tempfile::tempdir().unwrap();
    let mut stream = file_stream(&original, &dir);

    assert_eq!(stream.seek(SeekFrom::End(-96)).unwrap(), 4_000);
    let mut tail = Vec::new();
    stream.read_to_end(&mut tail).unwrap();
    assert_eq!(tail, original[4_000..]);
}

#[test]
fn a_tiny_buffer_changes_nothing() {
    let original = fixture(5_000);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fixture.bin");
    std::fs::write(&path, &original).unwrap();

    let mut stream =
        Stream::with_capacity(64, path.to_str().unwrap(), Mode::Read).unwrap();

    let mut head = [0u8; 200];
    stream.read_exact(&mut head).unwrap();
    assert_eq!(stream.tell(), 200);

    // The look-ahead is capped by the buffer, not wrong.
    let mut peeked = [0u8; 700];
    let k = stream.peek(&mut peeked).unwrap();
    assert_eq!(k, 64);
    assert_eq!(stream.tell(), 200);
    assert_eq!(peeked[..k], original[200..264]);

    let mut read = [0u8; 800];
    stream.read_exact(&mut read).unwrap();
    assert_eq!(read[..], original[200..1000]);
}
