//! Streaming bzip2 line reader
//!
//! Feed dumps are bzip2-compressed newline-delimited JSON, often several
//! hundred megabytes once expanded. [`FeedLines`] decompresses and splits
//! them incrementally so only the current line is ever held in memory.

use crate::error::{FeedError, Result};
use bzip2::bufread::MultiBzDecoder;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;

enum State<R: Read> {
    /// Source not touched yet; a zero-byte source is an empty feed.
    Pending(BufReader<R>),
    Reading(BufReader<MultiBzDecoder<BufReader<R>>>),
    Done,
}

/// Lazy, single-pass iterator over the decoded lines of a bzip2 stream.
///
/// Each item is one line with its terminator removed. `\n`, `\r\n` and a
/// lone `\r` all end a line. A decompression or UTF-8 failure is yielded once
/// as an error, after which the iterator is exhausted. Dropping the iterator
/// releases the underlying source.
pub struct FeedLines<R: Read> {
    state: State<R>,
    buf: Vec<u8>,
    line_number: u64,
    /// Previous line ended in `\r`; a leading `\n` belongs to it.
    skip_lf: bool,
}

impl FeedLines<File> {
    /// Open a `.bz2` file on disk
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self::new(file))
    }
}

impl<R: Read> FeedLines<R> {
    pub fn new(source: R) -> Self {
        FeedLines {
            state: State::Pending(BufReader::new(source)),
            buf: Vec::new(),
            line_number: 0,
            skip_lf: false,
        }
    }

    /// Number of lines yielded so far
    pub fn line_number(&self) -> u64 {
        self.line_number
    }

    fn decode_line(&mut self) -> Result<String> {
        self.line_number += 1;

        let bytes = std::mem::take(&mut self.buf);
        String::from_utf8(bytes).map_err(|_| FeedError::InvalidUtf8 {
            line: self.line_number,
        })
    }
}

impl<R: Read> Iterator for FeedLines<R> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match std::mem::replace(&mut self.state, State::Done) {
                State::Done => return None,
                State::Pending(mut source) => {
                    let empty = match source.fill_buf() {
                        Ok(bytes) => bytes.is_empty(),
                        Err(e) => return Some(Err(FeedError::Decompress(e))),
                    };
                    if empty {
                        return None;
                    }
                    self.state = State::Reading(BufReader::new(MultiBzDecoder::new(source)));
                }
                State::Reading(mut lines) => {
                    self.buf.clear();
                    return match read_line(&mut lines, &mut self.buf, &mut self.skip_lf) {
                        Ok(false) => None,
                        Ok(true) => {
                            let line = self.decode_line();
                            if line.is_ok() {
                                self.state = State::Reading(lines);
                            }
                            Some(line)
                        }
                        Err(e) => Some(Err(FeedError::Decompress(e))),
                    };
                }
            }
        }
    }
}

/// Append the next line of `reader` to `buf`, without its terminator.
///
/// Returns `false` at end of input when no line was started.
fn read_line<B: BufRead>(reader: &mut B, buf: &mut Vec<u8>, skip_lf: &mut bool) -> io::Result<bool> {
    let mut started = false;
    loop {
        let (used, done) = {
            let available = match reader.fill_buf() {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            if available.is_empty() {
                return Ok(started);
            }

            let mut start = 0;
            if std::mem::take(skip_lf) && available[0] == b'\n' {
                start = 1;
            }

            let rest = &available[start..];
            match rest.iter().position(|&b| b == b'\n' || b == b'\r') {
                Some(i) => {
                    buf.extend_from_slice(&rest[..i]);
                    *skip_lf = rest[i] == b'\r';
                    (start + i + 1, true)
                }
                None => {
                    buf.extend_from_slice(rest);
                    started |= !rest.is_empty();
                    (available.len(), false)
                }
            }
        };

        reader.consume(used);
        if done {
            return Ok(true);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use bzip2::write::BzEncoder;
    use bzip2::Compression;
    use std::cell::Cell;
    use std::io::Write;
    use std::rc::Rc;

    pub(crate) fn bz2(data: &[u8]) -> Vec<u8> {
        let mut encoder = BzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn read_all(compressed: Vec<u8>) -> Vec<String> {
        FeedLines::new(compressed.as_slice())
            .collect::<Result<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn test_splits_lines() {
        let lines = read_all(bz2(b"{\"op\":\"mcm\"}\n\n{\"op\":\"heartbeat\"}\n"));
        assert_eq!(lines, vec!["{\"op\":\"mcm\"}", "", "{\"op\":\"heartbeat\"}"]);
    }

    #[test]
    fn test_final_line_without_newline() {
        let lines = read_all(bz2(b"first\nsecond"));
        assert_eq!(lines, vec!["first", "second"]);
    }

    #[test]
    fn test_strips_crlf() {
        let lines = read_all(bz2(b"a\r\nb\r\n"));
        assert_eq!(lines, vec!["a", "b"]);
    }

    #[test]
    fn test_lone_carriage_return_ends_a_line() {
        assert_eq!(read_all(bz2(b"a\rb\r\nc")), vec!["a", "b", "c"]);
        assert_eq!(read_all(bz2(b"a\r")), vec!["a"]);
        assert_eq!(read_all(bz2(b"\r\r\n\n")), vec!["", "", ""]);
    }

    #[test]
    fn test_crlf_split_across_reads() {
        // \r closes the first stream, \n opens the second
        let mut data = bz2(b"a\r");
        data.extend(bz2(b"\nb\n"));
        assert_eq!(read_all(data), vec!["a", "b"]);

        let mut source = BufReader::with_capacity(1, &b"x\r\ny"[..]);
        let mut buf = Vec::new();
        let mut skip_lf = false;
        let mut lines = Vec::new();
        while read_line(&mut source, &mut buf, &mut skip_lf).unwrap() {
            lines.push(String::from_utf8(std::mem::take(&mut buf)).unwrap());
        }
        assert_eq!(lines, vec!["x", "y"]);
    }

    #[test]
    fn test_empty_stream_has_no_lines() {
        assert!(read_all(bz2(b"")).is_empty());
    }

    #[test]
    fn test_zero_byte_source_has_no_lines() {
        assert!(read_all(Vec::new()).is_empty());
    }

    #[test]
    fn test_multi_stream() {
        let mut data = bz2(b"one\n");
        data.extend(bz2(b"two\n"));
        assert_eq!(read_all(data), vec!["one", "two"]);
    }

    #[test]
    fn test_line_number_tracks_yielded_lines() {
        let data = bz2(b"a\nb\nc\n");
        let mut lines = FeedLines::new(data.as_slice());
        lines.next().unwrap().unwrap();
        lines.next().unwrap().unwrap();
        assert_eq!(lines.line_number(), 2);
    }

    #[test]
    fn test_not_bzip2_is_fatal() {
        let mut lines = FeedLines::new(&b"definitely not bzip2 data"[..]);
        assert!(matches!(lines.next(), Some(Err(FeedError::Decompress(_)))));
        assert!(lines.next().is_none());
    }

    #[test]
    fn test_truncated_stream_is_fatal() {
        let payload = "{\"op\":\"mcm\",\"pt\":1}\n".repeat(2000);
        let mut data = bz2(payload.as_bytes());
        data.truncate(data.len() / 2);

        let results: Vec<_> = FeedLines::new(data.as_slice()).collect();
        assert!(matches!(results.last(), Some(Err(FeedError::Decompress(_)))));
        assert_eq!(results.iter().filter(|r| r.is_err()).count(), 1);
    }

    #[test]
    fn test_invalid_utf8_reports_line() {
        let data = bz2(b"ok\n\xff\xfe\nnever\n");
        let mut lines = FeedLines::new(data.as_slice());
        assert_eq!(lines.next().unwrap().unwrap(), "ok");
        assert!(matches!(lines.next(), Some(Err(FeedError::InvalidUtf8 { line: 2 }))));
        assert!(lines.next().is_none());
    }

    struct DropFlag<R> {
        inner: R,
        dropped: Rc<Cell<bool>>,
    }

    impl<R: Read> Read for DropFlag<R> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.inner.read(buf)
        }
    }

    impl<R> Drop for DropFlag<R> {
        fn drop(&mut self) {
            self.dropped.set(true);
        }
    }

    #[test]
    fn test_drop_releases_source_early() {
        let data = bz2("{\"op\":\"mcm\"}\n".repeat(500).as_bytes());
        let dropped = Rc::new(Cell::new(false));
        let source = DropFlag {
            inner: data.as_slice(),
            dropped: Rc::clone(&dropped),
        };

        let mut lines = FeedLines::new(source);
        assert_eq!(lines.next().unwrap().unwrap(), "{\"op\":\"mcm\"}");
        assert!(!dropped.get());

        drop(lines);
        assert!(dropped.get());
    }

    #[test]
    fn test_open_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&bz2(b"line\n")).unwrap();
        file.flush().unwrap();

        let lines: Vec<_> = FeedLines::open(file.path())
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(lines, vec!["line"]);
    }
}
