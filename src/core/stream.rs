//! Line-delimited JSON in and out
//!
//! Input is framed on raw newline-delimited bytes; each non-empty line is
//! decoded and parsed on its own. Lines that are not UTF-8, exceed the length
//! cap or fail to parse are counted and dropped without ending the stream.
//! Output records are written one per line.

use std::sync::atomic::{AtomicU64, Ordering};

use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio_util::codec::{AnyDelimiterCodec, AnyDelimiterCodecError, Decoder, FramedRead};

use catchment_common::Result;

/// Counts input lines that could not be used
#[derive(Debug, Default)]
pub struct MalformedCounter(AtomicU64);

impl MalformedCounter {
    pub fn record(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Parse one input line, `None` for blank lines
pub fn parse_line<T: DeserializeOwned>(line: &str) -> Option<serde_json::Result<T>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    Some(serde_json::from_str(line))
}

/// Longest accepted input line in bytes
pub const MAX_LINE_LENGTH: usize = 64 * 1024 * 1024;

/// A framed input line
#[derive(Debug, Clone, PartialEq)]
pub enum RawLine {
    Line(Bytes),
    /// A line longer than the cap; its bytes were discarded
    Oversized,
}

/// Newline framing that survives oversized lines
///
/// `FramedRead` ends the stream after any decoder error, so an overlong line
/// is reported as an item and the inner codec skips to the next newline.
#[derive(Debug, Clone)]
pub struct NdjsonCodec {
    inner: AnyDelimiterCodec,
}

impl NdjsonCodec {
    pub fn new(max_length: usize) -> Self {
        Self {
            inner: AnyDelimiterCodec::new_with_max_length(b"\n".to_vec(), b"\n".to_vec(), max_length),
        }
    }

    fn framed(
        result: std::result::Result<Option<Bytes>, AnyDelimiterCodecError>,
    ) -> std::result::Result<Option<RawLine>, AnyDelimiterCodecError> {
        match result {
            Ok(line) => Ok(line.map(RawLine::Line)),
            Err(AnyDelimiterCodecError::MaxChunkLengthExceeded) => Ok(Some(RawLine::Oversized)),
            Err(e) => Err(e),
        }
    }
}

impl Default for NdjsonCodec {
    fn default() -> Self {
        Self::new(MAX_LINE_LENGTH)
    }
}

impl Decoder for NdjsonCodec {
    type Item = RawLine;
    type Error = AnyDelimiterCodecError;

    fn decode(&mut self, buf: &mut BytesMut) -> std::result::Result<Option<RawLine>, Self::Error> {
        Self::framed(self.inner.decode(buf))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> std::result::Result<Option<RawLine>, Self::Error> {
        Self::framed(self.inner.decode_eof(buf))
    }
}

fn parse_raw<T: DeserializeOwned>(line: RawLine, max_length: usize, malformed: &MalformedCounter) -> Option<T> {
    let bytes = match line {
        RawLine::Line(bytes) => bytes,
        RawLine::Oversized => {
            warn!("Skipping line longer than {max_length} bytes");
            malformed.record();
            return None;
        }
    };
    let text = match std::str::from_utf8(&bytes) {
        Ok(text) => text,
        Err(e) => {
            debug!("Skipping line that is not UTF-8: {e}");
            malformed.record();
            return None;
        }
    };
    match parse_line::<T>(text)? {
        Ok(record) => Some(record),
        Err(e) => {
            debug!("Skipping malformed line: {e}");
            malformed.record();
            None
        }
    }
}

/// Records of type `T` read from `reader`, skipping blank and malformed lines
pub fn records<'a, T, R>(reader: R, malformed: &'a MalformedCounter) -> impl Stream<Item = T> + 'a
where
    T: DeserializeOwned + 'a,
    R: AsyncRead + Unpin + 'a,
{
    records_with_max_length(reader, MAX_LINE_LENGTH, malformed)
}

/// As [`records`], with a custom line length cap
pub fn records_with_max_length<'a, T, R>(
    reader: R,
    max_length: usize,
    malformed: &'a MalformedCounter,
) -> impl Stream<Item = T> + 'a
where
    T: DeserializeOwned + 'a,
    R: AsyncRead + Unpin + 'a,
{
    FramedRead::new(reader, NdjsonCodec::new(max_length)).filter_map(move |line| {
        let record = match line {
            Ok(line) => parse_raw(line, max_length, malformed),
            Err(e) => {
                warn!("Unreadable input: {e}");
                malformed.record();
                None
            }
        };
        futures::future::ready(record)
    })
}

/// Collect every record of a reader
pub async fn read_all<T, R>(reader: R) -> (Vec<T>, u64)
where
    T: DeserializeOwned,
    R: AsyncRead + Unpin,
{
    let malformed = MalformedCounter::default();
    let all = records(reader, &malformed).collect::<Vec<T>>().await;
    (all, malformed.get())
}

/// Buffered NDJSON writer
pub struct RecordWriter<W: AsyncWrite + Unpin> {
    inner: BufWriter<W>,
}

impl<W: AsyncWrite + Unpin> RecordWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            inner: BufWriter::new(writer),
        }
    }

    pub async fn write<T: Serialize>(&mut self, record: &T) -> Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        self.inner.write_all(&line).await?;
        Ok(())
    }

    pub async fn flush(&mut self) -> Result<()> {
        self.inner.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::records::OriginRecord;

    #[tokio::test]
    async fn test_blank_and_malformed_lines_are_skipped() {
        let reader = tokio_test::io::Builder::new()
            .read(b"{\"postcode\":\"1012AB\",\"origin\":{\"type\":\"Point\",\"coordinates\":[4.9,52.37]}}\n\n")
            .read(b"not json\n{\"postcode\":\"1013\"}\n")
            .read(b"{\"postcode\":\"1014CD\",\"origin\":{\"type\":\"Point\",\"coordinates\":[4.8,52.38]}}")
            .build();

        let (origins, malformed): (Vec<OriginRecord>, u64) = read_all(reader).await;
        assert_eq!(origins.len(), 2);
        assert_eq!(origins[1].postcode, "1014CD");
        assert_eq!(malformed, 2);
    }

    #[tokio::test]
    async fn test_invalid_utf8_line_does_not_end_input() {
        let reader = tokio_test::io::Builder::new()
            .read(b"{\"postcode\":\"1012AB\",\"origin\":{\"type\":\"Point\",\"coordinates\":[4.9,52.37]}}\n")
            .read(b"\xff\xfe garbage\n")
            .read(b"{\"postcode\":\"1013CD\",\"origin\":{\"type\":\"Point\",\"coordinates\":[4.8,52.38]}}\n")
            .read(b"{\"postcode\":\"1014EF\",\"origin\":{\"type\":\"Point\",\"coordinates\":[4.7,52.39]}}\n")
            .build();

        let (origins, malformed): (Vec<OriginRecord>, u64) = read_all(reader).await;
        assert_eq!(origins.len(), 3);
        assert_eq!(origins[2].postcode, "1014EF");
        assert_eq!(malformed, 1);
    }

    #[tokio::test]
    async fn test_oversized_line_is_skipped() {
        let long = format!("{{\"postcode\":\"{}\"}}\n", "9".repeat(200));
        let input = format!(
            "{}{}{}",
            "{\"postcode\":\"1012AB\",\"origin\":{\"type\":\"Point\",\"coordinates\":[4.9,52.37]}}\n",
            long,
            "{\"postcode\":\"1013CD\",\"origin\":{\"type\":\"Point\",\"coordinates\":[4.8,52.38]}}\n",
        );

        let malformed = MalformedCounter::default();
        let origins: Vec<OriginRecord> = records_with_max_length(input.as_bytes(), 128, &malformed)
            .collect()
            .await;
        assert_eq!(origins.len(), 2);
        assert_eq!(origins[1].postcode, "1013CD");
        assert_eq!(malformed.get(), 1);
    }

    #[tokio::test]
    async fn test_writer_emits_one_line_per_record() {
        let mut out = Vec::new();
        {
            let mut writer = RecordWriter::new(&mut out);
            writer.write(&serde_json::json!({"a": 1})).await.unwrap();
            writer.write(&serde_json::json!({"b": [1, 2]})).await.unwrap();
            writer.flush().await.unwrap();
        }
        assert_eq!(String::from_utf8(out).unwrap(), "{\"a\":1}\n{\"b\":[1,2]}\n");
    }
}
