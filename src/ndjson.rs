//! Newline-delimited JSON processing for streaming responses.
//!
//! The backend streams one JSON object per line. Lines may be split across
//! network chunks at any byte, including inside a multi-byte character, so raw
//! bytes are buffered until a newline arrives and only complete lines are decoded.

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use tracing::debug;

use crate::observability::{STREAM_BYTES, STREAM_MALFORMED_LINES, STREAM_RECORDS};
use crate::{Result, StreamRecord};

/// Process a stream of bytes into a stream of decoded records.
///
/// Lines that are not valid JSON are skipped. Well-formed objects that are not
/// chunks decode to [`StreamRecord::Other`]. An error from the byte stream is
/// yielded once and ends the stream.
pub fn decode_lines<S>(stream: S) -> impl Stream<Item = Result<StreamRecord>> + Send
where
    S: Stream<Item = Result<Bytes>> + Unpin + Send + 'static,
{
    stream::unfold(
        (stream, Vec::<u8>::new(), false),
        |(mut stream, mut buffer, done)| async move {
            if done {
                return None;
            }
            loop {
                if let Some(line) = take_line(&mut buffer) {
                    if let Some(record) = decode_line(&line) {
                        return Some((Ok(record), (stream, buffer, false)));
                    }
                    continue;
                }

                match stream.next().await {
                    Some(Ok(bytes)) => {
                        STREAM_BYTES.count(bytes.len() as u64);
                        buffer.extend_from_slice(&bytes);
                    }
                    Some(Err(e)) => {
                        return Some((Err(e), (stream, Vec::new(), true)));
                    }
                    None => {
                        // A final line without a trailing newline still counts.
                        let rest = std::mem::take(&mut buffer);
                        return decode_line(&rest).map(|record| (Ok(record), (stream, buffer, true)));
                    }
                }
            }
        },
    )
}

/// Remove and return the first complete line in `buffer`, without its newline.
fn take_line(buffer: &mut Vec<u8>) -> Option<Vec<u8>> {
    let newline = buffer.iter().position(|b| *b == b'\n')?;
    let mut line: Vec<u8> = buffer.drain(..=newline).collect();
    line.pop();
    Some(line)
}

/// Decode one line. Blank and malformed lines yield `None`.
fn decode_line(line: &[u8]) -> Option<StreamRecord> {
    let text = String::from_utf8_lossy(line);
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(value) => {
            STREAM_RECORDS.click();
            Some(serde_json::from_value::<StreamRecord>(value).unwrap_or(StreamRecord::Other))
        }
        Err(err) => {
            STREAM_MALFORMED_LINES.click();
            debug!("skipping malformed stream line: {err}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks(parts: &[&[u8]]) -> impl Stream<Item = Result<Bytes>> + Unpin + Send + use<> {
        let parts: Vec<_> = parts
            .iter()
            .map(|p| Ok(Bytes::copy_from_slice(p)))
            .collect();
        stream::iter(parts)
    }

    async fn collect(parts: &[&[u8]]) -> Vec<StreamRecord> {
        decode_lines(chunks(parts))
            .map(|r| r.unwrap())
            .collect()
            .await
    }

    #[tokio::test]
    async fn parse_single_chunk() {
        let records = collect(&[b"{\"type\":\"chunk\",\"content\":\"Halo\"}\n"]).await;
        assert_eq!(records, vec![StreamRecord::chunk("Halo")]);
    }

    #[tokio::test]
    async fn handle_line_split_across_chunks() {
        let records = collect(&[
            b"{\"type\":\"chu",
            b"nk\",\"content\":\"a\"}\n{\"type\":\"chunk\",",
            b"\"content\":\"b\"}\n",
        ])
        .await;
        assert_eq!(
            records,
            vec![StreamRecord::chunk("a"), StreamRecord::chunk("b")]
        );
    }

    #[tokio::test]
    async fn handle_multibyte_character_split_across_chunks() {
        let line = "{\"type\":\"chunk\",\"content\":\"héllo 🔢\"}\n".as_bytes();
        let split = line.iter().position(|b| *b == 0xC3).unwrap() + 1;
        let records = collect(&[&line[..split], &line[split..]]).await;
        assert_eq!(records, vec![StreamRecord::chunk("héllo 🔢")]);
    }

    #[tokio::test]
    async fn skip_malformed_lines() {
        let records = collect(&[
            b"not json\n{\"type\":\"chunk\",\"content\":\"ok\"}\n{broken\n\n",
        ])
        .await;
        assert_eq!(records, vec![StreamRecord::chunk("ok")]);
    }

    #[tokio::test]
    async fn other_records_pass_through() {
        let records = collect(&[b"{\"type\":\"done\"}\n{\"no_type\":true}\n"]).await;
        assert_eq!(records, vec![StreamRecord::Other, StreamRecord::Other]);
    }

    #[tokio::test]
    async fn final_line_without_newline() {
        let records = collect(&[b"{\"type\":\"chunk\",\"content\":\"end\"}"]).await;
        assert_eq!(records, vec![StreamRecord::chunk("end")]);
    }

    #[tokio::test]
    async fn byte_stream_error_ends_decoding() {
        let parts: Vec<Result<Bytes>> = vec![
            Ok(Bytes::from_static(b"{\"type\":\"chunk\",\"content\":\"a\"}\n")),
            Err(crate::Error::streaming("connection reset", None)),
            Ok(Bytes::from_static(b"{\"type\":\"chunk\",\"content\":\"b\"}\n")),
        ];
        let records: Vec<Result<StreamRecord>> =
            decode_lines(stream::iter(parts)).collect().await;
        assert_eq!(records.len(), 2);
        assert_eq!(*records[0].as_ref().unwrap(), StreamRecord::chunk("a"));
        assert!(records[1].is_err());
    }

    #[tokio::test]
    async fn empty_stream() {
        assert!(collect(&[]).await.is_empty());
    }
}
