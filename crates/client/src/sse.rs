//! Event-stream line handling.
//!
//! The server pushes one payload per `data:` line. The first payload that
//! looks like a path or URL announces the RPC endpoint; later payloads are
//! JSON-RPC frames. This module turns a chunked HTTP body into lines and
//! classifies each line.

use futures_util::{Stream, StreamExt};
use serde_json::Value;

use sk_domain::error::{Error, Result};
use sk_domain::stream::LineStream;

use crate::endpoint::looks_like_candidate;
use crate::protocol::Frame;

const DATA_PREFIX: &str = "data:";

/// What one line of the stream means to the session.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Raw, not yet validated, endpoint announcement.
    EndpointCandidate(String),
    RpcFrame(Frame),
    /// Blank, non-data, or unrecognised line.
    Ignore,
}

/// Strip the `data:` prefix and surrounding whitespace.
pub fn data_payload(line: &str) -> Option<&str> {
    line.trim().strip_prefix(DATA_PREFIX).map(str::trim)
}

/// Classify one stream line.
///
/// Candidate detection is only active while `awaiting_endpoint` is set, so
/// at most one announcement per stream is honoured. Payloads that look like
/// JSON but fail to parse as an object are a [`Error::Protocol`]; callers log
/// and drop them.
pub fn parse_line(line: &str, awaiting_endpoint: bool) -> Result<StreamEvent> {
    let data = match data_payload(line) {
        Some(d) if !d.is_empty() => d,
        _ => return Ok(StreamEvent::Ignore),
    };

    if awaiting_endpoint && looks_like_candidate(data) {
        return Ok(StreamEvent::EndpointCandidate(data.to_string()));
    }

    if !(data.starts_with('{') || data.contains("jsonrpc")) {
        return Ok(StreamEvent::Ignore);
    }

    match serde_json::from_str::<Value>(data) {
        Ok(Value::Object(frame)) => Ok(StreamEvent::RpcFrame(frame)),
        Ok(other) => Err(Error::Protocol(format!(
            "frame is not a JSON object: {other}"
        ))),
        Err(e) => Err(Error::Protocol(format!("malformed frame: {e}"))),
    }
}

/// Pull complete lines out of `buffer`, leaving any trailing partial line.
///
/// Accepts both `\n` and `\r\n` terminators. Empty lines are kept; they are
/// event separators on the wire and classify as [`StreamEvent::Ignore`].
/// Bytes are only decoded once a whole line is present, so a multibyte
/// character split across chunks survives intact.
pub(crate) fn drain_lines(buffer: &mut Vec<u8>) -> Vec<String> {
    let mut lines = Vec::new();

    while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
        let mut line: Vec<u8> = buffer.drain(..=pos).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        lines.push(String::from_utf8_lossy(&line).into_owned());
    }

    lines
}

/// Turn a stream of body chunks into a [`LineStream`].
///
/// A transport error ends the stream after yielding it; a clean EOF flushes
/// any unterminated final line.
pub(crate) fn decode_lines<S, B, E>(chunks: S) -> LineStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: std::fmt::Display + Send,
{
    let stream = async_stream::stream! {
        let mut chunks = Box::pin(chunks);
        let mut buffer: Vec<u8> = Vec::new();

        while let Some(chunk) = chunks.next().await {
            match chunk {
                Ok(bytes) => {
                    buffer.extend_from_slice(bytes.as_ref());
                    for line in drain_lines(&mut buffer) {
                        yield Ok(line);
                    }
                }
                Err(e) => {
                    yield Err(Error::Connection(format!("event stream error: {e}")));
                    return;
                }
            }
        }

        if !buffer.is_empty() {
            yield Ok(String::from_utf8_lossy(&buffer).into_owned());
        }
    };

    Box::pin(stream)
}

/// Line stream over a streaming `reqwest::Response` body.
pub(crate) fn line_stream(response: reqwest::Response) -> LineStream {
    decode_lines(response.bytes_stream())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_complete_lines() {
        let mut buf = b"data: /rpc/1\ndata: {}\n".to_vec();
        assert_eq!(drain_lines(&mut buf), vec!["data: /rpc/1", "data: {}"]);
        assert!(buf.is_empty());
    }

    #[test]
    fn drain_keeps_partial_line() {
        let mut buf = b"data: complete\ndata: part".to_vec();
        assert_eq!(drain_lines(&mut buf), vec!["data: complete"]);
        assert_eq!(buf, b"data: part");

        buf.extend_from_slice(b"ial\n\n");
        assert_eq!(drain_lines(&mut buf), vec!["data: partial", ""]);
        assert!(buf.is_empty());
    }

    #[test]
    fn drain_strips_crlf() {
        let mut buf = b"event: endpoint\r\ndata: /rpc\r\n".to_vec();
        assert_eq!(drain_lines(&mut buf), vec!["event: endpoint", "data: /rpc"]);
    }

    fn chunked(parts: Vec<Vec<u8>>) -> LineStream {
        decode_lines(futures_util::stream::iter(
            parts.into_iter().map(Ok::<_, std::io::Error>),
        ))
    }

    #[tokio::test]
    async fn multibyte_char_split_across_chunks() {
        let line = r#"data: {"jsonrpc":"2.0","id":1,"result":{"content":[{"type":"text","text":"한국어 문서"}]}}"#;
        let bytes = format!("{line}\n").into_bytes();
        // Split inside the three-byte encoding of the first Hangul syllable.
        let split = line.find('한').unwrap() + 1;
        let parts = vec![bytes[..split].to_vec(), bytes[split..].to_vec()];

        let lines: Vec<String> = chunked(parts).map(|l| l.unwrap()).collect().await;
        assert_eq!(lines, vec![line.to_string()]);
    }

    #[tokio::test]
    async fn unterminated_tail_flushed_at_eof() {
        let parts = vec![b"data: /rpc/a\nda".to_vec(), b"ta: tail".to_vec()];
        let lines: Vec<String> = chunked(parts).map(|l| l.unwrap()).collect().await;
        assert_eq!(lines, vec!["data: /rpc/a", "data: tail"]);
    }

    #[tokio::test]
    async fn chunk_error_ends_stream() {
        let chunks = futures_util::stream::iter(vec![
            Ok(b"data: first\n".to_vec()),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
            Ok(b"data: never\n".to_vec()),
        ]);
        let items: Vec<_> = decode_lines(chunks).collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "data: first");
        assert!(matches!(items[1], Err(Error::Connection(_))));
    }

    #[test]
    fn payload_requires_prefix() {
        assert_eq!(data_payload("data:   /rpc/x  "), Some("/rpc/x"));
        assert_eq!(data_payload("data:"), Some(""));
        assert_eq!(data_payload("event: endpoint"), None);
        assert_eq!(data_payload(": keep-alive"), None);
    }

    #[test]
    fn candidate_only_while_awaiting() {
        assert_eq!(
            parse_line("data: /rpc/endpoint123", true).unwrap(),
            StreamEvent::EndpointCandidate("/rpc/endpoint123".into())
        );
        assert_eq!(
            parse_line("data: /rpc/endpoint123", false).unwrap(),
            StreamEvent::Ignore
        );
    }

    #[test]
    fn absolute_candidate() {
        assert_eq!(
            parse_line("data: https://api.example.com/rpc", true).unwrap(),
            StreamEvent::EndpointCandidate("https://api.example.com/rpc".into())
        );
    }

    #[test]
    fn frame_parses_to_object() {
        match parse_line(r#"data: {"jsonrpc":"2.0","id":1,"result":{}}"#, false).unwrap() {
            StreamEvent::RpcFrame(frame) => assert_eq!(frame["id"], 1),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn frame_accepted_before_endpoint() {
        assert!(matches!(
            parse_line(r#"data: {"jsonrpc":"2.0","method":"ping"}"#, true).unwrap(),
            StreamEvent::RpcFrame(_)
        ));
    }

    #[test]
    fn blank_and_foreign_lines_ignored() {
        assert_eq!(parse_line("", false).unwrap(), StreamEvent::Ignore);
        assert_eq!(parse_line("data: ", true).unwrap(), StreamEvent::Ignore);
        assert_eq!(parse_line("event: message", false).unwrap(), StreamEvent::Ignore);
        assert_eq!(parse_line("data: ping", false).unwrap(), StreamEvent::Ignore);
    }

    #[test]
    fn malformed_json_is_protocol_error() {
        assert!(matches!(
            parse_line(r#"data: {"jsonrpc": "2.0", "id": "#, false),
            Err(Error::Protocol(_))
        ));
        assert!(matches!(
            parse_line(r#"data: ["jsonrpc"]"#, false),
            Err(Error::Protocol(_))
        ));
    }
}
