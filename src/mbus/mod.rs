//! Message bus boundary: requests in, responses and heartbeats out.
//!
//! Provides the `Handler` trait the agent registers with, the request and
//! response wire types, and length-prefixed JSON framing functions used by
//! the stdio handler.

pub mod heartbeat;
pub mod stdio;

pub use heartbeat::{Heartbeat, JobState, Vitals};
pub use stdio::{FramedHandler, StdioHandler};

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ActionError;

/// Largest frame body accepted in either direction (64 MiB).
const MAX_MESSAGE_SIZE: u32 = 64 * 1024 * 1024;

/// A command delivered by the bus.
///
/// The payload is the raw message body; actions parse their arguments out of
/// it themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub reply_to: String,
    pub method: String,
    payload: Vec<u8>,
}

#[derive(Deserialize)]
struct RequestHeader {
    #[serde(default)]
    reply_to: String,
    method: String,
}

#[derive(Deserialize)]
struct RequestArguments {
    #[serde(default)]
    arguments: Vec<Value>,
}

impl Request {
    pub fn new(reply_to: impl Into<String>, method: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            reply_to: reply_to.into(),
            method: method.into(),
            payload,
        }
    }

    /// Parse an inbound frame. The whole frame becomes the payload.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let header: RequestHeader =
            serde_json::from_slice(bytes).context("Failed to parse request header")?;
        Ok(Self {
            reply_to: header.reply_to,
            method: header.method,
            payload: bytes.to_vec(),
        })
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }
}

/// Extract the `arguments` array from a request payload.
///
/// A payload without an `arguments` key yields no arguments; a payload that
/// is not a JSON object is rejected.
pub fn parse_arguments(payload: &[u8]) -> Result<Vec<Value>, ActionError> {
    serde_json::from_slice::<RequestArguments>(payload)
        .map(|args| args.arguments)
        .map_err(|e| ActionError::InvalidArguments(e.to_string()))
}

/// Reply to a request: exactly one of a value or an exception.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Response {
    Value(Value),
    Exception(ExceptionBody),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionBody {
    pub message: String,
}

impl Response {
    /// Wrap any serializable value. Serialization failures become exceptions.
    pub fn value<T: Serialize>(value: T) -> Self {
        match serde_json::to_value(value) {
            Ok(value) => Self::Value(value),
            Err(e) => Self::exception(format!("Failed to serialize response value: {e}")),
        }
    }

    pub fn exception(message: impl Into<String>) -> Self {
        Self::Exception(ExceptionBody {
            message: message.into(),
        })
    }
}

impl From<ActionError> for Response {
    fn from(err: ActionError) -> Self {
        Self::exception(err.to_string())
    }
}

/// Receives requests from the bus and produces their responses.
#[async_trait]
pub trait RequestCallback: Send + Sync {
    async fn handle(&self, req: Request) -> Response;
}

/// Abstraction over the bus transport.
///
/// Implementations own the physical delivery of requests and replies; the
/// agent only registers its callback and pushes heartbeats.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Register the request callback and start delivering requests to it.
    ///
    /// Must not block: delivery continues on the handler's own task.
    fn start(&self, callback: Arc<dyn RequestCallback>) -> Result<()>;

    /// Stop delivering requests to the callback. Idempotent.
    fn stop(&self);

    /// Publish one heartbeat.
    async fn send_heartbeat(&self, heartbeat: Heartbeat) -> Result<()>;
}

/// Write one bus frame: a 4-byte big-endian body length, then the JSON body.
///
/// The writer is flushed so a heartbeat is not held back behind buffering.
pub async fn send_message<W: tokio::io::AsyncWriteExt + Unpin>(
    writer: &mut W,
    body: &[u8],
) -> Result<()> {
    let len = frame_len(body.len())?;

    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(body).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one bus frame and return its body.
///
/// EOF before the length prefix surfaces as an `UnexpectedEof` io error,
/// which the stdio handler treats as the bus closing.
pub async fn recv_message<R: tokio::io::AsyncReadExt + Unpin>(
    reader: &mut R,
) -> Result<Vec<u8>> {
    let mut prefix = [0u8; 4];
    reader.read_exact(&mut prefix).await?;
    let len = u32::from_be_bytes(prefix);
    anyhow::ensure!(
        len <= MAX_MESSAGE_SIZE,
        "Frame exceeds max size: {len} > {MAX_MESSAGE_SIZE}"
    );

    let mut body = vec![0u8; len as usize];
    reader.read_exact(&mut body).await?;
    Ok(body)
}

fn frame_len(body_len: usize) -> Result<u32> {
    u32::try_from(body_len)
        .ok()
        .filter(|len| *len <= MAX_MESSAGE_SIZE)
        .ok_or_else(|| anyhow::anyhow!("Frame exceeds max size: {body_len} > {MAX_MESSAGE_SIZE}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn framing_carries_payload() {
        let mut buf = Vec::new();
        send_message(&mut buf, br#"{"method":"ping"}"#).await.unwrap();
        assert_eq!(&buf[..4], &17u32.to_be_bytes());

        let mut cursor = std::io::Cursor::new(buf);
        let received = recv_message(&mut cursor).await.unwrap();
        assert_eq!(received, br#"{"method":"ping"}"#);
    }

    #[tokio::test]
    async fn oversized_length_prefix_is_rejected() {
        let mut buf = (MAX_MESSAGE_SIZE + 1).to_be_bytes().to_vec();
        buf.extend_from_slice(b"xx");
        let mut cursor = std::io::Cursor::new(buf);
        let err = recv_message(&mut cursor).await.unwrap_err();
        assert!(err.to_string().contains("exceeds max size"));
    }

    #[test]
    fn frame_len_limit() {
        assert_eq!(frame_len(17).unwrap(), 17);
        assert!(frame_len(MAX_MESSAGE_SIZE as usize + 1).is_err());
    }

    #[test]
    fn value_response_omits_exception() {
        let json = serde_json::to_string(&Response::value("some value")).unwrap();
        assert_eq!(json, r#"{"value":"some value"}"#);
    }

    #[test]
    fn exception_response_omits_value() {
        let json = serde_json::to_string(&Response::exception("some error")).unwrap();
        assert_eq!(json, r#"{"exception":{"message":"some error"}}"#);
    }

    #[test]
    fn action_error_becomes_exception() {
        let resp: Response = ActionError::UnknownMethod("gibberish".into()).into();
        let json = serde_json::to_string(&resp).unwrap();
        assert_eq!(json, r#"{"exception":{"message":"unknown message gibberish"}}"#);
    }

    #[test]
    fn request_from_frame_keeps_whole_payload() {
        let frame = br#"{"reply_to":"director.1","method":"get_task","arguments":["57"]}"#;
        let req = Request::from_slice(frame).unwrap();
        assert_eq!(req.reply_to, "director.1");
        assert_eq!(req.method, "get_task");
        assert_eq!(req.payload(), frame);
        assert_eq!(parse_arguments(req.payload()).unwrap(), vec![json!("57")]);
    }

    #[test]
    fn request_without_method_is_rejected() {
        assert!(Request::from_slice(br#"{"reply_to":"x"}"#).is_err());
    }

    #[test]
    fn arguments_default_to_empty() {
        assert!(parse_arguments(b"{}").unwrap().is_empty());
        assert!(matches!(
            parse_arguments(b"some payload"),
            Err(ActionError::InvalidArguments(_))
        ));
    }
}
