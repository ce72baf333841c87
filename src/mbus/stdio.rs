//! Length-prefixed JSON bus over a byte stream (stdin/stdout by default).
//!
//! One reader task pulls request frames and hands them to the registered
//! callback in arrival order. Responses and heartbeats share one writer,
//! mutex-guarded so frames never interleave.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{recv_message, send_message, Handler, Heartbeat, Request, RequestCallback, Response};

/// Outbound frame envelope.
#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Outbound<'a> {
    Response {
        reply_to: &'a str,
        response: &'a Response,
    },
    Heartbeat(&'a Heartbeat),
}

/// Bus handler speaking framed JSON over an arbitrary reader/writer pair.
pub struct FramedHandler<R, W> {
    reader: std::sync::Mutex<Option<R>>,
    writer: Arc<Mutex<W>>,
    closed: Arc<watch::Sender<bool>>,
    reader_task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

/// The production bus: requests on stdin, responses and heartbeats on stdout.
pub type StdioHandler = FramedHandler<tokio::io::Stdin, tokio::io::Stdout>;

impl StdioHandler {
    pub fn stdio() -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stdout())
    }
}

impl<R, W> FramedHandler<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(reader: R, writer: W) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            reader: std::sync::Mutex::new(Some(reader)),
            writer: Arc::new(Mutex::new(writer)),
            closed: Arc::new(closed),
            reader_task: std::sync::Mutex::new(None),
        }
    }

    /// Resolves once the inbound stream has ended or the handler was stopped.
    pub async fn closed(&self) {
        let mut rx = self.closed.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }
}

async fn write_frame<W>(writer: &Mutex<W>, frame: &Outbound<'_>) -> Result<()>
where
    W: AsyncWrite + Unpin + Send,
{
    let bytes = serde_json::to_vec(frame).context("Failed to serialize outbound frame")?;
    let mut writer = writer.lock().await;
    send_message(&mut *writer, &bytes)
        .await
        .context("Failed to write outbound frame")
}

fn is_eof(err: &anyhow::Error) -> bool {
    err.downcast_ref::<std::io::Error>()
        .is_some_and(|e| e.kind() == std::io::ErrorKind::UnexpectedEof)
}

#[async_trait]
impl<R, W> Handler for FramedHandler<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    fn start(&self, callback: Arc<dyn RequestCallback>) -> Result<()> {
        let mut reader = self
            .reader
            .lock()
            .map_err(|_| anyhow::anyhow!("Bus reader lock poisoned"))?
            .take()
            .context("Bus handler already started")?;
        let writer = Arc::clone(&self.writer);
        let closed = Arc::clone(&self.closed);

        let task = tokio::spawn(async move {
            loop {
                let frame = match recv_message(&mut reader).await {
                    Ok(frame) => frame,
                    Err(e) if is_eof(&e) => {
                        info!("Bus input closed");
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to read request frame, closing bus");
                        break;
                    }
                };

                let req = match Request::from_slice(&frame) {
                    Ok(req) => req,
                    Err(e) => {
                        warn!(error = %e, "Dropping malformed request");
                        continue;
                    }
                };

                debug!(method = %req.method, reply_to = %req.reply_to, "Received request");
                let reply_to = req.reply_to.clone();
                let response = callback.handle(req).await;

                let frame = Outbound::Response {
                    reply_to: &reply_to,
                    response: &response,
                };
                if let Err(e) = write_frame(&writer, &frame).await {
                    warn!(error = %e, "Failed to send response, closing bus");
                    break;
                }
            }
            closed.send_replace(true);
        });

        let mut slot = match self.reader_task.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *slot = Some(task);
        Ok(())
    }

    fn stop(&self) {
        let task = match self.reader_task.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(task) = task {
            task.abort();
            debug!("Bus reader stopped");
        }
        self.closed.send_replace(true);
    }

    async fn send_heartbeat(&self, heartbeat: Heartbeat) -> Result<()> {
        write_frame(&self.writer, &Outbound::Heartbeat(&heartbeat)).await
    }
}
