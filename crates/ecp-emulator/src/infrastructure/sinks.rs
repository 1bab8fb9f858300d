//! Publication sinks: where control events leave the emulator.
//!
//! - [`JsonLinesSink`] writes one JSON object per event to any async writer.
//!   The binary points it at stdout so another process can consume the
//!   stream; logs go to stderr and never interleave with it.
//! - [`LogSink`] only records events through `tracing`.  Useful when running
//!   the emulator by hand.
//!
//! Each line carries the topic and the three event fields:
//!
//! ```json
//! {"topic":"roku_command","payload":{"sourceIdentity":"1A2B3C4D5E6F","eventType":"keypress","key":"Home"}}
//! ```

use async_trait::async_trait;
use ecp_core::ControlEvent;
use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::info;

use crate::application::dispatch::{EventSink, SinkError};

#[derive(Serialize)]
struct Envelope<'a> {
    topic: &'a str,
    payload: &'a ControlEvent,
}

/// Writes each event as a single JSON line.
pub struct JsonLinesSink<W> {
    writer: Mutex<W>,
}

impl<W> JsonLinesSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl JsonLinesSink<tokio::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }
}

#[async_trait]
impl<W> EventSink for JsonLinesSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn publish(&self, topic: &str, event: &ControlEvent) -> Result<(), SinkError> {
        let mut line = serde_json::to_vec(&Envelope {
            topic,
            payload: event,
        })?;
        line.push(b'\n');

        // One lock per line keeps concurrent forwarders from interleaving.
        let mut writer = self.writer.lock().await;
        writer.write_all(&line).await?;
        writer.flush().await?;
        Ok(())
    }
}

/// Records events in the log instead of publishing them.
#[derive(Debug, Default)]
pub struct LogSink;

#[async_trait]
impl EventSink for LogSink {
    async fn publish(&self, topic: &str, event: &ControlEvent) -> Result<(), SinkError> {
        info!(
            topic,
            source = %event.source_identity,
            event_type = %event.event_type,
            key = %event.key,
            "control event"
        );
        Ok(())
    }
}
