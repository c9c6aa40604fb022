//! Owns the outfit stream connection of one run and turns raw events into
//! orchestrator signals.

use std::time::Duration;

use async_trait::async_trait;
use shared::{
    domain::{OutfitItem, RunId, Stage},
    error::PipelineError,
    protocol::{StreamErrorPayload, COMPLETE_EVENT, ERROR_EVENT, OUTFIT_EVENT},
};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::{
    orchestrator::{CompletionKind, RunCompletion},
    sse::RawStreamEvent,
};

#[async_trait]
pub trait OutfitStream: Send {
    /// `None` once the transport has ended.
    async fn next_event(&mut self) -> Option<Result<RawStreamEvent, PipelineError>>;
    async fn close(&mut self);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamSignal {
    Outfit(OutfitItem),
    Error(String),
    Complete,
    DecodeFailure(String),
}

impl StreamSignal {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamSignal::Outfit(_))
    }
}

/// Unknown event names yield `None` and are skipped by the consumer.
pub fn decode_event(raw: &RawStreamEvent) -> Option<StreamSignal> {
    let signal = match raw.event.as_str() {
        name @ (OUTFIT_EVENT | ERROR_EVENT) if raw.invalid_utf8 => {
            StreamSignal::DecodeFailure(format!("malformed {name} event: invalid UTF-8"))
        }
        OUTFIT_EVENT => match serde_json::from_str::<OutfitItem>(&raw.data) {
            Ok(item) => StreamSignal::Outfit(item),
            Err(err) => StreamSignal::DecodeFailure(format!("malformed outfit event: {err}")),
        },
        ERROR_EVENT => match serde_json::from_str::<StreamErrorPayload>(&raw.data) {
            Ok(payload) => StreamSignal::Error(payload.message),
            Err(err) => StreamSignal::DecodeFailure(format!("malformed error event: {err}")),
        },
        COMPLETE_EVENT => StreamSignal::Complete,
        _ => return None,
    };
    Some(signal)
}

pub struct StreamConsumer {
    connection: Box<dyn OutfitStream>,
    idle_timeout: Duration,
    closed: bool,
}

impl StreamConsumer {
    pub fn new(connection: Box<dyn OutfitStream>, idle_timeout: Duration) -> Self {
        Self {
            connection,
            idle_timeout,
            closed: false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.connection.close().await;
    }

    /// Next decoded signal. Terminal outcomes close the connection before
    /// they are returned; after that this always yields `None`.
    pub async fn next_signal(&mut self) -> Option<Result<StreamSignal, PipelineError>> {
        if self.closed {
            return None;
        }

        loop {
            let next = tokio::time::timeout(self.idle_timeout, self.connection.next_event()).await;
            let outcome = match next {
                Err(_) => Err(PipelineError::timeout(Stage::StreamingOutfits)),
                Ok(None) => Err(PipelineError::transport(
                    "outfit stream ended before completion",
                )),
                Ok(Some(Err(err))) => Err(err),
                Ok(Some(Ok(raw))) => match decode_event(&raw) {
                    Some(signal) => Ok(signal),
                    None => {
                        debug!(event = %raw.event, "skipping unrecognized stream event");
                        continue;
                    }
                },
            };

            let terminal = outcome.as_ref().map_or(true, StreamSignal::is_terminal);
            if terminal {
                self.close().await;
            }
            return Some(outcome);
        }
    }

    /// Forwards signals for `run_id` until a terminal outcome or until
    /// `cancel` fires (or its sender is dropped).
    pub async fn run(
        mut self,
        run_id: RunId,
        sink: mpsc::UnboundedSender<RunCompletion>,
        mut cancel: oneshot::Receiver<()>,
    ) {
        loop {
            let next = tokio::select! {
                biased;
                _ = &mut cancel => None,
                next = self.next_signal() => Some(next),
            };

            let Some(next) = next else {
                debug!(run_id = run_id.0, "outfit stream cancelled");
                self.close().await;
                return;
            };
            let Some(outcome) = next else {
                return;
            };

            let (kind, terminal) = match outcome {
                Ok(signal) => {
                    let terminal = signal.is_terminal();
                    (CompletionKind::Stream(signal), terminal)
                }
                Err(err) => {
                    warn!(run_id = run_id.0, error = %err, "outfit stream broke");
                    (CompletionKind::StreamBroken(err), true)
                }
            };
            if sink.send(RunCompletion { run_id, kind }).is_err() {
                self.close().await;
                return;
            }
            if terminal {
                return;
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/stream_consumer_tests.rs"]
mod tests;
