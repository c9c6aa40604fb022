use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::Stage;

const TRANSPORT_MESSAGE: &str =
    "Could not reach the style service; check your connection and try again.";
const DECODE_MESSAGE: &str = "Received a malformed update from the style service.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Transport,
    ServerRejection,
    StreamSemantic,
    Decode,
    Timeout,
    Cancelled,
}

/// Failure that ends a run. `detail` carries diagnostics for logs;
/// `user_message` is what the presentation layer shows.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind:?}: {detail}")]
pub struct PipelineError {
    pub kind: ErrorKind,
    pub detail: String,
}

impl PipelineError {
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn transport(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transport, detail)
    }

    pub fn server_rejection(status: u16, message: Option<String>) -> Self {
        let detail = message
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| format!("request failed with status {status}"));
        Self::new(ErrorKind::ServerRejection, detail)
    }

    pub fn stream(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::StreamSemantic, message)
    }

    pub fn decode(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Decode, detail)
    }

    pub fn timeout(stage: Stage) -> Self {
        Self::new(
            ErrorKind::Timeout,
            format!("Timed out while {}", stage.progress_label().to_ascii_lowercase()),
        )
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "Run cancelled")
    }

    pub fn user_message(&self) -> String {
        match self.kind {
            ErrorKind::Transport => TRANSPORT_MESSAGE.to_string(),
            ErrorKind::Decode => DECODE_MESSAGE.to_string(),
            ErrorKind::ServerRejection
            | ErrorKind::StreamSemantic
            | ErrorKind::Timeout
            | ErrorKind::Cancelled => self.detail.clone(),
        }
    }
}
