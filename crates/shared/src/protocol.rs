use serde::{Deserialize, Serialize};

use crate::domain::{ProductItem, StyleProfile};

pub const OUTFIT_EVENT: &str = "outfit";
pub const ERROR_EVENT: &str = "error";
pub const COMPLETE_EVENT: &str = "complete";

/// Success body of `POST /generate`. Sibling fields are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileEnvelope {
    pub profile: StyleProfile,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamErrorPayload {
    pub message: String,
}

/// Body of `GET /generate-items`. The bare list is canonical; the wrapped
/// shape is still produced by older backends.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProductsResponse {
    List(Vec<ProductItem>),
    Wrapped { items: Vec<ProductItem> },
}

impl ProductsResponse {
    pub fn is_wrapped(&self) -> bool {
        matches!(self, ProductsResponse::Wrapped { .. })
    }

    pub fn into_items(self) -> Vec<ProductItem> {
        match self {
            ProductsResponse::List(items) | ProductsResponse::Wrapped { items } => items,
        }
    }
}

/// Error body of a non-2xx response, in whichever field the backend used.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RejectionBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    detail: Option<String>,
}

impl RejectionBody {
    pub fn parse(body: &str) -> Option<String> {
        let parsed: RejectionBody = serde_json::from_str(body).ok()?;
        [parsed.error, parsed.message, parsed.detail]
            .into_iter()
            .flatten()
            .find(|m| !m.trim().is_empty())
    }
}
