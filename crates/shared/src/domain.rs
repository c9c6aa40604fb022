use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub u64);
    };
}

id_newtype!(RunId);

/// Position of a run in the pipeline. Exactly one variant holds at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    Idle,
    UploadingProfile,
    StreamingOutfits,
    FetchingProducts,
    Complete,
    Failed,
}

impl Stage {
    /// True while a network operation for the run is in flight.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            Stage::UploadingProfile | Stage::StreamingOutfits | Stage::FetchingProducts
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Complete | Stage::Failed)
    }

    pub fn progress_label(self) -> &'static str {
        match self {
            Stage::Idle => "Ready",
            Stage::UploadingProfile => "Analyzing your style",
            Stage::StreamingOutfits => "Generating outfits",
            Stage::FetchingProducts => "Finding products",
            Stage::Complete => "Done",
            Stage::Failed => "Failed",
        }
    }
}

/// Backend-defined profile record. The client never inspects its fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StyleProfile(pub serde_json::Value);

impl StyleProfile {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    pub fn to_query_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutfitItem {
    pub url: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Price {
    Amount(f64),
    Label(String),
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Price::Amount(amount) => write!(f, "${amount:.2}"),
            Price::Label(label) => f.write_str(label),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductItem {
    pub name: String,
    pub link: String,
    pub price: Price,
    pub image: String,
    pub source: String,
    pub thumbnail: String,
}

impl ProductItem {
    /// Thumbnail when the backend supplied one, full image otherwise.
    pub fn display_image(&self) -> &str {
        if self.thumbnail.trim().is_empty() {
            &self.image
        } else {
            &self.thumbnail
        }
    }
}
