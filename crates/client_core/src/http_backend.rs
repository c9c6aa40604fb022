//! reqwest implementation of the three backend endpoints.

use std::collections::VecDeque;

use async_trait::async_trait;
use reqwest::{
    header::ACCEPT,
    multipart::{Form, Part},
    Client, Response,
};
use shared::{
    domain::{ProductItem, StyleProfile},
    error::PipelineError,
    protocol::{ProductsResponse, ProfileEnvelope, RejectionBody},
};
use tracing::{debug, info};

use crate::{
    config::PipelineSettings,
    image_set::InputImage,
    sse::{RawStreamEvent, SseDecoder},
    stream_consumer::OutfitStream,
    StyleBackend,
};

pub struct HttpStyleBackend {
    http: Client,
    base_url: String,
}

impl HttpStyleBackend {
    /// `base_url` is expected without a trailing slash; see
    /// [`crate::config::normalize_backend_url`].
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into(),
        }
    }

    pub fn from_settings(settings: &PipelineSettings) -> Self {
        Self::new(settings.backend_url.clone())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }
}

fn transport_error(context: &str, err: reqwest::Error) -> PipelineError {
    PipelineError::transport(format!("{context}: {err}"))
}

async fn ensure_success(response: Response) -> Result<Response, PipelineError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(PipelineError::server_rejection(
        status.as_u16(),
        RejectionBody::parse(&body),
    ))
}

async fn read_json<T: serde::de::DeserializeOwned>(
    response: Response,
    context: &str,
) -> Result<T, PipelineError> {
    let body = response
        .bytes()
        .await
        .map_err(|err| transport_error(context, err))?;
    serde_json::from_slice(&body).map_err(|err| PipelineError::decode(format!("{context}: {err}")))
}

#[async_trait]
impl StyleBackend for HttpStyleBackend {
    async fn acquire_profile(&self, images: &[InputImage]) -> Result<StyleProfile, PipelineError> {
        let mut form = Form::new();
        for image in images {
            let part = Part::bytes(image.bytes().to_vec())
                .file_name(image.filename().to_string())
                .mime_str(image.mime_type())
                .map_err(|err| PipelineError::transport(format!("invalid image part: {err}")))?;
            form = form.part("images", part);
        }

        let response = self
            .http
            .post(self.endpoint("generate"))
            .multipart(form)
            .send()
            .await
            .map_err(|err| transport_error("profile request failed", err))?;
        let response = ensure_success(response).await?;
        let envelope: ProfileEnvelope = read_json(response, "invalid profile response").await?;
        info!(images = images.len(), "style profile received");
        Ok(envelope.profile)
    }

    async fn open_outfit_stream(
        &self,
        profile: &StyleProfile,
    ) -> Result<Box<dyn OutfitStream>, PipelineError> {
        let profile_json = profile
            .to_query_json()
            .map_err(|err| PipelineError::decode(format!("profile is not serializable: {err}")))?;
        let response = self
            .http
            .get(self.endpoint("generate-outfits"))
            .query(&[("profile", profile_json)])
            .header(ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|err| transport_error("failed to open outfit stream", err))?;
        let response = ensure_success(response).await?;
        debug!("outfit stream opened");
        Ok(Box::new(SseOutfitStream::new(response)))
    }

    async fn acquire_products(&self) -> Result<Vec<ProductItem>, PipelineError> {
        let response = self
            .http
            .get(self.endpoint("generate-items"))
            .send()
            .await
            .map_err(|err| transport_error("products request failed", err))?;
        let response = ensure_success(response).await?;
        let products: ProductsResponse = read_json(response, "invalid products response").await?;
        if products.is_wrapped() {
            debug!("products response used the legacy {{items}} shape");
        }
        Ok(products.into_items())
    }
}

/// Server-sent events read from a streaming response body. Dropping the
/// response releases the connection.
pub struct SseOutfitStream {
    response: Option<Response>,
    decoder: SseDecoder,
    pending: VecDeque<RawStreamEvent>,
}

impl SseOutfitStream {
    pub fn new(response: Response) -> Self {
        Self {
            response: Some(response),
            decoder: SseDecoder::new(),
            pending: VecDeque::new(),
        }
    }
}

#[async_trait]
impl OutfitStream for SseOutfitStream {
    async fn next_event(&mut self) -> Option<Result<RawStreamEvent, PipelineError>> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(Ok(event));
            }
            let response = self.response.as_mut()?;
            match response.chunk().await {
                Ok(Some(chunk)) => self.pending.extend(self.decoder.push(&chunk)),
                Ok(None) => self.response = None,
                Err(err) => {
                    self.response = None;
                    return Some(Err(transport_error("outfit stream receive failed", err)));
                }
            }
        }
    }

    async fn close(&mut self) {
        self.response = None;
        self.pending.clear();
    }
}

#[cfg(test)]
#[path = "tests/http_backend_tests.rs"]
mod tests;
