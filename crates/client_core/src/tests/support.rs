//! Scripted collaborators shared by the unit tests.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use serde_json::json;
use shared::{
    domain::{Price, ProductItem, StyleProfile},
    error::PipelineError,
};
use tokio::sync::Notify;

use crate::{
    config::StageTimeouts, image_set::InputImage, sse::RawStreamEvent,
    stream_consumer::OutfitStream, StyleBackend,
};

pub(crate) fn outfit_event(url: &str, description: &str) -> RawStreamEvent {
    RawStreamEvent::new(
        "outfit",
        json!({ "url": url, "description": description }).to_string(),
    )
}

pub(crate) fn error_event(message: &str) -> RawStreamEvent {
    RawStreamEvent::new("error", json!({ "message": message }).to_string())
}

pub(crate) fn complete_event() -> RawStreamEvent {
    RawStreamEvent::new("complete", "")
}

pub(crate) fn sample_images(count: usize) -> Arc<[InputImage]> {
    (0..count)
        .map(|i| InputImage::new(format!("look-{i}.png"), "image/png", vec![i as u8; 4]))
        .collect::<Vec<_>>()
        .into()
}

pub(crate) fn product(name: &str) -> ProductItem {
    ProductItem {
        name: name.to_string(),
        link: "x".into(),
        price: Price::Amount(19.99),
        image: "i".into(),
        source: "s".into(),
        thumbnail: "t".into(),
    }
}

pub(crate) fn test_timeouts() -> StageTimeouts {
    StageTimeouts {
        profile: Duration::from_secs(5),
        stream_idle: Duration::from_secs(5),
        products: Duration::from_secs(5),
    }
}

/// Polls `condition` for up to a second.
pub(crate) async fn wait_for(condition: impl Fn() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(condition(), "condition not reached in time");
}

pub(crate) struct ScriptedStream {
    events: VecDeque<Result<RawStreamEvent, PipelineError>>,
    closes: Arc<AtomicUsize>,
    hang_when_drained: bool,
}

impl ScriptedStream {
    pub(crate) fn new(events: Vec<RawStreamEvent>) -> Self {
        Self {
            events: events.into_iter().map(Ok).collect(),
            closes: Arc::new(AtomicUsize::new(0)),
            hang_when_drained: false,
        }
    }

    pub(crate) fn then_fail(mut self, err: PipelineError) -> Self {
        self.events.push_back(Err(err));
        self
    }

    /// Keeps the connection open after the scripted events, like a server
    /// that never hangs up on its own.
    pub(crate) fn hanging(mut self) -> Self {
        self.hang_when_drained = true;
        self
    }

    pub(crate) fn close_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.closes)
    }
}

#[async_trait]
impl OutfitStream for ScriptedStream {
    async fn next_event(&mut self) -> Option<Result<RawStreamEvent, PipelineError>> {
        if let Some(next) = self.events.pop_front() {
            return Some(next);
        }
        if self.hang_when_drained {
            std::future::pending::<()>().await;
        }
        None
    }

    async fn close(&mut self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

pub(crate) struct ScriptedBackend {
    profile: Result<StyleProfile, PipelineError>,
    profile_hangs: bool,
    first_profile_gate: Mutex<Option<Arc<Notify>>>,
    streams: Mutex<VecDeque<ScriptedStream>>,
    products: Mutex<VecDeque<Result<Vec<ProductItem>, PipelineError>>>,
    first_products_gate: Mutex<Option<Arc<Notify>>>,
    opened_profiles: Mutex<Vec<StyleProfile>>,
    profile_calls: AtomicUsize,
    products_calls: AtomicUsize,
}

impl ScriptedBackend {
    pub(crate) fn new() -> Self {
        Self {
            profile: Ok(StyleProfile::new(json!({ "Age": 30 }))),
            profile_hangs: false,
            first_profile_gate: Mutex::new(None),
            streams: Mutex::new(VecDeque::new()),
            products: Mutex::new(VecDeque::new()),
            first_products_gate: Mutex::new(None),
            opened_profiles: Mutex::new(Vec::new()),
            profile_calls: AtomicUsize::new(0),
            products_calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn with_profile(mut self, profile: Result<StyleProfile, PipelineError>) -> Self {
        self.profile = profile;
        self
    }

    pub(crate) fn with_hanging_profile(mut self) -> Self {
        self.profile_hangs = true;
        self
    }

    pub(crate) fn with_stream(self, stream: ScriptedStream) -> Self {
        self.streams.lock().expect("streams").push_back(stream);
        self
    }

    pub(crate) fn with_products(self, products: Result<Vec<ProductItem>, PipelineError>) -> Self {
        self.products.lock().expect("products").push_back(products);
        self
    }

    /// The first profile call waits until the returned gate is notified.
    pub(crate) fn gate_first_profile_call(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.first_profile_gate.lock().expect("gate") = Some(Arc::clone(&gate));
        gate
    }

    /// The first products call waits until the returned gate is notified.
    pub(crate) fn gate_first_products_call(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.first_products_gate.lock().expect("gate") = Some(Arc::clone(&gate));
        gate
    }

    pub(crate) fn profile_calls(&self) -> usize {
        self.profile_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn products_calls(&self) -> usize {
        self.products_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn opened_profiles(&self) -> Vec<StyleProfile> {
        self.opened_profiles.lock().expect("profiles").clone()
    }
}

#[async_trait]
impl StyleBackend for ScriptedBackend {
    async fn acquire_profile(&self, images: &[InputImage]) -> Result<StyleProfile, PipelineError> {
        let gate = self.first_profile_gate.lock().expect("gate").take();
        self.profile_calls.fetch_add(1, Ordering::SeqCst);
        assert!(!images.is_empty(), "profile requested without images");
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.profile_hangs {
            std::future::pending::<()>().await;
        }
        self.profile.clone()
    }

    async fn open_outfit_stream(
        &self,
        profile: &StyleProfile,
    ) -> Result<Box<dyn OutfitStream>, PipelineError> {
        self.opened_profiles
            .lock()
            .expect("profiles")
            .push(profile.clone());
        let stream = self.streams.lock().expect("streams").pop_front();
        match stream {
            Some(stream) => Ok(Box::new(stream)),
            None => Err(PipelineError::transport("no scripted stream left")),
        }
    }

    async fn acquire_products(&self) -> Result<Vec<ProductItem>, PipelineError> {
        self.products_calls.fetch_add(1, Ordering::SeqCst);
        let result = self
            .products
            .lock()
            .expect("products")
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()));
        let gate = self.first_products_gate.lock().expect("gate").take();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        result
    }
}
