//! Single-flow state machine driving profile upload, outfit streaming and
//! product lookup for one run at a time.

use std::{future::Future, sync::Arc, time::Duration};

use shared::{
    domain::{OutfitItem, ProductItem, RunId, Stage, StyleProfile},
    error::PipelineError,
};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::{
    config::StageTimeouts,
    image_set::InputImage,
    stream_consumer::{StreamConsumer, StreamSignal},
    StyleBackend,
};

/// Asynchronous result delivered back to the orchestrator, tagged with the
/// run that issued it.
#[derive(Debug)]
pub struct RunCompletion {
    pub run_id: RunId,
    pub kind: CompletionKind,
}

#[derive(Debug)]
pub enum CompletionKind {
    Profile(Result<StyleProfile, PipelineError>),
    Stream(StreamSignal),
    StreamBroken(PipelineError),
    Products(Result<Vec<ProductItem>, PipelineError>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    StageChanged { run_id: RunId, stage: Stage },
    OutfitAppended { run_id: RunId, item: OutfitItem },
    ProductsReady { run_id: RunId, count: usize },
    Failed { run_id: RunId, message: String },
}

#[derive(Debug, Clone, Default)]
pub struct PipelineRun {
    id: Option<RunId>,
    images: Option<Arc<[InputImage]>>,
    stage: Stage,
    profile: Option<StyleProfile>,
    outfits: Vec<OutfitItem>,
    products: Option<Vec<ProductItem>>,
    error: Option<PipelineError>,
}

impl PipelineRun {
    fn started(id: RunId, images: Arc<[InputImage]>) -> Self {
        Self {
            id: Some(id),
            images: Some(images),
            stage: Stage::UploadingProfile,
            ..Self::default()
        }
    }

    pub fn id(&self) -> Option<RunId> {
        self.id
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn image_count(&self) -> usize {
        self.images.as_ref().map_or(0, |images| images.len())
    }
}

/// What the presentation layer renders.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineView {
    pub stage: Stage,
    pub progress_label: &'static str,
    pub show_placeholders: bool,
    pub outfits: Vec<OutfitItem>,
    pub products: Vec<ProductItem>,
    pub error_message: Option<String>,
}

struct StreamHandle {
    cancel: Option<oneshot::Sender<()>>,
}

impl StreamHandle {
    fn close(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
    }
}

pub struct PipelineOrchestrator {
    backend: Arc<dyn StyleBackend>,
    timeouts: StageTimeouts,
    run: PipelineRun,
    last_run_id: u64,
    stream: Option<StreamHandle>,
    completions_tx: mpsc::UnboundedSender<RunCompletion>,
    completions_rx: mpsc::UnboundedReceiver<RunCompletion>,
    events: broadcast::Sender<PipelineEvent>,
}

impl PipelineOrchestrator {
    pub fn new(backend: Arc<dyn StyleBackend>, timeouts: StageTimeouts) -> Self {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(256);
        Self {
            backend,
            timeouts,
            run: PipelineRun::default(),
            last_run_id: 0,
            stream: None,
            completions_tx,
            completions_rx,
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events.subscribe()
    }

    pub fn run(&self) -> &PipelineRun {
        &self.run
    }

    pub fn run_id(&self) -> Option<RunId> {
        self.run.id
    }

    pub fn stage(&self) -> Stage {
        self.run.stage
    }

    pub fn profile(&self) -> Option<&StyleProfile> {
        self.run.profile.as_ref()
    }

    /// Every outfit received by the current run, including a failed one.
    pub fn outfits(&self) -> &[OutfitItem] {
        &self.run.outfits
    }

    pub fn products(&self) -> Option<&[ProductItem]> {
        self.run.products.as_deref()
    }

    pub fn error(&self) -> Option<&PipelineError> {
        self.run.error.as_ref()
    }

    pub fn error_message(&self) -> Option<String> {
        self.run.error.as_ref().map(PipelineError::user_message)
    }

    pub fn view(&self) -> PipelineView {
        let stage = self.run.stage;
        let outfits = if stage == Stage::Failed {
            Vec::new()
        } else {
            self.run.outfits.clone()
        };
        PipelineView {
            stage,
            progress_label: stage.progress_label(),
            show_placeholders: stage.is_active(),
            outfits,
            products: self.run.products.clone().unwrap_or_default(),
            error_message: self.error_message(),
        }
    }

    /// Begins a run. Returns `false` without side effects when `images` is
    /// empty or a run is already in flight. Must be called inside a tokio
    /// runtime.
    pub fn start(&mut self, images: Arc<[InputImage]>) -> bool {
        if images.is_empty() {
            debug!("ignoring start without images");
            return false;
        }
        if self.run.stage.is_active() {
            debug!(stage = ?self.run.stage, "ignoring start while a run is in flight");
            return false;
        }

        self.close_stream();
        self.last_run_id += 1;
        let run_id = RunId(self.last_run_id);
        self.run = PipelineRun::started(run_id, Arc::clone(&images));
        info!(run_id = run_id.0, images = images.len(), "pipeline run started");
        self.emit(PipelineEvent::StageChanged {
            run_id,
            stage: Stage::UploadingProfile,
        });

        let backend = Arc::clone(&self.backend);
        self.spawn_request(
            run_id,
            self.timeouts.profile,
            Stage::UploadingProfile,
            async move { backend.acquire_profile(&images).await },
            CompletionKind::Profile,
        );
        true
    }

    /// Abandons the in-flight run. Returns `false` when nothing is active.
    pub fn cancel(&mut self) -> bool {
        if !self.run.stage.is_active() {
            return false;
        }
        self.fail(PipelineError::cancelled());
        true
    }

    /// Waits for the next completion and applies it. `Some(true)` when the
    /// run state changed.
    pub async fn pump(&mut self) -> Option<bool> {
        let completion = self.completions_rx.recv().await?;
        Some(self.apply(completion))
    }

    /// Pumps completions until the current run leaves its in-flight stages.
    pub async fn run_until_settled(&mut self) -> Stage {
        while self.run.stage.is_active() {
            if self.pump().await.is_none() {
                break;
            }
        }
        self.run.stage
    }

    pub(crate) fn apply(&mut self, completion: RunCompletion) -> bool {
        let RunCompletion { run_id, kind } = completion;
        if self.run.id != Some(run_id) {
            debug!(
                run_id = run_id.0,
                current = ?self.run.id.map(|id| id.0),
                "discarding completion from superseded run"
            );
            return false;
        }

        match (self.run.stage, kind) {
            (Stage::UploadingProfile, CompletionKind::Profile(Ok(profile))) => {
                self.run.profile = Some(profile.clone());
                self.set_stage(Stage::StreamingOutfits);
                self.open_stream(run_id, profile);
                true
            }
            (Stage::StreamingOutfits, CompletionKind::Stream(StreamSignal::Outfit(item))) => {
                self.run.outfits.push(item.clone());
                debug!(run_id = run_id.0, outfits = self.run.outfits.len(), "outfit received");
                self.emit(PipelineEvent::OutfitAppended { run_id, item });
                true
            }
            (Stage::StreamingOutfits, CompletionKind::Stream(StreamSignal::Complete)) => {
                self.close_stream();
                info!(run_id = run_id.0, outfits = self.run.outfits.len(), "outfit stream complete");
                self.set_stage(Stage::FetchingProducts);
                let backend = Arc::clone(&self.backend);
                self.spawn_request(
                    run_id,
                    self.timeouts.products,
                    Stage::FetchingProducts,
                    async move { backend.acquire_products().await },
                    CompletionKind::Products,
                );
                true
            }
            (Stage::StreamingOutfits, CompletionKind::Stream(StreamSignal::Error(message))) => {
                self.fail(PipelineError::stream(message));
                true
            }
            (Stage::StreamingOutfits, CompletionKind::Stream(StreamSignal::DecodeFailure(detail))) => {
                self.fail(PipelineError::decode(detail));
                true
            }
            (Stage::StreamingOutfits, CompletionKind::StreamBroken(err))
            | (Stage::UploadingProfile, CompletionKind::Profile(Err(err)))
            | (Stage::FetchingProducts, CompletionKind::Products(Err(err))) => {
                self.fail(err);
                true
            }
            (Stage::FetchingProducts, CompletionKind::Products(Ok(products))) => {
                let count = products.len();
                self.run.products = Some(products);
                info!(run_id = run_id.0, products = count, "pipeline run complete");
                self.emit(PipelineEvent::ProductsReady { run_id, count });
                self.set_stage(Stage::Complete);
                true
            }
            (stage, kind) => {
                debug!(run_id = run_id.0, ?stage, ?kind, "ignoring completion outside its stage");
                false
            }
        }
    }

    fn spawn_request<T, F>(
        &self,
        run_id: RunId,
        limit: Duration,
        stage: Stage,
        request: F,
        wrap: fn(Result<T, PipelineError>) -> CompletionKind,
    ) where
        T: Send + 'static,
        F: Future<Output = Result<T, PipelineError>> + Send + 'static,
    {
        let sink = self.completions_tx.clone();
        tokio::spawn(async move {
            let result = match tokio::time::timeout(limit, request).await {
                Ok(result) => result,
                Err(_) => Err(PipelineError::timeout(stage)),
            };
            let _ = sink.send(RunCompletion {
                run_id,
                kind: wrap(result),
            });
        });
    }

    fn open_stream(&mut self, run_id: RunId, profile: StyleProfile) {
        let (cancel_tx, mut cancel_rx) = oneshot::channel();
        self.stream = Some(StreamHandle {
            cancel: Some(cancel_tx),
        });

        let backend = Arc::clone(&self.backend);
        let sink = self.completions_tx.clone();
        let timeouts = self.timeouts;
        tokio::spawn(async move {
            let opened = tokio::select! {
                biased;
                _ = &mut cancel_rx => return,
                opened = tokio::time::timeout(
                    timeouts.stream_idle,
                    backend.open_outfit_stream(&profile),
                ) => opened,
            };
            let connection = match opened {
                Ok(Ok(connection)) => connection,
                Ok(Err(err)) => {
                    let _ = sink.send(RunCompletion {
                        run_id,
                        kind: CompletionKind::StreamBroken(err),
                    });
                    return;
                }
                Err(_) => {
                    let _ = sink.send(RunCompletion {
                        run_id,
                        kind: CompletionKind::StreamBroken(PipelineError::timeout(
                            Stage::StreamingOutfits,
                        )),
                    });
                    return;
                }
            };
            StreamConsumer::new(connection, timeouts.stream_idle)
                .run(run_id, sink, cancel_rx)
                .await;
        });
    }

    fn close_stream(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.close();
        }
    }

    fn fail(&mut self, err: PipelineError) {
        self.close_stream();
        let run_id = self.run.id.unwrap_or(RunId(0));
        warn!(run_id = run_id.0, stage = ?self.run.stage, error = %err, "pipeline run failed");
        let message = err.user_message();
        self.run.error = Some(err);
        self.set_stage(Stage::Failed);
        self.emit(PipelineEvent::Failed { run_id, message });
    }

    fn set_stage(&mut self, stage: Stage) {
        self.run.stage = stage;
        if let Some(run_id) = self.run.id {
            self.emit(PipelineEvent::StageChanged { run_id, stage });
        }
    }

    fn emit(&self, event: PipelineEvent) {
        let _ = self.events.send(event);
    }
}

impl Drop for PipelineOrchestrator {
    fn drop(&mut self) {
        self.close_stream();
    }
}

#[cfg(test)]
#[path = "tests/orchestrator_tests.rs"]
mod tests;
