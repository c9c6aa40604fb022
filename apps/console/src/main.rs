use std::{path::PathBuf, sync::Arc};

use anyhow::{bail, Result};
use clap::Parser;
use client_core::{
    config::{load_settings_from, normalize_backend_url},
    HttpStyleBackend, ImageSet, InputImage, PipelineOrchestrator,
};
use shared::domain::Stage;
use tokio::sync::broadcast::error::TryRecvError;
use tracing::info;

mod render;

#[derive(Parser, Debug)]
#[command(about = "Upload outfit photos and list matching products")]
struct Args {
    /// Overrides the backend url from settings and environment.
    #[arg(long)]
    backend_url: Option<String>,
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(required = true)]
    images: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    let args = Args::parse();

    let mut settings = load_settings_from(args.config.as_deref())?;
    if let Some(url) = args.backend_url.as_deref() {
        settings.backend_url = normalize_backend_url(url)?;
    }

    let mut images = ImageSet::new();
    for path in &args.images {
        images.add([InputImage::load(path).await?]);
    }
    let backend = Arc::new(HttpStyleBackend::from_settings(&settings));
    info!(backend_url = %backend.base_url(), images = images.len(), "starting style run");

    let mut pipeline = PipelineOrchestrator::new(backend, settings.timeouts());
    let mut events = pipeline.subscribe();

    if !pipeline.start(images.current()) {
        bail!("no images selected");
    }

    while pipeline.stage().is_active() {
        let interrupted = tokio::select! {
            _ = tokio::signal::ctrl_c() => true,
            _ = pipeline.pump() => false,
        };
        if interrupted {
            pipeline.cancel();
        }

        loop {
            match events.try_recv() {
                Ok(event) => {
                    if let Some(line) = render::render_event(&event) {
                        println!("{line}");
                    }
                }
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "console fell behind pipeline events");
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
    }

    let view = pipeline.view();
    println!("{}", render::render_summary(&view));
    if view.stage == Stage::Failed {
        std::process::exit(1);
    }
    Ok(())
}
