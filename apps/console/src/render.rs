//! Plain-text rendering of orchestrator state.

use client_core::{PipelineEvent, PipelineView};
use shared::domain::{ProductItem, Stage};

pub fn render_event(event: &PipelineEvent) -> Option<String> {
    match event {
        PipelineEvent::StageChanged { stage, .. } if stage.is_active() => {
            Some(format!("{}...", stage.progress_label()))
        }
        PipelineEvent::StageChanged { .. } => None,
        PipelineEvent::OutfitAppended { item, .. } => {
            Some(format!("  outfit: {} ({})", item.description, item.url))
        }
        PipelineEvent::ProductsReady { count, .. } => Some(format!("Found {count} products")),
        // Reported once by the summary.
        PipelineEvent::Failed { .. } => None,
    }
}

pub fn render_product(index: usize, product: &ProductItem) -> String {
    format!(
        "{:>3}. {} - {} [{}]\n     {}\n     image: {}",
        index + 1,
        product.name,
        product.price,
        product.source,
        product.link,
        product.display_image()
    )
}

pub fn render_summary(view: &PipelineView) -> String {
    match view.stage {
        Stage::Complete if view.products.is_empty() => "No products found".to_string(),
        Stage::Complete => view
            .products
            .iter()
            .enumerate()
            .map(|(i, product)| render_product(i, product))
            .collect::<Vec<_>>()
            .join("\n"),
        Stage::Failed => format!(
            "Run failed: {}",
            view.error_message.as_deref().unwrap_or("unknown error")
        ),
        stage => stage.progress_label().to_string(),
    }
}
