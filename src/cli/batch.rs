use super::ui;
use crate::api::{BatchRequest, BatchResponse};
use crate::core::MetricsSnapshot;
use crate::fetcher::batch::{BatchFetcher, BatchResult};
use anyhow::{Context, Result};
use comfy_table::Cell;

impl BatchResult {
    pub fn display_as_table(&self) -> String {
        let mut table = ui::new_styled_table();
        table.set_header(vec![
            ui::header_cell("Protocol"),
            ui::header_cell("APY"),
            ui::header_cell("Source"),
            ui::header_cell("Cached"),
            ui::header_cell("Error"),
        ]);

        let mut ids: Vec<&String> = self.entries.keys().collect();
        ids.sort();

        for id in ids {
            let entry = &self.entries[id];
            let row = match &entry.outcome {
                Ok(result) => vec![
                    Cell::new(result.protocol.name()),
                    ui::apy_cell(result.apy),
                    ui::provenance_cell(result.provenance),
                    Cell::new(if entry.cached { "yes" } else { "no" }),
                    Cell::new(""),
                ],
                Err(message) => vec![
                    Cell::new(id),
                    ui::apy_cell(None),
                    Cell::new("-"),
                    Cell::new("no"),
                    ui::error_cell(message),
                ],
            };
            table.add_row(row);
        }

        format!(
            "{}\n\n{}",
            table,
            ui::style_text(
                &format!(
                    "{} succeeded, {} failed at {}",
                    self.successes(),
                    self.failures(),
                    self.timestamp.format("%H:%M:%S UTC")
                ),
                ui::StyleType::Subtle
            )
        )
    }
}

impl MetricsSnapshot {
    pub fn display_summary(&self) -> String {
        format!(
            "fetches: {} | cache hits: {:.0}% | fallbacks: {:.0}% | errors: {:.0}% | null yields: {:.0}% | avg response: {:.0}ms",
            self.total_fetches,
            self.cache_hit_rate * 100.0,
            self.fallback_rate * 100.0,
            self.error_rate * 100.0,
            self.null_apy_rate * 100.0,
            self.avg_response_ms
        )
    }
}

/// Runs one batch with a progress bar.
pub async fn fetch_with_progress(batch: &BatchFetcher, ids: &[String]) -> BatchResult {
    let pb = ui::new_progress_bar(ids.len() as u64, true);
    pb.set_message("Fetching yields...");
    let result = batch.fetch_batch_with_progress(ids, &|| pb.inc(1)).await;
    pb.finish_and_clear();
    result
}

pub async fn run(batch: &BatchFetcher, protocols: Option<&str>, json: bool) -> Result<()> {
    let request = BatchRequest::from_query(protocols);
    request.validate()?;
    let ids = request.ids();

    if json {
        let response = BatchResponse::from(batch.fetch_batch(&ids).await);
        let body =
            serde_json::to_string_pretty(&response).context("Failed to serialize batch response")?;
        println!("{body}");
        return Ok(());
    }

    let result = fetch_with_progress(batch, &ids).await;
    println!("{}", ui::style_text("Protocol yields", ui::StyleType::Title));
    println!("\n{}", result.display_as_table());
    Ok(())
}
