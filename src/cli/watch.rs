use super::{batch, ui};
use crate::api::BatchRequest;
use crate::core::Metrics;
use crate::fetcher::batch::BatchFetcher;
use anyhow::Result;
use std::time::Duration;
use tracing::info;

/// Re-runs the batch every `interval`, printing metrics after each round.
/// Runs until interrupted when `rounds` is `None`.
pub async fn run(
    fetcher: &BatchFetcher,
    metrics: &Metrics,
    protocols: Option<&str>,
    interval: Duration,
    rounds: Option<u32>,
) -> Result<()> {
    let request = BatchRequest::from_query(protocols);
    request.validate()?;
    let ids = request.ids();

    let mut round = 0u32;
    loop {
        round += 1;
        info!("Watch round {}", round);

        let result = batch::fetch_with_progress(fetcher, &ids).await;
        println!(
            "{}",
            ui::style_text(&format!("Round {round}"), ui::StyleType::Title)
        );
        println!("\n{}", result.display_as_table());
        println!(
            "\n{}",
            ui::style_text(&metrics.snapshot().display_summary(), ui::StyleType::Subtle)
        );
        for warning in metrics.check_thresholds() {
            println!("{}", ui::style_text(&warning, ui::StyleType::Warning));
        }

        if rounds.is_some_and(|limit| round >= limit) {
            break;
        }
        ui::print_separator();
        tokio::time::sleep(interval).await;
    }
    Ok(())
}
