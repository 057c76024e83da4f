use super::ui;
use crate::core::{FetchResult, Protocol};
use crate::fetcher::ProtocolFetcher;
use anyhow::Result;
use comfy_table::Cell;

impl FetchResult {
    pub fn display_as_table(&self) -> String {
        let mut table = ui::new_styled_table();
        table.set_header(vec![
            ui::header_cell("Protocol"),
            ui::header_cell("APY"),
            ui::header_cell("Source"),
            ui::header_cell("Fetched At"),
        ]);
        table.add_row(vec![
            Cell::new(self.protocol.name()),
            ui::apy_cell(self.apy),
            ui::provenance_cell(self.provenance),
            Cell::new(self.fetched_at.format("%Y-%m-%d %H:%M:%S UTC")),
        ]);
        table.to_string()
    }
}

pub async fn run(fetcher: &ProtocolFetcher, protocol: &str) -> Result<()> {
    let protocol: Protocol = protocol.parse()?;
    let result = fetcher.fetch(protocol).await;

    println!(
        "{}\n",
        ui::style_text(&format!("{} yield", protocol.name()), ui::StyleType::Title)
    );
    println!("{}", result.display_as_table());

    if result.provenance.is_fallback() {
        println!(
            "\n{}",
            ui::style_text(
                &format!("Served from the {} stage", result.provenance),
                ui::StyleType::Warning
            )
        );
    }
    Ok(())
}
