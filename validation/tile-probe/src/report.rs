//! Probe results formatting.

use crate::metrics::ProbeSummary;
use crate::runner::ProbeBatch;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Cell, Color, Table};
use serde::Serialize;

/// Formats probe batches for output.
pub struct ProbeReport;

#[derive(Serialize)]
struct JsonReport<'a> {
    summary: &'a ProbeSummary,
    batch: &'a ProbeBatch,
}

impl ProbeReport {
    /// Per-tile results table, one row per request in index order.
    pub fn format_table(batch: &ProbeBatch) -> String {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_header(vec!["#", "URL", "Status", "Bytes", "Time (ms)"]);

        for result in &batch.results {
            let color = if result.succeeded { Color::Green } else { Color::Red };
            table.add_row(vec![
                Cell::new(result.index + 1),
                Cell::new(&result.url),
                Cell::new(result.status).fg(color),
                Cell::new(result.bytes),
                Cell::new(result.elapsed_ms),
            ]);
        }

        table.to_string()
    }

    /// Summary table for a batch.
    pub fn format_summary(summary: &ProbeSummary) -> String {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_header(vec![format!(
                "Tile Probe: {} (level {})",
                summary.volume, summary.level
            )]);

        table.add_row(vec!["Tiles:", &summary.total.to_string()]);
        table.add_row(vec![
            "Succeeded:",
            &format!("{} ({:.1}%)", summary.succeeded, summary.success_rate),
        ]);
        table.add_row(vec![
            "Failed:",
            &format!(
                "{} HTTP / {} transport",
                summary.http_errors, summary.transport_errors
            ),
        ]);
        table.add_row(vec!["Bytes:", &summary.total_bytes.to_string()]);
        table.add_row(vec!["Wall time:", &format!("{} ms", summary.wall_ms)]);

        table.add_row(vec!["", ""]);
        table.add_row(vec!["Latency (ms)", "min / p50 / p90 / p99 / max"]);
        table.add_row(vec![
            "",
            &format!(
                "{:.1} / {:.1} / {:.1} / {:.1} / {:.1}",
                summary.latency_min,
                summary.latency_p50,
                summary.latency_p90,
                summary.latency_p99,
                summary.latency_max
            ),
        ]);

        if summary.cancelled {
            table.add_row(vec!["", ""]);
            table.add_row(vec!["Cancelled:", "yes (in-flight tiles reported as ERR)"]);
        }

        table.to_string()
    }

    /// Summary and per-tile results as pretty JSON.
    pub fn format_json(batch: &ProbeBatch, summary: &ProbeSummary) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(&JsonReport { summary, batch })?)
    }

    /// CSV header row.
    pub fn csv_header() -> &'static str {
        "index,url,succeeded,status,bytes,elapsed_ms"
    }

    /// One CSV row per tile.
    pub fn format_csv(batch: &ProbeBatch) -> String {
        batch
            .results
            .iter()
            .map(|r| {
                format!(
                    "{},{},{},{},{},{}",
                    r.index, r.url, r.succeeded, r.status, r.bytes, r.elapsed_ms
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
