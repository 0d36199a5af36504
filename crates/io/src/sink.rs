// Delimited report export and console preview

use std::fs;
use std::path::{Path, PathBuf};

use csv::{QuoteStyle, Terminator};

use cohort_recon::error::{CohortError, Result};
use cohort_recon::model::PurchaseSummary;

use crate::{REPORT_DELIMITER, REPORT_HEADER};

fn record(row: &PurchaseSummary) -> [String; 4] {
    [
        row.customer_id.to_string(),
        row.age.to_string(),
        row.item_name.clone(),
        row.total_quantity.to_string(),
    ]
}

/// Sibling path the report is staged at before being renamed into place.
fn staging_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.partial"))
}

fn write_delimited(path: &Path, rows: &[PurchaseSummary]) -> std::result::Result<(), String> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(REPORT_DELIMITER)
        .quote_style(QuoteStyle::Necessary)
        .terminator(Terminator::Any(b'\n'))
        .from_path(path)
        .map_err(|e| e.to_string())?;

    writer.write_record(REPORT_HEADER).map_err(|e| e.to_string())?;
    for row in rows {
        writer.write_record(record(row)).map_err(|e| e.to_string())?;
    }

    writer.flush().map_err(|e| e.to_string())?;
    Ok(())
}

/// Write `rows` as a semicolon-delimited report with a
/// `Customer;Age;Item;Quantity` header.
///
/// The file appears at `path` only once fully written; on failure nothing is
/// left behind and any previous file at `path` is untouched.
pub fn write_summaries(path: &Path, rows: &[PurchaseSummary]) -> Result<()> {
    let staging = staging_path(path);
    let sink_err = |message: String| CohortError::Sink {
        path: path.to_path_buf(),
        message,
    };

    if let Err(message) = write_delimited(&staging, rows) {
        let _ = fs::remove_file(&staging);
        return Err(sink_err(message));
    }

    if let Err(e) = fs::rename(&staging, path) {
        let _ = fs::remove_file(&staging);
        return Err(sink_err(e.to_string()));
    }

    log::info!("wrote {} rows to {}", rows.len(), path.display());
    Ok(())
}

/// Right-aligned text table of `rows` under the report header.
pub fn render_preview(rows: &[PurchaseSummary]) -> String {
    let cells: Vec<[String; 4]> = rows.iter().map(record).collect();

    let mut widths = REPORT_HEADER.map(|h| h.chars().count());
    for row in &cells {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let format_line = |fields: [&str; 4]| -> String {
        fields
            .iter()
            .zip(widths)
            .map(|(field, width)| format!("{field:>width$}"))
            .collect::<Vec<_>>()
            .join(" ")
    };

    let mut out = format_line(REPORT_HEADER);
    out.push('\n');
    for [customer, age, item, quantity] in &cells {
        out.push_str(&format_line([customer, age, item, quantity].map(String::as_str)));
        out.push('\n');
    }
    out
}
