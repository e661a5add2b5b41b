//! Invoice documents.
//!
//! A [`Renderer`] turns one [`InvoiceDataset`] into document text; the
//! document is written as `{customer}_{period}.{ext}` in the output directory.

use std::fmt::Write;
use std::path::{Path, PathBuf};

use bill_core::{ClassifiedEvent, InvoiceDataset, format_hours_minutes};
use chrono::{Local, NaiveDate};
use serde::Serialize;
use thiserror::Error;

use crate::config::InvoiceHeader;

/// Rendering errors for a single customer.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to format document: {0}")]
    Format(#[from] std::fmt::Error),
    #[error("failed to encode document: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A rendered document, not yet written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedInvoice {
    /// File extension, without the dot.
    pub extension: &'static str,
    pub content: String,
}

/// Produces document content for one dataset.
pub trait Renderer: Send + Sync {
    fn render(
        &self,
        dataset: &InvoiceDataset,
        header: &InvoiceHeader,
    ) -> Result<RenderedInvoice, RenderError>;
}

/// Plain-text invoice with one table row per event.
#[derive(Debug, Clone, Copy)]
pub struct TextRenderer {
    generated_on: NaiveDate,
}

impl TextRenderer {
    /// Renderer stamping documents with `generated_on`.
    pub const fn new(generated_on: NaiveDate) -> Self {
        Self { generated_on }
    }

    /// Renderer stamping documents with the current local date.
    pub fn today() -> Self {
        Self::new(Local::now().date_naive())
    }
}

impl Renderer for TextRenderer {
    fn render(
        &self,
        dataset: &InvoiceDataset,
        header: &InvoiceHeader,
    ) -> Result<RenderedInvoice, RenderError> {
        Ok(RenderedInvoice {
            extension: "txt",
            content: format_text(dataset, header, self.generated_on)?,
        })
    }
}

/// The dataset as pretty-printed JSON.
#[derive(Debug, Clone, Copy)]
pub struct JsonRenderer {
    generated_on: NaiveDate,
}

impl JsonRenderer {
    pub const fn new(generated_on: NaiveDate) -> Self {
        Self { generated_on }
    }

    pub fn today() -> Self {
        Self::new(Local::now().date_naive())
    }
}

#[derive(Serialize)]
struct JsonInvoice<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    logo: Option<&'a str>,
    header: &'a [String],
    total: String,
    generated_on: NaiveDate,
    #[serde(flatten)]
    dataset: &'a InvoiceDataset,
}

impl Renderer for JsonRenderer {
    fn render(
        &self,
        dataset: &InvoiceDataset,
        header: &InvoiceHeader,
    ) -> Result<RenderedInvoice, RenderError> {
        let doc = JsonInvoice {
            logo: header.logo.as_deref(),
            header: &header.header,
            total: dataset.total_hours_minutes(),
            generated_on: self.generated_on,
            dataset,
        };
        Ok(RenderedInvoice {
            extension: "json",
            content: serde_json::to_string_pretty(&doc)?,
        })
    }
}

/// `{customer}_{period-label}.{ext}`, e.g. `ABC_2024-03.txt`.
pub fn file_name(dataset: &InvoiceDataset, extension: &str) -> String {
    format!(
        "{}_{}.{extension}",
        dataset.customer(),
        dataset.period().label()
    )
}

/// Renders `dataset` and writes it into `output_dir`, returning the file path.
pub async fn write_invoice(
    renderer: &dyn Renderer,
    dataset: &InvoiceDataset,
    header: &InvoiceHeader,
    output_dir: &Path,
) -> Result<PathBuf, RenderError> {
    let rendered = renderer.render(dataset, header)?;
    let path = output_dir.join(file_name(dataset, rendered.extension));
    tokio::fs::write(&path, rendered.content)
        .await
        .map_err(|source| RenderError::Io {
            path: path.clone(),
            source,
        })?;
    tracing::debug!(customer = %dataset.customer(), path = %path.display(), "wrote invoice");
    Ok(path)
}

fn format_text(
    dataset: &InvoiceDataset,
    header: &InvoiceHeader,
    generated_on: NaiveDate,
) -> Result<String, std::fmt::Error> {
    let mut out = String::new();

    if let Some(logo) = &header.logo {
        writeln!(out, "{logo}")?;
        writeln!(out)?;
    }

    let title = format!(
        "INVOICE {} - {}",
        dataset.customer(),
        dataset.period().display_name()
    );
    writeln!(out, "{title}")?;
    writeln!(out, "{}", "=".repeat(title.chars().count()))?;
    writeln!(out)?;

    if !header.header.is_empty() {
        for line in &header.header {
            writeln!(out, "{line}")?;
        }
        writeln!(out)?;
    }

    writeln!(out, "Date        From   To     Duration  Description")?;
    writeln!(out, "----------  -----  -----  --------  -----------")?;
    for event in dataset.events() {
        writeln!(out, "{}", format_row(event).trim_end())?;
    }
    writeln!(out)?;

    let count = dataset.events().len();
    let noun = if count == 1 { "entry" } else { "entries" };
    writeln!(out, "Total: {} ({count} {noun})", dataset.total_hours_minutes())?;
    writeln!(out)?;
    writeln!(out, "Generated: {}", generated_on.format("%d.%m.%Y"))?;

    Ok(out)
}

fn format_row(event: &ClassifiedEvent) -> String {
    let start = event.event.start;
    let date = start.format("%d.%m.%Y").to_string();
    let from = start.format("%H:%M").to_string();
    let to = event
        .event
        .end
        .map(|end| end.format("%H:%M").to_string())
        .unwrap_or_default();
    let duration = event.duration.map(format_hours_minutes).unwrap_or_default();
    let text = event.display_text().lines().map(str::trim).collect::<Vec<_>>().join(" ");
    format!("{date:<10}  {from:<5}  {to:<5}  {duration:>8}  {text}")
}
