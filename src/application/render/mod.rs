//! Render engine: one artifact per active layout, plus the combined script.

pub mod sort;
pub mod template;

use std::fmt::Write as _;

use bytes::Bytes;
use metrics::counter;
use tracing::{debug, warn};

use crate::domain::layouts::{LayoutDefinition, LayoutKind};

use super::error::AppError;
use super::items::{ItemCache, ItemSnapshot};
use super::layouts::LayoutRegistry;
use template::TemplateError;

const SOURCE: &str = "application::render";

/// Broad artifact families, decided by the output filename extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Script,
    Markup,
    Data,
    Opaque,
}

impl ArtifactKind {
    pub fn from_output_file(name: &str) -> Self {
        match name.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase()) {
            Some(ext) if ext == "js" => Self::Script,
            Some(ext) if ext == "html" || ext == "htm" => Self::Markup,
            Some(ext) if ext == "json" || ext == "xml" => Self::Data,
            _ => Self::Opaque,
        }
    }
}

/// Media type for an artifact key; unrecognized extensions are opaque bytes.
pub fn content_type_for(output_file: &str) -> String {
    mime_guess::from_path(output_file)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderStatus {
    Added,
    Skipped,
    Error(String),
}

/// Per-layout outcome of a render pass.
#[derive(Debug, Clone)]
pub struct RenderResult {
    pub layout: String,
    pub output_file: String,
    pub items_rendered: usize,
    pub status: RenderStatus,
    /// Whether the subset was narrowed to the layout's highlight flag.
    pub flag_filtered: bool,
}

#[derive(Debug, Clone)]
pub struct Artifact {
    pub key: String,
    pub content_type: String,
    pub body: Bytes,
    pub kind: ArtifactKind,
}

/// Everything one render pass produced.
#[derive(Debug, Clone, Default)]
pub struct RenderBatch {
    pub results: Vec<RenderResult>,
    pub artifacts: Vec<Artifact>,
    /// Script artifacts concatenated into one callable-per-layout unit;
    /// written synchronously by the publisher.
    pub combined_script: Option<Artifact>,
}

#[derive(Clone)]
pub struct RenderEngine {
    layouts: LayoutRegistry,
    items: ItemCache,
    combined_script_file: String,
}

impl RenderEngine {
    pub fn new(layouts: LayoutRegistry, items: ItemCache, combined_script_file: String) -> Self {
        Self {
            layouts,
            items,
            combined_script_file,
        }
    }

    /// Render every active layout. Per-layout failures become `Error`
    /// results; only an unobtainable item set fails the whole pass.
    pub async fn render_all(&self) -> Result<RenderBatch, AppError> {
        let layouts = self.layouts.active_layouts().await;
        let items = self.items.classified_items().await?;

        let mut batch = RenderBatch::default();
        let mut combined = String::new();

        for layout in &layouts.all {
            if layout.kind() == LayoutKind::Menu {
                debug!(target: SOURCE, layout = layout.name, "menu layout skipped");
                batch.results.push(RenderResult {
                    layout: layout.name.clone(),
                    output_file: layout.output_file.clone(),
                    items_rendered: 0,
                    status: RenderStatus::Skipped,
                    flag_filtered: false,
                });
                continue;
            }

            match render_layout(layout, &items) {
                Ok(rendered) => {
                    let kind = ArtifactKind::from_output_file(&layout.output_file);
                    if kind == ArtifactKind::Script {
                        combined.push_str(&script_unit(&layout.name, &rendered.output));
                    }
                    batch.artifacts.push(Artifact {
                        key: layout.output_file.clone(),
                        content_type: content_type_for(&layout.output_file),
                        body: Bytes::from(rendered.output),
                        kind,
                    });
                    batch.results.push(RenderResult {
                        layout: layout.name.clone(),
                        output_file: layout.output_file.clone(),
                        items_rendered: rendered.items_rendered,
                        status: RenderStatus::Added,
                        flag_filtered: rendered.flag_filtered,
                    });
                }
                Err(err) => {
                    counter!("vetrina_render_error_total").increment(1);
                    warn!(
                        target: SOURCE,
                        layout = layout.name,
                        error = %err,
                        "layout failed to render; remaining layouts unaffected"
                    );
                    batch.results.push(RenderResult {
                        layout: layout.name.clone(),
                        output_file: layout.output_file.clone(),
                        items_rendered: 0,
                        status: RenderStatus::Error(err.to_string()),
                        flag_filtered: false,
                    });
                }
            }
        }

        if !combined.is_empty() {
            batch.combined_script = Some(Artifact {
                key: self.combined_script_file.clone(),
                content_type: content_type_for(&self.combined_script_file),
                body: Bytes::from(combined),
                kind: ArtifactKind::Script,
            });
        }

        Ok(batch)
    }
}

struct RenderedLayout {
    output: String,
    items_rendered: usize,
    flag_filtered: bool,
}

fn render_layout(
    layout: &LayoutDefinition,
    items: &ItemSnapshot,
) -> Result<RenderedLayout, TemplateError> {
    // Highlight layouts narrow to their flag; everything else renders the
    // full classified set, group layouts included.
    let (mut subset, flag_filtered) = match (layout.kind(), layout.selection_flag()) {
        (LayoutKind::Highlight(_), Some(flag)) => (items.for_flag(flag).to_vec(), true),
        _ => (items.all.clone(), false),
    };

    sort::sort_records(&mut subset, &layout.sort_spec);

    let default_limit = if layout.unbounded() {
        subset.len()
    } else {
        layout.capacity as usize
    };

    let rendered = template::render(&layout.body, &layout.name, &subset, default_limit)?;
    let mut output = rendered.output;

    if let Some(css) = &layout.css {
        let _ = write!(output, "<style>{css}</style>");
    }
    if let Some(js) = &layout.js {
        let _ = write!(output, "<script>{js}</script>");
    }

    Ok(RenderedLayout {
        output,
        items_rendered: rendered.items_rendered,
        flag_filtered,
    })
}

/// Wrap one layout's script output as a uniquely named callable unit for the
/// combined artifact.
fn script_unit(layout_name: &str, body: &str) -> String {
    let ident: String = layout_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("function layout_{ident}() {{\n{body}\n}}\n")
}
