//! Layout analysis from precomputed payload metadata.
use serde_json::Value;

use super::LayoutAnalyser;
use crate::core::payload;
use crate::types::{DocumentDescriptor, DocumentProfile, PageMetrics};
use crate::{Result, RouterError};

/// Largest declared page count pages are synthesised for.
const MAX_SYNTHESISED_PAGES: u64 = 100_000;

/// Reads `documentMetadata.layout` from the payload.
///
/// Per-page details in `layout.pages` are used as-is. Otherwise pages are
/// synthesised from document-wide `textDensity`, `imageDensity` and
/// `tableDensity`, one per declared page (at least one when a `layout` block
/// exists). A payload with neither, or declaring more pages than can be
/// synthesised, is `MissingLayoutData`.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicLayoutAnalyser;

impl LayoutAnalyser for HeuristicLayoutAnalyser {
    fn name(&self) -> &str {
        "heuristic"
    }

    fn analyse(&self, descriptor: &DocumentDescriptor, _content: Option<&[u8]>) -> Result<DocumentProfile> {
        let layout = descriptor
            .payload
            .pointer("/documentMetadata/layout")
            .filter(|layout| layout.is_object());

        if let Some(pages) = layout
            .and_then(|layout| layout.get("pages"))
            .and_then(Value::as_array)
            .filter(|pages| !pages.is_empty())
        {
            let metrics = pages
                .iter()
                .enumerate()
                .map(|(position, page)| payload::page_metrics_from_value(position as u32, page))
                .collect();
            return Ok(DocumentProfile::from_pages(metrics));
        }

        let declared = payload::infer_page_count(&descriptor.payload).filter(|count| *count > 0);
        let page_count = match (declared, layout) {
            (Some(count), _) if count > MAX_SYNTHESISED_PAGES => {
                tracing::warn!(
                    object_key = %descriptor.object_key,
                    declared = count,
                    limit = MAX_SYNTHESISED_PAGES,
                    "Declared page count too large to synthesise page metrics"
                );
                return Err(RouterError::MissingLayoutData(descriptor.object_key.clone()));
            }
            (Some(count), _) => count,
            (None, Some(_)) => 1,
            (None, None) => return Err(RouterError::MissingLayoutData(descriptor.object_key.clone())),
        };

        let field = |camel: &str, snake: &str| {
            layout.and_then(|layout| {
                layout
                    .get(camel)
                    .and_then(payload::safe_f64)
                    .or_else(|| layout.get(snake).and_then(payload::safe_f64))
            })
        };
        let text_density = field("textDensity", "text_density").unwrap_or(0.5);
        let image_density = field("imageDensity", "image_density").unwrap_or(1.0 - text_density);
        let table_density = field("tableDensity", "table_density").unwrap_or(0.0);

        tracing::debug!(
            object_key = %descriptor.object_key,
            page_count,
            "Synthesising uniform page metrics from document-level layout hints"
        );

        let pages = (0..page_count)
            .map(|index| PageMetrics::new(index as u32, text_density, image_density, table_density))
            .collect();
        Ok(DocumentProfile::from_pages(pages))
    }
}
