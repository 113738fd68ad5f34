//! Shared fixtures for integration tests.
#![allow(dead_code)]

use idp_router::{DocumentDescriptor, PageMetrics, Result, layout::LayoutModelClient};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Payload carrying per-page layout metadata.
pub fn layout_payload(pages: Value) -> Value {
    json!({
        "s3": {"bucket": {"name": "intake"}},
        "documentMetadata": {"layout": {"pages": pages}}
    })
}

/// Payload declaring a page count with document-wide densities.
pub fn declared_payload(page_count: u64, text_density: f64) -> Value {
    json!({
        "documentMetadata": {
            "pageCount": page_count,
            "layout": {"textDensity": text_density, "imageDensity": 1.0 - text_density}
        }
    })
}

/// Scenario A: a single text-dense page with one table.
pub fn short_form_payload() -> Value {
    layout_payload(json!([
        {"textDensity": 0.8, "imageDensity": 0.05, "tableDensity": 0.2, "tableCount": 1}
    ]))
}

/// Model client that records calls and always returns the same pages.
pub struct FixedModelClient {
    pub pages: Vec<PageMetrics>,
    pub calls: AtomicUsize,
}

impl FixedModelClient {
    pub fn new(pages: Vec<PageMetrics>) -> Self {
        Self {
            pages,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl LayoutModelClient for FixedModelClient {
    fn name(&self) -> &str {
        "fixed"
    }

    fn infer(&self, _descriptor: &DocumentDescriptor, _content: Option<&[u8]>) -> Result<Option<Vec<PageMetrics>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Some(self.pages.clone()))
    }
}
