//! idp-router - Document Routing Engine
//!
//! Decides which downstream parsing strategy should handle an inbound document
//! and records the decision in an auditable [`DocumentAnalysis`].
//!
//! # Quick Start
//!
//! ```rust
//! use idp_router::{DocumentRouter, RouterConfig};
//! use serde_json::json;
//!
//! # fn main() -> idp_router::Result<()> {
//! let config = RouterConfig::from_value(json!({
//!     "default_strategy_map": {"short_form": "azure_form_recognizer"},
//! }))?;
//! let router = DocumentRouter::new(config)?;
//!
//! let payload = json!({
//!     "documentMetadata": {"pageCount": 1, "layout": {"textDensity": 0.8, "imageDensity": 0.1}}
//! });
//! let analysis = router.route_configured(&payload, "inbound/claim.pdf");
//! assert_eq!(analysis.strategy.name, "azure_form_recognizer");
//! assert_eq!(analysis.overrides_applied, vec!["category_default"]);
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - **Core Module** (`core`): routing orchestration, configuration, MIME detection
//! - **Layout** (`layout`): heuristic, content-inspecting and model-backed analysers
//! - **Categorization** (`categorize`): threshold rules mapping a profile to a category
//! - **Overrides** (`overrides`): request-level and pattern overrides
//! - **Content** (`content`): on-demand document byte resolution
//!
//! # Features
//!
//! - `pdf`: PDF inspection via lopdf
//! - `email`: RFC822 inspection via mail-parser
//! - `http-model`: HTTP layout model client via reqwest

#![deny(unsafe_code)]

pub mod categorize;
pub mod content;
pub mod core;
pub mod error;
pub mod layout;
pub mod overrides;
pub mod types;

pub use error::{Result, RouterError};
pub use types::*;

pub use categorize::{CategoryThresholds, categorize};
pub use content::{ContentResolver, InlineContentResolver};
pub use overrides::{MatchTarget, OverrideSet, PatternOverride, PatternOverrideConfig, parse_request_override};

pub use core::config::{AnalyserConfig, ModelAnalyserConfig, RouterConfig, RoutingMode};
pub use core::router::{DocumentRouter, RouterBuilder, RouterHandle};

pub use layout::{FallbackAnalyser, LayoutAnalyser, LayoutModelClient, LayoutModelType, build_analyser};
