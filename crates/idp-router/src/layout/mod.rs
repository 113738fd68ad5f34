//! Layout analysers.
//!
//! A [`LayoutAnalyser`] turns a [`DocumentDescriptor`] (and optionally the raw
//! document bytes) into a [`DocumentProfile`]. Three implementations ship with
//! the crate:
//!
//! - [`HeuristicLayoutAnalyser`]: reads precomputed layout metadata from the payload
//! - [`ContentInspectingLayoutAnalyser`]: parses PDF, e-mail, HTML and plain text locally
//! - [`ModelBackedLayoutAnalyser`]: delegates to a [`LayoutModelClient`] under a deadline
//!
//! Analysers are chained explicitly with [`FallbackAnalyser`] and assembled from
//! configuration by [`build_analyser`].
use std::sync::Arc;
use std::time::Duration;

use crate::core::config::AnalyserConfig;
use crate::types::{DocumentDescriptor, DocumentProfile};
use crate::{Result, RouterError};

pub mod heuristic;
#[cfg(feature = "http-model")]
pub mod http;
pub mod inspect;
pub mod model;

pub use heuristic::HeuristicLayoutAnalyser;
#[cfg(feature = "http-model")]
pub use http::HttpLayoutModelClient;
pub use inspect::ContentInspectingLayoutAnalyser;
pub use model::{LayoutModelClient, LayoutModelType, ModelBackedLayoutAnalyser};

/// Produces a [`DocumentProfile`] for routing.
///
/// # Thread Safety
///
/// Analysers are shared across routing calls behind `Arc` and must be
/// `Send + Sync`. They should hold no per-call state.
///
/// # Errors
///
/// Failures should be recoverable [`RouterError`] variants
/// (`MissingLayoutData`, `MissingContent`, `UnsupportedContent`, `Parsing`,
/// `Transport`, `Timeout`, `EmptyInference`). The router absorbs them and
/// degrades to the fallback strategy.
///
/// # Example
///
/// ```rust
/// use idp_router::layout::LayoutAnalyser;
/// use idp_router::{DocumentDescriptor, DocumentProfile, PageMetrics, Result};
///
/// struct SinglePage;
///
/// impl LayoutAnalyser for SinglePage {
///     fn name(&self) -> &str {
///         "single-page"
///     }
///
///     fn analyse(&self, _descriptor: &DocumentDescriptor, _content: Option<&[u8]>) -> Result<DocumentProfile> {
///         Ok(DocumentProfile::from_pages(vec![PageMetrics::new(0, 0.8, 0.1, 0.0)]))
///     }
/// }
/// ```
pub trait LayoutAnalyser: Send + Sync {
    /// Identifier used in log fields.
    fn name(&self) -> &str;

    /// Whether the router should resolve document bytes before calling [`analyse`](Self::analyse).
    fn requires_content(&self) -> bool {
        false
    }

    fn analyse(&self, descriptor: &DocumentDescriptor, content: Option<&[u8]>) -> Result<DocumentProfile>;
}

/// Runs `primary`, and `secondary` when the primary fails recoverably.
pub struct FallbackAnalyser {
    primary: Arc<dyn LayoutAnalyser>,
    secondary: Arc<dyn LayoutAnalyser>,
    name: String,
}

impl FallbackAnalyser {
    pub fn new(primary: Arc<dyn LayoutAnalyser>, secondary: Arc<dyn LayoutAnalyser>) -> Self {
        let name = format!("{}+{}", primary.name(), secondary.name());
        Self {
            primary,
            secondary,
            name,
        }
    }
}

impl LayoutAnalyser for FallbackAnalyser {
    fn name(&self) -> &str {
        &self.name
    }

    fn requires_content(&self) -> bool {
        self.primary.requires_content() || self.secondary.requires_content()
    }

    fn analyse(&self, descriptor: &DocumentDescriptor, content: Option<&[u8]>) -> Result<DocumentProfile> {
        match self.primary.analyse(descriptor, content) {
            Ok(profile) => Ok(profile),
            Err(err) if err.is_recoverable() => {
                tracing::warn!(
                    object_key = %descriptor.object_key,
                    analyser = self.primary.name(),
                    fallback = self.secondary.name(),
                    error = %err,
                    "Layout analyser failed, using fallback"
                );
                self.secondary.analyse(descriptor, content)
            }
            Err(err) => Err(err),
        }
    }
}

/// Assemble an analyser chain from configuration.
///
/// `model_client` takes precedence over any endpoint configured for a
/// model-backed analyser.
pub fn build_analyser(
    config: &AnalyserConfig,
    model_client: Option<Arc<dyn LayoutModelClient>>,
) -> Result<Arc<dyn LayoutAnalyser>> {
    match config {
        AnalyserConfig::Heuristic => Ok(Arc::new(HeuristicLayoutAnalyser)),
        AnalyserConfig::ContentInspecting { fallback } => {
            let inspector: Arc<dyn LayoutAnalyser> = Arc::new(ContentInspectingLayoutAnalyser::new());
            match fallback {
                Some(secondary) => {
                    let secondary = build_analyser(secondary, model_client)?;
                    Ok(Arc::new(FallbackAnalyser::new(inspector, secondary)))
                }
                None => Ok(inspector),
            }
        }
        AnalyserConfig::ModelBacked(model) => {
            let client = match model_client.clone() {
                Some(client) => client,
                None => model_client_from_config(model)?,
            };
            let fallback = model
                .fallback
                .as_deref()
                .map(|secondary| build_analyser(secondary, model_client))
                .transpose()?;

            let mut analyser = ModelBackedLayoutAnalyser::new(client)
                .with_timeout(Duration::from_millis(model.timeout_ms))
                .with_max_retries(model.max_retries)
                .with_send_content(model.send_content);
            if let Some(fallback) = fallback {
                analyser = analyser.with_fallback(fallback);
            }
            Ok(Arc::new(analyser))
        }
    }
}

#[cfg(feature = "http-model")]
fn model_client_from_config(model: &crate::core::config::ModelAnalyserConfig) -> Result<Arc<dyn LayoutModelClient>> {
    let endpoint = model.endpoint.as_deref().ok_or_else(|| {
        RouterError::configuration("model_backed analyser requires an endpoint or an injected model client")
    })?;
    let client = HttpLayoutModelClient::new(endpoint, Duration::from_millis(model.timeout_ms))?
        .with_api_key(model.resolve_api_key())
        .with_model_type(model.model_type);
    Ok(Arc::new(client))
}

#[cfg(not(feature = "http-model"))]
fn model_client_from_config(model: &crate::core::config::ModelAnalyserConfig) -> Result<Arc<dyn LayoutModelClient>> {
    let _ = model;
    Err(RouterError::configuration(
        "model_backed analyser requires an injected model client when the http-model feature is disabled",
    ))
}
