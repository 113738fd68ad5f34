//! Routing orchestration.
//!
//! [`DocumentRouter`] composes override resolution, layout analysis,
//! categorization and threshold checks into a single synchronous
//! [`route`](DocumentRouter::route) call. [`RouterHandle`] owns the active
//! router and swaps it atomically when configuration is reloaded.
use chrono::Utc;
use parking_lot::RwLock;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

use super::config::{RouterConfig, RoutingMode};
use super::{mime, payload};
use crate::Result;
use crate::categorize::categorize;
use crate::content::{ContentResolver, InlineContentResolver};
use crate::layout::{self, LayoutAnalyser, LayoutModelClient};
use crate::overrides::{OverrideSet, parse_request_override};
use crate::types::{
    DocumentAnalysis, DocumentCategory, DocumentDescriptor, DocumentProfile, ParserStrategy, reasons, tags,
};

/// Collaborators injected at build time and carried across reloads.
#[derive(Clone)]
struct Collaborators {
    resolvers: Vec<Arc<dyn ContentResolver>>,
    model_client: Option<Arc<dyn LayoutModelClient>>,
    analyser: Option<Arc<dyn LayoutAnalyser>>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            resolvers: vec![Arc::new(InlineContentResolver)],
            model_client: None,
            analyser: None,
        }
    }
}

/// Builder for [`DocumentRouter`].
///
/// # Example
///
/// ```rust
/// use idp_router::{DocumentDescriptor, RouterBuilder, RouterConfig};
///
/// let router = RouterBuilder::new(RouterConfig::default())
///     .content_resolver(|_: &DocumentDescriptor| -> Option<Vec<u8>> { None })
///     .build()
///     .unwrap();
/// assert_eq!(router.analyser_name(), "heuristic");
/// ```
pub struct RouterBuilder {
    config: RouterConfig,
    collaborators: Collaborators,
    custom_resolvers: bool,
}

impl RouterBuilder {
    pub fn new(config: RouterConfig) -> Self {
        Self {
            config,
            collaborators: Collaborators::default(),
            custom_resolvers: false,
        }
    }

    /// Add a content resolver. The first call replaces the inline default;
    /// resolvers are consulted in the order they were added.
    pub fn content_resolver(mut self, resolver: impl ContentResolver + 'static) -> Self {
        self.push_resolver(Arc::new(resolver));
        self
    }

    /// Replace all content resolvers.
    pub fn content_resolvers(mut self, resolvers: Vec<Arc<dyn ContentResolver>>) -> Self {
        self.collaborators.resolvers = resolvers;
        self.custom_resolvers = true;
        self
    }

    /// Client used by a model-backed analyser instead of one built from its endpoint.
    pub fn model_client(mut self, client: Arc<dyn LayoutModelClient>) -> Self {
        self.collaborators.model_client = Some(client);
        self
    }

    /// Use this analyser instead of the one described by `config.analyser`.
    pub fn layout_analyser(mut self, analyser: Arc<dyn LayoutAnalyser>) -> Self {
        self.collaborators.analyser = Some(analyser);
        self
    }

    fn push_resolver(&mut self, resolver: Arc<dyn ContentResolver>) {
        if !self.custom_resolvers {
            self.collaborators.resolvers.clear();
            self.custom_resolvers = true;
        }
        self.collaborators.resolvers.push(resolver);
    }

    /// Validate the configuration and assemble the router.
    ///
    /// # Errors
    ///
    /// `RouterError::Configuration` for inconsistent configuration,
    /// `RouterError::Pattern` for an override that does not compile.
    pub fn build(self) -> Result<DocumentRouter> {
        DocumentRouter::assemble(self.config, self.collaborators)
    }
}

/// The routing engine.
///
/// Immutable once built; share it behind `Arc` and route from any thread.
pub struct DocumentRouter {
    config: RouterConfig,
    overrides: OverrideSet,
    analyser: Arc<dyn LayoutAnalyser>,
    collaborators: Collaborators,
}

impl std::fmt::Debug for DocumentRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentRouter")
            .field("mode", &self.config.mode)
            .field("analyser", &self.analyser.name())
            .field("pattern_overrides", &self.overrides.len())
            .field("resolvers", &self.collaborators.resolvers.len())
            .finish()
    }
}

/// Intermediate decision before it is stamped into a [`DocumentAnalysis`].
struct Decision {
    strategy: ParserStrategy,
    category: DocumentCategory,
    profile: DocumentProfile,
    overrides_applied: Vec<String>,
}

impl Decision {
    fn preempted(strategy: ParserStrategy, tag: String) -> Self {
        Self {
            strategy,
            category: DocumentCategory::Unknown,
            profile: DocumentProfile::empty(),
            overrides_applied: vec![tag],
        }
    }
}

impl DocumentRouter {
    /// Build a router with the inline content resolver and the configured analyser.
    pub fn new(config: RouterConfig) -> Result<Self> {
        RouterBuilder::new(config).build()
    }

    pub fn builder(config: RouterConfig) -> RouterBuilder {
        RouterBuilder::new(config)
    }

    fn assemble(config: RouterConfig, collaborators: Collaborators) -> Result<Self> {
        config.validate()?;
        let overrides = config.compile_overrides()?;
        let analyser = match &collaborators.analyser {
            Some(analyser) => Arc::clone(analyser),
            None => layout::build_analyser(&config.analyser, collaborators.model_client.clone())?,
        };

        tracing::debug!(
            mode = ?config.mode,
            analyser = analyser.name(),
            pattern_overrides = overrides.len(),
            "Document router built"
        );

        Ok(Self {
            config,
            overrides,
            analyser,
            collaborators,
        })
    }

    /// Build a new router from `config`, keeping this router's injected
    /// resolvers, model client and analyser.
    pub fn reconfigure(&self, config: RouterConfig) -> Result<Self> {
        Self::assemble(config, self.collaborators.clone())
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Pattern overrides compiled from this router's configuration.
    pub fn overrides(&self) -> &OverrideSet {
        &self.overrides
    }

    pub fn analyser_name(&self) -> &str {
        self.analyser.name()
    }

    /// Build the per-call descriptor: bucket, mime type and request override.
    pub fn describe(&self, payload: &Value, object_key: &str) -> DocumentDescriptor {
        DocumentDescriptor {
            object_key: object_key.to_string(),
            bucket: payload::bucket(payload),
            payload: payload.clone(),
            mime_type: mime::detect_mime_type(object_key, payload),
            request_override: parse_request_override(payload, &self.config.request_override_flag_name),
        }
    }

    /// Route using the pattern overrides from this router's own configuration.
    pub fn route_configured(&self, payload: &Value, object_key: &str) -> DocumentAnalysis {
        self.route(payload, object_key, &self.overrides)
    }

    /// Decide which strategy handles a document.
    ///
    /// Precedence: request override, then the first matching pattern in
    /// `overrides`, then the static strategy in static mode, then the
    /// category default derived from layout analysis. Never fails; analysis
    /// errors resolve to the fallback strategy with reason `analysis_failed`.
    pub fn route(&self, payload: &Value, object_key: &str, overrides: &OverrideSet) -> DocumentAnalysis {
        let descriptor = self.describe(payload, object_key);
        let decision = self.decide(&descriptor, overrides);

        tracing::debug!(
            object_key = %descriptor.object_key,
            mime_type = %descriptor.mime_type,
            category = %decision.category,
            strategy = %decision.strategy.name,
            reason = %decision.strategy.reason,
            overrides = ?decision.overrides_applied,
            "Routing decision"
        );

        let request_override = descriptor
            .request_override
            .as_ref()
            .filter(|_| decision.strategy.reason == reasons::REQUEST_OVERRIDE)
            .map(|strategy| strategy.name.clone());

        DocumentAnalysis {
            object_key: descriptor.object_key,
            bucket: descriptor.bucket,
            mime_type: descriptor.mime_type,
            profile: decision.profile,
            category: decision.category,
            strategy: decision.strategy,
            overrides_applied: decision.overrides_applied,
            request_override,
            timestamp: Utc::now(),
        }
    }

    fn decide(&self, descriptor: &DocumentDescriptor, overrides: &OverrideSet) -> Decision {
        if let Some(strategy) = &descriptor.request_override {
            return Decision::preempted(
                ParserStrategy::from_config(strategy, reasons::REQUEST_OVERRIDE),
                tags::REQUEST_OVERRIDE.to_string(),
            );
        }

        if let Some(hit) = overrides.first_match(descriptor) {
            return Decision::preempted(
                ParserStrategy::from_config(hit.strategy(), reasons::PATTERN_OVERRIDE),
                format!("{}{}", tags::PATTERN_PREFIX, hit.pattern()),
            );
        }

        if self.config.mode == RoutingMode::Static
            && let Some(strategy) = &self.config.static_strategy
        {
            return Decision::preempted(
                ParserStrategy::from_config(strategy, reasons::STATIC),
                tags::STATIC_CONFIG.to_string(),
            );
        }

        self.decide_from_layout(descriptor)
    }

    fn decide_from_layout(&self, descriptor: &DocumentDescriptor) -> Decision {
        let content = if self.analyser.requires_content() {
            self.resolve_content(descriptor)
        } else {
            None
        };

        let profile = match self.analyser.analyse(descriptor, content.as_deref()) {
            Ok(profile) => profile,
            Err(err) => {
                tracing::warn!(
                    object_key = %descriptor.object_key,
                    analyser = self.analyser.name(),
                    error = %err,
                    "Layout analysis failed, routing to fallback strategy"
                );
                return Decision {
                    strategy: ParserStrategy::from_config(&self.config.fallback_strategy, reasons::ANALYSIS_FAILED),
                    category: DocumentCategory::Unknown,
                    profile: DocumentProfile::empty(),
                    overrides_applied: vec![tags::CATEGORY_DEFAULT.to_string(), tags::ANALYSIS_FAILED.to_string()],
                };
            }
        };

        let category = categorize(&profile, &self.config.category_thresholds);
        let (chosen, reason) = self.config.strategy_for(category);
        let mut strategy = ParserStrategy::from_config(chosen, reason);
        let mut overrides_applied = vec![tags::CATEGORY_DEFAULT.to_string()];

        if let Some(cap) = self.config.category_thresholds.max_pages_for(category)
            && profile.page_count() as u64 > u64::from(cap)
        {
            tracing::debug!(
                object_key = %descriptor.object_key,
                category = %category,
                pages = profile.page_count(),
                cap,
                strategy = %chosen.name,
                fallback = %self.config.fallback_strategy.name,
                "Page count over threshold, redirecting to fallback strategy"
            );
            strategy = ParserStrategy::from_config(&self.config.fallback_strategy, reasons::PAGE_THRESHOLD_EXCEEDED);
            strategy.max_pages = Some(cap);
            overrides_applied.push(tags::THRESHOLD_REDIRECT.to_string());
        }

        Decision {
            strategy,
            category,
            profile,
            overrides_applied,
        }
    }

    fn resolve_content(&self, descriptor: &DocumentDescriptor) -> Option<Vec<u8>> {
        for resolver in &self.collaborators.resolvers {
            if let Some(bytes) = resolver.resolve(descriptor).filter(|bytes| !bytes.is_empty()) {
                tracing::debug!(
                    object_key = %descriptor.object_key,
                    resolver = resolver.name(),
                    bytes = bytes.len(),
                    "Resolved document content"
                );
                return Some(bytes);
            }
        }
        tracing::debug!(object_key = %descriptor.object_key, "No content resolver produced document bytes");
        None
    }
}

/// Owns the active [`DocumentRouter`] and replaces it on reload.
///
/// Routing clones the current snapshot and releases the lock before any work
/// happens, so a reload never blocks on or disturbs in-flight calls. A reload
/// that fails validation leaves the active router unchanged.
///
/// # Example
///
/// ```rust
/// use idp_router::{RouterConfig, RouterHandle};
/// use serde_json::json;
///
/// let handle = RouterHandle::new(RouterConfig::default()).unwrap();
/// handle
///     .reload_from_value(json!({"mode": "static", "static_strategy": "force_textract"}))
///     .unwrap();
///
/// let analysis = handle.route(&json!({}), "inbound/a.pdf");
/// assert_eq!(analysis.strategy.name, "force_textract");
/// ```
pub struct RouterHandle {
    current: RwLock<Arc<DocumentRouter>>,
}

impl RouterHandle {
    pub fn new(config: RouterConfig) -> Result<Self> {
        Ok(Self::from_router(DocumentRouter::new(config)?))
    }

    pub fn from_router(router: DocumentRouter) -> Self {
        Self {
            current: RwLock::new(Arc::new(router)),
        }
    }

    /// The router serving new calls right now.
    pub fn snapshot(&self) -> Arc<DocumentRouter> {
        Arc::clone(&self.current.read())
    }

    /// Validate and build a router for `config`, then swap it in.
    pub fn reload(&self, config: RouterConfig) -> Result<()> {
        let current = self.snapshot();
        let next = match current.reconfigure(config) {
            Ok(next) => next,
            Err(err) => {
                tracing::warn!(error = %err, "Router reload rejected, keeping active configuration");
                return Err(err);
            }
        };

        tracing::info!(
            mode = ?next.config.mode,
            analyser = next.analyser_name(),
            pattern_overrides = next.overrides.len(),
            "Router configuration reloaded"
        );
        *self.current.write() = Arc::new(next);
        Ok(())
    }

    /// Reload from a key/value record; see [`RouterConfig::from_value`].
    pub fn reload_from_value(&self, value: Value) -> Result<()> {
        self.reload(RouterConfig::from_value(value)?)
    }

    /// Reload from a TOML, YAML or JSON file.
    pub fn reload_from_file(&self, path: impl AsRef<Path>) -> Result<()> {
        self.reload(RouterConfig::from_file(path)?)
    }

    pub fn route(&self, payload: &Value, object_key: &str) -> DocumentAnalysis {
        self.snapshot().route_configured(payload, object_key)
    }

    pub fn route_with(&self, payload: &Value, object_key: &str, overrides: &OverrideSet) -> DocumentAnalysis {
        self.snapshot().route(payload, object_key, overrides)
    }
}
