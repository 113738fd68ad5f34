//! Router configuration loading and validation.
//!
//! [`RouterConfig`] can be loaded from TOML, YAML or JSON files, rehydrated
//! from a flat key/value record (where structured values may be stored as
//! JSON text), or built programmatically.
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

use crate::categorize::CategoryThresholds;
use crate::layout::LayoutModelType;
use crate::overrides::{MatchTarget, OverrideSet, PatternOverrideConfig};
use crate::types::{DocumentCategory, StrategyConfig, reasons};
use crate::{Result, RouterError};

/// File name looked up by [`RouterConfig::discover`].
pub const CONFIG_FILE_NAME: &str = "idp-router.toml";

/// Keys whose values may arrive as JSON text in a key/value record.
const STRUCTURED_KEYS: [&str; 6] = [
    "category_thresholds",
    "default_strategy_map",
    "static_strategy",
    "fallback_strategy",
    "pattern_overrides",
    "analyser",
];

/// How the router chooses a strategy once overrides have been checked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutingMode {
    /// Analyse the document and pick the category default.
    #[default]
    #[serde(alias = "HYBRID")]
    Hybrid,
    /// Always use the static strategy; no analysis.
    #[serde(alias = "STATIC")]
    Static,
}

/// Layout analyser selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnalyserConfig {
    Heuristic,
    ContentInspecting {
        /// Runs when inspection fails; heuristic unless set to `null`.
        #[serde(default = "default_analyser_fallback")]
        fallback: Option<Box<AnalyserConfig>>,
    },
    ModelBacked(ModelAnalyserConfig),
}

impl Default for AnalyserConfig {
    fn default() -> Self {
        AnalyserConfig::Heuristic
    }
}

impl AnalyserConfig {
    /// Content inspection with the heuristic analyser as fallback.
    pub fn default_content_inspecting() -> Self {
        AnalyserConfig::ContentInspecting {
            fallback: default_analyser_fallback(),
        }
    }

    fn validate(&self) -> Result<()> {
        match self {
            AnalyserConfig::Heuristic => Ok(()),
            AnalyserConfig::ContentInspecting { fallback } => fallback.as_deref().map_or(Ok(()), Self::validate),
            AnalyserConfig::ModelBacked(model) => {
                if model.timeout_ms == 0 {
                    return Err(RouterError::configuration("model_backed analyser timeout_ms must be positive"));
                }
                if let Some(endpoint) = &model.endpoint
                    && endpoint.trim().is_empty()
                {
                    return Err(RouterError::configuration("model_backed analyser endpoint cannot be empty"));
                }
                model.fallback.as_deref().map_or(Ok(()), Self::validate)
            }
        }
    }
}

/// Settings for the model-backed analyser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelAnalyserConfig {
    /// Inference endpoint; not needed when a client is injected.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    /// Environment variable holding the API key.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub model_type: Option<LayoutModelType>,
    /// Deadline for a whole analysis, retries included.
    #[serde(default = "default_model_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_true")]
    pub send_content: bool,
    #[serde(default = "default_analyser_fallback")]
    pub fallback: Option<Box<AnalyserConfig>>,
}

impl Default for ModelAnalyserConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            api_key_env: None,
            model_type: None,
            timeout_ms: default_model_timeout_ms(),
            max_retries: default_max_retries(),
            send_content: true,
            fallback: default_analyser_fallback(),
        }
    }
}

impl ModelAnalyserConfig {
    /// Explicit key first, then the configured environment variable.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| self.api_key_env.as_deref().and_then(|var| std::env::var(var).ok()))
            .filter(|key| !key.is_empty())
    }
}

/// Complete router configuration.
///
/// # Example
///
/// ```rust
/// use idp_router::core::config::{RouterConfig, RoutingMode};
///
/// let config = RouterConfig::from_toml_str(r#"
/// mode = "hybrid"
/// fallback_strategy = "asynchronous_pipeline"
///
/// [default_strategy_map]
/// short_form = { name = "azure_form_recognizer", model = "prebuilt-layout" }
///
/// [category_thresholds]
/// long_form_max_pages = 80
/// "#).unwrap();
///
/// assert_eq!(config.mode, RoutingMode::Hybrid);
/// assert_eq!(config.category_thresholds.long_form_max_pages, Some(80));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterConfig {
    #[serde(default)]
    pub mode: RoutingMode,

    #[serde(default)]
    pub category_thresholds: CategoryThresholds,

    /// Strategy per category; absent categories use `fallback_strategy`.
    #[serde(default)]
    pub default_strategy_map: BTreeMap<DocumentCategory, StrategyConfig>,

    /// Required in static mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub static_strategy: Option<StrategyConfig>,

    #[serde(default = "default_fallback_strategy")]
    pub fallback_strategy: StrategyConfig,

    /// Payload key carrying a request-level strategy override.
    #[serde(default = "default_request_override_flag", alias = "request_override_flag")]
    pub request_override_flag_name: String,

    /// Evaluated in order; first match wins.
    #[serde(default)]
    pub pattern_overrides: Vec<PatternOverrideConfig>,

    #[serde(default)]
    pub match_target: MatchTarget,

    #[serde(default)]
    pub analyser: AnalyserConfig,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            mode: RoutingMode::default(),
            category_thresholds: CategoryThresholds::default(),
            default_strategy_map: BTreeMap::new(),
            static_strategy: None,
            fallback_strategy: default_fallback_strategy(),
            request_override_flag_name: default_request_override_flag(),
            pattern_overrides: Vec::new(),
            match_target: MatchTarget::default(),
            analyser: AnalyserConfig::default(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_fallback_strategy() -> StrategyConfig {
    StrategyConfig::named("fallback_non_azure")
}

fn default_request_override_flag() -> String {
    "parser_override".to_string()
}

fn default_model_timeout_ms() -> u64 {
    30_000
}

fn default_max_retries() -> u32 {
    2
}

fn default_analyser_fallback() -> Option<Box<AnalyserConfig>> {
    Some(Box::new(AnalyserConfig::Heuristic))
}

impl RouterConfig {
    /// Check internal consistency. Called by every loader and by router construction.
    pub fn validate(&self) -> Result<()> {
        if self.mode == RoutingMode::Static && self.static_strategy.is_none() {
            return Err(RouterError::configuration("static mode requires a static_strategy"));
        }
        if let Some(static_strategy) = &self.static_strategy {
            static_strategy.validate("static_strategy")?;
        }
        self.fallback_strategy.validate("fallback_strategy")?;
        for (category, strategy) in &self.default_strategy_map {
            strategy.validate(&format!("default_strategy_map.{}", category))?;
        }
        if self.request_override_flag_name.trim().is_empty() {
            return Err(RouterError::configuration("request_override_flag_name cannot be empty"));
        }
        self.category_thresholds.validate()?;
        self.analyser.validate()?;
        self.compile_overrides()?;
        Ok(())
    }

    /// Compile `pattern_overrides` against `match_target`.
    pub fn compile_overrides(&self) -> Result<OverrideSet> {
        OverrideSet::compile(&self.pattern_overrides, self.match_target)
    }

    /// Default strategy for a category and the reason to record with it.
    pub fn strategy_for(&self, category: DocumentCategory) -> (&StrategyConfig, &'static str) {
        match self.default_strategy_map.get(&category) {
            Some(strategy) => (strategy, reasons::CATEGORY_DEFAULT),
            None => (&self.fallback_strategy, reasons::CATEGORY_FALLBACK),
        }
    }

    /// Rehydrate from a key/value record.
    ///
    /// Structured keys (`category_thresholds`, `default_strategy_map`,
    /// `pattern_overrides`, ...) may hold JSON text instead of nested values.
    pub fn from_value(value: Value) -> Result<Self> {
        let value = match value {
            Value::Object(record) => Value::Object(expand_structured_values(record)),
            other => other,
        };
        let config: RouterConfig = serde_json::from_value(value)
            .map_err(|e| RouterError::configuration_with_source(format!("Invalid router configuration: {}", e), e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(content)
            .map_err(|e| RouterError::configuration_with_source(format!("Invalid JSON configuration: {}", e), e))?;
        Self::from_value(value)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: RouterConfig = toml::from_str(content)
            .map_err(|e| RouterError::configuration_with_source(format!("Invalid TOML configuration: {}", e), e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: RouterConfig = serde_yaml_ng::from_str(content)
            .map_err(|e| RouterError::configuration_with_source(format!("Invalid YAML configuration: {}", e), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns `RouterError::Configuration` if the file cannot be read, is not
    /// valid TOML, or describes an inconsistent router.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = read_config(path.as_ref())?;
        Self::from_toml_str(&content).map_err(|e| in_file(path.as_ref(), e))
    }

    /// Load configuration from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = read_config(path.as_ref())?;
        Self::from_yaml_str(&content).map_err(|e| in_file(path.as_ref(), e))
    }

    /// Load configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = read_config(path.as_ref())?;
        Self::from_json_str(&content).map_err(|e| in_file(path.as_ref(), e))
    }

    /// Load configuration choosing the format from the file extension.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase());

        match extension.as_deref() {
            Some("toml") => Self::from_toml_file(path),
            Some("yaml") | Some("yml") => Self::from_yaml_file(path),
            Some("json") => Self::from_json_file(path),
            _ => Err(RouterError::configuration(format!(
                "Unsupported configuration format: {} (expected .toml, .yaml, .yml or .json)",
                path.display()
            ))),
        }
    }

    /// Discover `idp-router.toml` in the current directory or its parents.
    ///
    /// # Returns
    ///
    /// - `Some(config)` if found
    /// - `None` if no config file found
    pub fn discover() -> Result<Option<Self>> {
        let current = std::env::current_dir()?;
        Self::discover_from(&current)
    }

    /// Like [`discover`](Self::discover), starting from `start`.
    pub fn discover_from(start: &Path) -> Result<Option<Self>> {
        for dir in start.ancestors() {
            let candidate = dir.join(CONFIG_FILE_NAME);
            if candidate.is_file() {
                tracing::debug!(path = %candidate.display(), "Discovered router configuration");
                return Ok(Some(Self::from_toml_file(candidate)?));
            }
        }
        Ok(None)
    }
}

fn read_config(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| {
        RouterError::configuration_with_source(format!("Failed to read config file {}: {}", path.display(), e), e)
    })
}

fn in_file(path: &Path, err: RouterError) -> RouterError {
    match err {
        RouterError::Configuration { message, source } => RouterError::Configuration {
            message: format!("{} ({})", message, path.display()),
            source,
        },
        other => other,
    }
}

fn expand_structured_values(mut record: Map<String, Value>) -> Map<String, Value> {
    for key in STRUCTURED_KEYS {
        let Some(Value::String(text)) = record.get(key) else {
            continue;
        };
        let trimmed = text.trim();
        if !(trimmed.starts_with('{') || trimmed.starts_with('[')) {
            continue;
        }
        match serde_json::from_str::<Value>(trimmed) {
            Ok(parsed) => {
                record.insert(key.to_string(), parsed);
            }
            Err(e) => {
                tracing::warn!(key, error = %e, "Configuration value looks like JSON but does not parse");
            }
        }
    }
    record
}
