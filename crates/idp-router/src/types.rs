use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::{Result, RouterError};

// ============================================================================
// Decision tags and reasons
// ============================================================================

/// Tags appended to [`DocumentAnalysis::overrides_applied`].
pub mod tags {
    pub const REQUEST_OVERRIDE: &str = "request_override";
    pub const PATTERN_PREFIX: &str = "pattern:";
    pub const STATIC_CONFIG: &str = "static_config";
    pub const CATEGORY_DEFAULT: &str = "category_default";
    pub const THRESHOLD_REDIRECT: &str = "threshold_redirect";
    pub const ANALYSIS_FAILED: &str = "analysis_failed";
}

/// Values of [`ParserStrategy::reason`].
pub mod reasons {
    pub const REQUEST_OVERRIDE: &str = "request_override";
    pub const PATTERN_OVERRIDE: &str = "config_pattern_override";
    pub const STATIC: &str = "config_static";
    pub const CATEGORY_DEFAULT: &str = "category_default";
    pub const CATEGORY_FALLBACK: &str = "category_fallback";
    pub const PAGE_THRESHOLD_EXCEEDED: &str = "page_threshold_exceeded";
    pub const ANALYSIS_FAILED: &str = "analysis_failed";
}

// ============================================================================
// Categories and strategies
// ============================================================================

/// High-level categorisation used to select a default strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentCategory {
    #[serde(alias = "SHORT_FORM")]
    ShortForm,
    #[serde(alias = "LONG_FORM")]
    LongForm,
    #[serde(alias = "SCANNED")]
    Scanned,
    #[serde(alias = "TABLE_HEAVY")]
    TableHeavy,
    #[serde(alias = "FORM_HEAVY")]
    FormHeavy,
    #[serde(alias = "UNKNOWN")]
    Unknown,
}

impl DocumentCategory {
    pub const ALL: [DocumentCategory; 6] = [
        DocumentCategory::ShortForm,
        DocumentCategory::LongForm,
        DocumentCategory::Scanned,
        DocumentCategory::TableHeavy,
        DocumentCategory::FormHeavy,
        DocumentCategory::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentCategory::ShortForm => "short_form",
            DocumentCategory::LongForm => "long_form",
            DocumentCategory::Scanned => "scanned",
            DocumentCategory::TableHeavy => "table_heavy",
            DocumentCategory::FormHeavy => "form_heavy",
            DocumentCategory::Unknown => "unknown",
        }
    }
}

impl fmt::Display for DocumentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentCategory {
    type Err = RouterError;

    fn from_str(s: &str) -> Result<Self> {
        let normalised = s.trim().to_ascii_lowercase();
        DocumentCategory::ALL
            .into_iter()
            .find(|category| category.as_str() == normalised)
            .ok_or_else(|| RouterError::configuration(format!("Unknown document category '{}'", s)))
    }
}

/// Declarative configuration for a parser strategy.
///
/// Deserialises from either a bare string (the strategy name) or a mapping
/// with `name`, `model` and `max_pages`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StrategyRepr")]
pub struct StrategyConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_pages: Option<u32>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StrategyRepr {
    Name(String),
    Detailed {
        #[serde(default)]
        name: String,
        #[serde(default)]
        model: Option<String>,
        #[serde(default)]
        max_pages: Option<u32>,
    },
}

impl From<StrategyRepr> for StrategyConfig {
    fn from(repr: StrategyRepr) -> Self {
        match repr {
            StrategyRepr::Name(name) => StrategyConfig::named(name),
            StrategyRepr::Detailed { name, model, max_pages } => StrategyConfig { name, model, max_pages },
        }
    }
}

impl StrategyConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model: None,
            max_pages: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = Some(max_pages);
        self
    }

    /// Reject strategies that could produce an unnamed decision.
    pub fn validate(&self, field: &str) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(RouterError::configuration(format!("{} must have a non-empty name", field)));
        }
        if self.max_pages == Some(0) {
            return Err(RouterError::configuration(format!(
                "{} '{}' has max_pages = 0",
                field, self.name
            )));
        }
        Ok(())
    }

    /// Parse a request-level override value.
    ///
    /// Accepts a non-empty string or a mapping with a non-empty `name`; anything
    /// else is not a well-formed override.
    pub fn from_override_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(name) if !name.trim().is_empty() => Some(StrategyConfig::named(name.trim())),
            Value::Object(_) => serde_json::from_value::<StrategyConfig>(value.clone())
                .ok()
                .filter(|strategy| !strategy.name.trim().is_empty()),
            _ => None,
        }
    }
}

/// The router's decision: which strategy handles the document and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParserStrategy {
    pub name: String,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_pages: Option<u32>,
}

impl ParserStrategy {
    pub fn from_config(config: &StrategyConfig, reason: &str) -> Self {
        Self {
            name: config.name.clone(),
            reason: reason.to_string(),
            model: config.model.clone(),
            max_pages: config.max_pages,
        }
    }
}

// ============================================================================
// Layout metrics
// ============================================================================

/// Layout signals for a single page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageMetrics {
    pub index: u32,
    pub text_density: f64,
    pub image_density: f64,
    pub table_density: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub char_count: Option<u64>,
    #[serde(default)]
    pub table_count: u32,
    #[serde(default)]
    pub image_count: u32,
    #[serde(default)]
    pub checkbox_count: u32,
    #[serde(default)]
    pub radio_button_count: u32,
}

impl PageMetrics {
    /// Densities are clamped to `[0, 1]`; NaN becomes 0.
    pub fn new(index: u32, text_density: f64, image_density: f64, table_density: f64) -> Self {
        Self {
            index,
            text_density: clamp_unit(text_density),
            image_density: clamp_unit(image_density),
            table_density: clamp_unit(table_density),
            char_count: None,
            table_count: 0,
            image_count: 0,
            checkbox_count: 0,
            radio_button_count: 0,
        }
    }

    pub fn with_char_count(mut self, char_count: u64) -> Self {
        self.char_count = Some(char_count);
        self
    }

    pub fn with_tables(mut self, table_count: u32) -> Self {
        self.table_count = table_count;
        self
    }

    pub fn with_images(mut self, image_count: u32) -> Self {
        self.image_count = image_count;
        self
    }

    pub fn with_form_fields(mut self, checkbox_count: u32, radio_button_count: u32) -> Self {
        self.checkbox_count = checkbox_count;
        self.radio_button_count = radio_button_count;
        self
    }

    pub fn form_field_count(&self) -> u32 {
        self.checkbox_count.saturating_add(self.radio_button_count)
    }

    fn has_table(&self) -> bool {
        self.table_density >= 0.5 || self.table_count > 0
    }

    fn looks_scanned(&self) -> bool {
        self.image_density >= 0.6 || self.image_count > 2
    }
}

pub(crate) fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) }
}

/// Aggregated layout statistics for one document.
///
/// Built exclusively from the [`PageMetrics`] of that document and immutable
/// afterwards; every figure is exposed through an accessor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentProfile {
    page_count: usize,
    pages: Vec<PageMetrics>,
    average_text_density: f64,
    average_image_density: f64,
    average_table_density: f64,
    tables_per_page: f64,
    table_page_ratio: f64,
    scanned_page_ratio: f64,
    checkbox_page_ratio: f64,
    radio_button_page_ratio: f64,
    form_page_ratio: f64,
    total_tables: u32,
    total_images: u32,
    total_checkboxes: u32,
    total_radio_buttons: u32,
    total_chars: u64,
}

impl DocumentProfile {
    pub fn from_pages(pages: Vec<PageMetrics>) -> Self {
        let page_count = pages.len();
        let mean = |f: fn(&PageMetrics) -> f64| -> f64 {
            if page_count == 0 {
                0.0
            } else {
                pages.iter().map(f).sum::<f64>() / page_count as f64
            }
        };
        let ratio = |f: fn(&PageMetrics) -> bool| -> f64 {
            if page_count == 0 {
                0.0
            } else {
                pages.iter().filter(|page| f(page)).count() as f64 / page_count as f64
            }
        };

        let total = |f: fn(&PageMetrics) -> u32| -> u32 { pages.iter().map(f).fold(0, u32::saturating_add) };
        let total_tables = total(|p| p.table_count);

        Self {
            page_count,
            average_text_density: mean(|p| p.text_density),
            average_image_density: mean(|p| p.image_density),
            average_table_density: mean(|p| p.table_density),
            tables_per_page: if page_count == 0 {
                0.0
            } else {
                total_tables as f64 / page_count as f64
            },
            table_page_ratio: ratio(PageMetrics::has_table),
            scanned_page_ratio: ratio(PageMetrics::looks_scanned),
            checkbox_page_ratio: ratio(|p| p.checkbox_count > 0),
            radio_button_page_ratio: ratio(|p| p.radio_button_count > 0),
            form_page_ratio: ratio(|p| p.form_field_count() > 0),
            total_tables,
            total_images: total(|p| p.image_count),
            total_checkboxes: total(|p| p.checkbox_count),
            total_radio_buttons: total(|p| p.radio_button_count),
            total_chars: pages.iter().filter_map(|p| p.char_count).fold(0, u64::saturating_add),
            pages,
        }
    }

    /// Profile of a document that was never analysed.
    pub fn empty() -> Self {
        Self::from_pages(Vec::new())
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    pub fn pages(&self) -> &[PageMetrics] {
        &self.pages
    }

    pub fn average_text_density(&self) -> f64 {
        self.average_text_density
    }

    pub fn average_image_density(&self) -> f64 {
        self.average_image_density
    }

    pub fn average_table_density(&self) -> f64 {
        self.average_table_density
    }

    pub fn tables_per_page(&self) -> f64 {
        self.tables_per_page
    }

    pub fn table_page_ratio(&self) -> f64 {
        self.table_page_ratio
    }

    pub fn scanned_page_ratio(&self) -> f64 {
        self.scanned_page_ratio
    }

    pub fn checkbox_page_ratio(&self) -> f64 {
        self.checkbox_page_ratio
    }

    pub fn radio_button_page_ratio(&self) -> f64 {
        self.radio_button_page_ratio
    }

    pub fn form_page_ratio(&self) -> f64 {
        self.form_page_ratio
    }

    pub fn total_tables(&self) -> u32 {
        self.total_tables
    }

    pub fn total_images(&self) -> u32 {
        self.total_images
    }

    pub fn total_checkboxes(&self) -> u32 {
        self.total_checkboxes
    }

    pub fn total_radio_buttons(&self) -> u32 {
        self.total_radio_buttons
    }

    pub fn total_form_fields(&self) -> u32 {
        self.total_checkboxes.saturating_add(self.total_radio_buttons)
    }

    pub fn total_chars(&self) -> u64 {
        self.total_chars
    }
}

// ============================================================================
// Router input and output
// ============================================================================

/// Per-call routing input.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentDescriptor {
    pub object_key: String,
    pub bucket: Option<String>,
    pub payload: Value,
    pub mime_type: String,
    pub request_override: Option<StrategyConfig>,
}

impl DocumentDescriptor {
    pub fn source_uri(&self) -> Option<String> {
        match &self.bucket {
            Some(bucket) if !bucket.is_empty() && !self.object_key.is_empty() => {
                Some(format!("s3://{}/{}", bucket, self.object_key))
            }
            _ => None,
        }
    }

    /// The `documentMetadata` block of the payload, if any.
    pub fn document_metadata(&self) -> Option<&Map<String, Value>> {
        self.payload.get("documentMetadata").and_then(Value::as_object)
    }
}

/// The router's sole output: one auditable routing decision.
///
/// `overrides_applied` is ordered and never empty.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentAnalysis {
    pub object_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
    pub mime_type: String,
    pub profile: DocumentProfile,
    pub category: DocumentCategory,
    pub strategy: ParserStrategy,
    pub overrides_applied: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_override: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Flat, write-once projection of a [`DocumentAnalysis`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub object_key: String,
    pub bucket: Option<String>,
    pub source_uri: Option<String>,
    pub mime_type: String,
    pub category: DocumentCategory,
    pub strategy_name: String,
    pub strategy_reason: String,
    pub strategy_model: Option<String>,
    pub strategy_max_pages: Option<u32>,
    pub overrides_applied: Vec<String>,
    pub request_override: Option<String>,
    pub page_count: usize,
    pub average_text_density: f64,
    pub average_image_density: f64,
    pub tables_per_page: f64,
    pub table_page_ratio: f64,
    pub scanned_page_ratio: f64,
    pub checkbox_page_ratio: f64,
    pub radio_button_page_ratio: f64,
    pub form_page_ratio: f64,
    pub total_tables: u32,
    pub total_images: u32,
    pub total_checkboxes: u32,
    pub total_radio_buttons: u32,
    pub timestamp: DateTime<Utc>,
}

impl DocumentAnalysis {
    pub fn to_audit_record(&self) -> AuditRecord {
        let profile = &self.profile;
        AuditRecord {
            object_key: self.object_key.clone(),
            bucket: self.bucket.clone(),
            source_uri: match &self.bucket {
                Some(bucket) if !bucket.is_empty() => Some(format!("s3://{}/{}", bucket, self.object_key)),
                _ => None,
            },
            mime_type: self.mime_type.clone(),
            category: self.category,
            strategy_name: self.strategy.name.clone(),
            strategy_reason: self.strategy.reason.clone(),
            strategy_model: self.strategy.model.clone(),
            strategy_max_pages: self.strategy.max_pages,
            overrides_applied: self.overrides_applied.clone(),
            request_override: self.request_override.clone(),
            page_count: profile.page_count(),
            average_text_density: profile.average_text_density(),
            average_image_density: profile.average_image_density(),
            tables_per_page: profile.tables_per_page(),
            table_page_ratio: profile.table_page_ratio(),
            scanned_page_ratio: profile.scanned_page_ratio(),
            checkbox_page_ratio: profile.checkbox_page_ratio(),
            radio_button_page_ratio: profile.radio_button_page_ratio(),
            form_page_ratio: profile.form_page_ratio(),
            total_tables: profile.total_tables(),
            total_images: profile.total_images(),
            total_checkboxes: profile.total_checkboxes(),
            total_radio_buttons: profile.total_radio_buttons(),
            timestamp: self.timestamp,
        }
    }

    /// Merge the decision into a caller-supplied metadata record.
    ///
    /// Keys already present in `base` are overwritten. Overrides are joined with
    /// commas and page metrics are embedded as a JSON string, matching the column
    /// layout of the downstream metadata table.
    pub fn to_metadata_record(&self, base: &Map<String, Value>) -> Result<Map<String, Value>> {
        let mut record = base.clone();
        let profile = &self.profile;

        let page_metrics = if profile.pages().is_empty() {
            Value::Null
        } else {
            Value::String(serde_json::to_string(profile.pages())?)
        };
        let overrides = if self.overrides_applied.is_empty() {
            Value::Null
        } else {
            Value::String(self.overrides_applied.join(","))
        };

        let fields = [
            ("object_key", Value::from(self.object_key.clone())),
            ("mime_type", Value::from(self.mime_type.clone())),
            ("page_count", Value::from(profile.page_count())),
            ("layout_density", Value::from(profile.average_text_density())),
            ("image_density", Value::from(profile.average_image_density())),
            ("table_page_ratio", Value::from(profile.table_page_ratio())),
            ("scanned_page_ratio", Value::from(profile.scanned_page_ratio())),
            ("checkbox_page_ratio", Value::from(profile.checkbox_page_ratio())),
            ("radio_button_page_ratio", Value::from(profile.radio_button_page_ratio())),
            ("form_page_ratio", Value::from(profile.form_page_ratio())),
            ("total_tables", Value::from(profile.total_tables())),
            ("total_checkboxes", Value::from(profile.total_checkboxes())),
            ("total_radio_buttons", Value::from(profile.total_radio_buttons())),
            ("document_category", Value::from(self.category.as_str())),
            ("parser_strategy", Value::from(self.strategy.name.clone())),
            ("strategy_reason", Value::from(self.strategy.reason.clone())),
            ("parser_model", Value::from(self.strategy.model.clone())),
            ("strategy_max_pages", Value::from(self.strategy.max_pages)),
            ("overrides_applied", overrides),
            ("request_override", Value::from(self.request_override.clone())),
            ("page_metrics", page_metrics),
            ("routed_at", Value::from(self.timestamp.to_rfc3339())),
        ];

        for (key, value) in fields {
            record.insert(key.to_string(), value);
        }
        Ok(record)
    }
}
