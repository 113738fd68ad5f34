//! Threshold-driven document categorisation.
//!
//! [`categorize`] is a pure function of a [`DocumentProfile`] and a set of
//! [`CategoryThresholds`]. Rules are evaluated in a fixed order and the first
//! match wins:
//!
//! 1. `SCANNED` when the scanned-page ratio is above `scanned_page_ratio` and
//!    the mean text density is below `scanned_max_text_density`
//! 2. `TABLE_HEAVY` when tables per page exceed `table_heavy_tables_per_page`
//! 3. `FORM_HEAVY` when checkbox plus radio-button count exceeds `form_heavy_field_count`
//! 4. `SHORT_FORM` when the page count is below `short_form_page_cap` and the
//!    mean text density exceeds `short_form_min_text_density`
//! 5. `LONG_FORM` for any other non-empty document, `UNKNOWN` otherwise
use serde::Serialize;
use serde_json::{Map, Value};

use crate::types::{DocumentCategory, DocumentProfile};
use crate::{Result, RouterError};

/// Named thresholds consumed by [`categorize`] and by the page-cap redirect.
#[derive(Debug, Clone, PartialEq, Serialize, serde::Deserialize)]
#[serde(try_from = "Map<String, Value>")]
pub struct CategoryThresholds {
    pub scanned_page_ratio: f64,
    pub scanned_max_text_density: f64,
    pub table_heavy_tables_per_page: f64,
    pub form_heavy_field_count: u32,
    pub short_form_page_cap: u32,
    pub short_form_min_text_density: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_form_max_pages: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub long_form_max_pages: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scanned_max_pages: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_heavy_max_pages: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub form_heavy_max_pages: Option<u32>,
}

impl Default for CategoryThresholds {
    fn default() -> Self {
        Self {
            scanned_page_ratio: 0.5,
            scanned_max_text_density: 0.3,
            table_heavy_tables_per_page: 2.0,
            form_heavy_field_count: 10,
            short_form_page_cap: 15,
            short_form_min_text_density: 0.55,
            short_form_max_pages: None,
            long_form_max_pages: None,
            scanned_max_pages: None,
            table_heavy_max_pages: None,
            form_heavy_max_pages: None,
        }
    }
}

impl TryFrom<Map<String, Value>> for CategoryThresholds {
    type Error = RouterError;

    fn try_from(values: Map<String, Value>) -> Result<Self> {
        Self::from_named(&values)
    }
}

impl CategoryThresholds {
    /// Build thresholds from a name/value mapping, starting from the defaults.
    ///
    /// Values may be JSON numbers or numeric strings. Unknown names are
    /// logged and ignored; out-of-range values are a configuration error.
    pub fn from_named(values: &Map<String, Value>) -> Result<Self> {
        let mut thresholds = Self::default();

        for (name, value) in values {
            match name.as_str() {
                "scanned_page_ratio" => thresholds.scanned_page_ratio = unit_interval(name, value)?,
                "scanned_max_text_density" => thresholds.scanned_max_text_density = unit_interval(name, value)?,
                "table_heavy_tables_per_page" => thresholds.table_heavy_tables_per_page = non_negative(name, value)?,
                "form_heavy_field_count" => thresholds.form_heavy_field_count = count(name, value)?,
                "short_form_page_cap" | "short_form_threshold" => thresholds.short_form_page_cap = count(name, value)?,
                "short_form_min_text_density" => {
                    thresholds.short_form_min_text_density = unit_interval(name, value)?
                }
                "short_form_max_pages" => thresholds.short_form_max_pages = page_cap(name, value)?,
                "long_form_max_pages" => thresholds.long_form_max_pages = page_cap(name, value)?,
                "scanned_max_pages" => thresholds.scanned_max_pages = page_cap(name, value)?,
                "table_heavy_max_pages" => thresholds.table_heavy_max_pages = page_cap(name, value)?,
                "form_heavy_max_pages" | "form_max_pages" => thresholds.form_heavy_max_pages = page_cap(name, value)?,
                unknown => {
                    tracing::warn!(threshold = unknown, "Ignoring unknown category threshold");
                }
            }
        }

        Ok(thresholds)
    }

    /// Range-check thresholds built in code rather than parsed.
    pub fn validate(&self) -> Result<()> {
        let ratios = [
            ("scanned_page_ratio", self.scanned_page_ratio),
            ("scanned_max_text_density", self.scanned_max_text_density),
            ("short_form_min_text_density", self.short_form_min_text_density),
        ];
        for (name, value) in ratios {
            if !(0.0..=1.0).contains(&value) {
                return Err(RouterError::configuration(format!(
                    "Threshold '{}' must be within [0, 1], got {}",
                    name, value
                )));
            }
        }
        if !self.table_heavy_tables_per_page.is_finite() || self.table_heavy_tables_per_page < 0.0 {
            return Err(RouterError::configuration(format!(
                "Threshold 'table_heavy_tables_per_page' must be >= 0, got {}",
                self.table_heavy_tables_per_page
            )));
        }
        for category in DocumentCategory::ALL {
            if self.max_pages_for(category) == Some(0) {
                return Err(RouterError::configuration(format!(
                    "Threshold '{}_max_pages' must be a positive page count",
                    category
                )));
            }
        }
        Ok(())
    }

    /// Maximum page count tolerated for a category before the fallback takes over.
    pub fn max_pages_for(&self, category: DocumentCategory) -> Option<u32> {
        match category {
            DocumentCategory::ShortForm => self.short_form_max_pages,
            DocumentCategory::LongForm => self.long_form_max_pages,
            DocumentCategory::Scanned => self.scanned_max_pages,
            DocumentCategory::TableHeavy => self.table_heavy_max_pages,
            DocumentCategory::FormHeavy => self.form_heavy_max_pages,
            DocumentCategory::Unknown => None,
        }
    }
}

fn as_number(name: &str, value: &Value) -> Result<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match number {
        Some(n) if n.is_finite() => Ok(n),
        _ => Err(RouterError::configuration(format!(
            "Threshold '{}' must be numeric, got {}",
            name, value
        ))),
    }
}

fn unit_interval(name: &str, value: &Value) -> Result<f64> {
    let n = as_number(name, value)?;
    if !(0.0..=1.0).contains(&n) {
        return Err(RouterError::configuration(format!(
            "Threshold '{}' must be within [0, 1], got {}",
            name, n
        )));
    }
    Ok(n)
}

fn non_negative(name: &str, value: &Value) -> Result<f64> {
    let n = as_number(name, value)?;
    if n < 0.0 {
        return Err(RouterError::configuration(format!(
            "Threshold '{}' must be >= 0, got {}",
            name, n
        )));
    }
    Ok(n)
}

fn count(name: &str, value: &Value) -> Result<u32> {
    let n = non_negative(name, value)?;
    if n.fract() != 0.0 || n > u32::MAX as f64 {
        return Err(RouterError::configuration(format!(
            "Threshold '{}' must be a whole number, got {}",
            name, n
        )));
    }
    Ok(n as u32)
}

fn page_cap(name: &str, value: &Value) -> Result<Option<u32>> {
    if value.is_null() {
        return Ok(None);
    }
    let n = count(name, value)?;
    if n == 0 {
        return Err(RouterError::configuration(format!(
            "Threshold '{}' must be a positive page count",
            name
        )));
    }
    Ok(Some(n))
}

/// Classify a profile. Deterministic for identical inputs.
pub fn categorize(profile: &DocumentProfile, thresholds: &CategoryThresholds) -> DocumentCategory {
    if profile.page_count() == 0 {
        return DocumentCategory::Unknown;
    }

    if profile.scanned_page_ratio() > thresholds.scanned_page_ratio
        && profile.average_text_density() < thresholds.scanned_max_text_density
    {
        return DocumentCategory::Scanned;
    }

    if profile.tables_per_page() > thresholds.table_heavy_tables_per_page {
        return DocumentCategory::TableHeavy;
    }

    if profile.total_form_fields() > thresholds.form_heavy_field_count {
        return DocumentCategory::FormHeavy;
    }

    if profile.page_count() < thresholds.short_form_page_cap as usize
        && profile.average_text_density() > thresholds.short_form_min_text_density
    {
        return DocumentCategory::ShortForm;
    }

    DocumentCategory::LongForm
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PageMetrics;
    use serde_json::json;

    fn pages(count: u32, text: f64, image: f64) -> Vec<PageMetrics> {
        (0..count).map(|i| PageMetrics::new(i, text, image, 0.0)).collect()
    }

    fn named(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_defaults() {
        let thresholds = CategoryThresholds::default();
        assert_eq!(thresholds.scanned_page_ratio, 0.5);
        assert_eq!(thresholds.table_heavy_tables_per_page, 2.0);
        assert_eq!(thresholds.form_heavy_field_count, 10);
        assert_eq!(thresholds.short_form_page_cap, 15);
        assert_eq!(thresholds.max_pages_for(DocumentCategory::LongForm), None);
    }

    #[test]
    fn test_from_named_with_aliases() {
        let thresholds = CategoryThresholds::from_named(&named(json!({
            "short_form_threshold": 5,
            "form_max_pages": 12,
            "long_form_max_pages": "80",
            "scanned_page_ratio": 0.7,
        })))
        .unwrap();

        assert_eq!(thresholds.short_form_page_cap, 5);
        assert_eq!(thresholds.form_heavy_max_pages, Some(12));
        assert_eq!(thresholds.max_pages_for(DocumentCategory::LongForm), Some(80));
        assert_eq!(thresholds.scanned_page_ratio, 0.7);
    }

    #[test]
    fn test_unknown_thresholds_are_ignored() {
        let thresholds = CategoryThresholds::from_named(&named(json!({"mystery_knob": 3}))).unwrap();
        assert_eq!(thresholds, CategoryThresholds::default());
    }

    #[test]
    fn test_out_of_range_thresholds_rejected() {
        assert!(CategoryThresholds::from_named(&named(json!({"scanned_page_ratio": 1.5}))).is_err());
        assert!(CategoryThresholds::from_named(&named(json!({"form_heavy_field_count": -1}))).is_err());
        assert!(CategoryThresholds::from_named(&named(json!({"long_form_max_pages": 0}))).is_err());
        assert!(CategoryThresholds::from_named(&named(json!({"long_form_max_pages": 2.5}))).is_err());
        assert!(CategoryThresholds::from_named(&named(json!({"table_heavy_tables_per_page": "lots"}))).is_err());
    }

    #[test]
    fn test_validate_programmatic_thresholds() {
        assert!(CategoryThresholds::default().validate().is_ok());

        let mut thresholds = CategoryThresholds::default();
        thresholds.scanned_page_ratio = 2.0;
        assert!(thresholds.validate().is_err());

        let mut thresholds = CategoryThresholds::default();
        thresholds.long_form_max_pages = Some(0);
        assert!(thresholds.validate().is_err());
    }

    #[test]
    fn test_serde_round_trip_uses_canonical_names() {
        let thresholds: CategoryThresholds =
            serde_json::from_value(json!({"short_form_threshold": 4, "long_form_max_pages": 80})).unwrap();
        let value = serde_json::to_value(&thresholds).unwrap();
        assert_eq!(value["short_form_page_cap"], json!(4));
        assert_eq!(value["long_form_max_pages"], json!(80));
        assert!(value.get("scanned_max_pages").is_none());
    }

    #[test]
    fn test_empty_profile_is_unknown() {
        let category = categorize(&DocumentProfile::empty(), &CategoryThresholds::default());
        assert_eq!(category, DocumentCategory::Unknown);
    }

    #[test]
    fn test_scanned() {
        let profile = DocumentProfile::from_pages(pages(4, 0.1, 0.9));
        assert_eq!(categorize(&profile, &CategoryThresholds::default()), DocumentCategory::Scanned);
    }

    #[test]
    fn test_image_heavy_with_text_is_not_scanned() {
        let profile = DocumentProfile::from_pages(pages(4, 0.4, 0.9));
        assert_eq!(categorize(&profile, &CategoryThresholds::default()), DocumentCategory::LongForm);
    }

    #[test]
    fn test_table_heavy() {
        let profile = DocumentProfile::from_pages(vec![
            PageMetrics::new(0, 0.6, 0.0, 0.8).with_tables(3),
            PageMetrics::new(1, 0.6, 0.0, 0.8).with_tables(4),
        ]);
        assert_eq!(categorize(&profile, &CategoryThresholds::default()), DocumentCategory::TableHeavy);
    }

    #[test]
    fn test_exactly_at_table_threshold_is_not_table_heavy() {
        let profile = DocumentProfile::from_pages(vec![PageMetrics::new(0, 0.8, 0.0, 0.5).with_tables(2)]);
        assert_eq!(categorize(&profile, &CategoryThresholds::default()), DocumentCategory::ShortForm);
    }

    #[test]
    fn test_form_heavy() {
        let profile = DocumentProfile::from_pages(vec![
            PageMetrics::new(0, 0.7, 0.0, 0.0).with_form_fields(6, 2),
            PageMetrics::new(1, 0.7, 0.0, 0.0).with_form_fields(2, 1),
        ]);
        assert_eq!(categorize(&profile, &CategoryThresholds::default()), DocumentCategory::FormHeavy);
    }

    #[test]
    fn test_short_and_long_form() {
        let thresholds = CategoryThresholds::default();
        let short = DocumentProfile::from_pages(pages(3, 0.8, 0.05));
        let long = DocumentProfile::from_pages(pages(40, 0.8, 0.05));
        let sparse = DocumentProfile::from_pages(pages(3, 0.5, 0.05));

        assert_eq!(categorize(&short, &thresholds), DocumentCategory::ShortForm);
        assert_eq!(categorize(&long, &thresholds), DocumentCategory::LongForm);
        assert_eq!(categorize(&sparse, &thresholds), DocumentCategory::LongForm);
    }

    #[test]
    fn test_categorize_is_deterministic() {
        let profile = DocumentProfile::from_pages(pages(7, 0.62, 0.2));
        let thresholds = CategoryThresholds::default();
        let first = categorize(&profile, &thresholds);
        for _ in 0..10 {
            assert_eq!(categorize(&profile, &thresholds), first);
        }
    }
}
