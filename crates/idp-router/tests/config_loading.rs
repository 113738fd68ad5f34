//! Configuration loading integration tests.
//!
//! Loads router configuration from TOML, YAML, JSON and key/value records and
//! checks that inconsistent configuration is rejected before a router exists.

use idp_router::core::config::CONFIG_FILE_NAME;
use idp_router::{
    AnalyserConfig, DocumentCategory, DocumentRouter, MatchTarget, RouterConfig, RouterError, RoutingMode,
};
use serde_json::json;
use std::fs;
use tempfile::TempDir;

const FULL_TOML: &str = r#"
mode = "hybrid"
fallback_strategy = "asynchronous_pipeline"
request_override_flag_name = "parser_override"
match_target = "object_key"

[category_thresholds]
short_form_threshold = 10
long_form_max_pages = 80
form_max_pages = "25"

[default_strategy_map]
SHORT_FORM = "azure_form_recognizer"
long_form = { name = "azure_layout", model = "prebuilt-layout", max_pages = 300 }
form_heavy = "forms_pipeline"

[[pattern_overrides]]
pattern = "^invoices/"
strategy = { name = "invoice_parser", model = "invoice-v2" }

[[pattern_overrides]]
pattern = "\\.eml$"
strategy = "email_pipeline"
case_insensitive = true

[analyser]
kind = "content_inspecting"
"#;

fn write(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_full_toml_configuration() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "router.toml", FULL_TOML);

    let config = RouterConfig::from_file(&path).unwrap();
    assert_eq!(config.mode, RoutingMode::Hybrid);
    assert_eq!(config.category_thresholds.short_form_page_cap, 10);
    assert_eq!(config.category_thresholds.long_form_max_pages, Some(80));
    assert_eq!(config.category_thresholds.form_heavy_max_pages, Some(25));
    assert_eq!(config.default_strategy_map.len(), 3);
    assert_eq!(
        config.default_strategy_map[&DocumentCategory::LongForm].max_pages,
        Some(300)
    );
    assert_eq!(config.pattern_overrides.len(), 2);
    assert_eq!(config.match_target, MatchTarget::ObjectKey);
    assert_eq!(config.analyser, AnalyserConfig::default_content_inspecting());

    let router = DocumentRouter::new(config).unwrap();
    assert_eq!(router.analyser_name(), "content_inspecting+heuristic");
    assert_eq!(router.overrides().len(), 2);

    let analysis = router.route_configured(&json!({}), "invoices/7.pdf");
    assert_eq!(analysis.strategy.name, "invoice_parser");
    assert_eq!(analysis.strategy.model.as_deref(), Some("invoice-v2"));

    let analysis = router.route_configured(&json!({}), "mail/INBOX.EML");
    assert_eq!(analysis.overrides_applied, vec!["pattern:\\.eml$"]);
}

#[test]
fn test_yaml_and_json_files_are_equivalent() {
    let dir = TempDir::new().unwrap();
    let yaml = write(
        &dir,
        "router.yml",
        r#"
mode: STATIC
static_strategy:
  name: force_textract
fallback_strategy: asynchronous_pipeline
"#,
    );
    let json_path = write(
        &dir,
        "router.json",
        r#"{"mode": "static", "static_strategy": {"name": "force_textract"}, "fallback_strategy": "asynchronous_pipeline"}"#,
    );

    let from_yaml = RouterConfig::from_file(&yaml).unwrap();
    let from_json = RouterConfig::from_file(&json_path).unwrap();
    assert_eq!(from_yaml, from_json);
    assert_eq!(from_yaml.mode, RoutingMode::Static);
}

#[test]
fn test_invalid_toml_names_the_file() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "broken.toml", "mode = [unterminated");

    let err = RouterConfig::from_toml_file(&path).unwrap_err();
    assert!(matches!(err, RouterError::Configuration { .. }));
    assert!(err.to_string().contains("broken.toml"));
}

#[test]
fn test_missing_file() {
    let err = RouterConfig::from_toml_file("/nonexistent/idp-router.toml").unwrap_err();
    assert!(err.to_string().contains("Failed to read config file"));
}

#[test]
fn test_inconsistent_configuration_is_rejected() {
    let cases = [
        json!({"mode": "static"}),
        json!({"fallback_strategy": {"name": ""}}),
        json!({"static_strategy": {"name": "x", "max_pages": 0}}),
        json!({"category_thresholds": {"scanned_page_ratio": 1.5}}),
        json!({"category_thresholds": {"long_form_max_pages": 0}}),
        json!({"request_override_flag_name": " "}),
        json!({"mode": "sideways"}),
    ];

    for case in cases {
        assert!(RouterConfig::from_value(case.clone()).is_err(), "accepted {}", case);
    }
}

#[test]
fn test_malformed_pattern_is_fatal_and_names_pattern() {
    let err = RouterConfig::from_value(json!({
        "pattern_overrides": [
            {"pattern": "^ok/", "strategy": "fine"},
            {"pattern": "[unclosed", "strategy": "broken"}
        ]
    }))
    .unwrap_err();

    match err {
        RouterError::Pattern { pattern, .. } => assert_eq!(pattern, "[unclosed"),
        other => panic!("expected pattern error, got {other}"),
    }
}

#[test]
fn test_programmatic_config_validated_on_construction() {
    let config = RouterConfig {
        mode: RoutingMode::Static,
        ..RouterConfig::default()
    };
    assert!(matches!(
        DocumentRouter::new(config),
        Err(RouterError::Configuration { .. })
    ));
}

#[test]
fn test_key_value_record_with_json_text_columns() {
    let record = json!({
        "mode": "HYBRID",
        "category_thresholds": "{\"short_form_threshold\": \"12\", \"long_form_max_pages\": 80}",
        "default_strategy_map": "{\"SHORT_FORM\": \"azure_form_recognizer\"}",
        "fallback_strategy": "{\"name\": \"asynchronous_pipeline\"}",
        "request_override_flag": "parser_override",
        "pattern_overrides": "[]"
    });

    let config = RouterConfig::from_value(record).unwrap();
    assert_eq!(config.category_thresholds.short_form_page_cap, 12);
    assert_eq!(config.fallback_strategy.name, "asynchronous_pipeline");
    assert_eq!(
        config.default_strategy_map[&DocumentCategory::ShortForm].name,
        "azure_form_recognizer"
    );
    assert!(config.pattern_overrides.is_empty());
}

#[test]
fn test_discover_walks_up_to_config_file() {
    let dir = TempDir::new().unwrap();
    write(&dir, CONFIG_FILE_NAME, FULL_TOML);
    let nested = dir.path().join("jobs").join("2024");
    fs::create_dir_all(&nested).unwrap();

    let config = RouterConfig::discover_from(&nested).unwrap().expect("config discovered");
    assert_eq!(config.fallback_strategy.name, "asynchronous_pipeline");

    let empty = TempDir::new().unwrap();
    assert!(RouterConfig::discover_from(empty.path()).unwrap().is_none());
}

#[test]
fn test_serialized_config_reloads_identically() {
    let config = RouterConfig::from_toml_str(FULL_TOML).unwrap();
    let value = serde_json::to_value(&config).unwrap();
    assert_eq!(value["analyser"]["kind"], json!("content_inspecting"));
    assert_eq!(value["default_strategy_map"]["short_form"]["name"], json!("azure_form_recognizer"));

    let reparsed = RouterConfig::from_value(value).unwrap();
    assert_eq!(config, reparsed);
}
