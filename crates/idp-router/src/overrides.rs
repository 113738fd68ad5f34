//! Pattern and request-level strategy overrides.
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{DocumentDescriptor, StrategyConfig};
use crate::{Result, RouterError};

/// Payload blocks searched for the request-override flag after the top level.
const OVERRIDE_BLOCKS: [&str; 2] = ["routing", "overrides"];

/// Which descriptor field pattern overrides are matched against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchTarget {
    #[default]
    ObjectKey,
    SourceUri,
    MimeType,
}

impl MatchTarget {
    fn subject(&self, descriptor: &DocumentDescriptor) -> String {
        match self {
            MatchTarget::ObjectKey => descriptor.object_key.clone(),
            MatchTarget::SourceUri => descriptor.source_uri().unwrap_or_default(),
            MatchTarget::MimeType => descriptor.mime_type.clone(),
        }
    }
}

/// Declarative form of a pattern override, as found in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternOverrideConfig {
    pub pattern: String,
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub case_insensitive: bool,
}

/// A compiled pattern paired with the strategy it forces.
#[derive(Debug, Clone)]
pub struct PatternOverride {
    regex: Regex,
    source: String,
    strategy: StrategyConfig,
}

impl PatternOverride {
    pub fn compile(config: &PatternOverrideConfig) -> Result<Self> {
        config.strategy.validate("pattern override strategy")?;
        let regex = RegexBuilder::new(&config.pattern)
            .case_insensitive(config.case_insensitive)
            .build()
            .map_err(|source| RouterError::Pattern {
                pattern: config.pattern.clone(),
                source,
            })?;

        Ok(Self {
            regex,
            source: config.pattern.clone(),
            strategy: config.strategy.clone(),
        })
    }

    /// The pattern text as written in configuration.
    pub fn pattern(&self) -> &str {
        &self.source
    }

    pub fn strategy(&self) -> &StrategyConfig {
        &self.strategy
    }

    /// Unanchored search, so `invoice` matches `inbound/invoice-17.pdf`.
    pub fn is_match(&self, subject: &str) -> bool {
        self.regex.is_match(subject)
    }
}

/// Ordered pattern overrides. Compiled once, first match wins.
#[derive(Debug, Clone, Default)]
pub struct OverrideSet {
    patterns: Vec<PatternOverride>,
    target: MatchTarget,
}

impl OverrideSet {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Compile every pattern, failing on the first malformed expression.
    pub fn compile(configs: &[PatternOverrideConfig], target: MatchTarget) -> Result<Self> {
        let patterns = configs
            .iter()
            .map(PatternOverride::compile)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns, target })
    }

    pub fn target(&self) -> MatchTarget {
        self.target
    }

    pub fn patterns(&self) -> &[PatternOverride] {
        &self.patterns
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn first_match(&self, descriptor: &DocumentDescriptor) -> Option<&PatternOverride> {
        let subject = self.target.subject(descriptor);
        self.patterns.iter().find(|pattern| pattern.is_match(&subject))
    }
}

/// Locate and parse the request-override flag in a payload.
///
/// The top level wins over the `routing` and `overrides` blocks. A flag that is
/// present but malformed is logged and treated as absent.
pub fn parse_request_override(payload: &Value, flag_name: &str) -> Option<StrategyConfig> {
    let raw = payload.get(flag_name).or_else(|| {
        OVERRIDE_BLOCKS
            .iter()
            .filter_map(|block| payload.get(*block))
            .find_map(|block| block.get(flag_name))
    })?;

    if raw.is_null() {
        return None;
    }

    let parsed = StrategyConfig::from_override_value(raw);
    if parsed.is_none() {
        tracing::warn!(flag = flag_name, value = %raw, "Ignoring malformed request override");
    }
    parsed
}
