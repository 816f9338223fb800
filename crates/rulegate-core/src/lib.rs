pub mod matcher;
pub mod parse;

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::path::Path;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Schema tag written into every persisted index file.
pub const INDEX_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum EngineError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("parse failure: {0}")]
    ParseFailure(String),
    #[error("index inconsistency: {0}")]
    IndexInconsistency(String),
}

/// Identifier of one rule record, derived from the source document's path
/// relative to the docs root. Stable across rebuilds of the same tree.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct RuleId(pub String);

impl RuleId {
    /// Derive a rule id from a path relative to the docs root.
    ///
    /// The extension is dropped, path separators become `-`, interior
    /// `-NN-` ordering infixes collapse to `-`, and a leading `NN-` prefix
    /// is removed, so `02-domain-layer/03_aggregate.md` and a later
    /// renumbering of the same document produce the same id.
    #[must_use]
    pub fn from_relative_path(relative: &Path) -> Self {
        let joined = relative
            .with_extension("")
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("-");

        Self(strip_ordering_digits(&joined))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RuleId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn strip_ordering_digits(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;

    // Interior `-NN-` infixes first, left to right, non-overlapping.
    while let Some(pos) = rest.find('-') {
        let (head, tail) = rest.split_at(pos + 1);
        out.push_str(head);
        match split_digit_prefix(tail).and_then(|r| r.strip_prefix('-')) {
            Some(after) => rest = after,
            None => rest = tail,
        }
    }
    out.push_str(rest);

    // Then the leading `NN-` prefix.
    let tail_start = split_digit_prefix(&out)
        .and_then(|r| r.strip_prefix('-'))
        .map(|stripped| out.len() - stripped.len());
    match tail_start {
        Some(start) => out[start..].to_string(),
        None => out,
    }
}

/// Strip a leading run of ASCII digits; `None` when there is none.
fn split_digit_prefix(value: &str) -> Option<&str> {
    let end = value.find(|c: char| !c.is_ascii_digit()).unwrap_or(value.len());
    if end == 0 {
        None
    } else {
        Some(&value[end..])
    }
}

/// Coarse architectural bucket a convention document belongs to, used to
/// scope which rules apply to a given source file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Layer {
    Domain,
    Application,
    AdapterRest,
    AdapterPersistence,
    Testing,
    LanguagePatterns,
    Enterprise,
    ErrorHandling,
    General,
}

impl Layer {
    /// Every known layer, in documentation order.
    pub const ALL: [Self; 9] = [
        Self::Domain,
        Self::Application,
        Self::AdapterRest,
        Self::AdapterPersistence,
        Self::Testing,
        Self::LanguagePatterns,
        Self::Enterprise,
        Self::ErrorHandling,
        Self::General,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Domain => "domain",
            Self::Application => "application",
            Self::AdapterRest => "adapter-rest",
            Self::AdapterPersistence => "adapter-persistence",
            Self::Testing => "testing",
            Self::LanguagePatterns => "language-patterns",
            Self::Enterprise => "enterprise",
            Self::ErrorHandling => "error-handling",
            Self::General => "general",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "domain" => Some(Self::Domain),
            "application" => Some(Self::Application),
            "adapter-rest" => Some(Self::AdapterRest),
            "adapter-persistence" => Some(Self::AdapterPersistence),
            "testing" => Some(Self::Testing),
            "language-patterns" => Some(Self::LanguagePatterns),
            "enterprise" => Some(Self::Enterprise),
            "error-handling" => Some(Self::ErrorHandling),
            "general" => Some(Self::General),
            _ => None,
        }
    }
}

impl Display for Layer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Severity classification of a rule. Only `critical` rules are enforced by
/// automatic validation; lower tiers are advisory and surfaced elsewhere.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
}

impl Priority {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "critical" => Some(Self::Critical),
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            "low" => Some(Self::Low),
            _ => None,
        }
    }
}

impl Display for Priority {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Keyword sets derived from one convention document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct Keywords {
    /// Filename tokens, in filename order.
    pub primary: Vec<String>,
    /// Tokens from the document's first top-level heading.
    pub secondary: Vec<String>,
    /// Literal code fragments pulled out of prohibited statements.
    pub anti: Vec<String>,
}

/// The structured, cache-persisted representation of one convention document.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RuleRecord {
    pub id: RuleId,
    pub source_path: String,
    pub layer: Layer,
    pub priority: Priority,
    pub keywords: Keywords,
    /// Raw prohibited statement lines, in document order, list marker
    /// stripped but display glyphs retained.
    pub prohibited: Vec<String>,
    pub allowed: Vec<String>,
    pub token_estimate: u64,
    pub documentation_summary: String,
}

/// Aggregate lookup structure over one cache generation. Rebuilt wholesale
/// on every build pass; never merged incrementally.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RuleIndex {
    pub version: String,
    #[serde(with = "time::serde::rfc3339")]
    pub build_timestamp: OffsetDateTime,
    pub total_rules: usize,
    /// Layer name to rule ids, one entry per known layer (possibly empty).
    pub layer_index: BTreeMap<String, Vec<RuleId>>,
    /// Primary keyword to rule ids. Buckets appear on first sight.
    pub keyword_index: BTreeMap<String, Vec<RuleId>>,
}

impl RuleIndex {
    /// Rule ids registered for a layer, empty when the layer has none.
    #[must_use]
    pub fn rules_for_layer(&self, layer: Layer) -> &[RuleId] {
        self.layer_index.get(layer.as_str()).map_or(&[], Vec::as_slice)
    }
}

/// Outcome of evaluating one rule record against one source file.
/// Transient: created and consumed within a single validation run.
#[derive(Debug, Clone, Serialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub rule_id: RuleId,
    pub passed: bool,
    pub message: String,
}

impl ValidationResult {
    #[must_use]
    pub fn passed(rule_id: RuleId) -> Self {
        Self { rule_id, passed: true, message: String::new() }
    }

    #[must_use]
    pub fn failed(rule_id: RuleId, message: impl Into<String>) -> Self {
        Self { rule_id, passed: false, message: message.into() }
    }
}

/// Fold one build pass worth of records into a [`RuleIndex`].
///
/// Record ids keep their input (document-processing) order within every
/// bucket, so the index is deterministic for a given document tree.
#[must_use]
pub fn build_index(records: &[RuleRecord], built_at: OffsetDateTime) -> RuleIndex {
    let mut layer_index: BTreeMap<String, Vec<RuleId>> = Layer::ALL
        .iter()
        .map(|layer| (layer.as_str().to_string(), Vec::new()))
        .collect();
    let mut keyword_index: BTreeMap<String, Vec<RuleId>> = BTreeMap::new();

    for record in records {
        if let Some(bucket) = layer_index.get_mut(record.layer.as_str()) {
            bucket.push(record.id.clone());
        }

        for keyword in &record.keywords.primary {
            let bucket = keyword_index.entry(keyword.clone()).or_default();
            if !bucket.contains(&record.id) {
                bucket.push(record.id.clone());
            }
        }
    }

    RuleIndex {
        version: INDEX_VERSION.to_string(),
        build_timestamp: built_at,
        total_rules: records.len(),
        layer_index,
        keyword_index,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    fn fixture_time() -> OffsetDateTime {
        OffsetDateTime::UNIX_EPOCH + Duration::seconds(1_700_000_000)
    }

    fn mk_record(id: &str, layer: Layer, primary: &[&str]) -> RuleRecord {
        RuleRecord {
            id: RuleId(id.to_string()),
            source_path: format!("docs/conventions/{id}.md"),
            layer,
            priority: Priority::Low,
            keywords: Keywords {
                primary: primary.iter().map(ToString::to_string).collect(),
                secondary: vec![],
                anti: vec![],
            },
            prohibited: vec![],
            allowed: vec![],
            token_estimate: 0,
            documentation_summary: format!("Auto-generated from {id}.md"),
        }
    }

    #[test]
    fn rule_id_strips_ordering_digits() {
        let id = RuleId::from_relative_path(Path::new("02-domain-layer/03_aggregate-design.md"));
        assert_eq!(id.as_str(), "domain-layer-03_aggregate-design");

        let id = RuleId::from_relative_path(Path::new("08-error-handling/01-exceptions.md"));
        assert_eq!(id.as_str(), "error-handling-exceptions");
    }

    #[test]
    fn rule_id_without_digits_is_untouched() {
        let id = RuleId::from_relative_path(Path::new("general/naming.md"));
        assert_eq!(id.as_str(), "general-naming");
    }

    #[test]
    fn layer_and_priority_round_trip() {
        for layer in Layer::ALL {
            assert_eq!(Layer::parse(layer.as_str()), Some(layer));
        }
        for priority in [Priority::Critical, Priority::High, Priority::Medium, Priority::Low] {
            assert_eq!(Priority::parse(priority.as_str()), Some(priority));
        }
        assert_eq!(Layer::parse("presentation"), None);
    }

    #[test]
    fn index_contains_every_known_layer() {
        let index = build_index(&[], fixture_time());

        assert_eq!(index.total_rules, 0);
        assert_eq!(index.layer_index.len(), Layer::ALL.len());
        for layer in Layer::ALL {
            assert_eq!(index.rules_for_layer(layer), &[] as &[RuleId]);
        }
    }

    #[test]
    fn index_buckets_preserve_input_order() {
        let records = vec![
            mk_record("domain-aggregate", Layer::Domain, &["aggregate", "design"]),
            mk_record("domain-value-object", Layer::Domain, &["value", "object"]),
            mk_record("misc-naming", Layer::General, &["naming", "design"]),
        ];

        let index = build_index(&records, fixture_time());

        assert_eq!(index.total_rules, 3);
        assert_eq!(
            index.rules_for_layer(Layer::Domain),
            &[RuleId("domain-aggregate".into()), RuleId("domain-value-object".into())]
        );
        assert_eq!(index.rules_for_layer(Layer::General), &[RuleId("misc-naming".into())]);
        assert_eq!(
            index.keyword_index.get("design"),
            Some(&vec![RuleId("domain-aggregate".into()), RuleId("misc-naming".into())])
        );
    }

    #[test]
    fn index_keyword_bucket_holds_each_id_once() {
        let records = vec![mk_record("domain-design-design", Layer::Domain, &["design", "design"])];

        let index = build_index(&records, fixture_time());

        assert_eq!(
            index.keyword_index.get("design"),
            Some(&vec![RuleId("domain-design-design".into())])
        );
    }

    #[test]
    fn record_json_uses_camel_case_keys() {
        let record = mk_record("domain-aggregate", Layer::Domain, &["aggregate"]);
        let json = match serde_json::to_value(&record) {
            Ok(value) => value,
            Err(err) => panic!("record should serialize: {err}"),
        };

        assert!(json.get("sourcePath").is_some());
        assert!(json.get("tokenEstimate").is_some());
        assert!(json.get("documentationSummary").is_some());
        assert_eq!(json.get("layer").and_then(serde_json::Value::as_str), Some("domain"));
    }
}
