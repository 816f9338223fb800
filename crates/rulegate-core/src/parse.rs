//! Convention document parsing.
//!
//! Derives everything a rule record carries — keywords, prohibited/allowed
//! statements, anti-patterns, priority, layer, token estimate — from one
//! document's path and text alone. No external state is consulted, so the
//! same document always parses to the same record.

use std::path::Path;

use regex_lite::Regex;

use crate::{EngineError, Keywords, Layer, Priority, RuleId, RuleRecord};

/// Classification tables for the parser. The tier markers and glyphs are
/// data, not code, so tests can exercise the classifier in isolation.
#[derive(Debug, Clone)]
pub struct ParserConfig {
    /// Ordered (path segment, layer) pairs; first match wins.
    pub layer_table: Vec<(String, Layer)>,
    /// Ordered (tier, marker tokens) pairs scanned case-insensitively over
    /// the full document text; first matching tier wins.
    pub priority_tiers: Vec<(Priority, Vec<String>)>,
    pub prohibited_glyph: char,
    pub allowed_glyph: char,
    /// Documents whose file name contains one of these (case-insensitive)
    /// are not rule documents and produce no record.
    pub skip_markers: Vec<String>,
    /// Words-to-tokens cost factor for the budget estimate.
    pub token_factor: f64,
}

impl Default for ParserConfig {
    fn default() -> Self {
        let layer = |segment: &str, layer: Layer| (segment.to_string(), layer);
        let tokens = |raw: &[&str]| raw.iter().map(ToString::to_string).collect::<Vec<_>>();

        Self {
            layer_table: vec![
                layer("02-domain-layer", Layer::Domain),
                layer("03-application-layer", Layer::Application),
                layer("01-adapter-rest-api-layer", Layer::AdapterRest),
                layer("04-persistence-layer", Layer::AdapterPersistence),
                layer("05-testing", Layer::Testing),
                layer("06-java21-patterns", Layer::LanguagePatterns),
                layer("07-enterprise-patterns", Layer::Enterprise),
                layer("08-error-handling", Layer::ErrorHandling),
            ],
            priority_tiers: vec![
                (Priority::Critical, tokens(&["zero-tolerance", "절대", "금지", "critical"])),
                (Priority::High, tokens(&["필수", "중요", "important", "must"])),
                (Priority::Medium, tokens(&["권장", "recommended", "should"])),
            ],
            prohibited_glyph: '❌',
            allowed_glyph: '✅',
            skip_markers: tokens(&["readme", "overview", "roadmap"]),
            token_factor: 1.3,
        }
    }
}

/// Parses convention documents into [`RuleRecord`]s.
///
/// Patterns are compiled once at construction and reused for every document
/// in a build pass.
#[derive(Debug)]
pub struct DocumentParser {
    config: ParserConfig,
    stem_prefix: Regex,
}

impl DocumentParser {
    /// # Errors
    /// Returns [`EngineError::ParseFailure`] when an internal pattern fails
    /// to compile.
    pub fn new(config: ParserConfig) -> Result<Self, EngineError> {
        let stem_prefix = Regex::new(r"^[0-9]+_")
            .map_err(|err| EngineError::ParseFailure(format!("invalid stem pattern: {err}")))?;
        Ok(Self { config, stem_prefix })
    }

    /// # Errors
    /// Returns [`EngineError::ParseFailure`] when an internal pattern fails
    /// to compile.
    pub fn with_defaults() -> Result<Self, EngineError> {
        Self::new(ParserConfig::default())
    }

    #[must_use]
    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    /// Whether a file name marks a non-rule document (readme, overview,
    /// roadmap). Such documents are counted by the build but never parsed.
    #[must_use]
    pub fn is_non_rule_document(&self, file_name: &str) -> bool {
        let lowered = file_name.to_lowercase();
        self.config.skip_markers.iter().any(|marker| lowered.contains(marker))
    }

    /// Parse one document into its rule record.
    ///
    /// `relative_path` is the document's path below the docs root and feeds
    /// the id and primary keywords; `source_path` is the path as given to
    /// the builder and feeds layer classification and display.
    #[must_use]
    pub fn parse(&self, relative_path: &Path, source_path: &str, text: &str) -> RuleRecord {
        let file_name = relative_path
            .file_name()
            .map_or_else(String::new, |name| name.to_string_lossy().into_owned());

        let prohibited = statements(text, self.config.prohibited_glyph);
        let allowed = statements(text, self.config.allowed_glyph);
        let anti = anti_patterns(&prohibited);

        RuleRecord {
            id: RuleId::from_relative_path(relative_path),
            source_path: source_path.to_string(),
            layer: self.layer_of(source_path),
            priority: self.priority_of(text),
            keywords: Keywords {
                primary: self.filename_keywords(relative_path),
                secondary: title_keywords(text),
                anti,
            },
            prohibited,
            allowed,
            token_estimate: self.token_estimate(text),
            documentation_summary: format!("Auto-generated from {file_name}"),
        }
    }

    /// First matching (path segment, layer) table entry; `general` otherwise.
    #[must_use]
    pub fn layer_of(&self, source_path: &str) -> Layer {
        self.config
            .layer_table
            .iter()
            .find(|(segment, _)| source_path.contains(segment.as_str()))
            .map_or(Layer::General, |(_, layer)| *layer)
    }

    /// First matching tier wins; classification stops at the first hit, so
    /// a document carrying both zero-tolerance and "should" markers is
    /// still critical.
    #[must_use]
    pub fn priority_of(&self, text: &str) -> Priority {
        let lowered = text.to_lowercase();
        self.config
            .priority_tiers
            .iter()
            .find(|(_, markers)| markers.iter().any(|marker| lowered.contains(marker.as_str())))
            .map_or(Priority::Low, |(priority, _)| *priority)
    }

    /// Word count times a fixed factor, truncated. A cost proxy for
    /// budgeting how many rules may be surfaced at once, not a measure.
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn token_estimate(&self, text: &str) -> u64 {
        let words = text.split_whitespace().count();
        (words as f64 * self.config.token_factor) as u64
    }

    fn filename_keywords(&self, relative_path: &Path) -> Vec<String> {
        let stem = relative_path
            .file_stem()
            .map_or_else(String::new, |stem| stem.to_string_lossy().into_owned());
        let stem = self.stem_prefix.replace(&stem, "");

        stem.replace('-', " ")
            .split_whitespace()
            .map(str::to_lowercase)
            .collect()
    }
}

/// Tokens of the first level-1 heading: lowercased, parenthesised asides
/// stripped, dashes folded to spaces, punctuation dropped. Empty when the
/// document has no such heading.
#[must_use]
pub fn title_keywords(text: &str) -> Vec<String> {
    let Some(title) = text.lines().find_map(|line| line.strip_prefix("# ")) else {
        return Vec::new();
    };

    let lowered = strip_parenthesized(&title.trim().to_lowercase());
    lowered
        .chars()
        .filter_map(|c| match c {
            '\u{2014}' | '\u{2013}' | '-' => Some(' '),
            c if c.is_alphanumeric() || c == '_' || c.is_whitespace() => Some(c),
            _ => None,
        })
        .collect::<String>()
        .split_whitespace()
        .map(ToString::to_string)
        .collect()
}

fn strip_parenthesized(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(open) = rest.find('(') {
        let Some(close) = rest[open..].find(')') else {
            break;
        };
        out.push_str(&rest[..open]);
        rest = &rest[open + close + 1..];
    }
    out.push_str(rest);
    out
}

/// Lines that are list items tagged with `glyph`, in document order. The
/// list marker is stripped; the glyph and the raw statement text stay, so
/// the capture is still usable for display.
fn statements(text: &str, glyph: char) -> Vec<String> {
    text.lines()
        .filter_map(|line| {
            let payload = list_item_payload(line)?;
            payload.starts_with(glyph).then(|| payload.trim_end().to_string())
        })
        .collect()
}

fn list_item_payload(line: &str) -> Option<&str> {
    let rest = line.trim_start().strip_prefix('-')?;
    Some(rest.trim_start())
}

/// Every backtick-delimited span inside the prohibited statements, in
/// extraction order. A statement may contribute zero or more spans.
#[must_use]
pub fn anti_patterns(prohibited: &[String]) -> Vec<String> {
    let mut out = Vec::new();
    for statement in prohibited {
        out.extend(backtick_spans(statement));
    }
    out
}

fn backtick_spans(text: &str) -> Vec<String> {
    let parts: Vec<&str> = text.split('`').collect();
    parts
        .iter()
        .enumerate()
        .filter(|(i, span)| i % 2 == 1 && *i + 1 < parts.len() && !span.is_empty())
        .map(|(_, span)| (*span).to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> DocumentParser {
        match DocumentParser::with_defaults() {
            Ok(parser) => parser,
            Err(err) => panic!("default parser should construct: {err}"),
        }
    }

    const ERROR_HANDLING_DOC: &str = "\
# Error Handling Rules (Critical)

Exception handling is zero-tolerance territory.

## Prohibited

- \u{274c} `catch (Exception e) {}` swallows failures silently
- \u{274c} Returning null instead of a domain error

## Required

- \u{2705} Translate low-level exceptions into domain errors
- \u{2705} Use `Result`-style return types at boundaries
";

    #[test]
    fn scenario_error_handling_document() {
        let record = parser().parse(
            Path::new("08-error-handling/01_exception-rules.md"),
            "docs/conventions/08-error-handling/01_exception-rules.md",
            ERROR_HANDLING_DOC,
        );

        assert_eq!(record.priority, Priority::Critical);
        assert_eq!(record.layer, Layer::ErrorHandling);
        assert_eq!(record.keywords.anti, vec!["catch (Exception e) {}".to_string()]);
        assert!(record.keywords.secondary.contains(&"error".to_string()));
        assert!(record.keywords.secondary.contains(&"handling".to_string()));
        assert!(!record.keywords.secondary.contains(&"critical".to_string()));
        assert_eq!(record.prohibited.len(), 2);
        assert_eq!(record.allowed.len(), 2);
        assert_eq!(record.id.as_str(), "error-handling-01_exception-rules");
        assert_eq!(record.documentation_summary, "Auto-generated from 01_exception-rules.md");
    }

    #[test]
    fn anti_patterns_come_only_from_prohibited_lines() {
        let record = parser().parse(
            Path::new("misc/sample.md"),
            "docs/conventions/misc/sample.md",
            "# Sample\n\n- \u{2705} Prefer `Optional` returns\n- \u{274c} Use of `@Data` on entities\n",
        );

        assert_eq!(record.keywords.anti, vec!["@Data".to_string()]);
    }

    #[test]
    fn statements_keep_document_order_and_glyphs() {
        let text = "- \u{274c} first\n  - \u{274c} second `x` and `y`\n- plain item\n- \u{2705} ok\n";
        let prohibited = statements(text, '\u{274c}');

        assert_eq!(prohibited, vec!["\u{274c} first".to_string(), "\u{274c} second `x` and `y`".to_string()]);
        assert_eq!(anti_patterns(&prohibited), vec!["x".to_string(), "y".to_string()]);
        assert_eq!(statements(text, '\u{2705}'), vec!["\u{2705} ok"]);
    }

    #[test]
    fn unterminated_backtick_span_is_ignored() {
        assert_eq!(backtick_spans("`closed` and `open"), vec!["closed".to_string()]);
        assert!(backtick_spans("no spans here").is_empty());
    }

    #[test]
    fn priority_first_matching_tier_wins() {
        let parser = parser();

        assert_eq!(parser.priority_of("this rule is zero-tolerance and you must obey"), Priority::Critical);
        assert_eq!(parser.priority_of("금지 sections are critical even in korean"), Priority::Critical);
        assert_eq!(parser.priority_of("you MUST do this"), Priority::High);
        assert_eq!(parser.priority_of("this approach is recommended"), Priority::Medium);
        assert_eq!(parser.priority_of("purely descriptive prose"), Priority::Low);
    }

    #[test]
    fn layer_table_first_match_wins_and_defaults_to_general() {
        let parser = parser();

        assert_eq!(parser.layer_of("docs/conventions/02-domain-layer/x.md"), Layer::Domain);
        assert_eq!(
            parser.layer_of("docs/conventions/06-java21-patterns/records.md"),
            Layer::LanguagePatterns
        );
        assert_eq!(parser.layer_of("docs/conventions/style-notes.md"), Layer::General);
    }

    #[test]
    fn filename_keywords_strip_numeric_prefix() {
        let record = parser().parse(
            Path::new("02-domain-layer/01_aggregate-design.md"),
            "docs/conventions/02-domain-layer/01_aggregate-design.md",
            "# Aggregate Design\n",
        );

        assert_eq!(record.keywords.primary, vec!["aggregate".to_string(), "design".to_string()]);
    }

    #[test]
    fn title_keywords_empty_without_heading() {
        assert!(title_keywords("no heading at all\n## secondary only\n").is_empty());
    }

    #[test]
    fn title_keywords_strip_asides_and_punctuation() {
        assert_eq!(
            title_keywords("# Persistence Rules (JPA, QueryDSL) \u{2014} Mapping!\n"),
            vec!["persistence".to_string(), "rules".to_string(), "mapping".to_string()]
        );
    }

    #[test]
    fn skip_markers_are_case_insensitive() {
        let parser = parser();

        assert!(parser.is_non_rule_document("README.md"));
        assert!(parser.is_non_rule_document("00_Overview.md"));
        assert!(parser.is_non_rule_document("migration-roadmap.md"));
        assert!(!parser.is_non_rule_document("01_aggregate-design.md"));
    }

    #[test]
    fn token_estimate_truncates() {
        let parser = parser();
        // 10 words * 1.3 = 13.0
        assert_eq!(parser.token_estimate("one two three four five six seven eight nine ten"), 13);
        assert_eq!(parser.token_estimate(""), 0);
    }
}
