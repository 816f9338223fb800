//! Content normalization and rule evaluation.
//!
//! Normalization lexically strips comments and string/character literals so
//! a prohibited pattern appearing inside a comment or string is not flagged
//! as live code. Evaluation runs each critical rule's compiled patterns
//! against the normalized content and stops at the first hit per rule.
//!
//! The two checks are deliberately asymmetric: anti-patterns are literal
//! code fragments and match case-sensitively, while prohibited statements
//! are looser natural-language captions and match case-insensitively.

use std::path::Path;

use regex_lite::Regex;

use crate::{EngineError, RuleId, RuleRecord, ValidationResult};

/// Phrases at or below this length (in characters) are too noisy to search
/// for and are skipped entirely.
const MIN_PHRASE_CHARS: usize = 5;

/// Display markup stripped from prohibited statements before matching.
const DISPLAY_MARKUP: [char; 4] = ['\u{274c}', '\u{2705}', '`', '*'];

/// Lexical family of a candidate source file, chosen from its extension.
/// Unknown kinds pass through normalization unchanged.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum SourceKind {
    JavaLike,
    Python,
    Plain,
}

impl SourceKind {
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()).map(str::to_lowercase).as_deref() {
            Some("java" | "kt") => Self::JavaLike,
            Some("py") => Self::Python,
            _ => Self::Plain,
        }
    }
}

/// Strips comments and string literals from source content.
///
/// Patterns are compiled once at construction. Stripping order is fixed —
/// block comments, then line comments, then string/char literals.
#[derive(Debug)]
pub struct Normalizer {
    block_comment: Regex,
    line_comment: Regex,
    py_doc_double: Regex,
    py_doc_single: Regex,
    py_line_comment: Regex,
    double_quoted: Regex,
    single_quoted: Regex,
}

impl Normalizer {
    /// # Errors
    /// Returns [`EngineError::ParseFailure`] when an internal pattern fails
    /// to compile.
    pub fn new() -> Result<Self, EngineError> {
        Ok(Self {
            block_comment: compile(r"(?s)/\*.*?\*/")?,
            line_comment: compile(r"(?m)//.*?$")?,
            py_doc_double: compile(r#"(?s)""".*?""""#)?,
            py_doc_single: compile(r"(?s)'''.*?'''")?,
            py_line_comment: compile(r"(?m)#.*?$")?,
            double_quoted: compile(r#""(?:\\.|[^"\\])*""#)?,
            single_quoted: compile(r"'(?:\\.|[^'\\])*'")?,
        })
    }

    /// Remove comment and string spans according to the source kind.
    #[must_use]
    pub fn normalize(&self, content: &str, kind: SourceKind) -> String {
        let passes: Vec<&Regex> = match kind {
            SourceKind::JavaLike => {
                vec![&self.block_comment, &self.line_comment, &self.double_quoted, &self.single_quoted]
            }
            SourceKind::Python => vec![
                &self.py_doc_double,
                &self.py_doc_single,
                &self.py_line_comment,
                &self.double_quoted,
                &self.single_quoted,
            ],
            SourceKind::Plain => return content.to_string(),
        };

        let mut stripped = content.to_string();
        for pass in passes {
            stripped = pass.replace_all(&stripped, "").into_owned();
        }
        stripped
    }
}

/// Build a pattern matching `literal` with every whitespace run treated as
/// "zero or more whitespace" in the target, so reformatted code still
/// matches. `catch (Exception e) {}` matches `catch(Exception e){}`.
#[must_use]
pub fn flexible_literal_pattern(literal: &str, case_insensitive: bool) -> String {
    let escaped = literal
        .split_whitespace()
        .map(regex_lite::escape)
        .collect::<Vec<_>>()
        .join(r"\s*");

    if case_insensitive {
        format!("(?i){escaped}")
    } else {
        escaped
    }
}

#[derive(Debug)]
struct AntiPattern {
    literal: String,
    matcher: Regex,
}

#[derive(Debug)]
enum ProhibitedPattern {
    /// `@`-prefixed statements catch the annotation identifier itself, not
    /// the full usage text, and match case-sensitively.
    Annotation { token: String, matcher: Regex },
    /// Longer cleaned phrases carry enough specificity to search for
    /// case-insensitively with whitespace-flexible matching.
    Phrase { text: String, matcher: Regex },
}

/// One rule record's patterns, compiled once per load and cached alongside
/// the record by the caller, keyed by record id.
#[derive(Debug)]
pub struct CompiledRule {
    rule_id: RuleId,
    anti: Vec<AntiPattern>,
    prohibited: Vec<ProhibitedPattern>,
}

impl CompiledRule {
    /// # Errors
    /// Returns [`EngineError::ParseFailure`] when a derived pattern fails to
    /// compile.
    pub fn compile(record: &RuleRecord) -> Result<Self, EngineError> {
        let anti = record
            .keywords
            .anti
            .iter()
            .map(|literal| {
                Ok(AntiPattern {
                    literal: literal.clone(),
                    matcher: compile(&flexible_literal_pattern(literal, false))?,
                })
            })
            .collect::<Result<Vec<_>, EngineError>>()?;

        let mut prohibited = Vec::new();
        for statement in &record.prohibited {
            let cleaned = strip_display_markup(statement);

            if let Some(token) = cleaned.starts_with('@').then(|| first_token(&cleaned)) {
                prohibited.push(ProhibitedPattern::Annotation {
                    matcher: compile(&regex_lite::escape(&token))?,
                    token,
                });
            } else if cleaned.chars().count() > MIN_PHRASE_CHARS {
                prohibited.push(ProhibitedPattern::Phrase {
                    matcher: compile(&flexible_literal_pattern(&cleaned, true))?,
                    text: cleaned,
                });
            }
        }

        Ok(Self { rule_id: record.id.clone(), anti, prohibited })
    }

    #[must_use]
    pub fn rule_id(&self) -> &RuleId {
        &self.rule_id
    }

    /// Evaluate this rule against normalized content. Checks run in fixed
    /// order — anti-patterns, then prohibited statements — and stop at the
    /// first match, so a rule yields at most one failing result.
    #[must_use]
    pub fn evaluate(&self, content: &str) -> ValidationResult {
        for anti in &self.anti {
            if anti.matcher.is_match(content) {
                return ValidationResult::failed(
                    self.rule_id.clone(),
                    format!("Anti-pattern detected: {}", anti.literal),
                );
            }
        }

        for pattern in &self.prohibited {
            match pattern {
                ProhibitedPattern::Annotation { token, matcher } => {
                    if matcher.is_match(content) {
                        return ValidationResult::failed(
                            self.rule_id.clone(),
                            format!("Prohibited annotation: {token}"),
                        );
                    }
                }
                ProhibitedPattern::Phrase { text, matcher } => {
                    if matcher.is_match(content) {
                        return ValidationResult::failed(
                            self.rule_id.clone(),
                            format!("Prohibited pattern: {text}"),
                        );
                    }
                }
            }
        }

        ValidationResult::passed(self.rule_id.clone())
    }
}

/// Evaluate compiled rules in order, one result per rule.
#[must_use]
pub fn evaluate_rules(content: &str, rules: &[CompiledRule]) -> Vec<ValidationResult> {
    rules.iter().map(|rule| rule.evaluate(content)).collect()
}

fn strip_display_markup(statement: &str) -> String {
    statement.chars().filter(|c| !DISPLAY_MARKUP.contains(c)).collect::<String>().trim().to_string()
}

fn first_token(cleaned: &str) -> String {
    cleaned.split_whitespace().next().unwrap_or(cleaned).to_string()
}

fn compile(pattern: &str) -> Result<Regex, EngineError> {
    Regex::new(pattern)
        .map_err(|err| EngineError::ParseFailure(format!("invalid match pattern: {err}")))
}
