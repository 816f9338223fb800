//! Convention rule cache CLI.
//!
//! `build` turns a tree of convention documents into the flat-file rule
//! cache, `validate` checks one source file against a layer's critical
//! rules, and `inject` prints a digest of cached rules for a layer. Every
//! command appends structured events to the JSONL journal.

mod events;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use rulegate_core::matcher::{evaluate_rules, CompiledRule, Normalizer, SourceKind};
use rulegate_core::parse::DocumentParser;
use rulegate_core::{build_index, EngineError, Layer, Priority, RuleId, RuleRecord, ValidationResult};
use rulegate_store_fs::FsRuleStore;
use serde_json::json;
use time::OffsetDateTime;
use walkdir::WalkDir;

use events::{EventKind, Journal};

#[derive(Debug, Parser)]
#[command(name = "rulegate")]
#[command(about = "Convention rule cache and validation")]
struct Cli {
    /// Root of the convention document tree.
    #[arg(long, default_value = "docs/conventions")]
    docs_dir: PathBuf,

    /// Rule cache directory (one JSON file per rule plus the index).
    #[arg(long, default_value = ".rulegate/cache/rules")]
    cache_dir: PathBuf,

    /// Append-only JSONL event journal.
    #[arg(long, default_value = ".rulegate/events.jsonl")]
    journal: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Rebuild the entire rule cache from the document tree.
    Build,
    /// Validate one source file against a layer's critical rules.
    Validate(ValidateArgs),
    /// Print a digest of cached rules for a layer.
    Inject(InjectArgs),
}

#[derive(Debug, Args)]
struct ValidateArgs {
    file: PathBuf,
    #[arg(value_enum)]
    layer: LayerArg,
}

#[derive(Debug, Args)]
struct InjectArgs {
    #[arg(value_enum)]
    layer: LayerArg,
    #[arg(long, value_enum)]
    priority: Option<PriorityArg>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LayerArg {
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

impl LayerArg {
    fn into_layer(self) -> Layer {
        match self {
            Self::Domain => Layer::Domain,
            Self::Application => Layer::Application,
            Self::AdapterRest => Layer::AdapterRest,
            Self::AdapterPersistence => Layer::AdapterPersistence,
            Self::Testing => Layer::Testing,
            Self::LanguagePatterns => Layer::LanguagePatterns,
            Self::Enterprise => Layer::Enterprise,
            Self::ErrorHandling => Layer::ErrorHandling,
            Self::General => Layer::General,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PriorityArg {
    Critical,
    High,
    Medium,
    Low,
}

impl PriorityArg {
    fn into_priority(self) -> Priority {
        match self {
            Self::Critical => Priority::Critical,
            Self::High => Priority::High,
            Self::Medium => Priority::Medium,
            Self::Low => Priority::Low,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let store = FsRuleStore::open(&cli.cache_dir)?;
    let journal = Journal::new(&cli.journal);

    match cli.command {
        Command::Build => run_build(&cli.docs_dir, &store, &journal),
        Command::Validate(args) => run_validate(&args, &store, &journal),
        Command::Inject(args) => run_inject(&args, &store, &journal),
    }
}

fn run_build(docs_dir: &Path, store: &FsRuleStore, journal: &Journal) -> Result<()> {
    if !docs_dir.is_dir() {
        bail!("docs directory not found: {}", docs_dir.display());
    }

    let parser = DocumentParser::with_defaults()?;

    let mut documents = Vec::new();
    for entry in WalkDir::new(docs_dir).sort_by_file_name() {
        let entry =
            entry.with_context(|| format!("failed to walk docs tree {}", docs_dir.display()))?;
        if entry.file_type().is_file()
            && entry.path().extension().is_some_and(|ext| ext == "md")
        {
            documents.push(entry.into_path());
        }
    }

    // The cache is rebuilt wholesale; stale records from a previous
    // generation must not survive.
    store.wipe()?;

    let mut records: Vec<RuleRecord> = Vec::new();
    let mut skipped = 0_usize;
    let mut failed = 0_usize;

    println!("Processing {} convention documents in {}", documents.len(), docs_dir.display());
    println!();

    for path in &documents {
        let relative = path.strip_prefix(docs_dir).unwrap_or(path);
        let file_name = relative
            .file_name()
            .map_or_else(String::new, |name| name.to_string_lossy().into_owned());

        if parser.is_non_rule_document(&file_name) {
            println!("  Skipped:   {} (non-rule document)", relative.display());
            skipped += 1;
            continue;
        }

        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) => {
                tracing::warn!(document = %path.display(), error = %err, "skipping unreadable document");
                println!("  Failed:    {} ({err})", relative.display());
                failed += 1;
                continue;
            }
        };

        let record = parser.parse(relative, &path.to_string_lossy(), &text);
        store.put_record(&record)?;
        println!(
            "  Generated: {}.json (layer: {}, priority: {})",
            record.id, record.layer, record.priority
        );
        records.push(record);
    }

    let index = build_index(&records, OffsetDateTime::now_utc());
    store.put_index(&index)?;

    println!();
    println!("Rule cache build complete");
    println!("  Total files: {}", documents.len());
    println!("  Generated:   {}", records.len());
    println!("  Skipped:     {skipped}");
    if failed > 0 {
        println!("  Failed:      {failed}");
    }
    println!("  Cache:       {}", store.cache_dir().display());

    journal.append(
        EventKind::CacheBuildComplete,
        json!({
            "docs_dir": docs_dir.display().to_string(),
            "total_files": documents.len(),
            "generated": records.len(),
            "skipped": skipped,
            "failed": failed,
        }),
    )?;
    Ok(())
}

fn run_validate(args: &ValidateArgs, store: &FsRuleStore, journal: &Journal) -> Result<()> {
    let started = Instant::now();
    let layer = args.layer.into_layer();
    let file_display = args.file.display().to_string();

    if !args.file.exists() {
        let err = EngineError::NotFound(format!("source file {file_display}"));
        tracing::warn!(error = %err, "aborting validation");
        journal.append(
            EventKind::ValidationError,
            json!({ "file": file_display, "layer": layer.as_str(), "error": "file_not_found" }),
        )?;
        let results = vec![ValidationResult::failed(
            RuleId("file-existence".to_string()),
            format!("File not found: {file_display}"),
        )];
        print_report(&file_display, &results, store)?;
        return Ok(());
    }

    let raw = fs::read_to_string(&args.file)
        .with_context(|| format!("failed to read source file {file_display}"))?;
    let file_lines = raw.lines().count();

    journal.append(
        EventKind::ValidationStart,
        json!({ "file": file_display, "layer": layer.as_str(), "file_lines": file_lines }),
    )?;

    let normalizer = Normalizer::new()?;
    let content = normalizer.normalize(&raw, SourceKind::from_path(&args.file));

    let Some(index) = store.get_index()? else {
        println!("No rule cache found - run `rulegate build` first.");
        journal.append(
            EventKind::ValidationWarning,
            json!({ "file": file_display, "layer": layer.as_str(), "warning": "index_missing" }),
        )?;
        return Ok(());
    };
    journal.append(
        EventKind::CacheIndexLoaded,
        json!({
            "index_file": store.index_path().display().to_string(),
            "total_rules": index.total_rules,
        }),
    )?;

    let rule_ids = index.rules_for_layer(layer);
    if rule_ids.is_empty() {
        println!("No rules registered for layer: {layer}");
        journal.append(
            EventKind::ValidationWarning,
            json!({ "file": file_display, "layer": layer.as_str(), "warning": "no_rules_found" }),
        )?;
        return Ok(());
    }

    // Only zero-tolerance rules are enforced automatically; lower tiers are
    // advisory and surfaced through `inject`.
    let mut rules: Vec<CompiledRule> = Vec::new();
    let mut unavailable = 0_usize;
    for id in rule_ids {
        let Some(record) = store.get_record(id)? else {
            let err = EngineError::IndexInconsistency(format!("rule {id} has no backing record"));
            tracing::warn!(error = %err, "rule unavailable");
            unavailable += 1;
            continue;
        };
        if record.priority != Priority::Critical {
            continue;
        }
        match CompiledRule::compile(&record) {
            Ok(rule) => rules.push(rule),
            Err(err) => {
                tracing::warn!(rule_id = %id, error = %err, "skipping rule with uncompilable patterns");
                unavailable += 1;
            }
        }
    }

    let results = evaluate_rules(&content, &rules);
    let failed: Vec<&ValidationResult> = results.iter().filter(|result| !result.passed).collect();
    let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    journal.append(
        EventKind::ValidationComplete,
        json!({
            "file": file_display,
            "layer": layer.as_str(),
            "total_rules": results.len(),
            "passed": results.len() - failed.len(),
            "failed": failed.len(),
            "unavailable_rules": unavailable,
            "validation_time_ms": elapsed_ms,
            "status": if failed.is_empty() { "passed" } else { "failed" },
            "failed_rules": failed
                .iter()
                .map(|result| json!({
                    "rule_id": result.rule_id.as_str(),
                    "message": result.message,
                }))
                .collect::<Vec<_>>(),
        }),
    )?;

    print_report(&file_display, &results, store)
}

fn print_report(file: &str, results: &[ValidationResult], store: &FsRuleStore) -> Result<()> {
    let failed: Vec<&ValidationResult> = results.iter().filter(|result| !result.passed).collect();

    println!();
    println!("---");
    println!();

    if failed.is_empty() {
        println!("\u{2705} Validation passed");
        println!();
        println!("File: `{file}`");
        if results.is_empty() {
            println!("No critical rules to enforce for this layer.");
        } else {
            println!("All {} critical rules satisfied.", results.len());
        }
    } else {
        println!("\u{26a0} Validation failed");
        println!();
        println!("File: `{file}`");
        println!();

        for result in &failed {
            match store.get_record(&result.rule_id)? {
                Some(record) => {
                    println!("Rule violated: {}", record.documentation_summary);
                    println!("Problem: {}", result.message);
                    if !record.prohibited.is_empty() {
                        println!();
                        println!("Prohibited:");
                        for item in record.prohibited.iter().take(3) {
                            println!("- {item}");
                        }
                    }
                    println!();
                    println!("Reference: `{}`", record.source_path);
                }
                None => {
                    println!("Rule violated: {}", result.rule_id);
                    println!("Problem: {}", result.message);
                }
            }
            println!();
        }

        println!("Fix the violations and validate again.");
    }

    println!();
    println!("---");
    Ok(())
}

fn run_inject(args: &InjectArgs, store: &FsRuleStore, journal: &Journal) -> Result<()> {
    let layer = args.layer.into_layer();
    let priority_filter = args.priority.map(PriorityArg::into_priority);

    let Some(index) = store.get_index()? else {
        println!("No rule cache found - run `rulegate build` first.");
        journal.append(
            EventKind::CacheInjectionError,
            json!({ "layer": layer.as_str(), "error": "index_missing" }),
        )?;
        return Ok(());
    };
    journal.append(
        EventKind::CacheIndexLoaded,
        json!({
            "index_file": store.index_path().display().to_string(),
            "total_rules": index.total_rules,
        }),
    )?;

    let rule_ids = index.rules_for_layer(layer);
    if rule_ids.is_empty() {
        println!("No rules found for layer: {layer}");
        journal.append(
            EventKind::CacheInjectionError,
            json!({ "layer": layer.as_str(), "error": "no_rules_found" }),
        )?;
        return Ok(());
    }

    let mut rules: Vec<RuleRecord> = Vec::new();
    let mut loaded_files: Vec<String> = Vec::new();
    for id in rule_ids {
        let Some(record) = store.get_record(id)? else {
            tracing::warn!(rule_id = %id, "rule referenced by index is unavailable");
            continue;
        };
        if priority_filter.is_some_and(|filter| record.priority != filter) {
            continue;
        }
        loaded_files.push(format!("{id}.json"));
        rules.push(record);
    }

    if rules.is_empty() {
        let filter = priority_filter.map_or("all", Priority::as_str);
        println!("No rules match priority filter: {filter}");
        journal.append(
            EventKind::CacheInjectionError,
            json!({
                "layer": layer.as_str(),
                "priority_filter": filter,
                "error": "no_matching_rules",
            }),
        )?;
        return Ok(());
    }

    // Rough budget figure: serialized size over four bytes per token.
    let estimated_tokens = rules
        .iter()
        .map(|record| serde_json::to_string(record).map_or(0, |body| body.len()))
        .sum::<usize>()
        / 4;

    journal.append(
        EventKind::CacheInjection,
        json!({
            "layer": layer.as_str(),
            "priority_filter": priority_filter.map_or("all", Priority::as_str),
            "total_rules_available": rule_ids.len(),
            "rules_loaded": rules.len(),
            "cache_files": loaded_files,
            "estimated_tokens": estimated_tokens,
        }),
    )?;

    println!("---");
    println!();
    println!("## {} layer rules (auto-injected)", layer.as_str().to_uppercase());
    println!();

    let critical: Vec<&RuleRecord> =
        rules.iter().filter(|record| record.priority == Priority::Critical).collect();
    if !critical.is_empty() {
        println!("### \u{274c} Zero-tolerance rules");
        println!();
        for record in &critical {
            for item in record.prohibited.iter().take(3) {
                println!("- {item}");
            }
        }
        println!();
    }

    println!("### \u{2705} Required practices");
    println!();
    for record in &rules {
        for item in record.allowed.iter().take(3) {
            println!("- {item}");
        }
    }
    println!();

    println!("### Reference documents");
    println!();
    for record in rules.iter().take(5) {
        println!("- [{}]({})", record.documentation_summary, record.source_path);
    }
    println!();
    println!("These rules are enforced during validation.");
    println!();
    println!("---");
    Ok(())
}
