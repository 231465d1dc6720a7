//! Command-line interface.
//!
//! Every subcommand renders either pretty JSON or a short text summary and
//! returns an [`ExitCode`].

use crate::collect::{ScanOptions, ScanScope, TreeScanner};
use crate::exit_codes::ExitCode;
use crate::host::{HostTree, MemoryTree};
use crate::inference::{
    build_classifier, detect_issues, ClassifierStrategy, IssueSignature, LearnedModel,
};
use crate::session::{CycleReport, Session};
use crate::store::{FileKvStore, ImportMode, PatternStore, Rating, StoreDocument};
use crate::synth::HttpGenerator;
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;
use umbra_common::{NodeId, PatchId};
use umbra_config::{
    get_preset, list_presets, policy_schema, resolve_config, validate_policy, ConfigPaths,
    ConfigSnapshot, Policy, PresetName, ResolvedConfig,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Json,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ImportModeArg {
    Replace,
    Merge,
}

impl From<ImportModeArg> for ImportMode {
    fn from(mode: ImportModeArg) -> Self {
        match mode {
            ImportModeArg::Replace => ImportMode::Replace,
            ImportModeArg::Merge => ImportMode::Merge,
        }
    }
}

/// Dark-mode defect scanner and patcher.
#[derive(Parser, Debug)]
#[command(name = "umbra", version, about)]
pub struct Cli {
    /// Policy file (overrides UMBRA_CONFIG and the user config dir)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Pattern store directory (overrides the policy and the platform data dir)
    #[arg(long, global = true, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Scan a tree document, patch what is found, and report
    Scan(ScanArgs),
    /// Rate an applied patch
    Feedback(FeedbackArgs),
    /// Ask the generator for a fix to one node
    Ask(AskArgs),
    /// Write the pattern store as a portable document
    Export {
        /// Output file (stdout when omitted)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Load a pattern store document
    Import {
        path: PathBuf,
        #[arg(long, value_enum, default_value_t = ImportModeArg::Merge)]
        mode: ImportModeArg,
    },
    /// Summarize the pattern store
    Stats,
    /// Inspect and validate configuration
    Config(ConfigArgs),
}

#[derive(Args, Debug)]
pub struct ScanArgs {
    /// Tree document (JSON)
    pub document: PathBuf,

    /// Domain bucket for learned patterns
    #[arg(long)]
    pub domain: Option<String>,

    /// Report issues without synthesizing or applying patches
    #[arg(long)]
    pub dry_run: bool,

    /// Learned classifier model (JSON); heuristic when omitted
    #[arg(long, value_name = "PATH")]
    pub model: Option<PathBuf>,

    /// Restrict the scan to these node ids
    #[arg(long = "node", value_name = "ID")]
    pub nodes: Vec<u64>,
}

#[derive(Args, Debug)]
pub struct FeedbackArgs {
    #[arg(long)]
    pub patch: String,

    /// good | bad
    #[arg(long)]
    pub rating: Rating,

    /// Signature key, for patches missing from the catalog
    #[arg(long)]
    pub signature: Option<String>,
}

#[derive(Args, Debug)]
pub struct AskArgs {
    pub document: PathBuf,

    #[arg(long)]
    pub node: u64,

    #[arg(long)]
    pub message: String,

    #[arg(long)]
    pub domain: Option<String>,
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the effective policy and where it came from
    Show,
    /// Validate a policy file (the effective one when omitted)
    Validate { path: Option<PathBuf> },
    /// Print the policy JSON schema
    Schema,
    /// List presets, or print one
    Presets { name: Option<PresetName> },
}

/// Install the global subscriber. `RUST_LOG` overrides the verbosity flag;
/// later calls are no-ops.
pub fn init_logging(format: LogFormat, verbose: u8) {
    let default = match verbose {
        0 => "umbra=info,umbra_core=info",
        1 => "umbra=debug,umbra_core=debug",
        _ => "umbra=trace,umbra_core=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    let _ = match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.try_init(),
    };
}

/// Dispatch a parsed command line.
pub async fn run(cli: &Cli) -> ExitCode {
    let resolved = match resolve_config(&ConfigPaths::from_env(cli.config.clone())) {
        Ok(resolved) => resolved,
        Err(err) => {
            error!(error = %err, "configuration error");
            return ExitCode::ConfigError;
        }
    };
    for warning in &resolved.warnings {
        warn!(warning = %warning, "configuration warning");
    }

    match &cli.command {
        Command::Scan(args) => run_scan(cli, &resolved, args).await,
        Command::Feedback(args) => run_feedback(cli, &resolved, args),
        Command::Ask(args) => run_ask(cli, &resolved, args).await,
        Command::Export { output } => run_export(cli, &resolved, output.as_deref()),
        Command::Import { path, mode } => run_import(cli, &resolved, path, (*mode).into()),
        Command::Stats => run_stats(cli, &resolved),
        Command::Config(args) => run_config(cli, &resolved, &args.command),
    }
}

fn emit<T: Serialize>(format: OutputFormat, value: &T, text: impl FnOnce() -> String) {
    match format {
        OutputFormat::Json => match serde_json::to_string_pretty(value) {
            Ok(json) => println!("{}", json),
            Err(err) => error!(error = %err, "could not render output"),
        },
        OutputFormat::Text => println!("{}", text()),
    }
}

fn fail(err: umbra_common::Error) -> ExitCode {
    error!(code = err.code(), error = %err, "command failed");
    ExitCode::from_error(&err)
}

fn kv_store(cli: &Cli, policy: &Policy) -> Result<FileKvStore, umbra_common::Error> {
    if let Some(dir) = cli.data_dir.as_ref().or(policy.store.data_dir.as_ref()) {
        return Ok(FileKvStore::new(dir));
    }
    FileKvStore::with_default_dir().map_err(|e| umbra_common::Error::Persistence(e.to_string()))
}

fn open_store(cli: &Cli, policy: &Policy) -> Result<PatternStore, umbra_common::Error> {
    let kv = kv_store(cli, policy)?;
    let mut store = PatternStore::new(
        Box::new(kv),
        policy.store.namespace.clone(),
        policy.synthesis.clone(),
    )
    .with_catalog_retention(policy.store.catalog_retention());
    store.load()?;
    Ok(store)
}

fn load_tree(path: &Path) -> Result<MemoryTree, umbra_common::Error> {
    MemoryTree::from_file(path).map_err(umbra_common::Error::from)
}

fn build_session(
    cli: &Cli,
    policy: &Policy,
    domain: Option<&str>,
    model: Option<&Path>,
) -> Result<Session, umbra_common::Error> {
    let kv = kv_store(cli, policy)?;
    let mut session = Session::new(policy.clone(), Box::new(kv));
    if let Some(domain) = domain {
        session = session.with_domain(domain);
    }
    if let Some(path) = model {
        let model = LearnedModel::from_file(path)
            .map_err(|e| umbra_common::Error::Config(e.to_string()))?;
        session = session.with_classifier(ClassifierStrategy::Learned(model));
    }
    if let Some(generator) = HttpGenerator::from_policy(&policy.synthesis) {
        session = session.with_generator(Arc::new(generator));
    }
    Ok(session)
}

async fn run_scan(cli: &Cli, resolved: &ResolvedConfig, args: &ScanArgs) -> ExitCode {
    let policy = &resolved.policy;
    let mut tree = match load_tree(&args.document) {
        Ok(tree) => tree,
        Err(err) => return fail(err),
    };
    let scope = if args.nodes.is_empty() {
        ScanScope::Full
    } else {
        ScanScope::Nodes(args.nodes.iter().copied().map(NodeId).collect())
    };

    if args.dry_run {
        return dry_run(cli, policy, &tree, args.model.as_deref());
    }

    let mut session = match build_session(cli, policy, args.domain.as_deref(), args.model.as_deref()) {
        Ok(session) => session,
        Err(err) => return fail(err),
    };
    if let Err(err) = session.init(&mut tree) {
        return fail(err);
    }
    let report = session.run_cycle(&mut tree, &scope).await;
    emit(cli.format, &report, || render_cycle(&report));
    ExitCode::from_report(&report)
}

fn dry_run(cli: &Cli, policy: &Policy, tree: &MemoryTree, model: Option<&Path>) -> ExitCode {
    let strategy = match model.map(LearnedModel::from_file).transpose() {
        Ok(Some(model)) => ClassifierStrategy::Learned(model),
        Ok(None) => ClassifierStrategy::Heuristic,
        Err(err) => return fail(umbra_common::Error::Config(err.to_string())),
    };
    let classifier = build_classifier(strategy, policy.classifier.clone());
    let options = ScanOptions {
        force_revalidate: true,
        max_nodes: policy.monitor.max_nodes_per_scan,
    };
    let out = TreeScanner::new().scan(tree, tree.root(), options);
    let issues = detect_issues(classifier.as_ref(), out.snapshots);
    let rendered: Vec<serde_json::Value> = issues
        .iter()
        .map(|i| {
            serde_json::json!({
                "node": i.node,
                "identity_path": i.snapshot.identity_path,
                "signature": i.signature().key(),
                "fingerprint": i.fingerprint(),
                "tags": i.tags,
            })
        })
        .collect();
    let output = serde_json::json!({
        "scan": out.report,
        "classifier": classifier.name(),
        "issues": rendered,
    });
    emit(cli.format, &output, || {
        issues
            .iter()
            .map(|i| i.describe())
            .collect::<Vec<_>>()
            .join("\n")
    });
    if issues.is_empty() {
        ExitCode::Clean
    } else {
        ExitCode::IssuesFound
    }
}

fn render_cycle(report: &CycleReport) -> String {
    let mut lines = vec![format!(
        "{:?}: {} issue(s), {} patched, {} open",
        report.status,
        report.issues.len(),
        report.patches.len(),
        report.no_patch.len() + report.apply_errors.len()
    )];
    for p in &report.patches {
        lines.push(format!("  {} [{} {:.2}] {}", p.patch_id, p.source_kind, p.confidence, p.css));
    }
    for f in report.no_patch.iter().chain(&report.apply_errors) {
        lines.push(format!("  {}: {}", f.node, f.reason));
    }
    lines.join("\n")
}

fn run_feedback(cli: &Cli, resolved: &ResolvedConfig, args: &FeedbackArgs) -> ExitCode {
    let mut session = match build_session(cli, &resolved.policy, None, None) {
        Ok(session) => session,
        Err(err) => return fail(err),
    };
    let signature = match args.signature.as_deref().map(IssueSignature::parse_key).transpose() {
        Ok(sig) => sig,
        Err(reason) => return fail(umbra_common::Error::Config(reason)),
    };
    let patch_id = PatchId(args.patch.clone());
    let outcome = match session.record_feedback(&patch_id, args.rating, signature.as_ref()) {
        Ok(outcome) => outcome,
        Err(err) => return fail(err),
    };
    emit(cli.format, &outcome, || {
        format!(
            "{} → confidence {:.2} over {} observation(s) ({})",
            outcome.signature_key,
            outcome.confidence,
            outcome.observations,
            outcome.lifecycle.as_str()
        )
    });
    if outcome.persisted {
        ExitCode::Clean
    } else {
        ExitCode::PersistenceError
    }
}

async fn run_ask(cli: &Cli, resolved: &ResolvedConfig, args: &AskArgs) -> ExitCode {
    let mut tree = match load_tree(&args.document) {
        Ok(tree) => tree,
        Err(err) => return fail(err),
    };
    let mut session = match build_session(cli, &resolved.policy, args.domain.as_deref(), None) {
        Ok(session) => session,
        Err(err) => return fail(err),
    };
    if let Err(err) = session.init(&mut tree) {
        return fail(err);
    }
    match session.ask(&mut tree, NodeId(args.node), &args.message).await {
        Ok(record) => {
            emit(cli.format, &record, || format!("{} {}", record.patch_id, record.css));
            ExitCode::Patched
        }
        Err(err) => fail(err),
    }
}

fn run_export(cli: &Cli, resolved: &ResolvedConfig, output: Option<&Path>) -> ExitCode {
    let store = match open_store(cli, &resolved.policy) {
        Ok(store) => store,
        Err(err) => return fail(err),
    };
    let snapshot = ConfigSnapshot::capture(&resolved.policy, resolved.source.clone());
    let json = match store.export(Some(snapshot)).to_json() {
        Ok(json) => json,
        Err(err) => return fail(err.into()),
    };
    match output {
        Some(path) => match std::fs::write(path, &json) {
            Ok(()) => {
                emit(cli.format, &serde_json::json!({ "written": path }), || {
                    format!("wrote {}", path.display())
                });
                ExitCode::Clean
            }
            Err(err) => fail(err.into()),
        },
        None => {
            println!("{}", json);
            ExitCode::Clean
        }
    }
}

fn run_import(cli: &Cli, resolved: &ResolvedConfig, path: &Path, mode: ImportMode) -> ExitCode {
    let json = match std::fs::read_to_string(path) {
        Ok(json) => json,
        Err(err) => return fail(err.into()),
    };
    let doc = match StoreDocument::from_json(&json) {
        Ok(doc) => doc,
        Err(err) => return fail(err.into()),
    };
    let mut store = match open_store(cli, &resolved.policy) {
        Ok(store) => store,
        Err(err) => return fail(err),
    };
    match store.import(doc, mode) {
        Ok(report) => {
            emit(cli.format, &report, || {
                format!(
                    "imported {} entr(ies), skipped {}, {} record(s)",
                    report.entries_added, report.entries_skipped, report.records
                )
            });
            if report.persisted {
                ExitCode::Clean
            } else {
                ExitCode::PersistenceError
            }
        }
        Err(err) => fail(err.into()),
    }
}

fn run_stats(cli: &Cli, resolved: &ResolvedConfig) -> ExitCode {
    let store = match open_store(cli, &resolved.policy) {
        Ok(store) => store,
        Err(err) => return fail(err),
    };
    let stats = store.stats();
    emit(cli.format, &stats, || {
        let lifecycle: Vec<String> = stats
            .by_lifecycle
            .iter()
            .map(|(k, v)| format!("{}={}", k.as_str(), v))
            .collect();
        format!(
            "{} feedback entries, {} records ({}), {} domain record(s)",
            stats.ledger_entries,
            stats.global_records,
            lifecycle.join(" "),
            stats.domain_records
        )
    });
    ExitCode::Clean
}

fn run_config(cli: &Cli, resolved: &ResolvedConfig, command: &ConfigCommand) -> ExitCode {
    match command {
        ConfigCommand::Show => {
            let snapshot = ConfigSnapshot::capture(&resolved.policy, resolved.source.clone());
            emit(cli.format, &snapshot, || {
                format!("source: {}\nhash: {}", snapshot.source, snapshot.policy_hash)
            });
            ExitCode::Clean
        }
        ConfigCommand::Validate { path } => {
            let policy = match path {
                Some(path) => match Policy::from_file(path) {
                    Ok(policy) => policy,
                    Err(err) => return fail(err.into()),
                },
                None => resolved.policy.clone(),
            };
            let result = validate_policy(&policy);
            let output = serde_json::json!({
                "valid": result.is_valid(),
                "errors": result.errors.iter().map(|e| e.to_string()).collect::<Vec<_>>(),
                "warnings": result.warnings,
            });
            emit(cli.format, &output, || {
                if result.is_valid() {
                    "policy is valid".to_string()
                } else {
                    result
                        .errors
                        .iter()
                        .map(|e| e.to_string())
                        .collect::<Vec<_>>()
                        .join("\n")
                }
            });
            if result.is_valid() {
                ExitCode::Clean
            } else {
                ExitCode::ConfigError
            }
        }
        ConfigCommand::Schema => {
            match serde_json::to_string_pretty(&policy_schema()) {
                Ok(json) => println!("{}", json),
                Err(err) => return fail(err.into()),
            }
            ExitCode::Clean
        }
        ConfigCommand::Presets { name: Some(name) } => {
            let policy = get_preset(*name);
            emit(cli.format, &policy, || format!("{}: {:?}", name, policy.description));
            ExitCode::Clean
        }
        ConfigCommand::Presets { name: None } => {
            let presets = list_presets();
            emit(cli.format, &presets, || {
                presets
                    .iter()
                    .map(|p| format!("{}  {}", p.name, p.description))
                    .collect::<Vec<_>>()
                    .join("\n")
            });
            ExitCode::Clean
        }
    }
}
