//! Top-level CLI definition and dispatch.

use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::thread::JoinHandle;
use std::time::Instant;

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{Shell as CompletionShell, generate};
use colored::{Colorize, control};
use serde_json::{Value, json};
use thiserror::Error;

use downloads_janitor::core::config::Config;
use downloads_janitor::core::errors::JanitorError;
use downloads_janitor::logger::activity::{
    ActivityEvent, ActivityLoggerConfig, ActivityLoggerHandle, spawn_logger,
};
use downloads_janitor::logger::jsonl::JsonlConfig;
use downloads_janitor::retention::glob::split_patterns;
use downloads_janitor::retention::pruner::{
    DEFAULT_MAX_FILES, PruneConfig, PruneReport, RetentionPruner,
};
use downloads_janitor::scanner::versions::{ScanReport, VersionScanner};

/// Downloads Janitor: housekeeping for a software-download server.
#[derive(Debug, Parser)]
#[command(
    name = "dlj",
    author,
    version,
    about = "Downloads Janitor - latest versions per channel and retention pruning",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Force JSON output mode.
    #[arg(long, global = true)]
    json: bool,
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
    /// Increase verbosity.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,
    /// Quiet mode (no warnings or summaries).
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Report the latest artifact per project in each release channel.
    Versions(VersionsArgs),
    /// Keep the N newest files per pattern in a directory; delete the rest.
    Prune(PruneArgs),
    /// View or validate configuration.
    Config(ConfigArgs),
    /// Generate shell completion scripts.
    Completions(CompletionsArgs),
}

#[derive(Debug, Clone, Args, Default)]
struct VersionsArgs {
    /// Downloads root to scan (defaults to `versions.downloads_dir`).
    #[arg(value_name = "ROOT")]
    root: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
struct PruneArgs {
    /// Directory whose direct files are pruned.
    #[arg(value_name = "PATH")]
    path: PathBuf,
    /// Comma-separated filename globs, e.g. `nightly-*.tar.gz,nightly-*.egg`.
    #[arg(value_name = "PATTERNS")]
    patterns: String,
    /// Files to keep per pattern (defaults to 5).
    #[arg(value_name = "MAX_FILES")]
    max_files: Option<usize>,
    /// Stop at the first failed deletion and exit non-zero.
    #[arg(long)]
    strict: bool,
}

#[derive(Debug, Clone, Args, Default)]
struct ConfigArgs {
    /// Config operation to run.
    #[command(subcommand)]
    command: Option<ConfigCommand>,
}

#[derive(Debug, Clone, Subcommand)]
enum ConfigCommand {
    /// Print resolved config file path.
    Path,
    /// Print effective merged configuration.
    Show,
    /// Validate configuration and exit.
    Validate,
}

#[derive(Debug, Clone, Args)]
struct CompletionsArgs {
    /// Shell to generate completion script for.
    #[arg(value_enum)]
    shell: CompletionShell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

/// CLI error type with explicit exit-code mapping.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid user input at runtime.
    #[error("{0}")]
    User(String),
    /// Operation partially succeeded.
    #[error("{0}")]
    Partial(String),
    /// Library failure; exit code follows its category.
    #[error(transparent)]
    Janitor(#[from] JanitorError),
    /// JSON serialization failed.
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    /// Output write failed.
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::User(_) => 1,
            Self::Janitor(e) if e.is_user_error() => 1,
            Self::Janitor(JanitorError::Serialization { .. }) | Self::Json(_) => 3,
            Self::Janitor(_) | Self::Io(_) => 2,
            Self::Partial(_) => 4,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::Janitor(e) => e.code(),
            Self::User(_) => "DLJ-1101",
            Self::Json(_) => "DLJ-2101",
            Self::Partial(_) | Self::Io(_) => "DLJ-3900",
        }
    }
}

/// Dispatch CLI commands.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    if cli.no_color {
        control::set_override(false);
    }

    match &cli.command {
        Command::Versions(args) => {
            let config = Config::load(cli.config.as_deref())?;
            run_logged(&config, "versions", |logger| {
                run_versions(cli, args, &config, logger)
            })
        }
        Command::Prune(args) => {
            let config = load_prune_config(cli)?;
            run_logged(&config, "prune", |logger| run_prune(cli, args, logger))
        }
        Command::Config(args) => run_config(cli, args),
        Command::Completions(args) => {
            let mut command = Cli::command();
            let binary_name = command.get_name().to_string();
            generate(args.shell, &mut command, binary_name, &mut io::stdout());
            Ok(())
        }
    }
}

// ──────────────────── activity session ────────────────────

/// Logger thread for the lifetime of one command.
struct ActivitySession {
    handle: Option<ActivityLoggerHandle>,
    join: Option<JoinHandle<()>>,
    command: &'static str,
    started: Instant,
}

impl ActivitySession {
    fn start(config: &Config, command: &'static str) -> Self {
        let logger_config = ActivityLoggerConfig::new(JsonlConfig::at(&config.paths.activity_log));
        let (handle, join) = match spawn_logger(logger_config) {
            Ok((handle, join)) => (Some(handle), Some(join)),
            Err(e) => {
                eprintln!("dlj: activity log disabled: {e}");
                (None, None)
            }
        };

        let session = Self {
            handle,
            join,
            command,
            started: Instant::now(),
        };
        session.send(ActivityEvent::RunStarted {
            command: command.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            config_hash: config.stable_hash().unwrap_or_default(),
        });
        session
    }

    fn handle(&self) -> Option<ActivityLoggerHandle> {
        self.handle.clone()
    }

    fn send(&self, event: ActivityEvent) {
        if let Some(handle) = &self.handle {
            handle.send(event);
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn finish(mut self, ok: bool) {
        self.send(ActivityEvent::RunFinished {
            command: self.command.to_string(),
            ok,
            duration_ms: self.started.elapsed().as_millis() as u64,
        });
        if let Some(handle) = self.handle.take() {
            handle.shutdown();
        }
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

fn run_logged<F>(config: &Config, command: &'static str, body: F) -> Result<(), CliError>
where
    F: FnOnce(Option<ActivityLoggerHandle>) -> Result<(), CliError>,
{
    let session = ActivitySession::start(config, command);

    let result = body(session.handle());
    if let Err(err) = &result {
        session.send(ActivityEvent::Error {
            code: err.code().to_string(),
            message: err.to_string(),
        });
    }
    session.finish(result.is_ok());
    result
}

// ──────────────────── versions ────────────────────

fn run_versions(
    cli: &Cli,
    args: &VersionsArgs,
    config: &Config,
    logger: Option<ActivityLoggerHandle>,
) -> Result<(), CliError> {
    let mut scanner = VersionScanner::new(config.versions.clone(), logger);
    if let Some(root) = &args.root {
        scanner = scanner.with_root(root);
    }
    let report = scanner.scan()?;

    if !cli.quiet {
        for skip in &report.skipped {
            eprintln!(
                "{} skipped {}: {}",
                "warning:".yellow().bold(),
                skip.path.display(),
                skip.reason
            );
        }
        for dir in &report.depth_limited {
            eprintln!(
                "{} not scanned (versions.max_depth = {}): {}",
                "warning:".yellow().bold(),
                config.versions.max_depth,
                dir.display()
            );
        }
    }

    match output_mode(cli) {
        OutputMode::Human => print_channel_report(cli, &report),
        OutputMode::Json => {
            let mut payload = serde_json::to_value(&report)?;
            payload["command"] = json!("versions");
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

fn print_channel_report(cli: &Cli, report: &ScanReport) {
    for (channel, projects) in report.channels.iter() {
        println!("{}", channel.bold());
        if projects.is_empty() {
            println!("  {}", "(no artifacts)".dimmed());
            continue;
        }
        let width = projects.keys().map(String::len).max().unwrap_or(0);
        for (project, entry) in projects {
            println!(
                "  {project:<width$}  {:<12}  {}",
                entry.version.green(),
                entry.filename
            );
        }
    }

    if cli.verbose {
        println!();
        println!(
            "Scanned {} directories, {} files ({} artifacts) under {} in {}",
            report.directories_walked,
            report.files_inspected,
            report.artifacts_considered,
            report.root.display(),
            format_duration(report.duration),
        );
    }
    if !cli.quiet && !report.skipped.is_empty() {
        println!("Skipped {} malformed artifact name(s).", report.skipped.len());
    }
}

// ──────────────────── prune ────────────────────

/// Prune only takes the activity-log location from config, so a broken default
/// config file is not fatal. An explicit `--config` still has to load.
fn load_prune_config(cli: &Cli) -> Result<Config, CliError> {
    match Config::load(cli.config.as_deref()) {
        Ok(config) => Ok(config),
        Err(err) if cli.config.is_none() => {
            if !cli.quiet {
                eprintln!("{} using default config: {err}", "warning:".yellow().bold());
            }
            Ok(Config::default())
        }
        Err(err) => Err(err.into()),
    }
}

fn run_prune(
    cli: &Cli,
    args: &PruneArgs,
    logger: Option<ActivityLoggerHandle>,
) -> Result<(), CliError> {
    let patterns = split_patterns(&args.patterns)?;
    let prune_config = PruneConfig {
        max_files: args.max_files.unwrap_or(DEFAULT_MAX_FILES),
        stop_on_error: args.strict,
    };

    let pruner = RetentionPruner::new(&args.path, &patterns, prune_config, logger)?;
    let report = pruner.prune()?;

    match output_mode(cli) {
        OutputMode::Human => print_prune_summary(cli, &report),
        OutputMode::Json => {
            let mut payload = serde_json::to_value(&report)?;
            payload["command"] = json!("prune");
            write_json_line(&payload)?;
        }
    }

    if prune_config.stop_on_error && !report.is_clean() {
        return Err(CliError::Partial(format!(
            "stopped after {} failed deletion(s) in {}",
            report.files_failed,
            report.dir.display()
        )));
    }
    Ok(())
}

fn print_prune_summary(cli: &Cli, report: &PruneReport) {
    if !cli.quiet {
        println!(
            "Pruned {} (keeping {} per pattern):",
            report.dir.display(),
            report.max_files
        );
        let width = report
            .patterns
            .iter()
            .map(|p| p.pattern.len())
            .max()
            .unwrap_or(0);
        for outcome in &report.patterns {
            let deleted = format!("deleted {}", outcome.deleted);
            println!(
                "  {:<width$}  matched {:>3}  kept {:>3}  {}",
                outcome.pattern,
                outcome.matched,
                outcome.kept,
                if outcome.deleted > 0 {
                    deleted.red().to_string()
                } else {
                    deleted
                },
            );
        }
        println!(
            "  Deleted: {} files, {} freed in {}",
            report.files_deleted,
            format_bytes(report.bytes_freed),
            format_duration(report.duration),
        );
    }

    if report.files_failed > 0 {
        println!("  Failed: {} files", report.files_failed);
        for failure in &report.failures {
            eprintln!("    {}: {}", failure.path.display(), failure.error);
        }
    }
    if report.stopped_early {
        println!("  Stopped at the first failure (strict mode).");
    }
}

// ──────────────────── config ────────────────────

fn run_config(cli: &Cli, args: &ConfigArgs) -> Result<(), CliError> {
    match &args.command {
        None | Some(ConfigCommand::Path) => {
            let path = cli.config.clone().unwrap_or_else(Config::default_path);
            let exists = path.exists();

            match output_mode(cli) {
                OutputMode::Human => {
                    println!("{}", path.display());
                    if !exists {
                        println!("  (file does not exist; defaults will be used)");
                    }
                }
                OutputMode::Json => {
                    let payload = json!({
                        "command": "config path",
                        "path": path.to_string_lossy(),
                        "exists": exists,
                    });
                    write_json_line(&payload)?;
                }
            }
            Ok(())
        }
        Some(ConfigCommand::Show) => {
            let config = Config::load(cli.config.as_deref())?;

            match output_mode(cli) {
                OutputMode::Human => {
                    let toml_str = toml::to_string_pretty(&config).map_err(|e| {
                        JanitorError::Serialization {
                            context: "toml",
                            details: e.to_string(),
                        }
                    })?;
                    println!("{toml_str}");
                }
                OutputMode::Json => {
                    let payload = json!({
                        "command": "config show",
                        "config": serde_json::to_value(&config)?,
                    });
                    write_json_line(&payload)?;
                }
            }
            Ok(())
        }
        Some(ConfigCommand::Validate) => match Config::load(cli.config.as_deref()) {
            Ok(config) => {
                let hash = config.stable_hash()?;

                match output_mode(cli) {
                    OutputMode::Human => {
                        println!("Configuration is valid.");
                        println!("  Source: {}", config.paths.config_file.display());
                        println!("  Hash: {hash}");
                    }
                    OutputMode::Json => {
                        let payload = json!({
                            "command": "config validate",
                            "valid": true,
                            "path": config.paths.config_file.to_string_lossy(),
                            "hash": hash,
                        });
                        write_json_line(&payload)?;
                    }
                }
                Ok(())
            }
            Err(e) => {
                match output_mode(cli) {
                    OutputMode::Human => {
                        eprintln!("Configuration is INVALID: {e}");
                    }
                    OutputMode::Json => {
                        let payload = json!({
                            "command": "config validate",
                            "valid": false,
                            "error": e.to_string(),
                            "error_code": e.code(),
                        });
                        write_json_line(&payload)?;
                    }
                }
                Err(CliError::User(format!("invalid config: {e}")))
            }
        },
    }
}

// ──────────────────── output helpers ────────────────────

#[allow(clippy::cast_precision_loss)]
fn format_bytes(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * KIB;
    const GIB: u64 = 1024 * MIB;

    if bytes >= GIB {
        format!("{:.1} GB", bytes as f64 / GIB as f64)
    } else if bytes >= MIB {
        format!("{:.1} MB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.1} KB", bytes as f64 / KIB as f64)
    } else {
        format!("{bytes} B")
    }
}

fn format_duration(duration: std::time::Duration) -> String {
    let millis = duration.as_millis();
    if millis < 1000 {
        format!("{millis}ms")
    } else {
        format!("{:.1}s", duration.as_secs_f64())
    }
}

fn write_json_line(payload: &Value) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, payload)?;
    writeln!(stdout)?;
    Ok(())
}

fn output_mode(cli: &Cli) -> OutputMode {
    let env_mode = std::env::var("DLJ_OUTPUT_FORMAT").ok();
    resolve_output_mode(cli.json, env_mode.as_deref(), io::stdout().is_terminal())
}

fn resolve_output_mode(json_flag: bool, env_mode: Option<&str>, stdout_is_tty: bool) -> OutputMode {
    if json_flag {
        return OutputMode::Json;
    }

    let fallback = if stdout_is_tty {
        OutputMode::Human
    } else {
        OutputMode::Json
    };

    match env_mode
        .map(str::trim)
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("json") => OutputMode::Json,
        Some("human") => OutputMode::Human,
        _ => fallback,
    }
}
