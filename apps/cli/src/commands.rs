//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use xmlscrub_core::pipeline::{
    ProgressReporter, RepairConfig, RepairReport, collapse_dir, normalize_dir, repair_dir,
};
use xmlscrub_manifest::{group_by_host, load_prefix_list};
use xmlscrub_shared::{
    AppConfig, FailurePolicy, RepairOptions, Stage, StageReport, init_config, load_config,
};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// xmlscrub: repair Archivist XML exports in place.
#[derive(Parser)]
#[command(
    name = "xmlscrub",
    version,
    about = "Repair escaped entities and embedded line breaks in exported XML files.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Options shared by every command that rewrites files.
#[derive(Args)]
pub(crate) struct StageArgs {
    /// Export directory (defaults to `[export].output_dir`).
    pub dir: Option<PathBuf>,

    /// Record failing files and carry on instead of stopping at the first one.
    #[arg(short, long)]
    pub keep_going: bool,

    /// What to do when a file fails: abort or continue (defaults to
    /// `[repair].failure_policy`).
    #[arg(long, conflicts_with = "keep_going")]
    pub failure_policy: Option<FailurePolicy>,

    /// Files processed concurrently (defaults to `[repair].jobs`).
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Print the report as JSON on stdout.
    #[arg(long)]
    pub json: bool,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Normalize entities, then collapse line breaks, in every file.
    Repair {
        #[command(flatten)]
        stage: StageArgs,

        /// Prefix list to check the directory against first.
        #[arg(short, long)]
        manifest: Option<PathBuf>,

        /// Append a record per failed file to the download log.
        #[arg(short, long)]
        record_failures: bool,

        /// Download log to record failures in (implies --record-failures).
        #[arg(long)]
        log: Option<PathBuf>,
    },

    /// Run only the entity normalizer.
    Normalize {
        #[command(flatten)]
        stage: StageArgs,
    },

    /// Run only the XML whitespace collapser.
    Collapse {
        #[command(flatten)]
        stage: StageArgs,
    },

    /// List export targets from the prefix list, grouped by host.
    Targets {
        /// Prefix list to read (defaults to `[export].prefix_list`).
        #[arg(short, long)]
        prefix_list: Option<PathBuf>,

        /// Print targets as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "xmlscrub=info",
        1 => "xmlscrub=debug",
        _ => "xmlscrub=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Repair {
            stage,
            manifest,
            record_failures,
            log,
        } => cmd_repair(stage, manifest, record_failures, log).await,
        Command::Normalize { stage } => cmd_stage(Stage::Normalize, stage).await,
        Command::Collapse { stage } => cmd_stage(Stage::Collapse, stage).await,
        Command::Targets { prefix_list, json } => cmd_targets(prefix_list, json),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(),
        },
    }
}

/// Resolve the directory and options: CLI flags over config over defaults.
fn resolve(config: &AppConfig, args: &StageArgs) -> Result<(PathBuf, RepairOptions)> {
    let dir = args
        .dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.export.output_dir));
    if !dir.is_dir() {
        return Err(eyre!("'{}' is not a directory", dir.display()));
    }

    let mut options = RepairOptions::from(config);
    if let Some(policy) = args.failure_policy {
        options.failure_policy = policy;
    }
    if args.keep_going {
        options.failure_policy = FailurePolicy::Continue;
    }
    if let Some(jobs) = args.jobs {
        options.jobs = jobs;
    }
    options.validate()?;
    Ok((dir, options))
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_repair(
    args: StageArgs,
    manifest: Option<PathBuf>,
    record_failures: bool,
    log: Option<PathBuf>,
) -> Result<()> {
    let config = load_config()?;
    let (dir, options) = resolve(&config, &args)?;
    let download_log =
        log.or_else(|| record_failures.then(|| config.export.download_log_path()));

    info!(
        dir = %dir.display(),
        jobs = options.jobs,
        policy = ?options.failure_policy,
        "repairing export directory"
    );

    let repair_config = RepairConfig {
        dir,
        options,
        manifest,
        download_log,
    };

    let reporter = CliProgress::new();
    let result = repair_dir(&repair_config, &reporter).await;
    reporter.finish();
    let report = result?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_repair(&report);
    }

    let failed = report.failures().count();
    if failed > 0 {
        return Err(eyre!("{failed} file(s) could not be repaired"));
    }
    Ok(())
}

async fn cmd_stage(stage: Stage, args: StageArgs) -> Result<()> {
    let config = load_config()?;
    let (dir, options) = resolve(&config, &args)?;

    info!(%stage, dir = %dir.display(), jobs = options.jobs, "running single stage");

    let reporter = CliProgress::new();
    let result = match stage {
        Stage::Normalize => normalize_dir(&dir, options, &reporter).await,
        Stage::Collapse => collapse_dir(&dir, options, &reporter).await,
    };
    reporter.finish();
    let report = result?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!();
        print_stage(&report);
        println!();
    }

    if !report.is_clean() {
        return Err(eyre!(
            "{} file(s) failed the {stage} stage",
            report.failures.len()
        ));
    }
    Ok(())
}

fn cmd_targets(prefix_list: Option<PathBuf>, json: bool) -> Result<()> {
    let path = match prefix_list {
        Some(p) => p,
        None => PathBuf::from(load_config()?.export.prefix_list),
    };
    let targets = load_prefix_list(&path)?;
    let groups = group_by_host(&targets);

    if json {
        println!("{}", serde_json::to_string_pretty(&groups)?);
        return Ok(());
    }

    for (host, members) in &groups {
        println!("{host}");
        for target in members {
            println!("  {:<32} {}", target.instrument, target.file_name());
        }
    }
    let unmapped: Vec<_> = targets.iter().filter(|t| t.portal.is_none()).collect();
    if !unmapped.is_empty() {
        println!("(no known Archivist instance)");
        for target in unmapped {
            println!("  {}", target.instrument);
        }
    }
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

fn print_repair(report: &RepairReport) {
    println!();
    println!("  Repaired: {}", report.dir.display());
    for path in &report.missing {
        println!("  Missing:  {}", display_name(path));
    }
    print_stage(&report.normalize);
    print_stage(&report.collapse);
    println!("  Time:     {:.1}s", report.elapsed.as_secs_f64());
    println!();
}

fn print_stage(report: &StageReport) {
    println!(
        "  {:<9} {} rewritten, {} unchanged, {} failed",
        format!("{}:", report.stage),
        report.rewritten,
        report.unchanged,
        report.failures.len()
    );
    for failure in &report.failures {
        println!("    {}: {}", display_name(&failure.path), failure.message);
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .expect("spinner template")
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl ProgressReporter for CliProgress {
    fn stage_started(&self, stage: Stage, files: usize) {
        self.spinner.set_message(format!("{stage}: {files} file(s)"));
    }

    fn file_done(&self, stage: Stage, path: &Path, current: usize, total: usize) {
        self.spinner.set_message(format!(
            "{stage} [{current}/{total}] {}",
            display_name(path)
        ));
    }

    fn stage_finished(&self, report: &StageReport) {
        self.spinner.set_message(format!(
            "{} done: {} rewritten",
            report.stage, report.rewritten
        ));
    }

    fn done(&self, _report: &RepairReport) {
        self.spinner.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage_args(argv: &[&str]) -> StageArgs {
        let cli = Cli::try_parse_from(argv).unwrap();
        match cli.command {
            Command::Normalize { stage } | Command::Collapse { stage } => stage,
            Command::Repair { stage, .. } => stage,
            _ => panic!("not a stage command"),
        }
    }

    #[test]
    fn failure_policy_flag_overrides_config() {
        let dir = std::env::temp_dir();
        let args = stage_args(&[
            "xmlscrub",
            "collapse",
            dir.to_str().unwrap(),
            "--failure-policy",
            "Continue",
        ]);

        let (_, options) = resolve(&AppConfig::default(), &args).unwrap();

        assert_eq!(options.failure_policy, FailurePolicy::Continue);
    }

    #[test]
    fn keep_going_means_continue() {
        let dir = std::env::temp_dir();
        let args = stage_args(&["xmlscrub", "repair", dir.to_str().unwrap(), "-k"]);

        let (_, options) = resolve(&AppConfig::default(), &args).unwrap();

        assert_eq!(options.failure_policy, FailurePolicy::Continue);
    }

    #[test]
    fn unknown_failure_policy_is_rejected() {
        let argv = ["xmlscrub", "normalize", "--failure-policy", "retry"];
        assert!(Cli::try_parse_from(argv).is_err());
    }

    #[test]
    fn failure_policy_conflicts_with_keep_going() {
        let argv = ["xmlscrub", "normalize", "-k", "--failure-policy", "abort"];
        assert!(Cli::try_parse_from(argv).is_err());
    }
}
