use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use serde::Serialize;

use chartship::batch::{self, ChartStatus};
use chartship::detect::ChangeDetector;
use chartship::package::ChartPackager;
use chartship::publish::{ChartPublisher, PublishOutcome};
use chartship::resolver::RevisionResolver;
use chartship::scanner::ChartScanner;
use chartship::tooling::HelmCli;
use chartship::validate::ChartValidator;
use chartship::Reporter;
use chartship_config::{
    CliOverrides, EnvOverrides, PipelineSignals, Settings, discover_config, load_config_from_file,
};
use chartship_git::SystemGit;
use chartship_registry::{HelmRegistry, RegistrySource};
use chartship_types::{ChangeSet, ChartError, ExitCode, PublishDecision, RevisionRange};

#[derive(Parser, Debug)]
#[command(name = "chartship", version)]
#[command(about = "Change detection and idempotent OCI publishing for Helm charts")]
struct Cli {
    /// Directory containing charts (default: charts)
    #[arg(long, global = true)]
    charts_dir: Option<PathBuf>,

    /// Path to a config file (default: .chartship.toml, searched upwards)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print debug output.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the charts changed in the current pipeline.
    Detect {
        #[command(flatten)]
        output: OutputArgs,

        /// Diff this range (A..B or A...B) instead of resolving one from CI variables.
        #[arg(long)]
        range: Option<String>,

        /// Branch feature branches are compared against (default: main)
        #[arg(long)]
        base_branch: Option<String>,
    },
    /// Print every valid chart.
    List {
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Lint and render charts.
    Validate {
        #[command(flatten)]
        batch: BatchArgs,
    },
    /// Package charts into the packages directory.
    Package {
        #[command(flatten)]
        batch: BatchArgs,

        /// Output directory for packages (default: .packages)
        #[arg(long)]
        packages_dir: Option<PathBuf>,
    },
    /// Push packaged charts, skipping versions already in the registry.
    Publish {
        #[command(flatten)]
        batch: BatchArgs,

        /// Directory holding packaged charts (default: .packages)
        #[arg(long)]
        packages_dir: Option<PathBuf>,

        /// Full registry path, overriding host/owner/project.
        #[arg(long)]
        registry_image: Option<String>,
    },
    /// Print resolved settings and tool diagnostics.
    Doctor {
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Generate shell completions.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args, Debug)]
struct OutputArgs {
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Write to this file instead of stdout.
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct BatchArgs {
    /// Chart to process.
    chart: Option<String>,

    /// File with one chart name per line.
    #[arg(long, conflicts_with = "chart")]
    input_file: Option<PathBuf>,

    /// Write a JSON run report to this file.
    #[arg(long)]
    report: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

struct CliReporter {
    verbose: bool,
}

impl Reporter for CliReporter {
    fn info(&mut self, msg: &str) {
        eprintln!("[info] {msg}");
    }

    fn warn(&mut self, msg: &str) {
        eprintln!("[warn] {msg}");
    }

    fn error(&mut self, msg: &str) {
        eprintln!("[error] {msg}");
    }

    fn debug(&mut self, msg: &str) {
        if self.verbose {
            eprintln!("[debug] {msg}");
        }
    }
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    let mut reporter = CliReporter {
        verbose: cli.verbose,
    };

    match run(cli, &mut reporter) {
        Ok(code) => code.into(),
        Err(e) => {
            reporter.error(&format!("{e:#}"));
            ExitCode::Failure.into()
        }
    }
}

fn run(cli: Cli, reporter: &mut dyn Reporter) -> Result<ExitCode> {
    let mut overrides = CliOverrides {
        charts_dir: cli.charts_dir.clone(),
        ..CliOverrides::default()
    };
    match &cli.cmd {
        Commands::Detect { base_branch, .. } => overrides.base_branch = base_branch.clone(),
        Commands::Package { packages_dir, .. } => overrides.packages_dir = packages_dir.clone(),
        Commands::Publish {
            packages_dir,
            registry_image,
            ..
        } => {
            overrides.packages_dir = packages_dir.clone();
            overrides.registry_image = registry_image.clone();
        }
        _ => {}
    }

    let (settings, config_file) = load_settings(cli.config.as_deref(), &overrides)?;
    if let Some(path) = &config_file {
        reporter.debug(&format!("using config file: {}", path.display()));
    }
    let scanner = ChartScanner::new(&settings.charts_dir);

    match cli.cmd {
        Commands::Detect { output, range, .. } => {
            run_detect(&settings, &scanner, &output, range.as_deref(), reporter)
        }
        Commands::List { output } => {
            if !scanner.root_exists() {
                reporter.warn(&format!(
                    "charts directory not found: {}",
                    settings.charts_dir.display()
                ));
            }
            let charts: ChangeSet = scanner.list_valid().into_iter().collect();
            write_charts(&charts, &output, reporter)?;
            Ok(ExitCode::Success)
        }
        Commands::Validate { batch } => {
            let helm = HelmCli::with_program(&settings.helm_program);
            let validator = ChartValidator::new(&scanner, &helm);
            run_stage("validate", &batch, reporter, |name, r| {
                validator.validate(name, r).map(|()| ChartStatus::Done)
            })
        }
        Commands::Package { batch, .. } => {
            let helm = HelmCli::with_program(&settings.helm_program);
            let packager = ChartPackager::new(&scanner, &helm, &settings.packages_dir);
            run_stage("package", &batch, reporter, |name, r| {
                packager.package(name, r).map(|_| ChartStatus::Done)
            })
        }
        Commands::Publish { batch, .. } => {
            let (registry_path, source) = settings.registry_path();
            match source {
                RegistrySource::Image => {
                    reporter.info(&format!("using registry image: {registry_path}"))
                }
                RegistrySource::Composed => {
                    reporter.info(&format!("using configured registry: {registry_path}"))
                }
            }

            let helm = HelmRegistry::with_program(&settings.helm_program);
            let publisher =
                ChartPublisher::new(&scanner, &helm, &settings.packages_dir, registry_path);
            run_stage("publish", &batch, reporter, |name, r| {
                publish_status(publisher.publish(name, r))
            })
        }
        Commands::Doctor { format } => {
            run_doctor(&settings, config_file.as_deref(), format)?;
            Ok(ExitCode::Success)
        }
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "chartship", &mut io::stdout());
            Ok(ExitCode::Success)
        }
    }
}

fn load_settings(
    config: Option<&Path>,
    overrides: &CliOverrides,
) -> Result<(Settings, Option<PathBuf>)> {
    let (config, path) = match config {
        Some(path) => (load_config_from_file(path)?, Some(path.to_path_buf())),
        None => {
            let cwd = std::env::current_dir().context("failed to read current directory")?;
            discover_config(&cwd)?
        }
    };

    let settings = Settings::resolve(&config, &EnvOverrides::from_env(), overrides);
    Ok((settings, path))
}

fn run_detect(
    settings: &Settings,
    scanner: &ChartScanner,
    output: &OutputArgs,
    range: Option<&str>,
    reporter: &mut dyn Reporter,
) -> Result<ExitCode> {
    let git = SystemGit::with_program(&settings.git_program, Path::new("."));
    let detector = ChangeDetector::new(scanner, &git);

    let changed = match range {
        Some(range) => {
            let range: RevisionRange = range.parse()?;
            reporter.info(&format!("using explicit range: {range}"));
            detector.detect_range(&range, reporter)
        }
        None => {
            let signals = PipelineSignals::from_env(settings);
            let resolver = RevisionResolver::new(&signals, &git);
            detector.detect(&resolver, reporter)
        }
    };

    let charts: ChangeSet = changed.into_iter().collect();
    write_charts(&charts, output, reporter)?;

    reporter.info("changed charts detected:");
    if charts.is_empty() {
        reporter.info("  (none)");
    }
    for chart in charts.iter() {
        reporter.info(&format!("  - {chart}"));
    }

    Ok(ExitCode::Success)
}

fn render_charts(charts: &ChangeSet, format: OutputFormat) -> Result<String> {
    Ok(match format {
        OutputFormat::Json => {
            let mut json =
                serde_json::to_string_pretty(charts).context("failed to serialize charts")?;
            json.push('\n');
            json
        }
        OutputFormat::Text => charts.iter().map(|c| format!("{c}\n")).collect(),
    })
}

fn write_charts(charts: &ChangeSet, output: &OutputArgs, reporter: &mut dyn Reporter) -> Result<()> {
    let rendered = render_charts(charts, output.format)?;

    match &output.output {
        Some(path) => {
            fs::write(path, rendered)
                .with_context(|| format!("failed to write output file: {}", path.display()))?;
            reporter.info(&format!("wrote output to: {}", path.display()));
        }
        None => print!("{rendered}"),
    }
    Ok(())
}

fn run_stage<F>(stage: &str, args: &BatchArgs, reporter: &mut dyn Reporter, step: F) -> Result<ExitCode>
where
    F: FnMut(&str, &mut dyn Reporter) -> Result<ChartStatus, ChartError>,
{
    let names = batch::read_names(args.chart.as_deref(), args.input_file.as_deref())?;
    if names.is_empty() {
        reporter.info(&format!("no charts to {stage}; nothing to do"));
        return Ok(ExitCode::Success);
    }

    let report = batch::run_batch(stage, &names, reporter, step);

    if let Some(path) = &args.report {
        fs::write(path, report.to_json()?)
            .with_context(|| format!("failed to write report file: {}", path.display()))?;
        reporter.info(&format!("wrote report to: {}", path.display()));
    }

    Ok(report.exit_code())
}

fn publish_status(outcome: PublishOutcome) -> Result<ChartStatus, ChartError> {
    match (outcome.decision, outcome.error) {
        (PublishDecision::Push, _) => Ok(ChartStatus::Done),
        (PublishDecision::SkipExisting, _) => Ok(ChartStatus::Skipped),
        (PublishDecision::Fail, Some(e)) => Err(e),
        (PublishDecision::Fail, None) => Err(ChartError::tool(
            "publish",
            format!("{} failed without an error", outcome.name),
        )),
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    config_file: Option<PathBuf>,
    settings: Settings,
    registry: String,
    registry_source: RegistrySource,
    branch: Option<String>,
    commit: Option<String>,
    charts: Vec<String>,
    tools: Vec<ToolStatus>,
}

#[derive(Debug, Serialize)]
struct ToolStatus {
    name: String,
    program: String,
    path: Option<PathBuf>,
    version: Option<String>,
}

fn tool_status(name: &str, program: &str, version_arg: &str) -> ToolStatus {
    ToolStatus {
        name: name.to_string(),
        program: program.to_string(),
        path: chartship_process::which(program),
        version: chartship_process::tool_version(program, version_arg),
    }
}

fn run_doctor(settings: &Settings, config_file: Option<&Path>, format: OutputFormat) -> Result<()> {
    let git = SystemGit::with_program(&settings.git_program, Path::new("."));
    let context = git.context();
    let (registry, registry_source) = settings.registry_path();

    let report = DoctorReport {
        config_file: config_file.map(Path::to_path_buf),
        settings: settings.clone(),
        registry: registry.to_string(),
        registry_source,
        branch: context.branch.clone(),
        commit: context.short_commit().map(str::to_string),
        charts: ChartScanner::new(&settings.charts_dir).list_valid(),
        tools: vec![
            tool_status("git", &settings.git_program, "--version"),
            tool_status("helm", &settings.helm_program, "version"),
        ],
    };

    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("failed to serialize doctor report")?
            );
        }
        OutputFormat::Text => print_doctor(&report),
    }
    Ok(())
}

fn print_doctor(report: &DoctorReport) {
    let none = "<none>";
    println!(
        "config_file: {}",
        report
            .config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| none.to_string())
    );
    println!("charts_dir: {}", report.settings.charts_dir.display());
    println!("packages_dir: {}", report.settings.packages_dir.display());
    println!("base_branch: {}", report.settings.base_branch);
    println!("trunk_branches: {}", report.settings.trunk_branches.join(", "));
    println!("registry: {} ({:?})", report.registry, report.registry_source);
    println!("branch: {}", report.branch.as_deref().unwrap_or(none));
    println!("commit: {}", report.commit.as_deref().unwrap_or(none));
    println!("charts: {}", report.charts.len());
    println!();

    for tool in &report.tools {
        match (&tool.path, &tool.version) {
            (Some(_), Some(version)) => println!("{}: {version}", tool.name),
            (Some(path), None) => println!("{}: {} (version unknown)", tool.name, path.display()),
            (None, _) => println!("{}: not found ({})", tool.name, tool.program),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn text_output_has_one_name_per_line() {
        let charts: ChangeSet = ["web".to_string(), "api".to_string()].into_iter().collect();
        assert_eq!(render_charts(&charts, OutputFormat::Text).expect("render"), "api\nweb\n");
        assert_eq!(
            render_charts(&ChangeSet::new(), OutputFormat::Text).expect("render"),
            ""
        );
    }

    #[test]
    fn json_output_wraps_names() {
        let charts: ChangeSet = ["web".to_string()].into_iter().collect();
        let json = render_charts(&charts, OutputFormat::Json).expect("render");
        let value: serde_json::Value = serde_json::from_str(&json).expect("parse");
        assert_eq!(value["charts"][0], "web");
    }

    #[test]
    fn publish_status_maps_decisions() {
        let outcome = |decision, error| PublishOutcome {
            name: "web".to_string(),
            version: Some("1.0.0".to_string()),
            reference: None,
            decision,
            error,
        };

        assert_eq!(
            publish_status(outcome(PublishDecision::Push, None)),
            Ok(ChartStatus::Done)
        );
        assert_eq!(
            publish_status(outcome(PublishDecision::SkipExisting, None)),
            Ok(ChartStatus::Skipped)
        );
        let err = ChartError::Precondition("missing package".to_string());
        assert_eq!(
            publish_status(outcome(PublishDecision::Fail, Some(err.clone()))),
            Err(err)
        );
    }
}
