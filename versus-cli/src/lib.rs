#![warn(missing_docs)]
//! Versus CLI Library
//!
//! Command line driver for head-to-head benchmark runs. The `versus` binary
//! reads a `versus.toml`, executes the plan through a pool of command runners,
//! and reports which variant wins and how confident that verdict is.
//!
//! # Example
//!
//! ```text
//! versus init --write          # create versus.toml
//! versus plan                  # list the cells that would run
//! versus run --format markdown --save-samples samples.json
//! versus analyze --samples samples.json --format json
//! ```

mod config;
mod pipeline;
mod planner;
mod runner;

pub use config::*;
pub use pipeline::{
    ProgressObserver, analyze_samples, build_pool, build_report_meta, execute_plan,
    format_human_output,
};
pub use planner::{ExecutionPlan, build_plan, render_plan};
pub use runner::CommandRunner;

use clap::{Args, Parser, Subcommand};
use regex::Regex;
use std::io::Write;
use std::path::{Path, PathBuf};
use versus_core::{PipelineConfig, Scale, SchedulingMode};
use versus_report::{
    OutputFormat, PipelineReport, SampleSet, generate_json_report, generate_markdown_report,
    load_samples, save_samples,
};

/// Versus CLI arguments
#[derive(Parser, Debug)]
#[command(name = "versus")]
#[command(author, version, about = "Versus - head-to-head benchmarks with a statistical verdict")]
pub struct Cli {
    /// Optional subcommand (Run, Plan, Analyze, Init); defaults to Run
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Configuration file (default: nearest versus.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Execute the plan and analyze the results (default)
    Run(RunArgs),
    /// Print the cells that would run
    Plan {
        /// Filter tasks by regex pattern
        #[arg(long)]
        filter: Option<String>,
        /// Restrict to these scales (comma separated)
        #[arg(long, value_delimiter = ',')]
        scale: Vec<Scale>,
    },
    /// Re-run the analysis stages on saved samples
    Analyze {
        /// Samples file written by `run --save-samples`
        #[arg(long)]
        samples: PathBuf,
        /// Output format: human, json, markdown
        #[arg(long)]
        format: Option<String>,
        /// Output file (stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print a commented default configuration
    Init {
        /// Write it to ./versus.toml instead of stdout
        #[arg(long)]
        write: bool,
    },
}

/// Options of `versus run`
#[derive(Args, Debug, Default, Clone)]
pub struct RunArgs {
    /// Filter tasks by regex pattern
    #[arg(long)]
    pub filter: Option<String>,

    /// Restrict to these scales (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub scale: Vec<Scale>,

    /// Runner contexts and maximum cells in flight
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Run cells one at a time in plan order
    #[arg(long)]
    pub sequential: bool,

    /// Fast-feedback mode: scale every timeout down
    #[arg(long)]
    pub quick: bool,

    /// Output format: human, json, markdown
    #[arg(long)]
    pub format: Option<String>,

    /// Output file (stdout if not specified)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Save raw samples as JSON for `versus analyze`
    #[arg(long)]
    pub save_samples: Option<PathBuf>,
}

/// Run the Versus CLI with the process arguments.
///
/// # Returns
/// Returns `Ok(())` on success, or an error if something goes wrong. Exits
/// the process with status 1 when the run aborted or the dataset is invalid.
pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    run_with_cli(cli)
}

/// Run the Versus CLI with pre-parsed arguments.
pub fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    // Logs go to stderr so stdout stays parseable
    let filter = if cli.verbose {
        "versus=debug"
    } else {
        "versus=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Some(Commands::Init { write }) = cli.command {
        return init_config(write);
    }

    let config = match &cli.config {
        Some(path) => VersusConfig::load(path)
            .map_err(|e| anyhow::anyhow!("failed to load {}: {}", path.display(), e))?,
        None => VersusConfig::discover().unwrap_or_default(),
    };

    let successful = match cli.command {
        Some(Commands::Plan { filter, scale }) => {
            print_plan(&config, filter.as_deref(), &scale)?;
            true
        }
        Some(Commands::Analyze {
            samples,
            format,
            output,
        }) => analyze_saved(&config, &samples, format.as_deref(), output.as_deref())?,
        Some(Commands::Run(args)) => run_benchmarks(&config, &args)?,
        Some(Commands::Init { .. }) => true,
        None => run_benchmarks(&config, &RunArgs::default())?,
    };

    if !successful {
        eprintln!("\nRun aborted or dataset invalid; see the report for details");
        std::process::exit(1);
    }
    Ok(())
}

fn init_config(write: bool) -> anyhow::Result<()> {
    let template = VersusConfig::default_toml();
    if !write {
        print!("{}", template);
        return Ok(());
    }
    let path = Path::new("versus.toml");
    if path.exists() {
        return Err(anyhow::anyhow!("versus.toml already exists"));
    }
    std::fs::write(path, template)?;
    println!("Wrote {}", path.display());
    Ok(())
}

fn compile_filter(filter: Option<&str>) -> anyhow::Result<Option<Regex>> {
    filter
        .map(|f| Regex::new(f).map_err(|e| anyhow::anyhow!("invalid --filter: {}", e)))
        .transpose()
}

fn select_plan(
    config: &VersusConfig,
    filter: Option<&str>,
    scales: &[Scale],
) -> anyhow::Result<ExecutionPlan> {
    let plan = config.plan()?;
    let filter = compile_filter(filter)?;
    let scales = (!scales.is_empty()).then_some(scales);
    Ok(planner::build_plan(&plan, filter.as_ref(), scales))
}

fn print_plan(config: &VersusConfig, filter: Option<&str>, scales: &[Scale]) -> anyhow::Result<()> {
    let plan = select_plan(config, filter, scales)?;
    print!("{}", render_plan(&plan));
    Ok(())
}

/// Resolve the output format: CLI wins, then versus.toml
fn resolve_format(cli_format: Option<&str>, config: &VersusConfig) -> OutputFormat {
    let requested = cli_format.unwrap_or(&config.output.format);
    requested.parse().unwrap_or_else(|e| {
        eprintln!("Warning: {}; using human output", e);
        OutputFormat::Human
    })
}

/// Pipeline configuration from versus.toml with CLI overrides applied
fn effective_pipeline_config(
    config: &VersusConfig,
    args: &RunArgs,
) -> anyhow::Result<PipelineConfig> {
    let mut pipeline = config.pipeline_config()?;
    if let Some(jobs) = args.jobs {
        pipeline.orchestrator.max_concurrency = jobs;
    }
    if args.sequential {
        pipeline.orchestrator.scheduling = SchedulingMode::Sequential;
    }
    if args.quick {
        pipeline.orchestrator.timeouts.quick_mode = true;
    }
    pipeline.validate()?;
    Ok(pipeline)
}

fn run_benchmarks(config: &VersusConfig, args: &RunArgs) -> anyhow::Result<bool> {
    let pipeline = effective_pipeline_config(config, args)?;
    let format = resolve_format(args.format.as_deref(), config);
    let selected = select_plan(config, args.filter.as_deref(), &args.scale)?;

    if selected.is_empty() {
        println!("No tasks match.");
        return Ok(true);
    }

    let mut runner_config = config.runner.clone();
    if let Some(jobs) = args.jobs {
        runner_config.pool_size = jobs;
    }
    let pool = build_pool(&runner_config)?;

    let plan = &selected.plan;
    eprintln!(
        "Running {} cells ({} trials): {} vs {}, {} runner(s){}\n",
        plan.cells().len(),
        plan.total_trials(),
        plan.variants.a,
        plan.variants.b,
        pool.len(),
        if pipeline.orchestrator.timeouts.quick_mode {
            ", quick mode"
        } else {
            ""
        }
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let execution =
        runtime.block_on(execute_plan(plan, pipeline.orchestrator, &pool, true))?;

    let samples_path = args
        .save_samples
        .clone()
        .or_else(|| config.output.save_samples.as_ref().map(PathBuf::from));
    if let Some(path) = samples_path {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        save_samples(
            &SampleSet::new(plan.variants.clone(), execution.samples.clone()),
            &path,
        )?;
        eprintln!("Samples saved to: {}", path.display());
    }

    let meta = build_report_meta(&pipeline);
    let report = analyze_samples(
        &pipeline,
        &plan.variants,
        execution.samples.clone(),
        Some(&execution),
        meta,
    );
    emit_report(&report, format, args.output.as_deref())?;
    Ok(report.is_successful())
}

fn analyze_saved(
    config: &VersusConfig,
    samples: &Path,
    format: Option<&str>,
    output: Option<&Path>,
) -> anyhow::Result<bool> {
    let pipeline = config.pipeline_config()?;
    let format = resolve_format(format, config);
    let set = load_samples(samples)?;
    eprintln!(
        "Analyzing {} samples from {}\n",
        set.samples.len(),
        samples.display()
    );

    let meta = build_report_meta(&pipeline);
    let report = analyze_samples(&pipeline, &set.variants, set.samples, None, meta);
    emit_report(&report, format, output)?;
    Ok(report.is_successful())
}

fn emit_report(
    report: &PipelineReport,
    format: OutputFormat,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let rendered = match format {
        OutputFormat::Json => generate_json_report(report)?,
        OutputFormat::Markdown => generate_markdown_report(report),
        OutputFormat::Human => format_human_output(report),
    };

    if let Some(path) = output {
        let mut file = std::fs::File::create(path)?;
        file.write_all(rendered.as_bytes())?;
        println!("Report written to: {}", path.display());
    } else {
        print!("{}", rendered);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_flags() {
        let cli = Cli::parse_from([
            "versus",
            "run",
            "--filter",
            "^sort",
            "--scale",
            "small,large",
            "-j",
            "2",
            "--sequential",
            "--quick",
            "--format",
            "json",
        ]);
        let Some(Commands::Run(args)) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.filter.as_deref(), Some("^sort"));
        assert_eq!(args.scale, vec![Scale::Small, Scale::Large]);
        assert_eq!(args.jobs, Some(2));
        assert!(args.sequential && args.quick);
    }

    #[test]
    fn test_overrides_apply_to_pipeline_config() {
        let config = VersusConfig::default();
        let args = RunArgs {
            jobs: Some(2),
            sequential: true,
            quick: true,
            ..RunArgs::default()
        };
        let pipeline = effective_pipeline_config(&config, &args).unwrap();
        assert_eq!(pipeline.orchestrator.max_concurrency, 2);
        assert_eq!(pipeline.orchestrator.scheduling, SchedulingMode::Sequential);
        assert!(pipeline.orchestrator.timeouts.quick_mode);

        let zero = RunArgs {
            jobs: Some(0),
            ..RunArgs::default()
        };
        assert!(effective_pipeline_config(&config, &zero).is_err());
    }

    #[test]
    fn test_format_resolution() {
        let mut config = VersusConfig::default();
        config.output.format = "markdown".to_string();
        assert_eq!(resolve_format(None, &config), OutputFormat::Markdown);
        assert_eq!(resolve_format(Some("json"), &config), OutputFormat::Json);
        assert_eq!(resolve_format(Some("pdf"), &config), OutputFormat::Human);
    }

    #[test]
    fn test_invalid_filter_is_an_error() {
        assert!(compile_filter(Some("(")).is_err());
        assert!(compile_filter(None).unwrap().is_none());
    }
}
