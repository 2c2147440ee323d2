use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{error, info};
use std::io::Write;
use std::path::{Path, PathBuf};

use methylcheck::deps::{Aligner, Toolchain};
use methylcheck::runner::{LoggedExecutor, RunOptions};
use methylcheck::SuiteConfig;

pub fn get_styles() -> clap::builder::Styles {
    clap::builder::Styles::styled()
        .usage(
            anstyle::Style::new()
                .bold()
                .underline()
                .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Yellow))),
        )
        .header(
            anstyle::Style::new()
                .bold()
                .underline()
                .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Yellow))),
        )
        .literal(
            anstyle::Style::new().fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Green))),
        )
        .invalid(
            anstyle::Style::new()
                .bold()
                .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Red))),
        )
        .error(
            anstyle::Style::new()
                .bold()
                .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Red))),
        )
        .valid(
            anstyle::Style::new()
                .bold()
                .underline()
                .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Green))),
        )
        .placeholder(
            anstyle::Style::new().fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::White))),
        )
}

// Options shared by every subcommand
#[derive(Parser, Clone)]
struct SuiteOptions {
    /// JSON file with suite settings. Command line options take precedence
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory containing the test fixtures. Relative paths are resolved from here
    #[arg(short, long)]
    workdir: Option<PathBuf>,

    /// methylpy executable [default: methylpy]
    #[arg(long)]
    methylpy: Option<PathBuf>,

    /// Python interpreter with methylpy installed [default: python]
    #[arg(long)]
    python: Option<PathBuf>,

    /// Fixture data directory [default: data]
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Output directory for the pipelines [default: results]
    #[arg(long)]
    results_dir: Option<PathBuf>,

    /// Prefix of the converted reference [default: chrL/chrL]
    #[arg(long)]
    reference_prefix: Option<PathBuf>,

    /// Number of processes handed to methylpy [default: 1]
    #[arg(long)]
    num_procs: Option<u32>,

    /// Directory containing samtools, if it is not in PATH
    #[arg(long)]
    path_to_samtools: Option<PathBuf>,

    /// Directory containing bowtie, if it is not in PATH
    #[arg(long)]
    path_to_bowtie: Option<PathBuf>,

    /// Directory containing bowtie2, if it is not in PATH
    #[arg(long)]
    path_to_bowtie2: Option<PathBuf>,

    /// Fail instead of asking for the location of missing tools
    #[arg(long, action = clap::ArgAction::SetTrue)]
    no_prompt: bool,
}

#[derive(Parser)]
#[command(author, version, about, long_about = None, styles=get_styles())]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbosity level
    #[arg(short, long, required = false, default_value = "2")]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full methylpy test suite
    Run {
        #[command(flatten)]
        suite_options: SuiteOptions,

        /// Do not check the files written by each step
        #[arg(long, action = clap::ArgAction::SetTrue)]
        no_verify: bool,

        /// Run the remaining steps after a failure
        #[arg(long, action = clap::ArgAction::SetTrue)]
        keep_going: bool,

        /// Print the methylpy commands instead of running them
        #[arg(long, action = clap::ArgAction::SetTrue)]
        dry_run: bool,

        /// Skip the methylpy import checks
        #[arg(long, action = clap::ArgAction::SetTrue)]
        skip_imports: bool,

        /// Write a JSON report of the run
        #[arg(short, long)]
        report: Option<PathBuf>,
    },

    /// Check that samtools and the aligners can be found
    Deps {
        #[command(flatten)]
        suite_options: SuiteOptions,
    },

    /// Check that the methylpy modules can be imported
    Imports {
        #[command(flatten)]
        suite_options: SuiteOptions,
    },

    /// Print the methylpy commands the suite would run
    Plan {
        #[command(flatten)]
        suite_options: SuiteOptions,

        /// Aligners to lay out steps for
        #[arg(short, long, value_enum, value_delimiter = ',', default_values_t = vec![Aligner::Bowtie, Aligner::Bowtie2])]
        aligner: Vec<Aligner>,

        /// Print the plan as JSON
        #[arg(long, action = clap::ArgAction::SetTrue)]
        json: bool,
    },
}

impl SuiteOptions {
    /// Merge the config file (if any) with the command line.
    fn resolve(&self) -> Result<SuiteConfig> {
        let mut config = match &self.config {
            Some(path) => SuiteConfig::from_json(path)?,
            None => SuiteConfig::default(),
        };

        if let Some(methylpy) = &self.methylpy {
            config.methylpy = methylpy.clone();
        }
        if let Some(python) = &self.python {
            config.python = python.clone();
        }
        if let Some(data_dir) = &self.data_dir {
            config.data_dir = data_dir.clone();
        }
        if let Some(results_dir) = &self.results_dir {
            config.results_dir = results_dir.clone();
        }
        if let Some(reference_prefix) = &self.reference_prefix {
            config.reference_prefix = reference_prefix.clone();
        }
        if let Some(num_procs) = self.num_procs {
            config.num_procs = num_procs;
        }
        if self.path_to_samtools.is_some() {
            config.path_to_samtools = self.path_to_samtools.clone();
        }
        if self.path_to_bowtie.is_some() {
            config.path_to_bowtie = self.path_to_bowtie.clone();
        }
        if self.path_to_bowtie2.is_some() {
            config.path_to_bowtie2 = self.path_to_bowtie2.clone();
        }
        if self.no_prompt {
            config.prompt = false;
        }

        if config.num_procs == 0 {
            return Err(anyhow::anyhow!("--num-procs must be at least 1"));
        }

        Ok(config)
    }

    fn enter_workdir(&self) -> Result<()> {
        if let Some(workdir) = &self.workdir {
            std::env::set_current_dir(workdir)
                .with_context(|| format!("Failed to enter working directory {}", workdir.display()))?;
            info!("Working directory: {}", workdir.display());
        }
        Ok(())
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()
            .context("Failed to get current directory")?
            .join(path))
    }
}

fn main() -> Result<()> {
    colog::init();

    let cli = Cli::parse();
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Error,
        1 => log::LevelFilter::Warn,
        2 => log::LevelFilter::Info,
        3 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    log::set_max_level(log_level);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    match &cli.command {
        Commands::Run {
            suite_options,
            no_verify,
            keep_going,
            dry_run,
            skip_imports,
            report,
        } => {
            let config = suite_options.resolve()?;
            // The report path is relative to where we were started from
            let report = match report {
                Some(path) => Some(absolute(path)?),
                None => None,
            };
            suite_options.enter_workdir()?;

            let options = RunOptions {
                verify_outputs: !no_verify,
                keep_going: *keep_going,
                dry_run: *dry_run,
            };
            let run_report = methylcheck::suite::run_suite(&config, &options, *skip_imports, &mut out)?;
            out.flush()?;

            if let Some(path) = report {
                run_report.write_json(path)?;
            }

            if let Some(reason) = &run_report.aborted {
                return Err(anyhow::anyhow!("{}", reason));
            }
            if !run_report.passed() {
                let failures = run_report.failures();
                for failure in &failures {
                    error!("{}: {}", failure.label, failure.outcome);
                }
                return Err(anyhow::anyhow!(
                    "{} of {} methylpy steps failed, see {} and {}",
                    failures.len(),
                    run_report.steps.len(),
                    config.stdout_log.display(),
                    config.stderr_log.display()
                ));
            }
        }

        Commands::Deps { suite_options } => {
            let config = suite_options.resolve()?;
            suite_options.enter_workdir()?;

            let toolchain = methylcheck::suite::discover_tools(&config, config.prompt, &mut out)?;
            info!(
                "Found {} of {} tools",
                toolchain.statuses().iter().filter(|s| s.found()).count(),
                toolchain.statuses().len()
            );
        }

        Commands::Imports { suite_options } => {
            let config = suite_options.resolve()?;
            suite_options.enter_workdir()?;

            let mut executor = LoggedExecutor::new(&config.stdout_log, &config.stderr_log)?;
            methylcheck::imports::check_installation(
                &mut executor,
                &config.python,
                &config.methylpy,
                &config.modules,
                &mut out,
            )?;
        }

        Commands::Plan {
            suite_options,
            aligner,
            json,
        } => {
            let config = suite_options.resolve()?;
            let toolchain = Toolchain::assumed(aligner, &config.tool_dirs());
            let steps = methylcheck::plan::build_plan(&config, &toolchain);

            if *json {
                let text = serde_json::to_string_pretty(&steps).context("Failed to serialize plan")?;
                writeln!(out, "{}", text)?;
            } else {
                for step in &steps {
                    writeln!(out, "# {}", step.label)?;
                    writeln!(out, "{}", step.command_line(&config.methylpy))?;
                }
            }
        }
    }

    Ok(())
}
