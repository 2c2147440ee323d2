use anyhow::{Context, Result};
use log::{error, info};
use std::io::Write;
use std::time::Instant;

use crate::config::SuiteConfig;
use crate::deps::{Discovery, LinePrompt, PathPrompt, SystemProbe, Toolchain};
use crate::imports::check_installation;
use crate::plan::build_plan;
use crate::report::RunReport;
use crate::runner::{DryRunExecutor, Executor, LoggedExecutor, RunOptions, prepare_dirs, run_steps};
use crate::utils::timestamp;

/// Probe the tools on this machine, asking on stdin for missing ones if `prompt` is set.
pub fn discover_tools<W: Write>(config: &SuiteConfig, prompt: bool, out: &mut W) -> Result<Toolchain> {
    writeln!(out, "Check whether dependencies are available in PATH")?;

    let mut line_prompt = LinePrompt::new(std::io::stdin().lock(), std::io::stdout());
    let prompt: Option<&mut dyn PathPrompt> = if prompt {
        Some(&mut line_prompt)
    } else {
        None
    };

    Discovery::new(&SystemProbe, &mut *out).discover(&config.tool_dirs(), prompt)
}

/// Run the whole suite: installation checks, tool discovery and every methylpy step.
///
/// A failing installation check or tool discovery ends the run early and is
/// recorded as the report's `aborted` reason. Step failures are recorded per step.
/// Dry runs start no programs besides the tool probes, never prompt and leave
/// the log files alone.
pub fn run_suite<W: Write>(
    config: &SuiteConfig,
    options: &RunOptions,
    skip_imports: bool,
    out: &mut W,
) -> Result<RunReport> {
    let mut report = RunReport::new(timestamp());
    writeln!(out, "Tests start")?;
    writeln!(out, "{}", report.started)?;
    writeln!(out)?;
    let start_time = Instant::now();

    if let Err(e) = run_stages(config, options, skip_imports, &mut report, out) {
        error!("{:#}", e);
        report.aborted = Some(format!("{:#}", e));
    }

    report.finished = timestamp();
    report.elapsed_seconds = start_time.elapsed().as_secs_f64();

    if report.passed() {
        writeln!(out, "\nAll tests are done!")?;
    } else {
        writeln!(out, "\nSome tests failed!")?;
        write!(out, "{}", report)?;
    }
    writeln!(out, "{}", report.finished)?;
    writeln!(out, "The tests took {:.2} seconds!", report.elapsed_seconds)?;

    Ok(report)
}

fn run_stages<W: Write>(
    config: &SuiteConfig,
    options: &RunOptions,
    skip_imports: bool,
    report: &mut RunReport,
    out: &mut W,
) -> Result<()> {
    let mut logged;
    let mut dry_run = DryRunExecutor;
    let executor: &mut dyn Executor = if options.dry_run {
        &mut dry_run
    } else {
        logged = LoggedExecutor::new(&config.stdout_log, &config.stderr_log)?;
        &mut logged
    };

    if options.dry_run {
        info!("Dry run: skipping methylpy installation checks");
    } else if skip_imports {
        info!("Skipping methylpy installation checks");
    } else {
        check_installation(&mut *executor, &config.python, &config.methylpy, &config.modules, out)
            .context("methylpy installation check failed")?;
    }

    let toolchain = discover_tools(config, config.prompt && !options.dry_run, out)?;
    report.tools = toolchain.statuses().into_iter().cloned().collect();
    writeln!(out)?;

    if !options.dry_run {
        prepare_dirs(&config.output_dirs())?;
    }

    let steps = build_plan(config, &toolchain);
    info!("Running {} methylpy steps", steps.len());
    report.steps = run_steps(executor, &config.methylpy, &steps, options, out)?;
    Ok(())
}
