use anyhow::{Context, Result, bail};
use log::{debug, info, warn};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Instant;

use crate::plan::Step;
use crate::report::{Outcome, StepRecord};
use crate::utils::{progress_bar, shell_join};
use crate::verify::verify_artifact;

/// How a child process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitState {
    Success,
    // Exit code is None when the child was killed by a signal
    Failed(Option<i32>),
    // The program could not be started at all
    Missing,
}

impl ExitState {
    pub fn success(&self) -> bool {
        matches!(self, ExitState::Success)
    }
}

/// Runs external programs to completion.
pub trait Executor {
    fn execute(&mut self, program: &Path, args: &[String]) -> Result<ExitState>;
}

/// Runs programs with their output appended to a pair of log files.
pub struct LoggedExecutor {
    stdout_log: File,
    stderr_log: File,
}

impl LoggedExecutor {
    /// Create (or truncate) the log files.
    pub fn new(stdout_log: &Path, stderr_log: &Path) -> Result<Self> {
        let stdout = File::create(stdout_log)
            .with_context(|| format!("Failed to create {}", stdout_log.display()))?;
        let stderr = File::create(stderr_log)
            .with_context(|| format!("Failed to create {}", stderr_log.display()))?;
        Ok(Self {
            stdout_log: stdout,
            stderr_log: stderr,
        })
    }
}

impl Executor for LoggedExecutor {
    fn execute(&mut self, program: &Path, args: &[String]) -> Result<ExitState> {
        debug!("Running {}", shell_join(&program.display().to_string(), args));

        let stdout = self.stdout_log.try_clone().context("Failed to share stdout log")?;
        let stderr = self.stderr_log.try_clone().context("Failed to share stderr log")?;

        let status = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .status();

        match status {
            Ok(status) if status.success() => Ok(ExitState::Success),
            Ok(status) => Ok(ExitState::Failed(status.code())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("{} could not be found", program.display());
                Ok(ExitState::Missing)
            }
            Err(e) => Err(e).with_context(|| format!("Failed to run {}", program.display())),
        }
    }
}

/// Stands in for a real executor during dry runs, where nothing may be started.
pub struct DryRunExecutor;

impl Executor for DryRunExecutor {
    fn execute(&mut self, program: &Path, args: &[String]) -> Result<ExitState> {
        bail!(
            "Refusing to run {} during a dry run",
            shell_join(&program.display().to_string(), args)
        )
    }
}

/// What to do while stepping through the plan.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    // Check the files each step is expected to write
    pub verify_outputs: bool,
    // Carry on after a failed step
    pub keep_going: bool,
    // Print the plan without running it
    pub dry_run: bool,
}

/// Run the steps one after another, printing `Test <label>: pass|failed` for each.
///
/// Unless `keep_going` is set, the first failure ends the run and the remaining
/// steps are recorded as skipped.
pub fn run_steps<E: Executor + ?Sized, W: Write>(
    executor: &mut E,
    methylpy: &Path,
    steps: &[Step],
    options: &RunOptions,
    out: &mut W,
) -> Result<Vec<StepRecord>> {
    let progress = progress_bar(steps.len() as u64, "methylpy steps".to_string());
    let mut records = Vec::with_capacity(steps.len());
    let mut stop = false;
    let mut previous_kind = None;

    for step in steps {
        let command = step.command_line(methylpy);

        if stop {
            records.push(StepRecord::new(step, command, Outcome::Skipped, 0.0));
            continue;
        }

        progress.suspend(|| -> Result<()> {
            if previous_kind.is_some() && previous_kind != Some(step.kind) {
                writeln!(out)?;
            }
            write!(out, "Test {}: ", step.label)?;
            out.flush()?;
            Ok(())
        })?;
        previous_kind = Some(step.kind);
        progress.set_message(step.label.clone());

        if options.dry_run {
            progress.suspend(|| writeln!(out, "skipped (dry run)\n  {}", command))?;
            records.push(StepRecord::new(step, command, Outcome::Skipped, 0.0));
            progress.inc(1);
            continue;
        }

        let start = Instant::now();
        let state = executor.execute(methylpy, &step.args)?;
        let mut outcome = match state {
            ExitState::Success => Outcome::Passed,
            ExitState::Failed(code) => Outcome::Failed { exit_code: code },
            ExitState::Missing => Outcome::Missing,
        };

        if outcome.passed() && options.verify_outputs {
            for artifact in &step.artifacts {
                if let Err(e) = verify_artifact(artifact) {
                    outcome = Outcome::VerificationFailed {
                        reason: format!("{:#}", e),
                    };
                    break;
                }
            }
        }
        let seconds = start.elapsed().as_secs_f64();

        progress.suspend(|| -> Result<()> {
            match &outcome {
                Outcome::Passed => writeln!(out, "pass")?,
                other => writeln!(out, "failed ({})", other)?,
            }
            Ok(())
        })?;

        if outcome.passed() {
            info!("{} finished in {:.2}s", step.label, seconds);
        } else {
            warn!("{} failed: {}", step.label, command);
            stop = !options.keep_going;
        }

        records.push(StepRecord::new(step, command, outcome, seconds));
        progress.inc(1);
    }

    progress.finish_and_clear();
    Ok(records)
}

/// Make sure the directories the steps write into exist.
pub fn prepare_dirs(dirs: &[PathBuf]) -> Result<()> {
    for dir in dirs {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory {}", dir.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SuiteConfig;
    use crate::deps::{Aligner, ToolDirs, Toolchain};
    use crate::plan::{StepKind, build_plan};

    /// Records invocations and fails the given subcommand.
    struct ScriptedExecutor {
        calls: Vec<Vec<String>>,
        fail: Option<&'static str>,
    }

    impl Executor for ScriptedExecutor {
        fn execute(&mut self, _program: &Path, args: &[String]) -> Result<ExitState> {
            self.calls.push(args.to_vec());
            if self.fail == args.first().map(|s| s.as_str()) {
                Ok(ExitState::Failed(Some(1)))
            } else {
                Ok(ExitState::Success)
            }
        }
    }

    fn plan() -> Vec<Step> {
        build_plan(
            &SuiteConfig::default(),
            &Toolchain::assumed(&[Aligner::Bowtie, Aligner::Bowtie2], &ToolDirs::default()),
        )
    }

    #[test]
    fn runs_every_step_in_order() {
        let steps = plan();
        let mut executor = ScriptedExecutor { calls: Vec::new(), fail: None };
        let mut out = Vec::new();
        let records = run_steps(
            &mut executor,
            Path::new("methylpy"),
            &steps,
            &RunOptions::default(),
            &mut out,
        )
        .unwrap();

        assert_eq!(executor.calls.len(), steps.len());
        assert_eq!(executor.calls[0][0], "DMRfind");
        assert!(records.iter().all(|r| r.outcome.passed()));

        let out = String::from_utf8(out).unwrap();
        assert!(out.starts_with("Test DMRfind: pass\n\nTest build-reference with bowtie: pass\n"));
        assert_eq!(out.matches(": pass").count(), steps.len());
    }

    #[test]
    fn stops_at_first_failure() {
        let steps = plan();
        let mut executor = ScriptedExecutor {
            calls: Vec::new(),
            fail: Some("single-end-pipeline"),
        };
        let records = run_steps(
            &mut executor,
            Path::new("methylpy"),
            &steps,
            &RunOptions::default(),
            &mut std::io::sink(),
        )
        .unwrap();

        // DMRfind, two build-reference runs and the first single-end pipeline
        assert_eq!(executor.calls.len(), 4);
        assert_eq!(records.len(), steps.len());
        assert_eq!(records[3].outcome, Outcome::Failed { exit_code: Some(1) });
        assert!(records[4..].iter().all(|r| r.outcome == Outcome::Skipped));
    }

    #[test]
    fn keep_going_runs_remaining_steps() {
        let steps = plan();
        let mut executor = ScriptedExecutor {
            calls: Vec::new(),
            fail: Some("bam-quality-filter"),
        };
        let options = RunOptions {
            keep_going: true,
            ..RunOptions::default()
        };
        let records = run_steps(&mut executor, Path::new("methylpy"), &steps, &options, &mut std::io::sink())
            .unwrap();

        assert_eq!(executor.calls.len(), steps.len());
        let failed: Vec<_> = records
            .iter()
            .filter(|r| !r.outcome.passed())
            .map(|r| r.kind)
            .collect();
        assert_eq!(failed, vec![StepKind::BamQualityFilter, StepKind::BamQualityFilter]);
    }

    #[test]
    fn dry_run_executes_nothing() {
        let steps = plan();
        let mut executor = ScriptedExecutor { calls: Vec::new(), fail: None };
        let options = RunOptions {
            dry_run: true,
            ..RunOptions::default()
        };
        let mut out = Vec::new();
        let records = run_steps(&mut executor, Path::new("methylpy"), &steps, &options, &mut out).unwrap();

        assert!(executor.calls.is_empty());
        assert!(records.iter().all(|r| r.outcome == Outcome::Skipped));

        let records = run_steps(&mut DryRunExecutor, Path::new("methylpy"), &steps, &options, &mut std::io::sink())
            .unwrap();
        assert_eq!(records.len(), steps.len());
        assert!(DryRunExecutor.execute(Path::new("methylpy"), &[]).is_err());
        assert!(String::from_utf8(out).unwrap().contains("methylpy DMRfind --allc-files"));
    }

    #[test]
    fn missing_outputs_fail_verification() {
        let temp = tempfile::tempdir().unwrap();
        let config = SuiteConfig {
            results_dir: temp.path().join("results"),
            reference_prefix: temp.path().join("chrL/chrL"),
            ..SuiteConfig::default()
        };
        let steps = build_plan(
            &config,
            &Toolchain::assumed(&[Aligner::Bowtie], &ToolDirs::default()),
        );
        let mut executor = ScriptedExecutor { calls: Vec::new(), fail: None };
        let options = RunOptions {
            verify_outputs: true,
            ..RunOptions::default()
        };
        let records = run_steps(&mut executor, Path::new("methylpy"), &steps, &options, &mut std::io::sink())
            .unwrap();

        // DMRfind declares no artifacts, build-reference wrote no index
        assert!(records[0].outcome.passed());
        assert!(matches!(records[1].outcome, Outcome::VerificationFailed { .. }));
        assert_eq!(executor.calls.len(), 2);
    }

    #[test]
    fn logged_executor_reports_exit_states() {
        let temp = tempfile::tempdir().unwrap();
        let mut executor = LoggedExecutor::new(
            &temp.path().join("out.txt"),
            &temp.path().join("err.txt"),
        )
        .unwrap();

        let state = executor
            .execute(Path::new("methylcheck-no-such-program"), &[])
            .unwrap();
        assert_eq!(state, ExitState::Missing);

        #[cfg(unix)]
        {
            let args = vec!["-c".to_string(), "echo hello; exit 3".to_string()];
            let state = executor.execute(Path::new("/bin/sh"), &args).unwrap();
            assert_eq!(state, ExitState::Failed(Some(3)));
            let logged = std::fs::read_to_string(temp.path().join("out.txt")).unwrap();
            assert_eq!(logged, "hello\n");
        }
    }
}
