use anyhow::{Result, bail};
use log::debug;
use std::io::Write;
use std::path::Path;

use crate::runner::{ExitState, Executor};

/// Try `from methylpy import <module>` with the given interpreter.
pub fn check_import<E: Executor + ?Sized, W: Write>(
    executor: &mut E,
    python: &Path,
    module: &str,
    out: &mut W,
) -> Result<()> {
    write!(out, "- importing {}: ", module)?;
    out.flush()?;

    let args = vec!["-c".to_string(), format!("from methylpy import {}", module)];
    let state = executor.execute(python, &args)?;
    debug!("{} -c 'from methylpy import {}': {:?}", python.display(), module, state);

    if state.success() {
        writeln!(out, "pass")?;
        Ok(())
    } else {
        writeln!(out, "failed")?;
        if state == ExitState::Missing {
            bail!("Python interpreter {} could not be found", python.display());
        }
        bail!("Failed to import {} from methylpy using {}", module, python.display())
    }
}

/// Check that the methylpy launcher runs.
pub fn check_executable<E: Executor + ?Sized, W: Write>(
    executor: &mut E,
    methylpy: &Path,
    out: &mut W,
) -> Result<()> {
    write!(out, "Check methylpy executable: ")?;
    out.flush()?;

    let state = executor.execute(methylpy, &["-h".to_string()])?;
    if state.success() {
        writeln!(out, "pass")?;
        Ok(())
    } else {
        writeln!(out, "failed")?;
        writeln!(out, "Please check whether methylpy/bin/ is included in PATH.")?;
        bail!("{} -h did not run successfully ({:?})", methylpy.display(), state)
    }
}

/// All installation checks: every module, then the launcher.
pub fn check_installation<E: Executor + ?Sized, W: Write>(
    executor: &mut E,
    python: &Path,
    methylpy: &Path,
    modules: &[String],
    out: &mut W,
) -> Result<()> {
    writeln!(out, "Test importing methylpy module.")?;
    for module in modules {
        check_import(executor, python, module, out)?;
    }
    check_executable(executor, methylpy, out)?;
    writeln!(out, "\nmethylpy is successfully installed!\n")?;
    Ok(())
}
