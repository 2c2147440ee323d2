use anyhow::{Context, Result, bail};
use log::{debug, info};
use serde::Serialize;
use std::fmt::Display;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::utils::parse_version;

/// External programs methylpy shells out to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    Bowtie,
    Bowtie2,
    Samtools,
    Cutadapt,
    Java,
}

impl Tool {
    pub fn executable(&self) -> &'static str {
        match self {
            Tool::Bowtie => "bowtie",
            Tool::Bowtie2 => "bowtie2",
            Tool::Samtools => "samtools",
            Tool::Cutadapt => "cutadapt",
            Tool::Java => "java",
        }
    }

    pub fn version_flag(&self) -> &'static str {
        match self {
            Tool::Java => "-version",
            _ => "--version",
        }
    }
}

impl Display for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.executable())
    }
}

/// Short read aligners supported by methylpy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Aligner {
    Bowtie,
    Bowtie2,
}

impl Aligner {
    pub fn tool(&self) -> Tool {
        match self {
            Aligner::Bowtie => Tool::Bowtie,
            Aligner::Bowtie2 => Tool::Bowtie2,
        }
    }

    pub fn is_bowtie2(&self) -> bool {
        matches!(self, Aligner::Bowtie2)
    }

    /// Suffix used to name the samples aligned with this aligner, e.g. `se_bt2`.
    pub fn sample_suffix(&self) -> &'static str {
        match self {
            Aligner::Bowtie => "bt",
            Aligner::Bowtie2 => "bt2",
        }
    }

    /// Extension of the index files written by `build-reference`.
    pub fn index_extension(&self) -> &'static str {
        match self {
            Aligner::Bowtie => "ebwt",
            Aligner::Bowtie2 => "bt2",
        }
    }
}

impl Display for Aligner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.tool())
    }
}

/// Reports the version of a tool, or `None` when it cannot be run.
///
/// A tool that runs but prints no version is still available and reports an
/// empty string.
pub trait VersionProbe {
    fn version(&self, program: &Path, tool: Tool) -> Option<String>;
}

/// Probe that actually runs `<tool> --version`.
pub struct SystemProbe;

impl VersionProbe for SystemProbe {
    fn version(&self, program: &Path, tool: Tool) -> Option<String> {
        let output = match Command::new(program).arg(tool.version_flag()).output() {
            Ok(output) => output,
            Err(e) => {
                debug!("Failed to run {}: {}", program.display(), e);
                return None;
            }
        };

        if !output.status.success() {
            debug!("{} {} exited with {}", program.display(), tool.version_flag(), output.status);
            return None;
        }

        let text = match tool {
            // java writes its version banner to stderr
            Tool::Java => {
                let mut text = String::from_utf8_lossy(&output.stderr).into_owned();
                text.push_str(&String::from_utf8_lossy(&output.stdout));
                text.replace('"', "")
            }
            _ => String::from_utf8_lossy(&output.stdout).into_owned(),
        };

        Some(parse_version(&text).unwrap_or_default())
    }
}

/// Result of looking for one tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolStatus {
    pub tool: Tool,
    // Directory the tool was found in when it is not on PATH
    pub dir: Option<PathBuf>,
    pub version: Option<String>,
}

impl ToolStatus {
    pub fn found(&self) -> bool {
        self.version.is_some()
    }

    /// Value for methylpy's `--path-to-*` options; empty when the tool is on PATH.
    pub fn dir_arg(&self) -> String {
        self.dir
            .as_ref()
            .map(|d| d.display().to_string())
            .unwrap_or_default()
    }

    pub fn assumed(tool: Tool, dir: Option<PathBuf>) -> Self {
        Self {
            tool,
            dir,
            version: Some("unknown".to_string()),
        }
    }
}

/// Tools available for the run, after discovery.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Toolchain {
    pub bowtie: ToolStatus,
    pub bowtie2: ToolStatus,
    pub samtools: ToolStatus,
    pub cutadapt: ToolStatus,
    pub java: ToolStatus,
}

impl Toolchain {
    /// A toolchain taken on trust, used to lay out the plan without probing.
    pub fn assumed(aligners: &[Aligner], dirs: &ToolDirs) -> Self {
        let aligner = |aligner: Aligner, dir: &Option<PathBuf>| {
            if aligners.contains(&aligner) {
                ToolStatus::assumed(aligner.tool(), dir.clone())
            } else {
                ToolStatus {
                    tool: aligner.tool(),
                    dir: dir.clone(),
                    version: None,
                }
            }
        };

        Self {
            bowtie: aligner(Aligner::Bowtie, &dirs.bowtie),
            bowtie2: aligner(Aligner::Bowtie2, &dirs.bowtie2),
            samtools: ToolStatus::assumed(Tool::Samtools, dirs.samtools.clone()),
            cutadapt: ToolStatus::assumed(Tool::Cutadapt, None),
            java: ToolStatus::assumed(Tool::Java, None),
        }
    }

    pub fn aligner(&self, aligner: Aligner) -> &ToolStatus {
        match aligner {
            Aligner::Bowtie => &self.bowtie,
            Aligner::Bowtie2 => &self.bowtie2,
        }
    }

    /// Available aligners, bowtie first.
    pub fn aligners(&self) -> Vec<Aligner> {
        [Aligner::Bowtie, Aligner::Bowtie2]
            .into_iter()
            .filter(|a| self.aligner(*a).found())
            .collect()
    }

    pub fn statuses(&self) -> Vec<&ToolStatus> {
        vec![&self.bowtie, &self.bowtie2, &self.samtools, &self.cutadapt, &self.java]
    }
}

/// User supplied directories for the tools that are not on PATH.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolDirs {
    pub samtools: Option<PathBuf>,
    pub bowtie: Option<PathBuf>,
    pub bowtie2: Option<PathBuf>,
}

/// Source of directories for tools that could not be found.
pub trait PathPrompt {
    /// Returns `None` once there is nothing more to read.
    fn ask(&mut self, question: &str) -> Result<Option<String>>;
}

pub struct LinePrompt<R, W> {
    reader: R,
    writer: W,
}

impl<R: BufRead, W: Write> LinePrompt<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }
}

impl<R: BufRead, W: Write> PathPrompt for LinePrompt<R, W> {
    fn ask(&mut self, question: &str) -> Result<Option<String>> {
        write!(self.writer, "{}", question)?;
        self.writer.flush()?;

        let mut line = String::new();
        let n = self
            .reader
            .read_line(&mut line)
            .context("Failed to read answer from stdin")?;
        if n == 0 {
            writeln!(self.writer)?;
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }
}

/// Finds the external tools, printing one `- find <tool>: ...` line per probe.
pub struct Discovery<'a, P: VersionProbe, W: Write> {
    probe: &'a P,
    out: W,
}

impl<'a, P: VersionProbe, W: Write> Discovery<'a, P, W> {
    pub fn new(probe: &'a P, out: W) -> Self {
        Self { probe, out }
    }

    pub fn probe_tool(&mut self, tool: Tool, dir: Option<&Path>) -> Result<ToolStatus> {
        write!(self.out, "- find {}: ", tool)?;
        self.out.flush()?;

        let dir = dir.filter(|d| !d.as_os_str().is_empty());
        let version = match dir {
            Some(dir) => self.probe.version(&dir.join(tool.executable()), tool),
            None => match which::which(tool.executable()) {
                Ok(program) => {
                    debug!("{} resolved to {}", tool, program.display());
                    self.probe.version(&program, tool)
                }
                Err(e) => {
                    debug!("{} not found in PATH: {}", tool, e);
                    None
                }
            },
        };

        match &version {
            Some(v) => writeln!(self.out, "found version {}", v)?,
            None => writeln!(self.out, "failed")?,
        }

        Ok(ToolStatus {
            tool,
            dir: dir.map(|d| d.to_path_buf()),
            version,
        })
    }

    /// Probe every tool, asking for directories while required ones are missing.
    ///
    /// samtools and at least one of bowtie/bowtie2 are required. Without a prompt,
    /// or once the prompt runs dry, a missing requirement is an error.
    pub fn discover(
        &mut self,
        dirs: &ToolDirs,
        mut prompt: Option<&mut dyn PathPrompt>,
    ) -> Result<Toolchain> {
        let mut bowtie = self.probe_tool(Tool::Bowtie, dirs.bowtie.as_deref())?;
        let mut bowtie2 = self.probe_tool(Tool::Bowtie2, dirs.bowtie2.as_deref())?;
        let mut samtools = self.probe_tool(Tool::Samtools, dirs.samtools.as_deref())?;
        let cutadapt = self.probe_tool(Tool::Cutadapt, None)?;
        let java = self.probe_tool(Tool::Java, None)?;

        if !samtools.found() {
            writeln!(self.out)?;
            while !samtools.found() {
                writeln!(self.out, "samtools is required but it is not detected.")?;
                let answer = match prompt.as_deref_mut() {
                    Some(p) => p.ask("Please enter path to samtools: ")?,
                    None => None,
                };
                let Some(dir) = answer else {
                    bail!("samtools is required but was not found; use --path-to-samtools");
                };
                samtools = self.probe_tool(Tool::Samtools, Some(Path::new(&dir)))?;
            }
        }

        if !bowtie.found() && !bowtie2.found() {
            writeln!(self.out)?;
            while !bowtie.found() && !bowtie2.found() {
                writeln!(self.out, "Neither bowtie nor bowtie2 is detected.")?;
                let answers = match prompt.as_deref_mut() {
                    Some(p) => match p.ask("Please enter path to bowtie: ")? {
                        Some(bowtie_dir) => p
                            .ask("Please enter path to bowtie2: ")?
                            .map(|bowtie2_dir| (bowtie_dir, bowtie2_dir)),
                        None => None,
                    },
                    None => None,
                };
                let Some((bowtie_dir, bowtie2_dir)) = answers else {
                    bail!(
                        "Neither bowtie nor bowtie2 was found; use --path-to-bowtie or --path-to-bowtie2"
                    );
                };
                bowtie = self.probe_tool(Tool::Bowtie, Some(Path::new(&bowtie_dir)))?;
                bowtie2 = self.probe_tool(Tool::Bowtie2, Some(Path::new(&bowtie2_dir)))?;
            }
        }

        match (bowtie.found(), bowtie2.found()) {
            (true, true) => {
                writeln!(self.out, "Both bowtie and bowtie2 are available and will be tested.")?
            }
            (true, false) => writeln!(
                self.out,
                "Only bowtie is available. Skip tests for bowtie2 related code"
            )?,
            (false, true) => writeln!(
                self.out,
                "Only bowtie2 is available. Skip tests for bowtie related code"
            )?,
            (false, false) => unreachable!("discovery loop exits once an aligner is found"),
        }

        let toolchain = Toolchain {
            bowtie,
            bowtie2,
            samtools,
            cutadapt,
            java,
        };
        info!(
            "Aligners under test: {}",
            itertools::join(toolchain.aligners(), ", ")
        );
        Ok(toolchain)
    }
}
