use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::deps::ToolDirs;

/// Modules that have to be importable from a working methylpy installation.
pub const DEFAULT_MODULES: [&str; 4] = ["call_mc_se", "call_mc_pe", "DMRfind", "parser"];

/// Settings for a run of the suite.
///
/// Every field has a default matching the fixture layout shipped with methylpy's
/// test directory, so an empty JSON object is a valid configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct SuiteConfig {
    // methylpy launcher
    pub methylpy: PathBuf,
    // Interpreter used for the import checks
    pub python: PathBuf,
    // Fixture data (allc tables, reads, chrL.fa)
    pub data_dir: PathBuf,
    // Where the pipelines write their output
    pub results_dir: PathBuf,
    // Prefix of the converted reference, e.g. chrL/chrL -> chrL/chrL_f, chrL/chrL_r
    pub reference_prefix: PathBuf,
    pub num_procs: u32,
    pub stdout_log: PathBuf,
    pub stderr_log: PathBuf,
    pub path_to_samtools: Option<PathBuf>,
    pub path_to_bowtie: Option<PathBuf>,
    pub path_to_bowtie2: Option<PathBuf>,
    pub modules: Vec<String>,
    // Ask on stdin for missing tools
    pub prompt: bool,
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self {
            methylpy: PathBuf::from("methylpy"),
            python: PathBuf::from("python"),
            data_dir: PathBuf::from("data"),
            results_dir: PathBuf::from("results"),
            reference_prefix: PathBuf::from("chrL/chrL"),
            num_procs: 1,
            stdout_log: PathBuf::from("test_output_msg.txt"),
            stderr_log: PathBuf::from("test_error_msg.txt"),
            path_to_samtools: None,
            path_to_bowtie: None,
            path_to_bowtie2: None,
            modules: DEFAULT_MODULES.iter().map(|m| m.to_string()).collect(),
            prompt: true,
        }
    }
}

impl SuiteConfig {
    pub fn from_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    pub fn tool_dirs(&self) -> ToolDirs {
        ToolDirs {
            samtools: self.path_to_samtools.clone(),
            bowtie: self.path_to_bowtie.clone(),
            bowtie2: self.path_to_bowtie2.clone(),
        }
    }

    pub fn data_file(&self, name: &str) -> PathBuf {
        self.data_dir.join(name)
    }

    pub fn results_file(&self, name: &str) -> PathBuf {
        self.results_dir.join(name)
    }

    pub fn ref_fasta(&self) -> PathBuf {
        self.data_file("chrL.fa")
    }

    /// Reference prefix with a suffix appended to the file name, e.g. `_f`.
    pub fn reference_with_suffix(&self, suffix: &str) -> PathBuf {
        let mut name = self
            .reference_prefix
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(suffix);
        self.reference_prefix.with_file_name(name)
    }

    pub fn forward_reference(&self) -> PathBuf {
        self.reference_with_suffix("_f")
    }

    pub fn reverse_reference(&self) -> PathBuf {
        self.reference_with_suffix("_r")
    }

    /// Directories the external tools expect to exist before they are invoked.
    pub fn output_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = vec![self.results_dir.clone()];
        if let Some(parent) = self.reference_prefix.parent() {
            if !parent.as_os_str().is_empty() {
                dirs.push(parent.to_path_buf());
            }
        }
        dirs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_config_uses_fixture_layout() {
        let config: SuiteConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, SuiteConfig::default());
        assert_eq!(config.ref_fasta(), PathBuf::from("data/chrL.fa"));
        assert_eq!(config.forward_reference(), PathBuf::from("chrL/chrL_f"));
        assert_eq!(config.reverse_reference(), PathBuf::from("chrL/chrL_r"));
        assert_eq!(
            config.output_dirs(),
            vec![PathBuf::from("results"), PathBuf::from("chrL")]
        );
    }

    #[test]
    fn config_file_overrides_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"num-procs": 4, "path-to-samtools": "/opt/samtools/bin", "prompt": false}}"#
        )
        .unwrap();

        let config = SuiteConfig::from_json(file.path()).unwrap();
        assert_eq!(config.num_procs, 4);
        assert_eq!(config.path_to_samtools, Some(PathBuf::from("/opt/samtools/bin")));
        assert!(!config.prompt);
        assert_eq!(config.methylpy, PathBuf::from("methylpy"));
    }

    #[test]
    fn malformed_config_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "num-procs = 4").unwrap();
        assert!(SuiteConfig::from_json(file.path()).is_err());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"num_procs": 4}}"#).unwrap();

        let err = SuiteConfig::from_json(file.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("unknown field `num_procs`"));
    }

    #[test]
    fn bare_reference_prefix_has_no_output_dir() {
        let config = SuiteConfig {
            reference_prefix: PathBuf::from("hg38"),
            ..SuiteConfig::default()
        };
        assert_eq!(config.forward_reference(), PathBuf::from("hg38_f"));
        assert_eq!(config.output_dirs(), vec![PathBuf::from("results")]);
    }
}
