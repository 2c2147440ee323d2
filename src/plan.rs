use serde::Serialize;
use std::fmt::Display;
use std::path::{Path, PathBuf};

use crate::config::SuiteConfig;
use crate::deps::{Aligner, Toolchain};
use crate::utils::{dir_arg, py_bool, shell_join};

/// Fixture samples compared by DMRfind: two forebrain and two heart replicates.
pub const DMR_SAMPLES: [&str; 4] = ["P0_FB_1", "P0_FB_2", "P0_HT_1", "P0_HT_2"];

const READ1: &str = "test_data_R1.fastq.gz";
const READ2: &str = "test_data_R2.fastq.gz";
const UNMETHYLATED_CONTROL: &str = "0.005";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepKind {
    DmrFind,
    BuildReference,
    SingleEndPipeline,
    BamQualityFilter,
    PairedEndPipeline,
    CallMethylationState,
}

impl StepKind {
    pub fn subcommand(&self) -> &'static str {
        match self {
            StepKind::DmrFind => "DMRfind",
            StepKind::BuildReference => "build-reference",
            StepKind::SingleEndPipeline => "single-end-pipeline",
            StepKind::BamQualityFilter => "bam-quality-filter",
            StepKind::PairedEndPipeline => "paired-end-pipeline",
            StepKind::CallMethylationState => "call-methylation-state",
        }
    }
}

impl Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.subcommand())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    File,
    Bam,
}

/// A file a step is expected to leave behind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    pub path: PathBuf,
    pub kind: ArtifactKind,
}

impl Artifact {
    pub fn file<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            kind: ArtifactKind::File,
        }
    }

    pub fn bam<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            kind: ArtifactKind::Bam,
        }
    }
}

/// One methylpy invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Step {
    pub kind: StepKind,
    pub label: String,
    // Arguments after the methylpy executable, starting with the subcommand
    pub args: Vec<String>,
    pub artifacts: Vec<Artifact>,
}

impl Step {
    fn new(kind: StepKind, label: String) -> Self {
        Self {
            kind,
            label,
            args: vec![kind.subcommand().to_string()],
            artifacts: Vec::new(),
        }
    }

    fn arg<S: Into<String>>(mut self, name: &str, value: S) -> Self {
        self.args.push(name.to_string());
        self.args.push(value.into());
        self
    }

    fn arg_list<I, S>(mut self, name: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.push(name.to_string());
        self.args.extend(values.into_iter().map(Into::into));
        self
    }

    fn path_arg(self, name: &str, value: &Path) -> Self {
        self.arg(name, value.display().to_string())
    }

    fn produces(mut self, artifact: Artifact) -> Self {
        self.artifacts.push(artifact);
        self
    }

    pub fn command_line(&self, methylpy: &Path) -> String {
        shell_join(&methylpy.display().to_string(), &self.args)
    }
}

fn sample_name(paired: bool, aligner: Aligner) -> String {
    let layout = if paired { "pe" } else { "se" };
    format!("{}_{}", layout, aligner.sample_suffix())
}

fn processed_bam(config: &SuiteConfig, sample: &str) -> PathBuf {
    config.results_file(&format!("{}_processed_reads.bam", sample))
}

fn allc_file(config: &SuiteConfig, sample: &str) -> PathBuf {
    config.results_file(&format!("allc_{}.tsv.gz", sample))
}

fn dmr_find(config: &SuiteConfig) -> Step {
    let allc_files = DMR_SAMPLES
        .iter()
        .map(|s| config.data_file(&format!("allc_{}.tsv.gz", s)).display().to_string());

    Step::new(StepKind::DmrFind, "DMRfind".to_string())
        .arg_list("--allc-files", allc_files)
        .arg_list("--samples", DMR_SAMPLES)
        .arg("--mc-type", "CGN")
        .arg("--chroms", "1")
        .arg("--num-procs", config.num_procs.to_string())
        .arg(
            "--output-prefix",
            config.results_file("DMR_P0_FBvsHT").display().to_string(),
        )
}

fn build_reference(config: &SuiteConfig, toolchain: &Toolchain, aligner: Aligner) -> Step {
    let index = |reference: PathBuf| {
        let mut name = reference.into_os_string();
        name.push(format!(".1.{}", aligner.index_extension()));
        Artifact::file(name)
    };

    Step::new(
        StepKind::BuildReference,
        format!("build-reference with {}", aligner),
    )
    .path_arg("--input-files", &config.ref_fasta())
    .path_arg("--output-prefix", &config.reference_prefix)
    .arg("--bowtie2", py_bool(aligner.is_bowtie2()))
    .arg("--path-to-aligner", toolchain.aligner(aligner).dir_arg())
    .produces(index(config.forward_reference()))
    .produces(index(config.reverse_reference()))
}

fn pipeline(config: &SuiteConfig, toolchain: &Toolchain, aligner: Aligner, paired: bool) -> Step {
    let sample = sample_name(paired, aligner);
    let (kind, label) = if paired {
        (StepKind::PairedEndPipeline, format!("paired-end-pipeline with {}", aligner))
    } else {
        (StepKind::SingleEndPipeline, format!("single-end-pipeline with {}", aligner))
    };

    let step = Step::new(kind, label);
    let step = if paired {
        step.path_arg("--read1-files", &config.data_file(READ1))
            .path_arg("--read2-files", &config.data_file(READ2))
    } else {
        step.path_arg("--read-files", &config.data_file(READ1))
    };

    step.arg("--sample", sample.as_str())
        .arg("--path-to-output", dir_arg(&config.results_dir))
        .path_arg("--forward-ref", &config.forward_reference())
        .path_arg("--reverse-ref", &config.reverse_reference())
        .path_arg("--ref-fasta", &config.ref_fasta())
        .arg("--num-procs", config.num_procs.to_string())
        .arg("--path-to-aligner", toolchain.aligner(aligner).dir_arg())
        .arg("--path-to-samtools", toolchain.samtools.dir_arg())
        .arg("--remove-clonal", py_bool(false))
        .arg("--trim-reads", py_bool(false))
        .arg("--binom-test", py_bool(true))
        .arg("--bowtie2", py_bool(aligner.is_bowtie2()))
        .arg("--unmethylated-control", UNMETHYLATED_CONTROL)
        .produces(Artifact::bam(processed_bam(config, &sample)))
        .produces(Artifact::file(allc_file(config, &sample)))
}

fn bam_quality_filter(config: &SuiteConfig, toolchain: &Toolchain, aligner: Aligner) -> Step {
    let sample = sample_name(false, aligner);
    let output = config.results_file(&format!("{}_processed_reads.filtered.bam", sample));

    Step::new(
        StepKind::BamQualityFilter,
        format!("quality filter for BAM file of single-end data ({})", aligner),
    )
    .path_arg("--input-file", &processed_bam(config, &sample))
    .path_arg("--output-file", &output)
    .path_arg("--ref-fasta", &config.ref_fasta())
    .arg("--path-to-samtools", toolchain.samtools.dir_arg())
    .arg("--quality-cutoff", "30")
    .arg("--min-num-ch", "3")
    .arg("--max-mch-level", "0.7")
    .arg("--buffer-line-number", "100")
    .produces(Artifact::bam(output))
}

fn call_methylation_state(config: &SuiteConfig, toolchain: &Toolchain, paired: bool) -> Step {
    // Prefer the bowtie alignments, as bowtie2 is the fallback aligner
    let aligner = if toolchain.bowtie.found() {
        Aligner::Bowtie
    } else {
        Aligner::Bowtie2
    };
    let sample = sample_name(paired, aligner);
    let layout = if paired { "paired-end" } else { "single-end" };

    Step::new(
        StepKind::CallMethylationState,
        format!("call-methylation-state for {} data", layout),
    )
    .path_arg("--input-file", &processed_bam(config, &sample))
    .arg("--paired-end", py_bool(paired))
    .arg("--sample", sample.as_str())
    .arg("--path-to-output", dir_arg(&config.results_dir))
    .path_arg("--ref-fasta", &config.ref_fasta())
    .arg("--num-procs", config.num_procs.to_string())
    .arg("--path-to-samtools", toolchain.samtools.dir_arg())
    .arg("--binom-test", py_bool(true))
    .arg("--unmethylated-control", UNMETHYLATED_CONTROL)
    .produces(Artifact::file(allc_file(config, &sample)))
}

/// Lay out the methylpy invocations for the available aligners.
///
/// Later steps consume the output of earlier ones: the pipelines need the
/// converted reference, the quality filter and the methylation calls need the
/// pipeline BAMs. The order of the returned steps is the order they must run in.
pub fn build_plan(config: &SuiteConfig, toolchain: &Toolchain) -> Vec<Step> {
    let aligners = toolchain.aligners();
    let mut steps = vec![dmr_find(config)];

    steps.extend(aligners.iter().map(|a| build_reference(config, toolchain, *a)));
    steps.extend(aligners.iter().map(|a| pipeline(config, toolchain, *a, false)));
    steps.extend(aligners.iter().map(|a| bam_quality_filter(config, toolchain, *a)));
    steps.extend(aligners.iter().map(|a| pipeline(config, toolchain, *a, true)));

    if !aligners.is_empty() {
        steps.push(call_methylation_state(config, toolchain, false));
        steps.push(call_methylation_state(config, toolchain, true));
    }
    steps
}
