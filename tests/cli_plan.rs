use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

#[test]
fn plan_prints_every_methylpy_command() {
    let mut cmd = Command::cargo_bin("methylcheck").expect("binary exists");
    cmd.arg("plan");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains(
            "methylpy DMRfind --allc-files data/allc_P0_FB_1.tsv.gz",
        ))
        .stdout(predicate::str::contains("# build-reference with bowtie2"))
        .stdout(predicate::str::contains(
            "methylpy build-reference --input-files data/chrL.fa --output-prefix chrL/chrL --bowtie2 False --path-to-aligner ''",
        ))
        .stdout(predicate::str::contains("--sample pe_bt2 "))
        .stdout(predicate::str::contains("# call-methylation-state for paired-end data"));
}

#[test]
fn plan_for_bowtie2_only() {
    let mut cmd = Command::cargo_bin("methylcheck").expect("binary exists");
    cmd.arg("plan")
        .arg("--aligner").arg("bowtie2")
        .arg("--num-procs").arg("4")
        .arg("--path-to-samtools").arg("/opt/samtools/bin");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("--sample se_bt2 "))
        .stdout(predicate::str::contains("--sample se_bt ").not())
        .stdout(predicate::str::contains("--num-procs 4"))
        .stdout(predicate::str::contains("--path-to-samtools /opt/samtools/bin"));
}

#[test]
fn plan_as_json() {
    let mut cmd = Command::cargo_bin("methylcheck").expect("binary exists");
    let output = cmd
        .arg("plan")
        .arg("--aligner").arg("bowtie")
        .arg("--json")
        .output()
        .expect("run methylcheck");
    assert!(output.status.success());

    let steps: serde_json::Value = serde_json::from_slice(&output.stdout).expect("valid json");
    let steps = steps.as_array().expect("array of steps");
    assert_eq!(steps.len(), 7);
    assert_eq!(steps[0]["kind"], "dmr-find");
    assert_eq!(steps[2]["artifacts"][0]["path"], "results/se_bt_processed_reads.bam");
    assert_eq!(steps[2]["artifacts"][0]["kind"], "bam");
}

#[test]
fn plan_reads_config_file() {
    let temp = assert_fs::TempDir::new().unwrap();
    let config = temp.path().join("suite.json");
    std::fs::write(
        &config,
        r#"{"results-dir": "out", "reference-prefix": "ref/lambda", "methylpy": "/opt/methylpy/bin/methylpy"}"#,
    )
    .unwrap();

    let mut cmd = Command::cargo_bin("methylcheck").expect("binary exists");
    cmd.arg("plan").arg("--config").arg(&config).arg("--results-dir").arg("override");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("/opt/methylpy/bin/methylpy DMRfind"))
        .stdout(predicate::str::contains("--forward-ref ref/lambda_f"))
        .stdout(predicate::str::contains("--path-to-output override/"))
        .stdout(predicate::str::contains("--path-to-output out/").not());
}

#[test]
fn zero_processes_is_rejected() {
    let mut cmd = Command::cargo_bin("methylcheck").expect("binary exists");
    cmd.arg("plan").arg("--num-procs").arg("0");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("--num-procs must be at least 1"));
}
