#![allow(dead_code)]

use std::path::{Path, PathBuf};

#[cfg(unix)]
pub fn write_stub(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).expect("write stub");
    let mut perms = std::fs::metadata(&path).expect("metadata").permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).expect("chmod stub");
    path
}

/// A fake installation: methylpy logs its arguments to `$METHYLPY_STUB_LOG` and
/// exits with 3 when its subcommand equals `$METHYLPY_STUB_FAIL`.
#[cfg(unix)]
pub fn fake_install(dir: &Path, aligners: &[&str]) {
    write_stub(
        dir,
        "methylpy",
        r#"echo "$@" >> "$METHYLPY_STUB_LOG"
if [ "$1" = "$METHYLPY_STUB_FAIL" ]; then
  echo "methylpy $1 failed" >&2
  exit 3
fi
exit 0"#,
    );
    write_stub(dir, "python", "exit 0");
    write_stub(dir, "samtools", "echo 'samtools 1.17'\necho 'Using htslib 1.17'");
    for aligner in aligners {
        let version = if *aligner == "bowtie2" { "2.5.1" } else { "1.3.1" };
        write_stub(
            dir,
            aligner,
            &format!("echo '/usr/bin/{}-align-s version {}'", aligner, version),
        );
    }
}

pub fn invocations(log: &Path) -> Vec<String> {
    std::fs::read_to_string(log)
        .unwrap_or_default()
        .lines()
        .map(|l| l.to_string())
        .collect()
}

pub fn subcommands(log: &Path) -> Vec<String> {
    invocations(log)
        .iter()
        .filter_map(|l| l.split(' ').next().map(|s| s.to_string()))
        .collect()
}
