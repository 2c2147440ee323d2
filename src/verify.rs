use anyhow::{Context, Result, bail};
use log::debug;
use noodles::{bam, sam};
use std::fs::File;
use std::path::Path;

use crate::plan::{Artifact, ArtifactKind};

/// Check that a step left the file it was supposed to write.
pub fn verify_artifact(artifact: &Artifact) -> Result<()> {
    let path = artifact.path.as_path();
    let meta = std::fs::metadata(path)
        .with_context(|| format!("Expected output is missing: {}", path.display()))?;

    if !meta.is_file() {
        bail!("Expected output is not a file: {}", path.display());
    }
    if meta.len() == 0 {
        bail!("Expected output is empty: {}", path.display());
    }

    if artifact.kind == ArtifactKind::Bam {
        let header = bam_header(path)?;
        debug!(
            "{} has {} reference sequences",
            path.display(),
            header.reference_sequences().len()
        );
    }
    Ok(())
}

/// Read the header of a BAM file, failing if it is not BAM.
pub fn bam_header(path: &Path) -> Result<sam::Header> {
    let mut reader = File::open(path)
        .map(bam::io::Reader::new)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let header = reader
        .read_header()
        .with_context(|| format!("Failed to read BAM header from {}", path.display()))?;
    Ok(header)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::num::NonZeroUsize;

    use sam::header::record::value::{Map, map::ReferenceSequence};

    fn write_bam(path: &Path) {
        let length = NonZeroUsize::new(25_000).unwrap();
        let header = sam::Header::builder()
            .add_reference_sequence("chrL", Map::<ReferenceSequence>::new(length))
            .build();

        let mut writer = bam::io::Writer::new(File::create(path).unwrap());
        writer.write_header(&header).unwrap();
        drop(writer);
    }

    #[test]
    fn valid_bam_passes() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("se_bt_processed_reads.bam");
        write_bam(&path);

        verify_artifact(&Artifact::bam(&path)).unwrap();
        let header = bam_header(&path).unwrap();
        assert_eq!(header.reference_sequences().len(), 1);
    }

    #[test]
    fn text_file_is_not_bam() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("fake.bam");
        std::fs::write(&path, "not a bam file\n").unwrap();

        assert!(verify_artifact(&Artifact::file(&path)).is_ok());
        assert!(verify_artifact(&Artifact::bam(&path)).is_err());
    }

    #[test]
    fn missing_and_empty_files_fail() {
        let temp = tempfile::tempdir().unwrap();
        let missing = temp.path().join("allc_se_bt.tsv.gz");
        let err = verify_artifact(&Artifact::file(&missing)).unwrap_err();
        assert!(err.to_string().contains("missing"));

        let empty = temp.path().join("chrL_f.1.ebwt");
        std::fs::write(&empty, "").unwrap();
        let err = verify_artifact(&Artifact::file(&empty)).unwrap_err();
        assert!(err.to_string().contains("empty"));

        let err = verify_artifact(&Artifact::file(temp.path())).unwrap_err();
        assert!(err.to_string().contains("not a file"));
    }
}
