// SPDX-License-Identifier: Apache-2.0

//! Bundle assembly: gzip-compressed tar whose root directory matches the
//! `.tar.gz` filename stem.

use flate2::write::GzEncoder;
use flate2::Compression;
use vda_model::Job;

#[derive(Debug, thiserror::Error)]
pub enum BundleError {
    #[error("archive write failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("manifest serialization failed: {0}")]
    Manifest(#[from] serde_json::Error),
}

/// Build `(filename, bytes)` for one job. Every artifact becomes a
/// regular 0o644 tar entry; `studio_artifact_manifest.json` sits at the
/// archive root.
pub fn build_bundle_bytes(job: &Job, root_stem: &str) -> Result<(String, Vec<u8>), BundleError> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);

    for file_artifact in &job.files {
        let rel = file_artifact.path.trim().trim_start_matches('/');
        if rel.is_empty() || rel == "." {
            continue;
        }
        append_entry(
            &mut builder,
            &format!("{root_stem}/{rel}"),
            file_artifact.content.as_bytes(),
        )?;
    }

    let manifest = serde_json::to_vec_pretty(&job.artifact_manifest)?;
    append_entry(
        &mut builder,
        &format!("{root_stem}/studio_artifact_manifest.json"),
        &manifest,
    )?;

    let encoder = builder.into_inner()?;
    let bytes = encoder.finish()?;
    Ok((format!("{root_stem}.tar.gz"), bytes))
}

fn append_entry<W: std::io::Write>(
    builder: &mut tar::Builder<W>,
    path: &str,
    body: &[u8],
) -> Result<(), std::io::Error> {
    let mut header = tar::Header::new_gnu();
    header.set_mode(0o644);
    header.set_size(body.len() as u64);
    header.set_cksum();
    builder.append_data(&mut header, path, body)
}

#[cfg(test)]
mod tests {
    use super::build_bundle_bytes;
    use flate2::read::GzDecoder;
    use std::collections::BTreeSet;
    use std::io::Read;
    use vda_model::{FileArtifact, Job};

    #[test]
    fn bundle_round_trips_with_manifest_at_root() {
        let mut job = Job::default();
        job.files.push(FileArtifact {
            path: "apps/demo/README.md".to_string(),
            language: "markdown".to_string(),
            content: "# Demo".to_string(),
        });
        job.files.push(FileArtifact {
            path: String::new(),
            language: "text".to_string(),
            content: "skipped".to_string(),
        });

        let (filename, bytes) = build_bundle_bytes(&job, "demo-job_1").expect("bundle");
        assert_eq!(filename, "demo-job_1.tar.gz");

        let mut archive = tar::Archive::new(GzDecoder::new(bytes.as_slice()));
        let mut seen = BTreeSet::new();
        for entry in archive.entries().expect("entries") {
            let mut entry = entry.expect("entry");
            let path = entry.path().expect("path").to_string_lossy().to_string();
            assert!(path.starts_with("demo-job_1/"), "entry outside root: {path}");
            assert_eq!(entry.header().mode().expect("mode") & 0o777, 0o644);
            if path.ends_with("README.md") {
                let mut content = String::new();
                entry.read_to_string(&mut content).expect("read entry");
                assert_eq!(content, "# Demo");
            }
            seen.insert(path);
        }
        assert!(seen.contains("demo-job_1/apps/demo/README.md"));
        assert!(seen.contains("demo-job_1/studio_artifact_manifest.json"));
        assert_eq!(seen.len(), 2, "empty paths are skipped");
    }
}
