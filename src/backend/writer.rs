//! Atomic artifact writing.

use crate::backend::{Artifact, EmitError};

/// Write every artifact in place. Each file is written to a temporary in
/// its destination directory and renamed over the target, so a failure
/// never leaves a partial build file behind.
pub fn write_artifacts(artifacts: &[Artifact]) -> Result<(), EmitError> {
    for artifact in artifacts {
        crate::util::fs::write_atomic(&artifact.path, artifact.contents.as_bytes()).map_err(
            |source| EmitError::Io {
                path: artifact.path.clone(),
                source,
            },
        )?;
        tracing::debug!(
            "wrote {} ({} bytes)",
            artifact.path.display(),
            artifact.contents.len()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_replaces_existing_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("build.ninja");
        std::fs::write(&path, "old").unwrap();

        write_artifacts(&[Artifact {
            path: path.clone(),
            contents: "new\n".to_string(),
        }])
        .unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new\n");

        // Only the artifact remains in the directory.
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_failure_names_path() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("blocker"), "").unwrap();
        let path = tmp.path().join("blocker/Makefile");
        let err = write_artifacts(&[Artifact {
            path: path.clone(),
            contents: String::new(),
        }])
        .unwrap_err();
        assert!(matches!(err, EmitError::Io { path: ref p, .. } if *p == path));
    }
}
