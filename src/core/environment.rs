//! The configured state of a build directory.
//!
//! `kiln configure` writes `.kiln/environment.toml` into the build
//! directory; `kiln refresh` and `kiln check` read it back so they can run
//! with nothing but the build directory on the command line.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::backend::BackendId;
use crate::core::project::PROJECT_FILE;

/// Directory under the build directory holding kiln's own state.
pub const STATE_DIR: &str = ".kiln";

const ENVIRONMENT_FILE: &str = "environment.toml";

/// Bumped when the layout of the file changes incompatibly.
const ENVIRONMENT_VERSION: u32 = 1;

/// Everything needed to regenerate a build directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    pub version: u32,

    /// Absolute source directory
    pub src_dir: PathBuf,

    /// Absolute build directory
    pub build_dir: PathBuf,

    pub backend: BackendId,

    /// Description file name, relative to `src_dir`
    pub project_file: String,

    /// The executable the regeneration rule re-invokes
    pub kiln_exe: PathBuf,
}

impl Environment {
    pub fn new(src_dir: PathBuf, build_dir: PathBuf, backend: BackendId, kiln_exe: PathBuf) -> Self {
        Environment {
            version: ENVIRONMENT_VERSION,
            src_dir,
            build_dir,
            backend,
            project_file: PROJECT_FILE.to_string(),
            kiln_exe,
        }
    }

    /// Path of the environment file for `build_dir`.
    pub fn path(build_dir: &Path) -> PathBuf {
        build_dir.join(STATE_DIR).join(ENVIRONMENT_FILE)
    }

    /// Whether `build_dir` has been configured.
    pub fn exists(build_dir: &Path) -> bool {
        Self::path(build_dir).is_file()
    }

    pub fn load(build_dir: &Path) -> Result<Self> {
        let path = Self::path(build_dir);
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read environment: {}", path.display()))?;
        let env: Environment = toml::from_str(&contents)
            .with_context(|| format!("failed to parse environment: {}", path.display()))?;

        if env.version != ENVIRONMENT_VERSION {
            anyhow::bail!(
                "environment at {} has version {}, expected {}; re-run `kiln configure`",
                path.display(),
                env.version,
                ENVIRONMENT_VERSION
            );
        }
        Ok(env)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::path(&self.build_dir);
        let contents =
            toml::to_string_pretty(self).with_context(|| "failed to serialize environment")?;
        crate::util::fs::write_string(&path, &contents)
    }

    /// Absolute path of the description file.
    pub fn project_path(&self) -> PathBuf {
        self.src_dir.join(&self.project_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_environment_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let build = tmp.path().join("build");
        let env = Environment::new(
            tmp.path().join("src"),
            build.clone(),
            BackendId::Ninja,
            PathBuf::from("/usr/bin/kiln"),
        );

        assert!(!Environment::exists(&build));
        env.save().unwrap();
        assert!(Environment::exists(&build));

        let loaded = Environment::load(&build).unwrap();
        assert_eq!(loaded, env);
        assert_eq!(loaded.project_path(), tmp.path().join("src").join("kiln.toml"));
    }

    #[test]
    fn test_environment_version_mismatch() {
        let tmp = TempDir::new().unwrap();
        let mut env = Environment::new(
            tmp.path().join("src"),
            tmp.path().to_path_buf(),
            BackendId::Make,
            PathBuf::from("kiln"),
        );
        env.version = 99;
        env.save().unwrap();

        let err = Environment::load(tmp.path()).unwrap_err();
        assert!(err.to_string().contains("version 99"));
    }
}
