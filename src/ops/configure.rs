//! Implementation of `kiln configure`.

use std::path::PathBuf;

use anyhow::{bail, Result};

use crate::backend::BackendId;
use crate::core::environment::Environment;
use crate::core::project::PROJECT_FILE;
use crate::ops::generate::{generate, GenerateOptions, GenerateReport};
use crate::util::config::{project_config_path, Config};
use crate::util::diagnostic::suggestions;
use crate::util::fs::absolute_path;

/// Options for configuring a build directory.
#[derive(Debug, Clone)]
pub struct ConfigureOptions {
    pub src_dir: PathBuf,
    pub build_dir: PathBuf,

    /// Explicit backend; falls back to the project config, then make
    pub backend: Option<BackendId>,

    pub kiln_exe: PathBuf,
}

/// Set up `build_dir` for the project in `src_dir` and generate its build
/// file.
pub fn configure(opts: &ConfigureOptions) -> Result<GenerateReport> {
    let src_dir = absolute_path(&opts.src_dir)?;
    let build_dir = absolute_path(&opts.build_dir)?;

    if src_dir == build_dir {
        bail!(
            "source and build directories must be different: {}",
            src_dir.display()
        );
    }
    if !src_dir.join(PROJECT_FILE).is_file() {
        bail!(
            "source directory `{}` has no {}\n\
             hint: {}",
            src_dir.display(),
            PROJECT_FILE,
            suggestions::NO_PROJECT
        );
    }
    if build_dir.join(PROJECT_FILE).exists() {
        bail!(
            "build directory `{}` contains a {}\n\
             hint: pass a separate, empty directory as the build directory",
            build_dir.display(),
            PROJECT_FILE
        );
    }

    let config = Config::load_or_default(&project_config_path(&src_dir));
    let backend = opts.backend.or_else(|| config.backend()).unwrap_or_default();

    if Environment::exists(&build_dir) {
        tracing::info!("reconfiguring {}", build_dir.display());
    }

    let report = generate(&GenerateOptions {
        src_dir: src_dir.clone(),
        build_dir: build_dir.clone(),
        backend,
        kiln_exe: opts.kiln_exe.clone(),
    })?;

    Environment::new(src_dir, build_dir, backend, opts.kiln_exe.clone()).save()?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::fixtures;
    use tempfile::TempDir;

    fn options(src: PathBuf, build: PathBuf) -> ConfigureOptions {
        ConfigureOptions {
            src_dir: src,
            build_dir: build,
            backend: None,
            kiln_exe: PathBuf::from("/usr/bin/kiln"),
        }
    }

    #[test]
    fn test_configure_writes_environment() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        let build = tmp.path().join("build");
        fixtures::write_hello(&src);

        let report = configure(&options(src.clone(), build.clone())).unwrap();
        assert_eq!(report.backend, BackendId::Make);
        assert!(build.join("Makefile").is_file());

        let env = Environment::load(&build).unwrap();
        assert_eq!(env.src_dir, src.canonicalize().unwrap());
        assert_eq!(env.backend, BackendId::Make);
    }

    #[test]
    fn test_config_file_picks_backend() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        let build = tmp.path().join("build");
        fixtures::write_hello(&src);
        let mut config = Config::default();
        config.build.backend = Some("ninja".to_string());
        config.save(&project_config_path(&src)).unwrap();

        let report = configure(&options(src, build.clone())).unwrap();
        assert_eq!(report.backend, BackendId::Ninja);
        assert!(build.join("build.ninja").is_file());
    }

    #[test]
    fn test_same_directory_rejected() {
        let tmp = TempDir::new().unwrap();
        fixtures::write_hello(tmp.path());
        let err = configure(&options(tmp.path().into(), tmp.path().into())).unwrap_err();
        assert!(err.to_string().contains("must be different"));
    }

    #[test]
    fn test_missing_description_rejected() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        std::fs::create_dir_all(&src).unwrap();
        let err = configure(&options(src, tmp.path().join("build"))).unwrap_err();
        assert!(err.to_string().contains("has no kiln.toml"));
    }

    #[test]
    fn test_build_dir_with_description_rejected() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        let build = tmp.path().join("build");
        fixtures::write_hello(&src);
        fixtures::write_hello(&build);
        let err = configure(&options(src, build)).unwrap_err();
        assert!(err.to_string().contains("contains a kiln.toml"));
    }
}
