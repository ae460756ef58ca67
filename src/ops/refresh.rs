//! Implementation of `kiln refresh`, the command every regeneration rule
//! runs.

use std::path::Path;

use anyhow::{bail, Result};

use crate::core::environment::Environment;
use crate::ops::generate::{generate, GenerateOptions, GenerateReport};
use crate::util::diagnostic::suggestions;
use crate::util::fs::absolute_path;

/// Load the environment of `build_dir`, failing helpfully when it was
/// never configured.
pub fn load_environment(build_dir: &Path) -> Result<Environment> {
    let build_dir = absolute_path(build_dir)?;
    if !Environment::exists(&build_dir) {
        bail!(
            "`{}` is not a configured build directory\n\
             hint: {}",
            build_dir.display(),
            suggestions::NOT_CONFIGURED
        );
    }
    Environment::load(&build_dir)
}

/// Regenerate the build files of a configured build directory.
pub fn refresh(build_dir: &Path) -> Result<GenerateReport> {
    let env = load_environment(build_dir)?;
    generate(&GenerateOptions {
        src_dir: env.src_dir,
        build_dir: env.build_dir,
        backend: env.backend,
        kiln_exe: env.kiln_exe,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendId;
    use crate::ops::configure::{configure, ConfigureOptions};
    use crate::test_support::fixtures;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_refresh_picks_up_new_source() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        let build = tmp.path().join("build");
        fixtures::write_hello(&src);
        configure(&ConfigureOptions {
            src_dir: src.clone(),
            build_dir: build.clone(),
            backend: Some(BackendId::Ninja),
            kiln_exe: PathBuf::from("/usr/bin/kiln"),
        })
        .unwrap();

        std::fs::write(src.join("src/hello/c.cpp"), "int c() { return 3; }\n").unwrap();
        let report = refresh(&build).unwrap();
        assert_eq!(report.backend, BackendId::Ninja);
        assert_eq!(report.divergences.len(), 1);

        let ninja = std::fs::read_to_string(build.join("build.ninja")).unwrap();
        assert_eq!(ninja.lines().filter(|l| l.contains(": cxx ")).count(), 3);
    }

    #[test]
    fn test_refresh_unconfigured() {
        let tmp = TempDir::new().unwrap();
        let err = refresh(tmp.path()).unwrap_err();
        assert!(err.to_string().contains("not a configured build directory"));
    }
}
