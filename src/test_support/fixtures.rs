//! Test fixtures for common test scenarios.
//!
//! This module provides pre-built project descriptions and source trees
//! for the unit tests of discovery, assembly and the emitters.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// The canonical example: one executable built from a globbed directory,
/// with headers shipped but never compiled.
pub const HELLO_PROJECT: &str = r#"[project]
name = "hello"

[[target]]
name = "hello"
kind = "executable"
sources = [{ glob = "*.cpp", dirs = ["src/hello"], extra = "*.hpp" }]
"#;

/// Write the hello project and its sources under `root`.
pub fn write_hello(root: &Path) {
    ProjectFixture::new("hello")
        .with_manifest(HELLO_PROJECT)
        .with_source("src/hello/a.cpp", "int a() { return 1; }\n")
        .with_source(
            "src/hello/b.cpp",
            "#include \"util.hpp\"\nint main() { return util(); }\n",
        )
        .with_source("src/hello/util.hpp", "inline int util() { return 0; }\n")
        .write_to(root)
        .unwrap();
}

/// Fixture for a complete source tree.
#[derive(Debug, Clone)]
pub struct ProjectFixture {
    /// Project name.
    pub name: String,
    /// kiln.toml content.
    pub manifest: String,
    /// Files (path relative to the source root -> content).
    pub sources: BTreeMap<PathBuf, String>,
}

impl ProjectFixture {
    /// Create a new empty project fixture.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        ProjectFixture {
            manifest: format!("[project]\nname = \"{}\"\n", name),
            name,
            sources: BTreeMap::new(),
        }
    }

    /// A single C executable built from `src/*.c`.
    pub fn executable(name: impl Into<String>) -> Self {
        let fixture = Self::new(name);
        let manifest = format!(
            r#"{}
[toolchain]
os = "linux"

[[target]]
name = "{}"
kind = "executable"
sources = [{{ glob = "*.c", dirs = ["src"], extra = "*.h" }}]
"#,
            fixture.manifest, fixture.name
        );
        fixture
            .with_manifest(manifest)
            .with_source("src/main.c", "int main(void) { return 0; }\n")
    }

    /// Set the kiln.toml content.
    pub fn with_manifest(mut self, manifest: impl Into<String>) -> Self {
        self.manifest = manifest.into();
        self
    }

    /// Add a file.
    pub fn with_source(mut self, path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        self.sources.insert(path.into(), content.into());
        self
    }

    /// Write the fixture to `base_path`, returning the kiln.toml path.
    pub fn write_to(&self, base_path: &Path) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(base_path)?;
        let manifest = base_path.join(crate::core::PROJECT_FILE);
        std::fs::write(&manifest, &self.manifest)?;

        for (path, content) in &self.sources {
            let full = base_path.join(path);
            if let Some(parent) = full.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(full, content)?;
        }
        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_hello() {
        let tmp = TempDir::new().unwrap();
        write_hello(tmp.path());
        assert!(tmp.path().join("kiln.toml").is_file());
        assert!(tmp.path().join("src/hello/a.cpp").is_file());
        assert!(tmp.path().join("src/hello/util.hpp").is_file());
    }

    #[test]
    fn test_executable_fixture_parses() {
        let fixture = ProjectFixture::executable("app");
        let project =
            crate::core::Project::parse(&fixture.manifest, Path::new("kiln.toml")).unwrap();
        assert_eq!(project.name, "app");
        assert_eq!(project.toolchain.os, "linux");
    }
}
