//! Target definitions - the nodes of the build graph that get built.
//!
//! A Target is an executable, library, object file, custom rule invocation
//! or phony grouping. File groups are not targets: they are flattened into
//! ordinary input lists during graph assembly.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::path::BuildPath;

/// How a library is linked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    /// Static library (.a / .lib)
    #[default]
    #[serde(alias = "staticlib")]
    Static,

    /// Shared/dynamic library (.so / .dylib / .dll)
    #[serde(alias = "dylib", alias = "dynamic")]
    Shared,
}

/// The kind of target being built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKind {
    /// Executable binary
    Executable,
    /// Library with the given link kind
    Library(LinkKind),
    /// A compiled object file feeding a link step
    Object,
    /// A user-defined rule invocation
    Custom,
    /// Groups other targets, produces no file
    Phony,
}

impl TargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKind::Executable => "executable",
            TargetKind::Library(LinkKind::Static) => "static-library",
            TargetKind::Library(LinkKind::Shared) => "shared-library",
            TargetKind::Object => "object",
            TargetKind::Custom => "custom",
            TargetKind::Phony => "phony",
        }
    }

    /// Get the typical file extension for this target kind.
    pub fn extension(&self, os: &str) -> &'static str {
        match self {
            TargetKind::Executable => {
                if os == "windows" {
                    "exe"
                } else {
                    ""
                }
            }
            TargetKind::Library(LinkKind::Static) => {
                if os == "windows" {
                    "lib"
                } else {
                    "a"
                }
            }
            TargetKind::Library(LinkKind::Shared) => match os {
                "windows" => "dll",
                "macos" => "dylib",
                _ => "so",
            },
            TargetKind::Object => {
                if os == "windows" {
                    "obj"
                } else {
                    "o"
                }
            }
            TargetKind::Custom | TargetKind::Phony => "",
        }
    }

    /// Get the typical file prefix for this target kind.
    pub fn prefix(&self, os: &str) -> &'static str {
        match self {
            TargetKind::Library(_) if os != "windows" => "lib",
            _ => "",
        }
    }

    /// Get the output filename for a target.
    pub fn output_filename(&self, name: &str, os: &str) -> String {
        let prefix = self.prefix(os);
        let ext = self.extension(os);
        if ext.is_empty() {
            format!("{}{}", prefix, name)
        } else {
            format!("{}{}.{}", prefix, name, ext)
        }
    }

    pub fn is_library(&self) -> bool {
        matches!(self, TargetKind::Library(_))
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A build target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Unique identity within the graph
    pub name: String,

    pub kind: TargetKind,

    /// Rule used to build the outputs; `None` only for phony targets
    pub rule: Option<String>,

    /// Files produced, primary output first
    pub outputs: Vec<BuildPath>,

    /// Files produced but never named on the command line
    pub implicit_outputs: Vec<BuildPath>,

    /// Values for the rule's `{name}` placeholders
    pub variables: BTreeMap<String, String>,

    pub description: Option<String>,
}

impl Target {
    pub fn new(name: impl Into<String>, kind: TargetKind) -> Self {
        Target {
            name: name.into(),
            kind,
            rule: None,
            outputs: Vec::new(),
            implicit_outputs: Vec::new(),
            variables: BTreeMap::new(),
            description: None,
        }
    }

    /// Create a phony target.
    pub fn phony(name: impl Into<String>) -> Self {
        Self::new(name, TargetKind::Phony)
    }

    pub fn with_rule(mut self, rule: impl Into<String>) -> Self {
        self.rule = Some(rule.into());
        self
    }

    pub fn with_output(mut self, output: BuildPath) -> Self {
        self.outputs.push(output);
        self
    }

    pub fn with_outputs(mut self, outputs: impl IntoIterator<Item = BuildPath>) -> Self {
        self.outputs.extend(outputs);
        self
    }

    pub fn with_implicit_output(mut self, output: BuildPath) -> Self {
        self.implicit_outputs.push(output);
        self
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn is_phony(&self) -> bool {
        self.kind == TargetKind::Phony
    }

    pub fn primary_output(&self) -> Option<&BuildPath> {
        self.outputs.first()
    }

    /// Explicit and implicit outputs together.
    pub fn all_outputs(&self) -> impl Iterator<Item = &BuildPath> {
        self.outputs.iter().chain(self.implicit_outputs.iter())
    }

    /// Whether the build tool must track more than one produced file.
    pub fn has_multiple_outputs(&self) -> bool {
        self.outputs.len() + self.implicit_outputs.len() > 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_kind_extensions() {
        assert_eq!(TargetKind::Executable.extension("linux"), "");
        assert_eq!(TargetKind::Executable.extension("windows"), "exe");
        assert_eq!(TargetKind::Library(LinkKind::Static).extension("linux"), "a");
        assert_eq!(TargetKind::Library(LinkKind::Static).extension("windows"), "lib");
        assert_eq!(TargetKind::Library(LinkKind::Shared).extension("linux"), "so");
        assert_eq!(TargetKind::Library(LinkKind::Shared).extension("macos"), "dylib");
        assert_eq!(TargetKind::Object.extension("windows"), "obj");
    }

    #[test]
    fn test_output_filename() {
        assert_eq!(TargetKind::Executable.output_filename("hello", "linux"), "hello");
        assert_eq!(
            TargetKind::Executable.output_filename("hello", "windows"),
            "hello.exe"
        );
        assert_eq!(
            TargetKind::Library(LinkKind::Static).output_filename("util", "linux"),
            "libutil.a"
        );
        assert_eq!(
            TargetKind::Library(LinkKind::Shared).output_filename("util", "windows"),
            "util.dll"
        );
    }

    #[test]
    fn test_target_builder() {
        let target = Target::new("gen", TargetKind::Custom)
            .with_rule("protoc")
            .with_output(BuildPath::build("gen.cc").unwrap())
            .with_implicit_output(BuildPath::build("gen.h").unwrap());

        assert_eq!(target.primary_output().unwrap().suffix(), "gen.cc");
        assert!(target.has_multiple_outputs());
        assert_eq!(target.all_outputs().count(), 2);
        assert!(!target.is_phony());
    }
}
