//! Backend capability types - hard constraints on what backends can do.
//!
//! Capabilities are immutable facts about a build tool's file format.
//! Anything a backend cannot express is enumerated as a [`Construct`] and
//! rejected before any text is produced.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::backend::EmitError;
use crate::graph::FrozenGraph;

/// Unique identifier for a backend.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum BackendId {
    /// POSIX make
    #[default]
    Make,
    Ninja,
    /// MSBuild project file
    MsBuild,
}

impl BackendId {
    pub const ALL: [BackendId; 3] = [BackendId::Make, BackendId::Ninja, BackendId::MsBuild];

    /// Get the backend name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendId::Make => "make",
            BackendId::Ninja => "ninja",
            BackendId::MsBuild => "msbuild",
        }
    }

    /// Name of the build file written into the build directory.
    pub fn output_file(&self) -> &'static str {
        match self {
            BackendId::Make => "Makefile",
            BackendId::Ninja => "build.ninja",
            BackendId::MsBuild => "kiln.proj",
        }
    }

    /// Executable that consumes the build file.
    pub fn tool(&self) -> &'static str {
        match self {
            BackendId::Make => "make",
            BackendId::Ninja => "ninja",
            BackendId::MsBuild => "msbuild",
        }
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for BackendId {
    type Err = BackendIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "make" => Ok(BackendId::Make),
            "ninja" => Ok(BackendId::Ninja),
            "msbuild" => Ok(BackendId::MsBuild),
            _ => Err(BackendIdParseError(s.to_string())),
        }
    }
}

/// Error returned when parsing an invalid backend ID.
#[derive(Debug, Clone)]
pub struct BackendIdParseError(pub String);

impl fmt::Display for BackendIdParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid backend '{}', valid values: make, ninja, msbuild",
            self.0
        )
    }
}

impl std::error::Error for BackendIdParseError {}

/// A graph feature some backend cannot encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Construct {
    /// A path containing a line break
    NewlineInPath,
    /// A compiler-written dependency file
    Depfile,
    /// A phony target whose name starts with `.`
    DotPhony,
    /// A command spanning several lines
    MultilineCommand,
}

impl Construct {
    pub fn as_str(&self) -> &'static str {
        match self {
            Construct::NewlineInPath => "newline in path",
            Construct::Depfile => "depfile",
            Construct::DotPhony => "phony target starting with `.`",
            Construct::MultilineCommand => "multi-line command",
        }
    }
}

impl fmt::Display for Construct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a build file format can express natively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capabilities {
    /// Ordering-only prerequisites (`|` / `||`)
    pub order_only: bool,
    /// One rule producing several files
    pub multiple_outputs: bool,
    /// Outputs created without being named on the command line
    pub implicit_outputs: bool,
    /// Compiler-written header dependencies
    pub depfiles: bool,
    /// Phony names may begin with `.`
    pub dot_phony: bool,
    /// Commands may span lines
    pub multiline_commands: bool,
    /// Creates output directories itself
    pub creates_directories: bool,
}

impl Capabilities {
    pub fn for_backend(id: BackendId) -> Self {
        match id {
            BackendId::Make => Capabilities {
                order_only: true,
                multiple_outputs: false,
                implicit_outputs: false,
                depfiles: true,
                dot_phony: false,
                multiline_commands: true,
                creates_directories: false,
            },
            BackendId::Ninja => Capabilities {
                order_only: true,
                multiple_outputs: true,
                implicit_outputs: true,
                depfiles: true,
                dot_phony: true,
                multiline_commands: false,
                creates_directories: true,
            },
            BackendId::MsBuild => Capabilities {
                order_only: false,
                multiple_outputs: true,
                implicit_outputs: true,
                depfiles: false,
                dot_phony: true,
                multiline_commands: true,
                creates_directories: false,
            },
        }
    }

    /// Reject the first construct in `graph` this backend cannot encode.
    pub fn check(&self, backend: BackendId, graph: &FrozenGraph) -> Result<(), EmitError> {
        let unsupported = |construct: Construct, target: &str| EmitError::UnsupportedConstruct {
            backend,
            construct,
            target: target.to_string(),
        };

        if let Some(path) = graph.paths().find(|p| p.has_newline()) {
            return Err(unsupported(Construct::NewlineInPath, path.suffix()));
        }

        for (_, target) in graph.targets() {
            if !self.dot_phony && target.is_phony() && target.name.starts_with('.') {
                return Err(unsupported(Construct::DotPhony, &target.name));
            }
            let Some(rule) = target.rule.as_deref().and_then(|r| graph.rule(r)) else {
                continue;
            };
            if !self.depfiles && rule.depfile.is_some() {
                return Err(unsupported(Construct::Depfile, &target.name));
            }
            if !self.multiline_commands && rule.command.is_multiline() {
                return Err(unsupported(Construct::MultilineCommand, &target.name));
            }
        }
        Ok(())
    }
}
