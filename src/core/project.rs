//! kiln.toml project description parsing and schema.
//!
//! ```toml
//! [project]
//! name = "hello"
//!
//! [[rule]]
//! name = "stamp"
//! command = "touch {out}"
//!
//! [[target]]
//! name = "hello"
//! kind = "executable"
//! sources = [{ glob = "*.cpp", dirs = ["src/hello"], extra = "*.hpp" }]
//! ```
//!
//! The raw TOML shapes are private; [`Project::parse`] validates them into
//! the model graph assembly consumes.

use std::collections::{BTreeMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::core::path::{BuildPath, PathError};
use crate::core::rule::{check_variable_name, CommandTemplate, Rule, TemplateError};
use crate::core::target::LinkKind;
use crate::core::toolchain::{self, Toolchain};
use crate::discovery::{EntryKind, FindOptions, FindQuery};

/// File name of the project description.
pub const PROJECT_FILE: &str = "kiln.toml";

/// Phony target every Make and Ninja build file provides.
pub const CLEAN_TARGET: &str = "clean";

/// Rule names no project may declare.
const RESERVED_RULES: [&str; 3] = ["phony", "regenerate", CLEAN_TARGET];

/// Target names no project may declare.
const RESERVED_TARGETS: [&str; 1] = [CLEAN_TARGET];

/// A malformed or inconsistent project description.
#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("failed to read {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("duplicate {kind} `{name}`")]
    Duplicate { kind: &'static str, name: String },

    #[error("{kind} name `{name}` is reserved")]
    ReservedName { kind: &'static str, name: String },

    #[error("rule `{rule}` has an invalid command template")]
    Template {
        rule: String,
        #[source]
        source: TemplateError,
    },

    #[error("target `{target}` sets invalid variable `{name}`")]
    Variable {
        target: String,
        name: String,
        #[source]
        source: TemplateError,
    },

    #[error("invalid path in `{owner}`")]
    Path {
        owner: String,
        #[source]
        source: PathError,
    },

    #[error("target `{target}` is missing `{field}`")]
    MissingField { target: String, field: &'static str },

    #[error("target `{target}`: no rule to build `{path}` from its extension")]
    UnsupportedSource { target: String, path: String },

    #[error("target `{target}` does not set `{variable}` used by rule `{rule}`")]
    MissingVariable {
        target: String,
        rule: String,
        variable: String,
    },

    #[error("target `{target}` refers to `{name}`, which is not a file group")]
    NotAFileGroup { target: String, name: String },
}

/// Where a target's input files come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSpec {
    /// A single file relative to the source directory
    Path(BuildPath),
    /// Files found by a discovery query
    Glob { query: FindQuery, options: FindOptions },
    /// Every file of a named file group
    Group(String),
    /// The outputs of an earlier target
    Target(String),
}

/// Inputs shared by executables and libraries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BinarySpec {
    pub sources: Vec<SourceSpec>,
    /// Libraries to link, by target name
    pub libs: Vec<String>,
    pub order_only: Vec<String>,
    pub flags: String,
    pub ldflags: String,
}

/// A target built by a project-defined rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomSpec {
    pub rule: String,
    pub inputs: Vec<SourceSpec>,
    pub implicit: Vec<SourceSpec>,
    pub order_only: Vec<String>,
    /// Relative to the build directory
    pub outputs: Vec<BuildPath>,
    pub vars: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeclKind {
    Executable(BinarySpec),
    Library { link: LinkKind, spec: BinarySpec },
    Custom(CustomSpec),
    Alias { targets: Vec<String> },
    FileGroup { sources: Vec<SourceSpec> },
}

impl DeclKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeclKind::Executable(_) => "executable",
            DeclKind::Library { .. } => "library",
            DeclKind::Custom(_) => "custom",
            DeclKind::Alias { .. } => "alias",
            DeclKind::FileGroup { .. } => "file_group",
        }
    }
}

/// One `[[target]]` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetDecl {
    pub name: String,
    pub kind: DeclKind,
    /// Built by the `all` target
    pub default: bool,
    pub description: Option<String>,
}

/// A validated project description.
#[derive(Debug, Clone)]
pub struct Project {
    pub name: String,
    pub toolchain: Toolchain,
    pub rules: Vec<Rule>,
    /// In declaration order
    pub targets: Vec<TargetDecl>,
}

impl Project {
    /// Load a project from `<src_dir>/kiln.toml`.
    pub fn load(path: &Path) -> Result<Self, ProjectError> {
        let content = std::fs::read_to_string(path).map_err(|source| ProjectError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content, path)
    }

    /// Parse project content. `path` is only used in error messages.
    pub fn parse(content: &str, path: &Path) -> Result<Self, ProjectError> {
        let raw: RawProject = toml::from_str(content).map_err(|source| ProjectError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        let mut rule_names: HashSet<String> = HashSet::new();
        let mut rules = Vec::new();
        for raw_rule in raw.rules {
            if RESERVED_RULES.contains(&raw_rule.name.as_str())
                || toolchain::RULE_NAMES.contains(&raw_rule.name.as_str())
            {
                return Err(ProjectError::ReservedName {
                    kind: "rule",
                    name: raw_rule.name,
                });
            }
            if !rule_names.insert(raw_rule.name.clone()) {
                return Err(ProjectError::Duplicate {
                    kind: "rule",
                    name: raw_rule.name,
                });
            }
            rules.push(convert_rule(raw_rule)?);
        }

        let mut target_names: HashSet<String> = HashSet::new();
        let mut targets = Vec::new();
        for raw_target in raw.targets {
            if RESERVED_TARGETS.contains(&raw_target.name.as_str()) {
                return Err(ProjectError::ReservedName {
                    kind: "target",
                    name: raw_target.name,
                });
            }
            if !target_names.insert(raw_target.name.clone()) {
                return Err(ProjectError::Duplicate {
                    kind: "target",
                    name: raw_target.name,
                });
            }
            targets.push(convert_target(raw_target)?);
        }

        tracing::debug!(
            "parsed project `{}`: {} rules, {} targets",
            raw.project.name,
            rules.len(),
            targets.len()
        );

        Ok(Project {
            name: raw.project.name,
            toolchain: raw.toolchain,
            rules,
            targets,
        })
    }

    /// Find a declaration by name.
    pub fn target(&self, name: &str) -> Option<&TargetDecl> {
        self.targets.iter().find(|t| t.name == name)
    }

    /// Every discovery query the project makes, in declaration order.
    pub fn queries(&self) -> Vec<(&FindQuery, &FindOptions)> {
        let mut out = Vec::new();
        for decl in &self.targets {
            let lists: Vec<&Vec<SourceSpec>> = match &decl.kind {
                DeclKind::Executable(spec) | DeclKind::Library { spec, .. } => vec![&spec.sources],
                DeclKind::Custom(spec) => vec![&spec.inputs, &spec.implicit],
                DeclKind::FileGroup { sources } => vec![sources],
                DeclKind::Alias { .. } => vec![],
            };
            for spec in lists.into_iter().flatten() {
                if let SourceSpec::Glob { query, options } = spec {
                    out.push((query, options));
                }
            }
        }
        out
    }
}

fn default_true() -> bool {
    true
}

fn default_dirs() -> Vec<String> {
    vec![".".to_string()]
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawProject {
    project: RawMeta,

    #[serde(default)]
    toolchain: Toolchain,

    #[serde(default, rename = "rule")]
    rules: Vec<RawRule>,

    #[serde(default, rename = "target")]
    targets: Vec<RawTarget>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawMeta {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRule {
    name: String,
    command: String,
    description: Option<String>,
    #[serde(default)]
    implicit_outputs: Vec<String>,
    #[serde(default)]
    implicit_inputs: Vec<String>,
    depfile: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
enum RawKind {
    Executable,
    Library,
    Custom,
    Alias,
    FileGroup,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTarget {
    name: String,
    kind: RawKind,
    #[serde(default)]
    sources: Vec<RawSource>,
    #[serde(default)]
    libs: Vec<String>,
    #[serde(default)]
    order_only: Vec<String>,
    #[serde(default)]
    flags: String,
    #[serde(default)]
    ldflags: String,
    link: Option<LinkKind>,
    rule: Option<String>,
    #[serde(default)]
    inputs: Vec<RawSource>,
    #[serde(default)]
    implicit: Vec<RawSource>,
    #[serde(default)]
    outputs: Vec<String>,
    #[serde(default)]
    vars: BTreeMap<String, String>,
    #[serde(default)]
    targets: Vec<String>,
    default: Option<bool>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawSource {
    Path(String),
    Glob(RawGlob),
    Group(RawGroupRef),
    Target(RawTargetRef),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawGlob {
    glob: String,
    #[serde(default = "default_dirs")]
    dirs: Vec<String>,
    extra: Option<String>,
    #[serde(default, rename = "type")]
    kind: EntryKind,
    #[serde(default)]
    recursive: bool,
    #[serde(default)]
    allow_missing: bool,
    #[serde(default = "default_true")]
    cache: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawGroupRef {
    group: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTargetRef {
    target: String,
}

fn source_path(owner: &str, path: &str) -> Result<BuildPath, ProjectError> {
    BuildPath::source(path).map_err(|source| ProjectError::Path {
        owner: owner.to_string(),
        source,
    })
}

fn convert_rule(raw: RawRule) -> Result<Rule, ProjectError> {
    let command = CommandTemplate::parse(&raw.command).map_err(|source| ProjectError::Template {
        rule: raw.name.clone(),
        source,
    })?;

    let mut rule = Rule::new(raw.name.clone(), command);
    if let Some(description) = raw.description {
        rule = rule.with_description(description);
    }
    for pattern in raw.implicit_outputs {
        rule = rule.with_implicit_output(pattern);
    }
    for input in &raw.implicit_inputs {
        rule = rule.with_implicit_input(source_path(&raw.name, input)?);
    }
    if let Some(depfile) = raw.depfile {
        rule = rule.with_depfile(depfile);
    }
    Ok(rule)
}

fn convert_sources(owner: &str, raw: Vec<RawSource>) -> Result<Vec<SourceSpec>, ProjectError> {
    raw.into_iter()
        .map(|source| {
            Ok(match source {
                RawSource::Path(p) => SourceSpec::Path(source_path(owner, &p)?),
                RawSource::Glob(g) => {
                    let dirs = g
                        .dirs
                        .iter()
                        .map(|d| source_path(owner, d))
                        .collect::<Result<Vec<_>, _>>()?;
                    SourceSpec::Glob {
                        query: FindQuery {
                            dirs,
                            pattern: g.glob,
                            extra: g.extra,
                            kind: g.kind,
                            recursive: g.recursive,
                        },
                        options: FindOptions {
                            allow_missing: g.allow_missing,
                            cache: g.cache,
                        },
                    }
                }
                RawSource::Group(r) => SourceSpec::Group(r.group),
                RawSource::Target(r) => SourceSpec::Target(r.target),
            })
        })
        .collect()
}

fn require<T>(target: &str, field: &'static str, items: &[T]) -> Result<(), ProjectError> {
    if items.is_empty() {
        return Err(ProjectError::MissingField {
            target: target.to_string(),
            field,
        });
    }
    Ok(())
}

fn convert_target(raw: RawTarget) -> Result<TargetDecl, ProjectError> {
    let name = raw.name;

    if raw.link.is_some() && !matches!(raw.kind, RawKind::Library) {
        tracing::warn!("target `{}`: `link` only applies to libraries, ignoring", name);
    }

    let (kind, default) = match raw.kind {
        RawKind::Executable | RawKind::Library => {
            require(&name, "sources", &raw.sources)?;
            let spec = BinarySpec {
                sources: convert_sources(&name, raw.sources)?,
                libs: raw.libs,
                order_only: raw.order_only,
                flags: raw.flags,
                ldflags: raw.ldflags,
            };
            let kind = if matches!(raw.kind, RawKind::Library) {
                DeclKind::Library {
                    link: raw.link.unwrap_or_default(),
                    spec,
                }
            } else {
                DeclKind::Executable(spec)
            };
            (kind, raw.default.unwrap_or(true))
        }
        RawKind::Custom => {
            let rule = raw.rule.ok_or_else(|| ProjectError::MissingField {
                target: name.clone(),
                field: "rule",
            })?;
            require(&name, "outputs", &raw.outputs)?;
            for key in raw.vars.keys() {
                check_variable_name(key).map_err(|source| ProjectError::Variable {
                    target: name.clone(),
                    name: key.clone(),
                    source,
                })?;
            }
            let outputs = raw
                .outputs
                .iter()
                .map(|o| {
                    BuildPath::build(o).map_err(|source| ProjectError::Path {
                        owner: name.clone(),
                        source,
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            let kind = DeclKind::Custom(CustomSpec {
                rule,
                inputs: convert_sources(&name, raw.inputs)?,
                implicit: convert_sources(&name, raw.implicit)?,
                order_only: raw.order_only,
                outputs,
                vars: raw.vars,
            });
            (kind, raw.default.unwrap_or(false))
        }
        RawKind::Alias => {
            require(&name, "targets", &raw.targets)?;
            (
                DeclKind::Alias {
                    targets: raw.targets,
                },
                raw.default.unwrap_or(false),
            )
        }
        RawKind::FileGroup => {
            require(&name, "sources", &raw.sources)?;
            (
                DeclKind::FileGroup {
                    sources: convert_sources(&name, raw.sources)?,
                },
                false,
            )
        }
    };

    Ok(TargetDecl {
        name,
        kind,
        default,
        description: raw.description,
    })
}
