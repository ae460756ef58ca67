//! Rules - reusable command templates.
//!
//! A rule's command is written once, backend-neutral, with placeholders:
//!
//! - `{in}` - the explicit inputs of the target using the rule
//! - `{out}` - the outputs of the target
//! - `{name}` - a per-target variable called `name`
//!
//! `{{` and `}}` produce literal braces. Each backend renders the parsed
//! fragments in its own dialect (`$in` for Ninja, literal paths for Make).

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::path::BuildPath;

/// Error parsing a command template.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unclosed `{{` at offset {0}")]
    Unclosed(usize),

    #[error("unmatched `}}` at offset {0}")]
    Unmatched(usize),

    #[error("invalid placeholder `{{{0}}}`")]
    InvalidName(String),

    #[error("`{0}` is reserved and cannot name a variable")]
    ReservedName(String),
}

/// Names build files already give a meaning to. A per-target binding of
/// one of these would change the rule itself under Ninja.
pub const RESERVED_VARIABLES: [&str; 15] = [
    "command",
    "depfile",
    "deps",
    "description",
    "dyndep",
    "generator",
    "in",
    "in_newline",
    "msvc_deps_prefix",
    "out",
    "pool",
    "restat",
    "rspfile",
    "rspfile_content",
    "srcdir",
];

/// Check that `name` can be used as a per-target variable.
pub fn check_variable_name(name: &str) -> Result<(), TemplateError> {
    if !is_valid_name(name) {
        return Err(TemplateError::InvalidName(name.to_string()));
    }
    if RESERVED_VARIABLES.contains(&name) {
        return Err(TemplateError::ReservedName(name.to_string()));
    }
    Ok(())
}

/// One piece of a parsed command template.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Fragment {
    Literal(String),
    Inputs,
    Outputs,
    Var(String),
}

/// A parsed command pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommandTemplate {
    source: String,
    fragments: Vec<Fragment>,
}

impl CommandTemplate {
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        Ok(CommandTemplate {
            source: source.to_string(),
            fragments: parse_fragments(source)?,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    /// Names of the per-target variables the template refers to.
    pub fn variables(&self) -> BTreeSet<&str> {
        self.fragments
            .iter()
            .filter_map(|f| match f {
                Fragment::Var(name) => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Whether any literal text spans more than one line.
    pub fn is_multiline(&self) -> bool {
        self.fragments
            .iter()
            .any(|f| matches!(f, Fragment::Literal(s) if s.contains(['\n', '\r'])))
    }
}

impl fmt::Display for CommandTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl Serialize for CommandTemplate {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.source)
    }
}

impl<'de> Deserialize<'de> for CommandTemplate {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        CommandTemplate::parse(&s).map_err(serde::de::Error::custom)
    }
}

fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn parse_fragments(source: &str) -> Result<Vec<Fragment>, TemplateError> {
    let mut fragments = Vec::new();
    let mut literal = String::new();
    let mut chars = source.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        match c {
            '{' if matches!(chars.peek(), Some((_, '{'))) => {
                chars.next();
                literal.push('{');
            }
            '}' if matches!(chars.peek(), Some((_, '}'))) => {
                chars.next();
                literal.push('}');
            }
            '}' => return Err(TemplateError::Unmatched(i)),
            '{' => {
                let mut name = String::new();
                let mut closed = false;
                for (_, c) in chars.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                    name.push(c);
                }
                if !closed {
                    return Err(TemplateError::Unclosed(i));
                }
                if !literal.is_empty() {
                    fragments.push(Fragment::Literal(std::mem::take(&mut literal)));
                }
                let fragment = if name == "in" {
                    Fragment::Inputs
                } else if name == "out" {
                    Fragment::Outputs
                } else {
                    check_variable_name(&name)?;
                    Fragment::Var(name)
                };
                fragments.push(fragment);
            }
            c => literal.push(c),
        }
    }

    if !literal.is_empty() {
        fragments.push(Fragment::Literal(literal));
    }
    Ok(fragments)
}

/// Expand an `{out}`-relative pattern such as `{out}.d` against a target's
/// primary output. Anything outside the placeholder is appended verbatim.
pub fn expand_output_pattern(pattern: &str, primary: &BuildPath) -> BuildPath {
    match pattern.strip_prefix("{out}") {
        Some(rest) => primary.add_extension(rest),
        None => primary
            .parent()
            .and_then(|dir| dir.join(pattern).ok())
            .unwrap_or_else(|| primary.add_extension(pattern)),
    }
}

/// A registered build rule. Immutable once added to a graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub name: String,
    pub command: CommandTemplate,
    pub description: Option<String>,
    /// Outputs produced alongside the primary one, as `{out}` patterns.
    pub implicit_outputs: Vec<String>,
    /// Files every use of the rule depends on without naming them.
    pub implicit_inputs: Vec<BuildPath>,
    /// Compiler-written dependency file, as an `{out}` pattern.
    pub depfile: Option<String>,
    /// Whether this rule regenerates build files.
    pub generator: bool,
}

impl Rule {
    pub fn new(name: impl Into<String>, command: CommandTemplate) -> Self {
        Rule {
            name: name.into(),
            command,
            description: None,
            implicit_outputs: Vec::new(),
            implicit_inputs: Vec::new(),
            depfile: None,
            generator: false,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_implicit_output(mut self, pattern: impl Into<String>) -> Self {
        self.implicit_outputs.push(pattern.into());
        self
    }

    pub fn with_implicit_input(mut self, path: BuildPath) -> Self {
        self.implicit_inputs.push(path);
        self
    }

    pub fn with_depfile(mut self, pattern: impl Into<String>) -> Self {
        self.depfile = Some(pattern.into());
        self
    }

    /// The depfile path for a target whose primary output is `primary`.
    pub fn depfile_for(&self, primary: &BuildPath) -> Option<BuildPath> {
        self.depfile
            .as_deref()
            .map(|pattern| expand_output_pattern(pattern, primary))
    }
}
