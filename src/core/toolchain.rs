//! Toolchain command templates.
//!
//! kiln never runs or probes a compiler. The toolchain is just the set of
//! command templates the compile, link and archive steps are lowered to,
//! with GNU-style defaults that a project can override in its
//! `[toolchain]` table.

use serde::{Deserialize, Serialize};

use crate::core::rule::{CommandTemplate, Rule, TemplateError};

pub const CC: &str = "cc";
pub const CXX: &str = "cxx";
pub const LINK: &str = "link";
pub const LINK_SHARED: &str = "link_shared";
pub const ARCHIVE: &str = "archive";

/// Names the toolchain reserves for its own rules.
pub const RULE_NAMES: [&str; 5] = [CC, CXX, LINK, LINK_SHARED, ARCHIVE];

/// Source language of a compiled file, decided by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    C,
    Cxx,
}

/// What to do with a file listed as an executable or library source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceRole {
    Compile(Language),
    /// Headers feed nothing on the command line
    Header,
    /// Prebuilt objects go straight to the link step
    Object,
    Unsupported,
}

impl SourceRole {
    pub fn for_extension(ext: Option<&str>) -> Self {
        match ext {
            Some("c") => SourceRole::Compile(Language::C),
            Some("cc" | "cpp" | "cxx" | "c++" | "C") => SourceRole::Compile(Language::Cxx),
            Some("h" | "hh" | "hpp" | "hxx" | "h++" | "inl" | "ipp") => SourceRole::Header,
            Some("o" | "obj") => SourceRole::Object,
            _ => SourceRole::Unsupported,
        }
    }
}

/// Command templates for the built-in rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Toolchain {
    pub cc: String,
    pub cxx: String,
    pub link: String,
    pub link_shared: String,
    pub archive: String,

    /// Have compile steps write a `{out}.d` dependency file
    pub depfiles: bool,

    /// Platform used for output file naming (linux, macos, windows)
    pub os: String,
}

impl Default for Toolchain {
    fn default() -> Self {
        Toolchain {
            cc: "cc -c {in} -o {out} {flags}".to_string(),
            cxx: "c++ -c {in} -o {out} {flags}".to_string(),
            link: "c++ {in} -o {out} {ldflags}".to_string(),
            link_shared: "c++ -shared {in} -o {out} {ldflags}".to_string(),
            archive: "ar crs {out} {in}".to_string(),
            depfiles: false,
            os: std::env::consts::OS.to_string(),
        }
    }
}

impl Toolchain {
    /// The rule compiling sources of `lang`.
    pub fn compile_rule(lang: Language) -> &'static str {
        match lang {
            Language::C => CC,
            Language::Cxx => CXX,
        }
    }

    /// Build the rules this toolchain contributes to a graph.
    pub fn rules(&self) -> Result<Vec<Rule>, (String, TemplateError)> {
        let parse = |name: &str, command: &str| {
            CommandTemplate::parse(command).map_err(|e| (name.to_string(), e))
        };

        let compile = |name: &str,
                       command: &str,
                       description: &str|
         -> Result<Rule, (String, TemplateError)> {
            let (command, depfile) = if self.depfiles {
                (format!("{} -MMD -MF {{out}}.d", command), true)
            } else {
                (command.to_string(), false)
            };
            let rule = Rule::new(name, parse(name, &command)?).with_description(description);
            Ok(if depfile {
                rule.with_depfile("{out}.d")
            } else {
                rule
            })
        };

        Ok(vec![
            compile(CC, &self.cc, "cc {out}")?,
            compile(CXX, &self.cxx, "cxx {out}")?,
            Rule::new(LINK, parse(LINK, &self.link)?).with_description("link {out}"),
            Rule::new(LINK_SHARED, parse(LINK_SHARED, &self.link_shared)?)
                .with_description("link {out}"),
            Rule::new(ARCHIVE, parse(ARCHIVE, &self.archive)?).with_description("archive {out}"),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_roles() {
        assert_eq!(
            SourceRole::for_extension(Some("cpp")),
            SourceRole::Compile(Language::Cxx)
        );
        assert_eq!(
            SourceRole::for_extension(Some("c")),
            SourceRole::Compile(Language::C)
        );
        assert_eq!(SourceRole::for_extension(Some("hpp")), SourceRole::Header);
        assert_eq!(SourceRole::for_extension(Some("o")), SourceRole::Object);
        assert_eq!(SourceRole::for_extension(Some("txt")), SourceRole::Unsupported);
        assert_eq!(SourceRole::for_extension(None), SourceRole::Unsupported);
    }

    #[test]
    fn test_default_rules() {
        let rules = Toolchain::default().rules().unwrap();
        let names: Vec<_> = rules.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, RULE_NAMES);
        assert!(rules.iter().all(|r| r.depfile.is_none()));
        assert!(rules[1].command.variables().contains("flags"));
    }

    #[test]
    fn test_depfiles() {
        let toolchain = Toolchain {
            depfiles: true,
            ..Toolchain::default()
        };
        let rules = toolchain.rules().unwrap();
        assert_eq!(rules[0].depfile.as_deref(), Some("{out}.d"));
        assert!(rules[0].command.as_str().ends_with("-MMD -MF {out}.d"));
        assert!(rules[2].depfile.is_none());
    }

    #[test]
    fn test_bad_template() {
        let toolchain = Toolchain {
            link: "c++ {in -o {out}".to_string(),
            ..Toolchain::default()
        };
        let (rule, _) = toolchain.rules().unwrap_err();
        assert_eq!(rule, "link");
    }
}
