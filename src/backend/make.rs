//! Makefile emitter.
//!
//! Targets GNU make. Order-only prerequisites map onto `|` directly; the
//! rest of the graph needs some lowering:
//!
//! - A target with several outputs runs its recipe once for a
//!   `<primary>.stamp` file and lists every output as depending on it.
//! - Output directories come from `<dir>/.dir` sentinels, ordered before
//!   the rule and created by a single `%/.dir` pattern rule.
//! - Depfiles are pulled in with `-include`.
//! - A phony `clean` removes every file a rule produces.
//!
//! Source paths are written out literally rather than through a variable so
//! that escaping only ever has to deal with one level of expansion.

use crate::backend::{
    default_target, describe, expand_command, output_dirs, Artifact, BackendId, EmitContext,
    EmitError, Emitter, Prerequisites,
};
use crate::core::path::{BuildPath, Root};
use crate::core::project::CLEAN_TARGET;
use crate::core::target::Target;
use crate::graph::{FrozenGraph, NodeId};
use crate::regen::RegenTrigger;
use crate::util::quote::shell_quote;

const DIR_SENTINEL: &str = ".dir";

pub struct MakeEmitter;

impl Emitter for MakeEmitter {
    fn id(&self) -> BackendId {
        BackendId::Make
    }

    fn emit(
        &self,
        graph: &FrozenGraph,
        trigger: &RegenTrigger,
        context: &EmitContext,
    ) -> Result<Vec<Artifact>, EmitError> {
        self.capabilities().check(self.id(), graph)?;

        let mut file = Makefile::new(context);
        file.header(graph);
        for (id, target) in graph.targets() {
            file.target(graph, id, target);
        }
        file.regenerate(trigger);
        file.clean(graph);
        file.footer();

        tracing::debug!("rendered Makefile with {} targets", graph.target_count());
        Ok(vec![Artifact {
            path: context.build_dir.join(self.id().output_file()),
            contents: file.out,
        }])
    }
}

struct Makefile<'a> {
    context: &'a EmitContext,
    out: String,
    phony: Vec<String>,
    uses_sentinels: bool,
}

impl<'a> Makefile<'a> {
    fn new(context: &'a EmitContext) -> Self {
        Makefile {
            context,
            out: String::new(),
            phony: Vec::new(),
            uses_sentinels: false,
        }
    }

    fn line(&mut self, text: impl AsRef<str>) {
        self.out.push_str(text.as_ref());
        self.out.push('\n');
    }

    fn header(&mut self, graph: &FrozenGraph) {
        self.line("# Generated by kiln. Do not edit; changes are lost on regeneration.");
        if let Some(default) = default_target(graph) {
            let goal = self.goal(default);
            self.line(format!(".DEFAULT_GOAL := {}", goal));
        }
        self.line(".SUFFIXES:");
        self.line(".DELETE_ON_ERROR:");
        self.line("");
    }

    /// The literal file name of a path.
    fn literal(&self, path: &BuildPath) -> String {
        match path.root() {
            Root::Source => path
                .to_path(&self.context.src_dir, &self.context.build_dir)
                .display()
                .to_string(),
            Root::Build | Root::Absolute => path.to_string(),
        }
    }

    fn rule_path(&self, path: &BuildPath) -> String {
        escape_rule(&self.literal(path))
    }

    fn goal(&self, target: &Target) -> String {
        match target.primary_output() {
            Some(primary) if !target.is_phony() => self.rule_path(primary),
            _ => escape_rule(&target.name),
        }
    }

    fn rule_line(&mut self, targets: &[String], deps: &[String], order_only: &[String]) {
        let mut line = format!("{}:", targets.join(" "));
        for dep in deps {
            line.push(' ');
            line.push_str(dep);
        }
        if !order_only.is_empty() {
            line.push_str(" |");
            for dep in order_only {
                line.push(' ');
                line.push_str(dep);
            }
        }
        self.line(line);
    }

    fn recipe(&mut self, command: &str) {
        for line in command.lines() {
            self.line(format!("\t{}", escape_recipe(line)));
        }
    }

    fn target(&mut self, graph: &FrozenGraph, id: NodeId, target: &Target) {
        let pre = Prerequisites::of(graph, id);
        let mut deps: Vec<String> = pre.dependencies().map(|p| self.rule_path(p)).collect();
        deps.extend(pre.phony.iter().map(|t| escape_rule(&t.name)));
        let mut order_only: Vec<String> = pre.order_only.iter().map(|p| self.rule_path(p)).collect();
        order_only.extend(pre.phony_order_only.iter().map(|t| escape_rule(&t.name)));

        if target.is_phony() {
            let name = escape_rule(&target.name);
            if let Some(description) = &target.description {
                self.line(format!("# {}", description));
            }
            self.rule_line(std::slice::from_ref(&name), &deps, &order_only);
            self.line("");
            self.phony.push(name);
            return;
        }

        let (Some(rule), Some(primary)) = (
            target.rule.as_deref().and_then(|r| graph.rule(r)),
            target.primary_output(),
        ) else {
            return;
        };

        for dir in output_dirs(target) {
            if let Ok(sentinel) = dir.join(DIR_SENTINEL) {
                order_only.push(self.rule_path(&sentinel));
                self.uses_sentinels = true;
            }
        }

        if let Some(fingerprint) = graph.fingerprint(id) {
            self.line(format!("# {} {}", target.name, &fingerprint[..16.min(fingerprint.len())]));
        }

        let outputs: Vec<String> = target.all_outputs().map(|o| self.rule_path(o)).collect();
        let head = if target.has_multiple_outputs() {
            let stamp = self.rule_path(&primary.add_extension(".stamp"));
            self.rule_line(&outputs, std::slice::from_ref(&stamp), &[]);
            vec![stamp]
        } else {
            outputs
        };

        self.rule_line(&head, &deps, &order_only);
        if let Some(description) = describe(rule, target) {
            self.line(format!("\t@echo {}", escape_recipe(&shell_quote(&description))));
        }
        let command = expand_command(rule, target, &pre.explicit, |p| {
            shell_quote(&self.literal(p)).into_owned()
        });
        self.recipe(&command);
        if target.has_multiple_outputs() {
            self.line("\t@touch $@");
        }
        if let Some(depfile) = rule.depfile_for(primary) {
            self.line(format!("-include {}", self.rule_path(&depfile)));
        }
        self.line("");
    }

    fn regenerate(&mut self, trigger: &RegenTrigger) {
        let inputs: Vec<String> = trigger.inputs().map(|p| self.rule_path(p)).collect();
        self.line("# Re-run kiln when the project description or a globbed directory changes.");
        self.rule_line(&[BackendId::Make.output_file().to_string()], &inputs, &[]);
        self.recipe(&trigger.command_line());
        self.line("");

        // A removed input must rerun kiln rather than stop make.
        if !inputs.is_empty() {
            self.rule_line(&inputs, &[], &[]);
            self.line("");
        }
    }

    fn clean(&mut self, graph: &FrozenGraph) {
        let mut files = Vec::new();
        for (_, target) in graph.targets() {
            let Some(primary) = target.primary_output() else {
                continue;
            };
            if target.is_phony() || target.rule.is_none() {
                continue;
            }
            files.extend(target.all_outputs().map(|o| shell_quote(&self.literal(o)).into_owned()));
            if target.has_multiple_outputs() {
                let stamp = primary.add_extension(".stamp");
                files.push(shell_quote(&self.literal(&stamp)).into_owned());
            }
        }

        self.rule_line(&[CLEAN_TARGET.to_string()], &[], &[]);
        if !files.is_empty() {
            self.recipe(&format!("rm -f {}", files.join(" ")));
        }
        self.line("");
        self.phony.push(CLEAN_TARGET.to_string());
    }

    fn footer(&mut self) {
        if self.uses_sentinels {
            self.line(format!("%/{}:", DIR_SENTINEL));
            self.line("\t@mkdir -p \"$*\"");
            self.line("\t@touch \"$@\"");
            self.line("");
        }
        if !self.phony.is_empty() {
            let names = std::mem::take(&mut self.phony);
            self.line(format!(".PHONY: {}", names.join(" ")));
        }
    }
}

/// Escape a file name for the target or prerequisite list of a rule.
fn escape_rule(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        match c {
            '$' => out.push_str("$$"),
            ' ' | '#' | ':' | '%' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

/// Escape one recipe line. Shell quoting has already happened; only make's
/// own expansion is left to suppress.
fn escape_recipe(line: &str) -> String {
    line.replace('$', "$$")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::test_graphs::{self, build};
    use crate::backend::Construct;
    use crate::core::rule::{CommandTemplate, Rule};
    use crate::core::target::TargetKind;
    use crate::graph::{BuildGraph, EdgeKind};
    use crate::test_support::{emit, frozen_graph, write_hello};
    use std::path::Path;
    use tempfile::TempDir;

    fn render(graph: &FrozenGraph) -> String {
        emit(BackendId::Make, graph, Path::new("/src"), Path::new("/build")).contents
    }

    #[test]
    fn test_order_only_after_bar() {
        let text = render(&test_graphs::explicit_and_order_only());
        assert!(text.contains("bin/app: main.o | gen/config.h bin/.dir\n"));
        assert!(text.contains("gen/config.h: | gen/.dir\n"));
        assert!(text.contains("all: bin/app\n"));
        assert!(text.contains(".DEFAULT_GOAL := all\n"));
        assert!(text.contains("\tcc main.o -o bin/app\n"));
        assert!(text.contains(".PHONY: all clean\n"));
        assert!(text.contains("%/.dir:\n"));
    }

    #[test]
    fn test_multiple_outputs_use_stamp() {
        let text = render(&test_graphs::multi_output());
        assert!(text.contains("api.c api.c.h: api.c.stamp\n"));
        assert!(text.contains("api.c.stamp: /src/api.idl\n"));
        assert!(text.contains("\tidl /src/api.idl -o api.c\n\t@touch $@\n"));
    }

    #[test]
    fn test_depfile_included() {
        let text = render(&test_graphs::with_depfile());
        assert!(text.contains("-include a.o.d\n"));
    }

    #[test]
    fn test_rejects_dot_phony() {
        let err = MakeEmitter
            .emit(
                &test_graphs::with_dot_phony(),
                &RegenTrigger::new(Path::new("/s"), Path::new("/b"), Path::new("kiln"), []),
                &EmitContext {
                    src_dir: "/s".into(),
                    build_dir: "/b".into(),
                },
            )
            .unwrap_err();
        assert!(matches!(
            err,
            EmitError::UnsupportedConstruct {
                backend: BackendId::Make,
                construct: Construct::DotPhony,
                ref target,
            } if target == ".hidden"
        ));
    }

    #[test]
    fn test_escaping() {
        let mut graph = BuildGraph::new();
        graph
            .add_rule(Rule::new("cp", CommandTemplate::parse("cp {in} {out}").unwrap()))
            .unwrap();
        let id = graph
            .add_target(
                Target::new("copy", TargetKind::Custom)
                    .with_rule("cp")
                    .with_output(build("out dir/a$b#c")),
            )
            .unwrap();
        graph
            .add_input(id, BuildPath::source("in:put.txt").unwrap(), EdgeKind::Explicit)
            .unwrap();
        let text = render(&graph.finalize().unwrap());

        assert!(text.contains("out\\ dir/a$$b\\#c: /src/in\\:put.txt | out\\ dir/.dir\n"));
        assert!(text.contains("\tcp /src/in:put.txt 'out dir/a$$b#c'\n"));
    }

    #[test]
    fn test_clean_removes_outputs() {
        let text = render(&test_graphs::multi_output());
        assert!(text.contains("clean:\n\trm -f api.c api.c.h api.c.stamp\n"));

        let text = render(&test_graphs::explicit_and_order_only());
        assert!(text.contains("clean:\n\trm -f gen/config.h bin/app\n"));
    }

    #[test]
    fn test_rejects_newline_in_path() {
        let err = MakeEmitter
            .emit(
                &test_graphs::with_newline_path(),
                &RegenTrigger::new(Path::new("/s"), Path::new("/b"), Path::new("kiln"), []),
                &EmitContext {
                    src_dir: "/s".into(),
                    build_dir: "/b".into(),
                },
            )
            .unwrap_err();
        assert!(matches!(
            err,
            EmitError::UnsupportedConstruct {
                backend: BackendId::Make,
                construct: Construct::NewlineInPath,
                ..
            }
        ));
    }

    #[test]
    fn test_regenerate_rule() {
        let text = render(&test_graphs::explicit_and_order_only());
        assert!(text.contains("Makefile: /src/kiln.toml\n\t/usr/bin/kiln refresh /build\n"));
        assert!(text.contains("\n/src/kiln.toml:\n"));
    }

    #[test]
    fn test_hello() {
        let src = TempDir::new().unwrap();
        write_hello(src.path());
        let graph = frozen_graph(src.path());
        let text = emit(BackendId::Make, &graph, src.path(), Path::new("/build")).contents;

        let compiles = text.lines().filter(|l| l.starts_with("\tc++ -c ")).count();
        let links = text
            .lines()
            .filter(|l| l.starts_with("\tc++ ") && !l.starts_with("\tc++ -c "))
            .count();
        assert_eq!(compiles, 2);
        assert_eq!(links, 1);
        assert!(!text.contains("util.hpp"));
    }

    #[test]
    fn test_deterministic() {
        let src = TempDir::new().unwrap();
        write_hello(src.path());
        let first = emit(BackendId::Make, &frozen_graph(src.path()), src.path(), Path::new("/b"));
        let second = emit(BackendId::Make, &frozen_graph(src.path()), src.path(), Path::new("/b"));
        assert_eq!(first, second);
    }
}
