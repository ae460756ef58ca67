//! Ninja emitter.
//!
//! Ninja has a native slot for every edge kind (`|` implicit, `||`
//! order-only) and for implicit outputs, creates output directories itself
//! and understands `generator = 1`, so the lowering is close to one build
//! statement per target. The one thing it cannot do is run a multi-line
//! command, which is rejected up front.
//!
//! A `clean` statement hands removal of built files to `ninja -t clean`.

use crate::backend::{
    default_target, describe, Artifact, BackendId, EmitContext, EmitError, Emitter, Prerequisites,
};
use crate::core::path::{BuildPath, Root};
use crate::core::project::CLEAN_TARGET;
use crate::core::rule::{Fragment, Rule};
use crate::core::target::Target;
use crate::graph::{FrozenGraph, NodeId};
use crate::regen::RegenTrigger;

const LINE_WIDTH: usize = 80;
const INDENT: &str = "  ";
const REGENERATE_RULE: &str = "regenerate";

pub struct NinjaEmitter;

impl Emitter for NinjaEmitter {
    fn id(&self) -> BackendId {
        BackendId::Ninja
    }

    fn emit(
        &self,
        graph: &FrozenGraph,
        trigger: &RegenTrigger,
        context: &EmitContext,
    ) -> Result<Vec<Artifact>, EmitError> {
        self.capabilities().check(self.id(), graph)?;

        let mut file = NinjaFile::default();
        file.comment("Generated by kiln. Do not edit; changes are lost on regeneration.");
        file.variable("ninja_required_version", "1.3", 0);
        file.blank();
        file.variable(
            "srcdir",
            &escape_value(&context.src_dir.display().to_string()),
            0,
        );
        file.blank();

        for rule in graph.used_rules() {
            file.rule(rule);
        }
        for (id, target) in graph.targets() {
            file.build(graph, id, target);
        }
        file.regenerate(trigger);
        file.clean();

        if let Some(default) = default_target(graph) {
            let goal = match default.primary_output() {
                Some(primary) if !default.is_phony() => ninja_path(primary),
                _ => escape_path(&default.name),
            };
            file.line(&format!("default {}", goal), 0);
        }

        tracing::debug!("rendered build.ninja with {} targets", graph.target_count());
        Ok(vec![Artifact {
            path: context.build_dir.join(self.id().output_file()),
            contents: file.out,
        }])
    }
}

#[derive(Default)]
struct NinjaFile {
    out: String,
}

impl NinjaFile {
    fn blank(&mut self) {
        self.out.push('\n');
    }

    fn comment(&mut self, text: &str) {
        self.out.push_str("# ");
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn variable(&mut self, key: &str, value: &str, indent: usize) {
        self.line(&format!("{} = {}", key, value), indent);
    }

    /// Write `text`, wrapping at unescaped spaces with `$` continuations.
    fn line(&mut self, text: &str, indent: usize) {
        let mut leading = INDENT.repeat(indent);
        let mut rest = text;

        while leading.len() + rest.len() > LINE_WIDTH {
            // Leave room for the trailing " $".
            let available = LINE_WIDTH.saturating_sub(leading.len() + 2);
            let split = last_break(rest, available).or_else(|| first_break(rest, available));
            let Some(split) = split else {
                break;
            };
            self.out.push_str(&leading);
            self.out.push_str(&rest[..split]);
            self.out.push_str(" $\n");
            rest = &rest[split + 1..];
            leading = INDENT.repeat(indent + 2);
        }

        self.out.push_str(&leading);
        self.out.push_str(rest);
        self.out.push('\n');
    }

    fn rule(&mut self, rule: &Rule) {
        self.line(&format!("rule {}", rule.name), 0);
        self.variable("command", &ninja_command(rule), 1);
        if let Some(description) = &rule.description {
            let description = escape_value(description).replace("{out}", "$out");
            self.variable("description", &description, 1);
        }
        if rule.depfile.is_some() {
            self.variable("deps", "gcc", 1);
        }
        if rule.generator {
            self.variable("generator", "1", 1);
        }
        self.blank();
    }

    fn build(&mut self, graph: &FrozenGraph, id: NodeId, target: &Target) {
        let pre = Prerequisites::of(graph, id);
        let phony: Vec<String> = pre.phony.iter().map(|t| escape_path(&t.name)).collect();
        let mut order_only: Vec<String> = pre.order_only.iter().map(|p| ninja_path(p)).collect();
        order_only.extend(pre.phony_order_only.iter().map(|t| escape_path(&t.name)));

        if target.is_phony() {
            let mut inputs: Vec<String> = pre.dependencies().map(ninja_path).collect();
            inputs.extend(phony);
            self.statement(
                &[escape_path(&target.name)],
                &[],
                "phony",
                &inputs,
                &[],
                &order_only,
            );
            self.blank();
            return;
        }

        let (Some(rule), Some(primary)) = (
            target.rule.as_deref().and_then(|r| graph.rule(r)),
            target.primary_output(),
        ) else {
            return;
        };

        if let Some(fingerprint) = graph.fingerprint(id) {
            self.comment(&format!(
                "{} {}",
                target.name,
                &fingerprint[..16.min(fingerprint.len())]
            ));
        }

        let outputs: Vec<String> = target.outputs.iter().map(ninja_path).collect();
        let implicit_outputs: Vec<String> = target.implicit_outputs.iter().map(ninja_path).collect();
        let explicit: Vec<String> = pre.explicit.iter().map(|p| ninja_path(p)).collect();
        let mut implicit: Vec<String> = pre.implicit.iter().map(|p| ninja_path(p)).collect();
        implicit.extend(phony);

        self.statement(
            &outputs,
            &implicit_outputs,
            &rule.name,
            &explicit,
            &implicit,
            &order_only,
        );
        for (name, value) in &target.variables {
            self.variable(name, &escape_value(value), 1);
        }
        if let Some(depfile) = rule.depfile_for(primary) {
            self.variable("depfile", &ninja_path(&depfile), 1);
        }
        if target.description.is_some() {
            if let Some(description) = describe(rule, target) {
                self.variable("description", &escape_value(&description), 1);
            }
        }
        self.blank();
    }

    fn statement(
        &mut self,
        outputs: &[String],
        implicit_outputs: &[String],
        rule: &str,
        explicit: &[String],
        implicit: &[String],
        order_only: &[String],
    ) {
        let mut text = format!("build {}", outputs.join(" "));
        if !implicit_outputs.is_empty() {
            text.push_str(" | ");
            text.push_str(&implicit_outputs.join(" "));
        }
        text.push_str(": ");
        text.push_str(rule);
        for (sep, list) in [("", explicit), (" |", implicit), (" ||", order_only)] {
            if list.is_empty() {
                continue;
            }
            text.push_str(sep);
            for item in list {
                text.push(' ');
                text.push_str(item);
            }
        }
        self.line(&text, 0);
    }

    fn regenerate(&mut self, trigger: &RegenTrigger) {
        self.comment("Re-run kiln when the project description or a globbed directory changes.");
        self.line(&format!("rule {}", REGENERATE_RULE), 0);
        self.variable("command", &escape_value(&trigger.command_line()), 1);
        self.variable("description", "Regenerating build.ninja", 1);
        self.variable("generator", "1", 1);
        self.blank();

        let descriptions: Vec<String> = trigger.descriptions.iter().map(ninja_path).collect();
        let dirs: Vec<String> = trigger.dirs.iter().map(ninja_path).collect();
        let outputs: Vec<String> = trigger.outputs.iter().map(ninja_path).collect();
        self.statement(
            &[BackendId::Ninja.output_file().to_string()],
            &outputs,
            REGENERATE_RULE,
            &descriptions,
            &dirs,
            &[],
        );

        // A removed input must rerun kiln rather than stop ninja.
        let inputs: Vec<String> = descriptions.into_iter().chain(dirs).collect();
        if !inputs.is_empty() {
            self.statement(&inputs, &[], "phony", &[], &[], &[]);
        }
        self.blank();
    }

    fn clean(&mut self) {
        self.line(&format!("rule {}", CLEAN_TARGET), 0);
        let command = format!("{} -t clean", BackendId::Ninja.tool());
        self.variable("command", &escape_value(&command), 1);
        self.variable("description", "Cleaning", 1);
        self.blank();
        self.statement(&[CLEAN_TARGET.to_string()], &[], CLEAN_TARGET, &[], &[], &[]);
        self.blank();
    }
}

/// Render a rule's command with `$in`, `$out` and `$name` references.
fn ninja_command(rule: &Rule) -> String {
    let mut out = String::new();
    for fragment in rule.command.fragments() {
        match fragment {
            Fragment::Literal(text) => out.push_str(&escape_value(text)),
            Fragment::Inputs => out.push_str("$in"),
            Fragment::Outputs => out.push_str("$out"),
            Fragment::Var(name) => {
                out.push_str("${");
                out.push_str(name);
                out.push('}');
            }
        }
    }
    out.trim_end().to_string()
}

fn ninja_path(path: &BuildPath) -> String {
    match path.root() {
        Root::Source if path.is_root() => "$srcdir".to_string(),
        Root::Source => format!("$srcdir/{}", escape_path(path.suffix())),
        Root::Build | Root::Absolute => escape_path(&path.to_string()),
    }
}

/// Escape a path for a `build` line.
fn escape_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for c in path.chars() {
        match c {
            '$' | ' ' | ':' => {
                out.push('$');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

/// Escape the right-hand side of a variable binding.
fn escape_value(value: &str) -> String {
    value.replace('$', "$$")
}

/// Whether the byte at `i` is preceded by an odd number of `$`.
fn is_escaped(text: &str, i: usize) -> bool {
    text.as_bytes()[..i]
        .iter()
        .rev()
        .take_while(|&&b| b == b'$')
        .count()
        % 2
        == 1
}

fn breaks(text: &str) -> impl Iterator<Item = usize> + '_ {
    text.bytes()
        .enumerate()
        .filter(|&(i, b)| b == b' ' && i > 0 && !is_escaped(text, i))
        .map(|(i, _)| i)
}

fn last_break(text: &str, limit: usize) -> Option<usize> {
    breaks(text).take_while(|&i| i < limit).last()
}

fn first_break(text: &str, limit: usize) -> Option<usize> {
    breaks(text).find(|&i| i >= limit)
}
