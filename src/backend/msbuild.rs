//! MSBuild project emitter.
//!
//! Every graph target becomes an MSBuild `<Target>`. Staleness comes from
//! the target's `Inputs`/`Outputs` pair and ordering from
//! `DependsOnTargets`. MSBuild has no order-only dependency, so those edges
//! go through a synthetic `_Order_<name>` target that the real target
//! depends on without ever listing the files in its `Inputs`.
//!
//! Regeneration runs from `InitialTargets`. MSBuild has already evaluated
//! the project by then, so a regenerated `kiln.proj` takes effect on the
//! next invocation.

use std::collections::{BTreeSet, HashMap};

use crate::backend::{
    default_target, describe, expand_command, output_dirs, Artifact, BackendId, EmitContext,
    EmitError, Emitter, Prerequisites,
};
use crate::core::path::{BuildPath, Root};
use crate::core::target::Target;
use crate::graph::{EdgeKind, FrozenGraph, InputRef, NodeId};
use crate::regen::RegenTrigger;
use crate::util::quote::shell_quote;

const NAMESPACE: &str = "http://schemas.microsoft.com/developer/msbuild/2003";
const REGENERATE_TARGET: &str = "_KilnRegenerate";
const ORDER_PREFIX: &str = "_Order_";

pub struct MsBuildEmitter;

impl Emitter for MsBuildEmitter {
    fn id(&self) -> BackendId {
        BackendId::MsBuild
    }

    fn emit(
        &self,
        graph: &FrozenGraph,
        trigger: &RegenTrigger,
        context: &EmitContext,
    ) -> Result<Vec<Artifact>, EmitError> {
        self.capabilities().check(self.id(), graph)?;

        let names = TargetNames::assign(graph);
        let mut project = Project::new(context);

        let default = default_target(graph)
            .and_then(|t| graph.lookup(&t.name))
            .and_then(|id| names.get(id));
        project.open(default);
        project.regenerate(trigger);
        for (id, target) in graph.targets() {
            project.target(graph, &names, id, target);
        }
        project.close();

        tracing::debug!("rendered kiln.proj with {} targets", graph.target_count());
        Ok(vec![Artifact {
            path: context.build_dir.join(self.id().output_file()),
            contents: project.out,
        }])
    }
}

/// MSBuild target names, unique and restricted to `[A-Za-z0-9_]`.
struct TargetNames {
    targets: HashMap<NodeId, String>,
    order: HashMap<NodeId, String>,
}

impl TargetNames {
    fn assign(graph: &FrozenGraph) -> Self {
        let mut used: BTreeSet<String> = BTreeSet::from([REGENERATE_TARGET.to_string()]);
        let mut unique = |base: String| {
            let mut name = base.clone();
            let mut n = 2;
            while used.contains(&name) {
                name = format!("{}_{}", base, n);
                n += 1;
            }
            used.insert(name.clone());
            name
        };

        let targets: HashMap<NodeId, String> = graph
            .targets()
            .map(|(id, t)| (id, unique(sanitize(&t.name))))
            .collect();

        // Allocated after every real name so a target called `_Order_x`
        // keeps its own name.
        let mut order = HashMap::new();
        for (id, _) in graph.targets() {
            let has_order_only = graph
                .inputs(id)
                .iter()
                .any(|i| i.kind == EdgeKind::OrderOnly && matches!(i.source, InputRef::Target(_)));
            if let (true, Some(name)) = (has_order_only, targets.get(&id)) {
                order.insert(id, unique(format!("{}{}", ORDER_PREFIX, name)));
            }
        }

        TargetNames { targets, order }
    }

    fn get(&self, id: NodeId) -> Option<&str> {
        self.targets.get(&id).map(String::as_str)
    }
}

fn sanitize(name: &str) -> String {
    let name: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if name.is_empty() {
        "_".to_string()
    } else {
        name
    }
}

struct Project<'a> {
    context: &'a EmitContext,
    out: String,
}

impl<'a> Project<'a> {
    fn new(context: &'a EmitContext) -> Self {
        Project {
            context,
            out: String::new(),
        }
    }

    /// Write one element. `attrs` values must already be escaped.
    fn element(&mut self, indent: usize, name: &str, attrs: &[(&str, String)], close: bool) {
        self.out.push_str(&"  ".repeat(indent));
        self.out.push('<');
        self.out.push_str(name);
        for (key, value) in attrs {
            self.out.push_str(&format!(" {}=\"{}\"", key, value));
        }
        self.out.push_str(if close { " />\n" } else { ">\n" });
    }

    fn end(&mut self, indent: usize, name: &str) {
        self.out.push_str(&format!("{}</{}>\n", "  ".repeat(indent), name));
    }

    fn open(&mut self, default: Option<&str>) {
        self.out.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
        self.out
            .push_str("<!-- Generated by kiln. Do not edit; changes are lost on regeneration. -->\n");

        let mut attrs = Vec::new();
        if let Some(default) = default {
            attrs.push(("DefaultTargets", default.to_string()));
        }
        attrs.push(("InitialTargets", REGENERATE_TARGET.to_string()));
        attrs.push(("xmlns", NAMESPACE.to_string()));
        self.element(0, "Project", &attrs, false);

        self.element(1, "PropertyGroup", &[], false);
        let src_dir = xml_text(&msbuild_escape(&self.context.src_dir.display().to_string()));
        self.out.push_str(&format!("    <SrcDir>{}</SrcDir>\n", src_dir));
        self.end(1, "PropertyGroup");
    }

    fn close(&mut self) {
        self.end(0, "Project");
    }

    /// A path for `Inputs`, `Outputs` or `MakeDir`, MSBuild-escaped.
    fn item_path(&self, path: &BuildPath) -> String {
        match path.root() {
            Root::Source if path.is_root() => "$(SrcDir)".to_string(),
            Root::Source => format!("$(SrcDir)/{}", msbuild_escape(path.suffix())),
            Root::Build | Root::Absolute => msbuild_escape(&path.to_string()),
        }
    }

    fn item_list<'p>(&self, paths: impl IntoIterator<Item = &'p BuildPath>) -> String {
        xml_attr(
            &paths
                .into_iter()
                .map(|p| self.item_path(p))
                .collect::<Vec<_>>()
                .join(";"),
        )
    }

    /// The literal file name of a path, for a shell command.
    fn literal(&self, path: &BuildPath) -> String {
        match path.root() {
            Root::Source => path
                .to_path(&self.context.src_dir, &self.context.build_dir)
                .display()
                .to_string(),
            Root::Build | Root::Absolute => path.to_string(),
        }
    }

    fn regenerate(&mut self, trigger: &RegenTrigger) {
        let mut outputs = vec![msbuild_escape(BackendId::MsBuild.output_file())];
        outputs.extend(trigger.outputs.iter().map(|p| self.item_path(p)));
        let attrs = [
            ("Name", REGENERATE_TARGET.to_string()),
            ("Inputs", self.item_list(trigger.inputs())),
            ("Outputs", xml_attr(&outputs.join(";"))),
        ];
        self.element(1, "Target", &attrs, false);
        self.element(
            2,
            "Message",
            &[
                ("Text", "Regenerating kiln.proj".to_string()),
                ("Importance", "high".to_string()),
            ],
            true,
        );
        let command = xml_attr(&msbuild_escape(&trigger.command_line()));
        self.element(2, "Exec", &[("Command", command)], true);
        self.end(1, "Target");
    }

    fn target(&mut self, graph: &FrozenGraph, names: &TargetNames, id: NodeId, target: &Target) {
        let Some(name) = names.get(id) else {
            return;
        };

        let mut depends: Vec<&str> = Vec::new();
        let mut order_only: Vec<&str> = Vec::new();
        for input in graph.inputs(id) {
            let InputRef::Target(_) = input.source else {
                continue;
            };
            let Some(producer) = names.get(input.node) else {
                continue;
            };
            let list = match input.kind {
                EdgeKind::OrderOnly => &mut order_only,
                EdgeKind::Explicit | EdgeKind::Implicit => &mut depends,
            };
            if !list.contains(&producer) {
                list.push(producer);
            }
        }

        if let Some(order_name) = names.order.get(&id) {
            self.element(
                1,
                "Target",
                &[
                    ("Name", order_name.clone()),
                    ("DependsOnTargets", order_only.join(";")),
                ],
                true,
            );
            depends.insert(0, order_name.as_str());
        }

        let mut attrs = vec![("Name", name.to_string())];
        if !depends.is_empty() {
            attrs.push(("DependsOnTargets", depends.join(";")));
        }

        if target.is_phony() {
            self.element(1, "Target", &attrs, true);
            return;
        }
        let Some(rule) = target.rule.as_deref().and_then(|r| graph.rule(r)) else {
            return;
        };

        let pre = Prerequisites::of(graph, id);
        let inputs: Vec<&BuildPath> = pre.dependencies().collect();
        if !inputs.is_empty() {
            attrs.push(("Inputs", self.item_list(inputs)));
            attrs.push(("Outputs", self.item_list(target.all_outputs())));
        }
        if let Some(fingerprint) = graph.fingerprint(id) {
            attrs.push(("Label", fingerprint[..16.min(fingerprint.len())].to_string()));
        }
        self.element(1, "Target", &attrs, false);

        let dirs = output_dirs(target);
        if !dirs.is_empty() {
            let dirs = self.item_list(&dirs);
            self.element(2, "MakeDir", &[("Directories", dirs)], true);
        }
        if let Some(description) = describe(rule, target) {
            self.element(
                2,
                "Message",
                &[
                    ("Text", xml_attr(&msbuild_escape(&description))),
                    ("Importance", "high".to_string()),
                ],
                true,
            );
        }
        let command = expand_command(rule, target, &pre.explicit, |p| {
            shell_quote(&self.literal(p)).into_owned()
        });
        self.element(
            2,
            "Exec",
            &[("Command", xml_attr(&msbuild_escape(&command)))],
            true,
        );
        self.end(1, "Target");
    }
}

/// Escape the characters MSBuild gives meaning to as `%XX`.
fn msbuild_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '%' | '$' | '@' | ';' | '\'' | '*' | '?' => out.push_str(&format!("%{:02X}", c as u8)),
            _ => out.push(c),
        }
    }
    out
}

fn xml_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Escape an attribute value. Line breaks become character references so
/// attribute normalization keeps them.
fn xml_attr(text: &str) -> String {
    xml_text(text)
        .replace('"', "&quot;")
        .replace('\n', "&#10;")
        .replace('\r', "&#13;")
        .replace('\t', "&#9;")
}
