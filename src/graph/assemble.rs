//! Lowering a [`Project`] into a [`BuildGraph`].
//!
//! Toolchain and project rules are registered first, every discovery query
//! is resolved up front (in parallel when enabled), then targets are
//! processed in declaration order. A target may only refer to targets
//! declared before it; file groups are flattened into the lists that use
//! them. Executables and libraries expand into one object target per
//! compiled source plus a link (or archive) target.

use std::collections::HashMap;

use crate::core::path::BuildPath;
use crate::core::project::{BinarySpec, CustomSpec, DeclKind, Project, ProjectError, SourceSpec, TargetDecl};
use crate::core::target::{LinkKind, Target, TargetKind};
use crate::core::toolchain::{self, Language, SourceRole, Toolchain};
use crate::discovery::DiscoveryCache;
use crate::error::Error;
use crate::graph::{BuildGraph, EdgeKind, GraphError, NodeId};

/// Name of the phony target building every default target.
pub const ALL_TARGET: &str = "all";

/// Build the graph for `project`, discovering files through `cache`.
pub fn assemble(project: &Project, cache: &DiscoveryCache) -> Result<BuildGraph, Error> {
    let mut assembler = Assembler {
        project,
        cache,
        graph: BuildGraph::new(),
        link_closure: HashMap::new(),
    };

    let toolchain_rules = project
        .toolchain
        .rules()
        .map_err(|(rule, source)| ProjectError::Template { rule, source })?;
    for rule in toolchain_rules.into_iter().chain(project.rules.iter().cloned()) {
        assembler.graph.add_rule(rule)?;
    }

    cache.resolve_all(project.queries())?;

    let mut defaults = Vec::new();
    for decl in &project.targets {
        let id = assembler.add_decl(decl)?;
        if decl.default {
            defaults.extend(id);
        }
    }

    let mut graph = assembler.graph;
    if graph.lookup(ALL_TARGET).is_none() {
        let all = graph.add_target(Target::phony(ALL_TARGET).with_description("default targets"))?;
        for id in defaults {
            graph.add_edge(id, all, EdgeKind::Explicit)?;
        }
    }

    tracing::info!(
        "assembled `{}`: {} targets, {} nodes",
        project.name,
        project.targets.len(),
        graph.len()
    );
    Ok(graph)
}

/// A resolved entry of a source list.
#[derive(Debug, Clone)]
enum Resolved {
    File(BuildPath),
    Target(NodeId),
}

struct Assembler<'a> {
    project: &'a Project,
    cache: &'a DiscoveryCache,
    graph: BuildGraph,
    /// Libraries a static library needs at final link time
    link_closure: HashMap<String, Vec<NodeId>>,
}

impl<'a> Assembler<'a> {
    fn add_decl(&mut self, decl: &TargetDecl) -> Result<Option<NodeId>, Error> {
        tracing::debug!("assembling {} `{}`", decl.kind.as_str(), decl.name);
        let id = match &decl.kind {
            DeclKind::Executable(spec) => self.add_binary(decl, TargetKind::Executable, spec)?,
            DeclKind::Library { link, spec } => {
                self.add_binary(decl, TargetKind::Library(*link), spec)?
            }
            DeclKind::Custom(spec) => self.add_custom(decl, spec)?,
            DeclKind::Alias { targets } => {
                let deps = self.lookup_all(&decl.name, targets, "target")?;
                let mut alias = Target::phony(&decl.name);
                alias.description = decl.description.clone();
                let id = self.graph.add_target(alias)?;
                for dep in deps {
                    self.graph.add_edge(dep, id, EdgeKind::Explicit)?;
                }
                id
            }
            DeclKind::FileGroup { sources } => {
                // Expanded for its side effects: references are checked
                // and distribution files recorded.
                self.expand(&decl.name, sources)?;
                return Ok(None);
            }
        };
        Ok(Some(id))
    }

    fn add_binary(
        &mut self,
        decl: &TargetDecl,
        kind: TargetKind,
        spec: &BinarySpec,
    ) -> Result<NodeId, Error> {
        let os = self.project.toolchain.os.clone();
        let resolved = self.expand(&decl.name, &spec.sources)?;
        let order_only = self.lookup_all(&decl.name, &spec.order_only, "target")?;

        let mut compiles: Vec<(Language, Resolved, BuildPath)> = Vec::new();
        let mut link_inputs: Vec<Resolved> = Vec::new();
        let mut prerequisites = order_only.clone();

        for entry in resolved {
            let (path, produced_by) = match entry {
                Resolved::File(ref path) => (path.clone(), None),
                Resolved::Target(id) => match self.graph.target(id) {
                    Some(t) if t.is_phony() => {
                        prerequisites.push(id);
                        continue;
                    }
                    Some(t) if t.kind != TargetKind::Custom => {
                        link_inputs.push(entry);
                        continue;
                    }
                    Some(t) => match t.primary_output() {
                        Some(p) => (p.clone(), Some(id)),
                        None => continue,
                    },
                    None => continue,
                },
            };
            match SourceRole::for_extension(path.extension()) {
                SourceRole::Compile(lang) => compiles.push((lang, entry, path)),
                SourceRole::Header => {
                    // Generated headers must exist before anything compiles.
                    if let Some(id) = produced_by {
                        prerequisites.push(id);
                    }
                }
                SourceRole::Object => link_inputs.push(entry),
                SourceRole::Unsupported => {
                    return Err(ProjectError::UnsupportedSource {
                        target: decl.name.clone(),
                        path: path.to_string(),
                    }
                    .into())
                }
            }
        }

        if compiles.is_empty() && link_inputs.is_empty() {
            return Err(ProjectError::MissingField {
                target: decl.name.clone(),
                field: "sources",
            }
            .into());
        }

        let object_ext = TargetKind::Object.extension(&os);
        let mut stems: HashMap<String, usize> = HashMap::new();
        for (_, _, path) in &compiles {
            *stems.entry(stem(path)).or_default() += 1;
        }

        let mut objects = Vec::with_capacity(compiles.len());
        for (lang, entry, path) in compiles {
            let base = stem(&path);
            let relative = if stems[&base] > 1 {
                path.with_extension(object_ext)
                    .suffix()
                    .trim_start_matches('/')
                    .replace(':', "")
            } else {
                format!("{}.{}", base, object_ext)
            };
            let output = build_path(&decl.name, &format!("obj/{}/{}", decl.name, relative))?;

            let mut object = Target::new(output.suffix(), TargetKind::Object)
                .with_rule(Toolchain::compile_rule(lang))
                .with_output(output);
            self.set_variables(&decl.name, &mut object, &[("flags", spec.flags.as_str())])?;

            let id = self.graph.add_target(object)?;
            self.connect(id, &entry, EdgeKind::Explicit)?;
            for &dep in &prerequisites {
                self.graph.add_edge(dep, id, EdgeKind::OrderOnly)?;
            }
            objects.push(id);
        }

        let rule = match kind {
            TargetKind::Library(LinkKind::Static) => toolchain::ARCHIVE,
            TargetKind::Library(LinkKind::Shared) => toolchain::LINK_SHARED,
            _ => toolchain::LINK,
        };
        let output = build_path(&decl.name, &kind.output_filename(&decl.name, &os))?;
        let mut target = Target::new(&decl.name, kind).with_rule(rule).with_output(output);
        target.description = decl.description.clone();
        self.set_variables(&decl.name, &mut target, &[("ldflags", spec.ldflags.as_str())])?;

        let libs = self.link_libraries(&decl.name, &spec.libs)?;
        let id = self.graph.add_target(target)?;
        for object in objects {
            self.graph.add_edge(object, id, EdgeKind::Explicit)?;
        }
        for entry in &link_inputs {
            self.connect(id, entry, EdgeKind::Explicit)?;
        }

        if kind == TargetKind::Library(LinkKind::Static) {
            // Archives do not link; whoever links this archive links these.
            self.link_closure.insert(decl.name.clone(), libs);
        } else {
            for lib in libs {
                self.graph.add_edge(lib, id, EdgeKind::Explicit)?;
            }
        }
        for dep in order_only {
            self.graph.add_edge(dep, id, EdgeKind::OrderOnly)?;
        }
        Ok(id)
    }

    fn add_custom(&mut self, decl: &TargetDecl, spec: &CustomSpec) -> Result<NodeId, Error> {
        if let Some(rule) = self.graph.rule(&spec.rule) {
            if let Some(missing) = rule
                .command
                .variables()
                .into_iter()
                .find(|v| !spec.vars.contains_key(*v))
            {
                return Err(ProjectError::MissingVariable {
                    target: decl.name.clone(),
                    rule: spec.rule.clone(),
                    variable: missing.to_string(),
                }
                .into());
            }
        }

        let inputs = self.expand(&decl.name, &spec.inputs)?;
        let implicit = self.expand(&decl.name, &spec.implicit)?;
        let order_only = self.lookup_all(&decl.name, &spec.order_only, "target")?;

        let mut target = Target::new(&decl.name, TargetKind::Custom)
            .with_rule(&spec.rule)
            .with_outputs(spec.outputs.iter().cloned());
        target.variables = spec.vars.clone();
        target.description = decl.description.clone();

        let id = self.graph.add_target(target)?;
        for entry in &inputs {
            self.connect(id, entry, EdgeKind::Explicit)?;
        }
        for entry in &implicit {
            self.connect(id, entry, EdgeKind::Implicit)?;
        }
        for dep in order_only {
            self.graph.add_edge(dep, id, EdgeKind::OrderOnly)?;
        }
        Ok(id)
    }

    /// Flatten a source list.
    fn expand(&mut self, owner: &str, specs: &[SourceSpec]) -> Result<Vec<Resolved>, Error> {
        let mut out = Vec::new();
        self.expand_into(owner, specs, &mut Vec::new(), &mut out)?;
        Ok(out)
    }

    fn expand_into(
        &mut self,
        owner: &str,
        specs: &[SourceSpec],
        groups: &mut Vec<String>,
        out: &mut Vec<Resolved>,
    ) -> Result<(), Error> {
        let project = self.project;
        for spec in specs {
            match spec {
                SourceSpec::Path(path) => out.push(Resolved::File(path.clone())),
                SourceSpec::Glob { query, options } => {
                    let found = self.cache.find(query, *options)?;
                    out.extend(found.matches.iter().cloned().map(Resolved::File));
                    self.graph.add_distribution(found.extra.iter().cloned());
                }
                SourceSpec::Group(name) => {
                    let decl = project.target(name).ok_or_else(|| GraphError::UnknownReference {
                        kind: "file group",
                        name: name.clone(),
                        referrer: owner.to_string(),
                    })?;
                    let DeclKind::FileGroup { sources } = &decl.kind else {
                        return Err(ProjectError::NotAFileGroup {
                            target: owner.to_string(),
                            name: name.clone(),
                        }
                        .into());
                    };
                    if let Some(start) = groups.iter().position(|g| g == name) {
                        let mut path = groups[start..].to_vec();
                        path.push(name.clone());
                        return Err(GraphError::CycleDetected { path }.into());
                    }
                    groups.push(name.clone());
                    self.expand_into(name, sources, groups, out)?;
                    groups.pop();
                }
                SourceSpec::Target(name) => {
                    let id = self.graph.lookup(name).ok_or_else(|| GraphError::UnknownReference {
                        kind: "target",
                        name: name.clone(),
                        referrer: owner.to_string(),
                    })?;
                    out.push(Resolved::Target(id));
                }
            }
        }
        Ok(())
    }

    fn lookup_all(
        &self,
        owner: &str,
        names: &[String],
        kind: &'static str,
    ) -> Result<Vec<NodeId>, Error> {
        names
            .iter()
            .map(|name| {
                self.graph.lookup(name).ok_or_else(|| {
                    Error::from(GraphError::UnknownReference {
                        kind,
                        name: name.clone(),
                        referrer: owner.to_string(),
                    })
                })
            })
            .collect()
    }

    /// The libraries a link of `owner` needs, static dependencies included.
    /// A library listed twice keeps its last position so that archives
    /// come after everything using them.
    fn link_libraries(&self, owner: &str, names: &[String]) -> Result<Vec<NodeId>, Error> {
        let mut libs = Vec::new();
        for (name, id) in names.iter().zip(self.lookup_all(owner, names, "library")?) {
            match self.graph.target(id).map(|t| t.kind) {
                Some(TargetKind::Library(link)) => {
                    libs.push(id);
                    if link == LinkKind::Static {
                        libs.extend(self.link_closure.get(name).into_iter().flatten());
                    }
                }
                _ => {
                    return Err(GraphError::InvalidTarget {
                        target: owner.to_string(),
                        reason: "`libs` may only name library targets",
                    }
                    .into())
                }
            }
        }

        let mut deduped = Vec::with_capacity(libs.len());
        for (i, id) in libs.iter().enumerate() {
            if !libs[i + 1..].contains(id) {
                deduped.push(*id);
            }
        }
        Ok(deduped)
    }

    /// Set the rule variables a toolchain target may use, failing when its
    /// rule wants one the project cannot supply.
    fn set_variables(
        &self,
        owner: &str,
        target: &mut Target,
        available: &[(&str, &str)],
    ) -> Result<(), Error> {
        let Some(rule) = target.rule.as_deref().and_then(|r| self.graph.rule(r)) else {
            return Ok(());
        };
        let mut variables = Vec::new();
        for var in rule.command.variables() {
            match available.iter().find(|(name, _)| *name == var) {
                Some((name, value)) => variables.push((name.to_string(), value.to_string())),
                None => {
                    return Err(ProjectError::MissingVariable {
                        target: owner.to_string(),
                        rule: rule.name.clone(),
                        variable: var.to_string(),
                    }
                    .into())
                }
            }
        }
        target.variables.extend(variables);
        Ok(())
    }

    fn connect(&mut self, to: NodeId, entry: &Resolved, kind: EdgeKind) -> Result<(), Error> {
        match entry {
            Resolved::File(path) => self.graph.add_input(to, path.clone(), kind)?,
            Resolved::Target(id) => self.graph.add_edge(*id, to, kind)?,
        }
        Ok(())
    }
}

/// File name without its extension.
fn stem(path: &BuildPath) -> String {
    path.with_extension("").file_name().to_string()
}

fn build_path(owner: &str, path: &str) -> Result<BuildPath, Error> {
    BuildPath::build(path).map_err(|source| {
        Error::from(ProjectError::Path {
            owner: owner.to_string(),
            source,
        })
    })
}
