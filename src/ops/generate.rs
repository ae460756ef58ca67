//! The generation pipeline shared by `kiln configure` and `kiln refresh`.
//!
//! Load the project, resolve discovery through the build directory's
//! store, assemble and freeze the graph, emit the build file, then persist
//! the discovery records and the description hash the regeneration check
//! compares against.

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::backend::{write_artifacts, BackendId, BackendRegistry, EmitContext};
use crate::core::path::BuildPath;
use crate::core::project::{Project, ProjectError, PROJECT_FILE};
use crate::discovery::{DiscoveryCache, DiscoveryStore, Divergence};
use crate::graph;
use crate::regen::RegenTrigger;
use crate::util::config::{project_config_path, Config, CONFIG_FILE};
use crate::util::hash::{sha256_file, sha256_str};

/// Options for one generation run. Directories must be absolute.
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    pub src_dir: PathBuf,
    pub build_dir: PathBuf,
    pub backend: BackendId,
    /// Executable the regeneration rule calls back into
    pub kiln_exe: PathBuf,
}

/// What a generation run produced.
#[derive(Debug)]
pub struct GenerateReport {
    pub backend: BackendId,

    /// Build files written
    pub artifacts: Vec<PathBuf>,

    /// Number of targets in the graph, phony ones included
    pub targets: usize,

    /// Files shipped with the project but not built from
    pub distribution: usize,

    /// Cached discovery results that changed since the previous run
    pub divergences: Vec<Divergence>,
}

/// Run the pipeline. Nothing is written unless every step before emission
/// succeeds.
pub fn generate(opts: &GenerateOptions) -> Result<GenerateReport> {
    let project_path = opts.src_dir.join(PROJECT_FILE);
    let content = std::fs::read_to_string(&project_path).map_err(|source| ProjectError::Io {
        path: project_path.clone(),
        source,
    })?;
    let project = Project::parse(&content, &project_path)?;
    let config_path = project_config_path(&opts.src_dir);
    let config = Config::load_or_default(&config_path);
    let config_hash = if config_path.is_file() {
        Some(
            sha256_file(&config_path)
                .with_context(|| format!("failed to read {}", config_path.display()))?,
        )
    } else {
        None
    };

    tracing::info!(
        "generating {} build for `{}` in {}",
        opts.backend,
        project.name,
        opts.build_dir.display()
    );

    let store = DiscoveryStore::open_in(&opts.build_dir)?;
    let cache = DiscoveryCache::new(&opts.src_dir, store).with_config(&config.discovery);

    let frozen = graph::assemble(&project, &cache)?.finalize()?;
    let divergences = cache.divergences();

    let mut trigger = RegenTrigger::new(
        &opts.src_dir,
        &opts.build_dir,
        &opts.kiln_exe,
        cache.traversed_dirs(),
    );
    if config_hash.is_some() {
        trigger = trigger.with_description(BuildPath::source(CONFIG_FILE)?);
    }
    let context = EmitContext {
        src_dir: opts.src_dir.clone(),
        build_dir: opts.build_dir.clone(),
    };

    let registry = BackendRegistry::new();
    let emitter = registry
        .get(opts.backend)
        .ok_or_else(|| anyhow::anyhow!("unknown backend: {}", opts.backend))?;
    let artifacts = emitter.emit(&frozen, &trigger, &context)?;
    write_artifacts(&artifacts)?;

    // Written after the build file so both regeneration outputs end up
    // newer than its inputs.
    let store = cache.into_store();
    store.record_input(PROJECT_FILE, sha256_str(&content));
    if let Some(hash) = config_hash {
        store.record_input(CONFIG_FILE, hash);
    }
    store
        .flush()
        .with_context(|| format!("failed to save discovery state in {}", opts.build_dir.display()))?;

    let report = GenerateReport {
        backend: opts.backend,
        artifacts: artifacts.into_iter().map(|a| a.path).collect(),
        targets: frozen.target_count(),
        distribution: frozen.distribution().count(),
        divergences,
    };
    tracing::info!(
        "wrote {} ({} targets)",
        report
            .artifacts
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", "),
        report.targets
    );
    Ok(report)
}
