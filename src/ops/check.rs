//! Implementation of `kiln check`.

use std::path::Path;

use anyhow::Result;

use crate::discovery::DiscoveryStore;
use crate::ops::refresh::load_environment;
use crate::regen::{RegenState, RegenTrigger, StaleReason};

/// Whether the build files of `build_dir` still describe the source tree.
pub fn check(build_dir: &Path) -> Result<RegenState> {
    let env = load_environment(build_dir)?;

    let build_file = env.build_dir.join(env.backend.output_file());
    if !build_file.is_file() {
        tracing::debug!("{} is missing", build_file.display());
        return Ok(RegenState::Stale(vec![StaleReason::NotGenerated]));
    }

    let store = DiscoveryStore::open_in(&env.build_dir)?;
    let state = RegenTrigger::evaluate(&env.src_dir, &store)?;
    tracing::debug!("{} is {}", env.build_dir.display(), if state.is_stale() { "stale" } else { "current" });
    Ok(state)
}
