//! Backend registry.
//!
//! Registry construction never fails and does no I/O. Whether a backend's
//! build tool is installed is only looked up for `kiln backends`.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::backend::make::MakeEmitter;
use crate::backend::msbuild::MsBuildEmitter;
use crate::backend::ninja::NinjaEmitter;
use crate::backend::{BackendId, Emitter};

/// Registry of available emitters, ordered by [`BackendId`].
pub struct BackendRegistry {
    backends: BTreeMap<BackendId, Box<dyn Emitter>>,
}

impl BackendRegistry {
    /// Create a new registry with all built-in backends.
    pub fn new() -> Self {
        let mut registry = BackendRegistry {
            backends: BTreeMap::new(),
        };

        registry.register(Box::new(MakeEmitter));
        registry.register(Box::new(NinjaEmitter));
        registry.register(Box::new(MsBuildEmitter));

        registry
    }

    /// Register an emitter, replacing any with the same ID.
    pub fn register(&mut self, emitter: Box<dyn Emitter>) {
        self.backends.insert(emitter.id(), emitter);
    }

    /// Get a backend by ID.
    pub fn get(&self, id: BackendId) -> Option<&dyn Emitter> {
        self.backends.get(&id).map(|b| b.as_ref())
    }

    /// Get all registered backend IDs.
    pub fn ids(&self) -> impl Iterator<Item = BackendId> + '_ {
        self.backends.keys().copied()
    }

    /// Get all registered backends.
    pub fn all(&self) -> impl Iterator<Item = &dyn Emitter> + '_ {
        self.backends.values().map(|b| b.as_ref())
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    pub fn contains(&self, id: BackendId) -> bool {
        self.backends.contains_key(&id)
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Summary of a backend for display purposes.
#[derive(Debug, Clone)]
pub struct BackendSummary {
    pub id: BackendId,

    /// Build file written into the build directory
    pub output_file: &'static str,

    /// Brief description
    pub description: &'static str,

    /// Where the build tool was found on `PATH`
    pub tool_path: Option<PathBuf>,
}

impl BackendSummary {
    pub fn from_emitter(emitter: &dyn Emitter) -> Self {
        let id = emitter.id();
        let description = match id {
            BackendId::Make => "POSIX Makefile",
            BackendId::Ninja => "Ninja build file",
            BackendId::MsBuild => "MSBuild project",
        };

        BackendSummary {
            id,
            output_file: id.output_file(),
            description,
            tool_path: which::which(id.tool()).ok(),
        }
    }

    pub fn is_available(&self) -> bool {
        self.tool_path.is_some()
    }
}

/// Get all backend summaries.
pub fn get_backend_summaries(registry: &BackendRegistry) -> Vec<BackendSummary> {
    registry.all().map(BackendSummary::from_emitter).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_creation() {
        let registry = BackendRegistry::new();
        assert_eq!(registry.len(), 3);
        for id in BackendId::ALL {
            assert!(registry.contains(id));
            assert_eq!(registry.get(id).unwrap().id(), id);
        }
    }

    #[test]
    fn test_registry_order_is_stable() {
        let registry = BackendRegistry::new();
        let ids: Vec<_> = registry.ids().collect();
        assert_eq!(ids, BackendId::ALL.to_vec());
    }

    #[test]
    fn test_re_registering_replaces() {
        let mut registry = BackendRegistry::new();
        registry.register(Box::new(NinjaEmitter));
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_summaries() {
        let registry = BackendRegistry::new();
        let summaries = get_backend_summaries(&registry);
        assert_eq!(summaries.len(), 3);
        assert_eq!(summaries[1].output_file, "build.ninja");
    }
}
