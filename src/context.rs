//! Owned two-store context
//!
//! Most operations act over both the project and global stores. They
//! travel together in one explicit context object rather than any
//! process-wide singleton.

use std::path::{Path, PathBuf};

use crate::config;
use crate::error::Result;
use crate::git;
use crate::storage::Store;
use crate::types::Scope;

/// The project store, the global store, and the working context they
/// were opened for
pub struct MemoryContext {
    pub project: Store,
    pub global: Store,
    pub cwd: PathBuf,
    pub branch: Option<String>,
}

impl MemoryContext {
    /// Open both stores for a project directory
    pub fn open(cwd: &Path) -> Result<Self> {
        let project = Store::open(config::project_store_path(cwd))?;
        let global = Store::open(config::global_store_path()?)?;
        let branch = git::current_branch(cwd);
        Ok(Self {
            project,
            global,
            cwd: cwd.to_path_buf(),
            branch,
        })
    }

    /// Assemble a context from already-open stores (used by tests)
    pub fn with_stores(
        project: Store,
        global: Store,
        cwd: PathBuf,
        branch: Option<String>,
    ) -> Self {
        Self {
            project,
            global,
            cwd,
            branch,
        }
    }

    /// The store that owns memories of the given scope
    pub fn store_for(&self, scope: Scope) -> &Store {
        match scope {
            Scope::Project => &self.project,
            Scope::Global => &self.global,
        }
    }

    /// Both stores, project first
    pub fn stores(&self) -> [(Scope, &Store); 2] {
        [(Scope::Project, &self.project), (Scope::Global, &self.global)]
    }
}
