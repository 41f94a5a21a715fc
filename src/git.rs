//! Git context collection
//!
//! Extraction records where a memory came from: the branch, recent commit
//! summaries, and currently changed files. Everything degrades to an
//! empty context outside a repository.

use std::path::Path;

use git2::{Repository, StatusOptions};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Number of recent commits recorded per extraction
const RECENT_COMMIT_LIMIT: usize = 5;

/// Branch, commits, and changed files at extraction time
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GitContext {
    pub branch: Option<String>,
    #[serde(default)]
    pub commits: Vec<String>,
    #[serde(default)]
    pub files: Vec<String>,
}

/// Current branch name for the repository containing `cwd`, if any
pub fn current_branch(cwd: &Path) -> Option<String> {
    let repo = Repository::discover(cwd).ok()?;
    let head = repo.head().ok()?;
    head.shorthand().map(String::from)
}

/// Collect branch, recent commit summaries, and changed file paths.
/// Never fails; a missing repository yields the default context.
pub fn collect_git_context(cwd: &Path) -> GitContext {
    let repo = match Repository::discover(cwd) {
        Ok(repo) => repo,
        Err(e) => {
            debug!("no git repository at {}: {}", cwd.display(), e);
            return GitContext::default();
        }
    };

    let branch = repo
        .head()
        .ok()
        .and_then(|head| head.shorthand().map(String::from));

    let mut commits = Vec::new();
    if let Ok(mut revwalk) = repo.revwalk() {
        if revwalk.push_head().is_ok() {
            for oid in revwalk.flatten().take(RECENT_COMMIT_LIMIT) {
                if let Ok(commit) = repo.find_commit(oid) {
                    let oid_str = oid.to_string();
                    let short = &oid_str[..7.min(oid_str.len())];
                    let summary = commit.summary().unwrap_or("").to_string();
                    commits.push(format!("{} {}", short, summary));
                }
            }
        }
    }

    let mut files = Vec::new();
    let mut status_options = StatusOptions::new();
    status_options.include_untracked(true);
    if let Ok(statuses) = repo.statuses(Some(&mut status_options)) {
        for entry in statuses.iter() {
            if let Some(path) = entry.path() {
                files.push(path.to_string());
            }
        }
    }

    GitContext {
        branch,
        commits,
        files,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_repository_yields_default() {
        let dir = tempfile::tempdir().unwrap();
        let context = collect_git_context(dir.path());
        assert!(context.branch.is_none());
        assert!(context.commits.is_empty());
        assert!(context.files.is_empty());
        assert!(current_branch(dir.path()).is_none());
    }

    #[test]
    fn test_repository_with_commit() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();

        std::fs::write(dir.path().join("file.txt"), "content").unwrap();
        let mut index = repo.index().unwrap();
        index.add_path(Path::new("file.txt")).unwrap();
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let signature = git2::Signature::now("test", "test@example.com").unwrap();
        repo.commit(
            Some("HEAD"),
            &signature,
            &signature,
            "initial commit",
            &tree,
            &[],
        )
        .unwrap();

        let context = collect_git_context(dir.path());
        assert!(context.branch.is_some());
        assert_eq!(context.commits.len(), 1);
        assert!(context.commits[0].contains("initial commit"));
    }
}
