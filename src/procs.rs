// src/procs.rs

//! Process snapshot adapter: which executables are running right now.
//!
//! The default implementation walks `/proc/<pid>/exe` symlinks. Processes
//! that exit mid-walk or belong to other users show up as unreadable links
//! and are skipped; a snapshot is inherently best-effort.

use crate::error::Result;
use std::path::PathBuf;
use tracing::{debug, trace};

/// Boundary to the running-process view of the system.
pub trait ProcessSnapshot: Send + Sync {
    /// Executable paths of currently running processes. May contain
    /// duplicates when several processes share a binary.
    fn running_executables(&self) -> Result<Vec<PathBuf>>;
}

/// Snapshot adapter reading `/proc` directly.
pub struct ProcSnapshot {
    root: PathBuf,
}

impl ProcSnapshot {
    pub fn new() -> Self {
        Self {
            root: PathBuf::from("/proc"),
        }
    }

    /// Walk a procfs-shaped tree rooted elsewhere. Used by tests.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Default for ProcSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessSnapshot for ProcSnapshot {
    fn running_executables(&self) -> Result<Vec<PathBuf>> {
        let mut executables = Vec::new();

        for entry in std::fs::read_dir(&self.root)? {
            let Ok(entry) = entry else {
                continue;
            };

            // Only numeric entries are process directories.
            if !entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.bytes().all(|b| b.is_ascii_digit()))
            {
                continue;
            }

            let exe_link = entry.path().join("exe");
            match std::fs::read_link(&exe_link) {
                Ok(target) => executables.push(normalize_exe_target(target)),
                Err(e) => {
                    // Kernel threads, vanished pids, and foreign-user
                    // processes all land here.
                    trace!("Skipping {}: {}", exe_link.display(), e);
                }
            }
        }

        debug!("Process snapshot: {} executables", executables.len());
        Ok(executables)
    }
}

/// The kernel appends " (deleted)" to the link target when the binary was
/// replaced on disk after the process started. Strip it so the path still
/// matches the catalog's file list.
fn normalize_exe_target(target: PathBuf) -> PathBuf {
    const DELETED_SUFFIX: &str = " (deleted)";

    match target.to_str() {
        Some(s) if s.ends_with(DELETED_SUFFIX) => {
            PathBuf::from(&s[..s.len() - DELETED_SUFFIX.len()])
        }
        _ => target,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;
    use tempfile::TempDir;

    fn fake_proc(entries: &[(&str, Option<&str>)]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for (pid, exe) in entries {
            let pid_dir = dir.path().join(pid);
            std::fs::create_dir(&pid_dir).unwrap();
            if let Some(target) = exe {
                symlink(target, pid_dir.join("exe")).unwrap();
            }
        }
        dir
    }

    #[test]
    fn test_walks_numeric_pid_dirs_only() {
        let proc_root = fake_proc(&[
            ("1", Some("/usr/bin/init")),
            ("42", Some("/usr/bin/firefox")),
            ("self", Some("/usr/bin/ignored")),
            ("sys", None),
        ]);

        let mut exes = ProcSnapshot::with_root(proc_root.path())
            .running_executables()
            .unwrap();
        exes.sort();

        assert_eq!(
            exes,
            vec![
                PathBuf::from("/usr/bin/firefox"),
                PathBuf::from("/usr/bin/init"),
            ]
        );
    }

    #[test]
    fn test_skips_unreadable_exe_links() {
        // A pid dir with no exe link stands in for a kernel thread.
        let proc_root = fake_proc(&[("7", None), ("8", Some("/usr/bin/vim"))]);

        let exes = ProcSnapshot::with_root(proc_root.path())
            .running_executables()
            .unwrap();

        assert_eq!(exes, vec![PathBuf::from("/usr/bin/vim")]);
    }

    #[test]
    fn test_duplicates_are_preserved() {
        let proc_root = fake_proc(&[
            ("10", Some("/usr/bin/bash")),
            ("11", Some("/usr/bin/bash")),
        ]);

        let exes = ProcSnapshot::with_root(proc_root.path())
            .running_executables()
            .unwrap();

        assert_eq!(exes.len(), 2);
    }

    #[test]
    fn test_deleted_suffix_is_stripped() {
        let proc_root = fake_proc(&[("20", Some("/usr/bin/old-daemon (deleted)"))]);

        let exes = ProcSnapshot::with_root(proc_root.path())
            .running_executables()
            .unwrap();

        assert_eq!(exes, vec![PathBuf::from("/usr/bin/old-daemon")]);
    }

    #[test]
    fn test_normalize_plain_path_untouched() {
        assert_eq!(
            normalize_exe_target(PathBuf::from("/usr/bin/vim")),
            PathBuf::from("/usr/bin/vim")
        );
    }
}
