// src/resolver.rs

//! Executable path to owning package resolution.
//!
//! The index is built once per scan by inverting the catalog's
//! package-to-files mapping. Resolution is a pure lookup apart from a single
//! symlink metadata read; failure to resolve is an outcome, not an error.

use crate::catalog::InstalledPackage;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Ownership of one catalog path.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Owner {
    Unique(String),
    /// Claimed by more than one package. Resolution through an ambiguous
    /// path always fails rather than guessing.
    Ambiguous,
}

/// File path to owning package index for one catalog snapshot.
pub struct OwnershipIndex {
    owners: HashMap<PathBuf, Owner>,
}

impl OwnershipIndex {
    /// Invert the catalog into a file-to-owner map. A path listed by two
    /// packages is marked ambiguous even if one of them lists it twice.
    pub fn build(packages: &[InstalledPackage]) -> Self {
        let mut owners: HashMap<PathBuf, Owner> = HashMap::new();

        for pkg in packages {
            for path in &pkg.owned_files {
                owners
                    .entry(path.clone())
                    .and_modify(|owner| {
                        if !matches!(owner, Owner::Unique(name) if *name == pkg.name) {
                            *owner = Owner::Ambiguous;
                        }
                    })
                    .or_insert_with(|| Owner::Unique(pkg.name.clone()));
            }
        }

        debug!("Ownership index built over {} paths", owners.len());
        Self { owners }
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    /// Resolve an executable path to its owning package name.
    ///
    /// Exact lookup first. On a miss, if the path is itself a symlink (a
    /// wrapper in /usr/local/bin for example), follow exactly one link hop
    /// and retry; deeper chains stay unresolved.
    pub fn resolve(&self, path: &Path) -> Option<&str> {
        if let Some(owner) = self.owners.get(path) {
            return match owner {
                Owner::Unique(name) => Some(name.as_str()),
                Owner::Ambiguous => None,
            };
        }

        let target = std::fs::read_link(path).ok()?;
        let target = if target.is_absolute() {
            target
        } else {
            path.parent()?.join(target)
        };

        match self.owners.get(&target)? {
            Owner::Unique(name) => Some(name.as_str()),
            Owner::Ambiguous => None,
        }
    }
}
