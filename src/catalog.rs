// src/catalog.rs

//! Package catalog adapter: which packages are installed, whether they were
//! explicitly requested, and which files they own.
//!
//! The tracker core only depends on the `PackageCatalog` trait; the pacman
//! implementation shells out to the local pacman database. Malformed output
//! lines are skipped with a warning rather than propagated inward.

use crate::error::{Error, Result};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::process::Command;
use tracing::{debug, warn};

/// One installed package as reported by the package manager.
#[derive(Debug, Clone)]
pub struct InstalledPackage {
    pub name: String,
    /// Installed by direct user request (vs pulled in as a dependency).
    pub explicit: bool,
    /// Some other installed package depends on this one. A package with
    /// this flag is never a removal candidate.
    pub required_by_other: bool,
    pub description: Option<String>,
    /// Absolute paths owned by this package; read fresh each scan.
    pub owned_files: Vec<PathBuf>,
}

/// Catalog attributes without the file list, cached for the query path.
#[derive(Debug, Clone, Serialize)]
pub struct PackageMeta {
    pub name: String,
    pub explicit: bool,
    pub required_by_other: bool,
    pub description: Option<String>,
}

impl InstalledPackage {
    pub fn meta(&self) -> PackageMeta {
        PackageMeta {
            name: self.name.clone(),
            explicit: self.explicit,
            required_by_other: self.required_by_other,
            description: self.description.clone(),
        }
    }
}

/// Boundary to the system package manager. Must be cheap to call repeatedly;
/// errors propagate as a scan failure.
pub trait PackageCatalog: Send + Sync {
    fn list_installed(&self) -> Result<Vec<InstalledPackage>>;
}

/// Catalog adapter backed by the local pacman database.
pub struct PacmanCatalog;

impl PacmanCatalog {
    fn run(args: &[&str]) -> Result<String> {
        let output = Command::new("pacman").args(args).output().map_err(|e| {
            Error::Adapter(format!("failed to run pacman: {}. Is pacman installed?", e))
        })?;

        if !output.status.success() {
            return Err(Error::Adapter(format!(
                "pacman {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Check if pacman is available on this system
    pub fn is_available() -> bool {
        Command::new("pacman")
            .args(["--version"])
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }
}

impl PackageCatalog for PacmanCatalog {
    fn list_installed(&self) -> Result<Vec<InstalledPackage>> {
        debug!("Querying installed pacman packages");

        // Three bulk queries instead of one subprocess per package.
        let explicit = parse_name_list(&Self::run(&["-Qqe"])?);
        let info = parse_query_info(&Self::run(&["-Qi"])?);
        let mut files = parse_file_list(&Self::run(&["-Ql"])?);

        let packages: Vec<InstalledPackage> = info
            .into_iter()
            .map(|pkg| InstalledPackage {
                explicit: explicit.contains(&pkg.name),
                owned_files: files.remove(&pkg.name).unwrap_or_default(),
                required_by_other: pkg.required_by_other,
                description: pkg.description,
                name: pkg.name,
            })
            .collect();

        debug!("Catalog reports {} installed packages", packages.len());
        Ok(packages)
    }
}

/// Intermediate parse result for one `pacman -Qi` block.
#[derive(Debug, Default)]
struct PackageInfo {
    name: String,
    description: Option<String>,
    required_by_other: bool,
}

/// Parse `pacman -Qqe` style output: one package name per line.
fn parse_name_list(output: &str) -> HashSet<String> {
    output
        .lines()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .map(|line| line.to_string())
        .collect()
}

/// Parse bulk `pacman -Qi` output. Blocks are separated by blank lines;
/// long field values wrap onto indented continuation lines.
fn parse_query_info(output: &str) -> Vec<PackageInfo> {
    let mut packages = Vec::new();
    let mut current: Option<PackageInfo> = None;
    let mut last_key = String::new();

    for line in output.lines() {
        if line.trim().is_empty() {
            if let Some(pkg) = current.take() {
                packages.push(pkg);
            }
            last_key.clear();
            continue;
        }

        if line.starts_with(char::is_whitespace) {
            // Continuation of the previous field's value.
            if last_key == "Required By" && line.trim() != "None" {
                if let Some(pkg) = current.as_mut() {
                    pkg.required_by_other = true;
                }
            }
            continue;
        }

        let Some((key, value)) = line.split_once(':') else {
            warn!("Skipping malformed pacman -Qi line: {}", line);
            continue;
        };
        let key = key.trim();
        let value = value.trim();
        last_key = key.to_string();

        match key {
            "Name" => {
                if let Some(pkg) = current.take() {
                    packages.push(pkg);
                }
                current = Some(PackageInfo {
                    name: value.to_string(),
                    ..Default::default()
                });
            }
            "Description" => {
                if let Some(pkg) = current.as_mut() {
                    pkg.description = (value != "None").then(|| value.to_string());
                }
            }
            "Required By" => {
                if let Some(pkg) = current.as_mut() {
                    pkg.required_by_other = value != "None" && !value.is_empty();
                }
            }
            _ => {}
        }
    }

    if let Some(pkg) = current.take() {
        packages.push(pkg);
    }

    packages
}

/// Parse bulk `pacman -Ql` output: "package /path/to/file" per line.
/// Directories (trailing slash) are skipped.
fn parse_file_list(output: &str) -> HashMap<String, Vec<PathBuf>> {
    let mut files: HashMap<String, Vec<PathBuf>> = HashMap::new();

    for line in output.lines() {
        let Some((name, path)) = line.split_once(' ') else {
            continue;
        };
        let path = path.trim();
        if path.is_empty() || path.ends_with('/') {
            continue;
        }
        files
            .entry(name.to_string())
            .or_default()
            .push(PathBuf::from(path));
    }

    files
}
