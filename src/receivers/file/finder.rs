// SPDX-License-Identifier: Apache-2.0

use glob::Pattern;
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::debug;

use crate::receivers::file::error::{Error, Result};

/// Expands include globs into a deduplicated path list, with exclude
/// patterns taking precedence. Patterns are validated at build time;
/// per-path errors during a scan are transient and only logged.
#[derive(Debug)]
pub struct Finder {
    include: Vec<String>,
    exclude: Vec<Pattern>,
}

impl Finder {
    pub fn new(include: Vec<String>, exclude: Vec<String>) -> Result<Self> {
        for pattern in &include {
            Pattern::new(pattern).map_err(|source| Error::InvalidGlob {
                pattern: pattern.clone(),
                source,
            })?;
        }

        let exclude = exclude
            .iter()
            .map(|pattern| {
                Pattern::new(pattern).map_err(|source| Error::InvalidGlob {
                    pattern: pattern.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { include, exclude })
    }

    /// Scan the filesystem for matching files.
    pub fn find(&self) -> Vec<PathBuf> {
        let mut seen = HashSet::new();
        let mut paths = Vec::new();

        for pattern in &self.include {
            // Patterns were validated in new()
            let matches = match glob::glob(pattern) {
                Ok(m) => m,
                Err(_) => continue,
            };

            for entry in matches {
                let path = match entry {
                    Ok(p) => p,
                    Err(e) => {
                        debug!(error = %e, "skipping unreadable glob match");
                        continue;
                    }
                };

                if path.is_dir() {
                    continue;
                }

                if self.exclude.iter().any(|x| x.matches_path(&path)) {
                    continue;
                }

                if seen.insert(path.clone()) {
                    paths.push(path);
                }
            }
        }

        paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(dir: &TempDir, names: &[&str]) {
        for name in names {
            fs::write(dir.path().join(name), format!("content of {name}")).unwrap();
        }
    }

    #[test]
    fn test_basic_include() {
        let dir = TempDir::new().unwrap();
        touch(&dir, &["a.log", "b.log", "c.txt"]);

        let finder = Finder::new(vec![format!("{}/*.log", dir.path().display())], vec![]).unwrap();
        assert_eq!(finder.find().len(), 2);
    }

    #[test]
    fn test_exclude_takes_precedence() {
        let dir = TempDir::new().unwrap();
        touch(&dir, &["app.log", "app_debug.log"]);

        let finder = Finder::new(
            vec![format!("{}/*.log", dir.path().display())],
            vec![format!("{}/*_debug.log", dir.path().display())],
        )
        .unwrap();

        let found = finder.find();
        assert_eq!(found.len(), 1);
        assert!(found[0].ends_with("app.log"));
    }

    #[test]
    fn test_overlapping_includes_deduplicate() {
        let dir = TempDir::new().unwrap();
        touch(&dir, &["a.log"]);

        let pattern = format!("{}/*.log", dir.path().display());
        let finder = Finder::new(vec![pattern.clone(), pattern], vec![]).unwrap();
        assert_eq!(finder.find().len(), 1);
    }

    #[test]
    fn test_directories_skipped() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("sub.log")).unwrap();
        touch(&dir, &["a.log"]);

        let finder = Finder::new(vec![format!("{}/*.log", dir.path().display())], vec![]).unwrap();
        assert_eq!(finder.find().len(), 1);
    }

    #[test]
    fn test_discovers_files_created_later() {
        let dir = TempDir::new().unwrap();
        let finder = Finder::new(vec![format!("{}/*.log", dir.path().display())], vec![]).unwrap();

        assert!(finder.find().is_empty());

        touch(&dir, &["late.log"]);
        assert_eq!(finder.find().len(), 1);
    }

    #[test]
    fn test_invalid_pattern_rejected_at_build() {
        assert!(Finder::new(vec!["[".to_string()], vec![]).is_err());
        assert!(Finder::new(vec!["*.log".to_string()], vec!["[".to_string()]).is_err());
    }
}
