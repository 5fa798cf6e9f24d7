use std::ops::{Add, AddAssign};
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::{debug, error, info};
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::rewrite::{clean_file, Outcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options {
    /// Parse and decide only; never write.
    pub dry_run: bool,
    /// Files processed concurrently. `1` keeps everything on the calling thread.
    pub jobs: usize,
}

impl Default for Options {
    fn default() -> Options {
        Options { dry_run: false, jobs: 1 }
    }
}

/// Totals for one run. In dry-run mode `changed` counts files that would be cleaned.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub total: usize,
    pub changed: usize,
    pub errors: usize,
}

impl Summary {
    fn file(changed: bool) -> Summary {
        Summary { total: 1, changed: changed as usize, errors: 0 }
    }

    fn failed_file() -> Summary {
        Summary { total: 1, changed: 0, errors: 1 }
    }

    /// Human readable report, one line per fact.
    pub fn report(&self, dry_run: bool) -> String {
        let mut lines = Vec::new();
        if dry_run {
            lines.push(format!(
                "Dry run complete: {} files checked, {} would be cleaned, {} errors",
                self.total, self.changed, self.errors
            ));
        } else if self.changed > 0 {
            lines.push(format!("GZIP header cleaning complete: {}/{} files cleaned", self.changed, self.total));
        } else {
            lines.push(format!("All {} .gz files already have clean headers", self.total));
        }
        if self.errors > 0 {
            lines.push(format!("{} files had errors during processing", self.errors));
        }
        lines.join("\n")
    }
}

impl Add for Summary {
    type Output = Summary;

    fn add(self, other: Summary) -> Summary {
        Summary {
            total: self.total + other.total,
            changed: self.changed + other.changed,
            errors: self.errors + other.errors,
        }
    }
}

impl AddAssign for Summary {
    fn add_assign(&mut self, other: Summary) {
        *self = *self + other;
    }
}

fn is_gzip_name(path: &Path) -> bool {
    path.extension().map_or(false, |ext| ext == "gz")
}

/// Every regular `*.gz` file below `root`, in file-name order. Symlinks are not followed and not
/// returned: replacing one would turn it into a regular file.
pub fn find_targets(root: &Path) -> impl Iterator<Item = Result<PathBuf>> {
    WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => {
                if entry.file_type().is_file() && is_gzip_name(entry.path()) {
                    Some(Ok(entry.into_path()))
                } else {
                    None
                }
            }
            Err(err) => Some(Err(Error::from(err))),
        })
}

fn process(path: &Path, dry_run: bool) -> Summary {
    match clean_file(path, dry_run) {
        Ok(Outcome::Unchanged(_)) => {
            debug!("Already clean {}", path.display());
            Summary::file(false)
        }
        Ok(Outcome::WouldClean(decision)) => {
            info!("Would clean {} ({})", path.display(), decision);
            Summary::file(true)
        }
        Ok(Outcome::Cleaned(decision)) => {
            info!("Cleaned {} ({})", path.display(), decision);
            Summary::file(true)
        }
        Err(err) => {
            error!("Error processing {}: {}", path.display(), err);
            Summary::failed_file()
        }
    }
}

/// Clean every `.gz` file below `root`.
///
/// Only a missing or non-directory `root`, or a worker pool that cannot be started, fail the
/// run. Per-file errors, including unreadable directory entries, are logged and counted.
pub fn run(root: &Path, options: &Options) -> Result<Summary> {
    if !root.exists() {
        return Err(Error::RootNotFound(root.to_path_buf()));
    }
    if !root.is_dir() {
        return Err(Error::RootNotDirectory(root.to_path_buf()));
    }

    let mut summary = Summary::default();
    let mut targets = Vec::new();
    for target in find_targets(root) {
        match target {
            Ok(path) => targets.push(path),
            Err(err) => {
                error!("{}", err);
                summary.errors += 1;
            }
        }
    }

    if targets.is_empty() {
        debug!("No .gz files found under {}", root.display());
        return Ok(summary);
    }
    debug!("Found {} .gz files to check", targets.len());

    let dry_run = options.dry_run;
    summary += if options.jobs > 1 {
        let pool = rayon::ThreadPoolBuilder::new().num_threads(options.jobs).build()?;
        pool.install(|| {
            targets
                .par_iter()
                .map(|path| process(path, dry_run))
                .reduce(Summary::default, |a, b| a + b)
        })
    } else {
        targets
            .iter()
            .map(|path| process(path, dry_run))
            .fold(Summary::default(), |a, b| a + b)
    };

    Ok(summary)
}
