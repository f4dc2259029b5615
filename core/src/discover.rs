//! Resolve a caller-given list of files/directories (plus exclusion
//! globs) into a sorted, deduplicated list of CDXJ input files.

use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("I/O error")]
    Io(#[from] std::io::Error),
    #[error("Invalid exclusion pattern: {0}")]
    InvalidPattern(String, #[source] globset::Error),
    #[error("Symlink cycle detected at {0}")]
    SymlinkCycle(PathBuf),
}

/// The kind of artifact a resolved path looks like.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FileKind {
    Cdxj,
    ZipNumIndex,
    ZipNumShard,
    Unknown,
}

impl FileKind {
    /// Identify a file by extension, falling back to sniffing the first
    /// bytes when the extension is ambiguous or absent.
    pub fn sniff(path: &Path) -> Self {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();

        if name.ends_with(".idx") {
            return FileKind::ZipNumIndex;
        }
        if name.ends_with(".cdx.gz") || name.ends_with(".cdxj.gz") {
            return FileKind::ZipNumShard;
        }
        if name.ends_with(".cdxj") || name.ends_with(".cdx") {
            return FileKind::Cdxj;
        }

        Self::sniff_content(path).unwrap_or(FileKind::Unknown)
    }

    fn sniff_content(path: &Path) -> Option<Self> {
        use std::io::Read;

        let mut file = std::fs::File::open(path).ok()?;
        let mut header = [0u8; 2];
        file.read_exact(&mut header).ok()?;

        if header == [0x1f, 0x8b] {
            Some(FileKind::ZipNumShard)
        } else {
            Some(FileKind::Cdxj)
        }
    }
}

/// Build a [`GlobSet`] from exclusion patterns given as plain strings.
pub fn build_exclusions(patterns: &[String]) -> Result<GlobSet, Error> {
    let mut builder = GlobSetBuilder::new();

    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|error| Error::InvalidPattern(pattern.clone(), error))?;
        builder.add(glob);
    }

    builder.build().map_err(|error| Error::InvalidPattern(String::new(), error))
}

fn is_excluded(path: &Path, exclusions: &GlobSet) -> bool {
    if exclusions.is_match(path) {
        return true;
    }

    path.file_name()
        .map(|name| exclusions.is_match(Path::new(name)))
        .unwrap_or(false)
}

/// Resolve a mixed list of files and directories into a sorted,
/// deduplicated list of `*.cdxj` files, honoring exclusion globs.
/// Symlinked directories are followed once; cycles abort the walk.
pub fn resolve_cdxj_inputs(
    roots: &[PathBuf],
    exclude_patterns: &[String],
) -> Result<Vec<PathBuf>, Error> {
    let exclusions = build_exclusions(exclude_patterns)?;
    let mut found = BTreeSet::new();

    for root in roots {
        if root.is_dir() {
            walk_dir(root, &exclusions, &mut found)?;
        } else {
            let canonical = root.canonicalize().unwrap_or_else(|_| root.clone());
            if !is_excluded(&canonical, &exclusions) {
                found.insert(canonical);
            }
        }
    }

    Ok(found.into_iter().collect())
}

fn walk_dir(
    root: &Path,
    exclusions: &GlobSet,
    found: &mut BTreeSet<PathBuf>,
) -> Result<(), Error> {
    let mut walker = walkdir::WalkDir::new(root).follow_links(true).into_iter();

    loop {
        let entry = match walker.next() {
            None => break,
            Some(Ok(entry)) => entry,
            Some(Err(error)) => {
                if let Some(loop_path) = error.loop_ancestor() {
                    return Err(Error::SymlinkCycle(loop_path.to_path_buf()));
                }
                return Err(Error::Io(error.into()));
            }
        };

        if entry.file_type().is_file() {
            let path = entry.path();

            if path.extension().and_then(|e| e.to_str()) == Some("cdxj") && !is_excluded(path, exclusions) {
                let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
                found.insert(canonical);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn finds_cdxj_recursively_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("b.cdxj"), "").unwrap();
        fs::write(dir.path().join("sub/a.cdxj"), "").unwrap();
        fs::write(dir.path().join("ignore.txt"), "").unwrap();

        let found = resolve_cdxj_inputs(&[dir.path().to_path_buf()], &[]).unwrap();

        assert_eq!(found.len(), 2);
        assert!(found[0] < found[1]);
    }

    #[test]
    fn exclusion_glob_removes_matches() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("keep.cdxj"), "").unwrap();
        fs::write(dir.path().join("spam.cdxj"), "").unwrap();

        let found = resolve_cdxj_inputs(
            &[dir.path().to_path_buf()],
            &["spam*".to_string()],
        )
        .unwrap();

        assert_eq!(found.len(), 1);
        assert!(found[0].ends_with("keep.cdxj"));
    }

    #[test]
    fn sniffs_extensionless_gzip_as_shard() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data");
        fs::write(&path, [0x1f, 0x8b, 0x08, 0x00]).unwrap();

        assert_eq!(FileKind::sniff(&path), FileKind::ZipNumShard);
    }
}
