use std::{
    path::{Path, PathBuf},
    time::SystemTime,
};

use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::error::{Error, Result};

/// A document file found under the source directory.
#[derive(Debug, Clone)]
pub struct DiscoveredFile {
    /// Path relative to the source root.
    pub relative_path: PathBuf,
    /// Fully resolved absolute path.
    pub absolute_path: PathBuf,
    /// Last modification time as seconds since the Unix epoch.
    pub mtime: u64,
}

/// Relative-path globs that exclude files from discovery.
#[derive(Debug, Clone, Default)]
pub struct Excludes {
    set: Option<GlobSet>,
}

impl Excludes {
    pub fn new(patterns: &[String]) -> Result<Self> {
        if patterns.is_empty() {
            return Ok(Self::default());
        }

        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = Glob::new(pattern).map_err(|e| {
                Error::Config(format!("invalid exclude pattern '{pattern}': {e}"))
            })?;
            builder.add(glob);
        }
        let set = builder.build().map_err(|e| {
            Error::Config(format!("invalid exclude patterns: {e}"))
        })?;

        Ok(Self { set: Some(set) })
    }

    fn is_excluded(&self, relative: &Path) -> bool {
        self.set.as_ref().is_some_and(|set| set.is_match(relative))
    }
}

/// Recursively walk a directory and discover every regular file in it.
///
/// Skips hidden files/directories (names starting with `.`) and anything
/// matching `excludes`. Whether a file holds text is decided when it is
/// read. Results are sorted by relative path.
pub fn discover_files(
    root: &Path,
    excludes: &Excludes,
) -> Result<Vec<DiscoveredFile>> {
    if !root.exists() {
        return Err(Error::NotFound {
            kind: "directory",
            path: root.to_path_buf(),
        });
    }
    if !root.is_dir() {
        return Err(Error::NotADirectory(root.to_path_buf()));
    }

    let canonical_root = root.canonicalize()?;
    let mut results = Vec::new();
    walk_dir(&canonical_root, &canonical_root, excludes, &mut results)?;
    results.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(results)
}

fn walk_dir(
    root: &Path,
    current: &Path,
    excludes: &Excludes,
    results: &mut Vec<DiscoveredFile>,
) -> Result<()> {
    for entry in std::fs::read_dir(current)? {
        let entry = entry?;
        let file_name = entry.file_name();
        if file_name.to_string_lossy().starts_with('.') {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(&path);
        if excludes.is_excluded(relative) {
            tracing::debug!(path = %relative.display(), "excluded");
            continue;
        }

        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            walk_dir(root, &path, excludes, results)?;
        } else if file_type.is_symlink() {
            // Follow links to files only; directory links could loop.
            let Ok(resolved) = path.canonicalize() else {
                tracing::debug!(path = %path.display(), "broken symlink");
                continue;
            };
            if resolved.is_file() {
                results.push(make_discovered(root, &path, &resolved)?);
            }
        } else if file_type.is_file() {
            let abs = path.canonicalize()?;
            results.push(make_discovered(root, &path, &abs)?);
        }
    }

    Ok(())
}

fn make_discovered(
    root: &Path,
    original_path: &Path,
    absolute_path: &Path,
) -> Result<DiscoveredFile> {
    let relative_path = original_path
        .strip_prefix(root)
        .unwrap_or(original_path)
        .to_path_buf();

    let mtime = std::fs::metadata(absolute_path)?
        .modified()
        .unwrap_or(SystemTime::UNIX_EPOCH)
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    Ok(DiscoveredFile {
        relative_path,
        absolute_path: absolute_path.to_path_buf(),
        mtime,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(files: &[DiscoveredFile]) -> Vec<String> {
        files
            .iter()
            .map(|f| f.relative_path.to_string_lossy().to_string())
            .collect()
    }

    #[test]
    fn discovers_files_of_any_extension() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("note.md"), "# Hello").unwrap();
        std::fs::write(tmp.path().join("script.py"), "print('hi')").unwrap();
        std::fs::write(tmp.path().join("data.json"), "{}").unwrap();
        std::fs::write(tmp.path().join("Makefile"), "all:").unwrap();

        let files = discover_files(tmp.path(), &Excludes::default()).unwrap();
        assert_eq!(
            names(&files),
            vec!["Makefile", "data.json", "note.md", "script.py"]
        );
    }

    #[test]
    fn skips_hidden_entries() {
        let tmp = tempfile::tempdir().unwrap();
        let git = tmp.path().join(".git");
        std::fs::create_dir(&git).unwrap();
        std::fs::write(git.join("config.md"), "git config").unwrap();
        std::fs::write(tmp.path().join(".hidden.md"), "secret").unwrap();
        std::fs::write(tmp.path().join("visible.md"), "hello").unwrap();

        let files = discover_files(tmp.path(), &Excludes::default()).unwrap();
        assert_eq!(names(&files), vec!["visible.md"]);
    }

    #[test]
    fn recurses_subdirectories() {
        let tmp = tempfile::tempdir().unwrap();
        let sub = tmp.path().join("subdir");
        std::fs::create_dir(&sub).unwrap();
        std::fs::write(sub.join("deep.md"), "deep").unwrap();
        std::fs::write(tmp.path().join("top.md"), "top").unwrap();

        let files = discover_files(tmp.path(), &Excludes::default()).unwrap();
        assert_eq!(names(&files), vec!["subdir/deep.md", "top.md"]);
        assert!(files.iter().all(|f| f.absolute_path.is_absolute()));
        assert!(files.iter().all(|f| f.mtime > 0));
    }

    #[test]
    fn excludes_match_relative_paths() {
        let tmp = tempfile::tempdir().unwrap();
        let drafts = tmp.path().join("drafts");
        std::fs::create_dir(&drafts).unwrap();
        std::fs::write(drafts.join("wip.md"), "wip").unwrap();
        std::fs::write(tmp.path().join("done.md"), "done").unwrap();
        std::fs::write(tmp.path().join("scratch.txt"), "scratch").unwrap();

        let excludes =
            Excludes::new(&["drafts".to_string(), "*.txt".to_string()])
                .unwrap();
        let files = discover_files(tmp.path(), &excludes).unwrap();
        assert_eq!(names(&files), vec!["done.md"]);
    }

    #[test]
    fn invalid_exclude_is_config_error() {
        let err = Excludes::new(&["a[".to_string()]).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn missing_root_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let err = discover_files(&tmp.path().join("nope"), &Excludes::default())
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn file_root_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("single.md");
        std::fs::write(&file, "x").unwrap();

        let err = discover_files(&file, &Excludes::default()).unwrap_err();
        assert!(matches!(err, Error::NotADirectory(_)));
    }

    #[test]
    fn empty_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let files = discover_files(tmp.path(), &Excludes::default()).unwrap();
        assert!(files.is_empty());
    }
}
