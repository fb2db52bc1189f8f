//! Artifact file names and local glob resolution.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Extensions stripped when naming things after an archive, longest first.
const ARCHIVE_EXTENSIONS: &[&str] = &[".tar.gz", ".tgz", ".tar"];

/// Resolve a potentially glob-patterned path to an actual file.
///
/// - If path contains no glob chars (`*`, `?`, `[`, `]`), returns it unchanged after existence check
/// - If path is a glob, expands and returns most recently modified match
/// - Returns a not-found error if no files match or path doesn't exist
pub fn resolve_artifact_path(pattern: &str) -> Result<PathBuf> {
    if !contains_glob_chars(pattern) {
        let path = PathBuf::from(pattern);
        if path.is_file() {
            return Ok(path);
        }
        return Err(Error::artifact_not_found(pattern, None));
    }

    let entries: Vec<PathBuf> = glob::glob(pattern)
        .map_err(|e| {
            Error::validation_invalid_argument(
                "artifact",
                format!("Invalid glob pattern '{}': {}", pattern, e),
                Some(pattern.to_string()),
                None,
            )
        })?
        .filter_map(|entry| entry.ok())
        .filter(|p| p.is_file())
        .collect();

    let newest = entries
        .into_iter()
        .max_by_key(|p| p.metadata().and_then(|m| m.modified()).ok());

    match newest {
        Some(path) => {
            log_status!("download", "Resolved '{}' -> '{}'", pattern, path.display());
            Ok(path)
        }
        None => Err(Error::artifact_not_found(pattern, None)),
    }
}

fn contains_glob_chars(s: &str) -> bool {
    s.contains('*') || s.contains('?') || s.contains('[') || s.contains(']')
}

/// Final path component as a string.
pub fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| {
            Error::validation_invalid_argument(
                "artifact",
                "Artifact path must include a file name",
                Some(path.display().to_string()),
                None,
            )
        })
}

/// `proj-1.0.tar.gz` -> `proj-1.0`. Names without a known extension are returned as-is.
pub fn archive_stem(file_name: &str) -> &str {
    ARCHIVE_EXTENSIONS
        .iter()
        .find_map(|ext| file_name.strip_suffix(ext))
        .filter(|stem| !stem.is_empty())
        .unwrap_or(file_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use std::fs::{self, File};
    use std::io::Write;
    use std::thread;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_literal_path_exists() {
        let dir = TempDir::new().unwrap();
        let file_path = dir.path().join("proj-1.0.tar.gz");
        File::create(&file_path).unwrap();

        let result = resolve_artifact_path(file_path.to_str().unwrap());
        assert_eq!(result.unwrap(), file_path);
    }

    #[test]
    fn test_literal_path_not_exists() {
        let err = resolve_artifact_path("/nonexistent/path/proj.tar.gz").unwrap_err();
        assert_eq!(err.code, ErrorCode::ArtifactNotFound);
    }

    #[test]
    fn test_glob_pattern_multiple_matches_returns_newest() {
        let dir = TempDir::new().unwrap();

        let old_file = dir.path().join("proj-1.0.0.tar.gz");
        let mut f = File::create(&old_file).unwrap();
        f.write_all(b"old").unwrap();
        drop(f);

        thread::sleep(Duration::from_millis(50));

        let new_file = dir.path().join("proj-1.0.1.tar.gz");
        let mut f = File::create(&new_file).unwrap();
        f.write_all(b"new").unwrap();
        drop(f);

        let pattern = dir.path().join("proj-*.tar.gz");
        let result = resolve_artifact_path(pattern.to_str().unwrap());
        assert_eq!(result.unwrap(), new_file);
    }

    #[test]
    fn test_glob_pattern_no_matches() {
        let dir = TempDir::new().unwrap();
        let pattern = dir.path().join("nonexistent-*.tar.gz");
        let err = resolve_artifact_path(pattern.to_str().unwrap()).unwrap_err();
        assert_eq!(err.code, ErrorCode::ArtifactNotFound);
    }

    #[test]
    fn test_glob_pattern_ignores_directories() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("proj-1.0.0.tar.gz")).unwrap();

        let pattern = dir.path().join("proj-*.tar.gz");
        assert!(resolve_artifact_path(pattern.to_str().unwrap()).is_err());
    }

    #[test]
    fn archive_stem_strips_known_extensions_only() {
        assert_eq!(archive_stem("proj-1.0-HEAD.tar.gz"), "proj-1.0-HEAD");
        assert_eq!(archive_stem("proj.tgz"), "proj");
        assert_eq!(archive_stem("proj.tar"), "proj");
        // Not a character-set strip: trailing letters of the name survive.
        assert_eq!(archive_stem("target.tar.gz"), "target");
        assert_eq!(archive_stem("notes.txt"), "notes.txt");
        assert_eq!(archive_stem(".tar.gz"), ".tar.gz");
    }

    #[test]
    fn file_name_of_path() {
        assert_eq!(
            file_name(Path::new("/tmp/out/proj-1.0.tar.gz")).unwrap(),
            "proj-1.0.tar.gz"
        );
        assert!(file_name(Path::new("/")).is_err());
    }
}
