use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Resolves `path` to a canonical, symlink-free absolute path.
///
/// Unlike [`Path::canonicalize`] used directly, failures are wrapped into
/// the crate's own [`Error::Fs`] so callers get offending-path context.
pub fn realpath(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    std::fs::canonicalize(path)
        .map_err(|e| Error::fs(path, e.to_string()))
}

/// `dirname` is the parent directory of `path`; the root of an already-root
/// path returns itself, matching POSIX `dirname(3)` rather than panicking.
pub fn dirname(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    path.parent().map(Path::to_path_buf).unwrap_or_else(|| path.to_path_buf())
}

/// Join `base` with `rel` unless `rel` is already absolute, a linker flag
/// (`-lfoo`), or a variable-prefixed path (`$ORIGIN/..`) that must pass
/// through untouched.
pub fn resolve_relative(base: &Path, rel: &str) -> PathBuf {
    if rel.starts_with('-') || rel.starts_with('$') {
        return PathBuf::from(rel);
    }
    let candidate = Path::new(rel);
    if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        base.join(candidate)
    }
}

/// Strips the `prefix` directory from the front of `path` for display in the
/// generated manifest, leaving `path` untouched if `prefix` isn't a true
/// ancestor.
pub fn deprefix<'a>(path: &'a Path, prefix: &Path) -> &'a Path {
    path.strip_prefix(prefix).unwrap_or(path)
}

/// The filename minus its final extension, e.g. `a/b/foo.cc` -> `foo`.
pub fn stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Lowercased final extension without the leading dot, or empty if none.
pub fn extension(path: &Path) -> String {
    path.extension()
        .map(|s| s.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}
