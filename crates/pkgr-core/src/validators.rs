//! Binary name, path, and `PATH`-string validators.
//!
//! Grounded on `pydantic_pkgr/base_types.py`: `bin_name`, `bin_abspath`,
//! `bin_abspaths`, and the `Host*Path` validator family.

use crate::error::{PkgrError, PkgrResult};
use std::path::{Path, PathBuf};

const SCRIPT_EXTENSIONS: &[&str] = &[".py", ".js", ".sh"];

/// Normalize a path-or-symbolic-name into a canonical binary name.
///
/// - `/usr/bin/wget` -> `wget`
/// - `@postlight/parser@^2.2.3` -> `@postlight/parser`
/// - `yt-dlp==2024.05.09` -> `yt-dlp`
pub fn bin_name(input: &str) -> PkgrResult<String> {
    let invalid = |reason: &str| PkgrError::InvalidInput {
        field: "bin_name",
        value: input.to_string(),
        reason: reason.to_string(),
    };

    let stripped = input
        .split('^')
        .next()
        .unwrap_or("")
        .split('=')
        .next()
        .unwrap_or("")
        .split('>')
        .next()
        .unwrap_or("")
        .split('<')
        .next()
        .unwrap_or("");

    let stripped = if let Some(rest) = stripped.strip_prefix('@') {
        format!("@{}", rest.split('@').next().unwrap_or(""))
    } else {
        stripped.split('@').next().unwrap_or("").to_string()
    };

    if stripped.is_empty() {
        return Err(invalid("binary names must be non-empty"));
    }

    let first_char = stripped.chars().next().unwrap();
    let name = if matches!(first_char, '.' | '/' | '~') {
        Path::new(&stripped)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&stripped)
            .to_string()
    } else {
        stripped
    };

    if name.is_empty() || name.chars().count() >= 64 {
        return Err(invalid("binary names must be between 1 and 63 characters long"));
    }

    let valid_chars = name
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | ' ' | '@' | '/'));
    if !valid_chars {
        return Err(invalid("binary name can only contain a-Z0-9-_.@/ and spaces"));
    }

    let leading = name.trim_start_matches('@').chars().next();
    if !leading.is_some_and(|c| c.is_alphabetic()) {
        return Err(invalid("binary names must start with a letter or @"));
    }

    Ok(name)
}

/// Validate a `BinProvider` name: 2-15 chars, alnum + underscore, leading letter.
pub fn binprovider_name(name: &str) -> PkgrResult<String> {
    let invalid = |reason: &str| PkgrError::InvalidInput {
        field: "binprovider_name",
        value: name.to_string(),
        reason: reason.to_string(),
    };
    if !(1 < name.len() && name.len() < 16) {
        return Err(invalid("provider names must be between 2 and 15 characters long"));
    }
    if !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return Err(invalid("provider names can only contain a-Z0-9 and underscores"));
    }
    if !name.chars().next().is_some_and(|c| c.is_alphabetic()) {
        return Err(invalid("provider names must start with a letter"));
    }
    Ok(name.to_string())
}

/// Validate (and normalize) a colon-joined `PATH` string.
pub fn validate_path_str(path: &str) -> String {
    path.split(':')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join(":")
}

/// An existing, readable file.
pub fn host_exists_path(path: &Path) -> PkgrResult<PathBuf> {
    let invalid = |reason: &str| PkgrError::InvalidInput {
        field: "HostExistsPath",
        value: path.display().to_string(),
        reason: reason.to_string(),
    };
    if path.is_file() {
        Ok(path.to_path_buf())
    } else {
        Err(invalid("path does not exist or is not a regular file"))
    }
}

/// An existing, readable, absolute file path. Not required to be executable;
/// some "bins" are scripts invoked through an interpreter.
pub fn host_bin_path(path: &Path) -> PkgrResult<PathBuf> {
    let existing = host_exists_path(path)?;
    let absolute = if existing.is_absolute() {
        existing
    } else {
        std::env::current_dir()
            .map_err(PkgrError::Io)?
            .join(existing)
    };
    Ok(absolute)
}

/// Whether a path points at a file with the execute bit set (unix) or simply
/// exists (other platforms, where there's no single "x bit" concept).
pub fn is_executable(path: &Path) -> bool {
    if !path.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        path.metadata()
            .map(|meta| meta.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }
    #[cfg(not(unix))]
    {
        true
    }
}

/// Whether a path's extension marks it as an interpreted script.
pub fn is_script(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| SCRIPT_EXTENSIONS.contains(&format!(".{}", ext.to_lowercase()).as_str()))
        .unwrap_or(false)
}

/// Resolve a bare name or absolute path to a single `HostBinPath` by
/// searching the colon-joined `path_str`. Returns `None` rather than erroring
/// when nothing matches (a `NotFound` condition, not an `InvalidInput` one).
pub fn bin_abspath(bin_path_or_name: &str, path_str: &str) -> Option<PathBuf> {
    if bin_path_or_name.is_empty() || path_str.is_empty() {
        return None;
    }

    let candidate = if bin_path_or_name.starts_with('/') {
        PathBuf::from(bin_path_or_name)
    } else {
        let found = which::which_in(bin_path_or_name, Some(path_str), ".").ok();
        match found {
            Some(path) => path,
            None => {
                // `which` misses scripts without the execute bit; scan manually.
                return path_str.split(':').find_map(|dir| {
                    let dir_path = Path::new(dir);
                    if !dir_path.is_dir() {
                        return None;
                    }
                    let candidate = dir_path.join(bin_path_or_name);
                    host_exists_path(&candidate).ok()
                });
            }
        }
    };

    let parent = candidate.parent()?.to_string_lossy().to_string();
    if !bin_path_or_name.starts_with('/') && !path_str.split(':').any(|seg| seg == parent) {
        return None;
    }

    host_bin_path(&candidate).ok()
}

/// Every matching path across all `PATH` segments, deduplicated, in order.
pub fn bin_abspaths(bin_path_or_name: &str, path_str: &str) -> Vec<PathBuf> {
    if bin_path_or_name.is_empty() {
        return Vec::new();
    }

    let mut found = Vec::new();
    if bin_path_or_name.starts_with('/') {
        if let Ok(path) = host_bin_path(Path::new(bin_path_or_name)) {
            found.push(path);
        }
        return found;
    }

    for segment in path_str.split(':') {
        if segment.is_empty() {
            continue;
        }
        if let Ok(path) = which::which_in(bin_path_or_name, Some(segment), ".") {
            if !found.contains(&path) {
                found.push(path);
            }
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("/usr/bin/wget", "wget")]
    #[case("@postlight/parser@^2.2.3", "@postlight/parser")]
    #[case("yt-dlp==2024.05.09", "yt-dlp")]
    #[case("postlight/parser^2.2.3", "postlight/parser")]
    #[case("@postlight/parser@2.2.3", "@postlight/parser")]
    fn canonicalizes_names(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(bin_name(input).unwrap(), expected);
    }

    #[test]
    fn rejects_empty_name() {
        assert!(bin_name("").is_err());
        assert!(bin_name("==2.0.0").is_err());
    }

    #[test]
    fn path_str_strips_empty_segments() {
        assert_eq!(validate_path_str("/bin::/usr/bin:"), "/bin:/usr/bin");
    }

    #[test]
    fn script_detection_by_extension() {
        assert!(is_script(Path::new("/usr/bin/foo.py")));
        assert!(is_script(Path::new("/usr/bin/foo.sh")));
        assert!(!is_script(Path::new("/usr/bin/foo")));
    }

    #[test]
    fn bin_abspath_finds_executable_in_path() {
        let dir = tempfile::tempdir().unwrap();
        let exe_path = dir.path().join("my-tool");
        std::fs::write(&exe_path, "#!/bin/sh\necho hi\n").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&exe_path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        let path_str = dir.path().to_string_lossy().to_string();
        let found = bin_abspath("my-tool", &path_str);
        assert_eq!(found, Some(exe_path));
    }

    #[test]
    fn bin_abspath_returns_none_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path_str = dir.path().to_string_lossy().to_string();
        assert_eq!(bin_abspath("does-not-exist", &path_str), None);
    }
}
