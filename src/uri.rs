//! Path <-> `file://` URI conversion and lexical path normalization.
//!
//! Every location that crosses into a protocol response goes through here.

use std::path::{Component, Path, PathBuf};

use lsp_types::Url;

pub fn path_to_uri(path: &Path) -> Option<Url> {
    Url::from_file_path(path).ok()
}

pub fn uri_to_path(uri: &Url) -> Option<PathBuf> {
    uri.to_file_path().ok()
}

/// Resolves `.` and `..` components without touching the filesystem.
/// Leading `..` components that cannot be resolved are kept.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

/// Resolves a path reported by the search tool against the workspace root.
/// grep prints paths relative to whatever it was handed.
pub fn absolutize(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        normalize(path)
    } else {
        normalize(&root.join(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uri_round_trip_plain() {
        let path = Path::new("/home/user/project/src/main.cpp");
        let uri = path_to_uri(path).unwrap();
        assert_eq!(uri_to_path(&uri).unwrap(), path);
    }

    #[test]
    fn test_uri_round_trip_reserved_characters() {
        let path = Path::new("/tmp/a b/c#d?/e&f.h");
        let uri = path_to_uri(path).unwrap();
        assert_eq!(uri_to_path(&uri).unwrap(), path);
    }

    #[test]
    fn test_uri_rejects_relative_path() {
        assert!(path_to_uri(Path::new("relative/path.h")).is_none());
    }

    #[test]
    fn test_normalize_resolves_dots() {
        assert_eq!(
            normalize(Path::new("/a/b/../c/./d")),
            PathBuf::from("/a/c/d")
        );
        assert_eq!(normalize(Path::new("/a/../..")), PathBuf::from("/"));
        assert_eq!(normalize(Path::new("a/./b")), PathBuf::from("a/b"));
        assert_eq!(normalize(Path::new("../a")), PathBuf::from("../a"));
        assert_eq!(normalize(Path::new(".")), PathBuf::from("."));
    }

    #[test]
    fn test_absolutize_joins_relative_results() {
        assert_eq!(
            absolutize(Path::new("/work"), Path::new("src/x.cpp")),
            PathBuf::from("/work/src/x.cpp")
        );
        assert_eq!(
            absolutize(Path::new("/work"), Path::new("/other/x.cpp")),
            PathBuf::from("/other/x.cpp")
        );
    }
}
