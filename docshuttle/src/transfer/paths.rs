use std::path::{Component, Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PathError {
    #[error("remote path contains unsupported component: {0}")]
    UnsupportedComponent(String),
}

/// Maps a `/`-separated remote folder path under `root`. Empty paths map to
/// `root` itself.
pub fn local_dir_for(root: &Path, remote_path: &str) -> Result<PathBuf, PathError> {
    let mut out = root.to_path_buf();
    for segment in remote_path.split('/').filter(|s| !s.is_empty()) {
        let mut components = Path::new(segment).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(part)), None) => out.push(part),
            (Some(Component::CurDir), None) => continue,
            _ => return Err(PathError::UnsupportedComponent(segment.to_string())),
        }
    }
    Ok(out)
}

/// Makes a document title usable as a local file stem.
pub fn sanitize_file_stem(title: &str, fallback: &str) -> String {
    let cleaned: String = title
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            other => other,
        })
        .collect();
    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        return fallback.to_string();
    }
    cleaned
}

/// `<stem>.<ext>` or `<stem> (<n>).<ext>` when `n > 0`.
pub fn numbered_file_name(stem: &str, extension: &str, n: u32) -> String {
    let extension = extension.trim_start_matches('.');
    let stem = if n == 0 {
        stem.to_string()
    } else {
        format!("{stem} ({n})")
    };
    if extension.is_empty() {
        stem
    } else {
        format!("{stem}.{extension}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_remote_path_under_root() {
        let root = PathBuf::from("/exports/run");
        let mapped = local_dir_for(&root, "Invoices/2024").unwrap();
        assert_eq!(mapped, PathBuf::from("/exports/run/Invoices/2024"));
    }

    #[test]
    fn empty_and_slash_paths_map_to_root() {
        let root = PathBuf::from("/exports/run");
        assert_eq!(local_dir_for(&root, "").unwrap(), root);
        assert_eq!(local_dir_for(&root, "/").unwrap(), root);
    }

    #[test]
    fn rejects_parent_dir() {
        let root = PathBuf::from("/exports/run");
        assert!(matches!(
            local_dir_for(&root, "Docs/../../secret"),
            Err(PathError::UnsupportedComponent(_))
        ));
    }

    #[test]
    fn sanitizes_separators_and_empty_titles() {
        assert_eq!(sanitize_file_stem("a/b\\c", "id"), "a_b_c");
        assert_eq!(sanitize_file_stem("   ", "id-1"), "id-1");
        assert_eq!(sanitize_file_stem("..", "id-2"), "id-2");
    }

    #[test]
    fn numbers_file_names() {
        assert_eq!(numbered_file_name("Doc", "pdf", 0), "Doc.pdf");
        assert_eq!(numbered_file_name("Doc", ".pdf", 2), "Doc (2).pdf");
        assert_eq!(numbered_file_name("Doc", "", 1), "Doc (1)");
    }
}
