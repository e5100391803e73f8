use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

use super::items::ImportItem;

#[derive(Debug, Error)]
pub enum SelectionError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Expands the user's selection into import items.
///
/// A selected folder `Scans` yields items with relative folder paths
/// `/Scans`, `/Scans/2024`, ... so the folder itself maps onto the chosen
/// remote destination. A selected file lands directly in the destination.
pub fn collect_import_items(selection: &[PathBuf]) -> Result<Vec<ImportItem>, SelectionError> {
    let mut items = Vec::new();
    for selected in selection {
        let meta = std::fs::metadata(selected).map_err(|source| SelectionError::Io {
            path: selected.clone(),
            source,
        })?;
        let root_name = display_name(selected);
        if meta.is_dir() {
            walk(selected, &root_name, &mut items)?;
        } else {
            let parent_name = selected.parent().map(display_name).unwrap_or_default();
            items.push(ImportItem::new(
                selected.clone(),
                format!("/{parent_name}"),
                modified_unix(&meta),
            ));
        }
    }
    Ok(items)
}

fn walk(dir: &Path, root_name: &str, items: &mut Vec<ImportItem>) -> Result<(), SelectionError> {
    let walker = WalkDir::new(dir)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry));
    for entry in walker {
        let entry = entry.map_err(|err| SelectionError::Io {
            path: err.path().unwrap_or(dir).to_path_buf(),
            source: err.into(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let meta = entry.metadata().map_err(|err| SelectionError::Io {
            path: entry.path().to_path_buf(),
            source: err.into(),
        })?;
        items.push(ImportItem::new(
            entry.path().to_path_buf(),
            relative_folder(dir, root_name, entry.path()),
            modified_unix(&meta),
        ));
    }
    Ok(())
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_name().to_string_lossy().starts_with('.')
}

/// `/<root>/<sub>/...` for the folder holding `file`.
fn relative_folder(dir: &Path, root_name: &str, file: &Path) -> String {
    let mut relative = format!("/{root_name}");
    let parent = file.parent().and_then(|parent| parent.strip_prefix(dir).ok());
    for part in parent.into_iter().flat_map(Path::components) {
        relative.push('/');
        relative.push_str(&part.as_os_str().to_string_lossy());
    }
    relative
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn modified_unix(meta: &std::fs::Metadata) -> i64 {
    meta.modified()
        .ok()
        .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn walks_folders_and_keeps_single_files_at_root() {
        let dir = tempdir().unwrap();
        let scans = dir.path().join("Scans");
        std::fs::create_dir_all(scans.join("2024/Jan")).unwrap();
        std::fs::write(scans.join("b.pdf"), b"b").unwrap();
        std::fs::write(scans.join("a.pdf"), b"a").unwrap();
        std::fs::write(scans.join("2024/Jan/c.pdf"), b"c").unwrap();
        std::fs::write(scans.join(".hidden"), b"h").unwrap();
        std::fs::create_dir_all(scans.join(".cache")).unwrap();
        std::fs::write(scans.join(".cache/d.pdf"), b"d").unwrap();
        let loose = dir.path().join("loose.txt");
        std::fs::write(&loose, b"l").unwrap();

        let items = collect_import_items(&[scans.clone(), loose.clone()]).unwrap();
        let summary: Vec<_> = items
            .iter()
            .map(|item| (item.file_name(), item.relative_folder_path.clone()))
            .collect();

        let parent = display_name(dir.path());
        assert_eq!(
            summary,
            vec![
                ("c.pdf".to_string(), "/Scans/2024/Jan".to_string()),
                ("a.pdf".to_string(), "/Scans".to_string()),
                ("b.pdf".to_string(), "/Scans".to_string()),
                ("loose.txt".to_string(), format!("/{parent}")),
            ]
        );
        assert!(items.iter().all(|item| item.last_modified > 0));
    }

    #[test]
    fn missing_selection_is_an_error() {
        let dir = tempdir().unwrap();
        let err = collect_import_items(&[dir.path().join("nope")]).unwrap_err();
        assert!(matches!(err, SelectionError::Io { .. }));
    }
}
