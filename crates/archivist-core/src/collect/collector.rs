use std::path::{Component, Path};

use anyhow::{Context, Result};
use archivist_domain::{CollectError, EntryFilter, FileEntry};
use time::PrimitiveDateTime;
use tracing::{trace, warn};
use walkdir::{DirEntry, WalkDir};

use crate::effects::FileSystem;

/// Lazily yields the archived files under one patch or client directory.
///
/// Symlinks to files are collected under the link's own path. Symlinked
/// directories are not descended into.
pub struct EntryCollector<'a> {
    fs: &'a dyn FileSystem,
    subtree: &'a Path,
    archive_root: &'a Path,
    filter: &'a EntryFilter,
    patch: u16,
    date: Option<PrimitiveDateTime>,
    walker: walkdir::IntoIter,
}

impl<'a> EntryCollector<'a> {
    /// `archive_root` anchors the storage key recorded for each entry.
    pub fn new(
        fs: &'a dyn FileSystem,
        subtree: &'a Path,
        archive_root: &'a Path,
        filter: &'a EntryFilter,
        patch: u16,
        date: Option<PrimitiveDateTime>,
    ) -> Self {
        let walker = WalkDir::new(subtree)
            .sort_by_file_name()
            .follow_links(false)
            .into_iter();
        Self {
            fs,
            subtree,
            archive_root,
            filter,
            patch,
            date,
            walker,
        }
    }

    /// Whether a walked entry names file content, resolving symlinks.
    fn is_file_entry(&self, entry: &DirEntry) -> bool {
        let file_type = entry.file_type();
        if file_type.is_file() {
            return true;
        }
        if !file_type.is_symlink() {
            return false;
        }
        if self.fs.is_file(entry.path()) {
            return true;
        }
        if self.fs.is_dir(entry.path()) {
            warn!(path = %entry.path().display(), "not following symlinked directory");
        } else {
            warn!(path = %entry.path().display(), "skipping dangling symlink");
        }
        false
    }

    fn entry_for(&self, path: &Path) -> Result<Option<FileEntry>> {
        let relative = path
            .strip_prefix(self.subtree)
            .with_context(|| format!("{} escaped its walk root", path.display()))?;
        let Some(logical) = self.filter.logical_path(relative)? else {
            trace!(path = %path.display(), "dropping file");
            return Ok(None);
        };
        let key = storage_key(path, self.archive_root)?;
        Ok(Some(FileEntry::new(
            path.to_path_buf(),
            logical,
            self.patch,
            self.date,
            key,
        )))
    }
}

impl Iterator for EntryCollector<'_> {
    type Item = Result<FileEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.walker.next()? {
                Ok(entry) => entry,
                Err(err) => return Some(Err(err).context("failed to walk patch directory")),
            };
            if !self.is_file_entry(&entry) {
                continue;
            }
            match self.entry_for(entry.path()) {
                Ok(Some(file)) => return Some(Ok(file)),
                Ok(None) => {}
                Err(err) => return Some(Err(err)),
            }
        }
    }
}

/// `/`-separated path of `path` relative to the archive root, or the full
/// path when it lies outside the root.
fn storage_key(path: &Path, archive_root: &Path) -> Result<String> {
    let relative = path.strip_prefix(archive_root).unwrap_or(path);
    let mut segments = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(name) => {
                let name = name.to_str().ok_or_else(|| CollectError::NonUtf8Path {
                    path: path.to_path_buf(),
                })?;
                segments.push(name);
            }
            Component::CurDir => {}
            Component::RootDir => segments.push(""),
            Component::Prefix(_) | Component::ParentDir => {
                segments.push(component.as_os_str().to_str().unwrap_or(".."));
            }
        }
    }
    Ok(segments.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::SystemFileSystem;
    use std::fs;
    use tempfile::tempdir;
    use time::macros::datetime;

    #[test]
    fn collects_filtered_entries_with_logical_paths() -> Result<()> {
        let temp = tempdir()?;
        let root = temp.path();
        let patch_dir = root.join("us/ps0007-15-3-2008");
        fs::create_dir_all(patch_dir.join("data/Item"))?;
        fs::write(patch_dir.join("data/Item/Item.SAH"), b"items")?;
        fs::write(patch_dir.join("data/patch0001.patch"), b"diff")?;
        fs::write(patch_dir.join("data/game.exe"), b"MZ")?;
        fs::write(patch_dir.join("Game.exe"), b"MZ")?;
        fs::write(patch_dir.join("update.saf"), b"packed")?;

        let filter = EntryFilter::default();
        let date = Some(datetime!(2008-03-15 00:00:00));
        let entries = EntryCollector::new(&SystemFileSystem, &patch_dir, root, &filter, 7, date)
            .collect::<Result<Vec<_>>>()?;

        let summary: Vec<(&str, &str)> = entries
            .iter()
            .map(|entry| (entry.path(), entry.key()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("game.exe", "us/ps0007-15-3-2008/Game.exe"),
                ("data/item/item.sah", "us/ps0007-15-3-2008/data/Item/Item.SAH"),
            ]
        );
        assert!(entries.iter().all(|entry| entry.patch() == 7 && entry.date() == date));
        assert_eq!(
            entries[1].abspath(),
            patch_dir.join("data/Item/Item.SAH").as_path()
        );
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_files_are_collected() -> Result<()> {
        use std::os::unix::fs::symlink;

        let temp = tempdir()?;
        let root = temp.path();
        let shared = root.join("shared");
        fs::create_dir_all(&shared)?;
        fs::write(shared.join("item.sah"), b"items")?;
        let patch_dir = root.join("us/ps0002-1-1-2008");
        fs::create_dir_all(patch_dir.join("data"))?;
        symlink(shared.join("item.sah"), patch_dir.join("data/item.sah"))?;
        symlink(&shared, patch_dir.join("data/linked"))?;
        symlink(root.join("gone.ini"), patch_dir.join("dangling.ini"))?;

        let filter = EntryFilter::default();
        let entries = EntryCollector::new(&SystemFileSystem, &patch_dir, root, &filter, 2, None)
            .collect::<Result<Vec<_>>>()?;
        let summary: Vec<(&str, &str)> = entries
            .iter()
            .map(|entry| (entry.path(), entry.key()))
            .collect();
        assert_eq!(
            summary,
            vec![("data/item.sah", "us/ps0002-1-1-2008/data/item.sah")]
        );
        Ok(())
    }

    #[test]
    fn keys_fall_back_to_full_paths_outside_the_root() -> Result<()> {
        let key = storage_key(Path::new("/mnt/other/ga.ini"), Path::new("/srv/archive"))?;
        assert_eq!(key, "/mnt/other/ga.ini");
        Ok(())
    }
}
