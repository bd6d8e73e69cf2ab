//! Collected file entries and the rules deciding which files are archived.

use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};

use time::PrimitiveDateTime;

/// Directory segment marking the client's packed-data tree.
pub const DATA_SEGMENT: &str = "data";
/// Extension of compiled patch diffs, which never hold full content.
pub const PATCH_EXTENSION: &str = "patch";
/// The launcher executable, excluded from data trees.
pub const LAUNCHER_FILENAME: &str = "game.exe";
/// Extensions kept outside of a data tree.
pub const DEFAULT_RETAINED_EXTENSIONS: &[&str] = &["ini", "cfg", "dll", "txt", "exe"];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollectError {
    #[error("malformed data path '{path}': no file path follows the '{DATA_SEGMENT}' segment")]
    MalformedDataPath { path: PathBuf },
    #[error("path '{path}' is not valid UTF-8 and cannot be indexed")]
    NonUtf8Path { path: PathBuf },
}

/// A regular file discovered under a classified patch or client directory.
///
/// Built once per discovered file and handed straight to the loader.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileEntry {
    abspath: PathBuf,
    path: String,
    patch: u16,
    date: Option<PrimitiveDateTime>,
    key: String,
}

impl FileEntry {
    #[must_use]
    pub fn new(
        abspath: PathBuf,
        path: String,
        patch: u16,
        date: Option<PrimitiveDateTime>,
        key: String,
    ) -> Self {
        Self {
            abspath,
            path,
            patch,
            date,
            key,
        }
    }

    /// Location of the file on disk.
    #[must_use]
    pub fn abspath(&self) -> &Path {
        &self.abspath
    }

    /// Lower-cased logical path, e.g. `data/item/item.sdata` or `game.ini`.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn patch(&self) -> u16 {
        self.patch
    }

    #[must_use]
    pub fn date(&self) -> Option<PrimitiveDateTime> {
        self.date
    }

    /// Archive-root-relative storage key, `/`-separated.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }
}

/// Decides which files belong in the archive and what their logical path is.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntryFilter {
    retained: BTreeSet<String>,
}

impl Default for EntryFilter {
    fn default() -> Self {
        Self::new(DEFAULT_RETAINED_EXTENSIONS.iter().copied())
    }
}

impl EntryFilter {
    /// Builds a filter from retained extensions; a leading `.` and letter case
    /// are ignored.
    pub fn new<I, S>(retained: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let retained = retained
            .into_iter()
            .map(|ext| ext.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();
        Self { retained }
    }

    pub fn retained_extensions(&self) -> impl Iterator<Item = &str> {
        self.retained.iter().map(String::as_str)
    }

    /// Maps a file path relative to its patch or client directory to the
    /// logical path it is indexed under, or `None` when the file is dropped.
    pub fn logical_path(&self, relative: &Path) -> Result<Option<String>, CollectError> {
        let Some(file_name) = relative.file_name() else {
            return Ok(None);
        };
        let file_name = file_name
            .to_str()
            .ok_or_else(|| CollectError::NonUtf8Path {
                path: relative.to_path_buf(),
            })?;

        match data_segment_index(relative) {
            Some(index) => {
                if has_extension(file_name, PATCH_EXTENSION)
                    || file_name.eq_ignore_ascii_case(LAUNCHER_FILENAME)
                {
                    return Ok(None);
                }
                data_logical_path(relative, index).map(Some)
            }
            None => {
                let keep = extension_of(file_name)
                    .is_some_and(|ext| self.retained.contains(&ext.to_ascii_lowercase()));
                Ok(keep.then(|| file_name.to_lowercase()))
            }
        }
    }
}

/// Index of the first directory component named `data`, ignoring the file
/// name itself.
fn data_segment_index(relative: &Path) -> Option<usize> {
    let components: Vec<Component<'_>> = relative.components().collect();
    let dirs = components.len().saturating_sub(1);
    components[..dirs]
        .iter()
        .position(|component| matches!(component, Component::Normal(name) if *name == DATA_SEGMENT))
}

fn data_logical_path(relative: &Path, index: usize) -> Result<String, CollectError> {
    let mut segments = vec![DATA_SEGMENT.to_string()];
    for component in relative.components().skip(index + 1) {
        match component {
            Component::Normal(name) => {
                let name = name.to_str().ok_or_else(|| CollectError::NonUtf8Path {
                    path: relative.to_path_buf(),
                })?;
                segments.push(name.to_lowercase());
            }
            _ => {
                return Err(CollectError::MalformedDataPath {
                    path: relative.to_path_buf(),
                })
            }
        }
    }
    if segments.len() < 2 {
        return Err(CollectError::MalformedDataPath {
            path: relative.to_path_buf(),
        });
    }
    Ok(segments.join("/"))
}

fn extension_of(file_name: &str) -> Option<&str> {
    let (stem, ext) = file_name.rsplit_once('.')?;
    (!stem.is_empty() && !ext.is_empty()).then_some(ext)
}

fn has_extension(file_name: &str, expected: &str) -> bool {
    extension_of(file_name).is_some_and(|ext| ext.eq_ignore_ascii_case(expected))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn logical(relative: &str) -> Option<String> {
        EntryFilter::default()
            .logical_path(Path::new(relative))
            .expect("path classifies")
    }

    #[test]
    fn data_files_keep_their_tree_lower_cased() {
        assert_eq!(logical("data/Item.SAH"), Some("data/item.sah".to_string()));
        assert_eq!(
            logical("Shaiya/data/Character/Human/Hair.DDS"),
            Some("data/character/human/hair.dds".to_string())
        );
    }

    #[test]
    fn data_trees_drop_patch_diffs_and_the_launcher() {
        assert_eq!(logical("data/patch0001.patch"), None);
        assert_eq!(logical("data/game.exe"), None);
        assert_eq!(logical("data/sub/Game.EXE"), None);
    }

    #[test]
    fn data_trees_keep_files_outside_the_retained_set() {
        assert_eq!(
            logical("data/world/2.wld"),
            Some("data/world/2.wld".to_string())
        );
    }

    #[test]
    fn non_data_files_flatten_to_their_name() {
        assert_eq!(logical("Config.INI"), Some("config.ini".to_string()));
        assert_eq!(logical("bin/d3dx9_30.dll"), Some("d3dx9_30.dll".to_string()));
        assert_eq!(logical("game.exe"), Some("game.exe".to_string()));
        assert_eq!(logical("gsconfig.cfg"), Some("gsconfig.cfg".to_string()));
    }

    #[test]
    fn non_data_files_outside_the_retained_set_are_dropped() {
        assert_eq!(logical("update.saf"), None);
        assert_eq!(logical("readme"), None);
        assert_eq!(logical("screens/shot.jpg"), None);
    }

    #[test]
    fn a_file_named_data_is_not_a_data_tree() {
        assert_eq!(logical("data"), None);
        assert_eq!(logical("metadata/notes.txt"), Some("notes.txt".to_string()));
    }

    #[test]
    fn parent_components_after_the_data_segment_are_malformed() {
        let err = EntryFilter::default()
            .logical_path(Path::new("data/../escape.bin"))
            .unwrap_err();
        assert!(matches!(err, CollectError::MalformedDataPath { .. }));
    }

    #[test]
    fn retained_extensions_are_normalized() {
        let filter = EntryFilter::new([".INI", "txt", ""]);
        assert_eq!(
            filter.retained_extensions().collect::<Vec<_>>(),
            vec!["ini", "txt"]
        );
        assert_eq!(
            filter.logical_path(Path::new("d3d9.dll")).expect("classifies"),
            None
        );
    }
}
