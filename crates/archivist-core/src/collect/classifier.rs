use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use archivist_domain::timestamp::{from_system_time, start_of_day};
use archivist_domain::{
    parse_current_version, parse_episode_token, parse_patch_token, ClientLayout, EpisodeToken,
};
use time::PrimitiveDateTime;
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::effects::FileSystem;

/// Client version files, in lookup order.
const VERSION_FILES: &[&str] = &["Version.ini", "version.ini"];
/// Root index of a packed client; its mtime dates the snapshot.
const CLIENT_INDEX_FILE: &str = "data.sah";

/// A patch or client directory together with the patch and date it
/// represents.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassifiedRoot {
    /// Directory whose files belong to this patch.
    pub subtree: PathBuf,
    pub patch: u16,
    pub date: Option<PrimitiveDateTime>,
}

/// Walks a distribution root and yields each patch or client directory once.
///
/// A matching directory is a walk boundary: its descendants are never
/// classified on their own.
pub struct Classifier<'a> {
    fs: &'a dyn FileSystem,
    layout: ClientLayout,
    walker: walkdir::IntoIter,
}

impl<'a> Classifier<'a> {
    pub fn new(fs: &'a dyn FileSystem, root: &Path, layout: ClientLayout) -> Self {
        // The distribution root itself is never a patch or client directory.
        let walker = WalkDir::new(root)
            .min_depth(1)
            .sort_by_file_name()
            .follow_links(false)
            .into_iter();
        Self { fs, layout, walker }
    }

    fn classify(&self, entry: &DirEntry) -> Result<Option<ClassifiedRoot>> {
        let Some(name) = entry.file_name().to_str() else {
            debug!(path = %entry.path().display(), "skipping non-UTF-8 directory");
            return Ok(None);
        };
        match self.layout {
            ClientLayout::Patches => Ok(classify_patch_dir(entry.path(), name)),
            ClientLayout::FullClient => match parse_episode_token(name) {
                Some(token) => self.classify_client_dir(entry.path(), name, &token),
                None => Ok(None),
            },
        }
    }

    fn classify_client_dir(
        &self,
        dir: &Path,
        name: &str,
        token: &EpisodeToken,
    ) -> Result<Option<ClassifiedRoot>> {
        let client_root = dir.with_file_name(&name[..token.end]);

        let patch = match self.read_client_version(&client_root)? {
            Some(patch) => patch,
            None => {
                let Some(patch) = token.patch() else {
                    warn!(
                        path = %dir.display(),
                        episode = %token.episode,
                        "episode does not fit a patch number; skipping client"
                    );
                    return Ok(None);
                };
                warn!(
                    client = %client_root.display(),
                    patch,
                    "couldn't find `Version.ini` for full client; defaulting to episode via path"
                );
                patch
            }
        };

        let index = client_root.join(CLIENT_INDEX_FILE);
        let date = if self.fs.is_file(&index) {
            let date = from_system_time(self.fs.modified(&index)?);
            if date.is_none() {
                warn!(path = %index.display(), "data.sah mtime is out of range; date left unset");
            }
            date
        } else {
            debug!(client = %client_root.display(), "no data.sah; client date left unset");
            None
        };

        Ok(Some(ClassifiedRoot {
            subtree: dir.to_path_buf(),
            patch,
            date,
        }))
    }

    fn read_client_version(&self, client_root: &Path) -> Result<Option<u16>> {
        for name in VERSION_FILES {
            let path = client_root.join(name);
            if !self.fs.is_file(&path) {
                continue;
            }
            let contents = self
                .fs
                .read_to_string(&path)
                .with_context(|| format!("failed to read client version {}", path.display()))?;
            match parse_current_version(&contents) {
                Some(patch) => return Ok(Some(patch)),
                None => {
                    warn!(path = %path.display(), "no [Version] CurrentVersion entry");
                    return Ok(None);
                }
            }
        }
        Ok(None)
    }
}

impl Iterator for Classifier<'_> {
    type Item = Result<ClassifiedRoot>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.walker.next()? {
                Ok(entry) => entry,
                Err(err) => return Some(Err(err).context("failed to walk distribution")),
            };
            if !entry.file_type().is_dir() {
                continue;
            }
            match self.classify(&entry) {
                Ok(Some(root)) => {
                    self.walker.skip_current_dir();
                    debug!(
                        subtree = %root.subtree.display(),
                        patch = root.patch,
                        "classified directory"
                    );
                    return Some(Ok(root));
                }
                Ok(None) => {}
                Err(err) => return Some(Err(err)),
            }
        }
    }
}

fn classify_patch_dir(dir: &Path, name: &str) -> Option<ClassifiedRoot> {
    match parse_patch_token(name) {
        Ok(Some(token)) => Some(ClassifiedRoot {
            subtree: dir.to_path_buf(),
            patch: token.patch,
            date: Some(start_of_day(token.date)),
        }),
        Ok(None) => None,
        Err(err) => {
            warn!(path = %dir.display(), error = %err, "skipping patch directory");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::SystemFileSystem;
    use std::fs;
    use tempfile::tempdir;
    use time::macros::datetime;

    fn classify_all(root: &Path, layout: ClientLayout) -> Vec<ClassifiedRoot> {
        Classifier::new(&SystemFileSystem, root, layout)
            .collect::<Result<Vec<_>>>()
            .expect("classification succeeds")
    }

    #[test]
    fn patch_directories_are_classified_once() -> Result<()> {
        let temp = tempdir()?;
        let root = temp.path();
        fs::create_dir_all(root.join("ps0007-15-3-2008/data/item"))?;
        fs::create_dir_all(root.join("ps0008-2-4-2008"))?;
        fs::create_dir_all(root.join("notes"))?;

        let found = classify_all(root, ClientLayout::Patches);
        assert_eq!(
            found,
            vec![
                ClassifiedRoot {
                    subtree: root.join("ps0007-15-3-2008"),
                    patch: 7,
                    date: Some(datetime!(2008-03-15 00:00:00)),
                },
                ClassifiedRoot {
                    subtree: root.join("ps0008-2-4-2008"),
                    patch: 8,
                    date: Some(datetime!(2008-04-02 00:00:00)),
                },
            ]
        );
        Ok(())
    }

    #[test]
    fn nested_tokens_inside_a_patch_are_not_reclassified() -> Result<()> {
        let temp = tempdir()?;
        let root = temp.path();
        fs::create_dir_all(root.join("ps0001-1-1-2008/ps0002-1-1-2008"))?;

        let found = classify_all(root, ClientLayout::Patches);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].patch, 1);
        Ok(())
    }

    #[test]
    fn invalid_patch_dates_are_skipped() -> Result<()> {
        let temp = tempdir()?;
        fs::create_dir_all(temp.path().join("ps0003-31-2-2008"))?;
        assert!(classify_all(temp.path(), ClientLayout::Patches).is_empty());
        Ok(())
    }

    #[test]
    fn full_client_without_version_falls_back_to_episode() -> Result<()> {
        let temp = tempdir()?;
        let client = temp.path().join("shaiya-ep2.1");
        fs::create_dir_all(client.join("data"))?;

        let found = classify_all(temp.path(), ClientLayout::FullClient);
        assert_eq!(
            found,
            vec![ClassifiedRoot {
                subtree: client,
                patch: 2,
                date: None,
            }]
        );
        Ok(())
    }

    #[test]
    fn full_client_version_file_is_authoritative() -> Result<()> {
        let temp = tempdir()?;
        let client = temp.path().join("ep4");
        fs::create_dir_all(&client)?;
        fs::write(client.join("Version.ini"), "[Version]\nCurrentVersion=181\n")?;
        fs::write(client.join("data.sah"), b"SAH")?;

        let found = classify_all(temp.path(), ClientLayout::FullClient);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].patch, 181);
        assert!(found[0].date.is_some(), "data.sah should date the client");
        Ok(())
    }

    #[test]
    fn client_root_is_truncated_after_the_episode_token() -> Result<()> {
        let temp = tempdir()?;
        let dir = temp.path().join("ep5-retail");
        fs::create_dir_all(&dir)?;
        // Metadata lives beside the token-truncated root, not inside the walked directory.
        let truncated = temp.path().join("ep5");
        fs::create_dir_all(&truncated)?;
        fs::write(truncated.join("Version.ini"), "[Version]\nCurrentVersion=90\n")?;

        let found = classify_all(temp.path(), ClientLayout::FullClient);
        let retail = found
            .iter()
            .find(|root| root.subtree == dir)
            .expect("retail client classified");
        assert_eq!(retail.patch, 90);
        Ok(())
    }

    #[test]
    fn directories_without_episode_are_ignored() -> Result<()> {
        let temp = tempdir()?;
        fs::create_dir_all(temp.path().join("screenshots/deep"))?;
        assert!(classify_all(temp.path(), ClientLayout::FullClient).is_empty());
        Ok(())
    }
}
