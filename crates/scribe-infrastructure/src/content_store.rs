//! Three-tier content store.
//!
//! A relative content path resolves against three tiers, lowest authority
//! first:
//!
//! | tier    | location                                   |
//! |---------|--------------------------------------------|
//! | system  | `<root>/<rel>`                             |
//! | user    | `<user_root>/<rel>` (currently `<root>`)   |
//! | project | `<root>/outputs/<project-slug>/<rel>`      |
//!
//! Reads take the whole document from the highest tier that has one; there
//! is no field-level merge. Writes always target one tier's fixed location.

use std::io;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use scribe_core::Result;
use scribe_core::content::{ContentTier, FileInfo, MergedContent, TierContent};
use tokio::fs;

pub const OUTPUTS_DIR: &str = "outputs";

#[derive(Debug, Clone)]
pub struct LayeredContentStore {
    root: PathBuf,
    user_root: PathBuf,
}

impl LayeredContentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            user_root: root.clone(),
            root,
        }
    }

    /// Uses a distinct root for the user tier.
    pub fn with_user_root(mut self, user_root: impl Into<PathBuf>) -> Self {
        self.user_root = user_root.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn outputs_dir(&self) -> PathBuf {
        self.root.join(OUTPUTS_DIR)
    }

    /// Location of `rel` in `tier`. `None` when `rel` escapes the tier root or
    /// the project tier is requested without a slug.
    pub fn tier_path(&self, tier: ContentTier, rel: &str, project: Option<&str>) -> Option<PathBuf> {
        let rel = sanitize(rel)?;
        match tier {
            ContentTier::System => Some(self.root.join(rel)),
            ContentTier::User => Some(self.user_root.join(rel)),
            ContentTier::Project => {
                let slug = sanitize(project?)?;
                Some(self.outputs_dir().join(slug).join(rel))
            }
        }
    }

    /// Resolves `rel` across all tiers. Never fails: absent tiers and
    /// unreadable files are skipped.
    pub async fn read_layered(&self, rel: &str, project: Option<&str>) -> MergedContent {
        let mut sources = Vec::new();
        for tier in [ContentTier::System, ContentTier::User, ContentTier::Project] {
            if tier == ContentTier::User && self.user_root == self.root {
                // Same file as the system tier; counting it twice would skew provenance.
                continue;
            }
            let Some(path) = self.tier_path(tier, rel, project) else {
                continue;
            };
            match fs::read_to_string(&path).await {
                Ok(content) => sources.push(TierContent { content, tier, path }),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(tier = tier.as_str(), path = %path.display(), error = %e, "[ContentStore] tier read failed, skipping");
                }
            }
        }
        MergedContent::from_sources(sources)
    }

    pub async fn write_user(&self, rel: &str, content: &str) -> io::Result<PathBuf> {
        let path = self
            .tier_path(ContentTier::User, rel, None)
            .ok_or_else(|| invalid_path(rel))?;
        self.write_file(&path, content).await?;
        Ok(path)
    }

    pub async fn write_project(&self, project: &str, rel: &str, content: &str) -> io::Result<PathBuf> {
        let path = self
            .tier_path(ContentTier::Project, rel, Some(project))
            .ok_or_else(|| invalid_path(rel))?;
        self.write_file(&path, content).await?;
        Ok(path)
    }

    pub async fn read_file(&self, path: &Path) -> Result<String> {
        Ok(fs::read_to_string(path).await?)
    }

    /// Writes `content`, creating missing parent directories.
    pub async fn write_file(&self, path: &Path, content: &str) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(path, content).await
    }

    pub async fn exists(&self, path: &Path) -> bool {
        fs::try_exists(path).await.unwrap_or(false)
    }

    /// Lists visible entries of `dir`, most recently modified first.
    ///
    /// A missing or unreadable directory is an empty listing. Entries whose
    /// metadata cannot be read are left out.
    pub async fn list_dir(&self, dir: &Path) -> Vec<FileInfo> {
        let mut reader = match fs::read_dir(dir).await {
            Ok(reader) => reader,
            Err(e) => {
                if e.kind() != io::ErrorKind::NotFound {
                    tracing::warn!(path = %dir.display(), error = %e, "[ContentStore] list failed");
                }
                return Vec::new();
            }
        };

        let mut entries = Vec::new();
        loop {
            let entry = match reader.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    tracing::debug!(path = %dir.display(), error = %e, "[ContentStore] stopped listing early");
                    break;
                }
            };
            let name = entry.file_name().to_string_lossy().into_owned();
            if is_hidden(&name) {
                continue;
            }
            let Ok(meta) = entry.metadata().await else {
                continue;
            };
            let Ok(modified) = meta.modified() else {
                continue;
            };
            entries.push(FileInfo {
                name,
                path: entry.path(),
                is_directory: meta.is_dir(),
                size: meta.len(),
                modified: DateTime::<Utc>::from(modified),
            });
        }

        entries.sort_by(|a, b| b.modified.cmp(&a.modified));
        entries
    }

    /// Project slugs that have an outputs directory.
    pub async fn scan_outputs(&self) -> Vec<String> {
        let mut slugs: Vec<String> = self
            .list_dir(&self.outputs_dir())
            .await
            .into_iter()
            .filter(|info| info.is_directory)
            .map(|info| info.name)
            .collect();
        slugs.sort();
        slugs
    }
}

pub(crate) fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

/// Keeps only normal components so a relative path cannot climb out of its tier.
fn sanitize(rel: &str) -> Option<PathBuf> {
    let mut clean = PathBuf::new();
    for component in Path::new(rel).components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir | Component::RootDir => {}
            Component::ParentDir | Component::Prefix(_) => return None,
        }
    }
    (!clean.as_os_str().is_empty()).then_some(clean)
}

fn invalid_path(rel: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, format!("invalid content path: {rel}"))
}
