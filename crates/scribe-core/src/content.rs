//! Layered content and file listing types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Precedence tier, declared lowest authority first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentTier {
    System,
    User,
    Project,
}

impl ContentTier {
    pub fn as_str(self) -> &'static str {
        match self {
            ContentTier::System => "system",
            ContentTier::User => "user",
            ContentTier::Project => "project",
        }
    }
}

/// One tier that produced a successful read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierContent {
    pub content: String,
    pub tier: ContentTier,
    pub path: PathBuf,
}

/// Result of a layered read.
///
/// `sources` is in precedence order, lowest first. When nothing was found
/// both `merged` and `sources` are empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedContent {
    pub merged: String,
    pub sources: Vec<TierContent>,
}

impl MergedContent {
    pub fn from_sources(sources: Vec<TierContent>) -> Self {
        let merged = sources
            .last()
            .map(|s| s.content.clone())
            .unwrap_or_default();
        Self { merged, sources }
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn winning_tier(&self) -> Option<ContentTier> {
        self.sources.last().map(|s| s.tier)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    pub name: String,
    pub path: PathBuf,
    pub is_directory: bool,
    pub size: u64,
    pub modified: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileChangeKind {
    #[serde(rename = "add")]
    Add,
    #[serde(rename = "change")]
    Change,
    #[serde(rename = "unlink")]
    Unlink,
    #[serde(rename = "addDir")]
    AddDir,
    #[serde(rename = "unlinkDir")]
    UnlinkDir,
}

impl FileChangeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FileChangeKind::Add => "add",
            FileChangeKind::Change => "change",
            FileChangeKind::Unlink => "unlink",
            FileChangeKind::AddDir => "addDir",
            FileChangeKind::UnlinkDir => "unlinkDir",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileChangeEvent {
    #[serde(rename = "type")]
    pub kind: FileChangeKind,
    pub path: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(tier: ContentTier, content: &str) -> TierContent {
        TierContent {
            content: content.to_string(),
            tier,
            path: PathBuf::from(tier.as_str()),
        }
    }

    #[test]
    fn test_last_source_wins() {
        let merged = MergedContent::from_sources(vec![
            source(ContentTier::System, "base"),
            source(ContentTier::Project, "override"),
        ]);
        assert_eq!(merged.merged, "override");
        assert_eq!(merged.winning_tier(), Some(ContentTier::Project));
    }

    #[test]
    fn test_no_sources_is_empty_not_error() {
        let merged = MergedContent::from_sources(Vec::new());
        assert!(merged.is_empty());
        assert_eq!(merged.merged, "");
    }

    #[test]
    fn test_change_kind_wire_names() {
        let event = FileChangeEvent {
            kind: FileChangeKind::AddDir,
            path: PathBuf::from("/tmp/x"),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "addDir");
    }
}
