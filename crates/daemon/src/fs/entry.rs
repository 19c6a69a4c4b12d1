//! Listing and entry types returned by the filesystem façade.

use serde::Serialize;
use time::OffsetDateTime;

use common::prelude::VirtualPath;

/// One file or directory as seen through the virtual filesystem.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FsEntry {
    pub name: String,
    pub path: VirtualPath,
    pub is_directory: bool,
    pub size: u64,
    #[serde(with = "time::serde::rfc3339::option")]
    pub modified: Option<OffsetDateTime>,
    pub mimetype: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
}

impl FsEntry {
    pub fn directory(name: String, path: VirtualPath, modified: Option<OffsetDateTime>) -> Self {
        Self {
            name,
            path,
            is_directory: true,
            size: 0,
            modified,
            mimetype: common::mime::DIRECTORY_CONTENT_TYPE.to_string(),
            etag: None,
            preview_url: None,
            download_url: None,
        }
    }
}

/// A point-in-time snapshot of one directory.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryListing {
    pub path: VirtualPath,
    pub entries: Vec<FsEntry>,
    #[serde(with = "time::serde::rfc3339")]
    pub refreshed_at: OffsetDateTime,
}

/// Result of writing one object, whatever the write path was.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    pub path: VirtualPath,
    pub object_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    pub size: u64,
    pub mimetype: String,
}
