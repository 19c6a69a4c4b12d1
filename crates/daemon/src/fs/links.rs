//! Proxy-vs-redirect URL selection.
//!
//! When a mount has `web_proxy` set, preview and download URLs point back at
//! this service, which streams the object through itself. Otherwise both are
//! presigned GETs against the backend with disposition and content-type
//! overrides baked into the signature.

use std::time::Duration;

use common::mime;
use s3_driver::{attachment_disposition, inline_disposition};

use crate::fs::error::FsError;
use crate::fs::resolve::ResolvedPath;
use crate::fs::FileSystem;

/// Preview and download URLs for one file.
#[derive(Debug, Clone)]
pub struct FileLinks {
    pub preview_url: String,
    pub download_url: String,
}

fn encode_path(path: &str) -> String {
    url::form_urlencoded::byte_serialize(path.as_bytes()).collect()
}

/// Proxy endpoint on this service for a virtual path.
pub fn proxy_url(path: &str, inline: bool) -> String {
    if inline {
        format!("/api/fs/download?path={}&inline=true", encode_path(path))
    } else {
        format!("/api/fs/download?path={}", encode_path(path))
    }
}

impl FileSystem {
    /// Build both URLs for a resolved file per the mount's proxy flag.
    pub(crate) async fn links_for(
        &self,
        resolved: &ResolvedPath,
        virtual_path: &str,
        filename: &str,
        expires_in: Option<Duration>,
    ) -> Result<FileLinks, FsError> {
        if resolved.mount.web_proxy {
            return Ok(FileLinks {
                preview_url: proxy_url(virtual_path, true),
                download_url: proxy_url(virtual_path, false),
            });
        }

        let driver = self.driver_for(resolved)?;
        let preview_url = driver
            .presign_get(
                resolved.file_key(),
                expires_in,
                Some(inline_disposition(filename)),
                Some(mime::preview_content_type(filename)),
            )
            .await?;
        let download_url = driver
            .presign_get(
                resolved.file_key(),
                expires_in,
                Some(attachment_disposition(filename)),
                Some(mime::download_content_type(filename)),
            )
            .await?;

        Ok(FileLinks {
            preview_url,
            download_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proxy_url_encodes_path() {
        assert_eq!(
            proxy_url("/docs/a b.txt", false),
            "/api/fs/download?path=%2Fdocs%2Fa+b.txt"
        );
        assert!(proxy_url("/docs/a.txt", true).ends_with("&inline=true"));
    }
}
