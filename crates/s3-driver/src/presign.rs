//! Presigned URL generation.

use std::time::Duration;

use aws_sdk_s3::presigning::PresigningConfig;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::driver::S3Driver;
use crate::error::{map_sdk_err, Result, S3DriverError};
use crate::provider::Capability;

/// RFC 5987 `attr-char`: everything except alphanumerics and a small
/// punctuation set gets percent-encoded in `filename*`.
const ATTR_CHAR: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'!')
    .remove(b'#')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b'-')
    .remove(b'.')
    .remove(b'^')
    .remove(b'_')
    .remove(b'`')
    .remove(b'|')
    .remove(b'~');

/// `Content-Disposition` value forcing a download with a UTF-8 safe name.
pub fn attachment_disposition(filename: &str) -> String {
    let fallback: String = filename
        .chars()
        .map(|c| if c.is_ascii() && c != '"' && c != '\\' { c } else { '_' })
        .collect();
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        utf8_percent_encode(filename, ATTR_CHAR)
    )
}

/// `Content-Disposition` value for inline preview.
pub fn inline_disposition(filename: &str) -> String {
    let fallback: String = filename
        .chars()
        .map(|c| if c.is_ascii() && c != '"' && c != '\\' { c } else { '_' })
        .collect();
    format!(
        "inline; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        utf8_percent_encode(filename, ATTR_CHAR)
    )
}

impl S3Driver {
    /// Sign a GET URL. Disposition and content-type overrides are baked into
    /// the signed query string so the backend enforces them.
    pub async fn presign_get(
        &self,
        key: &str,
        expires_in: Option<Duration>,
        content_disposition: Option<String>,
        content_type: Option<String>,
    ) -> Result<String> {
        self.require(Capability::Presign, "presign_get")?;

        let config = PresigningConfig::expires_in(expires_in.unwrap_or(self.default_signed_ttl()))
            .map_err(|e| S3DriverError::Presign(e.to_string()))?;

        let request = self
            .client()
            .get_object()
            .bucket(self.bucket())
            .key(key)
            .set_response_content_disposition(content_disposition)
            .set_response_content_type(content_type)
            .presigned(config)
            .await
            .map_err(|e| map_sdk_err("presign_get", e))?;

        Ok(request.uri().to_string())
    }

    /// Sign a PUT URL for a client-direct upload.
    pub async fn presign_put(
        &self,
        key: &str,
        expires_in: Option<Duration>,
        content_type: &str,
    ) -> Result<String> {
        self.require(Capability::Presign, "presign_put")?;

        let config = PresigningConfig::expires_in(expires_in.unwrap_or(self.default_signed_ttl()))
            .map_err(|e| S3DriverError::Presign(e.to_string()))?;

        let request = self
            .client()
            .put_object()
            .bucket(self.bucket())
            .key(key)
            .content_type(content_type)
            .presigned(config)
            .await
            .map_err(|e| map_sdk_err("presign_put", e))?;

        Ok(request.uri().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attachment_disposition_plain_ascii() {
        let d = attachment_disposition("report.pdf");
        assert!(d.starts_with("attachment; filename=\"report.pdf\""));
        assert!(d.contains("filename*=UTF-8''report.pdf"));
    }

    #[test]
    fn test_attachment_disposition_unicode() {
        let d = attachment_disposition("übersicht 2024.txt");
        // ASCII fallback replaces non-ASCII, the extended form pct-encodes it.
        assert!(d.contains("filename=\"_bersicht 2024.txt\""));
        assert!(d.contains("filename*=UTF-8''%C3%BCbersicht%202024.txt"));
    }

    #[test]
    fn test_inline_disposition() {
        assert!(inline_disposition("a.txt").starts_with("inline;"));
    }
}
