//! The driver itself: client construction and single-object operations.

use std::time::Duration;

use aws_sdk_s3::config::retry::RetryConfig;
use aws_sdk_s3::config::timeout::TimeoutConfig;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::config::{RequestChecksumCalculation, ResponseChecksumValidation};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{Delete, ObjectIdentifier};
use aws_sdk_s3::Client;
use bytes::Bytes;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use time::OffsetDateTime;

use crate::config::ConnectionConfig;
use crate::error::{map_sdk_err, sdk_status, Result, S3DriverError};
use crate::provider::{Capability, ProviderKind};

/// Characters escaped when a key is embedded in an `x-amz-copy-source`
/// header. `/` stays literal.
const COPY_SOURCE_ENCODE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'[')
    .add(b']')
    .add(b'`')
    .add(b'{')
    .add(b'}')
    .add(b'+');

const DELETE_BATCH_SIZE: usize = 1000;

/// Initial backoff for SDK-level retries.
const RETRY_INITIAL_BACKOFF: Duration = Duration::from_millis(500);
/// Backoff ceiling for SDK-level retries.
const RETRY_MAX_BACKOFF: Duration = Duration::from_secs(10);

/// One bucket on one S3-compatible endpoint.
#[derive(Debug, Clone)]
pub struct S3Driver {
    client: Client,
    bucket: String,
    provider: ProviderKind,
    default_signed_ttl: Duration,
    capabilities: Vec<Capability>,
}

/// Metadata of a stored object, from HEAD (or its GET-range fallback).
#[derive(Debug, Clone)]
pub struct ObjectHead {
    pub content_type: Option<String>,
    pub content_length: u64,
    pub etag: Option<String>,
    pub last_modified: Option<OffsetDateTime>,
}

/// A streaming GET response.
pub struct ObjectBody {
    pub body: ByteStream,
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    pub content_range: Option<String>,
    pub etag: Option<String>,
    pub last_modified: Option<OffsetDateTime>,
}

/// Result of a PUT.
#[derive(Debug, Clone)]
pub struct PutOutcome {
    pub etag: Option<String>,
}

/// One object row from a listing.
#[derive(Debug, Clone)]
pub struct ObjectInfo {
    pub key: String,
    pub size: u64,
    pub etag: Option<String>,
    pub last_modified: Option<OffsetDateTime>,
}

/// One page of `ListObjectsV2` output.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub objects: Vec<ObjectInfo>,
    pub common_prefixes: Vec<String>,
    pub next_token: Option<String>,
}

pub(crate) fn to_offset_datetime(dt: &aws_sdk_s3::primitives::DateTime) -> Option<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp(dt.secs()).ok()
}

impl S3Driver {
    /// Build a client for one storage configuration.
    ///
    /// Construction is expensive relative to requests (credential handling,
    /// connector setup); callers cache drivers per storage config.
    pub fn new(cfg: ConnectionConfig) -> Result<Self> {
        cfg.validate().map_err(S3DriverError::InvalidConfig)?;

        let credentials = Credentials::new(
            cfg.access_key.clone(),
            cfg.secret_key.clone(),
            None,
            None,
            "storage-config",
        );

        let retry = RetryConfig::standard()
            .with_max_attempts(cfg.provider.max_attempts())
            .with_initial_backoff(RETRY_INITIAL_BACKOFF)
            .with_max_backoff(RETRY_MAX_BACKOFF);

        let timeouts = TimeoutConfig::builder()
            .operation_timeout(cfg.provider.operation_timeout())
            .build();

        let mut builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(cfg.region.clone()))
            .credentials_provider(credentials)
            .force_path_style(cfg.path_style)
            .retry_config(retry)
            .timeout_config(timeouts);

        if let Some(endpoint) = &cfg.endpoint {
            builder = builder.endpoint_url(endpoint.clone());
        }

        if cfg.provider.checksum_when_required() {
            builder = builder
                .request_checksum_calculation(RequestChecksumCalculation::WhenRequired)
                .response_checksum_validation(ResponseChecksumValidation::WhenRequired);
        }

        Ok(Self {
            client: Client::from_conf(builder.build()),
            bucket: cfg.bucket,
            provider: cfg.provider,
            default_signed_ttl: cfg.default_signed_ttl,
            capabilities: Capability::ALL.to_vec(),
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn provider(&self) -> ProviderKind {
        self.provider
    }

    pub fn default_signed_ttl(&self) -> Duration {
        self.default_signed_ttl
    }

    pub(crate) fn client(&self) -> &Client {
        &self.client
    }

    pub fn has_capability(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    pub(crate) fn require(&self, capability: Capability, op: &'static str) -> Result<()> {
        if self.has_capability(capability) {
            Ok(())
        } else {
            Err(S3DriverError::Unsupported(op))
        }
    }

    /// Stream an object, optionally with an HTTP `Range`.
    pub async fn get_object(&self, key: &str, range: Option<&str>) -> Result<ObjectBody> {
        self.require(Capability::Read, "get_object")?;

        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .set_range(range.map(str::to_string))
            .send()
            .await
            .map_err(|e| map_sdk_err("get_object", e))?;

        Ok(ObjectBody {
            content_type: output.content_type().map(str::to_string),
            content_length: output.content_length().map(|l| l.max(0) as u64),
            content_range: output.content_range().map(str::to_string),
            etag: output.e_tag().map(str::to_string),
            last_modified: output.last_modified().and_then(to_offset_datetime),
            body: output.body,
        })
    }

    /// Buffer a full object into memory. Only for small bodies (inline
    /// updates, text previews); everything else streams.
    pub async fn get_object_bytes(&self, key: &str) -> Result<Bytes> {
        let object = self.get_object(key, None).await?;
        let data = object
            .body
            .collect()
            .await
            .map_err(|e| S3DriverError::Upstream {
                op: "get_object",
                status: None,
                message: e.to_string(),
            })?;
        Ok(data.into_bytes())
    }

    pub async fn put_object(
        &self,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<PutOutcome> {
        self.require(Capability::Write, "put_object")?;

        let output = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| map_sdk_err("put_object", e))?;

        Ok(PutOutcome {
            etag: output.e_tag().map(str::to_string),
        })
    }

    pub async fn delete_object(&self, key: &str) -> Result<()> {
        self.require(Capability::Write, "delete_object")?;

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| map_sdk_err("delete_object", e))?;

        Ok(())
    }

    /// Batched delete. Returns the keys the backend refused to delete.
    pub async fn delete_objects(&self, keys: &[String]) -> Result<Vec<String>> {
        self.require(Capability::Write, "delete_objects")?;

        let mut failed = Vec::new();
        for batch in keys.chunks(DELETE_BATCH_SIZE) {
            let identifiers = batch
                .iter()
                .map(|k| ObjectIdentifier::builder().key(k).build())
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| S3DriverError::InvalidConfig(e.to_string()))?;
            let delete = Delete::builder()
                .set_objects(Some(identifiers))
                .build()
                .map_err(|e| S3DriverError::InvalidConfig(e.to_string()))?;

            let output = self
                .client
                .delete_objects()
                .bucket(&self.bucket)
                .delete(delete)
                .send()
                .await
                .map_err(|e| map_sdk_err("delete_objects", e))?;

            for err in output.errors() {
                if let Some(key) = err.key() {
                    tracing::warn!(key, message = err.message(), "batch delete rejected key");
                    failed.push(key.to_string());
                }
            }
        }
        Ok(failed)
    }

    /// HEAD an object. Some S3-compatible services reject HEAD with 403/405;
    /// those fall back to a one-byte ranged GET and reconstruct the metadata
    /// from `Content-Range`.
    pub async fn head_object(&self, key: &str) -> Result<ObjectHead> {
        self.require(Capability::Read, "head_object")?;

        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(output) => Ok(ObjectHead {
                content_type: output.content_type().map(str::to_string),
                content_length: output.content_length().map(|l| l.max(0)).unwrap_or(0) as u64,
                etag: output.e_tag().map(str::to_string),
                last_modified: output.last_modified().and_then(to_offset_datetime),
            }),
            Err(err) => match sdk_status(&err) {
                Some(403) | Some(405) => self.head_via_ranged_get(key).await,
                Some(404) => Err(S3DriverError::NotFound(key.to_string())),
                _ => Err(map_sdk_err("head_object", err)),
            },
        }
    }

    async fn head_via_ranged_get(&self, key: &str) -> Result<ObjectHead> {
        let object = self.get_object(key, Some("bytes=0-0")).await?;

        // "bytes 0-0/1234" carries the real size after the slash.
        let total = object
            .content_range
            .as_deref()
            .and_then(|r| r.rsplit('/').next())
            .and_then(|t| t.parse::<u64>().ok())
            .or(object.content_length)
            .unwrap_or(0);

        Ok(ObjectHead {
            content_type: object.content_type,
            content_length: total,
            etag: object.etag,
            last_modified: object.last_modified,
        })
    }

    /// Copy within this bucket.
    pub async fn copy_object(&self, source_key: &str, target_key: &str) -> Result<PutOutcome> {
        self.require(Capability::Copy, "copy_object")?;

        let copy_source = format!(
            "{}/{}",
            self.bucket,
            utf8_percent_encode(source_key, COPY_SOURCE_ENCODE)
        );

        let output = self
            .client
            .copy_object()
            .bucket(&self.bucket)
            .copy_source(copy_source)
            .key(target_key)
            .send()
            .await
            .map_err(|e| map_sdk_err("copy_object", e))?;

        Ok(PutOutcome {
            etag: output
                .copy_object_result()
                .and_then(|r| r.e_tag())
                .map(str::to_string),
        })
    }

    /// One page of `ListObjectsV2`.
    pub async fn list_page(
        &self,
        prefix: &str,
        delimiter: Option<&str>,
        continuation_token: Option<String>,
        max_keys: Option<i32>,
    ) -> Result<ListPage> {
        self.require(Capability::List, "list_objects")?;

        let output = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .set_delimiter(delimiter.map(str::to_string))
            .set_continuation_token(continuation_token)
            .set_max_keys(max_keys)
            .send()
            .await
            .map_err(|e| map_sdk_err("list_objects", e))?;

        let objects = output
            .contents()
            .iter()
            .filter_map(|obj| {
                Some(ObjectInfo {
                    key: obj.key()?.to_string(),
                    size: obj.size().map(|s| s.max(0)).unwrap_or(0) as u64,
                    etag: obj.e_tag().map(str::to_string),
                    last_modified: obj.last_modified().and_then(to_offset_datetime),
                })
            })
            .collect();

        let common_prefixes = output
            .common_prefixes()
            .iter()
            .filter_map(|cp| cp.prefix().map(str::to_string))
            .collect();

        let next_token = if output.is_truncated().unwrap_or(false) {
            output.next_continuation_token().map(str::to_string)
        } else {
            None
        };

        Ok(ListPage {
            objects,
            common_prefixes,
            next_token,
        })
    }

    /// Consume `ListObjectsV2` pagination to exhaustion under a prefix.
    pub async fn list_all(&self, prefix: &str, delimiter: Option<&str>) -> Result<ListPage> {
        let mut merged = ListPage::default();
        let mut token = None;
        loop {
            let page = self
                .list_page(prefix, delimiter, token.take(), None)
                .await?;
            merged.objects.extend(page.objects);
            for cp in page.common_prefixes {
                if !merged.common_prefixes.contains(&cp) {
                    merged.common_prefixes.push(cp);
                }
            }
            match page.next_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }
        Ok(merged)
    }

    /// Total bytes stored in the bucket. Walks the whole keyspace, so this
    /// only runs when capacity enforcement is configured.
    pub async fn bucket_usage(&self) -> Result<u64> {
        let page = self.list_all("", None).await?;
        Ok(page.objects.iter().map(|o| o.size).sum())
    }
}
