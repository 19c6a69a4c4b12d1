//! Provider families and their configuration-level tuning.

use std::fmt;
use std::time::Duration;

/// The family of S3-compatible service behind a driver.
///
/// Differences between families are expressed here as tuning values consumed
/// once at client construction, not as runtime branches inside operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Aws,
    R2,
    B2,
    Generic,
}

impl ProviderKind {
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "aws" | "s3" => ProviderKind::Aws,
            "r2" | "cloudflare" => ProviderKind::R2,
            "b2" | "backblaze" => ProviderKind::B2,
            _ => ProviderKind::Generic,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Aws => "aws",
            ProviderKind::R2 => "r2",
            ProviderKind::B2 => "b2",
            ProviderKind::Generic => "generic",
        }
    }

    /// Total attempts for SDK-level retries of idempotent operations.
    pub fn max_attempts(&self) -> u32 {
        match self {
            ProviderKind::B2 => 4,
            _ => 3,
        }
    }

    /// Per-operation timeout. B2 is noticeably slower to first byte under
    /// load, so it gets a longer leash.
    pub fn operation_timeout(&self) -> Duration {
        match self {
            ProviderKind::B2 => Duration::from_secs(120),
            _ => Duration::from_secs(60),
        }
    }

    /// Non-AWS services reject or mangle the newer default checksum
    /// headers, so checksums are only computed when an operation requires
    /// them.
    pub fn checksum_when_required(&self) -> bool {
        !matches!(self, ProviderKind::Aws)
    }

    /// Part size handed to clients starting a multipart upload.
    pub fn recommended_part_size(&self) -> u64 {
        match self {
            ProviderKind::B2 => 8 * 1024 * 1024,
            _ => 5 * 1024 * 1024,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single operation class a driver may support.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Read,
    Write,
    List,
    Presign,
    Multipart,
    Copy,
    Proxy,
}

impl Capability {
    pub const ALL: &'static [Capability] = &[
        Capability::Read,
        Capability::Write,
        Capability::List,
        Capability::Presign,
        Capability::Multipart,
        Capability::Copy,
        Capability::Proxy,
    ];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_provider() {
        assert_eq!(ProviderKind::parse("AWS"), ProviderKind::Aws);
        assert_eq!(ProviderKind::parse("r2"), ProviderKind::R2);
        assert_eq!(ProviderKind::parse("backblaze"), ProviderKind::B2);
        assert_eq!(ProviderKind::parse("minio"), ProviderKind::Generic);
    }

    #[test]
    fn test_b2_gets_bigger_budget() {
        assert!(ProviderKind::B2.max_attempts() > ProviderKind::Aws.max_attempts());
        assert!(ProviderKind::B2.operation_timeout() > ProviderKind::Aws.operation_timeout());
    }

    #[test]
    fn test_checksum_tuning() {
        assert!(!ProviderKind::Aws.checksum_when_required());
        assert!(ProviderKind::R2.checksum_when_required());
        assert!(ProviderKind::Generic.checksum_when_required());
    }
}
