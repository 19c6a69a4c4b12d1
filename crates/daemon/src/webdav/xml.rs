//! WebDAV XML: multistatus generation, LOCK responses, and the small
//! header/body grammars (Depth, Timeout, If, lockinfo).

use std::io::Cursor;
use std::time::Duration;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use time::format_description::FormatItem;
use time::macros::format_description;
use time::OffsetDateTime;

use crate::webdav::locks::{LockDepth, LockEntry, LockScope};

/// RFC 1123 date layout used by `getlastmodified`.
const HTTP_DATE: &[FormatItem<'static>] = format_description!(
    "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
);

pub fn http_date(ts: OffsetDateTime) -> String {
    ts.format(&HTTP_DATE)
        .unwrap_or_else(|_| ts.to_string())
}

/// One `<D:response>` row of a PROPFIND multistatus.
#[derive(Debug, Clone)]
pub struct PropfindEntry {
    pub href: String,
    pub display_name: String,
    pub is_directory: bool,
    pub size: u64,
    pub modified: Option<OffsetDateTime>,
    pub etag: Option<String>,
    pub content_type: String,
}

type XmlResult<T> = Result<T, quick_xml::Error>;

fn text_element(writer: &mut Writer<Cursor<Vec<u8>>>, name: &str, text: &str) -> XmlResult<()> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

fn empty_element(writer: &mut Writer<Cursor<Vec<u8>>>, name: &str) -> XmlResult<()> {
    writer.write_event(Event::Empty(BytesStart::new(name)))?;
    Ok(())
}

fn into_string(writer: Writer<Cursor<Vec<u8>>>) -> String {
    String::from_utf8(writer.into_inner().into_inner()).unwrap_or_default()
}

/// Render a PROPFIND multistatus document.
pub fn multistatus(entries: &[PropfindEntry]) -> String {
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    let _ = write_multistatus(&mut writer, entries);
    into_string(writer)
}

fn write_multistatus(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    entries: &[PropfindEntry],
) -> XmlResult<()> {
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
    let mut root = BytesStart::new("D:multistatus");
    root.push_attribute(("xmlns:D", "DAV:"));
    writer.write_event(Event::Start(root))?;

    for entry in entries {
        writer.write_event(Event::Start(BytesStart::new("D:response")))?;
        text_element(writer, "D:href", &entry.href)?;
        writer.write_event(Event::Start(BytesStart::new("D:propstat")))?;
        writer.write_event(Event::Start(BytesStart::new("D:prop")))?;

        text_element(writer, "D:displayname", &entry.display_name)?;

        writer.write_event(Event::Start(BytesStart::new("D:resourcetype")))?;
        if entry.is_directory {
            empty_element(writer, "D:collection")?;
        }
        writer.write_event(Event::End(BytesEnd::new("D:resourcetype")))?;

        if !entry.is_directory {
            text_element(writer, "D:getcontentlength", &entry.size.to_string())?;
        }
        if let Some(modified) = entry.modified {
            text_element(writer, "D:getlastmodified", &http_date(modified))?;
        }
        if let Some(etag) = &entry.etag {
            text_element(writer, "D:getetag", etag)?;
        }
        text_element(writer, "D:getcontenttype", &entry.content_type)?;

        writer.write_event(Event::End(BytesEnd::new("D:prop")))?;
        text_element(writer, "D:status", "HTTP/1.1 200 OK")?;
        writer.write_event(Event::End(BytesEnd::new("D:propstat")))?;
        writer.write_event(Event::End(BytesEnd::new("D:response")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("D:multistatus")))?;
    Ok(())
}

/// Multistatus refusing every property change; live properties here are
/// read-only, so PROPPATCH always answers 403 per property.
pub fn proppatch_refusal(href: &str) -> String {
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    let _ = (|| -> XmlResult<()> {
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
        let mut root = BytesStart::new("D:multistatus");
        root.push_attribute(("xmlns:D", "DAV:"));
        writer.write_event(Event::Start(root))?;
        writer.write_event(Event::Start(BytesStart::new("D:response")))?;
        text_element(&mut writer, "D:href", href)?;
        writer.write_event(Event::Start(BytesStart::new("D:propstat")))?;
        empty_element(&mut writer, "D:prop")?;
        text_element(&mut writer, "D:status", "HTTP/1.1 403 Forbidden")?;
        writer.write_event(Event::End(BytesEnd::new("D:propstat")))?;
        writer.write_event(Event::End(BytesEnd::new("D:response")))?;
        writer.write_event(Event::End(BytesEnd::new("D:multistatus")))?;
        Ok(())
    })();
    into_string(writer)
}

/// A multistatus reporting one failed href, used when a multi-step
/// operation (MOVE's delete leg) partially failed.
pub fn partial_failure(href: &str, status_line: &str, description: &str) -> String {
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    let _ = (|| -> XmlResult<()> {
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
        let mut root = BytesStart::new("D:multistatus");
        root.push_attribute(("xmlns:D", "DAV:"));
        writer.write_event(Event::Start(root))?;
        writer.write_event(Event::Start(BytesStart::new("D:response")))?;
        text_element(&mut writer, "D:href", href)?;
        text_element(&mut writer, "D:status", status_line)?;
        text_element(&mut writer, "D:responsedescription", description)?;
        writer.write_event(Event::End(BytesEnd::new("D:response")))?;
        writer.write_event(Event::End(BytesEnd::new("D:multistatus")))?;
        Ok(())
    })();
    into_string(writer)
}

/// `<D:prop><D:lockdiscovery>…` response body for LOCK.
pub fn lock_response(lock: &LockEntry) -> String {
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    let _ = (|| -> XmlResult<()> {
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
        let mut root = BytesStart::new("D:prop");
        root.push_attribute(("xmlns:D", "DAV:"));
        writer.write_event(Event::Start(root))?;
        writer.write_event(Event::Start(BytesStart::new("D:lockdiscovery")))?;
        writer.write_event(Event::Start(BytesStart::new("D:activelock")))?;

        writer.write_event(Event::Start(BytesStart::new("D:locktype")))?;
        empty_element(&mut writer, "D:write")?;
        writer.write_event(Event::End(BytesEnd::new("D:locktype")))?;

        writer.write_event(Event::Start(BytesStart::new("D:lockscope")))?;
        match lock.scope {
            LockScope::Exclusive => empty_element(&mut writer, "D:exclusive")?,
            LockScope::Shared => empty_element(&mut writer, "D:shared")?,
        }
        writer.write_event(Event::End(BytesEnd::new("D:lockscope")))?;

        let depth = match lock.depth {
            LockDepth::Zero => "0",
            LockDepth::Infinity => "infinity",
        };
        text_element(&mut writer, "D:depth", depth)?;

        if let Some(owner) = &lock.owner {
            text_element(&mut writer, "D:owner", owner)?;
        }

        text_element(
            &mut writer,
            "D:timeout",
            &format!("Second-{}", lock.timeout.as_secs()),
        )?;

        writer.write_event(Event::Start(BytesStart::new("D:locktoken")))?;
        text_element(&mut writer, "D:href", &lock.token)?;
        writer.write_event(Event::End(BytesEnd::new("D:locktoken")))?;

        text_element(&mut writer, "D:lockroot", &lock.path)?;

        writer.write_event(Event::End(BytesEnd::new("D:activelock")))?;
        writer.write_event(Event::End(BytesEnd::new("D:lockdiscovery")))?;
        writer.write_event(Event::End(BytesEnd::new("D:prop")))?;
        Ok(())
    })();
    into_string(writer)
}

/// Parsed `<D:lockinfo>` request body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockInfo {
    pub exclusive: bool,
    pub owner: Option<String>,
}

/// Parse a LOCK request body. An empty body means refresh; callers handle
/// that before parsing.
pub fn parse_lockinfo(body: &str) -> LockInfo {
    let mut reader = Reader::from_str(body);
    reader.config_mut().trim_text(true);

    let mut info = LockInfo {
        // RFC default when no scope is given.
        exclusive: true,
        owner: None,
    };
    let mut in_owner = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                match local_name(e.name().as_ref()) {
                    b"exclusive" => info.exclusive = true,
                    b"shared" => info.exclusive = false,
                    b"owner" => in_owner = true,
                    b"href" if in_owner => {}
                    _ => {}
                }
            }
            Ok(Event::End(e)) => {
                if local_name(e.name().as_ref()) == b"owner" {
                    in_owner = false;
                }
            }
            Ok(Event::Text(t)) if in_owner => {
                if let Ok(text) = t.unescape() {
                    let text = text.trim().to_string();
                    if !text.is_empty() {
                        info.owner = Some(text);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
    }
    info
}

fn local_name(name: &[u8]) -> &[u8] {
    match name.iter().rposition(|&b| b == b':') {
        Some(idx) => &name[idx + 1..],
        None => name,
    }
}

/// Parse a `Timeout` header: first `Second-N` wins, `Infinite` falls back
/// to the server default.
pub fn parse_timeout(value: Option<&str>) -> Option<Duration> {
    let value = value?;
    for part in value.split(',') {
        let part = part.trim();
        if let Some(seconds) = part.strip_prefix("Second-") {
            if let Ok(seconds) = seconds.parse::<u64>() {
                return Some(Duration::from_secs(seconds));
            }
        }
    }
    None
}

/// Parse a `Depth` header for LOCK/PROPFIND/COPY.
pub fn parse_depth(value: Option<&str>) -> Option<LockDepth> {
    match value?.trim() {
        "0" => Some(LockDepth::Zero),
        "infinity" | "Infinity" => Some(LockDepth::Infinity),
        _ => None,
    }
}

/// Extract every lock token from an `If` or `Lock-Token` header value.
///
/// Handles the tagged and untagged list forms well enough for real
/// clients: any `<...>` item that looks like a token is collected.
pub fn parse_lock_tokens(value: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut rest = value;
    while let Some(start) = rest.find('<') {
        let Some(end) = rest[start..].find('>') else {
            break;
        };
        let candidate = &rest[start + 1..start + end];
        if candidate.starts_with("opaquelocktoken:") || candidate.starts_with("urn:") {
            tokens.push(candidate.to_string());
        }
        rest = &rest[start + end + 1..];
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_multistatus_shape() {
        let xml = multistatus(&[
            PropfindEntry {
                href: "/dav/docs/".to_string(),
                display_name: "docs".to_string(),
                is_directory: true,
                size: 0,
                modified: None,
                etag: None,
                content_type: "application/x-directory".to_string(),
            },
            PropfindEntry {
                href: "/dav/docs/a.txt".to_string(),
                display_name: "a.txt".to_string(),
                is_directory: false,
                size: 5,
                modified: Some(OffsetDateTime::UNIX_EPOCH),
                etag: Some("\"abc\"".to_string()),
                content_type: "text/plain; charset=UTF-8".to_string(),
            },
        ]);

        assert!(xml.starts_with("<?xml"));
        assert!(xml.contains("<D:multistatus xmlns:D=\"DAV:\">"));
        assert!(xml.contains("<D:collection/>"));
        assert!(xml.contains("<D:getcontentlength>5</D:getcontentlength>"));
        assert!(xml.contains("Thu, 01 Jan 1970 00:00:00 GMT"));
        // Etag quotes must survive escaping rules.
        assert!(xml.contains("&quot;abc&quot;") || xml.contains("\"abc\""));
    }

    #[test]
    fn test_lock_response_contains_token() {
        let entry = LockEntry {
            token: "opaquelocktoken:12345".to_string(),
            path: "/x.txt".to_string(),
            depth: LockDepth::Zero,
            scope: LockScope::Exclusive,
            owner: Some("alice".to_string()),
            timeout: Duration::from_secs(600),
            expires_at: Instant::now() + Duration::from_secs(600),
        };
        let xml = lock_response(&entry);
        assert!(xml.contains("opaquelocktoken:12345"));
        assert!(xml.contains("<D:exclusive/>"));
        assert!(xml.contains("Second-600"));
        assert!(xml.contains("<D:depth>0</D:depth>"));
    }

    #[test]
    fn test_parse_lockinfo() {
        let body = r#"<?xml version="1.0" encoding="utf-8"?>
            <D:lockinfo xmlns:D="DAV:">
              <D:lockscope><D:exclusive/></D:lockscope>
              <D:locktype><D:write/></D:locktype>
              <D:owner><D:href>mailto:ops@example.com</D:href></D:owner>
            </D:lockinfo>"#;
        let info = parse_lockinfo(body);
        assert!(info.exclusive);
        assert_eq!(info.owner.as_deref(), Some("mailto:ops@example.com"));

        let shared = parse_lockinfo(
            r#"<lockinfo xmlns="DAV:"><lockscope><shared/></lockscope></lockinfo>"#,
        );
        assert!(!shared.exclusive);
    }

    #[test]
    fn test_parse_timeout() {
        assert_eq!(
            parse_timeout(Some("Second-600")),
            Some(Duration::from_secs(600))
        );
        assert_eq!(
            parse_timeout(Some("Infinite, Second-4100000000")),
            Some(Duration::from_secs(4_100_000_000))
        );
        assert_eq!(parse_timeout(Some("Infinite")), None);
        assert_eq!(parse_timeout(None), None);
    }

    #[test]
    fn test_parse_depth() {
        assert_eq!(parse_depth(Some("0")), Some(LockDepth::Zero));
        assert_eq!(parse_depth(Some("infinity")), Some(LockDepth::Infinity));
        assert_eq!(parse_depth(Some("1")), None);
        assert_eq!(parse_depth(None), None);
    }

    #[test]
    fn test_parse_lock_tokens() {
        let tokens = parse_lock_tokens("(<opaquelocktoken:abc-def>)");
        assert_eq!(tokens, vec!["opaquelocktoken:abc-def".to_string()]);

        let tagged = parse_lock_tokens(
            "</dav/x.txt> (<opaquelocktoken:one>) (<opaquelocktoken:two>)",
        );
        assert_eq!(tagged.len(), 2);

        assert!(parse_lock_tokens("(<DAV:no-lock>)").is_empty());
    }
}
