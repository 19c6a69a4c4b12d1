//! MIME handling for uploads, previews and downloads.
//!
//! Content types are always inferred server-side from the filename; what a
//! client declares is never trusted. Text-family files get their preview
//! content type forced to `text/plain; charset=UTF-8` so browsers render
//! instead of executing them.

/// Directory marker content type used by the object store.
pub const DIRECTORY_CONTENT_TYPE: &str = "application/x-directory";

/// Default for anything we cannot classify.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Extensions treated as text-family for preview purposes: markdown, source
/// code, configuration, structured data and logs.
const TEXT_FAMILY_EXTENSIONS: &[&str] = &[
    "md", "markdown", "rst", "txt", "text", "log", "csv", "tsv", "json", "jsonl", "xml", "yaml",
    "yml", "toml", "ini", "cfg", "conf", "env", "properties", "rs", "go", "c", "h", "cpp", "hpp",
    "cc", "py", "rb", "js", "mjs", "ts", "tsx", "jsx", "java", "kt", "swift", "cs", "php", "pl",
    "sh", "bash", "zsh", "fish", "ps1", "bat", "sql", "lua", "vim", "diff", "patch", "gitignore",
    "dockerfile", "makefile", "proto", "graphql", "tf", "hcl",
];

fn extension(name: &str) -> Option<String> {
    let base = name.rsplit('/').next().unwrap_or(name);
    // Extension-less well-known files (Makefile, Dockerfile) classify by name.
    let lowered = base.to_ascii_lowercase();
    if let Some((_, ext)) = lowered.rsplit_once('.') {
        if !ext.is_empty() {
            return Some(ext.to_string());
        }
    }
    Some(lowered)
}

/// Whether a filename looks like something a human would read as text.
pub fn is_text_family(name: &str) -> bool {
    match extension(name) {
        Some(ext) => TEXT_FAMILY_EXTENSIONS.contains(&ext.as_str()),
        None => false,
    }
}

/// Whether a MIME type is textual (`text/*` plus the JSON/XML application
/// types).
pub fn is_textual_mime(mime: &str) -> bool {
    let essence = mime.split(';').next().unwrap_or(mime).trim();
    essence.starts_with("text/")
        || matches!(
            essence,
            "application/json" | "application/xml" | "application/x-yaml" | "application/toml"
        )
}

/// Infer a content type from a filename, appending `charset=UTF-8` to
/// textual types.
pub fn content_type_for_name(name: &str) -> String {
    let guessed = mime_guess::from_path(name).first_or_octet_stream();
    let mime = guessed.essence_str().to_string();
    if is_textual_mime(&mime) {
        format!("{mime}; charset=UTF-8")
    } else {
        mime
    }
}

/// Content type to attach to a preview URL or proxied preview response.
///
/// Text-family files are forced to plain text so browsers render them. HTML
/// in particular is never served as `text/html` inline; it only keeps its
/// type on download.
pub fn preview_content_type(name: &str) -> String {
    if is_text_family(name) {
        return "text/plain; charset=UTF-8".to_string();
    }
    let mime = content_type_for_name(name);
    if mime.starts_with("text/html") {
        return "text/plain; charset=UTF-8".to_string();
    }
    mime
}

/// Content type for a download response; HTML keeps `text/html` here.
pub fn download_content_type(name: &str) -> String {
    content_type_for_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_family_classification() {
        assert!(is_text_family("README.md"));
        assert!(is_text_family("config.toml"));
        assert!(is_text_family("src/main.rs"));
        assert!(is_text_family("server.log"));
        assert!(is_text_family("Makefile"));
        assert!(!is_text_family("photo.jpg"));
        assert!(!is_text_family("archive.tar.gz"));
        assert!(!is_text_family("page.html"));
    }

    #[test]
    fn test_content_type_gets_charset() {
        assert_eq!(
            content_type_for_name("notes.txt"),
            "text/plain; charset=UTF-8"
        );
        assert_eq!(
            content_type_for_name("data.json"),
            "application/json; charset=UTF-8"
        );
        assert_eq!(content_type_for_name("photo.jpg"), "image/jpeg");
    }

    #[test]
    fn test_preview_forces_plain_text() {
        assert_eq!(
            preview_content_type("script.py"),
            "text/plain; charset=UTF-8"
        );
        // HTML never renders inline as HTML.
        assert_eq!(
            preview_content_type("page.html"),
            "text/plain; charset=UTF-8"
        );
        assert_eq!(preview_content_type("photo.jpg"), "image/jpeg");
    }

    #[test]
    fn test_download_preserves_html() {
        assert_eq!(
            download_content_type("page.html"),
            "text/html; charset=UTF-8"
        );
    }
}
