//! Text extraction from raw ingested bytes.

use crate::error::{Error, Result};
use serde_json::Value;
use std::path::Path;

/// Structured formats that are read as plain UTF-8 text.
const TEXTUAL_APPLICATION_TYPES: &[&str] = &[
    "application/xml",
    "application/toml",
    "application/yaml",
    "application/x-yaml",
    "application/x-sh",
    "application/javascript",
    "application/x-ndjson",
    "application/sql",
];

/// Lower-cased MIME type without parameters (`text/plain; charset=utf-8` -> `text/plain`).
pub fn normalize_content_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Extract indexable text from `bytes` according to `content_type`.
pub fn extract_text(bytes: &[u8], content_type: &str) -> Result<String> {
    let mime = normalize_content_type(content_type);

    let text = if mime == "application/json" {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| Error::unsupported(format!("invalid JSON document: {}", e)))?;
        let mut parts = Vec::new();
        collect_strings(&value, &mut parts);
        parts.join("\n")
    } else if mime.starts_with("text/") || TEXTUAL_APPLICATION_TYPES.contains(&mime.as_str()) {
        decode_utf8(bytes)?
    } else if mime.is_empty() {
        return Err(Error::unsupported("missing content type"));
    } else {
        return Err(Error::unsupported(format!("content type '{}'", mime)));
    };

    if text.trim().is_empty() {
        return Err(Error::unsupported("document contains no text"));
    }
    Ok(text)
}

fn decode_utf8(bytes: &[u8]) -> Result<String> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| Error::unsupported(format!("document is not valid UTF-8: {}", e)))?;
    Ok(text.trim_start_matches('\u{feff}').to_string())
}

fn collect_strings(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) if !s.trim().is_empty() => out.push(s.clone()),
        Value::Array(items) => items.iter().for_each(|v| collect_strings(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_strings(v, out)),
        _ => {}
    }
}

/// Guess a content type from a file extension, for transports that only have a path.
pub fn content_type_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "txt" | "text" | "log" => "text/plain",
        "md" | "markdown" => "text/markdown",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        "rs" | "py" | "go" | "java" | "c" | "h" | "cpp" | "ts" | "js" | "rb" => "text/plain",
        "json" => "application/json",
        "ndjson" | "jsonl" => "application/x-ndjson",
        "xml" => "application/xml",
        "toml" => "application/toml",
        "yaml" | "yml" => "application/yaml",
        "sh" => "application/x-sh",
        "sql" => "application/sql",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_plain_text() {
        let text = extract_text(b"hello world", "text/plain").unwrap();
        assert_eq!(text, "hello world");
    }

    #[test]
    fn test_content_type_parameters_ignored() {
        let text = extract_text(b"# Title", "Text/Markdown; charset=UTF-8").unwrap();
        assert_eq!(text, "# Title");
    }

    #[test]
    fn test_json_string_leaves() {
        let raw = br#"{"title": "Rust", "tags": ["fast", "safe"], "stars": 5}"#;
        let text = extract_text(raw, "application/json").unwrap();
        assert!(text.contains("Rust"));
        assert!(text.contains("fast"));
        assert!(text.contains("safe"));
        assert!(!text.contains('5'));
    }

    #[test]
    fn test_unsupported_binary() {
        let err = extract_text(&[0x25, 0x50, 0x44, 0x46], "application/pdf").unwrap_err();
        assert_matches!(err, Error::UnsupportedContent(msg) if msg.contains("application/pdf"));
    }

    #[test]
    fn test_invalid_utf8() {
        assert_matches!(
            extract_text(&[0xff, 0xfe, 0xfd], "text/plain"),
            Err(Error::UnsupportedContent(_))
        );
    }

    #[test]
    fn test_empty_document() {
        assert_matches!(extract_text(b"   \n", "text/plain"), Err(Error::UnsupportedContent(_)));
        assert_matches!(extract_text(b"{}", "application/json"), Err(Error::UnsupportedContent(_)));
    }

    #[test]
    fn test_missing_content_type() {
        assert_matches!(extract_text(b"hello", ""), Err(Error::UnsupportedContent(_)));
    }

    #[test]
    fn test_content_type_for_path() {
        assert_eq!(content_type_for_path(Path::new("notes.MD")), "text/markdown");
        assert_eq!(content_type_for_path(Path::new("data.json")), "application/json");
        assert_eq!(content_type_for_path(Path::new("README")), "application/octet-stream");
    }
}
