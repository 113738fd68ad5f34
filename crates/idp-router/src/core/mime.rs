//! MIME type detection for inbound documents.
//!
//! Detection order:
//! 1. Declared `documentMetadata.contentType` / `documentMetadata.mimeType`
//! 2. Magic bytes of inline content (`infer`, then markup and text sniffing)
//! 3. Object key extension (`mime_guess`)
//! 4. `application/octet-stream`

use serde_json::Value;

use super::payload;

pub const PDF_MIME_TYPE: &str = "application/pdf";
pub const HTML_MIME_TYPE: &str = "text/html";
pub const XHTML_MIME_TYPE: &str = "application/xhtml+xml";
pub const XML_MIME_TYPE: &str = "application/xml";
pub const PLAIN_TEXT_MIME_TYPE: &str = "text/plain";
pub const EML_MIME_TYPE: &str = "message/rfc822";
pub const MSG_MIME_TYPE: &str = "application/vnd.ms-outlook";
pub const LEGACY_WORD_MIME_TYPE: &str = "application/msword";
pub const OCTET_STREAM_MIME_TYPE: &str = "application/octet-stream";

/// Bytes of inline content decoded for sniffing.
const SNIFF_LIMIT: usize = 8192;

pub const PDF_MIME_TYPES: [&str; 3] = [PDF_MIME_TYPE, "application/x-pdf", "application/acrobat"];
pub const EMAIL_MIME_TYPES: [&str; 2] = [EML_MIME_TYPE, MSG_MIME_TYPE];

/// Detect the MIME type of a routed document.
pub fn detect_mime_type(object_key: &str, payload: &Value) -> String {
    if let Some(declared) = payload.get("documentMetadata").and_then(|metadata| {
        ["contentType", "mimeType"]
            .iter()
            .find_map(|key| metadata.get(*key).and_then(Value::as_str))
            .filter(|mime| !mime.trim().is_empty())
    }) {
        return declared.trim().to_string();
    }

    if let Some(detected) = payload::inline_prefix(payload, SNIFF_LIMIT).and_then(|bytes| detect_from_bytes(&bytes)) {
        return detected.to_string();
    }

    mime_guess::from_path(object_key)
        .first()
        .map(|mime| mime.essence_str().to_string())
        .unwrap_or_else(|| OCTET_STREAM_MIME_TYPE.to_string())
}

/// Sniff a MIME type from document bytes.
pub fn detect_from_bytes(data: &[u8]) -> Option<&'static str> {
    if data.is_empty() {
        return None;
    }

    if let Some(kind) = infer::get(data) {
        return Some(match kind.mime_type() {
            "application/x-ole-storage" => LEGACY_WORD_MIME_TYPE,
            "text/xml" => XML_MIME_TYPE,
            other => other,
        });
    }

    let head = &data[..data.len().min(2048)];
    let snippet = String::from_utf8_lossy(head);
    let lowered = snippet.trim().to_lowercase();

    if lowered.starts_with("from:") || lowered.starts_with("received:") {
        return Some(EML_MIME_TYPE);
    }
    let prefix: String = lowered.chars().take(200).collect();
    if lowered.starts_with("<!doctype html") || prefix.contains("<html") {
        return Some(HTML_MIME_TYPE);
    }
    if lowered.starts_with("<?xml") {
        return Some(XML_MIME_TYPE);
    }

    let sample = &data[..data.len().min(128)];
    let printable = sample
        .iter()
        .filter(|byte| matches!(**byte, 32..=126 | b'\t' | b'\n' | b'\r'))
        .count();
    if printable as f64 / sample.len() as f64 > 0.9 {
        return Some(PLAIN_TEXT_MIME_TYPE);
    }

    None
}

/// Whether the descriptor looks like a PDF by MIME type or key extension.
pub fn is_pdf(mime_type: &str, object_key: &str) -> bool {
    PDF_MIME_TYPES.contains(&mime_type.to_ascii_lowercase().as_str()) || has_extension(object_key, &["pdf"])
}

pub fn is_email(mime_type: &str, object_key: &str) -> bool {
    EMAIL_MIME_TYPES.contains(&mime_type.to_ascii_lowercase().as_str()) || has_extension(object_key, &["eml", "msg"])
}

pub fn is_html(mime_type: &str, object_key: &str) -> bool {
    let mime = mime_type.to_ascii_lowercase();
    mime == HTML_MIME_TYPE || mime == XHTML_MIME_TYPE || has_extension(object_key, &["html", "htm", "xhtml"])
}

pub fn is_plain_text(mime_type: &str, object_key: &str) -> bool {
    let mime = mime_type.to_ascii_lowercase();
    mime.starts_with("text/") || has_extension(object_key, &["txt", "text", "log", "csv", "md"])
}

fn has_extension(object_key: &str, extensions: &[&str]) -> bool {
    std::path::Path::new(object_key)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.iter().any(|candidate| ext.eq_ignore_ascii_case(candidate)))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde_json::json;

    #[test]
    fn test_declared_content_type_wins() {
        let payload = json!({
            "documentMetadata": {"contentType": "message/rfc822"},
            "documentBytes": STANDARD.encode(b"%PDF-1.7\n"),
        });
        assert_eq!(detect_mime_type("scan.pdf", &payload), "message/rfc822");
    }

    #[test]
    fn test_inline_bytes_sniffed() {
        let payload = json!({"documentBytes": STANDARD.encode(b"%PDF-1.7\n%\xE2\xE3\xCF\xD3\n")});
        assert_eq!(detect_mime_type("upload.bin", &payload), PDF_MIME_TYPE);
    }

    #[test]
    fn test_large_inline_document_sniffed_from_prefix() {
        let mut document = b"%PDF-1.7\n%\xE2\xE3\xCF\xD3\n".to_vec();
        document.resize(2_000_000, b' ');
        let payload = json!({"documentBytes": STANDARD.encode(&document)});
        assert_eq!(detect_mime_type("upload.bin", &payload), PDF_MIME_TYPE);

        let text = json!({"documentContent": "Meeting notes ".repeat(100_000)});
        assert_eq!(detect_mime_type("upload.bin", &text), PLAIN_TEXT_MIME_TYPE);
    }

    #[test]
    fn test_extension_fallback() {
        assert_eq!(detect_mime_type("inbound/report.pdf", &json!({})), PDF_MIME_TYPE);
        assert_eq!(detect_mime_type("inbound/page.html", &json!({})), HTML_MIME_TYPE);
        assert_eq!(detect_mime_type("inbound/blob", &json!({})), OCTET_STREAM_MIME_TYPE);
    }

    #[test]
    fn test_detect_from_bytes_markup_and_text() {
        assert_eq!(detect_from_bytes(b"<!DOCTYPE html><html></html>"), Some(HTML_MIME_TYPE));
        assert_eq!(detect_from_bytes(b"  <html><body>x</body></html>"), Some(HTML_MIME_TYPE));
        assert_eq!(detect_from_bytes(b"<?xml version=\"1.0\"?><a/>"), Some(XML_MIME_TYPE));
        assert_eq!(detect_from_bytes(b"From: a@example.com\r\nSubject: hi\r\n\r\nbody"), Some(EML_MIME_TYPE));
        assert_eq!(detect_from_bytes(b"quarterly figures attached\n"), Some(PLAIN_TEXT_MIME_TYPE));
        assert_eq!(detect_from_bytes(&[0x00, 0x01, 0x02, 0x03, 0xFF, 0xFE, 0x10, 0x11]), None);
        assert_eq!(detect_from_bytes(b""), None);
    }

    #[test]
    fn test_format_predicates() {
        assert!(is_pdf("application/x-pdf", "blob"));
        assert!(is_pdf("application/octet-stream", "scans/A.PDF"));
        assert!(is_email("application/octet-stream", "mail/msg-1.eml"));
        assert!(is_html("application/xhtml+xml", "x"));
        assert!(is_plain_text("text/csv", "x"));
        assert!(!is_plain_text("application/json", "x.json"));
    }
}
