//! Lenient accessors over the raw request payload.
//!
//! Payloads arrive as loosely typed JSON from event sources, so numbers may be
//! strings and blocks may be missing. Everything here returns `Option` and
//! never fails.
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::Value;

use crate::types::PageMetrics;

/// Top-level payload keys that may carry the document inline.
pub const INLINE_PAYLOAD_KEYS: [&str; 5] = [
    "documentBytes",
    "document_bytes",
    "documentContent",
    "document_content",
    "payload",
];

/// `documentMetadata` keys that may carry the document inline.
pub const INLINE_METADATA_KEYS: [&str; 2] = ["inlineContent", "inline_content"];

pub fn safe_f64(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|n| n.is_finite())
}

pub fn safe_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0 && f.is_finite()).map(|f| f as u64)),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }
}

fn first_f64(payload: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|key| payload.get(*key).and_then(safe_f64))
}

fn first_u32(payload: &Value, keys: &[&str]) -> Option<u32> {
    keys.iter()
        .find_map(|key| payload.get(*key).and_then(safe_u64))
        .map(|n| u32::try_from(n).unwrap_or(u32::MAX))
}

/// Bucket name from an S3 event-style payload (`s3.bucket.name`).
pub fn bucket(payload: &Value) -> Option<String> {
    payload
        .pointer("/s3/bucket/name")
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

fn decode_text(text: &str) -> Vec<u8> {
    match STANDARD.decode(text) {
        Ok(decoded) if !decoded.is_empty() => decoded,
        _ => text.as_bytes().to_vec(),
    }
}

/// Whether `text` decodes as strict base64, checked without decoding all of it.
fn is_strict_base64(text: &str) -> bool {
    let bytes = text.as_bytes();
    if bytes.is_empty() || bytes.len() % 4 != 0 {
        return false;
    }
    let (body, last) = bytes.split_at(bytes.len() - 4);
    body.iter().all(|b| b.is_ascii_alphanumeric() || *b == b'+' || *b == b'/') && STANDARD.decode(last).is_ok()
}

/// Decode a string payload as strict base64, falling back to its UTF-8 bytes.
pub fn coerce_bytes(value: &Value) -> Option<Vec<u8>> {
    value.as_str().filter(|s| !s.is_empty()).map(decode_text)
}

fn inline_text(payload: &Value) -> Option<&str> {
    fn non_empty(value: &Value) -> Option<&str> {
        value.as_str().filter(|s| !s.is_empty())
    }
    INLINE_PAYLOAD_KEYS
        .iter()
        .find_map(|key| payload.get(*key).and_then(non_empty))
        .or_else(|| {
            let metadata = payload.get("documentMetadata")?;
            INLINE_METADATA_KEYS
                .iter()
                .find_map(|key| metadata.get(*key).and_then(non_empty))
        })
}

/// Document bytes carried inline in the payload, if any.
pub fn inline_bytes(payload: &Value) -> Option<Vec<u8>> {
    inline_text(payload).map(decode_text)
}

/// At most the first `limit` bytes of [`inline_bytes`], decoding only that much.
pub fn inline_prefix(payload: &Value, limit: usize) -> Option<Vec<u8>> {
    let text = inline_text(payload)?;
    let encoded_len = limit.div_ceil(3) * 4;

    let mut bytes = if text.len() <= encoded_len {
        decode_text(text)
    } else if is_strict_base64(text) {
        STANDARD
            .decode(&text[..encoded_len])
            .unwrap_or_else(|_| text.as_bytes()[..limit].to_vec())
    } else {
        text.as_bytes()[..limit].to_vec()
    };
    bytes.truncate(limit);
    Some(bytes)
}

/// Declared page count.
///
/// Looks at `documentMetadata.pageCount`, then the length of
/// `documentMetadata.layout.pages`, then top-level `page_count`/`pageCount`.
pub fn infer_page_count(payload: &Value) -> Option<u64> {
    let metadata = payload.get("documentMetadata");

    if let Some(declared) = metadata.and_then(|m| m.get("pageCount")) {
        return safe_u64(declared);
    }

    if let Some(pages) = metadata
        .and_then(|m| m.pointer("/layout/pages"))
        .and_then(Value::as_array)
    {
        return Some(pages.len() as u64);
    }

    ["page_count", "pageCount"]
        .iter()
        .find_map(|key| payload.get(*key).filter(|v| !v.is_null()))
        .and_then(safe_u64)
}

/// Build page metrics from a page object in camelCase or snake_case.
///
/// Missing densities default to text 0.5, image `1 - text`, table 0.
pub fn page_metrics_from_value(position: u32, page: &Value) -> PageMetrics {
    let text_density = first_f64(page, &["text_density", "textDensity"]).unwrap_or(0.5);
    let image_density = first_f64(page, &["image_density", "imageDensity"]).unwrap_or(1.0 - text_density);
    let table_density = first_f64(page, &["tableDensity", "table_density"]).unwrap_or(0.0);
    let index = first_u32(page, &["index"]).unwrap_or(position);

    let mut metrics = PageMetrics::new(index, text_density, image_density, table_density)
        .with_tables(first_u32(page, &["tableCount", "table_count"]).unwrap_or(0))
        .with_images(first_u32(page, &["imageCount", "image_count"]).unwrap_or(0))
        .with_form_fields(
            first_u32(page, &["checkboxCount", "checkbox_count"]).unwrap_or(0),
            first_u32(page, &["radioButtonCount", "radio_button_count"]).unwrap_or(0),
        );

    if let Some(chars) = ["charCount", "char_count"]
        .iter()
        .find_map(|key| page.get(*key).and_then(safe_u64))
    {
        metrics = metrics.with_char_count(chars);
    }

    metrics
}
