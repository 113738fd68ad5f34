//! Document content resolution.
//!
//! Layout analysers that inspect raw bytes receive them through a
//! [`ContentResolver`]. The router consults its resolvers lazily, only when the
//! configured analyser declares that it needs content.
use crate::core::payload;
use crate::types::DocumentDescriptor;

/// Supplies raw document bytes on demand.
///
/// Resolvers never fail: an unavailable document is `None`. Any closure of the
/// right shape is a resolver, which keeps test doubles and storage adapters
/// small.
///
/// # Example
///
/// ```rust
/// use idp_router::{ContentResolver, DocumentDescriptor};
///
/// let from_disk = |descriptor: &DocumentDescriptor| std::fs::read(&descriptor.object_key).ok();
/// # let descriptor = DocumentDescriptor {
/// #     object_key: "/nonexistent/file.pdf".to_string(),
/// #     bucket: None,
/// #     payload: serde_json::json!({}),
/// #     mime_type: "application/pdf".to_string(),
/// #     request_override: None,
/// # };
/// assert!(from_disk.resolve(&descriptor).is_none());
/// ```
pub trait ContentResolver: Send + Sync {
    /// Name used in log fields.
    fn name(&self) -> &str {
        "custom"
    }

    fn resolve(&self, descriptor: &DocumentDescriptor) -> Option<Vec<u8>>;
}

impl<F> ContentResolver for F
where
    F: Fn(&DocumentDescriptor) -> Option<Vec<u8>> + Send + Sync,
{
    fn resolve(&self, descriptor: &DocumentDescriptor) -> Option<Vec<u8>> {
        self(descriptor)
    }
}

/// Reads base64 or raw inline content from the request payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineContentResolver;

impl ContentResolver for InlineContentResolver {
    fn name(&self) -> &str {
        "inline"
    }

    fn resolve(&self, descriptor: &DocumentDescriptor) -> Option<Vec<u8>> {
        payload::inline_bytes(&descriptor.payload)
    }
}
