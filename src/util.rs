use sha2::Digest;

/// Marker appended to text cut by [`truncate_with_marker`].
pub const TRUNCATION_MARKER: &str = " ...[truncated]";

/// Cut `text` to at most `max_bytes` (marker included) on a char boundary.
///
/// Text that already fits is returned unchanged, so the marker only ever
/// appears when data was actually dropped. Caps too small for the marker
/// cut the text without one.
pub fn truncate_with_marker(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let marker = if max_bytes >= TRUNCATION_MARKER.len() {
        TRUNCATION_MARKER
    } else {
        ""
    };
    let budget = max_bytes - marker.len();
    let mut end = 0;
    for (idx, ch) in text.char_indices() {
        if idx + ch.len_utf8() > budget {
            break;
        }
        end = idx + ch.len_utf8();
    }
    let mut truncated = text[..end].to_string();
    truncated.push_str(marker);
    truncated
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = sha2::Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
