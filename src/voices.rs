//! Voice list handling.
//!
//! The engine reports its voices as a single `id1:name1|id2:name2|...`
//! wire string; the parsed order is significant because `set_voice`
//! addresses the engine by position in this list.

use tracing::warn;

/// One voice exposed by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceInfo {
    /// Opaque voice id (a registry key path on the reference platform).
    pub id: String,
    /// Human-readable display name; may contain spaces.
    pub name: String,
}

/// Parse the engine's voices wire string, preserving order.
///
/// Entries without an `id:name` separator are skipped with a warning; an
/// empty string parses to an empty list.
pub fn parse_voices(raw: &str) -> Vec<VoiceInfo> {
    if raw.is_empty() {
        return Vec::new();
    }
    raw.split('|')
        .filter_map(|entry| match entry.split_once(':') {
            Some((id, name)) => Some(VoiceInfo {
                id: id.to_owned(),
                name: name.to_owned(),
            }),
            None => {
                warn!("malformed voice entry {entry:?}, skipping");
                None
            }
        })
        .collect()
}
