//! Parsing of the engine's marker wire format.
//!
//! Each synthesis callback carries a marker string of the form
//! `name1:pos1|name2:pos2|...` (empty when the utterance has no markers).
//! Names are the integer index labels from the speech sequence; positions
//! are offsets from utterance start in 100-nanosecond units.

/// 100-ns units per second in the engine's marker positions.
pub const HUNDRED_NS_PER_SEC: u64 = 10_000_000;

/// One marker inside an utterance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Marker {
    /// Index label from the speech sequence.
    pub name: u32,
    /// Offset from utterance start, in 100-ns units.
    pub position: u64,
}

/// A marker entry that did not match `name:pos`.
#[derive(Debug, thiserror::Error)]
#[error("malformed marker entry {entry:?}")]
pub struct InvalidMarker {
    /// The offending entry text.
    pub entry: String,
}

/// Parse a marker wire string. An empty string parses to no markers.
///
/// # Errors
///
/// Returns [`InvalidMarker`] on the first entry that is not
/// `<u32>:<u64>`.
pub fn parse_markers(raw: &str) -> Result<Vec<Marker>, InvalidMarker> {
    if raw.is_empty() {
        return Ok(Vec::new());
    }
    raw.split('|')
        .map(|entry| {
            let malformed = || InvalidMarker {
                entry: entry.to_owned(),
            };
            let (name, position) = entry.split_once(':').ok_or_else(malformed)?;
            Ok(Marker {
                name: name.parse().map_err(|_| malformed())?,
                position: position.parse().map_err(|_| malformed())?,
            })
        })
        .collect()
}
