//! Speech-sequence to SSML conversion.
//!
//! [`XmlWriter`] is the low-level balanced-tag emitter; [`SsmlConverter`]
//! maps each speech command onto tag and attribute mutations.

mod converter;
mod writer;

pub use converter::{ConverterProfile, SsmlConverter, to_xml_lang};
pub use writer::{AttrMap, Tag, XmlWriter};
