//! Speech-sequence to SSML conversion.

use crate::speech::{SpeechCommand, SpeechItem};
use crate::ssml::writer::{AttrMap, Tag, XmlWriter};
use tracing::{debug, warn};

/// Convert a screen-reader language code to an XML language code
/// ("en_US" -> "en-US").
pub fn to_xml_lang(lang: &str) -> String {
    lang.replace('_', "-")
}

/// Engine-specific conversion behavior.
///
/// Some engines handle letter-by-letter reading poorly, or need their base
/// volume driven through SSML rather than an engine property. Those
/// deviations are composed into the converter here instead of being
/// hard-coded in the command mapping.
#[derive(Debug, Clone)]
pub struct ConverterProfile {
    /// Whether `CharacterMode` commands produce `say-as` markup.
    pub character_mode: bool,
    /// When true, `prosody volume` always carries the driver's base volume
    /// scaled by the command multiplier (integer percent), including at
    /// multiplier 1.0.
    pub volume_from_base: bool,
}

impl ConverterProfile {
    /// Standard SSML mapping: character mode emits `say-as`, volume is a
    /// plain multiplier that resets at 1.0.
    pub fn standard() -> Self {
        Self {
            character_mode: true,
            volume_from_base: false,
        }
    }

    /// Profile for engines whose character mode is poor and whose base
    /// volume must be SSML-driven.
    pub fn base_volume_driven() -> Self {
        Self {
            character_mode: false,
            volume_from_base: true,
        }
    }
}

impl Default for ConverterProfile {
    fn default() -> Self {
        Self::standard()
    }
}

/// Translates one speech sequence into one SSML document.
pub struct SsmlConverter {
    writer: XmlWriter,
    default_language: String,
    profile: ConverterProfile,
    /// Driver volume in percent, used by base-volume-driven profiles.
    base_volume: u8,
}

impl SsmlConverter {
    /// Converter with the standard profile.
    pub fn new(default_language: &str) -> Self {
        Self::with_profile(default_language, ConverterProfile::standard(), 100)
    }

    /// Converter with an explicit engine profile and driver base volume.
    pub fn with_profile(default_language: &str, profile: ConverterProfile, base_volume: u8) -> Self {
        let default_language = to_xml_lang(default_language);
        let mut writer = XmlWriter::new();
        let mut attrs = AttrMap::new();
        attrs.insert("version", "1.0".to_owned());
        attrs.insert("xmlns", "http://www.w3.org/2001/10/synthesis".to_owned());
        attrs.insert("xml:lang", default_language.clone());
        writer.enclose_all(Tag::Speak, &attrs);
        let mut converter = Self {
            writer,
            default_language,
            profile,
            base_volume,
        };
        if converter.profile.volume_from_base {
            converter
                .writer
                .set_attr(Tag::Prosody, "volume", format!("{base_volume}%"));
        }
        converter
    }

    /// Convert the sequence and return the finished SSML document.
    pub fn convert(mut self, sequence: &[SpeechItem]) -> String {
        // Profile construction may have seeded the desired tag set.
        self.writer.flush_tags();
        for item in sequence {
            self.convert_item(item);
            // Reconcile after every item so the next text run is emitted
            // under the corrected tag set.
            self.writer.flush_tags();
        }
        self.writer.finish()
    }

    fn convert_item(&mut self, item: &SpeechItem) {
        match item {
            SpeechItem::Text(text) => self.writer.text(text),
            SpeechItem::Command(command) => self.convert_command(command),
        }
    }

    fn convert_command(&mut self, command: &SpeechCommand) {
        match command {
            SpeechCommand::Index(index) => {
                self.writer.raw(&format!("<mark name=\"{index}\" />"));
            }
            SpeechCommand::Break(ms) => {
                self.writer.raw(&format!("<break time=\"{ms}ms\" />"));
            }
            SpeechCommand::LangChange(lang) => {
                let lang = lang.as_deref().map_or_else(
                    || self.default_language.clone(),
                    to_xml_lang,
                );
                self.writer.set_attr(Tag::Voice, "xml:lang", lang);
            }
            SpeechCommand::CharacterMode(state) => self.convert_character_mode(*state),
            SpeechCommand::Pitch(multiplier) => self.convert_prosody("pitch", *multiplier),
            SpeechCommand::Rate(multiplier) => self.convert_prosody("rate", *multiplier),
            SpeechCommand::Volume(multiplier) => self.convert_volume(*multiplier),
            SpeechCommand::Phoneme { ipa, text } => {
                let mut attrs = AttrMap::new();
                attrs.insert("alphabet", "ipa".to_owned());
                attrs.insert("ph", ipa.clone());
                self.writer.open_tag(Tag::Phoneme, &attrs);
                self.writer.raw(text);
                self.writer.close_tag(Tag::Phoneme);
            }
            // Future command variants convert to nothing rather than
            // aborting the sequence.
            #[allow(unreachable_patterns)]
            other => {
                warn!("unsupported speech command {other:?}, skipping");
            }
        }
    }

    fn convert_character_mode(&mut self, state: bool) {
        if !self.profile.character_mode {
            debug!("character mode not supported by engine profile, ignoring");
            return;
        }
        if state {
            let mut attrs = AttrMap::new();
            attrs.insert("interpret-as", "characters".to_owned());
            self.writer.enclose_text_in_tag(Tag::SayAs, attrs);
        } else {
            self.writer.stop_enclosing_text();
        }
    }

    fn convert_prosody(&mut self, attr: &'static str, multiplier: f32) {
        if (multiplier - 1.0).abs() < f32::EPSILON {
            // Returning to the voice default.
            self.writer.del_attr(Tag::Prosody, attr);
        } else {
            let percent = (multiplier * 100.0) as u32;
            self.writer
                .set_attr(Tag::Prosody, attr, format!("{percent}%"));
        }
    }

    fn convert_volume(&mut self, multiplier: f32) {
        if self.profile.volume_from_base {
            let percent = (f32::from(self.base_volume) * multiplier) as u32;
            self.writer
                .set_attr(Tag::Prosody, "volume", format!("{percent}%"));
        } else {
            self.convert_prosody("volume", multiplier);
        }
    }
}
