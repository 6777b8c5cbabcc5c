//! Speech sequence data model.
//!
//! A speech sequence is a finite, ordered list of text runs interleaved
//! with state-changing commands, produced by the screen reader. The
//! sequence is linear; turning it into hierarchical SSML is the job of
//! [`crate::ssml::SsmlConverter`].

/// One item of a speech sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum SpeechItem {
    /// A run of text to be spoken.
    Text(String),
    /// A state-changing command.
    Command(SpeechCommand),
}

impl From<&str> for SpeechItem {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<SpeechCommand> for SpeechItem {
    fn from(command: SpeechCommand) -> Self {
        Self::Command(command)
    }
}

/// Commands interleaved with text runs in a speech sequence.
///
/// The screen reader's command vocabulary grows over time; converters
/// skip variants they do not recognize rather than aborting the sequence.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum SpeechCommand {
    /// Insert a named marker whose "reached" moment is reported during
    /// playback as the driver's `last_index`.
    Index(u32),
    /// Speak subsequent text letter by letter until turned off.
    CharacterMode(bool),
    /// Language for subsequent text; `None` resets to the driver default.
    LangChange(Option<String>),
    /// Insert a pause of the given duration in milliseconds.
    Break(u32),
    /// Pitch multiplier; `1.0` resets to the voice default.
    Pitch(f32),
    /// Rate multiplier; `1.0` resets to the voice default.
    Rate(f32),
    /// Volume multiplier; `1.0` resets to the voice default.
    Volume(f32),
    /// Speak with an explicit IPA pronunciation, falling back to `text`
    /// for engines that cannot realize the phonemes.
    Phoneme {
        /// IPA pronunciation string.
        ipa: String,
        /// Text spoken if the engine cannot realize the phonemes.
        text: String,
    },
}
