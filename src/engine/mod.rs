//! Contract over the native synthesis engine.

mod native;

pub use native::{EngineHandle, EngineVtable, NativeEngine, RawSynthCallback};

use crate::error::Result;

/// Synthesis-completion callback installed into the engine.
///
/// Invoked exactly once per `speak`, possibly from another thread, with
/// the raw PCM buffer (engine-owned for the duration of the call only)
/// and the marker wire string. Returns the engine result code; must be a
/// success code even on recoverable faults so the engine's internal state
/// is not corrupted.
pub type SynthCallback = Box<dyn FnMut(&[u8], &str) -> i32 + Send>;

/// Capability set required from the native engine.
///
/// `speak` is asynchronous: it returns once the utterance is accepted,
/// and the installed callback fires on completion. All other operations
/// are synchronous engine primitives.
pub trait SpeechEngine: Send {
    /// Start the engine.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot start.
    fn initialize(&mut self) -> Result<()>;

    /// Shut the engine down. The callback holder must stay alive until
    /// this returns.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine reports a failure.
    fn terminate(&mut self) -> Result<()>;

    /// Install the synthesis-completion callback.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine rejects the callback.
    fn set_callback(&mut self, callback: SynthCallback) -> Result<()>;

    /// Submit one SSML document for synthesis (asynchronous).
    ///
    /// # Errors
    ///
    /// Returns an error if the engine rejects the submission; completion
    /// failures surface through the callback instead.
    fn speak(&mut self, ssml: &str) -> Result<()>;

    /// Set a named integer engine property.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine reports a failure.
    fn set_property(&mut self, name: &str, value: i32) -> Result<()>;

    /// The engine's voice list as an `id:name|...` wire string.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine reports a failure.
    fn voices(&mut self) -> Result<String>;

    /// Id of the currently selected voice.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine reports a failure.
    fn current_voice_id(&mut self) -> Result<String>;

    /// Language of the currently selected voice.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine reports a failure.
    fn current_voice_language(&mut self) -> Result<String>;

    /// Select a voice by its position in the engine's voice list.
    ///
    /// # Errors
    ///
    /// Returns an error if the index is out of range or the engine
    /// reports a failure.
    fn set_voice(&mut self, index: u32) -> Result<()>;
}
