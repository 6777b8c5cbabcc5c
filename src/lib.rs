//! corespeak: screen-reader speech driver core for native TTS engines.
//!
//! Bridges a screen reader's abstract speech stream to a platform
//! text-to-speech engine:
//!
//! - **Conversion**: a linear speech sequence (text runs interleaved with
//!   pitch/rate/volume/language/index commands) becomes one balanced SSML
//!   document, via [`ssml::SsmlConverter`] on top of the retroactive-tag
//!   [`ssml::XmlWriter`].
//! - **Synthesis**: one SSML document at a time is handed to the native
//!   engine behind [`engine::SpeechEngine`]; the engine answers with raw
//!   PCM plus time-offset markers on a background callback.
//! - **Playback**: [`pipeline::PlaybackPipeline`] strips the synthesizer
//!   preamble, feeds PCM to a blocking [`player::WavePlayer`], and
//!   publishes marker-synchronized `last_index` updates.
//! - **Coordination**: [`driver::Driver`] serializes engine calls on a
//!   dedicated worker thread, queues overflow utterances FIFO, and owns
//!   cancellation and the rate/pitch/volume/voice settings.

pub mod config;
pub mod driver;
pub mod engine;
pub mod error;
pub mod markers;
pub mod pipeline;
pub mod player;
pub mod registry;
pub mod speech;
pub mod ssml;
pub mod voices;

pub use config::{AudioFormat, DriverConfig};
pub use driver::Driver;
pub use engine::{SpeechEngine, SynthCallback};
pub use error::{DriverError, Result};
pub use player::WavePlayer;
pub use registry::RegistryView;
pub use speech::{SpeechCommand, SpeechItem};
pub use ssml::{ConverterProfile, SsmlConverter};
pub use voices::VoiceInfo;
