//! Driver state machine binding converter, engine and playback pipeline.
//!
//! All engine primitives run on one dedicated worker thread that owns the
//! engine; the caller thread talks to it through a job channel. The
//! synthesis callback (engine thread) runs the playback pipeline and, via
//! [`UtteranceSink`], pops the pending queue or flips the driver back to
//! idle. Utterances are strict FIFO: while one is in flight, further
//! `speak` calls only append SSML to the pending queue, which the
//! completion hook drains eagerly.

use crate::config::DriverConfig;
use crate::engine::{SpeechEngine, SynthCallback};
use crate::error::{DriverError, Result};
use crate::pipeline::{LastIndex, PlaybackPipeline, UtteranceSink};
use crate::player::WavePlayer;
use crate::registry::{RegistryView, is_voice_valid};
use crate::speech::SpeechItem;
use crate::ssml::{ConverterProfile, SsmlConverter};
use crate::voices::{VoiceInfo, parse_voices};
use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{error, info, warn};

/// Engine rate property domain.
pub const MIN_RATE: i32 = -100;
pub const MAX_RATE: i32 = 100;
/// Engine pitch property domain.
pub const MIN_PITCH: i32 = -100;
pub const MAX_PITCH: i32 = 100;

const RATE_PROPERTY: &str = "MSTTS.SpeakRate";
const PITCH_PROPERTY: &str = "MSTTS.Pitch";

/// Jobs executed by the engine worker thread.
enum Job {
    Speak(String),
    SetProperty(&'static str, i32),
    SetVoice(u32, Sender<Result<()>>),
    Query(Query, Sender<Result<String>>),
    Terminate(Sender<Result<()>>),
}

enum Query {
    VoiceId,
    VoiceLanguage,
}

/// Speak/queue state guarded by the driver mutex.
struct SpeechState {
    /// True from utterance submission until its completion callback has
    /// finished processing.
    processing: bool,
    /// SSML documents awaiting submission, strict FIFO.
    pending: VecDeque<String>,
}

/// State shared between the caller thread, the worker and the engine
/// thread.
struct Shared {
    state: Mutex<SpeechState>,
    /// Observed as a plain atomic from the feed loop for prompt
    /// cancellation.
    cancelled: Arc<AtomicBool>,
    last_index: Arc<LastIndex>,
    /// Language of the current voice, refreshed by the worker after init
    /// and voice changes; used as the SSML default language.
    language: Mutex<String>,
    jobs: Sender<Job>,
}

impl UtteranceSink for Shared {
    fn on_utterance_end(&self) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        if let Some(next) = state.pending.pop_front() {
            self.cancelled.store(false, Ordering::Release);
            if self.jobs.send(Job::Speak(next)).is_err() {
                warn!("engine worker gone, dropping pending utterance");
                state.pending.clear();
                state.processing = false;
            }
        } else {
            state.processing = false;
            self.cancelled.store(false, Ordering::Release);
        }
    }
}

/// What the worker reports back once engine initialization finished.
struct InitOutcome {
    voices: Vec<VoiceInfo>,
    language: String,
}

/// The speech driver.
///
/// Construction starts the engine worker and performs the bounded-wait
/// initialization; [`Driver::terminate`] (or drop) shuts everything down
/// in the required order: wave player first, then the engine, then the
/// callback holder.
pub struct Driver {
    shared: Arc<Shared>,
    player: Arc<dyn WavePlayer>,
    registry: Arc<dyn RegistryView>,
    jobs: Sender<Job>,
    worker: Option<JoinHandle<()>>,
    voices: Vec<VoiceInfo>,
    profile: ConverterProfile,
    /// Cached engine parameters; the engine exposes no getters.
    rate_param: AtomicI32,
    pitch_param: AtomicI32,
    /// Driver volume percent; takes effect through SSML on the next
    /// `speak`.
    volume: AtomicU8,
}

impl std::fmt::Debug for Driver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Driver")
            .field("voices", &self.voices)
            .field("profile", &self.profile)
            .field("rate_param", &self.rate_param)
            .field("pitch_param", &self.pitch_param)
            .field("volume", &self.volume)
            .finish_non_exhaustive()
    }
}

impl Driver {
    /// Start the driver with the standard converter profile.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Initialization`] if the engine fails to
    /// start or does not confirm within the configured timeout.
    pub fn new(
        config: DriverConfig,
        engine: Box<dyn SpeechEngine>,
        player: Arc<dyn WavePlayer>,
        registry: Arc<dyn RegistryView>,
    ) -> Result<Self> {
        Self::with_profile(config, engine, player, registry, ConverterProfile::standard())
    }

    /// Start the driver with an explicit engine converter profile.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Initialization`] if the engine fails to
    /// start or does not confirm within the configured timeout.
    pub fn with_profile(
        config: DriverConfig,
        mut engine: Box<dyn SpeechEngine>,
        player: Arc<dyn WavePlayer>,
        registry: Arc<dyn RegistryView>,
        profile: ConverterProfile,
    ) -> Result<Self> {
        let (jobs, job_queue) = unbounded();
        let cancelled = Arc::new(AtomicBool::new(false));
        let last_index = Arc::new(LastIndex::new());
        let shared = Arc::new(Shared {
            state: Mutex::new(SpeechState {
                processing: false,
                pending: VecDeque::new(),
            }),
            cancelled: Arc::clone(&cancelled),
            last_index: Arc::clone(&last_index),
            language: Mutex::new(String::new()),
            jobs: jobs.clone(),
        });

        let pipeline = Arc::new(PlaybackPipeline::new(
            Arc::clone(&player),
            Arc::clone(&shared) as Arc<dyn UtteranceSink>,
            cancelled,
            last_index,
            &config.audio,
            config.strip_header_bytes,
        ));
        let callback: SynthCallback = Box::new(move |buffer, markers| {
            pipeline.handle_audio(buffer, markers)
        });

        let (init_tx, init_rx) = bounded(1);
        let worker = std::thread::Builder::new()
            .name("corespeak-engine".into())
            .spawn(move || {
                let outcome = initialize_engine(engine.as_mut(), callback);
                let failed = outcome.is_err();
                if init_tx.send(outcome).is_err() || failed {
                    return;
                }
                worker_loop(engine, &job_queue);
            })
            .map_err(|e| DriverError::Initialization(format!("cannot spawn worker: {e}")))?;

        let outcome = init_rx
            .recv_timeout(Duration::from_millis(config.init_timeout_ms))
            .map_err(|_| {
                DriverError::Initialization(format!(
                    "engine did not come up within {} ms",
                    config.init_timeout_ms
                ))
            })?
            .map_err(|e| DriverError::Initialization(e.to_string()))?;

        info!(
            voices = outcome.voices.len(),
            language = %outcome.language,
            "speech engine initialized"
        );
        if let Ok(mut language) = shared.language.lock() {
            language.clone_from(&outcome.language);
        }

        Ok(Self {
            shared,
            player,
            registry,
            jobs,
            worker: Some(worker),
            voices: outcome.voices,
            profile,
            rate_param: AtomicI32::new(0),
            pitch_param: AtomicI32::new(0),
            volume: AtomicU8::new(100),
        })
    }

    /// Convert a speech sequence and submit it, or queue it if an
    /// utterance is already in flight.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker is gone or the driver state is
    /// unusable.
    pub fn speak(&self, sequence: &[SpeechItem]) -> Result<()> {
        let language = self
            .shared
            .language
            .lock()
            .map_err(|_| DriverError::Channel("language state poisoned".into()))?
            .clone();
        let converter = SsmlConverter::with_profile(
            &language,
            self.profile.clone(),
            self.volume.load(Ordering::Relaxed),
        );
        let ssml = converter.convert(sequence);

        let mut state = self
            .shared
            .state
            .lock()
            .map_err(|_| DriverError::Channel("driver state poisoned".into()))?;
        if state.processing {
            state.pending.push_back(ssml);
            return Ok(());
        }
        state.processing = true;
        self.shared.cancelled.store(false, Ordering::Release);
        self.jobs
            .send(Job::Speak(ssml))
            .map_err(|_| DriverError::Channel("engine worker is gone".into()))
    }

    /// Abort the current utterance and drop all pending ones.
    ///
    /// Idempotent and non-blocking: remaining PCM of the in-flight
    /// callback is dropped, the pending queue empties, and audible output
    /// ceases once the player drains its hardware buffer. The engine
    /// callback itself may still be running when this returns.
    pub fn cancel(&self) {
        self.shared.cancelled.store(true, Ordering::Release);
        if let Ok(mut state) = self.shared.state.lock() {
            state.pending.clear();
        }
        self.player.stop();
    }

    /// Rate in `0..=100`.
    pub fn rate(&self) -> u8 {
        param_to_percent(self.rate_param.load(Ordering::Relaxed), MIN_RATE, MAX_RATE)
    }

    /// Set the rate, forwarding the mapped engine parameter.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker is gone.
    pub fn set_rate(&self, percent: u8) -> Result<()> {
        let param = percent_to_param(percent.min(100), MIN_RATE, MAX_RATE);
        self.rate_param.store(param, Ordering::Relaxed);
        self.jobs
            .send(Job::SetProperty(RATE_PROPERTY, param))
            .map_err(|_| DriverError::Channel("engine worker is gone".into()))
    }

    /// Pitch in `0..=100`.
    pub fn pitch(&self) -> u8 {
        param_to_percent(
            self.pitch_param.load(Ordering::Relaxed),
            MIN_PITCH,
            MAX_PITCH,
        )
    }

    /// Set the pitch, forwarding the mapped engine parameter.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker is gone.
    pub fn set_pitch(&self, percent: u8) -> Result<()> {
        let param = percent_to_param(percent.min(100), MIN_PITCH, MAX_PITCH);
        self.pitch_param.store(param, Ordering::Relaxed);
        self.jobs
            .send(Job::SetProperty(PITCH_PROPERTY, param))
            .map_err(|_| DriverError::Channel("engine worker is gone".into()))
    }

    /// Volume in `0..=100`.
    pub fn volume(&self) -> u8 {
        self.volume.load(Ordering::Relaxed)
    }

    /// Set the volume; applied through SSML on the next `speak`.
    pub fn set_volume(&self, percent: u8) {
        self.volume.store(percent.min(100), Ordering::Relaxed);
    }

    /// Select a voice by id.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::NoSuchVoice`] if the id is not in the
    /// engine's voice list, or an engine error from the selection itself.
    pub fn set_voice(&self, id: &str) -> Result<()> {
        let index = self
            .voices
            .iter()
            .position(|voice| voice.id == id)
            .ok_or_else(|| DriverError::NoSuchVoice(id.to_owned()))?;
        let index = u32::try_from(index)
            .map_err(|_| DriverError::NoSuchVoice(id.to_owned()))?;
        let (reply, response) = bounded(1);
        self.jobs
            .send(Job::SetVoice(index, reply))
            .map_err(|_| DriverError::Channel("engine worker is gone".into()))?;
        self.recv_reply(&response)?;
        // The new voice may speak another language; refresh the SSML
        // default.
        let language = self.query(Query::VoiceLanguage)?;
        if let Ok(mut cached) = self.shared.language.lock() {
            *cached = language;
        }
        Ok(())
    }

    /// Id of the currently selected voice.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine query fails.
    pub fn voice(&self) -> Result<String> {
        self.query(Query::VoiceId)
    }

    /// Language of the currently selected voice, straight from the
    /// engine.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine query fails.
    pub fn language(&self) -> Result<String> {
        self.query(Query::VoiceLanguage)
    }

    /// The most recently reached marker index, if any.
    pub fn last_index(&self) -> Option<u32> {
        self.shared.last_index.get()
    }

    /// Whether an utterance is currently in flight.
    pub fn is_processing(&self) -> bool {
        self.shared
            .state
            .lock()
            .map(|state| state.processing)
            .unwrap_or(false)
    }

    /// Voices whose on-disk data validates, in engine order.
    pub fn available_voices(&self) -> Vec<VoiceInfo> {
        self.voices
            .iter()
            .filter(|voice| is_voice_valid(self.registry.as_ref(), &voice.id))
            .cloned()
            .collect()
    }

    /// The full engine voice list, unfiltered.
    pub fn all_voices(&self) -> &[VoiceInfo] {
        &self.voices
    }

    /// Shut down: stop the wave player, terminate the engine on the
    /// worker, join the worker.
    ///
    /// # Errors
    ///
    /// Returns the engine's termination error, if any; shutdown proceeds
    /// regardless.
    pub fn terminate(&mut self) -> Result<()> {
        self.player.stop();
        let mut result = Ok(());
        let (reply, response) = bounded(1);
        if self.jobs.send(Job::Terminate(reply)).is_ok() {
            if let Ok(engine_result) = response.recv() {
                result = engine_result;
            }
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        result
    }

    fn query(&self, query: Query) -> Result<String> {
        let (reply, response) = bounded(1);
        self.jobs
            .send(Job::Query(query, reply))
            .map_err(|_| DriverError::Channel("engine worker is gone".into()))?;
        self.recv_reply(&response)
    }

    fn recv_reply<T>(&self, response: &Receiver<Result<T>>) -> Result<T> {
        response
            .recv()
            .map_err(|_| DriverError::Channel("engine worker dropped the reply".into()))?
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        if self.worker.is_some() {
            if let Err(e) = self.terminate() {
                error!("engine termination on drop failed: {e}");
            }
        }
    }
}

fn initialize_engine(
    engine: &mut dyn SpeechEngine,
    callback: SynthCallback,
) -> Result<InitOutcome> {
    engine.initialize()?;
    engine.set_callback(callback)?;
    let voices = parse_voices(&engine.voices()?);
    let language = engine.current_voice_language()?;
    Ok(InitOutcome { voices, language })
}

fn worker_loop(mut engine: Box<dyn SpeechEngine>, jobs: &Receiver<Job>) {
    for job in jobs.iter() {
        match job {
            Job::Speak(ssml) => {
                if let Err(e) = engine.speak(&ssml) {
                    // No callback will arrive for a rejected submission;
                    // report the utterance over so the queue keeps
                    // draining.
                    error!("engine rejected utterance: {e}");
                }
            }
            Job::SetProperty(name, value) => {
                if let Err(e) = engine.set_property(name, value) {
                    error!("setting {name} failed: {e}");
                }
            }
            Job::SetVoice(index, reply) => {
                let result = engine.set_voice(index);
                let _ = reply.send(result);
            }
            Job::Query(query, reply) => {
                let result = match query {
                    Query::VoiceId => engine.current_voice_id(),
                    Query::VoiceLanguage => engine.current_voice_language(),
                };
                let _ = reply.send(result);
            }
            Job::Terminate(reply) => {
                let _ = reply.send(engine.terminate());
                return;
            }
        }
    }
}

/// Map a `0..=100` percentage onto the engine parameter domain, rounding
/// to nearest.
fn percent_to_param(percent: u8, min: i32, max: i32) -> i32 {
    let span = f64::from(max - min);
    min + (f64::from(percent) / 100.0 * span).round() as i32
}

/// Map an engine parameter back onto `0..=100`, rounding to nearest.
fn param_to_percent(param: i32, min: i32, max: i32) -> u8 {
    let span = f64::from(max - min);
    (f64::from(param - min) / span * 100.0).round() as u8
}
