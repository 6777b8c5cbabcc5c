//! Driver state-machine tests with a scripted engine and wave player.

use corespeak::{
    Driver, DriverConfig, DriverError, RegistryView, Result, SpeechCommand, SpeechEngine,
    SpeechItem, SynthCallback, WavePlayer,
};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

const VOICES: &str = "tokens\\EvaM:Eva Mobile|tokens\\MarkM:Mark Mobile";
const VOICE_IDS: [&str; 2] = ["tokens\\EvaM", "tokens\\MarkM"];
const VOICE_LANGS: [&str; 2] = ["en-US", "fr-FR"];

/// Scripted engine. With `auto_complete` set, every `speak` immediately
/// fires the synthesis callback with the scripted buffer and markers;
/// otherwise the test drives completion through [`EngineScript::complete`].
struct EngineScript {
    callback: Mutex<Option<SynthCallback>>,
    spoken: Mutex<Vec<String>>,
    properties: Mutex<Vec<(String, i32)>>,
    voice_index: AtomicU32,
    auto_complete: Option<(Vec<u8>, String)>,
    init_delay: Duration,
    fail_init: bool,
}

impl EngineScript {
    fn new(auto_complete: Option<(Vec<u8>, String)>) -> Arc<Self> {
        Self::with_init(auto_complete, Duration::ZERO, false)
    }

    fn with_init(
        auto_complete: Option<(Vec<u8>, String)>,
        init_delay: Duration,
        fail_init: bool,
    ) -> Arc<Self> {
        Arc::new(Self {
            callback: Mutex::new(None),
            spoken: Mutex::new(Vec::new()),
            properties: Mutex::new(Vec::new()),
            voice_index: AtomicU32::new(0),
            auto_complete,
            init_delay,
            fail_init,
        })
    }

    fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }

    /// Fire the synthesis callback for the oldest incomplete utterance.
    fn complete(&self, buffer: &[u8], markers: &str) {
        let mut guard = self.callback.lock().unwrap();
        let callback = guard.as_mut().expect("callback installed");
        assert_eq!(callback(buffer, markers), 0);
    }
}

struct ScriptedEngine(Arc<EngineScript>);

impl SpeechEngine for ScriptedEngine {
    fn initialize(&mut self) -> Result<()> {
        if !self.0.init_delay.is_zero() {
            thread::sleep(self.0.init_delay);
        }
        if self.0.fail_init {
            return Err(DriverError::Engine("engine refused to start".into()));
        }
        Ok(())
    }

    fn terminate(&mut self) -> Result<()> {
        Ok(())
    }

    fn set_callback(&mut self, callback: SynthCallback) -> Result<()> {
        *self.0.callback.lock().unwrap() = Some(callback);
        Ok(())
    }

    fn speak(&mut self, ssml: &str) -> Result<()> {
        self.0.spoken.lock().unwrap().push(ssml.to_owned());
        if let Some((buffer, markers)) = self.0.auto_complete.clone() {
            self.0.complete(&buffer, &markers);
        }
        Ok(())
    }

    fn set_property(&mut self, name: &str, value: i32) -> Result<()> {
        self.0
            .properties
            .lock()
            .unwrap()
            .push((name.to_owned(), value));
        Ok(())
    }

    fn voices(&mut self) -> Result<String> {
        Ok(VOICES.to_owned())
    }

    fn current_voice_id(&mut self) -> Result<String> {
        Ok(VOICE_IDS[self.0.voice_index.load(Ordering::SeqCst) as usize].to_owned())
    }

    fn current_voice_language(&mut self) -> Result<String> {
        Ok(VOICE_LANGS[self.0.voice_index.load(Ordering::SeqCst) as usize].to_owned())
    }

    fn set_voice(&mut self, index: u32) -> Result<()> {
        self.0.voice_index.store(index, Ordering::SeqCst);
        Ok(())
    }
}

/// Non-blocking player that records chunk sizes and stop calls.
struct RecordingPlayer {
    feeds: Mutex<Vec<usize>>,
    stops: AtomicUsize,
}

impl RecordingPlayer {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            feeds: Mutex::new(Vec::new()),
            stops: AtomicUsize::new(0),
        })
    }
}

impl WavePlayer for RecordingPlayer {
    fn feed(&self, data: &[u8]) -> Result<()> {
        self.feeds.lock().unwrap().push(data.len());
        Ok(())
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

/// Registry with no entries; every voice validates as absent.
struct EmptyRegistry;

impl RegistryView for EmptyRegistry {
    fn string_value(&self, key_path: &str, _value_name: &str) -> Result<String> {
        Err(DriverError::Registry(format!("{key_path} not found")))
    }
}

struct Fixture {
    driver: Driver,
    engine: Arc<EngineScript>,
    player: Arc<RecordingPlayer>,
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn fixture(auto_complete: Option<(Vec<u8>, String)>) -> Fixture {
    init_tracing();
    let engine = EngineScript::new(auto_complete);
    let player = RecordingPlayer::new();
    let driver = Driver::new(
        DriverConfig::default(),
        Box::new(ScriptedEngine(Arc::clone(&engine))),
        Arc::clone(&player) as Arc<dyn WavePlayer>,
        Arc::new(EmptyRegistry),
    )
    .expect("driver starts");
    Fixture {
        driver,
        engine,
        player,
    }
}

fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(2));
    }
}

fn buffer_with_markers(payload: usize) -> Vec<u8> {
    vec![0u8; 44 + payload]
}

fn text(s: &str) -> SpeechItem {
    SpeechItem::Text(s.to_owned())
}

#[test]
fn speak_submits_one_converted_document() {
    let f = fixture(Some((buffer_with_markers(0), String::new())));
    f.driver.speak(&[text("Hello world")]).unwrap();
    wait_until("idle", || !f.driver.is_processing());

    let spoken = f.engine.spoken();
    assert_eq!(spoken.len(), 1);
    assert!(spoken[0].starts_with("<speak"));
    assert!(spoken[0].contains("xml:lang=\"en-US\""));
    assert!(spoken[0].contains("Hello world"));
}

#[test]
fn overflow_utterances_queue_fifo() {
    let f = fixture(None);
    f.driver.speak(&[text("one")]).unwrap();
    wait_until("first submission", || f.engine.spoken().len() == 1);

    f.driver.speak(&[text("two")]).unwrap();
    f.driver.speak(&[text("three")]).unwrap();
    // Still in flight: nothing further reaches the engine.
    assert_eq!(f.engine.spoken().len(), 1);
    assert!(f.driver.is_processing());

    f.engine.complete(&buffer_with_markers(0), "");
    wait_until("second submission", || f.engine.spoken().len() == 2);
    f.engine.complete(&buffer_with_markers(0), "");
    wait_until("third submission", || f.engine.spoken().len() == 3);
    f.engine.complete(&buffer_with_markers(0), "");
    wait_until("idle", || !f.driver.is_processing());

    let spoken = f.engine.spoken();
    assert!(spoken[0].contains("one"));
    assert!(spoken[1].contains("two"));
    assert!(spoken[2].contains("three"));
}

#[test]
fn markers_surface_as_last_index() {
    // 1s of PCM, markers at 0.25s and 0.5s.
    let f = fixture(Some((
        buffer_with_markers(44_100),
        "3:2500000|9:5000000".to_owned(),
    )));
    assert_eq!(f.driver.last_index(), None);

    f.driver
        .speak(&[
            SpeechCommand::Index(3).into(),
            text("hi"),
            SpeechCommand::Index(9).into(),
        ])
        .unwrap();
    wait_until("idle", || !f.driver.is_processing());

    assert_eq!(f.driver.last_index(), Some(9));
    let feeds = f.player.feeds.lock().unwrap().clone();
    assert_eq!(feeds, vec![11_025, 11_025, 22_050]);
}

#[test]
fn cancel_drops_pending_and_suppresses_indices() {
    let f = fixture(None);
    f.driver.speak(&[SpeechCommand::Index(1).into(), text("one")]).unwrap();
    wait_until("first submission", || f.engine.spoken().len() == 1);
    f.driver.speak(&[text("two")]).unwrap();
    f.driver.speak(&[text("three")]).unwrap();

    f.driver.cancel();
    assert!(f.player.stops.load(Ordering::SeqCst) >= 1);

    // The in-flight callback arrives after the cancel: its PCM must be
    // dropped and no index reported.
    f.engine.complete(&buffer_with_markers(44_100), "1:2500000");
    wait_until("idle", || !f.driver.is_processing());

    assert_eq!(f.engine.spoken().len(), 1, "pending utterances were dropped");
    assert_eq!(f.driver.last_index(), None);
    assert!(f.player.feeds.lock().unwrap().is_empty());

    // The next speak proceeds normally.
    f.driver
        .speak(&[SpeechCommand::Index(7).into(), text("later")])
        .unwrap();
    wait_until("post-cancel submission", || f.engine.spoken().len() == 2);
    f.engine.complete(&buffer_with_markers(1_000), "7:100000");
    wait_until("idle again", || !f.driver.is_processing());
    assert_eq!(f.driver.last_index(), Some(7));
    assert!(!f.player.feeds.lock().unwrap().is_empty());
}

#[test]
fn cancel_is_idempotent() {
    let f = fixture(None);
    f.driver.cancel();
    f.driver.cancel();
    assert!(!f.driver.is_processing());

    f.driver.speak(&[text("after")]).unwrap();
    wait_until("submission", || f.engine.spoken().len() == 1);
    f.engine.complete(&buffer_with_markers(0), "");
    wait_until("idle", || !f.driver.is_processing());
}

#[test]
fn rate_and_pitch_round_trip_within_one_unit() {
    let f = fixture(None);
    for percent in [0u8, 1, 25, 40, 50, 75, 99, 100] {
        f.driver.set_rate(percent).unwrap();
        let got = f.driver.rate();
        assert!(
            i16::from(got).abs_diff(i16::from(percent)) <= 1,
            "rate {percent} came back as {got}"
        );

        f.driver.set_pitch(percent).unwrap();
        let got = f.driver.pitch();
        assert!(i16::from(got).abs_diff(i16::from(percent)) <= 1);
    }

    wait_until("properties forwarded", || {
        f.engine.properties.lock().unwrap().len() == 16
    });
    let properties = f.engine.properties.lock().unwrap().clone();
    assert!(properties.contains(&("MSTTS.SpeakRate".to_owned(), -100)));
    assert!(properties.contains(&("MSTTS.Pitch".to_owned(), 100)));
    assert!(properties.contains(&("MSTTS.SpeakRate".to_owned(), -20)));
}

#[test]
fn volume_is_driver_side_state() {
    let f = fixture(None);
    f.driver.set_volume(30);
    assert_eq!(f.driver.volume(), 30);
    f.driver.set_volume(200);
    assert_eq!(f.driver.volume(), 100, "volume saturates at 100");
}

#[test]
fn set_voice_by_id_updates_language() {
    let f = fixture(None);
    assert_eq!(f.driver.voice().unwrap(), "tokens\\EvaM");
    assert_eq!(f.driver.language().unwrap(), "en-US");

    f.driver.set_voice("tokens\\MarkM").unwrap();
    assert_eq!(f.driver.voice().unwrap(), "tokens\\MarkM");
    assert_eq!(f.driver.language().unwrap(), "fr-FR");

    // The refreshed language becomes the SSML default.
    f.driver.speak(&[text("bonjour")]).unwrap();
    wait_until("submission", || f.engine.spoken().len() == 1);
    assert!(f.engine.spoken()[0].contains("xml:lang=\"fr-FR\""));
}

#[test]
fn unknown_voice_id_is_rejected() {
    let f = fixture(None);
    let err = f.driver.set_voice("tokens\\Nobody").unwrap_err();
    assert!(matches!(err, DriverError::NoSuchVoice(_)), "got {err}");
}

#[test]
fn available_voices_filters_missing_data() {
    struct FileBackedRegistry {
        entries: Vec<(String, String, String)>,
    }

    impl RegistryView for FileBackedRegistry {
        fn string_value(&self, key_path: &str, value_name: &str) -> Result<String> {
            self.entries
                .iter()
                .find(|(key, name, _)| key == key_path && name == value_name)
                .map(|(_, _, value)| value.clone())
                .ok_or_else(|| DriverError::Registry(format!("{key_path} not found")))
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let lang = dir.path().join("en-US.dat");
    let eva = dir.path().join("eva");
    std::fs::write(&lang, b"x").unwrap();
    std::fs::write(dir.path().join("eva.apm"), b"x").unwrap();
    // Mark has registry entries but no voice data on disk.
    let registry = FileBackedRegistry {
        entries: vec![
            (
                "tokens\\EvaM".into(),
                "langDataPath".into(),
                lang.to_str().unwrap().into(),
            ),
            (
                "tokens\\EvaM".into(),
                "voicePath".into(),
                eva.to_str().unwrap().into(),
            ),
            (
                "tokens\\MarkM".into(),
                "langDataPath".into(),
                lang.to_str().unwrap().into(),
            ),
            (
                "tokens\\MarkM".into(),
                "voicePath".into(),
                dir.path().join("mark").to_str().unwrap().into(),
            ),
        ],
    };

    let engine = EngineScript::new(None);
    let driver = Driver::new(
        DriverConfig::default(),
        Box::new(ScriptedEngine(Arc::clone(&engine))),
        RecordingPlayer::new() as Arc<dyn WavePlayer>,
        Arc::new(registry),
    )
    .unwrap();

    assert_eq!(driver.all_voices().len(), 2);
    let available = driver.available_voices();
    assert_eq!(available.len(), 1);
    assert_eq!(available[0].id, "tokens\\EvaM");
    assert_eq!(available[0].name, "Eva Mobile");

    // Invalid voices stay settable by id.
    driver.set_voice("tokens\\MarkM").unwrap();
}

#[test]
fn slow_engine_initialization_times_out() {
    let slow = EngineScript::with_init(None, Duration::from_millis(300), false);
    let config = DriverConfig {
        init_timeout_ms: 20,
        ..DriverConfig::default()
    };
    let err = Driver::new(
        config,
        Box::new(ScriptedEngine(slow)),
        RecordingPlayer::new() as Arc<dyn WavePlayer>,
        Arc::new(EmptyRegistry),
    )
    .unwrap_err();
    assert!(matches!(err, DriverError::Initialization(_)), "got {err}");
}

#[test]
fn failing_engine_initialization_propagates() {
    let failing = EngineScript::with_init(None, Duration::ZERO, true);
    let err = Driver::new(
        DriverConfig::default(),
        Box::new(ScriptedEngine(failing)),
        RecordingPlayer::new() as Arc<dyn WavePlayer>,
        Arc::new(EmptyRegistry),
    )
    .unwrap_err();
    assert!(matches!(err, DriverError::Initialization(_)), "got {err}");
}
