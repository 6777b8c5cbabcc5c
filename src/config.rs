//! Configuration types for the driver.

use crate::error::{DriverError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level driver configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// PCM format produced by the engine callback.
    pub audio: AudioFormat,
    /// Output device name handed to the wave player (None = system default).
    pub output_device: Option<String>,
    /// Milliseconds to wait for engine initialization before giving up.
    pub init_timeout_ms: u64,
    /// Bytes of synthesizer preamble stripped from every callback buffer.
    pub strip_header_bytes: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            audio: AudioFormat::default(),
            output_device: None,
            init_timeout_ms: 4_000,
            strip_header_bytes: 44,
        }
    }
}

impl DriverConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| DriverError::Initialization(e.to_string()))
    }

    /// Save configuration to a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| DriverError::Initialization(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// PCM format of the audio produced by the engine callback.
///
/// The engine emits raw little-endian PCM at a fixed rate; these values
/// are also what the wave player is opened with.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioFormat {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Bits per sample (16 = i16 little-endian).
    pub bits_per_sample: u16,
    /// Number of channels (1 = mono).
    pub channels: u16,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            sample_rate: 22_050,
            bits_per_sample: 16,
            channels: 1,
        }
    }
}

impl AudioFormat {
    /// Bytes consumed per second of playback.
    pub fn bytes_per_second(&self) -> u64 {
        u64::from(self.sample_rate) * u64::from(self.bytes_per_frame())
    }

    /// Bytes per frame (one sample across all channels).
    pub fn bytes_per_frame(&self) -> u32 {
        u32::from(self.bits_per_sample / 8) * u32::from(self.channels)
    }
}
