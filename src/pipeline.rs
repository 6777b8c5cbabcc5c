//! Marker-synchronized routing of synthesized PCM to the wave player.
//!
//! The engine invokes the synthesis callback once per utterance, on its
//! own thread, with a raw PCM buffer and a marker string. The pipeline
//! strips the synthesizer preamble, slices the payload at the marker byte
//! offsets, and feeds the slices to the blocking wave player. Because
//! `feed` returns when the *previously* queued chunk has drained, the
//! marker preceding the chunk that is currently draining is exactly what
//! the listener has just heard; `last_index` is therefore published one
//! feed late by design.

use crate::config::AudioFormat;
use crate::error::Result;
use crate::markers::{HUNDRED_NS_PER_SEC, parse_markers};
use crate::player::WavePlayer;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use tracing::{debug, error};

/// Cross-thread cell for the most recently reached marker.
///
/// Written by the engine thread, read by the caller; −1 encodes "no
/// marker reached yet".
#[derive(Debug)]
pub struct LastIndex(AtomicI64);

impl LastIndex {
    pub fn new() -> Self {
        Self(AtomicI64::new(-1))
    }

    pub fn get(&self) -> Option<u32> {
        u32::try_from(self.0.load(Ordering::Acquire)).ok()
    }

    pub fn set(&self, index: u32) {
        self.0.store(i64::from(index), Ordering::Release);
    }
}

impl Default for LastIndex {
    fn default() -> Self {
        Self::new()
    }
}

/// Receives the utterance-complete notification from the pipeline.
pub trait UtteranceSink: Send + Sync {
    /// Called exactly once per callback, after feeding ends (cancelled or
    /// not). This is where the driver pops its pending queue or goes idle.
    fn on_utterance_end(&self);
}

/// Routes one utterance's PCM from the engine callback to the wave player.
pub struct PlaybackPipeline {
    player: Arc<dyn WavePlayer>,
    sink: Arc<dyn UtteranceSink>,
    cancelled: Arc<AtomicBool>,
    last_index: Arc<LastIndex>,
    bytes_per_second: u64,
    header_len: usize,
}

impl PlaybackPipeline {
    pub fn new(
        player: Arc<dyn WavePlayer>,
        sink: Arc<dyn UtteranceSink>,
        cancelled: Arc<AtomicBool>,
        last_index: Arc<LastIndex>,
        format: &AudioFormat,
        header_len: usize,
    ) -> Self {
        Self {
            player,
            sink,
            cancelled,
            last_index,
            bytes_per_second: format.bytes_per_second(),
            header_len,
        }
    }

    /// Engine-thread entry point; returns the callback result code.
    ///
    /// Always reports success back to the engine: recoverable faults are
    /// handled in place and fatal ones are logged, so the engine's
    /// internal state is never left mid-utterance.
    pub fn handle_audio(&self, buffer: &[u8], markers_raw: &str) -> i32 {
        if let Err(e) = self.route(buffer, markers_raw) {
            error!("failed to route synthesized audio: {e}");
        }
        self.sink.on_utterance_end();
        0
    }

    fn route(&self, buffer: &[u8], markers_raw: &str) -> Result<()> {
        // The first `header_len` bytes are synthesizer preamble; buffers
        // no longer than the preamble carry an empty payload. The engine
        // owns `buffer` only for the duration of the callback, so the
        // payload is copied out before any blocking call.
        let data = buffer.get(self.header_len..).unwrap_or(&[]).to_vec();

        let markers = match parse_markers(markers_raw) {
            Ok(markers) => markers,
            Err(e) => {
                // Feed the rest of the buffer as one chunk.
                error!("invalid marker string from engine: {e}");
                Vec::new()
            }
        };
        debug!(
            payload_bytes = data.len(),
            markers = markers.len(),
            "routing utterance audio"
        );

        let mut prev_pos = 0usize;
        let mut prev_marker: Option<u32> = None;
        for marker in markers {
            if self.cancelled.load(Ordering::Acquire) {
                return Ok(());
            }
            let pos = self.byte_offset(marker.position, data.len()).max(prev_pos);
            self.player.feed(&data[prev_pos..pos])?;
            // `feed` has returned, so the chunk *before* this one has
            // drained; its trailing marker is now audible.
            if let Some(name) = prev_marker {
                self.last_index.set(name);
            }
            prev_marker = Some(marker.name);
            prev_pos = pos;
        }
        if self.cancelled.load(Ordering::Acquire) {
            return Ok(());
        }
        self.player.feed(&data[prev_pos..])?;
        if let Some(name) = prev_marker {
            self.last_index.set(name);
        }
        Ok(())
    }

    /// Convert a 100-ns marker position to a byte offset, clamped to the
    /// payload length. 64-bit arithmetic keeps the product in range.
    fn byte_offset(&self, position: u64, payload_len: usize) -> usize {
        let bytes = position * self.bytes_per_second / HUNDRED_NS_PER_SEC;
        usize::try_from(bytes)
            .unwrap_or(payload_len)
            .min(payload_len)
    }
}
