//! Contract consumed from the host's wave playback service.

use crate::error::Result;

/// Blocking wave player.
///
/// The host constructs the player for the driver's PCM format (channels,
/// sample rate, bits per sample, output device); the driver only feeds it.
///
/// The blocking discipline of `feed` is what synchronizes index reporting
/// with audible output: `feed` appends the chunk to the playback queue and
/// blocks until the *previously* fed chunk has finished draining, a
/// one-chunk lookahead. `stop` discards queued audio and promptly unblocks
/// any in-flight `feed`.
pub trait WavePlayer: Send + Sync {
    /// Queue a chunk of raw PCM, blocking until the previous chunk has
    /// drained.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying device fails.
    fn feed(&self, data: &[u8]) -> Result<()>;

    /// Discard queued audio and unblock any pending `feed`.
    fn stop(&self);
}
