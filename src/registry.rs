//! Voice validation against the system registry.
//!
//! A voice id doubles as a registry key path. A voice is considered
//! installed when the key's `langDataPath` value and its `voicePath`
//! value (with an `.apm` suffix appended) both point at files that exist
//! after environment-variable expansion. Voices failing validation are
//! hidden from the presented list but remain settable by id.
//!
//! Registry access is strictly a platform peripheral, so it sits behind
//! [`RegistryView`] and tests substitute an in-memory mock.

use crate::error::Result;
use std::path::Path;
use tracing::debug;

/// Read-only view of the system registry.
pub trait RegistryView: Send + Sync {
    /// Read a string value from the given key path.
    ///
    /// # Errors
    ///
    /// Returns an error if the key or value cannot be resolved.
    fn string_value(&self, key_path: &str, value_name: &str) -> Result<String>;
}

/// Expand `%VAR%` references from the process environment. Unknown
/// variables and unpaired percent signs are left as-is.
pub fn expand_env_vars(input: &str) -> String {
    let mut expanded = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find('%') {
        expanded.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find('%') {
            Some(end) => {
                let var = &after[..end];
                match std::env::var(var) {
                    Ok(value) => expanded.push_str(&value),
                    Err(_) => {
                        expanded.push('%');
                        expanded.push_str(var);
                        expanded.push('%');
                    }
                }
                rest = &after[end + 1..];
            }
            None => {
                expanded.push('%');
                rest = after;
            }
        }
    }
    expanded.push_str(rest);
    expanded
}

/// Whether a voice's on-disk data is present.
///
/// Resolution failures are logged at debug level and count as invalid;
/// they never propagate.
pub fn is_voice_valid(registry: &dyn RegistryView, voice_id: &str) -> bool {
    match validate(registry, voice_id) {
        Ok(valid) => valid,
        Err(e) => {
            debug!(voice = voice_id, "voice validation failed: {e}");
            false
        }
    }
}

fn validate(registry: &dyn RegistryView, voice_id: &str) -> Result<bool> {
    let lang_data = expand_env_vars(&registry.string_value(voice_id, "langDataPath")?);
    if !Path::new(&lang_data).is_file() {
        return Ok(false);
    }
    let voice_path = expand_env_vars(&registry.string_value(voice_id, "voicePath")?);
    let apm = format!("{voice_path}.apm");
    Ok(Path::new(&apm).is_file())
}
