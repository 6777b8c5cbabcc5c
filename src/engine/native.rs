//! Vtable-backed adapter over a C ABI synthesis engine.
//!
//! The platform integration supplies an [`EngineVtable`] of
//! `extern "system"` entry points resolved from the native library. The
//! adapter owns the engine handle, marshals strings across the boundary
//! (UTF-16, NUL-terminated, engine-allocated results freed through the
//! vtable), and keeps the installed callback alive for the lifetime of
//! the handle.
//!
//! # Callback lifetime
//!
//! The engine retains a raw function pointer plus a user-data pointer to
//! the boxed callback holder. The holder is dropped only *after*
//! `terminate` returns; dropping it earlier would leave the engine with a
//! dangling pointer while a synthesis could still complete.

use crate::engine::{SpeechEngine, SynthCallback};
use crate::error::{DriverError, Result};
use std::ffi::c_void;
use std::ptr;

/// Opaque engine instance handle.
pub type EngineHandle = *mut c_void;

/// C-side synthesis callback signature.
///
/// `user_data` is the pointer registered alongside the callback; `data`
/// and `markers` are valid only for the duration of the call. `markers`
/// is a NUL-terminated UTF-16 string, or null for "no markers".
pub type RawSynthCallback = unsafe extern "system" fn(
    user_data: *mut c_void,
    data: *const u8,
    len: u32,
    markers: *const u16,
) -> i32;

/// Entry points of the native engine library. All string arguments are
/// NUL-terminated UTF-16; returned strings are engine-allocated and must
/// be released via `free_string`.
#[repr(C)]
pub struct EngineVtable {
    pub initialize: unsafe extern "system" fn(out_handle: *mut EngineHandle) -> i32,
    pub terminate: unsafe extern "system" fn(handle: EngineHandle) -> i32,
    pub set_callback: unsafe extern "system" fn(
        handle: EngineHandle,
        callback: RawSynthCallback,
        user_data: *mut c_void,
    ) -> i32,
    pub speak: unsafe extern "system" fn(handle: EngineHandle, ssml: *const u16) -> i32,
    pub set_property:
        unsafe extern "system" fn(handle: EngineHandle, name: *const u16, value: i32) -> i32,
    pub get_voices: unsafe extern "system" fn(handle: EngineHandle) -> *mut u16,
    pub get_current_voice_id: unsafe extern "system" fn(handle: EngineHandle) -> *mut u16,
    pub get_current_voice_language: unsafe extern "system" fn(handle: EngineHandle) -> *mut u16,
    pub set_voice: unsafe extern "system" fn(handle: EngineHandle, index: u32) -> i32,
    /// Frees any string returned by the getters.
    pub free_string: unsafe extern "system" fn(string: *mut u16),
}

/// Heap cell the engine's user-data pointer refers to.
struct CallbackHolder {
    callback: SynthCallback,
}

/// Trampoline registered with the engine; recovers the holder from the
/// user-data pointer and forwards to the installed Rust callback.
unsafe extern "system" fn synth_trampoline(
    user_data: *mut c_void,
    data: *const u8,
    len: u32,
    markers: *const u16,
) -> i32 {
    let holder = unsafe { &mut *user_data.cast::<CallbackHolder>() };
    let buffer = if data.is_null() {
        &[]
    } else {
        unsafe { std::slice::from_raw_parts(data, len as usize) }
    };
    let markers = if markers.is_null() {
        String::new()
    } else {
        unsafe { wide_to_string(markers) }
    };
    (holder.callback)(buffer, &markers)
}

/// [`SpeechEngine`] implementation over an [`EngineVtable`].
pub struct NativeEngine {
    vtable: &'static EngineVtable,
    handle: EngineHandle,
    /// Keeps the pointer the engine retains alive; dropped after
    /// `terminate`.
    callback: Option<Box<CallbackHolder>>,
}

// SAFETY: the handle is only ever used from the worker thread that owns
// the NativeEngine; the vtable itself is a table of thread-safe entry
// points.
unsafe impl Send for NativeEngine {}

impl NativeEngine {
    pub fn new(vtable: &'static EngineVtable) -> Self {
        Self {
            vtable,
            handle: ptr::null_mut(),
            callback: None,
        }
    }

    fn check(code: i32, operation: &str) -> Result<()> {
        if code == 0 {
            Ok(())
        } else {
            Err(DriverError::Engine(format!(
                "{operation} returned {code}"
            )))
        }
    }

    fn owned_string(&self, string: *mut u16, operation: &str) -> Result<String> {
        if string.is_null() {
            return Err(DriverError::Engine(format!(
                "{operation} returned a null string"
            )));
        }
        let value = unsafe { wide_to_string(string) };
        unsafe { (self.vtable.free_string)(string) };
        Ok(value)
    }
}

impl SpeechEngine for NativeEngine {
    fn initialize(&mut self) -> Result<()> {
        let mut handle: EngineHandle = ptr::null_mut();
        Self::check(
            unsafe { (self.vtable.initialize)(&mut handle) },
            "initialize",
        )
        .map_err(|e| DriverError::Initialization(e.to_string()))?;
        self.handle = handle;
        Ok(())
    }

    fn terminate(&mut self) -> Result<()> {
        if self.handle.is_null() {
            return Ok(());
        }
        let result = Self::check(unsafe { (self.vtable.terminate)(self.handle) }, "terminate");
        self.handle = ptr::null_mut();
        // Only now is it safe to drop the holder the engine was pointing
        // at.
        self.callback = None;
        result
    }

    fn set_callback(&mut self, callback: SynthCallback) -> Result<()> {
        let mut holder = Box::new(CallbackHolder { callback });
        let user_data = ptr::from_mut::<CallbackHolder>(&mut *holder).cast::<c_void>();
        Self::check(
            unsafe { (self.vtable.set_callback)(self.handle, synth_trampoline, user_data) },
            "set_callback",
        )?;
        self.callback = Some(holder);
        Ok(())
    }

    fn speak(&mut self, ssml: &str) -> Result<()> {
        let wide = string_to_wide(ssml);
        Self::check(
            unsafe { (self.vtable.speak)(self.handle, wide.as_ptr()) },
            "speak",
        )
    }

    fn set_property(&mut self, name: &str, value: i32) -> Result<()> {
        let wide = string_to_wide(name);
        Self::check(
            unsafe { (self.vtable.set_property)(self.handle, wide.as_ptr(), value) },
            "set_property",
        )
    }

    fn voices(&mut self) -> Result<String> {
        let string = unsafe { (self.vtable.get_voices)(self.handle) };
        self.owned_string(string, "get_voices")
    }

    fn current_voice_id(&mut self) -> Result<String> {
        let string = unsafe { (self.vtable.get_current_voice_id)(self.handle) };
        self.owned_string(string, "get_current_voice_id")
    }

    fn current_voice_language(&mut self) -> Result<String> {
        let string = unsafe { (self.vtable.get_current_voice_language)(self.handle) };
        self.owned_string(string, "get_current_voice_language")
    }

    fn set_voice(&mut self, index: u32) -> Result<()> {
        Self::check(
            unsafe { (self.vtable.set_voice)(self.handle, index) },
            "set_voice",
        )
    }
}

impl Drop for NativeEngine {
    fn drop(&mut self) {
        if !self.handle.is_null() {
            let _ = self.terminate();
        }
    }
}

/// Encode a Rust string as NUL-terminated UTF-16.
fn string_to_wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

/// Decode a NUL-terminated UTF-16 string.
///
/// # Safety
///
/// `ptr` must point at a valid NUL-terminated UTF-16 buffer.
unsafe fn wide_to_string(ptr: *const u16) -> String {
    let mut len = 0usize;
    while unsafe { *ptr.add(len) } != 0 {
        len += 1;
    }
    let units = unsafe { std::slice::from_raw_parts(ptr, len) };
    String::from_utf16_lossy(units)
}
