//! FFI bindings for RepSense
//!
//! This module provides C-compatible functions for embedding the coaching
//! engine in a mobile host. All functions use C strings (null-terminated) and
//! return allocated memory that must be freed by the caller using
//! `repsense_free_string`.
//!
//! Sessions created here speak through a silent capability: the host reads
//! the latest cue text from the snapshot and plays it itself, then reports
//! completion with `repsense_session_utterance_complete`. Stored rows are
//! kept in memory until the host drains them.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;
use std::sync::Arc;

use crate::config::{CoachConfig, PerformanceMode};
use crate::error::CoachError;
use crate::landmarks::PoseFrame;
use crate::pipeline::analyze_frames;
use crate::session::{CoachSession, FrameOutcome};
use crate::storage::InMemoryStore;
use crate::voice::SilentSpeech;

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

/// Helper to convert C string to Rust string
unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

/// Helper to convert Rust string to C string (caller must free)
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

/// Hand a JSON result back across the boundary, recording any error
fn json_result(result: Result<String, CoachError>) -> *mut c_char {
    match result {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Map a unit result to 0 / -1, recording any error
fn status(result: Result<(), CoachError>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

// ============================================================================
// Stateless API
// ============================================================================

/// Run NDJSON frames through a fresh pipeline and return a JSON array of
/// per-frame outputs.
///
/// # Safety
/// - `template_key` and `frames_ndjson` must be valid null-terminated C strings.
/// - Returns a newly allocated string that must be freed with `repsense_free_string`.
/// - Returns NULL on error; call `repsense_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn repsense_analyze(
    template_key: *const c_char,
    frames_ndjson: *const c_char,
) -> *mut c_char {
    clear_last_error();

    let Some(key) = cstr_to_string(template_key) else {
        set_last_error("Invalid template key pointer");
        return ptr::null_mut();
    };
    let Some(input) = cstr_to_string(frames_ndjson) else {
        set_last_error("Invalid frames string pointer");
        return ptr::null_mut();
    };

    json_result((|| -> Result<String, CoachError> {
        let frames = PoseFrame::parse_ndjson(&input)?;
        let outputs = analyze_frames(&key, &frames, &CoachConfig::default())?;
        Ok(serde_json::to_string(&outputs)?)
    })())
}

// ============================================================================
// Session API
// ============================================================================

/// Opaque handle to a coaching session
pub struct RepSenseSessionHandle {
    session: CoachSession,
    store: Arc<InMemoryStore>,
}

/// Start a coaching session.
///
/// # Safety
/// - `owner_id` and `template_key` must be valid null-terminated C strings.
/// - `config_json` may be NULL to use the default configuration.
/// - Returns a pointer that must be freed with `repsense_session_free`.
/// - Returns NULL on error; call `repsense_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn repsense_session_new(
    owner_id: *const c_char,
    template_key: *const c_char,
    config_json: *const c_char,
) -> *mut RepSenseSessionHandle {
    clear_last_error();

    let Some(owner) = cstr_to_string(owner_id) else {
        set_last_error("Invalid owner id pointer");
        return ptr::null_mut();
    };
    let Some(key) = cstr_to_string(template_key) else {
        set_last_error("Invalid template key pointer");
        return ptr::null_mut();
    };

    let config = if config_json.is_null() {
        Ok(CoachConfig::default())
    } else {
        match cstr_to_string(config_json) {
            Some(json) => CoachConfig::from_json(&json),
            None => {
                set_last_error("Invalid config string pointer");
                return ptr::null_mut();
            }
        }
    };

    let store = Arc::new(InMemoryStore::new());
    let started = config.and_then(|config| {
        CoachSession::start(&owner, &key, config, store.clone(), Box::new(SilentSpeech))
    });

    match started {
        Ok(session) => Box::into_raw(Box::new(RepSenseSessionHandle { session, store })),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Free a session without ending it.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `repsense_session_new`, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn repsense_session_free(handle: *mut RepSenseSessionHandle) {
    if !handle.is_null() {
        drop(Box::from_raw(handle));
    }
}

/// Process one frame.
///
/// Returns the frame report as JSON, or `{"outcome": "paused"}` /
/// `{"outcome": "decimated"}` when the frame was skipped.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `repsense_session_new`.
/// - `frame_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `repsense_free_string`.
/// - Returns NULL on error; call `repsense_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn repsense_session_process_frame(
    handle: *mut RepSenseSessionHandle,
    frame_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null session pointer");
        return ptr::null_mut();
    }
    let handle = &mut *handle;

    let Some(json) = cstr_to_string(frame_json) else {
        set_last_error("Invalid frame string pointer");
        return ptr::null_mut();
    };

    json_result((|| -> Result<String, CoachError> {
        let frame = PoseFrame::from_json(&json)?;
        let value = match handle.session.on_frame(&frame)? {
            FrameOutcome::Processed(report) => serde_json::to_value(&*report)?,
            FrameOutcome::Paused => serde_json::json!({ "outcome": "paused" }),
            FrameOutcome::Decimated => serde_json::json!({ "outcome": "decimated" }),
            FrameOutcome::Busy => serde_json::json!({ "outcome": "busy" }),
        };
        Ok(value.to_string())
    })())
}

/// Current session snapshot as JSON.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `repsense_session_new`.
/// - Returns a newly allocated string that must be freed with `repsense_free_string`.
#[no_mangle]
pub unsafe extern "C" fn repsense_session_snapshot(
    handle: *mut RepSenseSessionHandle,
) -> *mut c_char {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null session pointer");
        return ptr::null_mut();
    }
    let handle = &*handle;
    json_result(serde_json::to_string(&handle.session.snapshot()).map_err(CoachError::from))
}

/// Switch the exercise template. Returns 0 on success, -1 on error.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `repsense_session_new`.
/// - `template_key` must be a valid null-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn repsense_session_set_template(
    handle: *mut RepSenseSessionHandle,
    template_key: *const c_char,
) -> i32 {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null session pointer");
        return -1;
    }
    let handle = &mut *handle;
    let Some(key) = cstr_to_string(template_key) else {
        set_last_error("Invalid template key pointer");
        return -1;
    };
    status(handle.session.select_template(&key))
}

/// Change the performance mode (`quality`, `balanced`, `power_saver`).
/// Returns 0 on success, -1 on error.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `repsense_session_new`.
/// - `mode` must be a valid null-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn repsense_session_set_performance_mode(
    handle: *mut RepSenseSessionHandle,
    mode: *const c_char,
) -> i32 {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null session pointer");
        return -1;
    }
    let handle = &mut *handle;
    let Some(mode) = cstr_to_string(mode) else {
        set_last_error("Invalid mode pointer");
        return -1;
    };
    status(
        mode.parse::<PerformanceMode>()
            .map(|mode| handle.session.set_performance_mode(mode)),
    )
}

/// Pause (`paused != 0`) or resume frame processing.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `repsense_session_new`.
#[no_mangle]
pub unsafe extern "C" fn repsense_session_set_paused(
    handle: *mut RepSenseSessionHandle,
    paused: i32,
) -> i32 {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null session pointer");
        return -1;
    }
    let handle = &mut *handle;
    if paused != 0 {
        handle.session.pause();
    } else {
        handle.session.resume();
    }
    0
}

/// Report that the host finished speaking the current cue.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `repsense_session_new`.
#[no_mangle]
pub unsafe extern "C" fn repsense_session_utterance_complete(handle: *mut RepSenseSessionHandle) {
    if !handle.is_null() {
        (*handle).session.on_utterance_complete();
    }
}

/// Take every stored row as a JSON array, for the host to persist.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `repsense_session_new`.
/// - Returns a newly allocated string that must be freed with `repsense_free_string`.
#[no_mangle]
pub unsafe extern "C" fn repsense_session_drain_rows(
    handle: *mut RepSenseSessionHandle,
) -> *mut c_char {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null session pointer");
        return ptr::null_mut();
    }
    let handle = &mut *handle;
    let flushed = handle.session.flush();
    json_result(flushed.and_then(|_| {
        serde_json::to_string(&handle.store.drain_rows()).map_err(CoachError::from)
    }))
}

/// End the session and return its summary as JSON. The handle must still
/// be freed afterwards.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `repsense_session_new`.
/// - Returns a newly allocated string that must be freed with `repsense_free_string`.
/// - Returns NULL on error; call `repsense_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn repsense_session_end(handle: *mut RepSenseSessionHandle) -> *mut c_char {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null session pointer");
        return ptr::null_mut();
    }
    let handle = &mut *handle;
    json_result(
        handle
            .session
            .end()
            .and_then(|summary| serde_json::to_string(&summary).map_err(CoachError::from)),
    )
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by RepSense functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a RepSense function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn repsense_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local error string.
/// - The returned pointer is valid until the next RepSense function call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn repsense_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

// ============================================================================
// Version Information
// ============================================================================

/// Get the RepSense library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn repsense_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
