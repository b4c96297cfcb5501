//! C-compatible embedding API over [`anytalk_core`].
//!
//! The host owns a `ctx*` obtained from [`anytalk_init`] and passes it
//! back to every other entry point. All cryptographic/network work
//! happens inside `anytalk-core`; this crate only marshals data across
//! the ABI boundary and trampolines the event callback.
//!
//! Build as a shared or static library:
//! ```text
//! cargo build --release -p anytalk-ffi
//! ```

use std::ffi::{c_char, c_void, CStr, CString};
use std::ptr;
use std::sync::Arc;

use anytalk_core::{Config, Context, Event, Mode};

/// `event_type` values passed to the host callback.
pub mod event_type {
    /// A revisable transcription preview.
    pub const PARTIAL: i32 = 0;
    /// A stable transcription segment.
    pub const FINAL: i32 = 1;
    /// A coarse session status string.
    pub const STATUS: i32 = 2;
    /// A short human-readable error message.
    pub const ERROR: i32 = 3;
}

/// `(user_data, event_type, text)`. `text` is a NUL-terminated UTF-8
/// string owned by the callee; it is only valid for the duration of
/// the call.
pub type AnytalkEventCallback =
    extern "C" fn(user_data: *mut c_void, event_type: i32, text: *const c_char);

/// Configuration passed to [`anytalk_init`]. `resource_id` and `mode`
/// may be null, in which case `anytalk-core`'s defaults apply.
#[repr(C)]
pub struct AnytalkConfig {
    pub app_id: *const c_char,
    pub access_token: *const c_char,
    pub resource_id: *const c_char,
    pub mode: *const c_char,
}

/// The opaque handle returned by [`anytalk_init`].
pub struct AnytalkCtx(Arc<Context>);

struct CallbackTrampoline {
    callback: AnytalkEventCallback,
    user_data: *mut c_void,
}

// SAFETY: `user_data` is an opaque pointer the host supplied at
// `anytalk_init` time and promises is safe to dereference from any
// thread; this crate never reads through it, only forwards it back.
unsafe impl Send for CallbackTrampoline {}
unsafe impl Sync for CallbackTrampoline {}

impl CallbackTrampoline {
    fn invoke(&self, event: Event) {
        let (kind, text) = match event {
            Event::Partial(text) => (event_type::PARTIAL, text),
            Event::Final(text) => (event_type::FINAL, text),
            Event::Status(text) => (event_type::STATUS, text),
            Event::Error(text) => (event_type::ERROR, text),
        };
        let Ok(c_text) = CString::new(text) else {
            tracing::warn!("dropping event whose text contains an interior NUL");
            return;
        };
        (self.callback)(self.user_data, kind, c_text.as_ptr());
    }
}

/// Build a context from `config`, registering `callback`/`user_data`
/// as the event sink. Returns null if `config`, `app_id`, or
/// `access_token` is null or not valid UTF-8.
///
/// # Safety
/// `config` must point to a valid, fully-initialized `AnytalkConfig`
/// (or be null). `app_id`/`access_token` must be valid, NUL-terminated
/// UTF-8 C strings; `resource_id`/`mode` may additionally be null.
/// `user_data`, if non-null, must remain valid and safe to pass to
/// `callback` from any thread until after `anytalk_destroy` returns.
#[no_mangle]
pub unsafe extern "C" fn anytalk_init(
    config: *const AnytalkConfig,
    callback: AnytalkEventCallback,
    user_data: *mut c_void,
) -> *mut AnytalkCtx {
    let Some(config) = config.as_ref() else {
        return ptr::null_mut();
    };

    let Some(app_id) = cstr_to_str(config.app_id) else {
        return ptr::null_mut();
    };
    let Some(access_token) = cstr_to_str(config.access_token) else {
        return ptr::null_mut();
    };

    let mut built = Config::new().with_app_id(app_id).with_access_token(access_token);
    if let Some(resource_id) = cstr_to_str(config.resource_id) {
        built = built.with_resource_id(resource_id);
    }
    if let Some(mode) = cstr_to_str(config.mode) {
        built = built.with_mode(Mode::parse(mode));
    }

    let trampoline = Arc::new(CallbackTrampoline { callback, user_data });
    let event_callback = Arc::new(move |event: Event| trampoline.invoke(event));

    let ctx = Context::init(built, event_callback);
    Box::into_raw(Box::new(AnytalkCtx(ctx)))
}

/// Tear down `ctx`: cancel any session, stop the pool and capture, and
/// free the handle. `ctx` must not be used again afterward.
///
/// # Safety
/// `ctx` must be a pointer returned by `anytalk_init`, not yet freed.
#[no_mangle]
pub unsafe extern "C" fn anytalk_destroy(ctx: *mut AnytalkCtx) {
    if ctx.is_null() {
        return;
    }
    let boxed = Box::from_raw(ctx);
    boxed.0.destroy();
}

/// Start a session, replacing any existing one. Returns `0` on success,
/// `-1` if `ctx` is null.
///
/// # Safety
/// `ctx` must be a live pointer returned by `anytalk_init`.
#[no_mangle]
pub unsafe extern "C" fn anytalk_start(ctx: *mut AnytalkCtx) -> i32 {
    let Some(ctx) = ctx.as_ref() else {
        return -1;
    };
    ctx.0.start_session();
    0
}

/// Stop the active session gracefully (drain). Returns `0` on success,
/// `-1` if `ctx` is null.
///
/// # Safety
/// `ctx` must be a live pointer returned by `anytalk_init`.
#[no_mangle]
pub unsafe extern "C" fn anytalk_stop(ctx: *mut AnytalkCtx) -> i32 {
    let Some(ctx) = ctx.as_ref() else {
        return -1;
    };
    ctx.0.stop_session();
    0
}

/// Abort the active session immediately. Returns `0` on success, `-1`
/// if `ctx` is null.
///
/// # Safety
/// `ctx` must be a live pointer returned by `anytalk_init`.
#[no_mangle]
pub unsafe extern "C" fn anytalk_cancel(ctx: *mut AnytalkCtx) -> i32 {
    let Some(ctx) = ctx.as_ref() else {
        return -1;
    };
    ctx.0.cancel();
    0
}

/// # Safety
/// `ptr` must be null or a valid, NUL-terminated UTF-8 C string.
unsafe fn cstr_to_str<'a>(ptr: *const c_char) -> Option<&'a str> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok()
}
