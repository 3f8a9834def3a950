//! Forwards libav* log lines to the `log` facade under the `ffmpeg` target.

use std::ffi::{CStr, c_char, c_int, c_void};

use ffmpeg_next::ffi;

// va_list decays to a pointer in callback arguments on x86_64 SysV
#[cfg(all(target_arch = "x86_64", not(windows)))]
type VaList = *mut ffi::__va_list_tag;
#[cfg(not(all(target_arch = "x86_64", not(windows))))]
type VaList = ffi::va_list;

/// Installs the forwarding callback. FFmpeg's own level (`util::log::set_level`)
/// still filters before anything reaches `log`.
pub fn forward_to_log() {
    unsafe { ffi::av_log_set_callback(Some(forward)) };
}

/// Maps an `AV_LOG_*` level to a `log` level. None for `AV_LOG_QUIET`.
pub fn log_level(level: c_int) -> Option<log::Level> {
    match level {
        l if l <= ffi::AV_LOG_QUIET => None,
        l if l <= ffi::AV_LOG_ERROR => Some(log::Level::Error),
        l if l <= ffi::AV_LOG_WARNING => Some(log::Level::Warn),
        l if l <= ffi::AV_LOG_INFO => Some(log::Level::Info),
        l if l <= ffi::AV_LOG_DEBUG => Some(log::Level::Debug),
        _ => Some(log::Level::Trace),
    }
}

unsafe extern "C" fn forward(avcl: *mut c_void, level: c_int, fmt: *const c_char, vl: VaList) {
    if level > unsafe { ffi::av_log_get_level() } {
        return;
    }
    let Some(target_level) = log_level(level) else {
        return;
    };
    if !log::log_enabled!(target: "ffmpeg", target_level) {
        return;
    }

    let mut line = [0 as c_char; 1024];
    let mut print_prefix: c_int = 1;
    let written = unsafe {
        ffi::av_log_format_line2(
            avcl,
            level,
            fmt,
            vl,
            line.as_mut_ptr(),
            line.len() as c_int,
            &mut print_prefix,
        )
    };
    if written < 0 {
        return;
    }
    let message = unsafe { CStr::from_ptr(line.as_ptr()) }.to_string_lossy();
    let message = message.trim_end();
    if !message.is_empty() {
        log::log!(target: "ffmpeg", target_level, "{}", message);
    }
}
