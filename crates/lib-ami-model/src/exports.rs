//! The three IBIS-AMI entry points, exported with C linkage.
//!
//! ```c
//! long AMI_Init(double *impulse_matrix, long row_size, long aggressors,
//!               double sample_interval, double bit_time,
//!               char *AMI_parameters_in, char **AMI_parameters_out,
//!               void **AMI_memory_handle, char **msg);
//! long AMI_GetWave(double *wave, long wave_size, double *clock_times,
//!                  char **AMI_parameters_out, void *AMI_memory_handle);
//! long AMI_Close(void *AMI_memory_handle);
//! ```
//!
//! Every call returns 1 on success and 0 on failure. Nothing unwinds into
//! the host: each body runs under `catch_unwind`. The memory handle is a
//! session id carried in a pointer-sized value and is never dereferenced.

use crate::error::{AmiError, AmiResult};
use crate::registry::SessionRegistry;
use crate::session::InitRequest;
use lib_types::ami::AmiStatus;
use lib_types::units::Seconds;
use std::cell::RefCell;
use std::ffi::{c_char, c_double, c_long, c_void, CStr, CString};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::ptr;
use tracing::warn;

thread_local! {
    /// Message for the last failed `AMI_Init` on this thread.
    static LAST_FAILURE: RefCell<CString> = RefCell::new(CString::default());
}

/// Build a C string, replacing interior NULs.
fn c_string(text: &str) -> CString {
    CString::new(text.replace('\0', " ")).unwrap_or_default()
}

/// Store `text` in the per-thread failure buffer and return a pointer to it.
fn failure_message(text: &str) -> *mut c_char {
    LAST_FAILURE.with(|cell| {
        let mut slot = cell.borrow_mut();
        *slot = c_string(text);
        slot.as_ptr() as *mut c_char
    })
}

fn panic_text(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Run `f`, turning panics into errors.
fn guarded<T>(call: &'static str, f: impl FnOnce() -> AmiResult<T>) -> AmiResult<T> {
    catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| {
        let text = panic_text(payload);
        warn!(call, panic = %text, "Panic stopped at the AMI boundary");
        Err(AmiError::Panicked(text))
    })
}

fn status(ok: bool) -> c_long {
    let status = if ok { AmiStatus::Success } else { AmiStatus::Failure };
    status.code() as c_long
}

fn handle_id(handle: *mut c_void) -> u64 {
    handle as usize as u64
}

/// Non-negative `long` to `usize`.
fn count(name: &str, value: c_long) -> AmiResult<usize> {
    usize::try_from(value).map_err(|_| AmiError::configuration(format!("{name} must be non-negative, got {value}")))
}

/// # Safety
///
/// `impulse_matrix` must point to `row_size * (aggressors + 1)` doubles.
/// `AMI_parameters_in` must be null or a NUL-terminated string. The out
/// pointers must be null or valid for one pointer write.
#[no_mangle]
pub unsafe extern "C" fn AMI_Init(
    impulse_matrix: *mut c_double,
    row_size: c_long,
    aggressors: c_long,
    sample_interval: c_double,
    bit_time: c_double,
    ami_parameters_in: *const c_char,
    ami_parameters_out: *mut *mut c_char,
    ami_memory_handle: *mut *mut c_void,
    msg: *mut *mut c_char,
) -> c_long {
    if !ami_memory_handle.is_null() {
        *ami_memory_handle = ptr::null_mut();
    }
    if !ami_parameters_out.is_null() {
        *ami_parameters_out = ptr::null_mut();
    }

    let registry = SessionRegistry::global();
    let result = guarded("AMI_Init", || {
        let row_count = count("row_size", row_size)?;
        let aggressors = count("aggressors", aggressors)?;
        let total = aggressors
            .checked_add(1)
            .and_then(|c| c.checked_mul(row_count))
            .ok_or_else(|| AmiError::configuration("impulse matrix size overflows"))?;

        let impulse: &mut [f64] = if total == 0 {
            &mut []
        } else if impulse_matrix.is_null() {
            return Err(AmiError::configuration("impulse_matrix is null"));
        } else {
            std::slice::from_raw_parts_mut(impulse_matrix, total)
        };

        let parameters = if ami_parameters_in.is_null() {
            ""
        } else {
            CStr::from_ptr(ami_parameters_in)
                .to_str()
                .map_err(|_| AmiError::configuration("AMI_parameters_in is not valid UTF-8"))?
        };

        let id = registry.initialize(InitRequest {
            impulse,
            row_count,
            aggressors,
            sample_interval: Seconds(sample_interval),
            bit_time: Seconds(bit_time),
            parameters,
        })?;

        registry.with_slot(id, |slot| {
            let params = c_string(&slot.session.params_out());
            let message = c_string(slot.session.message());
            let pointers = (params.as_ptr() as *mut c_char, message.as_ptr() as *mut c_char);
            slot.strings.init_params = Some(params);
            slot.strings.init_message = Some(message);
            (id, pointers)
        })
    });

    match result {
        Ok((id, (params, message))) => {
            if !ami_parameters_out.is_null() {
                *ami_parameters_out = params;
            }
            if !msg.is_null() {
                *msg = message;
            }
            if !ami_memory_handle.is_null() {
                *ami_memory_handle = id as usize as *mut c_void;
            }
            status(true)
        }
        Err(e) => {
            warn!(error = %e, "AMI_Init failed");
            if !msg.is_null() {
                *msg = failure_message(&e.to_string());
            }
            status(false)
        }
    }
}

/// # Safety
///
/// `wave` must point to `wave_size` doubles; `clock_times` must be null or
/// point to `wave_size` doubles. `AMI_parameters_out` must be null or
/// valid for one pointer write.
///
/// The string written to `AMI_parameters_out` is owned by the session and
/// stays valid until the next `AMI_GetWave` on the same handle or
/// `AMI_Close`, whichever comes first. Strings from `AMI_Init` stay valid
/// until `AMI_Close`.
#[no_mangle]
pub unsafe extern "C" fn AMI_GetWave(
    wave: *mut c_double,
    wave_size: c_long,
    clock_times: *mut c_double,
    ami_parameters_out: *mut *mut c_char,
    ami_memory_handle: *mut c_void,
) -> c_long {
    let registry = SessionRegistry::global();
    let id = handle_id(ami_memory_handle);

    let result = guarded("AMI_GetWave", || {
        if id == 0 {
            return Err(AmiError::handle("null handle"));
        }
        let len = count("wave_size", wave_size)?;
        let samples: &mut [f64] = if len == 0 {
            &mut []
        } else if wave.is_null() {
            return Err(AmiError::configuration("wave is null"));
        } else {
            std::slice::from_raw_parts_mut(wave, len)
        };
        let clock = if clock_times.is_null() || len == 0 {
            None
        } else {
            Some(std::slice::from_raw_parts_mut(clock_times, len))
        };

        registry.with_slot(id, |slot| {
            slot.session.process_waveform(samples, clock)?;
            let params = c_string(&slot.session.params_out());
            let pointer = params.as_ptr() as *mut c_char;
            slot.strings.wave_params = Some(params);
            Ok(pointer)
        })?
    });

    match result {
        Ok(params) => {
            if !ami_parameters_out.is_null() {
                *ami_parameters_out = params;
            }
            status(true)
        }
        Err(e) => {
            warn!(handle = id, error = %e, "AMI_GetWave failed");
            status(false)
        }
    }
}

/// # Safety
///
/// `AMI_memory_handle` must be a value returned by `AMI_Init` (or null).
#[no_mangle]
pub unsafe extern "C" fn AMI_Close(ami_memory_handle: *mut c_void) -> c_long {
    let id = handle_id(ami_memory_handle);
    let result = guarded("AMI_Close", || SessionRegistry::global().close(id));

    match result {
        Ok(()) => status(true),
        Err(e) => {
            warn!(handle = id, error = %e, "AMI_Close failed");
            status(false)
        }
    }
}
