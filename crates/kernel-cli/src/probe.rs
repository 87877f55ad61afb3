//! Load a compiled AMI model and run it on an ideal impulse.

use anyhow::{Context, Result};
use lib_types::units::Seconds;
use lib_types::waveform::Waveform;
use libloading::Library;
use std::ffi::{c_char, c_double, c_long, c_void, CStr, CString};
use std::path::Path;
use std::ptr;

/// ```c
/// long AMI_Init(double *impulse_matrix, long row_size, long aggressors,
///               double sample_interval, double bit_time,
///               char *AMI_parameters_in, char **AMI_parameters_out,
///               void **AMI_memory_handle, char **msg);
/// ```
pub type AmiInitFn = unsafe extern "C" fn(
    impulse_matrix: *mut c_double,
    row_size: c_long,
    aggressors: c_long,
    sample_interval: c_double,
    bit_time: c_double,
    ami_parameters_in: *const c_char,
    ami_parameters_out: *mut *mut c_char,
    ami_memory_handle: *mut *mut c_void,
    msg: *mut *mut c_char,
) -> c_long;

/// ```c
/// long AMI_Close(void *AMI_memory_handle);
/// ```
pub type AmiCloseFn = unsafe extern "C" fn(ami_memory_handle: *mut c_void) -> c_long;

/// What the model did to the impulse.
#[derive(Clone, Debug)]
pub struct ProbeReport {
    pub status: c_long,
    pub message: String,
    pub params_out: String,
    /// One pre-cursor, the main cursor, then post-cursors.
    pub cursors: Vec<f64>,
}

/// Read a C string the model still owns.
///
/// # Safety
///
/// `p` must be null or point to a NUL-terminated string.
unsafe fn read_string(p: *const c_char) -> String {
    if p.is_null() {
        String::new()
    } else {
        CStr::from_ptr(p).to_string_lossy().into_owned()
    }
}

/// Call `AMI_Init` and `AMI_Close` from `library` on a unit impulse.
pub fn probe(
    library: &Path,
    parameters: &str,
    bit_time: f64,
    samples_per_ui: usize,
    post_cursors: usize,
) -> Result<ProbeReport> {
    // SAFETY: loading runs the library's initializers; the caller chose it.
    let lib = unsafe { Library::new(library) }.with_context(|| format!("Failed to load {:?}", library))?;
    let ami_init: AmiInitFn = unsafe {
        *lib.get::<AmiInitFn>(b"AMI_Init\0")
            .context("Symbol AMI_Init not found")?
    };
    let ami_close: AmiCloseFn = unsafe {
        *lib.get::<AmiCloseFn>(b"AMI_Close\0")
            .context("Symbol AMI_Close not found")?
    };

    tracing::info!(path = ?library, "Loaded AMI library");

    let rows = (post_cursors + 16) * samples_per_ui;
    let mut impulse = vec![0.0; rows];
    impulse[0] = 1.0;
    let params = CString::new(parameters).context("Parameter string contains NUL")?;
    let sample_interval = bit_time / samples_per_ui as f64;

    let mut params_out: *mut c_char = ptr::null_mut();
    let mut handle: *mut c_void = ptr::null_mut();
    let mut msg: *mut c_char = ptr::null_mut();

    // SAFETY: buffers match the declared sizes and outlive the call.
    let status = unsafe {
        ami_init(
            impulse.as_mut_ptr(),
            rows as c_long,
            0,
            sample_interval,
            bit_time,
            params.as_ptr(),
            &mut params_out,
            &mut handle,
            &mut msg,
        )
    };
    // Strings belong to the model and are only valid until AMI_Close.
    let message = unsafe { read_string(msg) };
    let params_out = unsafe { read_string(params_out) };

    if status == 1 {
        let closed = unsafe { ami_close(handle) };
        if closed != 1 {
            tracing::warn!(closed, "AMI_Close reported failure");
        }
    }

    let equalized = Waveform::new(impulse, Seconds(sample_interval), Seconds::ZERO);
    let main = equalized.peak_index().unwrap_or(0);
    let cursors = equalized.cursors(main, samples_per_ui, 1, post_cursors);

    Ok(ProbeReport {
        status,
        message,
        params_out,
        cursors,
    })
}
