//! C-compatible API over [`Project`].
//!
//! A project handle is an opaque pointer returned by [`prequel_open`] and
//! released with [`prequel_close`]. Strings returned to the caller are
//! owned by Rust and must be released with [`prequel_free_str`].

use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use parking_lot::Mutex;

use crate::common::error::PrequelError;

use super::project::Project;

/// Failure text of the last `prequel_open` that had no handle to keep it.
static OPEN_ERROR: Mutex<String> = parking_lot::const_mutex(String::new());

/// ABI version to coordinate with the host.
#[no_mangle]
pub extern "C" fn prequel_api_version() -> u32 {
    1
}

/// # Safety
/// `ptr` must be null or a valid NUL-terminated string.
unsafe fn read_str(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    Some(CStr::from_ptr(ptr).to_string_lossy().into_owned())
}

/// # Safety
/// `handle` must be null or a live pointer from `prequel_open`.
unsafe fn project<'a>(handle: *const Project) -> Option<&'a Project> {
    handle.as_ref()
}

fn string_to_raw(s: String) -> *mut c_char {
    match CString::new(s) {
        Ok(cstring) => cstring.into_raw(),
        Err(err) => {
            // interior NUL: return the text up to it
            let pos = err.nul_position();
            let mut bytes = err.into_vec();
            bytes.truncate(pos);
            CString::new(bytes).map_or(ptr::null_mut(), CString::into_raw)
        }
    }
}

/// Open the project in `base_dir`. Null on failure; see `prequel_errmsg(NULL)`.
///
/// # Safety
/// `base_dir` must be a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn prequel_open(base_dir: *const c_char) -> *mut Project {
    let Some(base_dir) = read_str(base_dir) else {
        *OPEN_ERROR.lock() = "base_dir is null".to_string();
        return ptr::null_mut();
    };
    match Project::open(&base_dir) {
        Ok(project) => {
            OPEN_ERROR.lock().clear();
            Box::into_raw(Box::new(project))
        }
        Err(err) => {
            *OPEN_ERROR.lock() = err.to_string();
            ptr::null_mut()
        }
    }
}

/// # Safety
/// `handle` must be null or come from `prequel_open`, and not be used afterwards.
#[no_mangle]
pub unsafe extern "C" fn prequel_close(handle: *mut Project) {
    if !handle.is_null() {
        drop(Box::from_raw(handle));
    }
}

/// # Safety
/// `handle` from `prequel_open`; `csv_path` a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn prequel_insert_chunk_csv(handle: *const Project, csv_path: *const c_char) -> bool {
    let Some(p) = project(handle) else {
        return false;
    };
    match read_str(csv_path) {
        Some(path) => p.insert_chunk_csv(path),
        None => {
            p.reject("insert_chunk_csv", PrequelError::schema("csv_path is null"));
            false
        }
    }
}

/// # Safety
/// `handle` must come from `prequel_open`.
#[no_mangle]
pub unsafe extern "C" fn prequel_update(handle: *const Project) -> bool {
    project(handle).map_or(false, Project::update)
}

/// # Safety
/// `handle` must come from `prequel_open`.
#[no_mangle]
pub unsafe extern "C" fn prequel_rebuild(handle: *const Project) -> bool {
    project(handle).map_or(false, Project::rebuild)
}

/// Predict one JSON object; returns `{"label":..,"error":..}`.
///
/// # Safety
/// `handle` from `prequel_open`; `input` a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn prequel_predict_json(handle: *const Project, input: *const c_char) -> *mut c_char {
    let (Some(p), Some(input)) = (project(handle), read_str(input)) else {
        return ptr::null_mut();
    };
    let prediction = p.predict_json(&input);
    match serde_json::to_string(&prediction) {
        Ok(json) => string_to_raw(json),
        Err(_) => ptr::null_mut(),
    }
}

/// Report JSON, or null on failure.
///
/// # Safety
/// `handle` from `prequel_open`; `options` null or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn prequel_report_json(handle: *const Project, options: *const c_char) -> *mut c_char {
    let Some(p) = project(handle) else {
        return ptr::null_mut();
    };
    let options = read_str(options).unwrap_or_default();
    p.report_json(&options).map_or(ptr::null_mut(), string_to_raw)
}

/// Last failure text for `handle`, or of the last open when `handle` is null.
///
/// # Safety
/// `handle` must be null or come from `prequel_open`.
#[no_mangle]
pub unsafe extern "C" fn prequel_errmsg(handle: *const Project) -> *mut c_char {
    match project(handle) {
        Some(p) => string_to_raw(p.errmsg()),
        None => string_to_raw(OPEN_ERROR.lock().clone()),
    }
}

/// Free strings allocated by Rust.
///
/// # Safety
/// `ptr` must be null or a string returned by this library, freed once.
#[no_mangle]
pub unsafe extern "C" fn prequel_free_str(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn take(ptr: *mut c_char) -> String {
        assert!(!ptr.is_null());
        let s = unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned();
        unsafe { prequel_free_str(ptr) };
        s
    }

    #[test]
    fn open_failure_is_reported_through_null_handle() {
        let dir = tempfile::tempdir().unwrap();
        let path = CString::new(dir.path().join("missing").to_string_lossy().into_owned()).unwrap();
        let handle = unsafe { prequel_open(path.as_ptr()) };
        assert!(handle.is_null());
        assert!(!take(unsafe { prequel_errmsg(ptr::null()) }).is_empty());
    }

    #[test]
    fn null_handles_are_refused() {
        unsafe {
            assert!(!prequel_update(ptr::null()));
            assert!(!prequel_rebuild(ptr::null()));
            assert!(prequel_report_json(ptr::null(), ptr::null()).is_null());
            prequel_close(ptr::null_mut());
        }
        assert_eq!(prequel_api_version(), 1);
    }

    #[test]
    fn interior_nul_is_truncated() {
        assert_eq!(take(string_to_raw("ab\0cd".to_string())), "ab");
    }
}
