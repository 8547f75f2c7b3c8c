//! `extern "C"` entry points registered with the crypto host
//!
//! Every function here validates its pointers, runs the safe operation
//! inside [`guard`] and collapses the outcome into the host's `1`/`0` or
//! pointer/null convention. Failures are logged before they are dropped.

pub mod keymgmt;
pub mod provider;
pub mod signature;
pub mod store;

use crate::error::{Error, Result};
use crate::ffi::{OSSL_DISPATCH, OSSL_PARAM};
use crate::operation::Provider;
use std::ffi::{c_char, c_int, c_void, CStr};
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Table of host structures kept alive for the life of the process.
///
/// The raw pointers inside only reference `'static` data and functions.
pub(crate) struct Table<T>(pub(crate) Vec<T>);

// SAFETY: entries point at immutable 'static strings, tables and functions
unsafe impl<T> Send for Table<T> {}
// SAFETY: see above
unsafe impl<T> Sync for Table<T> {}

impl<T> Table<T> {
    pub(crate) fn as_ptr(&self) -> *const T {
        self.0.as_ptr()
    }
}

/// Fixed parameter descriptor table
pub(crate) struct ParamTable<const N: usize>(pub(crate) [OSSL_PARAM; N]);

// SAFETY: descriptors only point at 'static parameter names
unsafe impl<const N: usize> Sync for ParamTable<N> {}

impl<const N: usize> ParamTable<N> {
    pub(crate) fn as_ptr(&self) -> *const OSSL_PARAM {
        self.0.as_ptr()
    }
}

/// Dispatch entry for an `extern "C"` function of any signature
macro_rules! dispatch {
    ($id:expr, $function:expr) => {
        $crate::ffi::OSSL_DISPATCH {
            function_id: $id,
            // SAFETY: the host casts the entry back to the signature it
            // associates with `$id`
            function: Some(unsafe {
                std::mem::transmute::<*const (), unsafe extern "C" fn()>($function as *const ())
            }),
        }
    };
}
pub(crate) use dispatch;

/// Run `operation`, turning errors and panics into `None`
pub(crate) fn guard<T>(name: &str, operation: impl FnOnce() -> Result<T>) -> Option<T> {
    match catch_unwind(AssertUnwindSafe(operation)) {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            tracing::debug!("{} failed: {}", name, e);
            None
        }
        Err(_) => {
            tracing::error!("{} panicked", name);
            None
        }
    }
}

/// Host success flag for a guarded operation
pub(crate) fn status(outcome: Option<()>) -> c_int {
    c_int::from(outcome.is_some())
}

/// Host boolean for a guarded predicate
pub(crate) fn flag(outcome: Option<bool>) -> c_int {
    c_int::from(outcome.unwrap_or(false))
}

/// Box `value` for the host
pub(crate) fn into_raw<T>(value: Option<T>) -> *mut c_void {
    match value {
        Some(value) => Box::into_raw(Box::new(value)).cast(),
        None => std::ptr::null_mut(),
    }
}

/// Shared reference behind a host pointer.
///
/// # Safety
///
/// `ptr` must be null or point to a live `T` created by this crate.
pub(crate) unsafe fn object<'a, T>(ptr: *const c_void, what: &str) -> Result<&'a T> {
    if ptr.is_null() {
        return Err(Error::InvalidParameter(format!("null {}", what)));
    }
    // SAFETY: forwarded caller contract
    Ok(unsafe { &*ptr.cast::<T>() })
}

/// Mutable reference behind a host pointer.
///
/// # Safety
///
/// As [`object`], and no other reference to the object may be live.
pub(crate) unsafe fn object_mut<'a, T>(ptr: *mut c_void, what: &str) -> Result<&'a mut T> {
    if ptr.is_null() {
        return Err(Error::InvalidParameter(format!("null {}", what)));
    }
    // SAFETY: forwarded caller contract
    Ok(unsafe { &mut *ptr.cast::<T>() })
}

/// Drop a boxed host object
///
/// # Safety
///
/// `ptr` must be null or come from [`into_raw`] with the same `T`, and must
/// not be used afterwards.
pub(crate) unsafe fn free<T>(ptr: *mut c_void) {
    if !ptr.is_null() {
        // SAFETY: forwarded caller contract
        drop(unsafe { Box::from_raw(ptr.cast::<T>()) });
    }
}

/// The provider behind a provider context pointer.
///
/// # Safety
///
/// `provctx` must be null or the context returned by provider init.
pub(crate) unsafe fn provider<'a>(provctx: *mut c_void) -> Result<&'a Provider> {
    // SAFETY: forwarded caller contract
    unsafe { object::<Provider>(provctx, "provider context") }
}

/// Borrow a NUL-terminated UTF-8 string.
///
/// # Safety
///
/// `ptr` must be null or point to a NUL-terminated string.
pub(crate) unsafe fn c_str<'a>(ptr: *const c_char, what: &str) -> Result<&'a str> {
    if ptr.is_null() {
        return Err(Error::InvalidParameter(format!("null {}", what)));
    }
    // SAFETY: forwarded caller contract
    unsafe { CStr::from_ptr(ptr) }
        .to_str()
        .map_err(|_| Error::InvalidParameter(format!("{} is not UTF-8", what)))
}

/// Borrow a byte buffer; a null pointer is only accepted for zero length.
///
/// # Safety
///
/// `ptr` must be valid for `len` bytes.
pub(crate) unsafe fn bytes<'a>(ptr: *const u8, len: usize, what: &str) -> Result<&'a [u8]> {
    if ptr.is_null() {
        if len == 0 {
            return Ok(&[]);
        }
        return Err(Error::InvalidParameter(format!("null {}", what)));
    }
    // SAFETY: forwarded caller contract
    Ok(unsafe { std::slice::from_raw_parts(ptr, len) })
}

/// Terminated dispatch table
pub(crate) fn dispatch_table(mut entries: Vec<OSSL_DISPATCH>) -> Table<OSSL_DISPATCH> {
    entries.push(crate::ffi::OSSL_DISPATCH_END);
    Table(entries)
}
