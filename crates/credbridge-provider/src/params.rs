//! Typed view of the host's parameter arrays
//!
//! The operations work on [`ParamSet`]. Conversion from and to the raw
//! `OSSL_PARAM` arrays happens only at the ABI edge through the `unsafe`
//! helpers at the bottom of this module. Big integers are big-endian in a
//! [`ParamSet`] and native-endian in the raw arrays.

use crate::error::{Error, Result};
use crate::ffi::{
    OSSL_PARAM, OSSL_PARAM_INTEGER, OSSL_PARAM_OCTET_PTR, OSSL_PARAM_OCTET_STRING,
    OSSL_PARAM_UNSIGNED_INTEGER, OSSL_PARAM_UTF8_PTR, OSSL_PARAM_UTF8_STRING,
};
use std::ffi::{c_char, c_void, CStr};

/// Value of a single parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    /// Signed integer
    Integer(i64),
    /// Unsigned big integer, big-endian
    UnsignedInteger(Vec<u8>),
    /// UTF-8 string
    Utf8(String),
    /// Raw bytes
    Octet(Vec<u8>),
}

impl ParamValue {
    fn kind(&self) -> &'static str {
        match self {
            ParamValue::Integer(_) => "integer",
            ParamValue::UnsignedInteger(_) => "unsigned integer",
            ParamValue::Utf8(_) => "UTF-8 string",
            ParamValue::Octet(_) => "octet string",
        }
    }
}

/// Ordered parameter list; lookups return the first entry with a key
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParamSet {
    entries: Vec<(String, ParamValue)>,
}

impl ParamSet {
    /// Empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`ParamSet::push`]
    pub fn with(mut self, key: impl Into<String>, value: ParamValue) -> Self {
        self.push(key, value);
        self
    }

    /// Append a parameter
    pub fn push(&mut self, key: impl Into<String>, value: ParamValue) {
        self.entries.push((key.into(), value));
    }

    /// First value stored under `key`
    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.entries
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value)
    }

    /// True when `key` is present
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Big-endian magnitude of an unsigned integer parameter
    pub fn unsigned_integer(&self, key: &str) -> Result<Option<&[u8]>> {
        match self.get(key) {
            None => Ok(None),
            Some(ParamValue::UnsignedInteger(bytes)) => Ok(Some(bytes)),
            Some(other) => Err(mistyped(key, "unsigned integer", other)),
        }
    }

    /// String parameter
    pub fn utf8(&self, key: &str) -> Result<Option<&str>> {
        match self.get(key) {
            None => Ok(None),
            Some(ParamValue::Utf8(value)) => Ok(Some(value)),
            Some(other) => Err(mistyped(key, "UTF-8 string", other)),
        }
    }
}

fn mistyped(key: &str, expected: &str, found: &ParamValue) -> Error {
    Error::InvalidParameter(format!(
        "parameter {} must be a {}, got a {}",
        key,
        expected,
        found.kind()
    ))
}

/// Reverse a big-endian integer into the host's native byte order
pub fn be_to_native(big_endian: &[u8]) -> Vec<u8> {
    let mut bytes = big_endian.to_vec();
    if cfg!(target_endian = "little") {
        bytes.reverse();
    }
    bytes
}

/// Reverse a native-endian integer into big-endian order
pub fn native_to_be(native: &[u8]) -> Vec<u8> {
    be_to_native(native)
}

/// Iterate a terminated parameter array.
///
/// # Safety
///
/// `params` must be null or point to an array terminated by an entry with a
/// null key, valid for `'a`.
pub unsafe fn iter_raw<'a>(params: *const OSSL_PARAM) -> impl Iterator<Item = &'a OSSL_PARAM> {
    let mut cursor = params;
    std::iter::from_fn(move || {
        if cursor.is_null() {
            return None;
        }
        // SAFETY: the array is terminated, so every entry up to the end is valid
        let entry = unsafe { &*cursor };
        if entry.key.is_null() {
            return None;
        }
        // SAFETY: not past the terminator
        cursor = unsafe { cursor.add(1) };
        Some(entry)
    })
}

/// Find the first entry named `key` in a mutable parameter array.
///
/// # Safety
///
/// Same as [`iter_raw`], and the array must be writable.
pub unsafe fn locate<'a>(params: *mut OSSL_PARAM, key: &CStr) -> Option<&'a mut OSSL_PARAM> {
    let mut cursor = params;
    if cursor.is_null() {
        return None;
    }
    loop {
        // SAFETY: the array is terminated, so every entry up to the end is valid
        let entry = unsafe { &mut *cursor };
        if entry.key.is_null() {
            return None;
        }
        // SAFETY: keys are NUL-terminated strings
        if unsafe { CStr::from_ptr(entry.key) } == key {
            return Some(entry);
        }
        // SAFETY: not past the terminator
        cursor = unsafe { cursor.add(1) };
    }
}

/// Convert a raw parameter array into a [`ParamSet`].
///
/// Entries of types the operations never consume are skipped.
///
/// # Safety
///
/// Same as [`iter_raw`]; every entry's data must be valid for its declared
/// type and size.
pub unsafe fn from_raw(params: *const OSSL_PARAM) -> Result<ParamSet> {
    let mut set = ParamSet::new();
    // SAFETY: forwarded caller contract
    for param in unsafe { iter_raw(params) } {
        // SAFETY: keys are NUL-terminated strings
        let key = unsafe { CStr::from_ptr(param.key) }
            .to_str()
            .map_err(|_| Error::InvalidParameter("parameter key is not UTF-8".to_string()))?;
        // SAFETY: forwarded caller contract
        match unsafe { read_value(param) }? {
            Some(value) => set.push(key, value),
            None => tracing::debug!("Ignoring parameter {} of type {}", key, param.data_type),
        }
    }
    Ok(set)
}

unsafe fn bytes<'a>(param: &OSSL_PARAM) -> Result<&'a [u8]> {
    if param.data_size == 0 {
        return Ok(&[]);
    }
    if param.data.is_null() {
        return Err(Error::InvalidParameter("parameter has no data".to_string()));
    }
    // SAFETY: caller guarantees `data` holds `data_size` bytes
    Ok(unsafe { std::slice::from_raw_parts(param.data as *const u8, param.data_size) })
}

fn utf8_until_nul(bytes: &[u8]) -> Result<String> {
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    std::str::from_utf8(&bytes[..end])
        .map(str::to_string)
        .map_err(|_| Error::InvalidParameter("string parameter is not UTF-8".to_string()))
}

unsafe fn read_value(param: &OSSL_PARAM) -> Result<Option<ParamValue>> {
    let value = match param.data_type {
        OSSL_PARAM_INTEGER => {
            // SAFETY: forwarded caller contract
            let raw = unsafe { bytes(param) }?;
            let value = match raw.len() {
                4 => i64::from(i32::from_ne_bytes([raw[0], raw[1], raw[2], raw[3]])),
                8 => i64::from_ne_bytes([
                    raw[0], raw[1], raw[2], raw[3], raw[4], raw[5], raw[6], raw[7],
                ]),
                n => {
                    return Err(Error::InvalidParameter(format!(
                        "integer parameter of {} bytes",
                        n
                    )))
                }
            };
            ParamValue::Integer(value)
        }
        OSSL_PARAM_UNSIGNED_INTEGER => {
            // SAFETY: forwarded caller contract
            ParamValue::UnsignedInteger(native_to_be(unsafe { bytes(param) }?))
        }
        // SAFETY: forwarded caller contract
        OSSL_PARAM_UTF8_STRING => ParamValue::Utf8(utf8_until_nul(unsafe { bytes(param) }?)?),
        // SAFETY: forwarded caller contract
        OSSL_PARAM_OCTET_STRING => ParamValue::Octet(unsafe { bytes(param) }?.to_vec()),
        OSSL_PARAM_UTF8_PTR => {
            if param.data.is_null() {
                return Err(Error::InvalidParameter("parameter has no data".to_string()));
            }
            // SAFETY: a UTF8_PTR parameter points at a string pointer
            let string = unsafe { *(param.data as *const *const c_char) };
            if string.is_null() {
                return Err(Error::InvalidParameter("null string pointer".to_string()));
            }
            // SAFETY: the pointed-to string is NUL-terminated
            let value = unsafe { CStr::from_ptr(string) };
            ParamValue::Utf8(utf8_until_nul(value.to_bytes())?)
        }
        OSSL_PARAM_OCTET_PTR => {
            if param.data.is_null() {
                return Err(Error::InvalidParameter("parameter has no data".to_string()));
            }
            // SAFETY: an OCTET_PTR parameter points at a buffer pointer
            let buffer = unsafe { *(param.data as *const *const u8) };
            if buffer.is_null() || param.data_size == 0 {
                ParamValue::Octet(Vec::new())
            } else {
                // SAFETY: the pointed-to buffer holds `data_size` bytes
                ParamValue::Octet(unsafe { std::slice::from_raw_parts(buffer, param.data_size) }.to_vec())
            }
        }
        _ => return Ok(None),
    };
    Ok(Some(value))
}

/// Write an integer into a requested parameter.
///
/// # Safety
///
/// `param.data` must be null or writable for `param.data_size` bytes.
pub unsafe fn set_integer(param: &mut OSSL_PARAM, value: i64) -> Result<()> {
    let size = param.data_size;
    if param.data.is_null() {
        param.return_size = if size == 0 { 8 } else { size };
        return Ok(());
    }
    let encoded: Vec<u8> = match (param.data_type, size) {
        (OSSL_PARAM_INTEGER, 4) => i32::try_from(value)
            .map_err(|_| out_of_range(value))?
            .to_ne_bytes()
            .to_vec(),
        (OSSL_PARAM_INTEGER, 8) => value.to_ne_bytes().to_vec(),
        (OSSL_PARAM_UNSIGNED_INTEGER, 4) => u32::try_from(value)
            .map_err(|_| out_of_range(value))?
            .to_ne_bytes()
            .to_vec(),
        (OSSL_PARAM_UNSIGNED_INTEGER, 8) => u64::try_from(value)
            .map_err(|_| out_of_range(value))?
            .to_ne_bytes()
            .to_vec(),
        (data_type, size) => {
            return Err(Error::InvalidParameter(format!(
                "cannot store an integer in a parameter of type {} and {} bytes",
                data_type, size
            )))
        }
    };
    // SAFETY: data is writable for `size` bytes and `encoded` has that length
    unsafe { std::ptr::copy_nonoverlapping(encoded.as_ptr(), param.data as *mut u8, size) };
    param.return_size = size;
    Ok(())
}

fn out_of_range(value: i64) -> Error {
    Error::InvalidParameter(format!("{} does not fit the requested integer", value))
}

/// Point a requested UTF8_PTR parameter at a static string.
///
/// # Safety
///
/// `param.data` must be null or writable for one pointer.
pub unsafe fn set_utf8_ptr(param: &mut OSSL_PARAM, value: &'static CStr) -> Result<()> {
    if param.data_type != OSSL_PARAM_UTF8_PTR {
        return Err(Error::InvalidParameter(format!(
            "cannot store a string pointer in a parameter of type {}",
            param.data_type
        )));
    }
    param.return_size = value.to_bytes().len();
    if !param.data.is_null() {
        // SAFETY: data is writable for one pointer
        unsafe { *(param.data as *mut *const c_char) = value.as_ptr() };
    }
    Ok(())
}

/// Raw pointer to a value, typed for `OSSL_PARAM::data`
pub(crate) fn data_ptr<T>(value: &T) -> *mut c_void {
    value as *const T as *mut c_void
}
