//! Raw definitions of the crypto host's provider ABI
//!
//! Layouts and numeric identifiers mirror the host's `core.h`,
//! `core_dispatch.h`, `core_names.h` and `core_object.h`.

#![allow(non_camel_case_types)]

use std::ffi::{c_char, c_int, c_uint, c_void, CStr};
use std::ptr;

/// One entry of a function table
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct OSSL_DISPATCH {
    pub function_id: c_int,
    pub function: Option<unsafe extern "C" fn()>,
}

/// One entry of a typed parameter array
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct OSSL_PARAM {
    pub key: *const c_char,
    pub data_type: c_uint,
    pub data: *mut c_void,
    pub data_size: usize,
    pub return_size: usize,
}

/// One entry of an algorithm table
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct OSSL_ALGORITHM {
    pub algorithm_names: *const c_char,
    pub property_definition: *const c_char,
    pub implementation: *const OSSL_DISPATCH,
    pub algorithm_description: *const c_char,
}

/// Host handle passed to provider initialization
#[repr(C)]
pub struct OSSL_CORE_HANDLE {
    _private: [u8; 0],
}

/// Callback receiving a parameter array
pub type OSSL_CALLBACK = unsafe extern "C" fn(params: *const OSSL_PARAM, arg: *mut c_void) -> c_int;

/// Passphrase callback handed to store loaders
pub type OSSL_PASSPHRASE_CALLBACK = unsafe extern "C" fn(
    pass: *mut c_char,
    pass_size: usize,
    pass_len: *mut usize,
    params: *const OSSL_PARAM,
    arg: *mut c_void,
) -> c_int;

/// Provider entry point signature
pub type OSSL_provider_init_fn = unsafe extern "C" fn(
    handle: *const OSSL_CORE_HANDLE,
    r#in: *const OSSL_DISPATCH,
    out: *mut *const OSSL_DISPATCH,
    provctx: *mut *mut c_void,
) -> c_int;

/// `return_size` of a parameter nobody wrote to
pub const OSSL_PARAM_UNMODIFIED: usize = usize::MAX;

pub const OSSL_PARAM_INTEGER: c_uint = 1;
pub const OSSL_PARAM_UNSIGNED_INTEGER: c_uint = 2;
pub const OSSL_PARAM_UTF8_STRING: c_uint = 4;
pub const OSSL_PARAM_OCTET_STRING: c_uint = 5;
pub const OSSL_PARAM_UTF8_PTR: c_uint = 6;
pub const OSSL_PARAM_OCTET_PTR: c_uint = 7;

pub const OSSL_FUNC_PROVIDER_TEARDOWN: c_int = 1024;
pub const OSSL_FUNC_PROVIDER_GETTABLE_PARAMS: c_int = 1025;
pub const OSSL_FUNC_PROVIDER_GET_PARAMS: c_int = 1026;
pub const OSSL_FUNC_PROVIDER_QUERY_OPERATION: c_int = 1027;

pub const OSSL_OP_DIGEST: c_int = 1;
pub const OSSL_OP_CIPHER: c_int = 2;
pub const OSSL_OP_MAC: c_int = 3;
pub const OSSL_OP_KDF: c_int = 4;
pub const OSSL_OP_RAND: c_int = 5;
pub const OSSL_OP_KEYMGMT: c_int = 10;
pub const OSSL_OP_KEYEXCH: c_int = 11;
pub const OSSL_OP_SIGNATURE: c_int = 12;
pub const OSSL_OP_ASYM_CIPHER: c_int = 13;
pub const OSSL_OP_KEM: c_int = 14;
pub const OSSL_OP_ENCODER: c_int = 20;
pub const OSSL_OP_DECODER: c_int = 21;
pub const OSSL_OP_STORE: c_int = 22;

pub const OSSL_FUNC_KEYMGMT_NEW: c_int = 1;
pub const OSSL_FUNC_KEYMGMT_LOAD: c_int = 8;
pub const OSSL_FUNC_KEYMGMT_FREE: c_int = 10;
pub const OSSL_FUNC_KEYMGMT_GET_PARAMS: c_int = 11;
pub const OSSL_FUNC_KEYMGMT_GETTABLE_PARAMS: c_int = 12;
pub const OSSL_FUNC_KEYMGMT_HAS: c_int = 21;
pub const OSSL_FUNC_KEYMGMT_IMPORT: c_int = 40;
pub const OSSL_FUNC_KEYMGMT_IMPORT_TYPES: c_int = 41;
pub const OSSL_FUNC_KEYMGMT_EXPORT: c_int = 42;
pub const OSSL_FUNC_KEYMGMT_EXPORT_TYPES: c_int = 43;
pub const OSSL_FUNC_KEYMGMT_DUP: c_int = 44;

pub const OSSL_FUNC_SIGNATURE_NEWCTX: c_int = 1;
pub const OSSL_FUNC_SIGNATURE_DIGEST_SIGN_INIT: c_int = 8;
pub const OSSL_FUNC_SIGNATURE_DIGEST_SIGN_UPDATE: c_int = 9;
pub const OSSL_FUNC_SIGNATURE_DIGEST_SIGN_FINAL: c_int = 10;
pub const OSSL_FUNC_SIGNATURE_DIGEST_VERIFY_INIT: c_int = 12;
pub const OSSL_FUNC_SIGNATURE_DIGEST_VERIFY_UPDATE: c_int = 13;
pub const OSSL_FUNC_SIGNATURE_DIGEST_VERIFY_FINAL: c_int = 14;
pub const OSSL_FUNC_SIGNATURE_FREECTX: c_int = 16;
pub const OSSL_FUNC_SIGNATURE_DUPCTX: c_int = 17;
pub const OSSL_FUNC_SIGNATURE_SET_CTX_PARAMS: c_int = 20;
pub const OSSL_FUNC_SIGNATURE_SETTABLE_CTX_PARAMS: c_int = 21;
pub const OSSL_FUNC_SIGNATURE_SET_CTX_MD_PARAMS: c_int = 24;
pub const OSSL_FUNC_SIGNATURE_SETTABLE_CTX_MD_PARAMS: c_int = 25;

pub const OSSL_FUNC_STORE_OPEN: c_int = 1;
pub const OSSL_FUNC_STORE_LOAD: c_int = 5;
pub const OSSL_FUNC_STORE_EOF: c_int = 6;
pub const OSSL_FUNC_STORE_CLOSE: c_int = 7;

pub const OSSL_OBJECT_PKEY: c_int = 2;
pub const OSSL_OBJECT_CERT: c_int = 3;

/// Parameter names
pub mod names {
    use std::ffi::CStr;

    pub const PROV_NAME: &CStr = c"name";
    pub const PROV_VERSION: &CStr = c"version";
    pub const PROV_BUILDINFO: &CStr = c"buildinfo";
    pub const PROV_STATUS: &CStr = c"status";

    pub const PKEY_BITS: &CStr = c"bits";
    pub const PKEY_SECURITY_BITS: &CStr = c"security-bits";
    pub const PKEY_MAX_SIZE: &CStr = c"max-size";
    pub const PKEY_RSA_E: &CStr = c"e";
    pub const PKEY_RSA_N: &CStr = c"n";

    pub const SIGNATURE_DIGEST: &CStr = c"digest";
    pub const SIGNATURE_PROPERTIES: &CStr = c"properties";
    pub const SIGNATURE_PAD_MODE: &CStr = c"pad-mode";
    pub const SIGNATURE_MGF1_DIGEST: &CStr = c"mgf1-digest";
    pub const SIGNATURE_MGF1_PROPERTIES: &CStr = c"mgf1-properties";
    pub const SIGNATURE_PSS_SALTLEN: &CStr = c"saltlen";

    pub const OBJECT_TYPE: &CStr = c"type";
    pub const OBJECT_DATA_TYPE: &CStr = c"data-type";
    pub const OBJECT_DATA: &CStr = c"data";
    pub const OBJECT_REFERENCE: &CStr = c"reference";
}

/// Terminating entry of a parameter array
pub const OSSL_PARAM_END: OSSL_PARAM = OSSL_PARAM {
    key: ptr::null(),
    data_type: 0,
    data: ptr::null_mut(),
    data_size: 0,
    return_size: 0,
};

/// Terminating entry of a function table
pub const OSSL_DISPATCH_END: OSSL_DISPATCH = OSSL_DISPATCH {
    function_id: 0,
    function: None,
};

/// Terminating entry of an algorithm table
pub const OSSL_ALGORITHM_END: OSSL_ALGORITHM = OSSL_ALGORITHM {
    algorithm_names: ptr::null(),
    property_definition: ptr::null(),
    implementation: ptr::null(),
    algorithm_description: ptr::null(),
};

/// Parameter descriptor without data, as used in gettable/settable tables
pub const fn param_definition(key: &'static CStr, data_type: c_uint) -> OSSL_PARAM {
    OSSL_PARAM {
        key: key.as_ptr(),
        data_type,
        data: ptr::null_mut(),
        data_size: 0,
        return_size: OSSL_PARAM_UNMODIFIED,
    }
}

/// Parameter pointing at caller-owned data
pub fn param_construct(
    key: &'static CStr,
    data_type: c_uint,
    data: *mut c_void,
    data_size: usize,
) -> OSSL_PARAM {
    OSSL_PARAM {
        key: key.as_ptr(),
        data_type,
        data,
        data_size,
        return_size: OSSL_PARAM_UNMODIFIED,
    }
}
