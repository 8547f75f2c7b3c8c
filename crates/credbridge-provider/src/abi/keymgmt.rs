//! Key management table

use super::{dispatch, dispatch_table, flag, free, guard, into_raw, object, object_mut, provider};
use super::{ParamTable, Table};
use crate::error::Error;
use crate::ffi::{self, names, param_construct, param_definition, OSSL_CALLBACK, OSSL_DISPATCH, OSSL_PARAM};
use crate::key::ProviderKey;
use crate::operation::KeyManagement;
use crate::params::{be_to_native, from_raw, locate, set_integer};
use credbridge_types::KeySelection;
use std::ffi::{c_int, c_void};
use std::sync::OnceLock;

static GETTABLE_PARAMS: ParamTable<4> = ParamTable([
    param_definition(names::PKEY_BITS, ffi::OSSL_PARAM_INTEGER),
    param_definition(names::PKEY_SECURITY_BITS, ffi::OSSL_PARAM_INTEGER),
    param_definition(names::PKEY_MAX_SIZE, ffi::OSSL_PARAM_INTEGER),
    ffi::OSSL_PARAM_END,
]);

static PUBLIC_KEY_TYPES: ParamTable<3> = ParamTable([
    param_definition(names::PKEY_RSA_E, ffi::OSSL_PARAM_UNSIGNED_INTEGER),
    param_definition(names::PKEY_RSA_N, ffi::OSSL_PARAM_UNSIGNED_INTEGER),
    ffi::OSSL_PARAM_END,
]);

/// Allocate an empty key
pub unsafe extern "C" fn new(provctx: *mut c_void) -> *mut c_void {
    into_raw(guard("keymgmt new", || {
        // SAFETY: the host passes back the context from provider init
        Ok(unsafe { provider(provctx) }?.new_key())
    }))
}

/// Release a key and its native handle
pub unsafe extern "C" fn free_key(keydata: *mut c_void) {
    // SAFETY: keydata was produced by this table
    guard("keymgmt free", || Ok(unsafe { free::<ProviderKey>(keydata) }));
}

/// Independent copy of a key
pub unsafe extern "C" fn dup(keydata: *const c_void, selection: c_int) -> *mut c_void {
    into_raw(guard("keymgmt dup", || {
        // SAFETY: keydata was produced by this table
        let key = unsafe { object::<ProviderKey>(keydata, "key") }?;
        key.duplicate(KeySelection::from_bits(selection as u32))
    }))
}

/// Copy of the key a store load handed out by reference
pub unsafe extern "C" fn load(reference: *const c_void, reference_size: usize) -> *mut c_void {
    into_raw(guard("keymgmt load", || {
        if reference_size != std::mem::size_of::<*const ProviderKey>() {
            return Err(Error::InvalidParameter(format!(
                "key reference of {} bytes",
                reference_size
            )));
        }
        // SAFETY: references are produced by the store loader and point at a
        // key that stays alive while the loader is open
        let key = unsafe { object::<ProviderKey>(reference, "key reference") }?;
        key.duplicate(KeySelection::ALL)
    }))
}

/// Answer bits, security bits and max size
pub unsafe extern "C" fn get_params(keydata: *mut c_void, params: *mut OSSL_PARAM) -> c_int {
    super::status(guard("keymgmt get_params", || {
        // SAFETY: keydata was produced by this table
        let key = unsafe { object::<ProviderKey>(keydata, "key") }?;
        let key_params = key.params()?;
        let answers = [
            (names::PKEY_BITS, i64::from(key_params.bits)),
            (names::PKEY_SECURITY_BITS, i64::from(key_params.security_bits)),
            (names::PKEY_MAX_SIZE, key_params.max_size as i64),
        ];
        for (name, value) in answers {
            // SAFETY: the host passes a terminated, writable array
            if let Some(param) = unsafe { locate(params, name) } {
                // SAFETY: as above
                unsafe { set_integer(param, value) }?;
            }
        }
        Ok(())
    }))
}

pub unsafe extern "C" fn gettable_params(_provctx: *mut c_void) -> *const OSSL_PARAM {
    GETTABLE_PARAMS.as_ptr()
}

/// Whether the key's native usage covers `selection`
pub unsafe extern "C" fn has(keydata: *const c_void, selection: c_int) -> c_int {
    flag(guard("keymgmt has", || {
        // SAFETY: keydata was produced by this table
        let key = unsafe { object::<ProviderKey>(keydata, "key") }?;
        Ok(key.has(KeySelection::from_bits(selection as u32)))
    }))
}

/// Deliver the public exponent and modulus through `callback`
pub unsafe extern "C" fn export(
    keydata: *mut c_void,
    selection: c_int,
    callback: Option<OSSL_CALLBACK>,
    callback_arg: *mut c_void,
) -> c_int {
    flag(guard("keymgmt export", || {
        // SAFETY: keydata was produced by this table
        let key = unsafe { object::<ProviderKey>(keydata, "key") }?;
        let callback =
            callback.ok_or_else(|| Error::InvalidParameter("null export callback".to_string()))?;
        let components = key.export_public(KeySelection::from_bits(selection as u32))?;

        let mut exponent = be_to_native(&components.public_exponent);
        let mut modulus = be_to_native(&components.modulus);
        let params = [
            param_construct(
                names::PKEY_RSA_E,
                ffi::OSSL_PARAM_UNSIGNED_INTEGER,
                exponent.as_mut_ptr().cast(),
                exponent.len(),
            ),
            param_construct(
                names::PKEY_RSA_N,
                ffi::OSSL_PARAM_UNSIGNED_INTEGER,
                modulus.as_mut_ptr().cast(),
                modulus.len(),
            ),
            ffi::OSSL_PARAM_END,
        ];
        // SAFETY: the parameter array and its buffers outlive the call
        Ok(unsafe { callback(params.as_ptr(), callback_arg) } != 0)
    }))
}

/// Replace the key with a public key built from `e` and `n`
pub unsafe extern "C" fn import(
    keydata: *mut c_void,
    selection: c_int,
    params: *const OSSL_PARAM,
) -> c_int {
    super::status(guard("keymgmt import", || {
        // SAFETY: keydata was produced by this table and is not shared
        let key = unsafe { object_mut::<ProviderKey>(keydata, "key") }?;
        // SAFETY: the host passes a terminated array
        let params = unsafe { from_raw(params) }?;
        key.import_public(KeySelection::from_bits(selection as u32), &params)
    }))
}

/// Parameters exchanged by import and export for `selection`
pub unsafe extern "C" fn key_types(selection: c_int) -> *const OSSL_PARAM {
    if KeySelection::from_bits(selection as u32).intersects(KeySelection::PUBLIC_KEY) {
        PUBLIC_KEY_TYPES.as_ptr()
    } else {
        std::ptr::null()
    }
}

/// Function table registered for `rsaEncryption`
pub(crate) fn functions() -> *const OSSL_DISPATCH {
    static TABLE: OnceLock<Table<OSSL_DISPATCH>> = OnceLock::new();
    TABLE
        .get_or_init(|| {
            dispatch_table(vec![
                dispatch!(ffi::OSSL_FUNC_KEYMGMT_NEW, new),
                dispatch!(ffi::OSSL_FUNC_KEYMGMT_FREE, free_key),
                dispatch!(ffi::OSSL_FUNC_KEYMGMT_DUP, dup),
                dispatch!(ffi::OSSL_FUNC_KEYMGMT_LOAD, load),
                dispatch!(ffi::OSSL_FUNC_KEYMGMT_GET_PARAMS, get_params),
                dispatch!(ffi::OSSL_FUNC_KEYMGMT_GETTABLE_PARAMS, gettable_params),
                dispatch!(ffi::OSSL_FUNC_KEYMGMT_HAS, has),
                dispatch!(ffi::OSSL_FUNC_KEYMGMT_EXPORT, export),
                dispatch!(ffi::OSSL_FUNC_KEYMGMT_EXPORT_TYPES, key_types),
                dispatch!(ffi::OSSL_FUNC_KEYMGMT_IMPORT, import),
                dispatch!(ffi::OSSL_FUNC_KEYMGMT_IMPORT_TYPES, key_types),
            ])
        })
        .as_ptr()
}

