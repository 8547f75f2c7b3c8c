//! Store loader table for `cng://` URIs

use super::{c_str, dispatch, dispatch_table, free, guard, into_raw, object, object_mut};
use super::{provider, status, Table};
use crate::error::{Error, Result};
use crate::ffi::{
    self, names, param_construct, OSSL_CALLBACK, OSSL_DISPATCH, OSSL_PASSPHRASE_CALLBACK,
};
use crate::key::ProviderKey;
use crate::operation::StoreLoader;
use crate::store::{Store, StoreObject};
use std::ffi::{c_char, c_int, c_void, CString};
use std::sync::OnceLock;

pub unsafe extern "C" fn open(provctx: *mut c_void, uri: *const c_char) -> *mut c_void {
    into_raw(guard("store open", || {
        // SAFETY: the host passes back the context from provider init
        let provider = unsafe { provider(provctx) }?;
        // SAFETY: the host passes a NUL-terminated URI
        let uri = unsafe { c_str(uri, "store URI") }?;
        provider.open_store(uri)
    }))
}

/// Deliver one object through `object_callback`
///
/// Certificates are passed by value as encoded data. Private keys are passed
/// as a reference that stays valid until the next load or close; the host
/// turns it into its own key with the key management `load` function.
pub unsafe extern "C" fn load(
    ctx: *mut c_void,
    object_callback: Option<OSSL_CALLBACK>,
    object_callback_arg: *mut c_void,
    _passphrase_callback: Option<OSSL_PASSPHRASE_CALLBACK>,
    _passphrase_callback_arg: *mut c_void,
) -> c_int {
    status(guard("store load", || {
        // SAFETY: ctx was produced by this table
        let store = unsafe { object_mut::<Store>(ctx, "store") }?;
        let callback = object_callback
            .ok_or_else(|| Error::InvalidParameter("null object callback".to_string()))?;

        let loaded = store.load(|object| {
            // SAFETY: the callback receives a terminated array valid for the call
            match deliver(object, |params| unsafe { callback(params, object_callback_arg) }) {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::debug!("Failed to deliver store object: {}", e);
                    false
                }
            }
        });
        if loaded {
            Ok(())
        } else {
            Err(Error::InvalidState("no object delivered".to_string()))
        }
    }))
}

fn deliver(
    object: StoreObject<'_>,
    callback: impl FnOnce(*const ffi::OSSL_PARAM) -> c_int,
) -> Result<bool> {
    let accepted = match object {
        StoreObject::Certificate(encoded) => {
            let mut object_type: c_int = ffi::OSSL_OBJECT_CERT;
            let params = [
                param_construct(
                    names::OBJECT_TYPE,
                    ffi::OSSL_PARAM_INTEGER,
                    std::ptr::addr_of_mut!(object_type).cast(),
                    std::mem::size_of::<c_int>(),
                ),
                param_construct(
                    names::OBJECT_DATA,
                    ffi::OSSL_PARAM_OCTET_STRING,
                    encoded.as_ptr().cast_mut().cast(),
                    encoded.len(),
                ),
                ffi::OSSL_PARAM_END,
            ];
            callback(params.as_ptr())
        }
        StoreObject::PrivateKey { data_type, key } => {
            let mut object_type: c_int = ffi::OSSL_OBJECT_PKEY;
            let data_type = CString::new(data_type)
                .map_err(|_| Error::InvalidParameter("key data type".to_string()))?;
            let reference: *const ProviderKey = key;
            let params = [
                param_construct(
                    names::OBJECT_TYPE,
                    ffi::OSSL_PARAM_INTEGER,
                    std::ptr::addr_of_mut!(object_type).cast(),
                    std::mem::size_of::<c_int>(),
                ),
                param_construct(
                    names::OBJECT_DATA_TYPE,
                    ffi::OSSL_PARAM_UTF8_STRING,
                    data_type.as_ptr().cast_mut().cast(),
                    data_type.as_bytes().len(),
                ),
                param_construct(
                    names::OBJECT_REFERENCE,
                    ffi::OSSL_PARAM_OCTET_STRING,
                    reference.cast_mut().cast(),
                    std::mem::size_of::<*const ProviderKey>(),
                ),
                ffi::OSSL_PARAM_END,
            ];
            callback(params.as_ptr())
        }
    };
    Ok(accepted != 0)
}

pub unsafe extern "C" fn eof(ctx: *mut c_void) -> c_int {
    if ctx.is_null() {
        return 1;
    }
    let at_eof = guard("store eof", || {
        // SAFETY: ctx was produced by this table
        Ok(unsafe { object::<Store>(ctx, "store") }?.is_at_eof())
    });
    c_int::from(at_eof.unwrap_or(true))
}

/// Close the store and release the loader context
pub unsafe extern "C" fn close(ctx: *mut c_void) -> c_int {
    if ctx.is_null() {
        return 1;
    }
    status(guard("store close", || {
        // SAFETY: ctx was produced by this table
        let closed = unsafe { object_mut::<Store>(ctx, "store") }?.close();
        // SAFETY: ctx is not used after this call
        unsafe { free::<Store>(ctx) };
        closed
    }))
}

/// Function table registered for the `cng` scheme
pub(crate) fn functions() -> *const OSSL_DISPATCH {
    static TABLE: OnceLock<Table<OSSL_DISPATCH>> = OnceLock::new();
    TABLE
        .get_or_init(|| {
            dispatch_table(vec![
                dispatch!(ffi::OSSL_FUNC_STORE_OPEN, open),
                dispatch!(ffi::OSSL_FUNC_STORE_LOAD, load),
                dispatch!(ffi::OSSL_FUNC_STORE_EOF, eof),
                dispatch!(ffi::OSSL_FUNC_STORE_CLOSE, close),
            ])
        })
        .as_ptr()
}
