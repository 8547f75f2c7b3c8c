//! Provider entry points, metadata and algorithm tables

use crate::abi::{self, dispatch, dispatch_table, Table};
use crate::error::{Error, Result};
use crate::ffi::{
    self, OSSL_ALGORITHM, OSSL_CORE_HANDLE, OSSL_DISPATCH, OSSL_provider_init_fn,
};
use crate::operation::Provider;
use credbridge_native::Platform;
use std::ffi::{c_int, c_void, CStr};
use std::sync::{Arc, OnceLock};

pub const PROVIDER_NAME: &CStr = c"CNG Provider";
pub const PROVIDER_VERSION: &CStr = c"0.0.1";
pub const PROVIDER_BUILDINFO: &CStr = c"0.0.1";
pub const PROVIDER_STATUS: i64 = 1;

/// Property definition carried by every algorithm, used in property queries
pub const PROPERTY_DEFINITION: &CStr = c"provider=cng_provider";

/// Store loader scheme
pub const STORE_ALGORITHM: &CStr = c"cng";
/// Key management algorithm names
pub const KEYMGMT_ALGORITHM: &CStr = c"rsaEncryption";
/// Signature algorithm names
pub const SIGNATURE_ALGORITHM: &CStr = c"RSA:rsaEncryption";

fn algorithm_table(
    names: &'static CStr,
    implementation: *const OSSL_DISPATCH,
    description: &'static CStr,
) -> Table<OSSL_ALGORITHM> {
    Table(vec![
        OSSL_ALGORITHM {
            algorithm_names: names.as_ptr(),
            property_definition: PROPERTY_DEFINITION.as_ptr(),
            implementation,
            algorithm_description: description.as_ptr(),
        },
        ffi::OSSL_ALGORITHM_END,
    ])
}

/// Algorithm table offered for a host operation id
pub fn algorithms(operation: c_int) -> Option<*const OSSL_ALGORITHM> {
    static STORE: OnceLock<Table<OSSL_ALGORITHM>> = OnceLock::new();
    static KEYMGMT: OnceLock<Table<OSSL_ALGORITHM>> = OnceLock::new();
    static SIGNATURE: OnceLock<Table<OSSL_ALGORITHM>> = OnceLock::new();

    let table = match operation {
        ffi::OSSL_OP_STORE => STORE.get_or_init(|| {
            algorithm_table(
                STORE_ALGORITHM,
                abi::store::functions(),
                c"CNG Provider Implementation",
            )
        }),
        ffi::OSSL_OP_KEYMGMT => KEYMGMT.get_or_init(|| {
            algorithm_table(
                KEYMGMT_ALGORITHM,
                abi::keymgmt::functions(),
                c"RSA Implementation backed by Windows CNG",
            )
        }),
        ffi::OSSL_OP_SIGNATURE => SIGNATURE.get_or_init(|| {
            algorithm_table(
                SIGNATURE_ALGORITHM,
                abi::signature::functions(),
                c"RSA signature implementation backed by Windows CNG",
            )
        }),
        _ => return None,
    };
    Some(table.as_ptr())
}

/// Provider-level function table returned from init
pub fn provider_functions() -> *const OSSL_DISPATCH {
    static TABLE: OnceLock<Table<OSSL_DISPATCH>> = OnceLock::new();
    TABLE
        .get_or_init(|| {
            dispatch_table(vec![
                dispatch!(ffi::OSSL_FUNC_PROVIDER_TEARDOWN, abi::provider::teardown),
                dispatch!(ffi::OSSL_FUNC_PROVIDER_GETTABLE_PARAMS, abi::provider::gettable_params),
                dispatch!(ffi::OSSL_FUNC_PROVIDER_GET_PARAMS, abi::provider::get_params),
                dispatch!(ffi::OSSL_FUNC_PROVIDER_QUERY_OPERATION, abi::provider::query_operation),
            ])
        })
        .as_ptr()
}

/// Hand the provider tables and a fresh provider context over `platform` to
/// the host.
///
/// # Safety
///
/// `out` and `provctx` must be writable. The context written to `provctx` is
/// released by the teardown function in the returned table.
pub unsafe fn init_provider(
    platform: Arc<dyn Platform>,
    out: *mut *const OSSL_DISPATCH,
    provctx: *mut *mut c_void,
) -> Result<()> {
    if out.is_null() || provctx.is_null() {
        return Err(Error::InvalidParameter("null provider init output".to_string()));
    }
    let provider = Box::new(Provider::new(platform));
    // SAFETY: both outputs are writable per the caller contract
    unsafe {
        *provctx = Box::into_raw(provider).cast();
        *out = provider_functions();
    }
    tracing::debug!("Initialized {}", PROVIDER_NAME.to_string_lossy());
    Ok(())
}

/// Provider init over the default platform, for registration as a built-in
pub unsafe extern "C" fn credbridge_provider_init(
    _handle: *const OSSL_CORE_HANDLE,
    _in: *const OSSL_DISPATCH,
    out: *mut *const OSSL_DISPATCH,
    provctx: *mut *mut c_void,
) -> c_int {
    abi::status(abi::guard("provider init", || {
        let platform = credbridge_native::default_platform();
        // SAFETY: the host passes writable outputs
        unsafe { init_provider(platform, out, provctx) }
    }))
}

/// [`credbridge_provider_init`] as the function pointer hosts register
pub fn provider_init_fn() -> OSSL_provider_init_fn {
    credbridge_provider_init
}

/// Module entry point for hosts loading the library as a provider module
#[cfg(feature = "module")]
#[no_mangle]
#[allow(non_snake_case)]
pub unsafe extern "C" fn OSSL_provider_init(
    handle: *const OSSL_CORE_HANDLE,
    r#in: *const OSSL_DISPATCH,
    out: *mut *const OSSL_DISPATCH,
    provctx: *mut *mut c_void,
) -> c_int {
    // SAFETY: forwarded host contract
    unsafe { credbridge_provider_init(handle, r#in, out, provctx) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_algorithm_tables() {
        for operation in [ffi::OSSL_OP_STORE, ffi::OSSL_OP_KEYMGMT, ffi::OSSL_OP_SIGNATURE] {
            let table = algorithms(operation).unwrap();
            // SAFETY: tables are terminated and 'static
            let first = unsafe { &*table };
            assert!(!first.implementation.is_null());
            assert_eq!(
                unsafe { CStr::from_ptr(first.property_definition) },
                PROPERTY_DEFINITION
            );
            assert!(unsafe { (*table.add(1)).algorithm_names.is_null() });
        }
        for operation in [ffi::OSSL_OP_DIGEST, ffi::OSSL_OP_CIPHER, ffi::OSSL_OP_KEYEXCH, 99] {
            assert!(algorithms(operation).is_none());
        }
    }

    #[test]
    fn test_init_rejects_null_outputs() {
        let platform: Arc<dyn Platform> =
            Arc::new(credbridge_native::SoftwarePlatform::builder().build());
        assert!(unsafe { init_provider(platform, std::ptr::null_mut(), std::ptr::null_mut()) }
            .is_err());
    }
}
