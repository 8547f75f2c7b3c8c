//! Provider-level functions handed back from provider init

use super::{free, guard, status, ParamTable};
use crate::error::Error;
use crate::ffi::{self, names, param_definition, OSSL_ALGORITHM, OSSL_PARAM};
use crate::operation::Provider;
use crate::params::{locate, set_integer, set_utf8_ptr};
use crate::registration;
use std::ffi::{c_int, c_void};

static GETTABLE_PARAMS: ParamTable<5> = ParamTable([
    param_definition(names::PROV_NAME, ffi::OSSL_PARAM_UTF8_PTR),
    param_definition(names::PROV_VERSION, ffi::OSSL_PARAM_UTF8_PTR),
    param_definition(names::PROV_BUILDINFO, ffi::OSSL_PARAM_UTF8_PTR),
    param_definition(names::PROV_STATUS, ffi::OSSL_PARAM_INTEGER),
    ffi::OSSL_PARAM_END,
]);

/// Release the provider context
pub unsafe extern "C" fn teardown(provctx: *mut c_void) {
    // SAFETY: provctx is the context created by provider init and the host
    // calls teardown exactly once
    guard("provider teardown", || Ok(unsafe { free::<Provider>(provctx) }));
}

pub unsafe extern "C" fn gettable_params(_provctx: *mut c_void) -> *const OSSL_PARAM {
    GETTABLE_PARAMS.as_ptr()
}

/// Answer name, version, build info and status where requested
pub unsafe extern "C" fn get_params(_provctx: *mut c_void, params: *mut OSSL_PARAM) -> c_int {
    status(guard("provider get_params", || {
        if params.is_null() {
            return Err(Error::InvalidParameter("null parameter list".to_string()));
        }
        let strings = [
            (names::PROV_NAME, registration::PROVIDER_NAME),
            (names::PROV_VERSION, registration::PROVIDER_VERSION),
            (names::PROV_BUILDINFO, registration::PROVIDER_BUILDINFO),
        ];
        for (name, value) in strings {
            // SAFETY: the host passes a terminated, writable array
            if let Some(param) = unsafe { locate(params, name) } {
                // SAFETY: as above
                unsafe { set_utf8_ptr(param, value) }?;
            }
        }
        // SAFETY: as above
        if let Some(param) = unsafe { locate(params, names::PROV_STATUS) } {
            // SAFETY: as above
            unsafe { set_integer(param, registration::PROVIDER_STATUS) }?;
        }
        Ok(())
    }))
}

/// Algorithm table for `operation`, or null when it is not offered
pub unsafe extern "C" fn query_operation(
    _provctx: *mut c_void,
    operation: c_int,
    no_store: *mut c_int,
) -> *const OSSL_ALGORITHM {
    if !no_store.is_null() {
        // SAFETY: the host passes a writable flag
        unsafe { *no_store = 0 };
    }
    registration::algorithms(operation).unwrap_or(std::ptr::null())
}
