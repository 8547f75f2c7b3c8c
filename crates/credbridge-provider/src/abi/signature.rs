//! Signature table

use super::{bytes, c_str, dispatch, dispatch_table, free, guard, into_raw, object, object_mut};
use super::{provider, status, ParamTable, Table};
use crate::error::{Error, Result};
use crate::ffi::{self, names, param_definition, OSSL_DISPATCH, OSSL_PARAM};
use crate::key::ProviderKey;
use crate::operation::SignatureOperations;
use crate::params::from_raw;
use crate::signature::SignatureContext;
use std::ffi::{c_char, c_int, c_void};
use std::sync::OnceLock;

/// Context type stored behind the host's pointer. The host keeps every key
/// it initializes a context with alive for the life of that context.
type HostContext = SignatureContext<'static>;

static SETTABLE_CTX_PARAMS: ParamTable<9> = ParamTable([
    param_definition(names::SIGNATURE_DIGEST, ffi::OSSL_PARAM_UTF8_STRING),
    param_definition(names::SIGNATURE_PROPERTIES, ffi::OSSL_PARAM_UTF8_STRING),
    param_definition(names::SIGNATURE_PAD_MODE, ffi::OSSL_PARAM_UTF8_STRING),
    param_definition(names::SIGNATURE_PAD_MODE, ffi::OSSL_PARAM_INTEGER),
    param_definition(names::SIGNATURE_MGF1_DIGEST, ffi::OSSL_PARAM_UTF8_STRING),
    param_definition(names::SIGNATURE_MGF1_PROPERTIES, ffi::OSSL_PARAM_UTF8_STRING),
    param_definition(names::SIGNATURE_PSS_SALTLEN, ffi::OSSL_PARAM_UTF8_STRING),
    param_definition(names::SIGNATURE_PSS_SALTLEN, ffi::OSSL_PARAM_INTEGER),
    ffi::OSSL_PARAM_END,
]);

static SETTABLE_CTX_MD_PARAMS: ParamTable<1> = ParamTable([ffi::OSSL_PARAM_END]);

unsafe fn context<'a>(ctx: *mut c_void) -> Result<&'a mut HostContext> {
    // SAFETY: ctx was produced by this table and the host does not share it
    // across concurrent calls
    unsafe { object_mut::<HostContext>(ctx, "signature context") }
}

pub unsafe extern "C" fn new_ctx(provctx: *mut c_void, _propq: *const c_char) -> *mut c_void {
    into_raw(guard("signature newctx", || {
        // SAFETY: the host passes back the context from provider init
        let context: HostContext = unsafe { provider(provctx) }?.new_signature_context();
        Ok(context)
    }))
}

/// Independent copy of a context, with its own hash and key
pub unsafe extern "C" fn dup_ctx(ctx: *mut c_void) -> *mut c_void {
    into_raw(guard("signature dupctx", || {
        // SAFETY: ctx was produced by this table
        let context = unsafe { object::<HostContext>(ctx, "signature context") }?;
        let copy: HostContext = context.try_clone()?;
        Ok(copy)
    }))
}

pub unsafe extern "C" fn free_ctx(ctx: *mut c_void) {
    // SAFETY: ctx was produced by this table
    guard("signature freectx", || Ok(unsafe { free::<HostContext>(ctx) }));
}

unsafe fn init(
    ctx: *mut c_void,
    digest_name: *const c_char,
    key: *mut c_void,
    params: *const OSSL_PARAM,
    sign: bool,
) -> Result<()> {
    // SAFETY: forwarded caller contract
    let context = unsafe { context(ctx) }?;
    // SAFETY: the host passes a NUL-terminated digest name
    let digest_name = unsafe { c_str(digest_name, "digest name") }?;
    // SAFETY: key was produced by the key management table and outlives the
    // context it is bound to
    let key = unsafe { object::<ProviderKey>(key, "key") }?;
    // SAFETY: the host passes a terminated array
    let params = unsafe { from_raw(params) }?;
    if sign {
        context.init_sign(digest_name, key, Some(&params))
    } else {
        context.init_verify(digest_name, key, Some(&params))
    }
}

pub unsafe extern "C" fn digest_sign_init(
    ctx: *mut c_void,
    digest_name: *const c_char,
    key: *mut c_void,
    params: *const OSSL_PARAM,
) -> c_int {
    // SAFETY: pointers come from the host per the table contract
    status(guard("digest_sign_init", || unsafe {
        init(ctx, digest_name, key, params, true)
    }))
}

pub unsafe extern "C" fn digest_verify_init(
    ctx: *mut c_void,
    digest_name: *const c_char,
    key: *mut c_void,
    params: *const OSSL_PARAM,
) -> c_int {
    // SAFETY: pointers come from the host per the table contract
    status(guard("digest_verify_init", || unsafe {
        init(ctx, digest_name, key, params, false)
    }))
}

/// Feed data into the context's hash; shared by sign and verify
pub unsafe extern "C" fn digest_update(ctx: *mut c_void, data: *const u8, len: usize) -> c_int {
    status(guard("digest update", || {
        if data.is_null() {
            return Err(Error::InvalidParameter("null data".to_string()));
        }
        // SAFETY: ctx was produced by this table
        let context = unsafe { context(ctx) }?;
        // SAFETY: data holds len bytes
        context.update(unsafe { bytes(data, len, "data") }?)
    }))
}

/// Report the signature length when `sig` is null, otherwise sign into it
pub unsafe extern "C" fn digest_sign_final(
    ctx: *mut c_void,
    sig: *mut u8,
    sig_len: *mut usize,
    sig_size: usize,
) -> c_int {
    status(guard("digest_sign_final", || {
        // SAFETY: ctx was produced by this table
        let context = unsafe { context(ctx) }?;
        if sig_len.is_null() {
            return Err(Error::InvalidParameter("null signature length".to_string()));
        }
        let written = if sig.is_null() {
            context.signature_length()?
        } else {
            // SAFETY: sig is writable for sig_size bytes
            let out = unsafe { std::slice::from_raw_parts_mut(sig, sig_size) };
            context.finalize_sign(out)?
        };
        // SAFETY: checked non-null above
        unsafe { *sig_len = written };
        Ok(())
    }))
}

pub unsafe extern "C" fn digest_verify_final(
    ctx: *mut c_void,
    sig: *const u8,
    sig_len: usize,
) -> c_int {
    status(guard("digest_verify_final", || {
        // SAFETY: ctx was produced by this table
        let context = unsafe { context(ctx) }?;
        if sig.is_null() || sig_len == 0 {
            return Err(Error::InvalidParameter("empty signature".to_string()));
        }
        // SAFETY: sig holds sig_len bytes
        context.finalize_verify(unsafe { bytes(sig, sig_len, "signature") }?)
    }))
}

pub unsafe extern "C" fn set_ctx_params(ctx: *mut c_void, params: *const OSSL_PARAM) -> c_int {
    status(guard("signature set_ctx_params", || {
        // SAFETY: ctx was produced by this table
        let context = unsafe { context(ctx) }?;
        if params.is_null() {
            return context.set_params(None);
        }
        // SAFETY: the host passes a terminated array
        let params = unsafe { from_raw(params) }?;
        context.set_params(Some(&params))
    }))
}

pub unsafe extern "C" fn settable_ctx_params(
    _ctx: *mut c_void,
    _provctx: *mut c_void,
) -> *const OSSL_PARAM {
    SETTABLE_CTX_PARAMS.as_ptr()
}

/// Digest parameters are not forwarded to the native hash
pub unsafe extern "C" fn set_ctx_md_params(ctx: *mut c_void, _params: *const OSSL_PARAM) -> c_int {
    c_int::from(!ctx.is_null())
}

pub unsafe extern "C" fn settable_ctx_md_params(_ctx: *mut c_void) -> *const OSSL_PARAM {
    SETTABLE_CTX_MD_PARAMS.as_ptr()
}

/// Function table registered for `RSA:rsaEncryption`
pub(crate) fn functions() -> *const OSSL_DISPATCH {
    static TABLE: OnceLock<Table<OSSL_DISPATCH>> = OnceLock::new();
    TABLE
        .get_or_init(|| {
            dispatch_table(vec![
                dispatch!(ffi::OSSL_FUNC_SIGNATURE_NEWCTX, new_ctx),
                dispatch!(ffi::OSSL_FUNC_SIGNATURE_DUPCTX, dup_ctx),
                dispatch!(ffi::OSSL_FUNC_SIGNATURE_FREECTX, free_ctx),
                dispatch!(ffi::OSSL_FUNC_SIGNATURE_DIGEST_SIGN_INIT, digest_sign_init),
                dispatch!(ffi::OSSL_FUNC_SIGNATURE_DIGEST_SIGN_UPDATE, digest_update),
                dispatch!(ffi::OSSL_FUNC_SIGNATURE_DIGEST_SIGN_FINAL, digest_sign_final),
                dispatch!(ffi::OSSL_FUNC_SIGNATURE_DIGEST_VERIFY_INIT, digest_verify_init),
                dispatch!(ffi::OSSL_FUNC_SIGNATURE_DIGEST_VERIFY_UPDATE, digest_update),
                dispatch!(ffi::OSSL_FUNC_SIGNATURE_DIGEST_VERIFY_FINAL, digest_verify_final),
                dispatch!(ffi::OSSL_FUNC_SIGNATURE_SET_CTX_PARAMS, set_ctx_params),
                dispatch!(ffi::OSSL_FUNC_SIGNATURE_SETTABLE_CTX_PARAMS, settable_ctx_params),
                dispatch!(ffi::OSSL_FUNC_SIGNATURE_SET_CTX_MD_PARAMS, set_ctx_md_params),
                dispatch!(ffi::OSSL_FUNC_SIGNATURE_SETTABLE_CTX_MD_PARAMS, settable_ctx_md_params),
            ])
        })
        .as_ptr()
}
