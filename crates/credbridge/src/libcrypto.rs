//! [`LibraryHost`] over the system libcrypto (OpenSSL 3)

#![allow(non_camel_case_types)]

use crate::context::LibraryHost;
use crate::error::{Error, Result};
use credbridge_provider::ffi::OSSL_provider_init_fn;
use std::ffi::{c_char, c_int, CString};
use std::ptr::NonNull;

#[repr(C)]
pub struct OSSL_LIB_CTX {
    _private: [u8; 0],
}

#[repr(C)]
pub struct OSSL_PROVIDER {
    _private: [u8; 0],
}

#[link(name = "crypto")]
extern "C" {
    fn OSSL_LIB_CTX_new() -> *mut OSSL_LIB_CTX;
    fn OSSL_LIB_CTX_free(ctx: *mut OSSL_LIB_CTX);
    fn OSSL_PROVIDER_add_builtin(
        ctx: *mut OSSL_LIB_CTX,
        name: *const c_char,
        init: OSSL_provider_init_fn,
    ) -> c_int;
    fn OSSL_PROVIDER_load(ctx: *mut OSSL_LIB_CTX, name: *const c_char) -> *mut OSSL_PROVIDER;
    fn OSSL_PROVIDER_unload(provider: *mut OSSL_PROVIDER) -> c_int;
}

/// Owned `OSSL_LIB_CTX`, freed through [`ProviderContext`](crate::ProviderContext)
#[derive(Debug)]
pub struct LibraryContextHandle(NonNull<OSSL_LIB_CTX>);

impl LibraryContextHandle {
    /// Raw pointer for `*_ex` functions taking a library context
    pub fn as_ptr(&self) -> *mut OSSL_LIB_CTX {
        self.0.as_ptr()
    }
}

/// Loaded `OSSL_PROVIDER`
#[derive(Debug)]
pub struct ProviderHandle(NonNull<OSSL_PROVIDER>);

fn c_name(name: &str) -> Result<CString> {
    CString::new(name).map_err(|_| Error::Host(format!("provider name {:?} contains NUL", name)))
}

/// The system libcrypto
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenSslHost;

impl LibraryHost for OpenSslHost {
    type LibraryContext = LibraryContextHandle;
    type Provider = ProviderHandle;

    fn new_library_context(&self) -> Result<LibraryContextHandle> {
        // SAFETY: no preconditions
        let ctx = unsafe { OSSL_LIB_CTX_new() };
        NonNull::new(ctx)
            .map(LibraryContextHandle)
            .ok_or_else(|| Error::Host("OSSL_LIB_CTX_new failed".to_string()))
    }

    fn add_builtin(
        &self,
        context: &LibraryContextHandle,
        name: &str,
        init: OSSL_provider_init_fn,
    ) -> Result<()> {
        let name = c_name(name)?;
        // SAFETY: context is live and name is NUL terminated; libcrypto copies the name
        let added = unsafe { OSSL_PROVIDER_add_builtin(context.as_ptr(), name.as_ptr(), init) };
        if added != 1 {
            return Err(Error::Host(format!(
                "OSSL_PROVIDER_add_builtin({}) failed",
                name.to_string_lossy()
            )));
        }
        Ok(())
    }

    fn load_provider(&self, context: &LibraryContextHandle, name: &str) -> Result<ProviderHandle> {
        let c_name = c_name(name)?;
        // SAFETY: context is live and the name is NUL terminated
        let provider = unsafe { OSSL_PROVIDER_load(context.as_ptr(), c_name.as_ptr()) };
        NonNull::new(provider)
            .map(ProviderHandle)
            .ok_or_else(|| Error::Host(format!("OSSL_PROVIDER_load({}) failed", name)))
    }

    fn unload_provider(&self, provider: ProviderHandle) {
        // SAFETY: provider came from OSSL_PROVIDER_load and is unloaded once
        if unsafe { OSSL_PROVIDER_unload(provider.0.as_ptr()) } != 1 {
            tracing::warn!("OSSL_PROVIDER_unload failed");
        }
    }

    fn free_library_context(&self, context: LibraryContextHandle) {
        // SAFETY: every provider loaded into the context is unloaded already
        unsafe { OSSL_LIB_CTX_free(context.as_ptr()) }
    }
}
