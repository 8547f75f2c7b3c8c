//! Windows CNG and CryptoAPI backend
//!
//! Keys live in NCrypt key-storage providers, hashes are computed by BCrypt
//! and certificates come from the CryptoAPI system stores. Public key blobs
//! cross this boundary with big-endian integers and are converted to the
//! bridge layout with [`reverse_blob_integers`].

use crate::error::{Error, Result};
use crate::{
    decode_dword_property, CertificateCursor, CertificateStore, KeyStorage, NativeHash, NativeKey,
    Platform, SignaturePadding,
};
use credbridge_crypto::reverse_blob_integers;
use credbridge_types::HashAlgorithm;
use std::ffi::c_void;
use std::mem::ManuallyDrop;
use std::ptr;
use std::sync::Arc;
use windows_sys::Win32::Security::Cryptography::{
    BCryptCloseAlgorithmProvider, BCryptCreateHash, BCryptDestroyHash, BCryptDuplicateHash,
    BCryptFinishHash, BCryptHashData, BCryptOpenAlgorithmProvider, CertCloseStore,
    CertDuplicateStore, CertEnumCertificatesInStore, CertFreeCertificateContext, CertOpenStore,
    CryptAcquireCertificatePrivateKey, CryptReleaseContext, NCryptExportKey, NCryptFreeObject,
    NCryptGetProperty, NCryptImportKey, NCryptOpenKey, NCryptOpenStorageProvider, NCryptSignHash,
    NCryptVerifySignature, BCRYPT_ALG_HANDLE, BCRYPT_HASH_HANDLE, BCRYPT_PKCS1_PADDING_INFO,
    BCRYPT_PSS_PADDING_INFO, CERT_CONTEXT, HCERTSTORE, NCRYPT_HANDLE, NCRYPT_KEY_HANDLE,
    NCRYPT_PROV_HANDLE,
};

const MS_KEY_STORAGE_PROVIDER: &str = "Microsoft Software Key Storage Provider";
const RSA_PUBLIC_BLOB: &str = "RSAPUBLICBLOB";

const LENGTH_PROPERTY: &str = "Length";
const KEY_USAGE_PROPERTY: &str = "Key Usage";
const ALGORITHM_GROUP_PROPERTY: &str = "Algorithm Group";
const NAME_PROPERTY: &str = "Name";
const KEY_TYPE_PROPERTY: &str = "Key Type";
const PROVIDER_HANDLE_PROPERTY: &str = "Provider Handle";

const MACHINE_KEY_FLAG: u32 = 0x0000_0020;
const SILENT_FLAG: u32 = 0x0000_0040;
const PAD_PKCS1: u32 = 0x0000_0002;
const PAD_PSS: u32 = 0x0000_0008;

const X509_ASN_ENCODING: u32 = 0x0000_0001;
const CERT_STORE_PROV_SYSTEM_W: usize = 10;
const CERT_SYSTEM_STORE_CURRENT_USER: u32 = 0x0001_0000;
const CERT_SYSTEM_STORE_LOCAL_MACHINE: u32 = 0x0002_0000;
const CERT_STORE_OPEN_EXISTING_FLAG: u32 = 0x0000_4000;
const CERT_STORE_READONLY_FLAG: u32 = 0x0000_8000;

const ACQUIRE_PREFER_NCRYPT_KEY_FLAG: u32 = 0x0002_0000;
const ACQUIRE_SILENT_FLAG: u32 = 0x0000_0040;
const CERT_NCRYPT_KEY_SPEC: u32 = 0xFFFF_FFFF;

/// `NTE_BAD_KEYSET`: no key is bound to the certificate
const NTE_BAD_KEYSET: u32 = 0x8009_0016;
/// `CRYPT_E_NO_KEY_PROPERTY`
const CRYPT_E_NO_KEY_PROPERTY: u32 = 0x8009_2004;

fn wide(value: &str) -> Vec<u16> {
    value.encode_utf16().chain(std::iter::once(0)).collect()
}

fn check(operation: &'static str, status: i32) -> Result<()> {
    if status == 0 {
        Ok(())
    } else {
        Err(Error::Native {
            operation,
            status: status as u32,
        })
    }
}

fn last_error(operation: &'static str) -> Error {
    Error::Native {
        operation,
        status: std::io::Error::last_os_error()
            .raw_os_error()
            .map(|code| code as u32)
            .unwrap_or(0),
    }
}

/// CNG and CryptoAPI backed platform
#[derive(Debug, Default, Clone)]
pub struct CngPlatform {
    /// Open the current user's stores instead of the local machine's
    current_user: bool,
}

impl CngPlatform {
    /// Platform reading the local machine certificate stores
    pub fn new() -> Self {
        Self::default()
    }

    /// Platform reading the current user's certificate stores
    pub fn current_user() -> Self {
        Self { current_user: true }
    }
}

impl Platform for CngPlatform {
    fn open_key_storage(&self) -> Result<Box<dyn KeyStorage>> {
        let name = wide(MS_KEY_STORAGE_PROVIDER);
        let mut handle: NCRYPT_PROV_HANDLE = 0;
        // SAFETY: out pointer and NUL-terminated name are valid for the call
        let status = unsafe { NCryptOpenStorageProvider(&mut handle, name.as_ptr(), 0) };
        check("NCryptOpenStorageProvider", status)?;
        Ok(Box::new(CngKeyStorage { handle }))
    }

    fn create_hash(&self, algorithm: HashAlgorithm) -> Result<Box<dyn NativeHash>> {
        let provider = Arc::new(HashProvider::open(algorithm)?);
        let mut handle: BCRYPT_HASH_HANDLE = ptr::null_mut();
        // SAFETY: null hash object buffer lets BCrypt allocate it
        let status = unsafe {
            BCryptCreateHash(
                provider.handle,
                &mut handle,
                ptr::null_mut(),
                0,
                ptr::null(),
                0,
                0,
            )
        };
        check("BCryptCreateHash", status)?;
        Ok(Box::new(CngHash {
            algorithm,
            provider,
            handle,
            finished: false,
        }))
    }

    fn open_certificate_store(&self, name: &str) -> Result<Box<dyn CertificateStore>> {
        let location = if self.current_user {
            CERT_SYSTEM_STORE_CURRENT_USER
        } else {
            CERT_SYSTEM_STORE_LOCAL_MACHINE
        };
        let wide_name = wide(name);
        // SAFETY: the system store provider takes a NUL-terminated UTF-16 name
        let handle = unsafe {
            CertOpenStore(
                CERT_STORE_PROV_SYSTEM_W as _,
                X509_ASN_ENCODING,
                0,
                location | CERT_STORE_OPEN_EXISTING_FLAG | CERT_STORE_READONLY_FLAG,
                wide_name.as_ptr() as *const c_void,
            )
        };
        if handle.is_null() {
            tracing::debug!("CertOpenStore failed for {}", name);
            return Err(Error::StoreNotFound(name.to_string()));
        }
        Ok(Box::new(CngCertificateStore { handle }))
    }
}

struct CngKeyStorage {
    handle: NCRYPT_PROV_HANDLE,
}

impl KeyStorage for CngKeyStorage {
    fn import_public_blob(&self, blob: &[u8]) -> Result<Box<dyn NativeKey>> {
        let native_blob = reverse_blob_integers(blob)?;
        let blob_type = wide(RSA_PUBLIC_BLOB);
        let mut key: NCRYPT_KEY_HANDLE = 0;
        // SAFETY: blob and blob type outlive the call, key is an out pointer
        let status = unsafe {
            NCryptImportKey(
                self.handle,
                0,
                blob_type.as_ptr(),
                ptr::null(),
                &mut key,
                native_blob.as_ptr(),
                native_blob.len() as u32,
                0,
            )
        };
        check("NCryptImportKey", status)?;
        Ok(Box::new(CngKey { handle: key }))
    }
}

impl Drop for CngKeyStorage {
    fn drop(&mut self) {
        // SAFETY: handle was opened by NCryptOpenStorageProvider
        unsafe { NCryptFreeObject(self.handle as NCRYPT_HANDLE) };
    }
}

#[derive(Debug)]
struct CngKey {
    handle: NCRYPT_KEY_HANDLE,
}

// NCrypt key handles may be used from any thread
unsafe impl Send for CngKey {}

impl CngKey {
    fn property(&self, name: &str) -> Result<Vec<u8>> {
        let property = wide(name);
        let mut size = 0u32;
        // SAFETY: size query with a null output buffer
        let status = unsafe {
            NCryptGetProperty(
                self.handle as NCRYPT_HANDLE,
                property.as_ptr(),
                ptr::null_mut(),
                0,
                &mut size,
                0,
            )
        };
        check("NCryptGetProperty", status)?;

        let mut value = vec![0u8; size as usize];
        // SAFETY: value holds `size` bytes
        let status = unsafe {
            NCryptGetProperty(
                self.handle as NCRYPT_HANDLE,
                property.as_ptr(),
                value.as_mut_ptr(),
                size,
                &mut size,
                0,
            )
        };
        check("NCryptGetProperty", status)?;
        value.truncate(size as usize);
        Ok(value)
    }

    fn property_u32(&self, name: &str) -> Result<u32> {
        decode_dword_property(name, &self.property(name)?)
    }

    fn property_string(&self, name: &str) -> Result<Vec<u16>> {
        let value = self.property(name)?;
        let mut units: Vec<u16> = value
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        if units.last() != Some(&0) {
            units.push(0);
        }
        Ok(units)
    }
}

fn hash_id(digest: HashAlgorithm) -> Vec<u16> {
    wide(digest.native_id())
}

impl NativeKey for CngKey {
    fn length_bits(&self) -> Result<u32> {
        self.property_u32(LENGTH_PROPERTY)
    }

    fn usage_flags(&self) -> Result<u32> {
        self.property_u32(KEY_USAGE_PROPERTY)
    }

    fn algorithm_group(&self) -> Result<String> {
        let units = self.property_string(ALGORITHM_GROUP_PROPERTY)?;
        let end = units.iter().position(|u| *u == 0).unwrap_or(units.len());
        Ok(String::from_utf16_lossy(&units[..end]))
    }

    fn export_public_blob(&self) -> Result<Vec<u8>> {
        let blob_type = wide(RSA_PUBLIC_BLOB);
        let mut size = 0u32;
        // SAFETY: size query with a null output buffer
        let status = unsafe {
            NCryptExportKey(
                self.handle,
                0,
                blob_type.as_ptr(),
                ptr::null(),
                ptr::null_mut(),
                0,
                &mut size,
                0,
            )
        };
        check("NCryptExportKey", status)?;

        let mut blob = vec![0u8; size as usize];
        // SAFETY: blob holds `size` bytes
        let status = unsafe {
            NCryptExportKey(
                self.handle,
                0,
                blob_type.as_ptr(),
                ptr::null(),
                blob.as_mut_ptr(),
                size,
                &mut size,
                0,
            )
        };
        check("NCryptExportKey", status)?;
        blob.truncate(size as usize);
        Ok(reverse_blob_integers(&blob)?)
    }

    fn reopen(&self) -> Result<Box<dyn NativeKey>> {
        let name = self.property_string(NAME_PROPERTY)?;
        let key_type = self.property_u32(KEY_TYPE_PROPERTY).unwrap_or(0);
        let provider_bytes = self.property(PROVIDER_HANDLE_PROPERTY)?;
        let provider_bytes: [u8; std::mem::size_of::<NCRYPT_PROV_HANDLE>()] = provider_bytes
            .as_slice()
            .try_into()
            .map_err(|_| Error::InvalidParameter("unexpected provider handle size".to_string()))?;
        let provider = NCRYPT_PROV_HANDLE::from_ne_bytes(provider_bytes);

        let flags = (key_type & MACHINE_KEY_FLAG) | SILENT_FLAG;
        let mut key: NCRYPT_KEY_HANDLE = 0;
        // SAFETY: provider handle was returned by the key's own property
        let status = unsafe { NCryptOpenKey(provider, &mut key, name.as_ptr(), 0, flags) };
        // SAFETY: the provider handle property hands out an owned reference
        unsafe { NCryptFreeObject(provider as NCRYPT_HANDLE) };
        check("NCryptOpenKey", status)?;
        Ok(Box::new(CngKey { handle: key }))
    }

    fn sign_hash(
        &self,
        padding: Option<SignaturePadding>,
        hash: &[u8],
        signature: Option<&mut [u8]>,
    ) -> Result<usize> {
        let algorithm;
        let pkcs1;
        let pss;
        let (info, flags): (*const c_void, u32) = match padding {
            Some(SignaturePadding::Pkcs1 { digest }) => {
                algorithm = hash_id(digest);
                pkcs1 = BCRYPT_PKCS1_PADDING_INFO {
                    pszAlgId: algorithm.as_ptr(),
                };
                (&pkcs1 as *const _ as *const c_void, PAD_PKCS1)
            }
            Some(SignaturePadding::Pss {
                digest,
                salt_length,
            }) => {
                algorithm = hash_id(digest);
                pss = BCRYPT_PSS_PADDING_INFO {
                    pszAlgId: algorithm.as_ptr(),
                    cbSalt: salt_length,
                };
                (&pss as *const _ as *const c_void, PAD_PSS)
            }
            None => (ptr::null(), 0),
        };

        let (out, capacity) = match signature {
            Some(out) => (out.as_mut_ptr(), out.len() as u32),
            None => (ptr::null_mut(), 0),
        };
        let mut written = 0u32;
        // SAFETY: padding info and its algorithm string live until the call returns
        let status = unsafe {
            NCryptSignHash(
                self.handle,
                info,
                hash.as_ptr(),
                hash.len() as u32,
                out,
                capacity,
                &mut written,
                flags,
            )
        };
        check("NCryptSignHash", status)?;
        Ok(written as usize)
    }

    fn verify_signature(
        &self,
        padding: SignaturePadding,
        hash: &[u8],
        signature: &[u8],
    ) -> Result<()> {
        let algorithm;
        let pkcs1;
        let pss;
        let (info, flags): (*const c_void, u32) = match padding {
            SignaturePadding::Pkcs1 { digest } => {
                algorithm = hash_id(digest);
                pkcs1 = BCRYPT_PKCS1_PADDING_INFO {
                    pszAlgId: algorithm.as_ptr(),
                };
                (&pkcs1 as *const _ as *const c_void, PAD_PKCS1)
            }
            SignaturePadding::Pss {
                digest,
                salt_length,
            } => {
                algorithm = hash_id(digest);
                pss = BCRYPT_PSS_PADDING_INFO {
                    pszAlgId: algorithm.as_ptr(),
                    cbSalt: salt_length,
                };
                (&pss as *const _ as *const c_void, PAD_PSS)
            }
        };
        // SAFETY: padding info and its algorithm string live until the call returns
        let status = unsafe {
            NCryptVerifySignature(
                self.handle,
                info,
                hash.as_ptr(),
                hash.len() as u32,
                signature.as_ptr(),
                signature.len() as u32,
                flags,
            )
        };
        check("NCryptVerifySignature", status)
            .map_err(|e| Error::Verification(e.to_string()))
    }
}

impl Drop for CngKey {
    fn drop(&mut self) {
        // SAFETY: each CngKey owns its handle
        unsafe { NCryptFreeObject(self.handle as NCRYPT_HANDLE) };
    }
}

#[derive(Debug)]
struct HashProvider {
    handle: BCRYPT_ALG_HANDLE,
}

// BCrypt algorithm handles are thread safe once opened
unsafe impl Send for HashProvider {}
unsafe impl Sync for HashProvider {}

impl HashProvider {
    fn open(algorithm: HashAlgorithm) -> Result<Self> {
        let id = wide(algorithm.native_id());
        let mut handle: BCRYPT_ALG_HANDLE = ptr::null_mut();
        // SAFETY: out pointer and NUL-terminated id are valid for the call
        let status = unsafe { BCryptOpenAlgorithmProvider(&mut handle, id.as_ptr(), ptr::null(), 0) };
        check("BCryptOpenAlgorithmProvider", status)?;
        Ok(Self { handle })
    }
}

impl Drop for HashProvider {
    fn drop(&mut self) {
        // SAFETY: handle came from BCryptOpenAlgorithmProvider
        unsafe { BCryptCloseAlgorithmProvider(self.handle, 0) };
    }
}

#[derive(Debug)]
struct CngHash {
    algorithm: HashAlgorithm,
    /// Kept alive for as long as any hash created from it
    provider: Arc<HashProvider>,
    handle: BCRYPT_HASH_HANDLE,
    finished: bool,
}

unsafe impl Send for CngHash {}

impl NativeHash for CngHash {
    fn hash_length(&self) -> Result<usize> {
        Ok(self.algorithm.digest_size())
    }

    fn update(&mut self, data: &[u8]) -> Result<()> {
        if self.finished {
            return Err(Error::InvalidState("hash already finished".to_string()));
        }
        // SAFETY: data is valid for its length
        let status = unsafe { BCryptHashData(self.handle, data.as_ptr(), data.len() as u32, 0) };
        check("BCryptHashData", status)
    }

    fn finish(&mut self, out: &mut [u8]) -> Result<()> {
        if self.finished {
            return Err(Error::InvalidState("hash already finished".to_string()));
        }
        // SAFETY: out is exactly the digest size or BCrypt rejects it
        let status =
            unsafe { BCryptFinishHash(self.handle, out.as_mut_ptr(), out.len() as u32, 0) };
        check("BCryptFinishHash", status)?;
        self.finished = true;
        Ok(())
    }

    fn duplicate(&self) -> Result<Box<dyn NativeHash>> {
        if self.finished {
            return Err(Error::InvalidState("hash already finished".to_string()));
        }
        let mut handle: BCRYPT_HASH_HANDLE = ptr::null_mut();
        // SAFETY: null hash object buffer lets BCrypt allocate it
        let status =
            unsafe { BCryptDuplicateHash(self.handle, &mut handle, ptr::null_mut(), 0, 0) };
        check("BCryptDuplicateHash", status)?;
        Ok(Box::new(CngHash {
            algorithm: self.algorithm,
            provider: Arc::clone(&self.provider),
            handle,
            finished: false,
        }))
    }
}

impl Drop for CngHash {
    fn drop(&mut self) {
        // SAFETY: each CngHash owns its handle
        unsafe { BCryptDestroyHash(self.handle) };
    }
}

struct CngCertificateStore {
    handle: HCERTSTORE,
}

unsafe impl Send for CngCertificateStore {}

impl CertificateStore for CngCertificateStore {
    fn cursor(&self) -> Result<Box<dyn CertificateCursor>> {
        // SAFETY: duplicating bumps the store's reference count
        let store = unsafe { CertDuplicateStore(self.handle) };
        Ok(Box::new(CngCursor {
            store,
            current: ptr::null(),
            exhausted: false,
        }))
    }

    fn close(self: Box<Self>) -> Result<()> {
        let this = ManuallyDrop::new(*self);
        let handle = this.handle;
        // SAFETY: handle came from CertOpenStore and is closed once
        if unsafe { CertCloseStore(handle, 0) } == 0 {
            return Err(last_error("CertCloseStore"));
        }
        Ok(())
    }
}

impl Drop for CngCertificateStore {
    fn drop(&mut self) {
        // SAFETY: handle came from CertOpenStore and is closed once
        unsafe { CertCloseStore(self.handle, 0) };
    }
}

struct CngCursor {
    store: HCERTSTORE,
    current: *const CERT_CONTEXT,
    exhausted: bool,
}

unsafe impl Send for CngCursor {}

impl CertificateCursor for CngCursor {
    fn advance(&mut self) -> bool {
        if self.exhausted {
            return false;
        }
        // SAFETY: enumeration frees the previous context it is handed
        let next = unsafe { CertEnumCertificatesInStore(self.store, self.current) };
        self.current = next;
        if next.is_null() {
            self.exhausted = true;
        }
        !next.is_null()
    }

    fn encoded(&self) -> Option<&[u8]> {
        if self.current.is_null() {
            return None;
        }
        // SAFETY: current is a live context owned by this cursor
        unsafe {
            let context = &*self.current;
            Some(std::slice::from_raw_parts(
                context.pbCertEncoded,
                context.cbCertEncoded as usize,
            ))
        }
    }

    fn acquire_private_key(&self) -> Result<Option<Box<dyn NativeKey>>> {
        if self.current.is_null() {
            return Ok(None);
        }
        let mut handle = 0usize;
        let mut key_spec = 0u32;
        let mut caller_frees = 0i32;
        // SAFETY: current is a live context and every out pointer is valid
        let acquired = unsafe {
            CryptAcquireCertificatePrivateKey(
                self.current,
                ACQUIRE_PREFER_NCRYPT_KEY_FLAG | ACQUIRE_SILENT_FLAG,
                ptr::null(),
                &mut handle,
                &mut key_spec,
                &mut caller_frees,
            )
        };
        if acquired == 0 {
            let error = last_error("CryptAcquireCertificatePrivateKey");
            return match error {
                Error::Native { status, .. }
                    if status == NTE_BAD_KEYSET || status == CRYPT_E_NO_KEY_PROPERTY =>
                {
                    Ok(None)
                }
                e => Err(e),
            };
        }

        if key_spec != CERT_NCRYPT_KEY_SPEC {
            tracing::debug!("Skipping legacy CryptoAPI key bound to certificate");
            if caller_frees != 0 {
                // SAFETY: legacy provider handle owned by the caller
                unsafe { CryptReleaseContext(handle, 0) };
            }
            return Ok(None);
        }

        let key = CngKey { handle };
        if caller_frees != 0 {
            return Ok(Some(Box::new(key)));
        }
        // A cached handle belongs to the certificate context; hand out an
        // owned handle to the same key instead.
        let reopened = key.reopen();
        std::mem::forget(key);
        reopened.map(Some)
    }
}

impl Drop for CngCursor {
    fn drop(&mut self) {
        // SAFETY: both were acquired by this cursor
        unsafe {
            if !self.current.is_null() {
                CertFreeCertificateContext(self.current);
            }
            CertCloseStore(self.store, 0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_close_after_enumeration() {
        let platform = CngPlatform::new();
        for _ in 0..3 {
            let store = platform.open_certificate_store("Root").unwrap();
            {
                let mut cursor = store.cursor().unwrap();
                cursor.advance();
            }
            store.close().unwrap();
        }
    }

    #[test]
    fn test_missing_store_fails_to_open() {
        let platform = CngPlatform::new();
        assert!(platform
            .open_certificate_store("credbridge-no-such-store")
            .is_err());
    }
}
