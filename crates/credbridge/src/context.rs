//! Process-wide provider context
//!
//! A [`ProviderContext`] owns a private library context of the crypto host
//! with the native provider registered as a built-in and loaded next to a
//! baseline provider. TLS stacks fetch algorithms from that library context
//! so that signatures with native keys are routed to the provider.

use crate::config::ProviderConfig;
use crate::error::Result;
use credbridge_provider::ffi::OSSL_provider_init_fn;
use std::fmt;
use std::mem::ManuallyDrop;

/// The lifecycle calls a crypto library host offers for providers
pub trait LibraryHost {
    /// Handle to an isolated library context
    type LibraryContext;
    /// Handle to a provider loaded into a library context
    type Provider;

    /// Allocate a fresh library context
    fn new_library_context(&self) -> Result<Self::LibraryContext>;

    /// Register `init` as a built-in provider named `name`
    fn add_builtin(
        &self,
        context: &Self::LibraryContext,
        name: &str,
        init: OSSL_provider_init_fn,
    ) -> Result<()>;

    /// Load a provider by name into `context`
    fn load_provider(&self, context: &Self::LibraryContext, name: &str) -> Result<Self::Provider>;

    /// Unload a provider returned by [`LibraryHost::load_provider`]
    fn unload_provider(&self, provider: Self::Provider);

    /// Free a library context whose providers are all unloaded
    fn free_library_context(&self, context: Self::LibraryContext);
}

/// A library context with the baseline and native providers loaded.
///
/// Construct it once per process. Dropping it unloads the native provider,
/// then the baseline provider, then frees the library context; no handle
/// obtained through it may be used afterwards.
pub struct ProviderContext<H: LibraryHost> {
    host: H,
    library_context: ManuallyDrop<H::LibraryContext>,
    baseline: Option<H::Provider>,
    native: Option<H::Provider>,
}

impl<H: LibraryHost> ProviderContext<H> {
    /// Set up a library context for `config`.
    ///
    /// Any step failing releases what was acquired before it.
    pub fn create(host: H, config: &ProviderConfig) -> Result<Self> {
        let library_context = host.new_library_context()?;
        let mut context = Self {
            host,
            library_context: ManuallyDrop::new(library_context),
            baseline: None,
            native: None,
        };

        context.host.add_builtin(
            &context.library_context,
            &config.provider_name,
            credbridge_provider::provider_init_fn(),
        )?;
        context.baseline = Some(
            context
                .host
                .load_provider(&context.library_context, &config.baseline_provider)?,
        );
        context.native = Some(
            context
                .host
                .load_provider(&context.library_context, &config.provider_name)?,
        );

        tracing::debug!(
            "Provider context ready ({} with {})",
            config.provider_name,
            config.baseline_provider
        );
        Ok(context)
    }

    /// The library context TLS stacks should fetch algorithms from
    pub fn library_context(&self) -> &H::LibraryContext {
        &self.library_context
    }

    /// The host the context was created with
    pub fn host(&self) -> &H {
        &self.host
    }
}

impl<H: LibraryHost> Drop for ProviderContext<H> {
    fn drop(&mut self) {
        if let Some(native) = self.native.take() {
            self.host.unload_provider(native);
        }
        if let Some(baseline) = self.baseline.take() {
            self.host.unload_provider(baseline);
        }
        // SAFETY: library_context is not touched again after this point
        let library_context = unsafe { ManuallyDrop::take(&mut self.library_context) };
        self.host.free_library_context(library_context);
    }
}

impl<H: LibraryHost> fmt::Debug for ProviderContext<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderContext")
            .field("baseline_loaded", &self.baseline.is_some())
            .field("native_loaded", &self.native.is_some())
            .finish_non_exhaustive()
    }
}
