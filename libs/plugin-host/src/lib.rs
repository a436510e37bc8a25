use std::future::Future;
use std::pin::Pin;

use libloading::{Library, Symbol};

use fetcher_api::{
    AbiVersionFn, ClientConfig, ClientError, CreateClientFn, FX_ABI_VERSION, PluginCreateResult,
    StreamClient, StreamConsumer, SubscriptionSpec,
};

// ---------------------------------------------------------------------------
// Plugin loading
// ---------------------------------------------------------------------------

/// Load a client plugin: check its ABI version, call `fx_create_stream_client`
/// and take ownership of the returned `Box<dyn StreamClient>`.
///
/// Returns (inner, library). Drop order matters: inner first.
fn load_client(plugin_path: &str, config_json: &str) -> Result<(Box<dyn StreamClient>, Library), ClientError> {
    let lib = unsafe { Library::new(plugin_path) }
        .map_err(|e| ClientError::config(format!("failed to load client plugin '{plugin_path}': {e}")))?;

    let version_fn: Symbol<AbiVersionFn> = unsafe { lib.get(b"fx_abi_version") }.map_err(|_| {
        ClientError::config(format!(
            "plugin '{plugin_path}' does not export 'fx_abi_version', not a fetcher client plugin"
        ))
    })?;
    let plugin_version = unsafe { version_fn() };
    if plugin_version != FX_ABI_VERSION {
        return Err(ClientError::config(format!(
            "ABI version mismatch for plugin '{plugin_path}': \
             plugin has version {plugin_version}, host expects {FX_ABI_VERSION}. \
             Rebuild the plugin."
        )));
    }

    let create_fn: Symbol<CreateClientFn> = unsafe { lib.get(b"fx_create_stream_client") }.map_err(|e| {
        ClientError::config(format!("symbol 'fx_create_stream_client' not found in '{plugin_path}': {e}"))
    })?;

    let result: PluginCreateResult = unsafe { create_fn(config_json.as_ptr(), config_json.len()) };

    if !result.error_ptr.is_null() {
        let error = unsafe { *Box::from_raw(result.error_ptr as *mut String) };
        return Err(ClientError::unavailable(format!("client plugin '{plugin_path}': {error}")));
    }

    if result.plugin_ptr.is_null() {
        return Err(ClientError::config(format!("plugin '{plugin_path}' returned null")));
    }

    let inner: Box<dyn StreamClient> = unsafe { *Box::from_raw(result.plugin_ptr as *mut Box<dyn StreamClient>) };
    Ok((inner, lib))
}

// ---------------------------------------------------------------------------
// PluginStreamClient
// ---------------------------------------------------------------------------

/// A messaging client provided by a dynamically loaded plugin.
///
/// Consumers, delivery streams and records handed out by the plugin carry
/// vtables that live in the library, so this wrapper must outlive them.
pub struct PluginStreamClient {
    inner: Option<Box<dyn StreamClient>>,
    path: String,
    _lib: Library,
}

impl PluginStreamClient {
    pub fn load(plugin_path: &str, config: &ClientConfig) -> Result<Self, ClientError> {
        let config_json = config.to_json()?;
        let (inner, lib) = load_client(plugin_path, &config_json)?;
        tracing::info!(plugin = %plugin_path, hosts = ?config.hosts, "loaded client plugin");
        Ok(Self {
            inner: Some(inner),
            path: plugin_path.to_string(),
            _lib: lib,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    #[inline]
    fn get(&self) -> Result<&dyn StreamClient, ClientError> {
        self.inner
            .as_deref()
            .ok_or_else(|| ClientError::unavailable("client plugin already unloaded"))
    }
}

impl Drop for PluginStreamClient {
    fn drop(&mut self) {
        // Drop inner first, while _lib (and the vtable) is still alive.
        self.inner.take();
    }
}

impl StreamClient for PluginStreamClient {
    fn create_subscription(
        &self,
        spec: &SubscriptionSpec,
    ) -> Pin<Box<dyn Future<Output = Result<(), ClientError>> + Send + '_>> {
        match self.get() {
            Ok(inner) => inner.create_subscription(spec),
            Err(e) => Box::pin(async move { Err(e) }),
        }
    }

    fn delete_subscription(
        &self,
        subscription_id: &str,
        force: bool,
    ) -> Pin<Box<dyn Future<Output = Result<(), ClientError>> + Send + '_>> {
        match self.get() {
            Ok(inner) => inner.delete_subscription(subscription_id, force),
            Err(e) => Box::pin(async move { Err(e) }),
        }
    }

    fn new_consumer(
        &self,
        consumer_name: &str,
        subscription_id: &str,
    ) -> Result<Box<dyn StreamConsumer>, ClientError> {
        self.get()?.new_consumer(consumer_name, subscription_id)
    }

    fn close(&self) -> Pin<Box<dyn Future<Output = Result<(), ClientError>> + Send + '_>> {
        match self.get() {
            Ok(inner) => inner.close(),
            Err(e) => Box::pin(async move { Err(e) }),
        }
    }
}
