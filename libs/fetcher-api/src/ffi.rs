// ---------------------------------------------------------------------------
// Client plugin FFI
//
// Host and plugin are built by the same compiler in the same workspace, so
// passing Rust trait objects across the boundary is fine.
// ---------------------------------------------------------------------------

/// Current ABI version. Host checks this against the plugin's `fx_abi_version()`.
///
/// Bump whenever `StreamClient`, `StreamConsumer`, `DeliveryStream`, the
/// record types or the structs below change in a binary-incompatible way.
pub const FX_ABI_VERSION: u32 = 1;

/// FFI return struct from `fx_create_stream_client`.
#[repr(C)]
pub struct PluginCreateResult {
    /// Pointer to the created client (`Box<Box<dyn StreamClient>>`).
    /// Null if creation failed.
    pub plugin_ptr: *mut (),
    /// Pointer to a heap-allocated error string (`Box<String>`).
    /// Null if creation succeeded.
    pub error_ptr: *mut (),
}

// Safety: only moved between host and plugin during creation.
unsafe impl Send for PluginCreateResult {}

/// Type signature for the `fx_abi_version` symbol.
pub type AbiVersionFn = unsafe extern "C" fn() -> u32;

/// Type signature for the `fx_create_stream_client` symbol.
/// Receives the [`crate::ClientConfig`] serialized as JSON.
pub type CreateClientFn =
    unsafe extern "C" fn(config_json_ptr: *const u8, config_json_len: usize) -> PluginCreateResult;

/// Type signature for the `fx_destroy_stream_client` symbol.
pub type DestroyClientFn = unsafe extern "C" fn(plugin_ptr: *mut ());

/// Helper for plugins: return a created client.
pub fn plugin_ok<T: ?Sized>(val: Box<T>) -> PluginCreateResult {
    // Box<dyn Trait> is a fat pointer; double-box to get a thin one.
    let boxed: Box<Box<T>> = Box::new(val);
    PluginCreateResult {
        plugin_ptr: Box::into_raw(boxed) as *mut (),
        error_ptr: std::ptr::null_mut(),
    }
}

/// Helper for plugins: return a creation error.
pub fn plugin_err(error: String) -> PluginCreateResult {
    let boxed: Box<String> = Box::new(error);
    PluginCreateResult {
        plugin_ptr: std::ptr::null_mut(),
        error_ptr: Box::into_raw(boxed) as *mut (),
    }
}

/// Parse the client config passed over FFI.
///
/// # Safety
/// `config_json_ptr` must point to `config_json_len` valid bytes.
pub unsafe fn parse_client_config(
    config_json_ptr: *const u8,
    config_json_len: usize,
) -> Result<crate::ClientConfig, crate::ClientError> {
    let json_bytes = unsafe { std::slice::from_raw_parts(config_json_ptr, config_json_len) };
    let json_str = std::str::from_utf8(json_bytes)
        .map_err(|e| crate::ClientError::config(format!("invalid UTF-8 config: {e}")))?;
    crate::ClientConfig::from_json(json_str)
}

/// Macro: export `fx_abi_version`.
#[macro_export]
macro_rules! fx_abi_version_fn {
    () => {
        #[unsafe(no_mangle)]
        pub extern "C" fn fx_abi_version() -> u32 {
            $crate::ffi::FX_ABI_VERSION
        }
    };
}

/// Macro: export `fx_create_stream_client` + `fx_destroy_stream_client`
/// for a constructor `fn(ClientConfig) -> Result<T, ClientError>`.
///
/// ```ignore
/// fetcher_api::fx_stream_client_fns!(MyClient::connect);
/// ```
#[macro_export]
macro_rules! fx_stream_client_fns {
    ($ctor:path) => {
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn fx_create_stream_client(
            config_json_ptr: *const u8,
            config_json_len: usize,
        ) -> $crate::ffi::PluginCreateResult {
            let config = match unsafe { $crate::ffi::parse_client_config(config_json_ptr, config_json_len) } {
                Ok(c) => c,
                Err(e) => return $crate::ffi::plugin_err(e.to_string()),
            };
            match $ctor(config) {
                Ok(client) => {
                    let boxed: Box<dyn $crate::StreamClient> = Box::new(client);
                    $crate::ffi::plugin_ok(boxed)
                }
                Err(e) => $crate::ffi::plugin_err(e.to_string()),
            }
        }

        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn fx_destroy_stream_client(ptr: *mut ()) {
            if !ptr.is_null() {
                let _ = unsafe { Box::from_raw(ptr as *mut Box<dyn $crate::StreamClient>) };
            }
        }
    };
}
