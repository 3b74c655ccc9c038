//! The wasm sandbox a plugin's `entryPoint` module runs inside: no ambient
//! filesystem or network access, a wall-clock timeout enforced via epoch
//! interruption, and a hard memory ceiling enforced via `StoreLimits`. Every
//! host API call the guest makes crosses through a single imported
//! function, so the permission gate in [`crate::host::HostApi`] sees every
//! call regardless of which operation the guest requests.

use std::sync::OnceLock;
use std::time::Duration;

use archon_core::{codes, ArchonError};
use serde::{de::DeserializeOwned, Serialize};
use wasmtime::{Caller, Engine, Instance, Linker, Module, Store, StoreLimits, StoreLimitsBuilder, TypedFunc};

use crate::host::HostApi;

const ABI_VERSION: i32 = 1;

const EXPORT_MEMORY: &str = "memory";
const EXPORT_ALLOC: &str = "archon_plugin_alloc";
const EXPORT_FREE: &str = "archon_plugin_free";
const EXPORT_ABI_VERSION: &str = "archon_plugin_abi_version";
const EXPORT_INVOKE: &str = "archon_plugin_invoke";

const IMPORT_MODULE: &str = "env";
const IMPORT_HOST_CALL: &str = "archon_host_call";

const EPOCH_TICK: Duration = Duration::from_millis(1);

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_MAX_MEMORY_BYTES: u64 = 256 * 1024 * 1024;
const DEFAULT_MAX_REQUEST_BYTES: usize = 8 * 1024 * 1024;
const DEFAULT_MAX_RESPONSE_BYTES: usize = 8 * 1024 * 1024;

fn engine() -> &'static Engine {
    static ENGINE: OnceLock<Engine> = OnceLock::new();
    ENGINE.get_or_init(|| {
        let mut config = wasmtime::Config::new();
        config.epoch_interruption(true);
        config.static_memory_maximum_size(0);
        config.static_memory_guard_size(0);
        config.dynamic_memory_guard_size(0);
        config.dynamic_memory_reserved_for_growth(DEFAULT_MAX_MEMORY_BYTES);

        let engine = Engine::new(&config).expect("wasmtime Engine construction should not fail");

        let ticker_engine = engine.clone();
        std::thread::Builder::new()
            .name("archon-plugin-epoch".to_string())
            .spawn(move || loop {
                std::thread::sleep(EPOCH_TICK);
                ticker_engine.increment_epoch();
            })
            .expect("spawning the wasmtime epoch ticker thread should not fail");

        engine
    })
}

fn timeout_to_epoch_deadline(timeout: Duration) -> u64 {
    let timeout_ms = timeout.as_millis();
    let tick_ms = EPOCH_TICK.as_millis().max(1);
    u64::try_from(timeout_ms.div_ceil(tick_ms).max(1)).unwrap_or(u64::MAX)
}

fn pack_ptr_len(ptr: u32, len: u32) -> i64 {
    ((len as u64) << 32 | (ptr as u64)) as i64
}

fn unpack_ptr_len(v: i64) -> (u32, u32) {
    let v = v as u64;
    ((v & 0xFFFF_FFFF) as u32, (v >> 32) as u32)
}

#[derive(Clone, Debug)]
pub struct SandboxConfig {
    pub timeout: Duration,
    pub max_memory_bytes: u64,
    pub max_request_bytes: usize,
    pub max_response_bytes: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_memory_bytes: DEFAULT_MAX_MEMORY_BYTES,
            max_request_bytes: DEFAULT_MAX_REQUEST_BYTES,
            max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
        }
    }
}

struct StoreState {
    limits: StoreLimits,
    host: *const HostApi,
}

// SAFETY: the raw pointer is only dereferenced for the lifetime of a single
// `invoke` call, during which the referent (`host: &HostApi`) is guaranteed
// to outlive the wasmtime `Store` that holds it.
unsafe impl Send for StoreState {}

impl StoreState {
    fn new(config: &SandboxConfig, host: *const HostApi) -> Self {
        let max_memory_bytes = usize::try_from(config.max_memory_bytes).unwrap_or(usize::MAX);
        let limits = StoreLimitsBuilder::new().memory_size(max_memory_bytes).build();
        Self { limits, host }
    }
}

fn new_store(config: &SandboxConfig, host: *const HostApi) -> Store<StoreState> {
    let mut store = Store::new(engine(), StoreState::new(config, host));
    store.limiter(|state| &mut state.limits);
    store.set_epoch_deadline(timeout_to_epoch_deadline(config.timeout));
    store
}

fn classify_call_error(err: wasmtime::Error) -> ArchonError {
    let msg = err.to_string();
    let mut haystack = msg.to_ascii_lowercase();
    haystack.push('\n');
    haystack.push_str(&format!("{err:?}").to_ascii_lowercase());

    if haystack.contains("interrupt") || haystack.contains("epoch") || haystack.contains("deadline") {
        ArchonError::new(codes::PLUGIN_RESOURCE, format!("plugin exceeded its wall-clock timeout: {msg}"))
    } else if haystack.contains("memory") && haystack.contains("limit") {
        ArchonError::new(codes::PLUGIN_RESOURCE, format!("plugin exceeded its memory cap: {msg}"))
    } else {
        ArchonError::new(codes::PLUGIN_RESOURCE, format!("plugin trapped: {msg}"))
    }
}

/// A host-to-guest call made during `archon_host_call`: the guest sends a
/// method name and a JSON payload, and gets back a JSON result or error.
#[derive(Debug, serde::Deserialize)]
struct GuestHostCall {
    method: String,
    #[serde(default)]
    params: serde_json::Value,
}

#[derive(Debug, serde::Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum HostCallOutcome {
    Ok { value: serde_json::Value },
    Err { code: String, message: String },
}

fn dispatch_host_call(host: &HostApi, call: GuestHostCall) -> HostCallOutcome {
    let result: Result<serde_json::Value, ArchonError> = (|| {
        Ok(match call.method.as_str() {
            "get_node" => ser(host.get_node(str_param(&call.params, "id")?)?)?,
            "list_children" => ser(host.list_children(str_param(&call.params, "id")?)?)?,
            "query" => {
                let selector = str_param(&call.params, "selector")?;
                let limit = usize_param(&call.params, "limit").unwrap_or(50);
                ser(host.query(selector, limit)?)?
            }
            "apply_mutations" => {
                let mutations = serde_json::from_value(call.params.get("mutations").cloned().unwrap_or_default())
                    .map_err(json_err)?;
                host.apply_mutations(mutations)?;
                serde_json::Value::Null
            }
            "commit" => {
                host.commit(str_param(&call.params, "message")?)?;
                serde_json::Value::Null
            }
            "snapshot" => {
                host.snapshot(str_param(&call.params, "message")?)?;
                serde_json::Value::Null
            }
            "index_put" => {
                host.index_put(str_param(&call.params, "nodeId")?, str_param(&call.params, "content")?)?;
                serde_json::Value::Null
            }
            "net_request" => {
                let request = serde_json::from_value(call.params.clone()).map_err(json_err)?;
                ser(host.net_request(request)?)?
            }
            "secrets_get" => ser(host.secrets_get(str_param(&call.params, "name")?)?)?,
            "secrets_list" => {
                ser(host.secrets_list(str_param(&call.params, "prefix").unwrap_or(""))?)?
            }
            "register_command" => {
                host.register_command(str_param(&call.params, "commandId")?, str_param(&call.params, "title")?)?;
                serde_json::Value::Null
            }
            "show_panel" => {
                host.show_panel(str_param(&call.params, "panelId")?, str_param(&call.params, "title")?)?;
                serde_json::Value::Null
            }
            "show_modal" => {
                host.show_modal(str_param(&call.params, "title")?, str_param(&call.params, "body")?)?;
                serde_json::Value::Null
            }
            "notify" => {
                host.notify(str_param(&call.params, "message")?)?;
                serde_json::Value::Null
            }
            other => {
                return Err(ArchonError::new(codes::POLICY_NOT_IMPLEMENTED, format!("unknown host method {other:?}")))
            }
        })
    })();

    match result {
        Ok(value) => HostCallOutcome::Ok { value },
        Err(e) => HostCallOutcome::Err { code: e.code, message: e.message },
    }
}

fn str_param<'a>(params: &'a serde_json::Value, key: &str) -> Result<&'a str, ArchonError> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ArchonError::new(codes::PLUGIN_MANIFEST_INVALID, format!("missing string param {key:?}")))
}

fn usize_param(params: &serde_json::Value, key: &str) -> Option<usize> {
    params.get(key).and_then(|v| v.as_u64()).map(|v| v as usize)
}

fn json_err(e: serde_json::Error) -> ArchonError {
    ArchonError::new(codes::PLUGIN_MANIFEST_INVALID, format!("invalid json payload: {e}"))
}

fn ser(value: impl Serialize) -> Result<serde_json::Value, ArchonError> {
    serde_json::to_value(value)
        .map_err(|e| ArchonError::new(codes::PLUGIN_LOAD_FAILED, format!("failed to serialize host response: {e}")))
}

#[derive(Debug)]
pub enum SandboxLoadError {
    Compile(String),
    Instantiate(String),
    MissingExport(&'static str),
    AbiVersionMismatch { expected: i32, found: i32 },
}

impl std::fmt::Display for SandboxLoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SandboxLoadError::Compile(msg) => write!(f, "failed to compile plugin module: {msg}"),
            SandboxLoadError::Instantiate(msg) => write!(f, "failed to instantiate plugin module: {msg}"),
            SandboxLoadError::MissingExport(name) => write!(f, "missing required export: {name}"),
            SandboxLoadError::AbiVersionMismatch { expected, found } => {
                write!(f, "unsupported plugin ABI version {found} (expected {expected})")
            }
        }
    }
}

impl std::error::Error for SandboxLoadError {}

impl From<SandboxLoadError> for ArchonError {
    fn from(err: SandboxLoadError) -> Self {
        ArchonError::new(codes::PLUGIN_LOAD_FAILED, err.to_string())
    }
}

/// A compiled, capability-probed plugin module ready to be invoked
/// repeatedly (each call gets a fresh `Store`, so one plugin can be
/// invoked concurrently from multiple host threads).
pub struct PluginModule {
    id: String,
    module: Module,
    config: SandboxConfig,
}

impl PluginModule {
    pub fn compile(id: impl Into<String>, wasm_bytes: &[u8], config: SandboxConfig) -> Result<Self, SandboxLoadError> {
        let id = id.into();
        let module = Module::new(engine(), wasm_bytes).map_err(|e| {
            tracing::warn!(plugin_id = %id, error = %e, "failed to compile plugin module");
            SandboxLoadError::Compile(e.to_string())
        })?;
        probe(&id, &module, &config)?;
        Ok(Self { id, module, config })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    fn linker(&self) -> Linker<StoreState> {
        let mut linker = Linker::new(engine());
        linker
            .func_wrap(IMPORT_MODULE, IMPORT_HOST_CALL, host_call_trampoline)
            .expect("registering archon_host_call should not fail");
        linker
    }

    /// Invokes the guest's single dispatch export with a JSON request,
    /// returning its JSON response. Any host API call the guest makes
    /// during this invocation is routed through `host` and permission
    /// checked there.
    pub fn invoke<Req: Serialize, Resp: DeserializeOwned>(
        &self,
        host: &HostApi,
        request: &Req,
    ) -> Result<Resp, ArchonError> {
        let req_bytes = serde_json::to_vec(request).map_err(json_err)?;
        if req_bytes.len() > self.config.max_request_bytes {
            return Err(ArchonError::new(
                codes::PLUGIN_RESOURCE,
                format!("request too large ({} bytes > {} bytes)", req_bytes.len(), self.config.max_request_bytes),
            ));
        }

        let host_ptr: *const HostApi = host;
        let mut store = new_store(&self.config, host_ptr);
        let instance = self
            .linker()
            .instantiate(&mut store, &self.module)
            .map_err(|e| ArchonError::new(codes::PLUGIN_LOAD_FAILED, format!("failed to instantiate: {e}")))?;

        let resp_bytes = call_invoke(&mut store, &instance, &self.config, &req_bytes)?;
        serde_json::from_slice(&resp_bytes).map_err(json_err)
    }
}

fn call_invoke(
    store: &mut Store<StoreState>,
    instance: &Instance,
    config: &SandboxConfig,
    req_bytes: &[u8],
) -> Result<Vec<u8>, ArchonError> {
    let memory = instance
        .get_memory(&mut *store, EXPORT_MEMORY)
        .ok_or_else(|| ArchonError::new(codes::PLUGIN_LOAD_FAILED, format!("missing export {EXPORT_MEMORY}")))?;
    let alloc: TypedFunc<i32, i32> = instance
        .get_typed_func(&mut *store, EXPORT_ALLOC)
        .map_err(|_| ArchonError::new(codes::PLUGIN_LOAD_FAILED, format!("missing export {EXPORT_ALLOC}")))?;
    let free: TypedFunc<(i32, i32), ()> = instance
        .get_typed_func(&mut *store, EXPORT_FREE)
        .map_err(|_| ArchonError::new(codes::PLUGIN_LOAD_FAILED, format!("missing export {EXPORT_FREE}")))?;
    let invoke: TypedFunc<(i32, i32), i64> = instance
        .get_typed_func(&mut *store, EXPORT_INVOKE)
        .map_err(|_| ArchonError::new(codes::PLUGIN_LOAD_FAILED, format!("missing export {EXPORT_INVOKE}")))?;

    let req_len = i32::try_from(req_bytes.len()).unwrap_or(i32::MAX);
    let req_ptr = alloc.call(&mut *store, req_len).map_err(classify_call_error)?;
    memory
        .write(&mut *store, req_ptr as u32 as usize, req_bytes)
        .map_err(|e| ArchonError::new(codes::PLUGIN_RESOURCE, format!("failed to write request into guest memory: {e}")))?;

    let ret = invoke.call(&mut *store, (req_ptr, req_len)).map_err(classify_call_error)?;
    let _ = free.call(&mut *store, (req_ptr, req_len));

    let (resp_ptr, resp_len) = unpack_ptr_len(ret);
    if resp_len == 0 {
        return Ok(Vec::new());
    }
    let resp_len_usize = resp_len as usize;
    if resp_len_usize > config.max_response_bytes {
        return Err(ArchonError::new(
            codes::PLUGIN_RESOURCE,
            format!("response too large ({resp_len_usize} bytes > {} bytes)", config.max_response_bytes),
        ));
    }

    let data = memory.data(&mut *store);
    let start = resp_ptr as usize;
    let end = start.saturating_add(resp_len_usize);
    let bytes = data
        .get(start..end)
        .ok_or_else(|| ArchonError::new(codes::PLUGIN_RESOURCE, "guest returned an out-of-bounds response"))?
        .to_vec();

    let _ = free.call(&mut *store, (resp_ptr as i32, resp_len as i32));
    Ok(bytes)
}

/// The `env.archon_host_call` import: the guest passes `(ptr, len)` of a
/// JSON-encoded [`GuestHostCall`], and gets back a packed `(ptr, len)`
/// pointing at a JSON-encoded [`HostCallOutcome`], allocated via the
/// guest's own `archon_plugin_alloc` so ownership rules stay symmetric with
/// the host-to-guest direction.
fn host_call_trampoline(mut caller: Caller<'_, StoreState>, ptr: i32, len: i32) -> i64 {
    let host = caller.data().host;
    // SAFETY: see the comment on `StoreState::host`.
    let host = unsafe { &*host };

    let memory = match caller.get_export(EXPORT_MEMORY).and_then(|e| e.into_memory()) {
        Some(memory) => memory,
        None => return 0,
    };
    let data = memory.data(&caller);
    let start = ptr as usize;
    let end = start.saturating_add(len as usize);
    let Some(bytes) = data.get(start..end) else { return 0 };
    let bytes = bytes.to_vec();

    let outcome = match serde_json::from_slice::<GuestHostCall>(&bytes) {
        Ok(call) => dispatch_host_call(host, call),
        Err(e) => HostCallOutcome::Err { code: codes::PLUGIN_MANIFEST_INVALID.to_string(), message: e.to_string() },
    };
    let resp_bytes = serde_json::to_vec(&outcome).unwrap_or_default();

    let alloc: TypedFunc<i32, i32> = match caller.get_export(EXPORT_ALLOC).and_then(|e| e.into_func()) {
        Some(f) => match f.typed(&caller) {
            Ok(f) => f,
            Err(_) => return 0,
        },
        None => return 0,
    };
    let resp_len = i32::try_from(resp_bytes.len()).unwrap_or(i32::MAX);
    let resp_ptr = match alloc.call(&mut caller, resp_len) {
        Ok(p) => p,
        Err(_) => return 0,
    };
    if memory.write(&mut caller, resp_ptr as u32 as usize, &resp_bytes).is_err() {
        return 0;
    }

    pack_ptr_len(resp_ptr as u32, resp_len as u32)
}

fn probe(id: &str, module: &Module, config: &SandboxConfig) -> Result<(), SandboxLoadError> {
    let host: *const HostApi = std::ptr::null();
    let mut store = new_store(config, host);
    let linker = {
        let mut linker = Linker::new(engine());
        linker
            .func_wrap(IMPORT_MODULE, IMPORT_HOST_CALL, host_call_trampoline)
            .expect("registering archon_host_call should not fail");
        linker
    };
    let instance = linker.instantiate(&mut store, module).map_err(|e| {
        tracing::warn!(plugin_id = %id, error = %e, "failed to instantiate plugin module for probing");
        SandboxLoadError::Instantiate(e.to_string())
    })?;

    instance.get_memory(&mut store, EXPORT_MEMORY).ok_or(SandboxLoadError::MissingExport(EXPORT_MEMORY))?;
    instance
        .get_typed_func::<i32, i32>(&mut store, EXPORT_ALLOC)
        .map_err(|_| SandboxLoadError::MissingExport(EXPORT_ALLOC))?;
    instance
        .get_typed_func::<(i32, i32), ()>(&mut store, EXPORT_FREE)
        .map_err(|_| SandboxLoadError::MissingExport(EXPORT_FREE))?;
    instance
        .get_typed_func::<(i32, i32), i64>(&mut store, EXPORT_INVOKE)
        .map_err(|_| SandboxLoadError::MissingExport(EXPORT_INVOKE))?;

    let abi_version: TypedFunc<(), i32> = instance
        .get_typed_func(&mut store, EXPORT_ABI_VERSION)
        .map_err(|_| SandboxLoadError::MissingExport(EXPORT_ABI_VERSION))?;
    let found = abi_version.call(&mut store, ()).map_err(|e| SandboxLoadError::Instantiate(e.to_string()))?;
    if found != ABI_VERSION {
        return Err(SandboxLoadError::AbiVersionMismatch { expected: ABI_VERSION, found });
    }

    Ok(())
}
