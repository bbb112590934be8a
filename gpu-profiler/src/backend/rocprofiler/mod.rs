//! ROCm profiler SDK backend
//!
//! Contexts and counting services can only be configured while the SDK is
//! initializing its tools, so the registry is built from inside the tool
//! initialization hook: call [`discover`] instead of constructing the
//! backend directly.

mod bindings;

use super::{
    BackendError, BackendResult, ContextId, CounterId, CounterInfo, CounterRecord, DeviceId,
    DeviceInfo, DeviceKind, DimensionId, DimensionInfo, ProfileId, ProfileProvider,
    ProfilingBackend, RecordId,
};
use crate::error::{check, Result};
use crate::registry::SamplerRegistry;
use bindings::*;
use libc::{c_char, c_int, c_void, size_t};
use std::ffi::CStr;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

const CLIENT_NAME: &[u8] = b"gpuctr\0";

/// Registry built by the tool initialization hook
static REGISTRY: Mutex<Option<Result<SamplerRegistry>>> = Mutex::new(None);

/// Device counting service of the ROCm profiler SDK
pub struct RocprofilerBackend {
    /// Providers handed to the SDK as callback user data
    providers: Mutex<Vec<Box<ProfileProvider>>>,
}

impl RocprofilerBackend {
    fn new() -> Self {
        Self {
            providers: Mutex::new(Vec::new()),
        }
    }
}

/// Register with the profiler SDK and build one sampler per GPU agent
pub fn discover() -> Result<SamplerRegistry> {
    let forced = unsafe { rocprofiler_force_configure(Some(configure)) };
    check("force configure", status(forced))?;

    let hsa = unsafe { hsa_init() };
    if hsa != 0 {
        check(
            "hsa init",
            Err::<(), _>(BackendError::Status {
                code: hsa,
                message: "HSA runtime initialization failed".to_string(),
            }),
        )?;
    }

    REGISTRY
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take()
        .unwrap_or_else(|| {
            check(
                "tool initialization",
                Err(BackendError::Unavailable(
                    "profiler SDK never initialized the client".to_string(),
                )),
            )
        })
}

unsafe extern "C" fn configure(
    version: u32,
    runtime_version: *const c_char,
    priority: u32,
    id: *mut rocprofiler_client_id_t,
) -> *mut rocprofiler_tool_configure_result_t {
    if !id.is_null() {
        (*id).name = CLIENT_NAME.as_ptr() as *const c_char;
    }

    let major = version / 10000;
    let minor = (version % 10000) / 100;
    let patch = version % 100;
    info!(
        "gpuctr (priority={}) is using rocprofiler-sdk v{}.{}.{} ({})",
        priority,
        major,
        minor,
        patch,
        c_string(runtime_version)
    );

    Box::into_raw(Box::new(rocprofiler_tool_configure_result_t {
        size: std::mem::size_of::<rocprofiler_tool_configure_result_t>(),
        initialize: Some(tool_init),
        finalize: Some(tool_fini),
        tool_data: std::ptr::null_mut(),
    }))
}

unsafe extern "C" fn tool_init(_fini: rocprofiler_client_finalize_t, _data: *mut c_void) -> c_int {
    let registry = SamplerRegistry::discover(Arc::new(RocprofilerBackend::new()));
    let code = if registry.is_ok() { 0 } else { -1 };
    *REGISTRY.lock().unwrap_or_else(PoisonError::into_inner) = Some(registry);
    code
}

unsafe extern "C" fn tool_fini(_data: *mut c_void) {
    debug!("rocprofiler client finalized");
}

fn status(code: rocprofiler_status_t) -> BackendResult<()> {
    if code == ROCPROFILER_STATUS_SUCCESS {
        return Ok(());
    }
    let message = unsafe { c_string(rocprofiler_get_status_string(code)) };
    Err(BackendError::Status { code, message })
}

unsafe fn c_string(ptr: *const c_char) -> String {
    if ptr.is_null() {
        String::new()
    } else {
        CStr::from_ptr(ptr).to_string_lossy().into_owned()
    }
}

#[derive(Default)]
struct AgentQuery {
    devices: Vec<DeviceInfo>,
    version: Option<rocprofiler_agent_version_t>,
}

unsafe extern "C" fn collect_agents(
    version: rocprofiler_agent_version_t,
    agents: *mut *const c_void,
    count: size_t,
    user_data: *mut c_void,
) -> rocprofiler_status_t {
    let query = &mut *(user_data as *mut AgentQuery);
    if version != ROCPROFILER_AGENT_INFO_VERSION_0 {
        query.version = Some(version);
        return ROCPROFILER_STATUS_SUCCESS;
    }
    for i in 0..count {
        let agent = &*(*agents.add(i) as *const rocprofiler_agent_v0_head_t);
        if agent.type_ == ROCPROFILER_AGENT_TYPE_GPU {
            query.devices.push(DeviceInfo {
                id: DeviceId(agent.id.handle),
                kind: DeviceKind::Gpu,
                name: format!("agent-{}", agent.id.handle),
            });
        }
    }
    ROCPROFILER_STATUS_SUCCESS
}

unsafe extern "C" fn collect_counters(
    _agent: rocprofiler_agent_id_t,
    counters: *mut rocprofiler_counter_id_t,
    count: size_t,
    user_data: *mut c_void,
) -> rocprofiler_status_t {
    let out = &mut *(user_data as *mut Vec<CounterId>);
    for i in 0..count {
        out.push(CounterId((*counters.add(i)).handle));
    }
    ROCPROFILER_STATUS_SUCCESS
}

unsafe extern "C" fn collect_dimensions(
    _counter: rocprofiler_counter_id_t,
    dims: *const rocprofiler_record_dimension_info_t,
    count: size_t,
    user_data: *mut c_void,
) -> rocprofiler_status_t {
    let out = &mut *(user_data as *mut Vec<DimensionInfo>);
    for i in 0..count {
        let dim = &*dims.add(i);
        out.push(DimensionInfo {
            id: DimensionId(dim.id),
            name: c_string(dim.name),
            instance_size: dim.instance_size,
        });
    }
    ROCPROFILER_STATUS_SUCCESS
}

unsafe extern "C" fn set_profile(
    context: rocprofiler_context_id_t,
    _agent: rocprofiler_agent_id_t,
    set_config: rocprofiler_agent_set_profile_callback_t,
    user_data: *mut c_void,
) {
    if user_data.is_null() {
        return;
    }
    let provider = &*(user_data as *const ProfileProvider);
    if let (Some(profile), Some(set_config)) = ((**provider)(), set_config) {
        set_config(context, rocprofiler_profile_config_id_t { handle: profile.0 });
    }
}

impl ProfilingBackend for RocprofilerBackend {
    fn enumerate_devices(&self) -> BackendResult<Vec<DeviceInfo>> {
        let mut query = AgentQuery::default();
        status(unsafe {
            rocprofiler_query_available_agents(
                ROCPROFILER_AGENT_INFO_VERSION_0,
                Some(collect_agents),
                std::mem::size_of::<rocprofiler_agent_v0_head_t>(),
                &mut query as *mut AgentQuery as *mut c_void,
            )
        })?;
        if let Some(found) = query.version {
            return Err(BackendError::VersionMismatch {
                expected: ROCPROFILER_AGENT_INFO_VERSION_0 as u32,
                found: found as u32,
            });
        }
        Ok(query.devices)
    }

    fn supported_counters(&self, device: DeviceId) -> BackendResult<Vec<CounterId>> {
        let mut counters: Vec<CounterId> = Vec::new();
        status(unsafe {
            rocprofiler_iterate_agent_supported_counters(
                rocprofiler_agent_id_t { handle: device.0 },
                Some(collect_counters),
                &mut counters as *mut Vec<CounterId> as *mut c_void,
            )
        })?;
        Ok(counters)
    }

    fn counter_info(&self, counter: CounterId) -> BackendResult<CounterInfo> {
        let mut info = rocprofiler_counter_info_v0_t {
            id: rocprofiler_counter_id_t::default(),
            name: std::ptr::null(),
            description: std::ptr::null(),
            block: std::ptr::null(),
            expression: std::ptr::null(),
            flags: 0,
        };
        status(unsafe {
            rocprofiler_query_counter_info(
                rocprofiler_counter_id_t { handle: counter.0 },
                ROCPROFILER_COUNTER_INFO_VERSION_0,
                &mut info as *mut rocprofiler_counter_info_v0_t as *mut c_void,
            )
        })?;
        Ok(unsafe {
            CounterInfo {
                id: counter,
                name: c_string(info.name),
                description: c_string(info.description),
                block: c_string(info.block),
            }
        })
    }

    fn counter_dimensions(&self, counter: CounterId) -> BackendResult<Vec<DimensionInfo>> {
        let mut dims: Vec<DimensionInfo> = Vec::new();
        status(unsafe {
            rocprofiler_iterate_counter_dimensions(
                rocprofiler_counter_id_t { handle: counter.0 },
                Some(collect_dimensions),
                &mut dims as *mut Vec<DimensionInfo> as *mut c_void,
            )
        })?;
        Ok(dims)
    }

    fn create_context(&self, _device: DeviceId) -> BackendResult<ContextId> {
        let mut context = rocprofiler_context_id_t::default();
        status(unsafe { rocprofiler_create_context(&mut context) })?;
        Ok(ContextId(context.handle))
    }

    fn register_profile_provider(
        &self,
        context: ContextId,
        device: DeviceId,
        provider: ProfileProvider,
    ) -> BackendResult<()> {
        let provider = Box::new(provider);
        let user_data = &*provider as *const ProfileProvider as *mut c_void;
        self.providers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(provider);

        status(unsafe {
            rocprofiler_configure_device_counting_service(
                rocprofiler_context_id_t { handle: context.0 },
                rocprofiler_buffer_id_t::default(),
                rocprofiler_agent_id_t { handle: device.0 },
                Some(set_profile),
                user_data,
            )
        })
    }

    fn create_profile(&self, device: DeviceId, counters: &[CounterId]) -> BackendResult<ProfileId> {
        let mut ids: Vec<rocprofiler_counter_id_t> = counters
            .iter()
            .map(|c| rocprofiler_counter_id_t { handle: c.0 })
            .collect();
        let mut profile = rocprofiler_profile_config_id_t::default();
        status(unsafe {
            rocprofiler_create_profile_config(
                rocprofiler_agent_id_t { handle: device.0 },
                ids.as_mut_ptr(),
                ids.len(),
                &mut profile,
            )
        })?;
        Ok(ProfileId(profile.handle))
    }

    fn start(&self, context: ContextId) -> BackendResult<()> {
        status(unsafe { rocprofiler_start_context(rocprofiler_context_id_t { handle: context.0 }) })
    }

    fn sample(&self, context: ContextId, out: &mut [CounterRecord]) -> BackendResult<usize> {
        let mut raw: Vec<rocprofiler_record_counter_t> =
            vec![unsafe { std::mem::zeroed() }; out.len()];
        let mut count: size_t = raw.len();
        status(unsafe {
            rocprofiler_sample_device_counting_service(
                rocprofiler_context_id_t { handle: context.0 },
                rocprofiler_user_data_t { value: 0 },
                ROCPROFILER_COUNTER_FLAG_NONE,
                raw.as_mut_ptr(),
                &mut count,
            )
        })?;

        let filled = count.min(out.len());
        for (dst, src) in out.iter_mut().zip(&raw[..filled]) {
            *dst = CounterRecord {
                id: RecordId(src.id),
                value: src.counter_value,
            };
        }
        Ok(filled)
    }

    fn stop(&self, context: ContextId) -> BackendResult<()> {
        status(unsafe { rocprofiler_stop_context(rocprofiler_context_id_t { handle: context.0 }) })
    }

    fn record_counter(&self, record: RecordId) -> BackendResult<CounterId> {
        let mut counter = rocprofiler_counter_id_t::default();
        status(unsafe { rocprofiler_query_record_counter_id(record.0, &mut counter) })?;
        Ok(CounterId(counter.handle))
    }

    fn record_dimension_position(
        &self,
        record: RecordId,
        dimension: DimensionId,
    ) -> BackendResult<usize> {
        let mut pos: size_t = 0;
        status(unsafe { rocprofiler_query_record_dimension_position(record.0, dimension.0, &mut pos) })?;
        Ok(pos)
    }
}
