//! FFI bindings for the ROCm profiler SDK device counting service
//!
//! Hand-written against `rocprofiler-sdk/rocprofiler.h`; only the calls and
//! structures the sampler needs are declared.

#![allow(non_camel_case_types)]

use libc::{c_char, c_int, c_void, size_t};

pub type rocprofiler_status_t = c_int;
pub type rocprofiler_counter_instance_id_t = u64;
pub type rocprofiler_counter_dimension_id_t = u64;
pub type rocprofiler_dispatch_id_t = u64;
pub type rocprofiler_agent_version_t = c_int;
pub type rocprofiler_agent_type_t = c_int;
pub type rocprofiler_counter_info_version_id_t = c_int;
pub type rocprofiler_counter_flag_t = c_int;

pub const ROCPROFILER_STATUS_SUCCESS: rocprofiler_status_t = 0;
pub const ROCPROFILER_AGENT_INFO_VERSION_0: rocprofiler_agent_version_t = 1;
pub const ROCPROFILER_AGENT_TYPE_GPU: rocprofiler_agent_type_t = 2;
pub const ROCPROFILER_COUNTER_INFO_VERSION_0: rocprofiler_counter_info_version_id_t = 1;
pub const ROCPROFILER_COUNTER_FLAG_NONE: rocprofiler_counter_flag_t = 0;

macro_rules! id_struct {
    ($($name:ident),* $(,)?) => {
        $(
            #[repr(C)]
            #[derive(Debug, Default, Clone, Copy)]
            pub struct $name {
                pub handle: u64,
            }
        )*
    };
}

id_struct!(
    rocprofiler_context_id_t,
    rocprofiler_agent_id_t,
    rocprofiler_counter_id_t,
    rocprofiler_profile_config_id_t,
    rocprofiler_buffer_id_t,
);

#[repr(C)]
#[derive(Clone, Copy)]
pub union rocprofiler_user_data_t {
    pub value: u64,
    pub ptr: *mut c_void,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct rocprofiler_record_counter_t {
    pub id: rocprofiler_counter_instance_id_t,
    pub counter_value: f64,
    pub dispatch_id: rocprofiler_dispatch_id_t,
    pub user_data: rocprofiler_user_data_t,
    pub agent_id: rocprofiler_agent_id_t,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct rocprofiler_record_dimension_info_t {
    pub id: rocprofiler_counter_dimension_id_t,
    pub name: *const c_char,
    pub instance_size: size_t,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct rocprofiler_counter_info_v0_t {
    pub id: rocprofiler_counter_id_t,
    pub name: *const c_char,
    pub description: *const c_char,
    pub block: *const c_char,
    pub expression: *const c_char,
    /// `is_constant : 1, is_derived : 1`
    pub flags: u8,
}

/// Leading fields of `rocprofiler_agent_v0_t`; agents are only read through
/// pointers handed out by the runtime
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct rocprofiler_agent_v0_head_t {
    pub size: u64,
    pub id: rocprofiler_agent_id_t,
    pub type_: rocprofiler_agent_type_t,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct rocprofiler_client_id_t {
    pub name: *const c_char,
    pub handle: u32,
}

pub type rocprofiler_client_finalize_t = Option<unsafe extern "C" fn(rocprofiler_client_id_t)>;

pub type rocprofiler_tool_initialize_t =
    Option<unsafe extern "C" fn(rocprofiler_client_finalize_t, *mut c_void) -> c_int>;

pub type rocprofiler_tool_finalize_t = Option<unsafe extern "C" fn(*mut c_void)>;

#[repr(C)]
pub struct rocprofiler_tool_configure_result_t {
    pub size: size_t,
    pub initialize: rocprofiler_tool_initialize_t,
    pub finalize: rocprofiler_tool_finalize_t,
    pub tool_data: *mut c_void,
}

pub type rocprofiler_configure_func_t = Option<
    unsafe extern "C" fn(
        u32,
        *const c_char,
        u32,
        *mut rocprofiler_client_id_t,
    ) -> *mut rocprofiler_tool_configure_result_t,
>;

pub type rocprofiler_agent_set_profile_callback_t = Option<
    unsafe extern "C" fn(
        rocprofiler_context_id_t,
        rocprofiler_profile_config_id_t,
    ) -> rocprofiler_status_t,
>;

pub type rocprofiler_device_counting_service_callback_t = Option<
    unsafe extern "C" fn(
        rocprofiler_context_id_t,
        rocprofiler_agent_id_t,
        rocprofiler_agent_set_profile_callback_t,
        *mut c_void,
    ),
>;

pub type rocprofiler_query_available_agents_cb_t = Option<
    unsafe extern "C" fn(
        rocprofiler_agent_version_t,
        *mut *const c_void,
        size_t,
        *mut c_void,
    ) -> rocprofiler_status_t,
>;

pub type rocprofiler_available_counters_cb_t = Option<
    unsafe extern "C" fn(
        rocprofiler_agent_id_t,
        *mut rocprofiler_counter_id_t,
        size_t,
        *mut c_void,
    ) -> rocprofiler_status_t,
>;

pub type rocprofiler_available_dimensions_cb_t = Option<
    unsafe extern "C" fn(
        rocprofiler_counter_id_t,
        *const rocprofiler_record_dimension_info_t,
        size_t,
        *mut c_void,
    ) -> rocprofiler_status_t,
>;

#[link(name = "rocprofiler-sdk")]
extern "C" {
    pub fn rocprofiler_get_status_string(status: rocprofiler_status_t) -> *const c_char;

    pub fn rocprofiler_force_configure(
        configure_func: rocprofiler_configure_func_t,
    ) -> rocprofiler_status_t;

    pub fn rocprofiler_query_available_agents(
        version: rocprofiler_agent_version_t,
        callback: rocprofiler_query_available_agents_cb_t,
        agent_size: size_t,
        user_data: *mut c_void,
    ) -> rocprofiler_status_t;

    pub fn rocprofiler_create_context(context_id: *mut rocprofiler_context_id_t)
        -> rocprofiler_status_t;

    pub fn rocprofiler_start_context(context_id: rocprofiler_context_id_t) -> rocprofiler_status_t;

    pub fn rocprofiler_stop_context(context_id: rocprofiler_context_id_t) -> rocprofiler_status_t;

    pub fn rocprofiler_configure_device_counting_service(
        context_id: rocprofiler_context_id_t,
        buffer_id: rocprofiler_buffer_id_t,
        agent_id: rocprofiler_agent_id_t,
        cb: rocprofiler_device_counting_service_callback_t,
        user_data: *mut c_void,
    ) -> rocprofiler_status_t;

    pub fn rocprofiler_sample_device_counting_service(
        context_id: rocprofiler_context_id_t,
        user_data: rocprofiler_user_data_t,
        flags: rocprofiler_counter_flag_t,
        output_records: *mut rocprofiler_record_counter_t,
        rec_count: *mut size_t,
    ) -> rocprofiler_status_t;

    pub fn rocprofiler_create_profile_config(
        agent_id: rocprofiler_agent_id_t,
        counters_list: *mut rocprofiler_counter_id_t,
        counters_count: size_t,
        config_id: *mut rocprofiler_profile_config_id_t,
    ) -> rocprofiler_status_t;

    pub fn rocprofiler_iterate_agent_supported_counters(
        agent_id: rocprofiler_agent_id_t,
        cb: rocprofiler_available_counters_cb_t,
        user_data: *mut c_void,
    ) -> rocprofiler_status_t;

    pub fn rocprofiler_query_counter_info(
        counter_id: rocprofiler_counter_id_t,
        version: rocprofiler_counter_info_version_id_t,
        info: *mut c_void,
    ) -> rocprofiler_status_t;

    pub fn rocprofiler_iterate_counter_dimensions(
        id: rocprofiler_counter_id_t,
        info_cb: rocprofiler_available_dimensions_cb_t,
        user_data: *mut c_void,
    ) -> rocprofiler_status_t;

    pub fn rocprofiler_query_record_counter_id(
        id: rocprofiler_counter_instance_id_t,
        counter_id: *mut rocprofiler_counter_id_t,
    ) -> rocprofiler_status_t;

    pub fn rocprofiler_query_record_dimension_position(
        id: rocprofiler_counter_instance_id_t,
        dim: rocprofiler_counter_dimension_id_t,
        pos: *mut size_t,
    ) -> rocprofiler_status_t;
}

#[link(name = "hsa-runtime64")]
extern "C" {
    pub fn hsa_init() -> c_int;
}
