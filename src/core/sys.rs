// Raw LV2 C ABI declarations (lv2core, urid, log, state, atom).
#![allow(non_camel_case_types, non_upper_case_globals)]

use std::os::raw::{c_char, c_int, c_void};

pub const LV2_URID__map: &str = "http://lv2plug.in/ns/ext/urid#map";

pub const LV2_LOG__log: &str = "http://lv2plug.in/ns/ext/log#log";
pub const LV2_LOG__Error: &str = "http://lv2plug.in/ns/ext/log#Error";
pub const LV2_LOG__Note: &str = "http://lv2plug.in/ns/ext/log#Note";
pub const LV2_LOG__Trace: &str = "http://lv2plug.in/ns/ext/log#Trace";
pub const LV2_LOG__Warning: &str = "http://lv2plug.in/ns/ext/log#Warning";

pub const LV2_STATE__interface: &str = "http://lv2plug.in/ns/ext/state#interface";
pub const LV2_STATE__makePath: &str = "http://lv2plug.in/ns/ext/state#makePath";
pub const LV2_STATE__freePath: &str = "http://lv2plug.in/ns/ext/state#freePath";
pub const LV2_STATE__mapPath: &str = "http://lv2plug.in/ns/ext/state#mapPath";

pub const LV2_ATOM__String: &str = "http://lv2plug.in/ns/ext/atom#String";

pub type LV2_Handle = *mut c_void;
pub type LV2_URID = u32;

pub type LV2_State_Status = u32;
pub const LV2_STATE_SUCCESS: LV2_State_Status = 0;
pub const LV2_STATE_ERR_UNKNOWN: LV2_State_Status = 1;
pub const LV2_STATE_ERR_BAD_TYPE: LV2_State_Status = 2;
pub const LV2_STATE_ERR_BAD_FLAGS: LV2_State_Status = 3;
pub const LV2_STATE_ERR_NO_FEATURE: LV2_State_Status = 4;
pub const LV2_STATE_ERR_NO_PROPERTY: LV2_State_Status = 5;

pub const LV2_STATE_IS_POD: u32 = 1;
pub const LV2_STATE_IS_PORTABLE: u32 = 1 << 1;
pub const LV2_STATE_IS_NATIVE: u32 = 1 << 2;

#[repr(C)]
pub struct LV2_Feature {
    pub uri: *const c_char,
    pub data: *mut c_void,
}

#[repr(C)]
pub struct LV2_Descriptor {
    pub uri: *const c_char,
    pub instantiate: Option<
        unsafe extern "C" fn(
            descriptor: *const LV2_Descriptor,
            sample_rate: f64,
            bundle_path: *const c_char,
            features: *const *const LV2_Feature,
        ) -> LV2_Handle,
    >,
    pub connect_port: Option<unsafe extern "C" fn(LV2_Handle, port: u32, data: *mut c_void)>,
    pub activate: Option<unsafe extern "C" fn(LV2_Handle)>,
    pub run: Option<unsafe extern "C" fn(LV2_Handle, sample_count: u32)>,
    pub deactivate: Option<unsafe extern "C" fn(LV2_Handle)>,
    pub cleanup: Option<unsafe extern "C" fn(LV2_Handle)>,
    pub extension_data: Option<unsafe extern "C" fn(uri: *const c_char) -> *const c_void>,
}

// Descriptors live in statics; the URI pointer targets a static C string.
unsafe impl Sync for LV2_Descriptor {}

#[repr(C)]
pub struct LV2_URID_Map {
    pub handle: *mut c_void,
    pub map: unsafe extern "C" fn(handle: *mut c_void, uri: *const c_char) -> LV2_URID,
}

#[repr(C)]
pub struct LV2_Log_Log {
    pub handle: *mut c_void,
    pub printf: unsafe extern "C" fn(
        handle: *mut c_void,
        kind: LV2_URID,
        fmt: *const c_char,
        ...
    ) -> c_int,
    // `va_list` is passed through as an opaque pointer; only `printf` is called.
    pub vprintf: unsafe extern "C" fn(
        handle: *mut c_void,
        kind: LV2_URID,
        fmt: *const c_char,
        ap: *mut c_void,
    ) -> c_int,
}

#[repr(C)]
pub struct LV2_State_Make_Path {
    pub handle: *mut c_void,
    pub path: unsafe extern "C" fn(handle: *mut c_void, path: *const c_char) -> *mut c_char,
}

#[repr(C)]
pub struct LV2_State_Free_Path {
    pub handle: *mut c_void,
    pub free_path: unsafe extern "C" fn(handle: *mut c_void, path: *mut c_char),
}

#[repr(C)]
pub struct LV2_State_Map_Path {
    pub handle: *mut c_void,
    pub abstract_path:
        unsafe extern "C" fn(handle: *mut c_void, absolute_path: *const c_char) -> *mut c_char,
    pub absolute_path:
        unsafe extern "C" fn(handle: *mut c_void, abstract_path: *const c_char) -> *mut c_char,
}

pub type LV2_State_Store_Function = unsafe extern "C" fn(
    handle: *mut c_void,
    key: LV2_URID,
    value: *const c_void,
    size: usize,
    value_type: LV2_URID,
    flags: u32,
) -> LV2_State_Status;

pub type LV2_State_Retrieve_Function = unsafe extern "C" fn(
    handle: *mut c_void,
    key: LV2_URID,
    size: *mut usize,
    value_type: *mut LV2_URID,
    flags: *mut u32,
) -> *const c_void;

#[repr(C)]
pub struct LV2_State_Interface {
    pub save: unsafe extern "C" fn(
        instance: LV2_Handle,
        store: Option<LV2_State_Store_Function>,
        handle: *mut c_void,
        flags: u32,
        features: *const *const LV2_Feature,
    ) -> LV2_State_Status,
    pub restore: unsafe extern "C" fn(
        instance: LV2_Handle,
        retrieve: Option<LV2_State_Retrieve_Function>,
        handle: *mut c_void,
        flags: u32,
        features: *const *const LV2_Feature,
    ) -> LV2_State_Status,
}

#[repr(C)]
pub struct LV2_Atom {
    pub size: u32,
    pub atom_type: u32,
}

#[repr(C)]
pub struct LV2_Atom_Sequence_Body {
    pub unit: u32,
    pub pad: u32,
}

#[repr(C)]
pub struct LV2_Atom_Sequence {
    pub atom: LV2_Atom,
    pub body: LV2_Atom_Sequence_Body,
}
