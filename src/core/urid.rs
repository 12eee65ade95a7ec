// URID mapping helpers over the host's urid:map feature.
use std::ffi::CString;

use crate::core::sys::{LV2_URID, LV2_URID_Map};

/// Maps `uri` through the host. Returns 0 (the LV2 "no URID" value) for URIs
/// that cannot cross the C boundary.
///
/// # Safety
/// `map` must be a live host URID map.
pub unsafe fn map_uri(map: &LV2_URID_Map, uri: &str) -> LV2_URID {
    match CString::new(uri) {
        Ok(uri) => unsafe { (map.map)(map.handle, uri.as_ptr()) },
        Err(_) => 0,
    }
}
