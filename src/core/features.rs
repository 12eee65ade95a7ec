//! Purpose: Discover host-provided LV2 features from a null-terminated feature array.
//! Exports: `HostFeatures`.
//! Role: Single place where feature URIs are compared and their data pointers captured.
//! Invariants: The first feature carrying a given URI wins; later duplicates are ignored.
//! Invariants: Captured pointers are borrowed from the host and never freed here.

use std::ffi::CStr;
use std::ptr::NonNull;

use crate::core::paths::PathServices;
use crate::core::sys::{
    LV2_Feature, LV2_LOG__log, LV2_Log_Log, LV2_STATE__freePath, LV2_STATE__makePath,
    LV2_STATE__mapPath, LV2_State_Free_Path, LV2_State_Make_Path, LV2_State_Map_Path,
    LV2_URID__map, LV2_URID_Map,
};

#[derive(Clone, Copy, Debug, Default)]
pub struct HostFeatures {
    pub free_path: Option<NonNull<LV2_State_Free_Path>>,
    pub make_path: Option<NonNull<LV2_State_Make_Path>>,
    pub map_path: Option<NonNull<LV2_State_Map_Path>>,
    pub log: Option<NonNull<LV2_Log_Log>>,
    pub urid_map: Option<NonNull<LV2_URID_Map>>,
}

impl HostFeatures {
    /// Scans `features` until the terminating null entry.
    ///
    /// # Safety
    /// `features` must be null or point to a null-terminated array of valid
    /// `LV2_Feature` pointers whose URIs are nul-terminated strings.
    pub unsafe fn scan(features: *const *const LV2_Feature) -> Self {
        let mut found = Self::default();
        if features.is_null() {
            return found;
        }
        let mut index = 0;
        loop {
            let feature = unsafe { *features.add(index) };
            if feature.is_null() {
                break;
            }
            index += 1;
            let feature = unsafe { &*feature };
            if feature.uri.is_null() {
                continue;
            }
            let uri = unsafe { CStr::from_ptr(feature.uri) }.to_bytes();
            let data = feature.data;
            if uri == LV2_STATE__freePath.as_bytes() {
                found.free_path = found.free_path.or(NonNull::new(data.cast()));
            } else if uri == LV2_STATE__makePath.as_bytes() {
                found.make_path = found.make_path.or(NonNull::new(data.cast()));
            } else if uri == LV2_STATE__mapPath.as_bytes() {
                found.map_path = found.map_path.or(NonNull::new(data.cast()));
            } else if uri == LV2_LOG__log.as_bytes() {
                found.log = found.log.or(NonNull::new(data.cast()));
            } else if uri == LV2_URID__map.as_bytes() {
                found.urid_map = found.urid_map.or(NonNull::new(data.cast()));
            }
        }
        found
    }

    /// Fills any service this set lacks from `fallback`.
    pub fn or(self, fallback: HostFeatures) -> Self {
        Self {
            free_path: self.free_path.or(fallback.free_path),
            make_path: self.make_path.or(fallback.make_path),
            map_path: self.map_path.or(fallback.map_path),
            log: self.log.or(fallback.log),
            urid_map: self.urid_map.or(fallback.urid_map),
        }
    }

    /// Borrows the path services for the duration of one callback.
    ///
    /// # Safety
    /// The host must keep the feature data alive for `'a`.
    pub unsafe fn path_services<'a>(&self) -> PathServices<'a> {
        unsafe {
            PathServices::new(
                self.make_path.map(|ptr| &*ptr.as_ptr()),
                self.free_path.map(|ptr| &*ptr.as_ptr()),
                self.map_path.map(|ptr| &*ptr.as_ptr()),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::HostFeatures;
    use crate::core::sys::{LV2_Feature, LV2_STATE__freePath, LV2_STATE__makePath, LV2_URID__map};
    use std::ffi::CString;
    use std::os::raw::c_void;
    use std::ptr;

    fn feature(uri: &CString, data: *mut c_void) -> LV2_Feature {
        LV2_Feature {
            uri: uri.as_ptr(),
            data,
        }
    }

    #[test]
    fn null_array_yields_nothing() {
        let found = unsafe { HostFeatures::scan(ptr::null()) };
        assert!(found.urid_map.is_none());
        assert!(found.make_path.is_none());
        assert!(found.free_path.is_none());
        assert!(found.map_path.is_none());
    }

    #[test]
    fn first_match_wins_and_unknown_uris_are_skipped() {
        let mut first = 1u8;
        let mut second = 2u8;
        let mut map = 3u8;
        let make_uri = CString::new(LV2_STATE__makePath).unwrap();
        let map_uri = CString::new(LV2_URID__map).unwrap();
        let other_uri = CString::new("urn:example:other").unwrap();
        let entries = [
            feature(&other_uri, ptr::null_mut()),
            feature(&make_uri, (&mut first as *mut u8).cast()),
            feature(&make_uri, (&mut second as *mut u8).cast()),
            feature(&map_uri, (&mut map as *mut u8).cast()),
        ];
        let mut array: Vec<*const LV2_Feature> = entries.iter().map(|f| f as *const _).collect();
        array.push(ptr::null());

        let found = unsafe { HostFeatures::scan(array.as_ptr()) };
        assert_eq!(
            found.make_path.map(|p| p.as_ptr().cast::<u8>()),
            Some(&mut first as *mut u8)
        );
        assert!(found.urid_map.is_some());
        assert!(found.free_path.is_none());
        assert!(found.map_path.is_none());
    }

    #[test]
    fn or_fills_missing_services() {
        let mut free = 0u8;
        let free_uri = CString::new(LV2_STATE__freePath).unwrap();
        let entries = [feature(&free_uri, (&mut free as *mut u8).cast())];
        let array = [&entries[0] as *const LV2_Feature, ptr::null()];
        let fallback = unsafe { HostFeatures::scan(array.as_ptr()) };

        let merged = HostFeatures::default().or(fallback);
        assert!(merged.free_path.is_some());
        assert!(merged.make_path.is_none());
    }
}
