//! Purpose: Safe wrappers over the host's state makePath, freePath and mapPath services.
//! Exports: `PathServices`, `HostPath`.
//! Role: Every host-allocated path string flows through `HostPath` so it is released once.
//! Invariants: A `HostPath` is released with freePath when the host offers it, else with `free`.
//! Invariants: Requests never panic; host failures surface as `ErrorKind::PathRequest`.

use std::ffi::{CStr, CString};
use std::fmt;
use std::os::raw::c_char;
use std::path::PathBuf;
use std::ptr::NonNull;

use crate::core::error::{Error, ErrorKind};
use crate::core::sys::{
    LV2_STATE__makePath, LV2_STATE__mapPath, LV2_State_Free_Path, LV2_State_Make_Path,
    LV2_State_Map_Path,
};

#[derive(Clone, Copy, Default)]
pub struct PathServices<'a> {
    make: Option<&'a LV2_State_Make_Path>,
    free: Option<&'a LV2_State_Free_Path>,
    map: Option<&'a LV2_State_Map_Path>,
}

impl<'a> PathServices<'a> {
    pub fn new(
        make: Option<&'a LV2_State_Make_Path>,
        free: Option<&'a LV2_State_Free_Path>,
        map: Option<&'a LV2_State_Map_Path>,
    ) -> Self {
        Self { make, free, map }
    }

    pub fn has_make_path(&self) -> bool {
        self.make.is_some()
    }

    pub fn has_free_path(&self) -> bool {
        self.free.is_some()
    }

    pub fn has_map_path(&self) -> bool {
        self.map.is_some()
    }

    /// Asks the host to create `relative` inside the plugin's state directory.
    pub fn make_path(&self, relative: &str) -> Result<HostPath<'a>, Error> {
        let make = self.make.ok_or_else(|| {
            Error::new(ErrorKind::MissingFeature)
                .with_message("host does not have makePath")
                .with_feature(LV2_STATE__makePath)
        })?;
        let request = c_string(relative)?;
        let raw = unsafe { (make.path)(make.handle, request.as_ptr()) };
        self.adopt(raw).ok_or_else(|| {
            Error::new(ErrorKind::PathRequest)
                .with_message(format!("request for {relative} path failed"))
                .with_feature(LV2_STATE__makePath)
        })
    }

    /// Maps an absolute path to the host's abstract (portable) form.
    pub fn abstract_path(&self, absolute: &str) -> Result<HostPath<'a>, Error> {
        let map = self.map_service()?;
        let request = c_string(absolute)?;
        let raw = unsafe { (map.abstract_path)(map.handle, request.as_ptr()) };
        self.adopt(raw).ok_or_else(|| {
            Error::new(ErrorKind::PathRequest)
                .with_message("abstract_path returned null")
                .with_path(absolute)
                .with_feature(LV2_STATE__mapPath)
        })
    }

    /// Maps an abstract path back to an absolute one.
    pub fn absolute_path(&self, abstract_path: &str) -> Result<HostPath<'a>, Error> {
        let map = self.map_service()?;
        let request = c_string(abstract_path)?;
        let raw = unsafe { (map.absolute_path)(map.handle, request.as_ptr()) };
        self.adopt(raw).ok_or_else(|| {
            Error::new(ErrorKind::PathRequest)
                .with_message("absolute_path returned null")
                .with_path(abstract_path)
                .with_feature(LV2_STATE__mapPath)
        })
    }

    fn map_service(&self) -> Result<&'a LV2_State_Map_Path, Error> {
        self.map.ok_or_else(|| {
            Error::new(ErrorKind::MissingFeature)
                .with_message("host does not have mapPath")
                .with_feature(LV2_STATE__mapPath)
        })
    }

    fn adopt(&self, raw: *mut c_char) -> Option<HostPath<'a>> {
        NonNull::new(raw).map(|raw| HostPath {
            raw,
            free: self.free,
        })
    }
}

impl fmt::Debug for PathServices<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathServices")
            .field("make_path", &self.has_make_path())
            .field("free_path", &self.has_free_path())
            .field("map_path", &self.has_map_path())
            .finish()
    }
}

/// A path string owned by the host allocator.
pub struct HostPath<'a> {
    raw: NonNull<c_char>,
    free: Option<&'a LV2_State_Free_Path>,
}

impl HostPath<'_> {
    pub fn as_c_str(&self) -> &CStr {
        unsafe { CStr::from_ptr(self.raw.as_ptr()) }
    }

    pub fn to_string_lossy(&self) -> String {
        self.as_c_str().to_string_lossy().into_owned()
    }

    pub fn to_path_buf(&self) -> PathBuf {
        PathBuf::from(self.to_string_lossy())
    }

    /// `access(path, F_OK)` as the host filesystem sees it: 0 when present, -1 otherwise.
    pub fn access_status(&self) -> i32 {
        unsafe { libc::access(self.raw.as_ptr(), libc::F_OK) }
    }
}

impl fmt::Display for HostPath<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_lossy())
    }
}

impl Drop for HostPath<'_> {
    fn drop(&mut self) {
        match self.free {
            Some(free) => unsafe { (free.free_path)(free.handle, self.raw.as_ptr()) },
            None => unsafe { libc::free(self.raw.as_ptr().cast()) },
        }
    }
}

fn c_string(input: &str) -> Result<CString, Error> {
    CString::new(input).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message("path contains an interior nul byte")
            .with_source(err)
    })
}
