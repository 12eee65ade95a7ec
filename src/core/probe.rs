//! Purpose: Ask the host for canonical and nested state paths and optionally write a sentinel.
//! Exports: `ProbeStage`, `ProbeReport`, `PathProbe`, `create_paths`, probe path constants.
//! Role: The only filesystem I/O the plugins perform.
//! Invariants: Every failure is logged and recorded in the report; none is propagated.
//! Invariants: Each host path is released before the next one is requested.

use std::fmt;
use std::fs::File;
use std::io::Write;

use crate::core::error::Error;
use crate::core::log::Logger;
use crate::core::paths::PathServices;

pub const BASE_PATH: &str = ".";
pub const SINGLE_FILE: &str = "single-file.txt";
pub const NESTED_FILE: &str = "subdir1/subdir2/subdir3/subdir-file.txt";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProbeStage {
    Init,
    Save,
}

impl fmt::Display for ProbeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeStage::Init => f.write_str("init"),
            ProbeStage::Save => f.write_str("save"),
        }
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PathProbe {
    pub requested: String,
    /// Path the host answered with, if any.
    pub path: Option<String>,
    /// Whether the path existed when the host handed it out.
    pub existed: bool,
    /// Whether the sentinel was written to it.
    pub written: bool,
    pub error: Option<String>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProbeReport {
    pub stage: ProbeStage,
    pub entries: Vec<PathProbe>,
}

impl ProbeReport {
    pub fn entry(&self, requested: &str) -> Option<&PathProbe> {
        self.entries.iter().find(|entry| entry.requested == requested)
    }

    pub fn all_paths_granted(&self) -> bool {
        self.entries.iter().all(|entry| entry.path.is_some())
    }
}

pub fn create_paths(
    services: &PathServices<'_>,
    logger: &Logger,
    sentinel: &str,
    stage: ProbeStage,
    write: bool,
) -> ProbeReport {
    let mut entries = Vec::with_capacity(3);

    let mut base = PathProbe {
        requested: BASE_PATH.to_string(),
        ..PathProbe::default()
    };
    match services.make_path(BASE_PATH) {
        Ok(path) => {
            let status = path.access_status();
            logger.note(&format!(
                "state-test {stage}, host has makePath and initial path is: '{path}' (access = {status})"
            ));
            base.path = Some(path.to_string_lossy());
            base.existed = status == 0;
        }
        Err(err) => {
            logger.warning(&format!(
                "state-test {stage}, host has makePath but failed to get initial path"
            ));
            base.error = Some(err.to_string());
        }
    }
    entries.push(base);

    for requested in [SINGLE_FILE, NESTED_FILE] {
        entries.push(probe_file(services, logger, sentinel, stage, write, requested));
    }

    ProbeReport { stage, entries }
}

fn probe_file(
    services: &PathServices<'_>,
    logger: &Logger,
    sentinel: &str,
    stage: ProbeStage,
    write: bool,
    requested: &str,
) -> PathProbe {
    let file_name = requested.rsplit('/').next().unwrap_or(requested);
    let mut probe = PathProbe {
        requested: requested.to_string(),
        ..PathProbe::default()
    };

    let path = match services.make_path(requested) {
        Ok(path) => path,
        Err(err) => {
            logger.error(&format!(
                "state-test {stage}, request for {file_name} path failed"
            ));
            probe.error = Some(err.to_string());
            return probe;
        }
    };

    let status = path.access_status();
    logger.note(&format!(
        "state-test {stage}, request for {file_name} path resulted in '{path}' (access = {status})"
    ));
    probe.path = Some(path.to_string_lossy());
    probe.existed = status == 0;

    if write {
        match write_sentinel(&path.to_path_buf(), sentinel) {
            Ok(()) => {
                logger.note(&format!(
                    "state-test {stage}, wrote '{sentinel}' to {file_name} successfully"
                ));
                probe.written = true;
            }
            Err(err) => {
                logger.error(&format!(
                    "state-test {stage}, failed to open {file_name} for writing"
                ));
                probe.error = Some(err.to_string());
            }
        }
    }

    probe
}

fn write_sentinel(path: &std::path::Path, sentinel: &str) -> Result<(), Error> {
    let io_err = |err: std::io::Error| {
        Error::new(crate::core::error::ErrorKind::Io)
            .with_message("failed to write sentinel")
            .with_path(path)
            .with_source(err)
    };
    let mut file = File::create(path).map_err(io_err)?;
    writeln!(file, "{sentinel}").map_err(io_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{NESTED_FILE, ProbeStage, SINGLE_FILE, create_paths};
    use crate::core::log::Logger;
    use crate::core::paths::PathServices;
    use crate::core::sys::LV2_State_Make_Path;
    use std::ffi::{CStr, CString};
    use std::os::raw::{c_char, c_void};
    use std::path::PathBuf;

    // Joins the request onto the root in `handle` without creating directories.
    unsafe extern "C" fn join_root(handle: *mut c_void, path: *const c_char) -> *mut c_char {
        let root = unsafe { &*(handle as *const PathBuf) };
        let relative = unsafe { CStr::from_ptr(path) }.to_string_lossy().into_owned();
        let joined = CString::new(root.join(relative).to_string_lossy().into_owned()).unwrap();
        unsafe { libc::strdup(joined.as_ptr()) }
    }

    #[test]
    fn writes_sentinel_where_directories_exist() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path().to_path_buf();
        std::fs::create_dir_all(root.join("subdir1/subdir2/subdir3")).expect("mkdir");
        let make = LV2_State_Make_Path {
            handle: (&root as *const PathBuf).cast_mut().cast(),
            path: join_root,
        };
        let services = PathServices::new(Some(&make), None, None);

        let report = create_paths(&services, &Logger::tracing(), "1234", ProbeStage::Save, true);
        assert!(report.all_paths_granted());
        assert!(report.entry(".").expect("base").existed);
        assert!(report.entry(SINGLE_FILE).expect("single").written);
        assert!(report.entry(NESTED_FILE).expect("nested").written);
        let text = std::fs::read_to_string(root.join(NESTED_FILE)).expect("read");
        assert_eq!(text, "1234\n");
    }

    #[test]
    fn missing_nested_directories_fail_only_the_nested_write() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path().to_path_buf();
        let make = LV2_State_Make_Path {
            handle: (&root as *const PathBuf).cast_mut().cast(),
            path: join_root,
        };
        let services = PathServices::new(Some(&make), None, None);

        let report = create_paths(&services, &Logger::tracing(), "77", ProbeStage::Init, true);
        assert!(report.entry(SINGLE_FILE).expect("single").written);
        let nested = report.entry(NESTED_FILE).expect("nested");
        assert!(nested.path.is_some());
        assert!(!nested.written);
        assert!(nested.error.is_some());
    }

    #[test]
    fn no_write_mode_leaves_filesystem_untouched() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path().to_path_buf();
        let make = LV2_State_Make_Path {
            handle: (&root as *const PathBuf).cast_mut().cast(),
            path: join_root,
        };
        let services = PathServices::new(Some(&make), None, None);

        let report = create_paths(&services, &Logger::tracing(), "5", ProbeStage::Save, false);
        assert!(report.all_paths_granted());
        assert!(!root.join(SINGLE_FILE).exists());
        assert!(report.entries.iter().all(|entry| !entry.written));
    }

    #[test]
    fn without_make_path_every_request_fails() {
        let services = PathServices::default();
        let report = create_paths(&services, &Logger::tracing(), "5", ProbeStage::Save, true);
        assert_eq!(report.entries.len(), 3);
        assert!(report.entries.iter().all(|entry| entry.path.is_none()));
        assert_eq!(report.stage.to_string(), "save");
    }
}
