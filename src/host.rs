//! Purpose: Minimal in-process LV2 host that drives the plugins through their C ABI.
//! Exports: `SimulatedHost`, `HostOptions`, `HostedInstance`, `StoredProperty`,
//!          `LifecycleReport`, `run_lifecycle`.
//! Role: Backs the `probe` command and integration tests; stands in for a DAW.
//! Invariants: Every struct handed to the plugin is boxed, so its address survives moves.
//! Invariants: Path strings come from the C allocator, so `free` and freePath are both valid.
//! Notes: No log:log feature is offered; plugin messages land in `tracing` instead.
//! Notes: log:log needs a C-variadic `printf` callback, which stable Rust cannot define, so the
//!        plugin's host-log sink is only reachable from a real host.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_void};
use std::path::{Path, PathBuf};
use std::ptr;

use serde::Serialize;

use crate::abi::descriptor;
use crate::core::error::{Error, ErrorKind};
use crate::core::instance::{PORT_SEQ_IN, PORT_SEQ_OUT};
use crate::core::probe::{NESTED_FILE, SINGLE_FILE};
use crate::core::sys::{
    LV2_ATOM__String, LV2_Atom, LV2_Atom_Sequence, LV2_Atom_Sequence_Body, LV2_Descriptor,
    LV2_Feature, LV2_Handle, LV2_STATE__freePath, LV2_STATE__interface, LV2_STATE__makePath,
    LV2_STATE__mapPath, LV2_STATE_ERR_NO_FEATURE, LV2_STATE_SUCCESS, LV2_State_Free_Path,
    LV2_State_Interface, LV2_State_Make_Path, LV2_State_Map_Path, LV2_State_Status,
    LV2_State_Store_Function, LV2_URID, LV2_URID__map, LV2_URID_Map,
};
use crate::core::variant::Variant;

const SAMPLE_RATE: f64 = 48_000.0;
const BLOCK_SIZE: u32 = 256;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct HostOptions {
    pub urid_map: bool,
    pub make_path: bool,
    pub free_path: bool,
    pub map_path: bool,
    /// Whether makePath creates missing parent directories, as LV2 requires.
    pub create_dirs: bool,
}

impl Default for HostOptions {
    fn default() -> Self {
        Self {
            urid_map: true,
            make_path: true,
            free_path: true,
            map_path: true,
            create_dirs: true,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StoredProperty {
    pub value: Vec<u8>,
    pub value_type: LV2_URID,
    pub flags: u32,
}

#[derive(Default)]
struct PathContext {
    root: PathBuf,
    create_dirs: bool,
    issued: Cell<usize>,
    freed: Cell<usize>,
    mapped: Cell<usize>,
}

pub struct SimulatedHost {
    options: HostOptions,
    urids: Box<RefCell<Vec<String>>>,
    paths: Box<PathContext>,
    properties: Box<RefCell<HashMap<LV2_URID, StoredProperty>>>,
    _urid_map: Box<LV2_URID_Map>,
    _make_path: Box<LV2_State_Make_Path>,
    _free_path: Box<LV2_State_Free_Path>,
    _map_path: Box<LV2_State_Map_Path>,
    _uris: Vec<CString>,
    _features: Vec<LV2_Feature>,
    feature_ptrs: Vec<*const LV2_Feature>,
}

impl SimulatedHost {
    pub fn new(state_dir: impl Into<PathBuf>, options: HostOptions) -> Result<Self, Error> {
        let root = state_dir.into();
        std::fs::create_dir_all(&root).map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to create state directory")
                .with_path(&root)
                .with_source(err)
        })?;

        let urids = Box::new(RefCell::new(Vec::new()));
        let paths = Box::new(PathContext {
            root,
            create_dirs: options.create_dirs,
            ..PathContext::default()
        });
        let properties = Box::new(RefCell::new(HashMap::new()));

        let urid_map = Box::new(LV2_URID_Map {
            handle: handle_of(&*urids),
            map: host_map,
        });
        let make_path = Box::new(LV2_State_Make_Path {
            handle: handle_of(&*paths),
            path: host_make_path,
        });
        let free_path = Box::new(LV2_State_Free_Path {
            handle: handle_of(&*paths),
            free_path: host_free_path,
        });
        let map_path = Box::new(LV2_State_Map_Path {
            handle: handle_of(&*paths),
            abstract_path: host_abstract_path,
            absolute_path: host_absolute_path,
        });

        let offered: [(bool, &str, *mut c_void); 4] = [
            (options.urid_map, LV2_URID__map, handle_of(&*urid_map)),
            (options.make_path, LV2_STATE__makePath, handle_of(&*make_path)),
            (options.free_path, LV2_STATE__freePath, handle_of(&*free_path)),
            (options.map_path, LV2_STATE__mapPath, handle_of(&*map_path)),
        ];
        let mut uris = Vec::new();
        let mut features = Vec::new();
        for (enabled, uri, data) in offered {
            if !enabled {
                continue;
            }
            let uri = CString::new(uri).map_err(|err| {
                Error::new(ErrorKind::Internal)
                    .with_message("feature uri contains nul")
                    .with_source(err)
            })?;
            features.push(LV2_Feature {
                uri: uri.as_ptr(),
                data,
            });
            uris.push(uri);
        }
        let mut feature_ptrs: Vec<*const LV2_Feature> =
            features.iter().map(|feature| feature as *const _).collect();
        feature_ptrs.push(ptr::null());

        Ok(Self {
            options,
            urids,
            paths,
            properties,
            _urid_map: urid_map,
            _make_path: make_path,
            _free_path: free_path,
            _map_path: map_path,
            _uris: uris,
            _features: features,
            feature_ptrs,
        })
    }

    pub fn options(&self) -> HostOptions {
        self.options
    }

    pub fn state_dir(&self) -> &Path {
        &self.paths.root
    }

    pub fn features(&self) -> *const *const LV2_Feature {
        self.feature_ptrs.as_ptr()
    }

    pub fn paths_issued(&self) -> usize {
        self.paths.issued.get()
    }

    pub fn paths_freed(&self) -> usize {
        self.paths.freed.get()
    }

    pub fn map_calls(&self) -> usize {
        self.paths.mapped.get()
    }

    /// URID the host assigned to `uri`, if the plugin ever mapped it.
    pub fn urid(&self, uri: &str) -> Option<LV2_URID> {
        self.urids
            .borrow()
            .iter()
            .position(|known| known == uri)
            .map(|index| index as LV2_URID + 1)
    }

    pub fn stored_property(&self, uri: &str) -> Option<StoredProperty> {
        let key = self.urid(uri)?;
        self.properties.borrow().get(&key).cloned()
    }

    /// A stored `atom:String` property decoded without its nul terminator.
    pub fn stored_string(&self, uri: &str) -> Option<String> {
        let property = self.stored_property(uri)?;
        if Some(property.value_type) != self.urid(LV2_ATOM__String) {
            return None;
        }
        let bytes = property.value.split(|b| *b == 0).next().unwrap_or_default();
        Some(String::from_utf8_lossy(bytes).into_owned())
    }

    pub fn instantiate(&self, descriptor: &'static LV2_Descriptor) -> Option<HostedInstance<'_>> {
        let instantiate = descriptor.instantiate?;
        let handle = unsafe {
            instantiate(
                descriptor,
                SAMPLE_RATE,
                c"/usr/lib/lv2/lv2-state-test.lv2/".as_ptr(),
                self.features(),
            )
        };
        if handle.is_null() {
            return None;
        }
        Some(HostedInstance {
            host: self,
            descriptor,
            handle,
            input: Box::new(empty_sequence()),
            output: Box::new(empty_sequence()),
        })
    }
}

pub struct HostedInstance<'h> {
    host: &'h SimulatedHost,
    descriptor: &'static LV2_Descriptor,
    handle: LV2_Handle,
    input: Box<LV2_Atom_Sequence>,
    output: Box<LV2_Atom_Sequence>,
}

impl HostedInstance<'_> {
    pub fn connect_ports(&mut self) {
        if let Some(connect_port) = self.descriptor.connect_port {
            let input = (&mut *self.input as *mut LV2_Atom_Sequence).cast();
            let output = (&mut *self.output as *mut LV2_Atom_Sequence).cast();
            unsafe {
                connect_port(self.handle, PORT_SEQ_IN, input);
                connect_port(self.handle, PORT_SEQ_OUT, output);
            }
        }
    }

    pub fn activate(&mut self) {
        if let Some(activate) = self.descriptor.activate {
            unsafe { activate(self.handle) };
        }
    }

    pub fn run(&mut self, sample_count: u32) {
        if let Some(run) = self.descriptor.run {
            unsafe { run(self.handle, sample_count) };
        }
    }

    pub fn deactivate(&mut self) {
        if let Some(deactivate) = self.descriptor.deactivate {
            unsafe { deactivate(self.handle) };
        }
    }

    pub fn state_interface(&self) -> Option<&'static LV2_State_Interface> {
        let extension_data = self.descriptor.extension_data?;
        let uri = CString::new(LV2_STATE__interface).ok()?;
        let data = unsafe { extension_data(uri.as_ptr()) };
        unsafe { data.cast::<LV2_State_Interface>().as_ref() }
    }

    pub fn save(&mut self) -> Option<LV2_State_Status> {
        self.save_with(Some(host_store))
    }

    /// Saves through `store` instead of the host's property map. The map is
    /// still passed as the store handle.
    pub fn save_with(
        &mut self,
        store: Option<LV2_State_Store_Function>,
    ) -> Option<LV2_State_Status> {
        let state = self.state_interface()?;
        let properties = handle_of(&*self.host.properties);
        Some(unsafe { (state.save)(self.handle, store, properties, 0, self.host.features()) })
    }

    pub fn restore(&mut self) -> Option<LV2_State_Status> {
        let state = self.state_interface()?;
        let properties = handle_of(&*self.host.properties);
        Some(unsafe {
            (state.restore)(
                self.handle,
                Some(host_retrieve),
                properties,
                0,
                self.host.features(),
            )
        })
    }
}

impl Drop for HostedInstance<'_> {
    fn drop(&mut self) {
        if let Some(cleanup) = self.descriptor.cleanup {
            unsafe { cleanup(self.handle) };
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct FileReport {
    pub relative: String,
    pub exists: bool,
    pub contents: Option<String>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct LifecycleReport {
    pub variant: Variant,
    pub state_dir: String,
    pub offered: Vec<&'static str>,
    pub instantiated: bool,
    pub save_status: Option<LV2_State_Status>,
    pub restore_status: Option<LV2_State_Status>,
    pub stored_number: Option<String>,
    pub files: Vec<FileReport>,
    pub paths_issued: usize,
    pub paths_freed: usize,
    pub map_calls: usize,
}

impl LifecycleReport {
    pub fn status_name(status: LV2_State_Status) -> &'static str {
        match status {
            LV2_STATE_SUCCESS => "success",
            LV2_STATE_ERR_NO_FEATURE => "no-feature",
            _ => "error",
        }
    }
}

/// Runs one full lifecycle of `variant` against `host`.
pub fn run_lifecycle(host: &SimulatedHost, variant: Variant) -> LifecycleReport {
    let mut save_status = None;
    let mut restore_status = None;
    let instantiated = match host.instantiate(descriptor(variant)) {
        Some(mut instance) => {
            instance.connect_ports();
            instance.activate();
            instance.run(BLOCK_SIZE);
            save_status = instance.save();
            instance.run(BLOCK_SIZE);
            restore_status = instance.restore();
            instance.run(BLOCK_SIZE);
            instance.deactivate();
            instance.run(BLOCK_SIZE);
            true
        }
        None => false,
    };

    let files = [SINGLE_FILE, NESTED_FILE]
        .into_iter()
        .map(|relative| {
            let path = host.state_dir().join(relative);
            let contents = std::fs::read_to_string(&path).ok();
            FileReport {
                relative: relative.to_string(),
                exists: path.exists(),
                contents,
            }
        })
        .collect();

    let options = host.options();
    let offered = [
        (options.urid_map, "urid:map"),
        (options.make_path, "state:makePath"),
        (options.free_path, "state:freePath"),
        (options.map_path, "state:mapPath"),
    ]
    .into_iter()
    .filter_map(|(enabled, name)| enabled.then_some(name))
    .collect();

    LifecycleReport {
        variant,
        state_dir: host.state_dir().to_string_lossy().into_owned(),
        offered,
        instantiated,
        save_status,
        restore_status,
        stored_number: host.stored_string(&variant.number_uri()),
        files,
        paths_issued: host.paths_issued(),
        paths_freed: host.paths_freed(),
        map_calls: host.map_calls(),
    }
}

fn handle_of<T>(value: &T) -> *mut c_void {
    (value as *const T).cast_mut().cast()
}

fn empty_sequence() -> LV2_Atom_Sequence {
    LV2_Atom_Sequence {
        atom: LV2_Atom {
            size: std::mem::size_of::<LV2_Atom_Sequence_Body>() as u32,
            atom_type: 0,
        },
        body: LV2_Atom_Sequence_Body { unit: 0, pad: 0 },
    }
}

fn host_string(text: &str) -> *mut c_char {
    match CString::new(text) {
        Ok(text) => unsafe { libc::strdup(text.as_ptr()) },
        Err(_) => ptr::null_mut(),
    }
}

unsafe extern "C" fn host_map(handle: *mut c_void, uri: *const c_char) -> LV2_URID {
    if handle.is_null() || uri.is_null() {
        return 0;
    }
    let table = unsafe { &*(handle as *const RefCell<Vec<String>>) };
    let uri = unsafe { CStr::from_ptr(uri) }.to_string_lossy().into_owned();
    let mut table = table.borrow_mut();
    if let Some(index) = table.iter().position(|known| *known == uri) {
        return index as LV2_URID + 1;
    }
    table.push(uri);
    table.len() as LV2_URID
}

unsafe extern "C" fn host_make_path(handle: *mut c_void, path: *const c_char) -> *mut c_char {
    if handle.is_null() || path.is_null() {
        return ptr::null_mut();
    }
    let context = unsafe { &*(handle as *const PathContext) };
    let relative = unsafe { CStr::from_ptr(path) }.to_string_lossy().into_owned();
    if Path::new(&relative).is_absolute() || relative.split('/').any(|part| part == "..") {
        return ptr::null_mut();
    }
    let full = if relative == "." {
        context.root.clone()
    } else {
        context.root.join(&relative)
    };
    if context.create_dirs {
        let dir = if relative == "." {
            Some(full.as_path())
        } else {
            full.parent()
        };
        if let Some(dir) = dir {
            if std::fs::create_dir_all(dir).is_err() {
                return ptr::null_mut();
            }
        }
    }
    let answer = host_string(&full.to_string_lossy());
    if !answer.is_null() {
        context.issued.set(context.issued.get() + 1);
    }
    answer
}

unsafe extern "C" fn host_free_path(handle: *mut c_void, path: *mut c_char) {
    if !handle.is_null() {
        let context = unsafe { &*(handle as *const PathContext) };
        context.freed.set(context.freed.get() + 1);
    }
    unsafe { libc::free(path.cast()) };
}

unsafe extern "C" fn host_abstract_path(
    handle: *mut c_void,
    absolute_path: *const c_char,
) -> *mut c_char {
    if handle.is_null() || absolute_path.is_null() {
        return ptr::null_mut();
    }
    let context = unsafe { &*(handle as *const PathContext) };
    context.mapped.set(context.mapped.get() + 1);
    let absolute = unsafe { CStr::from_ptr(absolute_path) }.to_string_lossy().into_owned();
    let answer = match Path::new(&absolute).strip_prefix(&context.root) {
        Ok(relative) => relative.to_string_lossy().into_owned(),
        Err(_) => absolute,
    };
    context.issued.set(context.issued.get() + 1);
    host_string(&answer)
}

unsafe extern "C" fn host_absolute_path(
    handle: *mut c_void,
    abstract_path: *const c_char,
) -> *mut c_char {
    if handle.is_null() || abstract_path.is_null() {
        return ptr::null_mut();
    }
    let context = unsafe { &*(handle as *const PathContext) };
    context.mapped.set(context.mapped.get() + 1);
    let abstract_path = unsafe { CStr::from_ptr(abstract_path) }
        .to_string_lossy()
        .into_owned();
    let path = Path::new(&abstract_path);
    let answer = if path.is_absolute() {
        abstract_path.clone()
    } else {
        context.root.join(path).to_string_lossy().into_owned()
    };
    context.issued.set(context.issued.get() + 1);
    host_string(&answer)
}

unsafe extern "C" fn host_store(
    handle: *mut c_void,
    key: LV2_URID,
    value: *const c_void,
    size: usize,
    value_type: LV2_URID,
    flags: u32,
) -> LV2_State_Status {
    if handle.is_null() || (value.is_null() && size != 0) {
        return crate::core::sys::LV2_STATE_ERR_UNKNOWN;
    }
    let properties = unsafe { &*(handle as *const RefCell<HashMap<LV2_URID, StoredProperty>>) };
    let value = if size == 0 {
        Vec::new()
    } else {
        unsafe { std::slice::from_raw_parts(value.cast::<u8>(), size) }.to_vec()
    };
    properties.borrow_mut().insert(
        key,
        StoredProperty {
            value,
            value_type,
            flags,
        },
    );
    LV2_STATE_SUCCESS
}

unsafe extern "C" fn host_retrieve(
    handle: *mut c_void,
    key: LV2_URID,
    size: *mut usize,
    value_type: *mut LV2_URID,
    flags: *mut u32,
) -> *const c_void {
    if handle.is_null() {
        return ptr::null();
    }
    let properties = unsafe { &*(handle as *const RefCell<HashMap<LV2_URID, StoredProperty>>) };
    let properties = properties.borrow();
    let Some(property) = properties.get(&key) else {
        return ptr::null();
    };
    unsafe {
        if !size.is_null() {
            *size = property.value.len();
        }
        if !value_type.is_null() {
            *value_type = property.value_type;
        }
        if !flags.is_null() {
            *flags = property.flags;
        }
    }
    property.value.as_ptr().cast()
}
