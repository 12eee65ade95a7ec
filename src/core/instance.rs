//! Purpose: The per-instance record and its lifecycle/state operations in safe Rust.
//! Exports: `StateTest`, `LifecycleEvent`, `PropertyStore`, `PropertyRetrieve`, `Property`, ports.
//! Role: Everything the C callbacks do, minus pointer handling, lives here.
//! Invariants: A lifecycle flag is set by exactly one callback and cleared by the next `run`.
//! Invariants: Only a missing urid:map prevents construction; other gaps are logged.

use std::ffi::c_void;

use crate::core::error::{Error, ErrorKind};
use crate::core::features::HostFeatures;
use crate::core::log::Logger;
use crate::core::paths::PathServices;
use crate::core::probe::{BASE_PATH, ProbeReport, ProbeStage, SINGLE_FILE, create_paths};
use crate::core::sys::{
    LV2_ATOM__String, LV2_STATE__makePath, LV2_STATE_IS_POD, LV2_STATE_IS_PORTABLE,
    LV2_URID, LV2_URID__map,
};
use crate::core::urid::map_uri;
use crate::core::variant::Variant;

pub const PORT_SEQ_IN: u32 = 0;
pub const PORT_SEQ_OUT: u32 = 1;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LifecycleEvent {
    Deactivated,
    Activated,
    Restored,
    Saved,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct LifecycleFlags {
    pub activated: bool,
    pub deactivated: bool,
    pub saved: bool,
    pub restored: bool,
}

/// A property value handed to or from the host.
#[derive(Clone, Copy, Debug)]
pub struct Property<'a> {
    pub value: &'a [u8],
    pub value_type: LV2_URID,
    pub flags: u32,
}

/// Host-side sink for `save`.
pub trait PropertyStore {
    fn store(&mut self, key: LV2_URID, property: Property<'_>) -> Result<(), Error>;
}

/// Host-side source for `restore`.
pub trait PropertyRetrieve {
    fn retrieve(&self, key: LV2_URID) -> Option<Property<'_>>;
}

#[derive(Clone, Copy, Debug)]
struct StateUrids {
    number: LV2_URID,
    atom_string: LV2_URID,
}

#[derive(Debug)]
pub struct StateTest {
    variant: Variant,
    flags: LifecycleFlags,
    logger: Logger,
    seq_in: *const c_void,
    seq_out: *mut c_void,
    features: HostFeatures,
    sentinel: String,
    urids: StateUrids,
    last_probe: Option<ProbeReport>,
}

impl StateTest {
    /// Builds an instance from the features passed to `instantiate`.
    ///
    /// # Safety
    /// `features` must be null or a valid null-terminated LV2 feature array
    /// whose data outlives the instance.
    pub unsafe fn instantiate(
        variant: Variant,
        features: *const *const crate::core::sys::LV2_Feature,
    ) -> Result<Self, Error> {
        let features = unsafe { HostFeatures::scan(features) };
        let map = features.urid_map.ok_or_else(|| {
            Error::new(ErrorKind::MissingFeature)
                .with_message("uridMap feature missing")
                .with_feature(LV2_URID__map)
        })?;
        let map = unsafe { map.as_ref() };
        let logger = unsafe { Logger::new(map, features.log) };
        let urids = unsafe {
            StateUrids {
                number: map_uri(map, &variant.number_uri()),
                atom_string: map_uri(map, LV2_ATOM__String),
            }
        };

        let mut instance = Self {
            variant,
            flags: LifecycleFlags::default(),
            logger,
            seq_in: std::ptr::null(),
            seq_out: std::ptr::null_mut(),
            features,
            sentinel: random_sentinel(),
            urids,
            last_probe: None,
        };

        if variant.probes_on_init() {
            let services = unsafe { features.path_services() };
            if services.has_make_path() {
                let report = create_paths(
                    &services,
                    &instance.logger,
                    &instance.sentinel,
                    ProbeStage::Init,
                    variant.writes_sentinel(),
                );
                instance.last_probe = Some(report);
            } else {
                instance
                    .logger
                    .note("state-test init, host does not have makePath");
            }
        }

        Ok(instance)
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    pub fn flags(&self) -> LifecycleFlags {
        self.flags
    }

    pub fn sentinel(&self) -> &str {
        &self.sentinel
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    pub fn features(&self) -> HostFeatures {
        self.features
    }

    pub fn last_probe(&self) -> Option<&ProbeReport> {
        self.last_probe.as_ref()
    }

    pub fn connect_port(&mut self, port: u32, data: *mut c_void) {
        match port {
            PORT_SEQ_IN => self.seq_in = data.cast_const(),
            PORT_SEQ_OUT => self.seq_out = data,
            _ => {}
        }
    }

    pub fn ports_connected(&self) -> bool {
        !self.seq_in.is_null() && !self.seq_out.is_null()
    }

    pub fn activate(&mut self) {
        self.flags.activated = true;
    }

    pub fn deactivate(&mut self) {
        self.flags.deactivated = true;
    }

    /// Observes and clears pending lifecycle flags, in a fixed order.
    pub fn run(&mut self, _sample_count: u32) -> Vec<LifecycleEvent> {
        let mut observed = Vec::new();
        if std::mem::take(&mut self.flags.deactivated) {
            self.logger.trace("plugin was deactivated");
            observed.push(LifecycleEvent::Deactivated);
        }
        if std::mem::take(&mut self.flags.activated) {
            self.logger.trace("plugin was activated");
            observed.push(LifecycleEvent::Activated);
        }
        if std::mem::take(&mut self.flags.restored) {
            self.logger.trace("plugin state was restored");
            observed.push(LifecycleEvent::Restored);
        }
        if std::mem::take(&mut self.flags.saved) {
            self.logger.trace("plugin state was saved");
            observed.push(LifecycleEvent::Saved);
        }
        observed
    }

    /// Probes and persists as the variant dictates. Store failures are logged,
    /// never returned: the host always sees a successful save.
    pub fn save(&mut self, store: Option<&mut dyn PropertyStore>, services: &PathServices<'_>) {
        if self.variant.probes_on_save() {
            if services.has_make_path() {
                let report = create_paths(
                    services,
                    &self.logger,
                    &self.sentinel,
                    ProbeStage::Save,
                    self.variant.writes_sentinel(),
                );
                self.last_probe = Some(report);
            } else {
                self.logger
                    .note("state-test save, host does not have makePath");
            }
        }

        if self.variant.persists_number() {
            if let Err(err) = self.store_number(store) {
                self.logger
                    .error(&format!("state-test save, failed to store number: {err}"));
            }
        }

        self.flags.saved = true;
    }

    pub fn restore(
        &mut self,
        retrieve: Option<&dyn PropertyRetrieve>,
        services: &PathServices<'_>,
    ) -> Result<(), Error> {
        if self.variant.queries_path_on_restore() {
            if !services.has_make_path() {
                if self.variant.restore_requires_make_path() {
                    return Err(Error::new(ErrorKind::MissingFeature)
                        .with_message("host does not have makePath")
                        .with_feature(LV2_STATE__makePath));
                }
                self.logger
                    .note("state-test restore, host does not have makePath");
            } else {
                match services.make_path(BASE_PATH) {
                    Ok(path) => self
                        .logger
                        .note(&format!("state-test restore ok, path is: '{path}'")),
                    Err(_) => self
                        .logger
                        .note("state-test restore ok, but failed to get initial path"),
                }
            }
        }

        if self.variant.reads_back_number() {
            self.read_back_number(retrieve);
            if services.has_map_path() && services.has_make_path() {
                self.log_mapped_path(services);
            }
        }

        self.flags.restored = true;
        Ok(())
    }

    fn store_number(&self, store: Option<&mut dyn PropertyStore>) -> Result<(), Error> {
        let store = store.ok_or_else(|| {
            Error::new(ErrorKind::Host).with_message("host passed no store function")
        })?;
        let mut value = self.sentinel.clone().into_bytes();
        value.push(0);
        store.store(
            self.urids.number,
            Property {
                value: &value,
                value_type: self.urids.atom_string,
                flags: LV2_STATE_IS_POD | LV2_STATE_IS_PORTABLE,
            },
        )
    }

    fn read_back_number(&mut self, retrieve: Option<&dyn PropertyRetrieve>) {
        let Some(property) = retrieve.and_then(|retrieve| retrieve.retrieve(self.urids.number))
        else {
            self.logger
                .warning("state-test restore, no saved number to read back");
            return;
        };
        if property.value_type != self.urids.atom_string {
            self.logger.warning(&format!(
                "state-test restore, saved number has unexpected type {}",
                property.value_type
            ));
            return;
        }
        let bytes = property.value.split(|b| *b == 0).next().unwrap_or_default();
        let restored = String::from_utf8_lossy(bytes).into_owned();
        let matches = restored == self.sentinel;
        self.logger.note(&format!(
            "state-test restore, read back number '{restored}' (matches current = {matches})"
        ));
        self.sentinel = restored;
    }

    fn log_mapped_path(&self, services: &PathServices<'_>) {
        let Ok(absolute) = services.make_path(SINGLE_FILE) else {
            return;
        };
        let absolute = absolute.to_string_lossy();
        match services.abstract_path(&absolute) {
            Ok(abstract_path) => {
                let abstract_path = abstract_path.to_string_lossy();
                let round_trip = services
                    .absolute_path(&abstract_path)
                    .map(|path| path.to_string_lossy())
                    .unwrap_or_default();
                self.logger.note(&format!(
                    "state-test restore, mapPath '{absolute}' -> '{abstract_path}' -> '{round_trip}'"
                ));
            }
            Err(err) => self
                .logger
                .warning(&format!("state-test restore, mapPath failed: {err}")),
        }
    }
}

fn random_sentinel() -> String {
    let mut bytes = [0u8; 4];
    let value = match getrandom::fill(&mut bytes) {
        Ok(()) => u32::from_ne_bytes(bytes) & 0x7fff_ffff,
        Err(_) => std::process::id(),
    };
    value.to_string()
}

#[cfg(test)]
mod tests {
    use super::{LifecycleEvent, Property, PropertyRetrieve, PropertyStore, StateTest};
    use crate::core::error::{Error, ErrorKind};
    use crate::core::paths::PathServices;
    use crate::core::sys::{LV2_Feature, LV2_URID, LV2_URID__map, LV2_URID_Map};
    use crate::core::variant::Variant;
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::ffi::{CStr, CString};
    use std::os::raw::{c_char, c_void};
    use std::ptr;

    unsafe extern "C" fn map(handle: *mut c_void, uri: *const c_char) -> LV2_URID {
        let table = unsafe { &*(handle as *const RefCell<Vec<String>>) };
        let uri = unsafe { CStr::from_ptr(uri) }.to_string_lossy().into_owned();
        let mut table = table.borrow_mut();
        if let Some(index) = table.iter().position(|known| *known == uri) {
            return index as LV2_URID + 1;
        }
        table.push(uri);
        table.len() as LV2_URID
    }

    #[derive(Default)]
    struct MemoryState {
        values: HashMap<LV2_URID, (Vec<u8>, LV2_URID, u32)>,
    }

    impl PropertyStore for MemoryState {
        fn store(&mut self, key: LV2_URID, property: Property<'_>) -> Result<(), Error> {
            self.values.insert(
                key,
                (property.value.to_vec(), property.value_type, property.flags),
            );
            Ok(())
        }
    }

    impl PropertyRetrieve for MemoryState {
        fn retrieve(&self, key: LV2_URID) -> Option<Property<'_>> {
            self.values.get(&key).map(|(value, value_type, flags)| Property {
                value,
                value_type: *value_type,
                flags: *flags,
            })
        }
    }

    struct FailingStore;

    impl PropertyStore for FailingStore {
        fn store(&mut self, _key: LV2_URID, _property: Property<'_>) -> Result<(), Error> {
            Err(Error::new(ErrorKind::Host).with_message("store refused"))
        }
    }

    struct Fixture {
        _table: Box<RefCell<Vec<String>>>,
        _map: Box<LV2_URID_Map>,
        _uri: CString,
        _feature: Box<LV2_Feature>,
        array: Vec<*const LV2_Feature>,
    }

    impl Fixture {
        fn new() -> Self {
            let table = Box::new(RefCell::new(Vec::new()));
            let map = Box::new(LV2_URID_Map {
                handle: (&*table as *const RefCell<Vec<String>>).cast_mut().cast(),
                map,
            });
            let uri = CString::new(LV2_URID__map).unwrap();
            let feature = Box::new(LV2_Feature {
                uri: uri.as_ptr(),
                data: (&*map as *const LV2_URID_Map).cast_mut().cast(),
            });
            let array = vec![&*feature as *const LV2_Feature, ptr::null()];
            Self {
                _table: table,
                _map: map,
                _uri: uri,
                _feature: feature,
                array,
            }
        }

        fn instantiate(&self, variant: Variant) -> StateTest {
            unsafe { StateTest::instantiate(variant, self.array.as_ptr()) }.expect("instance")
        }
    }

    #[test]
    fn missing_urid_map_yields_no_instance() {
        let array = [ptr::null::<LV2_Feature>()];
        let err = unsafe { StateTest::instantiate(Variant::Full, array.as_ptr()) }
            .expect_err("err");
        assert_eq!(err.kind(), ErrorKind::MissingFeature);
    }

    #[test]
    fn flags_are_set_then_cleared_within_one_cycle() {
        let fixture = Fixture::new();
        let mut instance = fixture.instantiate(Variant::FlagsOnly);
        instance.activate();
        assert!(instance.flags().activated);

        assert_eq!(instance.run(64), vec![LifecycleEvent::Activated]);
        assert!(!instance.flags().activated);
        assert!(instance.run(64).is_empty());

        instance.deactivate();
        instance.activate();
        instance.save(None, &PathServices::default());
        instance
            .restore(None, &PathServices::default())
            .expect("restore");
        assert_eq!(
            instance.run(64),
            vec![
                LifecycleEvent::Deactivated,
                LifecycleEvent::Activated,
                LifecycleEvent::Restored,
                LifecycleEvent::Saved,
            ]
        );
        assert_eq!(instance.flags(), Default::default());
    }

    #[test]
    fn ports_are_wired_by_index() {
        let fixture = Fixture::new();
        let mut instance = fixture.instantiate(Variant::FlagsOnly);
        let mut input = 0u64;
        let mut output = 0u64;
        instance.connect_port(0, (&mut input as *mut u64).cast());
        assert!(!instance.ports_connected());
        instance.connect_port(7, ptr::null_mut());
        instance.connect_port(1, (&mut output as *mut u64).cast());
        assert!(instance.ports_connected());
    }

    #[test]
    fn full_save_stores_terminated_string_and_restore_needs_make_path() {
        let fixture = Fixture::new();
        let mut saver = fixture.instantiate(Variant::Full);
        let mut state = MemoryState::default();
        saver.save(Some(&mut state), &PathServices::default());
        assert_eq!(state.values.len(), 1);
        let (value, _, flags) = state.values.values().next().expect("value");
        assert_eq!(value.last(), Some(&0));
        assert_eq!(*flags, 3);

        let mut restorer = fixture.instantiate(Variant::Full);
        assert_ne!(restorer.sentinel(), "");
        let err = restorer
            .restore(Some(&state), &PathServices::default())
            .expect_err("full variant needs makePath on restore");
        assert_eq!(err.kind(), ErrorKind::MissingFeature);
        assert!(!restorer.flags().restored);
    }

    #[test]
    fn simpler_variants_restore_without_make_path() {
        let fixture = Fixture::new();
        for variant in [Variant::Paths, Variant::SaveOnly, Variant::FlagsOnly] {
            let mut instance = fixture.instantiate(variant);
            instance
                .restore(None, &PathServices::default())
                .expect("restore");
            assert!(instance.flags().restored);
        }
    }

    #[test]
    fn store_failure_is_logged_and_save_still_completes() {
        let fixture = Fixture::new();
        for variant in [Variant::Full, Variant::Paths] {
            let mut instance = fixture.instantiate(variant);
            let mut store = FailingStore;
            instance.save(Some(&mut store), &PathServices::default());
            assert!(instance.flags().saved, "{variant}");

            let mut missing = fixture.instantiate(variant);
            missing.save(None, &PathServices::default());
            assert!(missing.flags().saved, "{variant}");
        }
    }

    #[test]
    fn read_back_adopts_a_number_saved_by_another_instance() {
        let fixture = Fixture::new();
        let mut saver = fixture.instantiate(Variant::Full);
        let mut state = MemoryState::default();
        saver.save(Some(&mut state), &PathServices::default());

        let mut restorer = fixture.instantiate(Variant::Full);
        restorer.read_back_number(Some(&state));
        assert_eq!(restorer.sentinel(), saver.sentinel());
    }

    #[test]
    fn read_back_keeps_sentinel_when_number_is_missing() {
        let fixture = Fixture::new();
        let mut instance = fixture.instantiate(Variant::Full);
        let before = instance.sentinel().to_string();
        instance.read_back_number(Some(&MemoryState::default()));
        assert_eq!(instance.sentinel(), before);
        instance.read_back_number(None);
        assert_eq!(instance.sentinel(), before);
    }

    #[test]
    fn read_back_ignores_number_with_wrong_type() {
        let fixture = Fixture::new();
        let mut instance = fixture.instantiate(Variant::Full);
        let before = instance.sentinel().to_string();
        let mut state = MemoryState::default();
        state.values.insert(
            instance.urids.number,
            (b"12345\0".to_vec(), instance.urids.atom_string + 100, 3),
        );
        instance.read_back_number(Some(&state));
        assert_eq!(instance.sentinel(), before);
    }

    #[test]
    fn save_only_persists_nothing() {
        let fixture = Fixture::new();
        let mut instance = fixture.instantiate(Variant::SaveOnly);
        let mut state = MemoryState::default();
        instance.save(Some(&mut state), &PathServices::default());
        assert!(state.values.is_empty());
        assert!(instance.last_probe().is_none());
    }

    #[test]
    fn sentinel_is_a_decimal_number() {
        let fixture = Fixture::new();
        let instance = fixture.instantiate(Variant::Full);
        assert!(instance.sentinel().parse::<u32>().is_ok());
    }
}
