//! Purpose: LV2 C ABI bridge exporting the four state-test plugin descriptors.
//! Exports: `lv2_descriptor`, `descriptor`, `state_interface`.
//! Role: Converts raw host pointers into `StateTest` calls; no plugin logic lives here.
//! Invariants: Instance handles are boxed `StateTest` values released only by `cleanup`.
//! Invariants: Null handles are ignored by every callback; nothing here panics across FFI.
//! Notes: save/restore fall back to instantiate-time freePath and mapPath, never makePath.

use std::ffi::CStr;
use std::os::raw::{c_char, c_void};
use std::ptr;

use crate::core::error::{Error, ErrorKind, to_state_status};
use crate::core::features::HostFeatures;
use crate::core::instance::{Property, PropertyRetrieve, PropertyStore, StateTest};
use crate::core::log::Logger;
use crate::core::sys::{
    LV2_Descriptor, LV2_Feature, LV2_Handle, LV2_STATE__interface, LV2_STATE_ERR_UNKNOWN,
    LV2_STATE_SUCCESS, LV2_State_Interface, LV2_State_Retrieve_Function, LV2_State_Status,
    LV2_State_Store_Function, LV2_URID,
};
use crate::core::variant::Variant;

const fn plugin_descriptor(uri: &'static CStr) -> LV2_Descriptor {
    LV2_Descriptor {
        uri: uri.as_ptr(),
        instantiate: Some(instantiate),
        connect_port: Some(connect_port),
        activate: Some(activate),
        run: Some(run),
        deactivate: Some(deactivate),
        cleanup: Some(cleanup),
        extension_data: Some(extension_data),
    }
}

static DESCRIPTORS: [LV2_Descriptor; 4] = [
    plugin_descriptor(c"https://git.kx.studio/falkTX/lv2-state-test"),
    plugin_descriptor(c"urn:lv2-state-test:paths"),
    plugin_descriptor(c"urn:lv2-state-test:save-only"),
    plugin_descriptor(c"urn:lv2-state-test:flags-only"),
];

static STATE_INTERFACE: LV2_State_Interface = LV2_State_Interface { save, restore };

#[unsafe(no_mangle)]
pub extern "C" fn lv2_descriptor(index: u32) -> *const LV2_Descriptor {
    match Variant::from_index(index) {
        Some(variant) => descriptor(variant),
        None => ptr::null(),
    }
}

pub fn descriptor(variant: Variant) -> &'static LV2_Descriptor {
    &DESCRIPTORS[variant.index() as usize]
}

pub fn state_interface() -> &'static LV2_State_Interface {
    &STATE_INTERFACE
}

fn variant_for(descriptor: *const LV2_Descriptor) -> Option<Variant> {
    if descriptor.is_null() {
        return None;
    }
    if let Some(index) = DESCRIPTORS.iter().position(|known| ptr::eq(known, descriptor)) {
        return Variant::from_index(index as u32);
    }
    // Hosts may hand back a copy of the descriptor; match on URI instead.
    let uri = unsafe { (*descriptor).uri };
    if uri.is_null() {
        return None;
    }
    let uri = unsafe { CStr::from_ptr(uri) }.to_str().ok()?;
    Variant::ALL
        .into_iter()
        .find(|variant| variant.uri() == uri)
}

unsafe extern "C" fn instantiate(
    descriptor: *const LV2_Descriptor,
    _sample_rate: f64,
    _bundle_path: *const c_char,
    features: *const *const LV2_Feature,
) -> LV2_Handle {
    let Some(variant) = variant_for(descriptor) else {
        Logger::tracing().error("state-test init, unknown descriptor");
        return ptr::null_mut();
    };
    match unsafe { StateTest::instantiate(variant, features) } {
        Ok(instance) => Box::into_raw(Box::new(instance)).cast(),
        Err(err) => {
            Logger::tracing().error(&format!("state-test init failed: {err}"));
            ptr::null_mut()
        }
    }
}

unsafe fn borrow_instance<'a>(handle: LV2_Handle) -> Option<&'a mut StateTest> {
    unsafe { handle.cast::<StateTest>().as_mut() }
}

unsafe extern "C" fn connect_port(handle: LV2_Handle, port: u32, data: *mut c_void) {
    if let Some(instance) = unsafe { borrow_instance(handle) } {
        instance.connect_port(port, data);
    }
}

unsafe extern "C" fn activate(handle: LV2_Handle) {
    if let Some(instance) = unsafe { borrow_instance(handle) } {
        instance.activate();
    }
}

unsafe extern "C" fn run(handle: LV2_Handle, sample_count: u32) {
    if let Some(instance) = unsafe { borrow_instance(handle) } {
        instance.run(sample_count);
    }
}

unsafe extern "C" fn deactivate(handle: LV2_Handle) {
    if let Some(instance) = unsafe { borrow_instance(handle) } {
        instance.deactivate();
    }
}

unsafe extern "C" fn cleanup(handle: LV2_Handle) {
    if handle.is_null() {
        return;
    }
    unsafe {
        drop(Box::from_raw(handle.cast::<StateTest>()));
    }
}

unsafe extern "C" fn extension_data(uri: *const c_char) -> *const c_void {
    if uri.is_null() {
        return ptr::null();
    }
    let uri = unsafe { CStr::from_ptr(uri) };
    if uri.to_bytes() == LV2_STATE__interface.as_bytes() {
        return (&STATE_INTERFACE as *const LV2_State_Interface).cast();
    }
    ptr::null()
}

unsafe fn callback_features(
    instance: &StateTest,
    features: *const *const LV2_Feature,
) -> HostFeatures {
    let fallback = HostFeatures {
        make_path: None,
        ..instance.features()
    };
    unsafe { HostFeatures::scan(features) }.or(fallback)
}

unsafe extern "C" fn save(
    handle: LV2_Handle,
    store: Option<LV2_State_Store_Function>,
    store_handle: *mut c_void,
    _flags: u32,
    features: *const *const LV2_Feature,
) -> LV2_State_Status {
    let Some(instance) = (unsafe { borrow_instance(handle) }) else {
        return LV2_STATE_ERR_UNKNOWN;
    };
    let features = unsafe { callback_features(instance, features) };
    let services = unsafe { features.path_services() };
    let mut host_store = store.map(|store| HostStore {
        store,
        handle: store_handle,
    });
    instance.save(
        host_store
            .as_mut()
            .map(|store| store as &mut dyn PropertyStore),
        &services,
    );
    LV2_STATE_SUCCESS
}

unsafe extern "C" fn restore(
    handle: LV2_Handle,
    retrieve: Option<LV2_State_Retrieve_Function>,
    retrieve_handle: *mut c_void,
    _flags: u32,
    features: *const *const LV2_Feature,
) -> LV2_State_Status {
    let Some(instance) = (unsafe { borrow_instance(handle) }) else {
        return LV2_STATE_ERR_UNKNOWN;
    };
    let features = unsafe { callback_features(instance, features) };
    let services = unsafe { features.path_services() };
    let host_retrieve = retrieve.map(|retrieve| HostRetrieve {
        retrieve,
        handle: retrieve_handle,
    });
    let result = instance.restore(
        host_retrieve
            .as_ref()
            .map(|retrieve| retrieve as &dyn PropertyRetrieve),
        &services,
    );
    if let Err(err) = &result {
        instance
            .logger()
            .note(&format!("state-test restore failed: {err}"));
    }
    status_of(result)
}

fn status_of(result: Result<(), Error>) -> LV2_State_Status {
    match result {
        Ok(()) => LV2_STATE_SUCCESS,
        Err(err) => to_state_status(err.kind()),
    }
}

struct HostStore {
    store: LV2_State_Store_Function,
    handle: *mut c_void,
}

impl PropertyStore for HostStore {
    fn store(&mut self, key: LV2_URID, property: Property<'_>) -> Result<(), Error> {
        let status = unsafe {
            (self.store)(
                self.handle,
                key,
                property.value.as_ptr().cast(),
                property.value.len(),
                property.value_type,
                property.flags,
            )
        };
        if status == LV2_STATE_SUCCESS {
            Ok(())
        } else {
            Err(Error::new(ErrorKind::Host).with_message(format!("store returned status {status}")))
        }
    }
}

struct HostRetrieve {
    retrieve: LV2_State_Retrieve_Function,
    handle: *mut c_void,
}

impl PropertyRetrieve for HostRetrieve {
    fn retrieve(&self, key: LV2_URID) -> Option<Property<'_>> {
        let mut size = 0usize;
        let mut value_type: LV2_URID = 0;
        let mut flags = 0u32;
        let value = unsafe {
            (self.retrieve)(self.handle, key, &mut size, &mut value_type, &mut flags)
        };
        if value.is_null() {
            return None;
        }
        let value = unsafe { std::slice::from_raw_parts(value.cast::<u8>(), size) };
        Some(Property {
            value,
            value_type,
            flags,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{descriptor, extension_data, lv2_descriptor, state_interface, variant_for};
    use crate::core::variant::Variant;
    use std::ffi::CStr;

    #[test]
    fn descriptors_cover_every_variant_then_end() {
        for variant in Variant::ALL {
            let desc = lv2_descriptor(variant.index());
            assert!(!desc.is_null());
            let uri = unsafe { CStr::from_ptr((*desc).uri) }.to_str().expect("utf8");
            assert_eq!(uri, variant.uri());
            assert_eq!(variant_for(desc), Some(variant));
        }
        assert!(lv2_descriptor(4).is_null());
    }

    #[test]
    fn copied_descriptor_is_matched_by_uri() {
        let stock = descriptor(Variant::SaveOnly);
        let copy = crate::core::sys::LV2_Descriptor {
            uri: stock.uri,
            instantiate: stock.instantiate,
            connect_port: stock.connect_port,
            activate: stock.activate,
            run: stock.run,
            deactivate: stock.deactivate,
            cleanup: stock.cleanup,
            extension_data: stock.extension_data,
        };
        assert_eq!(variant_for(&copy), Some(Variant::SaveOnly));
    }

    #[test]
    fn only_state_interface_is_exposed() {
        let state = unsafe { extension_data(c"http://lv2plug.in/ns/ext/state#interface".as_ptr()) };
        let expected: *const std::os::raw::c_void =
            (state_interface() as *const crate::core::sys::LV2_State_Interface).cast();
        assert_eq!(state, expected);
        let other = unsafe { extension_data(c"http://lv2plug.in/ns/ext/worker#interface".as_ptr()) };
        assert!(other.is_null());
        assert!(unsafe { extension_data(std::ptr::null()) }.is_null());
    }
}
