//! Host features offered to plugins.
//!
//! A plugin that *requires* a feature outside [`SUPPORTED_FEATURES`] is
//! rejected at discovery and never instantiated.

use crate::uris;

/// Every feature URI this host passes to `instantiate`.
pub const SUPPORTED_FEATURES: &[&str] = &[
    uris::URID_MAP,
    uris::URID_UNMAP,
    uris::OPTIONS_OPTIONS,
    uris::BUF_SIZE_POWER_OF_2_BLOCK_LENGTH,
    uris::BUF_SIZE_FIXED_BLOCK_LENGTH,
    uris::BUF_SIZE_BOUNDED_BLOCK_LENGTH,
];

pub fn feature_is_supported(uri: &str) -> bool {
    SUPPORTED_FEATURES.iter().any(|f| *f == uri)
}

#[cfg(feature = "lilv")]
pub(crate) use native::NativeFeatures;

#[cfg(feature = "lilv")]
mod native {
    use super::SUPPORTED_FEATURES;
    use crate::backend::InstantiateContext;
    use crate::urid::UridMap;
    use crate::uris;
    use lv2_raw::{LV2Feature, LV2Urid, LV2UridMap, LV2UridMapHandle};
    use std::ffi::{c_char, c_void, CStr, CString};
    use std::ptr;
    use std::sync::Arc;

    const LV2_OPTIONS_INSTANCE: u32 = 0;

    #[repr(C)]
    struct UridUnmap {
        handle: *mut c_void,
        unmap: extern "C" fn(*mut c_void, LV2Urid) -> *const c_char,
    }

    /// `LV2_Options_Option`
    #[repr(C)]
    struct OptionsOption {
        context: u32,
        subject: u32,
        key: u32,
        size: u32,
        type_: u32,
        value: *const c_void,
    }

    #[repr(C)]
    struct OptionValues {
        sample_rate: f32,
        block_length: i32,
        sequence_size: i32,
    }

    /// C-side feature array for one native instance.
    ///
    /// Everything a plugin may keep a pointer to lives in a `Box` owned here,
    /// and this value outlives the instance it was passed to.
    pub(crate) struct NativeFeatures {
        _uris: Vec<CString>,
        _map: Box<LV2UridMap>,
        _unmap: Box<UridUnmap>,
        _values: Box<OptionValues>,
        _options: Box<[OptionsOption; 5]>,
        _urid_map: Arc<UridMap>,
        features: Vec<LV2Feature>,
    }

    // SAFETY: the raw pointers all point into boxes owned by this struct or
    // into the `Arc<UridMap>` it holds, and `UridMap` is itself thread-safe.
    unsafe impl Send for NativeFeatures {}

    impl NativeFeatures {
        pub(crate) fn new(ctx: &InstantiateContext) -> Self {
            let urid_map = Arc::clone(&ctx.urid_map);
            let handle = Arc::as_ptr(&urid_map) as *mut c_void;

            let mut map = Box::new(LV2UridMap {
                handle: handle as LV2UridMapHandle,
                map: map_uri,
            });
            let mut unmap = Box::new(UridUnmap {
                handle,
                unmap: unmap_uri,
            });

            let values = Box::new(OptionValues {
                sample_rate: ctx.sample_rate as f32,
                block_length: ctx.block_size as i32,
                sequence_size: ctx.sequence_capacity as i32,
            });
            let urids = &ctx.urids;
            let int_size = std::mem::size_of::<i32>() as u32;
            let options = Box::new([
                OptionsOption {
                    context: LV2_OPTIONS_INSTANCE,
                    subject: 0,
                    key: urids.param_sample_rate,
                    size: std::mem::size_of::<f32>() as u32,
                    type_: urids.atom_float,
                    value: &values.sample_rate as *const f32 as *const c_void,
                },
                OptionsOption {
                    context: LV2_OPTIONS_INSTANCE,
                    subject: 0,
                    key: urids.bufsz_min_block_length,
                    size: int_size,
                    type_: urids.atom_int,
                    value: &values.block_length as *const i32 as *const c_void,
                },
                OptionsOption {
                    context: LV2_OPTIONS_INSTANCE,
                    subject: 0,
                    key: urids.bufsz_max_block_length,
                    size: int_size,
                    type_: urids.atom_int,
                    value: &values.block_length as *const i32 as *const c_void,
                },
                OptionsOption {
                    context: LV2_OPTIONS_INSTANCE,
                    subject: 0,
                    key: urids.bufsz_sequence_size,
                    size: int_size,
                    type_: urids.atom_int,
                    value: &values.sequence_size as *const i32 as *const c_void,
                },
                OptionsOption {
                    context: LV2_OPTIONS_INSTANCE,
                    subject: 0,
                    key: 0,
                    size: 0,
                    type_: 0,
                    value: ptr::null(),
                },
            ]);

            let uris: Vec<CString> = SUPPORTED_FEATURES
                .iter()
                .filter_map(|uri| CString::new(*uri).ok())
                .collect();

            let features = uris
                .iter()
                .map(|uri| {
                    let data: *mut c_void = match uri.to_str().unwrap_or_default() {
                        uris::URID_MAP => (&mut *map as *mut LV2UridMap).cast(),
                        uris::URID_UNMAP => (&mut *unmap as *mut UridUnmap).cast(),
                        uris::OPTIONS_OPTIONS => options.as_ptr() as *mut c_void,
                        _ => ptr::null_mut(),
                    };
                    LV2Feature {
                        uri: uri.as_ptr(),
                        data,
                    }
                })
                .collect();

            Self {
                _uris: uris,
                _map: map,
                _unmap: unmap,
                _values: values,
                _options: options,
                _urid_map: urid_map,
                features,
            }
        }

        pub(crate) fn features(&self) -> impl Iterator<Item = &LV2Feature> {
            self.features.iter()
        }
    }

    extern "C" fn map_uri(handle: LV2UridMapHandle, uri: *const c_char) -> LV2Urid {
        if handle.is_null() || uri.is_null() {
            return 0;
        }
        // SAFETY: `handle` is the `Arc<UridMap>` pointer stored by
        // `NativeFeatures::new`, kept alive by the same `NativeFeatures`.
        let map = unsafe { &*(handle as *const UridMap) };
        // SAFETY: the plugin passes a NUL-terminated string.
        match unsafe { CStr::from_ptr(uri) }.to_str() {
            Ok(uri) => map.intern(uri),
            Err(_) => 0,
        }
    }

    extern "C" fn unmap_uri(handle: *mut c_void, urid: LV2Urid) -> *const c_char {
        if handle.is_null() {
            return ptr::null();
        }
        // SAFETY: see `map_uri`.
        let map = unsafe { &*(handle as *const UridMap) };
        map.resolve_ptr(urid)
    }
}
