//! Process-wide plugin registry.
//!
//! Discovery runs once. After that the descriptor list and the URID table
//! are only ever read (the table may still grow when plugins map new URIs,
//! but existing ids never change).

use crate::backend::PluginSource;
use crate::descriptor::PluginDescriptor;
use crate::error::Incompatibility;
use crate::features;
use crate::urid::{Urid, UridMap};
use crate::uris::Urids;
use crate::{HostError, Result};
use std::sync::{Arc, OnceLock};
use tracing::{info, warn};

/// A discovered plugin that will never be instantiated.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejected {
    pub uri: String,
    pub name: String,
    pub reasons: Vec<Incompatibility>,
}

#[derive(Default)]
struct Discovered {
    descriptors: Vec<Arc<PluginDescriptor>>,
    rejected: Vec<Rejected>,
}

pub struct Registry {
    source: Box<dyn PluginSource>,
    urid_map: Arc<UridMap>,
    urids: Urids,
    discovered: OnceLock<Discovered>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("discovered", &self.discovered.get().map(|d| d.descriptors.len()))
            .field("urids", &self.urid_map.len())
            .finish_non_exhaustive()
    }
}

impl Registry {
    pub fn new(source: impl PluginSource + 'static) -> Self {
        let urid_map = Arc::new(UridMap::new());
        let urids = Urids::new(&urid_map);
        Self {
            source: Box::new(source),
            urid_map,
            urids,
            discovered: OnceLock::new(),
        }
    }

    /// Scans the source. Only the first call does any work.
    pub fn discover(&self) {
        self.discovered();
    }

    fn discovered(&self) -> &Discovered {
        self.discovered.get_or_init(|| {
            let mut found = Discovered::default();
            for info in self.source.scan() {
                if found.descriptors.iter().any(|d| d.uri() == info.uri)
                    || found.rejected.iter().any(|r| r.uri == info.uri)
                {
                    warn!("Skipping duplicate plugin <{}>", info.uri);
                    continue;
                }

                let descriptor = PluginDescriptor::from_info(info);
                if descriptor.is_compatible() {
                    found.descriptors.push(Arc::new(descriptor));
                } else {
                    let err = HostError::Incompatible {
                        uri: descriptor.uri().to_string(),
                        reasons: descriptor.incompatibilities().to_vec(),
                    };
                    warn!("{}", err);
                    found.rejected.push(Rejected {
                        uri: descriptor.uri().to_string(),
                        name: descriptor.name().to_string(),
                        reasons: descriptor.incompatibilities().to_vec(),
                    });
                }
            }
            info!(
                "Discovered {} usable plugins ({} rejected)",
                found.descriptors.len(),
                found.rejected.len()
            );
            found
        })
    }

    pub fn descriptor(&self, uri: &str) -> Option<Arc<PluginDescriptor>> {
        self.discovered()
            .descriptors
            .iter()
            .find(|d| d.uri() == uri)
            .cloned()
    }

    pub fn descriptor_at(&self, index: usize) -> Result<Arc<PluginDescriptor>> {
        let descriptors = &self.discovered().descriptors;
        descriptors
            .get(index)
            .cloned()
            .ok_or(HostError::IndexOutOfRange {
                index,
                len: descriptors.len(),
            })
    }

    pub fn number_of_plugins(&self) -> usize {
        self.discovered().descriptors.len()
    }

    pub fn descriptors(&self) -> &[Arc<PluginDescriptor>] {
        &self.discovered().descriptors
    }

    pub fn rejected(&self) -> &[Rejected] {
        &self.discovered().rejected
    }

    pub fn intern_uri(&self, uri: &str) -> Urid {
        self.urid_map.intern(uri)
    }

    pub fn resolve_uri(&self, id: Urid) -> Result<String> {
        self.urid_map.resolve(id)
    }

    pub fn urid_map(&self) -> &Arc<UridMap> {
        &self.urid_map
    }

    pub fn urids(&self) -> &Urids {
        &self.urids
    }

    pub fn feature_is_supported(&self, uri: &str) -> bool {
        features::feature_is_supported(uri)
    }
}

static REGISTRY: OnceLock<Arc<Registry>> = OnceLock::new();

/// The process-wide registry, created with the default source on first use.
pub fn registry() -> Arc<Registry> {
    Arc::clone(REGISTRY.get_or_init(|| Arc::new(Registry::new(default_source()))))
}

/// Installs the process-wide registry with a specific source.
///
/// Fails if [`registry`] or `init_registry` already ran.
pub fn init_registry(source: impl PluginSource + 'static) -> Result<Arc<Registry>> {
    let mut installed = false;
    let registry = REGISTRY.get_or_init(|| {
        installed = true;
        Arc::new(Registry::new(source))
    });
    if installed {
        Ok(Arc::clone(registry))
    } else {
        Err(HostError::RegistryAlreadyInitialized)
    }
}

#[cfg(feature = "lilv")]
fn default_source() -> impl PluginSource {
    crate::lilv_backend::LilvSource::new()
}

#[cfg(not(feature = "lilv"))]
fn default_source() -> impl PluginSource {
    crate::backend::EmptySource
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::EmptySource;
    use crate::mock::{MockPluginSpec, MockSource};
    use crate::uris;

    fn source() -> MockSource {
        MockSource::new()
            .with_plugin(MockPluginSpec::stereo_synth("urn:test:synth"))
            .with_plugin(MockPluginSpec::mono_synth("urn:test:mono"))
            .with_plugin(MockPluginSpec::new("urn:test:broken").name("Broken"))
    }

    #[test]
    fn test_discover_runs_scan_once() {
        let source = source();
        let scans = source.scan_counter();
        let registry = Registry::new(source);
        assert_eq!(scans.get(), 0);

        registry.discover();
        registry.discover();
        assert_eq!(registry.number_of_plugins(), 2);
        assert_eq!(scans.get(), 1);
    }

    #[test]
    fn test_lookup_by_uri_and_index() {
        let registry = Registry::new(source());
        let synth = registry.descriptor("urn:test:synth").unwrap();
        assert_eq!(synth.uri(), "urn:test:synth");
        assert!(registry.descriptor("urn:test:missing").is_none());

        assert_eq!(registry.descriptor_at(1).unwrap().uri(), "urn:test:mono");
        assert!(matches!(
            registry.descriptor_at(2),
            Err(HostError::IndexOutOfRange { index: 2, len: 2 })
        ));
    }

    #[test]
    fn test_incompatible_plugins_are_not_reachable() {
        let registry = Registry::new(source());
        assert!(registry.descriptor("urn:test:broken").is_none());
        let rejected = registry.rejected();
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].name, "Broken");
        assert_eq!(rejected[0].reasons, vec![Incompatibility::NoAudioOutput]);
    }

    #[test]
    fn test_duplicate_uris_are_skipped() {
        let registry = Registry::new(
            MockSource::new()
                .with_plugin(MockPluginSpec::stereo_synth("urn:test:synth"))
                .with_plugin(MockPluginSpec::mono_synth("urn:test:synth")),
        );
        assert_eq!(registry.number_of_plugins(), 1);
        assert_eq!(registry.descriptors()[0].num_ports(), 4);
    }

    #[test]
    fn test_uri_interning() {
        let registry = Registry::new(EmptySource);
        let id = registry.intern_uri("urn:test:term");
        assert_eq!(registry.intern_uri("urn:test:term"), id);
        assert_eq!(registry.resolve_uri(id).unwrap(), "urn:test:term");
        assert!(registry.resolve_uri(0).is_err());
        assert_eq!(
            registry.intern_uri(uris::NOTE_NOTE_EVENT),
            registry.urids().note_event
        );
        assert!(registry.feature_is_supported(uris::URID_UNMAP));
    }
}
