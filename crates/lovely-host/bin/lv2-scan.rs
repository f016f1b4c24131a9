//! Lists the LV2 plugins this host can load.
//!
//! `lv2-scan` prints every usable plugin with its resolved designations, then
//! every rejected one with the reasons. `lv2-scan <uri>` prints one plugin's
//! ports and presets.

use lovely_host::{registry, Designation, HostError, PluginDescriptor, PortKind, Result};
use std::env;

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let registry = registry();
    registry.discover();

    if let Some(uri) = env::args().nth(1) {
        let descriptor = registry
            .descriptor(&uri)
            .ok_or_else(|| HostError::PluginNotFound(uri.clone()))?;
        print_details(&descriptor);
        return Ok(());
    }

    println!("{} usable plugins", registry.number_of_plugins());
    for descriptor in registry.descriptors() {
        let kind = if descriptor.is_instrument() {
            "instrument"
        } else {
            "effect"
        };
        println!("  {} <{}> ({})", descriptor.name(), descriptor.uri(), kind);
        print_designations(descriptor);
    }

    if !registry.rejected().is_empty() {
        println!("\n{} rejected plugins", registry.rejected().len());
        for rejected in registry.rejected() {
            println!("  {} <{}>", rejected.name, rejected.uri);
            for reason in &rejected.reasons {
                println!("      {}", reason);
            }
        }
    }
    Ok(())
}

fn print_designations(descriptor: &PluginDescriptor) {
    for designation in Designation::ALL {
        if let Some(index) = descriptor.designation(designation) {
            println!("      {:?} -> port {}", designation, index);
        }
    }
}

fn print_details(descriptor: &PluginDescriptor) {
    println!("{} <{}>", descriptor.name(), descriptor.uri());
    println!("  ports:");
    for port in descriptor.ports() {
        let kind = match port.kind {
            PortKind::Control { min, max, default } => {
                format!("control [{}, {}] default {}", min, max, default)
            }
            PortKind::Audio => "audio".to_string(),
            PortKind::Event { shape } => format!("event {:?}", shape),
            PortKind::Unsupported => "unsupported".to_string(),
        };
        println!("    {:>3} {:?} {} ({})", port.index, port.flow, port.symbol, kind);
    }
    println!("  designations:");
    print_designations(descriptor);

    let presets = descriptor.find_presets();
    println!("  {} presets", presets.len());
    for (index, preset) in presets.iter().enumerate() {
        println!("    {:>3} {}", index, preset.name);
    }
}
