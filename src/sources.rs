use anyhow::Result;

use crate::adapter::AdapterRegistry;
use crate::config::Config;

/// `synx sources`: every configured source and whether its root exists.
pub fn list_sources(config: &Config) -> Result<()> {
    let registry = AdapterRegistry::from_config(config)?;

    println!("{:<28} {:<10} {:<10} HEALTHY", "SOURCE", "OWNER", "CURSOR");
    for (name, notes) in &config.sources.notes {
        let label = format!("notes:{}", name);
        let mode = registry
            .find(&label)
            .map(|s| match s.adapter.cursor_mode() {
                sync_harness_core::cursor::CursorMode::Watermark => "watermark",
                sync_harness_core::cursor::CursorMode::PerItem => "per-item",
            })
            .unwrap_or("-");
        println!(
            "{:<28} {:<10} {:<10} {}",
            label,
            notes.owner,
            mode,
            notes.root.exists()
        );
    }

    if registry.is_empty() {
        println!("(no sources configured)");
    }
    Ok(())
}
