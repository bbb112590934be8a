//! Backend selection

use anyhow::{Context, Result};
use gpuctr_profiler::backend::simulated::SimulatedBackend;
use gpuctr_profiler::SamplerRegistry;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Discover devices on the simulated backend if one is configured, otherwise on hardware
pub fn open_registry(simulate: Option<&Path>) -> Result<SamplerRegistry> {
    match simulate {
        Some(path) => {
            info!("Using simulated devices from {}", path.display());
            let backend = SimulatedBackend::from_path(path)
                .with_context(|| format!("Failed to load device description: {}", path.display()))?;
            SamplerRegistry::discover(Arc::new(backend)).context("Failed to discover devices")
        }
        None => hardware_registry(),
    }
}

#[cfg(feature = "rocm")]
fn hardware_registry() -> Result<SamplerRegistry> {
    gpuctr_profiler::backend::rocprofiler::discover().context("Failed to discover devices")
}

#[cfg(not(feature = "rocm"))]
fn hardware_registry() -> Result<SamplerRegistry> {
    anyhow::bail!(
        "built without the `rocm` feature; pass --simulate <FILE> or set GPUCTR_SIMULATE"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_description() {
        let err = open_registry(Some(Path::new("/nonexistent/devices.toml"))).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to load device description"));
    }

    #[test]
    fn test_simulated_registry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("devices.toml");
        std::fs::write(&path, "[[device]]\nname = \"gfx942\"\n").unwrap();

        let registry = open_registry(Some(&path)).unwrap();
        assert_eq!(registry.len(), 1);
    }
}
