//! One sampler per discovered device

use crate::backend::{DeviceInfo, ProfilingBackend};
use crate::error::{check, Result, SamplerError};
use crate::sampler::CounterSampler;
use std::sync::Arc;
use tracing::info;

/// Samplers for every GPU device, in discovery order
///
/// Built once at startup and handed to whatever drives sampling.
#[derive(Debug)]
pub struct SamplerRegistry {
    devices: Vec<DeviceInfo>,
    samplers: Vec<CounterSampler>,
}

impl SamplerRegistry {
    /// Discover devices and create a sampler for each one
    pub fn discover(backend: Arc<dyn ProfilingBackend>) -> Result<Self> {
        let devices = check("query available agents", backend.enumerate_devices())?;
        if devices.is_empty() {
            return Err(SamplerError::NoDevices);
        }

        let samplers = devices
            .iter()
            .map(|device| CounterSampler::new(Arc::clone(&backend), device.id))
            .collect::<Result<Vec<_>>>()?;

        info!("Discovered {} GPU device(s)", devices.len());
        Ok(Self { devices, samplers })
    }

    pub fn len(&self) -> usize {
        self.samplers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samplers.is_empty()
    }

    pub fn devices(&self) -> &[DeviceInfo] {
        &self.devices
    }

    pub fn get(&self, index: usize) -> Option<&CounterSampler> {
        self.samplers.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut CounterSampler> {
        self.samplers.get_mut(index)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut CounterSampler> {
        self.samplers.iter_mut()
    }
}
