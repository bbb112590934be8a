//! In-memory device counting service
//!
//! Stands in for the hardware runtime when no accelerator is present. The
//! command-line tool loads it from a TOML device description; the test
//! suites build it programmatically and use its call counters and failure
//! injection to observe the sampler.
//!
//! ```toml
//! [[device]]
//! name = "gfx942"
//!
//! [[device.counter]]
//! name = "SQ_WAVES"
//! dimensions = [{ name = "XCC", size = 2 }, { name = "SE", size = 4 }]
//! value = 1.5
//!
//! [[device.counter]]
//! name = "GRBM_COUNT"
//! rate = 2.0e9
//! ```

use super::{
    BackendError, BackendResult, ContextId, CounterId, CounterInfo, CounterRecord, DeviceId,
    DeviceInfo, DeviceKind, DimensionId, DimensionInfo, ProfileId, ProfileProvider,
    ProfilingBackend, RecordId,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

/// Agent info ABI version the simulated runtime reports by default
pub const AGENT_INFO_VERSION: u32 = 1;

/// Record instance ids keep the counter in the high bits
const COUNTER_SHIFT: u32 = 48;
const INSTANCE_MASK: u64 = (1 << COUNTER_SHIFT) - 1;

/// Device class in a device description
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimKind {
    Cpu,
    #[default]
    Gpu,
}

/// One axis of a simulated counter
#[derive(Debug, Clone, Deserialize)]
pub struct DimensionSpec {
    pub name: String,
    pub size: usize,
}

/// A simulated hardware counter
#[derive(Debug, Clone, Deserialize)]
pub struct CounterSpec {
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub block: String,

    #[serde(default)]
    pub dimensions: Vec<DimensionSpec>,

    /// Value reported by every instance when `values` is empty
    #[serde(default)]
    pub value: f64,

    /// Per-instance values in row-major order, repeated if shorter than the
    /// instance count
    #[serde(default)]
    pub values: Vec<f64>,

    /// Increase per second of collection, added to every instance
    #[serde(default)]
    pub rate: f64,
}

impl CounterSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            block: String::new(),
            dimensions: Vec::new(),
            value: 0.0,
            values: Vec::new(),
            rate: 0.0,
        }
    }

    pub fn dimension(mut self, name: impl Into<String>, size: usize) -> Self {
        self.dimensions.push(DimensionSpec {
            name: name.into(),
            size,
        });
        self
    }

    pub fn value(mut self, value: f64) -> Self {
        self.value = value;
        self
    }

    pub fn values(mut self, values: Vec<f64>) -> Self {
        self.values = values;
        self
    }

    pub fn rate(mut self, rate: f64) -> Self {
        self.rate = rate;
        self
    }

    fn instance_value(&self, flat: usize, elapsed: Duration) -> f64 {
        let base = if self.values.is_empty() {
            self.value
        } else {
            self.values[flat % self.values.len()]
        };
        base + self.rate * elapsed.as_secs_f64()
    }
}

/// A simulated device
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceSpec {
    pub name: String,

    #[serde(default)]
    pub kind: SimKind,

    #[serde(default, rename = "counter")]
    pub counters: Vec<CounterSpec>,
}

impl DeviceSpec {
    pub fn gpu(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: SimKind::Gpu,
            counters: Vec::new(),
        }
    }

    pub fn cpu(name: impl Into<String>) -> Self {
        Self {
            kind: SimKind::Cpu,
            ..Self::gpu(name)
        }
    }

    pub fn counter(mut self, counter: CounterSpec) -> Self {
        self.counters.push(counter);
        self
    }
}

#[derive(Debug, Deserialize)]
struct Description {
    #[serde(default, rename = "device")]
    devices: Vec<DeviceSpec>,
}

/// Backend operations that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimOp {
    EnumerateDevices,
    SupportedCounters,
    CreateContext,
    RegisterProvider,
    CreateProfile,
    Start,
    Sample,
    Stop,
}

/// Number of calls seen per operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub supported_counter_queries: usize,
    pub dimension_queries: usize,
    pub context_creations: usize,
    pub profile_creations: usize,
    pub starts: usize,
    pub samples: usize,
    pub stops: usize,
    pub record_queries: usize,
}

struct SimCounter {
    device: DeviceId,
    spec: CounterSpec,
    dimensions: Vec<DimensionInfo>,
}

impl SimCounter {
    fn instance_count(&self) -> usize {
        self.dimensions.iter().map(|d| d.instance_size).product()
    }
}

struct SimContext {
    device: DeviceId,
    provider: Option<ProfileProvider>,
    /// Profile captured at start; `Some(None)` when started without one
    running: Option<Option<ProfileId>>,
    started_at: Option<Instant>,
}

struct SimProfile {
    device: DeviceId,
    counters: Vec<CounterId>,
}

#[derive(Default)]
struct State {
    next_context: u64,
    next_profile: u64,
    contexts: HashMap<ContextId, SimContext>,
    profiles: HashMap<ProfileId, SimProfile>,
    failures: Vec<(SimOp, Option<DeviceId>)>,
    agent_version: u32,
    calls: CallCounts,
}

/// Simulated device counting service
pub struct SimulatedBackend {
    devices: Vec<(DeviceInfo, Vec<CounterId>)>,
    counters: HashMap<CounterId, SimCounter>,
    state: Mutex<State>,
}

impl SimulatedBackend {
    /// Build the device model. Devices get ids in list order, counters are
    /// numbered from 1 across all devices.
    pub fn new(specs: Vec<DeviceSpec>) -> Self {
        let mut dimension_ids: HashMap<String, DimensionId> = HashMap::new();
        let mut devices = Vec::with_capacity(specs.len());
        let mut counters = HashMap::new();
        let mut next_counter = 1u64;

        for (index, spec) in specs.into_iter().enumerate() {
            let device = DeviceId(index as u64);
            let kind = match spec.kind {
                SimKind::Cpu => DeviceKind::Cpu,
                SimKind::Gpu => DeviceKind::Gpu,
            };
            let mut ids = Vec::with_capacity(spec.counters.len());
            for counter in spec.counters {
                let id = CounterId(next_counter);
                next_counter += 1;
                let dimensions = counter
                    .dimensions
                    .iter()
                    .map(|d| {
                        let next = DimensionId(dimension_ids.len() as u64);
                        DimensionInfo {
                            id: *dimension_ids.entry(d.name.clone()).or_insert(next),
                            name: d.name.clone(),
                            instance_size: d.size,
                        }
                    })
                    .collect();
                counters.insert(
                    id,
                    SimCounter {
                        device,
                        spec: counter,
                        dimensions,
                    },
                );
                ids.push(id);
            }
            devices.push((
                DeviceInfo {
                    id: device,
                    kind,
                    name: spec.name,
                },
                ids,
            ));
        }

        Self {
            devices,
            counters,
            state: Mutex::new(State {
                next_context: 1,
                next_profile: 1,
                agent_version: AGENT_INFO_VERSION,
                ..State::default()
            }),
        }
    }

    /// Parse a TOML device description
    pub fn from_toml_str(s: &str) -> BackendResult<Self> {
        let description: Description = toml::from_str(s)
            .map_err(|e| BackendError::Unavailable(format!("invalid device description: {}", e)))?;
        Ok(Self::new(description.devices))
    }

    /// Load a TOML device description from disk
    pub fn from_path(path: impl AsRef<Path>) -> BackendResult<Self> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path).map_err(|e| {
            BackendError::Unavailable(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&s)
    }

    /// Make `op` fail, for one device or for all of them
    pub fn fail_on(&self, op: SimOp, device: Option<DeviceId>) {
        self.lock().failures.push((op, device));
    }

    /// Clear injected failures
    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    /// Report a different agent info ABI version from discovery
    pub fn set_agent_version(&self, version: u32) {
        self.lock().agent_version = version;
    }

    pub fn calls(&self) -> CallCounts {
        self.lock().calls
    }

    pub fn profile_creations(&self) -> usize {
        self.calls().profile_creations
    }

    /// Contexts created and not yet destroyed
    pub fn live_contexts(&self) -> usize {
        self.lock().contexts.len()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn device(&self, device: DeviceId) -> BackendResult<&(DeviceInfo, Vec<CounterId>)> {
        self.devices
            .iter()
            .find(|(info, _)| info.id == device)
            .ok_or_else(|| invalid(format!("unknown agent {}", device)))
    }

    fn counter(&self, counter: CounterId) -> BackendResult<&SimCounter> {
        self.counters
            .get(&counter)
            .ok_or_else(|| invalid(format!("unknown counter {}", counter)))
    }

    fn decode_counter(&self, record: RecordId) -> BackendResult<&SimCounter> {
        self.counter(CounterId(record.0 >> COUNTER_SHIFT))
    }

    fn context_device(&self, state: &State, context: ContextId) -> BackendResult<DeviceId> {
        state
            .contexts
            .get(&context)
            .map(|c| c.device)
            .ok_or_else(|| invalid(format!("unknown context {}", context)))
    }
}

fn invalid(message: String) -> BackendError {
    BackendError::Status { code: 38, message }
}

fn injected(state: &State, op: SimOp, device: Option<DeviceId>) -> BackendResult<()> {
    let hit = state
        .failures
        .iter()
        .any(|&(o, d)| o == op && (d.is_none() || d == device));
    if hit {
        Err(BackendError::Status {
            code: 1,
            message: format!("injected {:?} failure", op),
        })
    } else {
        Ok(())
    }
}

impl ProfilingBackend for SimulatedBackend {
    fn enumerate_devices(&self) -> BackendResult<Vec<DeviceInfo>> {
        let state = self.lock();
        injected(&state, SimOp::EnumerateDevices, None)?;
        if state.agent_version != AGENT_INFO_VERSION {
            return Err(BackendError::VersionMismatch {
                expected: AGENT_INFO_VERSION,
                found: state.agent_version,
            });
        }
        Ok(self
            .devices
            .iter()
            .filter(|(info, _)| info.kind == DeviceKind::Gpu)
            .map(|(info, _)| info.clone())
            .collect())
    }

    fn supported_counters(&self, device: DeviceId) -> BackendResult<Vec<CounterId>> {
        let mut state = self.lock();
        injected(&state, SimOp::SupportedCounters, Some(device))?;
        state.calls.supported_counter_queries += 1;
        Ok(self.device(device)?.1.clone())
    }

    fn counter_info(&self, counter: CounterId) -> BackendResult<CounterInfo> {
        let c = self.counter(counter)?;
        Ok(CounterInfo {
            id: counter,
            name: c.spec.name.clone(),
            description: c.spec.description.clone(),
            block: c.spec.block.clone(),
        })
    }

    fn counter_dimensions(&self, counter: CounterId) -> BackendResult<Vec<DimensionInfo>> {
        self.lock().calls.dimension_queries += 1;
        Ok(self.counter(counter)?.dimensions.clone())
    }

    fn create_context(&self, device: DeviceId) -> BackendResult<ContextId> {
        self.device(device)?;
        let mut state = self.lock();
        injected(&state, SimOp::CreateContext, Some(device))?;
        state.calls.context_creations += 1;
        let context = ContextId(state.next_context);
        state.next_context += 1;
        state.contexts.insert(
            context,
            SimContext {
                device,
                provider: None,
                running: None,
                started_at: None,
            },
        );
        debug!("Simulated context {} created for device {}", context, device);
        Ok(context)
    }

    fn destroy_context(&self, context: ContextId) -> BackendResult<()> {
        self.lock()
            .contexts
            .remove(&context)
            .map(|_| ())
            .ok_or_else(|| invalid(format!("unknown context {}", context)))
    }

    fn register_profile_provider(
        &self,
        context: ContextId,
        device: DeviceId,
        provider: ProfileProvider,
    ) -> BackendResult<()> {
        let mut state = self.lock();
        injected(&state, SimOp::RegisterProvider, Some(device))?;
        let ctx = state
            .contexts
            .get_mut(&context)
            .ok_or_else(|| invalid(format!("unknown context {}", context)))?;
        if ctx.device != device {
            return Err(invalid(format!(
                "context {} is bound to agent {}, not {}",
                context, ctx.device, device
            )));
        }
        ctx.provider = Some(provider);
        Ok(())
    }

    fn create_profile(&self, device: DeviceId, counters: &[CounterId]) -> BackendResult<ProfileId> {
        self.device(device)?;
        for &counter in counters {
            if self.counter(counter)?.device != device {
                return Err(invalid(format!(
                    "counter {} is not supported by agent {}",
                    counter, device
                )));
            }
        }

        let mut state = self.lock();
        injected(&state, SimOp::CreateProfile, Some(device))?;
        state.calls.profile_creations += 1;
        let profile = ProfileId(state.next_profile);
        state.next_profile += 1;
        state.profiles.insert(
            profile,
            SimProfile {
                device,
                counters: counters.to_vec(),
            },
        );
        Ok(profile)
    }

    fn start(&self, context: ContextId) -> BackendResult<()> {
        let provider = {
            let mut state = self.lock();
            let device = self.context_device(&state, context)?;
            injected(&state, SimOp::Start, Some(device))?;
            state.calls.starts += 1;
            state.contexts.get(&context).and_then(|c| c.provider.clone())
        };

        // The provider reads sampler state, so it runs without our lock held
        let profile = provider.and_then(|p| p());

        let mut state = self.lock();
        let device = self.context_device(&state, context)?;
        if let Some(profile) = profile {
            match state.profiles.get(&profile) {
                Some(p) if p.device == device => {}
                _ => return Err(invalid(format!("profile {} cannot run here", profile))),
            }
        }
        if let Some(ctx) = state.contexts.get_mut(&context) {
            ctx.running = Some(profile);
            ctx.started_at = Some(Instant::now());
        }
        Ok(())
    }

    fn sample(&self, context: ContextId, out: &mut [CounterRecord]) -> BackendResult<usize> {
        let mut state = self.lock();
        let device = self.context_device(&state, context)?;
        injected(&state, SimOp::Sample, Some(device))?;
        state.calls.samples += 1;

        let (running, elapsed) = state
            .contexts
            .get(&context)
            .map(|c| (c.running, c.started_at.map(|t| t.elapsed())))
            .unwrap_or_default();
        let elapsed = elapsed.unwrap_or_default();
        let profile = match running {
            Some(Some(profile)) => profile,
            Some(None) => return Ok(0),
            None => return Err(invalid(format!("context {} is not started", context))),
        };
        let counters = state
            .profiles
            .get(&profile)
            .map(|p| p.counters.clone())
            .unwrap_or_default();

        let mut filled = 0;
        for id in counters {
            let counter = self.counter(id)?;
            for flat in 0..counter.instance_count() {
                if filled == out.len() {
                    return Ok(filled);
                }
                out[filled] = CounterRecord {
                    id: RecordId((id.0 << COUNTER_SHIFT) | flat as u64),
                    value: counter.spec.instance_value(flat, elapsed),
                };
                filled += 1;
            }
        }
        Ok(filled)
    }

    fn stop(&self, context: ContextId) -> BackendResult<()> {
        let mut state = self.lock();
        let device = self.context_device(&state, context)?;
        injected(&state, SimOp::Stop, Some(device))?;
        state.calls.stops += 1;
        if let Some(ctx) = state.contexts.get_mut(&context) {
            ctx.running = None;
            ctx.started_at = None;
        }
        Ok(())
    }

    fn record_counter(&self, record: RecordId) -> BackendResult<CounterId> {
        self.lock().calls.record_queries += 1;
        self.decode_counter(record)?;
        Ok(CounterId(record.0 >> COUNTER_SHIFT))
    }

    fn record_dimension_position(
        &self,
        record: RecordId,
        dimension: DimensionId,
    ) -> BackendResult<usize> {
        let counter = self.decode_counter(record)?;
        let flat = (record.0 & INSTANCE_MASK) as usize;
        let index = counter
            .dimensions
            .iter()
            .position(|d| d.id == dimension)
            .ok_or_else(|| invalid(format!("dimension {} not in record {}", dimension, record)))?;

        let stride: usize = counter.dimensions[index + 1..]
            .iter()
            .map(|d| d.instance_size)
            .product();
        let size = counter.dimensions[index].instance_size.max(1);
        Ok((flat / stride.max(1)) % size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn backend() -> SimulatedBackend {
        SimulatedBackend::new(vec![
            DeviceSpec::cpu("host"),
            DeviceSpec::gpu("gfx942")
                .counter(
                    CounterSpec::new("SQ_WAVES")
                        .dimension("XCC", 2)
                        .dimension("SE", 3)
                        .values((0..6).map(f64::from).collect()),
                )
                .counter(CounterSpec::new("GRBM_COUNT").value(4.0)),
        ])
    }

    #[test]
    fn test_cpu_devices_filtered() {
        let devices = backend().enumerate_devices().unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].name, "gfx942");
        assert_eq!(devices[0].kind, DeviceKind::Gpu);
    }

    #[test]
    fn test_version_mismatch() {
        let backend = backend();
        backend.set_agent_version(7);
        assert_eq!(
            backend.enumerate_devices().unwrap_err(),
            BackendError::VersionMismatch {
                expected: AGENT_INFO_VERSION,
                found: 7
            }
        );
    }

    #[test]
    fn test_sample_without_provider_is_empty() {
        let backend = backend();
        let gpu = DeviceId(1);
        let ctx = backend.create_context(gpu).unwrap();
        let mut out = vec![CounterRecord::default(); 4];
        backend.start(ctx).unwrap();
        assert_eq!(backend.sample(ctx, &mut out).unwrap(), 0);
        backend.stop(ctx).unwrap();
    }

    #[test]
    fn test_sample_before_start_fails() {
        let backend = backend();
        let ctx = backend.create_context(DeviceId(1)).unwrap();
        let mut out = vec![CounterRecord::default(); 1];
        assert!(backend.sample(ctx, &mut out).is_err());
    }

    #[test]
    fn test_records_decode_row_major() {
        let backend = backend();
        let gpu = DeviceId(1);
        let waves = backend.supported_counters(gpu).unwrap()[0];
        let profile = backend.create_profile(gpu, &[waves]).unwrap();
        let ctx = backend.create_context(gpu).unwrap();
        backend
            .register_profile_provider(ctx, gpu, Arc::new(move || Some(profile)))
            .unwrap();

        let mut out = vec![CounterRecord::default(); 6];
        backend.start(ctx).unwrap();
        assert_eq!(backend.sample(ctx, &mut out).unwrap(), 6);
        backend.stop(ctx).unwrap();

        let dims = backend.counter_dimensions(waves).unwrap();
        // flat index 4 = XCC 1, SE 1
        let rec = out[4];
        assert_eq!(rec.value, 4.0);
        assert_eq!(backend.record_counter(rec.id).unwrap(), waves);
        assert_eq!(backend.record_dimension_position(rec.id, dims[0].id).unwrap(), 1);
        assert_eq!(backend.record_dimension_position(rec.id, dims[1].id).unwrap(), 1);
    }

    #[test]
    fn test_rate_grows_with_collection_time() {
        let backend = SimulatedBackend::new(vec![DeviceSpec::gpu("gfx942")
            .counter(CounterSpec::new("GRBM_COUNT").value(1.0).rate(1000.0))]);
        let gpu = DeviceId(0);
        let counter = backend.supported_counters(gpu).unwrap()[0];
        let profile = backend.create_profile(gpu, &[counter]).unwrap();
        let ctx = backend.create_context(gpu).unwrap();
        backend
            .register_profile_provider(ctx, gpu, Arc::new(move || Some(profile)))
            .unwrap();

        let mut out = vec![CounterRecord::default(); 1];
        backend.start(ctx).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        backend.sample(ctx, &mut out).unwrap();
        backend.stop(ctx).unwrap();

        // 1.0 base + at least 20ms at 1000/s
        assert!(out[0].value >= 21.0);
        assert_eq!(backend.calls().samples, 1);
    }

    #[test]
    fn test_sample_respects_capacity() {
        let backend = backend();
        let gpu = DeviceId(1);
        let counters = backend.supported_counters(gpu).unwrap();
        let profile = backend.create_profile(gpu, &counters).unwrap();
        let ctx = backend.create_context(gpu).unwrap();
        backend
            .register_profile_provider(ctx, gpu, Arc::new(move || Some(profile)))
            .unwrap();

        let mut out = vec![CounterRecord::default(); 2];
        backend.start(ctx).unwrap();
        assert_eq!(backend.sample(ctx, &mut out).unwrap(), 2);
    }

    #[test]
    fn test_foreign_counter_rejected() {
        let backend = SimulatedBackend::new(vec![
            DeviceSpec::gpu("a").counter(CounterSpec::new("A")),
            DeviceSpec::gpu("b").counter(CounterSpec::new("A")),
        ]);
        let a_counter = backend.supported_counters(DeviceId(0)).unwrap()[0];
        assert!(backend.create_profile(DeviceId(1), &[a_counter]).is_err());
    }

    #[test]
    fn test_injected_failure_scoped_to_device() {
        let backend = SimulatedBackend::new(vec![DeviceSpec::gpu("a"), DeviceSpec::gpu("b")]);
        backend.fail_on(SimOp::CreateProfile, Some(DeviceId(1)));
        assert!(backend.create_profile(DeviceId(0), &[]).is_ok());
        assert!(backend.create_profile(DeviceId(1), &[]).is_err());

        backend.clear_failures();
        assert!(backend.create_profile(DeviceId(1), &[]).is_ok());
        assert_eq!(backend.profile_creations(), 2);
    }

    #[test]
    fn test_from_toml_str() {
        let backend = SimulatedBackend::from_toml_str(
            r#"
            [[device]]
            name = "gfx90a"

            [[device.counter]]
            name = "FETCH_SIZE"
            block = "TCC"
            dimensions = [{ name = "XCC", size = 4 }]
            value = 2.5

            [[device]]
            name = "epyc"
            kind = "cpu"
            "#,
        )
        .unwrap();

        let devices = backend.enumerate_devices().unwrap();
        assert_eq!(devices.len(), 1);
        let counter = backend.supported_counters(devices[0].id).unwrap()[0];
        let info = backend.counter_info(counter).unwrap();
        assert_eq!(info.name, "FETCH_SIZE");
        assert_eq!(info.block, "TCC");
        assert_eq!(backend.counter_dimensions(counter).unwrap()[0].instance_size, 4);
    }

    #[test]
    fn test_invalid_toml() {
        let err = SimulatedBackend::from_toml_str("[[device]]\nkind = 3").err().unwrap();
        assert!(matches!(err, BackendError::Unavailable(_)));
    }
}
