//! Per-device counter sampler
//!
//! A [`CounterSampler`] owns one profiling context on one device. Profile
//! configurations are expensive to create, so they are cached for the life
//! of the sampler, keyed on the exact ordered list of counter names asked
//! for. `["A", "B"]` and `["B", "A"]` are separate entries.

use crate::backend::{
    ContextId, CounterId, CounterRecord, DeviceId, DimensionInfo, ProfileId, ProfilingBackend,
};
use crate::error::{check, Result, SamplerError};
use once_cell::sync::OnceCell;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};

/// A raw record with its counter name and dimension positions resolved
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordView {
    pub counter: String,
    pub value: f64,
    pub dimensions: BTreeMap<String, usize>,
}

/// Samples hardware counters on one device
pub struct CounterSampler {
    backend: Arc<dyn ProfilingBackend>,
    device: DeviceId,
    context: ContextId,

    /// Profile handed to the backend when the context starts
    active_profile: Arc<Mutex<Option<ProfileId>>>,

    cached_profiles: HashMap<Vec<String>, ProfileId>,

    /// Expected record count per profile
    profile_sizes: HashMap<ProfileId, usize>,

    /// Counter id to name, built on first decode
    counter_names: OnceCell<HashMap<CounterId, String>>,
}

impl CounterSampler {
    /// Create a profiling context on `device` and register the profile provider
    pub fn new(backend: Arc<dyn ProfilingBackend>, device: DeviceId) -> Result<Self> {
        let context = check("context creation", backend.create_context(device))?;

        let active_profile: Arc<Mutex<Option<ProfileId>>> = Arc::new(Mutex::new(None));
        let provided = Arc::clone(&active_profile);
        let registered = backend.register_profile_provider(
            context,
            device,
            Arc::new(move || *provided.lock().unwrap_or_else(PoisonError::into_inner)),
        );
        if registered.is_err() {
            if let Err(e) = backend.destroy_context(context) {
                warn!("Failed to release context {}: {}", context, e);
            }
        }
        check("device counting service setup", registered)?;

        debug!("Sampler ready on device {} (context {})", device, context);

        Ok(Self {
            backend,
            device,
            context,
            active_profile,
            cached_profiles: HashMap::new(),
            profile_sizes: HashMap::new(),
            counter_names: OnceCell::new(),
        })
    }

    pub fn device(&self) -> DeviceId {
        self.device
    }

    /// Number of distinct counter lists a profile has been built for
    pub fn cached_profiles(&self) -> usize {
        self.cached_profiles.len()
    }

    /// Map every counter the device supports from its name to its id
    pub fn supported_counters(&self) -> Result<HashMap<String, CounterId>> {
        Self::get_supported_counters(self.backend.as_ref(), self.device)
    }

    /// Map every counter `device` supports from its name to its id
    pub fn get_supported_counters(
        backend: &dyn ProfilingBackend,
        device: DeviceId,
    ) -> Result<HashMap<String, CounterId>> {
        let counters = check(
            "fetch supported counters",
            backend.supported_counters(device),
        )?;

        let mut out = HashMap::with_capacity(counters.len());
        for counter in counters {
            let info = check("query counter info", backend.counter_info(counter))?;
            out.insert(info.name, counter);
        }
        Ok(out)
    }

    /// Dimension layout of one counter
    pub fn counter_dimensions(&self, counter: CounterId) -> Result<Vec<DimensionInfo>> {
        check(
            "iterate counter dimensions",
            self.backend.counter_dimensions(counter),
        )
    }

    /// Number of records one counter contributes to a sample
    pub fn counter_size(&self, counter: CounterId) -> Result<usize> {
        Ok(self
            .counter_dimensions(counter)?
            .iter()
            .map(|d| d.instance_size)
            .product())
    }

    /// Sample `counters` over a window of `duration`, leaving the records in `out`
    ///
    /// Names the device does not support are skipped, so `out` may hold fewer
    /// records than requested, or none at all.
    pub fn sample_counter_values(
        &mut self,
        counters: &[String],
        out: &mut Vec<CounterRecord>,
        duration: Duration,
    ) -> Result<()> {
        let profile = match self.cached_profiles.get(counters) {
            Some(&profile) => profile,
            None => self.create_profile(counters)?,
        };

        let expected = *self
            .profile_sizes
            .get(&profile)
            .ok_or(SamplerError::MissingProfileSize(profile))?;

        out.clear();
        out.resize(expected, CounterRecord::default());
        self.set_active_profile(profile);

        check("start context", self.backend.start(self.context))?;
        std::thread::sleep(duration);
        let sampled = self.backend.sample(self.context, out);
        if sampled.is_err() {
            if let Err(e) = self.backend.stop(self.context) {
                warn!("Failed to stop context {} after sample error: {}", self.context, e);
            }
        }
        let filled = check("sample device counting service", sampled)?;
        check("stop context", self.backend.stop(self.context))?;

        out.truncate(filled);
        Ok(())
    }

    /// Name of the counter a record belongs to
    pub fn decode_record_name(&self, record: &CounterRecord) -> Result<&str> {
        let counter = check(
            "query record counter id",
            self.backend.record_counter(record.id),
        )?;
        self.name_of(counter)
    }

    /// Position of a record along each dimension of its counter
    ///
    /// One backend round trip per dimension; prefer [`describe_records`]
    /// for whole samples.
    ///
    /// [`describe_records`]: CounterSampler::describe_records
    pub fn record_dimensions(&self, record: &CounterRecord) -> Result<HashMap<String, usize>> {
        let counter = check(
            "query record counter id",
            self.backend.record_counter(record.id),
        )?;
        let dimensions = self.counter_dimensions(counter)?;
        self.positions(record, &dimensions)
            .map(|positions| positions.into_iter().collect())
    }

    /// Resolve names and positions for a batch of records, looking up each
    /// counter's dimension layout once
    pub fn describe_records(&self, records: &[CounterRecord]) -> Result<Vec<RecordView>> {
        let mut layouts: HashMap<CounterId, Vec<DimensionInfo>> = HashMap::new();
        let mut views = Vec::with_capacity(records.len());

        for record in records {
            let counter = check(
                "query record counter id",
                self.backend.record_counter(record.id),
            )?;
            if !layouts.contains_key(&counter) {
                layouts.insert(counter, self.counter_dimensions(counter)?);
            }
            let dimensions = &layouts[&counter];
            views.push(RecordView {
                counter: self.name_of(counter)?.to_string(),
                value: record.value,
                dimensions: self.positions(record, dimensions)?.into_iter().collect(),
            });
        }
        Ok(views)
    }

    fn name_of(&self, counter: CounterId) -> Result<&str> {
        let names = self.counter_names.get_or_try_init(|| {
            self.supported_counters()
                .map(|counters| counters.into_iter().map(|(name, id)| (id, name)).collect())
        })?;
        names
            .get(&counter)
            .map(String::as_str)
            .ok_or(SamplerError::UnknownCounter(counter))
    }

    fn positions(
        &self,
        record: &CounterRecord,
        dimensions: &[DimensionInfo],
    ) -> Result<Vec<(String, usize)>> {
        dimensions
            .iter()
            .map(|dim| {
                check(
                    "query record dimension position",
                    self.backend.record_dimension_position(record.id, dim.id),
                )
                .map(|pos| (dim.name.clone(), pos))
            })
            .collect()
    }

    fn create_profile(&mut self, counters: &[String]) -> Result<ProfileId> {
        let supported = self.supported_counters()?;

        let mut resolved = Vec::with_capacity(counters.len());
        let mut expected = 0;
        for name in counters {
            match supported.get(name) {
                Some(&id) => {
                    expected += self.counter_size(id)?;
                    resolved.push(id);
                }
                None => debug!("Counter {} not supported on device {}", name, self.device),
            }
        }

        let profile = check(
            "create profile",
            self.backend.create_profile(self.device, &resolved),
        )?;
        debug!(
            "Created profile {} on device {}: {} counters, {} records",
            profile,
            self.device,
            resolved.len(),
            expected
        );

        self.cached_profiles.insert(counters.to_vec(), profile);
        self.profile_sizes.insert(profile, expected);
        Ok(profile)
    }

    fn set_active_profile(&self, profile: ProfileId) {
        *self
            .active_profile
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(profile);
    }
}

impl Drop for CounterSampler {
    fn drop(&mut self) {
        if let Err(e) = self.backend.destroy_context(self.context) {
            warn!("Failed to release context {}: {}", self.context, e);
        }
    }
}

impl std::fmt::Debug for CounterSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CounterSampler")
            .field("device", &self.device)
            .field("context", &self.context)
            .field("cached_profiles", &self.cached_profiles.len())
            .finish()
    }
}
