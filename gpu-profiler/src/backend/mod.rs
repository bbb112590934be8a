//! Device profiling backends
//!
//! A backend exposes the device counting service of a profiler runtime:
//! device discovery, counter and dimension enumeration, profile creation and
//! the start/sample/stop cycle. Enumerations return owned vectors in the
//! order the runtime reports them.

#[cfg(feature = "rocm")]
pub mod rocprofiler;
pub mod simulated;

use std::fmt;
use std::sync::Arc;
use thiserror::Error;

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

handle!(
    /// Opaque identifier of one accelerator
    DeviceId
);
handle!(
    /// Opaque identifier of one hardware counter on a device
    CounterId
);
handle!(
    /// Identifier of one dimension axis
    DimensionId
);
handle!(
    /// Profiling context bound to a device
    ContextId
);
handle!(
    /// Device-side profile configuration
    ProfileId
);
handle!(
    /// Instance identifier carried by a raw counter record
    RecordId
);

/// Error reported by a backend call
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BackendError {
    /// A backend operation returned a non-success status
    #[error("status {code} ({message})")]
    Status { code: i32, message: String },

    /// The discovery ABI reported by the runtime is not the one we speak
    #[error("unexpected agent info version {found} (expected {expected})")]
    VersionMismatch { expected: u32, found: u32 },

    /// The backend could not be brought up at all
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Device class as reported by discovery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Cpu,
    Gpu,
}

/// One discovered device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub id: DeviceId,
    pub kind: DeviceKind,
    pub name: String,
}

/// Descriptive information about one counter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterInfo {
    pub id: CounterId,
    pub name: String,
    pub description: String,
    /// Hardware block the counter lives in
    pub block: String,
}

/// One axis a counter value is broken out along
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DimensionInfo {
    pub id: DimensionId,
    pub name: String,
    /// Number of instances along this axis
    pub instance_size: usize,
}

/// One raw measurement produced by a sample
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct CounterRecord {
    /// Encodes the counter and the position along each of its dimensions
    pub id: RecordId,
    pub value: f64,
}

/// Supplies the profile a context should run when it is started
///
/// Returning `None` leaves the device without a profile, so nothing is
/// collected.
pub type ProfileProvider = Arc<dyn Fn() -> Option<ProfileId> + Send + Sync>;

/// Interface to a device counting service
///
/// Implementations must be safe to share across threads; callers serialize
/// the start/sample/stop cycle per context.
pub trait ProfilingBackend: Send + Sync {
    /// Enumerate GPU devices. Devices of other classes are filtered out.
    fn enumerate_devices(&self) -> BackendResult<Vec<DeviceInfo>>;

    /// Counters the device supports
    fn supported_counters(&self, device: DeviceId) -> BackendResult<Vec<CounterId>>;

    /// Descriptive information for one counter
    fn counter_info(&self, counter: CounterId) -> BackendResult<CounterInfo>;

    /// Dimension layout of one counter
    fn counter_dimensions(&self, counter: CounterId) -> BackendResult<Vec<DimensionInfo>>;

    /// Create a profiling context for a device
    fn create_context(&self, device: DeviceId) -> BackendResult<ContextId>;

    /// Release a context. Backends without an explicit release do nothing.
    fn destroy_context(&self, _context: ContextId) -> BackendResult<()> {
        Ok(())
    }

    /// Install the callback asked for a profile whenever `context` starts
    fn register_profile_provider(
        &self,
        context: ContextId,
        device: DeviceId,
        provider: ProfileProvider,
    ) -> BackendResult<()>;

    /// Create a profile configuration for an ordered set of counters
    fn create_profile(&self, device: DeviceId, counters: &[CounterId]) -> BackendResult<ProfileId>;

    fn start(&self, context: ContextId) -> BackendResult<()>;

    /// Take an immediate sample into `out`, returning how many records were written
    fn sample(&self, context: ContextId, out: &mut [CounterRecord]) -> BackendResult<usize>;

    fn stop(&self, context: ContextId) -> BackendResult<()>;

    /// Counter a record belongs to
    fn record_counter(&self, record: RecordId) -> BackendResult<CounterId>;

    /// Position of a record along one dimension of its counter
    fn record_dimension_position(
        &self,
        record: RecordId,
        dimension: DimensionId,
    ) -> BackendResult<usize>;
}
