//! Cache-backed refresh pipeline.
//!
//! Owns the TTL cache, the single-flight guard around provider fetches and
//! the runtime settings store.

pub mod cache;
pub mod clock;
pub mod coalesce;
pub mod pipeline;
pub mod settings;
pub mod source;

pub use cache::{CacheBackend, CacheStats, DiskBackend, MemoryBackend, StoredEntry, TtlCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use pipeline::{DataSource, RefreshOutcome, RefreshPipeline, LOCATIONS_KEY};
pub use settings::{parsed_setting, FileSettingsStore, MemorySettingsStore, SettingsStore};
pub use source::LocationSource;
