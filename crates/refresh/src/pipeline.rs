//! The refresh pipeline: cache lookup, provider fetch, stale fallback,
//! normalization.
//!
//! The cache holds the provider's raw records, not normalized locations, so
//! every outcome is normalized from the same kind of input whether it came
//! from the provider or from the cache.
//!
//! Runs are serialized per cache key. A caller that had to wait for another
//! run gets that run's outcome instead of starting its own fetch, unless it
//! asked for a forced refresh and the finished run was served from cache.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use aqi::{count_countries, normalize_batch};
use chrono::{DateTime, Utc};
use common::Location;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::cache::TtlCache;
use crate::clock::Clock;
use crate::coalesce::Coalescer;
use crate::source::LocationSource;

/// Cache key for the whole location set.
pub const LOCATIONS_KEY: &str = "locations:all";

/// Where a refresh outcome's records came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    /// Unexpired cache entry.
    Cache,
    /// Fresh provider fetch.
    Provider,
    /// Expired cache entry served because the fetch failed.
    Stale,
    /// Nothing available.
    Empty,
}

/// One generation of normalized locations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefreshOutcome {
    pub locations: Vec<Location>,
    pub station_count: usize,
    pub country_count: usize,
    pub source: DataSource,
    pub refreshed_at: DateTime<Utc>,
}

impl RefreshOutcome {
    fn from_raw(raw: &[Value], source: DataSource, now: DateTime<Utc>) -> Self {
        let locations = normalize_batch(raw);
        Self {
            station_count: locations.len(),
            country_count: count_countries(&locations),
            locations,
            source,
            refreshed_at: now,
        }
    }

    pub fn empty(now: DateTime<Utc>) -> Self {
        Self {
            locations: Vec::new(),
            station_count: 0,
            country_count: 0,
            source: DataSource::Empty,
            refreshed_at: now,
        }
    }

    /// Locations at or above `threshold`, worst first.
    pub fn above_threshold(&self, threshold: u16) -> Vec<&Location> {
        let mut hits: Vec<&Location> = self
            .locations
            .iter()
            .filter(|l| l.max_aqi >= threshold)
            .collect();
        hits.sort_by(|a, b| b.max_aqi.cmp(&a.max_aqi));
        hits
    }

    pub fn find(&self, id: &str) -> Option<&Location> {
        self.locations.iter().find(|l| l.id == id)
    }
}

pub struct RefreshPipeline {
    cache: Arc<TtlCache>,
    source: Arc<dyn LocationSource>,
    clock: Arc<dyn Clock>,
    coalescer: Coalescer,
    generation: AtomicU64,
    current: RwLock<Arc<RefreshOutcome>>,
    fetch_limit: usize,
    ttl_secs: u64,
}

impl RefreshPipeline {
    pub fn new(
        cache: Arc<TtlCache>,
        source: Arc<dyn LocationSource>,
        clock: Arc<dyn Clock>,
        fetch_limit: usize,
        ttl_secs: u64,
    ) -> Self {
        let initial = Arc::new(RefreshOutcome::empty(clock.now()));
        Self {
            cache,
            source,
            clock,
            coalescer: Coalescer::new(),
            generation: AtomicU64::new(0),
            current: RwLock::new(initial),
            fetch_limit,
            ttl_secs,
        }
    }

    /// Latest published outcome.
    pub async fn snapshot(&self) -> Arc<RefreshOutcome> {
        self.current.read().await.clone()
    }

    /// Run one refresh and publish its outcome. Never fails; provider and
    /// cache problems degrade to stale or empty data.
    pub async fn refresh(&self, forced: bool) -> Arc<RefreshOutcome> {
        let observed = self.generation.load(Ordering::Acquire);
        let _guard = self.coalescer.acquire(LOCATIONS_KEY).await;

        if self.generation.load(Ordering::Acquire) != observed {
            let latest = self.snapshot().await;
            if !forced || latest.source != DataSource::Cache {
                debug!("Joined in-flight refresh ({:?})", latest.source);
                return latest;
            }
        }

        let outcome = Arc::new(self.run(forced).await);
        *self.current.write().await = outcome.clone();
        self.generation.fetch_add(1, Ordering::Release);

        info!(
            "Refresh complete: stations={} countries={} source={:?} forced={}",
            outcome.station_count, outcome.country_count, outcome.source, forced
        );
        outcome
    }

    /// Sweep expired cache entries. The location set is kept even when
    /// expired since it is what a failed refresh falls back on.
    pub fn purge_cache(&self) -> usize {
        self.cache.purge_expired_except(&[LOCATIONS_KEY])
    }

    async fn run(&self, forced: bool) -> RefreshOutcome {
        let now = self.clock.now();

        if !forced {
            match self.cache.get(LOCATIONS_KEY) {
                Some(Value::Array(raw)) => return RefreshOutcome::from_raw(&raw, DataSource::Cache, now),
                Some(other) => warn!("Ignoring cached {} that is not an array: {}", LOCATIONS_KEY, kind(&other)),
                None => {}
            }
        }

        match self.source.fetch_locations(self.fetch_limit).await {
            Ok(raw) if !raw.is_empty() => {
                let outcome = RefreshOutcome::from_raw(&raw, DataSource::Provider, now);
                self.cache.set(LOCATIONS_KEY, Value::Array(raw), self.ttl_secs);
                outcome
            }
            Ok(_) => {
                warn!("Provider returned no locations");
                self.fallback(now)
            }
            Err(e) if e.is_auth() => {
                error!("Location fetch rejected, check OPENAQ_API_KEY: {}", e);
                self.fallback(now)
            }
            Err(e) => {
                warn!("Location fetch failed: {}", e);
                self.fallback(now)
            }
        }
    }

    fn fallback(&self, now: DateTime<Utc>) -> RefreshOutcome {
        match self.cache.get_stale(LOCATIONS_KEY) {
            Some(Value::Array(raw)) => {
                warn!("Serving {} cached locations past their TTL", raw.len());
                RefreshOutcome::from_raw(&raw, DataSource::Stale, now)
            }
            _ => {
                warn!("No cached locations to fall back on");
                RefreshOutcome::empty(now)
            }
        }
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Object(_) => "object",
        Value::String(_) => "string",
        Value::Number(_) => "number",
        Value::Bool(_) => "bool",
        Value::Null => "null",
        Value::Array(_) => "array",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::tests::FailingBackend;
    use crate::cache::{CacheBackend, DiskBackend, MemoryBackend};
    use crate::clock::ManualClock;
    use async_trait::async_trait;
    use common::Error;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Source that replays scripted responses and counts calls. Once the
    /// script runs out it repeats the last response.
    struct ScriptedSource {
        script: Mutex<VecDeque<Result<Vec<Value>, String>>>,
        last: Mutex<Result<Vec<Value>, String>>,
        calls: AtomicUsize,
        delay: Duration,
    }

    impl ScriptedSource {
        fn new(script: Vec<Result<Vec<Value>, String>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                last: Mutex::new(Ok(Vec::new())),
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
            }
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LocationSource for ScriptedSource {
        async fn fetch_locations(&self, _limit: usize) -> Result<Vec<Value>, Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let next = {
                let mut script = self.script.lock().unwrap();
                let mut last = self.last.lock().unwrap();
                if let Some(step) = script.pop_front() {
                    *last = step;
                }
                last.clone()
            };
            next.map_err(Error::Http)
        }
    }

    fn station(id: u32, country: &str, pm25: f64) -> Value {
        json!({
            "id": id,
            "name": format!("Station {id}"),
            "country": {"code": country, "name": country},
            "coordinates": {"latitude": 40.0 + f64::from(id) * 0.013, "longitude": -3.7 - f64::from(id) * 0.007},
            "sensors": [{"id": id * 10, "parameter": {"name": "pm25", "units": "µg/m³"}, "latest": {"value": pm25}}]
        })
    }

    fn batch() -> Vec<Value> {
        vec![station(1, "ES", 8.0), station(2, "ES", 40.0), station(3, "PT", 160.0)]
    }

    struct Harness {
        pipeline: RefreshPipeline,
        source: Arc<ScriptedSource>,
        clock: Arc<ManualClock>,
    }

    fn harness_with(backend: Arc<dyn CacheBackend>, source: ScriptedSource) -> Harness {
        let clock = Arc::new(ManualClock::default());
        let source = Arc::new(source);
        let cache = Arc::new(TtlCache::new(backend, clock.clone()));
        let pipeline = RefreshPipeline::new(cache, source.clone(), clock.clone(), 500, 300);
        Harness {
            pipeline,
            source,
            clock,
        }
    }

    fn harness(script: Vec<Result<Vec<Value>, String>>) -> Harness {
        harness_with(Arc::new(MemoryBackend::new()), ScriptedSource::new(script))
    }

    #[tokio::test]
    async fn test_second_refresh_within_ttl_is_served_from_cache() {
        let h = harness(vec![Ok(batch())]);

        let first = h.pipeline.refresh(false).await;
        h.clock.advance_secs(120);
        let second = h.pipeline.refresh(false).await;

        assert_eq!(h.source.calls(), 1);
        assert_eq!(first.source, DataSource::Provider);
        assert_eq!(second.source, DataSource::Cache);
        assert_eq!(first.locations, second.locations);
        assert_eq!(first.station_count, 3);
        assert_eq!(second.station_count, 3);
        assert_eq!(first.country_count, 2);
        assert_eq!(second.country_count, 2);
    }

    #[tokio::test]
    async fn test_disk_cache_hit_matches_fetch_exactly() {
        let dir = std::env::temp_dir().join(format!("airwatch-pipeline-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let backend = Arc::new(DiskBackend::open(&dir).unwrap());
        let h = harness_with(backend, ScriptedSource::new(vec![Ok(batch())]));

        let first = h.pipeline.refresh(false).await;
        let second = h.pipeline.refresh(false).await;

        assert_eq!(h.source.calls(), 1);
        assert_eq!(second.source, DataSource::Cache);
        assert_eq!(first.locations, second.locations);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_forced_refresh_always_fetches() {
        let h = harness(vec![Ok(batch()), Ok(vec![station(9, "FR", 3.0)])]);

        h.pipeline.refresh(false).await;
        let forced = h.pipeline.refresh(true).await;
        assert_eq!(h.source.calls(), 2);
        assert_eq!(forced.source, DataSource::Provider);
        assert_eq!(forced.station_count, 1);

        // The forced fetch also refreshed the cache for later callers.
        let after = h.pipeline.refresh(false).await;
        assert_eq!(h.source.calls(), 2);
        assert_eq!(after.locations, forced.locations);
    }

    #[tokio::test]
    async fn test_expired_entry_triggers_fetch() {
        let h = harness(vec![Ok(batch()), Ok(batch())]);

        h.pipeline.refresh(false).await;
        h.clock.advance_secs(300);
        let again = h.pipeline.refresh(false).await;
        assert_eq!(h.source.calls(), 2);
        assert_eq!(again.source, DataSource::Provider);
    }

    #[tokio::test]
    async fn test_fetch_failure_serves_expired_entry() {
        let h = harness(vec![Ok(batch()), Err("connection reset".into())]);

        let fresh = h.pipeline.refresh(false).await;
        h.clock.advance_secs(3_600);
        let stale = h.pipeline.refresh(false).await;

        assert_eq!(h.source.calls(), 2);
        assert_eq!(stale.source, DataSource::Stale);
        assert_eq!(stale.locations, fresh.locations);
        assert_eq!(stale.country_count, 2);
    }

    #[tokio::test]
    async fn test_empty_fetch_falls_back_like_a_failure() {
        let h = harness(vec![Ok(batch()), Ok(Vec::new())]);

        let fresh = h.pipeline.refresh(false).await;
        let forced = h.pipeline.refresh(true).await;
        assert_eq!(forced.source, DataSource::Stale);
        assert_eq!(forced.locations, fresh.locations);
    }

    #[tokio::test]
    async fn test_cold_start_failure_is_empty() {
        let h = harness(vec![Err("timeout".into())]);

        let outcome = h.pipeline.refresh(false).await;
        assert_eq!(outcome.source, DataSource::Empty);
        assert!(outcome.locations.is_empty());
        assert_eq!(outcome.station_count, 0);
        assert_eq!(outcome.country_count, 0);
    }

    #[tokio::test]
    async fn test_malformed_records_are_skipped() {
        let mut raw: Vec<Value> = (1..=9).map(|i| station(i, "DE", 10.0)).collect();
        raw.insert(3, Value::Null);
        let h = harness(vec![Ok(raw)]);

        let outcome = h.pipeline.refresh(false).await;
        assert_eq!(outcome.station_count, 9);
        assert_eq!(outcome.country_count, 1);
    }

    #[tokio::test]
    async fn test_unavailable_cache_still_produces_results() {
        let h = harness_with(Arc::new(FailingBackend), ScriptedSource::new(vec![Ok(batch())]));

        let first = h.pipeline.refresh(false).await;
        let second = h.pipeline.refresh(false).await;
        assert_eq!(first.station_count, 3);
        assert_eq!(second.station_count, 3);
        assert_eq!(h.source.calls(), 2, "nothing could be cached");
    }

    #[tokio::test]
    async fn test_concurrent_refreshes_share_one_fetch() {
        let source = ScriptedSource::new(vec![Ok(batch())]).with_delay(Duration::from_millis(50));
        let h = harness_with(Arc::new(MemoryBackend::new()), source);

        let (a, b, c, d) = tokio::join!(
            h.pipeline.refresh(false),
            h.pipeline.refresh(false),
            h.pipeline.refresh(false),
            h.pipeline.refresh(false),
        );

        assert_eq!(h.source.calls(), 1);
        for outcome in [&b, &c, &d] {
            assert_eq!(outcome.locations, a.locations);
        }
    }

    #[tokio::test]
    async fn test_purge_between_failures_keeps_fallback() {
        let h = harness(vec![Ok(batch()), Err("timeout".into())]);

        let first = h.pipeline.refresh(false).await;
        h.pipeline.purge_cache();
        h.clock.advance_secs(300);

        let second = h.pipeline.refresh(false).await;
        h.pipeline.purge_cache();
        h.clock.advance_secs(300);

        let third = h.pipeline.refresh(false).await;
        h.pipeline.purge_cache();

        assert_eq!(h.source.calls(), 3);
        assert_eq!(first.source, DataSource::Provider);
        assert_eq!(second.source, DataSource::Stale);
        assert_eq!(third.source, DataSource::Stale);
        assert_eq!(third.station_count, first.station_count);
        assert_eq!(third.country_count, first.country_count);
    }

    /// Holds the refresh lock until `delay` passes, so callers started
    /// meanwhile queue up behind it in order.
    async fn release_after(guard: tokio::sync::OwnedMutexGuard<()>, delay: Duration) {
        tokio::time::sleep(delay).await;
        drop(guard);
    }

    #[tokio::test]
    async fn test_forced_caller_behind_cache_hit_still_fetches() {
        let h = harness(vec![Ok(batch()), Ok(vec![station(7, "NL", 20.0)])]);
        h.pipeline.refresh(false).await;

        let guard = h.pipeline.coalescer.acquire(LOCATIONS_KEY).await;
        let (plain, forced, ()) = tokio::join!(
            h.pipeline.refresh(false),
            h.pipeline.refresh(true),
            release_after(guard, Duration::from_millis(20)),
        );

        assert_eq!(plain.source, DataSource::Cache);
        assert_eq!(forced.source, DataSource::Provider);
        assert_eq!(forced.station_count, 1);
        assert_eq!(h.source.calls(), 2);
    }

    #[tokio::test]
    async fn test_forced_caller_behind_provider_run_reuses_it() {
        let h = harness(vec![Ok(batch()), Ok(vec![station(7, "NL", 20.0)])]);

        let guard = h.pipeline.coalescer.acquire(LOCATIONS_KEY).await;
        let (first, second, ()) = tokio::join!(
            h.pipeline.refresh(true),
            h.pipeline.refresh(true),
            release_after(guard, Duration::from_millis(20)),
        );

        assert_eq!(h.source.calls(), 1);
        assert_eq!(first.source, DataSource::Provider);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_snapshot_tracks_latest_outcome() {
        let h = harness(vec![Ok(batch())]);
        assert_eq!(h.pipeline.snapshot().await.source, DataSource::Empty);

        let outcome = h.pipeline.refresh(false).await;
        assert!(Arc::ptr_eq(&outcome, &h.pipeline.snapshot().await));
    }

    #[tokio::test]
    async fn test_above_threshold_lists_worst_first() {
        let h = harness(vec![Ok(vec![
            station(1, "IN", 60.0),
            station(2, "IN", 5.0),
            station(3, "IN", 200.0),
        ])]);

        let outcome = h.pipeline.refresh(false).await;
        let alerts: Vec<&str> = outcome.above_threshold(150).iter().map(|l| l.id.as_str()).collect();
        assert_eq!(alerts, vec!["3", "1"]);
        assert!(outcome.find("2").is_some());
    }
}
