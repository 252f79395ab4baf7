//! Embedded latest-reading cache with a time-to-live.
//!
//! Entries live in a sharded [`DashMap`], so writers for different sensors
//! never contend on a shared lock. A write older than the cached reading,
//! by receipt time, is ignored.

use std::future::Future;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry as MapEntry;
use tokio::time::Instant;

use greenhub_domain::id::SensorId;
use greenhub_domain::reading::Reading;

use crate::ports::ReadingCache;

#[derive(Debug, Clone)]
struct Entry {
    reading: Reading,
    stored_at: Instant,
}

/// In-process [`ReadingCache`] where entries older than `ttl` read as a miss.
#[derive(Debug)]
pub struct InMemoryReadingCache {
    entries: DashMap<SensorId, Entry>,
    ttl: Duration,
}

impl InMemoryReadingCache {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Number of entries, expired or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove expired entries and return their sensors.
    ///
    /// A sensor returned here has not reported within the TTL and is possibly
    /// offline. Only the cache is touched.
    pub fn sweep_expired(&self) -> Vec<SensorId> {
        let now = Instant::now();
        let mut expired = Vec::new();
        self.entries.retain(|sensor_id, entry| {
            let alive = now.duration_since(entry.stored_at) < self.ttl;
            if !alive {
                expired.push(*sensor_id);
            }
            alive
        });
        expired
    }

    fn lookup(&self, sensor_id: SensorId) -> Option<Reading> {
        let entry = self.entries.get(&sensor_id)?;
        (entry.stored_at.elapsed() < self.ttl).then(|| entry.reading.clone())
    }
}

impl ReadingCache for InMemoryReadingCache {
    fn get(&self, sensor_id: SensorId) -> impl Future<Output = Option<Reading>> + Send {
        let found = self.lookup(sensor_id);
        async { found }
    }

    fn set(&self, reading: Reading) -> impl Future<Output = ()> + Send {
        match self.entries.entry(reading.sensor_id) {
            MapEntry::Occupied(mut occupied) => {
                let cached_at = occupied.get().reading.received_at;
                if cached_at > reading.received_at {
                    tracing::trace!(
                        sensor_id = %reading.sensor_id,
                        %cached_at,
                        received_at = %reading.received_at,
                        "Ignoring reading older than the cached one"
                    );
                } else {
                    occupied.insert(Entry {
                        reading,
                        stored_at: Instant::now(),
                    });
                }
            }
            MapEntry::Vacant(vacant) => {
                vacant.insert(Entry {
                    reading,
                    stored_at: Instant::now(),
                });
            }
        }
        async {}
    }

    fn expire(&self, sensor_id: SensorId) -> impl Future<Output = ()> + Send {
        self.entries.remove(&sensor_id);
        async {}
    }
}
