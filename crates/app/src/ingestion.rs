//! Telemetry ingestion — from raw transport messages to evaluated readings.
//!
//! [`TelemetryIngestor`] handles one message: resolve the sensor, decode the
//! payload, refresh the cache, persist, then hand the reading to a
//! [`ReadingHandler`] (the rule engine). [`IngestionRouter`] runs one worker
//! task per topic so messages of a sensor stay in order while different
//! sensors proceed concurrently.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use greenhub_domain::error::GreenHubError;
use greenhub_domain::reading::{Payload, Reading};
use greenhub_domain::sensor::Sensor;
use greenhub_domain::time;

use crate::discovery::SensorResolver;
use crate::ports::{ReadingCache, ReadingRepository, SensorRepository};

/// Receives every accepted reading, in per-sensor order.
pub trait ReadingHandler {
    fn handle(&self, sensor: &Sensor, reading: &Reading) -> impl Future<Output = ()> + Send;
}

impl<T: ReadingHandler + Send + Sync> ReadingHandler for Arc<T> {
    fn handle(&self, sensor: &Sensor, reading: &Reading) -> impl Future<Output = ()> + Send {
        self.as_ref().handle(sensor, reading)
    }
}

/// What became of an ingested message.
#[derive(Debug, Clone, PartialEq)]
pub enum Ingested {
    Accepted(Reading),
    /// The sensor is deactivated; the reading was dropped.
    Inactive(Sensor),
}

/// Processes single telemetry messages.
pub struct TelemetryIngestor<S, RR, C, H> {
    resolver: SensorResolver<S>,
    readings: RR,
    cache: C,
    handler: H,
}

impl<S, RR, C, H> TelemetryIngestor<S, RR, C, H>
where
    S: SensorRepository + Send + Sync,
    RR: ReadingRepository + Send + Sync,
    C: ReadingCache + Send + Sync,
    H: ReadingHandler + Send + Sync,
{
    pub fn new(resolver: SensorResolver<S>, readings: RR, cache: C, handler: H) -> Self {
        Self {
            resolver,
            readings,
            cache,
            handler,
        }
    }

    #[must_use]
    pub fn resolver(&self) -> &SensorResolver<S> {
        &self.resolver
    }

    /// Ingest one message received on `topic`.
    ///
    /// A failure to persist the reading is logged and does not stop
    /// evaluation.
    ///
    /// # Errors
    ///
    /// Returns [`GreenHubError::Decode`] for payloads that cannot be decoded
    /// (drop, do not retry), [`GreenHubError::Validation`] for topics without
    /// a usable hardware id, or a storage error from sensor resolution.
    #[tracing::instrument(skip(self, payload), fields(bytes = payload.len()))]
    pub async fn ingest(&self, topic: &str, payload: &[u8]) -> Result<Ingested, GreenHubError> {
        let received_at = time::now();
        let payload = Payload::parse(payload)?;
        let sensor = self.resolver.resolve(topic, &payload).await?;
        if !sensor.active {
            tracing::debug!(sensor_id = %sensor.id, "Dropping reading of inactive sensor");
            return Ok(Ingested::Inactive(sensor));
        }

        let reading = Reading::decode(sensor.id, &sensor.schema, &payload, received_at)?;
        let out_of_range = reading.out_of_range(&sensor.schema);
        if !out_of_range.is_empty() {
            tracing::debug!(sensor_id = %sensor.id, fields = ?out_of_range, "Reading outside declared range");
        }

        self.cache.set(reading.clone()).await;
        if let Err(err) = self.readings.insert(reading.clone()).await {
            tracing::warn!(sensor_id = %sensor.id, error = %err, "Failed to persist reading");
        }
        self.handler.handle(&sensor, &reading).await;
        Ok(Ingested::Accepted(reading))
    }
}

struct Worker {
    sender: mpsc::Sender<Vec<u8>>,
    handle: JoinHandle<()>,
}

/// Fans messages out to one ingestion worker per topic.
pub struct IngestionRouter<S, RR, C, H> {
    ingestor: Arc<TelemetryIngestor<S, RR, C, H>>,
    workers: HashMap<String, Worker>,
    depth: usize,
}

impl<S, RR, C, H> IngestionRouter<S, RR, C, H>
where
    S: SensorRepository + Send + Sync + 'static,
    RR: ReadingRepository + Send + Sync + 'static,
    C: ReadingCache + Send + Sync + 'static,
    H: ReadingHandler + Send + Sync + 'static,
{
    /// Create a router whose workers buffer up to `depth` messages each.
    pub fn new(ingestor: Arc<TelemetryIngestor<S, RR, C, H>>, depth: usize) -> Self {
        Self {
            ingestor,
            workers: HashMap::new(),
            depth: depth.max(1),
        }
    }

    /// Hand a message to the worker of its topic, spawning it if needed.
    ///
    /// Never waits: when that topic's worker is saturated the message is
    /// dropped and `false` is returned.
    pub fn route(&mut self, topic: &str, payload: Vec<u8>) -> bool {
        let payload = match self.worker(topic).sender.try_send(payload) {
            Ok(()) => return true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(topic, depth = self.depth, "Ingestion worker saturated, dropping message");
                return false;
            }
            Err(mpsc::error::TrySendError::Closed(payload)) => payload,
        };
        tracing::warn!(topic, "Ingestion worker stopped, restarting");
        self.workers.remove(topic);
        self.worker(topic).sender.try_send(payload).is_ok()
    }

    fn worker(&mut self, topic: &str) -> &Worker {
        let ingestor = &self.ingestor;
        let depth = self.depth;
        self.workers
            .entry(topic.to_string())
            .or_insert_with(|| spawn_worker(Arc::clone(ingestor), topic.to_string(), depth))
    }

    /// Number of topics with a running worker.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Stop accepting messages and wait for workers to drain their queues.
    pub async fn shutdown(self) {
        let handles: Vec<_> = self
            .workers
            .into_values()
            .map(|worker| {
                drop(worker.sender);
                worker.handle
            })
            .collect();
        for handle in handles {
            if let Err(err) = handle.await {
                tracing::warn!(error = %err, "Ingestion worker ended abnormally");
            }
        }
    }
}

fn spawn_worker<S, RR, C, H>(
    ingestor: Arc<TelemetryIngestor<S, RR, C, H>>,
    topic: String,
    depth: usize,
) -> Worker
where
    S: SensorRepository + Send + Sync + 'static,
    RR: ReadingRepository + Send + Sync + 'static,
    C: ReadingCache + Send + Sync + 'static,
    H: ReadingHandler + Send + Sync + 'static,
{
    let (sender, mut receiver) = mpsc::channel::<Vec<u8>>(depth);
    tracing::debug!(topic = %topic, "Starting ingestion worker");
    let handle = tokio::spawn(async move {
        while let Some(payload) = receiver.recv().await {
            if let Err(err) = ingestor.ingest(&topic, &payload).await {
                tracing::warn!(topic = %topic, error = %err, "Dropping telemetry message");
            }
        }
    });
    Worker { sender, handle }
}
