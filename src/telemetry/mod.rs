//! The telemetry service: the handle applications hold to record events.

mod helpers;

use crate::buffer::{BatchConfig, BatchScheduler, FlushTrigger, SchedulerState};
use crate::domain::{
    EnvironmentFacts, Event, EventType, SessionContext, TelemetryError, payload_to_fields,
};
use crate::reliability::RetryConfig;
use crate::sender::{BatchTransmitter, ClientConfig, HttpClient, StatsSnapshot, TelemetryStats, Transport};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// When false every tracking call is a no-op.
    pub enabled: bool,
    pub batch: BatchConfig,
    pub retry: RetryConfig,
    /// Record a `session_start` (and `performance`, if timing is known)
    /// event when the session is created.
    pub announce_session: bool,
    /// How long `shutdown` waits for in-flight sends.
    pub shutdown_grace: Duration,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            batch: BatchConfig::default(),
            retry: RetryConfig::default(),
            announce_session: false,
            shutdown_grace: Duration::from_secs(4),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShutdownReport {
    pub undelivered: usize,
    pub timed_out: bool,
    pub stats: StatsSnapshot,
}

/// Records application events and hands them to the batch scheduler.
///
/// Tracking calls are synchronous and never wait on the network. Construct
/// one per application (or per test) and call [`TelemetryService::shutdown`]
/// to flush what is left.
pub struct TelemetryService<T: Transport = BatchTransmitter> {
    config: TelemetryConfig,
    facts: EnvironmentFacts,
    session: OnceLock<SessionContext>,
    current_page: RwLock<String>,
    scheduler: BatchScheduler<T>,
    stats: TelemetryStats,
}

impl TelemetryService<BatchTransmitter> {
    /// Service posting to the HTTP collector described by `client_config`.
    pub fn connect(
        config: TelemetryConfig,
        client_config: ClientConfig,
        facts: EnvironmentFacts,
    ) -> Result<Self, TelemetryError> {
        let client = HttpClient::new(client_config)?;
        info!("Telemetry collector: {}", client.endpoint());
        Self::create(config, facts, BatchTransmitter::new(client))
    }
}

impl<T: Transport> TelemetryService<T> {
    pub fn create(
        config: TelemetryConfig,
        facts: EnvironmentFacts,
        transport: T,
    ) -> Result<Self, TelemetryError> {
        let stats = TelemetryStats::new();
        let scheduler = BatchScheduler::new(config.batch, config.retry.clone(), transport, stats.clone())?;

        if !config.enabled {
            info!("Telemetry disabled; events will be discarded");
        }

        Ok(Self {
            current_page: RwLock::new(facts.initial_page.clone()),
            config,
            facts,
            session: OnceLock::new(),
            scheduler,
            stats,
        })
    }

    /// Records an event with a caller-defined payload.
    ///
    /// The payload must serialize to a JSON object. A payload that does not is
    /// dropped and reported; the service carries on either way.
    pub fn track<P>(&self, event_type: impl Into<EventType>, payload: &P) -> Result<(), TelemetryError>
    where
        P: Serialize + ?Sized,
    {
        if !self.config.enabled {
            return Ok(());
        }

        let event_type = event_type.into();
        match payload_to_fields(payload) {
            Ok(fields) => {
                self.record(event_type, fields);
                Ok(())
            }
            Err(reason) => {
                self.stats.record_dropped(1);
                warn!("Dropping '{}' event: {}", event_type, reason);
                Err(TelemetryError::MalformedPayload {
                    event_type: event_type.to_string(),
                    reason,
                })
            }
        }
    }

    /// Sets the path stamped as `page_url` on subsequent events.
    pub fn navigate(&self, path: impl Into<String>) {
        *self.current_page.write() = path.into();
    }

    pub fn current_page(&self) -> String {
        self.current_page.read().clone()
    }

    /// The session, created on first use. When announcing is on, the
    /// announcement is queued before the session becomes visible, so it
    /// precedes every other event of the session.
    pub fn session(&self) -> &SessionContext {
        self.session.get_or_init(|| {
            let session = SessionContext::new();
            debug!("Telemetry session {} started", session.session_id());
            if self.config.enabled && self.config.announce_session {
                self.announce(&session);
            }
            session
        })
    }

    pub fn facts(&self) -> &EnvironmentFacts {
        &self.facts
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Sends whatever is queued right away.
    pub fn flush(&self) -> bool {
        self.scheduler.flush_now(FlushTrigger::Manual)
    }

    pub fn pending_events(&self) -> usize {
        self.scheduler.pending()
    }

    pub fn scheduler_state(&self) -> SchedulerState {
        self.scheduler.state()
    }

    pub fn scheduler(&self) -> &BatchScheduler<T> {
        &self.scheduler
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Flushes the queue, waits for in-flight sends within the configured
    /// grace period and reports what could not be delivered.
    pub async fn shutdown(self) -> ShutdownReport {
        let drain = self.scheduler.shutdown(self.config.shutdown_grace).await;
        let stats = self.stats.snapshot();

        if drain.undelivered > 0 {
            warn!(
                "Telemetry shut down with {} undelivered events",
                drain.undelivered
            );
        } else {
            info!(
                "Telemetry shut down: {} events in {} batches delivered",
                stats.events_sent, stats.batches_sent
            );
        }

        ShutdownReport {
            undelivered: drain.undelivered,
            timed_out: drain.timed_out,
            stats,
        }
    }

    pub(crate) fn record(&self, event_type: EventType, fields: Map<String, Value>) {
        if !self.config.enabled {
            return;
        }

        let session_id = self.session().session_id().to_string();
        let page_url = self.current_page();
        self.stats.record_tracked();
        self.scheduler
            .enqueue(Event::new(event_type, session_id, page_url, fields));
    }

    fn announce(&self, session: &SessionContext) {
        let page_url = self.current_page();

        self.stats.record_tracked();
        self.scheduler.enqueue(Event::new(
            EventType::SessionStart,
            session.session_id(),
            page_url.clone(),
            self.facts.session_fields(),
        ));

        if let Some(timing) = self.facts.navigation_timing {
            self.stats.record_tracked();
            self.scheduler.enqueue(Event::new(
                EventType::Performance,
                session.session_id(),
                page_url,
                helpers::timing_fields(&timing),
            ));
        }
    }
}
