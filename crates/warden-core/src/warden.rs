//! # Warden Service
//!
//! Wires the collaborators, the decode pump, the processor and the
//! keep-alive task into one run.
//!
//! ## Lifecycle
//!
//! 1. Resolve every monitored email. Any failure aborts the run.
//! 2. Register the subscription plan against the channel's target URL.
//! 3. Open the stream, then spawn the pump and the keep-alive task.
//! 4. Process events until the stream ends for good or shutdown is
//!    requested.
//! 5. Stop the keep-alive, optionally delete every feed, and report.
//!    A run that fails after step 2 began still deletes the feeds.
//!
//! ## Stream ends
//!
//! With the default reconnect policy the run finishes when the stream
//! ends. With `relay.reconnect_attempts > 0` the pump reopens the stream
//! with doubling backoff; the attempt counter resets whenever a
//! connection delivered at least one record.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use warden_events::{pump, CallEvent, ChunkSource, DecodeStats, EventDecoder, PersonId, PumpEnd};
use warden_monitor::MonitoredSet;

use crate::collaborators::{
    EventChannel, IdentityResolver, Notifier, SubscriptionManager, TerminationCommand,
};
use crate::config::{ReconnectPolicy, WardenConfig};
use crate::error::WardenError;
use crate::keepalive::{spawn_keepalive, KeepAliveStats};
use crate::processor::{EventProcessor, ProcessorConfig, ProcessorReport};
use crate::subscriptions::subscription_plan;
use crate::Result;

/// The external systems a run talks to.
#[derive(Clone)]
pub struct Collaborators {
    /// Email to person id lookup.
    pub identities: Arc<dyn IdentityResolver>,
    /// Feed registration.
    pub subscriptions: Arc<dyn SubscriptionManager>,
    /// The relay the feeds deliver to.
    pub channel: Arc<dyn EventChannel>,
    /// Hang-up command.
    pub terminator: Arc<dyn TerminationCommand>,
    /// Direct messages.
    pub notifier: Arc<dyn Notifier>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("target_url", &self.channel.target_url())
            .finish_non_exhaustive()
    }
}

/// Summary of a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Processor counters and final state sizes.
    pub processor: ProcessorReport,
    /// Decoder counters across every connection.
    pub decode: DecodeStats,
    /// Relay refresh counters.
    pub keepalive: KeepAliveStats,
    /// Feeds deleted at shutdown, if cleanup ran and succeeded.
    pub subscriptions_removed: Option<usize>,
}

/// The enforcement service.
#[derive(Debug)]
pub struct Warden {
    config: WardenConfig,
    collaborators: Collaborators,
}

impl Warden {
    /// Creates a service from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`WardenError::Config`] if the configuration is invalid.
    pub fn new(config: WardenConfig, collaborators: Collaborators) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            collaborators,
        })
    }

    /// The configuration in use.
    #[must_use]
    pub const fn config(&self) -> &WardenConfig {
        &self.config
    }

    /// Resolves every monitored email, in configuration order.
    ///
    /// # Errors
    ///
    /// Returns [`WardenError::IdentityResolution`] for the first email
    /// that cannot be resolved. A partial monitored set is never returned.
    pub async fn resolve_monitored(&self) -> Result<Vec<PersonId>> {
        let mut people = Vec::with_capacity(self.config.policy.monitored.len());
        for email in &self.config.policy.monitored {
            let person = self
                .collaborators
                .identities
                .resolve(email)
                .await
                .map_err(|source| WardenError::IdentityResolution {
                    email: email.clone(),
                    source,
                })?;
            debug!(email = %email, person_id = %person, "monitored identity resolved");
            people.push(person);
        }
        info!(count = people.len(), "monitored identities resolved");
        Ok(people)
    }

    /// Registers the feeds for `people`. Returns the created feed ids.
    ///
    /// # Errors
    ///
    /// Returns [`WardenError::Subscription`] for the first feed that
    /// cannot be registered.
    pub async fn register_subscriptions(&self, people: &[PersonId]) -> Result<Vec<String>> {
        let target_url = self.collaborators.channel.target_url();
        let mut ids = Vec::new();
        for spec in subscription_plan(people) {
            let id = self
                .collaborators
                .subscriptions
                .create_subscription(&spec, &target_url)
                .await
                .map_err(|source| WardenError::Subscription {
                    name: format!("{}:{}", spec.resource, spec.event),
                    source,
                })?;
            debug!(subscription_id = %id, resource = %spec.resource, event = %spec.event, filter = %spec.filter, "subscription registered");
            ids.push(id);
        }
        info!(count = ids.len(), target_url = %target_url, "subscriptions registered");
        Ok(ids)
    }

    /// Deletes every registered feed.
    ///
    /// # Errors
    ///
    /// Returns [`WardenError::Subscription`] if listing or deleting fails.
    pub async fn cleanup(&self) -> Result<usize> {
        let removed = self
            .collaborators
            .subscriptions
            .delete_all()
            .await
            .map_err(|source| WardenError::Subscription {
                name: "*".to_string(),
                source,
            })?;
        info!(removed, "subscriptions deleted");
        Ok(removed)
    }

    /// Runs until the stream ends for good or `shutdown` is cancelled.
    ///
    /// # Errors
    ///
    /// Startup failures are returned: identity resolution, subscription
    /// registration and opening the first stream. Once events flow, the
    /// run only ends with a report. When cleanup is enabled, feeds are
    /// deleted on the error paths too, once registration has started.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<RunReport> {
        let people = self.resolve_monitored().await?;
        let outcome = self.enforce(people, shutdown).await;

        let subscriptions_removed = if self.config.runtime.cleanup_subscriptions {
            match self.cleanup().await {
                Ok(removed) => Some(removed),
                Err(error) => {
                    warn!(error = %error, "subscription cleanup failed");
                    None
                }
            }
        } else {
            None
        };

        let (processor, decode, keepalive) = outcome?;
        let report = RunReport {
            processor,
            decode,
            keepalive,
            subscriptions_removed,
        };
        info!(decode = ?report.decode, keepalive = ?report.keepalive, "warden stopped");
        Ok(report)
    }

    async fn enforce(
        &self,
        people: Vec<PersonId>,
        shutdown: CancellationToken,
    ) -> Result<(ProcessorReport, DecodeStats, KeepAliveStats)> {
        self.register_subscriptions(&people).await?;

        let channel = Arc::clone(&self.collaborators.channel);
        let first = channel.open_stream().await.map_err(WardenError::StreamOpen)?;
        info!("event stream opened");

        let mut processor_config = ProcessorConfig::new().with_threshold(self.config.policy.threshold);
        if let Some(notice) = self.config.notice() {
            processor_config = processor_config.with_notice(notice);
        }
        let processor = EventProcessor::new(
            MonitoredSet::new(people),
            processor_config,
            Arc::clone(&self.collaborators.terminator),
            Arc::clone(&self.collaborators.notifier),
        )?;

        let (events_tx, events_rx) = mpsc::channel(self.config.runtime.event_buffer);
        let keepalive_stop = shutdown.child_token();
        let keepalive = spawn_keepalive(
            Arc::clone(&channel),
            self.config.keepalive_interval(),
            keepalive_stop.clone(),
        );
        let pump_task = tokio::spawn(stream_events(
            channel,
            first,
            EventDecoder::with_max_record_bytes(self.config.runtime.max_record_bytes),
            events_tx,
            self.config.reconnect_policy(),
            shutdown.clone(),
        ));

        let processor = processor.run(events_rx).await;

        keepalive_stop.cancel();
        let keepalive = keepalive
            .await
            .map_err(|e| WardenError::Internal(format!("keepalive task failed: {e}")))?;
        let decode = pump_task
            .await
            .map_err(|e| WardenError::Internal(format!("stream task failed: {e}")))?;

        Ok((processor, decode, keepalive))
    }
}

/// Pumps the stream into `events`, reopening it per `policy`.
///
/// Returns the decoder counters once the stream is given up on, the
/// receiver is gone, or `shutdown` fires. Dropping `events` on return
/// is what tells the processor the stream is over.
async fn stream_events(
    channel: Arc<dyn EventChannel>,
    mut source: Box<dyn ChunkSource>,
    mut decoder: EventDecoder,
    events: mpsc::Sender<CallEvent>,
    policy: ReconnectPolicy,
    shutdown: CancellationToken,
) -> DecodeStats {
    let mut attempt: u32 = 0;

    'stream: loop {
        let records_before = decoder.stats().records;
        let end = tokio::select! {
            () = shutdown.cancelled() => {
                info!("shutdown requested, closing event stream");
                break 'stream;
            }
            end = pump(&mut source, &mut decoder, &events) => end,
        };
        if end == PumpEnd::ReceiverClosed {
            break 'stream;
        }
        if decoder.stats().records > records_before {
            attempt = 0;
        }

        loop {
            attempt += 1;
            if attempt > policy.attempts {
                if policy.attempts == 0 {
                    warn!(reason = ?end, "event stream ended, stopping");
                } else {
                    warn!(reason = ?end, attempts = policy.attempts, "event stream lost, giving up");
                }
                break 'stream;
            }

            let delay = policy.delay(attempt);
            info!(attempt, delay_ms = delay.as_millis() as u64, "reconnecting event stream");
            tokio::select! {
                () = shutdown.cancelled() => break 'stream,
                () = tokio::time::sleep(delay) => {}
            }

            let reopened = tokio::select! {
                () = shutdown.cancelled() => break 'stream,
                reopened = channel.open_stream() => reopened,
            };
            match reopened {
                Ok(next) => {
                    decoder.reset();
                    source = next;
                    info!(attempt, "event stream reopened");
                    continue 'stream;
                }
                Err(error) => warn!(attempt, error = %error, "reconnect failed"),
            }
        }
    }

    decoder.stats()
}
