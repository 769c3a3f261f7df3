// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Realtime subscription manager.
//!
//! Subscriptions are registered synchronously in a shared [`Hub`]; a single
//! driver task owns the transport and does all I/O. Every channel runs its
//! own reconnect machine over the shared connection:
//!
//! ```text
//! connecting ──► connected ──► disconnected | error ──► reconnecting ──► connected
//!                                      │
//!                                      └── max retries ──► error (terminal until reset)
//! ```

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use fieldops_core::protocol::{ChangeEvent, ClientFrame, RawChange, ServerFrame};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::backoff::Backoff;
use super::health::{ChannelStatus, HealthMonitor};
use super::subscription::{fan_out, ChangeHandler, ChannelSubscriptionConfig, Registry, Subscription, SubscriptionStats};
use super::transport::{Transport, TransportError, TransportResult};
use crate::config::RealtimeConfig;
use crate::network::NetworkMonitor;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// What happened to a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEventKind {
    Connected,
    Disconnected,
    Error { message: String },
    Reconnecting { attempt: u32 },
    MaxRetriesReached,
}

/// A lifecycle event tagged with its channel topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelEvent {
    pub channel: String,
    pub kind: ChannelEventKind,
}

#[derive(Debug)]
enum Command {
    Join { topic: String },
    Leave { topic: String },
    Reset,
}

/// State shared between the manager, its subscriptions and the driver.
pub(crate) struct Hub {
    registry: Mutex<Registry>,
    commands: mpsc::UnboundedSender<Command>,
    max_retries_reached: AtomicBool,
    events: broadcast::Sender<ChannelEvent>,
    next_subscriber: AtomicU64,
}

impl Hub {
    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            debug!("realtime driver has stopped");
        }
    }

    fn announce(&self, channel: &str, kind: ChannelEventKind) {
        // No receivers is fine.
        let _ = self.events.send(ChannelEvent {
            channel: channel.to_string(),
            kind,
        });
    }

    /// Drop a subscriber, leaving every channel it was the last one on.
    pub(crate) fn release(&self, id: u64) {
        let closed = self.registry().remove(id);
        for topic in closed {
            debug!(topic, "last subscriber left channel");
            self.send(Command::Leave { topic });
        }
    }
}

pub struct RealtimeManager {
    hub: Arc<Hub>,
    health: Arc<HealthMonitor>,
    cancel: CancellationToken,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl RealtimeManager {
    /// Spawn the driver task over `transport`. Nothing connects until the
    /// first subscription.
    pub fn spawn(
        transport: Box<dyn Transport>,
        network: NetworkMonitor,
        health: Arc<HealthMonitor>,
        config: RealtimeConfig,
    ) -> Self {
        let (commands, commands_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let hub = Arc::new(Hub {
            registry: Mutex::new(Registry::default()),
            commands,
            max_retries_reached: AtomicBool::new(false),
            events,
            next_subscriber: AtomicU64::new(1),
        });
        let cancel = CancellationToken::new();
        let driver = Driver {
            hub: Arc::clone(&hub),
            health: Arc::clone(&health),
            transport,
            backoff: Backoff::from(&config),
            config,
            links: BTreeMap::new(),
            heartbeat: None,
            heartbeat_seq: 0,
            online: network.is_online(),
        };
        let handle = tokio::spawn(drive(driver, commands_rx, network, cancel.clone()));
        RealtimeManager {
            hub,
            health,
            cancel,
            driver: Mutex::new(Some(handle)),
        }
    }

    /// Subscribe `handler` to the changes `configs` describe. Configs on the
    /// same table share one channel with every other subscriber of it.
    pub fn subscribe(
        &self,
        configs: impl Into<Vec<ChannelSubscriptionConfig>>,
        handler: Arc<dyn ChangeHandler>,
    ) -> Subscription {
        let id = self.hub.next_subscriber.fetch_add(1, Ordering::Relaxed);
        let opened = self.hub.registry().add(id, configs.into(), handler);
        for topic in opened {
            debug!(topic, "opening channel");
            self.hub.send(Command::Join { topic });
        }
        Subscription::new(id, Arc::clone(&self.hub))
    }

    /// Topics of all channels with at least one subscriber.
    pub fn active_channels(&self) -> Vec<String> {
        self.hub.registry().topics()
    }

    pub fn channel_status(&self, name: &str) -> Option<ChannelStatus> {
        self.hub.registry().get(name).map(|entry| entry.status)
    }

    pub fn subscription_stats(&self) -> SubscriptionStats {
        self.hub.registry().stats()
    }

    /// True once any channel exhausted its retries, until [`reset`](Self::reset).
    pub fn max_retries_reached(&self) -> bool {
        self.hub.max_retries_reached.load(Ordering::Acquire)
    }

    pub fn events(&self) -> broadcast::Receiver<ChannelEvent> {
        self.hub.events.subscribe()
    }

    pub fn health(&self) -> &Arc<HealthMonitor> {
        &self.health
    }

    /// Clear the max-retries flag and every channel's retry counter, and
    /// rejoin channels that gave up.
    pub fn reset(&self) {
        self.hub.max_retries_reached.store(false, Ordering::Release);
        self.health.clear_retries();
        self.hub.send(Command::Reset);
    }

    /// Stop the driver and wait for it to close the connection.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let handle = self.driver.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "realtime driver failed");
            }
        }
    }
}

impl Drop for RealtimeManager {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[derive(Debug, Clone, Copy)]
enum LinkState {
    /// Waiting to (re)join at the given time.
    Waiting { at: Instant },
    Joining { deadline: Instant },
    Joined,
    /// Out of retries; only `reset()` revives it.
    Exhausted,
}

#[derive(Debug)]
struct Link {
    state: LinkState,
    /// Consecutive failures since the last successful join.
    failures: u32,
}

impl Link {
    fn is_live(&self) -> bool {
        matches!(self.state, LinkState::Joining { .. } | LinkState::Joined)
    }
}

#[derive(Debug)]
struct Heartbeat {
    next_at: Instant,
    /// Outstanding heartbeat id and its ack deadline.
    pending: Option<(u64, Instant)>,
}

struct Driver {
    hub: Arc<Hub>,
    health: Arc<HealthMonitor>,
    transport: Box<dyn Transport>,
    config: RealtimeConfig,
    backoff: Backoff,
    links: BTreeMap<String, Link>,
    heartbeat: Option<Heartbeat>,
    heartbeat_seq: u64,
    online: bool,
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

async fn drive(
    mut driver: Driver,
    mut commands: mpsc::UnboundedReceiver<Command>,
    network: NetworkMonitor,
    cancel: CancellationToken,
) {
    let mut online = network.subscribe();
    let initially_online = *online.borrow_and_update();
    driver.set_online(initially_online);

    loop {
        let deadline = driver.next_deadline();
        let connected = driver.transport.is_connected();
        tokio::select! {
            _ = cancel.cancelled() => break,
            command = commands.recv() => match command {
                Some(command) => driver.on_command(command).await,
                None => break,
            },
            changed = online.changed() => {
                if changed.is_err() {
                    break;
                }
                let now_online = *online.borrow_and_update();
                driver.set_online(now_online);
            }
            received = driver.transport.recv(), if connected => driver.on_received(received).await,
            _ = wait_until(deadline) => driver.on_timer().await,
        }
    }

    driver.close().await;
}

impl Driver {
    fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.config.join_timeout_ms)
    }

    fn heartbeat_interval(&self) -> Option<Duration> {
        (self.config.heartbeat_interval_ms > 0)
            .then(|| Duration::from_millis(self.config.heartbeat_interval_ms))
    }

    fn next_deadline(&self) -> Option<Instant> {
        let links = self.links.values().filter_map(|link| match link.state {
            LinkState::Waiting { at } if self.online => Some(at),
            LinkState::Joining { deadline } => Some(deadline),
            _ => None,
        });
        let heartbeat = self.heartbeat.as_ref().map(|hb| match hb.pending {
            Some((_, deadline)) => deadline,
            None => hb.next_at,
        });
        links.chain(heartbeat).min()
    }

    fn set_online(&mut self, online: bool) {
        if self.online != online {
            info!(online, "realtime connectivity changed");
        }
        self.online = online;
        self.health.set_online(online);
    }

    fn transition(&self, topic: &str, status: ChannelStatus, error: Option<&str>, event: Option<ChannelEventKind>) {
        self.hub.registry().set_status(topic, status);
        self.health.update_channel_status(topic, status, error);
        if let Some(kind) = event {
            self.hub.announce(topic, kind);
        }
    }

    /// Record a failure on a channel and schedule its next attempt, or give
    /// up once it has failed `max_retries` times in a row.
    fn fail(&mut self, topic: &str, status: ChannelStatus, message: &str) {
        let max_retries = self.config.max_retries;
        let next = {
            let Some(link) = self.links.get_mut(topic) else {
                return;
            };
            link.failures = link.failures.saturating_add(1);
            if link.failures >= max_retries {
                link.state = LinkState::Exhausted;
                None
            } else {
                let delay = self.backoff.delay(link.failures);
                link.state = LinkState::Waiting {
                    at: Instant::now() + delay,
                };
                Some((link.failures, delay))
            }
        };

        match next {
            Some((attempt, delay)) => {
                let event = match status {
                    ChannelStatus::Disconnected => ChannelEventKind::Disconnected,
                    _ => ChannelEventKind::Error {
                        message: message.to_string(),
                    },
                };
                self.transition(topic, status, Some(message), Some(event));
                info!(
                    topic,
                    attempt,
                    ?delay,
                    "channel reconnect scheduled"
                );
                self.transition(
                    topic,
                    ChannelStatus::Reconnecting,
                    None,
                    Some(ChannelEventKind::Reconnecting { attempt }),
                );
            }
            None => {
                warn!(topic, failures = max_retries, error = message, "channel gave up reconnecting");
                self.transition(
                    topic,
                    ChannelStatus::Error,
                    Some(message),
                    Some(ChannelEventKind::Error {
                        message: message.to_string(),
                    }),
                );
                self.hub.max_retries_reached.store(true, Ordering::Release);
                self.health.set_max_retries_reached(true);
                self.hub.announce(topic, ChannelEventKind::MaxRetriesReached);
            }
        }
    }

    async fn ensure_connected(&mut self) -> Result<(), String> {
        if self.transport.is_connected() {
            return Ok(());
        }
        let url = self.config.url.clone();
        let timeout = self.join_timeout();
        match tokio::time::timeout(timeout, self.transport.connect(&url)).await {
            Ok(Ok(())) => {
                info!(url = %url, "change stream connected");
                self.heartbeat = self.heartbeat_interval().map(|interval| Heartbeat {
                    next_at: Instant::now() + interval,
                    pending: None,
                });
                Ok(())
            }
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => {
                let _ = self.transport.disconnect().await;
                Err("connect timed out".to_string())
            }
        }
    }

    async fn join(&mut self, topic: &str) {
        let frame = match self.hub.registry().get(topic) {
            Some(entry) => ClientFrame::join(&entry.schema, &entry.table),
            // Unsubscribed meanwhile; the queued leave removes the link.
            None => return,
        };
        match self.transport.send(frame).await {
            Ok(()) => {
                let deadline = Instant::now() + self.join_timeout();
                if let Some(link) = self.links.get_mut(topic) {
                    link.state = LinkState::Joining { deadline };
                }
                debug!(topic, "join sent");
            }
            Err(e) => {
                let message = e.to_string();
                self.fail(topic, ChannelStatus::Error, &message);
                self.transport_lost(&message).await;
            }
        }
    }

    /// Close the connection and send every live channel into reconnect.
    async fn transport_lost(&mut self, reason: &str) {
        warn!(reason, "change stream connection lost");
        self.heartbeat = None;
        if let Err(e) = self.transport.disconnect().await {
            debug!(error = %e, "disconnect after connection loss failed");
        }
        let live: Vec<String> = self
            .links
            .iter()
            .filter(|(_, link)| link.is_live())
            .map(|(topic, _)| topic.clone())
            .collect();
        for topic in live {
            self.fail(&topic, ChannelStatus::Disconnected, reason);
        }
    }

    async fn on_timer(&mut self) {
        let now = Instant::now();

        let timed_out: Vec<String> = self
            .links
            .iter()
            .filter(|(_, link)| matches!(link.state, LinkState::Joining { deadline } if deadline <= now))
            .map(|(topic, _)| topic.clone())
            .collect();
        for topic in timed_out {
            warn!(topic, "join was not acknowledged");
            self.fail(&topic, ChannelStatus::Error, "join timed out");
        }

        let (ack_overdue, heartbeat_due) = match &self.heartbeat {
            Some(hb) => (
                hb.pending.is_some_and(|(_, deadline)| deadline <= now),
                hb.pending.is_none() && hb.next_at <= now,
            ),
            None => (false, false),
        };
        if ack_overdue {
            self.transport_lost("heartbeat not acknowledged").await;
        } else if heartbeat_due {
            self.send_heartbeat().await;
        }

        if !self.online {
            return;
        }
        let due: Vec<String> = self
            .links
            .iter()
            .filter(|(_, link)| matches!(link.state, LinkState::Waiting { at } if at <= now))
            .map(|(topic, _)| topic.clone())
            .collect();
        if due.is_empty() {
            return;
        }
        if let Err(message) = self.ensure_connected().await {
            warn!(error = %message, "change stream connect failed");
            for topic in &due {
                self.fail(topic, ChannelStatus::Error, &message);
            }
            return;
        }
        for topic in &due {
            if !self.transport.is_connected() {
                break;
            }
            self.join(topic).await;
        }
    }

    async fn send_heartbeat(&mut self) {
        let Some(interval) = self.heartbeat_interval() else {
            return;
        };
        self.heartbeat_seq += 1;
        let id = self.heartbeat_seq;
        match self.transport.send(ClientFrame::heartbeat(id)).await {
            Ok(()) => {
                let now = Instant::now();
                let timeout = Duration::from_millis(self.config.heartbeat_timeout_ms);
                if let Some(hb) = &mut self.heartbeat {
                    hb.pending = Some((id, now + timeout));
                    hb.next_at = now + interval;
                }
            }
            Err(e) => self.transport_lost(&e.to_string()).await,
        }
    }

    async fn on_received(&mut self, received: TransportResult<Option<ServerFrame>>) {
        match received {
            Ok(Some(frame)) => self.on_frame(frame),
            Ok(None) => self.transport_lost("connection closed").await,
            Err(TransportError::SerializationError(e)) => {
                warn!(error = %e, "dropping malformed frame");
            }
            Err(e) => self.transport_lost(&e.to_string()).await,
        }
    }

    fn on_frame(&mut self, frame: ServerFrame) {
        match frame {
            ServerFrame::JoinOk { topic } => {
                let Some(link) = self.links.get_mut(&topic) else {
                    debug!(topic, "join ack for unknown channel");
                    return;
                };
                if !matches!(link.state, LinkState::Joining { .. }) {
                    return;
                }
                link.state = LinkState::Joined;
                link.failures = 0;
                info!(topic, "channel joined");
                self.transition(&topic, ChannelStatus::Connected, None, Some(ChannelEventKind::Connected));
            }
            ServerFrame::JoinError { topic, message } => {
                if self.is_joining(&topic) {
                    warn!(topic, error = %message, "join rejected");
                    self.fail(&topic, ChannelStatus::Error, &message);
                }
            }
            ServerFrame::Change { topic, change } => self.dispatch(&topic, change),
            ServerFrame::ChannelClosed { topic, reason } => {
                if self.links.get(&topic).is_some_and(Link::is_live) {
                    warn!(topic, reason = %reason, "server closed channel");
                    self.fail(&topic, ChannelStatus::Disconnected, &reason);
                }
            }
            ServerFrame::HeartbeatAck { id } => {
                if let Some(hb) = &mut self.heartbeat {
                    if hb.pending.is_some_and(|(pending, _)| pending == id) {
                        hb.pending = None;
                    }
                }
            }
        }
    }

    fn is_joining(&self, topic: &str) -> bool {
        self.links
            .get(topic)
            .is_some_and(|link| matches!(link.state, LinkState::Joining { .. }))
    }

    fn dispatch(&self, topic: &str, change: RawChange) {
        let joined = self
            .links
            .get(topic)
            .is_some_and(|link| matches!(link.state, LinkState::Joined));
        if !joined {
            debug!(topic, "dropping change for a channel that is not joined");
            return;
        }
        let event = match ChangeEvent::try_from(change) {
            Ok(event) => event,
            Err(e) => {
                warn!(topic, error = %e, "dropping malformed change");
                return;
            }
        };
        self.health.record_event(topic);
        let handlers = self.hub.registry().handlers_for(topic, &event);
        let failed = fan_out(topic, &event, &handlers);
        debug!(topic, event = %event.event_type(), handlers = handlers.len(), failed, "change dispatched");
    }

    async fn on_command(&mut self, command: Command) {
        match command {
            Command::Join { topic } => {
                if self.links.contains_key(&topic) || self.hub.registry().get(&topic).is_none() {
                    return;
                }
                self.links.insert(
                    topic.clone(),
                    Link {
                        state: LinkState::Waiting { at: Instant::now() },
                        failures: 0,
                    },
                );
                self.health.register_channel(&topic);
            }
            Command::Leave { topic } => {
                if let Some(link) = self.links.remove(&topic) {
                    if link.is_live() && self.transport.is_connected() {
                        if let Err(e) = self.transport.send(ClientFrame::leave(topic.as_str())).await {
                            self.transport_lost(&e.to_string()).await;
                        }
                    }
                    info!(topic, "channel left");
                }
                self.health.unregister_channel(&topic);
                if self.links.is_empty() && self.transport.is_connected() {
                    info!("no channels left, closing change stream");
                    self.heartbeat = None;
                    let _ = self.transport.disconnect().await;
                }
            }
            Command::Reset => {
                info!("resetting realtime channels");
                let mut revived = Vec::new();
                for (topic, link) in &mut self.links {
                    link.failures = 0;
                    if matches!(link.state, LinkState::Exhausted) {
                        link.state = LinkState::Waiting { at: Instant::now() };
                        revived.push(topic.clone());
                    }
                }
                for topic in revived {
                    self.transition(&topic, ChannelStatus::Connecting, None, None);
                }
            }
        }
    }

    async fn close(&mut self) {
        self.heartbeat = None;
        if self.transport.is_connected() {
            if let Err(e) = self.transport.disconnect().await {
                debug!(error = %e, "disconnect on shutdown failed");
            }
        }
        debug!("realtime driver stopped");
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
