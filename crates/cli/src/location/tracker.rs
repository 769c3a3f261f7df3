// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Battery-aware location tracker.
//!
//! The tracker owns one control task per tracking session. The task listens
//! for battery changes and override wakeups, polls the platform on the
//! current mode's interval and filters the results. Every session has an
//! epoch; results carrying an older epoch are discarded, so `stop()` takes
//! effect immediately even while a platform request is still in flight.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use fieldops_core::BatteryMode;
use tokio::sync::{mpsc, Notify};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::battery::{config_for, mode_for, BatteryAdapter, BatteryStatus, LocationConfig, ModeThresholds};
use super::geolocation::{distance_m, GeolocationAdapter, GeolocationError, Position, PositionRequest};

/// Mode used until a battery reading arrives.
const FALLBACK_MODE: BatteryMode = BatteryMode::Balanced;

#[derive(Debug, Clone, PartialEq)]
pub enum TrackerEvent {
    /// A sample that passed the interval and displacement filters.
    Position {
        position: Position,
        mode: BatteryMode,
    },
    Error(GeolocationError),
    ModeChanged {
        mode: BatteryMode,
        config: LocationConfig,
    },
}

type PollResult = (u64, Instant, Result<Position, GeolocationError>);

struct TrackerState {
    running: bool,
    epoch: u64,
    battery: Option<BatteryStatus>,
    manual: Option<BatteryMode>,
    mode: BatteryMode,
    config: LocationConfig,
    last_position: Option<Position>,
    last_issued: Option<Instant>,
    control: Option<CancellationToken>,
}

impl TrackerState {
    fn effective_mode(&self, thresholds: ModeThresholds) -> BatteryMode {
        if let Some(mode) = self.manual {
            return mode;
        }
        self.battery
            .map(|status| mode_for(status, thresholds))
            .unwrap_or(FALLBACK_MODE)
    }

    /// Recompute the effective mode, returning it when it changed.
    fn reevaluate(&mut self, thresholds: ModeThresholds) -> Option<TrackerEvent> {
        let mode = self.effective_mode(thresholds);
        if mode == self.mode {
            return None;
        }
        self.mode = mode;
        self.config = config_for(mode);
        Some(TrackerEvent::ModeChanged {
            mode,
            config: self.config,
        })
    }
}

struct Shared<G, B> {
    geolocation: Arc<G>,
    battery: Arc<B>,
    thresholds: ModeThresholds,
    state: Mutex<TrackerState>,
    events: mpsc::UnboundedSender<TrackerEvent>,
    wake: Notify,
}

impl<G: GeolocationAdapter, B: BatteryAdapter> Shared<G, B> {
    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // Events are sent with the state lock held so nothing is emitted after
    // a concurrent stop() returns.
    fn emit(&self, event: TrackerEvent) {
        if self.events.send(event).is_err() {
            debug!("tracker event receiver dropped");
        }
    }

    fn on_battery(&self, status: BatteryStatus) {
        let mut state = self.lock();
        state.battery = Some(status);
        if let Some(event) = state.reevaluate(self.thresholds) {
            info!(level = status.level, charging = status.is_charging, mode = %state.mode, "battery mode changed");
            self.emit(event);
        }
    }

    fn config(&self) -> LocationConfig {
        self.lock().config
    }

    fn request(&self, epoch: u64, config: &LocationConfig, tx: mpsc::UnboundedSender<PollResult>) {
        let geolocation = Arc::clone(&self.geolocation);
        let request = PositionRequest::from(config);
        let issued_at = Instant::now();
        tokio::spawn(async move {
            let result =
                match tokio::time::timeout(request.timeout, geolocation.current_position(request)).await {
                    Ok(result) => result,
                    Err(_) => Err(GeolocationError::Timeout),
                };
            // The session may be gone; its receiver is then dropped.
            let _ = tx.send((epoch, issued_at, result));
        });
    }

    /// Returns false when the session must end.
    fn handle(&self, epoch: u64, issued_at: Instant, result: Result<Position, GeolocationError>) -> bool {
        let mut state = self.lock();
        if !state.running || state.epoch != epoch {
            debug!(epoch, "discarding stale location result");
            return false;
        }

        match result {
            Ok(position) => {
                if let (Some(last), Some(last_issued)) = (state.last_position, state.last_issued) {
                    if issued_at.duration_since(last_issued) < state.config.poll_interval {
                        debug!("dropping sample inside the mode interval");
                        return true;
                    }
                    let moved = distance_m(&last, &position);
                    if moved < state.config.min_displacement_m {
                        debug!(moved, "dropping sample below minimum displacement");
                        return true;
                    }
                }
                state.last_position = Some(position);
                state.last_issued = Some(issued_at);
                self.emit(TrackerEvent::Position {
                    position,
                    mode: state.mode,
                });
                true
            }
            Err(err) if err.is_terminal() => {
                warn!(error = %err, "location tracking stopped");
                state.running = false;
                state.epoch += 1;
                state.control = None;
                self.emit(TrackerEvent::Error(err));
                false
            }
            Err(err) => {
                debug!(error = %err, "location request failed");
                self.emit(TrackerEvent::Error(err));
                true
            }
        }
    }
}

/// Ticker for `config`. The first tick is due one interval after the last
/// request, or immediately when nothing has been requested yet.
fn ticker_for(config: &LocationConfig, last_request: Option<Instant>) -> Interval {
    let start = match last_request {
        Some(at) => at + config.poll_interval,
        None => Instant::now(),
    };
    let mut ticker = tokio::time::interval_at(start, config.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

async fn run<G: GeolocationAdapter, B: BatteryAdapter>(shared: Arc<Shared<G, B>>, epoch: u64, cancel: CancellationToken) {
    let mut battery_rx = shared.battery.subscribe();
    let mut battery_open = true;
    let initial = *battery_rx.borrow_and_update();
    shared.on_battery(initial);

    let (result_tx, mut result_rx) = mpsc::unbounded_channel::<PollResult>();
    let mut active = shared.config();
    let mut last_request = None;
    let mut ticker = ticker_for(&active, last_request);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            changed = battery_rx.changed(), if battery_open => {
                if changed.is_err() {
                    debug!("battery updates closed");
                    battery_open = false;
                    continue;
                }
                let status = *battery_rx.borrow_and_update();
                shared.on_battery(status);
            }
            _ = shared.wake.notified() => {}
            at = ticker.tick() => {
                last_request = Some(at);
                shared.request(epoch, &active, result_tx.clone());
            }
            Some((result_epoch, issued_at, result)) = result_rx.recv() => {
                if !shared.handle(result_epoch, issued_at, result) {
                    break;
                }
            }
        }

        let config = shared.config();
        if config != active {
            debug!(interval = ?config.poll_interval, "recreating location timer");
            active = config;
            ticker = ticker_for(&active, last_request);
        }
    }
    debug!(epoch, "location session ended");
}

/// Samples positions at a cadence chosen from battery state.
pub struct BatteryAwareLocationTracker<G: GeolocationAdapter, B: BatteryAdapter> {
    shared: Arc<Shared<G, B>>,
}

impl<G: GeolocationAdapter, B: BatteryAdapter> BatteryAwareLocationTracker<G, B> {
    pub fn new(
        geolocation: Arc<G>,
        battery: Arc<B>,
        thresholds: ModeThresholds,
    ) -> (Self, mpsc::UnboundedReceiver<TrackerEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let state = TrackerState {
            running: false,
            epoch: 0,
            battery: None,
            manual: None,
            mode: FALLBACK_MODE,
            config: config_for(FALLBACK_MODE),
            last_position: None,
            last_issued: None,
            control: None,
        };
        let shared = Arc::new(Shared {
            geolocation,
            battery,
            thresholds,
            state: Mutex::new(state),
            events,
            wake: Notify::new(),
        });
        (BatteryAwareLocationTracker { shared }, rx)
    }

    /// Start a tracking session. No-op while already running.
    pub async fn start(&self) {
        if self.is_running() {
            return;
        }
        let status = match self.shared.battery.status().await {
            Ok(status) => Some(status),
            Err(e) => {
                warn!(error = %e, "battery status unavailable");
                None
            }
        };

        let (epoch, cancel, mode) = {
            let mut state = self.shared.lock();
            if state.running {
                return;
            }
            if status.is_some() {
                state.battery = status;
            }
            state.running = true;
            state.epoch += 1;
            state.last_issued = None;
            if let Some(event) = state.reevaluate(self.shared.thresholds) {
                self.shared.emit(event);
            }
            let cancel = CancellationToken::new();
            state.control = Some(cancel.clone());
            (state.epoch, cancel, state.mode)
        };

        info!(%mode, "location tracking started");
        tokio::spawn(run(Arc::clone(&self.shared), epoch, cancel));
    }

    /// Stop the session. Results still in flight are discarded.
    pub fn stop(&self) {
        let mut state = self.shared.lock();
        if !state.running {
            return;
        }
        state.running = false;
        state.epoch += 1;
        if let Some(cancel) = state.control.take() {
            cancel.cancel();
        }
        info!("location tracking stopped");
    }

    /// Pin a mode, or clear the pin with `None`. A pinned mode ignores
    /// battery changes until cleared.
    pub fn set_manual_mode(&self, mode: Option<BatteryMode>) {
        {
            let mut state = self.shared.lock();
            state.manual = mode;
            if let Some(event) = state.reevaluate(self.shared.thresholds) {
                info!(mode = %state.mode, manual = mode.is_some(), "location mode changed");
                self.shared.emit(event);
            }
        }
        self.shared.wake.notify_one();
    }

    pub fn manual_mode(&self) -> Option<BatteryMode> {
        self.shared.lock().manual
    }

    pub fn get_current_mode(&self) -> BatteryMode {
        self.shared.lock().mode
    }

    pub fn current_config(&self) -> LocationConfig {
        self.shared.config()
    }

    pub fn last_position(&self) -> Option<Position> {
        self.shared.lock().last_position
    }

    pub fn is_running(&self) -> bool {
        self.shared.lock().running
    }
}

impl<G: GeolocationAdapter, B: BatteryAdapter> Drop for BatteryAwareLocationTracker<G, B> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
#[path = "tracker_tests.rs"]
mod tests;
