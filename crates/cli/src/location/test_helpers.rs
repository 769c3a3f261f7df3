// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Scripted geolocation adapter for tracker tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use futures_util::future::BoxFuture;

use super::{GeolocationAdapter, GeolocationError, Position, PositionRequest};

/// What a scripted request does.
#[derive(Debug, Clone)]
pub enum Reply {
    Fix(Position),
    Fail(GeolocationError),
    /// Resolve with the position after a delay.
    Delayed(Duration, Position),
    /// Never resolve.
    Hang,
}

/// Geolocation adapter answering from a script, then from a fallback.
#[derive(Clone)]
pub struct FakeGeolocation {
    script: Arc<Mutex<VecDeque<Reply>>>,
    fallback: Arc<Mutex<Reply>>,
    calls: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<PositionRequest>>>,
}

impl FakeGeolocation {
    pub fn new() -> Self {
        FakeGeolocation {
            script: Arc::new(Mutex::new(VecDeque::new())),
            fallback: Arc::new(Mutex::new(Reply::Fix(position(0.0, 0.0)))),
            calls: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn push(&self, reply: Reply) {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(reply);
    }

    pub fn set_fallback(&self, reply: Reply) {
        *self.fallback.lock().unwrap_or_else(PoisonError::into_inner) = reply;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<PositionRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl GeolocationAdapter for FakeGeolocation {
    fn current_position(
        &self,
        request: PositionRequest,
    ) -> BoxFuture<'_, Result<Position, GeolocationError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);
        let reply = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| {
                self.fallback
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone()
            });
        Box::pin(async move {
            match reply {
                Reply::Fix(p) => Ok(p),
                Reply::Fail(e) => Err(e),
                Reply::Delayed(delay, p) => {
                    tokio::time::sleep(delay).await;
                    Ok(p)
                }
                Reply::Hang => std::future::pending().await,
            }
        })
    }
}

pub fn position(lat: f64, lon: f64) -> Position {
    Position::new(lat, lon, 8.0, Utc::now())
}
