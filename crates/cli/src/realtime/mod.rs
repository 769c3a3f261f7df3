// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Live change subscriptions over one multiplexed connection.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐ subscribe ┌──────────────┐  frames  ┌──────────────┐
//! │  Subscriber  │──────────►│   Realtime   │◄────────►│  Transport   │
//! │ (handler)    │◄──────────│   Manager    │          │ (WebSocket)  │
//! └──────────────┘  changes  └──────┬───────┘          └──────────────┘
//!                                   │ transitions
//!                                   ▼
//!                            ┌──────────────┐
//!                            │    Health    │
//!                            │   Monitor    │
//!                            └──────────────┘
//! ```
//!
//! # Features
//!
//! - One channel per `(schema, table)`, shared by every subscriber
//! - Event type and `column=eq.value` filters per subscription
//! - Handler failures and panics are isolated from other subscribers
//! - Per-channel reconnect with exponential backoff and jitter
//! - Heartbeats detect a dead connection
//! - Reconnects pause while offline

mod backoff;
mod health;
mod manager;
mod subscription;
mod transport;

pub use backoff::Backoff;
pub use health::{ChannelHealth, ChannelStatus, HealthListener, HealthMetrics, HealthMonitor, HealthState};
pub use manager::{ChannelEvent, ChannelEventKind, RealtimeManager};
pub use subscription::{
    fan_out, parse_event, ChangeHandler, ChannelSubscriptionConfig, FilterError, HandlerError, HandlerResult,
    RowFilter, Subscription, SubscriptionStats, DEFAULT_SCHEMA,
};
pub use transport::{Transport, TransportError, TransportResult, WebSocketTransport};

#[cfg(test)]
pub(crate) mod test_helpers;
