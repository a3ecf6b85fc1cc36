// Copyright 2026 The Cortex Relay Authors
// SPDX-License-Identifier: Apache-2.0

// Streaming delivery
//
// Responsibilities:
// - Forward provider deltas to the client as `chunk` events
// - Deliver an early batch of sections once the threshold is reached
// - Deliver the remaining sections and `done` when the provider finishes
// - Keep the connection alive with heartbeats; stop on disconnect
// - Surface every failure as one opaque `error` event

mod coordinator;
mod types;

pub use coordinator::StreamCoordinator;
pub use types::{
    DeliveryEvent, DeliveryPhase, DeliveryPolicy, DEFAULT_EARLY_BATCH_THRESHOLD,
    DEFAULT_HEARTBEAT_SECS, PUBLIC_ERROR_MESSAGE,
};
