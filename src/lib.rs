// Copyright 2026 The Cortex Relay Authors
// SPDX-License-Identifier: Apache-2.0

pub mod config;
pub mod delivery;
pub mod images;
pub mod prompt;
pub mod provider;
pub mod routes;
pub mod sections;
pub mod store;
