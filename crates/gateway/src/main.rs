// Copyright 2025 itscheems
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Auction Gateway Service
//!
//! This service exposes the bidding coordinator over HTTP: listing
//! registration, room membership, bid submission, seller-initiated close,
//! typing indicators, and a server-sent event stream per room.
//!
//! # Identity Model
//!
//! The gateway does not verify sessions. An upstream proxy authenticates the
//! user and forwards the verified ID in `X-User-Id`; the gateway trusts that
//! header and never reads identity from request bodies.

mod admission;
mod auth;
mod config;
mod handlers;
mod logging;
mod middleware;
mod routes;
mod server;

use anyhow::{Context, Result};
use tracing::info;

use crate::{config::GatewayRuntimeConfig, logging::init_logging, server::GatewayServer};

#[actix_rt::main]
async fn main() -> Result<()> {
	// Initialize logging first
	init_logging()?;

	let config = GatewayRuntimeConfig::from_env().context("Failed to load gateway configuration")?;
	info!(
		target: "server",
		bind_addr = %config.bind_addr,
		room_queue_capacity = config.coordinator.room_queue_capacity,
		bid_timeout_ms = config.coordinator.bid_timeout_ms,
		grace_period_secs = config.coordinator.grace_period_secs,
		"Starting Gavel Gateway"
	);

	GatewayServer::new(config)
		.serve()
		.await
		.context("Failed to run gateway server")?;

	Ok(())
}
