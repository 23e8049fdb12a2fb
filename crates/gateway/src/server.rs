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

use std::sync::Arc;

use actix_web::{App, HttpServer, web};
use anyhow::{Context, Result};
use gavel_coordinator::{AuctionCoordinator, MemoryAuctionJournal, MemoryListingDirectory};
use tracing::info;

use crate::{
	admission::AdmissionController,
	auth::{HeaderIdentityProvider, IdentityProvider},
	config::GatewayRuntimeConfig,
	handlers::json_config,
	middleware::{CorsMiddleware, LoggingMiddleware},
	routes::configure_routes,
};

/// Gateway server state, shared by every worker
#[derive(Clone)]
pub struct GatewayState {
	pub coordinator: Arc<AuctionCoordinator>,
	/// In-process listing store; registration writes here directly
	pub listings: Arc<MemoryListingDirectory>,
	pub identity: Arc<dyn IdentityProvider>,
	pub admission: Arc<AdmissionController>,
}

impl GatewayState {
	/// Build the coordinator and its in-memory collaborators
	///
	/// Must be called inside a Tokio runtime; rooms are spawned on it.
	pub fn new(config: &GatewayRuntimeConfig) -> Self {
		let listings = Arc::new(MemoryListingDirectory::new());
		let journal = Arc::new(MemoryAuctionJournal::new());
		let coordinator = Arc::new(AuctionCoordinator::new(
			config.coordinator.clone(),
			listings.clone(),
			journal,
		));

		Self {
			coordinator,
			listings,
			identity: Arc::new(HeaderIdentityProvider),
			admission: Arc::new(AdmissionController::from_config(config)),
		}
	}
}

/// Gateway server
pub struct GatewayServer {
	config: GatewayRuntimeConfig,
	state: GatewayState,
}

impl GatewayServer {
	pub fn new(config: GatewayRuntimeConfig) -> Self {
		let state = GatewayState::new(&config);
		Self { config, state }
	}

	/// Start the HTTP server and run until shutdown
	pub async fn serve(self) -> Result<()> {
		let state = web::Data::new(self.state);
		let max_body_bytes = self.config.max_body_bytes;
		let allowed_origin = self.config.allowed_origin.clone();

		info!(
			target: "server",
			bind_addr = %self.config.bind_addr,
			workers = self.config.workers,
			"Gateway listening"
		);

		HttpServer::new(move || {
			App::new()
				.app_data(state.clone())
				.app_data(json_config(max_body_bytes))
				.wrap(CorsMiddleware::new(&allowed_origin))
				.wrap(LoggingMiddleware)
				.configure(configure_routes)
		})
		.workers(self.config.workers)
		.bind(self.config.bind_addr)
		.with_context(|| format!("Failed to bind {}", self.config.bind_addr))?
		.run()
		.await
		.context("Gateway server terminated with an error")
	}
}
