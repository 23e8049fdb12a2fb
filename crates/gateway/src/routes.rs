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

use actix_web::web;

use crate::handlers;

/// Configure API routes for the gateway
///
/// - `/api/v1/listings` - Listing registration
/// - `/api/v1/auctions/{id}/...` - Auction room endpoints
/// - `/api/v1/credits` - Caller's balance
/// - `/health` - Health check endpoint
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
	cfg.service(
		web::scope("/api/v1")
			.route("/listings", web::post().to(handlers::register_listing))
			.route("/credits", web::get().to(handlers::credits))
			.service(
				web::scope("/auctions/{listing_id}")
					.route("", web::get().to(handlers::snapshot))
					.route("/join", web::post().to(handlers::join))
					.route("/leave", web::post().to(handlers::leave))
					.route("/bids", web::post().to(handlers::submit_bid))
					.route("/end", web::post().to(handlers::end))
					.route("/typing", web::post().to(handlers::typing))
					.route("/stop-typing", web::post().to(handlers::stop_typing))
					.route("/events", web::get().to(handlers::events)),
			),
	)
	.route("/health", web::get().to(handlers::health));
}
