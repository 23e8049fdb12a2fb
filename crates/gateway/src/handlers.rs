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

use std::convert::Infallible;

use actix_web::{
	HttpRequest, HttpResponse, Responder,
	http::StatusCode,
	web::{self, Bytes},
};
use chrono::Utc;
use gavel_coordinator::{CoordinatorError, ListingDirectory, parse_amount};
use gavel_sdk::{
	client::HEADER_REQUEST_ID,
	types::{
		AuctionStatus, Bid, Listing, RegisterListingRequest, RejectReason, SubmitBidRequest,
	},
};
use thiserror::Error;
use tokio_stream::{
	StreamExt,
	wrappers::{BroadcastStream, errors::BroadcastStreamRecvError},
};
use tracing::{debug, info, warn};

use crate::{
	admission::{AdmissionController, AdmissionError},
	auth::{self, AuthError},
	server::GatewayState,
};

/// Error types for gateway operations
#[derive(Debug, Error)]
pub enum GatewayError {
	#[error("Authentication error: {0}")]
	Auth(#[from] AuthError),
	#[error("Admission error: {0}")]
	Admission(#[from] AdmissionError),
	#[error("{0}")]
	Rejected(RejectReason),
	#[error("{0}")]
	Coordinator(#[from] CoordinatorError),
	#[error("Invalid request: {0}")]
	InvalidRequest(String),
	#[error("Conflict: {0}")]
	Conflict(String),
}

impl GatewayError {
	/// Stable machine-readable code for the response body
	fn code(&self) -> &'static str {
		match self {
			GatewayError::Auth(_) => "UNAUTHORIZED",
			GatewayError::Admission(AdmissionError::RateLimitExceeded) => "RATE_LIMITED",
			GatewayError::Admission(AdmissionError::InvalidRequestId(_)) => "INVALID_REQUEST",
			GatewayError::Rejected(reason) => reason.code(),
			GatewayError::Coordinator(e) => match e {
				CoordinatorError::AuctionNotFound(_) => "AUCTION_NOT_FOUND",
				CoordinatorError::NotSeller(_) => "NOT_SELLER",
				CoordinatorError::Overloaded(_) => "OVERLOADED",
				CoordinatorError::TimedOut(_) => "TIMED_OUT",
			},
			GatewayError::InvalidRequest(_) => "INVALID_REQUEST",
			GatewayError::Conflict(_) => "CONFLICT",
		}
	}
}

impl actix_web::ResponseError for GatewayError {
	fn status_code(&self) -> StatusCode {
		match self {
			GatewayError::Auth(_) => StatusCode::UNAUTHORIZED,
			GatewayError::Admission(AdmissionError::RateLimitExceeded) => {
				StatusCode::TOO_MANY_REQUESTS
			}
			GatewayError::Admission(AdmissionError::InvalidRequestId(_)) => StatusCode::BAD_REQUEST,
			GatewayError::Rejected(reason) => match reason {
				RejectReason::AuctionNotFound => StatusCode::NOT_FOUND,
				RejectReason::InvalidAmount => StatusCode::BAD_REQUEST,
				RejectReason::SellerCannotBid => StatusCode::FORBIDDEN,
				RejectReason::AuctionEnded
				| RejectReason::BidTooLow { .. }
				| RejectReason::InsufficientCredits { .. }
				| RejectReason::DuplicateBid => StatusCode::CONFLICT,
				RejectReason::Overloaded => StatusCode::SERVICE_UNAVAILABLE,
				RejectReason::TimedOut => StatusCode::GATEWAY_TIMEOUT,
			},
			GatewayError::Coordinator(e) => match e {
				CoordinatorError::AuctionNotFound(_) => StatusCode::NOT_FOUND,
				CoordinatorError::NotSeller(_) => StatusCode::FORBIDDEN,
				CoordinatorError::Overloaded(_) => StatusCode::SERVICE_UNAVAILABLE,
				CoordinatorError::TimedOut(_) => StatusCode::GATEWAY_TIMEOUT,
			},
			GatewayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
			GatewayError::Conflict(_) => StatusCode::CONFLICT,
		}
	}

	fn error_response(&self) -> HttpResponse {
		let mut body = serde_json::json!({
			"error": self.to_string(),
			"code": self.code(),
		});
		// Bid rejections also carry the structured reason (e.g. current_high)
		if let GatewayError::Rejected(reason) = self
			&& let Ok(reason) = serde_json::to_value(reason)
		{
			body["reason"] = reason;
		}

		HttpResponse::build(self.status_code()).json(body)
	}
}

/// JSON extractor settings; malformed bodies get the same error envelope as other failures
pub fn json_config(max_body_bytes: usize) -> web::JsonConfig {
	web::JsonConfig::default()
		.limit(max_body_bytes)
		.error_handler(|err, _req| GatewayError::InvalidRequest(err.to_string()).into())
}

/// Health check endpoint
pub async fn health() -> impl Responder {
	HttpResponse::Ok().json(serde_json::json!({
		"status": "ok",
		"service": "gavel-gateway"
	}))
}

fn caller(state: &GatewayState, req: &HttpRequest) -> Result<String, GatewayError> {
	Ok(auth::authenticate(req.headers(), state.identity.as_ref())?)
}

/// Register a listing in the in-process listing store
///
/// The caller becomes the seller; the body cannot name one.
pub async fn register_listing(
	state: web::Data<GatewayState>,
	request: web::Json<RegisterListingRequest>,
	req: HttpRequest,
) -> Result<HttpResponse, GatewayError> {
	let seller_id = caller(&state, &req)?;
	let request = request.into_inner();

	if request.title.trim().is_empty() {
		return Err(GatewayError::InvalidRequest("title must not be empty".to_string()));
	}
	if request.ends_at <= Utc::now() {
		return Err(GatewayError::InvalidRequest(
			"ends_at must be in the future".to_string(),
		));
	}

	let id = request
		.id
		.filter(|id| !id.trim().is_empty())
		.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
	if state.listings.listing(&id).is_some() {
		return Err(GatewayError::Conflict(format!("listing {} already exists", id)));
	}

	let listing = Listing {
		id,
		seller_id,
		title: request.title,
		ends_at: request.ends_at,
		status: AuctionStatus::Open,
	};
	state.listings.register(listing.clone());

	Ok(HttpResponse::Created().json(listing))
}

pub async fn join(
	state: web::Data<GatewayState>,
	path: web::Path<String>,
	req: HttpRequest,
) -> Result<HttpResponse, GatewayError> {
	let user_id = caller(&state, &req)?;
	let snapshot = state.coordinator.join(&path, &user_id).await?;
	Ok(HttpResponse::Ok().json(snapshot))
}

pub async fn leave(
	state: web::Data<GatewayState>,
	path: web::Path<String>,
	req: HttpRequest,
) -> Result<HttpResponse, GatewayError> {
	let user_id = caller(&state, &req)?;
	state.coordinator.leave(&path, &user_id)?;
	Ok(HttpResponse::Ok().json(serde_json::json!({ "status": "left" })))
}

pub async fn snapshot(
	state: web::Data<GatewayState>,
	path: web::Path<String>,
	req: HttpRequest,
) -> Result<HttpResponse, GatewayError> {
	caller(&state, &req)?;
	let snapshot = state.coordinator.snapshot(&path).await?;
	Ok(HttpResponse::Ok().json(snapshot))
}

/// Handle bid submission
///
/// Rejections are returned to the submitter only. Accepted bids reach every
/// room member through the event stream.
///
/// With an `X-Request-Id` header, a retried request returns the outcome of
/// the first attempt instead of bidding again.
pub async fn submit_bid(
	state: web::Data<GatewayState>,
	path: web::Path<String>,
	request: web::Json<SubmitBidRequest>,
	req: HttpRequest,
) -> Result<HttpResponse, GatewayError> {
	let bidder_id = caller(&state, &req)?;
	let listing_id = path.into_inner();

	let request_id = match req.headers().get(HEADER_REQUEST_ID) {
		Some(value) => {
			let value = value
				.to_str()
				.map_err(|_| AdmissionError::InvalidRequestId("not valid ASCII".to_string()))?;
			AdmissionController::validate_request_id(value)?;
			Some(value.to_string())
		}
		None => None,
	};

	if let Some(request_id) = &request_id
		&& let Some(outcome) = state
			.admission
			.cached_outcome(&bidder_id, &listing_id, request_id)
	{
		debug!(
			target: "server",
			listing_id = %listing_id,
			bidder = %bidder_id,
			request_id = %request_id,
			"Replaying cached bid outcome"
		);
		return outcome_response(outcome);
	}

	state.admission.check_rate_limit(&bidder_id)?;

	let outcome = match parse_amount(&request.amount) {
		// Amounts beyond i64 cannot be covered by any balance
		Ok(amount) => match i64::try_from(amount) {
			Ok(amount) => {
				state
					.coordinator
					.submit_bid(&listing_id, &bidder_id, amount)
					.await
			}
			Err(_) => Err(RejectReason::InvalidAmount),
		},
		Err(reason) => Err(reason),
	};

	if let Some(request_id) = &request_id {
		state
			.admission
			.record_outcome(&bidder_id, &listing_id, request_id, &outcome);
	}

	outcome_response(outcome)
}

fn outcome_response(
	outcome: Result<Bid, RejectReason>,
) -> Result<HttpResponse, GatewayError> {
	match outcome {
		Ok(bid) => Ok(HttpResponse::Ok().json(bid)),
		Err(reason) => Err(GatewayError::Rejected(reason)),
	}
}

/// Seller-initiated end of an auction
pub async fn end(
	state: web::Data<GatewayState>,
	path: web::Path<String>,
	req: HttpRequest,
) -> Result<HttpResponse, GatewayError> {
	let user_id = caller(&state, &req)?;
	let record = state.coordinator.request_end(&path, &user_id).await?;
	Ok(HttpResponse::Ok().json(record))
}

pub async fn typing(
	state: web::Data<GatewayState>,
	path: web::Path<String>,
	req: HttpRequest,
) -> Result<HttpResponse, GatewayError> {
	let user_id = caller(&state, &req)?;
	let delivered = state.coordinator.typing(&path, &user_id);
	Ok(HttpResponse::Ok().json(serde_json::json!({ "delivered": delivered })))
}

pub async fn stop_typing(
	state: web::Data<GatewayState>,
	path: web::Path<String>,
	req: HttpRequest,
) -> Result<HttpResponse, GatewayError> {
	let user_id = caller(&state, &req)?;
	let delivered = state.coordinator.stop_typing(&path, &user_id);
	Ok(HttpResponse::Ok().json(serde_json::json!({ "delivered": delivered })))
}

/// Server-sent event stream of a room
///
/// Presence events the caller caused are not echoed back. A subscriber that
/// falls behind receives a `lagged` event with the number of missed events
/// and should refetch the snapshot.
pub async fn events(
	state: web::Data<GatewayState>,
	path: web::Path<String>,
	req: HttpRequest,
) -> Result<HttpResponse, GatewayError> {
	let user_id = caller(&state, &req)?;
	let listing_id = path.into_inner();
	let receiver = state.coordinator.subscribe(&listing_id)?;

	info!(
		target: "server",
		listing_id = %listing_id,
		user_id = %user_id,
		"Event stream opened"
	);

	let stream = BroadcastStream::new(receiver).filter_map(move |result| match result {
		Ok(event) => {
			if event.presence_origin() == Some(user_id.as_str()) {
				return None;
			}
			match serde_json::to_string(&event) {
				Ok(data) => Some(Ok::<_, Infallible>(sse_frame(event.name(), &data))),
				Err(e) => {
					warn!(target: "server", error = %e, "Failed to encode room event");
					None
				}
			}
		}
		Err(BroadcastStreamRecvError::Lagged(missed)) => Some(Ok(sse_frame(
			"lagged",
			&serde_json::json!({ "missed": missed }).to_string(),
		))),
	});

	Ok(HttpResponse::Ok()
		.content_type("text/event-stream")
		.insert_header(("Cache-Control", "no-cache"))
		.streaming(stream))
}

fn sse_frame(event: &str, data: &str) -> Bytes {
	Bytes::from(format!("event: {}\ndata: {}\n\n", event, data))
}

/// Get the caller's balance, opening an account on first use
pub async fn credits(
	state: web::Data<GatewayState>,
	req: HttpRequest,
) -> Result<HttpResponse, GatewayError> {
	let user_id = caller(&state, &req)?;
	Ok(HttpResponse::Ok().json(state.coordinator.balance(&user_id)))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{config::GatewayRuntimeConfig, routes::configure_routes, server::GatewayState};
	use actix_web::{App, test};
	use chrono::Duration;
	use gavel_sdk::types::{Balance, RoomSnapshot, SettlementRecord};

	fn test_state() -> GatewayState {
		let mut config = GatewayRuntimeConfig::default();
		config.coordinator.default_credits = 500;
		config.rate_limit_rps = 1_000;
		config.rate_limit_burst = 1_000;
		GatewayState::new(&config)
	}

	fn listing_request(id: &str) -> RegisterListingRequest {
		RegisterListingRequest {
			id: Some(id.to_string()),
			title: "Vintage lamp".to_string(),
			ends_at: Utc::now() + Duration::hours(1),
		}
	}

	macro_rules! app {
		($state:expr) => {
			test::init_service(
				App::new()
					.app_data(web::Data::new($state))
					.app_data(json_config(4096))
					.configure(configure_routes),
			)
			.await
		};
	}

	#[actix_web::test]
	async fn test_health() {
		let app = app!(test_state());
		let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request())
			.await;
		assert!(resp.status().is_success());
	}

	#[actix_web::test]
	async fn test_missing_identity_is_unauthorized() {
		let app = app!(test_state());
		let resp = test::call_service(
			&app,
			test::TestRequest::get().uri("/api/v1/credits").to_request(),
		)
		.await;
		assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

		let body: serde_json::Value = test::read_body_json(resp).await;
		assert_eq!(body["code"], "UNAUTHORIZED");
	}

	#[actix_web::test]
	async fn test_bid_flow() {
		let app = app!(test_state());

		let resp = test::call_service(
			&app,
			test::TestRequest::post()
				.uri("/api/v1/listings")
				.insert_header(("X-User-Id", "seller"))
				.set_json(listing_request("lamp"))
				.to_request(),
		)
		.await;
		assert_eq!(resp.status(), StatusCode::CREATED);
		let listing: Listing = test::read_body_json(resp).await;
		assert_eq!(listing.seller_id, "seller");

		let snapshot: RoomSnapshot = test::call_and_read_body_json(
			&app,
			test::TestRequest::post()
				.uri("/api/v1/auctions/lamp/join")
				.insert_header(("X-User-Id", "alice"))
				.to_request(),
		)
		.await;
		assert_eq!(snapshot.participants, vec!["alice".to_string()]);

		let bid: Bid = test::call_and_read_body_json(
			&app,
			test::TestRequest::post()
				.uri("/api/v1/auctions/lamp/bids")
				.insert_header(("X-User-Id", "alice"))
				.set_json(serde_json::json!({ "amount": "50" }))
				.to_request(),
		)
		.await;
		assert_eq!(bid.amount, 50);

		// Too low
		let resp = test::call_service(
			&app,
			test::TestRequest::post()
				.uri("/api/v1/auctions/lamp/bids")
				.insert_header(("X-User-Id", "bob"))
				.set_json(serde_json::json!({ "amount": 40 }))
				.to_request(),
		)
		.await;
		assert_eq!(resp.status(), StatusCode::CONFLICT);
		let body: serde_json::Value = test::read_body_json(resp).await;
		assert_eq!(body["code"], "BID_TOO_LOW");
		assert_eq!(body["reason"]["current_high"], 50);

		// Seller cannot bid
		let resp = test::call_service(
			&app,
			test::TestRequest::post()
				.uri("/api/v1/auctions/lamp/bids")
				.insert_header(("X-User-Id", "seller"))
				.set_json(serde_json::json!({ "amount": 100 }))
				.to_request(),
		)
		.await;
		assert_eq!(resp.status(), StatusCode::FORBIDDEN);

		let balance: Balance = test::call_and_read_body_json(
			&app,
			test::TestRequest::get()
				.uri("/api/v1/credits")
				.insert_header(("X-User-Id", "alice"))
				.to_request(),
		)
		.await;
		assert_eq!(balance.held, 50);
		assert_eq!(balance.available, 450);
	}

	#[actix_web::test]
	async fn test_malformed_amounts_rejected() {
		let app = app!(test_state());
		test::call_service(
			&app,
			test::TestRequest::post()
				.uri("/api/v1/listings")
				.insert_header(("X-User-Id", "seller"))
				.set_json(listing_request("lamp"))
				.to_request(),
		)
		.await;

		for amount in [
			serde_json::json!(10.5),
			serde_json::json!("ten"),
			serde_json::json!(-5),
			serde_json::json!(0),
			serde_json::Value::Null,
		] {
			let resp = test::call_service(
				&app,
				test::TestRequest::post()
					.uri("/api/v1/auctions/lamp/bids")
					.insert_header(("X-User-Id", "alice"))
					.set_json(serde_json::json!({ "amount": amount }))
					.to_request(),
			)
			.await;
			assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
			let body: serde_json::Value = test::read_body_json(resp).await;
			assert_eq!(body["code"], "INVALID_AMOUNT");
		}
	}

	#[actix_web::test]
	async fn test_retried_request_id_replays_outcome() {
		let state = test_state();
		let coordinator = state.coordinator.clone();
		let app = app!(state);
		test::call_service(
			&app,
			test::TestRequest::post()
				.uri("/api/v1/listings")
				.insert_header(("X-User-Id", "seller"))
				.set_json(listing_request("lamp"))
				.to_request(),
		)
		.await;

		let mut bids = Vec::new();
		for _ in 0..2 {
			let bid: Bid = test::call_and_read_body_json(
				&app,
				test::TestRequest::post()
					.uri("/api/v1/auctions/lamp/bids")
					.insert_header(("X-User-Id", "alice"))
					.insert_header(("X-Request-Id", "req-1"))
					.set_json(serde_json::json!({ "amount": 70 }))
					.to_request(),
			)
			.await;
			bids.push(bid);
		}

		assert_eq!(bids[0], bids[1]);
		let snapshot = coordinator.snapshot("lamp").await.unwrap();
		assert_eq!(snapshot.bids.len(), 1);
	}

	#[actix_web::test]
	async fn test_request_id_is_scoped_to_listing() {
		let state = test_state();
		let coordinator = state.coordinator.clone();
		let app = app!(state);
		for listing in ["lamp", "vase"] {
			test::call_service(
				&app,
				test::TestRequest::post()
					.uri("/api/v1/listings")
					.insert_header(("X-User-Id", "seller"))
					.set_json(listing_request(listing))
					.to_request(),
			)
			.await;
		}

		let mut bids = Vec::new();
		for listing in ["lamp", "vase"] {
			let bid: Bid = test::call_and_read_body_json(
				&app,
				test::TestRequest::post()
					.uri(&format!("/api/v1/auctions/{}/bids", listing))
					.insert_header(("X-User-Id", "alice"))
					.insert_header(("X-Request-Id", "req-1"))
					.set_json(serde_json::json!({ "amount": 70 }))
					.to_request(),
			)
			.await;
			bids.push(bid);
		}

		assert_eq!(bids[0].listing_id, "lamp");
		assert_eq!(bids[1].listing_id, "vase");
		assert_eq!(coordinator.snapshot("vase").await.unwrap().bids.len(), 1);
	}

	#[actix_web::test]
	async fn test_malformed_body_uses_error_envelope() {
		let app = app!(test_state());
		test::call_service(
			&app,
			test::TestRequest::post()
				.uri("/api/v1/listings")
				.insert_header(("X-User-Id", "seller"))
				.set_json(listing_request("lamp"))
				.to_request(),
		)
		.await;

		let resp = test::call_service(
			&app,
			test::TestRequest::post()
				.uri("/api/v1/auctions/lamp/bids")
				.insert_header(("X-User-Id", "alice"))
				.insert_header(("Content-Type", "application/json"))
				.set_payload("{\"amount\":")
				.to_request(),
		)
		.await;
		assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
		let body: serde_json::Value = test::read_body_json(resp).await;
		assert_eq!(body["code"], "INVALID_REQUEST");
		assert!(body["error"].as_str().is_some());
	}

	#[actix_web::test]
	async fn test_end_is_seller_only() {
		let app = app!(test_state());
		test::call_service(
			&app,
			test::TestRequest::post()
				.uri("/api/v1/listings")
				.insert_header(("X-User-Id", "seller"))
				.set_json(listing_request("lamp"))
				.to_request(),
		)
		.await;
		test::call_service(
			&app,
			test::TestRequest::post()
				.uri("/api/v1/auctions/lamp/bids")
				.insert_header(("X-User-Id", "alice"))
				.set_json(serde_json::json!({ "amount": 120 }))
				.to_request(),
		)
		.await;

		let resp = test::call_service(
			&app,
			test::TestRequest::post()
				.uri("/api/v1/auctions/lamp/end")
				.insert_header(("X-User-Id", "alice"))
				.to_request(),
		)
		.await;
		assert_eq!(resp.status(), StatusCode::FORBIDDEN);

		let record: SettlementRecord = test::call_and_read_body_json(
			&app,
			test::TestRequest::post()
				.uri("/api/v1/auctions/lamp/end")
				.insert_header(("X-User-Id", "seller"))
				.to_request(),
		)
		.await;
		assert_eq!(record.final_amount(), Some(120));

		let resp = test::call_service(
			&app,
			test::TestRequest::post()
				.uri("/api/v1/auctions/lamp/bids")
				.insert_header(("X-User-Id", "bob"))
				.set_json(serde_json::json!({ "amount": 200 }))
				.to_request(),
		)
		.await;
		assert_eq!(resp.status(), StatusCode::CONFLICT);
		let body: serde_json::Value = test::read_body_json(resp).await;
		assert_eq!(body["code"], "AUCTION_ENDED");
	}

	#[actix_web::test]
	async fn test_unknown_listing_not_found() {
		let app = app!(test_state());
		let resp = test::call_service(
			&app,
			test::TestRequest::post()
				.uri("/api/v1/auctions/missing/join")
				.insert_header(("X-User-Id", "alice"))
				.to_request(),
		)
		.await;
		assert_eq!(resp.status(), StatusCode::NOT_FOUND);
	}

	#[actix_web::test]
	async fn test_duplicate_listing_conflicts() {
		let app = app!(test_state());
		for expected in [StatusCode::CREATED, StatusCode::CONFLICT] {
			let resp = test::call_service(
				&app,
				test::TestRequest::post()
					.uri("/api/v1/listings")
					.insert_header(("X-User-Id", "mallory"))
					.set_json(listing_request("lamp"))
					.to_request(),
			)
			.await;
			assert_eq!(resp.status(), expected);
		}
	}

	#[actix_web::test]
	async fn test_sse_frame_format() {
		let frame = sse_frame("typing", "{\"user_id\":\"alice\"}");
		assert_eq!(&frame[..], b"event: typing\ndata: {\"user_id\":\"alice\"}\n\n");
	}
}
