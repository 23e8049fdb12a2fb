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

//! Admission control for bid submissions
//!
//! Two checks run before a bid reaches the coordinator:
//! - Rate limiting per user
//! - Idempotent retries keyed by `X-Request-Id`, scoped to user and listing
//!
//! # Idempotency Model
//!
//! A client that lost the response to a bid may resend it with the same
//! request ID. If the first attempt produced a definitive outcome (accepted,
//! or rejected by the room), the cached outcome is returned instead of
//! submitting again. Transport outcomes (`Overloaded`, `TimedOut`) are not
//! cached, so a retry after one of those is a real resubmission.
//!
//! The cache is per gateway instance and best-effort. Two concurrent
//! requests with the same ID can both reach the room; the second then sees
//! its own bid as the current high and is rejected as a duplicate or too low.

use std::{num::NonZeroU32, sync::Arc, time::Duration};

use gavel_sdk::types::{Bid, ListingId, RejectReason, UserId};
use governor::{
	Quota, RateLimiter,
	clock::DefaultClock,
	state::{InMemoryState, NotKeyed},
};
use moka::sync::Cache;
use thiserror::Error;
use tracing::debug;

use crate::config::{DEFAULT_IDEMPOTENCY_MAX_CAPACITY, GatewayRuntimeConfig};

/// Idle users' limiters are dropped after this long
const LIMITER_IDLE_SECS: u64 = 600;

/// Upper bound on tracked users
const LIMITER_MAX_CAPACITY: u64 = 1_000_000;

/// Error types for admission control
#[derive(Debug, Error)]
pub enum AdmissionError {
	#[error("Rate limit exceeded")]
	RateLimitExceeded,
	#[error("Invalid request ID: {0}")]
	InvalidRequestId(String),
}

/// Outcome of a bid, as remembered for retries
pub type BidOutcome = Result<Bid, RejectReason>;

type UserRateLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

/// Longest accepted `X-Request-Id`
const MAX_REQUEST_ID_LEN: usize = 128;

/// Admission controller
pub struct AdmissionController {
	/// One direct limiter per user, evicted when idle
	rate_limiters: Cache<UserId, UserRateLimiter>,
	quota: Quota,
	/// Bid outcomes keyed by (user, listing, request ID)
	outcomes: Cache<(UserId, ListingId, String), BidOutcome>,
}

impl AdmissionController {
	/// Create a new admission controller
	///
	/// Zero rates are raised to one.
	pub fn new(requests_per_second: u32, burst: u32, idempotency_ttl: Duration) -> Self {
		let quota = Quota::per_second(NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN))
			.allow_burst(NonZeroU32::new(burst).unwrap_or(NonZeroU32::MIN));

		Self {
			rate_limiters: Cache::builder()
				.max_capacity(LIMITER_MAX_CAPACITY)
				.time_to_idle(Duration::from_secs(LIMITER_IDLE_SECS))
				.build(),
			quota,
			outcomes: Cache::builder()
				.max_capacity(DEFAULT_IDEMPOTENCY_MAX_CAPACITY)
				.time_to_live(idempotency_ttl)
				.build(),
		}
	}

	pub fn from_config(config: &GatewayRuntimeConfig) -> Self {
		Self::new(
			config.rate_limit_rps,
			config.rate_limit_burst,
			Duration::from_secs(config.idempotency_ttl_secs),
		)
	}

	/// Check the submission rate of a user
	pub fn check_rate_limit(&self, user_id: &str) -> Result<(), AdmissionError> {
		let limiter = self
			.rate_limiters
			.get_with(user_id.to_string(), || Arc::new(RateLimiter::direct(self.quota)));

		limiter.check().map_err(|_| {
			debug!(target: "server", user_id = %user_id, "Rate limit exceeded");
			AdmissionError::RateLimitExceeded
		})
	}

	/// Validate an optional request ID header value
	pub fn validate_request_id(request_id: &str) -> Result<(), AdmissionError> {
		if request_id.is_empty() || request_id.len() > MAX_REQUEST_ID_LEN {
			return Err(AdmissionError::InvalidRequestId(format!(
				"must be 1 to {} characters",
				MAX_REQUEST_ID_LEN
			)));
		}
		Ok(())
	}

	/// Previously recorded outcome of a request, if any
	pub fn cached_outcome(
		&self,
		user_id: &str,
		listing_id: &str,
		request_id: &str,
	) -> Option<BidOutcome> {
		self.outcomes.get(&outcome_key(user_id, listing_id, request_id))
	}

	/// Remember a definitive outcome; transport failures are skipped
	pub fn record_outcome(
		&self,
		user_id: &str,
		listing_id: &str,
		request_id: &str,
		outcome: &BidOutcome,
	) {
		if let Err(reason) = outcome
			&& reason.is_retryable()
		{
			return;
		}
		self.outcomes
			.insert(outcome_key(user_id, listing_id, request_id), outcome.clone());
	}
}

fn outcome_key(user_id: &str, listing_id: &str, request_id: &str) -> (UserId, ListingId, String) {
	(
		user_id.to_string(),
		listing_id.to_string(),
		request_id.to_string(),
	)
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::Utc;

	fn create_test_bid() -> Bid {
		Bid {
			id: "bid_1".to_string(),
			listing_id: "listing_1".to_string(),
			bidder_id: "alice".to_string(),
			amount: 50,
			sequence: 1,
			timestamp: Utc::now(),
		}
	}

	#[test]
	fn test_rate_limit_per_user() {
		let admission = AdmissionController::new(1, 2, Duration::from_secs(60));

		assert!(admission.check_rate_limit("alice").is_ok());
		assert!(admission.check_rate_limit("alice").is_ok());
		assert!(matches!(
			admission.check_rate_limit("alice"),
			Err(AdmissionError::RateLimitExceeded)
		));

		// Other users are limited independently
		assert!(admission.check_rate_limit("bob").is_ok());
	}

	#[test]
	fn test_outcome_cached_per_user() {
		let admission = AdmissionController::new(10, 10, Duration::from_secs(60));
		let outcome: BidOutcome = Ok(create_test_bid());

		admission.record_outcome("alice", "listing_1", "req-1", &outcome);

		assert_eq!(
			admission.cached_outcome("alice", "listing_1", "req-1"),
			Some(outcome)
		);
		assert_eq!(admission.cached_outcome("bob", "listing_1", "req-1"), None);
		assert_eq!(admission.cached_outcome("alice", "listing_1", "req-2"), None);
		// The same request ID on another listing is a different request
		assert_eq!(admission.cached_outcome("alice", "listing_2", "req-1"), None);
	}

	#[test]
	fn test_rejections_cached_but_transport_failures_not() {
		let admission = AdmissionController::new(10, 10, Duration::from_secs(60));
		let too_low: BidOutcome = Err(RejectReason::BidTooLow { current_high: 80 });

		admission.record_outcome("alice", "listing_1", "req-1", &too_low);
		admission.record_outcome("alice", "listing_1", "req-2", &Err(RejectReason::TimedOut));
		admission.record_outcome("alice", "listing_1", "req-3", &Err(RejectReason::Overloaded));

		assert_eq!(
			admission.cached_outcome("alice", "listing_1", "req-1"),
			Some(too_low)
		);
		assert_eq!(admission.cached_outcome("alice", "listing_1", "req-2"), None);
		assert_eq!(admission.cached_outcome("alice", "listing_1", "req-3"), None);
	}

	#[test]
	fn test_request_id_validation() {
		assert!(AdmissionController::validate_request_id("req-1").is_ok());
		assert!(AdmissionController::validate_request_id("").is_err());
		assert!(AdmissionController::validate_request_id(&"r".repeat(129)).is_err());
	}
}
