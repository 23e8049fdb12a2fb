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

//! Bid Arbitrator
//!
//! Entry point for bid submissions. Validates the amount, finds (or
//! creates) the listing's room and hands the bid to the room's queue. The
//! room decides acceptance; the arbitrator only translates transport
//! failures into rejection reasons.

use std::sync::Arc;

use gavel_sdk::types::{Bid, RejectReason};
use serde_json::Value;
use tracing::warn;

use crate::{registry::AuctionRegistry, room::RoomError};

/// Parse a bid amount from a request body
///
/// Accepts a JSON integer or a string holding one. Fractions, negative or
/// zero amounts, and anything else are `InvalidAmount`.
pub fn parse_amount(raw: &Value) -> Result<u64, RejectReason> {
	let amount = match raw {
		Value::Number(n) => n.as_u64(),
		Value::String(s) => s.trim().parse::<u64>().ok(),
		_ => None,
	};
	amount
		.filter(|amount| *amount > 0)
		.ok_or(RejectReason::InvalidAmount)
}

/// Amounts must be positive integers
pub fn validate_amount(amount: i64) -> Result<u64, RejectReason> {
	u64::try_from(amount)
		.ok()
		.filter(|amount| *amount > 0)
		.ok_or(RejectReason::InvalidAmount)
}

pub struct BidArbitrator {
	registry: Arc<AuctionRegistry>,
}

impl BidArbitrator {
	pub fn new(registry: Arc<AuctionRegistry>) -> Self {
		Self { registry }
	}

	/// Submit a bid and wait for the room's verdict
	pub async fn submit(
		&self,
		listing_id: &str,
		bidder_id: &str,
		amount: i64,
	) -> Result<Bid, RejectReason> {
		let amount = validate_amount(amount)?;

		// A room may stop between lookup and send; retry once on a fresh one
		let mut last = RoomError::Closed;
		for _ in 0..2 {
			let room = self
				.registry
				.join_or_create(listing_id)
				.map_err(|_| RejectReason::AuctionNotFound)?;

			match room.submit_bid(bidder_id, amount).await {
				Ok(verdict) => return verdict,
				Err(RoomError::Closed) => last = RoomError::Closed,
				Err(e) => {
					last = e;
					break;
				}
			}
		}

		warn!(
			target: "room",
			listing_id = %listing_id,
			bidder = %bidder_id,
			error = %last,
			"Bid not delivered"
		);
		Err(match last {
			RoomError::Full => RejectReason::Overloaded,
			RoomError::TimedOut => RejectReason::TimedOut,
			RoomError::Closed => RejectReason::AuctionNotFound,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn test_parse_amount_accepts_integers() {
		assert_eq!(parse_amount(&json!(50)), Ok(50));
		assert_eq!(parse_amount(&json!("75")), Ok(75));
		assert_eq!(parse_amount(&json!(" 12 ")), Ok(12));
	}

	#[test]
	fn test_parse_amount_rejects_garbage() {
		for raw in [
			json!(0),
			json!(-5),
			json!(12.5),
			json!("12.5"),
			json!("abc"),
			json!(null),
			json!(true),
			json!([1]),
		] {
			assert_eq!(parse_amount(&raw), Err(RejectReason::InvalidAmount), "{}", raw);
		}
	}

	#[test]
	fn test_validate_amount() {
		assert_eq!(validate_amount(1), Ok(1));
		assert_eq!(validate_amount(0), Err(RejectReason::InvalidAmount));
		assert_eq!(validate_amount(-1), Err(RejectReason::InvalidAmount));
	}
}
