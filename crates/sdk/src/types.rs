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

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Listing identifier, assigned by the listing store
pub type ListingId = String;

/// Verified user identifier, handed over by the session layer
pub type UserId = String;

/// Auction lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuctionStatus {
	Open,
	Ended,
}

/// What caused an auction to end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndTrigger {
	/// Explicit close requested by the seller
	Seller,
	/// The closing deadline elapsed
	Deadline,
}

/// Listing as seen by the coordinator
///
/// Listings are owned by the listing store. The coordinator only reads
/// the seller and deadline, and writes the terminal status once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
	pub id: ListingId,
	pub seller_id: UserId,
	pub title: String,
	pub ends_at: DateTime<Utc>,
	pub status: AuctionStatus,
}

/// An accepted bid
///
/// Bids are immutable once accepted. Rejected bids are never stored,
/// they are only reported back to the submitter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bid {
	/// Server-assigned bid ID
	pub id: String,
	pub listing_id: ListingId,
	pub bidder_id: UserId,
	/// Amount in credits (always positive)
	pub amount: u64,
	/// Position in the room's accepted-bid sequence, starting at 1
	pub sequence: u64,
	pub timestamp: DateTime<Utc>,
}

/// Current leader of an auction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HighBid {
	pub bidder_id: UserId,
	pub amount: u64,
}

/// Winning bid recorded at settlement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WinningBid {
	pub bid_id: String,
	pub bidder_id: UserId,
	pub amount: u64,
}

/// Final, server-computed outcome of an auction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementRecord {
	pub listing_id: ListingId,
	pub seller_id: UserId,
	/// None when the auction closed without bids
	pub winner: Option<WinningBid>,
	/// Bidders whose holds were returned to them
	pub refunded: Vec<UserId>,
	pub trigger: EndTrigger,
	pub settled_at: DateTime<Utc>,
}

impl SettlementRecord {
	/// Final price paid to the seller, if any
	pub fn final_amount(&self) -> Option<u64> {
		self.winner.as_ref().map(|w| w.amount)
	}
}

/// Full room state handed to a (re)joining client
///
/// A client that missed broadcast events can reconcile from this alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSnapshot {
	pub listing_id: ListingId,
	pub seller_id: UserId,
	pub ends_at: DateTime<Utc>,
	pub status: AuctionStatus,
	/// Accepted bids in sequence order
	pub bids: Vec<Bid>,
	pub high_bid: Option<HighBid>,
	pub participants: Vec<UserId>,
	pub settlement: Option<SettlementRecord>,
}

/// Events fanned out to every member of a room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum RoomEvent {
	BidAccepted {
		bid: Bid,
	},
	AuctionEnded {
		settlement: SettlementRecord,
	},
	ParticipantJoined {
		listing_id: ListingId,
		user_id: UserId,
	},
	ParticipantLeft {
		listing_id: ListingId,
		user_id: UserId,
	},
	Typing {
		listing_id: ListingId,
		user_id: UserId,
	},
	StopTyping {
		listing_id: ListingId,
		user_id: UserId,
	},
}

impl RoomEvent {
	/// Get the listing this event belongs to
	pub fn listing_id(&self) -> &str {
		match self {
			RoomEvent::BidAccepted { bid } => &bid.listing_id,
			RoomEvent::AuctionEnded { settlement } => &settlement.listing_id,
			RoomEvent::ParticipantJoined { listing_id, .. } => listing_id,
			RoomEvent::ParticipantLeft { listing_id, .. } => listing_id,
			RoomEvent::Typing { listing_id, .. } => listing_id,
			RoomEvent::StopTyping { listing_id, .. } => listing_id,
		}
	}

	/// User that caused an ephemeral presence event
	///
	/// Presence events are meant for the other members of a room, so
	/// subscribers skip the ones they originated themselves.
	pub fn presence_origin(&self) -> Option<&str> {
		match self {
			RoomEvent::Typing { user_id, .. }
			| RoomEvent::StopTyping { user_id, .. }
			| RoomEvent::ParticipantJoined { user_id, .. }
			| RoomEvent::ParticipantLeft { user_id, .. } => Some(user_id),
			RoomEvent::BidAccepted { .. } | RoomEvent::AuctionEnded { .. } => None,
		}
	}

	/// Wire name of the event
	pub fn name(&self) -> &'static str {
		match self {
			RoomEvent::BidAccepted { .. } => "bidAccepted",
			RoomEvent::AuctionEnded { .. } => "auctionEnded",
			RoomEvent::ParticipantJoined { .. } => "participantJoined",
			RoomEvent::ParticipantLeft { .. } => "participantLeft",
			RoomEvent::Typing { .. } => "typing",
			RoomEvent::StopTyping { .. } => "stopTyping",
		}
	}
}

/// Reason a bid was rejected
///
/// Rejections are returned only to the submitter and never broadcast.
/// `Overloaded` and `TimedOut` describe the transport, not the room: the
/// room state is unchanged and the caller may retry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectReason {
	#[error("Auction not found")]
	AuctionNotFound,
	#[error("Auction has already ended")]
	AuctionEnded,
	#[error("Bid amount must be a positive whole number")]
	InvalidAmount,
	#[error("Bid must be higher than {current_high}")]
	BidTooLow { current_high: u64 },
	#[error("Sellers cannot bid on their own listing")]
	SellerCannotBid,
	#[error("Not enough credits: requested {requested}, available {available}")]
	InsufficientCredits { requested: u64, available: u64 },
	#[error("You already hold the current high bid of this amount")]
	DuplicateBid,
	#[error("Auction is busy, try again")]
	Overloaded,
	#[error("Bid confirmation timed out")]
	TimedOut,
}

impl RejectReason {
	/// Stable machine-readable code
	pub fn code(&self) -> &'static str {
		match self {
			RejectReason::AuctionNotFound => "AUCTION_NOT_FOUND",
			RejectReason::AuctionEnded => "AUCTION_ENDED",
			RejectReason::InvalidAmount => "INVALID_AMOUNT",
			RejectReason::BidTooLow { .. } => "BID_TOO_LOW",
			RejectReason::SellerCannotBid => "SELLER_CANNOT_BID",
			RejectReason::InsufficientCredits { .. } => "INSUFFICIENT_CREDITS",
			RejectReason::DuplicateBid => "DUPLICATE_BID",
			RejectReason::Overloaded => "OVERLOADED",
			RejectReason::TimedOut => "TIMED_OUT",
		}
	}

	/// Whether the same request may succeed if retried unchanged
	pub fn is_retryable(&self) -> bool {
		matches!(self, RejectReason::Overloaded | RejectReason::TimedOut)
	}
}

/// Credit balance of a user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Balance {
	/// Credits owned
	pub total: u64,
	/// Credits reserved by outstanding holds
	pub held: u64,
	/// Credits free for new holds
	pub available: u64,
}

/// Request to submit a bid
///
/// The amount is kept as raw JSON so the server can tell a malformed
/// amount apart from a malformed body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitBidRequest {
	#[serde(default)]
	pub amount: serde_json::Value,
}

impl SubmitBidRequest {
	pub fn new(amount: u64) -> Self {
		Self {
			amount: serde_json::Value::from(amount),
		}
	}
}

/// Error body returned for a rejected bid
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BidRejectedResponse {
	pub error: String,
	pub reason: RejectReason,
}

/// Request to register a listing with the in-process listing store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterListingRequest {
	/// Optional listing ID, generated by the server when absent
	pub id: Option<ListingId>,
	pub title: String,
	pub ends_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_reject_reason_wire_format() {
		let reason = RejectReason::BidTooLow { current_high: 80 };
		let json = serde_json::to_value(&reason).unwrap();
		assert_eq!(json["code"], "BID_TOO_LOW");
		assert_eq!(json["current_high"], 80);
		assert_eq!(reason.to_string(), "Bid must be higher than 80");
		assert_eq!(reason.code(), "BID_TOO_LOW");
	}

	#[test]
	fn test_only_transport_rejections_are_retryable() {
		assert!(RejectReason::Overloaded.is_retryable());
		assert!(RejectReason::TimedOut.is_retryable());
		assert!(!RejectReason::DuplicateBid.is_retryable());
		assert!(!RejectReason::BidTooLow { current_high: 1 }.is_retryable());
	}

	#[test]
	fn test_room_event_tagging() {
		let event = RoomEvent::Typing {
			listing_id: "listing_1".to_string(),
			user_id: "alice".to_string(),
		};
		let json = serde_json::to_value(&event).unwrap();
		assert_eq!(json["event"], "typing");
		assert_eq!(event.name(), "typing");
		assert_eq!(event.presence_origin(), Some("alice"));
		assert_eq!(event.listing_id(), "listing_1");
	}

	#[test]
	fn test_submit_bid_request_keeps_raw_amount() {
		let request: SubmitBidRequest = serde_json::from_str(r#"{"amount":"80"}"#).unwrap();
		assert_eq!(request.amount, serde_json::Value::from("80"));

		let missing: SubmitBidRequest = serde_json::from_str("{}").unwrap();
		assert!(missing.amount.is_null());
	}
}
