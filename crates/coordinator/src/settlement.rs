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

//! Settlement Engine
//!
//! Converts a closed auction into exactly one outcome: the winner's hold
//! is paid to the seller, every other hold on the listing is released,
//! the listing is marked ended and the record is journalled.
//!
//! Settlement always runs inside the room actor. Deadline expiry and a
//! seller's end request are both delivered to the same actor, so they are
//! serialized, and the room's settlement record acts as the one-shot latch:
//! whichever trigger arrives first settles, later ones receive the record.

use std::sync::Arc;

use chrono::Utc;
use gavel_sdk::types::{AuctionStatus, EndTrigger, SettlementRecord, UserId, WinningBid};
use tracing::{debug, error, info, warn};

use crate::{
	journal::{AuctionJournal, JournalError},
	ledger::Ledger,
	listing::ListingDirectory,
	room::RoomState,
};

/// Result of a settle request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettleOutcome {
	/// This request ended the auction and paid the seller
	Settled(SettlementRecord),
	/// Nothing was paid by this request
	///
	/// Either the auction had already been settled, or it closed without
	/// bids. Carries the authoritative record in both cases.
	NoOp(SettlementRecord),
}

impl SettleOutcome {
	pub fn record(&self) -> &SettlementRecord {
		match self {
			SettleOutcome::Settled(record) | SettleOutcome::NoOp(record) => record,
		}
	}

	pub fn into_record(self) -> SettlementRecord {
		match self {
			SettleOutcome::Settled(record) | SettleOutcome::NoOp(record) => record,
		}
	}

	pub fn is_settled(&self) -> bool {
		matches!(self, SettleOutcome::Settled(_))
	}
}

/// Settlement Engine
pub struct SettlementEngine {
	ledger: Arc<Ledger>,
	listings: Arc<dyn ListingDirectory>,
	journal: Arc<dyn AuctionJournal>,
}

impl SettlementEngine {
	pub fn new(
		ledger: Arc<Ledger>,
		listings: Arc<dyn ListingDirectory>,
		journal: Arc<dyn AuctionJournal>,
	) -> Self {
		Self {
			ledger,
			listings,
			journal,
		}
	}

	/// Settle a room
	///
	/// The winner is recomputed from the bid history rather than trusted
	/// from cached state. A room that already holds a settlement record is
	/// left untouched.
	pub fn settle(&self, room: &mut RoomState, trigger: EndTrigger) -> SettleOutcome {
		if let Some(record) = room.settlement() {
			debug!(
				target: "settlement",
				listing_id = %room.listing_id(),
				?trigger,
				"Auction already settled"
			);
			return SettleOutcome::NoOp(record.clone());
		}

		let listing_id = room.listing_id().to_string();
		let seller_id = room.seller_id().to_string();

		let winner = room.bids().iter().max_by_key(|bid| bid.amount).cloned();
		if let Some(bid) = &winner {
			match room.holds.remove(&bid.id) {
				Some(hold) => {
					if let Err(e) = self.ledger.finalize_to_seller(hold, &seller_id) {
						error!(
							target: "settlement",
							listing_id = %listing_id,
							winner = %bid.bidder_id,
							error = %e,
							"Failed to pay winning hold to seller"
						);
					}
				}
				None => error!(
					target: "settlement",
					listing_id = %listing_id,
					winner = %bid.bidder_id,
					"Winning bid has no hold"
				),
			}
		}

		// Anything still held on this listing is a stale outbid hold
		let stale = self.ledger.release_all(&listing_id, None);
		if !stale.is_empty() {
			warn!(
				target: "settlement",
				listing_id = %listing_id,
				count = stale.len(),
				"Released stale holds at settlement"
			);
		}
		room.holds.clear();

		let mut refunded: Vec<UserId> = Vec::new();
		for bidder in room.bids().iter().map(|bid| &bid.bidder_id) {
			let is_winner = winner.as_ref().is_some_and(|w| &w.bidder_id == bidder);
			if !is_winner && !refunded.contains(bidder) {
				refunded.push(bidder.clone());
			}
		}

		let mut record = SettlementRecord {
			listing_id: listing_id.clone(),
			seller_id,
			winner: winner.map(|bid| WinningBid {
				bid_id: bid.id,
				bidder_id: bid.bidder_id,
				amount: bid.amount,
			}),
			refunded,
			trigger,
			settled_at: Utc::now(),
		};

		match self.journal.record_settlement(&record) {
			Ok(()) => {}
			Err(JournalError::AlreadySettled(_)) => {
				if let Some(existing) = self.journal.settlement(&listing_id) {
					warn!(
						target: "settlement",
						listing_id = %listing_id,
						"Journal already held a settlement, keeping it"
					);
					record = existing;
				}
			}
			Err(e) => error!(
				target: "settlement",
				listing_id = %listing_id,
				error = %e,
				"Failed to journal settlement"
			),
		}

		if !self.listings.mark_ended(&listing_id) {
			debug!(
				target: "settlement",
				listing_id = %listing_id,
				"Listing was already marked ended"
			);
		}

		room.status = AuctionStatus::Ended;
		room.settlement = Some(record.clone());

		match &record.winner {
			Some(winner) => {
				info!(
					target: "settlement",
					listing_id = %listing_id,
					winner = %winner.bidder_id,
					amount = winner.amount,
					refunded = record.refunded.len(),
					?trigger,
					"Auction settled"
				);
				SettleOutcome::Settled(record)
			}
			None => {
				info!(
					target: "settlement",
					listing_id = %listing_id,
					?trigger,
					"Auction closed without bids"
				);
				SettleOutcome::NoOp(record)
			}
		}
	}
}
