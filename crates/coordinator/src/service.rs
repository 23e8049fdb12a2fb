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

use gavel_sdk::types::{
	Balance, Bid, EndTrigger, RejectReason, RoomEvent, RoomSnapshot, SettlementRecord,
};
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::{
	arbitrator::BidArbitrator,
	config::CoordinatorConfig,
	error::CoordinatorError,
	journal::AuctionJournal,
	ledger::Ledger,
	listing::ListingDirectory,
	presence::PresenceChannel,
	registry::AuctionRegistry,
	room::{RoomContext, RoomError, RoomHandle},
	settlement::{SettleOutcome, SettlementEngine},
};

/// Auction coordinator
///
/// Wires the ledger, registry, arbitrator, settlement engine and presence
/// channel together and exposes the operations a transport layer needs.
/// Users get an account with the configured starting credits the first
/// time they join a room or bid.
pub struct AuctionCoordinator {
	ledger: Arc<Ledger>,
	registry: Arc<AuctionRegistry>,
	arbitrator: BidArbitrator,
	presence: PresenceChannel,
}

impl AuctionCoordinator {
	pub fn new(
		config: CoordinatorConfig,
		listings: Arc<dyn ListingDirectory>,
		journal: Arc<dyn AuctionJournal>,
	) -> Self {
		let ledger = Arc::new(Ledger::new(config.default_credits));
		let settlement = Arc::new(SettlementEngine::new(
			ledger.clone(),
			listings.clone(),
			journal.clone(),
		));
		let ctx = RoomContext {
			ledger: ledger.clone(),
			journal,
			settlement,
		};
		let registry = Arc::new(AuctionRegistry::new(listings, ctx, config));

		Self {
			ledger,
			arbitrator: BidArbitrator::new(registry.clone()),
			presence: PresenceChannel::new(registry.clone()),
			registry,
		}
	}

	pub fn ledger(&self) -> &Arc<Ledger> {
		&self.ledger
	}

	pub fn registry(&self) -> &Arc<AuctionRegistry> {
		&self.registry
	}

	/// Enter a room and receive its current state
	pub async fn join(
		&self,
		listing_id: &str,
		user_id: &str,
	) -> Result<RoomSnapshot, CoordinatorError> {
		self.ledger.ensure_account(user_id);
		let room = self.registry.join_or_create(listing_id)?;
		room.join(user_id)
			.await
			.map_err(|e| room_error(listing_id, e))
	}

	/// Leave a room; leaving an idle listing is a no-op
	pub fn leave(&self, listing_id: &str, user_id: &str) -> Result<(), CoordinatorError> {
		match self.registry.get(listing_id) {
			Ok(room) => room.leave(user_id).map_err(|e| room_error(listing_id, e)),
			Err(_) => Ok(()),
		}
	}

	pub async fn snapshot(&self, listing_id: &str) -> Result<RoomSnapshot, CoordinatorError> {
		let room = self.registry.join_or_create(listing_id)?;
		room.snapshot()
			.await
			.map_err(|e| room_error(listing_id, e))
	}

	/// Subscribe to a room's events, opening the room if needed
	pub fn subscribe(
		&self,
		listing_id: &str,
	) -> Result<broadcast::Receiver<RoomEvent>, CoordinatorError> {
		Ok(self.registry.join_or_create(listing_id)?.subscribe())
	}

	pub async fn submit_bid(
		&self,
		listing_id: &str,
		bidder_id: &str,
		amount: i64,
	) -> Result<Bid, RejectReason> {
		self.ledger.ensure_account(bidder_id);
		self.arbitrator.submit(listing_id, bidder_id, amount).await
	}

	/// Seller-initiated close
	///
	/// Repeated requests, or a request racing the deadline, return the one
	/// recorded settlement.
	pub async fn request_end(
		&self,
		listing_id: &str,
		caller_id: &str,
	) -> Result<SettlementRecord, CoordinatorError> {
		let room = self.registry.join_or_create(listing_id)?;
		if room.seller_id() != caller_id {
			warn!(
				target: "room",
				listing_id = %listing_id,
				caller = %caller_id,
				"End requested by non-seller"
			);
			return Err(CoordinatorError::NotSeller(listing_id.to_string()));
		}

		info!(target: "room", listing_id = %listing_id, "End requested by seller");
		Ok(end(&room, EndTrigger::Seller).await?.into_record())
	}

	/// Settle a listing for the given trigger
	pub async fn settle(
		&self,
		listing_id: &str,
		trigger: EndTrigger,
	) -> Result<SettleOutcome, CoordinatorError> {
		let room = self.registry.join_or_create(listing_id)?;
		end(&room, trigger).await
	}

	pub fn typing(&self, listing_id: &str, user_id: &str) -> usize {
		self.presence.notify_typing(listing_id, user_id)
	}

	pub fn stop_typing(&self, listing_id: &str, user_id: &str) -> usize {
		self.presence.notify_stop_typing(listing_id, user_id)
	}

	pub fn balance(&self, user_id: &str) -> Balance {
		self.ledger.ensure_account(user_id)
	}
}

async fn end(room: &RoomHandle, trigger: EndTrigger) -> Result<SettleOutcome, CoordinatorError> {
	room.end(trigger)
		.await
		.map_err(|e| room_error(room.listing_id(), e))
}

fn room_error(listing_id: &str, error: RoomError) -> CoordinatorError {
	let listing_id = listing_id.to_string();
	match error {
		RoomError::Full => CoordinatorError::Overloaded(listing_id),
		RoomError::TimedOut => CoordinatorError::TimedOut(listing_id),
		RoomError::Closed => CoordinatorError::AuctionNotFound(listing_id),
	}
}
