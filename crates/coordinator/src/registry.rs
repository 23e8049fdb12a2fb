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

use std::sync::{
	Arc,
	atomic::{AtomicU64, Ordering},
};

use dashmap::{DashMap, mapref::entry::Entry};
use tracing::info;

use crate::{
	config::CoordinatorConfig,
	error::CoordinatorError,
	listing::ListingDirectory,
	room::{Room, RoomContext, RoomHandle, RoomState, log_room_exit},
};

/// Auction Registry
///
/// Maps listing IDs to live rooms. At most one room exists per listing:
/// lookup and creation happen under the map's entry lock, so two callers
/// racing to open the same listing end up with the same handle.
///
/// Rooms remove themselves when their task stops (grace period elapsed or
/// explicit eviction). A later request for the listing rebuilds the room
/// from the journal. While an evicted room is still draining its queue it
/// stays registered, and requests for the listing are refused, so a
/// replacement never runs alongside it.
pub struct AuctionRegistry {
	rooms: Arc<DashMap<String, RoomHandle>>,
	listings: Arc<dyn ListingDirectory>,
	ctx: RoomContext,
	config: CoordinatorConfig,
	generation: AtomicU64,
}

impl AuctionRegistry {
	pub fn new(
		listings: Arc<dyn ListingDirectory>,
		ctx: RoomContext,
		config: CoordinatorConfig,
	) -> Self {
		Self {
			rooms: Arc::new(DashMap::new()),
			listings,
			ctx,
			config,
			generation: AtomicU64::new(1),
		}
	}

	/// Get the room for a listing, creating it if needed
	///
	/// Fails with `AuctionNotFound` if the listing is unknown, or if its room
	/// is being evicted and has not stopped yet. Must be called from within a
	/// Tokio runtime.
	pub fn join_or_create(&self, listing_id: &str) -> Result<RoomHandle, CoordinatorError> {
		if let Some(room) = self.rooms.get(listing_id)
			&& !room.is_closed()
		{
			return live(room.value(), listing_id);
		}

		match self.rooms.entry(listing_id.to_string()) {
			Entry::Occupied(mut slot) => {
				if !slot.get().is_closed() {
					return live(slot.get(), listing_id);
				}
				let room = self.open(listing_id)?;
				slot.insert(room.clone());
				Ok(room)
			}
			Entry::Vacant(slot) => {
				let room = self.open(listing_id)?;
				slot.insert(room.clone());
				Ok(room)
			}
		}
	}

	/// Get a live room without creating one
	pub fn get(&self, listing_id: &str) -> Result<RoomHandle, CoordinatorError> {
		self.rooms
			.get(listing_id)
			.filter(|room| !room.is_closing())
			.map(|room| room.clone())
			.ok_or_else(|| CoordinatorError::AuctionNotFound(listing_id.to_string()))
	}

	/// Stop a room and wait until it has exited
	///
	/// The room finishes the commands already queued, then stops; the entry
	/// is dropped once its task ends. Returns `false` if no running room was
	/// registered for the listing.
	pub async fn evict(&self, listing_id: &str) -> bool {
		let room = match self.rooms.get(listing_id) {
			Some(room) if !room.is_closing() => room.clone(),
			_ => return false,
		};

		info!(target: "registry", listing_id = %listing_id, "Evicting room");
		room.close().await;
		info!(target: "registry", listing_id = %listing_id, "Room evicted");
		true
	}

	/// Number of registered rooms
	pub fn len(&self) -> usize {
		self.rooms.len()
	}

	pub fn is_empty(&self) -> bool {
		self.rooms.is_empty()
	}

	/// Build and spawn a room; the caller holds the entry lock
	fn open(&self, listing_id: &str) -> Result<RoomHandle, CoordinatorError> {
		let listing = self
			.listings
			.listing(listing_id)
			.ok_or_else(|| CoordinatorError::AuctionNotFound(listing_id.to_string()))?;

		let state = RoomState::restore(&listing, self.ctx.journal.as_ref(), &self.ctx.ledger)?;
		let restored = state.bids().len();
		let generation = self.generation.fetch_add(1, Ordering::Relaxed);
		let (room, task) = Room::spawn(state, self.ctx.clone(), &self.config, generation);

		// Unregister the room once its task ends, unless it was replaced
		let rooms = self.rooms.clone();
		let id = listing_id.to_string();
		tokio::spawn(async move {
			log_room_exit(&id, task.await);
			if rooms
				.remove_if(&id, |_, room| room.generation() == generation)
				.is_some()
			{
				info!(target: "registry", listing_id = %id, "Room unregistered");
			}
		});

		info!(
			target: "registry",
			listing_id = %listing_id,
			generation,
			restored_bids = restored,
			"Room opened"
		);
		Ok(room)
	}
}

/// Hand out a running room, refusing one that is being evicted
fn live(room: &RoomHandle, listing_id: &str) -> Result<RoomHandle, CoordinatorError> {
	if room.is_closing() {
		return Err(CoordinatorError::AuctionNotFound(listing_id.to_string()));
	}
	Ok(room.clone())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		journal::{AuctionJournal, MemoryAuctionJournal},
		ledger::Ledger,
		listing::MemoryListingDirectory,
		settlement::SettlementEngine,
	};
	use chrono::{Duration, Utc};
	use gavel_sdk::types::{AuctionStatus, EndTrigger, Listing};

	fn setup() -> (Arc<AuctionRegistry>, Arc<MemoryListingDirectory>) {
		let ledger = Arc::new(Ledger::new(100));
		let listings = Arc::new(MemoryListingDirectory::new());
		listings.register(Listing {
			id: "listing_1".to_string(),
			seller_id: "seller".to_string(),
			title: "Chair".to_string(),
			ends_at: Utc::now() + Duration::hours(1),
			status: AuctionStatus::Open,
		});
		let journal: Arc<dyn AuctionJournal> = Arc::new(MemoryAuctionJournal::new());
		let ctx = RoomContext {
			ledger: ledger.clone(),
			journal: journal.clone(),
			settlement: Arc::new(SettlementEngine::new(ledger, listings.clone(), journal)),
		};
		let registry = AuctionRegistry::new(listings.clone(), ctx, CoordinatorConfig::default());
		(Arc::new(registry), listings)
	}

	#[tokio::test]
	async fn test_unknown_listing_not_found() {
		let (registry, _) = setup();
		assert_eq!(
			registry.join_or_create("missing").err(),
			Some(CoordinatorError::AuctionNotFound("missing".to_string()))
		);
		assert!(registry.get("missing").is_err());
		assert!(registry.is_empty());
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
	async fn test_concurrent_joins_share_one_room() {
		let (registry, _) = setup();

		let mut tasks = Vec::new();
		for _ in 0..16 {
			let registry = registry.clone();
			tasks.push(tokio::spawn(async move {
				registry.join_or_create("listing_1").unwrap().generation()
			}));
		}

		let mut generations = Vec::new();
		for task in tasks {
			generations.push(task.await.unwrap());
		}
		generations.dedup();
		assert_eq!(generations.len(), 1);
		assert_eq!(registry.len(), 1);
	}

	#[tokio::test]
	async fn test_evicting_room_refuses_replacement() {
		let (registry, _) = setup();
		let room = registry.join_or_create("listing_1").unwrap();

		// Keep the room busy so it cannot stop before the lookups below
		let (_, evicted, during) = tokio::join!(
			room.snapshot(),
			registry.evict("listing_1"),
			async { registry.join_or_create("listing_1").map(|r| r.generation()) },
		);

		assert!(evicted);
		assert_eq!(
			during,
			Err(CoordinatorError::AuctionNotFound("listing_1".to_string()))
		);
		assert!(room.is_closed());

		let rebuilt = registry.join_or_create("listing_1").unwrap();
		assert_ne!(rebuilt.generation(), room.generation());
		assert!(!rebuilt.is_closing());
	}

	#[tokio::test]
	async fn test_evict_then_rejoin_keeps_result() {
		let (registry, _) = setup();
		let room = registry.join_or_create("listing_1").unwrap();
		let record = room.end(EndTrigger::Seller).await.unwrap().into_record();

		assert!(registry.evict("listing_1").await);
		assert!(!registry.evict("listing_1").await);

		let rebuilt = registry.join_or_create("listing_1").unwrap();
		assert_ne!(rebuilt.generation(), room.generation());
		let snapshot = rebuilt.snapshot().await.unwrap();
		assert_eq!(snapshot.status, AuctionStatus::Ended);
		assert_eq!(snapshot.settlement, Some(record));
	}
}
