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

mod control;
mod state;

pub use control::RoomCommand;
pub use state::RoomState;

use std::{
	sync::{
		Arc,
		atomic::{AtomicBool, Ordering},
	},
	time::Duration,
};

use chrono::Utc;
use gavel_sdk::types::{Bid, EndTrigger, RejectReason, RoomEvent, RoomSnapshot, UserId};
use thiserror::Error;
use tokio::{
	sync::{
		broadcast,
		mpsc::{self, error::TrySendError},
		oneshot,
	},
	task::JoinHandle,
	time::{Instant, sleep_until},
};
use tracing::{debug, info, warn};

use crate::{
	config::CoordinatorConfig, journal::AuctionJournal, ledger::Ledger,
	settlement::{SettleOutcome, SettlementEngine},
};

/// Errors reaching a room, as opposed to the room's answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RoomError {
	#[error("Room queue is full")]
	Full,
	#[error("Room is closed")]
	Closed,
	#[error("Room did not respond in time")]
	TimedOut,
}

/// Shared collaborators of every room
#[derive(Clone)]
pub struct RoomContext {
	pub ledger: Arc<Ledger>,
	pub journal: Arc<dyn AuctionJournal>,
	pub settlement: Arc<SettlementEngine>,
}

/// Cloneable address of a running room
///
/// All requests go through the room's bounded queue. A full queue is
/// reported immediately instead of waiting for space, and replies are
/// awaited for at most the configured timeout.
#[derive(Clone)]
pub struct RoomHandle {
	listing_id: String,
	seller_id: UserId,
	generation: u64,
	commands: mpsc::Sender<RoomCommand>,
	events: broadcast::Sender<RoomEvent>,
	timeout: Duration,
	/// Set once the room has been asked to stop
	closing: Arc<AtomicBool>,
}

impl RoomHandle {
	pub fn listing_id(&self) -> &str {
		&self.listing_id
	}

	pub fn seller_id(&self) -> &str {
		&self.seller_id
	}

	pub(crate) fn generation(&self) -> u64 {
		self.generation
	}

	/// Whether the room's actor has stopped
	///
	/// A stopped room no longer touches the ledger or the journal.
	pub fn is_closed(&self) -> bool {
		self.commands.is_closed()
	}

	/// Whether the room is stopping or stopped
	pub fn is_closing(&self) -> bool {
		self.closing.load(Ordering::Acquire) || self.is_closed()
	}

	/// Subscribe to the room's event stream
	pub fn subscribe(&self) -> broadcast::Receiver<RoomEvent> {
		self.events.subscribe()
	}

	/// Broadcast an event that does not touch room state
	///
	/// Returns the number of subscribers reached.
	pub fn publish(&self, event: RoomEvent) -> usize {
		self.events.send(event).unwrap_or(0)
	}

	pub async fn submit_bid(
		&self,
		bidder_id: &str,
		amount: u64,
	) -> Result<Result<Bid, RejectReason>, RoomError> {
		self.request(|respond_to| RoomCommand::SubmitBid {
			bidder_id: bidder_id.to_string(),
			amount,
			respond_to,
		})
		.await
	}

	pub async fn end(&self, trigger: EndTrigger) -> Result<SettleOutcome, RoomError> {
		self.request(|respond_to| RoomCommand::End {
			trigger,
			respond_to,
		})
		.await
	}

	pub async fn join(&self, user_id: &str) -> Result<RoomSnapshot, RoomError> {
		self.request(|respond_to| RoomCommand::Join {
			user_id: user_id.to_string(),
			respond_to,
		})
		.await
	}

	pub fn leave(&self, user_id: &str) -> Result<(), RoomError> {
		self.send(RoomCommand::Leave {
			user_id: user_id.to_string(),
		})
	}

	pub async fn snapshot(&self) -> Result<RoomSnapshot, RoomError> {
		self.request(|respond_to| RoomCommand::Snapshot { respond_to })
			.await
	}

	/// Stop the room and wait until its actor has exited
	///
	/// Commands queued ahead of the shutdown are still served; later ones
	/// are dropped and their callers see `Closed`. Waits for queue space
	/// rather than failing on a full queue.
	pub async fn close(&self) {
		self.closing.store(true, Ordering::Release);
		if self.commands.send(RoomCommand::Shutdown).await.is_err() {
			debug!(target: "room", listing_id = %self.listing_id, "Room already stopped");
		}
		self.commands.closed().await;
	}

	fn send(&self, command: RoomCommand) -> Result<(), RoomError> {
		self.commands.try_send(command).map_err(|e| match e {
			TrySendError::Full(_) => RoomError::Full,
			TrySendError::Closed(_) => RoomError::Closed,
		})
	}

	async fn request<T>(
		&self,
		command: impl FnOnce(oneshot::Sender<T>) -> RoomCommand,
	) -> Result<T, RoomError> {
		let (respond_to, reply) = oneshot::channel();
		self.send(command(respond_to))?;

		match tokio::time::timeout(self.timeout, reply).await {
			Ok(Ok(value)) => Ok(value),
			Ok(Err(_)) => Err(RoomError::Closed),
			Err(_) => Err(RoomError::TimedOut),
		}
	}
}

/// Auction room actor
///
/// Each room runs as its own task, consuming commands from its queue and
/// publishing events to its subscribers. The task owns the `RoomState`
/// outright, so bid validation and acceptance never race with each other
/// or with settlement.
///
/// Lifecycle:
/// - Open: serves bids, presence and snapshots; a timer fires at the
///   listing's deadline and settles the auction
/// - Ended: keeps answering for the grace period so clients can fetch the
///   result, then stops
pub struct Room {
	state: RoomState,
	ctx: RoomContext,
	events: broadcast::Sender<RoomEvent>,
	grace_period: Duration,
}

impl Room {
	/// Spawn a room task for `state`
	///
	/// Must be called from within a Tokio runtime. The returned join handle
	/// completes when the room stops.
	pub fn spawn(
		state: RoomState,
		ctx: RoomContext,
		config: &CoordinatorConfig,
		generation: u64,
	) -> (RoomHandle, JoinHandle<()>) {
		let (commands, receiver) = mpsc::channel(config.room_queue_capacity.max(1));
		let (events, _) = broadcast::channel(config.event_channel_capacity.max(1));

		let handle = RoomHandle {
			listing_id: state.listing_id().to_string(),
			seller_id: state.seller_id().to_string(),
			generation,
			commands,
			events: events.clone(),
			timeout: config.bid_timeout(),
			closing: Arc::new(AtomicBool::new(false)),
		};

		let room = Room {
			state,
			ctx,
			events,
			grace_period: config.grace_period(),
		};
		let task = tokio::spawn(room.run(receiver));

		(handle, task)
	}

	/// Main room loop
	///
	/// This loop:
	/// 1. Waits for the next command, the deadline or the end of the grace period
	/// 2. Drops commands whose requester already gave up
	/// 3. Applies the command to the room state
	/// 4. Publishes resulting events
	async fn run(mut self, mut receiver: mpsc::Receiver<RoomCommand>) {
		let listing_id = self.state.listing_id().to_string();
		info!(target: "room", listing_id = %listing_id, ends_at = %self.state.ends_at(), "Room started");

		let deadline = Instant::now()
			+ (self.state.ends_at() - Utc::now())
				.to_std()
				.unwrap_or(Duration::ZERO);
		let mut ended_at = self.state.is_ended().then(Instant::now);

		loop {
			let retire_at = ended_at.map(|at| at + self.grace_period);

			tokio::select! {
				command = receiver.recv() => match command {
					Some(RoomCommand::Shutdown) | None => break,
					Some(command) if command.is_abandoned() => {
						debug!(target: "room", listing_id = %listing_id, "Dropping abandoned request");
					}
					Some(command) => self.handle(command),
				},
				_ = sleep_until(deadline), if self.state.is_open() => {
					self.settle(EndTrigger::Deadline);
				}
				_ = sleep_until(retire_at.unwrap_or(deadline)), if retire_at.is_some() => {
					info!(target: "room", listing_id = %listing_id, "Grace period elapsed");
					break;
				}
			}

			if ended_at.is_none() && self.state.is_ended() {
				ended_at = Some(Instant::now());
			}
		}

		info!(target: "room", listing_id = %listing_id, "Room stopped");
	}

	fn handle(&mut self, command: RoomCommand) {
		match command {
			RoomCommand::SubmitBid {
				bidder_id,
				amount,
				respond_to,
			} => {
				let result = self.submit_bid(&bidder_id, amount);
				let _ = respond_to.send(result);
			}
			RoomCommand::End {
				trigger,
				respond_to,
			} => {
				let outcome = self.settle(trigger);
				let _ = respond_to.send(outcome);
			}
			RoomCommand::Join {
				user_id,
				respond_to,
			} => {
				if self.state.join(&user_id) {
					self.broadcast(RoomEvent::ParticipantJoined {
						listing_id: self.state.listing_id().to_string(),
						user_id,
					});
				}
				let _ = respond_to.send(self.state.snapshot());
			}
			RoomCommand::Leave { user_id } => {
				if self.state.leave(&user_id) {
					self.broadcast(RoomEvent::ParticipantLeft {
						listing_id: self.state.listing_id().to_string(),
						user_id,
					});
				}
			}
			RoomCommand::Snapshot { respond_to } => {
				let _ = respond_to.send(self.state.snapshot());
			}
			RoomCommand::Shutdown => {}
		}
	}

	fn submit_bid(&mut self, bidder_id: &str, amount: u64) -> Result<Bid, RejectReason> {
		// The timer may not have fired yet
		if self.state.is_open() && self.state.deadline_passed(Utc::now()) {
			self.settle(EndTrigger::Deadline);
		}

		let result = self.state.submit_bid(
			bidder_id,
			amount,
			&self.ctx.ledger,
			self.ctx.journal.as_ref(),
		);

		match &result {
			Ok(bid) => {
				info!(
					target: "room",
					listing_id = %bid.listing_id,
					bidder = %bid.bidder_id,
					amount = bid.amount,
					sequence = bid.sequence,
					"Bid accepted"
				);
				self.broadcast(RoomEvent::BidAccepted { bid: bid.clone() });
			}
			Err(reason) => debug!(
				target: "room",
				listing_id = %self.state.listing_id(),
				bidder = %bidder_id,
				amount,
				code = reason.code(),
				"Bid rejected"
			),
		}

		result
	}

	/// Settle once; only the first settlement is announced
	fn settle(&mut self, trigger: EndTrigger) -> SettleOutcome {
		let was_open = self.state.is_open();
		let outcome = self.ctx.settlement.settle(&mut self.state, trigger);

		if was_open {
			self.broadcast(RoomEvent::AuctionEnded {
				settlement: outcome.record().clone(),
			});
		}
		outcome
	}

	fn broadcast(&self, event: RoomEvent) {
		if self.events.send(event).is_err() {
			// No subscribers right now
			debug!(target: "room", listing_id = %self.state.listing_id(), "Event had no subscribers");
		}
	}
}

/// Stop reason for logging by whoever awaits the room task
pub(crate) fn log_room_exit(listing_id: &str, result: Result<(), tokio::task::JoinError>) {
	if let Err(e) = result {
		warn!(target: "room", listing_id = %listing_id, error = %e, "Room task failed");
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{journal::MemoryAuctionJournal, listing::MemoryListingDirectory};
	use chrono::Duration as ChronoDuration;
	use gavel_sdk::types::{AuctionStatus, Listing};

	fn spawn_room(ends_in: ChronoDuration) -> (RoomHandle, JoinHandle<()>, Arc<Ledger>) {
		let listing = Listing {
			id: "listing_1".to_string(),
			seller_id: "seller".to_string(),
			title: "Bike".to_string(),
			ends_at: Utc::now() + ends_in,
			status: AuctionStatus::Open,
		};
		let ledger = Arc::new(Ledger::new(100));
		for user in ["alice", "bob"] {
			ledger.ensure_account(user);
		}
		let listings = Arc::new(MemoryListingDirectory::new());
		listings.register(listing.clone());
		let journal: Arc<dyn AuctionJournal> = Arc::new(MemoryAuctionJournal::new());
		let ctx = RoomContext {
			ledger: ledger.clone(),
			journal: journal.clone(),
			settlement: Arc::new(SettlementEngine::new(ledger.clone(), listings, journal)),
		};

		let config = CoordinatorConfig {
			grace_period_secs: 1,
			..Default::default()
		};
		let (handle, task) = Room::spawn(RoomState::new(&listing), ctx, &config, 1);
		(handle, task, ledger)
	}

	#[tokio::test]
	async fn test_bid_broadcast_to_subscribers() {
		let (room, _task, _) = spawn_room(ChronoDuration::hours(1));
		let mut events = room.subscribe();

		let bid = room.submit_bid("alice", 40).await.unwrap().unwrap();
		assert_eq!(bid.sequence, 1);

		match events.recv().await.unwrap() {
			RoomEvent::BidAccepted { bid: received } => assert_eq!(received, bid),
			other => panic!("unexpected event: {:?}", other),
		}
	}

	#[tokio::test]
	async fn test_join_broadcasts_once() {
		let (room, _task, _) = spawn_room(ChronoDuration::hours(1));
		let mut events = room.subscribe();

		let snapshot = room.join("alice").await.unwrap();
		assert_eq!(snapshot.participants, vec!["alice".to_string()]);
		room.join("alice").await.unwrap();
		room.leave("alice").unwrap();
		room.snapshot().await.unwrap();

		assert!(matches!(
			events.recv().await.unwrap(),
			RoomEvent::ParticipantJoined { .. }
		));
		assert!(matches!(
			events.recv().await.unwrap(),
			RoomEvent::ParticipantLeft { .. }
		));
	}

	#[tokio::test]
	async fn test_end_announced_once() {
		let (room, _task, ledger) = spawn_room(ChronoDuration::hours(1));
		let mut events = room.subscribe();
		room.submit_bid("alice", 40).await.unwrap().unwrap();

		let first = room.end(EndTrigger::Seller).await.unwrap();
		let second = room.end(EndTrigger::Seller).await.unwrap();
		assert!(first.is_settled());
		assert!(!second.is_settled());
		assert_eq!(first.record(), second.record());
		assert_eq!(ledger.balance("seller").total, 140);

		let mut ended = 0;
		while let Ok(event) = events.try_recv() {
			if matches!(event, RoomEvent::AuctionEnded { .. }) {
				ended += 1;
			}
		}
		assert_eq!(ended, 1);
	}

	#[tokio::test(start_paused = true)]
	async fn test_room_stops_after_grace_period() {
		let (room, task, _) = spawn_room(ChronoDuration::hours(1));
		room.end(EndTrigger::Seller).await.unwrap();

		task.await.unwrap();
		assert!(room.is_closed());
		assert_eq!(room.snapshot().await, Err(RoomError::Closed));
	}

	#[tokio::test]
	async fn test_close_serves_queued_commands_first() {
		let (room, task, ledger) = spawn_room(ChronoDuration::hours(1));

		let (bid, ()) = tokio::join!(room.submit_bid("alice", 40), room.close());
		assert_eq!(bid.unwrap().map(|b| b.amount), Ok(40));
		assert!(room.is_closing());
		assert!(room.is_closed());
		assert_eq!(ledger.balance("alice").held, 40);

		task.await.unwrap();
		assert_eq!(room.submit_bid("bob", 50).await, Err(RoomError::Closed));
	}

	#[tokio::test]
	async fn test_abandoned_bid_is_not_applied() {
		let (room, _task, ledger) = spawn_room(ChronoDuration::hours(1));

		let (respond_to, reply) = oneshot::channel();
		drop(reply);
		room.send(RoomCommand::SubmitBid {
			bidder_id: "alice".to_string(),
			amount: 40,
			respond_to,
		})
		.unwrap();

		let snapshot = room.snapshot().await.unwrap();
		assert!(snapshot.bids.is_empty());
		assert_eq!(ledger.balance("alice").held, 0);
	}

	#[tokio::test]
	async fn test_full_queue_rejected_immediately() {
		let (room, _task, _) = spawn_room(ChronoDuration::hours(1));
		let config = CoordinatorConfig::default();

		// The actor cannot drain while this task keeps the thread
		for _ in 0..config.room_queue_capacity {
			room.leave("nobody").unwrap();
		}
		assert_eq!(room.leave("nobody"), Err(RoomError::Full));
		assert_eq!(room.submit_bid("alice", 10).await, Err(RoomError::Full));
	}

	#[tokio::test]
	async fn test_past_deadline_bid_settles_first() {
		let (room, _task, _) = spawn_room(ChronoDuration::milliseconds(-1));

		let result = room.submit_bid("alice", 40).await.unwrap();
		assert_eq!(result, Err(RejectReason::AuctionEnded));

		let snapshot = room.snapshot().await.unwrap();
		assert_eq!(snapshot.status, AuctionStatus::Ended);
		assert_eq!(
			snapshot.settlement.map(|s| s.trigger),
			Some(EndTrigger::Deadline)
		);
	}
}
