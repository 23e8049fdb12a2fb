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

use gavel_sdk::types::{Bid, EndTrigger, RejectReason, RoomSnapshot, UserId};
use tokio::sync::oneshot;

use crate::settlement::SettleOutcome;

/// Control messages for an auction room
///
/// These messages allow external components to interact with a room
/// without blocking it or requiring shared mutable state.
///
/// The room actor processes these messages one at a time, in arrival
/// order, so every state change sees the result of the one before it.
#[derive(Debug)]
pub enum RoomCommand {
	/// Validate and apply a bid
	///
	/// Dropped unprocessed if the requester stopped waiting.
	SubmitBid {
		bidder_id: UserId,
		amount: u64,
		respond_to: oneshot::Sender<Result<Bid, RejectReason>>,
	},

	/// End the auction and settle it
	///
	/// Processed even if the requester stopped waiting. Repeated requests
	/// answer with the recorded outcome.
	End {
		trigger: EndTrigger,
		respond_to: oneshot::Sender<SettleOutcome>,
	},

	/// Register a participant and return a snapshot
	Join {
		user_id: UserId,
		respond_to: oneshot::Sender<RoomSnapshot>,
	},

	/// Unregister a participant
	Leave { user_id: UserId },

	/// Request a snapshot of the current room state
	Snapshot {
		respond_to: oneshot::Sender<RoomSnapshot>,
	},

	/// Stop the room
	Shutdown,
}

impl RoomCommand {
	/// Whether the requester has given up on the reply
	pub(crate) fn is_abandoned(&self) -> bool {
		match self {
			RoomCommand::SubmitBid { respond_to, .. } => respond_to.is_closed(),
			RoomCommand::Join { respond_to, .. } | RoomCommand::Snapshot { respond_to } => {
				respond_to.is_closed()
			}
			RoomCommand::End { .. } | RoomCommand::Leave { .. } | RoomCommand::Shutdown => false,
		}
	}
}
