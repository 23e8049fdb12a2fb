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

use gavel_sdk::types::RoomEvent;
use tracing::trace;

use crate::registry::AuctionRegistry;

/// Best-effort typing indicators
///
/// Typing events bypass the room's command queue and never touch bids,
/// holds or settlement. Nothing is stored, and an event for a listing
/// without a live room is silently dropped.
pub struct PresenceChannel {
	registry: Arc<AuctionRegistry>,
}

impl PresenceChannel {
	pub fn new(registry: Arc<AuctionRegistry>) -> Self {
		Self { registry }
	}

	/// Returns the number of subscribers reached
	pub fn notify_typing(&self, listing_id: &str, user_id: &str) -> usize {
		self.publish(RoomEvent::Typing {
			listing_id: listing_id.to_string(),
			user_id: user_id.to_string(),
		})
	}

	pub fn notify_stop_typing(&self, listing_id: &str, user_id: &str) -> usize {
		self.publish(RoomEvent::StopTyping {
			listing_id: listing_id.to_string(),
			user_id: user_id.to_string(),
		})
	}

	fn publish(&self, event: RoomEvent) -> usize {
		match self.registry.get(event.listing_id()) {
			Ok(room) => room.publish(event),
			Err(_) => {
				trace!(target: "room", listing_id = %event.listing_id(), "Typing event for idle listing dropped");
				0
			}
		}
	}
}
