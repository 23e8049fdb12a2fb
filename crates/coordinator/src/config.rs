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

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_ROOM_QUEUE_CAPACITY: usize = 1_024;

pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

pub const DEFAULT_BID_TIMEOUT_MS: u64 = 1_500;

pub const DEFAULT_GRACE_PERIOD_SECS: u64 = 300;

/// Credits granted to a user the first time the ledger sees them
pub const DEFAULT_STARTING_CREDITS: u64 = 1_000;

/// Bidding coordinator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
	/// Capacity of each room's command queue
	pub room_queue_capacity: usize,
	/// Capacity of each room's broadcast channel; slow subscribers lag beyond it
	pub event_channel_capacity: usize,
	/// How long a submitter waits for its bid to pass through the room
	pub bid_timeout_ms: u64,
	/// How long an ended room keeps serving its final snapshot before eviction
	pub grace_period_secs: u64,
	/// Starting balance for newly opened accounts
	pub default_credits: u64,
}

impl Default for CoordinatorConfig {
	fn default() -> Self {
		Self {
			room_queue_capacity: DEFAULT_ROOM_QUEUE_CAPACITY,
			event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
			bid_timeout_ms: DEFAULT_BID_TIMEOUT_MS,
			grace_period_secs: DEFAULT_GRACE_PERIOD_SECS,
			default_credits: DEFAULT_STARTING_CREDITS,
		}
	}
}

impl CoordinatorConfig {
	/// Load configuration from environment variables
	///
	/// Variables use the `GAVEL_` prefix, e.g. `GAVEL_BID_TIMEOUT_MS=500`.
	/// Unset fields keep their defaults.
	pub fn from_env() -> Result<Self, config::ConfigError> {
		let cfg = config::Config::builder()
			.add_source(config::Environment::with_prefix("GAVEL"))
			.build()?;

		cfg.try_deserialize()
	}

	/// Load configuration from file
	pub fn from_file(path: &str) -> Result<Self, config::ConfigError> {
		let cfg = config::Config::builder()
			.add_source(config::File::with_name(path))
			.add_source(config::Environment::with_prefix("GAVEL"))
			.build()?;

		cfg.try_deserialize()
	}

	pub fn bid_timeout(&self) -> Duration {
		Duration::from_millis(self.bid_timeout_ms)
	}

	pub fn grace_period(&self) -> Duration {
		Duration::from_secs(self.grace_period_secs)
	}
}
