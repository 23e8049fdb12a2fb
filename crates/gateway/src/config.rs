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

use std::{env, net::SocketAddr, str::FromStr};

use anyhow::{Context, Result};
use gavel_coordinator::CoordinatorConfig;

// Logging configuration constants
/// Default log level (can be overridden by RUST_LOG environment variable)
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default log directory component name
pub const LOG_COMPONENT_NAME: &str = "gateway";

/// Default console output enabled (can be overridden by LOG_TO_CONSOLE environment variable)
pub const DEFAULT_LOG_TO_CONSOLE: bool = false;

// Server configuration constants
/// Default HTTP server bind address (can be overridden by GATEWAY_BIND_ADDR environment variable)
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

/// Default maximum HTTP request body size in bytes (can be overridden by GATEWAY_MAX_BODY_BYTES)
pub const DEFAULT_MAX_BODY_BYTES: usize = 16 * 1024;

/// Default allowed CORS origin (can be overridden by GATEWAY_ALLOWED_ORIGIN)
pub const DEFAULT_ALLOWED_ORIGIN: &str = "*";

// Admission configuration constants
/// Default bid submissions per second per user (can be overridden by GATEWAY_RATE_LIMIT_RPS)
pub const DEFAULT_RATE_LIMIT_RPS: u32 = 20;

/// Default burst capacity per user (can be overridden by GATEWAY_RATE_LIMIT_BURST)
pub const DEFAULT_RATE_LIMIT_BURST: u32 = 40;

/// Default lifetime of a cached bid outcome keyed by `X-Request-Id`
/// (can be overridden by GATEWAY_IDEMPOTENCY_TTL_SECS)
pub const DEFAULT_IDEMPOTENCY_TTL_SECS: u64 = 60;

/// Upper bound on cached bid outcomes
pub const DEFAULT_IDEMPOTENCY_MAX_CAPACITY: u64 = 100_000;

#[derive(Debug, Clone)]
pub struct GatewayRuntimeConfig {
	pub bind_addr: SocketAddr,
	pub workers: usize,
	pub max_body_bytes: usize,
	pub allowed_origin: String,
	pub rate_limit_rps: u32,
	pub rate_limit_burst: u32,
	pub idempotency_ttl_secs: u64,
	pub coordinator: CoordinatorConfig,
}

impl Default for GatewayRuntimeConfig {
	fn default() -> Self {
		Self {
			bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
			workers: num_cpus::get(),
			max_body_bytes: DEFAULT_MAX_BODY_BYTES,
			allowed_origin: DEFAULT_ALLOWED_ORIGIN.to_string(),
			rate_limit_rps: DEFAULT_RATE_LIMIT_RPS,
			rate_limit_burst: DEFAULT_RATE_LIMIT_BURST,
			idempotency_ttl_secs: DEFAULT_IDEMPOTENCY_TTL_SECS,
			coordinator: CoordinatorConfig::default(),
		}
	}
}

impl GatewayRuntimeConfig {
	pub fn from_env() -> Result<Self> {
		dotenv::dotenv().ok();

		let bind_addr_str =
			env::var("GATEWAY_BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string());
		let bind_addr = bind_addr_str
			.parse()
			.with_context(|| format!("Invalid bind address: {}", bind_addr_str))?;

		let workers = env_or("GATEWAY_WORKERS", num_cpus::get());
		let max_body_bytes = env_or("GATEWAY_MAX_BODY_BYTES", DEFAULT_MAX_BODY_BYTES);
		let allowed_origin = env::var("GATEWAY_ALLOWED_ORIGIN")
			.unwrap_or_else(|_| DEFAULT_ALLOWED_ORIGIN.to_string());

		let rate_limit_rps = env_or("GATEWAY_RATE_LIMIT_RPS", DEFAULT_RATE_LIMIT_RPS);
		let rate_limit_burst = env_or("GATEWAY_RATE_LIMIT_BURST", DEFAULT_RATE_LIMIT_BURST);
		if rate_limit_rps == 0 || rate_limit_burst == 0 {
			anyhow::bail!("GATEWAY_RATE_LIMIT_RPS and GATEWAY_RATE_LIMIT_BURST must be > 0");
		}

		let idempotency_ttl_secs =
			env_or("GATEWAY_IDEMPOTENCY_TTL_SECS", DEFAULT_IDEMPOTENCY_TTL_SECS);

		let coordinator =
			CoordinatorConfig::from_env().context("Invalid GAVEL_* coordinator configuration")?;

		Ok(Self {
			bind_addr,
			workers,
			max_body_bytes,
			allowed_origin,
			rate_limit_rps,
			rate_limit_burst,
			idempotency_ttl_secs,
			coordinator,
		})
	}
}

/// Parse an environment variable, falling back to `default` when unset or malformed
fn env_or<T: FromStr>(key: &str, default: T) -> T {
	env::var(key)
		.ok()
		.and_then(|v| v.parse().ok())
		.unwrap_or(default)
}
