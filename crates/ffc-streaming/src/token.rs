// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Auth tokens carried in the streaming URL.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::warn;

use crate::config::EnvSecret;

type HmacSha256 = Hmac<Sha256>;

/// Mints the token sent as the `token` query parameter.
///
/// A fresh token is requested for every connection attempt.
pub trait TokenProvider: Send + Sync + 'static {
	fn token(&self) -> String;
}

/// Default provider: `<unix-millis>.<hex hmac-sha256(secret, unix-millis)>`.
#[derive(Debug, Clone)]
pub struct SignedTokenProvider {
	secret: EnvSecret,
}

impl SignedTokenProvider {
	pub fn new(secret: EnvSecret) -> Self {
		Self { secret }
	}

	/// Mints the token for a given timestamp.
	pub fn token_at(&self, timestamp_millis: i64) -> String {
		let timestamp = timestamp_millis.to_string();
		let mut mac = match HmacSha256::new_from_slice(self.secret.expose().as_bytes()) {
			Ok(m) => m,
			Err(e) => {
				warn!(error = %e, "Failed to key token signer, sending unsigned token");
				return timestamp;
			}
		};
		mac.update(timestamp.as_bytes());
		let signature = hex::encode(mac.finalize().into_bytes());
		format!("{timestamp}.{signature}")
	}
}

impl TokenProvider for SignedTokenProvider {
	fn token(&self) -> String {
		self.token_at(chrono::Utc::now().timestamp_millis())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_token_format() {
		let provider = SignedTokenProvider::new(EnvSecret::new("env-secret"));
		let token = provider.token_at(1_700_000_000_000);

		let (timestamp, signature) = token.split_once('.').unwrap();
		assert_eq!(timestamp, "1700000000000");
		assert_eq!(signature.len(), 64);
		assert!(signature.chars().all(|c| c.is_ascii_hexdigit()));
	}

	#[test]
	fn test_token_matches_hmac() {
		let provider = SignedTokenProvider::new(EnvSecret::new("env-secret"));

		let mut mac = HmacSha256::new_from_slice(b"env-secret").unwrap();
		mac.update(b"42");
		let expected = format!("42.{}", hex::encode(mac.finalize().into_bytes()));

		assert_eq!(provider.token_at(42), expected);
	}

	#[test]
	fn test_token_depends_on_secret() {
		let a = SignedTokenProvider::new(EnvSecret::new("secret-a"));
		let b = SignedTokenProvider::new(EnvSecret::new("secret-b"));
		assert_eq!(a.token_at(1), a.token_at(1));
		assert_ne!(a.token_at(1), b.token_at(1));
	}

	#[test]
	fn test_token_uses_current_time() {
		let provider = SignedTokenProvider::new(EnvSecret::new("env-secret"));
		let before = chrono::Utc::now().timestamp_millis();
		let token = provider.token();
		let after = chrono::Utc::now().timestamp_millis();

		let millis: i64 = token.split_once('.').unwrap().0.parse().unwrap();
		assert!(millis >= before && millis <= after);
	}
}
