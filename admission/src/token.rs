//! Freshness tokens.
//!
//! A token is `base64url(HMAC-SHA256(secret, "{ticket_id}|{holder}|{timestamp}"))`
//! without padding. It binds a credential's timestamp to the ticket and
//! holder, so a replayed QR code cannot be re-dated.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use gatepass_core::{Address, TicketId};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Errors constructing a [`TokenKey`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// The secret is empty or cannot key an HMAC.
    #[error("Invalid token secret: {0}")]
    InvalidSecret(String),
}

/// Keyed signer and verifier for freshness tokens.
#[derive(Clone)]
pub struct TokenKey {
    mac: HmacSha256,
}

impl std::fmt::Debug for TokenKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenKey").finish_non_exhaustive()
    }
}

impl TokenKey {
    /// Key the signer with `secret`.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::InvalidSecret`] if `secret` is empty.
    pub fn new(secret: &[u8]) -> Result<Self, TokenError> {
        if secret.is_empty() {
            return Err(TokenError::InvalidSecret("secret is empty".to_string()));
        }
        let mac = HmacSha256::new_from_slice(secret)
            .map_err(|e| TokenError::InvalidSecret(e.to_string()))?;
        Ok(Self { mac })
    }

    fn keyed(&self, ticket_id: TicketId, holder: &Address, timestamp: i64) -> HmacSha256 {
        let mut mac = self.mac.clone();
        mac.update(format!("{ticket_id}|{holder}|{timestamp}").as_bytes());
        mac
    }

    /// Token for a credential.
    #[must_use]
    pub fn sign(&self, ticket_id: TicketId, holder: &Address, timestamp: i64) -> String {
        let tag = self.keyed(ticket_id, holder, timestamp).finalize().into_bytes();
        URL_SAFE_NO_PAD.encode(tag)
    }

    /// Whether `token` was issued for this credential.
    ///
    /// Comparison is constant time.
    #[must_use]
    pub fn verify(&self, ticket_id: TicketId, holder: &Address, timestamp: i64, token: &str) -> bool {
        let Ok(tag) = URL_SAFE_NO_PAD.decode(token.trim()) else {
            return false;
        };
        self.keyed(ticket_id, holder, timestamp)
            .verify_slice(&tag)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    fn holder() -> Address {
        Address::parse("0x00000000000000000000000000000000000000b1").unwrap()
    }

    #[test]
    fn signed_token_verifies() {
        let key = TokenKey::new(b"gate-secret").unwrap();
        let token = key.sign(TicketId::new(42), &holder(), 1_735_689_600);
        assert!(key.verify(TicketId::new(42), &holder(), 1_735_689_600, &token));
        assert!(!token.contains('='));
    }

    #[test]
    fn token_is_bound_to_every_field() {
        let key = TokenKey::new(b"gate-secret").unwrap();
        let token = key.sign(TicketId::new(42), &holder(), 1_735_689_600);
        assert!(!key.verify(TicketId::new(43), &holder(), 1_735_689_600, &token));
        assert!(!key.verify(TicketId::new(42), &holder(), 1_735_689_601, &token));

        let other = Address::parse("0x00000000000000000000000000000000000000b2").unwrap();
        assert!(!key.verify(TicketId::new(42), &other, 1_735_689_600, &token));
    }

    #[test]
    fn other_secret_or_garbage_fails() {
        let key = TokenKey::new(b"gate-secret").unwrap();
        let forger = TokenKey::new(b"guessed").unwrap();
        let forged = forger.sign(TicketId::new(42), &holder(), 1);
        assert!(!key.verify(TicketId::new(42), &holder(), 1, &forged));
        assert!(!key.verify(TicketId::new(42), &holder(), 1, "not base64!"));
    }

    #[test]
    fn empty_secret_is_rejected() {
        assert!(TokenKey::new(b"").is_err());
    }
}
