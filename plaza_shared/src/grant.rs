//! Conferencing credentials.
//!
//! The room server issues a session-scoped grant to each joined client on
//! request. A grant names the conference room, the identity the client will
//! appear as, and an opaque bearer token valid until `expires_at`.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Bytes of entropy in an issued token.
pub const TOKEN_BYTES: usize = 32;

/// Server-issued conferencing credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaGrant {
    /// Opaque bearer token presented to the conferencing endpoint.
    pub token: String,
    /// Conference room the token is valid for.
    pub room: String,
    /// Participant identity, equal to the holder's room session id.
    pub identity: String,
    pub expires_at: DateTime<Utc>,
}

impl MediaGrant {
    /// Issues a fresh grant valid for `ttl` from `now`.
    pub fn issue(room: &str, identity: &str, ttl: Duration, now: DateTime<Utc>) -> Self {
        let mut raw = [0u8; TOKEN_BYTES];
        rand::thread_rng().fill_bytes(&mut raw);
        let token = raw.iter().map(|b| format!("{b:02x}")).collect();

        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::zero());
        Self {
            token,
            room: room.to_string(),
            identity: identity.to_string(),
            expires_at: now + ttl,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_tokens_are_unique_hex() {
        let now = Utc::now();
        let a = MediaGrant::issue("r-media", "s1", Duration::from_secs(60), now);
        let b = MediaGrant::issue("r-media", "s1", Duration::from_secs(60), now);
        assert_eq!(a.token.len(), TOKEN_BYTES * 2);
        assert!(a.token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a.token, b.token);
        assert_eq!(a.identity, "s1");
        assert_eq!(a.room, "r-media");
    }

    #[test]
    fn grant_expires_after_ttl() {
        let now = Utc::now();
        let g = MediaGrant::issue("r", "s", Duration::from_secs(10), now);
        assert!(!g.is_expired_at(now));
        assert!(!g.is_expired_at(now + chrono::Duration::seconds(9)));
        assert!(g.is_expired_at(now + chrono::Duration::seconds(10)));
    }
}
