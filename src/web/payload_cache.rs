//! Short-lived store for fetched test payloads, so selector previews can run against a
//! response without fetching it again.

use chrono::{DateTime, TimeDelta, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub const DEFAULT_CAPACITY: usize = 8;
pub const DEFAULT_TTL_SECONDS: i64 = 10 * 60;
const TOKEN_ATTEMPTS: usize = 4;

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

struct Entry {
    payload: Vec<u8>,
    expires_at: DateTime<Utc>,
}

pub struct PayloadCache {
    entries: Mutex<HashMap<String, Entry>>,
    capacity: usize,
    ttl: TimeDelta,
    max_payload_bytes: usize,
    clock: Clock,
}

impl std::fmt::Debug for PayloadCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayloadCache")
            .field("capacity", &self.capacity)
            .field("ttl", &self.ttl)
            .field("max_payload_bytes", &self.max_payload_bytes)
            .finish_non_exhaustive()
    }
}

impl PayloadCache {
    pub fn new(max_payload_bytes: usize) -> Self {
        Self::with_clock(
            DEFAULT_CAPACITY,
            TimeDelta::seconds(DEFAULT_TTL_SECONDS),
            max_payload_bytes,
            Arc::new(Utc::now),
        )
    }

    pub fn with_clock(
        capacity: usize,
        ttl: TimeDelta,
        max_payload_bytes: usize,
        clock: Clock,
    ) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
            ttl,
            max_payload_bytes,
            clock,
        }
    }

    /// Stores a copy of `payload` and returns its token. Empty or oversized payloads are
    /// not stored.
    pub fn put(&self, payload: &[u8]) -> Option<String> {
        if payload.is_empty() || payload.len() > self.max_payload_bytes {
            return None;
        }

        let now = (self.clock)();
        let mut entries = self.entries.lock().ok()?;
        entries.retain(|_, entry| entry.expires_at > now);

        if entries.len() >= self.capacity {
            let soonest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.expires_at)
                .map(|(token, _)| token.clone());
            if let Some(token) = soonest {
                entries.remove(&token);
            }
        }

        for _ in 0..TOKEN_ATTEMPTS {
            let token = hex::encode(rand::random::<[u8; 16]>());
            if entries.contains_key(&token) {
                continue;
            }
            entries.insert(
                token.clone(),
                Entry {
                    payload: payload.to_vec(),
                    expires_at: now + self.ttl,
                },
            );
            return Some(token);
        }
        None
    }

    /// Returns a copy of the payload. Expired entries are dropped and reported missing.
    pub fn get(&self, token: &str) -> Option<Vec<u8>> {
        let token = token.trim();
        if token.is_empty() {
            return None;
        }

        let now = (self.clock)();
        let mut entries = self.entries.lock().ok()?;
        let expired = entries.get(token)?.expires_at <= now;
        if expired {
            entries.remove(token);
            return None;
        }
        entries.get(token).map(|entry| entry.payload.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
