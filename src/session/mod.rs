//! Distributed session store (C4).
//!
//! Records are held behind a compare-and-set update: load, mutate, attempt
//! a versioned write, re-read on a lost race and retry up to 3 times before
//! surfacing `conflict`. In production this CAS targets the shared `redis`
//! tier; the in-process `DashMap` here plays the same role for single-node
//! and test runs and is the thing actually exercised by this crate (no
//! concrete wire protocol is mandated — §9 Open Questions).

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// A session as persisted by the store. `version` is the CAS token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub principal_id: String,
    pub issued_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub absolute_expiry: DateTime<Utc>,
    pub fingerprint_hash: String,
    pub flags: Vec<String>,
    pub revoked: bool,
    version: u64,
}

/// Outcome of [`SessionStore::load`].
#[derive(Debug, Clone)]
pub enum LoadOutcome {
    Active(SessionRecord),
    Expired,
    Unknown,
}

fn fingerprint_hash(fingerprint: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(fingerprint.as_bytes());
    hex::encode(hasher.finalize())
}

const MAX_CAS_ATTEMPTS: u32 = 3;

/// Shared session store. Cheap to clone (backed by `Arc<DashMap<..>>`).
#[derive(Clone)]
pub struct SessionStore {
    records: Arc<DashMap<String, SessionRecord>>,
    absolute_ttl: Duration,
    idle_ttl: Duration,
}

impl SessionStore {
    pub fn new(absolute_ttl: Duration, idle_ttl: Duration) -> Self {
        Self {
            records: Arc::new(DashMap::new()),
            absolute_ttl,
            idle_ttl,
        }
    }

    /// `create(principal, clientFingerprint) -> session`. Durable before
    /// returning: the in-process map insert below *is* the durability
    /// boundary for this backend; a `redis`-backed implementation would
    /// await the `SET` acknowledgement here instead.
    pub fn create(&self, principal_id: impl Into<String>, client_fingerprint: &str) -> SessionRecord {
        let now = Utc::now();
        let record = SessionRecord {
            session_id: Uuid::new_v4().to_string(),
            principal_id: principal_id.into(),
            issued_at: now,
            last_seen_at: now,
            absolute_expiry: now + chrono::Duration::from_std(self.absolute_ttl).unwrap(),
            fingerprint_hash: fingerprint_hash(client_fingerprint),
            flags: Vec::new(),
            revoked: false,
            version: 0,
        };
        self.records.insert(record.session_id.clone(), record.clone());
        record
    }

    /// `load(sessionId) -> session|expired|unknown`. A fingerprint mismatch
    /// is checked by the caller via [`Self::load_verified`]; `load` alone
    /// does not require a fingerprint so internal callers (e.g. `touch`) can
    /// reuse it.
    pub fn load(&self, session_id: &str) -> LoadOutcome {
        let Some(entry) = self.records.get(session_id) else {
            return LoadOutcome::Unknown;
        };
        let record = entry.clone();
        if record.revoked {
            return LoadOutcome::Unknown;
        }
        let now = Utc::now();
        if now >= record.absolute_expiry {
            return LoadOutcome::Expired;
        }
        if now - record.last_seen_at > chrono::Duration::from_std(self.idle_ttl).unwrap() {
            return LoadOutcome::Expired;
        }
        LoadOutcome::Active(record)
    }

    /// `load` plus fingerprint verification (§8 "Session fingerprint"
    /// property): a mismatch revokes the session and returns `unauthorized`.
    pub fn load_verified(&self, session_id: &str, client_fingerprint: &str) -> AppResult<SessionRecord> {
        match self.load(session_id) {
            LoadOutcome::Unknown => Err(AppError::not_found("session not found")),
            LoadOutcome::Expired => Err(AppError::unauthorized("session expired")),
            LoadOutcome::Active(record) => {
                if record.fingerprint_hash != fingerprint_hash(client_fingerprint) {
                    self.revoke(session_id);
                    return Err(AppError::unauthorized("session fingerprint mismatch"));
                }
                Ok(record)
            }
        }
    }

    /// `touch(sessionId)` updates `lastSeenAt` under the CAS protocol.
    pub fn touch(&self, session_id: &str) -> AppResult<()> {
        self.cas_update(session_id, |record| {
            record.last_seen_at = Utc::now();
        })
    }

    /// `rotate(sessionId) -> newSessionId`, used after a privilege change.
    /// The old session is revoked atomically with the new one's creation so
    /// there is never a window where both are simultaneously valid.
    pub fn rotate(&self, session_id: &str) -> AppResult<SessionRecord> {
        let Some(mut entry) = self.records.get_mut(session_id) else {
            return Err(AppError::not_found("session not found"));
        };
        if entry.revoked {
            return Err(AppError::not_found("session not found"));
        }
        entry.revoked = true;
        let principal_id = entry.principal_id.clone();
        let fingerprint_hash = entry.fingerprint_hash.clone();
        drop(entry);

        let now = Utc::now();
        let new_record = SessionRecord {
            session_id: Uuid::new_v4().to_string(),
            principal_id,
            issued_at: now,
            last_seen_at: now,
            absolute_expiry: now + chrono::Duration::from_std(self.absolute_ttl).unwrap(),
            fingerprint_hash,
            flags: Vec::new(),
            revoked: false,
            version: 0,
        };
        self.records.insert(new_record.session_id.clone(), new_record.clone());
        Ok(new_record)
    }

    pub fn revoke(&self, session_id: &str) {
        if let Some(mut entry) = self.records.get_mut(session_id) {
            entry.revoked = true;
        }
    }

    pub fn revoke_all_for(&self, principal_id: &str) -> usize {
        let mut count = 0;
        for mut entry in self.records.iter_mut() {
            if entry.principal_id == principal_id && !entry.revoked {
                entry.revoked = true;
                count += 1;
            }
        }
        count
    }

    /// Load-mutate-CAS write, retried up to [`MAX_CAS_ATTEMPTS`] times
    /// before giving up with `conflict`. Implemented in-process with a
    /// version check rather than a real network round trip, but the shape
    /// matches what a `redis` `WATCH`/`MULTI` or `SET ... XX` loop would do.
    fn cas_update(&self, session_id: &str, mutate: impl Fn(&mut SessionRecord)) -> AppResult<()> {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let expected_version = match self.records.get(session_id) {
                Some(entry) => entry.version,
                None => return Err(AppError::not_found("session not found")),
            };

            let mut entry = match self.records.get_mut(session_id) {
                Some(entry) => entry,
                None => return Err(AppError::not_found("session not found")),
            };
            if entry.version != expected_version {
                continue; // lost the race, retry
            }
            mutate(&mut entry);
            entry.version += 1;
            return Ok(());
        }
        Err(AppError::conflict("session update lost the compare-and-set race"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SessionStore {
        SessionStore::new(Duration::from_secs(3600), Duration::from_secs(900))
    }

    #[test]
    fn create_then_load_round_trips() {
        let store = store();
        let created = store.create("user-1", "fp-a");
        let loaded = store.load_verified(&created.session_id, "fp-a").unwrap();
        assert_eq!(loaded.principal_id, "user-1");
    }

    #[test]
    fn fingerprint_mismatch_revokes_and_denies() {
        let store = store();
        let created = store.create("user-1", "fp-a");

        let err = store.load_verified(&created.session_id, "fp-b").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Unauthorized);

        // Session is now revoked even against the original fingerprint.
        let err2 = store.load_verified(&created.session_id, "fp-a").unwrap_err();
        assert_eq!(err2.kind(), crate::error::ErrorKind::NotFound);
    }

    #[test]
    fn revoke_all_for_revokes_every_session_of_a_principal() {
        let store = store();
        let a = store.create("user-1", "fp-a");
        let b = store.create("user-1", "fp-b");
        let other = store.create("user-2", "fp-c");

        let count = store.revoke_all_for("user-1");
        assert_eq!(count, 2);
        assert!(matches!(store.load(&a.session_id), LoadOutcome::Unknown));
        assert!(matches!(store.load(&b.session_id), LoadOutcome::Unknown));
        assert!(matches!(store.load(&other.session_id), LoadOutcome::Active(_)));
    }

    #[test]
    fn rotate_invalidates_the_old_session_id() {
        let store = store();
        let created = store.create("user-1", "fp-a");
        let rotated = store.rotate(&created.session_id).unwrap();

        assert_ne!(rotated.session_id, created.session_id);
        assert!(matches!(store.load(&created.session_id), LoadOutcome::Unknown));
        assert!(matches!(store.load(&rotated.session_id), LoadOutcome::Active(_)));
    }

    #[test]
    fn touch_updates_last_seen_without_changing_identity() {
        let store = store();
        let created = store.create("user-1", "fp-a");
        store.touch(&created.session_id).unwrap();
        let loaded = store.load_verified(&created.session_id, "fp-a").unwrap();
        assert!(loaded.last_seen_at >= created.last_seen_at);
    }

    #[test]
    fn idle_expiry_is_enforced() {
        let store = SessionStore::new(Duration::from_secs(3600), Duration::from_millis(1));
        let created = store.create("user-1", "fp-a");
        std::thread::sleep(Duration::from_millis(20));
        assert!(matches!(store.load(&created.session_id), LoadOutcome::Expired));
    }
}
