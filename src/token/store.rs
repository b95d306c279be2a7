//! Credential Store
//!
//! In-memory cache of one entry per credential kind. Pure data, no I/O and no
//! locking; the provider serializes access.

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::types::{CredentialKind, TokenCacheEntry};

/// Cache of the three credential kinds.
#[derive(Debug, Default)]
pub struct CredentialStore {
    entries: HashMap<CredentialKind, TokenCacheEntry>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached token for `kind`, if present and unexpired.
    pub fn get(&self, kind: CredentialKind) -> Option<String> {
        self.get_at(kind, Utc::now())
    }

    /// Cached token for `kind` as of `now`.
    pub fn get_at(&self, kind: CredentialKind, now: DateTime<Utc>) -> Option<String> {
        self.entries
            .get(&kind)
            .filter(|entry| entry.is_valid_at(now))
            .map(TokenCacheEntry::expose)
    }

    /// Cache `token` for `kind`, replacing any previous entry.
    pub fn put(&mut self, kind: CredentialKind, token: impl Into<String>, lifetime_secs: u64) -> &TokenCacheEntry {
        self.put_entry(kind, TokenCacheEntry::from_lifetime(token, lifetime_secs, Utc::now()))
    }

    /// Cache an entry with an explicit expiry.
    pub fn put_entry(&mut self, kind: CredentialKind, entry: TokenCacheEntry) -> &TokenCacheEntry {
        self.entries.insert(kind, entry);
        &self.entries[&kind]
    }

    /// Drop the entry for `kind`. Returns whether one existed.
    pub fn invalidate(&mut self, kind: CredentialKind) -> bool {
        self.entries.remove(&kind).is_some()
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Raw entry for `kind`, expired or not.
    pub fn entry(&self, kind: CredentialKind) -> Option<&TokenCacheEntry> {
        self.entries.get(&kind)
    }
}
