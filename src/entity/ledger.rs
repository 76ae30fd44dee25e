//! Version ledger rules.
//!
//! A cluster of records shares one version: the one stored on its master.
//! Mastered records never keep a version of their own; they read the
//! master's version on demand and cache it until the record is rebuilt.
//!
//! Master resolution is deliberately limited to two hops: a record's master,
//! then that master's master. Deeper chains are not followed.

use crate::entity::{EntityRecord, VersionToken};
use log::{debug, trace};

impl EntityRecord {
    /// The record whose version governs this one.
    ///
    /// A self-master returns itself. A mastered record returns its master
    /// when that master is its own master, otherwise the master's master.
    /// `None` when the chain has not been loaded.
    pub fn master_entity(&self) -> Option<&EntityRecord> {
        if !self.is_mastered() {
            return Some(self);
        }
        let master = self.master.as_deref()?;
        if master.is_mastered() {
            master.master.as_deref()
        } else {
            Some(master)
        }
    }

    /// The governing master's key, memoized on first successful resolution.
    pub fn master_entity_id(&mut self) -> Option<String> {
        if let Some(id) = &self.ledger.master_entity_id {
            return Some(id.clone());
        }
        let resolved = self.master_entity().and_then(EntityRecord::entity_id);
        self.ledger.master_entity_id = resolved.clone();
        resolved
    }

    /// The memoized master key without attempting resolution.
    pub fn cached_master_entity_id(&self) -> Option<&str> {
        self.ledger.master_entity_id.as_deref()
    }

    /// The token held in this record's own version column.
    pub fn own_version(&self) -> Option<VersionToken> {
        let column = self.entity_type.version_field()?;
        VersionToken::from_json(self.get(column)).ok().flatten()
    }

    /// The version this record claims, ignoring whether version control is on.
    fn claimed_version(&self) -> Option<VersionToken> {
        self.ledger
            .version
            .or_else(|| self.master_entity().and_then(EntityRecord::own_version))
    }

    /// The record's version, or `None` when version control is off, meaning
    /// it may be overwritten unconditionally.
    pub fn version(&self) -> Option<VersionToken> {
        if !self.controls.version_control {
            return None;
        }
        self.claimed_version()
    }

    /// Like [`version`](Self::version) but caches a version read from the master.
    pub fn resolve_version(&mut self) -> Option<VersionToken> {
        if !self.controls.version_control {
            return None;
        }
        if self.ledger.version.is_none() {
            self.ledger.version = self.master_entity().and_then(EntityRecord::own_version);
        }
        self.ledger.version
    }

    pub fn currency(&self) -> Option<VersionToken> {
        self.ledger.currency
    }

    /// Stamp the record as read now.
    pub fn reset_currency(&mut self) {
        self.ledger.currency = Some(VersionToken::now());
    }

    /// Exact-token comparison against the reference copy.
    ///
    /// Only the token the caller sent counts: a record without one is stale
    /// whenever the reference has a version.
    pub fn check_version(&self) -> bool {
        if !self.controls.version_control {
            return true;
        }

        let Some(reference) = self.reference.as_deref() else {
            // Only a brand-new master has nothing to compare against.
            return !self.is_mastered() && self.id().is_none();
        };

        let Some(current) = reference.version() else {
            return true;
        };

        let mine = self.ledger.version;
        debug!(
            "{} version check: mine={:?} current={}",
            self.entity_type.name(),
            mine.map(|token| token.to_string()),
            current
        );
        mine == Some(current)
    }

    /// "Not after" comparison of the read timestamp against the reference
    /// copy's master version.
    ///
    /// The master's stored version is used even when version control is off,
    /// so a currency-only configuration still rejects reads older than the
    /// cluster's last write.
    pub fn check_currency(&self) -> bool {
        if !self.controls.currency_control {
            return true;
        }

        if self.ledger.currency.is_none() && self.id().is_none() {
            return true;
        }

        let Some(reference) = self.reference.as_deref() else {
            return !self.is_mastered() && self.id().is_none();
        };

        let Some(current) = reference.claimed_version() else {
            return true;
        };

        debug!(
            "{} currency check: mine={:?} current={}",
            self.entity_type.name(),
            self.ledger.currency.map(|token| token.to_string()),
            current
        );
        self.ledger
            .currency
            .is_some_and(|read_at| current.is_not_after(&read_at))
    }

    /// Currency first, then version. Both pass trivially when disabled.
    pub fn is_current(&mut self) -> bool {
        self.master_entity_id();
        self.check_currency() && self.check_version()
    }

    /// Re-derive master key, version and currency from loaded state.
    ///
    /// For mastered records `set_master` controls whether the master is
    /// consulted at all; masters always derive from themselves.
    pub fn set_master_and_version(&mut self, set_master: bool) {
        trace!("set_master_and_version for {}", self.entity_type.name());
        self.ledger = Default::default();

        if !self.is_mastered() || set_master {
            self.master_entity_id();
            self.resolve_version();
        }

        if self.controls.currency_control {
            self.reset_currency();
        }
    }
}
