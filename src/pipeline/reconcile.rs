//! Reconciliation of remote, local and downloaded inventories.
//!
//! ```text
//! effective_local      = local ∪ downloaded
//! missing              = online − effective_local
//! new_since_last_cache = online − previously_cached
//! ```
//!
//! Only `missing` drives the ledger and the report to the user.
//! `new_since_last_cache` is informational and is never used in place of it.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

/// Inventories for one entity, all keyed by normalized title.
#[derive(Debug, Clone, Copy)]
pub struct ReconcileInput<'a> {
    /// Titles listed remotely
    pub online: &'a BTreeSet<String>,
    /// Titles held locally
    pub local: &'a HashSet<String>,
    /// Titles already handled by the download executor
    pub downloaded: &'a BTreeSet<String>,
    /// Titles the cache knew before this pass
    pub previously_cached: &'a BTreeSet<String>,
}

/// Result of a reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// Online titles neither held locally nor downloaded
    pub missing: BTreeSet<String>,
    /// Online titles the cache had not seen before
    pub new_since_last_cache: BTreeSet<String>,
}

impl Reconciliation {
    /// Check if anything needs to be acquired.
    pub fn has_missing(&self) -> bool {
        !self.missing.is_empty()
    }
}

/// Reconcile one entity's inventories.
pub fn reconcile(input: ReconcileInput<'_>) -> Reconciliation {
    let missing = input
        .online
        .iter()
        .filter(|title| !input.local.contains(*title) && !input.downloaded.contains(*title))
        .cloned()
        .collect();

    let new_since_last_cache = input
        .online
        .difference(input.previously_cached)
        .cloned()
        .collect();

    Reconciliation {
        missing,
        new_since_last_cache,
    }
}
