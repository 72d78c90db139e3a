use std::collections::HashSet;

use super::{PrivilegedUserStore, UserStoreError};

/// Immutable set of identities allowed to bypass quality control.
///
/// Built once from a delimited configuration string and shared behind an
/// `Arc` without locking.
#[derive(Debug, Clone, Default)]
pub struct AuthorizationRegistry {
    identities: HashSet<String>,
}

/// Outcome of persisting the registry into a user store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub active: usize,
    pub deactivated: usize,
}

impl AuthorizationRegistry {
    /// Parse a comma-delimited identity list.
    ///
    /// Tokens are trimmed. Empty tokens (including a trailing separator)
    /// are discarded, never an error.
    pub fn from_delimited(raw: &str) -> Self {
        let identities = raw
            .split(',')
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(String::from)
            .collect();
        Self { identities }
    }

    pub fn is_privileged(&self, identity: &str) -> bool {
        self.identities.contains(identity)
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    /// Sorted identities, for stable display.
    pub fn identities(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.identities.iter().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Persist the registry: listed identities become active, every other
    /// stored identity is deactivated.
    pub fn sync_to(&self, store: &dyn PrivilegedUserStore) -> Result<SyncReport, UserStoreError> {
        for identity in &self.identities {
            store.upsert_active(identity)?;
        }
        let keep: Vec<&str> = self.identities.iter().map(String::as_str).collect();
        let deactivated = store.deactivate_except(&keep)?;
        Ok(SyncReport {
            active: self.identities.len(),
            deactivated,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::SqlitePrivilegedUserStore;

    #[test]
    fn test_trailing_separator_is_ignored() {
        let registry = AuthorizationRegistry::from_delimited("alice,bob,");
        assert_eq!(registry.identities(), vec!["alice", "bob"]);
    }

    #[test]
    fn test_whitespace_and_empty_tokens() {
        let registry = AuthorizationRegistry::from_delimited(" alice , ,, bob ,   ");
        assert_eq!(registry.len(), 2);
        assert!(registry.is_privileged("alice"));
        assert!(registry.is_privileged("bob"));
        assert!(!registry.is_privileged(" alice "));
        assert!(!registry.is_privileged(""));
    }

    #[test]
    fn test_empty_string_yields_empty_registry() {
        let registry = AuthorizationRegistry::from_delimited("");
        assert!(registry.is_empty());
        assert!(!registry.is_privileged("anyone"));
    }

    #[test]
    fn test_duplicates_collapse() {
        let registry = AuthorizationRegistry::from_delimited("carol,carol, carol");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_sync_deactivates_removed_identities() {
        let store = SqlitePrivilegedUserStore::in_memory().unwrap();

        let first = AuthorizationRegistry::from_delimited("alice,bob");
        let report = first.sync_to(&store).unwrap();
        assert_eq!(report, SyncReport { active: 2, deactivated: 0 });

        let second = AuthorizationRegistry::from_delimited("bob");
        let report = second.sync_to(&store).unwrap();
        assert_eq!(report.deactivated, 1);

        let alice = store.get("alice").unwrap().unwrap();
        assert!(!alice.active);
        let bob = store.get("bob").unwrap().unwrap();
        assert!(bob.active);
    }
}
