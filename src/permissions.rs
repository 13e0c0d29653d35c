//! Standing approvals for command kinds.
//!
//! A [`PermissionSet`] records which [`CommandKind`]s the user has approved
//! with "always allow". It only grows through [`PermissionSet::grant`]; the
//! one way to shrink it is a wholesale [`PermissionSet::reset`].
//!
//! ## Live permission set
//!
//! [`SharedPermissionSet`] is an `Arc<Mutex<PermissionSet>>` so the
//! authorization gate and the CLI's `permissions` command observe the same
//! grants. Persistence goes through [`crate::storage::StateStore`] after every
//! mutation.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::directive::CommandKind;

/// A thread-safe, live-view permission set.
pub type SharedPermissionSet = Arc<Mutex<PermissionSet>>;

/// Set of command kinds with standing approval. Empty by default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionSet {
    granted: BTreeSet<CommandKind>,
}

impl PermissionSet {
    /// Whether `kind` has standing approval.
    pub fn is_granted(&self, kind: CommandKind) -> bool {
        self.granted.contains(&kind)
    }

    /// Add a standing approval. Returns `true` if the set changed.
    pub fn grant(&mut self, kind: CommandKind) -> bool {
        self.granted.insert(kind)
    }

    /// Forget every standing approval.
    pub fn reset(&mut self) {
        self.granted.clear();
    }

    /// All granted kinds, in stable order.
    pub fn all_granted(&self) -> Vec<CommandKind> {
        self.granted.iter().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.granted.is_empty()
    }

    /// Wrap in `Arc<Mutex<_>>` for sharing.
    #[must_use]
    pub fn into_shared(self) -> SharedPermissionSet {
        Arc::new(Mutex::new(self))
    }
}

impl FromIterator<CommandKind> for PermissionSet {
    fn from_iter<T: IntoIterator<Item = CommandKind>>(iter: T) -> Self {
        Self {
            granted: iter.into_iter().collect(),
        }
    }
}
