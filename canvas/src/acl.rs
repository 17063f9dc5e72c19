//! Session access control: operator/trusted tiers, user locks, layer ACLs.
//!
//! The ACL layer gates commands before they reach canvas state. Denial is
//! soft (the command is skipped and reported), never a structural error.
//! Command 0 is reserved for the server itself and bypasses every check,
//! so snapshots and resync streams always apply cleanly.

#[cfg(test)]
#[path = "acl_test.rs"]
mod acl_test;

use std::collections::{BTreeMap, BTreeSet};

use commands::{Category, Command, LayerId, Payload, UserId, SERVER_USER};
use serde::Serialize;

/// Per-layer access restrictions.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct LayerAclEntry {
    /// Nobody but operators may draw on a locked layer.
    pub locked: bool,
    /// When non-empty, only these users (and operators) may draw here.
    pub exclusive: Vec<UserId>,
}

impl LayerAclEntry {
    /// Whether this entry carries no restrictions at all.
    #[must_use]
    pub fn is_default(&self) -> bool {
        !self.locked && self.exclusive.is_empty()
    }
}

/// The session's complete access-control state.
///
/// Derived from the confirmed command stream like every other projection,
/// so all participants agree on who may do what at each point in history.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct AclState {
    operators: BTreeSet<UserId>,
    trusted: BTreeSet<UserId>,
    locked_users: BTreeSet<UserId>,
    layers: BTreeMap<LayerId, LayerAclEntry>,
}

impl AclState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_operator(&self, user: UserId) -> bool {
        user == SERVER_USER || self.operators.contains(&user)
    }

    #[must_use]
    pub fn is_trusted(&self, user: UserId) -> bool {
        self.trusted.contains(&user)
    }

    #[must_use]
    pub fn is_locked(&self, user: UserId) -> bool {
        self.locked_users.contains(&user)
    }

    /// Session operators, in ascending user id order.
    #[must_use]
    pub fn operators(&self) -> &BTreeSet<UserId> {
        &self.operators
    }

    #[must_use]
    pub fn trusted(&self) -> &BTreeSet<UserId> {
        &self.trusted
    }

    #[must_use]
    pub fn locked_users(&self) -> &BTreeSet<UserId> {
        &self.locked_users
    }

    /// Layer restrictions, keyed by layer id in stable order.
    #[must_use]
    pub fn layer_entries(&self) -> &BTreeMap<LayerId, LayerAclEntry> {
        &self.layers
    }

    #[must_use]
    pub fn layer_entry(&self, layer: &LayerId) -> Option<&LayerAclEntry> {
        self.layers.get(layer)
    }

    /// Whether `user` may draw on `layer` under the current restrictions.
    #[must_use]
    pub fn layer_allows(&self, user: UserId, layer: &LayerId) -> bool {
        if self.is_operator(user) {
            return true;
        }
        match self.layers.get(layer) {
            Some(entry) if entry.locked => false,
            Some(entry) if !entry.exclusive.is_empty() => entry.exclusive.contains(&user),
            _ => true,
        }
    }

    /// Whether this command may be applied by its originating user.
    #[must_use]
    pub fn permits(&self, command: &Command) -> bool {
        if command.user == SERVER_USER {
            return true;
        }
        match &command.payload {
            // Presence and chat are never gated.
            Payload::Join { .. } | Payload::Leave | Payload::Chat { .. } => true,
            payload if payload.is_acl() => self.is_operator(command.user),
            payload => match payload.category() {
                Category::Structural => {
                    self.is_operator(command.user) || self.is_trusted(command.user)
                }
                Category::Content | Category::Cosmetic => {
                    if self.is_locked(command.user) {
                        return false;
                    }
                    match payload.target_layer() {
                        Some(layer) => self.layer_allows(command.user, &layer),
                        None => true,
                    }
                }
                Category::Access => self.is_operator(command.user),
            },
        }
    }

    /// Apply an access-control payload. Returns whether anything changed.
    pub fn apply(&mut self, payload: &Payload) -> bool {
        match payload {
            Payload::SessionOwner { users } => {
                let next: BTreeSet<UserId> = users.iter().copied().collect();
                let changed = next != self.operators;
                self.operators = next;
                changed
            }
            Payload::TrustedUsers { users } => {
                let next: BTreeSet<UserId> = users.iter().copied().collect();
                let changed = next != self.trusted;
                self.trusted = next;
                changed
            }
            Payload::UserLocks { users } => {
                let next: BTreeSet<UserId> = users.iter().copied().collect();
                let changed = next != self.locked_users;
                self.locked_users = next;
                changed
            }
            Payload::LayerAcl { layer, locked, exclusive } => {
                let entry = LayerAclEntry { locked: *locked, exclusive: exclusive.clone() };
                if entry.is_default() {
                    self.layers.remove(layer).is_some()
                } else {
                    let previous = self.layers.insert(*layer, entry.clone());
                    previous.as_ref() != Some(&entry)
                }
            }
            _ => false,
        }
    }

    /// Drop restrictions for a layer that no longer exists.
    pub fn forget_layer(&mut self, layer: &LayerId) {
        self.layers.remove(layer);
    }
}
