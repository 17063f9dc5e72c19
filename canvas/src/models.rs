//! Auxiliary projections derived from the confirmed command stream.
//!
//! These track presence, layer structure, animation timeline and document
//! metadata for UI consumption. Each is rebuilt purely from commands, so a
//! resync that replays a snapshot reproduces them exactly.

#[cfg(test)]
#[path = "models_test.rs"]
mod models_test;

use std::collections::BTreeMap;

use commands::{Command, LayerId, MetadataField, Payload, UserId};
use serde::Serialize;

use crate::acl::AclState;
use crate::consts::DEFAULT_FRAMERATE;

// =============================================================
// User list
// =============================================================

/// One session participant, online or departed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub online: bool,
    pub is_operator: bool,
    pub is_trusted: bool,
    pub is_locked: bool,
}

/// Participant roster. Users who leave stay listed (offline) so their past
/// strokes remain attributable.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct UserList {
    users: Vec<User>,
}

impl UserList {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn users(&self) -> &[User] {
        &self.users
    }

    #[must_use]
    pub fn user(&self, id: UserId) -> Option<&User> {
        self.users.iter().find(|u| u.id == id)
    }

    /// Online users in join order.
    pub fn online(&self) -> impl Iterator<Item = &User> {
        self.users.iter().filter(|u| u.online)
    }

    /// Fold one confirmed command into the roster.
    pub fn apply(&mut self, command: &Command) {
        match &command.payload {
            Payload::Join { name } => {
                if let Some(user) = self.users.iter_mut().find(|u| u.id == command.user) {
                    user.online = true;
                    user.name = name.clone();
                } else {
                    self.users.push(User {
                        id: command.user,
                        name: name.clone(),
                        online: true,
                        is_operator: false,
                        is_trusted: false,
                        is_locked: false,
                    });
                }
            }
            Payload::Leave => {
                if let Some(user) = self.users.iter_mut().find(|u| u.id == command.user) {
                    user.online = false;
                }
            }
            Payload::SessionOwner { users } => {
                for user in &mut self.users {
                    user.is_operator = users.contains(&user.id);
                }
            }
            Payload::TrustedUsers { users } => {
                for user in &mut self.users {
                    user.is_trusted = users.contains(&user.id);
                }
            }
            Payload::UserLocks { users } => {
                for user in &mut self.users {
                    user.is_locked = users.contains(&user.id);
                }
            }
            _ => {}
        }
    }

    /// Refresh role flags from the ACL state, for users who joined after the
    /// grants were issued.
    pub fn sync_flags(&mut self, acl: &AclState) {
        for user in &mut self.users {
            user.is_operator = acl.is_operator(user.id);
            user.is_trusted = acl.is_trusted(user.id);
            user.is_locked = acl.is_locked(user.id);
        }
    }
}

// =============================================================
// Layer list
// =============================================================

/// UI-facing summary of one layer; no pixel data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayerInfo {
    pub id: LayerId,
    pub title: String,
    pub opacity: u8,
    pub hidden: bool,
}

/// Mirror of the layer stack for panels and pickers, bottom first.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct LayerList {
    layers: Vec<LayerInfo>,
}

impl LayerList {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn layers(&self) -> &[LayerInfo] {
        &self.layers
    }

    #[must_use]
    pub fn layer(&self, id: &LayerId) -> Option<&LayerInfo> {
        self.layers.iter().find(|l| l.id == *id)
    }

    pub fn apply(&mut self, command: &Command) {
        match &command.payload {
            Payload::LayerCreate { id, title, .. } => {
                if self.layer(id).is_none() {
                    self.layers.push(LayerInfo {
                        id: *id,
                        title: title.clone(),
                        opacity: 255,
                        hidden: false,
                    });
                }
            }
            Payload::LayerAttributes { id, opacity, hidden, .. } => {
                if let Some(info) = self.layers.iter_mut().find(|l| l.id == *id) {
                    info.opacity = *opacity;
                    info.hidden = *hidden;
                }
            }
            Payload::LayerRetitle { id, title } => {
                if let Some(info) = self.layers.iter_mut().find(|l| l.id == *id) {
                    info.title = title.clone();
                }
            }
            Payload::LayerOrder { order } => {
                let mut reordered = Vec::with_capacity(self.layers.len());
                for id in order {
                    if let Some(position) = self.layers.iter().position(|l| l.id == *id) {
                        reordered.push(self.layers.remove(position));
                    }
                }
                reordered.append(&mut self.layers);
                self.layers = reordered;
            }
            Payload::LayerDelete { id } => {
                self.layers.retain(|l| l.id != *id);
            }
            _ => {}
        }
    }
}

// =============================================================
// Timeline
// =============================================================

/// Animation frame assignments: frame index to visible layers.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Timeline {
    frames: BTreeMap<u16, Vec<LayerId>>,
}

impl Timeline {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn frames(&self) -> &BTreeMap<u16, Vec<LayerId>> {
        &self.frames
    }

    #[must_use]
    pub fn frame(&self, index: u16) -> Option<&[LayerId]> {
        self.frames.get(&index).map(Vec::as_slice)
    }

    pub fn apply(&mut self, command: &Command) {
        match &command.payload {
            Payload::SetTimelineFrame { frame, layers } => {
                self.frames.insert(*frame, layers.clone());
            }
            Payload::RemoveTimelineFrame { frame } => {
                self.frames.remove(frame);
            }
            Payload::LayerDelete { id } => {
                for layers in self.frames.values_mut() {
                    layers.retain(|layer| layer != id);
                }
            }
            _ => {}
        }
    }
}

// =============================================================
// Document metadata
// =============================================================

/// Session title, framerate and animation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentMetadata {
    pub title: String,
    pub framerate: i64,
    pub frame_count: i64,
    pub use_timeline: bool,
}

impl Default for DocumentMetadata {
    fn default() -> Self {
        Self {
            title: String::new(),
            framerate: DEFAULT_FRAMERATE,
            frame_count: 0,
            use_timeline: false,
        }
    }
}

impl DocumentMetadata {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a metadata payload. Returns whether the title changed, which is
    /// the only field with its own notification.
    pub fn apply(&mut self, command: &Command) -> bool {
        match &command.payload {
            Payload::SetTitle { title } => {
                if self.title == *title {
                    return false;
                }
                self.title = title.clone();
                true
            }
            Payload::SetMetadata { field, value } => {
                match field {
                    MetadataField::Framerate => self.framerate = *value,
                    MetadataField::FrameCount => self.frame_count = *value,
                    MetadataField::UseTimeline => self.use_timeline = *value != 0,
                }
                false
            }
            _ => false,
        }
    }
}
