//! Snapshot generation: a command stream that rebuilds the current state.
//!
//! Used for late-joiner resync and for recording headers. The snapshot is an
//! ordinary command sequence issued by the server user, so applying it
//! through the normal pipeline on a blank engine reproduces the source state
//! exactly. Phase order matters: presence, then structure, then content,
//! then access control, then cosmetics, so every command lands on state
//! that can already accept it.

#[cfg(test)]
#[path = "snapshot_test.rs"]
mod snapshot_test;

use commands::{Command, MetadataField, Payload, SERVER_USER};

use crate::acl::AclState;
use crate::consts::DEFAULT_FRAMERATE;
use crate::doc::CanvasState;
use crate::models::{DocumentMetadata, Timeline, UserList};

/// Which access-control state a snapshot carries.
///
/// A resync for an untrusted viewer can omit the session roles while still
/// shipping the full canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AclMask {
    /// Operator and trusted sets.
    pub session: bool,
    /// Per-layer locks and exclusivity.
    pub layers: bool,
    /// User lock set.
    pub users: bool,
}

impl AclMask {
    /// Carry everything.
    pub const ALL: Self = Self { session: true, layers: true, users: true };
    /// Carry no access-control state.
    pub const NONE: Self = Self { session: false, layers: false, users: false };
}

/// Build the command stream that reproduces the given state on a blank
/// canvas.
///
/// `include_pinned_message` controls whether the pinned chat message ships
/// with the snapshot; a resync for a viewer who should not see session chat
/// passes `false`.
#[must_use]
pub fn generate_snapshot(
    doc: &CanvasState,
    acl: &AclState,
    users: &UserList,
    timeline: &Timeline,
    metadata: &DocumentMetadata,
    include_pinned_message: bool,
    mask: AclMask,
) -> Vec<Command> {
    let mut out = Vec::new();
    let server = |payload| Command::new(SERVER_USER, payload);

    // Presence first, so later per-user state refers to known users.
    for user in users.online() {
        out.push(Command::new(user.id, Payload::Join { name: user.name.clone() }));
    }

    // Structure.
    let size = doc.size();
    if !size.is_empty() {
        out.push(server(Payload::Resize {
            top: 0,
            right: size.width,
            bottom: size.height,
            left: 0,
        }));
    }
    out.push(server(Payload::CanvasBackground { color: doc.background() }));
    for id in doc.creation_order() {
        if let Some(layer) = doc.layer(id) {
            out.push(server(Payload::LayerCreate {
                id: *id,
                title: layer.title.clone(),
                fill: None,
            }));
        }
    }
    if doc.layers().len() > 1 {
        out.push(server(Payload::LayerOrder {
            order: doc.layers().iter().map(|l| l.id).collect(),
        }));
    }

    // Content, bottom layer first.
    for layer in doc.layers() {
        out.push(server(Payload::LayerAttributes {
            id: layer.id,
            opacity: layer.opacity,
            blend: layer.blend,
            hidden: layer.hidden,
        }));
        if !size.is_empty() {
            out.push(server(Payload::PutImage {
                layer: layer.id,
                x: 0,
                y: 0,
                width: size.width,
                height: size.height,
                pixels: layer.content().pixels().to_vec(),
            }));
        }
    }
    for annotation in doc.annotations() {
        out.push(server(Payload::AnnotationCreate {
            id: annotation.id,
            rect: annotation.rect,
        }));
        if !annotation.text.is_empty() || annotation.background != 0 {
            out.push(server(Payload::AnnotationEdit {
                id: annotation.id,
                text: annotation.text.clone(),
                background: annotation.background,
            }));
        }
    }
    if let Some(rect) = doc.selection() {
        out.push(server(Payload::SetSelection { rect: Some(rect) }));
    }

    // Access control, filtered by the mask.
    if mask.session {
        if !acl.operators().is_empty() {
            out.push(server(Payload::SessionOwner {
                users: acl.operators().iter().copied().collect(),
            }));
        }
        if !acl.trusted().is_empty() {
            out.push(server(Payload::TrustedUsers {
                users: acl.trusted().iter().copied().collect(),
            }));
        }
    }
    if mask.users && !acl.locked_users().is_empty() {
        out.push(server(Payload::UserLocks {
            users: acl.locked_users().iter().copied().collect(),
        }));
    }
    if mask.layers {
        for (layer, entry) in acl.layer_entries() {
            out.push(server(Payload::LayerAcl {
                layer: *layer,
                locked: entry.locked,
                exclusive: entry.exclusive.clone(),
            }));
        }
    }

    // Cosmetics.
    if !metadata.title.is_empty() {
        out.push(server(Payload::SetTitle { title: metadata.title.clone() }));
    }
    if metadata.framerate != DEFAULT_FRAMERATE {
        out.push(server(Payload::SetMetadata {
            field: MetadataField::Framerate,
            value: metadata.framerate,
        }));
    }
    if metadata.frame_count != 0 {
        out.push(server(Payload::SetMetadata {
            field: MetadataField::FrameCount,
            value: metadata.frame_count,
        }));
    }
    if metadata.use_timeline {
        out.push(server(Payload::SetMetadata { field: MetadataField::UseTimeline, value: 1 }));
    }
    for (frame, layers) in timeline.frames() {
        out.push(server(Payload::SetTimelineFrame { frame: *frame, layers: layers.clone() }));
    }
    if include_pinned_message && !doc.pinned_message().is_empty() {
        out.push(server(Payload::Chat {
            message: doc.pinned_message().to_owned(),
            recipient: None,
            pin: true,
        }));
    }

    out
}

/// Bring the cosmetic tail of an already generated snapshot up to date with
/// `metadata`, rewriting matching commands in place or appending new ones.
pub fn amend_snapshot_metadata(snapshot: &mut Vec<Command>, metadata: &DocumentMetadata) {
    upsert(snapshot, metadata.title.is_empty(), Payload::SetTitle {
        title: metadata.title.clone(),
    });
    upsert(
        snapshot,
        metadata.framerate == DEFAULT_FRAMERATE,
        Payload::SetMetadata { field: MetadataField::Framerate, value: metadata.framerate },
    );
    upsert(
        snapshot,
        metadata.frame_count == 0,
        Payload::SetMetadata { field: MetadataField::FrameCount, value: metadata.frame_count },
    );
    upsert(
        snapshot,
        !metadata.use_timeline,
        Payload::SetMetadata {
            field: MetadataField::UseTimeline,
            value: i64::from(metadata.use_timeline),
        },
    );
}

fn upsert(snapshot: &mut Vec<Command>, is_default: bool, payload: Payload) {
    let position = snapshot.iter().position(|cmd| matches_slot(&cmd.payload, &payload));
    match (position, is_default) {
        (Some(index), true) => {
            snapshot.remove(index);
        }
        (Some(index), false) => {
            snapshot[index] = Command::new(SERVER_USER, payload);
        }
        (None, true) => {}
        (None, false) => snapshot.push(Command::new(SERVER_USER, payload)),
    }
}

fn matches_slot(existing: &Payload, replacement: &Payload) -> bool {
    match (existing, replacement) {
        (Payload::SetTitle { .. }, Payload::SetTitle { .. }) => true,
        (
            Payload::SetMetadata { field: a, .. },
            Payload::SetMetadata { field: b, .. },
        ) => a == b,
        _ => false,
    }
}
