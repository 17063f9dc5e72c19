//! Shared command model and binary codec for the easel canvas engine.
//!
//! This crate owns the one representation every other crate agrees on: the
//! [`Command`] — an immutable, typed unit of canvas mutation or session
//! meta-information. Commands flow in from the session transport, through the
//! engine's apply path, into recordings, and back out of snapshots; they are
//! the only way canvas state ever changes.
//!
//! Payloads are an exhaustive sum type ([`Payload`]) rather than an open
//! `Value` bag so every application site is compiler-checked when a new
//! command kind is added. The wire codec frames a command as a small protobuf
//! message whose payload body is serde_json-encoded, keeping the binary
//! framing compact while leaving the payload self-describing.

use prost::Message;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;

/// Session-scoped user identifier. Assigned by the session server.
pub type UserId = u8;

/// User id reserved for the session server itself. Commands originated by
/// the server bypass permission checks.
pub const SERVER_USER: UserId = 0;

/// Unique identifier for a canvas layer. Stable for the document lifetime.
pub type LayerId = Uuid;

/// Unique identifier for a text annotation.
pub type AnnotationId = Uuid;

/// Axis-aligned rectangle in canvas coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    #[must_use]
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }
}

/// A single point in canvas coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    #[must_use]
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Layer blend mode. Stored and forwarded only; compositing happens in the
/// external rendering engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Blend {
    Normal,
    Multiply,
    Screen,
    Overlay,
    Erase,
}

/// Integer document metadata fields settable via [`Payload::SetMetadata`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataField {
    Framerate,
    FrameCount,
    UseTimeline,
}

/// Ordering category used when emitting a snapshot. Later categories may
/// reference identifiers established by earlier ones, so replay order is
/// structural, then content, then access, then cosmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Category {
    Structural,
    Content,
    Access,
    Cosmetic,
}

/// The typed payload of a command.
///
/// Meta variants carry session information (presence, chat, access control,
/// document metadata); draw variants mutate layer content or canvas
/// structure. Dispatch is by exhaustive match everywhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Payload {
    // --- Meta ---
    /// A user joined the session.
    Join { name: String },
    /// The originating user left the session.
    Leave,
    /// Chat message. `pin: true` replaces the document's pinned message.
    Chat {
        message: String,
        recipient: Option<UserId>,
        pin: bool,
    },
    /// Replace the set of session operators.
    SessionOwner { users: Vec<UserId> },
    /// Replace the set of trusted users.
    TrustedUsers { users: Vec<UserId> },
    /// Replace the set of locked (draw-disabled) users.
    UserLocks { users: Vec<UserId> },
    /// Set lock state and exclusive-access list for one layer.
    LayerAcl {
        layer: LayerId,
        locked: bool,
        exclusive: Vec<UserId>,
    },
    /// Set the document title.
    SetTitle { title: String },
    /// Set one integer metadata field.
    SetMetadata { field: MetadataField, value: i64 },
    /// Assign the layers shown at a timeline frame.
    SetTimelineFrame { frame: u16, layers: Vec<LayerId> },
    /// Remove a timeline frame assignment.
    RemoveTimelineFrame { frame: u16 },
    /// Create a text annotation.
    AnnotationCreate { id: AnnotationId, rect: Rect },
    /// Move or resize an annotation.
    AnnotationReshape { id: AnnotationId, rect: Rect },
    /// Set an annotation's text and background color.
    AnnotationEdit {
        id: AnnotationId,
        text: String,
        background: u32,
    },
    /// Delete an annotation.
    AnnotationDelete { id: AnnotationId },
    /// Expand (or crop, with negative values) each canvas edge. Existing
    /// layer content stays anchored at the `(left, top)` offset.
    Resize {
        top: i32,
        right: i32,
        bottom: i32,
        left: i32,
    },

    // --- Draw ---
    /// Set the canvas background color (ARGB).
    CanvasBackground { color: u32 },
    /// Create a layer at the top of the stack.
    LayerCreate {
        id: LayerId,
        title: String,
        fill: Option<u32>,
    },
    /// Set a layer's attributes.
    LayerAttributes {
        id: LayerId,
        opacity: u8,
        blend: Blend,
        hidden: bool,
    },
    /// Rename a layer.
    LayerRetitle { id: LayerId, title: String },
    /// Reorder the layer stack. Must list every existing layer exactly once.
    LayerOrder { order: Vec<LayerId> },
    /// Delete a layer and its content.
    LayerDelete { id: LayerId },
    /// Blit a rectangle of raw ARGB pixels onto a layer.
    PutImage {
        layer: LayerId,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
        pixels: Vec<u32>,
    },
    /// Stamp square dabs of a single color along a stroke path.
    DrawDabs {
        layer: LayerId,
        color: u32,
        diameter: u16,
        points: Vec<Point>,
    },
    /// Fill a rectangle on a layer with a single color.
    FillRect {
        layer: LayerId,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
        color: u32,
    },
    /// Replace the selection region. `None` clears it.
    SetSelection { rect: Option<Rect> },
}

impl Payload {
    /// Short stable name for logging and rejection reporting.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Join { .. } => "join",
            Self::Leave => "leave",
            Self::Chat { .. } => "chat",
            Self::SessionOwner { .. } => "session_owner",
            Self::TrustedUsers { .. } => "trusted_users",
            Self::UserLocks { .. } => "user_locks",
            Self::LayerAcl { .. } => "layer_acl",
            Self::SetTitle { .. } => "set_title",
            Self::SetMetadata { .. } => "set_metadata",
            Self::SetTimelineFrame { .. } => "set_timeline_frame",
            Self::RemoveTimelineFrame { .. } => "remove_timeline_frame",
            Self::AnnotationCreate { .. } => "annotation_create",
            Self::AnnotationReshape { .. } => "annotation_reshape",
            Self::AnnotationEdit { .. } => "annotation_edit",
            Self::AnnotationDelete { .. } => "annotation_delete",
            Self::Resize { .. } => "resize",
            Self::CanvasBackground { .. } => "canvas_background",
            Self::LayerCreate { .. } => "layer_create",
            Self::LayerAttributes { .. } => "layer_attributes",
            Self::LayerRetitle { .. } => "layer_retitle",
            Self::LayerOrder { .. } => "layer_order",
            Self::LayerDelete { .. } => "layer_delete",
            Self::PutImage { .. } => "put_image",
            Self::DrawDabs { .. } => "draw_dabs",
            Self::FillRect { .. } => "fill_rect",
            Self::SetSelection { .. } => "set_selection",
        }
    }

    /// Whether this payload changes access control state.
    #[must_use]
    pub fn is_acl(&self) -> bool {
        matches!(
            self,
            Self::SessionOwner { .. }
                | Self::TrustedUsers { .. }
                | Self::UserLocks { .. }
                | Self::LayerAcl { .. }
        )
    }

    /// Whether this payload mutates canvas-owned data (layer content,
    /// structure, selection, annotations, size, background).
    ///
    /// Only these payloads are eligible for the local fork.
    #[must_use]
    pub fn affects_canvas(&self) -> bool {
        matches!(
            self,
            Self::Resize { .. }
                | Self::CanvasBackground { .. }
                | Self::LayerCreate { .. }
                | Self::LayerAttributes { .. }
                | Self::LayerRetitle { .. }
                | Self::LayerOrder { .. }
                | Self::LayerDelete { .. }
                | Self::PutImage { .. }
                | Self::DrawDabs { .. }
                | Self::FillRect { .. }
                | Self::SetSelection { .. }
                | Self::AnnotationCreate { .. }
                | Self::AnnotationReshape { .. }
                | Self::AnnotationEdit { .. }
                | Self::AnnotationDelete { .. }
        )
    }

    /// Snapshot replay ordering category for this payload.
    #[must_use]
    pub fn category(&self) -> Category {
        match self {
            Self::Resize { .. }
            | Self::CanvasBackground { .. }
            | Self::LayerCreate { .. }
            | Self::LayerOrder { .. }
            | Self::LayerDelete { .. } => Category::Structural,

            Self::LayerAttributes { .. }
            | Self::LayerRetitle { .. }
            | Self::PutImage { .. }
            | Self::DrawDabs { .. }
            | Self::FillRect { .. }
            | Self::SetSelection { .. }
            | Self::AnnotationCreate { .. }
            | Self::AnnotationReshape { .. }
            | Self::AnnotationEdit { .. }
            | Self::AnnotationDelete { .. } => Category::Content,

            Self::SessionOwner { .. }
            | Self::TrustedUsers { .. }
            | Self::UserLocks { .. }
            | Self::LayerAcl { .. } => Category::Access,

            Self::Join { .. }
            | Self::Leave
            | Self::Chat { .. }
            | Self::SetTitle { .. }
            | Self::SetMetadata { .. }
            | Self::SetTimelineFrame { .. }
            | Self::RemoveTimelineFrame { .. } => Category::Cosmetic,
        }
    }

    /// The layer whose content this payload writes to, if any.
    ///
    /// Used for per-layer access checks; structural layer commands (create,
    /// delete, reorder) are gated separately and return `None` here.
    #[must_use]
    pub fn target_layer(&self) -> Option<LayerId> {
        match self {
            Self::LayerAttributes { id, .. } | Self::LayerRetitle { id, .. } => Some(*id),
            Self::PutImage { layer, .. }
            | Self::DrawDabs { layer, .. }
            | Self::FillRect { layer, .. } => Some(*layer),
            _ => None,
        }
    }
}

/// An immutable, ordered unit of canvas or session mutation.
///
/// `seq` is the position in the authoritative stream, assigned by the
/// session server once the command is confirmed. Locally generated commands
/// carry `None` until then.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    /// Originating user.
    pub user: UserId,
    /// Authoritative stream position, once confirmed.
    pub seq: Option<u64>,
    /// The typed payload.
    pub payload: Payload,
}

impl Command {
    /// A not-yet-confirmed command from `user`.
    #[must_use]
    pub fn new(user: UserId, payload: Payload) -> Self {
        Self { user, seq: None, payload }
    }

    /// A confirmed command at stream position `seq`.
    #[must_use]
    pub fn confirmed(user: UserId, seq: u64, payload: Payload) -> Self {
        Self { user, seq: Some(seq), payload }
    }

    /// The same command stamped with a confirmed stream position.
    #[must_use]
    pub fn with_seq(mut self, seq: u64) -> Self {
        self.seq = Some(seq);
        self
    }
}

/// Error returned by [`decode_command`].
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The raw bytes could not be decoded as a protobuf `WireCommand`.
    #[error("failed to decode protobuf command: {0}")]
    Decode(#[from] prost::DecodeError),
    /// The `user` integer on the wire does not fit a session user id.
    #[error("user id out of range: {0}")]
    InvalidUser(u32),
    /// The payload body is not a valid JSON-encoded [`Payload`].
    #[error("malformed command payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Encode a command into protobuf bytes.
#[must_use]
pub fn encode_command(command: &Command) -> Vec<u8> {
    let wire = WireCommand {
        user: u32::from(command.user),
        seq: command.seq,
        // Payload is a closed enum of maps and scalars; serializing it to
        // JSON cannot fail.
        payload: serde_json::to_vec(&command.payload).unwrap_or_default(),
    };

    let mut out = Vec::with_capacity(wire.encoded_len());
    // Encoding into a growable Vec is infallible; the only prost error here
    // is `BufferTooSmall`, which cannot occur.
    wire.encode(&mut out).unwrap_or_default();
    out
}

/// Decode protobuf bytes into a command.
///
/// # Errors
///
/// Returns [`CodecError::Decode`] for malformed framing,
/// [`CodecError::InvalidUser`] for out-of-range user ids, and
/// [`CodecError::Payload`] for an unreadable payload body.
pub fn decode_command(bytes: &[u8]) -> Result<Command, CodecError> {
    let wire = WireCommand::decode(bytes)?;
    let user = UserId::try_from(wire.user).map_err(|_| CodecError::InvalidUser(wire.user))?;
    let payload: Payload = serde_json::from_slice(&wire.payload)?;
    Ok(Command { user, seq: wire.seq, payload })
}

#[derive(Clone, PartialEq, Message)]
struct WireCommand {
    #[prost(uint32, tag = "1")]
    user: u32,
    #[prost(uint64, optional, tag = "2")]
    seq: Option<u64>,
    #[prost(bytes = "vec", tag = "3")]
    payload: Vec<u8>,
}
