//! Collaborative canvas engine: the session state machine behind a drawing
//! client.
//!
//! The engine ingests the session's confirmed command stream, maintains the
//! authoritative canvas plus a speculative fork of the local user's
//! unconfirmed edits, reconciles that fork as confirmations arrive, and can
//! emit a snapshot command stream that reproduces the whole state for late
//! joiners. Recording and deterministic playback ride on the same command
//! path.
//!
//! Module map:
//!
//! - [`engine`] — [`CanvasEngine`], the orchestrator everything else serves
//! - [`doc`] — [`CanvasState`], layers, annotations, raster content
//! - [`acl`] — operator/trusted tiers, user locks, per-layer restrictions
//! - [`models`] — user list, layer list, timeline and metadata projections
//! - [`fork`] — the local prediction queue and its checkpoint
//! - [`snapshot`] — full-state snapshot generation and amendment
//! - [`event`] — coalesced change notifications
//! - [`consts`] — shared limits and defaults

pub mod acl;
pub mod consts;
pub mod doc;
pub mod engine;
pub mod event;
pub mod fork;
pub mod models;
pub mod snapshot;

pub use acl::{AclState, LayerAclEntry};
pub use doc::{Annotation, CanvasEffect, CanvasState, Layer, LayerContent, Size, StructuralError};
pub use engine::{
    BatchFailure, BatchOutcome, CanvasEngine, EngineConfig, PlaybackProgress,
};
pub use event::{Event, EventQueue};
pub use fork::{ForkEntry, ForkEntryState, LocalFork};
pub use models::{DocumentMetadata, LayerInfo, LayerList, Timeline, User, UserList};
pub use snapshot::{amend_snapshot_metadata, generate_snapshot, AclMask};
