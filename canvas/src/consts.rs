//! Shared numeric constants for the canvas engine.

/// Largest allowed canvas edge, in pixels. Resizes past this are structural
/// errors rather than allocation attempts.
pub const MAX_CANVAS_DIM: i32 = 16_384;

/// Default canvas background (opaque white, ARGB).
pub const DEFAULT_BACKGROUND: u32 = 0xFFFF_FFFF;

/// Fully opaque layer opacity.
pub const OPACITY_OPAQUE: u8 = 255;

/// Document framerate used until a metadata command sets one.
pub const DEFAULT_FRAMERATE: i64 = 24;
