//! Canvas document state: layers, raster content, selection, annotations.
//!
//! `CanvasState` is the authoritative value every participant converges on.
//! It is mutated exclusively by applying command payloads in stream order;
//! there is no other mutation path, which is what makes replay, snapshots and
//! fork reconciliation deterministic. Structural validation happens before
//! any mutation, so a failed command leaves the state exactly as it was.
//!
//! Layer content is a plain ARGB pixel buffer with write-only operations
//! (fill, square dab stamps, image blits). Compositing and rendering are the
//! external paint engine's job; this module only needs content to be
//! byte-comparable and deterministic.

#[cfg(test)]
#[path = "doc_test.rs"]
mod doc_test;

use commands::{AnnotationId, Blend, LayerId, Payload, Point, Rect};
use serde::Serialize;

use crate::consts::{DEFAULT_BACKGROUND, MAX_CANVAS_DIM, OPACITY_OPAQUE};

/// Canvas dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

impl Size {
    #[must_use]
    pub fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }
}

/// A command could not be applied because it references state that does not
/// exist or describes an impossible mutation. Structural errors halt the
/// batch they occur in; state already applied stays applied.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StructuralError {
    #[error("unknown layer {0}")]
    UnknownLayer(LayerId),
    #[error("duplicate layer id {0}")]
    DuplicateLayer(LayerId),
    #[error("unknown annotation {0}")]
    UnknownAnnotation(AnnotationId),
    #[error("duplicate annotation id {0}")]
    DuplicateAnnotation(AnnotationId),
    #[error("layer order must list every existing layer exactly once")]
    BadLayerOrder,
    #[error("resize would produce invalid canvas size {width}x{height}")]
    InvalidSize { width: i64, height: i64 },
    #[error("image data length {actual} does not match region size {expected}")]
    BadImageData { expected: usize, actual: usize },
    #[error("command {0} does not target canvas state")]
    NotCanvasCommand(&'static str),
}

/// One logical effect of applying a payload, used for change notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanvasEffect {
    /// A layer's content or attributes changed.
    LayerChanged(LayerId),
    /// The layer stack itself changed (create, delete, reorder).
    StructureChanged,
    /// The canvas was resized. Carries the old size and the content offset.
    Resized { old: Size, offset: Point },
    /// The selection region changed.
    SelectionChanged(Option<Rect>),
    /// The background color changed.
    BackgroundChanged,
    /// Annotations changed.
    AnnotationsChanged,
}

/// Deterministic ARGB raster content of one layer. Always sized to the
/// canvas; resizes rewrite every layer's buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerContent {
    width: i32,
    height: i32,
    pixels: Vec<u32>,
}

impl LayerContent {
    fn new(size: Size, fill: u32) -> Self {
        let width = size.width.max(0);
        let height = size.height.max(0);
        #[allow(clippy::cast_sign_loss)]
        let len = (width as usize) * (height as usize);
        Self { width, height, pixels: vec![fill; len] }
    }

    /// Pixel at `(x, y)`, or `None` outside the buffer.
    #[must_use]
    pub fn pixel(&self, x: i32, y: i32) -> Option<u32> {
        if x < 0 || y < 0 || x >= self.width || y >= self.height {
            return None;
        }
        #[allow(clippy::cast_sign_loss)]
        let index = (y as usize) * (self.width as usize) + (x as usize);
        self.pixels.get(index).copied()
    }

    /// Raw pixel buffer in row-major order.
    #[must_use]
    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    #[must_use]
    pub fn width(&self) -> i32 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> i32 {
        self.height
    }

    fn set_pixel(&mut self, x: i32, y: i32, color: u32) {
        if x < 0 || y < 0 || x >= self.width || y >= self.height {
            return;
        }
        #[allow(clippy::cast_sign_loss)]
        let index = (y as usize) * (self.width as usize) + (x as usize);
        self.pixels[index] = color;
    }

    fn fill_rect(&mut self, x: i32, y: i32, width: i32, height: i32, color: u32) {
        let x0 = x.max(0);
        let y0 = y.max(0);
        let x1 = x.saturating_add(width).min(self.width);
        let y1 = y.saturating_add(height).min(self.height);
        for py in y0..y1 {
            for px in x0..x1 {
                self.set_pixel(px, py, color);
            }
        }
    }

    fn stamp_dab(&mut self, center: Point, diameter: i32, color: u32) {
        let radius = diameter / 2;
        let x = center.x - radius;
        let y = center.y - radius;
        self.fill_rect(x, y, diameter, diameter, color);
    }

    fn put_image(&mut self, x: i32, y: i32, width: i32, height: i32, pixels: &[u32]) {
        for row in 0..height {
            for col in 0..width {
                #[allow(clippy::cast_sign_loss)]
                let index = (row as usize) * (width as usize) + (col as usize);
                self.set_pixel(x + col, y + row, pixels[index]);
            }
        }
    }

    /// The same content in a `size`-shaped buffer, with the old content
    /// anchored at `offset`.
    fn resized(&self, size: Size, offset: Point) -> Self {
        let mut out = Self::new(size, 0);
        for y in 0..self.height {
            for x in 0..self.width {
                if let Some(color) = self.pixel(x, y) {
                    out.set_pixel(x + offset.x, y + offset.y, color);
                }
            }
        }
        out
    }
}

/// One layer of the canvas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layer {
    pub id: LayerId,
    pub title: String,
    pub opacity: u8,
    pub blend: Blend,
    pub hidden: bool,
    content: LayerContent,
}

impl Layer {
    /// The layer's raster content.
    #[must_use]
    pub fn content(&self) -> &LayerContent {
        &self.content
    }
}

/// A text annotation floating above the canvas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    pub id: AnnotationId,
    pub rect: Rect,
    pub text: String,
    pub background: u32,
}

/// The authoritative canvas document.
///
/// Owns the layer stack, the selection region, annotations, the document
/// size, background and pinned message. Equality is full value equality,
/// which the determinism and snapshot-fidelity tests rely on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanvasState {
    /// Stack order; index 0 is the bottom layer.
    layers: Vec<Layer>,
    /// Layer ids in creation order, pruned on delete. Snapshots re-create
    /// layers in this order so replay reproduces it.
    creation_order: Vec<LayerId>,
    annotations: Vec<Annotation>,
    selection: Option<Rect>,
    size: Size,
    background: u32,
    pinned_message: String,
}

impl Default for CanvasState {
    fn default() -> Self {
        Self::new()
    }
}

impl CanvasState {
    /// An empty 0x0 canvas with no layers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            layers: Vec::new(),
            creation_order: Vec::new(),
            annotations: Vec::new(),
            selection: None,
            size: Size::default(),
            background: DEFAULT_BACKGROUND,
            pinned_message: String::new(),
        }
    }

    /// A blank canvas of the given size and background, with no layers.
    #[must_use]
    pub fn blank(size: Size, background: u32) -> Self {
        let mut state = Self::new();
        state.size = Size::new(size.width.max(0), size.height.max(0));
        state.background = background;
        state
    }

    #[must_use]
    pub fn size(&self) -> Size {
        self.size
    }

    #[must_use]
    pub fn background(&self) -> u32 {
        self.background
    }

    #[must_use]
    pub fn selection(&self) -> Option<Rect> {
        self.selection
    }

    #[must_use]
    pub fn pinned_message(&self) -> &str {
        &self.pinned_message
    }

    /// Replace the pinned message. Returns whether it changed.
    pub fn set_pinned_message(&mut self, message: &str) -> bool {
        if self.pinned_message == message {
            return false;
        }
        self.pinned_message = message.to_owned();
        true
    }

    /// Layers in stack order, bottom first.
    #[must_use]
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    #[must_use]
    pub fn layer(&self, id: &LayerId) -> Option<&Layer> {
        self.layers.iter().find(|l| l.id == *id)
    }

    /// Layer ids in original creation order.
    #[must_use]
    pub fn creation_order(&self) -> &[LayerId] {
        &self.creation_order
    }

    /// Annotations in creation order.
    #[must_use]
    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    #[must_use]
    pub fn annotation(&self, id: &AnnotationId) -> Option<&Annotation> {
        self.annotations.iter().find(|a| a.id == *id)
    }

    /// Apply one canvas-mutating payload.
    ///
    /// Validation happens before mutation: on error the state is untouched
    /// by this payload. Effects are returned for notification coalescing.
    ///
    /// # Errors
    ///
    /// Returns a [`StructuralError`] for unknown/duplicate ids, impossible
    /// sizes, mismatched image data, or a payload that does not target
    /// canvas state at all.
    pub fn apply(&mut self, payload: &Payload) -> Result<Vec<CanvasEffect>, StructuralError> {
        match payload {
            Payload::Resize { top, right, bottom, left } => {
                self.resize(*top, *right, *bottom, *left)
            }
            Payload::CanvasBackground { color } => {
                self.background = *color;
                Ok(vec![CanvasEffect::BackgroundChanged])
            }
            Payload::LayerCreate { id, title, fill } => self.create_layer(*id, title, *fill),
            Payload::LayerAttributes { id, opacity, blend, hidden } => {
                let layer = self.layer_mut(id)?;
                layer.opacity = *opacity;
                layer.blend = *blend;
                layer.hidden = *hidden;
                Ok(vec![CanvasEffect::LayerChanged(*id)])
            }
            Payload::LayerRetitle { id, title } => {
                let layer = self.layer_mut(id)?;
                layer.title = title.clone();
                Ok(vec![CanvasEffect::LayerChanged(*id)])
            }
            Payload::LayerOrder { order } => self.reorder_layers(order),
            Payload::LayerDelete { id } => {
                if self.layer(id).is_none() {
                    return Err(StructuralError::UnknownLayer(*id));
                }
                self.layers.retain(|l| l.id != *id);
                self.creation_order.retain(|existing| existing != id);
                Ok(vec![CanvasEffect::StructureChanged])
            }
            Payload::PutImage { layer, x, y, width, height, pixels } => {
                let expected = region_len(*width, *height);
                if pixels.len() != expected {
                    return Err(StructuralError::BadImageData {
                        expected,
                        actual: pixels.len(),
                    });
                }
                let target = self.layer_mut(layer)?;
                target.content.put_image(*x, *y, *width, *height, pixels);
                Ok(vec![CanvasEffect::LayerChanged(*layer)])
            }
            Payload::DrawDabs { layer, color, diameter, points } => {
                let target = self.layer_mut(layer)?;
                for point in points {
                    target.content.stamp_dab(*point, i32::from(*diameter), *color);
                }
                Ok(vec![CanvasEffect::LayerChanged(*layer)])
            }
            Payload::FillRect { layer, x, y, width, height, color } => {
                let target = self.layer_mut(layer)?;
                target.content.fill_rect(*x, *y, *width, *height, *color);
                Ok(vec![CanvasEffect::LayerChanged(*layer)])
            }
            Payload::SetSelection { rect } => {
                self.selection = *rect;
                Ok(vec![CanvasEffect::SelectionChanged(*rect)])
            }
            Payload::AnnotationCreate { id, rect } => {
                if self.annotation(id).is_some() {
                    return Err(StructuralError::DuplicateAnnotation(*id));
                }
                self.annotations.push(Annotation {
                    id: *id,
                    rect: *rect,
                    text: String::new(),
                    background: 0,
                });
                Ok(vec![CanvasEffect::AnnotationsChanged])
            }
            Payload::AnnotationReshape { id, rect } => {
                let annotation = self.annotation_mut(id)?;
                annotation.rect = *rect;
                Ok(vec![CanvasEffect::AnnotationsChanged])
            }
            Payload::AnnotationEdit { id, text, background } => {
                let annotation = self.annotation_mut(id)?;
                annotation.text = text.clone();
                annotation.background = *background;
                Ok(vec![CanvasEffect::AnnotationsChanged])
            }
            Payload::AnnotationDelete { id } => {
                if self.annotation(id).is_none() {
                    return Err(StructuralError::UnknownAnnotation(*id));
                }
                self.annotations.retain(|a| a.id != *id);
                Ok(vec![CanvasEffect::AnnotationsChanged])
            }
            other => Err(StructuralError::NotCanvasCommand(other.name())),
        }
    }

    fn layer_mut(&mut self, id: &LayerId) -> Result<&mut Layer, StructuralError> {
        self.layers
            .iter_mut()
            .find(|l| l.id == *id)
            .ok_or(StructuralError::UnknownLayer(*id))
    }

    fn annotation_mut(&mut self, id: &AnnotationId) -> Result<&mut Annotation, StructuralError> {
        self.annotations
            .iter_mut()
            .find(|a| a.id == *id)
            .ok_or(StructuralError::UnknownAnnotation(*id))
    }

    fn create_layer(
        &mut self,
        id: LayerId,
        title: &str,
        fill: Option<u32>,
    ) -> Result<Vec<CanvasEffect>, StructuralError> {
        if self.layer(&id).is_some() {
            return Err(StructuralError::DuplicateLayer(id));
        }
        self.layers.push(Layer {
            id,
            title: title.to_owned(),
            opacity: OPACITY_OPAQUE,
            blend: Blend::Normal,
            hidden: false,
            content: LayerContent::new(self.size, fill.unwrap_or(0)),
        });
        self.creation_order.push(id);
        Ok(vec![CanvasEffect::StructureChanged, CanvasEffect::LayerChanged(id)])
    }

    fn reorder_layers(&mut self, order: &[LayerId]) -> Result<Vec<CanvasEffect>, StructuralError> {
        // Validate that `order` is an exact permutation before touching the
        // stack, so a bad order leaves it intact.
        if order.len() != self.layers.len() {
            return Err(StructuralError::BadLayerOrder);
        }
        for (position, id) in order.iter().enumerate() {
            if self.layer(id).is_none() || order[..position].contains(id) {
                return Err(StructuralError::BadLayerOrder);
            }
        }

        let mut reordered = Vec::with_capacity(order.len());
        for id in order {
            if let Some(position) = self.layers.iter().position(|l| l.id == *id) {
                reordered.push(self.layers.remove(position));
            }
        }
        self.layers = reordered;
        Ok(vec![CanvasEffect::StructureChanged])
    }

    fn resize(
        &mut self,
        top: i32,
        right: i32,
        bottom: i32,
        left: i32,
    ) -> Result<Vec<CanvasEffect>, StructuralError> {
        let new_width = i64::from(self.size.width) + i64::from(left) + i64::from(right);
        let new_height = i64::from(self.size.height) + i64::from(top) + i64::from(bottom);
        if new_width <= 0
            || new_height <= 0
            || new_width > i64::from(MAX_CANVAS_DIM)
            || new_height > i64::from(MAX_CANVAS_DIM)
        {
            return Err(StructuralError::InvalidSize { width: new_width, height: new_height });
        }

        let old = self.size;
        let offset = Point::new(left, top);
        #[allow(clippy::cast_possible_truncation)]
        let size = Size::new(new_width as i32, new_height as i32);
        self.size = size;
        for layer in &mut self.layers {
            layer.content = layer.content.resized(size, offset);
        }
        if let Some(rect) = &mut self.selection {
            rect.x += offset.x;
            rect.y += offset.y;
        }
        Ok(vec![CanvasEffect::Resized { old, offset }])
    }
}

fn region_len(width: i32, height: i32) -> usize {
    let width = usize::try_from(width).unwrap_or(0);
    let height = usize::try_from(height).unwrap_or(0);
    width * height
}
