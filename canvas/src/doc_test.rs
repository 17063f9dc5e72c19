use commands::{Blend, Payload, Point, Rect};
use uuid::Uuid;

use super::*;

fn layer_id(n: u8) -> LayerId {
    Uuid::from_bytes([n; 16])
}

fn annotation_id(n: u8) -> AnnotationId {
    Uuid::from_bytes([0xA0 + n; 16])
}

fn canvas_100x100() -> CanvasState {
    CanvasState::blank(Size::new(100, 100), DEFAULT_BACKGROUND)
}

fn create_layer(state: &mut CanvasState, n: u8) -> LayerId {
    let id = layer_id(n);
    state
        .apply(&Payload::LayerCreate { id, title: format!("layer {n}"), fill: None })
        .expect("create layer");
    id
}

// =============================================================
// Construction
// =============================================================

#[test]
fn new_canvas_is_empty() {
    let state = CanvasState::new();
    assert!(state.size().is_empty());
    assert!(state.layers().is_empty());
    assert!(state.annotations().is_empty());
    assert_eq!(state.selection(), None);
    assert_eq!(state.background(), DEFAULT_BACKGROUND);
    assert_eq!(state.pinned_message(), "");
}

#[test]
fn blank_canvas_has_size_but_no_layers() {
    let state = canvas_100x100();
    assert_eq!(state.size(), Size::new(100, 100));
    assert!(state.layers().is_empty());
}

// =============================================================
// Layer stack
// =============================================================

#[test]
fn create_layer_fills_with_color() {
    let mut state = canvas_100x100();
    let id = layer_id(1);
    let effects = state
        .apply(&Payload::LayerCreate { id, title: "bg".into(), fill: Some(0xFF11_2233) })
        .expect("create");
    assert_eq!(
        effects,
        vec![CanvasEffect::StructureChanged, CanvasEffect::LayerChanged(id)]
    );
    let layer = state.layer(&id).expect("layer");
    assert_eq!(layer.title, "bg");
    assert_eq!(layer.opacity, OPACITY_OPAQUE);
    assert_eq!(layer.blend, Blend::Normal);
    assert_eq!(layer.content().pixel(50, 50), Some(0xFF11_2233));
}

#[test]
fn duplicate_layer_id_is_rejected() {
    let mut state = canvas_100x100();
    let id = create_layer(&mut state, 1);
    let err = state
        .apply(&Payload::LayerCreate { id, title: "again".into(), fill: None })
        .expect_err("duplicate");
    assert_eq!(err, StructuralError::DuplicateLayer(id));
    assert_eq!(state.layers().len(), 1);
}

#[test]
fn layer_attributes_update_in_place() {
    let mut state = canvas_100x100();
    let id = create_layer(&mut state, 1);
    state
        .apply(&Payload::LayerAttributes { id, opacity: 128, blend: Blend::Multiply, hidden: true })
        .expect("attrs");
    let layer = state.layer(&id).expect("layer");
    assert_eq!(layer.opacity, 128);
    assert_eq!(layer.blend, Blend::Multiply);
    assert!(layer.hidden);
}

#[test]
fn unknown_layer_is_structural_error() {
    let mut state = canvas_100x100();
    let missing = layer_id(9);
    let err = state
        .apply(&Payload::LayerRetitle { id: missing, title: "x".into() })
        .expect_err("unknown");
    assert_eq!(err, StructuralError::UnknownLayer(missing));
}

#[test]
fn layer_order_must_be_exact_permutation() {
    let mut state = canvas_100x100();
    let a = create_layer(&mut state, 1);
    let b = create_layer(&mut state, 2);

    state.apply(&Payload::LayerOrder { order: vec![b, a] }).expect("reorder");
    assert_eq!(state.layers()[0].id, b);
    assert_eq!(state.layers()[1].id, a);

    // Creation order is untouched by reordering.
    assert_eq!(state.creation_order(), &[a, b]);

    let err = state.apply(&Payload::LayerOrder { order: vec![a] }).expect_err("short");
    assert_eq!(err, StructuralError::BadLayerOrder);
    let err = state.apply(&Payload::LayerOrder { order: vec![a, a] }).expect_err("dup");
    assert_eq!(err, StructuralError::BadLayerOrder);

    // Failed reorders leave the stack intact.
    assert_eq!(state.layers()[0].id, b);
    assert_eq!(state.layers()[1].id, a);
}

#[test]
fn delete_layer_prunes_creation_order() {
    let mut state = canvas_100x100();
    let a = create_layer(&mut state, 1);
    let b = create_layer(&mut state, 2);
    state.apply(&Payload::LayerDelete { id: a }).expect("delete");
    assert_eq!(state.creation_order(), &[b]);
    assert!(state.layer(&a).is_none());
}

// =============================================================
// Drawing
// =============================================================

#[test]
fn fill_rect_clips_to_canvas() {
    let mut state = canvas_100x100();
    let id = create_layer(&mut state, 1);
    state
        .apply(&Payload::FillRect { layer: id, x: 90, y: 90, width: 50, height: 50, color: 0xFF00_0000 })
        .expect("fill");
    let content = state.layer(&id).expect("layer").content();
    assert_eq!(content.pixel(95, 95), Some(0xFF00_0000));
    assert_eq!(content.pixel(89, 89), Some(0));
}

#[test]
fn draw_dabs_stamps_centered_squares() {
    let mut state = canvas_100x100();
    let id = create_layer(&mut state, 1);
    state
        .apply(&Payload::DrawDabs {
            layer: id,
            color: 0xFFAB_CDEF,
            diameter: 4,
            points: vec![Point::new(10, 10)],
        })
        .expect("dabs");
    let content = state.layer(&id).expect("layer").content();
    assert_eq!(content.pixel(8, 8), Some(0xFFAB_CDEF));
    assert_eq!(content.pixel(11, 11), Some(0xFFAB_CDEF));
    assert_eq!(content.pixel(12, 12), Some(0));
}

#[test]
fn put_image_validates_pixel_count() {
    let mut state = canvas_100x100();
    let id = create_layer(&mut state, 1);
    let err = state
        .apply(&Payload::PutImage {
            layer: id,
            x: 0,
            y: 0,
            width: 2,
            height: 2,
            pixels: vec![0xFF; 3],
        })
        .expect_err("short buffer");
    assert_eq!(err, StructuralError::BadImageData { expected: 4, actual: 3 });
    // Validation failed before mutation.
    assert_eq!(state.layer(&id).expect("layer").content().pixel(0, 0), Some(0));
}

#[test]
fn put_image_writes_rows() {
    let mut state = canvas_100x100();
    let id = create_layer(&mut state, 1);
    state
        .apply(&Payload::PutImage {
            layer: id,
            x: 1,
            y: 1,
            width: 2,
            height: 2,
            pixels: vec![1, 2, 3, 4],
        })
        .expect("put");
    let content = state.layer(&id).expect("layer").content();
    assert_eq!(content.pixel(1, 1), Some(1));
    assert_eq!(content.pixel(2, 1), Some(2));
    assert_eq!(content.pixel(1, 2), Some(3));
    assert_eq!(content.pixel(2, 2), Some(4));
}

// =============================================================
// Resize
// =============================================================

#[test]
fn resize_expands_edges_and_anchors_content() {
    let mut state = canvas_100x100();
    let id = create_layer(&mut state, 1);
    state
        .apply(&Payload::FillRect { layer: id, x: 0, y: 0, width: 1, height: 1, color: 7 })
        .expect("fill");

    let effects = state
        .apply(&Payload::Resize { top: 50, right: 50, bottom: 50, left: 50 })
        .expect("resize");
    assert_eq!(
        effects,
        vec![CanvasEffect::Resized { old: Size::new(100, 100), offset: Point::new(50, 50) }]
    );
    assert_eq!(state.size(), Size::new(200, 200));
    let content = state.layer(&id).expect("layer").content();
    assert_eq!(content.pixel(50, 50), Some(7));
    assert_eq!(content.pixel(0, 0), Some(0));
}

#[test]
fn resize_translates_selection() {
    let mut state = canvas_100x100();
    state
        .apply(&Payload::SetSelection { rect: Some(Rect::new(10, 10, 5, 5)) })
        .expect("select");
    state
        .apply(&Payload::Resize { top: 20, right: 0, bottom: 0, left: 30 })
        .expect("resize");
    assert_eq!(state.selection(), Some(Rect::new(40, 30, 5, 5)));
}

#[test]
fn resize_to_nothing_is_rejected() {
    let mut state = canvas_100x100();
    let err = state
        .apply(&Payload::Resize { top: 0, right: -100, bottom: 0, left: 0 })
        .expect_err("zero width");
    assert_eq!(err, StructuralError::InvalidSize { width: 0, height: 100 });
    assert_eq!(state.size(), Size::new(100, 100));
}

#[test]
fn resize_past_max_dimension_is_rejected() {
    let mut state = canvas_100x100();
    let err = state
        .apply(&Payload::Resize { top: 0, right: MAX_CANVAS_DIM, bottom: 0, left: 0 })
        .expect_err("too wide");
    assert!(matches!(err, StructuralError::InvalidSize { .. }));
}

// =============================================================
// Annotations and selection
// =============================================================

#[test]
fn annotation_lifecycle() {
    let mut state = canvas_100x100();
    let id = annotation_id(1);
    state
        .apply(&Payload::AnnotationCreate { id, rect: Rect::new(0, 0, 10, 10) })
        .expect("create");
    state
        .apply(&Payload::AnnotationEdit { id, text: "hello".into(), background: 0xFF00_FF00 })
        .expect("edit");
    state
        .apply(&Payload::AnnotationReshape { id, rect: Rect::new(5, 5, 20, 20) })
        .expect("reshape");

    let annotation = state.annotation(&id).expect("annotation");
    assert_eq!(annotation.text, "hello");
    assert_eq!(annotation.background, 0xFF00_FF00);
    assert_eq!(annotation.rect, Rect::new(5, 5, 20, 20));

    state.apply(&Payload::AnnotationDelete { id }).expect("delete");
    assert!(state.annotations().is_empty());
}

#[test]
fn duplicate_annotation_id_is_rejected() {
    let mut state = canvas_100x100();
    let id = annotation_id(1);
    state
        .apply(&Payload::AnnotationCreate { id, rect: Rect::new(0, 0, 1, 1) })
        .expect("create");
    let err = state
        .apply(&Payload::AnnotationCreate { id, rect: Rect::new(0, 0, 1, 1) })
        .expect_err("dup");
    assert_eq!(err, StructuralError::DuplicateAnnotation(id));
}

#[test]
fn selection_can_be_cleared() {
    let mut state = canvas_100x100();
    state
        .apply(&Payload::SetSelection { rect: Some(Rect::new(1, 2, 3, 4)) })
        .expect("set");
    assert_eq!(state.selection(), Some(Rect::new(1, 2, 3, 4)));
    let effects = state.apply(&Payload::SetSelection { rect: None }).expect("clear");
    assert_eq!(effects, vec![CanvasEffect::SelectionChanged(None)]);
    assert_eq!(state.selection(), None);
}

// =============================================================
// Misapplied payloads
// =============================================================

#[test]
fn meta_payload_is_not_a_canvas_command() {
    let mut state = canvas_100x100();
    let err = state
        .apply(&Payload::Chat { message: "hi".into(), recipient: None, pin: false })
        .expect_err("chat");
    assert_eq!(err, StructuralError::NotCanvasCommand("chat"));
}

// =============================================================
// Determinism
// =============================================================

#[test]
fn same_stream_yields_equal_states() {
    let stream = vec![
        Payload::Resize { top: 0, right: 60, bottom: 0, left: 0 },
        Payload::LayerCreate { id: layer_id(1), title: "a".into(), fill: Some(3) },
        Payload::FillRect { layer: layer_id(1), x: 2, y: 2, width: 10, height: 10, color: 9 },
        Payload::LayerCreate { id: layer_id(2), title: "b".into(), fill: None },
        Payload::LayerOrder { order: vec![layer_id(2), layer_id(1)] },
        Payload::LayerDelete { id: layer_id(1) },
    ];

    let mut first = canvas_100x100();
    let mut second = canvas_100x100();
    for payload in &stream {
        first.apply(payload).expect("first");
        second.apply(payload).expect("second");
    }
    assert_eq!(first, second);
}
