use uuid::Uuid;

use super::*;

fn layer_id(n: u8) -> LayerId {
    Uuid::from_bytes([n; 16])
}

fn sample_command() -> Command {
    Command::confirmed(
        3,
        42,
        Payload::DrawDabs {
            layer: layer_id(1),
            color: 0xFF22_3344,
            diameter: 4,
            points: vec![Point::new(10, 10), Point::new(12, 11)],
        },
    )
}

// =============================================================
// Serde representation
// =============================================================

#[test]
fn payload_serializes_with_snake_case_tag() {
    let json = serde_json::to_value(Payload::SetTitle { title: "night sketch".into() })
        .expect("serialize");
    assert_eq!(json["type"], "set_title");
    assert_eq!(json["title"], "night sketch");
}

#[test]
fn unit_payload_round_trips() {
    let json = serde_json::to_string(&Payload::Leave).expect("serialize");
    assert_eq!(json, "{\"type\":\"leave\"}");
    let back: Payload = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(back, Payload::Leave);
}

#[test]
fn payload_rejects_unknown_tag() {
    assert!(serde_json::from_str::<Payload>("{\"type\":\"teleport\"}").is_err());
}

#[test]
fn blend_serializes_lowercase() {
    assert_eq!(serde_json::to_string(&Blend::Multiply).expect("serialize"), "\"multiply\"");
}

#[test]
fn metadata_field_serializes_snake_case() {
    assert_eq!(
        serde_json::to_string(&MetadataField::FrameCount).expect("serialize"),
        "\"frame_count\""
    );
}

#[test]
fn command_serde_round_trip_preserves_seq() {
    let cmd = sample_command();
    let json = serde_json::to_string(&cmd).expect("serialize");
    let back: Command = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(back, cmd);
    assert_eq!(back.seq, Some(42));
}

#[test]
fn local_command_has_no_seq() {
    let cmd = Command::new(5, Payload::Leave);
    assert_eq!(cmd.seq, None);
    assert_eq!(cmd.with_seq(7).seq, Some(7));
}

// =============================================================
// Classification
// =============================================================

#[test]
fn acl_payloads_are_flagged() {
    assert!(Payload::SessionOwner { users: vec![1] }.is_acl());
    assert!(Payload::TrustedUsers { users: vec![] }.is_acl());
    assert!(Payload::UserLocks { users: vec![2] }.is_acl());
    assert!(
        Payload::LayerAcl { layer: layer_id(1), locked: true, exclusive: vec![] }.is_acl()
    );
    assert!(!Payload::Leave.is_acl());
}

#[test]
fn draw_payloads_affect_canvas() {
    assert!(Payload::FillRect { layer: layer_id(1), x: 0, y: 0, width: 1, height: 1, color: 0 }
        .affects_canvas());
    assert!(Payload::Resize { top: 0, right: 10, bottom: 0, left: 0 }.affects_canvas());
    assert!(Payload::SetSelection { rect: None }.affects_canvas());
    assert!(Payload::AnnotationDelete { id: layer_id(9) }.affects_canvas());
    assert!(!Payload::Join { name: "ada".into() }.affects_canvas());
    assert!(!Payload::SessionOwner { users: vec![] }.affects_canvas());
}

#[test]
fn categories_order_structural_before_cosmetic() {
    assert!(Category::Structural < Category::Content);
    assert!(Category::Content < Category::Access);
    assert!(Category::Access < Category::Cosmetic);
}

#[test]
fn category_assignment_matches_replay_ordering() {
    let structural = Payload::LayerCreate { id: layer_id(1), title: "bg".into(), fill: None };
    let content = Payload::PutImage {
        layer: layer_id(1),
        x: 0,
        y: 0,
        width: 1,
        height: 1,
        pixels: vec![0],
    };
    let access = Payload::LayerAcl { layer: layer_id(1), locked: true, exclusive: vec![] };
    let cosmetic = Payload::SetTitle { title: "t".into() };

    assert_eq!(structural.category(), Category::Structural);
    assert_eq!(content.category(), Category::Content);
    assert_eq!(access.category(), Category::Access);
    assert_eq!(cosmetic.category(), Category::Cosmetic);
}

#[test]
fn target_layer_covers_content_writes_only() {
    assert_eq!(
        Payload::FillRect { layer: layer_id(1), x: 0, y: 0, width: 1, height: 1, color: 0 }
            .target_layer(),
        Some(layer_id(1))
    );
    assert_eq!(
        Payload::LayerRetitle { id: layer_id(2), title: "x".into() }.target_layer(),
        Some(layer_id(2))
    );
    // Structural layer commands are gated by role, not by layer ACL.
    assert_eq!(Payload::LayerDelete { id: layer_id(1) }.target_layer(), None);
    assert_eq!(Payload::SetSelection { rect: None }.target_layer(), None);
}

#[test]
fn payload_names_are_stable() {
    assert_eq!(Payload::Leave.name(), "leave");
    assert_eq!(Payload::CanvasBackground { color: 0 }.name(), "canvas_background");
    assert_eq!(Payload::RemoveTimelineFrame { frame: 3 }.name(), "remove_timeline_frame");
}

// =============================================================
// Wire codec
// =============================================================

#[test]
fn encode_decode_round_trip_preserves_command() {
    let cmd = sample_command();
    let bytes = encode_command(&cmd);
    let decoded = decode_command(&bytes).expect("decode should succeed");
    assert_eq!(decoded, cmd);
}

#[test]
fn encode_command_outputs_non_empty_binary() {
    assert!(!encode_command(&sample_command()).is_empty());
}

#[test]
fn decode_command_rejects_malformed_bytes() {
    let err = decode_command(&[0xff, 0x00, 0x01]).expect_err("bytes should fail");
    assert!(matches!(err, CodecError::Decode(_)));
}

#[test]
fn decode_command_rejects_out_of_range_user() {
    let wire = WireCommand {
        user: 300,
        seq: None,
        payload: serde_json::to_vec(&Payload::Leave).expect("serialize"),
    };
    let mut bytes = Vec::new();
    prost::Message::encode(&wire, &mut bytes).expect("encode");

    let err = decode_command(&bytes).expect_err("user should fail");
    assert!(matches!(err, CodecError::InvalidUser(300)));
}

#[test]
fn decode_command_rejects_garbage_payload_body() {
    let wire = WireCommand { user: 1, seq: Some(9), payload: b"not json".to_vec() };
    let mut bytes = Vec::new();
    prost::Message::encode(&wire, &mut bytes).expect("encode");

    let err = decode_command(&bytes).expect_err("payload should fail");
    assert!(matches!(err, CodecError::Payload(_)));
}

#[test]
fn round_trip_preserves_large_pixel_payload() {
    let cmd = Command::confirmed(
        1,
        1,
        Payload::PutImage {
            layer: layer_id(2),
            x: -4,
            y: 7,
            width: 16,
            height: 16,
            pixels: (0..256).map(|i| 0xFF00_0000 | i).collect(),
        },
    );
    let decoded = decode_command(&encode_command(&cmd)).expect("decode");
    assert_eq!(decoded, cmd);
}

#[test]
fn round_trip_preserves_optional_selection() {
    let with_rect = Command::new(2, Payload::SetSelection { rect: Some(Rect::new(1, 2, 3, 4)) });
    let without = Command::new(2, Payload::SetSelection { rect: None });
    assert_eq!(decode_command(&encode_command(&with_rect)).expect("decode"), with_rect);
    assert_eq!(decode_command(&encode_command(&without)).expect("decode"), without);
}
