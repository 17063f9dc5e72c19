use commands::{Command, Payload, Rect, SERVER_USER};
use uuid::Uuid;

use super::*;

fn layer_id(n: u8) -> LayerId {
    Uuid::from_bytes([n; 16])
}

fn draw_on(user: UserId, layer: LayerId) -> Command {
    Command::new(user, Payload::FillRect { layer, x: 0, y: 0, width: 1, height: 1, color: 0 })
}

fn acl_with_operator(op: UserId) -> AclState {
    let mut acl = AclState::new();
    acl.apply(&Payload::SessionOwner { users: vec![op] });
    acl
}

// =============================================================
// Tier membership
// =============================================================

#[test]
fn session_owner_replaces_operator_set() {
    let mut acl = AclState::new();
    assert!(acl.apply(&Payload::SessionOwner { users: vec![1, 2] }));
    assert!(acl.is_operator(1));
    assert!(acl.is_operator(2));

    assert!(acl.apply(&Payload::SessionOwner { users: vec![2] }));
    assert!(!acl.is_operator(1));

    // Re-applying the same set is a no-op.
    assert!(!acl.apply(&Payload::SessionOwner { users: vec![2] }));
}

#[test]
fn server_user_is_always_operator() {
    let acl = AclState::new();
    assert!(acl.is_operator(SERVER_USER));
}

#[test]
fn trusted_and_locked_sets_follow_commands() {
    let mut acl = AclState::new();
    acl.apply(&Payload::TrustedUsers { users: vec![3] });
    acl.apply(&Payload::UserLocks { users: vec![4] });
    assert!(acl.is_trusted(3));
    assert!(acl.is_locked(4));
    acl.apply(&Payload::UserLocks { users: vec![] });
    assert!(!acl.is_locked(4));
}

// =============================================================
// Command gating
// =============================================================

#[test]
fn server_commands_bypass_every_check() {
    let mut acl = AclState::new();
    acl.apply(&Payload::UserLocks { users: vec![SERVER_USER] });
    let cmd = Command::new(SERVER_USER, Payload::SessionOwner { users: vec![1] });
    assert!(acl.permits(&cmd));
    assert!(acl.permits(&draw_on(SERVER_USER, layer_id(1))));
}

#[test]
fn acl_commands_require_operator() {
    let acl = acl_with_operator(1);
    let grant = Payload::TrustedUsers { users: vec![2] };
    assert!(acl.permits(&Command::new(1, grant.clone())));
    assert!(!acl.permits(&Command::new(2, grant)));
}

#[test]
fn structural_commands_require_operator_or_trusted() {
    let mut acl = acl_with_operator(1);
    acl.apply(&Payload::TrustedUsers { users: vec![3] });
    let create = Payload::LayerCreate { id: layer_id(1), title: "a".into(), fill: None };
    assert!(acl.permits(&Command::new(1, create.clone())));
    assert!(acl.permits(&Command::new(3, create.clone())));
    assert!(!acl.permits(&Command::new(2, create)));
}

#[test]
fn locked_user_cannot_draw() {
    let mut acl = AclState::new();
    acl.apply(&Payload::UserLocks { users: vec![2] });
    assert!(!acl.permits(&draw_on(2, layer_id(1))));
    assert!(acl.permits(&draw_on(3, layer_id(1))));
}

#[test]
fn locked_user_can_still_chat_and_leave() {
    let mut acl = AclState::new();
    acl.apply(&Payload::UserLocks { users: vec![2] });
    let chat = Command::new(2, Payload::Chat { message: "hi".into(), recipient: None, pin: false });
    assert!(acl.permits(&chat));
    assert!(acl.permits(&Command::new(2, Payload::Leave)));
}

#[test]
fn locked_layer_denies_everyone_but_operators() {
    let mut acl = acl_with_operator(1);
    acl.apply(&Payload::LayerAcl { layer: layer_id(1), locked: true, exclusive: vec![] });
    assert!(!acl.permits(&draw_on(2, layer_id(1))));
    assert!(acl.permits(&draw_on(1, layer_id(1))));
    assert!(acl.permits(&draw_on(2, layer_id(2))));
}

#[test]
fn exclusive_layer_restricts_to_listed_users() {
    let mut acl = acl_with_operator(1);
    acl.apply(&Payload::LayerAcl { layer: layer_id(1), locked: false, exclusive: vec![2] });
    assert!(acl.permits(&draw_on(2, layer_id(1))));
    assert!(!acl.permits(&draw_on(3, layer_id(1))));
    // Operators are exempt from exclusivity.
    assert!(acl.permits(&draw_on(1, layer_id(1))));
}

#[test]
fn selection_is_drawing_for_lock_purposes() {
    let mut acl = AclState::new();
    acl.apply(&Payload::UserLocks { users: vec![2] });
    let select = Command::new(2, Payload::SetSelection { rect: Some(Rect::new(0, 0, 1, 1)) });
    assert!(!acl.permits(&select));
}

// =============================================================
// Layer entry lifecycle
// =============================================================

#[test]
fn default_layer_acl_removes_entry() {
    let mut acl = AclState::new();
    acl.apply(&Payload::LayerAcl { layer: layer_id(1), locked: true, exclusive: vec![] });
    assert!(acl.layer_entry(&layer_id(1)).is_some());
    assert!(acl.apply(&Payload::LayerAcl { layer: layer_id(1), locked: false, exclusive: vec![] }));
    assert!(acl.layer_entry(&layer_id(1)).is_none());
}

#[test]
fn forget_layer_drops_restrictions() {
    let mut acl = AclState::new();
    acl.apply(&Payload::LayerAcl { layer: layer_id(1), locked: true, exclusive: vec![] });
    acl.forget_layer(&layer_id(1));
    assert!(acl.layer_entries().is_empty());
    assert!(acl.permits(&draw_on(2, layer_id(1))));
}
