//! End-to-end event projection against an in-memory store.
//!
//! Events are built as JSON, the way they arrive from the socket, and go
//! through the same decoding the replay binary uses.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::{Value, json};

use ripple_db::{Database, DatabaseError, PreconditionError};
use ripple_types::{ChannelId, Event, LocalMessageState};

const CID: &str = "messaging:general";

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_709_287_200, 0).unwrap() + Duration::seconds(secs)
}

fn ts(secs: i64) -> String {
    at(secs).to_rfc3339()
}

fn cid() -> ChannelId {
    ChannelId::parse(CID).unwrap()
}

fn event(value: Value) -> Event {
    serde_json::from_value(value).unwrap()
}

fn message(id: &str, author: &str, secs: i64) -> Value {
    json!({
        "id": id,
        "cid": CID,
        "text": format!("text of {id}"),
        "user": {"id": author},
        "created_at": ts(secs),
        "updated_at": ts(secs),
    })
}

fn message_new(message: Value) -> Event {
    let author = message["user"].clone();
    event(json!({
        "type": "message.new",
        "cid": CID,
        "message": message,
        "user": author,
        "created_at": ts(100),
    }))
}

fn health_check(user_id: &str) -> Event {
    event(json!({
        "type": "health.check",
        "me": {"id": user_id, "total_unread_count": 0, "unread_channels": 0},
        "created_at": ts(0),
    }))
}

fn reaction_event(kind: &str, message: Value, user_id: &str, reaction_type: &str) -> Event {
    let message_id = message["id"].clone();
    event(json!({
        "type": kind,
        "cid": CID,
        "message": message,
        "reaction": {
            "message_id": message_id,
            "user": {"id": user_id},
            "type": reaction_type,
            "created_at": ts(50),
            "updated_at": ts(50),
        },
        "user": {"id": user_id},
        "created_at": ts(50),
    }))
}

fn signed_in() -> Database {
    let db = Database::open_in_memory().unwrap();
    db.apply_event(&health_check("u1")).unwrap();
    db
}

#[test]
fn hard_delete_leaves_a_tombstone() {
    let db = signed_in();
    db.apply_event(&message_new(message("m1", "u2", 1))).unwrap();

    let before = db.read(|s| s.message("m1")).unwrap().unwrap();
    assert!(!before.is_hard_deleted);

    db.apply_event(&event(json!({
        "type": "message.deleted",
        "cid": CID,
        "hard_delete": true,
        "message": message("m1", "u2", 1),
        "created_at": ts(10),
    })))
    .unwrap();

    db.read(|s| {
        let tombstone = s.message("m1")?.expect("tombstone stays retrievable");
        assert!(tombstone.is_hard_deleted);
        assert!(s.channel_messages(&cid(), 10)?.is_empty());
        Ok(())
    })
    .unwrap();
}

#[test]
fn reaction_on_unknown_message_is_skipped() {
    let db = signed_in();
    db.apply_event(&reaction_event("reaction.new", message("m9", "u2", 1), "u1", "like"))
        .unwrap();

    db.read(|s| {
        assert!(s.message("m9")?.is_none());
        assert!(s.reaction("m9", "u1", "like")?.is_none());
        Ok(())
    })
    .unwrap();
}

#[test]
fn own_reaction_is_recorded_once() {
    let db = signed_in();
    db.apply_event(&message_new(message("m1", "u2", 1))).unwrap();

    let like = reaction_event("reaction.new", message("m1", "u2", 1), "u1", "like");
    db.apply_event(&like).unwrap();
    db.apply_event(&like).unwrap();

    db.read(|s| {
        let m1 = s.message("m1")?.unwrap();
        assert_eq!(m1.own_reactions, ["u1/m1/like"]);
        assert_eq!(s.reactions("m1")?.len(), 1);
        Ok(())
    })
    .unwrap();

    db.apply_event(&reaction_event("reaction.deleted", message("m1", "u2", 1), "u1", "like"))
        .unwrap();
    db.read(|s| {
        assert!(s.message("m1")?.unwrap().own_reactions.is_empty());
        assert!(s.reaction("m1", "u1", "like")?.is_none());
        Ok(())
    })
    .unwrap();
}

#[test]
fn reactions_by_other_users_do_not_touch_own_reactions() {
    let db = signed_in();
    db.apply_event(&message_new(message("m1", "u2", 1))).unwrap();
    db.apply_event(&reaction_event("reaction.new", message("m1", "u2", 1), "u3", "like"))
        .unwrap();

    let m1 = db.read(|s| s.message("m1")).unwrap().unwrap();
    assert!(m1.own_reactions.is_empty());
}

#[test]
fn preview_only_moves_to_strictly_newer_messages() {
    let db = signed_in();
    db.apply_event(&message_new(message("m1", "u2", 10))).unwrap();
    assert_eq!(
        db.read(|s| s.channel(&cid())).unwrap().unwrap().preview_message_id.as_deref(),
        Some("m1")
    );

    // Same timestamp: the preview stays put.
    db.apply_event(&message_new(message("m2", "u2", 10))).unwrap();
    assert_eq!(
        db.read(|s| s.channel(&cid())).unwrap().unwrap().preview_message_id.as_deref(),
        Some("m1")
    );

    db.apply_event(&message_new(message("m3", "u2", 11))).unwrap();
    assert_eq!(
        db.read(|s| s.channel(&cid())).unwrap().unwrap().preview_message_id.as_deref(),
        Some("m3")
    );
}

#[test]
fn updates_for_unknown_messages_are_ignored() {
    let db = signed_in();
    db.apply_event(&event(json!({
        "type": "message.updated",
        "cid": CID,
        "message": message("m7", "u2", 1),
        "created_at": ts(2),
    })))
    .unwrap();

    assert!(db.read(|s| s.message("m7")).unwrap().is_none());
}

#[test]
fn updates_touch_quoting_messages() {
    let db = signed_in();
    db.apply_event(&message_new(message("m1", "u2", 1))).unwrap();
    let mut quoting = message("m2", "u3", 2);
    quoting["quoted_message_id"] = json!("m1");
    db.apply_event(&message_new(quoting)).unwrap();

    let mut edited = message("m1", "u2", 1);
    edited["text"] = json!("edited");
    edited["updated_at"] = json!(ts(30));
    db.apply_event(&event(json!({
        "type": "message.updated",
        "cid": CID,
        "message": edited,
        "created_at": ts(30),
    })))
    .unwrap();

    db.read(|s| {
        assert_eq!(s.message("m1")?.unwrap().text, "edited");
        assert_eq!(s.message("m2")?.unwrap().updated_at, at(30));
        Ok(())
    })
    .unwrap();
}

#[test]
fn new_thread_replies_become_thread_visible() {
    let db = signed_in();
    db.apply_event(&message_new(message("m1", "u2", 1))).unwrap();
    let mut reply = message("r1", "u2", 2);
    reply["parent_id"] = json!("m1");
    db.apply_event(&message_new(reply)).unwrap();

    db.read(|s| {
        assert!(s.message("r1")?.unwrap().show_inside_thread);
        assert_eq!(s.thread_replies("m1")?.len(), 1);
        let timeline: Vec<_> = s.channel_messages(&cid(), 10)?.into_iter().map(|m| m.id).collect();
        assert_eq!(timeline, ["m1"]);
        Ok(())
    })
    .unwrap();
}

#[test]
fn failing_event_rolls_back_everything() {
    // No signed-in user: the unread counters cannot be stored.
    let db = Database::open_in_memory().unwrap();
    let failing = event(json!({
        "type": "message.new",
        "cid": CID,
        "message": message("m1", "u2", 1),
        "total_unread_count": 3,
        "unread_channels": 1,
        "created_at": ts(1),
    }));

    let err = db.apply_event(&failing).unwrap_err();
    assert!(matches!(
        err,
        DatabaseError::Precondition(PreconditionError::CurrentUserDoesNotExist)
    ));
    db.read(|s| {
        assert!(s.message("m1")?.is_none());
        assert!(s.channel(&cid())?.is_none());
        assert!(s.user("u2")?.is_none());
        Ok(())
    })
    .unwrap();
}

#[test]
fn batches_are_atomic() {
    let db = Database::open_in_memory().unwrap();
    let ok = message_new(message("m1", "u2", 1));
    let failing = event(json!({
        "type": "notification.mark_read",
        "cid": CID,
        "total_unread_count": 0,
        "unread_channels": 0,
        "created_at": ts(2),
    }));

    assert!(db.apply_events(&[ok.clone(), failing]).is_err());
    assert!(db.read(|s| s.message("m1")).unwrap().is_none());

    db.apply_events(&[health_check("u1"), ok]).unwrap();
    assert!(db.read(|s| s.message("m1")).unwrap().is_some());
}

#[test]
fn reapplying_an_event_is_idempotent() {
    let db = signed_in();
    let new = message_new(message("m1", "u2", 1));
    db.apply_event(&new).unwrap();
    let first = db.read(|s| s.channel_messages(&cid(), 10)).unwrap();
    db.apply_event(&new).unwrap();
    let second = db.read(|s| s.channel_messages(&cid(), 10)).unwrap();

    assert_eq!(first, second);
    assert_eq!(second.len(), 1);
}

#[test]
fn unread_counts_land_on_the_current_user() {
    let db = signed_in();
    db.apply_event(&event(json!({
        "type": "notification.message_new",
        "cid": CID,
        "channel": {
            "cid": CID,
            "type": "messaging",
            "id": "general",
            "created_at": ts(0),
            "updated_at": ts(0),
        },
        "message": message("m1", "u2", 1),
        "total_unread_count": 7,
        "unread_channels": 2,
        "created_at": ts(1),
    })))
    .unwrap();

    let me = db.read(|s| s.current_user()).unwrap().unwrap();
    assert_eq!(me.unread_count.messages, 7);
    assert_eq!(me.unread_count.channels, 2);
    assert!(db.read(|s| s.message("m1")).unwrap().is_some());
}

#[test]
fn malformed_cid_skips_the_message() {
    let db = signed_in();
    let mut broken = message("m1", "u2", 1);
    broken["cid"] = json!("no-separator");
    db.apply_event(&event(json!({
        "type": "message.new",
        "cid": "no-separator",
        "message": broken,
        "created_at": ts(1),
    })))
    .unwrap();

    assert!(db.read(|s| s.message("m1")).unwrap().is_none());
}

#[test]
fn typing_members_and_reads_follow_events() {
    let db = signed_in();
    db.apply_event(&message_new(message("m1", "u2", 1))).unwrap();
    db.apply_event(&message_new(message("m2", "u2", 2))).unwrap();

    db.apply_event(&event(json!({
        "type": "typing.start", "cid": CID, "user": {"id": "u2"}, "created_at": ts(3),
    })))
    .unwrap();
    assert_eq!(db.read(|s| s.typing_users(&cid())).unwrap(), ["u2"]);
    db.apply_event(&event(json!({
        "type": "typing.stop", "cid": CID, "user": {"id": "u2"}, "created_at": ts(4),
    })))
    .unwrap();
    assert!(db.read(|s| s.typing_users(&cid())).unwrap().is_empty());

    db.apply_event(&event(json!({
        "type": "member.added",
        "cid": CID,
        "member": {"user": {"id": "u3"}, "channel_role": "member"},
        "created_at": ts(5),
    })))
    .unwrap();
    assert!(db.read(|s| s.member("u3", &cid())).unwrap().is_some());
    db.apply_event(&event(json!({
        "type": "member.removed", "cid": CID, "user": {"id": "u3"}, "created_at": ts(6),
    })))
    .unwrap();
    assert!(db.read(|s| s.member("u3", &cid())).unwrap().is_none());

    db.apply_event(&event(json!({
        "type": "message.read", "cid": CID, "user": {"id": "u1"}, "created_at": ts(2),
    })))
    .unwrap();
    let read = db.read(|s| s.load_channel_read(&cid(), "u1")).unwrap().unwrap();
    assert_eq!(read.last_read_message_id.as_deref(), Some("m2"));
    assert_eq!(read.last_read_at, at(2));
}

#[test]
fn channel_lifecycle_events() {
    let db = signed_in();
    for (i, id) in ["m1", "m2", "m3"].into_iter().enumerate() {
        db.apply_event(&message_new(message(id, "u2", i as i64 + 1))).unwrap();
    }

    db.apply_event(&event(json!({
        "type": "channel.truncated",
        "cid": CID,
        "channel": {
            "cid": CID,
            "type": "messaging",
            "id": "general",
            "created_at": ts(0),
            "updated_at": ts(20),
            "truncated_at": ts(2),
        },
        "created_at": ts(20),
    })))
    .unwrap();
    let remaining: Vec<_> = db
        .read(|s| s.channel_messages(&cid(), 10))
        .unwrap()
        .into_iter()
        .map(|m| m.id)
        .collect();
    assert_eq!(remaining, ["m3"]);

    db.apply_event(&event(json!({
        "type": "channel.deleted", "cid": CID, "created_at": ts(30),
    })))
    .unwrap();
    assert_eq!(
        db.read(|s| s.channel(&cid())).unwrap().unwrap().deleted_at,
        Some(at(30))
    );

    db.apply_event(&event(json!({
        "type": "user.deactivated", "user": {"id": "u2"}, "created_at": ts(40),
    })))
    .unwrap();
    assert_eq!(
        db.read(|s| s.user("u2")).unwrap().unwrap().deactivated_at,
        Some(at(40))
    );
}

#[test]
fn unknown_events_change_nothing() {
    let db = signed_in();
    db.apply_event(&event(json!({"type": "call.ring", "cid": CID, "created_at": ts(1)})))
        .unwrap();
    assert!(db.read(|s| s.channel(&cid())).unwrap().is_none());
}

#[test]
fn server_echo_settles_a_pending_message() {
    let db = signed_in();
    db.apply_event(&message_new(message("m0", "u2", 1))).unwrap();
    let local = db
        .write(|s| {
            s.create_new_message(
                &cid(),
                ripple_types::NewMessage {
                    id: Some("local-1".into()),
                    text: "hello".into(),
                    ..Default::default()
                },
            )
        })
        .unwrap();
    assert_eq!(local.local_state, Some(LocalMessageState::PendingSend));

    let mut echo = message("local-1", "u1", 0);
    echo["created_at"] = json!(local.created_at.to_rfc3339());
    echo["updated_at"] = json!(local.created_at.to_rfc3339());
    db.apply_event(&message_new(echo)).unwrap();

    let settled = db.read(|s| s.message("local-1")).unwrap().unwrap();
    assert_eq!(settled.local_state, None);
    assert_eq!(
        db.read(|s| s.channel(&cid())).unwrap().unwrap().preview_message_id.as_deref(),
        Some("local-1")
    );
}
