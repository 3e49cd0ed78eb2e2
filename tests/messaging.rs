mod common;

use std::sync::{Arc, Barrier};

use common::{failing_db, user};
use gram::config::{conversation_key, conversation_pair_key};
use gram::conversations;
use gram::core::db::Db;
use gram::core::errors::AppError;
use gram::messages::{list_messages, resolve_conversation, send_message};

#[test]
fn both_directions_share_one_conversation() {
    let db = Db::in_memory();
    let alice = user(&db, "alice");
    let bob = user(&db, "bob");

    send_message(&db, &alice.id, &bob.id, "hi").unwrap();
    send_message(&db, &bob.id, &alice.id, "yo").unwrap();

    let conversation = conversations::find_by_pair(&db, &alice.id, &bob.id).unwrap().unwrap();
    assert_eq!(conversation.messages.len(), 2);

    let texts: Vec<String> = list_messages(&db, &bob.id, &alice.id)
        .unwrap()
        .into_iter()
        .map(|m| m.message)
        .collect();
    assert_eq!(texts, vec!["hi", "yo"]);
}

#[test]
fn message_records_sender_and_receiver() {
    let db = Db::in_memory();
    let alice = user(&db, "alice");
    let bob = user(&db, "bob");

    let sent = send_message(&db, &alice.id, &bob.id, "  hello  ").unwrap();
    assert_eq!(sent.sender_id, alice.id);
    assert_eq!(sent.receiver_id, bob.id);
    assert_eq!(sent.message, "hello");
}

#[test]
fn special_characters_round_trip() {
    let db = Db::in_memory();
    let alice = user(&db, "alice");
    let bob = user(&db, "bob");

    let sent = send_message(&db, &alice.id, &bob.id, "a & b < c").unwrap();
    assert_eq!(sent.message, "a & b < c");
    assert_eq!(list_messages(&db, &bob.id, &alice.id).unwrap()[0].message, "a & b < c");
}

#[test]
fn empty_message_is_rejected() {
    let db = Db::in_memory();
    let alice = user(&db, "alice");
    let bob = user(&db, "bob");

    let err = send_message(&db, &alice.id, &bob.id, "   ").unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    assert!(conversations::find_by_pair(&db, &alice.id, &bob.id).unwrap().is_none());
}

#[test]
fn self_message_is_rejected() {
    let db = Db::in_memory();
    let alice = user(&db, "alice");
    assert!(matches!(
        send_message(&db, &alice.id, &alice.id, "me"),
        Err(AppError::Validation(_))
    ));
}

#[test]
fn unknown_receiver_is_not_found() {
    let db = Db::in_memory();
    let alice = user(&db, "alice");
    assert!(matches!(
        send_message(&db, &alice.id, "ghost", "hello?"),
        Err(AppError::NotFound("User", _))
    ));
}

#[test]
fn listing_without_conversation_is_empty() {
    let db = Db::in_memory();
    let alice = user(&db, "alice");
    let bob = user(&db, "bob");
    assert!(list_messages(&db, &alice.id, &bob.id).unwrap().is_empty());
}

#[test]
fn resolve_creates_once() {
    let db = Db::in_memory();
    let alice = user(&db, "alice");
    let bob = user(&db, "bob");

    let first = resolve_conversation(&db, &alice.id, &bob.id).unwrap();
    let second = resolve_conversation(&db, &bob.id, &alice.id).unwrap();
    assert!(first.was_created());
    assert!(!second.was_created());
    assert_eq!(first.conversation().id, second.conversation().id);
}

#[test]
fn racing_first_contacts_create_one_conversation() {
    let db = Db::in_memory().with_cas_retries(1_000);
    let alice = user(&db, "alice");
    let bob = user(&db, "bob");
    let barrier = Arc::new(Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let (db, barrier) = (db.clone(), barrier.clone());
            let (from, to) = if i % 2 == 0 {
                (alice.id.clone(), bob.id.clone())
            } else {
                (bob.id.clone(), alice.id.clone())
            };
            std::thread::spawn(move || {
                barrier.wait();
                send_message(&db, &from, &to, &format!("msg {}", i)).unwrap()
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let id: String = db.get_json(&conversation_pair_key(&alice.id, &bob.id)).unwrap().unwrap();
    let conversation = conversations::get_conversation(&db, &id).unwrap();
    assert_eq!(conversation.messages.len(), 8);
    assert_eq!(list_messages(&db, &alice.id, &bob.id).unwrap().len(), 8);
}

#[test]
fn failed_append_leaves_no_message() {
    let (db, kv) = failing_db();
    let alice = user(&db, "alice");
    let bob = user(&db, "bob");
    let conversation = resolve_conversation(&db, &alice.id, &bob.id).unwrap().into_inner();

    kv.fail_writes_to(&conversation_key(&conversation.id));
    let err = send_message(&db, &alice.id, &bob.id, "lost").unwrap_err();
    assert!(err.is_retryable());
    kv.heal();

    assert!(list_messages(&db, &alice.id, &bob.id).unwrap().is_empty());
    let sent = send_message(&db, &alice.id, &bob.id, "again").unwrap();
    let listed = list_messages(&db, &alice.id, &bob.id).unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, sent.id);
}
