//! End-to-end exercises of the message service: persistence, room
//! publishing, and history reconstruction against a real database and
//! dispatcher.

use std::sync::Arc;

use tokio::sync::mpsc;
use uuid::Uuid;

use courier_api::service::{MAX_MESSAGE_CHARS, MessageService, ServiceError};
use courier_db::Database;
use courier_gateway::dispatcher::Dispatcher;
use courier_types::events::GatewayEvent;

fn setup(user_count: usize) -> (MessageService, Arc<Database>, Dispatcher, Vec<Uuid>) {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let ids: Vec<Uuid> = (0..user_count).map(|_| Uuid::new_v4()).collect();
    for (i, id) in ids.iter().enumerate() {
        db.create_user(
            &id.to_string(),
            &format!("user{i}@example.com"),
            "$argon2id$fake-hash",
            &format!("User{i}"),
        )
        .unwrap();
    }

    let dispatcher = Dispatcher::new();
    let service = MessageService::new(db.clone(), dispatcher.clone());
    (service, db, dispatcher, ids)
}

async fn join_room(dispatcher: &Dispatcher, user: Uuid) -> mpsc::UnboundedReceiver<GatewayEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    dispatcher.join(Uuid::new_v4(), user, tx).await;
    rx
}

fn conversation_count(db: &Database) -> i64 {
    db.with_conn(|conn| {
        Ok(conn.query_row("SELECT COUNT(*) FROM conversations", [], |r| r.get(0))?)
    })
    .unwrap()
}

#[tokio::test]
async fn sent_message_shows_up_exactly_once_in_sent_partition() {
    let (service, _db, _dispatcher, ids) = setup(2);
    let (alice, bob) = (ids[0], ids[1]);

    let sent = service.send_message(alice, bob, "hello bob").await.unwrap();

    let history = service.get_history(alice, bob).await.unwrap();
    let matches: Vec<_> = history
        .sender_messages
        .iter()
        .filter(|m| m.id == sent.id)
        .collect();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].message, "hello bob");
    assert!(history.receiver_messages.is_empty());
}

#[tokio::test]
async fn history_partitions_by_direction() {
    let (service, _db, _dispatcher, ids) = setup(2);
    let (alice, bob) = (ids[0], ids[1]);

    service.send_message(alice, bob, "hi").await.unwrap();
    service.send_message(bob, alice, "yo").await.unwrap();

    let history = service.get_history(alice, bob).await.unwrap();
    let sent: Vec<&str> = history.sender_messages.iter().map(|m| m.message.as_str()).collect();
    let received: Vec<&str> = history
        .receiver_messages
        .iter()
        .map(|m| m.message.as_str())
        .collect();
    assert_eq!(sent, vec!["hi"]);
    assert_eq!(received, vec!["yo"]);

    // The merged chronological view is ["hi", "yo"]
    assert!(history.sender_messages[0].created_at <= history.receiver_messages[0].created_at);

    // Same conversation seen from the other side
    let history = service.get_history(bob, alice).await.unwrap();
    let sent: Vec<&str> = history.sender_messages.iter().map(|m| m.message.as_str()).collect();
    assert_eq!(sent, vec!["yo"]);
}

#[tokio::test]
async fn history_is_chronological_within_each_partition() {
    let (service, _db, _dispatcher, ids) = setup(2);
    let (alice, bob) = (ids[0], ids[1]);

    for body in ["one", "two", "three", "four"] {
        service.send_message(alice, bob, body).await.unwrap();
    }

    let history = service.get_history(alice, bob).await.unwrap();
    let sent: Vec<&str> = history.sender_messages.iter().map(|m| m.message.as_str()).collect();
    assert_eq!(sent, vec!["one", "two", "three", "four"]);
    assert!(
        history
            .sender_messages
            .windows(2)
            .all(|w| w[0].created_at <= w[1].created_at)
    );
}

#[tokio::test]
async fn concurrent_sends_create_a_single_conversation() {
    let (service, db, _dispatcher, ids) = setup(2);
    let (alice, bob) = (ids[0], ids[1]);

    let mut handles = Vec::new();
    for i in 0..8 {
        let service = service.clone();
        // Both directions race on the first-send path
        let (from, to) = if i % 2 == 0 { (alice, bob) } else { (bob, alice) };
        handles.push(tokio::spawn(async move {
            service.send_message(from, to, &format!("message {i}")).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(conversation_count(&db), 1);

    let history = service.get_history(alice, bob).await.unwrap();
    assert_eq!(
        history.sender_messages.len() + history.receiver_messages.len(),
        8
    );
}

#[tokio::test]
async fn send_pushes_to_both_rooms_including_sender_echo() {
    let (service, _db, dispatcher, ids) = setup(3);
    let (alice, bob, carol) = (ids[0], ids[1], ids[2]);

    // Alice has two open sessions; the second must observe her own send
    let mut alice_tab1 = join_room(&dispatcher, alice).await;
    let mut alice_tab2 = join_room(&dispatcher, alice).await;
    let mut bob_rx = join_room(&dispatcher, bob).await;
    let mut carol_rx = join_room(&dispatcher, carol).await;

    let sent = service.send_message(alice, bob, "hi bob").await.unwrap();

    for rx in [&mut alice_tab1, &mut alice_tab2, &mut bob_rx] {
        let event = rx.try_recv().expect("room member missed the push");
        let pushed = event.message().expect("expected a newMessage event");
        assert_eq!(pushed.id, sent.id);
        assert_eq!(pushed.message, "hi bob");
        assert_eq!(pushed.created_at, sent.created_at);
    }

    // Room isolation: carol was not a participant
    assert!(carol_rx.try_recv().is_err());
}

#[tokio::test]
async fn empty_history_is_not_found_not_a_failure() {
    let (service, _db, _dispatcher, ids) = setup(2);

    let err = service.get_history(ids[0], ids[1]).await.unwrap_err();
    assert!(matches!(err, ServiceError::NotFound));
}

#[tokio::test]
async fn over_length_body_never_reaches_store_or_gateway() {
    let (service, db, dispatcher, ids) = setup(2);
    let (alice, bob) = (ids[0], ids[1]);

    let mut bob_rx = join_room(&dispatcher, bob).await;

    let body = "x".repeat(MAX_MESSAGE_CHARS + 1);
    let err = service.send_message(alice, bob, &body).await.unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));

    // Nothing persisted, nothing pushed
    assert_eq!(conversation_count(&db), 0);
    assert!(bob_rx.try_recv().is_err());
}

#[tokio::test]
async fn body_is_trimmed_before_the_length_check() {
    let (service, _db, _dispatcher, ids) = setup(2);
    let (alice, bob) = (ids[0], ids[1]);

    let padded = format!("   {}   ", "x".repeat(MAX_MESSAGE_CHARS));
    let sent = service.send_message(alice, bob, &padded).await.unwrap();
    assert_eq!(sent.message.chars().count(), MAX_MESSAGE_CHARS);
}
