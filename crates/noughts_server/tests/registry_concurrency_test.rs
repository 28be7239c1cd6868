//! Registry races resolved under the per-session lock.

use noughts_engine::Move;
use noughts_server::{
    ConnId, MAILBOX_CAPACITY, Participant, ServerMessage, SessionError, SessionRegistry, Status,
};
use std::sync::{Arc, Barrier};
use std::thread;
use tokio::sync::mpsc;

fn remote(raw: u64) -> (Participant, mpsc::Receiver<ServerMessage>) {
    let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
    (Participant::remote(ConnId::new(raw), tx), rx)
}

#[test]
fn test_concurrent_joins_seat_exactly_one() {
    for _ in 0..50 {
        let registry = SessionRegistry::new();
        let (creator, mut creator_rx) = remote(1);
        let id = registry.create_session(creator);

        let contenders = 8;
        let barrier = Arc::new(Barrier::new(contenders));
        let handles: Vec<_> = (0..contenders)
            .map(|i| {
                let registry = registry.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    let (joiner, _rx) = remote(100 + i as u64);
                    barrier.wait();
                    registry.join_session(id, joiner)
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let winners = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1);
        assert!(
            results
                .iter()
                .filter_map(|r| r.as_ref().err())
                .all(|e| *e == SessionError::SessionFull(id))
        );

        for delivery in results.into_iter().flatten().flatten() {
            assert!(delivery.send());
        }
        assert_eq!(creator_rx.try_recv().unwrap(), ServerMessage::OpponentJoined);
        assert!(creator_rx.try_recv().is_err());
        assert_eq!(registry.snapshot(id).unwrap().status(), &Status::InProgress);
    }
}

#[test]
fn test_duplicate_move_commits_once() {
    for _ in 0..50 {
        let registry = SessionRegistry::new();
        let (creator, _creator_rx) = remote(1);
        let (joiner, _joiner_rx) = remote(2);
        let id = registry.create_session(creator);
        registry.join_session(id, joiner).unwrap();

        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let registry = registry.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    registry.apply_move(id, ConnId::new(1), Move::new(1, 1))
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results.iter().any(|r| matches!(r, Err(SessionError::NotYourTurn(_)))));
        assert_eq!(registry.snapshot(id).unwrap().board().count(noughts_engine::Symbol::X), 1);
    }
}

#[test]
fn test_disconnect_racing_join() {
    for _ in 0..50 {
        let registry = SessionRegistry::new();
        let (creator, _creator_rx) = remote(1);
        let id = registry.create_session(creator);

        let barrier = Arc::new(Barrier::new(2));
        let joining = {
            let registry = registry.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let (joiner, _rx) = remote(2);
                barrier.wait();
                registry.join_session(id, joiner).is_ok()
            })
        };
        barrier.wait();
        registry.disconnect(id, ConnId::new(1));
        joining.join().unwrap();

        // Whatever the interleaving, the creator leaving ends the session.
        assert!(!registry.contains(id));
        assert_eq!(registry.session_count(), 0);
    }
}
