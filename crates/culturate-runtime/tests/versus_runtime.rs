//! Multiplayer integration tests
//!
//! Two engine tasks play against an in-process room server over memory
//! channels, with tokio time paused so countdowns run instantly.

use culturate_core::{
    ChallengeDeck, ChannelConfig, CulturalData, MemorySessionStore, Notice, PlayerCommand,
    PlayerId, RegionPick, RoomId, Session, SessionStore,
};
use culturate_runtime::{
    EngineUpdate, FileSessionStore, GameConfig, MatchHandle, RoomHub, RoomServer, RuntimeBuilder,
    ServerConfig,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tokio_test::assert_ok;

// ----------------------------------------------------------------------------
// Test Utilities
// ----------------------------------------------------------------------------

fn server() -> RoomServer {
    let hub = RoomHub::new(GameConfig::testing()).with_challenges(|| {
        let aceh = CulturalData {
            province: "Aceh".into(),
            media_type: "image".into(),
            media_url: "media/saman.jpg".into(),
            cultural_category: "Dance".into(),
            query: Some("Saman dance".into()),
            ..CulturalData::default()
        };
        Box::new(ChallengeDeck::cycling(vec![aceh.into_challenge()]))
    });
    RoomServer::with_hub(ServerConfig::testing(), hub)
}

fn builder() -> RuntimeBuilder {
    RuntimeBuilder::testing().with_channel_config(ChannelConfig {
        update_buffer_size: 1024,
        ..ChannelConfig::testing()
    })
}

struct Client {
    handle: MatchHandle<PlayerCommand>,
    store: MemorySessionStore,
}

fn spawn_client(server: &RoomServer, room: &str, player: &str, created: bool) -> Client {
    let store = MemorySessionStore::new();
    let session = Session::new(RoomId::new(room), PlayerId::new(player), created);
    let handle = builder()
        .spawn_versus(session, Box::new(server.connect_memory()), Arc::new(store.clone()))
        .expect("valid config");
    Client { handle, store }
}

async fn wait_for<C, F>(handle: &mut MatchHandle<C>, mut matches: F) -> EngineUpdate
where
    C: Send + 'static,
    F: FnMut(&EngineUpdate) -> bool,
{
    timeout(Duration::from_secs(30), async {
        loop {
            match handle.next_update().await {
                Some(update) if matches(&update) => return update,
                Some(_) => continue,
                None => panic!("engine task ended before the expected update"),
            }
        }
    })
    .await
    .expect("expected update within timeout")
}

async fn wait_notice<F>(client: &mut Client, mut matches: F) -> Notice
where
    F: FnMut(&Notice) -> bool,
{
    match wait_for(&mut client.handle, |u| matches!(u, EngineUpdate::VersusNotice(n) if matches(n))).await {
        EngineUpdate::VersusNotice(notice) => notice,
        _ => unreachable!(),
    }
}

async fn seat_both(server: &RoomServer, room: &str) -> (Client, Client) {
    let mut alice = spawn_client(server, room, "alice", true);
    wait_notice(&mut alice, |n| matches!(n, Notice::Joined { .. })).await;
    let mut bob = spawn_client(server, room, "bob", false);
    wait_notice(&mut bob, |n| matches!(n, Notice::Joined { .. })).await;

    assert_ok!(alice.handle.send(PlayerCommand::Ready).await);
    assert_ok!(bob.handle.send(PlayerCommand::Ready).await);
    wait_notice(&mut alice, |n| matches!(n, Notice::GameStarted)).await;
    wait_notice(&mut bob, |n| matches!(n, Notice::GameStarted)).await;
    (alice, bob)
}

async fn answer(client: &Client, province: &str) {
    assert_ok!(
        client
            .handle
            .send(PlayerCommand::Select(RegionPick::new(province)))
            .await
    );
    assert_ok!(client.handle.send(PlayerCommand::Submit).await);
}

// ----------------------------------------------------------------------------
// Scenarios
// ----------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_full_match_over_memory_channels() {
    let server = server();
    let _ticker = server.spawn_ticker();
    let (mut alice, mut bob) = seat_both(&server, "PLAY01").await;
    assert!(alice.store.load().unwrap().is_some());

    for round in 1..=3u32 {
        wait_notice(&mut alice, |n| matches!(n, Notice::RoundStarted { round: r } if *r == round)).await;
        wait_notice(&mut bob, |n| matches!(n, Notice::RoundStarted { round: r } if *r == round)).await;

        answer(&alice, "Aceh").await;
        answer(&bob, "Bali").await;

        let resolved = wait_notice(&mut alice, |n| matches!(n, Notice::RoundResolved { .. })).await;
        assert_eq!(
            resolved,
            Notice::RoundResolved {
                round,
                correct_answer: "Aceh".into(),
                player_correct: true,
                opponent_correct: false,
            }
        );
        wait_notice(&mut bob, |n| matches!(n, Notice::RoundResolved { round: r, .. } if *r == round)).await;
    }

    for client in [&mut alice, &mut bob] {
        let Notice::GameOver { outcome } =
            wait_notice(client, |n| matches!(n, Notice::GameOver { .. })).await
        else {
            unreachable!()
        };
        assert!(outcome.is_winner(&PlayerId::new("alice")));
    }

    // The redirect countdown leaves the room and clears the stored session
    wait_for(&mut alice.handle, |u| matches!(u, EngineUpdate::Stopped)).await;
    wait_for(&mut bob.handle, |u| matches!(u, EngineUpdate::Stopped)).await;
    assert_eq!(alice.store.load().unwrap(), None);
    assert_eq!(bob.store.load().unwrap(), None);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(server.hub().lock().await.room_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_results_arrive_together_after_both_submit() {
    let server = server();
    let _ticker = server.spawn_ticker();
    let (mut alice, mut bob) = seat_both(&server, "PLAY02").await;
    wait_notice(&mut alice, |n| matches!(n, Notice::RoundStarted { round: 1 })).await;
    wait_notice(&mut bob, |n| matches!(n, Notice::RoundStarted { round: 1 })).await;

    answer(&alice, "Aceh").await;
    wait_notice(&mut alice, |n| matches!(n, Notice::WaitingForOpponent)).await;
    // Bob learns that alice locked in, but not what she picked
    wait_notice(&mut bob, |n| matches!(n, Notice::OpponentSubmitted)).await;

    answer(&bob, "Aceh").await;
    let a = wait_notice(&mut alice, |n| matches!(n, Notice::RoundResolved { .. })).await;
    let b = wait_notice(&mut bob, |n| matches!(n, Notice::RoundResolved { .. })).await;
    for notice in [a, b] {
        assert!(matches!(
            notice,
            Notice::RoundResolved {
                round: 1,
                player_correct: true,
                opponent_correct: true,
                ..
            }
        ));
    }
}

#[tokio::test(start_paused = true)]
async fn test_missing_answer_is_forced_at_timeout() {
    let server = server();
    let _ticker = server.spawn_ticker();
    let (mut alice, mut bob) = seat_both(&server, "PLAY03").await;
    wait_notice(&mut alice, |n| matches!(n, Notice::RoundStarted { round: 1 })).await;

    answer(&alice, "Aceh").await;
    // Bob never answers; the answer window closes on the server
    let resolved = wait_notice(&mut bob, |n| matches!(n, Notice::RoundResolved { .. })).await;
    assert!(matches!(
        resolved,
        Notice::RoundResolved {
            round: 1,
            player_correct: false,
            opponent_correct: true,
            ..
        }
    ));
    wait_notice(&mut alice, |n| matches!(n, Notice::RoundResolved { round: 1, .. })).await;
}

#[tokio::test(start_paused = true)]
async fn test_leaving_mid_match_forfeits() {
    let server = server();
    let _ticker = server.spawn_ticker();
    let (mut alice, mut bob) = seat_both(&server, "PLAY04").await;

    bob.handle.send(PlayerCommand::Leave).await.unwrap();
    wait_for(&mut bob.handle, |u| matches!(u, EngineUpdate::Stopped)).await;
    assert_eq!(bob.store.load().unwrap(), None);

    let Notice::GameOver { outcome } =
        wait_notice(&mut alice, |n| matches!(n, Notice::GameOver { .. })).await
    else {
        unreachable!()
    };
    assert!(outcome.is_winner(&PlayerId::new("alice")));
}

#[tokio::test(start_paused = true)]
async fn test_joining_unknown_room_reports_error() {
    let server = server();
    let mut carol = spawn_client(&server, "NOPE99", "carol", false);
    let notice = wait_notice(&mut carol, |n| matches!(n, Notice::ServerError { .. })).await;
    assert_eq!(
        notice,
        Notice::ServerError {
            message: "Room not found".into(),
            attempt: 1,
        }
    );
    assert_eq!(carol.store.load().unwrap(), None);
}

#[tokio::test(start_paused = true)]
async fn test_session_file_follows_membership() {
    let server = server();
    let path = std::env::temp_dir()
        .join(format!("culturate-test-{}", uuid::Uuid::new_v4()))
        .join("session.json");
    let store = FileSessionStore::new(&path);
    let session = Session::new(RoomId::new("FILE01"), PlayerId::new("dana"), true);
    let mut handle = builder()
        .spawn_versus(session.clone(), Box::new(server.connect_memory()), Arc::new(store.clone()))
        .expect("valid config");

    wait_for(&mut handle, |u| {
        matches!(u, EngineUpdate::VersusNotice(Notice::Joined { .. }))
    })
    .await;
    assert_eq!(store.load().unwrap(), Some(session));

    assert_ok!(handle.send(PlayerCommand::Leave).await);
    wait_for(&mut handle, |u| matches!(u, EngineUpdate::Stopped)).await;
    assert!(!path.exists());
}
