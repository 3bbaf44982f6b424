//! Networking Tests
//!
//! Drives the sync engine through its public event interface with an
//! in-memory transport and game directory. Covers sequence filtering, batch
//! handling, the reload/reconnect protocol and teardown.

use async_trait::async_trait;
use chess_sync::core::{ClientEvent, EventReceiver, Scheduler};
use chess_sync::game::clock::GameClock;
use chess_sync::game::{Color, GameSession, Move, Outcome};
use chess_sync::networking::connection::ConnectionState;
use chess_sync::networking::{
    ApiError, ConnectionEndpoint, ConnectionId, ConnectionManager, Connector, GameDirectory, Link,
    RolePolicy, SyncEngine, SyncUpdate, TransportEvent,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Fakes
// ============================================================================

#[derive(Default)]
struct Wire {
    opened: Vec<(ConnectionId, String)>,
    sent: Vec<(ConnectionId, String)>,
    closed: Vec<ConnectionId>,
}

struct FakeConnector(Arc<Mutex<Wire>>);

struct FakeLink {
    id: ConnectionId,
    wire: Arc<Mutex<Wire>>,
}

impl Link for FakeLink {
    fn send(&mut self, text: String) -> bool {
        self.wire.lock().sent.push((self.id, text));
        true
    }

    fn close(&mut self) {
        self.wire.lock().closed.push(self.id);
    }
}

impl Connector for FakeConnector {
    fn open(&mut self, id: ConnectionId, url: &str, _: &Scheduler) -> Box<dyn Link> {
        self.0.lock().opened.push((id, url.to_owned()));
        Box::new(FakeLink {
            id,
            wire: self.0.clone(),
        })
    }
}

#[derive(Default)]
struct FakeDirectory {
    responses: Mutex<VecDeque<Result<ConnectionEndpoint, ApiError>>>,
    calls: AtomicUsize,
}

impl FakeDirectory {
    fn respond(&self, response: Result<ConnectionEndpoint, ApiError>) {
        self.responses.lock().push_back(response);
    }
}

#[async_trait]
impl GameDirectory for FakeDirectory {
    async fn fetch_game(&self, game_id: &str) -> Result<ConnectionEndpoint, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.responses.lock().pop_front().unwrap_or_else(|| {
            Err(ApiError::Payload {
                endpoint: game_id.to_owned(),
                reason: "no response queued".to_owned(),
            })
        })
    }
}

struct Harness {
    engine: SyncEngine,
    wire: Arc<Mutex<Wire>>,
    directory: Arc<FakeDirectory>,
    events: EventReceiver,
}

impl Harness {
    fn new(local_color: Color) -> Self {
        let wire = Arc::new(Mutex::new(Wire::default()));
        let directory = Arc::new(FakeDirectory::default());
        let (scheduler, events) = Scheduler::channel();
        let connection = ConnectionManager::new(
            Box::new(FakeConnector(wire.clone())),
            scheduler.clone(),
            Duration::from_secs(1),
        );
        let engine = SyncEngine::new(
            GameSession::new(),
            connection,
            RolePolicy::vs_computer(3, local_color),
            directory.clone(),
            scheduler,
            "game1",
            GameClock::unlimited(),
        );
        Self {
            engine,
            wire,
            directory,
            events,
        }
    }

    /// Start on the first endpoint and report it open
    fn open(local_color: Color) -> Self {
        let mut harness = Self::new(local_color);
        harness
            .engine
            .start(ConnectionEndpoint::new("wss://socket/game1", 0))
            .expect("engine starts");
        harness.transport(1, TransportEvent::Opened);
        harness.engine.drain_updates();
        harness
    }

    fn transport(&mut self, id: u64, event: TransportEvent) {
        self.engine.handle(ClientEvent::Transport {
            connection: ConnectionId(id),
            event,
        });
    }

    fn frame(&mut self, id: u64, text: &str) {
        self.transport(id, TransportEvent::Text(text.to_owned()));
    }

    fn local_move(&mut self, text: &str) {
        let mv: Move = text.parse().expect("test move parses");
        self.engine.handle(ClientEvent::LocalMove(mv));
    }

    /// Wait for the reload fetch to finish and feed its result to the engine
    async fn finish_fetch(&mut self) {
        loop {
            match self.events.recv().await {
                Some(event @ ClientEvent::EndpointFetched(_)) => {
                    self.engine.handle(event);
                    return;
                }
                Some(_) => continue,
                None => panic!("event queue closed before the fetch finished"),
            }
        }
    }

    fn sent(&self) -> Vec<String> {
        self.wire.lock().sent.iter().map(|(_, text)| text.clone()).collect()
    }
}

fn move_frame(seq: u64, uci: &str) -> String {
    format!(r#"{{"t":"move","v":{seq},"d":{{"uci":"{uci}","ply":{}}}}}"#, seq + 1)
}

// ============================================================================
// Sequence Filtering
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_move_at_current_ply_is_applied_once() {
    //! `v:5` at ply count 5 is applied; the identical frame again changes nothing
    let mut h = Harness::open(Color::White);
    for (seq, uci) in ["e2e4", "e7e5", "g1f3", "b8c6", "f1c4"].iter().enumerate() {
        h.frame(1, &move_frame(seq as u64, uci));
    }
    assert_eq!(h.engine.session().ply_count(), 5);

    h.frame(1, r#"{"t":"move","v":5,"d":{"uci":"g8f6"}}"#);
    let after_first = h.engine.state();
    assert_eq!(after_first.ply_count, 6);

    h.frame(1, r#"{"t":"move","v":5,"d":{"uci":"g8f6"}}"#);
    assert_eq!(h.engine.state(), after_first, "replay must not change state");
    assert_eq!(h.engine.last_applied_seq(), Some(5));
}

#[tokio::test(start_paused = true)]
async fn test_old_sequence_is_dropped() {
    let mut h = Harness::open(Color::Black);
    h.frame(1, &move_frame(0, "e2e4"));
    h.frame(1, &move_frame(1, "e7e5"));

    // A replay of the first move after both were applied
    h.frame(1, &move_frame(0, "e2e4"));

    assert_eq!(h.engine.session().ply_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_clock_snapshot_applies_even_on_duplicate() {
    let mut h = Harness::open(Color::Black);
    h.frame(1, &move_frame(0, "e2e4"));
    h.engine.drain_updates();

    h.frame(
        1,
        r#"{"t":"move","v":0,"d":{"uci":"e2e4","clock":{"white":42.9,"black":55.0}}}"#,
    );

    assert_eq!(h.engine.session().ply_count(), 1);
    assert_eq!(h.engine.clock().remaining(Color::White), Some(42));
    assert_eq!(h.engine.clock().remaining(Color::Black), Some(55));
    assert!(matches!(
        h.engine.drain_updates().as_slice(),
        [SyncUpdate::ClockUpdated(_)]
    ));
}

#[tokio::test(start_paused = true)]
async fn test_castle_uses_king_squares() {
    let mut h = Harness::open(Color::Black);
    for (seq, uci) in ["e2e4", "e7e5", "g1f3", "b8c6", "f1c4", "g8f6"].iter().enumerate() {
        h.frame(1, &move_frame(seq as u64, uci));
    }

    h.frame(
        1,
        r#"{"t":"move","v":6,"d":{"uci":"h1f1","castle":{"king":["e1","g1"],"rook":["h1","f1"]}}}"#,
    );

    let state = h.engine.state();
    assert_eq!(state.ply_count, 7);
    assert_eq!(state.last_move.map(|m| m.to_string()).as_deref(), Some("e1g1"));
}

// ============================================================================
// Local Moves
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_local_move_is_sent_and_echo_ignored() {
    let mut h = Harness::open(Color::White);

    h.local_move("e2e4");
    assert_eq!(h.engine.session().ply_count(), 1);
    assert_eq!(h.sent(), vec![r#"{"t":"move","d":{"from":"e2","to":"e4"}}"#.to_owned()]);

    // The server echoes our own move back
    h.frame(1, &move_frame(0, "e2e4"));
    assert_eq!(h.engine.session().ply_count(), 1, "echo must not be re-applied");

    h.frame(1, &move_frame(1, "c7c5"));
    assert_eq!(h.engine.session().ply_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_local_move_out_of_turn_is_refused() {
    let mut h = Harness::open(Color::Black);

    h.local_move("e7e5");

    assert_eq!(h.engine.session().ply_count(), 0);
    assert!(h.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_local_move_during_reconnect_stays_local() {
    //! The move is applied on the board but not queued for the new socket
    let mut h = Harness::open(Color::White);
    h.frame(1, r#"{"t":"reload","v":1}"#);
    assert_eq!(h.engine.connection().state(), ConnectionState::Reconnecting);

    h.local_move("d2d4");

    assert_eq!(h.engine.session().ply_count(), 1);
    assert!(h.sent().is_empty());
}

// ============================================================================
// Batches And Game End
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_batch_stops_at_mate() {
    let mut h = Harness::open(Color::White);
    let batch = r#"{"t":"b","d":[
        {"t":"move","v":0,"d":{"uci":"f2f3"}},
        {"t":"move","v":1,"d":{"uci":"e7e5"}},
        {"t":"move","v":2,"d":{"uci":"g2g4"}},
        {"t":"move","v":3,"d":{"uci":"d8h4","status":{"name":"mate"}}},
        {"t":"move","v":4,"d":{"uci":"a2a3"}}
    ]}"#;

    h.frame(1, batch);

    assert_eq!(h.engine.session().ply_count(), 4);
    let black_wins = Outcome::Checkmate {
        winner: Color::Black,
    };
    assert_eq!(h.engine.session().outcome(), black_wins);
    assert!(h
        .engine
        .drain_updates()
        .contains(&SyncUpdate::GameOver(black_wins)));
}

#[tokio::test(start_paused = true)]
async fn test_batch_skips_undecodable_entry() {
    let mut h = Harness::open(Color::White);
    let batch = r#"{"t":"b","d":[
        {"t":"move","v":0,"d":{"uci":"e2e4"}},
        {"t":"end","d":"purple"},
        {"t":"move","v":1,"d":{"uci":"e7e5"}}
    ]}"#;

    h.frame(1, batch);

    assert_eq!(
        h.engine.session().ply_count(),
        2,
        "good entries around a bad one still apply"
    );
    assert_eq!(h.engine.session().outcome(), Outcome::Pending);
}

#[tokio::test(start_paused = true)]
async fn test_game_end_latches_resignation() {
    let mut h = Harness::open(Color::White);
    h.frame(1, &move_frame(0, "e2e4"));

    h.frame(1, r#"{"t":"end","d":{"winner":"white","status":{"name":"resign"}}}"#);

    assert_eq!(
        h.engine.session().outcome(),
        Outcome::Resigned { by: Color::Black }
    );

    h.frame(1, &move_frame(1, "e7e5"));
    assert_eq!(h.engine.session().ply_count(), 1, "no moves after the end");
}

#[tokio::test(start_paused = true)]
async fn test_game_end_draw() {
    let mut h = Harness::open(Color::White);
    h.frame(1, r#"{"t":"end","d":null}"#);
    assert_eq!(h.engine.session().outcome(), Outcome::Draw);
}

// ============================================================================
// Reload And Reconnect
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_reload_moves_to_fresh_endpoint() {
    let mut h = Harness::open(Color::White);
    h.directory
        .respond(Ok(ConnectionEndpoint::new("wss://socket/game1/v2", 2)));

    h.frame(1, r#"{"t":"reload","v":2}"#);
    assert_eq!(h.engine.connection().state(), ConnectionState::Reconnecting);
    assert!(h.engine.is_reconnect_pending());

    h.finish_fetch().await;
    assert_eq!(h.engine.connection().state(), ConnectionState::Connecting);
    assert_eq!(h.engine.connection().active_id(), Some(ConnectionId(2)));
    assert_eq!(h.wire.lock().closed, vec![ConnectionId(1)]);

    h.transport(2, TransportEvent::Opened);
    assert_eq!(h.engine.connection().state(), ConnectionState::Open);

    let states: Vec<ConnectionState> = h
        .engine
        .drain_updates()
        .into_iter()
        .filter_map(|update| match update {
            SyncUpdate::Connection(state) => Some(state),
            _ => None,
        })
        .collect();
    assert_eq!(
        states,
        vec![
            ConnectionState::Reconnecting,
            ConnectionState::Connecting,
            ConnectionState::Open
        ]
    );

    // Only the new socket's heartbeat is running
    tokio::time::sleep(Duration::from_millis(2500)).await;
    while let Ok(event) = h.events.try_recv() {
        if let ClientEvent::HeartbeatDue { connection } = event {
            assert_eq!(connection, ConnectionId(2));
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_second_reload_is_coalesced() {
    let mut h = Harness::open(Color::White);
    h.directory
        .respond(Ok(ConnectionEndpoint::new("wss://socket/game1/v2", 3)));

    h.frame(1, r#"{"t":"reload","v":2}"#);
    h.frame(1, r#"{"t":"b","d":[{"t":"reload","v":3}]}"#);
    h.finish_fetch().await;

    assert_eq!(h.directory.calls.load(Ordering::SeqCst), 1, "one fetch only");
    assert_eq!(h.wire.lock().opened.len(), 2);
    assert!(!h.engine.is_reconnect_pending());
}

#[tokio::test(start_paused = true)]
async fn test_stale_endpoint_keeps_current_socket() {
    let mut h = Harness::open(Color::White);
    h.directory
        .respond(Ok(ConnectionEndpoint::new("wss://socket/old", 1)));

    h.frame(1, r#"{"t":"reload","v":2}"#);
    h.finish_fetch().await;

    assert_eq!(h.engine.connection().state(), ConnectionState::Open);
    assert_eq!(h.engine.connection().active_id(), Some(ConnectionId(1)));
    assert!(h.engine.connection().is_heartbeat_running());
    assert!(h.wire.lock().closed.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_failed_fetch_returns_to_open() {
    let mut h = Harness::open(Color::White);

    h.frame(1, r#"{"t":"reload","v":1}"#);
    h.finish_fetch().await;

    assert_eq!(h.engine.connection().state(), ConnectionState::Open);
    assert!(!h.engine.is_reconnect_pending());

    // A later reload is handled again
    h.directory
        .respond(Ok(ConnectionEndpoint::new("wss://socket/game1/v2", 2)));
    h.frame(1, r#"{"t":"reload","v":2}"#);
    h.finish_fetch().await;
    assert_eq!(h.engine.connection().active_id(), Some(ConnectionId(2)));
}

#[tokio::test(start_paused = true)]
async fn test_moves_after_reconnect_continue_sequence() {
    let mut h = Harness::open(Color::Black);
    h.frame(1, &move_frame(0, "e2e4"));
    h.directory
        .respond(Ok(ConnectionEndpoint::new("wss://socket/game1/v2", 1)));
    h.frame(1, r#"{"t":"reload","v":1}"#);
    h.finish_fetch().await;
    h.transport(2, TransportEvent::Opened);

    // The new socket replays the first move before anything new
    h.frame(2, &move_frame(0, "e2e4"));
    assert_eq!(h.engine.session().ply_count(), 1);

    // Late frames from the old socket are ignored entirely
    h.frame(1, &move_frame(1, "e7e5"));
    assert_eq!(h.engine.session().ply_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_reload_behind_applied_moves_is_ignored() {
    //! A reload naming a sequence older than the last applied move leaves the
    //! socket alone and never asks the directory for an endpoint
    let mut h = Harness::open(Color::White);
    for (seq, uci) in ["e2e4", "e7e5", "g1f3", "b8c6", "f1c4"].iter().enumerate() {
        h.frame(1, &move_frame(seq as u64, uci));
    }
    assert_eq!(h.engine.last_applied_seq(), Some(4));

    h.frame(1, r#"{"t":"reload","v":2}"#);

    assert_eq!(h.engine.connection().state(), ConnectionState::Open);
    assert!(!h.engine.is_reconnect_pending(), "no reconnect started");
    assert!(h.engine.connection().is_heartbeat_running());
    assert_eq!(h.directory.calls.load(Ordering::SeqCst), 0, "no fetch");
}

#[tokio::test(start_paused = true)]
async fn test_old_socket_closing_during_reload_still_reconnects() {
    //! The server drops the old socket right after asking for a reload; the
    //! game must move to the fresh endpoint instead of ending
    let mut h = Harness::open(Color::White);
    h.directory
        .respond(Ok(ConnectionEndpoint::new("wss://socket/game1/v2", 2)));

    h.frame(1, r#"{"t":"reload","v":2}"#);
    h.transport(1, TransportEvent::Closed);
    assert_eq!(
        h.engine.connection().state(),
        ConnectionState::Reconnecting,
        "peer close must not end a pending reconnect"
    );
    assert!(h.engine.is_reconnect_pending());

    h.finish_fetch().await;
    assert_eq!(h.engine.connection().state(), ConnectionState::Connecting);
    assert_eq!(h.engine.connection().active_id(), Some(ConnectionId(2)));

    h.transport(2, TransportEvent::Opened);
    assert_eq!(h.engine.connection().state(), ConnectionState::Open);
    assert!(!h
        .engine
        .drain_updates()
        .contains(&SyncUpdate::Connection(ConnectionState::Closed)));
}

#[tokio::test(start_paused = true)]
async fn test_old_socket_closing_then_failed_fetch_closes() {
    let mut h = Harness::open(Color::White);

    h.frame(1, r#"{"t":"reload","v":1}"#);
    h.transport(1, TransportEvent::Closed);
    h.finish_fetch().await;

    assert_eq!(h.engine.connection().state(), ConnectionState::Closed);
    assert!(!h.engine.is_reconnect_pending());
}

// ============================================================================
// Heartbeat And Teardown
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_heartbeat_carries_ply_count() {
    let mut h = Harness::open(Color::Black);
    h.frame(1, &move_frame(0, "e2e4"));

    tokio::time::sleep(Duration::from_millis(1100)).await;
    while let Ok(event) = h.events.try_recv() {
        h.engine.handle(event);
    }

    assert_eq!(h.sent(), vec![r#"{"t":"p","v":1}"#.to_owned()]);
}

#[tokio::test(start_paused = true)]
async fn test_teardown_silences_timers() {
    let mut h = Harness::open(Color::White);
    h.frame(1, r#"{"t":"reload","v":1}"#);

    h.engine.handle(ClientEvent::Shutdown);

    assert_eq!(h.engine.connection().state(), ConnectionState::Closed);
    assert!(!h.engine.is_reconnect_pending());
    tokio::time::sleep(Duration::from_secs(3)).await;
    while let Ok(event) = h.events.try_recv() {
        assert!(
            !matches!(event, ClientEvent::HeartbeatDue { .. }),
            "no heartbeat after teardown"
        );
    }
}
