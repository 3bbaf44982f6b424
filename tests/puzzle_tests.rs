//! Puzzle Tests
//!
//! Runs the puzzle matcher against its timers on a paused clock: setup
//! move, correct and wrong answers, restarts, giving up and reviewing the
//! line afterwards.

use chess_sync::core::{ClientEvent, EventReceiver, Scheduler};
use chess_sync::game::codec::Move;
use chess_sync::game::{Color, GameState, SessionError, Square};
use chess_sync::networking::api::parse_puzzle;
use chess_sync::puzzle::matcher::TimerAction;
use chess_sync::puzzle::{
    MoveOutcome, Puzzle, PuzzleError, PuzzleMatcher, PuzzleState, PuzzleTimer, PuzzleTree,
};
use serde_json::{json, Value};
use std::time::Duration;

const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";
const DELAY: Duration = Duration::from_secs(1);

// ============================================================================
// Helpers
// ============================================================================

fn puzzle(fen: &str, user_color: Color, setup: &str, lines: Value) -> Puzzle {
    Puzzle {
        id: "p1".to_owned(),
        fen: fen.to_owned(),
        user_color,
        setup_move: setup.into(),
        tree: PuzzleTree::from_value(&lines).expect("test tree is valid"),
    }
}

/// Black answers 1.d4 with ...d5, White plays c4, ...e6 wins
// A d2d4 setup leaves Black to move, so the user's line is played as Black
fn queens_gambit() -> Puzzle {
    puzzle(
        START_FEN,
        Color::Black,
        "d2d4",
        json!({"d7d5": {"c2c4": {"e7e6": "win"}}}),
    )
}

fn matcher() -> (PuzzleMatcher, EventReceiver) {
    let (scheduler, events) = Scheduler::channel();
    (PuzzleMatcher::new(scheduler, DELAY, DELAY), events)
}

fn mv(text: &str) -> Move {
    text.parse().expect("test move parses")
}

async fn next_timer(events: &mut EventReceiver) -> PuzzleTimer {
    loop {
        match events.recv().await {
            Some(ClientEvent::Puzzle(timer)) => return timer,
            Some(_) => continue,
            None => panic!("event queue closed while waiting for a timer"),
        }
    }
}

/// Wait for the next timer and let the matcher run it
async fn fire(matcher: &mut PuzzleMatcher, events: &mut EventReceiver) -> Option<GameState> {
    let timer = next_timer(events).await;
    matcher.handle_timer(timer)
}

/// Load the puzzle and play its setup move
async fn loaded(puzzle: Puzzle) -> (PuzzleMatcher, EventReceiver) {
    let (mut matcher, mut events) = matcher();
    matcher.load(puzzle).expect("puzzle loads");
    fire(&mut matcher, &mut events)
        .await
        .expect("setup move is played");
    (matcher, events)
}

// ============================================================================
// Setup Move
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_setup_move_waits_for_the_delay() {
    let (mut matcher, mut events) = matcher();
    matcher.load(queens_gambit()).expect("puzzle loads");

    assert_eq!(matcher.state(), PuzzleState::Loading);
    assert!(!matcher.can_select(Square::D7), "no input before the setup move");

    tokio::time::sleep(Duration::from_millis(900)).await;
    assert!(events.try_recv().is_err(), "setup move is not due yet");

    let state = fire(&mut matcher, &mut events)
        .await
        .expect("setup move is played");
    assert_eq!(state.ply_count, 1);
    assert_eq!(state.turn_to_move, Color::Black);
    assert_eq!(matcher.state(), PuzzleState::AwaitingUserMove);
    assert_eq!(matcher.current_move_index(), 0, "setup move is not counted");
}

#[tokio::test(start_paused = true)]
async fn test_selection_follows_user_color() {
    let (matcher, _events) = loaded(queens_gambit()).await;

    assert!(matcher.can_select(Square::D7));
    assert!(!matcher.can_select(Square::D4), "opponent pieces stay put");
    assert!(!matcher.can_select(Square::E4), "empty squares cannot be picked");
}

// ============================================================================
// Solving
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_correct_line_is_solved() {
    let (mut matcher, mut events) = loaded(queens_gambit()).await;

    assert_eq!(matcher.submit_user_move(mv("d7d5")), Ok(MoveOutcome::Correct));
    assert_eq!(matcher.state(), PuzzleState::AutoPlayingReply);
    assert!(!matcher.can_select(Square::E7), "input is blocked during the reply");

    let state = fire(&mut matcher, &mut events)
        .await
        .expect("reply is played");
    assert_eq!(state.last_move, Some(mv("c2c4")));
    assert_eq!(matcher.state(), PuzzleState::AwaitingUserMove);
    assert_eq!(matcher.current_move_index(), 2);

    assert_eq!(matcher.submit_user_move(mv("e7e6")), Ok(MoveOutcome::Winning));
    assert_eq!(matcher.state(), PuzzleState::Solved);

    let cursor = matcher.cursor().expect("cursor exists");
    assert!(cursor.solved);
    assert_eq!(cursor.current_depth, 3);
}

#[tokio::test(start_paused = true)]
async fn test_reply_onto_win_marker_solves() {
    let (mut matcher, mut events) = loaded(puzzle(
        START_FEN,
        Color::Black,
        "d2d4",
        json!({"d7d5": {"c2c4": "win"}}),
    ))
    .await;

    matcher.submit_user_move(mv("d7d5")).expect("move accepted");
    fire(&mut matcher, &mut events).await;

    assert_eq!(matcher.state(), PuzzleState::Solved);
}

#[tokio::test(start_paused = true)]
async fn test_promotion_matches_key_without_piece() {
    let (mut matcher, _events) = loaded(puzzle(
        "7k/P7/8/8/8/8/8/K7 b - - 0 1",
        Color::White,
        "h8g8",
        json!({"a7a8": "win"}),
    ))
    .await;

    assert_eq!(matcher.submit_user_move(mv("a7a8q")), Ok(MoveOutcome::Winning));
}

#[tokio::test(start_paused = true)]
async fn test_move_during_reply_is_refused() {
    let (mut matcher, _events) = loaded(queens_gambit()).await;
    matcher.submit_user_move(mv("d7d5")).expect("move accepted");

    assert!(matches!(
        matcher.submit_user_move(mv("e7e6")),
        Err(PuzzleError::InvalidState {
            state: PuzzleState::AutoPlayingReply,
            ..
        })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_opponent_piece_is_refused() {
    let (mut matcher, _events) = loaded(queens_gambit()).await;

    assert_eq!(
        matcher.submit_user_move(mv("e2e4")),
        Err(PuzzleError::Session(SessionError::IllegalMove { mv: mv("e2e4") }))
    );
    assert_eq!(matcher.session().ply_count(), 1);
}

// ============================================================================
// Wrong Moves
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_wrong_move_is_taken_back() {
    let (mut matcher, mut events) = loaded(queens_gambit()).await;
    let before = matcher.session().fen();

    assert_eq!(matcher.submit_user_move(mv("e7e5")), Ok(MoveOutcome::Incorrect));
    assert_eq!(matcher.state(), PuzzleState::RevertingMove);
    assert_eq!(matcher.session().ply_count(), 2, "wrong move is shown first");

    let timer = next_timer(&mut events).await;
    assert_eq!(timer.action, TimerAction::RevertMove);
    let state = matcher.handle_timer(timer).expect("move is reverted");

    assert_eq!(state.fen, before);
    assert_eq!(matcher.state(), PuzzleState::AwaitingUserMove);
    assert_eq!(matcher.submit_user_move(mv("d7d5")), Ok(MoveOutcome::Correct));
}

// ============================================================================
// Restart, Abandon And Review
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_restart_ignores_old_timers() {
    let (mut matcher, mut events) = loaded(queens_gambit()).await;
    matcher.submit_user_move(mv("d7d5")).expect("move accepted");

    // Let the reply come due, then restart before it is handled
    let stale = next_timer(&mut events).await;
    matcher.restart().expect("puzzle restarts");

    assert_eq!(matcher.handle_timer(stale), None, "stale reply must be ignored");
    assert_eq!(matcher.state(), PuzzleState::Loading);
    assert_eq!(matcher.session().ply_count(), 0);

    let state = fire(&mut matcher, &mut events)
        .await
        .expect("setup move is replayed");
    assert_eq!(state.ply_count, 1);
    assert_eq!(matcher.state(), PuzzleState::AwaitingUserMove);
}

#[tokio::test(start_paused = true)]
async fn test_abandon_undoes_pending_wrong_move() {
    let (mut matcher, mut events) = loaded(queens_gambit()).await;
    matcher.submit_user_move(mv("e7e5")).expect("move accepted");

    matcher.abandon();

    assert_eq!(matcher.state(), PuzzleState::Failed);
    assert_eq!(matcher.session().ply_count(), 1);
    assert_eq!(
        matcher.session().turn(),
        Color::Black,
        "wrong reply is taken back on abandon"
    );
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(events.try_recv().is_err(), "revert timer was cancelled");
}

#[tokio::test(start_paused = true)]
async fn test_review_steps_through_solution() {
    let (mut matcher, _events) = loaded(queens_gambit()).await;
    matcher.abandon();

    let replayed: Vec<Move> = std::iter::from_fn(|| {
        matcher
            .step_forward()
            .expect("review is allowed")
            .and_then(|state| state.last_move)
    })
    .collect();
    assert_eq!(replayed, vec![mv("d7d5"), mv("c2c4"), mv("e7e6")]);
    assert_eq!(matcher.current_move_index(), 3);

    let mut steps_back = 0;
    while matcher.step_backward().expect("review is allowed").is_some() {
        steps_back += 1;
    }
    assert_eq!(steps_back, 3, "stepping back stops at the setup move");
    assert_eq!(matcher.session().ply_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_review_needs_a_finished_puzzle() {
    let (mut matcher, _events) = loaded(queens_gambit()).await;

    assert!(matches!(
        matcher.step_forward(),
        Err(PuzzleError::InvalidState { .. })
    ));
    assert!(matches!(
        matcher.step_backward(),
        Err(PuzzleError::InvalidState { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_teardown_cancels_reply() {
    let (mut matcher, mut events) = loaded(queens_gambit()).await;
    matcher.submit_user_move(mv("d7d5")).expect("move accepted");

    matcher.teardown();

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(events.try_recv().is_err(), "no timer after teardown");
}

// ============================================================================
// Puzzle Data
// ============================================================================

#[test]
fn test_puzzle_from_training_response() {
    let body = r#"{"puzzle":{"id":61253,"fen":"rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1",
        "color":"black","initialMove":{"uci":"d2d4"},"lines":{"d7d5":{"c2c4":"win"}}}}"#;

    let data = parse_puzzle(body).expect("response parses");
    let puzzle = Puzzle::try_from(data).expect("puzzle converts");

    assert_eq!(puzzle.id, "61253");
    assert_eq!(puzzle.user_color, Color::Black);
    assert_eq!(puzzle.setup_move.as_str(), "d2d4");
    assert_eq!(puzzle.tree.principal_line().len(), 2);
}

#[test]
fn test_puzzle_with_unknown_color_is_rejected() {
    let body = r#"{"puzzle":{"id":"abc","fen":"8/8/8/8/8/8/8/8 w - - 0 1",
        "color":"green","initialMove":"e2e4","lines":{"e7e5":"win"}}}"#;

    let data = parse_puzzle(body).expect("response parses");
    assert_eq!(
        Puzzle::try_from(data),
        Err(PuzzleError::InvalidColor("green".to_owned()))
    );
}

#[tokio::test(start_paused = true)]
async fn test_invalid_fen_fails_to_load() {
    let (mut matcher, _events) = matcher();
    let bad = puzzle("not a fen", Color::White, "e2e4", json!({"e7e5": "win"}));

    assert!(matches!(
        matcher.load(bad),
        Err(PuzzleError::Session(SessionError::InvalidPosition { .. }))
    ));
    assert!(matcher.puzzle().is_none());
}
