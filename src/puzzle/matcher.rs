//! Puzzle matcher - checks the player's moves against a solution tree
//!
//! # States
//!
//! ```text
//! Loading -> AwaitingUserMove <-> AutoPlayingReply
//!                 |    ^
//!                 v    |
//!           RevertingMove
//! AwaitingUserMove / AutoPlayingReply -> Solved | Failed
//! ```
//!
//! The puzzle position is seeded one move before the player's turn; the
//! opponent's setup move is played after a short delay, like every reply.
//! Delays are [`ScheduledTask`]s carrying a generation number, so a timer
//! from a previous puzzle (or from before a restart) is ignored even if it
//! fires.
//!
//! Once the puzzle is solved or abandoned the line can be stepped through
//! ply by ply.

use crate::core::error_handling::log_and_discard;
use crate::core::events::ClientEvent;
use crate::core::scheduler::{ScheduledTask, Scheduler};
use crate::game::codec::{self, Move};
use crate::game::error::SessionError;
use crate::game::session::{GameSession, GameState};
use crate::game::types::{color_name, parse_color, Color, Square};
use crate::networking::api::PuzzleData;
use crate::puzzle::error::{PuzzleError, PuzzleResult};
use crate::puzzle::tree::PuzzleTree;
use shared::protocol::CompactMove;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PuzzleState {
    Loading,
    AwaitingUserMove,
    AutoPlayingReply,
    RevertingMove,
    Solved,
    Failed,
}

impl PuzzleState {
    /// Whether the line may be stepped through
    pub fn is_finished(self) -> bool {
        matches!(self, PuzzleState::Solved | PuzzleState::Failed)
    }
}

/// Verdict on a submitted move
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    Winning,
    Correct,
    Incorrect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerAction {
    PlaySetupMove,
    PlayReply,
    RevertMove,
}

/// Delayed matcher action, posted back through the event queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PuzzleTimer {
    pub generation: u64,
    pub action: TimerAction,
}

/// Position of the solver in the tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PuzzleCursor {
    pub current_depth: u32,
    pub node: PuzzleTree,
    pub solved: bool,
}

/// A puzzle ready to be played
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Puzzle {
    pub id: String,
    pub fen: String,
    pub user_color: Color,
    pub setup_move: CompactMove,
    pub tree: PuzzleTree,
}

impl TryFrom<PuzzleData> for Puzzle {
    type Error = PuzzleError;

    fn try_from(data: PuzzleData) -> Result<Self, Self::Error> {
        let user_color =
            parse_color(&data.color).ok_or_else(|| PuzzleError::InvalidColor(data.color.clone()))?;
        Ok(Self {
            id: data.id,
            fen: data.fen,
            user_color,
            setup_move: data.initial_move,
            tree: PuzzleTree::from_value(&data.lines)?,
        })
    }
}

pub struct PuzzleMatcher {
    scheduler: Scheduler,
    reply_delay: Duration,
    undo_delay: Duration,
    puzzle: Option<Puzzle>,
    session: GameSession,
    state: PuzzleState,
    cursor: Option<PuzzleCursor>,
    pending_reply: Option<CompactMove>,
    timer: Option<ScheduledTask>,
    generation: u64,
    setup_offset: u32,
    review_line: Vec<Move>,
}

impl PuzzleMatcher {
    pub fn new(scheduler: Scheduler, reply_delay: Duration, undo_delay: Duration) -> Self {
        Self {
            scheduler,
            reply_delay,
            undo_delay,
            puzzle: None,
            session: GameSession::new(),
            state: PuzzleState::Loading,
            cursor: None,
            pending_reply: None,
            timer: None,
            generation: 0,
            setup_offset: 0,
            review_line: Vec::new(),
        }
    }

    /// Start `puzzle` from its initial position.
    ///
    /// Any timer of the previous puzzle is cancelled. The setup move is
    /// played after the reply delay.
    pub fn load(&mut self, puzzle: Puzzle) -> PuzzleResult<()> {
        let session = GameSession::from_fen(&puzzle.fen)?;
        self.cancel_timer();
        self.generation += 1;

        info!(
            "[PUZZLE] Loaded puzzle {} ({} to play)",
            puzzle.id,
            color_name(puzzle.user_color)
        );
        self.session = session;
        self.cursor = Some(PuzzleCursor {
            current_depth: 0,
            node: puzzle.tree.clone(),
            solved: false,
        });
        self.pending_reply = None;
        self.setup_offset = 0;
        self.review_line.clear();
        self.state = PuzzleState::Loading;
        self.puzzle = Some(puzzle);
        self.schedule(self.reply_delay, TimerAction::PlaySetupMove);
        Ok(())
    }

    /// Start the current puzzle over from its initial position
    pub fn restart(&mut self) -> PuzzleResult<()> {
        let puzzle = self.puzzle.clone().ok_or(PuzzleError::NoPuzzle)?;
        self.load(puzzle)
    }

    /// Check a move entered by the player.
    ///
    /// The move is applied right away. A correct move schedules the
    /// opponent's reply; a wrong one schedules its take-back.
    pub fn submit_user_move(&mut self, mv: Move) -> PuzzleResult<MoveOutcome> {
        if self.state != PuzzleState::AwaitingUserMove {
            return Err(PuzzleError::InvalidState {
                operation: "accept a move",
                state: self.state,
            });
        }
        let user_color = self.user_color().ok_or(PuzzleError::NoPuzzle)?;
        if !self.session.can_select(mv.origin, user_color) {
            return Err(SessionError::IllegalMove { mv }.into());
        }

        let state = self.session.apply_move(mv)?;
        let played = state.last_move.unwrap_or(mv);
        let cursor = self.cursor.as_mut().ok_or(PuzzleError::NoPuzzle)?;

        match lookup(&cursor.node, &played).cloned() {
            Some(PuzzleTree::Win) => {
                cursor.current_depth += 1;
                cursor.solved = true;
                cursor.node = PuzzleTree::Win;
                info!("[PUZZLE] {} wins the puzzle", played);
                self.state = PuzzleState::Solved;
                Ok(MoveOutcome::Winning)
            }
            Some(next) => {
                let reply = next.first().map(|(key, _)| key.clone());
                cursor.current_depth += 1;
                cursor.node = next;
                self.pending_reply = reply;
                debug!("[PUZZLE] {} is correct", played);
                self.state = PuzzleState::AutoPlayingReply;
                self.schedule(self.reply_delay, TimerAction::PlayReply);
                Ok(MoveOutcome::Correct)
            }
            None => {
                debug!("[PUZZLE] {} is not the solution", played);
                self.state = PuzzleState::RevertingMove;
                self.schedule(self.undo_delay, TimerAction::RevertMove);
                Ok(MoveOutcome::Incorrect)
            }
        }
    }

    /// Run a delayed action; timers from an older generation are ignored.
    ///
    /// Returns the new state when the board changed.
    pub fn handle_timer(&mut self, timer: PuzzleTimer) -> Option<GameState> {
        if timer.generation != self.generation {
            debug!("[PUZZLE] Ignoring stale timer {:?}", timer);
            return None;
        }
        self.timer = None;

        match (timer.action, self.state) {
            (TimerAction::PlaySetupMove, PuzzleState::Loading) => self.play_setup_move(),
            (TimerAction::PlayReply, PuzzleState::AutoPlayingReply) => self.play_reply(),
            (TimerAction::RevertMove, PuzzleState::RevertingMove) => {
                let state = log_and_discard(
                    self.session.undo_last(),
                    "reverting wrong puzzle move",
                );
                self.state = PuzzleState::AwaitingUserMove;
                state
            }
            (action, state) => {
                debug!("[PUZZLE] Timer {:?} does not apply while {:?}", action, state);
                None
            }
        }
    }

    /// Give up; the line can then be reviewed
    pub fn abandon(&mut self) {
        if self.state.is_finished() || self.puzzle.is_none() {
            return;
        }
        self.cancel_timer();
        self.generation += 1;
        if self.state == PuzzleState::RevertingMove {
            log_and_discard(
                self.session.undo_last(),
                "reverting wrong move on abandon",
            );
        }
        info!("[PUZZLE] Puzzle abandoned");
        self.state = PuzzleState::Failed;
    }

    /// Replay the next ply of the solution line
    pub fn step_forward(&mut self) -> PuzzleResult<Option<GameState>> {
        self.ensure_reviewable("step forward")?;
        let index = self.session.ply_count() as usize;
        let Some(mv) = self.review_line.get(index).copied() else {
            return Ok(None);
        };
        Ok(Some(self.session.apply_move(mv)?))
    }

    /// Take back one ply, never past the setup move
    pub fn step_backward(&mut self) -> PuzzleResult<Option<GameState>> {
        self.ensure_reviewable("step backward")?;
        if self.session.ply_count() <= self.setup_offset {
            return Ok(None);
        }
        Ok(Some(self.session.undo_last()?))
    }

    /// Cancel pending timers; nothing from this puzzle runs afterwards
    pub fn teardown(&mut self) {
        self.cancel_timer();
        self.generation += 1;
    }

    /// Index of the current move within the puzzle, not counting the setup move
    pub fn current_move_index(&self) -> u32 {
        self.session.ply_count().saturating_sub(self.setup_offset)
    }

    /// Whether the player may pick up the piece on `square`
    pub fn can_select(&self, square: Square) -> bool {
        self.state == PuzzleState::AwaitingUserMove
            && self
                .user_color()
                .is_some_and(|color| self.session.can_select(square, color))
    }

    pub fn state(&self) -> PuzzleState {
        self.state
    }

    pub fn session(&self) -> &GameSession {
        &self.session
    }

    pub fn cursor(&self) -> Option<&PuzzleCursor> {
        self.cursor.as_ref()
    }

    pub fn puzzle(&self) -> Option<&Puzzle> {
        self.puzzle.as_ref()
    }

    pub fn user_color(&self) -> Option<Color> {
        self.puzzle.as_ref().map(|p| p.user_color)
    }

    fn play_setup_move(&mut self) -> Option<GameState> {
        let setup = self.puzzle.as_ref()?.setup_move.clone();
        let applied = codec::decode(setup.as_str(), None)
            .map_err(PuzzleError::from)
            .and_then(|mv| Ok(self.session.apply_move(mv)?));

        match applied {
            Ok(state) => {
                self.setup_offset = state.ply_count;
                self.state = PuzzleState::AwaitingUserMove;
                Some(state)
            }
            Err(e) => {
                warn!("[PUZZLE] Setup move {} failed: {}", setup, e);
                self.state = PuzzleState::Failed;
                None
            }
        }
    }

    fn play_reply(&mut self) -> Option<GameState> {
        let reply = self.pending_reply.take()?;
        let applied = codec::decode(reply.as_str(), None)
            .map_err(PuzzleError::from)
            .and_then(|mv| Ok(self.session.apply_move(mv)?));

        let state = match applied {
            Ok(state) => state,
            Err(e) => {
                warn!("[PUZZLE] Reply {} failed: {}", reply, e);
                self.state = PuzzleState::Failed;
                return None;
            }
        };

        let cursor = self.cursor.as_mut()?;
        let next = cursor.node.child(reply.as_str()).cloned()?;
        cursor.current_depth += 1;
        if next.is_win() {
            cursor.solved = true;
            info!("[PUZZLE] Line complete after reply {}", reply);
            self.state = PuzzleState::Solved;
        } else {
            self.state = PuzzleState::AwaitingUserMove;
        }
        cursor.node = next;
        Some(state)
    }

    fn ensure_reviewable(&mut self, operation: &'static str) -> PuzzleResult<()> {
        if !self.state.is_finished() {
            return Err(PuzzleError::InvalidState {
                operation,
                state: self.state,
            });
        }
        if self.review_line.is_empty() {
            self.review_line = self.build_review_line();
        }
        Ok(())
    }

    /// Moves played so far followed by the main line from the cursor
    fn build_review_line(&self) -> Vec<Move> {
        let mut line = self.session.history().to_vec();
        if let Some(cursor) = &self.cursor {
            line.extend(
                cursor
                    .node
                    .principal_line()
                    .iter()
                    .filter_map(|key| codec::decode(key.as_str(), None).ok()),
            );
        }
        line
    }

    fn schedule(&mut self, delay: Duration, action: TimerAction) {
        let timer = PuzzleTimer {
            generation: self.generation,
            action,
        };
        self.timer = Some(self.scheduler.after(delay, ClientEvent::Puzzle(timer)));
    }

    fn cancel_timer(&mut self) {
        if let Some(task) = self.timer.take() {
            task.cancel();
        }
    }
}

/// Tree node for `played`; a promotion may be keyed with or without its piece
fn lookup<'a>(node: &'a PuzzleTree, played: &Move) -> Option<&'a PuzzleTree> {
    let key = codec::encode(played);
    node.child(key.as_str()).or_else(|| {
        played
            .promotion
            .and_then(|_| node.child(&key.as_str()[..4]))
    })
}

impl std::fmt::Debug for PuzzleMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PuzzleMatcher")
            .field("puzzle", &self.puzzle.as_ref().map(|p| &p.id))
            .field("state", &self.state)
            .field("generation", &self.generation)
            .field("move_index", &self.current_move_index())
            .finish()
    }
}
