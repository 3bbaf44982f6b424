//! Puzzle solution tree
//!
//! Served as nested JSON objects keyed by compact moves:
//!
//! ```json
//! {"d7d5": {"c2c4": {"e7e6": "win"}}}
//! ```
//!
//! Keys at even depth are the player's candidate moves; each maps either to
//! the `"win"` marker or to an object whose first key is the opponent's
//! single reply. Entries marked `"retry"` are not part of the solution and
//! are dropped at parse time, so looking them up behaves like any other
//! wrong move. Key order is kept as served.

use crate::puzzle::error::{PuzzleError, PuzzleResult};
use serde_json::Value;
use shared::protocol::CompactMove;

const WIN_MARKER: &str = "win";
const RETRY_MARKER: &str = "retry";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PuzzleTree {
    Win,
    Branch(Vec<(CompactMove, PuzzleTree)>),
}

impl PuzzleTree {
    /// Parse the root of a solution tree; the root must be a branch
    pub fn from_value(value: &Value) -> PuzzleResult<Self> {
        match parse_node(value)? {
            PuzzleTree::Win => Err(invalid("the root cannot be a win marker")),
            branch => Ok(branch),
        }
    }

    pub fn is_win(&self) -> bool {
        matches!(self, PuzzleTree::Win)
    }

    /// Node reached by playing `mv` here
    pub fn child(&self, mv: &str) -> Option<&PuzzleTree> {
        match self {
            PuzzleTree::Win => None,
            PuzzleTree::Branch(children) => children
                .iter()
                .find(|(key, _)| key.as_str() == mv)
                .map(|(_, node)| node),
        }
    }

    /// First entry of this node: the opponent's reply, or the main line move
    pub fn first(&self) -> Option<(&CompactMove, &PuzzleTree)> {
        match self {
            PuzzleTree::Win => None,
            PuzzleTree::Branch(children) => children.first().map(|(key, node)| (key, node)),
        }
    }

    /// Main line from this node, following first keys down to a win
    pub fn principal_line(&self) -> Vec<CompactMove> {
        let mut line = Vec::new();
        let mut node = self;
        while let Some((key, next)) = node.first() {
            line.push(key.clone());
            node = next;
        }
        line
    }
}

fn parse_node(value: &Value) -> PuzzleResult<PuzzleTree> {
    match value {
        Value::String(marker) if marker == WIN_MARKER => Ok(PuzzleTree::Win),
        Value::Object(map) => {
            let mut children = Vec::with_capacity(map.len());
            for (key, child) in map {
                if child.as_str() == Some(RETRY_MARKER) {
                    continue;
                }
                children.push((CompactMove::new(key.as_str()), parse_node(child)?));
            }
            if children.is_empty() {
                return Err(invalid("a line ends without a win"));
            }
            Ok(PuzzleTree::Branch(children))
        }
        other => Err(invalid(&format!("unexpected node {other}"))),
    }
}

fn invalid(reason: &str) -> PuzzleError {
    PuzzleError::InvalidLine {
        reason: reason.to_owned(),
    }
}
