//! HTTP collaborator - game creation, invitations, game and puzzle fetches
//!
//! [`LichessClient`] talks to the lichess-style HTTP API with a cookie store,
//! since the server ties a socket to the session cookie set by earlier
//! requests. Every socket URL it hands out carries this client's random
//! `sri` id and `mobile=1`.
//!
//! The sync engine only needs one of these operations after start-up, the
//! game fetch that follows a `reload`; that operation is the
//! [`GameDirectory`] seam so tests can stand in for the server.

use crate::networking::connection::ConnectionEndpoint;
use async_trait::async_trait;
use rand::distr::Alphanumeric;
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use shared::protocol::CompactMove;
use tracing::{debug, info};
use url::Url;

const ACCEPT_V2: &str = "application/vnd.lichess.v2+json";

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{endpoint} answered with status {status}")]
    Status { endpoint: String, status: u16 },

    #[error("Unexpected response from {endpoint}: {reason}")]
    Payload { endpoint: String, reason: String },

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

/// Where to find the socket of an existing game
#[async_trait]
pub trait GameDirectory: Send + Sync {
    async fn fetch_game(&self, game_id: &str) -> Result<ConnectionEndpoint, ApiError>;
}

/// Color requested when creating a game
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorChoice {
    #[default]
    White,
    Random,
    Black,
}

impl ColorChoice {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColorChoice::White => "white",
            ColorChoice::Random => "random",
            ColorChoice::Black => "black",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeMode {
    Unlimited,
    RealTime,
    Correspondence,
}

impl TimeMode {
    fn code(self) -> u8 {
        match self {
            TimeMode::Unlimited => 0,
            TimeMode::RealTime => 1,
            TimeMode::Correspondence => 2,
        }
    }
}

/// Game creation form
#[derive(Debug, Clone, PartialEq)]
pub struct GameSetup {
    pub time_mode: TimeMode,
    pub days: u32,
    pub minutes: u32,
    pub increment_seconds: u32,
    pub color: ColorChoice,
    /// Computer strength; only sent for games against the computer
    pub ai_level: Option<u8>,
}

impl GameSetup {
    /// JSON body the setup endpoints expect; every value is a string
    pub fn to_body(&self) -> Value {
        let mut body = json!({
            "variant": "1",
            "timeMode": self.time_mode.code().to_string(),
            "days": self.days.to_string(),
            "time": self.minutes.to_string(),
            "increment": self.increment_seconds.to_string(),
            "color": self.color.as_str(),
        });
        if let Some(map) = body.as_object_mut() {
            match self.ai_level {
                Some(level) => {
                    map.insert("level".to_owned(), Value::String(level.to_string()));
                }
                None => {
                    map.insert("mode".to_owned(), Value::String("0".to_owned()));
                }
            }
        }
        body
    }

    /// Initial seconds per side, `None` for untimed games
    pub fn clock_seconds(&self) -> Option<u64> {
        match self.time_mode {
            TimeMode::RealTime => Some(u64::from(self.minutes) * 60),
            TimeMode::Unlimited | TimeMode::Correspondence => None,
        }
    }
}

/// A game the server created or found for us
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameHandle {
    pub id: String,
    pub endpoint: ConnectionEndpoint,
    pub color: Option<String>,
}

/// An open invitation waiting for a friend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invitation {
    pub id: String,
    pub endpoint: ConnectionEndpoint,
}

/// Puzzle as served by the training endpoints
#[derive(Debug, Clone, PartialEq)]
pub struct PuzzleData {
    pub id: String,
    pub fen: String,
    pub color: String,
    pub initial_move: CompactMove,
    pub lines: Value,
}

#[derive(Deserialize)]
struct GameResponse {
    game: Option<GameInfo>,
    player: Option<PlayerInfo>,
    url: Option<UrlInfo>,
}

#[derive(Deserialize)]
struct GameInfo {
    id: String,
}

#[derive(Deserialize)]
struct PlayerInfo {
    color: Option<String>,
    version: Option<u64>,
}

#[derive(Deserialize)]
struct UrlInfo {
    socket: Option<String>,
}

#[derive(Deserialize)]
struct ChallengeResponse {
    challenge: ChallengeInfo,
}

#[derive(Deserialize)]
struct ChallengeInfo {
    id: String,
}

#[derive(Deserialize)]
struct PuzzleResponse {
    puzzle: WirePuzzle,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePuzzle {
    id: WireId,
    fen: String,
    color: String,
    initial_move: WireInitialMove,
    lines: Value,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireId {
    Number(u64),
    Text(String),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireInitialMove {
    Uci(String),
    Detailed { uci: String },
}

impl From<WirePuzzle> for PuzzleData {
    fn from(wire: WirePuzzle) -> Self {
        Self {
            id: match wire.id {
                WireId::Number(n) => n.to_string(),
                WireId::Text(text) => text,
            },
            fen: wire.fen,
            color: wire.color,
            initial_move: match wire.initial_move {
                WireInitialMove::Uci(uci) | WireInitialMove::Detailed { uci } => {
                    CompactMove::new(uci)
                }
            },
            lines: wire.lines,
        }
    }
}

/// Parse a training endpoint response
pub fn parse_puzzle(body: &str) -> Result<PuzzleData, ApiError> {
    let response: PuzzleResponse =
        serde_json::from_str(body).map_err(|e| ApiError::Payload {
            endpoint: "training".to_owned(),
            reason: e.to_string(),
        })?;
    Ok(response.puzzle.into())
}

/// Random client id sent as `sri` on every socket
pub fn random_client_id() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(12)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect()
}

#[derive(Debug, Clone)]
pub struct LichessClient {
    http: reqwest::Client,
    base_url: Url,
    socket_base_url: Url,
    sri: String,
}

impl LichessClient {
    pub fn new(base_url: &str, socket_base_url: &str) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_V2));
        headers.insert("X-Requested-With", HeaderValue::from_static("XMLHttpRequest"));

        let http = reqwest::Client::builder()
            .cookie_store(true)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http,
            base_url: Url::parse(base_url)?,
            socket_base_url: Url::parse(socket_base_url)?,
            sri: random_client_id(),
        })
    }

    pub fn client_id(&self) -> &str {
        &self.sri
    }

    /// Socket URL for a server-relative socket path
    pub fn socket_url(&self, path: &str) -> Result<String, ApiError> {
        let mut url = self.socket_base_url.join(path)?;
        url.query_pairs_mut()
            .append_pair("sri", &self.sri)
            .append_pair("mobile", "1");
        Ok(url.into())
    }

    /// Establish the session cookie
    pub async fn bootstrap_session(&self) -> Result<(), ApiError> {
        self.get("/account/info").await?;
        info!("[NETWORK] Session established");
        Ok(())
    }

    /// Create a game against the computer
    pub async fn create_ai_game(&self, setup: &GameSetup) -> Result<GameHandle, ApiError> {
        let body = self.post("/setup/ai", Some(setup.to_body())).await?;
        self.game_handle("/setup/ai", &body)
    }

    /// Create an open challenge for a friend
    pub async fn create_friend_game(&self, setup: &GameSetup) -> Result<Invitation, ApiError> {
        let body = self
            .post("/setup/friend", Some(setup.to_body()))
            .await?;
        let response: ChallengeResponse = decode("/setup/friend", &body)?;
        let id = response.challenge.id;
        let endpoint =
            ConnectionEndpoint::new(self.socket_url(&format!("/challenge/{id}/socket/v2"))?, 0);
        info!("[NETWORK] Invitation {} created", id);
        Ok(Invitation { id, endpoint })
    }

    /// Accept a friend's invitation
    pub async fn accept_invitation(&self, id: &str) -> Result<(), ApiError> {
        self.post(&format!("/challenge/{id}/accept"), None).await?;
        Ok(())
    }

    /// Look up a game and the socket the current session should use
    pub async fn fetch_game_handle(&self, id: &str) -> Result<GameHandle, ApiError> {
        // The challenge page sets the cookie that identifies our side of the game
        self.get(&format!("/challenge/{id}")).await?;
        let path = format!("/{id}");
        let body = self.get(&path).await?;
        self.game_handle(&path, &body)
    }

    pub async fn daily_puzzle(&self) -> Result<PuzzleData, ApiError> {
        parse_puzzle(&self.get("/training/daily").await?)
    }

    pub async fn next_puzzle(&self) -> Result<PuzzleData, ApiError> {
        let mut url = self.base_url.join("/training/new")?;
        url.set_query(Some(&format!("_{}", chrono::Utc::now().timestamp_millis())));
        parse_puzzle(&self.send(self.http.get(url), "/training/new").await?)
    }

    fn game_handle(&self, endpoint: &str, body: &str) -> Result<GameHandle, ApiError> {
        let response: GameResponse = decode(endpoint, body)?;
        let missing = |field: &str| ApiError::Payload {
            endpoint: endpoint.to_owned(),
            reason: format!("missing {field}"),
        };

        let socket = response
            .url
            .and_then(|u| u.socket)
            .ok_or_else(|| missing("url.socket"))?;
        let id = response
            .game
            .map(|g| g.id)
            .ok_or_else(|| missing("game.id"))?;
        let (color, version) = match response.player {
            Some(player) => (player.color, player.version.unwrap_or(0)),
            None => (None, 0),
        };

        Ok(GameHandle {
            id,
            endpoint: ConnectionEndpoint::new(self.socket_url(&socket)?, version),
            color,
        })
    }

    async fn get(&self, path: &str) -> Result<String, ApiError> {
        let url = self.base_url.join(path)?;
        self.send(self.http.get(url), path).await
    }

    async fn post(&self, path: &str, body: Option<Value>) -> Result<String, ApiError> {
        let url = self.base_url.join(path)?;
        let request = match body {
            Some(body) => self.http.post(url).json(&body),
            None => self.http.post(url),
        };
        self.send(request, path).await
    }

    async fn send(&self, request: reqwest::RequestBuilder, path: &str) -> Result<String, ApiError> {
        debug!("[NETWORK] HTTP {}", path);
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                endpoint: path.to_owned(),
                status: status.as_u16(),
            });
        }
        Ok(response.text().await?)
    }
}

#[async_trait]
impl GameDirectory for LichessClient {
    async fn fetch_game(&self, game_id: &str) -> Result<ConnectionEndpoint, ApiError> {
        Ok(self.fetch_game_handle(game_id).await?.endpoint)
    }
}

fn decode<T: serde::de::DeserializeOwned>(endpoint: &str, body: &str) -> Result<T, ApiError> {
    serde_json::from_str(body).map_err(|e| ApiError::Payload {
        endpoint: endpoint.to_owned(),
        reason: e.to_string(),
    })
}
