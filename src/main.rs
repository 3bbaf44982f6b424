use anyhow::{bail, Context};
use chess_sync::core::config::{default_config_path, load_config, write_config};
use chess_sync::core::logging::init_logging;
use chess_sync::core::{ClientConfig, ClientEvent, Scheduler, UserCommand};
use chess_sync::game::clock::GameClock;
use chess_sync::game::rules::RulesOracle;
use chess_sync::game::types::{color_name, parse_color, Color};
use chess_sync::game::{GameSession, GameState, Move, Square};
use chess_sync::networking::api::{ColorChoice, GameSetup, PuzzleData, TimeMode};
use chess_sync::networking::connection::ConnectionState;
use chess_sync::networking::deep_link::parse_deep_link;
use chess_sync::networking::{
    ConnectionEndpoint, ConnectionManager, GameDirectory, LichessClient, RolePolicy, SyncEngine,
    SyncUpdate, WebSocketConnector,
};
use chess_sync::puzzle::{MoveOutcome, Puzzle, PuzzleMatcher, PuzzleState};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "chess-sync", version, about = "Play and train against a lichess-style server")]
struct Cli {
    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play the computer
    Ai {
        #[arg(long)]
        level: Option<u8>,
        #[command(flatten)]
        setup: SetupArgs,
    },
    /// Create a game and wait for a friend to join
    Friend {
        #[command(flatten)]
        setup: SetupArgs,
    },
    /// Join a friend's game from an invitation link
    Join { link: String },
    /// Solve training puzzles
    Puzzle {
        /// Start with the puzzle of the day
        #[arg(long)]
        daily: bool,
    },
    /// Write a config file with default values
    InitConfig {
        #[arg(long)]
        force: bool,
    },
}

#[derive(clap::Args)]
struct SetupArgs {
    /// Minutes per side; 0 plays without a clock
    #[arg(long)]
    minutes: Option<u32>,
    #[arg(long)]
    increment: Option<u32>,
    /// white, black or random
    #[arg(long, value_parser = parse_color_choice)]
    color: Option<ColorChoice>,
}

fn parse_color_choice(text: &str) -> Result<ColorChoice, String> {
    match text {
        "white" => Ok(ColorChoice::White),
        "black" => Ok(ColorChoice::Black),
        "random" => Ok(ColorChoice::Random),
        other => Err(format!("`{other}` is not white, black or random")),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = load_config(cli.config.as_deref());

    match cli.command {
        Commands::InitConfig { force } => {
            let path = cli.config.unwrap_or_else(default_config_path);
            if path.exists() && !force {
                bail!("{} already exists (use --force to overwrite)", path.display());
            }
            write_config(&path, &ClientConfig::default())
                .with_context(|| format!("writing {}", path.display()))?;
            println!("Wrote {}", path.display());
            Ok(())
        }
        Commands::Ai { level, setup } => {
            let mut setup = game_setup(&config, &setup);
            setup.ai_level = Some(level.unwrap_or(config.setup.ai_level));
            play_vs_computer(&config, setup).await
        }
        Commands::Friend { setup } => play_vs_friend(&config, game_setup(&config, &setup)).await,
        Commands::Join { link } => join_friend(&config, &link).await,
        Commands::Puzzle { daily } => train(&config, daily).await,
    }
}

fn game_setup(config: &ClientConfig, args: &SetupArgs) -> GameSetup {
    let minutes = args.minutes.unwrap_or(config.setup.minutes);
    GameSetup {
        time_mode: if minutes == 0 {
            TimeMode::Unlimited
        } else {
            TimeMode::RealTime
        },
        days: 2,
        minutes,
        increment_seconds: args.increment.unwrap_or(config.setup.increment_seconds),
        color: args.color.unwrap_or(config.setup.color),
        ai_level: None,
    }
}

fn api_client(config: &ClientConfig) -> anyhow::Result<Arc<LichessClient>> {
    let client = LichessClient::new(&config.http_base_url, &config.socket_base_url)
        .context("building HTTP client")?;
    Ok(Arc::new(client))
}

fn clock_for(setup: &GameSetup) -> GameClock {
    setup
        .clock_seconds()
        .map(GameClock::new)
        .unwrap_or_else(GameClock::unlimited)
}

fn side_from(color: Option<&str>, choice: ColorChoice) -> Color {
    color
        .and_then(parse_color)
        .unwrap_or(match choice {
            ColorChoice::Black => Color::Black,
            ColorChoice::White | ColorChoice::Random => Color::White,
        })
}

async fn play_vs_computer(config: &ClientConfig, setup: GameSetup) -> anyhow::Result<()> {
    let client = api_client(config)?;
    client.bootstrap_session().await.context("starting session")?;
    let game = client
        .create_ai_game(&setup)
        .await
        .context("creating game")?;

    let color = side_from(game.color.as_deref(), setup.color);
    let role = RolePolicy::vs_computer(setup.ai_level.unwrap_or(1), color);
    run_game(config, client, role, game.id, game.endpoint, clock_for(&setup)).await
}

async fn play_vs_friend(config: &ClientConfig, setup: GameSetup) -> anyhow::Result<()> {
    let client = api_client(config)?;
    client.bootstrap_session().await.context("starting session")?;
    let invitation = client
        .create_friend_game(&setup)
        .await
        .context("creating invitation")?;

    let role = RolePolicy::vs_friend(invitation.id.clone(), side_from(None, setup.color));
    if let Some(link) = role.invitation_link(&config.deep_link_scheme) {
        println!("Send this link to your friend: {link}");
    }
    run_game(
        config,
        client,
        role,
        invitation.id,
        invitation.endpoint,
        clock_for(&setup),
    )
    .await
}

async fn join_friend(config: &ClientConfig, link: &str) -> anyhow::Result<()> {
    let game_id = parse_deep_link(link, &config.deep_link_scheme)?;
    let client = api_client(config)?;
    client.bootstrap_session().await.context("starting session")?;
    client
        .accept_invitation(&game_id)
        .await
        .context("accepting invitation")?;
    let game = client
        .fetch_game_handle(&game_id)
        .await
        .context("fetching game")?;

    let color = side_from(game.color.as_deref(), ColorChoice::Black);
    let role = RolePolicy::vs_friend(game_id.clone(), color);
    run_game(config, client, role, game_id, game.endpoint, GameClock::unlimited()).await
}

async fn run_game(
    config: &ClientConfig,
    client: Arc<LichessClient>,
    role: RolePolicy,
    game_id: String,
    endpoint: ConnectionEndpoint,
    clock: GameClock,
) -> anyhow::Result<()> {
    let (scheduler, mut events) = Scheduler::channel();
    let connection = ConnectionManager::new(
        Box::new(WebSocketConnector),
        scheduler.clone(),
        config.heartbeat_interval,
    );
    let directory: Arc<dyn GameDirectory> = client;
    let mut engine = SyncEngine::new(
        GameSession::new(),
        connection,
        role,
        directory,
        scheduler.clone(),
        game_id,
        clock,
    );

    println!("{}", engine.role().describe());
    engine.start(endpoint)?;
    let _input = read_input(&scheduler);
    print_board(engine.session(), engine.role().local_color);

    while let Some(event) = events.recv().await {
        let shutdown = matches!(event, ClientEvent::Shutdown);
        engine.handle(event);

        for update in engine.drain_updates() {
            match update {
                SyncUpdate::MoveApplied { mv, local, .. } => {
                    println!("{} played {}", if local { "You" } else { "Opponent" }, mv);
                    print_board(engine.session(), engine.role().local_color);
                    print_clock(&engine);
                }
                SyncUpdate::ClockUpdated(_) => {}
                SyncUpdate::LowTime(color) => println!("{} is low on time!", color_name(color)),
                SyncUpdate::GameOver(outcome) => println!("Game over: {outcome}"),
                SyncUpdate::Connection(state) => info!("[NETWORK] Connection {}", state),
            }
        }

        if shutdown || engine.connection().state() == ConnectionState::Closed {
            break;
        }
    }

    engine.teardown();
    Ok(())
}

async fn train(config: &ClientConfig, daily: bool) -> anyhow::Result<()> {
    let client = api_client(config)?;
    client.bootstrap_session().await.context("starting session")?;
    let (scheduler, mut events) = Scheduler::channel();
    let mut matcher = PuzzleMatcher::new(
        scheduler.clone(),
        config.puzzle_reply_delay,
        config.puzzle_undo_delay,
    );

    let first = if daily {
        client.daily_puzzle().await
    } else {
        client.next_puzzle().await
    };
    start_puzzle(&mut matcher, first.context("fetching puzzle")?)?;
    let _input = read_input(&scheduler);
    let mut _fetch = None;

    while let Some(event) = events.recv().await {
        match event {
            ClientEvent::Puzzle(timer) => {
                if matcher.handle_timer(timer).is_some() {
                    show_puzzle(&matcher);
                }
            }
            ClientEvent::LocalMove(mv) => match matcher.submit_user_move(mv) {
                Ok(MoveOutcome::Winning) => println!("Victory! Type `next` for another puzzle."),
                Ok(MoveOutcome::Correct) => println!("Best move! Keep going..."),
                Ok(MoveOutcome::Incorrect) => println!("That's not it. Try again."),
                Err(e) => println!("{e}"),
            },
            ClientEvent::Command(command) => {
                let result = match command {
                    UserCommand::StepForward => matcher.step_forward().map(|_| ()),
                    UserCommand::StepBackward => matcher.step_backward().map(|_| ()),
                    UserCommand::Restart => matcher.restart(),
                    UserCommand::Abandon => {
                        matcher.abandon();
                        Ok(())
                    }
                    UserCommand::NextPuzzle => {
                        matcher.teardown();
                        let client = Arc::clone(&client);
                        _fetch = Some(scheduler.spawn(async move {
                            ClientEvent::PuzzleFetched(client.next_puzzle().await)
                        }));
                        Ok(())
                    }
                };
                match result {
                    Ok(()) => show_puzzle(&matcher),
                    Err(e) => println!("{e}"),
                }
            }
            ClientEvent::PuzzleFetched(Ok(data)) => {
                if let Err(e) = start_puzzle(&mut matcher, data) {
                    warn!("[PUZZLE] Could not start puzzle: {}", e);
                }
            }
            ClientEvent::PuzzleFetched(Err(e)) => println!("Could not fetch a puzzle: {e}"),
            ClientEvent::Shutdown => break,
            other => tracing::debug!("[PUZZLE] Ignoring {:?}", other),
        }
    }

    matcher.teardown();
    Ok(())
}

fn start_puzzle(matcher: &mut PuzzleMatcher, data: PuzzleData) -> anyhow::Result<()> {
    let puzzle = Puzzle::try_from(data).context("reading puzzle")?;
    println!(
        "Puzzle {}: find the best move for {}.",
        puzzle.id,
        color_name(puzzle.user_color)
    );
    matcher.load(puzzle)?;
    show_puzzle(matcher);
    Ok(())
}

fn show_puzzle(matcher: &PuzzleMatcher) {
    let orientation = matcher.user_color().unwrap_or(Color::White);
    print_board(matcher.session(), orientation);
    let status = match matcher.state() {
        PuzzleState::Loading | PuzzleState::AutoPlayingReply | PuzzleState::RevertingMove => {
            "Waiting".to_owned()
        }
        PuzzleState::AwaitingUserMove => {
            format!("Your turn (move {})", matcher.current_move_index() / 2 + 1)
        }
        PuzzleState::Solved => "Solved. `back`/`forward` to review, `next` for another".to_owned(),
        PuzzleState::Failed => "Failed. `back`/`forward` to review, `next` for another".to_owned(),
    };
    println!("{status}");
}

/// Post typed moves and commands; end of input shuts the client down
fn read_input(scheduler: &Scheduler) -> chess_sync::core::ScheduledTask {
    let events = scheduler.clone();
    scheduler.spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let word = line.trim();
            if word.is_empty() {
                continue;
            }
            if word == "quit" {
                break;
            }
            if let Some(command) = UserCommand::parse(word) {
                events.post(ClientEvent::Command(command));
                continue;
            }
            match word.parse::<Move>() {
                Ok(mv) => {
                    events.post(ClientEvent::LocalMove(mv));
                }
                Err(e) => println!("{e}"),
            }
        }
        ClientEvent::Shutdown
    })
}

fn print_board<O: RulesOracle>(session: &GameSession<O>, orientation: Color) {
    let ranks: Vec<u32> = match orientation {
        Color::White => (0..8).rev().collect(),
        Color::Black => (0..8).collect(),
    };
    let files: Vec<u32> = match orientation {
        Color::White => (0..8).collect(),
        Color::Black => (0..8).rev().collect(),
    };

    for &rank in &ranks {
        let row: String = files
            .iter()
            .map(|&file| {
                session
                    .oracle()
                    .piece_at(Square::new(rank * 8 + file))
                    .map_or('.', |piece| piece.char())
            })
            .flat_map(|c| [c, ' '])
            .collect();
        println!("{} {}", rank + 1, row.trim_end());
    }
    let footer: String = files
        .iter()
        .map(|&file| char::from(b'a' + file as u8))
        .flat_map(|c| [c, ' '])
        .collect();
    println!("  {}", footer.trim_end());

    let state: GameState = session.state();
    if state.in_check && !state.outcome.is_terminal() {
        println!("Check!");
    }
}

fn print_clock(engine: &SyncEngine) {
    let clock = engine.clock();
    if clock.is_unlimited() {
        return;
    }
    let turn = engine.session().turn();
    println!(
        "white {} | black {}",
        clock.display(Color::White, turn == Color::White),
        clock.display(Color::Black, turn == Color::Black)
    );
}
