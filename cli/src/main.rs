mod gesture;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use client::config::{ClientConfig, ConfigError, DEFAULT_SERVER_URL};
use client::draw::{DEFAULT_STROKE_WIDTH, PALETTE, Pen, PenError};
use client::net::api::{RosterClient, RosterError, RosterSource};
use client::net::connection::SendRejected;
use client::net::transport::WsTransport;
use client::notice::Notice;
use client::render::{NullRenderer, Renderer, StrokeSegment};
use client::session::{Session, SharedRenderer};
use client::state::chat::{ChatDraft, ChatError};
use envelope::Participant;
use rand::seq::IndexedRandom;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crate::gesture::Shape;

/// How long a command waits for the first `Open`.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// How often `watch` checks the chat history for new entries.
const CHAT_POLL: Duration = Duration::from_millis(250);

const EMOJI: [&str; 12] = ["🦊", "🐸", "🐙", "🦄", "🐼", "🐯", "🦉", "🐝", "🐢", "🦋", "🐳", "🌵"];

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("invalid server url: {0}")]
    Config(#[from] ConfigError),
    #[error("roster request failed: {0}")]
    Roster(#[from] RosterError),
    #[error("invalid pen: {0}")]
    Pen(#[from] PenError),
    #[error("chat failed: {0}")]
    Chat(#[from] ChatError),
    #[error("clear failed: {0}")]
    Clear(#[from] SendRejected),
    #[error("timed out waiting for the relay")]
    ConnectTimeout,
    #[error("relay unreachable")]
    Unreachable,
    #[error("stroke input closed")]
    StrokesClosed,
    #[error("signal handler failed: {0}")]
    Signal(#[from] std::io::Error),
}

#[derive(Parser, Debug)]
#[command(name = "polydraw-cli", about = "Polydraw relay client")]
struct Cli {
    #[arg(long, env = "POLYDRAW_SERVER_URL", default_value = DEFAULT_SERVER_URL)]
    server_url: String,

    #[arg(long, env = "POLYDRAW_NAME", default_value = "polydraw-cli")]
    name: String,

    /// Defaults to a random pick.
    #[arg(long, env = "POLYDRAW_EMOJI")]
    emoji: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print who is online.
    Players,
    /// Join and print presence, chat, and strokes until Ctrl-C.
    Watch,
    /// Join, send one chat message, leave.
    Chat { text: String },
    /// Join, replay a synthetic gesture, leave.
    Draw(DrawArgs),
    /// Join, clear every canvas, leave.
    Clear,
}

#[derive(Args, Debug)]
struct DrawArgs {
    #[arg(long, value_enum, default_value_t = Shape::Circle)]
    shape: Shape,

    #[arg(long, default_value_t = 360)]
    steps: u32,

    /// Delay between pointer moves.
    #[arg(long, default_value_t = 6)]
    step_ms: u64,

    /// Defaults to a random palette color.
    #[arg(long)]
    color: Option<String>,

    #[arg(long, default_value_t = DEFAULT_STROKE_WIDTH)]
    width: f64,
}

/// Prints inbound strokes instead of painting them.
struct PrintRenderer;

impl Renderer for PrintRenderer {
    fn draw_segment(&mut self, segment: &StrokeSegment) {
        println!(
            "~ {} drew {} point(s) in {} at width {}",
            segment.author_id,
            segment.points.len(),
            segment.color,
            segment.stroke_width
        );
    }

    fn clear_surface(&mut self) {
        println!("~ canvas cleared");
    }
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ClientConfig::from_env_with_origin(&cli.server_url)?;
    let emoji = cli.emoji.unwrap_or_else(random_emoji);
    let me = Participant::new(Uuid::new_v4().to_string(), cli.name, emoji);

    match cli.command {
        Command::Players => run_players(&config).await,
        Command::Watch => run_watch(config, me).await,
        Command::Chat { text } => run_chat(config, me, text).await,
        Command::Draw(args) => run_draw(config, me, args).await,
        Command::Clear => run_clear(config, me).await,
    }
}

fn random_emoji() -> String {
    EMOJI.choose(&mut rand::rng()).copied().unwrap_or("🎨").to_owned()
}

fn random_color() -> String {
    PALETTE.choose(&mut rand::rng()).copied().unwrap_or(client::draw::DEFAULT_COLOR).to_owned()
}

fn join(config: ClientConfig, me: Participant, renderer: SharedRenderer) -> Result<Session, CliError> {
    Ok(Session::start(config, me, Arc::new(WsTransport), renderer)?)
}

fn quiet() -> SharedRenderer {
    Arc::new(Mutex::new(NullRenderer))
}

/// Wait for the session's first `Connected` notice, echoing others.
async fn wait_connected(session: &mut Session) -> Result<(), CliError> {
    let wait = async {
        while let Some(notice) = session.next_notice().await {
            match notice {
                Notice::Connected => return Ok(()),
                Notice::ReconnectExhausted => return Err(CliError::Unreachable),
                other => eprintln!("{other}"),
            }
        }
        Err(CliError::Unreachable)
    };
    tokio::time::timeout(CONNECT_TIMEOUT, wait).await.map_err(|_| CliError::ConnectTimeout)?
}

async fn run_players(config: &ClientConfig) -> Result<(), CliError> {
    let roster = RosterClient::new(config.endpoint.roster_url())?.fetch().await?;
    if roster.is_empty() {
        println!("no players online");
    }
    for p in roster {
        println!("{} {}\t{}", p.player_emoji, p.player_name, p.id);
    }
    Ok(())
}

async fn run_watch(config: ClientConfig, me: Participant) -> Result<(), CliError> {
    let renderer: SharedRenderer = Arc::new(Mutex::new(PrintRenderer));
    let mut session = join(config, me, renderer)?;
    eprintln!("watching as {} {}; Ctrl-C to leave", session.me().player_emoji, session.me().player_name);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut poll = tokio::time::interval(CHAT_POLL);
    let mut printed = 0;

    let outcome = loop {
        tokio::select! {
            signal = &mut ctrl_c => break signal.map_err(CliError::from),
            notice = session.next_notice() => match notice {
                Some(Notice::ReconnectExhausted) => break Err(CliError::Unreachable),
                Some(Notice::Connected) => {
                    println!("* connected");
                    for p in session.participants() {
                        println!("* online: {} {}", p.player_emoji, p.player_name);
                    }
                }
                Some(notice) => println!("* {notice}"),
                None => break Ok(()),
            },
            _ = poll.tick() => {
                let chat = session.chat();
                for entry in chat.iter().skip(printed) {
                    println!("[{} {}] {}", entry.author_emoji, entry.author_name, entry.text);
                }
                printed = chat.len();
            }
        }
    };

    session.logout().await;
    outcome
}

async fn run_chat(config: ClientConfig, me: Participant, text: String) -> Result<(), CliError> {
    let mut session = join(config, me, quiet())?;
    wait_connected(&mut session).await?;
    let mut draft = ChatDraft::new(text);
    let sent = session.send_chat(&mut draft);
    session.logout().await;
    let entry = sent?;
    println!("sent {}", entry.id);
    Ok(())
}

async fn run_clear(config: ClientConfig, me: Participant) -> Result<(), CliError> {
    let mut session = join(config, me, quiet())?;
    wait_connected(&mut session).await?;
    let cleared = session.clear_surface();
    session.logout().await;
    cleared?;
    println!("cleared");
    Ok(())
}

async fn run_draw(config: ClientConfig, me: Participant, args: DrawArgs) -> Result<(), CliError> {
    let pen = Pen::new(args.color.unwrap_or_else(random_color), args.width)?;
    let window = config.throttle;
    let mut session = join(config, me, quiet())?;
    wait_connected(&mut session).await?;

    let path = gesture::points(args.shape, args.steps);
    let replayed = replay(&session, pen, &path, Duration::from_millis(args.step_ms.max(1)), window).await;
    session.logout().await;
    replayed?;
    println!("drew {} points", path.len());
    Ok(())
}

async fn replay(
    session: &Session,
    pen: Pen,
    path: &[envelope::Point],
    step: Duration,
    window: Duration,
) -> Result<(), CliError> {
    let strokes = session.strokes();
    let Some((first, rest)) = path.split_first() else {
        return Ok(());
    };
    if !(strokes.set_pen(pen) && strokes.press(first.x, first.y)) {
        return Err(CliError::StrokesClosed);
    }

    let mut ticks = tokio::time::interval(step);
    ticks.tick().await;
    for point in rest {
        ticks.tick().await;
        if !strokes.move_to(point.x, point.y) {
            return Err(CliError::StrokesClosed);
        }
    }

    // Let the trailing flush fire before the release discards the buffer.
    tokio::time::sleep(window).await;
    if !strokes.release() {
        return Err(CliError::StrokesClosed);
    }
    Ok(())
}
