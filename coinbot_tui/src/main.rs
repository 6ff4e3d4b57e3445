mod pipe;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use coinbot_core::{
    AgentId,
    arena::{Arena, DEFAULT_VIEW_RADIUS, MoveResult, load_arena_from_string},
    config::{AgentSpec, EngineConfig, Mode},
    direction::Action,
    engine::Engine,
    protocol::Topics,
};
use ratatui::{
    crossterm::{
        self,
        event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode},
        execute,
        terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
    },
    prelude::*,
    widgets::*,
};
use std::{
    collections::BTreeMap,
    fs::File,
    io::{self, Stdout},
    path::{Path, PathBuf},
    sync::Mutex,
    time::{Duration, Instant},
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Play a local arena in the terminal
    Simulate(SimulateArgs),
    /// Drive agents from `<topic>\t<payload>` lines on stdin
    Pipe(PipeArgs),
}

#[derive(Args, Debug)]
struct SimulateArgs {
    /// Map file to load; a random field is generated when absent
    #[arg(short, long, value_name = "MAP_FILE")]
    map: Option<PathBuf>,
    /// Seed for the random field
    #[arg(short, long, default_value_t = 42)]
    seed: u64,
    /// Decision policy, overrides the config file
    #[arg(long)]
    mode: Option<Mode>,
    /// JSON engine config
    #[arg(short, long, value_name = "CONFIG_FILE")]
    config: Option<PathBuf>,
    /// Milliseconds between rounds
    #[arg(long, default_value_t = 250)]
    tick_ms: u64,
    /// View radius of every player
    #[arg(long, default_value_t = DEFAULT_VIEW_RADIUS)]
    view: usize,
    /// Walls on a random field
    #[arg(long, default_value_t = 12)]
    walls: usize,
    /// Coins on a random field
    #[arg(long, default_value_t = 10)]
    coins: usize,
    /// Write logs to this file
    #[arg(long, value_name = "LOG_FILE")]
    log: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct PipeArgs {
    /// Lobby the topics belong to
    #[arg(short, long, default_value = "TestLobby")]
    lobby: String,
    /// JSON engine config
    #[arg(short, long, value_name = "CONFIG_FILE")]
    config: Option<PathBuf>,
    /// Decision policy, overrides the config file
    #[arg(long)]
    mode: Option<Mode>,
    /// Print the registration messages before reading input
    #[arg(long)]
    register: bool,
}

fn load_config(path: Option<&Path>, mode: Option<Mode>) -> Result<EngineConfig> {
    let mut config = match path {
        Some(path) => EngineConfig::from_json_file(path)
            .with_context(|| format!("Loading config {}", path.display()))?,
        None => EngineConfig::two_teams(),
    };
    if let Some(mode) = mode {
        config = config.with_mode(mode);
    }
    Ok(config)
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Simulate(args) => {
            if let Some(log) = &args.log {
                let file = File::create(log)
                    .with_context(|| format!("Creating log file {}", log.display()))?;
                tracing_subscriber::fmt()
                    .with_env_filter(env_filter())
                    .with_writer(Mutex::new(file))
                    .with_ansi(false)
                    .init();
            }

            let mut app = App::new(&args)?;

            // Set up the terminal
            let mut terminal = setup_terminal()?;
            let result = run_app(&mut terminal, &mut app, Duration::from_millis(args.tick_ms));
            restore_terminal(&mut terminal)?;
            result?;

            for (team, score) in app.arena.scores() {
                println!("{team}: {score}");
            }
            Ok(())
        }
        Command::Pipe(args) => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter())
                .with_writer(io::stderr)
                .with_target(false)
                .init();

            let config = load_config(args.config.as_deref(), args.mode)?;
            let mut engine = Engine::new(config)?;
            let topics = Topics::new(args.lobby);
            let mut stdout = io::stdout().lock();
            if args.register {
                pipe::write_registrations(&mut stdout, &topics, &engine)?;
            }
            pipe::run(&mut engine, &topics, io::stdin().lock(), &mut stdout)
        }
    }
}

struct App {
    /// The local stand-in for the game server.
    arena: Arena,
    /// Decides for every player on the field.
    engine: Engine,
    /// What happened to each player's last move.
    last_results: BTreeMap<AgentId, MoveResult>,
    /// Flag to control the main loop.
    should_quit: bool,
    /// Flag to control if the game is over.
    game_over: bool,
}

impl App {
    fn new(args: &SimulateArgs) -> Result<Self> {
        let mut config = load_config(args.config.as_deref(), args.mode)?;

        let arena = match &args.map {
            Some(map_file) => {
                if !map_file.exists() {
                    bail!("Map file does not exist: {}", map_file.display());
                }
                let file_string = std::fs::read_to_string(map_file)?;
                let arena = load_arena_from_string(&file_string)
                    .with_context(|| format!("Loading map {}", map_file.display()))?;
                // The map decides who plays.
                config.grid = arena.bounds();
                config.agents = arena
                    .players()
                    .iter()
                    .map(|(name, state)| AgentSpec::new(name.clone(), state.team.clone()))
                    .collect();
                arena
            }
            None => Arena::random(&config, args.seed, args.walls, args.coins)?,
        }
        .with_view_radius(args.view);

        let engine = Engine::new(config)?;
        Ok(App {
            arena,
            engine,
            last_results: BTreeMap::new(),
            should_quit: false,
            game_over: false,
        })
    }

    /// Handles one round: observe, decide, move.
    fn tick(&mut self) {
        if self.game_over {
            return;
        }
        let players: Vec<AgentId> = self.arena.players().keys().cloned().collect();
        for player in &players {
            let state = match self.arena.game_state(player) {
                Ok(state) => state,
                Err(err) => {
                    warn!(%player, %err, "No game state");
                    continue;
                }
            };
            if let Err(err) = self.engine.ingest_state(player, &state) {
                warn!(%player, %err, "Game state rejected");
            }
        }

        let outcome = self.engine.decide_round();
        self.last_results = self.arena.apply_round(&outcome.moves);

        if outcome.is_final() || self.arena.is_finished() {
            info!(round = outcome.round, scores = ?self.arena.scores(), "Game over");
            self.game_over = true;
        }
    }

    /// Sets the quit flag.
    fn quit(&mut self) {
        self.should_quit = true;
    }
}

/// Configures the terminal for TUI interaction.
fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    let mut stdout = io::stdout();
    enable_raw_mode()?;
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend).map_err(Into::into)
}

/// Restores the terminal to its original state.
fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    Ok(())
}

/// Runs the main loop of the TUI application.
fn run_app(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    app: &mut App,
    tick_rate: Duration,
) -> Result<()> {
    let mut last_tick = Instant::now();

    loop {
        terminal.draw(|f| ui(f, app))?;

        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or_else(|| Duration::from_secs(0));

        if crossterm::event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                match key.code {
                    KeyCode::Char('q') | KeyCode::Esc => app.quit(),
                    _ => {}
                }
            }
        }

        if last_tick.elapsed() >= tick_rate {
            app.tick();
            last_tick = Instant::now();
        }

        if app.should_quit {
            break;
        }
    }
    Ok(())
}

fn team_color(team: &str) -> Color {
    if team == "ATeam" { Color::Cyan } else { Color::Magenta }
}

/// Renders the user interface.
fn ui(frame: &mut Frame, app: &App) {
    let main_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage(60), // Field
            Constraint::Percentage(30), // Players
            Constraint::Percentage(10), // Status/help
        ])
        .split(frame.area());

    render_map(frame, main_layout[0], &app.arena);
    render_players(frame, main_layout[1], app);

    let scores = app
        .arena
        .scores()
        .iter()
        .map(|(team, score)| format!("{team} {score}"))
        .collect::<Vec<_>>()
        .join("  ");
    let state = if app.game_over { "game over" } else { "running" };
    let help_text = Paragraph::new(format!(
        "Round {} ({state})  {scores}  Press 'q' or 'Esc' to quit.",
        app.engine.round()
    ))
    .alignment(Alignment::Center)
    .block(Block::default().borders(Borders::TOP));
    frame.render_widget(help_text, main_layout[2]);
}

/// Renders one line per player: position, last move and what the agent is doing.
fn render_players(frame: &mut Frame, area: Rect, app: &App) {
    let items: Vec<ListItem> = app
        .arena
        .players()
        .iter()
        .map(|(name, player)| {
            let action = match app.engine.last_action(name) {
                Some(Action::Move(direction)) => direction.to_string(),
                Some(Action::Stay) => "STAY".to_string(),
                None => "-".to_string(),
            };
            let result = match app.last_results.get(name) {
                Some(MoveResult::Blocked(reason)) => format!("blocked: {reason}"),
                Some(MoveResult::Collected(value)) => format!("collected {value}"),
                Some(MoveResult::Moved) => "moved".to_string(),
                Some(MoveResult::Rested) | None => String::new(),
            };
            let status = app.engine.describe(name).unwrap_or_default();
            ListItem::from(Line::from(vec![
                Span::styled(
                    format!("{name} "),
                    Style::default().fg(team_color(&player.team)).bold(),
                ),
                Span::raw(format!(
                    "{} coins: {} last: {action} {result} [{status}]",
                    player.position, player.collected
                )),
            ]))
        })
        .collect();

    let widget = List::new(items).block(Block::default().borders(Borders::ALL).title("Players"));
    frame.render_widget(widget, area);
}

/// Renders the field onto the frame. Rows run along `x`.
fn render_map(frame: &mut Frame, area: Rect, arena: &Arena) {
    let bounds = arena.bounds();
    let mut lines: Vec<Line> = Vec::with_capacity(bounds.width);

    for x in 0..bounds.width {
        let mut spans: Vec<Span> = Vec::with_capacity(bounds.height);
        for y in 0..bounds.height {
            let pos = coinbot_core::Position::new(x, y);
            let span = if let Some(name) = arena.player_at(pos) {
                let team = &arena.players()[name].team;
                let label = name.chars().last().unwrap_or('@').to_string();
                Span::styled(label, Style::default().fg(team_color(team)).bold())
            } else if let Some(value) = arena.coins().get(&pos) {
                Span::styled(value.to_string(), Style::default().fg(Color::Yellow))
            } else if arena.walls().contains(pos) {
                Span::styled("#", Style::default().fg(Color::DarkGray))
            } else {
                Span::raw(".")
            };
            spans.push(span);
            spans.push(Span::raw(" "));
        }
        lines.push(Line::from(spans));
    }

    let map_paragraph = Paragraph::new(lines)
        .block(Block::default().title("Coin Arena").borders(Borders::ALL))
        .alignment(Alignment::Center);

    frame.render_widget(map_paragraph, area);
}
