use std::{
    fs::OpenOptions,
    io::{self},
    path::Path,
    sync::Mutex,
    thread::sleep,
    time::Duration,
};

use anyhow::Context;
use crossterm::{
    event::{
        self, Event, KeyCode, KeyEventKind, KeyboardEnhancementFlags, MouseButton, MouseEventKind,
        PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags,
    },
    terminal::supports_keyboard_enhancement,
    ExecutableCommand,
};
use ratatui::{
    layout::{Alignment, Constraint, Direction, Flex, Layout, Margin, Rect},
    style::{Style, Stylize},
    widgets::{Block, BorderType, Borders, Paragraph},
    DefaultTerminal, Frame,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use tui_big_text::{BigText, PixelSize};

mod config;
mod game;
mod game_theme;
mod helpers;
mod input;
mod network;
mod protocol;
mod render;
mod session;

use crate::{
    config::AppConfig,
    game::Game,
    game_theme::GameTheme,
    helpers::centered_rect_with_percentage,
    input::InputController,
    network::{MqttTransport, OfflineTransport, SyncTransport},
    protocol::Side,
    session::Session,
};

const MIN_WIDTH: u16 = 60;
const MIN_HEIGHT: u16 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MenuOption {
    PlayLeft,
    PlayRight,
    Theme,
    Exit,
}

const MENU_OPTIONS: [MenuOption; 4] = [
    MenuOption::PlayLeft,
    MenuOption::PlayRight,
    MenuOption::Theme,
    MenuOption::Exit,
];

#[derive(Debug)]
enum AppScreen {
    SideSelect,
    Game,
}

struct App {
    exit: bool,
    config: AppConfig,
    release_events: bool,
    selected: usize,
    /// Where each menu option was drawn last frame, for mouse clicks
    option_areas: Vec<Rect>,
    current_game: Option<Game>,
    screen: AppScreen,
    selected_theme: GameTheme,
}

impl App {
    fn new(config: AppConfig, release_events: bool) -> Self {
        Self {
            exit: false,
            selected_theme: config.theme,
            config,
            release_events,
            selected: 0,
            option_areas: Vec::new(),
            current_game: None,
            screen: AppScreen::SideSelect,
        }
    }

    pub fn run(&mut self, mut terminal: DefaultTerminal) -> io::Result<()> {
        let mut was_too_small = false;

        while !self.exit {
            let size = terminal.size()?;
            if size.width < MIN_WIDTH || size.height < MIN_HEIGHT {
                was_too_small = true;
                self.handle_resize_wait_events()?;
                terminal.draw(|frame| self.show_terminal_resize_warning(frame))?;
                continue;
            }
            if was_too_small {
                sleep(Duration::from_millis(100));
                was_too_small = false;
            }

            match self.screen {
                AppScreen::SideSelect => {
                    self.handle_menu_events()?;
                    terminal.draw(|frame| self.draw_menu(frame))?;
                }
                AppScreen::Game => match self.current_game.as_mut() {
                    Some(game) => {
                        // sides are fixed for the session: leaving the match ends the app
                        if !game.game_loop()? {
                            self.exit();
                        } else {
                            terminal.draw(|frame| game.draw(frame))?;
                        }
                    }
                    None => self.screen = AppScreen::SideSelect,
                },
            }
        }

        Ok(())
    }

    fn show_terminal_resize_warning(&mut self, frame: &mut Frame) {
        let colors = self.selected_theme.colors();
        let area = frame.area();
        let popup_area = centered_rect_with_percentage(60, 20, area.width, area.height);
        let popup = Paragraph::new(format!(
            "Terminal too small!\nPlease resize to at least {}x{}.",
            MIN_WIDTH, MIN_HEIGHT
        ))
        .block(
            Block::default()
                .title("Warning")
                .borders(Borders::ALL)
                .border_type(BorderType::Thick),
        )
        .style(Style::default().fg(colors.ball))
        .alignment(Alignment::Center);
        frame.render_widget(popup, popup_area);
    }

    fn option_label(&self, option: MenuOption) -> String {
        match option {
            MenuOption::PlayLeft => "Play as Player 1 (left)".to_string(),
            MenuOption::PlayRight => "Play as Player 2 (right)".to_string(),
            MenuOption::Theme => format!("Theme: {}", self.selected_theme.name()),
            MenuOption::Exit => "Exit".to_string(),
        }
    }

    fn draw_menu(&mut self, frame: &mut Frame) {
        let colors = self.selected_theme.colors();
        let vertical_layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints(vec![
                Constraint::Length(10),
                Constraint::Length(11),
                Constraint::Length(2),
            ])
            .flex(Flex::Center)
            .split(frame.area());

        let big_text = BigText::builder()
            .pixel_size(PixelSize::Sextant)
            .style(Style::new().fg(colors.accent))
            .lines(vec!["".into(), "net".cyan().into(), "PONG".white().into()])
            .alignment(Alignment::Center)
            .build();
        frame.render_widget(big_text, vertical_layout[0]);

        let [options_block_area] = Layout::horizontal([Constraint::Percentage(40)])
            .flex(Flex::Center)
            .areas(vertical_layout[1]);
        frame.render_widget(
            Block::default()
                .title(" Choose your side ")
                .title_alignment(Alignment::Center)
                .style(Style::default().fg(colors.border))
                .borders(Borders::ALL)
                .border_type(BorderType::Double),
            options_block_area,
        );

        let inner = options_block_area.inner(Margin::new(1, 1));
        let rows = Layout::vertical(vec![Constraint::Length(2); MENU_OPTIONS.len()])
            .flex(Flex::Center)
            .split(inner);

        self.option_areas.clear();
        for (i, option) in MENU_OPTIONS.iter().enumerate() {
            let row = Rect {
                height: 1,
                ..rows[i]
            };
            let label = self.option_label(*option);
            let widget = if i == self.selected {
                Paragraph::new(format!("> {} <", label))
                    .style(Style::default().fg(colors.own_paddle).bold())
            } else {
                Paragraph::new(label).style(Style::default().fg(colors.text))
            };
            frame.render_widget(widget.alignment(Alignment::Center), row);
            self.option_areas.push(row);
        }

        let mode = if self.config.offline {
            "offline practice".to_string()
        } else {
            format!(
                "game '{}' on {}:{}",
                self.config.network.game_id,
                self.config.network.broker_host,
                self.config.network.broker_port
            )
        };
        let footer = Paragraph::new(format!("↑/↓ select  Enter/click choose  t theme  |  {}", mode))
            .style(Style::default().fg(colors.text))
            .alignment(Alignment::Center);
        frame.render_widget(footer, vertical_layout[2]);
    }

    fn handle_resize_wait_events(&mut self) -> io::Result<()> {
        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key_event) = event::read()? {
                if key_event.kind == KeyEventKind::Press
                    && matches!(key_event.code, KeyCode::Char('q') | KeyCode::Esc)
                {
                    self.exit();
                }
            }
        }
        Ok(())
    }

    fn handle_menu_events(&mut self) -> io::Result<()> {
        // Non-blocking event polling with short timeout
        if event::poll(Duration::from_millis(10))? {
            match event::read()? {
                Event::Key(key_event) if key_event.kind == KeyEventKind::Press => {
                    match key_event.code {
                        KeyCode::Char('q') | KeyCode::Esc => self.exit(),
                        KeyCode::Up => {
                            self.selected = if self.selected > 0 {
                                self.selected - 1
                            } else {
                                MENU_OPTIONS.len() - 1
                            };
                        }
                        KeyCode::Down => {
                            self.selected = (self.selected + 1) % MENU_OPTIONS.len();
                        }
                        KeyCode::Char('t') => self.selected_theme = self.selected_theme.next(),
                        KeyCode::Enter => self.activate(MENU_OPTIONS[self.selected]),
                        _ => {}
                    }
                }
                Event::Mouse(mouse_event) => {
                    if let MouseEventKind::Down(MouseButton::Left) = mouse_event.kind {
                        let clicked = self.option_areas.iter().position(|area| {
                            area.contains(ratatui::layout::Position::new(
                                mouse_event.column,
                                mouse_event.row,
                            ))
                        });
                        if let Some(i) = clicked {
                            self.selected = i;
                            self.activate(MENU_OPTIONS[i]);
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn activate(&mut self, option: MenuOption) {
        match option {
            MenuOption::PlayLeft => self.start_game(Side::Left),
            MenuOption::PlayRight => self.start_game(Side::Right),
            MenuOption::Theme => self.selected_theme = self.selected_theme.next(),
            MenuOption::Exit => self.exit(),
        }
    }

    fn start_game(&mut self, side: Side) {
        info!(?side, offline = self.config.offline, "side chosen");

        let transport: Box<dyn SyncTransport> = if self.config.offline {
            Box::new(OfflineTransport)
        } else {
            Box::new(MqttTransport::connect(self.config.network.clone(), side))
        };
        let mut game = Game::new(
            Session::new(side, self.config.settings),
            transport,
            InputController::new(self.release_events, self.config.key_hold),
            self.config.tick_interval(),
        );
        game.set_theme(self.selected_theme);

        self.current_game = Some(game);
        self.screen = AppScreen::Game;
    }

    fn exit(&mut self) {
        self.exit = true;
    }
}

fn init_logging(path: &Path) -> anyhow::Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening log file {}", path.display()))?;

    // stdout belongs to the TUI, so logs go to a file without colours
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(false)
        .init();
    Ok(())
}

fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    init_logging(&AppConfig::log_file_from_env())?;
    info!("net-pong v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load_or_default();
    if let Err(e) = config.validate() {
        error!("invalid configuration: {}", e);
        anyhow::bail!("invalid configuration: {}", e);
    }
    info!(
        tick_rate = config.tick_rate,
        offline = config.offline,
        rules = ?config.settings.rules,
        "configuration loaded"
    );

    let release_events = supports_keyboard_enhancement().unwrap_or(false);
    let terminal = ratatui::init();
    let mut stdout = io::stdout();
    stdout.execute(event::EnableMouseCapture)?;
    if release_events {
        stdout.execute(PushKeyboardEnhancementFlags(
            KeyboardEnhancementFlags::REPORT_EVENT_TYPES,
        ))?;
    }
    info!(release_events, "terminal ready");

    let mut app = App::new(config, release_events);
    let app_result = app.run(terminal);

    if release_events {
        stdout.execute(PopKeyboardEnhancementFlags)?;
    }
    stdout.lock().execute(event::DisableMouseCapture)?;
    ratatui::restore();

    match &app_result {
        Ok(()) => {
            println!("Thanks for playing net.pong!");
            if let Some(game) = app.current_game.as_ref() {
                let session = game.session();
                println!(
                    "Final Score: {} - {}",
                    session.player(Side::Left).score,
                    session.player(Side::Right).score
                );
            }
        }
        Err(e) => {
            error!("game ended with error: {}", e);
            eprintln!("Game ended with error: {}", e);
        }
    }

    Ok(app_result?)
}
