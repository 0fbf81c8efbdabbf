use crossterm::event::{self, Event, KeyEvent};
use rand::{rngs::StdRng, SeedableRng};
use std::{
    io,
    time::{Duration, Instant},
};
use tracing::debug;

use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::Style,
    widgets::{Block, BorderType, Borders, Clear, Paragraph},
    Frame,
};

use crate::{
    game_theme::GameTheme,
    helpers::centered_rect,
    input::{InputCommand, InputController},
    network::{LinkStatus, SyncTransport},
    protocol::{Side, SyncEvent},
    render::{arena_rect, draw_arena},
    session::{Phase, Session},
};

/// How far the loop may fall behind before it stops trying to catch up.
const MAX_TICK_BACKLOG: u32 = 5;

/// A running match: the simulation plus everything around it (keyboard,
/// transport, clock, drawing).
pub struct Game {
    session: Session,
    transport: Box<dyn SyncTransport>,
    input: InputController,
    rng: StdRng,
    theme: GameTheme,
    tick_interval: Duration,
    next_tick: Instant,
    should_exit: bool,
}

impl Game {
    pub fn new(
        session: Session,
        transport: Box<dyn SyncTransport>,
        input: InputController,
        tick_interval: Duration,
    ) -> Self {
        Self {
            session,
            transport,
            input,
            rng: StdRng::from_os_rng(),
            theme: GameTheme::default(),
            tick_interval,
            next_tick: Instant::now(),
            should_exit: false,
        }
    }

    pub fn set_theme(&mut self, theme: GameTheme) {
        self.theme = theme;
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    fn apply_command(&mut self, command: InputCommand) {
        match command {
            InputCommand::MoveUp(moving) => self.session.set_moving_up(moving),
            InputCommand::MoveDown(moving) => self.session.set_moving_down(moving),
            InputCommand::Confirm => {
                if let Some(event) = self.session.confirm(&mut self.rng) {
                    self.transport.send(event);
                }
            }
            InputCommand::Quit => self.should_exit = true,
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent, now: Instant) {
        if let Some(command) = self.input.handle_key(key, now) {
            self.apply_command(command);
        }
    }

    /// Drain terminal events until the next tick is due.
    fn handle_events(&mut self) -> io::Result<()> {
        let mut timeout = self.next_tick.saturating_duration_since(Instant::now());
        while event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                self.handle_key(key, Instant::now());
            }
            if self.should_exit {
                break;
            }
            timeout = self.next_tick.saturating_duration_since(Instant::now());
        }
        Ok(())
    }

    /// One simulation tick: peer state first, then local input, then physics.
    pub fn tick(&mut self, now: Instant) {
        for event in self.transport.poll() {
            let reset = event == SyncEvent::Reset;
            if let Err(e) = self.session.apply_remote(event) {
                debug!("ignoring peer event: {}", e);
            }
            if reset {
                self.input.clear();
            }
        }

        for command in self.input.expire(now) {
            self.apply_command(command);
        }

        for event in self.session.step() {
            if event == SyncEvent::Reset {
                self.input.clear();
            }
            self.transport.send(event);
        }
    }

    pub fn game_loop(&mut self) -> io::Result<bool> {
        self.handle_events()?;
        if self.should_exit {
            return Ok(false);
        }

        let now = Instant::now();
        if now.saturating_duration_since(self.next_tick) > self.tick_interval * MAX_TICK_BACKLOG {
            debug!("tick backlog too large, skipping ahead");
            self.next_tick = now;
        }
        while self.next_tick <= now {
            self.tick(now);
            self.next_tick += self.tick_interval;
        }

        Ok(true)
    }

    fn status_text(&self) -> &'static str {
        match self.transport.status() {
            LinkStatus::Offline => "offline practice",
            LinkStatus::Connecting => "connecting to broker...",
            LinkStatus::Connected => "connected",
            LinkStatus::Disconnected => "connection lost, retrying",
        }
    }

    fn get_block_title(&self, app_name: &'static str) -> String {
        let me = self.session.self_id();
        let label = |side: Side| {
            let name = match side {
                Side::Left => "Player 1",
                Side::Right => "Player 2",
            };
            if side == me {
                format!("{} (you)", name)
            } else {
                name.to_string()
            }
        };

        let p1_text = format!("{} [{}]", label(Side::Left), self.session.player(Side::Left).score);
        let p2_text = format!("[{}] {}", self.session.player(Side::Right).score, label(Side::Right));
        format!(" {}  ─  {}  ─  {} ", p1_text, app_name, p2_text)
    }

    pub fn draw(&mut self, frame: &mut Frame) {
        let area = frame.area();
        let colors = self.theme.colors();

        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints(vec![
                Constraint::Fill(1),   // game block - fills available space
                Constraint::Length(3), // controls block
            ])
            .split(area);

        let block = Block::default()
            .title(self.get_block_title("net.pong"))
            .borders(Borders::ALL)
            .border_type(BorderType::Thick)
            .style(Style::default().fg(colors.border).bg(colors.background))
            .title_alignment(Alignment::Center);
        let inner = block.inner(layout[0]);
        frame.render_widget(block, layout[0]);
        frame.render_widget(Clear, inner);

        draw_arena(frame, inner, &self.session, &colors);

        if self.session.phase() == Phase::Start {
            let (arena_area, _) = arena_rect(inner, &self.session.settings().arena);
            let hint_area = centered_rect(28, 3, arena_area.width, arena_area.height);
            let hint_area = Rect::new(
                arena_area.x + hint_area.x,
                arena_area.y + hint_area.y,
                hint_area.width,
                hint_area.height,
            );
            let hint = Paragraph::new("Press Enter to serve")
                .block(
                    Block::default()
                        .borders(Borders::ALL)
                        .border_type(BorderType::Rounded)
                        .style(Style::default().fg(colors.accent)),
                )
                .style(Style::default().fg(colors.text))
                .alignment(Alignment::Center);
            frame.render_widget(Clear, hint_area);
            frame.render_widget(hint, hint_area);
        }

        let keys = if self.input.reports_releases() {
            "↑/↓ = move"
        } else {
            "↑/↓ (hold) = move"
        };
        let controls_text = format!(
            " {}  Enter = serve  Esc = quit  |  {} ",
            keys,
            self.status_text()
        );
        let controls = Paragraph::new(controls_text)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_type(BorderType::Rounded)
                    .style(Style::default().fg(colors.border)),
            )
            .style(Style::default().fg(colors.text))
            .alignment(Alignment::Center);
        frame.render_widget(controls, layout[1]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{network::MemoryTransport, session::GameSettings};
    use crossterm::event::{KeyCode, KeyEventKind, KeyModifiers};
    use ratatui::{backend::TestBackend, Terminal};

    const TICK: Duration = Duration::from_millis(16);

    fn game(side: Side, transport: MemoryTransport, seed: u64) -> Game {
        let mut game = Game::new(
            Session::new(side, GameSettings::default()),
            Box::new(transport),
            InputController::new(true, Duration::from_millis(150)),
            TICK,
        );
        game.rng = StdRng::seed_from_u64(seed);
        game
    }

    fn press(game: &mut Game, code: KeyCode) {
        game.handle_key(
            KeyEvent::new_with_kind(code, KeyModifiers::NONE, KeyEventKind::Press),
            Instant::now(),
        );
    }

    #[test]
    fn test_serve_is_mirrored_by_peer() {
        let (a, b) = MemoryTransport::pair();
        let mut left = game(Side::Left, a, 3);
        let mut right = game(Side::Right, b, 4);

        press(&mut left, KeyCode::Enter);
        assert_eq!(left.session().phase(), Phase::Playing);

        right.tick(Instant::now());
        assert_eq!(right.session().phase(), Phase::Playing);
        assert_eq!(right.session().ball().velocity, left.session().ball().velocity);

        // a late Enter on the other side must not relaunch
        let velocity = right.session().ball().velocity;
        press(&mut right, KeyCode::Enter);
        assert_eq!(right.session().ball().velocity, velocity);
    }

    #[test]
    fn test_paddle_positions_cross_over() {
        let (a, b) = MemoryTransport::pair();
        let mut left = game(Side::Left, a, 1);
        let mut right = game(Side::Right, b, 2);

        press(&mut left, KeyCode::Up);
        for _ in 0..10 {
            let now = Instant::now();
            left.tick(now);
            right.tick(now);
        }
        assert_eq!(left.session().player(Side::Left).position, 110.0);
        assert_eq!(right.session().player(Side::Left).position, 110.0);
        assert_eq!(right.session().player(Side::Right).position, 150.0);
    }

    #[test]
    fn test_match_until_a_miss_keeps_scores_in_agreement() {
        let (a, b) = MemoryTransport::pair();
        let mut left = game(Side::Left, a, 11);
        let mut right = game(Side::Right, b, 12);

        // park both paddles away from the serve line so someone misses soon
        press(&mut left, KeyCode::Down);
        press(&mut right, KeyCode::Up);
        for _ in 0..40 {
            let now = Instant::now();
            left.tick(now);
            right.tick(now);
        }
        press(&mut left, KeyCode::Enter);

        let mut finished = false;
        for _ in 0..20_000 {
            let now = Instant::now();
            left.tick(now);
            right.tick(now);
            let total = left.session().player(Side::Left).score
                + left.session().player(Side::Right).score;
            if total > 0 {
                // one more round trip so the reset reaches the other side
                left.tick(now);
                right.tick(now);
                finished = true;
                break;
            }
        }

        assert!(finished, "nobody missed");
        for side in [Side::Left, Side::Right] {
            assert_eq!(
                left.session().player(side).score,
                right.session().player(side).score
            );
        }
        assert_eq!(left.session().phase(), Phase::Start);
        assert_eq!(right.session().phase(), Phase::Start);
    }

    #[test]
    fn test_quit_ends_loop() {
        let (a, _b) = MemoryTransport::pair();
        let mut left = game(Side::Left, a, 1);
        press(&mut left, KeyCode::Esc);
        assert!(left.should_exit);
    }

    #[test]
    fn test_title_marks_local_player() {
        let (_a, b) = MemoryTransport::pair();
        let right = game(Side::Right, b, 1);
        let title = right.get_block_title("net.pong");
        assert!(title.contains("Player 2 (you)"));
        assert!(title.contains("Player 1 [0]"));
    }

    #[test]
    fn test_draw_shows_serve_hint() {
        let (a, _b) = MemoryTransport::pair();
        let mut left = game(Side::Left, a, 1);
        let mut terminal = Terminal::new(TestBackend::new(100, 30)).unwrap();
        terminal.draw(|frame| left.draw(frame)).unwrap();

        let text: String = terminal
            .backend()
            .buffer()
            .content
            .iter()
            .map(|cell| cell.symbol())
            .collect();
        assert!(text.contains("Press Enter to serve"));
        assert!(text.contains("net.pong"));
    }
}
