//! Keyboard handling for the local paddle.
//!
//! Terminals with the kitty keyboard protocol report key releases, which map
//! directly onto the movement flags. Everywhere else only presses (and their
//! auto-repeats) arrive, so a press holds its flag for a short window that
//! each repeat extends.

use std::time::{Duration, Instant};

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputCommand {
    MoveUp(bool),
    MoveDown(bool),
    /// Serve, only meaningful while waiting to start
    Confirm,
    Quit,
}

#[derive(Debug)]
pub struct InputController {
    release_events: bool,
    hold: Duration,
    up_until: Option<Instant>,
    down_until: Option<Instant>,
}

impl InputController {
    pub fn new(release_events: bool, hold: Duration) -> Self {
        Self {
            release_events,
            hold,
            up_until: None,
            down_until: None,
        }
    }

    pub fn reports_releases(&self) -> bool {
        self.release_events
    }

    pub fn handle_key(&mut self, key: KeyEvent, now: Instant) -> Option<InputCommand> {
        let pressed = matches!(key.kind, KeyEventKind::Press | KeyEventKind::Repeat);

        match key.code {
            KeyCode::Up => self.movement(pressed, now, true),
            KeyCode::Down => self.movement(pressed, now, false),
            KeyCode::Enter if key.kind == KeyEventKind::Press => Some(InputCommand::Confirm),
            KeyCode::Esc | KeyCode::Char('q') if key.kind == KeyEventKind::Press => {
                Some(InputCommand::Quit)
            }
            KeyCode::Char('c')
                if key.kind == KeyEventKind::Press
                    && key.modifiers.contains(KeyModifiers::CONTROL) =>
            {
                Some(InputCommand::Quit)
            }
            _ => None,
        }
    }

    fn movement(&mut self, pressed: bool, now: Instant, up: bool) -> Option<InputCommand> {
        let command = if up {
            InputCommand::MoveUp(pressed)
        } else {
            InputCommand::MoveDown(pressed)
        };

        if self.release_events || !pressed {
            return Some(command);
        }

        let deadline = Some(now + self.hold);
        if up {
            self.up_until = deadline;
        } else {
            self.down_until = deadline;
        }
        Some(command)
    }

    /// Synthesized releases for keys whose hold window ran out.
    pub fn expire(&mut self, now: Instant) -> Vec<InputCommand> {
        let mut released = Vec::new();
        if self.up_until.is_some_and(|until| now >= until) {
            self.up_until = None;
            released.push(InputCommand::MoveUp(false));
        }
        if self.down_until.is_some_and(|until| now >= until) {
            self.down_until = None;
            released.push(InputCommand::MoveDown(false));
        }
        released
    }

    /// Forget any held keys, e.g. after the round was reset.
    pub fn clear(&mut self) {
        self.up_until = None;
        self.down_until = None;
    }
}
