use std::str::FromStr;

use glam::Vec2;
use rand::Rng;
use tracing::{debug, info, warn};

use crate::protocol::{Side, SyncError, SyncEvent};

/// Logical arena. Every coordinate exchanged with the peer lives in this space,
/// independent of how large the terminal happens to be.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Arena {
    pub width: f32,
    pub height: f32,
}

/// Shared by both paddles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PaddleSpec {
    pub width: f32,
    pub height: f32,
    pub speed: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BallSpec {
    pub radius: f32,
    pub start_speed: f32,
    pub max_speed: f32,
    pub acceleration: f32,
}

/// How the local paddle is kept inside the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PaddleBounds {
    /// Bounds are only checked before moving, so the paddle may end up to one
    /// `speed` increment past the edge.
    Legacy,
    /// Position is clamped after every move.
    #[default]
    Clamped,
}

impl FromStr for PaddleBounds {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "legacy" => Ok(PaddleBounds::Legacy),
            "clamped" => Ok(PaddleBounds::Clamped),
            other => Err(format!("unknown paddle bounds mode '{}'", other)),
        }
    }
}

/// Rule switches for the behaviours the two peers must agree on.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rules {
    /// Right-hand rebounds speed up too (left-hand rebounds always do).
    pub accelerate_both_sides: bool,
    /// Cap `|velocity.x|` at `max_speed` after a rebound.
    pub enforce_speed_cap: bool,
    pub paddle_bounds: PaddleBounds,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GameSettings {
    pub arena: Arena,
    pub paddle: PaddleSpec,
    pub ball: BallSpec,
    pub rules: Rules,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            arena: Arena {
                width: 800.0,
                height: 400.0,
            },
            paddle: PaddleSpec {
                width: 10.0,
                height: 100.0,
                speed: 4.0,
            },
            ball: BallSpec {
                radius: 10.0,
                start_speed: 5.0,
                max_speed: 10.0,
                acceleration: 1.1,
            },
            rules: Rules::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Paddle {
    /// Offset of the paddle's top edge from the top of the arena
    pub position: f32,
    pub score: u32,
    pub moving_up: bool,
    pub moving_down: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Ball {
    /// Centre of the ball
    pub position: Vec2,
    pub velocity: Vec2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Waiting for someone to serve
    Start,
    Playing,
}

/// One side's view of a two-player match.
///
/// Each client only judges collisions on its own edge of the arena; the peer
/// learns about rebounds and misses from the events returned by [`Session::step`].
#[derive(Debug, Clone)]
pub struct Session {
    settings: GameSettings,
    players: [Paddle; 2],
    ball: Ball,
    phase: Phase,
    self_id: Side,
}

impl Session {
    pub fn new(self_id: Side, settings: GameSettings) -> Self {
        let mut session = Self {
            settings,
            players: [Paddle::default(), Paddle::default()],
            ball: Ball::default(),
            phase: Phase::Start,
            self_id,
        };
        session.reset_round();
        session
    }

    pub fn settings(&self) -> &GameSettings {
        &self.settings
    }

    pub fn self_id(&self) -> Side {
        self.self_id
    }

    pub fn opponent_id(&self) -> Side {
        self.self_id.opponent()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn ball(&self) -> &Ball {
        &self.ball
    }

    pub fn player(&self, side: Side) -> &Paddle {
        &self.players[side.index()]
    }

    fn max_paddle_position(&self) -> f32 {
        (self.settings.arena.height - self.settings.paddle.height).max(0.0)
    }

    fn centred_paddle_position(&self) -> f32 {
        (self.settings.arena.height - self.settings.paddle.height) / 2.0
    }

    pub fn set_moving_up(&mut self, moving: bool) {
        self.players[self.self_id.index()].moving_up = moving;
    }

    pub fn set_moving_down(&mut self, moving: bool) {
        self.players[self.self_id.index()].moving_down = moving;
    }

    /// Local serve. Only does anything while waiting to start; the returned
    /// event carries the exact velocity so the peer can mirror it.
    pub fn confirm<R: Rng>(&mut self, rng: &mut R) -> Option<SyncEvent> {
        if self.phase != Phase::Start {
            return None;
        }

        let start_speed = self.settings.ball.start_speed;
        let sign_x = if rng.random_bool(0.5) { 1.0 } else { -1.0 };
        let sign_y = if rng.random_bool(0.5) { 1.0 } else { -1.0 };
        let velocity = Vec2::new(
            sign_x * start_speed,
            sign_y * rng.random::<f32>() * start_speed,
        );

        self.launch(velocity);
        info!(?velocity, "served");
        Some(SyncEvent::Start { velocity })
    }

    fn launch(&mut self, velocity: Vec2) {
        self.phase = Phase::Playing;
        self.ball.velocity = velocity;
    }

    /// Put ball and paddles back in their starting places and wait for a serve.
    /// Scores are left untouched.
    pub fn reset_round(&mut self) {
        let arena = self.settings.arena;
        let centre = self.centred_paddle_position();

        self.ball = Ball {
            position: Vec2::new(arena.width / 2.0, arena.height / 2.0),
            velocity: Vec2::ZERO,
        };
        self.phase = Phase::Start;
        for player in self.players.iter_mut() {
            player.position = centre;
            player.moving_up = false;
            player.moving_down = false;
        }
    }

    /// Advance the simulation by one tick and return what the peer needs to hear.
    pub fn step(&mut self) -> Vec<SyncEvent> {
        let mut outbound = Vec::with_capacity(2);

        self.move_local_paddle();
        outbound.push(SyncEvent::Position {
            paddle: self.self_id,
            position: self.players[self.self_id.index()].position,
        });

        self.ball.position += self.ball.velocity;
        self.bounce_off_walls();

        if let Some(event) = self.resolve_local_edge() {
            outbound.push(event);
        }

        outbound
    }

    fn move_local_paddle(&mut self) {
        let max = self.max_paddle_position();
        let speed = self.settings.paddle.speed;
        let bounds = self.settings.rules.paddle_bounds;
        let paddle = &mut self.players[self.self_id.index()];

        if paddle.moving_up && paddle.position > 0.0 {
            paddle.position -= speed;
        } else if paddle.moving_down && paddle.position < max {
            paddle.position += speed;
        }

        if bounds == PaddleBounds::Clamped {
            paddle.position = paddle.position.clamp(0.0, max);
        }
    }

    fn bounce_off_walls(&mut self) {
        let radius = self.settings.ball.radius;
        let y = self.ball.position.y;
        if y <= radius || y >= self.settings.arena.height - radius {
            self.ball.velocity.y = -self.ball.velocity.y;
        }
    }

    /// Rebound or miss on the edge this client is responsible for.
    fn resolve_local_edge(&mut self) -> Option<SyncEvent> {
        let GameSettings {
            arena,
            paddle,
            ball: ball_spec,
            rules,
        } = self.settings;

        let crossed = match self.self_id {
            Side::Left => self.ball.position.x <= paddle.width,
            Side::Right => self.ball.position.x >= arena.width - paddle.width,
        };
        if !crossed {
            return None;
        }

        let top = self.players[self.self_id.index()].position;
        let y = self.ball.position.y;
        if y < top || y > top + paddle.height {
            let winner = self.opponent_id();
            self.players[winner.index()].score += 1;
            info!(
                ?winner,
                left = self.players[0].score,
                right = self.players[1].score,
                "missed the ball"
            );
            self.reset_round();
            return Some(SyncEvent::Reset);
        }

        let accelerate = self.self_id == Side::Left || rules.accelerate_both_sides;
        let mut vx = -self.ball.velocity.x;
        if accelerate {
            vx *= ball_spec.acceleration;
        }
        if rules.enforce_speed_cap {
            vx = vx.clamp(-ball_spec.max_speed, ball_spec.max_speed);
        }
        self.ball.velocity.x = vx;
        self.ball.position.x = match self.self_id {
            Side::Left => paddle.width + 1.0,
            Side::Right => arena.width - paddle.width - 1.0,
        };

        debug!(velocity = ?self.ball.velocity, "rally");
        Some(SyncEvent::Rally {
            position: self.ball.position,
            velocity: self.ball.velocity,
        })
    }

    /// Apply an event that originated on the peer.
    pub fn apply_remote(&mut self, event: SyncEvent) -> Result<(), SyncError> {
        match event {
            SyncEvent::Start { velocity } => {
                if self.phase == Phase::Start {
                    info!(?velocity, "peer served");
                    self.launch(velocity);
                } else {
                    debug!("ignoring serve while already playing");
                }
            }
            SyncEvent::Position { paddle, position } => {
                if paddle == self.self_id {
                    return Err(SyncError::OwnPaddle);
                }
                let max = self.max_paddle_position();
                let clamped = position.clamp(0.0, max);
                if clamped != position {
                    warn!(position, clamped, "peer paddle out of range");
                }
                self.players[paddle.index()].position = clamped;
            }
            SyncEvent::Rally { position, velocity } => {
                let arena = self.settings.arena;
                let clamped = position.clamp(Vec2::ZERO, Vec2::new(arena.width, arena.height));
                if clamped != position {
                    warn!(?position, ?clamped, "peer ball out of range");
                }
                self.ball.position = clamped;
                self.ball.velocity = velocity;
            }
            SyncEvent::Reset => {
                let me = self.self_id;
                self.players[me.index()].score += 1;
                info!(
                    left = self.players[0].score,
                    right = self.players[1].score,
                    "peer missed the ball"
                );
                self.reset_round();
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn session(side: Side) -> Session {
        Session::new(side, GameSettings::default())
    }

    fn with_rules(side: Side, rules: Rules) -> Session {
        Session::new(
            side,
            GameSettings {
                rules,
                ..GameSettings::default()
            },
        )
    }

    fn place_ball(session: &mut Session, position: Vec2, velocity: Vec2) {
        session.phase = Phase::Playing;
        session.ball = Ball { position, velocity };
    }

    #[test]
    fn test_paddles_start_centred() {
        let s = session(Side::Left);
        assert_eq!(s.player(Side::Left).position, 150.0);
        assert_eq!(s.player(Side::Right).position, 150.0);
        assert_eq!(s.ball().position, Vec2::new(400.0, 200.0));
        assert_eq!(s.ball().velocity, Vec2::ZERO);
        assert_eq!(s.phase(), Phase::Start);
    }

    #[test]
    fn test_up_takes_precedence_over_down() {
        let mut s = session(Side::Left);
        s.set_moving_up(true);
        s.set_moving_down(true);
        s.step();
        assert_eq!(s.player(Side::Left).position, 146.0);
    }

    #[test]
    fn test_only_local_paddle_moves() {
        let mut s = session(Side::Right);
        s.players[0].moving_down = true;
        s.set_moving_down(true);
        s.step();
        assert_eq!(s.player(Side::Left).position, 150.0);
        assert_eq!(s.player(Side::Right).position, 154.0);
    }

    #[test]
    fn test_clamped_paddle_stays_in_arena() {
        let mut s = session(Side::Left);
        s.set_moving_up(true);
        for _ in 0..100 {
            s.step();
            let pos = s.player(Side::Left).position;
            assert!((0.0..=300.0).contains(&pos), "position {}", pos);
        }
        assert_eq!(s.player(Side::Left).position, 0.0);

        s.set_moving_up(false);
        s.set_moving_down(true);
        for _ in 0..200 {
            s.step();
            let pos = s.player(Side::Left).position;
            assert!((0.0..=300.0).contains(&pos), "position {}", pos);
        }
        assert_eq!(s.player(Side::Left).position, 300.0);
    }

    #[test]
    fn test_legacy_paddle_overshoots_by_less_than_one_step() {
        let mut s = with_rules(
            Side::Left,
            Rules {
                paddle_bounds: PaddleBounds::Legacy,
                ..Rules::default()
            },
        );
        s.set_moving_up(true);
        for _ in 0..100 {
            s.step();
            let pos = s.player(Side::Left).position;
            assert!(pos > -4.0 && pos <= 300.0 + 4.0, "position {}", pos);
        }
        // 150 is not a multiple of 4, so the last move lands at -2
        assert_eq!(s.player(Side::Left).position, -2.0);
    }

    #[test]
    fn test_position_broadcast_every_tick() {
        let mut s = session(Side::Right);
        for _ in 0..3 {
            let events = s.step();
            assert_eq!(
                events,
                vec![SyncEvent::Position {
                    paddle: Side::Right,
                    position: 150.0
                }]
            );
        }
    }

    #[test]
    fn test_wall_bounce_flips_only_vertical_velocity() {
        let mut s = session(Side::Left);
        place_ball(&mut s, Vec2::new(400.0, 12.0), Vec2::new(3.0, -4.0));
        s.step();
        assert_eq!(s.ball().position, Vec2::new(403.0, 8.0));
        assert_eq!(s.ball().velocity, Vec2::new(3.0, 4.0));

        place_ball(&mut s, Vec2::new(400.0, 388.0), Vec2::new(-3.0, 4.0));
        s.step();
        assert_eq!(s.ball().position, Vec2::new(397.0, 392.0));
        assert_eq!(s.ball().velocity, Vec2::new(-3.0, -4.0));
    }

    #[test]
    fn test_left_paddle_hit_accelerates_and_clamps() {
        let mut s = session(Side::Left);
        // lands on (5, 200) this tick, inside the paddle's [150, 250] span
        place_ball(&mut s, Vec2::new(10.0, 200.0), Vec2::new(-5.0, 0.0));
        let events = s.step();

        let expected_vx = 5.0 * 1.1;
        assert!((s.ball().velocity.x - expected_vx).abs() < 1e-5);
        assert_eq!(s.ball().position.x, 11.0);
        assert!(matches!(events.last(), Some(SyncEvent::Rally { .. })));
    }

    #[test]
    fn test_left_paddle_hit_edges_are_inclusive() {
        for y in [150.0, 250.0] {
            let mut s = session(Side::Left);
            place_ball(&mut s, Vec2::new(12.0, y), Vec2::new(-4.0, 0.0));
            let events = s.step();
            assert!(matches!(events.last(), Some(SyncEvent::Rally { .. })), "y = {}", y);
        }
    }

    #[test]
    fn test_left_paddle_miss_resets_round() {
        let mut s = session(Side::Left);
        place_ball(&mut s, Vec2::new(9.0, 260.0), Vec2::new(-4.0, 0.0));
        s.set_moving_down(true);
        let events = s.step();

        assert_eq!(events.last(), Some(&SyncEvent::Reset));
        assert_eq!(s.phase(), Phase::Start);
        assert_eq!(s.ball().position, Vec2::new(400.0, 200.0));
        assert_eq!(s.ball().velocity, Vec2::ZERO);
        assert_eq!(s.player(Side::Left).position, 150.0);
        assert!(!s.player(Side::Left).moving_down);
        assert_eq!(s.player(Side::Right).score, 1);
        assert_eq!(s.player(Side::Left).score, 0);
    }

    #[test]
    fn test_right_paddle_hit_has_no_acceleration_by_default() {
        let mut s = session(Side::Right);
        place_ball(&mut s, Vec2::new(788.0, 200.0), Vec2::new(5.0, 1.0));
        let events = s.step();

        assert_eq!(s.ball().velocity, Vec2::new(-5.0, 1.0));
        assert_eq!(s.ball().position.x, 789.0);
        assert_eq!(
            events.last(),
            Some(&SyncEvent::Rally {
                position: Vec2::new(789.0, 201.0),
                velocity: Vec2::new(-5.0, 1.0),
            })
        );
    }

    #[test]
    fn test_right_paddle_accelerates_when_enabled() {
        let mut s = with_rules(
            Side::Right,
            Rules {
                accelerate_both_sides: true,
                ..Rules::default()
            },
        );
        place_ball(&mut s, Vec2::new(788.0, 200.0), Vec2::new(5.0, 0.0));
        s.step();
        assert!((s.ball().velocity.x + 5.5).abs() < 1e-5);
    }

    #[test]
    fn test_speed_cap_applies_only_when_enabled() {
        let mut uncapped = session(Side::Left);
        place_ball(&mut uncapped, Vec2::new(19.0, 200.0), Vec2::new(-9.5, 0.0));
        uncapped.step();
        assert!(uncapped.ball().velocity.x > 10.0);

        let mut capped = with_rules(
            Side::Left,
            Rules {
                enforce_speed_cap: true,
                ..Rules::default()
            },
        );
        place_ball(&mut capped, Vec2::new(19.0, 200.0), Vec2::new(-9.5, 0.0));
        capped.step();
        assert_eq!(capped.ball().velocity.x, 10.0);
    }

    #[test]
    fn test_opponent_edge_is_not_judged_locally() {
        let mut s = session(Side::Left);
        place_ball(&mut s, Vec2::new(795.0, 380.0), Vec2::new(5.0, 0.0));
        let events = s.step();
        assert_eq!(events.len(), 1);
        assert_eq!(s.phase(), Phase::Playing);
        assert_eq!(s.ball().position.x, 800.0);
    }

    #[test]
    fn test_reset_round_from_any_state() {
        let mut s = session(Side::Right);
        place_ball(&mut s, Vec2::new(123.0, 45.0), Vec2::new(-7.0, 3.0));
        s.players[0].position = 0.0;
        s.players[1].position = 300.0;
        s.players[1].moving_up = true;
        s.players[0].score = 4;

        s.reset_round();

        assert_eq!(s.player(Side::Left).position, 150.0);
        assert_eq!(s.player(Side::Right).position, 150.0);
        assert!(!s.player(Side::Right).moving_up);
        assert_eq!(s.ball().position, Vec2::new(400.0, 200.0));
        assert_eq!(s.ball().velocity, Vec2::ZERO);
        assert_eq!(s.phase(), Phase::Start);
        assert_eq!(s.player(Side::Left).score, 4);
    }

    #[test]
    fn test_confirm_launches_with_start_speed() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let mut s = session(Side::Left);
            let event = s.confirm(&mut rng);
            let velocity = s.ball().velocity;

            assert_eq!(s.phase(), Phase::Playing);
            assert_eq!(velocity.x.abs(), 5.0);
            assert!(velocity.y.abs() < 5.0);
            assert_eq!(event, Some(SyncEvent::Start { velocity }));
        }
    }

    #[test]
    fn test_confirm_while_playing_does_nothing() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut s = session(Side::Left);
        s.confirm(&mut rng);
        let velocity = s.ball().velocity;
        assert_eq!(s.confirm(&mut rng), None);
        assert_eq!(s.ball().velocity, velocity);
    }

    #[test]
    fn test_remote_start_applies_velocity_verbatim() {
        let mut s = session(Side::Right);
        let velocity = Vec2::new(-5.0, 2.25);
        s.apply_remote(SyncEvent::Start { velocity }).unwrap();
        assert_eq!(s.phase(), Phase::Playing);
        assert_eq!(s.ball().velocity, velocity);

        // a second serve while playing is ignored
        s.apply_remote(SyncEvent::Start {
            velocity: Vec2::new(5.0, 0.0),
        })
        .unwrap();
        assert_eq!(s.ball().velocity, velocity);
    }

    #[test]
    fn test_remote_position_overwrites_opponent_only() {
        let mut s = session(Side::Left);
        s.apply_remote(SyncEvent::Position {
            paddle: Side::Right,
            position: 42.0,
        })
        .unwrap();
        assert_eq!(s.player(Side::Right).position, 42.0);

        let result = s.apply_remote(SyncEvent::Position {
            paddle: Side::Left,
            position: 10.0,
        });
        assert!(matches!(result, Err(SyncError::OwnPaddle)));
        assert_eq!(s.player(Side::Left).position, 150.0);
    }

    #[test]
    fn test_remote_position_is_clamped() {
        let mut s = session(Side::Left);
        s.apply_remote(SyncEvent::Position {
            paddle: Side::Right,
            position: 9000.0,
        })
        .unwrap();
        assert_eq!(s.player(Side::Right).position, 300.0);

        s.apply_remote(SyncEvent::Position {
            paddle: Side::Right,
            position: -3.0,
        })
        .unwrap();
        assert_eq!(s.player(Side::Right).position, 0.0);
    }

    #[test]
    fn test_remote_rally_overwrites_ball() {
        let mut s = session(Side::Left);
        s.apply_remote(SyncEvent::Rally {
            position: Vec2::new(789.0, 120.0),
            velocity: Vec2::new(-5.5, 2.0),
        })
        .unwrap();
        assert_eq!(s.ball().position, Vec2::new(789.0, 120.0));
        assert_eq!(s.ball().velocity, Vec2::new(-5.5, 2.0));

        s.apply_remote(SyncEvent::Rally {
            position: Vec2::new(-50.0, 1000.0),
            velocity: Vec2::new(-5.5, 2.0),
        })
        .unwrap();
        assert_eq!(s.ball().position, Vec2::new(0.0, 400.0));
    }

    #[test]
    fn test_remote_reset_scores_for_us() {
        let mut s = session(Side::Left);
        place_ball(&mut s, Vec2::new(700.0, 100.0), Vec2::new(6.0, 1.0));
        s.apply_remote(SyncEvent::Reset).unwrap();
        assert_eq!(s.player(Side::Left).score, 1);
        assert_eq!(s.player(Side::Right).score, 0);
        assert_eq!(s.phase(), Phase::Start);
        assert_eq!(s.ball().velocity, Vec2::ZERO);
    }

    #[test]
    fn test_paddle_bounds_parse() {
        assert_eq!("Legacy".parse::<PaddleBounds>(), Ok(PaddleBounds::Legacy));
        assert_eq!(" clamped ".parse::<PaddleBounds>(), Ok(PaddleBounds::Clamped));
        assert!("loose".parse::<PaddleBounds>().is_err());
    }
}
