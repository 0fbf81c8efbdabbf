use ratatui::{
    layout::Rect,
    style::{Color, Style},
    symbols::Marker,
    widgets::{
        canvas::{Canvas, Circle, Context, Line as CanvasLine, Points},
        Block, BorderType, Borders,
    },
    Frame,
};

use crate::{
    game_theme::ThemeColors,
    helpers::centered_rect,
    protocol::Side,
    session::{Arena, Session},
};

/// Braille markers pack a 2x4 grid of dots into every terminal cell; those dots
/// are the device pixels of the drawing surface.
pub const DOTS_PER_CELL_X: f32 = 2.0;
pub const DOTS_PER_CELL_Y: f32 = 4.0;

/// Device-space size of the arena plus the logical → device multiplier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
    pub scale: f32,
}

/// Largest arena-shaped rectangle that fits the viewport. Whichever axis binds
/// gets the full length; the other is left with a margin.
pub fn fit_viewport(viewport_width: f32, viewport_height: f32, arena: &Arena) -> Viewport {
    if viewport_width / viewport_height > arena.width / arena.height {
        let scale = viewport_height / arena.height;
        Viewport {
            width: arena.width * scale,
            height: viewport_height,
            scale,
        }
    } else {
        let scale = viewport_width / arena.width;
        Viewport {
            width: viewport_width,
            height: arena.height * scale,
            scale,
        }
    }
}

/// Cell rectangle (border included) the arena occupies inside `area`.
pub fn arena_rect(area: Rect, arena: &Arena) -> (Rect, Viewport) {
    let inner_cols = area.width.saturating_sub(2);
    let inner_rows = area.height.saturating_sub(2);
    let viewport = fit_viewport(
        inner_cols as f32 * DOTS_PER_CELL_X,
        inner_rows as f32 * DOTS_PER_CELL_Y,
        arena,
    );
    let cols = (viewport.width / DOTS_PER_CELL_X).floor() as u16;
    let rows = (viewport.height / DOTS_PER_CELL_Y).floor() as u16;

    let rect = centered_rect(cols + 2, rows + 2, area.width, area.height);
    (
        Rect::new(area.x + rect.x, area.y + rect.y, rect.width, rect.height),
        viewport,
    )
}

/// Filled rectangle out of vertical dot lines, in device space with y pointing up.
fn fill_rect(ctx: &mut Context, x: f64, y: f64, w: f64, h: f64, color: Color) {
    let mut col = x;
    loop {
        ctx.draw(&CanvasLine::new(col, y, col, y + h, color));
        col += 1.0;
        if col > x + w {
            break;
        }
    }
}

pub fn draw_arena(frame: &mut Frame, area: Rect, session: &Session, colors: &ThemeColors) {
    let settings = session.settings();
    let (rect, viewport) = arena_rect(area, &settings.arena);
    if rect.width < 3 || rect.height < 3 {
        return;
    }

    let scale = viewport.scale as f64;
    let width = viewport.width as f64;
    let height = viewport.height as f64;
    let paddle_w = settings.paddle.width as f64 * scale;
    let paddle_h = settings.paddle.height as f64 * scale;
    let me = session.self_id();

    let paddle_color = |side: Side| {
        if side == me {
            colors.own_paddle
        } else {
            colors.paddle
        }
    };
    let left_top = session.player(Side::Left).position as f64 * scale;
    let right_top = session.player(Side::Right).position as f64 * scale;
    let ball = session.ball().position;
    let radius = settings.ball.radius as f64 * scale;

    let net: Vec<(f64, f64)> = (0..(height as usize))
        .step_by(4)
        .map(|y| (width / 2.0, y as f64))
        .collect();

    let canvas = Canvas::default()
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded)
                .style(Style::default().fg(colors.border).bg(colors.background)),
        )
        .background_color(colors.background)
        .marker(Marker::Braille)
        .x_bounds([0.0, width])
        .y_bounds([0.0, height])
        .paint(move |ctx| {
            ctx.draw(&Points {
                coords: &net,
                color: colors.text,
            });
            ctx.layer();

            // canvas y grows upwards, arena y grows downwards
            fill_rect(
                ctx,
                0.0,
                height - left_top - paddle_h,
                paddle_w,
                paddle_h,
                paddle_color(Side::Left),
            );
            fill_rect(
                ctx,
                width - paddle_w,
                height - right_top - paddle_h,
                paddle_w,
                paddle_h,
                paddle_color(Side::Right),
            );
            ctx.draw(&Circle {
                x: ball.x as f64 * scale,
                y: height - ball.y as f64 * scale,
                radius,
                color: colors.ball,
            });
        });

    frame.render_widget(canvas, rect);
}
