use ratatui::layout::Rect;

pub fn centered_rect_with_percentage(percent_x: u16, percent_y: u16, cols: u16, rows: u16) -> Rect {
    let width = cols * percent_x / 100;
    let height = std::cmp::min(std::cmp::max(rows * percent_y / 100, 5), rows);
    Rect::new((cols - width) / 2, (rows - height) / 2, width, height)
}

/// Rect of at most `width` x `height`, centred in a `cols` x `rows` area
/// (coordinates relative to that area).
pub fn centered_rect(width: u16, height: u16, cols: u16, rows: u16) -> Rect {
    let actual_width = std::cmp::min(width, cols);
    let actual_height = std::cmp::min(height, rows);

    Rect::new(
        (cols - actual_width) / 2,
        (rows - actual_height) / 2,
        actual_width,
        actual_height,
    )
}
