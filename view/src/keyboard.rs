use ratatui::buffer::Buffer;
use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::Widget;

/// One key on the on-screen piano.
#[derive(Clone, Copy, Default)]
pub struct KeyCap<'a> {
    /// Computer key to press, e.g. `"A"`.
    pub label: &'a str,
    /// Second line under the label, e.g. solfège.
    pub caption: &'a str,
    pub black: bool,
    pub held: bool,
    /// Part of the step the player should play next.
    pub target: bool,
    pub left_hand: bool,
}

/// A piano drawn from keys in chromatic order.
///
/// White keys are columns of `white_width` cells spanning the full height;
/// black keys are drawn on top, straddling the boundary between the two
/// white keys around them, over the upper part of the area.
pub struct Keyboard<'a> {
    keys: &'a [KeyCap<'a>],
    white_width: u16,
    left_style: Style,
    right_style: Style,
    black_style: Style,
    held_style: Style,
    target_style: Style,
}

const BLACK_WIDTH: u16 = 3;

impl<'a> Keyboard<'a> {
    pub fn new(keys: &'a [KeyCap<'a>]) -> Self {
        Self {
            keys,
            white_width: 6,
            left_style: Style::default().fg(Color::Black).bg(Color::Rgb(255, 246, 224)),
            right_style: Style::default().fg(Color::Black).bg(Color::White),
            black_style: Style::default().fg(Color::White).bg(Color::Rgb(24, 24, 27)),
            held_style: Style::default()
                .fg(Color::White)
                .bg(Color::Magenta)
                .add_modifier(Modifier::BOLD),
            target_style: Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        }
    }

    pub fn white_width(mut self, width: u16) -> Self {
        self.white_width = width.max(BLACK_WIDTH);
        self
    }

    pub fn held_style(mut self, style: Style) -> Self {
        self.held_style = style;
        self
    }

    /// Columns needed to draw `keys` with the given white key width.
    pub fn width(keys: &[KeyCap<'_>], white_width: u16) -> u16 {
        keys.iter().filter(|k| !k.black).count() as u16 * white_width
    }

    fn style_for(&self, key: &KeyCap<'_>) -> Style {
        let base = if key.held {
            self.held_style
        } else if key.black {
            self.black_style
        } else if key.left_hand {
            self.left_style
        } else {
            self.right_style
        };
        if key.target && !key.held {
            // Keep the key colour, mark the text.
            base.fg(self.target_style.fg.unwrap_or(Color::Yellow))
                .add_modifier(self.target_style.add_modifier)
        } else {
            base
        }
    }
}

fn fill(buf: &mut Buffer, x: u16, y: u16, width: u16, height: u16, style: Style, clip: Rect) {
    for row in y..y.saturating_add(height) {
        for col in x..x.saturating_add(width) {
            if col >= clip.right() || row >= clip.bottom() {
                continue;
            }
            if let Some(cell) = buf.cell_mut((col, row)) {
                cell.set_char(' ');
                cell.set_style(style);
            }
        }
    }
}

/// Write `text` centred in `width` columns starting at `x`.
fn centred(buf: &mut Buffer, x: u16, y: u16, width: u16, text: &str, style: Style, clip: Rect) {
    if y >= clip.bottom() {
        return;
    }
    let len = text.chars().count() as u16;
    let start = x + width.saturating_sub(len) / 2;
    for (i, ch) in text.chars().take(width as usize).enumerate() {
        let col = start + i as u16;
        if col >= clip.right() {
            break;
        }
        if let Some(cell) = buf.cell_mut((col, y)) {
            cell.set_char(ch);
            cell.set_style(style);
        }
    }
}

impl Widget for Keyboard<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if area.height < 4 || area.width < self.white_width {
            return;
        }
        let w = self.white_width;
        let black_height = (area.height * 3 / 5).max(2);

        // White keys first.
        let mut white_x = area.x;
        for key in self.keys.iter().filter(|k| !k.black) {
            let style = self.style_for(key);
            fill(buf, white_x, area.y, w - 1, area.height, style, area);
            // Separator column between white keys.
            for row in area.y..area.bottom() {
                if white_x + w - 1 < area.right() {
                    if let Some(cell) = buf.cell_mut((white_x + w - 1, row)) {
                        cell.set_char('│');
                        cell.set_style(Style::default().fg(Color::DarkGray).bg(Color::Gray));
                    }
                }
            }
            centred(buf, white_x, area.bottom() - 2, w - 1, key.label, style, area);
            centred(buf, white_x, area.bottom() - 1, w - 1, key.caption, style, area);
            white_x += w;
        }

        // Black keys straddle the boundary before the next white key.
        let mut boundary = area.x;
        for key in self.keys {
            if !key.black {
                boundary += w;
                continue;
            }
            if boundary < area.x + 2 {
                continue;
            }
            let x = boundary - 2;
            let style = self.style_for(key);
            fill(buf, x, area.y, BLACK_WIDTH, black_height, style, area);
            centred(buf, x, area.y + black_height - 2, BLACK_WIDTH, key.label, style, area);
            let short = key.caption.chars().take(BLACK_WIDTH as usize).collect::<String>();
            centred(buf, x, area.y + black_height - 1, BLACK_WIDTH, &short, style, area);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> Vec<KeyCap<'static>> {
        vec![
            KeyCap { label: "A", caption: "Do", left_hand: true, ..Default::default() },
            KeyCap { label: "Q", caption: "Do#", black: true, left_hand: true, ..Default::default() },
            KeyCap { label: "S", caption: "Re", left_hand: true, held: true, ..Default::default() },
        ]
    }

    fn row(buf: &Buffer, y: u16) -> String {
        (0..buf.area.width)
            .map(|x| buf.cell((x, y)).map_or(" ", |c| c.symbol()).to_string())
            .collect()
    }

    #[test]
    fn width_counts_white_keys() {
        assert_eq!(Keyboard::width(&keys(), 6), 12);
    }

    #[test]
    fn labels_and_captions() {
        let keys = keys();
        let area = Rect::new(0, 0, 12, 6);
        let mut buf = Buffer::empty(area);
        Keyboard::new(&keys).render(area, &mut buf);
        assert!(row(&buf, 4).contains('A'));
        assert!(row(&buf, 4).contains('S'));
        assert!(row(&buf, 5).contains("Do"));
        // Black key label sits in the upper part.
        assert!(row(&buf, 1).contains('Q'));
    }

    #[test]
    fn held_key_highlighted() {
        let keys = keys();
        let area = Rect::new(0, 0, 12, 6);
        let mut buf = Buffer::empty(area);
        Keyboard::new(&keys).render(area, &mut buf);
        let held = buf.cell((8, 5)).unwrap();
        assert_eq!(held.bg, Color::Magenta);
        let idle = buf.cell((0, 5)).unwrap();
        assert_ne!(idle.bg, Color::Magenta);
    }

    #[test]
    fn tiny_area_draws_nothing() {
        let keys = keys();
        let area = Rect::new(0, 0, 12, 2);
        let mut buf = Buffer::empty(area);
        Keyboard::new(&keys).render(area, &mut buf);
        assert_eq!(row(&buf, 0).trim(), "");
    }
}
