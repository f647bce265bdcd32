use ratatui::buffer::Buffer;
use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::Widget;

/// Exercise steps rendered as chips, wrapping onto following rows.
///
/// Steps before `current` are done, the one at `current` is highlighted,
/// the rest are pending.
pub struct StepStrip<'a> {
    steps: &'a [String],
    current: usize,
    done_style: Style,
    current_style: Style,
    pending_style: Style,
}

impl<'a> StepStrip<'a> {
    pub fn new(steps: &'a [String], current: usize) -> Self {
        Self {
            steps,
            current,
            done_style: Style::default().fg(Color::Green),
            current_style: Style::default()
                .fg(Color::White)
                .bg(Color::Magenta)
                .add_modifier(Modifier::BOLD),
            pending_style: Style::default().fg(Color::DarkGray),
        }
    }

    pub fn current_style(mut self, style: Style) -> Self {
        self.current_style = style;
        self
    }

    /// Rows needed to show every chip within `width` columns.
    pub fn height(steps: &[String], width: u16) -> u16 {
        let mut rows = 1;
        let mut x = 0u16;
        for step in steps {
            let len = chip_len(step);
            if x > 0 && x.saturating_add(len) > width {
                rows += 1;
                x = 0;
            }
            x = x.saturating_add(len).saturating_add(1);
        }
        rows
    }
}

/// Chip width including padding, clamped to `u16::MAX`.
fn chip_len(text: &str) -> u16 {
    u16::try_from(text.chars().count())
        .unwrap_or(u16::MAX)
        .saturating_add(2)
}

impl Widget for StepStrip<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if area.height == 0 || area.width == 0 {
            return;
        }
        let mut x = area.x;
        let mut y = area.y;
        for (i, step) in self.steps.iter().enumerate() {
            let len = chip_len(step);
            if x > area.x && x.saturating_add(len) > area.right() {
                x = area.x;
                y += 1;
            }
            if y >= area.bottom() {
                break;
            }
            let style = match i.cmp(&self.current) {
                std::cmp::Ordering::Less => self.done_style,
                std::cmp::Ordering::Equal => self.current_style,
                std::cmp::Ordering::Greater => self.pending_style,
            };
            let chip = format!(" {step} ");
            for ch in chip.chars() {
                if x >= area.right() {
                    break;
                }
                if let Some(cell) = buf.cell_mut((x, y)) {
                    cell.set_char(ch);
                    cell.set_style(style);
                }
                x += 1;
            }
            x = x.saturating_add(1);
        }
    }
}
