use ratatui::buffer::Buffer;
use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::Widget;

/// A vertical menu with a cursor, a chosen entry, and scrolling.
///
/// The cursor is where Up/Down moves; the chosen entry is the one that was
/// last confirmed and is marked with a bullet. Each item may carry a badge
/// right-aligned on its row.
pub struct Menu<'a> {
    items: &'a [MenuItem<'a>],
    cursor: usize,
    offset: usize,
    chosen: Option<usize>,
    style: Style,
    cursor_style: Style,
    chosen_style: Style,
    scrollbar_style: Style,
    scrollbar_track_style: Style,
}

pub struct MenuItem<'a> {
    pub title: &'a str,
    pub badge: &'a str,
    pub badge_style: Style,
}

impl<'a> MenuItem<'a> {
    pub fn new(title: &'a str) -> Self {
        Self {
            title,
            badge: "",
            badge_style: Style::default(),
        }
    }

    pub fn badge(mut self, badge: &'a str, style: Style) -> Self {
        self.badge = badge;
        self.badge_style = style;
        self
    }
}

/// Cursor, scroll offset and chosen entry for a menu.
#[derive(Default, Clone, Debug)]
pub struct MenuState {
    pub cursor: usize,
    pub offset: usize,
    pub len: usize,
    pub chosen: Option<usize>,
}

impl MenuState {
    pub fn new(len: usize) -> Self {
        Self {
            len,
            ..Self::default()
        }
    }

    /// Move down, wrapping at the end.
    pub fn down(&mut self) {
        if self.len > 0 {
            self.cursor = (self.cursor + 1) % self.len;
        }
    }

    /// Move up, wrapping at the start.
    pub fn up(&mut self) {
        if self.len > 0 {
            self.cursor = (self.cursor + self.len - 1) % self.len;
        }
    }

    /// Confirm the entry under the cursor.
    pub fn choose(&mut self) -> Option<usize> {
        if self.cursor < self.len {
            self.chosen = Some(self.cursor);
        }
        self.chosen
    }

    /// Update the number of items, clamping the cursor.
    pub fn set_len(&mut self, len: usize) {
        self.len = len;
        if self.cursor >= len {
            self.cursor = len.saturating_sub(1);
        }
        if self.chosen.is_some_and(|c| c >= len) {
            self.chosen = None;
        }
    }

    /// Keep the cursor inside a viewport of `visible_height` rows.
    pub fn ensure_visible(&mut self, visible_height: usize) {
        if visible_height == 0 {
            return;
        }
        if self.cursor < self.offset {
            self.offset = self.cursor;
        } else if self.cursor >= self.offset + visible_height {
            self.offset = self.cursor - visible_height + 1;
        }
    }
}

impl<'a> Menu<'a> {
    pub fn new(items: &'a [MenuItem<'a>], state: &MenuState) -> Self {
        Self {
            items,
            cursor: state.cursor,
            offset: state.offset,
            chosen: state.chosen,
            style: Style::default(),
            cursor_style: Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD | Modifier::REVERSED),
            chosen_style: Style::default().fg(Color::Magenta),
            scrollbar_style: Style::default().fg(Color::White),
            scrollbar_track_style: Style::default().fg(Color::DarkGray),
        }
    }

    pub fn style(mut self, style: Style) -> Self {
        self.style = style;
        self
    }

    pub fn cursor_style(mut self, style: Style) -> Self {
        self.cursor_style = style;
        self
    }
}

fn put(buf: &mut Buffer, x: &mut u16, y: u16, right: u16, text: &str, style: Style) {
    for ch in text.chars() {
        if *x >= right {
            break;
        }
        if let Some(cell) = buf.cell_mut((*x, y)) {
            cell.set_char(ch);
            cell.set_style(style);
        }
        *x += 1;
    }
}

impl Widget for Menu<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if area.height == 0 || area.width == 0 {
            return;
        }

        let visible = area.height as usize;
        let has_scrollbar = self.items.len() > visible;
        let content_right = if has_scrollbar {
            area.right().saturating_sub(1)
        } else {
            area.right()
        };

        for row in 0..visible {
            let idx = self.offset + row;
            let Some(item) = self.items.get(idx) else {
                break;
            };
            let y = area.y + row as u16;
            let mut style = self.style;
            if self.chosen == Some(idx) {
                style = style.patch(self.chosen_style);
            }
            if idx == self.cursor {
                style = style.patch(self.cursor_style);
                for x in area.x..content_right {
                    if let Some(cell) = buf.cell_mut((x, y)) {
                        cell.set_char(' ');
                        cell.set_style(style);
                    }
                }
            }

            let marker = if self.chosen == Some(idx) { "● " } else { "  " };
            let mut x = area.x;
            let badge_len = self.badge_width(item);
            let title_right = content_right.saturating_sub(badge_len);
            put(buf, &mut x, y, title_right, marker, style);
            put(buf, &mut x, y, title_right, item.title, style);

            if badge_len > 0 {
                let mut bx = content_right.saturating_sub(badge_len) + 1;
                put(buf, &mut bx, y, content_right, item.badge, style.patch(item.badge_style));
            }
        }

        if has_scrollbar {
            let sb_x = area.right() - 1;
            let total = self.items.len();
            let thumb_size = ((visible * visible) / total).max(1);
            let max_offset = total - visible;
            let thumb_start = (self.offset.min(max_offset) * (visible - thumb_size)) / max_offset;

            for row in 0..visible {
                let y = area.y + row as u16;
                let in_thumb = row >= thumb_start && row < thumb_start + thumb_size;
                let (ch, style) = if in_thumb {
                    ('┃', self.scrollbar_style)
                } else {
                    ('│', self.scrollbar_track_style)
                };
                if let Some(cell) = buf.cell_mut((sb_x, y)) {
                    cell.set_char(ch);
                    cell.set_style(style);
                }
            }
        }
    }
}

impl Menu<'_> {
    /// Badge columns plus one leading space, or 0 for no badge.
    fn badge_width(&self, item: &MenuItem<'_>) -> u16 {
        if item.badge.is_empty() {
            0
        } else {
            item.badge.chars().count() as u16 + 1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(buf: &Buffer, y: u16) -> String {
        (0..buf.area.width)
            .map(|x| buf.cell((x, y)).map_or(" ", |c| c.symbol()).to_string())
            .collect()
    }

    #[test]
    fn navigation_wraps() {
        let mut state = MenuState::new(3);
        state.up();
        assert_eq!(state.cursor, 2);
        state.down();
        assert_eq!(state.cursor, 0);

        let mut empty = MenuState::new(0);
        empty.down();
        assert_eq!(empty.cursor, 0);
        assert_eq!(empty.choose(), None);
    }

    #[test]
    fn set_len_clamps_cursor_and_chosen() {
        let mut state = MenuState::new(5);
        state.cursor = 4;
        state.choose();
        state.set_len(2);
        assert_eq!(state.cursor, 1);
        assert_eq!(state.chosen, None);
    }

    #[test]
    fn ensure_visible_scrolls() {
        let mut state = MenuState::new(10);
        state.cursor = 7;
        state.ensure_visible(3);
        assert_eq!(state.offset, 5);
        state.cursor = 1;
        state.ensure_visible(3);
        assert_eq!(state.offset, 1);
    }

    #[test]
    fn renders_titles_badges_and_marker() {
        let items = [
            MenuItem::new("Do Re Mi").badge("Básico", Style::default()),
            MenuItem::new("Acordes"),
        ];
        let mut state = MenuState::new(items.len());
        state.choose();
        state.down();
        let area = Rect::new(0, 0, 24, 2);
        let mut buf = Buffer::empty(area);
        Menu::new(&items, &state).render(area, &mut buf);

        let first = row(&buf, 0);
        assert!(first.starts_with("● Do Re Mi"));
        assert!(first.trim_end().ends_with("Básico"));
        assert!(row(&buf, 1).starts_with("  Acordes"));
        assert!(buf
            .cell((0, 1))
            .unwrap()
            .modifier
            .contains(Modifier::REVERSED));
    }

    #[test]
    fn scrollbar_when_overflowing() {
        let items: Vec<_> = (0..5).map(|_| MenuItem::new("x")).collect();
        let state = MenuState::new(items.len());
        let area = Rect::new(0, 0, 10, 2);
        let mut buf = Buffer::empty(area);
        Menu::new(&items, &state).render(area, &mut buf);
        assert_eq!(buf.cell((9, 0)).unwrap().symbol(), "┃");
    }
}
