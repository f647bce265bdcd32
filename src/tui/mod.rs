use std::io;
use std::time::Duration;

use crossbeam_channel::{Receiver, TryRecvError};
use crossterm::event::{
    self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, KeyboardEnhancementFlags,
    PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags,
};
use crossterm::execute;
use crossterm::terminal::{EnterAlternateScreen, LeaveAlternateScreen};
use ratatui::Frame;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};

use view::{KeyCap, Keyboard, Menu, MenuItem, MenuState, StepStrip, centered_rect};

use crate::audio::{LazyAudio, NoteSink};
use crate::capture::{CaptureEvent, InputSource, KeyCapture};
use crate::catalog::{self, CatalogSource, Difficulty, Exercise};
use crate::keymap::{self, Hand, KEYS};
use crate::lesson::{Correctness, Lesson, Progress};
use crate::prefs::{LessonsPanel, PreferenceStore};
use crate::step::Step;

const PIANO_HEIGHT: u16 = 7;
const WHITE_WIDTH: u16 = 6;
const MENU_WIDTH: u16 = 40;

// ---------------------------------------------------------------------------
// Terminal key input
// ---------------------------------------------------------------------------

/// Key presses and releases from the terminal, via the Kitty keyboard protocol.
struct KittyKeyboard;

impl InputSource for KittyKeyboard {
    fn name(&self) -> &str {
        "terminal keyboard"
    }

    fn attach(&mut self) -> anyhow::Result<()> {
        execute!(
            io::stdout(),
            PushKeyboardEnhancementFlags(
                KeyboardEnhancementFlags::REPORT_EVENT_TYPES
                    | KeyboardEnhancementFlags::DISAMBIGUATE_ESCAPE_CODES
                    | KeyboardEnhancementFlags::REPORT_ALL_KEYS_AS_ESCAPE_CODES
            )
        )?;
        Ok(())
    }

    fn detach(&mut self) {
        if let Err(e) = execute!(io::stdout(), PopKeyboardEnhancementFlags) {
            log::warn!("Failed to restore keyboard mode: {e}");
        }
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

struct State<S: NoteSink, P: PreferenceStore> {
    capture: KeyCapture<S>,
    capture_rx: Receiver<CaptureEvent>,
    lesson: Lesson,
    exercises: Vec<Exercise>,
    /// Pending remote catalog; `None` once it has arrived or failed.
    catalog_rx: Option<Receiver<Vec<Exercise>>>,
    menu: MenuState,
    panel: LessonsPanel<P>,
    lessons_open: bool,
    show_help: bool,
    help_lines: Vec<String>,
    status: String,
    quit: bool,
}

impl<S: NoteSink, P: PreferenceStore> State<S, P> {
    fn new(
        mut capture: KeyCapture<S>,
        panel: LessonsPanel<P>,
        catalog_rx: Option<Receiver<Vec<Exercise>>>,
    ) -> Self {
        let capture_rx = capture.subscribe();
        let exercises = catalog::merge_exercises(catalog::builtin_exercises(), Vec::new());
        let lessons_open = panel.get();
        let status = if catalog_rx.is_some() {
            "Loading exercises…".to_string()
        } else {
            String::new()
        };
        Self {
            capture,
            capture_rx,
            lesson: Lesson::new(),
            menu: MenuState::new(exercises.len()),
            exercises,
            catalog_rx,
            panel,
            lessons_open,
            show_help: false,
            help_lines: build_help_lines(),
            status,
            quit: false,
        }
    }

    /// Rebuild the menu from built-ins plus `external`, keeping the cursor
    /// and the chosen mark on the same exercises.
    fn set_external(&mut self, external: Vec<Exercise>) {
        let cursor_id = self.exercises.get(self.menu.cursor).map(|e| e.id.clone());
        let chosen_id = self.lesson.exercise().map(|e| e.id.clone());

        self.exercises = catalog::merge_exercises(catalog::builtin_exercises(), external);
        let position = |id: Option<String>| {
            id.and_then(|id| self.exercises.iter().position(|e| e.id == id))
        };
        let cursor = position(cursor_id).unwrap_or(0);
        let chosen = position(chosen_id);

        self.menu.set_len(self.exercises.len());
        self.menu.cursor = cursor;
        self.menu.chosen = chosen;
    }

    fn drain_catalog(&mut self) {
        let Some(rx) = &self.catalog_rx else {
            return;
        };
        match rx.try_recv() {
            Ok(external) => {
                let fetched = external.len();
                self.set_external(external);
                self.status = if fetched == 0 {
                    "Built-in exercises only".to_string()
                } else {
                    format!("{} exercises", self.exercises.len())
                };
                self.catalog_rx = None;
            }
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => {
                self.status = "Built-in exercises only".to_string();
                self.catalog_rx = None;
            }
        }
    }

    /// Feed captured key events to the lesson. While the panel is closed
    /// they are discarded: free play.
    fn drain_capture(&mut self) {
        while let Ok(event) = self.capture_rx.try_recv() {
            if !self.lessons_open {
                continue;
            }
            let before = self.lesson.progress();
            self.lesson.handle(&event);
            let after = self.lesson.progress();
            if before != after && after == Progress::Complete {
                log::info!(
                    "Lesson: completed {:?}",
                    self.lesson.exercise().map_or("", |e| e.id.as_str())
                );
            }
        }
    }

    fn choose(&mut self) {
        let Some(i) = self.menu.choose() else {
            return;
        };
        if let Some(exercise) = self.exercises.get(i) {
            self.lesson.select(exercise.clone());
        }
    }

    fn toggle_lessons(&mut self) {
        self.lessons_open = !self.lessons_open;
        self.panel.set(self.lessons_open);
    }

    /// Keys that drive the UI rather than the piano. Returns true when consumed.
    fn handle_control(&mut self, key: KeyEvent) -> bool {
        let press = key.kind == KeyEventKind::Press;
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            // Releases always reach the piano so a key held before Ctrl
            // went down still comes back up.
            KeyCode::Char(_) if key.kind == KeyEventKind::Release => false,
            KeyCode::Char(c) if ctrl => {
                if press {
                    match c.to_ascii_lowercase() {
                        'c' | 'q' => self.quit = true,
                        'r' => self.lesson.reset(),
                        _ => {}
                    }
                }
                true
            }
            KeyCode::Up => {
                if key.kind != KeyEventKind::Release && self.lessons_open {
                    self.menu.up();
                }
                true
            }
            KeyCode::Down => {
                if key.kind != KeyEventKind::Release && self.lessons_open {
                    self.menu.down();
                }
                true
            }
            KeyCode::Enter => {
                if press && self.lessons_open {
                    self.choose();
                }
                true
            }
            KeyCode::F(1) => {
                if press {
                    self.show_help = !self.show_help;
                }
                true
            }
            KeyCode::F(2) => {
                if press {
                    self.toggle_lessons();
                }
                true
            }
            KeyCode::Esc => {
                if press {
                    self.show_help = false;
                }
                true
            }
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

pub fn run<P: PreferenceStore>(
    audio: LazyAudio,
    panel: LessonsPanel<P>,
    source: Option<Box<dyn CatalogSource>>,
) -> anyhow::Result<()> {
    let catalog_rx = source.map(catalog::spawn_fetch);

    // Probe keyboard enhancement support (must be done before entering raw mode)
    let kitty_supported = crossterm::terminal::supports_keyboard_enhancement().unwrap_or(false);
    if !kitty_supported {
        log::warn!("Terminal does not report key releases; piano input disabled");
    }

    let mut s = State::new(KeyCapture::new(audio), panel, catalog_rx);

    // Set up terminal.
    crossterm::terminal::enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // When stderr is redirected (e.g. `keylab 2> debug.log`), keep logging
    // enabled. When stderr is a terminal, suppress logging to avoid
    // corrupting the alternate screen.
    let prev_log_level = log::max_level();
    if std::io::IsTerminal::is_terminal(&std::io::stderr()) {
        log::set_max_level(log::LevelFilter::Off);
    }

    if kitty_supported {
        if let Err(e) = s.capture.attach(Box::new(KittyKeyboard)) {
            log::warn!("Key capture unavailable: {e:#}");
            s.status = "Piano input unavailable".to_string();
        }
    } else {
        s.status = "Piano disabled: terminal lacks key release events (try kitty, foot, WezTerm)"
            .to_string();
    }

    let result = event_loop(&mut terminal, &mut s);

    // Release held notes and pop the keyboard flags before leaving the screen.
    s.capture.teardown();
    s.capture.sink_mut().stop();

    log::set_max_level(prev_log_level);

    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    crossterm::terminal::disable_raw_mode()?;

    result.map_err(Into::into)
}

fn event_loop<S: NoteSink, P: PreferenceStore>(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    s: &mut State<S, P>,
) -> io::Result<()> {
    loop {
        s.drain_catalog();
        s.drain_capture();

        terminal.draw(|frame| draw(frame, s))?;
        if s.quit {
            break;
        }

        // Short timeout so a finished catalog fetch shows up without input.
        if !event::poll(Duration::from_millis(50))? {
            continue;
        }
        process_event(s, event::read()?);
        while event::poll(Duration::ZERO)? {
            process_event(s, event::read()?);
        }
    }
    Ok(())
}

/// Key events are applied in arrival order: capture output reaches the
/// lesson before the next event, so a control key never overtakes a note.
fn process_event<S: NoteSink, P: PreferenceStore>(s: &mut State<S, P>, ev: Event) {
    if let Event::Key(key) = ev {
        if !s.handle_control(key) {
            s.capture.handle_key_event(key);
            s.drain_capture();
        }
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn draw<S: NoteSink, P: PreferenceStore>(frame: &mut Frame, s: &mut State<S, P>) {
    let area = frame.area();
    let [header_area, body_area, piano_area, action_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Fill(1),
        Constraint::Length(PIANO_HEIGHT),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(frame, header_area, s);

    if s.lessons_open {
        let [menu_area, progress_area] =
            Layout::horizontal([Constraint::Length(MENU_WIDTH), Constraint::Fill(1)])
                .areas(body_area);
        render_menu(frame, menu_area, &s.exercises, &mut s.menu);
        render_progress(frame, progress_area, &s.lesson);
    } else {
        frame.render_widget(
            Paragraph::new("Free play. F2 shows the lessons.")
                .style(Style::default().fg(Color::DarkGray))
                .alignment(Alignment::Center),
            body_area,
        );
    }

    render_piano(frame, piano_area, s);
    render_action_bar(frame, action_area, s.lessons_open);

    if s.show_help {
        render_help(frame, area, &s.help_lines);
    }
}

fn render_header<S: NoteSink, P: PreferenceStore>(frame: &mut Frame, area: Rect, s: &State<S, P>) {
    let mut spans = vec![Span::styled(
        " keylab ",
        Style::default()
            .fg(Color::Black)
            .bg(Color::Magenta)
            .add_modifier(Modifier::BOLD),
    )];
    if !s.lessons_open {
        spans.push(Span::styled(" free play", Style::default().fg(Color::Cyan)));
    }
    let held = s.capture.active_keys();
    if !held.is_empty() {
        let notes: Vec<&str> = held
            .iter()
            .filter_map(keymap::note_for)
            .map(|k| k.note)
            .collect();
        spans.push(Span::styled(
            format!("  ♪ {}", notes.join(" ")),
            Style::default().fg(Color::Magenta),
        ));
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), area);

    if !s.status.is_empty() {
        frame.render_widget(
            Paragraph::new(Line::styled(
                format!("{} ", s.status),
                Style::default().fg(Color::DarkGray),
            ))
            .alignment(Alignment::Right),
            area,
        );
    }
}

fn difficulty_style(difficulty: Difficulty) -> Style {
    let color = match difficulty {
        Difficulty::Principiante => Color::Green,
        Difficulty::Basico => Color::Cyan,
        Difficulty::Intermedio => Color::Yellow,
        Difficulty::Avanzado => Color::Red,
    };
    Style::default().fg(color)
}

fn render_menu(frame: &mut Frame, area: Rect, exercises: &[Exercise], menu: &mut MenuState) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(" Exercises ");
    let inner = block.inner(area);
    frame.render_widget(block, area);

    menu.ensure_visible(inner.height as usize);
    let items: Vec<MenuItem> = exercises
        .iter()
        .map(|ex| {
            MenuItem::new(&ex.title).badge(ex.difficulty.label(), difficulty_style(ex.difficulty))
        })
        .collect();
    frame.render_widget(Menu::new(&items, menu), inner);
}

fn render_progress(frame: &mut Frame, area: Rect, lesson: &Lesson) {
    let title = lesson
        .exercise()
        .map_or(" Lesson ".to_string(), |ex| format!(" {} ", ex.title));
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(title);
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let Some(exercise) = lesson.exercise() else {
        frame.render_widget(
            Paragraph::new("Choose an exercise with ↑/↓ and press Enter.")
                .style(Style::default().fg(Color::DarkGray)),
            inner,
        );
        return;
    };

    let description = exercise.description.as_deref().unwrap_or_default();
    let labels: Vec<String> = lesson.steps().iter().map(Step::label).collect();
    let total = labels.len();
    let [desc_area, count_area, strip_area, _, hint_area, result_area] = Layout::vertical([
        Constraint::Length(if description.is_empty() { 0 } else { 2 }),
        Constraint::Length(1),
        Constraint::Length(StepStrip::height(&labels, inner.width)),
        Constraint::Length(1),
        Constraint::Length(1),
        Constraint::Length(1),
    ])
    .areas(inner);

    frame.render_widget(
        Paragraph::new(description)
            .style(Style::default().fg(Color::Gray))
            .wrap(Wrap { trim: true }),
        desc_area,
    );

    let count = match lesson.progress() {
        Progress::AwaitingStep(i) => format!("Step {} of {total}", i + 1),
        _ => format!("{total} of {total} steps"),
    };
    frame.render_widget(
        Paragraph::new(count).style(Style::default().fg(Color::DarkGray)),
        count_area,
    );
    frame.render_widget(StepStrip::new(&labels, lesson.index()), strip_area);

    let hint = match lesson.current_step() {
        Some(step) if step.is_chord() => Line::from(vec![
            Span::raw("Hold together: "),
            Span::styled(step.label(), Style::default().add_modifier(Modifier::BOLD)),
        ]),
        Some(step) => Line::from(vec![
            Span::raw("Play: "),
            Span::styled(step.label(), Style::default().add_modifier(Modifier::BOLD)),
        ]),
        None if total == 0 => Line::styled(
            "This exercise has no steps.",
            Style::default().fg(Color::DarkGray),
        ),
        None => Line::styled(
            "Complete! Ctrl+R to play it again.",
            Style::default()
                .fg(Color::Green)
                .add_modifier(Modifier::BOLD),
        ),
    };
    frame.render_widget(Paragraph::new(hint), hint_area);

    let result = match lesson.last() {
        Correctness::Unknown => Line::default(),
        Correctness::Correct => Line::styled("✓ Correct", Style::default().fg(Color::Green)),
        Correctness::Incorrect => {
            Line::styled("✗ Not that one, try again", Style::default().fg(Color::Red))
        }
    };
    frame.render_widget(Paragraph::new(result), result_area);
}

fn render_piano<S: NoteSink, P: PreferenceStore>(frame: &mut Frame, area: Rect, s: &State<S, P>) {
    let target: &[String] = if s.lessons_open {
        s.lesson.current_step().map(Step::keys).unwrap_or_default()
    } else {
        &[]
    };
    let held = s.capture.active_keys();
    let caps: Vec<KeyCap> = KEYS
        .iter()
        .map(|k| KeyCap {
            label: k.label,
            caption: k.solfege,
            black: k.is_black,
            held: held.contains(k.key),
            target: target.iter().any(|t| t == k.key),
            left_hand: keymap::hand_for(k.key) == Hand::Left,
        })
        .collect();

    let width = Keyboard::width(&caps, WHITE_WIDTH).min(area.width);
    let piano_area = Rect::new(
        area.x + area.width.saturating_sub(width) / 2,
        area.y,
        width,
        area.height,
    );
    frame.render_widget(Keyboard::new(&caps).white_width(WHITE_WIDTH), piano_area);
}

fn actions(lessons_open: bool) -> Vec<(&'static str, &'static str)> {
    let mut actions = Vec::new();
    if lessons_open {
        actions.push(("↑↓", "Choose"));
        actions.push(("Enter", "Start"));
        actions.push(("^R", "Restart"));
        actions.push(("F2", "Hide lessons"));
    } else {
        actions.push(("F2", "Show lessons"));
    }
    actions.push(("F1", "Help"));
    actions.push(("^Q", "Quit"));
    actions
}

fn render_action_bar(frame: &mut Frame, area: Rect, lessons_open: bool) {
    if area.height == 0 || area.width == 0 {
        return;
    }
    let key_style = Style::default()
        .fg(Color::Black)
        .bg(Color::White)
        .add_modifier(Modifier::BOLD);
    let label_style = Style::default().fg(Color::White);

    let y = area.y;
    let mut x = area.x;
    for (key, desc) in actions(lessons_open) {
        if x > area.x {
            x += 1;
        }
        for (text, style) in [(format!(" {key} "), key_style), (format!(" {desc}"), label_style)] {
            for ch in text.chars() {
                if x >= area.right() {
                    return;
                }
                if let Some(c) = frame.buffer_mut().cell_mut((x, y)) {
                    c.set_char(ch);
                    c.set_style(style);
                }
                x += 1;
            }
        }
    }
}

fn render_help(frame: &mut Frame, area: Rect, lines: &[String]) {
    let popup = centered_rect(52, lines.len() as u16 + 2, area);
    frame.render_widget(Clear, popup);
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(" Help ");
    let text: Vec<Line> = lines
        .iter()
        .map(|l| {
            if l.is_empty() || l.starts_with("  ") {
                Line::raw(l.as_str())
            } else {
                Line::styled(
                    l.as_str(),
                    Style::default()
                        .fg(Color::Yellow)
                        .add_modifier(Modifier::BOLD),
                )
            }
        })
        .collect();
    frame.render_widget(Paragraph::new(text).block(block), popup);
}

fn build_help_lines() -> Vec<String> {
    vec![
        "Piano (one octave, C4 to C5):".into(),
        "  A S D F G H J K   White keys, Do to Do".into(),
        "  Q W E R T         Black keys".into(),
        "  Hold several keys at once to play a chord.".into(),
        "".into(),
        "Lessons:".into(),
        "  Up/Down    Move through exercises".into(),
        "  Enter      Start the highlighted exercise".into(),
        "  Ctrl+R     Restart the current exercise".into(),
        "  F2         Show/hide lessons (free play)".into(),
        "".into(),
        "General:".into(),
        "  F1         Toggle this help".into(),
        "  Esc        Close help".into(),
        "  Ctrl+Q     Quit".into(),
    ]
}
