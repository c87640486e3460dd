//! Application state and TUI event loop for the bill tracker.
//!
//! [`App`] owns the theme and the last projection snapshot received from the
//! orchestrator. The selected view mode is pushed back to the orchestrator
//! through a `watch` channel, which answers with a new snapshot.

use std::io;
use std::time::Duration;

use bill_core::contracts::ViewMode;
use bill_runtime::orchestrator::ProjectionSnapshot;
use chrono_tz::Tz;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Layout},
    text::{Line, Span},
    widgets::{Paragraph, TableState},
    Frame, Terminal,
};
use tokio::sync::{mpsc, watch};

use crate::comparison_view;
use crate::table_view::{self, BillRow};
use crate::themes::Theme;

const APP_TITLE: &str = "💡 電気料金比較表";

/// What a key press asks the event loop to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyAction {
    Quit,
    /// Switch the projection to this mode.
    ChangeMode(ViewMode),
    /// Nothing beyond local state changes.
    None,
}

// ── App ───────────────────────────────────────────────────────────────────────

/// Root application state for the tracker TUI.
pub struct App {
    pub theme: Theme,
    /// Timezone used for record dates.
    pub timezone: Tz,
    /// Greeting target, e.g. `山田` or `管理者 山田`.
    pub user_label: String,
    /// Mode currently requested; the snapshot catches up asynchronously.
    pub mode: ViewMode,
    pub should_quit: bool,
    /// Most recent snapshot, `None` until the first one arrives.
    pub last: Option<ProjectionSnapshot>,
    rows: Vec<BillRow>,
    table_state: TableState,
}

impl App {
    pub fn new(theme_name: &str, timezone: Tz, user_label: String, mode: ViewMode) -> Self {
        Self {
            theme: Theme::from_name(theme_name),
            timezone,
            user_label,
            mode,
            should_quit: false,
            last: None,
            rows: Vec::new(),
            table_state: TableState::default(),
        }
    }

    // ── Public event loop ─────────────────────────────────────────────────────

    /// Run the bill view, receiving snapshots from `rx`.
    ///
    /// Keyboard events are polled with a 250 ms timeout while snapshots are
    /// drained with `try_recv`. `v` cycles the view mode through `mode_tx`;
    /// the loop exits on `q`, `Q`, `Ctrl+C`, or when the orchestrator stops.
    pub async fn run(
        mut self,
        mut rx: mpsc::Receiver<ProjectionSnapshot>,
        mode_tx: watch::Sender<ViewMode>,
    ) -> io::Result<()> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        let tick_rate = Duration::from_millis(250);

        let result: io::Result<()> = loop {
            if let Err(e) = terminal.draw(|frame| self.render(frame)) {
                break Err(e);
            }

            match event::poll(tick_rate) {
                Ok(true) => match event::read() {
                    Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => {
                        match self.handle_key(key.code, key.modifiers) {
                            KeyAction::Quit => break Ok(()),
                            KeyAction::ChangeMode(mode) => {
                                tracing::debug!(mode = %mode, "view mode changed");
                                mode_tx.send_replace(mode);
                            }
                            KeyAction::None => {}
                        }
                    }
                    Ok(_) => {}
                    Err(e) => break Err(e),
                },
                Ok(false) => {}
                Err(e) => break Err(e),
            }

            // Drain any pending snapshots (non-blocking).
            loop {
                match rx.try_recv() {
                    Ok(snapshot) => self.update_from_snapshot(snapshot),
                    Err(mpsc::error::TryRecvError::Empty) => break,
                    Err(mpsc::error::TryRecvError::Disconnected) => {
                        self.should_quit = true;
                        break;
                    }
                }
            }

            if self.should_quit {
                break Ok(());
            }
        };

        // Restore terminal state unconditionally.
        disable_raw_mode()?;
        execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
        terminal.show_cursor()?;

        result
    }

    // ── State updates ─────────────────────────────────────────────────────────

    /// Map a key press to an action, updating the selection in place.
    pub fn handle_key(&mut self, code: KeyCode, modifiers: KeyModifiers) -> KeyAction {
        match code {
            KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => KeyAction::Quit,
            KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => KeyAction::Quit,
            KeyCode::Char('v') | KeyCode::Tab => {
                self.mode = self.mode.next();
                KeyAction::ChangeMode(self.mode.clone())
            }
            KeyCode::Down | KeyCode::Char('j') => {
                self.move_selection(1);
                KeyAction::None
            }
            KeyCode::Up | KeyCode::Char('k') => {
                self.move_selection(-1);
                KeyAction::None
            }
            _ => KeyAction::None,
        }
    }

    /// Store a snapshot and keep the selection within the new rows.
    pub fn update_from_snapshot(&mut self, snapshot: ProjectionSnapshot) {
        self.rows = table_view::build_rows(&snapshot.records, self.timezone);
        let selected = match (self.table_state.selected(), self.rows.len()) {
            (_, 0) => None,
            (Some(i), n) => Some(i.min(n - 1)),
            (None, _) => Some(0),
        };
        self.table_state.select(selected);
        self.last = Some(snapshot);
    }

    /// Id of the selected row.
    pub fn selected_id(&self) -> Option<&str> {
        self.table_state
            .selected()
            .and_then(|i| self.rows.get(i))
            .map(|r| r.id.as_str())
    }

    fn move_selection(&mut self, delta: isize) {
        if self.rows.is_empty() {
            return;
        }
        let current = self.table_state.selected().unwrap_or(0) as isize;
        let last = self.rows.len() as isize - 1;
        self.table_state
            .select(Some((current + delta).clamp(0, last) as usize));
    }

    // ── Rendering ─────────────────────────────────────────────────────────────

    /// Render the current state into `frame`.
    pub fn render(&mut self, frame: &mut Frame) {
        let [header_area, comparison_area, table_area, footer_area] = Layout::vertical([
            Constraint::Length(2),
            Constraint::Length(6),
            Constraint::Min(5),
            Constraint::Length(1),
        ])
        .areas(frame.area());

        let view_label = self
            .last
            .as_ref()
            .map(|s| s.mode.label())
            .unwrap_or_else(|| self.mode.label());

        let header = vec![
            Line::from(vec![
                Span::styled(APP_TITLE, self.theme.header),
                Span::styled("  |  ", self.theme.separator),
                Span::styled(view_label.clone(), self.theme.value),
            ]),
            Line::from(Span::styled(
                format!("ようこそ, {} さん", self.user_label),
                self.theme.label,
            )),
        ];
        frame.render_widget(Paragraph::new(header), header_area);

        let comparison = self.last.as_ref().and_then(|s| s.comparison.as_ref());
        comparison_view::render_comparison(
            frame,
            comparison_area,
            comparison,
            &view_label,
            &self.theme,
        );

        if self.rows.is_empty() {
            table_view::render_no_data(frame, table_area, &view_label, &self.theme);
        } else {
            let title = format!("{} ({}件)", view_label, self.rows.len());
            table_view::render_table_view(
                frame,
                table_area,
                &title,
                &self.rows,
                &mut self.table_state,
                &self.theme,
            );
        }

        let selected = match self.selected_id() {
            Some(id) if bill_core::models::is_composite_id(id) => {
                format!("選択: {id} (合算行は元の記録を削除してください)")
            }
            Some(id) => format!("選択: {id}"),
            None => String::new(),
        };
        let footer = Line::from(vec![
            Span::styled("v: 表示切替  ↑↓: 選択  q: 終了", self.theme.dim),
            Span::styled("   ", self.theme.dim),
            Span::styled(selected, self.theme.info),
        ]);
        frame.render_widget(Paragraph::new(footer), footer_area);
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
