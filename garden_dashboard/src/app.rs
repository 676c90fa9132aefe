use std::sync::mpsc::Receiver;
use std::time::{Duration, Instant};

use color_eyre::Result;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use garden_runtime::{
    Command, DispatchError, FetchTarget, GardenService, RefreshCause, SyncLoop, SyncOutcome,
};
use ratatui::backend::CrosstermBackend;
use ratatui::prelude::*;
use tracing::{info, trace, warn};

use crate::config::DashboardConfig;
use crate::ui::{draw_ui, DashboardView, UiState};

pub struct DashboardApp<S: GardenService> {
    terminal: Terminal<CrosstermBackend<std::io::Stdout>>,
    ui_state: UiState,
    sync: SyncLoop<S>,
    log_receiver: Receiver<String>,
    redraw_interval: Duration,
}

impl<S: GardenService> DashboardApp<S> {
    pub fn new(
        sync: SyncLoop<S>,
        log_receiver: Receiver<String>,
        config: &DashboardConfig,
    ) -> Result<Self> {
        let stdout = std::io::stdout();
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        crossterm::terminal::enable_raw_mode()?;
        terminal.clear()?;
        terminal.hide_cursor()?;
        Ok(Self {
            terminal,
            ui_state: UiState::new(&config.ui),
            sync,
            log_receiver,
            redraw_interval: config.redraw_interval(),
        })
    }

    pub fn run(mut self) -> Result<()> {
        let mut last_draw: Option<Instant> = None;

        loop {
            for outcome in self.sync.drain() {
                self.apply_outcome(outcome);
            }

            while let Ok(line) = self.log_receiver.try_recv() {
                self.ui_state.push_log(line);
            }

            if last_draw.map_or(true, |at| at.elapsed() >= self.redraw_interval) {
                let view = DashboardView::from_cache(self.sync.cache());
                let ui_state = &mut self.ui_state;
                self.terminal.draw(|frame| draw_ui(frame, ui_state, &view))?;
                last_draw = Some(Instant::now());
            }

            if event::poll(Duration::from_millis(50))? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Release {
                        continue;
                    }
                    if !self.handle_key(key.code) {
                        break;
                    }
                }
            }
        }

        self.sync.shutdown();
        self.terminal.show_cursor()?;
        crossterm::terminal::disable_raw_mode()?;
        Ok(())
    }

    /// Returns `false` when the dashboard should close.
    fn handle_key(&mut self, code: KeyCode) -> bool {
        match code {
            KeyCode::Char('q') | KeyCode::Esc => return false,
            KeyCode::Char('s') => self.send(Command::Start),
            KeyCode::Char('p') => self.send(Command::Pause),
            KeyCode::Char('r') => self.send(Command::Reset),
            KeyCode::Char('n') | KeyCode::Char('.') => self.send(Command::Step),
            KeyCode::Char('=') | KeyCode::Char('+') => self.nudge_speed(1),
            KeyCode::Char('-') | KeyCode::Char('_') => self.nudge_speed(-1),
            KeyCode::Char('f') => {
                for target in [FetchTarget::Parcels, FetchTarget::Status] {
                    if let Err(err) = self.sync.refresh(target) {
                        warn!(target: "garden::ui", error = %err, "ui.refresh_failed");
                    }
                }
            }
            KeyCode::Up => self.move_selection(-1, 0),
            KeyCode::Down => self.move_selection(1, 0),
            KeyCode::Left => self.move_selection(0, -1),
            KeyCode::Right => self.move_selection(0, 1),
            _ => {}
        }
        true
    }

    fn send(&mut self, command: Command) {
        match self.sync.dispatch(command) {
            Ok(()) => {
                self.ui_state.command_error = None;
                if let Command::SetSpeed(speed) = command {
                    self.ui_state.requested_speed = Some(speed);
                }
            }
            Err(DispatchError::Rejected(reason)) => {
                self.ui_state.push_log(format!("{command} ignored: {reason}"));
            }
            Err(DispatchError::Closed) => {
                warn!(target: "garden::ui", command = %command, "ui.dispatch_after_shutdown");
            }
        }
    }

    fn nudge_speed(&mut self, steps: i32) {
        let current = self.ui_state.displayed_speed(self.sync.status());
        let next = current.step_by(steps);
        if next == current {
            trace!(target: "garden::ui", speed = next.get(), "ui.speed_at_limit");
            return;
        }
        self.send(Command::SetSpeed(next));
    }

    fn move_selection(&mut self, d_row: isize, d_col: isize) {
        if let Some(Ok(grid)) = self.sync.cache().grid() {
            self.ui_state
                .move_selection(d_row, d_col, grid.rows(), grid.columns());
        }
    }

    fn apply_outcome(&mut self, outcome: SyncOutcome) {
        match outcome {
            SyncOutcome::ParcelsUpdated { cause, parcels } => {
                if let Some(Ok(grid)) = self.sync.cache().grid() {
                    self.ui_state.clamp_selection(grid.rows(), grid.columns());
                }
                if cause == RefreshCause::Manual {
                    info!(target: "garden::ui", parcels, "ui.parcels_refreshed");
                }
            }
            SyncOutcome::StatusUpdated { .. } => {
                self.ui_state.settle_requested_speed(self.sync.status());
            }
            SyncOutcome::CommandFailed { command, error } => {
                self.ui_state.command_error = Some(format!("{command} failed: {error}"));
                if matches!(command, Command::SetSpeed(_)) {
                    self.ui_state.requested_speed = None;
                }
            }
            SyncOutcome::CommandSucceeded(_)
            | SyncOutcome::FetchFailed { .. }
            | SyncOutcome::StaleDiscarded { .. } => {}
        }
    }
}
