use std::collections::VecDeque;

use garden_runtime::{
    Command, FetchTarget, GridAddress, GridCell, GridError, HumidityBand, Parcel, ParcelGrid,
    SimulationState, SpeedMultiplier, SyncCache,
};
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Margin};
use ratatui::prelude::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use ratatui::Frame;
use thiserror::Error;
use tracing::error;

use crate::config::UiSettings;

const DETAILS_WIDTH: u16 = 34;

/// Failure while laying out the parcel grid. Drawn as a placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error(transparent)]
    Projection(#[from] GridError),
    #[error("viewport {width}x{height} is smaller than one {cell_width}x{cell_height} cell")]
    ViewportTooSmall {
        width: u16,
        height: u16,
        cell_width: u16,
        cell_height: u16,
    },
}

/// Borrowed snapshot of everything a frame needs from the sync cache.
#[derive(Debug, Clone, Copy, Default)]
pub struct DashboardView<'a> {
    pub status: Option<&'a SimulationState>,
    pub grid: Option<Result<&'a ParcelGrid, &'a GridError>>,
    pub rejected_records: usize,
    pub status_error: Option<&'a str>,
    pub parcels_error: Option<&'a str>,
}

impl<'a> DashboardView<'a> {
    pub fn from_cache(cache: &'a SyncCache) -> Self {
        Self {
            status: cache.status(),
            grid: cache.grid(),
            rejected_records: cache.rejected_records(),
            status_error: cache.last_error(FetchTarget::Status),
            parcels_error: cache.last_error(FetchTarget::Parcels),
        }
    }

    fn ready_grid(&self) -> Option<&'a ParcelGrid> {
        match self.grid {
            Some(Ok(grid)) => Some(grid),
            _ => None,
        }
    }
}

pub struct UiState {
    pub logs: VecDeque<String>,
    pub max_logs: usize,
    pub selected: GridAddress,
    pub cell_width: u16,
    pub cell_height: u16,
    /// Speed requested with +/- that the service has not confirmed yet.
    pub requested_speed: Option<SpeedMultiplier>,
    pub command_error: Option<String>,
    last_render_error: Option<RenderError>,
}

impl Default for UiState {
    fn default() -> Self {
        Self::new(&UiSettings::default())
    }
}

impl UiState {
    pub fn new(settings: &UiSettings) -> Self {
        Self {
            logs: VecDeque::new(),
            max_logs: settings.max_logs.max(1),
            selected: GridAddress::new(0, 0),
            cell_width: settings.cell_width.max(8),
            cell_height: settings.cell_height.max(3),
            requested_speed: None,
            command_error: None,
            last_render_error: None,
        }
    }

    pub fn push_log<S: Into<String>>(&mut self, line: S) {
        let mut text: String = line.into();
        while text.ends_with('\n') || text.ends_with('\r') {
            text.pop();
        }
        if text.is_empty() {
            return;
        }
        self.logs.push_front(text);
        while self.logs.len() > self.max_logs {
            self.logs.pop_back();
        }
    }

    /// Move the selection, staying inside a `rows` x `columns` grid.
    pub fn move_selection(&mut self, d_row: isize, d_col: isize, rows: usize, columns: usize) {
        let row = self.selected.row.saturating_add_signed(d_row);
        let col = self.selected.col.saturating_add_signed(d_col);
        self.selected = GridAddress::new(
            row.min(rows.saturating_sub(1)),
            col.min(columns.saturating_sub(1)),
        );
    }

    /// Keep the selection valid after a new snapshot changed the grid size.
    pub fn clamp_selection(&mut self, rows: usize, columns: usize) {
        self.move_selection(0, 0, rows, columns);
    }

    /// Speed the slider should show: a pending request, else the service's.
    pub fn displayed_speed(&self, status: Option<&SimulationState>) -> SpeedMultiplier {
        self.requested_speed.unwrap_or_else(|| {
            status
                .map(|state| SpeedMultiplier::clamped(state.speed_multiplier))
                .unwrap_or_default()
        })
    }

    /// Drop the pending speed once the service reports it.
    pub fn settle_requested_speed(&mut self, status: Option<&SimulationState>) {
        let (Some(requested), Some(state)) = (self.requested_speed, status) else {
            return;
        };
        let reported = SpeedMultiplier::clamped(state.speed_multiplier).get();
        if (reported - requested.get()).abs() < 1e-6 {
            self.requested_speed = None;
        }
    }

    fn note_render_error(&mut self, err: &RenderError) {
        if self.last_render_error.as_ref() != Some(err) {
            error!(target: "garden::ui", error = %err, "ui.grid_render_failed");
            self.last_render_error = Some(err.clone());
        }
    }
}

pub fn draw_ui(frame: &mut Frame, state: &mut UiState, view: &DashboardView<'_>) {
    let log_height = u16::try_from(state.max_logs).unwrap_or(u16::MAX).saturating_add(2);
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(5),
            Constraint::Min(5),
            Constraint::Length(log_height),
        ])
        .split(frame.size());

    draw_header(frame, chunks[0], view);
    draw_controls(frame, chunks[1], state, view);

    let middle = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(10), Constraint::Length(DETAILS_WIDTH)])
        .split(chunks[2]);

    let block = Block::default().borders(Borders::ALL).title("Garden Grid");
    let grid_area = block.inner(middle[0]);
    frame.render_widget(block, middle[0]);
    match view.grid {
        None => draw_loading(frame, grid_area),
        Some(projection) => {
            if let Err(err) = draw_grid(frame, grid_area, state, projection, view.status) {
                state.note_render_error(&err);
                draw_render_error(frame, grid_area, &err);
            }
        }
    }

    draw_details(frame, middle[1], state, view);
    draw_logs(frame, chunks[3], state);
}

fn draw_header(frame: &mut Frame, area: Rect, view: &DashboardView<'_>) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title("Garden Simulation Dashboard");

    let mut spans = Vec::new();
    match view.status_error {
        Some(_) => spans.push(Span::styled("Disconnected", Style::default().fg(Color::Red))),
        None if view.status.is_some() => {
            spans.push(Span::styled("Connected", Style::default().fg(Color::Green)))
        }
        None => spans.push(Span::styled("Connecting", Style::default().fg(Color::Yellow))),
    }
    if let Some(grid) = view.ready_grid() {
        spans.push(Span::raw(format!(
            " | grid {}x{} | {} parcels",
            grid.columns(),
            grid.rows(),
            grid.parcel_count()
        )));
        let skipped = grid.excluded_count() + view.rejected_records;
        if skipped > 0 {
            spans.push(Span::styled(
                format!(" | {skipped} malformed"),
                Style::default().fg(Color::Yellow),
            ));
        }
    }
    spans.push(Span::raw(" | q to exit"));

    let text = Paragraph::new(Line::from(spans)).wrap(Wrap { trim: true });
    frame.render_widget(block, area);
    frame.render_widget(
        text,
        area.inner(&Margin {
            vertical: 1,
            horizontal: 1,
        }),
    );
}

fn command_key(command: Command) -> &'static str {
    match command {
        Command::Start => "s",
        Command::Pause => "p",
        Command::Reset => "r",
        Command::Step => "n",
        Command::SetSpeed(_) => "+/-",
    }
}

fn draw_controls(frame: &mut Frame, area: Rect, state: &UiState, view: &DashboardView<'_>) {
    let mut buttons = Vec::new();
    for command in Command::BUTTONS {
        let style = if command.is_enabled(view.status) {
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        buttons.push(Span::styled(
            format!("[{}] {}", command_key(command), command.label()),
            style,
        ));
        buttons.push(Span::raw("  "));
    }
    buttons.push(Span::styled("[f] Refresh", Style::default().fg(Color::Yellow)));

    let speed = state.displayed_speed(view.status);
    let status_line = match view.status {
        Some(status) => Line::from(vec![
            Span::raw("Step "),
            Span::styled(
                format!("{:>6}", status.current_step),
                Style::default().fg(Color::Cyan),
            ),
            Span::raw(" | "),
            Span::styled(
                status.status_label(),
                Style::default().fg(if status.is_running {
                    Color::Green
                } else {
                    Color::Yellow
                }),
            ),
            Span::raw(format!(" | speed {speed} (+/-)")),
        ]),
        None => Line::from(Span::styled(
            "Waiting for simulation status...",
            Style::default().fg(Color::DarkGray),
        )),
    };

    let mut lines = vec![Line::from(buttons), status_line];
    if let Some(message) = &state.command_error {
        lines.push(Line::from(Span::styled(
            message.clone(),
            Style::default().fg(Color::Red),
        )));
    }

    let block = Block::default().borders(Borders::ALL).title("Controls");
    let paragraph = Paragraph::new(lines).wrap(Wrap { trim: false });
    frame.render_widget(block, area);
    frame.render_widget(
        paragraph,
        area.inner(&Margin {
            vertical: 1,
            horizontal: 1,
        }),
    );
}

fn draw_loading(frame: &mut Frame, area: Rect) {
    let paragraph = Paragraph::new("Loading garden parcels...")
        .alignment(Alignment::Center)
        .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(paragraph, area);
}

fn draw_render_error(frame: &mut Frame, area: Rect, err: &RenderError) {
    let lines = vec![
        Line::from(Span::styled(
            "Error rendering grid",
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        )),
        Line::from(Span::styled(err.to_string(), Style::default().fg(Color::Red))),
    ];
    let paragraph = Paragraph::new(lines)
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true });
    frame.render_widget(paragraph, area);
}

fn humidity_color(band: Option<HumidityBand>) -> Color {
    match band {
        Some(HumidityBand::Parched) => Color::LightRed,
        Some(HumidityBand::Dry) => Color::Yellow,
        Some(HumidityBand::Moist) => Color::Green,
        Some(HumidityBand::Saturated) => Color::Blue,
        None => Color::Gray,
    }
}

/// First index of the page holding `selected` when `visible` items fit.
fn page_start(selected: usize, visible: usize) -> usize {
    (selected / visible) * visible
}

fn draw_grid(
    frame: &mut Frame,
    area: Rect,
    state: &UiState,
    projection: Result<&ParcelGrid, &GridError>,
    status: Option<&SimulationState>,
) -> Result<(), RenderError> {
    let grid = projection.map_err(|err| RenderError::Projection(err.clone()))?;
    let visible_cols = usize::from(area.width / state.cell_width);
    let visible_rows = usize::from(area.height / state.cell_height);
    if visible_cols == 0 || visible_rows == 0 {
        return Err(RenderError::ViewportTooSmall {
            width: area.width,
            height: area.height,
            cell_width: state.cell_width,
            cell_height: state.cell_height,
        });
    }

    let first_row = page_start(state.selected.row, visible_rows);
    let first_col = page_start(state.selected.col, visible_cols);
    let step = status.map(|s| s.current_step);

    for row in first_row..grid.rows().min(first_row + visible_rows) {
        for col in first_col..grid.columns().min(first_col + visible_cols) {
            let address = GridAddress::new(row, col);
            let Some(cell) = grid.cell(address) else {
                continue;
            };
            let rect = Rect::new(
                area.x + (col - first_col) as u16 * state.cell_width,
                area.y + (row - first_row) as u16 * state.cell_height,
                state.cell_width,
                state.cell_height,
            );
            let label = grid
                .to_world(address)
                .map(|coord| format!("({coord})"))
                .unwrap_or_default();
            draw_cell(frame, rect, cell, &label, address == state.selected, step);
        }
    }
    Ok(())
}

fn draw_cell(
    frame: &mut Frame,
    rect: Rect,
    cell: GridCell<'_>,
    label: &str,
    selected: bool,
    step: Option<u64>,
) {
    let border_style = if selected {
        Style::default().fg(Color::White).add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(Color::DarkGray)
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(border_style)
        .title(label.to_string());
    let inner = block.inner(rect);
    frame.render_widget(block, rect);

    let lines = match cell.parcel() {
        Some(parcel) => parcel_lines(parcel, step),
        None => vec![Line::from(Span::styled(
            "empty",
            Style::default().fg(Color::DarkGray),
        ))],
    };
    frame.render_widget(Paragraph::new(lines), inner);
}

fn parcel_lines(parcel: &Parcel, step: Option<u64>) -> Vec<Line<'static>> {
    let color = humidity_color(parcel.humidity_band());
    let humidity = parcel
        .humidity_percent()
        .map(|pct| format!("{pct}%"))
        .unwrap_or_else(|| "--".to_string());
    let mut second = vec![Span::raw(format!(
        "P{} I{}",
        parcel.plant_count(),
        parcel.insect_count()
    ))];
    if let Some(device) = &parcel.treatment_device {
        let active = step
            .map(|step| device.programs.iter().any(|p| p.is_active_at(step)))
            .unwrap_or(false);
        let style = if active {
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::Cyan)
        };
        second.push(Span::styled(" T", style));
    }
    vec![
        Line::from(Span::styled(format!("H {humidity}"), Style::default().fg(color))),
        Line::from(second),
    ]
}

fn draw_details(frame: &mut Frame, area: Rect, state: &UiState, view: &DashboardView<'_>) {
    let block = Block::default().borders(Borders::ALL).title("Parcel");
    let lines = match view.ready_grid() {
        Some(grid) => details_lines(grid, state.selected, view.status),
        None => vec![Line::from(Span::styled(
            "No grid",
            Style::default().fg(Color::DarkGray),
        ))],
    };
    let paragraph = Paragraph::new(lines).wrap(Wrap { trim: false });
    frame.render_widget(block, area);
    frame.render_widget(
        paragraph,
        area.inner(&Margin {
            vertical: 1,
            horizontal: 1,
        }),
    );
}

fn details_lines(
    grid: &ParcelGrid,
    address: GridAddress,
    status: Option<&SimulationState>,
) -> Vec<Line<'static>> {
    let coord = grid
        .to_world(address)
        .map(|coord| coord.to_string())
        .unwrap_or_else(|| "?".to_string());
    let Some(parcel) = grid.cell(address).and_then(|cell| cell.parcel()) else {
        return vec![
            Line::from(format!("Cell ({coord})")),
            Line::from(Span::styled("empty", Style::default().fg(Color::DarkGray))),
        ];
    };

    let mut lines = vec![
        Line::from(format!("Parcel #{} at ({coord})", parcel.id)),
        Line::from(vec![
            Span::raw("Humidity "),
            Span::styled(
                match (parcel.humidity_percent(), parcel.humidity_band()) {
                    (Some(pct), Some(band)) => format!("{pct}% ({})", band.label()),
                    _ => "unknown".to_string(),
                },
                Style::default().fg(humidity_color(parcel.humidity_band())),
            ),
        ]),
        Line::from(format!(
            "Plants {} ({} mature)",
            parcel.plant_count(),
            parcel.plants.iter().filter(|plant| plant.is_mature()).count()
        )),
    ];
    for plant in parcel.plants.iter().take(3) {
        lines.push(Line::from(format!(
            "  {} age {}/{}",
            plant.species, plant.current_age, plant.maturity_age
        )));
    }
    lines.push(Line::from(format!("Insects {}", parcel.insect_count())));
    for insect in parcel.insects.iter().take(3) {
        lines.push(Line::from(format!(
            "  {} health {}",
            insect.species, insect.health_index
        )));
    }
    if let Some(device) = &parcel.treatment_device {
        lines.push(Line::from(format!("Device radius {}", device.radius)));
        for program in &device.programs {
            let active = status
                .map(|s| program.is_active_at(s.current_step))
                .unwrap_or(false);
            let kind = program.kind.map(|kind| kind.label()).unwrap_or("unknown");
            let text = format!(
                "  {kind} @{} for {}",
                program.start_time, program.duration
            );
            lines.push(if active {
                Line::from(Span::styled(text, Style::default().fg(Color::Cyan)))
            } else {
                Line::from(text)
            });
        }
    }
    lines
}

fn draw_logs(frame: &mut Frame, area: Rect, state: &UiState) {
    let block = Block::default().borders(Borders::ALL).title("Logs");
    let lines: Vec<Line> = state
        .logs
        .iter()
        .map(|entry| Line::from(Span::raw(entry)))
        .collect();
    let paragraph = Paragraph::new(lines).wrap(Wrap { trim: false });
    frame.render_widget(block, area);
    frame.render_widget(
        paragraph,
        area.inner(&Margin {
            vertical: 1,
            horizontal: 1,
        }),
    );
}
