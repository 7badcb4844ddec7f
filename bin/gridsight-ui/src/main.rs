//! ---
//! ems_section: "12-dashboard-ui"
//! ems_subsection: "binary"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Terminal dashboard binary for Gridsight."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;
use crossterm::cursor::{Hide, Show};
use crossterm::event::{self, Event, KeyCode, KeyEvent};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use gridsight_advisory::{Advisory, AdvisoryClient, AdvisoryStatus};
use gridsight_calc::{
    derive_metrics, DataSource, DemoSampler, DerivedMetrics, Reading, UsageConstants,
};
use gridsight_common::config::AppConfig;
use gridsight_common::logging::init_tracing;
use gridsight_telemetry::{Feed, TelemetryClient};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::symbols;
use ratatui::text::{Line, Span};
use ratatui::widgets::{Axis, Block, Borders, Chart, Dataset, Gauge, GraphType, Paragraph, Wrap};
use ratatui::{Frame, Terminal};
use tokio::sync::mpsc;
use tracing::{debug, warn};

const ENV_API_KEY: &str = "GEMINI_API_KEY";
/// Demo values are redrawn on this cadence, independent of telemetry.
const DEMO_TICK: Duration = Duration::from_secs(2);
/// Number of recent samples plotted on the power chart.
const CHART_WINDOW: usize = 24;
const INITIAL_TEXT: &str = "Initializing governance analysis...";

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Energy governance dashboard: telemetry, projections and AI advisories"
)]
struct Cli {
    /// Path to configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Start in demo mode (randomised values instead of live telemetry)
    #[arg(long)]
    demo: bool,
}

/// Result of one full refresh cycle, delivered from a background task.
#[derive(Debug)]
struct RefreshOutcome {
    generation: u64,
    latest: Option<Feed>,
    history: Vec<Feed>,
    advisory: Advisory,
}

/// Handles shared by every spawned refresh cycle.
#[derive(Clone)]
struct RefreshContext {
    telemetry: TelemetryClient,
    advisory: Arc<AdvisoryClient>,
    tx: mpsc::UnboundedSender<RefreshOutcome>,
}

struct App {
    constants: UsageConstants,
    history_results: u32,
    latest: Option<Feed>,
    history: Vec<Feed>,
    metrics: DerivedMetrics,
    /// `None` until the first refresh cycle resolves.
    advisory: Option<Advisory>,
    initial_text: String,
    demo_mode: bool,
    sampler: DemoSampler,
    /// Generation of the newest applied refresh outcome. Older in-flight
    /// cycles that resolve late are discarded instead of overwriting state.
    applied_generation: u64,
    next_generation: u64,
}

impl App {
    fn new(
        constants: UsageConstants,
        history_results: u32,
        initial_text: String,
        demo_mode: bool,
    ) -> Self {
        let mut sampler = DemoSampler::new();
        let metrics = derive_metrics(sampler.resolve(DataSource::Demo), &constants);
        Self {
            constants,
            history_results,
            latest: None,
            history: Vec::new(),
            metrics,
            advisory: None,
            initial_text,
            demo_mode,
            sampler,
            applied_generation: 0,
            next_generation: 0,
        }
    }

    fn data_source(&self) -> DataSource {
        match (&self.latest, self.demo_mode) {
            (Some(feed), false) => DataSource::Live(reading_from(feed)),
            _ => DataSource::Demo,
        }
    }

    /// Metrics are a pure function of the active source; demo readings are
    /// redrawn on every recompute.
    fn recompute_metrics(&mut self) {
        let reading = self.sampler.resolve(self.data_source());
        self.metrics = derive_metrics(reading, &self.constants);
    }

    fn toggle_demo(&mut self) {
        self.demo_mode = !self.demo_mode;
        self.recompute_metrics();
    }

    fn apply(&mut self, outcome: RefreshOutcome) {
        if outcome.generation <= self.applied_generation {
            debug!(
                generation = outcome.generation,
                applied = self.applied_generation,
                "dropping stale refresh outcome"
            );
            return;
        }
        self.applied_generation = outcome.generation;
        self.latest = outcome.latest;
        self.history = outcome.history;
        self.advisory = Some(outcome.advisory);
        self.recompute_metrics();
    }

    fn advisory_text(&self) -> &str {
        self.advisory
            .as_ref()
            .map(|a| a.text.as_str())
            .unwrap_or(&self.initial_text)
    }

    fn chart_points(&self) -> Vec<(f64, f64)> {
        let start = self.history.len().saturating_sub(CHART_WINDOW);
        self.history[start..]
            .iter()
            .enumerate()
            .map(|(i, feed)| (i as f64, feed.power_watts()))
            .collect()
    }
}

fn reading_from(feed: &Feed) -> Reading {
    Reading {
        current_a: feed.current_amps(),
        power_w: feed.power_watts(),
        energy_kwh: feed.energy_kwh(),
    }
}

/// Spawn one refresh cycle: telemetry first, then the advisory, which is
/// composed from the freshly derived metrics.
fn trigger_refresh(app: &mut App, ctx: &RefreshContext) {
    app.next_generation += 1;
    let generation = app.next_generation;
    let demo_mode = app.demo_mode;
    let constants = app.constants;
    let history_results = app.history_results;
    let ctx = ctx.clone();
    tokio::spawn(async move {
        let latest = ctx.telemetry.fetch_last().await;
        let history = ctx.telemetry.fetch_history(history_results).await;
        let reading = match (&latest, demo_mode) {
            (Some(feed), false) => reading_from(feed),
            _ => DemoSampler::new().draw(),
        };
        let metrics = derive_metrics(reading, &constants);
        let advisory = ctx
            .advisory
            .get_advice(
                metrics.energy_kwh,
                metrics.prediction_kwh,
                constants.budget_limit_kwh,
            )
            .await;
        let _ = ctx.tx.send(RefreshOutcome {
            generation,
            latest,
            history,
            advisory,
        });
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("configs/gridsight.toml"));
    let config = AppConfig::load(&candidates)?;
    // The dashboard owns the terminal; stdout logging would corrupt the
    // rendered frame, so events go to the rolling file only.
    init_tracing("gridsight-ui", &config.logging.for_interactive())?;

    let api_key = std::env::var(ENV_API_KEY)
        .ok()
        .filter(|key| !key.trim().is_empty());
    if api_key.is_none() {
        warn!("{ENV_API_KEY} is not set; advisory requests will use fallback text");
    }

    let telemetry = TelemetryClient::new(&config.telemetry)?;
    let advisory = Arc::new(AdvisoryClient::new(&config.advisory, api_key)?);
    let initial_text = advisory
        .persisted_insight()
        .unwrap_or_else(|| INITIAL_TEXT.to_owned());

    let (tx, rx) = mpsc::unbounded_channel();
    let ctx = RefreshContext {
        telemetry,
        advisory,
        tx,
    };
    let app = App::new(
        UsageConstants::from(&config.usage),
        config.telemetry.history_results,
        initial_text,
        cli.demo,
    );

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    crossterm::execute!(stdout, EnterAlternateScreen, Hide)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    let result = run_app(
        &mut terminal,
        app,
        ctx,
        rx,
        config.advisory.refresh_interval,
    )
    .await;
    cleanup_terminal(&mut terminal)?;
    if let Err(err) = result {
        eprintln!("error: {err:?}");
        std::process::exit(1);
    }
    Ok(())
}

fn cleanup_terminal(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    crossterm::execute!(terminal.backend_mut(), LeaveAlternateScreen, Show)?;
    terminal.show_cursor()?;
    Ok(())
}

enum Action {
    None,
    Quit,
    Refresh,
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    mut app: App,
    ctx: RefreshContext,
    mut rx: mpsc::UnboundedReceiver<RefreshOutcome>,
    refresh_interval: Duration,
) -> Result<()> {
    // First cycle fires immediately on mount.
    let mut next_refresh = Instant::now();
    let mut next_demo_tick = Instant::now() + DEMO_TICK;
    loop {
        if Instant::now() >= next_refresh {
            trigger_refresh(&mut app, &ctx);
            next_refresh = Instant::now() + refresh_interval;
        }
        if Instant::now() >= next_demo_tick {
            // The tick always fires; it is only observable while demo
            // values are substituting live telemetry.
            app.recompute_metrics();
            next_demo_tick += DEMO_TICK;
        }
        while let Ok(outcome) = rx.try_recv() {
            app.apply(outcome);
        }

        terminal.draw(|frame| draw_ui(frame, &app))?;
        if event::poll(Duration::from_millis(100))? {
            match event::read()? {
                Event::Key(key) => match handle_input(&mut app, key) {
                    Action::Quit => break,
                    Action::Refresh => next_refresh = Instant::now(),
                    Action::None => {}
                },
                Event::Resize(_, _) => {
                    // redraw with new geometry
                }
                _ => {}
            }
        }
    }
    Ok(())
}

fn handle_input(app: &mut App, key: KeyEvent) -> Action {
    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => Action::Quit,
        KeyCode::Char('d') | KeyCode::Char('D') => {
            app.toggle_demo();
            Action::None
        }
        KeyCode::Char('r') | KeyCode::Char('R') => Action::Refresh,
        _ => Action::None,
    }
}

fn draw_ui(frame: &mut Frame, app: &App) {
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(5),
            Constraint::Min(8),
            Constraint::Length(3),
            Constraint::Length(6),
            Constraint::Length(1),
        ])
        .split(frame.size());

    draw_kpi_tiles(frame, app, layout[0]);

    let middle = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(62), Constraint::Percentage(38)])
        .split(layout[1]);
    draw_power_chart(frame, app, middle[0]);
    draw_sustainability(frame, app, middle[1]);

    draw_budget_gauge(frame, app, layout[2]);
    draw_advisory(frame, app, layout[3]);
    draw_footer(frame, app, layout[4]);
}

fn kpi_tile<'a>(title: &'a str, value: String, unit: &'a str, accent: Color) -> Paragraph<'a> {
    let lines = vec![
        Line::from(Span::styled(
            value,
            Style::default().fg(accent).add_modifier(Modifier::BOLD),
        )),
        Line::from(Span::styled(unit, Style::default().fg(Color::DarkGray))),
    ];
    Paragraph::new(lines)
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL).title(title))
}

fn draw_kpi_tiles(frame: &mut Frame, app: &App, area: ratatui::layout::Rect) {
    let tiles = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(25),
            Constraint::Percentage(25),
            Constraint::Percentage(25),
            Constraint::Percentage(25),
        ])
        .split(area);

    let m = &app.metrics;
    frame.render_widget(
        kpi_tile("Current", format!("{:.2}", m.current_a), "A", Color::Cyan),
        tiles[0],
    );
    frame.render_widget(
        kpi_tile("Power", format!("{:.1}", m.power_w), "W", Color::Cyan),
        tiles[1],
    );
    frame.render_widget(
        kpi_tile(
            "Energy Used",
            format!("{:.2}", m.energy_kwh),
            "kWh",
            Color::Green,
        ),
        tiles[2],
    );
    let projection_color = if m.is_high_risk {
        Color::Red
    } else {
        Color::Green
    };
    frame.render_widget(
        kpi_tile(
            "Monthly Projection",
            format!("{:.2}", m.prediction_kwh),
            "kWh",
            projection_color,
        ),
        tiles[3],
    );
}

fn draw_power_chart(frame: &mut Frame, app: &App, area: ratatui::layout::Rect) {
    let points = app.chart_points();
    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!("Power Draw (last {CHART_WINDOW} samples)"));
    if points.len() < 2 {
        let placeholder = Paragraph::new("(no telemetry history)")
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        frame.render_widget(placeholder, area);
        return;
    }

    let max_y = points
        .iter()
        .map(|(_, y)| *y)
        .fold(f64::MIN, f64::max)
        .max(1.0)
        * 1.1;
    let max_x = (points.len() - 1) as f64;
    let datasets = vec![Dataset::default()
        .name("power (W)")
        .marker(symbols::Marker::Braille)
        .graph_type(GraphType::Line)
        .style(Style::default().fg(Color::Cyan))
        .data(&points)];
    let chart = Chart::new(datasets)
        .block(block)
        .x_axis(Axis::default().bounds([0.0, max_x]))
        .y_axis(
            Axis::default()
                .bounds([0.0, max_y])
                .labels(vec![
                    Span::from("0"),
                    Span::from(format!("{:.0}", max_y / 2.0)),
                    Span::from(format!("{max_y:.0}")),
                ])
                .style(Style::default().fg(Color::Gray)),
        );
    frame.render_widget(chart, area);
}

fn draw_sustainability(frame: &mut Frame, app: &App, area: ratatui::layout::Rect) {
    let m = &app.metrics;
    let risk_span = if m.is_high_risk {
        Span::styled(
            "HIGH RISK",
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        )
    } else {
        Span::styled("NOMINAL", Style::default().fg(Color::Green))
    };
    let lines = vec![
        Line::from(format!("Carbon footprint   {:.2} kg CO2", m.carbon_kg)),
        Line::from(format!("Annualized carbon  {:.1} kg CO2", m.annual_carbon_kg)),
        Line::from(format!(
            "Annualized savings {:.1} kWh",
            m.annual_savings_kwh
        )),
        Line::from(vec![Span::from("Budget outlook     "), risk_span]),
    ];
    let panel = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .title("Sustainability"),
    );
    frame.render_widget(panel, area);
}

fn draw_budget_gauge(frame: &mut Frame, app: &App, area: ratatui::layout::Rect) {
    let progress = app.metrics.progress_percent;
    let color = if app.metrics.is_high_risk {
        Color::Red
    } else if progress > 75.0 {
        Color::Yellow
    } else {
        Color::Green
    };
    let gauge = Gauge::default()
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Budget Utilization"),
        )
        .gauge_style(Style::default().fg(color))
        .ratio((progress / 100.0).clamp(0.0, 1.0))
        .label(format!("{progress:.1}%"));
    frame.render_widget(gauge, area);
}

fn advisory_badge(app: &App) -> Span<'static> {
    match app.advisory.as_ref().map(|a| a.status) {
        None => Span::styled("SYNCING", Style::default().fg(Color::DarkGray)),
        Some(AdvisoryStatus::Pro) => Span::styled(
            "PRO MODEL",
            Style::default()
                .fg(Color::Green)
                .add_modifier(Modifier::BOLD),
        ),
        Some(AdvisoryStatus::Active) => Span::styled("ACTIVE", Style::default().fg(Color::Cyan)),
        Some(AdvisoryStatus::Limited) => {
            Span::styled("LIMITED", Style::default().fg(Color::Yellow))
        }
        Some(AdvisoryStatus::Error) => Span::styled("FALLBACK", Style::default().fg(Color::Red)),
    }
}

fn draw_advisory(frame: &mut Frame, app: &App, area: ratatui::layout::Rect) {
    let lines = vec![
        Line::from(advisory_badge(app)),
        Line::from(app.advisory_text().to_owned()),
    ];
    let panel = Paragraph::new(lines)
        .wrap(Wrap { trim: true })
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("AI Governance Advisory"),
        );
    frame.render_widget(panel, area);
}

fn draw_footer(frame: &mut Frame, app: &App, area: ratatui::layout::Rect) {
    let mut spans = vec![Span::styled(
        "r refresh  d demo mode  q quit",
        Style::default().fg(Color::Gray),
    )];
    if app.demo_mode {
        spans.push(Span::from("   "));
        spans.push(Span::styled(
            "DEMO",
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        ));
    }
    if let Some(feed) = &app.latest {
        spans.push(Span::from("   "));
        spans.push(Span::styled(
            format!("last sample {}", feed.created_at.format("%Y-%m-%d %H:%M:%S")),
            Style::default().fg(Color::DarkGray),
        ));
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn constants() -> UsageConstants {
        UsageConstants {
            budget_limit_kwh: 100.0,
            days_passed: 10.0,
            carbon_factor: 0.82,
        }
    }

    fn feed(entry_id: u64, power: &str) -> Feed {
        Feed {
            created_at: Utc.with_ymd_and_hms(2026, 8, 1, 10, 0, 0).unwrap(),
            entry_id,
            field1: Some("1.50".to_owned()),
            field2: Some(power.to_owned()),
            field3: Some("30.00".to_owned()),
        }
    }

    fn outcome(generation: u64, advisory_text: &str) -> RefreshOutcome {
        RefreshOutcome {
            generation,
            latest: Some(feed(generation, "500")),
            history: vec![feed(generation, "500")],
            advisory: Advisory {
                text: advisory_text.to_owned(),
                status: AdvisoryStatus::Pro,
            },
        }
    }

    #[test]
    fn stale_refresh_outcome_is_dropped() {
        let mut app = App::new(constants(), 20, INITIAL_TEXT.to_owned(), false);
        app.next_generation = 2;
        app.apply(outcome(2, "fresh cycle"));
        // An older cycle resolving late must not overwrite newer state.
        app.apply(outcome(1, "slow stale cycle"));
        assert_eq!(app.advisory_text(), "fresh cycle");
        assert_eq!(app.latest.as_ref().unwrap().entry_id, 2);
    }

    #[test]
    fn live_feed_drives_metrics_when_demo_off() {
        let mut app = App::new(constants(), 20, INITIAL_TEXT.to_owned(), false);
        app.latest = Some(feed(1, "512.5"));
        app.recompute_metrics();
        assert_eq!(app.metrics.power_w, 512.5);
        assert_eq!(app.metrics.energy_kwh, 30.0);
        assert_eq!(app.metrics.prediction_kwh, 90.0);
    }

    #[test]
    fn demo_mode_substitutes_random_values() {
        let mut app = App::new(constants(), 20, INITIAL_TEXT.to_owned(), true);
        app.latest = Some(feed(1, "512.5"));
        app.recompute_metrics();
        // demo ranges, not the live sample
        assert!((350.0..650.0).contains(&app.metrics.power_w));
        assert!((25.0..65.0).contains(&app.metrics.energy_kwh));
    }

    #[test]
    fn missing_live_sample_falls_back_to_demo_values() {
        let mut app = App::new(constants(), 20, INITIAL_TEXT.to_owned(), false);
        assert!(matches!(app.data_source(), DataSource::Demo));
        app.latest = Some(feed(1, "500"));
        assert!(matches!(app.data_source(), DataSource::Live(_)));
    }

    #[test]
    fn initial_text_is_shown_until_first_advisory() {
        let mut app = App::new(constants(), 20, "persisted insight".to_owned(), false);
        assert_eq!(app.advisory_text(), "persisted insight");
        app.next_generation = 1;
        app.apply(outcome(1, "live advisory"));
        assert_eq!(app.advisory_text(), "live advisory");
    }

    #[test]
    fn chart_window_is_bounded_to_most_recent_samples() {
        let mut app = App::new(constants(), 40, INITIAL_TEXT.to_owned(), false);
        app.history = (0..40).map(|i| feed(i, "400")).collect();
        let points = app.chart_points();
        assert_eq!(points.len(), CHART_WINDOW);
        // first plotted point corresponds to entry 16 of 40
        assert_eq!(points[0].0, 0.0);
        assert_eq!(
            app.history[app.history.len() - CHART_WINDOW].entry_id,
            16
        );
    }
}
