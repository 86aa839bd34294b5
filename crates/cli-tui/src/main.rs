use anyhow::{Context, Result};
use clap::Parser;
use humansize::{format_size, DECIMAL};
use crossterm::event::KeyCode;
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::Line,
    widgets::{Block, Borders, Gauge, List, ListItem, ListState, Paragraph},
    Frame, Terminal,
};
use std::io::stdout;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::watch;
use transcoder::{
    config::{BatchConfig, DEFAULT_CONFIG_FILE},
    preset, BatchEvent, BatchHandle, Coordinator, JobOutcome, RunSnapshot, RunState,
};

/// Maximum number of log lines kept in memory
const LOG_CAPACITY: usize = 500;

/// Settings path editable from the keyboard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PathField {
    Encoder,
    Input,
}

impl PathField {
    fn label(self) -> &'static str {
        match self {
            PathField::Encoder => "FFmpeg Path",
            PathField::Input => "Input Folder",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Mode {
    Normal,
    Editing { field: PathField, buffer: String },
}

struct App {
    config: BatchConfig,
    config_path: PathBuf,
    coordinator: Coordinator,
    handle: Option<BatchHandle>,
    snapshot: watch::Receiver<RunSnapshot>,
    preset_state: ListState,
    log: Vec<String>,
    mode: Mode,
    should_quit: bool,
}

impl App {
    fn new(config: BatchConfig, config_path: PathBuf) -> Self {
        let coordinator: Coordinator = Coordinator::new();
        let snapshot = coordinator.subscribe();

        let selected = preset::names()
            .iter()
            .position(|n| *n == config.preset)
            .unwrap_or(0);
        let mut preset_state = ListState::default();
        preset_state.select(Some(selected));

        Self {
            config,
            config_path,
            coordinator,
            handle: None,
            snapshot,
            preset_state,
            log: Vec::new(),
            mode: Mode::Normal,
            should_quit: false,
        }
    }

    fn push_log(&mut self, line: String) {
        self.log.push(line);
        if self.log.len() > LOG_CAPACITY {
            let excess = self.log.len() - LOG_CAPACITY;
            self.log.drain(..excess);
        }
    }

    fn selected_preset(&self) -> &'static str {
        let names = preset::names();
        names[self.preset_state.selected().unwrap_or(0).min(names.len() - 1)]
    }

    fn move_selection(&mut self, delta: isize) {
        let count = preset::names().len() as isize;
        let current = self.preset_state.selected().unwrap_or(0) as isize;
        let next = (current + delta).rem_euclid(count);
        self.preset_state.select(Some(next as usize));
        self.config.preset = self.selected_preset().to_string();
    }

    fn start(&mut self) {
        // The previous run's Finished event must land before its handle goes
        self.drain_events();
        self.config.preset = self.selected_preset().to_string();
        match self.coordinator.start(self.config.clone()) {
            Ok(handle) => {
                self.push_log("--- Starting New Batch ---".to_string());
                self.push_log(format!("Filter: {}", self.config.preset));
                self.handle = Some(handle);
            }
            Err(e) => self.push_log(format!("⚠️  {}", e)),
        }
    }

    fn save_settings(&mut self) {
        match self.config.save_config(&self.config_path) {
            Ok(()) => self.push_log(format!("Settings saved to {}", self.config_path.display())),
            Err(e) => self.push_log(format!("❌ ERROR: {:#}", e)),
        }
    }

    fn begin_edit(&mut self, field: PathField) {
        if self.coordinator.is_running() {
            self.push_log("⚠️  Paths cannot change while a batch is running".to_string());
            return;
        }
        let current = match field {
            PathField::Encoder => &self.config.ffmpeg_path,
            PathField::Input => &self.config.input_path,
        };
        self.mode = Mode::Editing {
            field,
            buffer: current.display().to_string(),
        };
    }

    fn commit_edit(&mut self, field: PathField, value: String) {
        let value = value.trim();
        if value.is_empty() {
            self.push_log(format!("{} unchanged", field.label()));
            return;
        }
        let path = PathBuf::from(value);
        match field {
            PathField::Encoder => self.config.ffmpeg_path = path,
            PathField::Input => self.config.input_path = path,
        }
        match self.config.save_config(&self.config_path) {
            Ok(()) => self.push_log(format!("{} Set and Saved: {}", field.label(), value)),
            Err(e) => self.push_log(format!("❌ ERROR: {:#}", e)),
        }
    }

    fn handle_key(&mut self, code: KeyCode) {
        if let Mode::Editing { field, buffer } = &mut self.mode {
            let field = *field;
            match code {
                KeyCode::Char(c) => buffer.push(c),
                KeyCode::Backspace => {
                    buffer.pop();
                }
                KeyCode::Enter => {
                    let value = std::mem::take(buffer);
                    self.mode = Mode::Normal;
                    self.commit_edit(field, value);
                }
                KeyCode::Esc => self.mode = Mode::Normal,
                _ => {}
            }
            return;
        }

        let running = self.coordinator.is_running();
        match code {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Up if !running => self.move_selection(-1),
            KeyCode::Down if !running => self.move_selection(1),
            KeyCode::Enter | KeyCode::Char('s') => self.start(),
            KeyCode::Char('w') => self.save_settings(),
            KeyCode::Char('f') => self.begin_edit(PathField::Encoder),
            KeyCode::Char('i') => self.begin_edit(PathField::Input),
            _ => {}
        }
    }

    /// Pull every queued event without waiting
    fn drain_events(&mut self) {
        let mut events = Vec::new();
        if let Some(handle) = self.handle.as_mut() {
            while let Some(event) = handle.try_next_event() {
                events.push(event);
            }
        }
        for event in events {
            self.apply_event(&event);
        }
    }

    fn apply_event(&mut self, event: &BatchEvent) {
        for line in event.log_lines() {
            self.push_log(line);
        }
        match event {
            BatchEvent::Progress(p) => {
                if let JobOutcome::Succeeded { output_path } = &p.outcome {
                    if let Ok(meta) = std::fs::metadata(output_path) {
                        self.push_log(format!("    {} written", format_size(meta.len(), DECIMAL)));
                    }
                }
            }
            BatchEvent::Finished(_) => {
                self.handle = None;
            }
        }
    }
}

/// Terminal front end for batch video filtering
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (JSON or TOML)
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let cfg = BatchConfig::load_config(Some(&args.config))
        .context("Failed to load configuration")?;

    // Setup terminal
    crossterm::terminal::enable_raw_mode()?;
    let mut stdout = stdout();
    crossterm::execute!(stdout, crossterm::terminal::EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(cfg, args.config);
    app.push_log(
        "Ready. Up/Down choose a filter, f/i edit paths, Enter starts, w saves settings, q quits."
            .to_string(),
    );

    // Main event loop
    let result: Result<()> = loop {
        app.drain_events();

        if let Err(e) = terminal.draw(|f| ui(f, &mut app)) {
            break Err(e.into());
        }

        if let Err(e) = handle_input(&mut app) {
            break Err(e);
        }

        if app.should_quit {
            break Ok(());
        }
    };

    // Restore terminal
    crossterm::terminal::disable_raw_mode()?;
    crossterm::execute!(
        terminal.backend_mut(),
        crossterm::terminal::LeaveAlternateScreen
    )?;

    if app.coordinator.is_running() {
        eprintln!("Quit while a batch was running; the current encode was stopped.");
    }

    result
}

fn handle_input(app: &mut App) -> Result<()> {
    use crossterm::event::{self, Event, KeyEventKind};

    if event::poll(Duration::from_millis(100))? {
        if let Event::Key(key) = event::read()? {
            if key.kind == KeyEventKind::Press {
                app.handle_key(key.code);
            }
        }
    }
    Ok(())
}

fn progress_ratio(snapshot: &RunSnapshot) -> f64 {
    if snapshot.total == 0 {
        let finished = snapshot.state == RunState::Completed && snapshot.run_id.is_some();
        return if finished { 1.0 } else { 0.0 };
    }
    (snapshot.processed() as f64 / snapshot.total as f64).clamp(0.0, 1.0)
}

fn progress_label(snapshot: &RunSnapshot) -> String {
    match snapshot.state {
        RunState::Idle => "Ready.".to_string(),
        RunState::Running => match &snapshot.current_file {
            Some(file) => format!(
                "Processed {} of {} videos. Now: {}",
                snapshot.processed(),
                snapshot.total,
                file
            ),
            None => format!("Processed {} of {} videos.", snapshot.processed(), snapshot.total),
        },
        RunState::Completed => format!(
            "Processing complete! {} succeeded, {} failed of {}",
            snapshot.succeeded, snapshot.failed, snapshot.total
        ),
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let size = f.size();

    if size.height < 12 || size.width < 60 {
        let error_msg = Paragraph::new("Terminal too small! Please resize to at least 60x12.")
            .block(Block::default().borders(Borders::ALL).title("Error"))
            .style(Style::default().fg(Color::Red));
        f.render_widget(error_msg, size);
        return;
    }

    let preset_height = preset::names().len() as u16 + 2;
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4),             // Paths
            Constraint::Length(preset_height), // Presets
            Constraint::Min(3),                // Log
            Constraint::Length(3),             // Gauge
        ])
        .split(size);

    render_paths(f, app, chunks[0]);
    render_presets(f, app, chunks[1]);
    render_log(f, app, chunks[2]);
    render_progress(f, app, chunks[3]);
}

fn render_paths(f: &mut Frame, app: &App, area: Rect) {
    let shown = |field: PathField, current: &std::path::Path| match &app.mode {
        Mode::Editing { field: editing, buffer } if *editing == field => format!("{}_", buffer),
        _ => current.display().to_string(),
    };
    let text = vec![
        Line::from(format!(
            "FFmpeg Path:  {}",
            shown(PathField::Encoder, app.config.ffmpeg_path.as_path())
        )),
        Line::from(format!(
            "Input Folder: {}  ->  {}",
            shown(PathField::Input, app.config.input_path.as_path()),
            app.config.output_dir.display()
        )),
    ];
    let title = match app.mode {
        Mode::Editing { .. } => "Settings (Enter saves, Esc cancels)",
        Mode::Normal => "Settings",
    };
    let paragraph = Paragraph::new(text)
        .block(Block::default().borders(Borders::ALL).title(title));
    f.render_widget(paragraph, area);
}

fn render_presets(f: &mut Frame, app: &mut App, area: Rect) {
    let items: Vec<ListItem> = preset::names()
        .into_iter()
        .map(ListItem::new)
        .collect();
    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title("Select Filter"))
        .highlight_style(Style::default().add_modifier(Modifier::BOLD).fg(Color::Cyan))
        .highlight_symbol("> ");
    f.render_stateful_widget(list, area, &mut app.preset_state);
}

fn render_log(f: &mut Frame, app: &App, area: Rect) {
    // Show the tail that fits inside the borders
    let visible = area.height.saturating_sub(2) as usize;
    let start = app.log.len().saturating_sub(visible);
    let lines: Vec<Line> = app.log[start..]
        .iter()
        .map(|l| Line::from(l.as_str()))
        .collect();
    let paragraph = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title("Processing Log"));
    f.render_widget(paragraph, area);
}

fn render_progress(f: &mut Frame, app: &App, area: Rect) {
    let snapshot = app.snapshot.borrow().clone();
    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title("Progress"))
        .gauge_style(Style::default().fg(Color::Green))
        .ratio(progress_ratio(&snapshot))
        .label(progress_label(&snapshot));
    f.render_widget(gauge, area);
}
