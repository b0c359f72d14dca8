use std::fs::OpenOptions;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture, Event},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Layout},
    Terminal,
};
use tokio::runtime::{Handle, Runtime};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use pulsewatch::app::{App, View};
use pulsewatch::config::Settings;
use pulsewatch::monitor::{ConnectionState, DeviceTarget, Monitor, Update};
use pulsewatch::source::{
    AlwaysGranted, Capability, DeviceAccess, ReplayTransport, SerialTransport, TcpTransport,
    Transport, TransportKind,
};
use pulsewatch::store::{JsonlStore, NullStore, RestStore, Store, StoreKind};
use pulsewatch::{events, ui};

#[derive(Parser, Debug)]
#[command(name = "pulsewatch")]
#[command(about = "Terminal monitor for a serial heart-rate link with per-minute averages")]
#[command(version)]
struct Args {
    /// Settings file (TOML). Environment variables PULSEWATCH_* override it.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// How to reach the device
    #[arg(short, long, value_enum)]
    transport: Option<TransportKind>,

    /// Device path, host:port, or capture file (depends on --transport)
    #[arg(short, long)]
    address: Option<String>,

    /// Service UUID requested during the handshake
    #[arg(long)]
    service_id: Option<Uuid>,

    /// Serial baud rate
    #[arg(short, long)]
    baud: Option<u32>,

    /// Averaging window (e.g., "60s", "1m")
    #[arg(short, long)]
    window: Option<String>,

    /// Readings at or below this BPM are not averaged
    #[arg(long)]
    noise_floor: Option<f32>,

    /// Averages below this BPM are LOW
    #[arg(long)]
    low: Option<f32>,

    /// Averages above this BPM are HIGH
    #[arg(long)]
    high: Option<f32>,

    /// Delay between replayed chunks (e.g., "50ms")
    #[arg(long)]
    replay_pace: Option<String>,

    /// Where minute averages are saved
    #[arg(long, value_enum)]
    store: Option<StoreKind>,

    /// File for the jsonl store
    #[arg(long)]
    store_path: Option<PathBuf>,

    /// Database root URL for the rest store
    #[arg(long)]
    store_url: Option<String>,

    /// Log updates to stderr instead of drawing the dashboard
    #[arg(long)]
    headless: bool,

    /// Connect as soon as the dashboard starts
    #[arg(long)]
    autoconnect: bool,

    /// Log file used while the dashboard is shown
    #[arg(long, default_value = "pulsewatch.log")]
    log_file: PathBuf,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args)?;

    let settings = load_settings(&args)?;

    // Worker for store requests; the link itself runs on plain threads
    let runtime = Runtime::new()?;
    let monitor = build_monitor(&settings, runtime.handle())?;

    if args.headless {
        runtime.block_on(run_headless(monitor))
    } else {
        run_tui(monitor, args.autoconnect)
    }
}

fn init_logging(args: &Args) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pulsewatch=info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    if args.headless {
        builder.with_writer(io::stderr).init();
    } else {
        // Keep log lines off the alternate screen
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&args.log_file)
            .with_context(|| format!("Failed to open log file {}", args.log_file.display()))?;
        builder.with_ansi(false).with_writer(Mutex::new(file)).init();
    }
    Ok(())
}

/// Layer command-line flags over the file and environment settings.
fn load_settings(args: &Args) -> Result<Settings> {
    let mut settings = Settings::load_layers(args.config.as_deref())?;

    let device = &mut settings.device;
    if let Some(transport) = args.transport {
        device.transport = transport;
    }
    if let Some(ref address) = args.address {
        device.address = address.clone();
    }
    if let Some(service_id) = args.service_id {
        device.service_id = service_id;
    }
    if let Some(baud) = args.baud {
        device.baud_rate = baud;
    }
    if let Some(ref pace) = args.replay_pace {
        device.replay_pace = pace.clone();
    }

    let aggregation = &mut settings.aggregation;
    if let Some(ref window) = args.window {
        aggregation.window = window.clone();
    }
    if let Some(noise_floor) = args.noise_floor {
        aggregation.noise_floor = noise_floor;
    }
    if let Some(low) = args.low {
        aggregation.low_bpm = low;
    }
    if let Some(high) = args.high {
        aggregation.high_bpm = high;
    }

    let store = &mut settings.store;
    if let Some(kind) = args.store {
        store.kind = kind;
    }
    if let Some(ref path) = args.store_path {
        store.path = path.clone();
    }
    if let Some(ref url) = args.store_url {
        store.url = Some(url.clone());
    }

    settings.validate()?;
    Ok(settings)
}

fn build_monitor(settings: &Settings, runtime: &Handle) -> Result<Monitor> {
    let device = &settings.device;

    let (transport, capability): (Arc<dyn Transport>, Box<dyn Capability>) = match device.transport
    {
        TransportKind::Serial => (
            Arc::new(SerialTransport::new(device.baud_rate)),
            Box::new(DeviceAccess::new(&device.address)),
        ),
        TransportKind::Tcp => (Arc::new(TcpTransport::new()), Box::new(AlwaysGranted)),
        TransportKind::Replay => (
            Arc::new(ReplayTransport::new(settings.replay_pace()?)),
            Box::new(AlwaysGranted),
        ),
    };

    let store: Box<dyn Store> = match settings.store.kind {
        StoreKind::None => Box::new(NullStore),
        StoreKind::Jsonl => Box::new(JsonlStore::new(&settings.store.path)),
        StoreKind::Rest => {
            let url = settings
                .store
                .url
                .as_deref()
                .context("store.url is required for the rest store")?;
            Box::new(
                RestStore::builder()
                    .base_url(url)
                    .collection(&settings.store.collection)
                    .build(runtime.clone())?,
            )
        }
    };

    tracing::info!(
        "Using {} at {}, saving to {}",
        transport.describe(),
        device.address,
        store.describe()
    );

    let target = DeviceTarget::new(&device.address).with_service(device.service_id);
    Ok(
        Monitor::new(transport, target, settings.thresholds(), settings.window()?)
            .with_capability(capability)
            .with_store(store),
    )
}

/// Connect once and log every update until the session ends or Ctrl-C.
async fn run_headless(mut monitor: Monitor) -> Result<()> {
    monitor.connect()?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                if monitor.state() != ConnectionState::Disconnected {
                    let _ = monitor.disconnect();
                }
                monitor.pump().iter().for_each(log_update);
                return Ok(());
            }
            updates = monitor.wait() => {
                updates.iter().for_each(log_update);
                if monitor.state() == ConnectionState::Disconnected {
                    return Ok(());
                }
            }
        }
    }
}

fn log_update(update: &Update) {
    match update {
        Update::Reading {
            value,
            status,
            device_average,
        } => match device_average {
            Some(avg) => tracing::info!("{:.1} BPM {} (device avg {:.1})", value, status.label(), avg),
            None => tracing::info!("{:.1} BPM {}", value, status.label()),
        },
        Update::Window { result, status } => tracing::info!(
            "Minute average {:.1} BPM {} over {} samples",
            result.average,
            status.label(),
            result.sample_count
        ),
        Update::State { state, message } => tracing::info!("[{}] {}", state, message),
        Update::Cleared => {}
    }
}

/// Run the dashboard until the user quits
fn run_tui(monitor: Monitor, autoconnect: bool) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Setup panic hook to restore terminal
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen, DisableMouseCapture);
        original_hook(panic);
    }));

    let mut app = App::new(monitor);
    if autoconnect {
        app.toggle_connection();
    }

    let result = run_app(&mut terminal, &mut app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    result
}

fn run_app(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, app: &mut App) -> Result<()> {
    // Minimum terminal size for usable display
    const MIN_WIDTH: u16 = 60;
    const MIN_HEIGHT: u16 = 20;

    while app.running {
        app.poll_updates();

        terminal.draw(|frame| {
            let area = frame.area();

            if area.width < MIN_WIDTH || area.height < MIN_HEIGHT {
                let msg = format!(
                    "Terminal too small: {}x{}\nMinimum: {}x{}\n\nResize to continue",
                    area.width, area.height, MIN_WIDTH, MIN_HEIGHT
                );
                let paragraph = ratatui::widgets::Paragraph::new(msg)
                    .alignment(ratatui::layout::Alignment::Center)
                    .style(ratatui::style::Style::default().fg(ratatui::style::Color::Yellow));
                let top = (area.height / 2).saturating_sub(2);
                let centered = ratatui::layout::Rect::new(0, top, area.width, 5.min(area.height));
                frame.render_widget(paragraph, centered);
                return;
            }

            let chunks = Layout::vertical([
                Constraint::Length(1), // Header bar
                Constraint::Length(1), // Tabs
                Constraint::Min(14),   // Content
                Constraint::Length(1), // Status bar
            ])
            .split(area);

            ui::common::render_header(frame, app, chunks[0]);
            ui::common::render_tabs(frame, app, chunks[1]);

            match app.current_view {
                View::Live => ui::live::render(frame, app, chunks[2]),
                View::History => ui::history::render(frame, app, chunks[2]),
            }

            ui::common::render_status_bar(frame, app, chunks[3]);

            if app.show_help {
                ui::common::render_help(frame, app, area);
            }
        })?;

        // Short poll keeps readings flowing while idle
        if let Some(event) = events::poll_event(Duration::from_millis(100))? {
            match event {
                Event::Key(key) => events::handle_key_event(app, key),
                Event::Mouse(mouse) => {
                    // Content starts after header (1) + tabs (1) + table border (1)
                    events::handle_mouse_event(app, mouse, 3);
                }
                _ => {}
            }
        }
    }

    Ok(())
}
