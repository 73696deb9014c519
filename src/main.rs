use clap::{error::ErrorKind, CommandFactory, Parser};
use crossterm::{
    event::{
        DisableBracketedPaste, DisableFocusChange, DisableMouseCapture, EnableBracketedPaste,
        EnableFocusChange, EnableMouseCapture,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use std::{
    error::Error,
    io::{self, stdin},
    path::PathBuf,
    time::Duration,
};
use tracing_subscriber::EnvFilter;

use proctor::{
    app::{App, AppFlow},
    app_dirs::AppDirs,
    bank::Bank,
    config::{Config, ConfigStore, FileConfigStore},
    media::SimulatedDevices,
    modality::Modality,
    monitor::SharedFaceSignal,
    replay::{run_script, Script},
    runtime::{CrosstermEventSource, FixedTicker, Runner},
    session::AssessmentSession,
    store::ResultStore,
    util::format_clock,
};

const TICK_RATE_MS: u64 = 100;

/// proctored assessment sessions in the terminal
#[derive(Parser, Debug, Clone)]
#[clap(
    version,
    about,
    long_about = "Runs a timed, proctored assessment (multiple choice, coding or recorded interview) with camera monitoring, focus tracking and anti-tamper guards. Devices are simulated: F2 toggles the camera and F3 toggles face presence."
)]
pub struct Cli {
    /// kind of assessment to run with the built-in question bank
    #[clap(short = 'm', long, value_enum, default_value_t = Modality::Mcq)]
    modality: Modality,

    /// question bank JSON file to use instead of the built-in one
    #[clap(short = 'b', long)]
    bank: Option<PathBuf>,

    /// session length in seconds (defaults to the configured length for the modality)
    #[clap(short = 's', long)]
    secs: Option<u32>,

    /// number of violations that disqualifies the candidate
    #[clap(long)]
    max_violations: Option<u32>,

    /// shuffle question order
    #[clap(long)]
    shuffle: bool,

    /// do not store the result in the local history database
    #[clap(long)]
    no_save: bool,

    /// run a scripted session headlessly and print the outcome as JSON
    #[clap(long, value_name = "SCRIPT")]
    replay: Option<PathBuf>,

    /// print recently stored results
    #[clap(long)]
    history: bool,

    /// how many results --history prints
    #[clap(long, default_value_t = 10)]
    limit: usize,
}

impl Cli {
    fn apply_overrides(&self, mut config: Config) -> Config {
        if let Some(max) = self.max_violations {
            config.max_violations = max;
        }
        if self.shuffle {
            config.shuffle_questions = true;
        }
        config
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("PROCTOR_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    let Some(path) = AppDirs::log_path() else {
        return;
    };
    if let Some(parent) = path.parent() {
        if std::fs::create_dir_all(parent).is_err() {
            return;
        }
    }
    let Ok(file) = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
    else {
        return;
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(std::sync::Mutex::new(file))
        .try_init();
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_logging();

    let config = cli.apply_overrides(FileConfigStore::new().load());

    if cli.history {
        return print_history(cli.limit);
    }

    if let Some(path) = &cli.replay {
        let mut script = Script::from_file(path)?;
        if script.total_secs.is_none() {
            script.total_secs = cli.secs;
        }
        let outcome = run_script(&script, &config)?;
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    if !stdin().is_tty() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
    }

    let bank = match &cli.bank {
        Some(path) => Bank::from_file(path)?,
        None => Bank::builtin(cli.modality)?,
    };
    let questions = bank.questions(
        config.shuffle_questions,
        config.interview_answer_secs,
        &mut rand::thread_rng(),
    );
    let session_config = config.session_config(questions, cli.secs)?;

    let devices = SimulatedDevices::new();
    let control = devices.control();
    let faces = SharedFaceSignal::new(true);
    let session = AssessmentSession::new(session_config, Box::new(devices))?
        .with_face_detector(Box::new(faces.clone()));

    let mut app = App::new(session, bank.name.clone(), control, faces);
    if !cli.no_save {
        match ResultStore::open_default() {
            Ok(store) => app = app.with_sink(Box::new(store)),
            Err(err) => tracing::warn!(error = %err, "result history unavailable"),
        }
    }

    enable_raw_mode()?;

    let mut stdout = io::stdout();
    execute!(
        stdout,
        EnterAlternateScreen,
        EnableFocusChange,
        EnableBracketedPaste,
        EnableMouseCapture
    )?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let outcome = start_tui(&mut terminal, &mut app);

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        DisableMouseCapture,
        DisableBracketedPaste,
        DisableFocusChange,
        LeaveAlternateScreen,
    )?;
    terminal.show_cursor()?;

    outcome
}

fn start_tui<B: Backend>(terminal: &mut Terminal<B>, app: &mut App) -> Result<(), Box<dyn Error>> {
    let mut runner = Runner::new(
        CrosstermEventSource::new(),
        FixedTicker::new(Duration::from_millis(TICK_RATE_MS)),
    );

    loop {
        terminal.draw(|f| f.render_widget(&*app, f.area()))?;
        if app.handle(runner.step()) == AppFlow::Quit {
            break;
        }
    }

    Ok(())
}

fn print_history(limit: usize) -> Result<(), Box<dyn Error>> {
    let store = ResultStore::open_default()?;
    let results = store.recent(limit)?;
    if results.is_empty() {
        println!("no stored results");
        return Ok(());
    }
    for r in results {
        println!(
            "{}  {:<20}  {:<9}  {:<12}  score {:>4}  violations {}  time {}",
            r.completed_at.format("%Y-%m-%d %H:%M"),
            r.session_id,
            r.modality,
            r.status,
            r.score.map(|s| s.to_string()).unwrap_or_else(|| "-".into()),
            r.violations,
            format_clock(r.elapsed_seconds),
        );
    }
    Ok(())
}
