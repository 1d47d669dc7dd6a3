use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use crossbeam_channel::{select, Sender};
use crossterm::terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;

use backtrack::audio::{self, AudioHandle, CompletedRecording, RecordEvent};
use backtrack::audio_api::AudioSink;
use backtrack::generator::{self, FallbackGenerator};
use backtrack::pipeline::persistence;
use backtrack::pipeline::preset::Preset;
use backtrack::session::Session;
use backtrack::shared::InputEvent;
use backtrack::tui;
use backtrack::voice_agent::{AgentReply, VoiceAgent};

const FRAME: Duration = Duration::from_millis(16); // ~60fps

struct Args {
    project_dir: PathBuf,
    verbose: bool,
}

fn parse_args() -> Args {
    let mut project_dir = None;
    let mut verbose = false;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--verbose" | "-v" => verbose = true,
            _ if project_dir.is_none() => project_dir = Some(PathBuf::from(arg)),
            _ => {}
        }
    }
    Args {
        project_dir: project_dir.unwrap_or_else(|| std::env::current_dir().unwrap_or_default()),
        verbose,
    }
}

// The TUI owns the terminal, so logs go to <project>/.backtrack/backtrack.log.
fn init_logging(project_dir: &Path, verbose: bool) {
    use simplelog::*;

    let log_level = if verbose { LevelFilter::Debug } else { LevelFilter::Info };
    let log_path = persistence::log_path(project_dir);
    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let log_file = File::create(&log_path)
        .or_else(|_| File::create(std::env::temp_dir().join("backtrack.log")))
        .expect("Cannot create log file");

    WriteLogger::init(log_level, Config::default(), log_file).expect("Failed to initialize logger");
    log::info!("backtrack starting in {} (log level: {:?})", project_dir.display(), log_level);
}

fn main() {
    let args = parse_args();
    init_logging(&args.project_dir, args.verbose);
    if let Err(e) = run(&args.project_dir) {
        log::error!("{e:#}");
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

enum JobResult {
    Generated(Preset),
    Agent(AgentReply),
}

struct App {
    project_dir: PathBuf,
    session: Session<AudioHandle>,
    agent: Arc<VoiceAgent<FallbackGenerator>>,
    job_tx: Sender<JobResult>,
    jobs_in_flight: usize,
}

impl App {
    /// Returns false when it's time to quit.
    fn handle(&mut self, event: InputEvent) -> bool {
        match event {
            InputEvent::Quit => return false,
            InputEvent::SavePreset => self.save_preset(),
            InputEvent::LoadSavedPreset => {
                let saved = persistence::list_presets(&self.project_dir);
                self.session.load_next_saved(&saved);
            }
            InputEvent::Generate(text) => {
                let agent = Arc::clone(&self.agent);
                self.spawn(move || {
                    JobResult::Generated(agent.generator().generate_or_fallback(&text))
                });
            }
            InputEvent::VoiceRequest(text) => {
                let agent = Arc::clone(&self.agent);
                self.spawn(move || JobResult::Agent(agent.respond(&text)));
            }
            other => self.session.handle_input(other),
        }
        true
    }

    fn spawn(&mut self, job: impl FnOnce() -> JobResult + Send + 'static) {
        match generator::spawn_job(self.job_tx.clone(), job) {
            Ok(()) => self.jobs_in_flight += 1,
            Err(e) => {
                log::error!(target: "generator", "could not start generation: {e}");
                self.session.set_status(format!("Generation failed to start: {e}"));
            }
        }
    }

    fn save_preset(&mut self) {
        let name = self.session.loaded_preset().unwrap_or("My Backing Track").to_string();
        let preset = self.session.to_preset(&name, "Saved from backtrack");
        match persistence::save_preset(&self.project_dir, &preset) {
            Ok(path) => self.session.set_status(format!("Saved preset to {}", path.display())),
            Err(e) => {
                log::error!(target: "session", "{e:#}");
                self.session.set_status(format!("Save failed: {e}"));
            }
        }
    }

    fn job_done(&mut self, result: JobResult) {
        self.jobs_in_flight = self.jobs_in_flight.saturating_sub(1);
        let (preset, message) = match result {
            JobResult::Generated(preset) => (Some(preset), None),
            JobResult::Agent(reply) => (reply.preset, Some(reply.message)),
        };
        if let Some(preset) = preset {
            if let Err(e) = self.session.load_preset(&preset) {
                log::warn!(target: "generator", "generated preset rejected: {e}");
                self.session.set_status(format!("Generated preset rejected: {e}"));
            }
        }
        if let Some(message) = message {
            self.session.set_status(message);
        }
    }

    fn recording_done(&mut self, rec: CompletedRecording) {
        match persistence::save_take(&self.project_dir, &rec.buffer) {
            Ok((path, size)) => {
                log::info!(target: "audio", "saved {} ({size} bytes)", path.display());
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                self.session.take_saved(rec.buffer, &name, size);
            }
            Err(e) => {
                log::error!(target: "audio", "could not save take: {e:#}");
                self.session.set_status(format!("Could not save take: {e}"));
            }
        }
    }
}

fn run(project_dir: &Path) -> anyhow::Result<()> {
    let config = persistence::load_config(project_dir);
    let (audio, mut recorder) =
        audio::start_audio(&config.graph, &config.guitar).context("starting audio")?;
    let input_available = audio.input_available();

    let mut session = Session::new(audio, &config);
    session.on_preset_loaded(|p| {
        log::info!(target: "session", "now playing {:?} at {} bpm", p.name, p.bpm)
    });
    let saved = persistence::list_presets(project_dir);
    if !saved.is_empty() {
        log::info!(target: "session", "{} saved presets in {}", saved.len(), project_dir.display());
    }

    let (job_tx, job_rx) = crossbeam_channel::unbounded::<JobResult>();
    let mut app = App {
        project_dir: project_dir.to_path_buf(),
        session,
        agent: Arc::new(VoiceAgent::new(FallbackGenerator::from_config(&config.generator))),
        job_tx,
        jobs_in_flight: 0,
    };

    terminal::enable_raw_mode()?;
    // Enable keyboard enhancement for real press/release detection.
    // Falls back gracefully if the terminal doesn't support it.
    let _ = crossterm::execute!(
        std::io::stdout(),
        terminal::EnterAlternateScreen,
        crossterm::event::PushKeyboardEnhancementFlags(
            crossterm::event::KeyboardEnhancementFlags::REPORT_EVENT_TYPES
        )
    );
    let _guard = RawModeGuard; // auto drops when out of scope

    let backend = CrosstermBackend::new(std::io::stdout());
    let mut term = Terminal::new(backend)?;
    term.clear()?;

    let input_rx = tui::input::spawn_input_thread()?;
    let redraw = crossbeam_channel::tick(FRAME);
    let mut tui_state = tui::mode::TuiState::default();

    let mut drawn_revision = None;
    let mut dirty = true;

    loop {
        let revision = app.session.store().revision();
        // the input meter moves on its own, so keep redrawing while it's shown
        if dirty || input_available || drawn_revision != Some(revision) {
            let mut ds = app.session.display_state();
            ds.input_level = input_available.then(|| app.session.sink().input_level());
            ds.busy = app.jobs_in_flight > 0;
            term.draw(|frame| tui::view::render(frame, frame.area(), &ds, &tui_state))?;
            drawn_revision = Some(revision);
            dirty = false;
        }

        // re-read every pass: play/stop/bpm swap the timer
        let step_rx = app.session.timer().clone();
        let recording_rx = recorder.events().clone();

        select! {
            recv(input_rx) -> ev => {
                let ev = ev.context("terminal input closed")?;
                for event in tui::input::handle_event(ev, &mut tui_state) {
                    if !app.handle(event) {
                        app.session.stop();
                        log::info!("quit");
                        return Ok(());
                    }
                }
                dirty = true;
            }
            recv(step_rx) -> _ => {
                app.session.on_tick();
                dirty = true;
            }
            recv(job_rx) -> result => {
                if let Ok(result) = result {
                    app.job_done(result);
                    dirty = true;
                }
            }
            recv(recording_rx) -> event => {
                if let Ok(event) = event {
                    let finished = matches!(event, RecordEvent::Finished);
                    match recorder.absorb(event) {
                        Some(rec) => app.recording_done(rec),
                        None if finished => app.session.take_discarded(),
                        None => {}
                    }
                    dirty |= finished;
                }
            }
            recv(redraw) -> _ => {
                if input_available {
                    tui_state.record_level(app.session.sink().input_level());
                }
            }
        }
    }
}

struct RawModeGuard;
impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = crossterm::execute!(
            std::io::stdout(),
            crossterm::event::PopKeyboardEnhancementFlags,
            terminal::LeaveAlternateScreen
        );
        let _ = terminal::disable_raw_mode();
    }
}
