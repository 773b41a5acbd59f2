use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use stepwise::capabilities::{
    FeedbackEmitter, FileMediaPreparer, LocalReminderScheduler, NoopFeedback, ReminderDispatcher,
    ReminderRequest, ReminderScheduler, TerminalFeedback,
};
use stepwise::clock::SystemClock;
use stepwise::config::PlayerSettings;
use stepwise::core::{Routine, RoutineDraft};
use stepwise::library::{JsonRoutineStore, RoutineRepository};
use stepwise::playback::{
    format_clock, progress, Collaborators, PlaybackEngine, PlaybackEvent, SessionHandle,
};

#[derive(Parser)]
#[command(name = "stepwise", version, about = "Step-by-step timed routine player")]
struct Cli {
    /// Routine library file
    #[arg(long, env = "STEPWISE_LIBRARY")]
    library: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List saved routines
    List,
    /// Validate a routine draft and save it to the library
    Import { draft: PathBuf },
    /// Remove a routine from the library
    Delete { routine: String },
    /// Play a saved routine (id, id prefix or title) or a routine file
    Play {
        routine: String,
        /// No terminal bell
        #[arg(long)]
        quiet: bool,
    },
    /// Print the effective settings
    Settings {
        /// Write them to the settings file
        #[arg(long)]
        save: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("stepwise=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = PlayerSettings::load();
    let library_path = cli
        .library
        .clone()
        .or_else(|| settings.library_path())
        .context("No routine library location available")?;
    let mut store = JsonRoutineStore::new(library_path);

    match cli.command {
        Command::List => list(&store),
        Command::Import { draft } => import(&mut store, &draft),
        Command::Delete { routine } => {
            let routine = find_routine(&store, &routine)?;
            store
                .delete(routine.id)
                .with_context(|| format!("Failed to delete {}", routine.title))?;
            println!("Deleted {}", routine.title);
            Ok(())
        }
        Command::Play { routine, quiet } => {
            let routine = resolve_routine(&store, &routine)?;
            let feedback: Arc<dyn FeedbackEmitter> = if quiet {
                Arc::new(NoopFeedback)
            } else {
                Arc::new(TerminalFeedback {
                    bell_on_tick: settings.bell_on_tick,
                })
            };
            let rt = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;
            rt.block_on(play(routine, settings, feedback))
        }
        Command::Settings { save } => {
            println!("{}", serde_json::to_string_pretty(&settings)?);
            if save {
                let path = PlayerSettings::config_path()
                    .context("No settings location available")?;
                settings
                    .save_to(&path)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                println!("Saved to {}", path.display());
            }
            Ok(())
        }
    }
}

fn list(store: &JsonRoutineStore) -> Result<()> {
    let routines = store
        .fetch_routines()
        .with_context(|| format!("Failed to read {}", store.path().display()))?;
    if routines.is_empty() {
        println!("No routines in {}", store.path().display());
        return Ok(());
    }
    for routine in routines {
        println!(
            "{}  {:<32} {:>2} steps  {}",
            &routine.id.to_string()[..8],
            routine.title,
            routine.step_count(),
            format_clock(routine.total_duration_secs() as f64),
        );
    }
    Ok(())
}

fn import(store: &mut JsonRoutineStore, path: &Path) -> Result<()> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let draft: RoutineDraft = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse draft {}", path.display()))?;
    let routine = draft.into_routine().context("Draft rejected")?;
    let title = routine.title.clone();
    let id = routine.id;
    store.insert(routine).context("Failed to save routine")?;
    info!(%id, "Imported routine");
    println!("Imported {} ({})", title, id);
    Ok(())
}

fn find_routine(store: &JsonRoutineStore, query: &str) -> Result<Routine> {
    let query = query.trim();
    if query.is_empty() {
        bail!("Routine id or title is empty");
    }
    let routines = store
        .fetch_routines()
        .with_context(|| format!("Failed to read {}", store.path().display()))?;
    let matches: Vec<Routine> = routines
        .into_iter()
        .filter(|r| r.id.to_string().starts_with(query) || r.title.eq_ignore_ascii_case(query))
        .collect();
    match matches.len() {
        0 => bail!("No routine matches '{}'", query),
        1 => Ok(matches.into_iter().next().context("match vanished")?),
        n => bail!("'{}' matches {} routines; use a longer id", query, n),
    }
}

/// A path to a routine or draft file, otherwise a library lookup
fn resolve_routine(store: &JsonRoutineStore, query: &str) -> Result<Routine> {
    let path = Path::new(query);
    if !path.is_file() {
        return find_routine(store, query);
    }
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    if let Ok(routine) = serde_json::from_str::<Routine>(&contents) {
        routine.validate().context("Routine is not playable")?;
        return Ok(routine);
    }
    let draft: RoutineDraft = serde_json::from_str(&contents)
        .with_context(|| format!("{} is neither a routine nor a draft", path.display()))?;
    draft.into_routine().context("Draft rejected")
}

async fn play(
    routine: Routine,
    settings: PlayerSettings,
    feedback: Arc<dyn FeedbackEmitter>,
) -> Result<()> {
    let (delivered_tx, mut delivered) = mpsc::unbounded_channel::<ReminderRequest>();
    let scheduler = if settings.reminders_enabled {
        LocalReminderScheduler::new(delivered_tx)
    } else {
        LocalReminderScheduler::disabled(delivered_tx)
    };
    if let Err(e) = scheduler.request_permission().await {
        warn!("Reminders unavailable: {}", e);
    }
    let (reminders, reminder_worker) = ReminderDispatcher::spawn(Arc::new(scheduler));

    let (event_tx, mut events) = mpsc::unbounded_channel();
    let config = settings.playback_config();
    let view = routine.clone();

    let session = SessionHandle::spawn(move |ticks| {
        let mut engine = PlaybackEngine::new(
            routine,
            config,
            Collaborators {
                clock: Arc::new(SystemClock),
                reminders,
                media: Arc::new(FileMediaPreparer::new()),
                feedback,
                ticks,
            },
        );
        engine.add_observer(Box::new(event_tx));
        engine
    });

    println!("{} ({} steps)", view.title, view.step_count());
    println!("Commands: p pause, r resume, s skip, a refresh, q quit");
    session.start()?;

    let mut status = StatusLine::new(&view);
    let mut input = BufReader::new(tokio::io::stdin()).lines();
    let mut input_open = true;
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                let finished = event == PlaybackEvent::Finished;
                status.render(&event);
                if finished {
                    break;
                }
            }
            Some(reminder) = delivered.recv() => {
                println!("\n* {}: {}", reminder.title, reminder.body);
            }
            line = input.next_line(), if input_open => match line {
                Ok(Some(line)) => {
                    let sent = match line.trim() {
                        "p" => session.pause(),
                        "r" => session.resume(),
                        "s" => session.skip(),
                        "a" => session.app_became_active(),
                        "q" => break,
                        "" => Ok(()),
                        other => {
                            println!("Unknown command '{}'", other);
                            Ok(())
                        }
                    };
                    sent?;
                }
                Ok(None) => input_open = false,
                Err(e) => {
                    warn!("stdin closed: {}", e);
                    input_open = false;
                }
            },
        }
    }

    let snapshot = session.shutdown().await?;
    info!(
        state = ?snapshot.state,
        step = snapshot.current_index,
        "Playback ended"
    );
    reminder_worker
        .await
        .context("Reminder worker panicked")?;
    Ok(())
}

/// Terminal view of a running session
struct StatusLine<'a> {
    routine: &'a Routine,
    index: usize,
}

impl<'a> StatusLine<'a> {
    fn new(routine: &'a Routine) -> Self {
        Self { routine, index: 0 }
    }

    fn line(&self, remaining: f64) -> String {
        let title = self
            .routine
            .step(self.index)
            .map(|s| s.title.as_str())
            .unwrap_or("");
        let done = progress(self.routine, self.index, remaining);
        format!(
            "[{}/{}] {:<24} {}  {:>3.0}%",
            self.index + 1,
            self.routine.step_count(),
            title,
            format_clock(remaining),
            done * 100.0
        )
    }

    fn render(&mut self, event: &PlaybackEvent) {
        match event {
            PlaybackEvent::Started { step_index } => {
                self.index = *step_index;
                let remaining = self
                    .routine
                    .step(self.index)
                    .map(|s| s.duration_secs as f64)
                    .unwrap_or(0.0);
                self.print_step(remaining);
            }
            PlaybackEvent::StepChanged {
                step_index,
                remaining,
            } => {
                self.index = *step_index;
                self.print_step(*remaining);
            }
            PlaybackEvent::Tick { remaining } => print!("\r{}", self.line(*remaining)),
            PlaybackEvent::Paused { remaining } => {
                print!("\r{} (paused)", self.line(*remaining))
            }
            PlaybackEvent::Resumed { remaining } => print!("\r{}         ", self.line(*remaining)),
            PlaybackEvent::Stopped => println!("\nstopped"),
            PlaybackEvent::Finished => println!("\nRoutine complete"),
        }
        let _ = std::io::stdout().flush();
    }

    fn print_step(&self, remaining: f64) {
        if let Some(step) = self.routine.step(self.index) {
            if !step.instructions.is_empty() {
                print!("\n    {}", step.instructions);
            }
            if let Some(visual) = step.visual() {
                print!("\n    {}", visual);
            }
        }
        print!("\n{}", self.line(remaining));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stepwise::core::Step;

    fn store_with(titles: &[&str]) -> (tempfile::TempDir, JsonRoutineStore) {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonRoutineStore::new(dir.path().join("routines.json"));
        for title in titles {
            store
                .insert(Routine::new(*title, "", vec![Step::new("Go", 10, "")]))
                .unwrap();
        }
        (dir, store)
    }

    #[test]
    fn test_blank_query_is_rejected() {
        let (_dir, store) = store_with(&["Morning"]);
        assert!(find_routine(&store, "").is_err());
        assert!(find_routine(&store, "   ").is_err());
    }

    #[test]
    fn test_find_by_title_or_id_prefix() {
        let (_dir, store) = store_with(&["Morning", "Evening"]);
        let morning = find_routine(&store, "morning").unwrap();
        assert_eq!(morning.title, "Morning");

        let prefix = morning.id.to_string()[..8].to_string();
        assert_eq!(find_routine(&store, &prefix).unwrap().id, morning.id);
        assert!(find_routine(&store, "Lunch").is_err());
    }

    #[test]
    fn test_resolve_draft_file() {
        let (dir, store) = store_with(&[]);
        let path = dir.path().join("draft.json");
        std::fs::write(
            &path,
            r#"{"title": "Stretch", "steps": [{"title": "Reach", "duration_secs": 30}]}"#,
        )
        .unwrap();

        let routine = resolve_routine(&store, path.to_str().unwrap()).unwrap();
        assert_eq!(routine.title, "Stretch");
        assert!(routine.steps[0].is_remote);
    }
}
