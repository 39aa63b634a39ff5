//! Command-line client for the Deskmate sync core.
//!
//! # Responsibility
//! - Wire config, logging, the HTTP backend and the snapshot cache into a
//!   `Workspace`.
//! - Expose store operations as subcommands with plain-text output.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use deskmate_core::{
    default_log_level, init_logging, ClientConfig, DueDate, EventDraft, HttpBackend, LoginForm,
    NoteDraft, NotePatch, Priority, RegisterForm, Reminder, SnapshotCache, SyncReport, Table,
    TaskDraft, Workspace,
};
use log::warn;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "deskmate")]
#[command(about = "Notes, tasks, events and shared notebooks from the terminal")]
#[command(version)]
struct Cli {
    /// Base URL of the hosted backend.
    #[arg(long, env = "DESKMATE_URL", global = true)]
    url: Option<String>,
    /// Public anon key of the hosted backend.
    #[arg(long, env = "DESKMATE_ANON_KEY", global = true, hide_env_values = true)]
    anon_key: Option<String>,
    #[arg(long, env = "DESKMATE_EMAIL", global = true)]
    email: Option<String>,
    #[arg(long, env = "DESKMATE_PASSWORD", global = true, hide_env_values = true)]
    password: Option<String>,
    /// SQLite snapshot cache file; omit to run without a cache.
    #[arg(long, env = "DESKMATE_CACHE", global = true)]
    cache: Option<PathBuf>,
    /// Absolute directory for rolling log files.
    #[arg(long, env = "DESKMATE_LOG_DIR", global = true)]
    log_dir: Option<PathBuf>,
    #[arg(long, env = "DESKMATE_LOG_LEVEL", global = true)]
    log_level: Option<String>,
    /// Request timeout in seconds.
    #[arg(long, global = true, default_value_t = 30)]
    timeout_secs: u64,
    /// Show the cached lists instead of fetching them; needs --cache.
    #[arg(long, global = true, requires = "cache")]
    cached: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an account.
    Register {
        #[arg(long)]
        confirm_password: String,
        #[arg(long)]
        name: Option<String>,
    },
    /// Send a password reset e-mail.
    ResetPassword,
    /// Show the signed-in user's profile.
    Whoami,
    Notes {
        #[command(subcommand)]
        command: NotesCommand,
    },
    Tasks {
        #[command(subcommand)]
        command: TasksCommand,
    },
    Events {
        #[command(subcommand)]
        command: EventsCommand,
    },
    Notebooks {
        #[command(subcommand)]
        command: NotebooksCommand,
    },
}

#[derive(Subcommand)]
enum NotesCommand {
    List,
    Add {
        title: String,
        #[arg(default_value = "")]
        content: String,
    },
    Edit {
        id: Uuid,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        content: Option<String>,
    },
    Rm {
        id: Uuid,
    },
    Search {
        query: String,
    },
}

#[derive(Subcommand)]
enum TasksCommand {
    List {
        #[arg(long, default_value_t = false)]
        pending: bool,
    },
    Add {
        title: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, value_enum, default_value_t = PriorityCli::Medium)]
        priority: PriorityCli,
        #[arg(long, value_enum, default_value_t = DueCli::Today)]
        due: DueCli,
        /// Date for `--due custom`, as YYYY-MM-DD.
        #[arg(long)]
        on: Option<NaiveDate>,
        #[arg(long)]
        assign: Option<String>,
    },
    Done {
        id: Uuid,
        /// Mark as not completed instead.
        #[arg(long, default_value_t = false)]
        undo: bool,
    },
    Rm {
        id: Uuid,
    },
}

#[derive(Subcommand)]
enum EventsCommand {
    List,
    Add {
        title: String,
        /// RFC 3339 start time.
        #[arg(long)]
        start: DateTime<Utc>,
        /// RFC 3339 end time.
        #[arg(long)]
        end: DateTime<Utc>,
        #[arg(long, default_value = "")]
        location: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    Rm {
        id: Uuid,
    },
    Upcoming {
        #[arg(long, default_value_t = 5)]
        limit: usize,
    },
}

#[derive(Subcommand)]
enum NotebooksCommand {
    List,
    Create {
        title: String,
    },
    Rm {
        id: Uuid,
    },
    Invite {
        id: Uuid,
        email: String,
    },
    Uninvite {
        id: Uuid,
        user_id: Uuid,
    },
    Write {
        id: Uuid,
        content: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum PriorityCli {
    Low,
    Medium,
    High,
}

impl From<PriorityCli> for Priority {
    fn from(value: PriorityCli) -> Self {
        match value {
            PriorityCli::Low => Self::Low,
            PriorityCli::Medium => Self::Medium,
            PriorityCli::High => Self::High,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum DueCli {
    Today,
    Tomorrow,
    Recurring,
    Custom,
}

impl From<DueCli> for DueDate {
    fn from(value: DueCli) -> Self {
        match value {
            DueCli::Today => Self::Today,
            DueCli::Tomorrow => Self::Tomorrow,
            DueCli::Recurring => Self::Recurring,
            DueCli::Custom => Self::Custom,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    start_logging(&cli)?;

    let url = cli.url.as_deref().context("missing --url / DESKMATE_URL")?;
    let anon_key = cli
        .anon_key
        .as_deref()
        .context("missing --anon-key / DESKMATE_ANON_KEY")?;
    let config = ClientConfig::new(url, anon_key)?
        .with_request_timeout(Duration::from_secs(cli.timeout_secs))?;
    let backend = Arc::new(HttpBackend::new(config)?);
    let cache = match cli.cache.as_ref() {
        Some(path) => Some(Arc::new(SnapshotCache::open(path).with_context(|| {
            format!("cannot open cache at {}", path.display())
        })?)),
        None => None,
    };
    let mut workspace = Workspace::new(backend, cache);

    let email = cli.email.clone().context("missing --email / DESKMATE_EMAIL")?;
    match &cli.command {
        Commands::Register {
            confirm_password,
            name,
        } => {
            let mut form = RegisterForm::new(&email, password(&cli)?, confirm_password);
            if let Some(name) = name {
                form = form.with_name(name);
            }
            let (registration, _) = workspace.register(&form)?;
            match registration.session {
                Some(_) => println!("registered and signed in as {}", registration.user.id),
                None => println!("registered {}; confirm the e-mail to sign in", registration.user.id),
            }
            return Ok(());
        }
        Commands::ResetPassword => {
            workspace.auth_mut().request_password_reset(&email)?;
            println!("password reset e-mail requested");
            return Ok(());
        }
        _ => {}
    }

    workspace.login(&LoginForm::new(&email, password(&cli)?))?;
    if cli.cached {
        note_snapshot_ages(&workspace);
    } else {
        warn_failures(&workspace.reload());
    }
    let outcome = run(&mut workspace, cli.command);
    if let Err(err) = workspace.logout() {
        warn!("event=cli_logout module=cli status=error error={err}");
    }
    outcome
}

fn run(workspace: &mut Workspace, command: Commands) -> Result<()> {
    match command {
        Commands::Register { .. } | Commands::ResetPassword => {
            bail!("command needs no session")
        }
        Commands::Whoami => {
            let profile = workspace.auth_mut().fetch_profile()?;
            println!(
                "{}\t{}\t{}",
                profile.id,
                profile.email,
                profile.name.as_deref().unwrap_or("-")
            );
        }
        Commands::Notes { command } => run_notes(workspace, command)?,
        Commands::Tasks { command } => run_tasks(workspace, command)?,
        Commands::Events { command } => run_events(workspace, command)?,
        Commands::Notebooks { command } => run_notebooks(workspace, command)?,
    }
    Ok(())
}

fn run_notes(workspace: &mut Workspace, command: NotesCommand) -> Result<()> {
    let notes = workspace.notes_mut();
    match command {
        NotesCommand::List => {
            for note in notes.items() {
                println!("{}\t{}", note.id, note.title);
            }
        }
        NotesCommand::Add { title, content } => {
            let note = notes.create(&NoteDraft::new(title, content))?;
            println!("{}", note.id);
        }
        NotesCommand::Edit { id, title, content } => {
            let patch = NotePatch {
                title,
                content,
                ..NotePatch::default()
            };
            let note = notes.update(id, patch)?;
            println!("{}\t{}", note.id, note.title);
        }
        NotesCommand::Rm { id } => notes.delete(id)?,
        NotesCommand::Search { query } => {
            for note in notes.search(&query) {
                println!("{}\t{}", note.id, note.title);
            }
        }
    }
    Ok(())
}

fn run_tasks(workspace: &mut Workspace, command: TasksCommand) -> Result<()> {
    let tasks = workspace.tasks_mut();
    match command {
        TasksCommand::List { pending } => {
            let listed: Vec<_> = if pending {
                tasks.pending()
            } else {
                tasks.items().iter().collect()
            };
            for task in listed {
                let mark = if task.completed { "x" } else { " " };
                println!("[{mark}] {}\t{}\t{:?}", task.id, task.title, task.priority);
            }
        }
        TasksCommand::Add {
            title,
            description,
            priority,
            due,
            on,
            assign,
        } => {
            let draft = TaskDraft {
                description,
                priority: priority.into(),
                due_date: due.into(),
                custom_date: on,
                reminder: Reminder::default(),
                assigned_to: assign,
                ..TaskDraft::new(title)
            };
            let task = tasks.create(&draft)?;
            println!("{}", task.id);
        }
        TasksCommand::Done { id, undo } => {
            tasks.set_completed(id, !undo)?;
        }
        TasksCommand::Rm { id } => tasks.delete(id)?,
    }
    Ok(())
}

fn run_events(workspace: &mut Workspace, command: EventsCommand) -> Result<()> {
    let events = workspace.events_mut();
    match command {
        EventsCommand::List => {
            for event in events.items() {
                println!(
                    "{}\t{}\t{} -> {}",
                    event.id, event.title, event.start_at, event.end_at
                );
            }
        }
        EventsCommand::Add {
            title,
            start,
            end,
            location,
            description,
        } => {
            let draft = EventDraft {
                location,
                description,
                ..EventDraft::new(title, start, end)
            };
            let event = events.create(&draft)?;
            println!("{}", event.id);
        }
        EventsCommand::Rm { id } => events.delete(id)?,
        EventsCommand::Upcoming { limit } => {
            for event in events.upcoming(Utc::now(), limit) {
                println!("{}\t{}\t{}", event.id, event.title, event.start_at);
            }
        }
    }
    Ok(())
}

fn run_notebooks(workspace: &mut Workspace, command: NotebooksCommand) -> Result<()> {
    let notebooks = workspace.notebooks_mut();
    match command {
        NotebooksCommand::List => {
            for notebook in notebooks.items() {
                println!(
                    "{}\t{}\towner\t{} collaborator(s)",
                    notebook.id,
                    notebook.title,
                    notebook.collaborators.len()
                );
            }
            for notebook in notebooks.shared() {
                println!("{}\t{}\tshared", notebook.id, notebook.title);
            }
        }
        NotebooksCommand::Create { title } => {
            let notebook = notebooks.create(&title)?;
            println!("{}", notebook.id);
        }
        NotebooksCommand::Rm { id } => notebooks.delete(id)?,
        NotebooksCommand::Invite { id, email } => {
            let notebook = notebooks.add_collaborator(id, &email)?;
            println!("{} collaborator(s)", notebook.collaborators.len());
        }
        NotebooksCommand::Uninvite { id, user_id } => {
            let notebook = notebooks.remove_collaborator(id, user_id)?;
            println!("{} collaborator(s)", notebook.collaborators.len());
        }
        NotebooksCommand::Write { id, content } => {
            notebooks.save_content(id, &content)?;
        }
    }
    Ok(())
}

fn start_logging(cli: &Cli) -> Result<()> {
    let level = cli.log_level.as_deref().unwrap_or(default_log_level());
    let dir = cli
        .log_dir
        .clone()
        .unwrap_or_else(|| std::env::temp_dir().join("deskmate-logs"));
    init_logging(level, &dir).with_context(|| format!("cannot log to {}", dir.display()))
}

fn password(cli: &Cli) -> Result<&str> {
    cli.password
        .as_deref()
        .context("missing --password / DESKMATE_PASSWORD")
}

fn note_snapshot_ages(workspace: &Workspace) {
    for table in [Table::Notes, Table::Tasks, Table::Events, Table::SharedNotebooks] {
        match workspace.cached_at(table) {
            Some(saved_at) => eprintln!("{table}: cached at {}", saved_at.to_rfc3339()),
            None => eprintln!("{table}: no cached copy"),
        }
    }
}

fn warn_failures(report: &SyncReport) {
    for (table, err) in &report.failures {
        eprintln!("warning: could not load {table}: {err}");
    }
}
