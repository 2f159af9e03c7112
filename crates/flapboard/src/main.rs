//! `flapboard` - CLI for the shuttle departures board
//!
//! This binary manages the trip schedule, shows the split-flap board and
//! records secondary-course attendance.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::{Local, NaiveDate};
use clap::Parser;
use serde::Serialize;
use tracing::warn;

use flapboard::cli::{
    AiCommand, AttendanceCommand, AuthCommand, BoardCommand, Cli, Command, ConfigCommand,
    CourseCommand, RosterCommand, ScheduleCommand, StudentCommand,
};
use flapboard::live::{subscribe, LiveQuery, RosterQuery, ScheduleQuery};
use flapboard::model::{
    Carrier, CourseId, Day, EntryId, Leg, Place, ScheduleDraft, ScheduleEntry, StudentId,
};
use flapboard::{
    init_logging, ActionOutcome, AttendanceService, AuthGate, BoardView, Config, DocumentStore,
    Error, FilterCriteria, FlapAnimator, IdentityProvider, LocalIdentityProvider, PresenceChange,
    RosterService, ScheduleService, SqliteStore, Stylist,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    let command = match cli.command {
        Command::Config(cmd) => return handle_config(cli.config, cmd, cli.json),
        command => command,
    };

    // Load configuration
    let config = Config::load_from(cli.config)?;
    let app = App::open(config, cli.json)?;

    match command {
        Command::Schedule(cmd) => app.schedule(cmd).await,
        Command::Board(cmd) => app.board(cmd).await,
        Command::Roster(cmd) => app.roster(cmd).await,
        Command::Attendance(cmd) => app.attendance(cmd).await,
        Command::Auth(cmd) => app.auth(cmd).await,
        Command::Ai(cmd) => app.ai(cmd).await,
        Command::Status => app.status().await,
        Command::Config(_) => Ok(()),
    }
}

/// Everything a command needs, opened once per invocation.
#[derive(Debug)]
struct App {
    config: Config,
    json: bool,
    sqlite: Arc<SqliteStore>,
    store: Arc<dyn DocumentStore>,
    identity: Arc<dyn IdentityProvider>,
    gate: AuthGate,
}

impl App {
    fn open(config: Config, json: bool) -> anyhow::Result<Self> {
        let path = config.database_path();
        let sqlite = Arc::new(
            SqliteStore::open(&path)
                .with_context(|| format!("opening board database {}", path.display()))?
                .with_change_buffer(config.store.change_buffer),
        );
        let identity: Arc<dyn IdentityProvider> =
            Arc::new(LocalIdentityProvider::new(Arc::clone(&sqlite)));
        let gate = AuthGate::new(config.auth.require_auth, Arc::clone(&identity));
        let store: Arc<dyn DocumentStore> = sqlite.clone();
        Ok(Self {
            config,
            json,
            sqlite,
            store,
            identity,
            gate,
        })
    }

    fn schedule_service(&self) -> ScheduleService {
        ScheduleService::new(Arc::clone(&self.store), self.gate.clone())
    }

    fn roster_service(&self) -> RosterService {
        RosterService::new(Arc::clone(&self.store), self.gate.clone())
    }

    fn stylist(&self) -> anyhow::Result<Stylist> {
        Ok(Stylist::from_config(&self.config.ai)?)
    }

    /// Report a write. With `--json` the outcome object goes to stdout; the
    /// error, if any, is returned either way so the exit status reflects it.
    fn finish<T>(
        &self,
        result: flapboard::Result<T>,
        outcome: impl FnOnce(&T) -> ActionOutcome,
        human: impl FnOnce(&T),
    ) -> anyhow::Result<()> {
        match &result {
            Ok(value) if self.json => print_json(&outcome(value))?,
            Ok(value) => human(value),
            Err(err) if self.json => print_json(&ActionOutcome::failed(err))?,
            Err(_) => {}
        }
        result.map(|_| ()).map_err(Into::into)
    }

    async fn schedule(&self, cmd: ScheduleCommand) -> anyhow::Result<()> {
        let service = self.schedule_service();
        match cmd {
            ScheduleCommand::List { filter } => {
                let entries = service.list().await?;
                let criteria = filter.apply_to(FilterCriteria::all());
                let visible = flapboard::filter::filter(&entries, &criteria);
                if self.json {
                    print_json(&visible)?;
                } else if visible.is_empty() {
                    println!("No trips.");
                } else {
                    for entry in visible {
                        println!("{}", describe_entry(entry));
                    }
                }
                Ok(())
            }
            ScheduleCommand::Add { trip, draft_notes } => {
                let mut draft = ScheduleDraft::from(trip);
                if draft_notes {
                    let notes = self.stylist()?.draft_notes(&draft.notes_prompt()).await;
                    draft.notes = Some(notes);
                }
                let result = service.upsert(draft).await;
                self.finish(result, |_| ActionOutcome::ok(), |id| {
                    println!("Created trip {id}");
                })
            }
            ScheduleCommand::Edit { id, patch } => {
                let clear = patch.clear.clone();
                let result = match service.get(id).await {
                    Ok(entry) => service.save(patch.merge_into(&entry), &clear).await,
                    Err(e) => Err(e),
                };
                self.finish(result, |_| ActionOutcome::ok(), |id| {
                    println!("Updated trip {id}");
                })
            }
            ScheduleCommand::Remove { id } => {
                let result = service.delete(id).await;
                self.finish(result, |_| ActionOutcome::ok(), |removed| {
                    if *removed {
                        println!("Deleted trip {id}");
                    } else {
                        println!("No trip {id}");
                    }
                })
            }
        }
    }

    async fn board(&self, cmd: BoardCommand) -> anyhow::Result<()> {
        let base = if cmd.today {
            FilterCriteria::for_today(Local::now().date_naive())
        } else {
            FilterCriteria::all()
        };
        let mut board = BoardView::new(cmd.filter.apply_to(base));

        if !cmd.watch {
            board.apply_snapshot(self.store.list_schedule().await?);
            if self.json {
                print_json(&board.render_rows())?;
            } else {
                print!("{}", board.render_text());
            }
            return Ok(());
        }

        let poller = self.sqlite.watch_external_writes(self.config.poll_interval());
        let mut subscription = subscribe(&self.store, ScheduleQuery::default());
        let animator = FlapAnimator::spawn("", self.config.tick_interval());
        let mut frames = animator.frames();
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        loop {
            tokio::select! {
                snapshot = subscription.next() => match snapshot {
                    Some(Ok(entries)) => {
                        board.apply_snapshot(entries);
                        animator.set_text(&board.render_text());
                    }
                    Some(Err(e)) => warn!("Board refresh failed: {}", e),
                    None => break,
                },
                changed = frames.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let text = frames.borrow_and_update().text.clone();
                    let mut stdout = std::io::stdout().lock();
                    write!(stdout, "\x1b[2J\x1b[H{text}")?;
                    stdout.flush()?;
                }
                _ = &mut ctrl_c => break,
            }
        }

        poller.abort();
        Ok(())
    }

    async fn roster(&self, cmd: RosterCommand) -> anyhow::Result<()> {
        let service = self.roster_service();
        match cmd {
            RosterCommand::Course(CourseCommand::Add { name }) => {
                let result = service.create_course(&name).await;
                self.finish(result, |_| ActionOutcome::ok(), |id| {
                    println!("Created course {id}");
                })
            }
            RosterCommand::Course(CourseCommand::Rename { id, name }) => {
                let result = service.rename_course(id, &name).await;
                self.finish(result, |()| ActionOutcome::ok(), |()| {
                    println!("Renamed course {id}");
                })
            }
            RosterCommand::Course(CourseCommand::Remove { id }) => {
                let result = service.delete_course(id).await;
                self.finish(result, |n| ActionOutcome::with_count(*n), |n| {
                    println!("Deleted course {id} and {n} students");
                })
            }
            RosterCommand::Course(CourseCommand::List) => {
                let rosters = RosterQuery.fetch(self.store.as_ref()).await?;
                if self.json {
                    print_json(&rosters)?;
                    return Ok(());
                }
                if rosters.is_empty() {
                    println!("No courses.");
                }
                for roster in rosters {
                    println!(
                        "{:>4}  {} ({} students)",
                        roster.course.id,
                        roster.course.name,
                        roster.students.len()
                    );
                    for student in roster.students {
                        println!("{:>10}  {}", student.id, student.name);
                    }
                }
                Ok(())
            }
            RosterCommand::Student(StudentCommand::Add { course, name }) => {
                let result = service.add_student(course, &name).await;
                self.finish(result, |_| ActionOutcome::ok(), |id| {
                    println!("Added student {id}");
                })
            }
            RosterCommand::Student(StudentCommand::Rename { id, name }) => {
                let result = service.rename_student(id, &name).await;
                self.finish(result, |()| ActionOutcome::ok(), |()| {
                    println!("Renamed student {id}");
                })
            }
            RosterCommand::Student(StudentCommand::Remove { id }) => {
                let result = service.delete_student(id).await;
                self.finish(result, |_| ActionOutcome::ok(), |removed| {
                    if *removed {
                        println!("Deleted student {id}");
                    } else {
                        println!("No student {id}");
                    }
                })
            }
            RosterCommand::Student(StudentCommand::Import { course, file }) => {
                let text = read_roster_text(file)?;
                let result = service.bulk_import_students(course, &text).await;
                self.finish(result, |n| ActionOutcome::with_count(*n), |n| {
                    println!("Imported {n} students into course {course}");
                })
            }
        }
    }

    async fn attendance(&self, cmd: AttendanceCommand) -> anyhow::Result<()> {
        let service = AttendanceService::new(Arc::clone(&self.store), self.gate.clone());
        match cmd {
            AttendanceCommand::Set {
                trip,
                student,
                leg,
                absent,
                date,
            } => {
                let date = date.unwrap_or_else(|| Local::now().date_naive());
                let result = match self.resolve_mark(trip, student).await {
                    Ok(course_id) => {
                        service
                            .set_presence(PresenceChange {
                                student_id: student,
                                course_id,
                                trip_id: trip,
                                date,
                                leg,
                                present: !absent,
                            })
                            .await
                    }
                    Err(e) => Err(e),
                };
                self.finish(result, |_| ActionOutcome::ok(), |outcome| {
                    println!("{date} trip {trip} student {student} {leg}: {outcome}");
                })
            }
            AttendanceCommand::Show { trip, date } => {
                let date = date.unwrap_or_else(|| Local::now().date_naive());
                self.show_attendance(&service, trip, date).await
            }
        }
    }

    /// Check the trip exists and find the student's course.
    async fn resolve_mark(&self, trip: EntryId, student: StudentId) -> flapboard::Result<CourseId> {
        if self.store.get_schedule(trip).await?.is_none() {
            return Err(Error::not_found("courses", trip));
        }
        self.store
            .list_students(None)
            .await?
            .into_iter()
            .find(|s| s.id == student)
            .map(|s| s.course_id)
            .ok_or_else(|| Error::not_found("students", student))
    }

    async fn show_attendance(
        &self,
        service: &AttendanceService,
        trip: EntryId,
        date: NaiveDate,
    ) -> anyhow::Result<()> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Row<'a> {
            student_id: StudentId,
            name: &'a str,
            course: &'a str,
            #[serde(rename = "va")]
            outbound: bool,
            #[serde(rename = "vuelve")]
            return_leg: bool,
        }

        let presence = service.presence_for_trip(date, trip).await?;
        let rosters = RosterQuery.fetch(self.store.as_ref()).await?;
        let presence = &presence;
        let rows: Vec<Row<'_>> = rosters
            .iter()
            .flat_map(|roster| {
                roster.students.iter().map(move |student| {
                    let marks = presence.get(&student.id).copied().unwrap_or_default();
                    Row {
                        student_id: student.id,
                        name: &student.name,
                        course: &roster.course.name,
                        outbound: marks.outbound,
                        return_leg: marks.return_leg,
                    }
                })
            })
            .collect();

        if self.json {
            return print_json(&rows);
        }
        println!("Trip {trip} on {date}");
        let mark = |on: bool| if on { "x" } else { " " };
        for row in rows {
            println!(
                "{:>6}  {:<8} {:<24} {}:[{}] {}:[{}]",
                row.student_id,
                row.course,
                row.name,
                Leg::Outbound,
                mark(row.outbound),
                Leg::Return,
                mark(row.return_leg)
            );
        }
        Ok(())
    }

    async fn auth(&self, cmd: AuthCommand) -> anyhow::Result<()> {
        match cmd {
            AuthCommand::Signup { email, password } => {
                let result = self.identity.sign_up(&email, &password).await;
                self.finish(result, |_| ActionOutcome::ok(), |user| {
                    println!("Signed up and signed in as {}", user.email);
                })
            }
            AuthCommand::Signin { email, password } => {
                let result = self.identity.sign_in(&email, &password).await;
                self.finish(result, |_| ActionOutcome::ok(), |user| {
                    println!("Signed in as {}", user.email);
                })
            }
            AuthCommand::Signout => {
                let result = self.identity.sign_out().await;
                self.finish(result, |()| ActionOutcome::ok(), |()| println!("Signed out"))
            }
            AuthCommand::Whoami => {
                let user = self.identity.current_user().await?;
                if self.json {
                    return print_json(&user);
                }
                match user {
                    Some(user) => println!("{} (id {})", user.email, user.id),
                    None => println!("Not signed in"),
                }
                Ok(())
            }
        }
    }

    async fn status(&self) -> anyhow::Result<()> {
        let stats = self.sqlite.stats()?;
        let user = self.identity.current_user().await?;
        if self.json {
            let status = serde_json::json!({
                "database_path": self.config.database_path(),
                "require_auth": self.gate.is_required(),
                "user": user,
                "counts": stats,
            });
            return print_json(&status);
        }
        println!("flapboard status");
        println!("----------------");
        println!("Database:      {}", self.config.database_path().display());
        println!(
            "Sign-in:       {}",
            if self.gate.is_required() { "required" } else { "optional" }
        );
        println!(
            "User:          {}",
            user.map_or_else(|| "-".to_string(), |u| u.email)
        );
        println!("Trips:         {}", stats.courses);
        println!("Courses:       {}", stats.secondary_courses);
        println!("Students:      {}", stats.students);
        println!("Attendance:    {}", stats.attendance);
        Ok(())
    }

    async fn ai(&self, cmd: AiCommand) -> anyhow::Result<()> {
        let stylist = self.stylist()?;
        match cmd {
            AiCommand::Stylize { text } => {
                println!("{}", stylist.stylize(&text).await);
                Ok(())
            }
            AiCommand::Notes { id, save } => {
                let service = self.schedule_service();
                let entry = service.get(id).await?;
                let notes = stylist.draft_notes(&entry.notes_prompt()).await;
                println!("{notes}");
                if !save {
                    return Ok(());
                }
                let draft = ScheduleDraft {
                    notes: Some(notes),
                    ..ScheduleDraft::from(&entry)
                };
                let result = service.upsert(draft).await;
                self.finish(result, |_| ActionOutcome::ok(), |_| {
                    println!("Saved notes on trip {id}");
                })
            }
        }
    }
}

fn describe_entry(entry: &ScheduleEntry) -> String {
    let opt = |v: Option<&'static str>| v.unwrap_or("-");
    let mut line = format!(
        "{:>4}  {:<9} {:>5}  {:<10} {:<14} {:<7} {:<4} {}",
        entry.id,
        opt(entry.day.map(Day::as_str)),
        entry.time,
        entry.level,
        entry.course_name,
        opt(entry.place.map(Place::as_str)),
        opt(entry.carrier.map(Carrier::as_str)),
        entry.direction,
    );
    if let Some(notes) = &entry.notes {
        line.push_str("  # ");
        line.push_str(notes);
    }
    line
}

fn read_roster_text(file: Option<PathBuf>) -> anyhow::Result<String> {
    match file {
        Some(path) if path.as_os_str() != "-" => std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display())),
        _ => {
            let mut text = String::new();
            std::io::stdin().read_to_string(&mut text)?;
            Ok(text)
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn handle_config(path: Option<PathBuf>, cmd: ConfigCommand, json: bool) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show => {
            let config = Config::load_from(path)?;
            if json {
                return print_json(&config);
            }
            println!("Current Configuration");
            println!("=====================");
            println!();
            println!("[Store]");
            println!("  Database path:      {}", config.database_path().display());
            println!("  Change buffer:      {}", config.store.change_buffer);
            println!("  Poll interval (ms): {}", config.store.poll_interval_ms);
            println!();
            println!("[Auth]");
            println!("  Require sign-in:    {}", config.auth.require_auth);
            println!();
            println!("[Board]");
            println!("  Tick (ms):          {}", config.board.tick_interval_ms);
            println!();
            println!("[AI]");
            println!("  Enabled:            {}", config.ai.enabled);
            println!("  Endpoint:           {}", config.ai.endpoint);
            println!("  Model:              {}", config.ai.model);
            println!(
                "  API key:            {}",
                if config.ai.api_key.is_some() { "set" } else { "not set" }
            );
            println!("  Timeout (ms):       {}", config.ai.timeout_ms);
        }
        ConfigCommand::Path => {
            println!(
                "{}",
                path.unwrap_or_else(Config::default_config_path).display()
            );
        }
        ConfigCommand::Validate { file } => {
            let path = file.or(path).unwrap_or_else(Config::default_config_path);
            let result = Config::load_from(Some(path.clone()));
            if json {
                print_json(&ActionOutcome::from(&result))?;
            } else {
                match &result {
                    Ok(_) => println!("Configuration is valid: {}", path.display()),
                    Err(e) => println!("Configuration error: {e}"),
                }
            }
            result?;
        }
    }
    Ok(())
}
