use std::time::Duration;

use anyhow::Context;
use chrono::{Local, NaiveDate, NaiveTime};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use campus_core::config::CampusConfig;
use campus_core::store::StoreError;
use campus_core::types::{format_clock, parse_clock};
use campus_core::{Enrollee, ScheduleError, Target, TargetType, Weekday};
use campus_shifts::{
    date_columns, BindRequest, NewShiftTemplate, RangeRequest, ShiftTemplate, TemplateStatus,
};
use campus_timetable::{LiveScheduleClock, LiveSnapshot, NewTimeTable, SlotDraft, TimeTable};

mod app;

use app::App;

#[derive(Parser)]
#[command(name = "campusctl", version, about = "Shift rosters and weekly timetables")]
struct Cli {
    /// Config file (defaults to $CAMPUS_CONFIG, then ~/.campus/campus.toml)
    #[arg(long, global = true)]
    config: Option<String>,
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage shift templates
    Templates {
        #[command(subcommand)]
        action: TemplateCmd,
    },
    /// Manage shift categories
    Categories {
        #[command(subcommand)]
        action: CategoryCmd,
    },
    /// Put a shift on one roster cell
    Bind {
        target: String,
        date: NaiveDate,
        shift: String,
        #[arg(long = "type", default_value = "class")]
        target_type: TargetType,
    },
    /// Clear one roster cell
    Unbind { target: String, date: NaiveDate },
    /// Assign a shift over an inclusive date range
    AssignRange {
        target: String,
        shift: String,
        #[arg(long)]
        from: NaiveDate,
        #[arg(long)]
        to: NaiveDate,
        #[arg(long = "type", default_value = "class")]
        target_type: TargetType,
    },
    /// Show the assignment covering a target on a date
    Resolve { target: String, date: NaiveDate },
    /// Print the roster grid for some targets
    Roster {
        #[arg(required = true)]
        targets: Vec<String>,
        /// First date column (defaults to today)
        #[arg(long)]
        from: Option<NaiveDate>,
        /// Number of date columns (defaults to roster.default_days)
        #[arg(long)]
        days: Option<u32>,
    },
    /// Manage timetables
    Timetable {
        #[command(subcommand)]
        action: TimetableCmd,
    },
    /// Current and next period of a timetable
    Now {
        timetable: String,
        /// Re-render every clock.refresh_secs until Ctrl-C
        #[arg(long)]
        watch: bool,
    },
}

#[derive(Subcommand)]
enum TemplateCmd {
    List {
        /// Hide Draft templates
        #[arg(long)]
        active: bool,
    },
    Add {
        label: String,
        #[arg(long, value_parser = clock_arg)]
        start: NaiveTime,
        #[arg(long, value_parser = clock_arg)]
        end: NaiveTime,
        #[arg(long, default_value_t = 0)]
        grace: i32,
        #[arg(long, default_value = "")]
        category: String,
        #[arg(long)]
        draft: bool,
    },
    Update {
        id: String,
        #[arg(long)]
        label: Option<String>,
        #[arg(long, value_parser = clock_arg)]
        start: Option<NaiveTime>,
        #[arg(long, value_parser = clock_arg)]
        end: Option<NaiveTime>,
        #[arg(long)]
        grace: Option<i32>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        status: Option<TemplateStatus>,
    },
    /// Move a template to Draft
    Decommission { id: String },
    Delete { id: String },
}

#[derive(Subcommand)]
enum CategoryCmd {
    List,
    Add {
        label: String,
        #[arg(long, default_value = "#9e9e9e")]
        color: String,
    },
    Delete { id: String },
}

#[derive(Subcommand)]
enum TimetableCmd {
    List,
    Create {
        label: String,
        #[arg(long)]
        shift: String,
        /// Class key (`Rose:1,2`) or user id
        #[arg(long)]
        target: String,
        #[arg(long = "type", default_value = "class")]
        target_type: TargetType,
    },
    Show { id: String },
    AddSlot {
        id: String,
        subject: String,
        #[arg(long)]
        day: Weekday,
        #[arg(long, value_parser = clock_arg)]
        start: NaiveTime,
        #[arg(long, value_parser = clock_arg)]
        end: NaiveTime,
        #[arg(long)]
        room: Option<String>,
        #[arg(long)]
        faculty: Option<String>,
    },
    RemoveSlot { id: String, slot_id: String },
    Decommission { id: String },
    /// Find the timetable governing a person
    For {
        id: String,
        #[arg(long)]
        class: Option<String>,
        #[arg(long)]
        grade: Option<String>,
        #[arg(long)]
        designation: Option<String>,
    },
}

fn clock_arg(s: &str) -> Result<NaiveTime, String> {
    parse_clock(s).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "campusctl=info,campus_shifts=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // config: --config > CAMPUS_CONFIG env > ~/.campus/campus.toml
    let config_path = cli.config.clone().or_else(|| std::env::var("CAMPUS_CONFIG").ok());
    let config = CampusConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        CampusConfig::default()
    });

    let app = App::open(config)?;
    if let Err(e) = run(&app, cli.cmd).await {
        if let Some(patch) = schema_patch(&e) {
            eprintln!("The database schema is out of date. Apply:\n\n    {patch}\n");
        }
        return Err(e);
    }
    Ok(())
}

fn schema_patch(err: &anyhow::Error) -> Option<String> {
    let store_err = match err.downcast_ref::<ScheduleError>() {
        Some(ScheduleError::Store(e)) => e,
        _ => err.downcast_ref::<StoreError>()?,
    };
    store_err.schema_patch().map(String::from)
}

async fn run(app: &App, cmd: Commands) -> anyhow::Result<()> {
    let actor = &app.actor;
    match cmd {
        Commands::Templates { action } => templates(app, action)?,
        Commands::Categories { action } => match action {
            CategoryCmd::List => {
                for c in app.registry.list_categories()? {
                    println!("{}  {:<20} {}", c.id, c.label, c.color);
                }
            }
            CategoryCmd::Add { label, color } => {
                let c = app.registry.create_category(actor, &label, &color)?;
                println!("{}", c.id);
            }
            CategoryCmd::Delete { id } => app.registry.delete_category(actor, &id)?,
        },
        Commands::Bind {
            target,
            date,
            shift,
            target_type,
        } => {
            let a = app.resolver.bind(
                actor,
                BindRequest {
                    target_id: target,
                    target_type,
                    date,
                    shift_id: shift,
                },
            )?;
            println!("{}", a.id);
        }
        Commands::Unbind { target, date } => match app.resolver.unbind(actor, &target, date)? {
            Some(a) => println!("removed {}", a.id),
            None => println!("nothing bound"),
        },
        Commands::AssignRange {
            target,
            shift,
            from,
            to,
            target_type,
        } => {
            let a = app.resolver.assign_range(
                actor,
                RangeRequest {
                    target_id: target,
                    target_type,
                    start_date: from,
                    end_date: to,
                    shift_id: shift,
                },
            )?;
            println!("{}", a.id);
        }
        Commands::Resolve { target, date } => match app.resolver.resolve(&target, date)? {
            Some(a) => {
                let label = app
                    .registry
                    .get(&a.shift_id)?
                    .map(|t| t.label)
                    .unwrap_or_else(|| a.shift_id.clone());
                println!("{label}  (assignment {})", a.id);
            }
            None => println!("-"),
        },
        Commands::Roster {
            targets,
            from,
            days,
        } => {
            let start = from.unwrap_or_else(|| Local::now().date_naive());
            let dates = date_columns(start, days.unwrap_or(app.config.roster.default_days));
            let grid = app.resolver.roster(&targets, &dates)?;
            print!("{:<16}", "");
            for d in &grid.dates {
                print!(" {:<12}", d.format("%a %m-%d").to_string());
            }
            println!();
            for row in &grid.rows {
                print!("{:<16}", row.target_id);
                for cell in &row.cells {
                    let label = cell.shift.as_ref().map_or("-", |s| s.label.as_str());
                    print!(" {:<12}", label);
                }
                println!();
            }
        }
        Commands::Timetable { action } => timetable(app, action)?,
        Commands::Now { timetable, watch } => now(app, &timetable, watch).await?,
    }
    Ok(())
}

fn templates(app: &App, action: TemplateCmd) -> anyhow::Result<()> {
    let actor = &app.actor;
    match action {
        TemplateCmd::List { active } => {
            let list = if active {
                app.registry.list_active()?
            } else {
                app.registry.list()?
            };
            for t in list {
                print_template(&t);
            }
        }
        TemplateCmd::Add {
            label,
            start,
            end,
            grace,
            category,
            draft,
        } => {
            let t = app.registry.create(
                actor,
                NewShiftTemplate {
                    label,
                    start_time: start,
                    end_time: end,
                    grace_period_mins: grace,
                    category,
                    status: if draft {
                        TemplateStatus::Draft
                    } else {
                        TemplateStatus::Active
                    },
                },
            )?;
            print_template(&t);
        }
        TemplateCmd::Update {
            id,
            label,
            start,
            end,
            grace,
            category,
            status,
        } => {
            let mut t = app
                .registry
                .get(&id)?
                .ok_or_else(|| ScheduleError::NotFound {
                    kind: "Shift template",
                    id: id.clone(),
                })?;
            if let Some(v) = label {
                t.label = v;
            }
            if let Some(v) = start {
                t.start_time = v;
            }
            if let Some(v) = end {
                t.end_time = v;
            }
            if let Some(v) = grace {
                t.grace_period_mins = v;
            }
            if let Some(v) = category {
                t.category = v;
            }
            if let Some(v) = status {
                t.status = v;
            }
            print_template(&app.registry.update(actor, t)?);
        }
        TemplateCmd::Decommission { id } => print_template(&app.registry.decommission(actor, &id)?),
        TemplateCmd::Delete { id } => {
            app.registry.delete(actor, &id)?;
            info!(template_id = %id, "deleted");
        }
    }
    Ok(())
}

fn print_template(t: &ShiftTemplate) {
    println!(
        "{}  {:<16} {}-{}{}  grace {}m  {:<10} {}",
        t.id,
        t.label,
        format_clock(t.start_time),
        format_clock(t.end_time),
        if t.is_overnight() { " (+1d)" } else { "" },
        t.grace_period_mins,
        t.category,
        t.status,
    );
}

fn timetable(app: &App, action: TimetableCmd) -> anyhow::Result<()> {
    let actor = &app.actor;
    match action {
        TimetableCmd::List => {
            for t in app.timetables.list()? {
                println!(
                    "{}  {:<20} {:<24} {} slot(s)  {}",
                    t.id,
                    t.label,
                    t.target.to_string(),
                    t.content.len(),
                    t.status
                );
            }
        }
        TimetableCmd::Create {
            label,
            shift,
            target,
            target_type,
        } => {
            let t = app.timetables.create(
                actor,
                NewTimeTable {
                    label,
                    shift_id: shift,
                    target: Target::parse_legacy(&target, target_type)?,
                    status: Default::default(),
                },
            )?;
            println!("{}", t.id);
        }
        TimetableCmd::Show { id } => {
            let t = app
                .timetables
                .get(&id)?
                .with_context(|| format!("timetable {id} not found"))?;
            print_timetable(&t);
        }
        TimetableCmd::AddSlot {
            id,
            subject,
            day,
            start,
            end,
            room,
            faculty,
        } => {
            let mut form = app.timetables.open(&id)?;
            let mut draft = SlotDraft::new(subject, day, start, end);
            draft.room = room;
            draft.faculty_id = faculty;
            let slot_id = form.add_slot(draft.clone()).id.clone();
            form.save_slot(&slot_id, draft)?;
            app.timetables.commit(actor, &mut form)?;
            println!("{slot_id}");
        }
        TimetableCmd::RemoveSlot { id, slot_id } => {
            let mut form = app.timetables.open(&id)?;
            form.remove_slot(&slot_id)?;
            app.timetables.commit(actor, &mut form)?;
        }
        TimetableCmd::Decommission { id } => {
            app.timetables.decommission(actor, &id)?;
        }
        TimetableCmd::For {
            id,
            class,
            grade,
            designation,
        } => {
            let enrollee = Enrollee {
                id,
                class_name: class,
                grade,
                designation,
            };
            match app.timetables.timetable_for(&enrollee)? {
                Some(t) => print_timetable(&t),
                None => println!("no timetable"),
            }
        }
    }
    Ok(())
}

fn print_timetable(t: &TimeTable) {
    println!("{}  {}  [{}]  {}", t.id, t.label, t.target, t.status);
    for day in Weekday::ALL {
        let mut slots: Vec<_> = t.slots_on(day).collect();
        if slots.is_empty() {
            continue;
        }
        slots.sort_by_key(|s| s.start_time);
        println!("  {day}");
        for s in slots {
            println!(
                "    {}-{}  {:<16} {:<8} {}",
                format_clock(s.start_time),
                format_clock(s.end_time),
                s.subject,
                s.room.as_deref().unwrap_or(""),
                s.id
            );
        }
    }
}

async fn now(app: &App, id: &str, watch: bool) -> anyhow::Result<()> {
    let clock = LiveScheduleClock::default();
    let load = || -> anyhow::Result<TimeTable> {
        app.timetables
            .get(id)?
            .with_context(|| format!("timetable {id} not found"))
    };

    if !watch {
        print_snapshot(&clock.snapshot(&load()?));
        return Ok(());
    }

    let every = Duration::from_secs(app.config.clock.refresh_secs.max(1));
    let mut interval = tokio::time::interval(every);
    info!(refresh_secs = every.as_secs(), "watching timetable; Ctrl-C to stop");
    loop {
        tokio::select! {
            _ = interval.tick() => {
                // reload each tick so edits made elsewhere show up
                print_snapshot(&clock.snapshot(&load()?));
            }
            _ = tokio::signal::ctrl_c() => {
                info!("watch stopped");
                return Ok(());
            }
        }
    }
}

fn print_snapshot(s: &LiveSnapshot) {
    println!("{} {}", s.day, s.at);
    match &s.current {
        Some(p) => println!(
            "  now:  {} {}-{} {} ({}m left)",
            p.subject,
            p.start,
            p.end,
            p.room.as_deref().unwrap_or(""),
            p.minutes
        ),
        None => println!("  now:  -"),
    }
    match &s.upcoming {
        Some(p) => println!("  next: {} at {} (in {}m)", p.subject, p.start, p.minutes),
        None => println!("  next: -"),
    }
}
