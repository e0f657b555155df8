#![forbid(unsafe_code)]

use std::process::ExitCode;

use anyhow::Context as _;
use clap::{CommandFactory as _, Parser, Subcommand};
use crossterm::style::Color;
use time::format_description::OwnedFormatItem;
use time::{OffsetDateTime, UtcOffset};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::config::context::{Context, ContextStore, JsonContextStore};
use crate::config::{self, Config};
use crate::flow::FlowStore;
use crate::output::is_tty;
use crate::output::table::Table;
use crate::task::duration::{Validity, format_remaining, parse_duration};
use crate::task::manager::TaskManager;
use crate::task::model::{Task, TaskStatus, normalize_group};
use crate::task::storage::JsonTaskStorage;

#[derive(Debug, Parser)]
#[command(
    name = "taskgo",
    version,
    about = "Task list with groups and self-expiring tasks"
)]
pub struct Cli {
    /// Log debug details to stderr
    #[arg(long = "verbose", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Add a new task
    Add(AddArgs),
    /// List tasks grouped by group
    #[command(alias = "ls")]
    List(ListArgs),
    /// Update task status (todo, in-progress, completed)
    Update(UpdateArgs),
    /// Edit a task's title or validity, or a whole group's validity
    Edit(EditArgs),
    /// Remove a task by ID, or every task in the current group with `all`
    #[command(alias = "rm")]
    Remove(RemoveArgs),
    /// Show the current group, set a group's default validity, or list groups
    Group(GroupArgs),
    /// Switch the active task group
    Checkout(CheckoutArgs),
    /// Remove expired tasks now
    Cleanup,
    /// Manage saved work flows and their resources
    Flow(FlowArgs),
    Config(ConfigArgs),
    Completion(CompletionArgs),
    Version,
}

#[derive(Debug, Parser)]
pub struct AddArgs {
    /// Task title; a leading duration such as `2h` is taken as the validity
    #[arg(required = true, num_args = 1..)]
    pub words: Vec<String>,
    /// Group for the task (defaults to the current group)
    #[arg(short = 'g', long = "group")]
    pub group: Option<String>,
    /// Validity duration (e.g. 1h, 30m, 1h30m, none)
    #[arg(short = 'v', long = "validity")]
    pub validity: Option<String>,
}

#[derive(Debug, Parser)]
pub struct ListArgs {
    /// Only show tasks of this group
    #[arg(short = 'g', long = "group")]
    pub group: Option<String>,
    /// Output in JSON format
    #[arg(long = "json", conflicts_with = "csv")]
    pub json: bool,
    /// Output as CSV
    #[arg(long = "csv")]
    pub csv: bool,
}

#[derive(Debug, Parser)]
pub struct UpdateArgs {
    pub id: u64,
    pub status: String,
}

#[derive(Debug, Parser)]
#[command(after_help = "Examples:
  taskgo edit 1 New task title          # rename
  taskgo edit 1 --validity 2h           # reset validity
  taskgo edit 1 --validity none         # never expire
  taskgo edit --group work --validity 4h")]
pub struct EditArgs {
    pub id: Option<u64>,
    /// New title
    pub title: Vec<String>,
    /// Set or update validity duration (use 'none' to remove)
    #[arg(short = 'v', long = "validity")]
    pub validity: Option<String>,
    /// Edit a group's validity instead of a task
    #[arg(short = 'g', long = "group", conflicts_with = "id")]
    pub group: Option<String>,
}

#[derive(Debug, Parser)]
pub struct RemoveArgs {
    /// Task ID, or `all` / `*` for the current group
    pub target: String,
}

#[derive(Debug, Parser)]
#[command(args_conflicts_with_subcommands = true)]
pub struct GroupArgs {
    #[command(subcommand)]
    pub cmd: Option<GroupCmd>,
    /// `NAME` or `VALIDITY NAME`
    #[arg(num_args = 0..=2)]
    pub args: Vec<String>,
    /// Default validity for new tasks in the group
    #[arg(short = 'v', long = "validity")]
    pub validity: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum GroupCmd {
    /// List all task groups
    List,
}

#[derive(Debug, Parser)]
pub struct CheckoutArgs {
    pub group: String,
}

#[derive(Debug, Parser)]
pub struct FlowArgs {
    #[command(subcommand)]
    pub cmd: FlowCmd,
}

#[derive(Debug, Subcommand)]
pub enum FlowCmd {
    /// Create a new, empty flow
    Create { name: String },
    /// Add resources (links or app names) to a flow
    Add {
        name: String,
        #[arg(required = true, num_args = 1..)]
        resources: Vec<String>,
    },
    /// Show a flow's resources
    Show { name: String },
    /// List all flows
    List,
}

#[derive(Debug, Parser)]
pub struct CompletionArgs {
    pub shell: clap_complete::Shell,
}

#[derive(Debug, Parser)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub cmd: ConfigCmd,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCmd {
    List,
    Set(ConfigSetArgs),
    Get(ConfigGetArgs),
}

#[derive(Debug, Parser)]
pub struct ConfigSetArgs {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Parser)]
pub struct ConfigGetArgs {
    pub key: String,
}

/// Everything a command needs, built once per invocation.
pub struct App {
    pub cfg: Config,
    pub tasks: TaskManager<JsonTaskStorage>,
    pub contexts: JsonContextStore,
    pub flows: FlowStore,
}

impl App {
    pub fn open(cfg: Config) -> anyhow::Result<Self> {
        let tasks = TaskManager::new(JsonTaskStorage::new(cfg.tasks_path()?));
        let contexts = JsonContextStore::new(cfg.context_path()?);
        let flows = FlowStore::new(cfg.flows_path()?);
        Ok(Self {
            cfg,
            tasks,
            contexts,
            flows,
        })
    }

    fn context(&self) -> anyhow::Result<Context> {
        Ok(self.contexts.load()?)
    }

    fn save_context(&self, ctx: &Context) -> anyhow::Result<()> {
        Ok(self.contexts.save(ctx)?)
    }

    fn colored(&self) -> bool {
        self.cfg.ui.color && is_tty()
    }
}

pub fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::from(1)
        }
    }
}

fn init_logging(verbose: bool) {
    let fallback = if verbose { "taskgo=debug" } else { "warn" };
    let filter = EnvFilter::try_from_env("TASKGO_LOG").unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::IsTerminal::is_terminal(&std::io::stderr()))
        .without_time()
        .try_init();
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    match cli.cmd {
        Commands::Completion(args) => {
            let mut cmd = Cli::command();
            clap_complete::generate(args.shell, &mut cmd, "taskgo", &mut std::io::stdout());
        }
        Commands::Version => cmd_version(),
        Commands::Config(args) => cmd_config(args)?,
        Commands::Add(args) => cmd_add(&open_app()?, args)?,
        Commands::List(args) => cmd_list(&open_app()?, &args)?,
        Commands::Update(args) => cmd_update(&open_app()?, &args)?,
        Commands::Edit(args) => cmd_edit(&open_app()?, args)?,
        Commands::Remove(args) => cmd_remove(&open_app()?, &args)?,
        Commands::Group(args) => cmd_group(&open_app()?, args)?,
        Commands::Checkout(args) => cmd_checkout(&open_app()?, &args)?,
        Commands::Cleanup => cmd_cleanup(&open_app()?)?,
        Commands::Flow(args) => cmd_flow(&open_app()?, args)?,
    }
    Ok(ExitCode::SUCCESS)
}

fn open_app() -> anyhow::Result<App> {
    let (cfg, paths) = config::load()?;
    debug!(config = %paths.config_file.display(), "configuration loaded");
    App::open(cfg)
}

fn cmd_config(args: ConfigArgs) -> anyhow::Result<()> {
    match args.cmd {
        ConfigCmd::List => {
            print!("{}", config::list_resolved_toml()?);
        }
        ConfigCmd::Set(set) => {
            config::set_value_string(&set.key, &set.value)?;
            println!("Set {} = {}", set.key, set.value);
        }
        ConfigCmd::Get(get) => match config::get_value_string(&get.key)? {
            Some(v) => println!("{v}"),
            None => anyhow::bail!(
                "configuration key '{}' not found - use 'taskgo config list' to see available keys",
                get.key
            ),
        },
    }
    Ok(())
}

/// Splits `add` words into (validity, title), honouring a leading duration.
fn split_add_words(words: &[String], validity: Option<String>) -> (String, String) {
    if validity.is_none()
        && words.len() > 1
        && parse_duration(&words[0]).is_ok()
    {
        return (words[0].clone(), words[1..].join(" "));
    }
    (validity.unwrap_or_default(), words.join(" "))
}

fn cmd_add(app: &App, args: AddArgs) -> anyhow::Result<()> {
    let ctx = app.context()?;
    let group = args
        .group
        .filter(|g| !g.trim().is_empty())
        .unwrap_or_else(|| ctx.current_group.clone());
    let (validity, title) = split_add_words(&args.words, args.validity);

    let task = app
        .tasks
        .add(&title, &group, &validity, &ctx)
        .context("failed to add task")?;

    println!("Task {} added to '{}'.", task.id, task.group_name());
    if let Some(until) = task.valid_until {
        println!("Expires in {}.", format_remaining(until - task.created_at));
    }
    Ok(())
}

fn cmd_list(app: &App, args: &ListArgs) -> anyhow::Result<()> {
    let mut tasks = app.tasks.list().context("failed to list tasks")?;
    if let Some(group) = args.group.as_deref() {
        let want = normalize_group(group);
        tasks.retain(|t| t.group_name() == want);
    }

    if args.json {
        let mut s = serde_json::to_string_pretty(&tasks)?;
        s.push('\n');
        print!("{s}");
        return Ok(());
    }

    if args.csv {
        let mut t = Table::new([
            "id",
            "title",
            "group",
            "status",
            "created_at",
            "completed_at",
            "valid_until",
        ]);
        for task in &tasks {
            t.row([
                task.id.to_string(),
                task.title.clone(),
                task.group_name().to_owned(),
                task.status.to_string(),
                rfc3339(task.created_at),
                task.completed_at.map(rfc3339).unwrap_or_default(),
                task.valid_until.map(rfc3339).unwrap_or_default(),
            ]);
        }
        t.write_csv()?;
        return Ok(());
    }

    if tasks.is_empty() {
        println!("No tasks found.");
        return Ok(());
    }

    let fmt = time::format_description::parse_owned::<1>(&app.cfg.ui.time_format)
        .context("invalid ui.time_format")?;
    let now = app.tasks.now();

    let mut groups: Vec<&str> = Vec::new();
    for task in &tasks {
        if !groups.contains(&task.group_name()) {
            groups.push(task.group_name());
        }
    }

    for group in groups {
        println!("├── {group}");
        let mut t = Table::new(["ID", "TITLE", "STATUS", "CREATED", "COMPLETED", "VALID FOR"])
            .colored(app.colored());
        for task in tasks.iter().filter(|t| t.group_name() == group) {
            let id = if app.cfg.ui.icons {
                format!("{} {}", status_icon(task.status), task.id)
            } else {
                task.id.to_string()
            };
            t.row_colored(
                [
                    id,
                    task.title.clone(),
                    status_label(task.status).to_owned(),
                    local_time(task.created_at, &fmt),
                    task.completed_at
                        .map(|c| local_time(c, &fmt))
                        .unwrap_or_default(),
                    valid_for(task, now),
                ],
                status_color(task.status),
            );
        }
        t.print()?;
        println!("│");
    }
    Ok(())
}

fn cmd_update(app: &App, args: &UpdateArgs) -> anyhow::Result<()> {
    let status: TaskStatus = args.status.parse()?;
    let task = app
        .tasks
        .update(args.id, status)
        .context("failed to update task")?;
    println!("Task {} is now {}.", task.id, status_label(task.status));
    Ok(())
}

fn cmd_edit(app: &App, args: EditArgs) -> anyhow::Result<()> {
    if let Some(group) = args.group.as_deref() {
        let Some(raw) = args.validity.as_deref() else {
            anyhow::bail!("please specify --validity when editing a group");
        };
        let mut ctx = app.context()?;
        let validity = ctx.set_policy(group, raw)?;

        let touched = app
            .tasks
            .update_group_validity(group, raw)
            .context("failed to update group tasks")?;
        app.save_context(&ctx)?;

        let group = normalize_group(group);
        match validity {
            Validity::Clear => {
                println!("Removed validity for group '{group}' and its {touched} task(s).");
            }
            Validity::For(_) => {
                println!(
                    "Group '{group}' validity set to {} for {touched} existing and all future tasks.",
                    raw.trim()
                );
            }
        }
        return Ok(());
    }

    let Some(id) = args.id else {
        anyhow::bail!("please specify a task ID or use --group");
    };

    if let Some(raw) = args.validity.as_deref() {
        let task = app
            .tasks
            .update_validity(id, raw)
            .context("failed to update task validity")?;
        match task.valid_until {
            None => println!("Task {id} no longer expires."),
            Some(_) => println!("Task {id} validity set to {}.", raw.trim()),
        }
        return Ok(());
    }

    if args.title.is_empty() {
        anyhow::bail!("please specify a new title or use --validity");
    }
    app.tasks
        .update_title(id, &args.title.join(" "))
        .context("failed to edit task")?;
    println!("Task {id} renamed.");
    Ok(())
}

fn cmd_remove(app: &App, args: &RemoveArgs) -> anyhow::Result<()> {
    let target = args.target.trim();
    if target == "*" || target.eq_ignore_ascii_case("all") {
        let ctx = app.context()?;
        let group = ctx.current_group_name();
        let removed = app
            .tasks
            .remove_by_group(group)
            .context("failed to remove tasks")?;
        println!("Removed {removed} task(s) in group '{group}'.");
        return Ok(());
    }

    let id: u64 = target
        .parse()
        .with_context(|| format!("invalid task ID '{target}'"))?;
    let task = app.tasks.remove(id).context("failed to remove task")?;
    println!("Task {} removed: {}", task.id, task.title);
    Ok(())
}

fn cmd_group(app: &App, args: GroupArgs) -> anyhow::Result<()> {
    if let Some(GroupCmd::List) = args.cmd {
        let groups = app.tasks.groups().context("failed to list groups")?;
        if groups.is_empty() {
            println!("No groups found.");
            return Ok(());
        }
        let ctx = app.context()?;
        let current = ctx.current_group_name();
        println!("Task Groups");
        for g in groups {
            let marker = if g == current { "*" } else { "-" };
            println!("{marker} {g}");
        }
        return Ok(());
    }

    let mut ctx = app.context()?;
    let (name, positional) = match args.args.as_slice() {
        [] => {
            let current = ctx.current_group_name();
            match ctx.validity_for(current) {
                Some(v) => println!("Current group: {current} (validity {v})"),
                None => println!("Current group: {current}"),
            }
            return Ok(());
        }
        [first, second] if parse_duration(first).is_ok() => (second.clone(), Some(first.clone())),
        [name, ..] => (name.clone(), None),
    };

    let Some(raw) = positional.or(args.validity) else {
        println!("Group '{}' is ready to use.", normalize_group(&name));
        return Ok(());
    };

    let validity = ctx.set_policy(&name, &raw)?;
    app.save_context(&ctx)?;
    let group = normalize_group(&name);
    match validity {
        Validity::Clear => println!("Group '{group}' tasks no longer expire by default."),
        Validity::For(_) => println!("Group '{group}' validity set to {}.", raw.trim()),
    }
    Ok(())
}

fn cmd_checkout(app: &App, args: &CheckoutArgs) -> anyhow::Result<()> {
    let mut ctx = app.context()?;
    ctx.checkout(&args.group);
    app.save_context(&ctx)?;
    println!("Switched to group '{}'.", ctx.current_group_name());
    Ok(())
}

fn cmd_cleanup(app: &App) -> anyhow::Result<()> {
    let removed = app
        .tasks
        .cleanup_expired()
        .context("failed to clean up expired tasks")?;
    if removed == 0 {
        println!("No expired tasks.");
    } else {
        println!("Removed {removed} expired task(s).");
    }
    Ok(())
}

fn cmd_flow(app: &App, args: FlowArgs) -> anyhow::Result<()> {
    match args.cmd {
        FlowCmd::Create { name } => {
            let flow = app.flows.create(&name).context("failed to create flow")?;
            println!("Flow '{}' created.", flow.name);
        }
        FlowCmd::Add { name, resources } => {
            let added = resources.iter().filter(|r| !r.trim().is_empty()).count();
            let flow = app
                .flows
                .add_resources(&name, &resources)
                .context("failed to add resources")?;
            println!("Added {added} resource(s) to flow '{}'.", flow.name);
        }
        FlowCmd::Show { name } => {
            let flow = app.flows.get(&name)?;
            println!("Flow '{}'", flow.name);
            if flow.resources.is_empty() {
                println!("  (no resources)");
            }
            for res in &flow.resources {
                println!("- {res}");
            }
        }
        FlowCmd::List => {
            let names = app.flows.list()?;
            if names.is_empty() {
                println!("No flows found. Create one with 'taskgo flow create <name>'.");
                return Ok(());
            }
            println!("Flows");
            for name in names {
                println!("- {name}");
            }
        }
    }
    Ok(())
}

fn cmd_version() {
    println!("taskgo version {}", env!("CARGO_PKG_VERSION"));
    println!("  rust: {}", rustc_version_runtime::version());
    println!(
        "  os/arch: {}/{}",
        std::env::consts::OS,
        std::env::consts::ARCH
    );
}

fn status_icon(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Todo => "○",
        TaskStatus::InProgress => "●",
        TaskStatus::Completed => "✓",
    }
}

fn status_label(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Todo => "pending",
        other => other.as_str(),
    }
}

fn status_color(status: TaskStatus) -> Color {
    match status {
        TaskStatus::Todo => Color::DarkYellow,
        TaskStatus::InProgress => Color::Cyan,
        TaskStatus::Completed => Color::Green,
    }
}

fn valid_for(task: &Task, now: OffsetDateTime) -> String {
    match task.valid_until {
        None => String::new(),
        Some(until) if until > now => format_remaining(until - now),
        Some(_) => "expired".to_owned(),
    }
}

fn local_time(t: OffsetDateTime, fmt: &OwnedFormatItem) -> String {
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    t.to_offset(offset)
        .format(fmt)
        .unwrap_or_else(|_| rfc3339(t))
}

fn rfc3339(t: OffsetDateTime) -> String {
    t.format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "unknown".to_owned())
}
