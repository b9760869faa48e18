mod adapters;
mod bootstrap;
mod config;
mod error;
mod global;
mod grant;
mod journal;
mod lifecycle;
mod migrate;
mod paths;
mod poller;
mod process;
mod project;
mod provision;
mod session;
mod setup;
#[cfg(test)]
mod testing;
mod ui;

use crate::bootstrap::{
    LaravelDatabase, LaravelOptions, StarterKit, TestFramework, BREEZE_STACKS, JETSTREAM_STACKS,
};
use crate::config::{read_config, resolve_config_path, Config};
use crate::error::{ProcessErrorDetails, RicolError};
use crate::global::GlobalEnvironment;
use crate::journal::JournalEntry;
use crate::paths::{
    display_path_with_home, required_home_dir, resolve_legacy_layout, resolve_workspace, Workspace,
};
use crate::poller::ThreadSleeper;
use crate::process::{ProcessRunner, RealProcessRunner};
use crate::project::{list_projects, validate_url, ProjectKind, PHP_VERSIONS};
use crate::provision::{create_project, CreateRequest};
use crate::session::Session;
use crate::setup::{collect_doctor_checks, configure, resolve_bundle_dir};
use crate::ui::Reporter;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "ricol",
    version,
    about = "Local WordPress and Laravel environments behind a shared HTTPS proxy"
)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(long, global = true)]
    json: bool,
    #[arg(short, long, global = true)]
    verbose: bool,
    #[arg(long, global = true, hide = true)]
    bundle_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "One-time setup: workspace, templates, certificates and networks")]
    Config,
    #[command(about = "Scaffold a new project")]
    Create(CreateArgs),
    Start {
        project: Option<String>,
    },
    Stop {
        project: Option<String>,
    },
    #[command(about = "Stop a project's containers and remove its directory")]
    Delete {
        project: Option<String>,
        #[arg(long, default_value_t = false)]
        yes: bool,
    },
    #[command(about = "Shared reverse proxy and database")]
    Global {
        #[command(subcommand)]
        command: GlobalCommand,
    },
    #[command(name = "global-start", hide = true)]
    GlobalStart {
        #[arg(long, default_value_t = false)]
        recreate: bool,
    },
    #[command(name = "global-stop", hide = true)]
    GlobalStop,
    #[command(name = "global-status", hide = true)]
    GlobalStatus,
    #[command(about = "Move projects from the legacy flat layout into the workspace")]
    Migrate {
        #[arg(long, default_value_t = false)]
        yes: bool,
    },
    List,
    Paths,
    Doctor,
}

#[derive(Subcommand, Debug)]
enum GlobalCommand {
    Start {
        #[arg(long, default_value_t = false)]
        recreate: bool,
    },
    Stop,
    Status,
}

#[derive(Args, Debug, Default)]
struct CreateArgs {
    #[arg(long = "type", value_enum)]
    kind: Option<ProjectKind>,
    #[arg(long)]
    url: Option<String>,
    #[arg(long)]
    php: Option<String>,
    #[arg(long, value_enum)]
    starter_kit: Option<StarterKit>,
    #[arg(long)]
    stack: Option<String>,
    #[arg(long, default_value_t = false)]
    typescript: bool,
    #[arg(long, default_value_t = false)]
    eslint: bool,
    #[arg(long, default_value_t = false)]
    api: bool,
    #[arg(long, default_value_t = false)]
    teams: bool,
    #[arg(long, default_value_t = false)]
    verification: bool,
    #[arg(long, value_enum)]
    database: Option<LaravelDatabase>,
    #[arg(long, value_enum)]
    test_framework: Option<TestFramework>,
    #[arg(long)]
    git_branch: Option<String>,
}

#[derive(Debug, Serialize)]
struct JsonResult<T: Serialize> {
    ok: bool,
    result: Option<T>,
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_details: Option<ProcessErrorDetails>,
}

#[derive(Debug, Clone)]
struct Context {
    config_path: PathBuf,
    bundle_dir: PathBuf,
    json: bool,
}

struct Loaded {
    cfg: Config,
    home: PathBuf,
    workspace: Workspace,
}

impl Loaded {
    fn session<'a, R: ProcessRunner>(&'a self, ctx: &Context, runner: &'a R) -> Session<'a, R> {
        Session::new(
            &self.cfg,
            &self.workspace,
            runner,
            &ThreadSleeper,
            Reporter::new(ctx.json),
        )
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let ctx = build_context(&cli);
    let runner = RealProcessRunner;
    let journal = journal_label(&cli.command);

    let result = match cli.command {
        Commands::Config => handle_config(&ctx, &runner),
        Commands::Create(args) => handle_create(&ctx, args, &runner),
        Commands::Start { project } => handle_start(&ctx, project, &runner),
        Commands::Stop { project } => handle_stop(&ctx, project, &runner),
        Commands::Delete { project, yes } => handle_delete(&ctx, project, yes, &runner),
        Commands::Global { command } => handle_global(&ctx, command, &runner),
        Commands::GlobalStart { recreate } => {
            handle_global(&ctx, GlobalCommand::Start { recreate }, &runner)
        }
        Commands::GlobalStop => handle_global(&ctx, GlobalCommand::Stop, &runner),
        Commands::GlobalStatus => handle_global(&ctx, GlobalCommand::Status, &runner),
        Commands::Migrate { yes } => handle_migrate(&ctx, yes),
        Commands::List => handle_list(&ctx),
        Commands::Paths => handle_paths(&ctx),
        Commands::Doctor => handle_doctor(&ctx, &runner),
    };

    if let Some((command, target)) = journal {
        record_journal(&ctx, command, target.as_deref(), &result);
    }

    if let Err(err) = result {
        if ctx.json {
            let payload = JsonResult::<serde_json::Value> {
                ok: false,
                result: None,
                error: Some(err.to_string()),
                error_details: Some(error_details(&err)),
            };
            if let Err(print_err) = print_json(&payload) {
                eprintln!("{print_err}");
            }
        } else {
            eprintln!("{} {err}", dialoguer::console::style("error:").red().bold());
        }
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "ricol=debug,warn" } else { "warn" };
    let filter = EnvFilter::try_from_env("RICOL_LOG")
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn build_context(cli: &Cli) -> Context {
    Context {
        config_path: resolve_config_path(cli.config.as_ref()),
        bundle_dir: resolve_bundle_dir(cli.bundle_dir.as_ref()),
        json: cli.json,
    }
}

fn load(ctx: &Context) -> Result<Loaded, RicolError> {
    let cfg = read_config(&ctx.config_path)?;
    let home = required_home_dir()?;
    let workspace = resolve_workspace(&cfg, &home)?;
    Ok(Loaded {
        cfg,
        home,
        workspace,
    })
}

fn error_details(err: &RicolError) -> ProcessErrorDetails {
    if let Some(details) = err.details() {
        return details.clone();
    }
    let hint = match err {
        RicolError::PreconditionMissing { hint, .. } | RicolError::ReadinessTimeout { hint, .. } => {
            Some(hint.clone())
        }
        _ => None,
    };
    ProcessErrorDetails {
        error_code: err.error_code().to_string(),
        hint,
        command: None,
        raw_stderr: None,
    }
}

fn journal_label(command: &Commands) -> Option<(&'static str, Option<String>)> {
    match command {
        Commands::Config => Some(("config", None)),
        Commands::Create(args) => Some(("create", args.url.clone())),
        Commands::Start { project } => Some(("start", project.clone())),
        Commands::Stop { project } => Some(("stop", project.clone())),
        Commands::Delete { project, .. } => Some(("delete", project.clone())),
        Commands::Global {
            command: GlobalCommand::Start { .. },
        }
        | Commands::GlobalStart { .. } => Some(("global start", None)),
        Commands::Global {
            command: GlobalCommand::Stop,
        }
        | Commands::GlobalStop => Some(("global stop", None)),
        Commands::Migrate { .. } => Some(("migrate", None)),
        _ => None,
    }
}

fn record_journal(
    ctx: &Context,
    command: &str,
    target: Option<&str>,
    result: &Result<(), RicolError>,
) {
    let Ok(loaded) = load(ctx) else {
        return;
    };
    let error_code = result.as_ref().err().map(RicolError::error_code);
    let entry = JournalEntry::new(command, target, error_code);
    if let Err(err) = journal::append(&loaded.workspace.journal_path(), &entry) {
        warn!(error = %err, "could not write the command journal");
    }
}

fn handle_config<R: ProcessRunner>(ctx: &Context, runner: &R) -> Result<(), RicolError> {
    let loaded = load(ctx)?;
    let session = loaded.session(ctx, runner);
    let report = configure(&session, &ctx.bundle_dir)?;
    output(ctx, &report, || {
        let reporter = &session.reporter;
        for network in &report.networks {
            let state = if network.created { "created" } else { "already present" };
            reporter.detail(&format!("network {}: {state}", network.name));
        }
        reporter.success(&format!(
            "workspace ready at {}",
            display_path_with_home(&report.base, Some(&loaded.home))
        ));
        reporter.info("Next: `ricol global start`, then `ricol create`.");
    })
}

fn handle_create<R: ProcessRunner>(
    ctx: &Context,
    args: CreateArgs,
    runner: &R,
) -> Result<(), RicolError> {
    let loaded = load(ctx)?;
    let request = resolve_create_request(&loaded.cfg, args)?;
    let session = loaded.session(ctx, runner);
    let mut rng = rand::thread_rng();
    let report = create_project(&session, &request, &mut rng)?;
    output(ctx, &report, || {
        let reporter = &session.reporter;
        reporter.detail(&report.status);
        reporter.success(&format!(
            "{} project '{}' is up at https://{}",
            report.project.kind.label(),
            report.project.name,
            report.project.url
        ));
        reporter.detail(&format!(
            "directory: {}",
            display_path_with_home(&report.path, Some(&loaded.home))
        ));
        reporter.detail(&format!("database: {}", report.project.database));
    })
}

fn resolve_create_request(cfg: &Config, args: CreateArgs) -> Result<CreateRequest, RicolError> {
    let kind = match args.kind {
        Some(kind) => kind,
        None => {
            let kinds = [ProjectKind::WordPress, ProjectKind::Laravel];
            let labels: Vec<String> = kinds.iter().map(|kind| kind.label().to_string()).collect();
            kinds[ui::select("Project type", &labels, 0, "--type")?]
        }
    };
    let url = match &args.url {
        Some(url) => url.clone(),
        None => {
            let suffixes = cfg.domains.suffixes.clone();
            let prompt = format!("Site URL (ending in {})", suffixes.join(", "));
            ui::input(&prompt, "--url", None, move |value: &String| {
                validate_url(value, &suffixes)
                    .map(|_| ())
                    .map_err(|err| err.to_string())
            })?
        }
    };
    let php_version = match &args.php {
        Some(version) => version.clone(),
        None => {
            let versions: Vec<String> = PHP_VERSIONS.iter().map(|v| v.to_string()).collect();
            versions[ui::select("PHP version", &versions, 0, "--php")?].clone()
        }
    };
    let laravel = match kind {
        ProjectKind::Laravel => resolve_laravel_options(&args)?,
        ProjectKind::WordPress => LaravelOptions::default(),
    };
    Ok(CreateRequest {
        kind,
        url,
        php_version,
        laravel,
    })
}

fn resolve_laravel_options(args: &CreateArgs) -> Result<LaravelOptions, RicolError> {
    let defaults = LaravelOptions::default();
    let prompt = args.starter_kit.is_none() && ui::interactive();
    let starter_kit = match args.starter_kit {
        Some(kit) => kit,
        None if prompt => {
            let kits = [StarterKit::None, StarterKit::Breeze, StarterKit::Jetstream];
            let labels: Vec<String> = ["none", "breeze", "jetstream"]
                .iter()
                .map(|label| label.to_string())
                .collect();
            kits[ui::select("Starter kit", &labels, 0, "--starter-kit")?]
        }
        None => StarterKit::None,
    };
    let stack = match (&args.stack, starter_kit) {
        (Some(stack), _) => Some(stack.clone()),
        (None, StarterKit::None) => None,
        (None, kit) if prompt => {
            let stacks: &[&str] = if kit == StarterKit::Breeze {
                &BREEZE_STACKS
            } else {
                &JETSTREAM_STACKS
            };
            let items: Vec<String> = stacks.iter().map(|s| s.to_string()).collect();
            Some(items[ui::select("Stack", &items, 0, "--stack")?].clone())
        }
        (None, _) => None,
    };
    let test_framework = match args.test_framework {
        Some(framework) => framework,
        None if prompt => {
            let frameworks = [TestFramework::Pest, TestFramework::Phpunit];
            let labels = vec!["pest".to_string(), "phpunit".to_string()];
            frameworks[ui::select("Test framework", &labels, 0, "--test-framework")?]
        }
        None => defaults.test_framework,
    };
    let options = LaravelOptions {
        starter_kit,
        stack,
        typescript: args.typescript,
        eslint: args.eslint,
        api: args.api,
        teams: args.teams,
        verification: args.verification,
        database: args.database.unwrap_or(defaults.database),
        test_framework,
        git_branch: args.git_branch.clone(),
    };
    options.validate()?;
    Ok(options)
}

fn choose_project(
    loaded: &Loaded,
    project: Option<String>,
    action: &str,
) -> Result<String, RicolError> {
    if let Some(name) = project {
        return Ok(name);
    }
    let entries = list_projects(&loaded.workspace.sites)?;
    if entries.is_empty() {
        return Err(RicolError::Validation(format!(
            "no projects found under {}; create one with `ricol create`",
            loaded.workspace.sites.display()
        )));
    }
    let labels: Vec<String> = entries
        .iter()
        .map(|entry| match &entry.site_url {
            Some(url) => format!("{} ({url})", entry.name),
            None => entry.name.clone(),
        })
        .collect();
    let index = ui::select(&format!("Project to {action}"), &labels, 0, "a project name")?;
    Ok(entries[index].name.clone())
}

fn handle_start<R: ProcessRunner>(
    ctx: &Context,
    project: Option<String>,
    runner: &R,
) -> Result<(), RicolError> {
    let loaded = load(ctx)?;
    let name = choose_project(&loaded, project, "start")?;
    let session = loaded.session(ctx, runner);
    let report = lifecycle::start_project(&session, &name)?;
    output(ctx, &report, || {
        session.reporter.detail(&report.status);
        match &report.site_url {
            Some(url) => session
                .reporter
                .success(&format!("{} is running at https://{url}", report.name)),
            None => session.reporter.success(&format!("{} is running", report.name)),
        }
    })
}

fn handle_stop<R: ProcessRunner>(
    ctx: &Context,
    project: Option<String>,
    runner: &R,
) -> Result<(), RicolError> {
    let loaded = load(ctx)?;
    let name = choose_project(&loaded, project, "stop")?;
    let session = loaded.session(ctx, runner);
    let path = lifecycle::stop_project(&session, &name)?;
    output(ctx, &json!({ "name": name, "path": path }), || {
        session.reporter.success(&format!("{name} stopped"));
    })
}

fn handle_delete<R: ProcessRunner>(
    ctx: &Context,
    project: Option<String>,
    yes: bool,
    runner: &R,
) -> Result<(), RicolError> {
    let loaded = load(ctx)?;
    let name = choose_project(&loaded, project, "delete")?;
    if !yes {
        let prompt = format!(
            "Delete {} and everything in it?",
            loaded.workspace.project_dir(&name).display()
        );
        if !ui::confirm(&prompt, "--yes", false)? {
            return cancelled(ctx, "delete");
        }
    }
    let session = loaded.session(ctx, runner);
    let report = lifecycle::delete_project(&session, &name)?;
    output(ctx, &report, || {
        session.reporter.success(&format!("{} deleted", report.name));
    })
}

fn handle_global<R: ProcessRunner>(
    ctx: &Context,
    command: GlobalCommand,
    runner: &R,
) -> Result<(), RicolError> {
    let loaded = load(ctx)?;
    let session = loaded.session(ctx, runner);
    let global = GlobalEnvironment::new(&session);
    match command {
        GlobalCommand::Start { recreate } => {
            let status = global.start(recreate)?;
            output(
                ctx,
                &json!({ "state": global.state(), "status": status }),
                || {
                    session.reporter.info(&status);
                    session.reporter.success("global environment is healthy");
                },
            )
        }
        GlobalCommand::Stop => {
            global.stop()?;
            output(ctx, &json!({ "state": global.state() }), || {
                session.reporter.success("global environment stopped");
            })
        }
        GlobalCommand::Status => {
            let status = global.status()?;
            output(ctx, &status, || {
                session
                    .reporter
                    .info(&format!("global environment: {}", status.state.as_str()));
                for service in &status.running {
                    session.reporter.detail(&format!("  running  {service}"));
                }
                for service in &status.missing {
                    session.reporter.detail(&format!("  missing  {service}"));
                }
            })
        }
    }
}

fn handle_migrate(ctx: &Context, yes: bool) -> Result<(), RicolError> {
    let loaded = load(ctx)?;
    let legacy = resolve_legacy_layout(&loaded.home, &loaded.cfg)?;
    let reporter = Reporter::new(ctx.json);
    let plan = migrate::plan(&legacy)?;
    if plan.is_empty() {
        return output(ctx, &migrate::MigrationReport::default(), || {
            reporter.success("nothing to migrate");
        });
    }

    if let Some(sites) = &plan.sites {
        reporter.info(&format!(
            "{} project(s) in {} will move to {}",
            plan.projects.len(),
            sites.display(),
            loaded.workspace.sites.display()
        ));
    }
    if let Some(global) = &plan.global {
        reporter.info(&format!(
            "{} will move to {}",
            global.display(),
            loaded.workspace.global.display()
        ));
    }
    if !yes && !ui::confirm("Migrate now? The legacy directories are removed afterwards", "--yes", false)? {
        return cancelled(ctx, "migration");
    }

    let report = migrate::migrate(&loaded.workspace, &legacy, &reporter)?;
    output(ctx, &report, || {
        reporter.success(&format!(
            "migrated {} project(s){}",
            report.projects.len(),
            if report.global_moved {
                " and the global environment"
            } else {
                ""
            }
        ));
    })
}

fn handle_list(ctx: &Context) -> Result<(), RicolError> {
    let loaded = load(ctx)?;
    let entries = list_projects(&loaded.workspace.sites)?;
    output(ctx, &json!({ "projects": entries }), || {
        if entries.is_empty() {
            println!("no projects under {}", loaded.workspace.sites.display());
        }
        for entry in &entries {
            println!(
                "{}\t{}",
                entry.name,
                entry.site_url.as_deref().unwrap_or("-")
            );
        }
    })
}

fn handle_paths(ctx: &Context) -> Result<(), RicolError> {
    let loaded = load(ctx)?;
    let legacy = resolve_legacy_layout(&loaded.home, &loaded.cfg)?;
    let workspace = &loaded.workspace;
    let payload = json!({
        "config_path": ctx.config_path,
        "config_exists": ctx.config_path.exists(),
        "bundle_dir": ctx.bundle_dir,
        "base": workspace.base,
        "sites": workspace.sites,
        "global": workspace.global,
        "templates": workspace.templates,
        "logs": workspace.logs,
        "bin": workspace.bin,
        "certs": workspace.certs_dir(),
        "journal": workspace.journal_path(),
        "legacy_sites": legacy.sites,
        "legacy_global": legacy.global,
    });
    output(ctx, &payload, || {
        if let Some(map) = payload.as_object() {
            for (key, value) in map {
                let text = value
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| value.to_string());
                println!("{key}: {text}");
            }
        }
    })
}

fn handle_doctor<R: ProcessRunner>(ctx: &Context, runner: &R) -> Result<(), RicolError> {
    let loaded = load(ctx)?;
    let session = loaded.session(ctx, runner);
    let checks = collect_doctor_checks(&session);
    let failed = checks
        .iter()
        .find(|check| !check.ok && check.severity == "error")
        .map(|check| check.message.clone());

    if ctx.json {
        let payload = JsonResult {
            ok: failed.is_none(),
            result: Some(json!({ "checks": checks })),
            error: failed.clone(),
            error_details: None,
        };
        print_json(&payload)?;
        if failed.is_some() {
            std::process::exit(1);
        }
        return Ok(());
    }

    for check in &checks {
        let state = if check.ok { "ok" } else { "fail" };
        println!(
            "[{}] {} ({}) - {}",
            state, check.id, check.severity, check.message
        );
        if !check.ok {
            println!("  remediation: {}", check.remediation);
        }
    }
    match failed {
        Some(message) => Err(RicolError::precondition(
            message,
            "fix the failed checks above and rerun `ricol doctor`",
        )),
        None => Ok(()),
    }
}

fn cancelled(ctx: &Context, action: &str) -> Result<(), RicolError> {
    output(ctx, &json!({ "cancelled": true, "action": action }), || {
        Reporter::new(ctx.json).info(&format!("{action} cancelled"));
    })
}

fn output<T: Serialize>(
    ctx: &Context,
    payload: &T,
    human: impl FnOnce(),
) -> Result<(), RicolError> {
    if ctx.json {
        let wrapper = JsonResult {
            ok: true,
            result: Some(payload),
            error: None,
            error_details: None,
        };
        print_json(&wrapper)?;
    } else {
        human();
    }
    Ok(())
}

fn print_json<T: Serialize>(payload: &T) -> Result<(), RicolError> {
    let text = serde_json::to_string_pretty(payload)?;
    println!("{}", text);
    Ok(())
}
