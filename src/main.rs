//! Reefline CLI entrypoint.
//!
//! This is the main entrypoint for the reefline command-line tool.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use reefline::cli::{Cli, Commands, OutputFormatter, StateCommands};
use reefline::cloud::{CloudClients, DigitalOceanClient, SpacesClient};
use reefline::config::{ConfigParser, ConfigValidator, Manifest, find_config_file};
use reefline::error::Result;
use reefline::reconciler::Reconciler;
use reefline::resource::ResourceKind;
use reefline::state::{LocalStateStore, StateStore, generate_holder_id};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse_args();

    init_logging(cli.verbose, cli.log_json);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    let cancel = CancellationToken::new();
    match runtime.block_on(async {
        spawn_interrupt_handler(cancel.clone());
        run(cli, &cancel).await
    }) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
fn init_logging(verbose: bool, json: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Cancels the token on Ctrl-C so in-flight calls stop at the next await.
fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling");
            cancel.cancel();
        }
    });
}

/// Main async entry point. Returns false when the command ran but failed.
async fn run(cli: Cli, cancel: &CancellationToken) -> Result<bool> {
    let formatter = OutputFormatter::new(cli.output);

    match cli.command {
        Commands::Init { path, force } => cmd_init(&path, force).map(|()| true),
        Commands::Validate { warnings } => cmd_validate(cli.config.as_ref(), warnings, &formatter),
        Commands::Plan { detailed } => {
            cmd_plan(cli.config.as_ref(), detailed, &formatter, cancel).await
        }
        Commands::Reconcile {
            yes,
            max_attempts,
            watch,
        } => cmd_reconcile(cli.config.as_ref(), yes, max_attempts, watch, &formatter, cancel).await,
        Commands::Status => cmd_status(cli.config.as_ref(), &formatter).await,
        Commands::Destroy { yes } => {
            cmd_destroy(cli.config.as_ref(), yes, &formatter, cancel).await
        }
        Commands::State { command } => cmd_state(cli.config.as_ref(), command, &formatter).await,
    }
}

/// Initialize a new project.
fn cmd_init(path: &Path, force: bool) -> Result<()> {
    info!("Initializing new Reefline project in: {}", path.display());

    let config_path = path.join("reefline.yaml");
    let env_path = path.join(".env.example");
    let gitignore_path = path.join(".gitignore");

    if !force && config_path.exists() {
        eprintln!("Manifest already exists: {}", config_path.display());
        eprintln!("Use --force to overwrite.");
        return Ok(());
    }

    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }

    std::fs::write(&config_path, include_str!("../templates/reefline.yaml"))?;
    eprintln!("Created: {}", config_path.display());

    std::fs::write(&env_path, include_str!("../templates/.env.example"))?;
    eprintln!("Created: {}", env_path.display());

    if gitignore_path.exists() {
        let existing = std::fs::read_to_string(&gitignore_path)?;
        if !existing.contains(".env") || !existing.contains(".reefline") {
            let mut file = std::fs::OpenOptions::new()
                .append(true)
                .open(&gitignore_path)?;
            writeln!(file, "\n# Reefline")?;
            if !existing.contains(".env") {
                writeln!(file, ".env")?;
            }
            if !existing.contains(".reefline") {
                writeln!(file, ".reefline/")?;
            }
            eprintln!("Updated: {}", gitignore_path.display());
        }
    } else {
        std::fs::write(&gitignore_path, ".env\n.reefline/\n")?;
        eprintln!("Created: {}", gitignore_path.display());
    }

    eprintln!("\nProject initialized successfully!");
    eprintln!("Next steps:");
    eprintln!("  1. Copy .env.example to .env and fill in your API token");
    eprintln!("  2. Edit reefline.yaml to declare your resources");
    eprintln!("  3. Run 'reefline validate' to check the manifest");
    eprintln!("  4. Run 'reefline plan' to see what will change");
    eprintln!("  5. Run 'reefline reconcile' to converge");

    Ok(())
}

/// Validate the manifest.
fn cmd_validate(
    config_path: Option<&PathBuf>,
    show_warnings: bool,
    formatter: &OutputFormatter,
) -> Result<bool> {
    let config_file = resolve_config_path(config_path)?;
    info!("Validating manifest: {}", config_file.display());

    let parser = ConfigParser::new().with_base_path(base_dir(&config_file));
    parser.load_dotenv()?;
    let manifest = parser.load_with_env(&config_file)?;

    let result = ConfigValidator::new().check(&manifest);
    emit(&formatter.format_validation(&manifest, &result, show_warnings))?;
    Ok(result.is_valid())
}

/// Observe and show what a reconcile would do.
async fn cmd_plan(
    config_path: Option<&PathBuf>,
    detailed: bool,
    formatter: &OutputFormatter,
    cancel: &CancellationToken,
) -> Result<bool> {
    let (manifest, state_store) = load_manifest_and_state(config_path)?;
    let clients = create_cloud_clients(&manifest)?;

    let report = Reconciler::new(&manifest, &state_store, &clients)
        .check_drift(cancel)
        .await?;

    emit(&formatter.format_plan(&report, detailed))?;
    Ok(report.errors.is_empty())
}

/// Reconcile once, or repeatedly with `--watch`.
async fn cmd_reconcile(
    config_path: Option<&PathBuf>,
    auto_approve: bool,
    max_attempts: u32,
    watch: Option<u64>,
    formatter: &OutputFormatter,
    cancel: &CancellationToken,
) -> Result<bool> {
    let (manifest, state_store) = load_manifest_and_state(config_path)?;
    let clients = create_cloud_clients(&manifest)?;
    let reconciler =
        Reconciler::new(&manifest, &state_store, &clients).with_max_attempts(max_attempts);

    if !auto_approve && watch.is_none() {
        let report = reconciler.check_drift(cancel).await?;
        emit(&formatter.format_plan(&report, false))?;
        if report.is_converged() && report.errors.is_empty() {
            return Ok(true);
        }
        if !confirm("Do you want to apply these changes? [y/N]: ", "y")? {
            eprintln!("Reconciliation cancelled.");
            return Ok(true);
        }
    }

    loop {
        let result = reconciler.reconcile(cancel).await?;
        emit(&formatter.format_reconciliation(&result))?;

        let Some(interval) = watch else {
            return Ok(result.success);
        };
        debug!("Next pass in {interval}s");
        tokio::select! {
            () = cancel.cancelled() => {
                info!("Watch stopped");
                return Ok(result.success);
            }
            () = tokio::time::sleep(Duration::from_secs(interval)) => {}
        }
    }
}

/// Show recorded status.
async fn cmd_status(config_path: Option<&PathBuf>, formatter: &OutputFormatter) -> Result<bool> {
    let (manifest, state_store) = load_manifest_and_state(config_path)?;

    let state = state_store.load().await?;
    let lock = state_store.get_lock_info().await?;
    match state {
        Some(state) => emit(&formatter.format_status(&state, lock.as_ref()))?,
        None if formatter.is_json() => emit("null")?,
        None => eprintln!("No state found for {}.", manifest.project.name),
    }
    Ok(true)
}

/// Delete every recorded resource.
async fn cmd_destroy(
    config_path: Option<&PathBuf>,
    auto_approve: bool,
    formatter: &OutputFormatter,
    cancel: &CancellationToken,
) -> Result<bool> {
    let (manifest, state_store) = load_manifest_and_state(config_path)?;

    let Some(state) = state_store.load().await? else {
        eprintln!("No resources to destroy.");
        return Ok(true);
    };
    if state.resources.is_empty() {
        eprintln!("No resources to destroy.");
        return Ok(true);
    }

    eprintln!("The following resources will be destroyed:");
    for record in state.resources.values() {
        let identity = record.identity.as_ref().map_or("-", |i| i.as_str());
        eprintln!("  - {} ({}, {identity})", record.name, record.kind());
    }

    if !auto_approve
        && !confirm(
            "\nThis action is IRREVERSIBLE. Type 'destroy' to confirm: ",
            "destroy",
        )?
    {
        eprintln!("Destruction cancelled.");
        return Ok(true);
    }

    let clients = create_cloud_clients(&manifest)?;
    let result = Reconciler::new(&manifest, &state_store, &clients)
        .destroy(cancel)
        .await?;
    emit(&formatter.format_reconciliation(&result))?;

    let emptied = result
        .final_state
        .as_ref()
        .is_some_and(|state| state.resources.is_empty());
    if result.success && emptied {
        state_store.delete().await?;
    }
    Ok(result.success)
}

/// State management commands.
async fn cmd_state(
    config_path: Option<&PathBuf>,
    command: StateCommands,
    formatter: &OutputFormatter,
) -> Result<bool> {
    let (_manifest, state_store) = load_manifest_and_state(config_path)?;

    match command {
        StateCommands::Show => {
            debug!("Reading {} state", state_store.backend_type());
            if let Some(state) = state_store.load().await? {
                emit(&formatter.format_state(&state))?;
            } else {
                eprintln!("No state found.");
            }
        }
        StateCommands::Lock { holder } => {
            let holder = holder.unwrap_or_else(generate_holder_id);
            let lock = state_store.acquire_lock(&holder).await?;
            eprintln!("State locked: {} (expires {})", lock.lock_id, lock.expires_at);
        }
        StateCommands::Unlock { lock_id, force } => {
            if force {
                state_store.force_unlock().await?;
                eprintln!("State forcefully unlocked.");
            } else if let Some(id) = lock_id {
                state_store.release_lock(&id).await?;
                eprintln!("State unlocked.");
            } else {
                eprintln!("Please provide --lock-id or use --force");
                return Ok(false);
            }
        }
    }

    Ok(true)
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Writes command output to stdout.
fn emit(output: &str) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{}", output.trim_end())?;
    Ok(())
}

/// Asks for confirmation on stderr.
fn confirm(prompt: &str, expected: &str) -> Result<bool> {
    eprint!("{prompt}");
    std::io::stderr().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case(expected))
}

/// Resolves the manifest path.
fn resolve_config_path(config_path: Option<&PathBuf>) -> Result<PathBuf> {
    config_path.map_or_else(|| find_config_file("."), |path| Ok(path.clone()))
}

fn base_dir(config_file: &Path) -> PathBuf {
    config_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf()
}

/// Loads and validates the manifest and opens its state directory.
fn load_manifest_and_state(config_path: Option<&PathBuf>) -> Result<(Manifest, LocalStateStore)> {
    let config_file = resolve_config_path(config_path)?;
    debug!("Loading manifest from: {}", config_file.display());

    let base = base_dir(&config_file);
    let parser = ConfigParser::new().with_base_path(&base);
    parser.load_dotenv()?;

    let manifest = parser.load_with_env(&config_file)?;
    let validation = ConfigValidator::new().validate(&manifest)?;
    for warning in &validation.warnings {
        warn!("{warning}");
    }

    let state_path = Path::new(&manifest.state.path);
    let state_dir = if state_path.is_absolute() {
        state_path.to_path_buf()
    } else {
        base.join(state_path)
    };
    let state_store =
        LocalStateStore::with_base_dir(state_dir).with_lock_ttl(manifest.state.lock_ttl_secs);

    Ok((manifest, state_store))
}

/// Creates the API and Spaces clients from the environment.
fn create_cloud_clients(manifest: &Manifest) -> Result<CloudClients> {
    let credentials = ConfigParser::credentials_from_env(manifest.declares(ResourceKind::Space))?;

    let api = DigitalOceanClient::with_base_url(
        &credentials.token,
        &manifest.provider.api_url,
        manifest.provider.timeout_secs,
    )?;

    let mut spaces = credentials
        .spaces
        .as_ref()
        .map_or_else(SpacesClient::unconfigured, |(key, secret)| {
            SpacesClient::new(key, secret)
        });
    if let Some(endpoint) = &manifest.provider.spaces_endpoint {
        spaces = spaces.with_endpoint(endpoint.clone());
    }
    debug!("Spaces credentials configured: {}", spaces.is_configured());

    Ok(CloudClients::new(api, spaces))
}
