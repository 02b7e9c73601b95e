use clap::Parser;
use color_eyre::Result;
use color_eyre::eyre::eyre;
use daylist::cli::{self, Cli, Commands, Context};
use daylist::models::TodoId;
use daylist::{logging, Clock, Config, DocumentStore, LocalAuth, Profile, SqliteStore, SystemClock};
use std::io;
use std::path::PathBuf;
use std::rc::Rc;

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    // --dev keeps a separate config, database and log
    let profile = if cli.dev { Profile::Dev } else { Profile::Prod };

    let config = match cli.config.as_deref() {
        Some(path) => Config::load_from_path(&daylist::utils::expand_path(path), profile)?,
        None => Config::load_with_profile(profile)?,
    };

    let db_path = config.get_database_path();
    let log_path = logging::log_path(profile)
        .or_else(|| db_path.parent().map(|dir| dir.join(logging::LOG_FILE_NAME)))
        .unwrap_or_else(|| PathBuf::from(logging::LOG_FILE_NAME));
    logging::init(&log_path, &config.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), ?profile, db = %db_path.display(), "starting");

    let db_path = db_path
        .to_str()
        .ok_or_else(|| eyre!("Database path contains invalid UTF-8"))?;
    let store: Rc<dyn DocumentStore> = Rc::new(SqliteStore::open(db_path)?);
    let auth = Rc::new(LocalAuth::open(db_path, config.email_policy())?);
    let clock: Rc<dyn Clock> = Rc::new(SystemClock);

    let ctx = Context {
        auth: auth.as_ref(),
        store: store.clone(),
        clock: clock.clone(),
    };
    let mut out = io::stdout();

    match cli.command.unwrap_or(Commands::Tui) {
        Commands::Tui => {
            let app = daylist::tui::App::new(config, auth.clone(), store, clock);
            daylist::tui::run_event_loop(app)?;
        }
        Commands::Register { credentials, name } => {
            cli::handle_register(&ctx, &credentials, name.as_deref(), &mut out)?;
        }
        Commands::Add { title, credentials } => {
            cli::handle_add(&ctx, &credentials, &title, &mut out)?;
        }
        Commands::Complete { id, credentials } => {
            cli::handle_complete(&ctx, &credentials, TodoId(id), &mut out)?;
        }
        Commands::Delete { id, credentials } => {
            cli::handle_delete(&ctx, &credentials, TodoId(id), &mut out)?;
        }
        Commands::List { filter, json, credentials } => {
            cli::handle_list(&ctx, &credentials, filter, json, &mut out)?;
        }
        Commands::Sweep { credentials } => {
            cli::handle_sweep(&ctx, &credentials, &mut out)?;
        }
    }

    Ok(())
}
