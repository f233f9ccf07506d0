//! # gantt - resource planning CLI
//!
//! Command-line front end over the planner core. Each invocation is one
//! request: it takes the plan file lock, applies or reads, and prints a JSON
//! envelope on stdout. Logs go to stderr.
//!
//! ## Key Commands
//!
//! - `gantt init` - Chart payload for all current work
//! - `gantt add <name>` - Plan a new task
//! - `gantt set <id> --hash <checksum> <field> <value>` - Guarded single-field edit
//! - `gantt save <id> --hash <checksum> --json <attrs> [--resource R]` - Guarded full save
//! - `gantt delete <id> --hash <checksum>` - Guarded delete of a subtree
//! - `gantt reconcile '{"1":"<checksum>"}'` - Which displayed tasks changed
//! - `gantt list` - Indented table of the plan
//!
//! Set `RUST_LOG` or pass `-v`/`-vv` for more detail on stderr.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use gantt_planner::config::Config;
use gantt_planner::db::Store;

mod cli;
mod cmd;

use cli::Cli;
use cmd::*;

fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.log_filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();

    let config = match Config::resolve(cli.db, cli.verbose) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to prepare plan directory: {e}");
            std::process::exit(1);
        }
    };
    init_logging(&config);
    let store = Store::new(&config);

    match cli.command {
        Commands::Init { department, viewer, as_of } => cmd_init(&store, department, viewer, as_of),

        Commands::Add {
            name, resource, parent, start, duration, priority, color, owner,
            owner_shortname, job_reference, job_description, deadline, deadline_description,
        } => cmd_add(&store, name, resource, parent, start, duration, priority, color, owner,
                     owner_shortname, job_reference, job_description, deadline, deadline_description),

        Commands::Set { id, hash, field, value } => cmd_set(&store, id, hash, field, value),

        Commands::Save { id, hash, json, resource } => cmd_save(&store, id, hash, json, resource),

        Commands::Delete { id, hash } => cmd_delete(&store, id, hash),

        Commands::Reconcile { payload } => cmd_reconcile(&store, payload),

        Commands::Show { id } => cmd_show(&store, id),

        Commands::List { resource, department, as_of } => cmd_list(&store, resource, department, as_of),

        Commands::Resource { action } => cmd_resource(&store, action),

        Commands::Absence { resource, kind, start, days, comment } =>
            cmd_absence(&store, resource, kind, start, days, comment),

        Commands::Completions { shell } => cmd_completions(shell),
    }
}
