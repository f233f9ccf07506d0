use std::path::PathBuf;

use clap::{ArgAction, Parser};

use crate::cmd::Commands;

/// File-backed Gantt planning CLI.
/// Storage defaults to ~/.gantt/plan.json, GANTT_DB or a path passed via --db.
#[derive(Parser)]
#[command(name = "gantt", version, about = "Resource planning with workday scheduling")]
pub struct Cli {
    /// Path to the JSON plan file.
    #[arg(long, global = true, env = "GANTT_DB")]
    pub db: Option<PathBuf>,

    /// Increase log detail on stderr (-v info, -vv debug).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn db_flag_falls_back_to_environment() {
        let cmd = Cli::command();
        let db = cmd.get_arguments().find(|a| a.get_id() == "db").unwrap();
        assert_eq!(db.get_env(), Some(std::ffi::OsStr::new("GANTT_DB")));
        assert!(db.is_global_set());
    }

    #[test]
    fn explicit_db_flag_is_parsed() {
        let cli = Cli::try_parse_from(["gantt", "--db", "/tmp/plan.json", "-vv", "list"]).unwrap();
        assert_eq!(cli.db, Some(PathBuf::from("/tmp/plan.json")));
        assert_eq!(cli.verbose, 2);
    }
}
