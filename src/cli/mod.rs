use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod errors;
mod handlers;

pub use errors::exit_code;
pub use handlers::*;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Store directory. Defaults to $KS_BASE_PATH or ~/.local/share/ks
    #[clap(long, global = true)]
    pub base_path: Option<PathBuf>,

    /// Log debug output
    #[clap(short, long, global = true, default_value = "false")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Index text files
    Add {
        /// Files to chunk and index
        #[clap(required = true)]
        files: Vec<PathBuf>,
    },
    /// Search indexed documents
    Search {
        /// Free-text query
        query: String,

        /// Number of hits. Defaults to `default_k` from config.yaml
        #[clap(short, long)]
        k: Option<usize>,

        /// Print hits as JSON
        #[clap(long, default_value = "false")]
        json: bool,
    },
    /// Show store status
    Info {},
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_search() {
        let args = Args::parse_from(["ks", "search", "addition function", "-k", "3", "--json"]);

        match args.command {
            Command::Search { query, k, json } => {
                assert_eq!(query, "addition function");
                assert_eq!(k, Some(3));
                assert!(json);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_global_base_path() {
        let args = Args::parse_from(["ks", "add", "a.rs", "b.rs", "--base-path", "/tmp/ks"]);

        assert_eq!(args.base_path, Some(PathBuf::from("/tmp/ks")));
        assert!(matches!(args.command, Command::Add { ref files } if files.len() == 2));
    }

    #[test]
    fn test_add_requires_files() {
        assert!(Args::try_parse_from(["ks", "add"]).is_err());
    }
}
