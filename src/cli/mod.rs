use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod handlers;

pub use handlers::*;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Data directory holding config.yaml, models and the embedding index.
    /// Defaults to ~/.local/share/picq
    #[clap(long, env = "PICQ_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Encode every photo of an album. Ctrl+C cancels the job.
    Index {
        album: String,

        /// Re-encode photos that already have an embedding
        #[clap(long, default_value = "false")]
        reencode: bool,

        /// Do not draw a progress bar
        #[clap(short, long, default_value = "false")]
        quiet: bool,
    },

    /// Rank photos against a text query
    Search {
        query: String,

        /// Restrict to an album (repeatable)
        #[clap(short, long = "album")]
        albums: Vec<String>,

        /// Number of results
        #[clap(short = 'k', long)]
        top_k: Option<usize>,

        /// Drop results scoring below this cosine similarity
        #[clap(long, allow_hyphen_values = true)]
        min_score: Option<f32>,
    },

    /// Rank photos by similarity to an indexed photo
    Similar {
        photo_id: String,

        /// Restrict to an album (repeatable)
        #[clap(short, long = "album")]
        albums: Vec<String>,

        /// Number of results
        #[clap(short = 'k', long)]
        top_k: Option<usize>,
    },

    /// Show how much of an album (or of every album) is indexed
    Status { album: Option<String> },

    /// Remove a photo's embedding
    Forget { photo_id: String },

    /// Fold the journal into a fresh snapshot
    Compact {},

    /// Start picq as a service.
    Daemon {
        /// Address to listen on, overrides daemon.listen from the config
        #[clap(short, long)]
        listen: Option<SocketAddr>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_search() {
        let args = Args::try_parse_from([
            "picq", "search", "dog on a beach", "-a", "summer", "-a", "2023", "-k", "5",
            "--min-score", "-0.1",
        ])
        .unwrap();

        match args.command {
            Command::Search {
                query,
                albums,
                top_k,
                min_score,
            } => {
                assert_eq!(query, "dog on a beach");
                assert_eq!(albums, vec!["summer", "2023"]);
                assert_eq!(top_k, Some(5));
                assert_eq!(min_score, Some(-0.1));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_global_data_dir() {
        let args = Args::try_parse_from(["picq", "index", "beach", "--data-dir", "/tmp/p"]).unwrap();
        assert_eq!(args.data_dir, Some(PathBuf::from("/tmp/p")));
        assert!(matches!(
            args.command,
            Command::Index { reencode: false, .. }
        ));
    }

    #[test]
    fn test_parse_daemon_listen() {
        let args = Args::try_parse_from(["picq", "daemon", "--listen", "0.0.0.0:9000"]).unwrap();
        match args.command {
            Command::Daemon { listen } => {
                assert_eq!(listen, Some("0.0.0.0:9000".parse().unwrap()))
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
