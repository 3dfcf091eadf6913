//! Command-line interface definitions for Awful Local News.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! Provider keys can be provided via flags, environment variables, or the
//! YAML config file; flags and environment win over the file.

use clap::{Parser, Subcommand};

/// Command-line arguments for the Awful Local News application.
///
/// # Examples
///
/// ```sh
/// # Serve the HTTP API on the configured address
/// GEMINI_API_KEYS=k1,k2 awful_local_news serve
///
/// # One-shot digest for a state, written under ./json
/// awful_local_news -c config.yaml digest --query Punjab -j ./json
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to config.yaml file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Comma-separated news search API keys
    #[arg(long, env = "NEWS_API_KEYS", global = true, hide_env_values = true)]
    pub news_api_keys: Option<String>,

    /// Comma-separated generative model API keys
    #[arg(long, env = "GEMINI_API_KEYS", global = true, hide_env_values = true)]
    pub gemini_api_keys: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP API
    Serve {
        /// Address to listen on (overrides server.listen_addr)
        #[arg(short, long)]
        listen: Option<String>,
    },

    /// Fetch, summarize, and filter articles for one state, then write JSON
    Digest {
        /// State (or region) to filter articles for
        #[arg(short, long)]
        query: String,

        /// Output directory for the JSON digest file
        #[arg(short, long)]
        json_output_dir: String,

        /// Number of relevant articles to collect (overrides pipeline.target_count)
        #[arg(short, long)]
        target_count: Option<usize>,

        /// Articles processed concurrently per batch (overrides pipeline.batch_size)
        #[arg(short, long)]
        batch_size: Option<usize>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_serve() {
        let cli = Cli::parse_from(["awful_local_news", "serve", "--listen", "127.0.0.1:8080"]);
        match cli.command {
            Command::Serve { listen } => assert_eq!(listen.as_deref(), Some("127.0.0.1:8080")),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_cli_digest_short_flags() {
        let cli = Cli::parse_from([
            "awful_local_news",
            "-c",
            "/etc/news.yaml",
            "digest",
            "-q",
            "Punjab",
            "-j",
            "/tmp/json",
            "-t",
            "3",
        ]);

        assert_eq!(cli.config.as_deref(), Some("/etc/news.yaml"));
        match cli.command {
            Command::Digest {
                query,
                json_output_dir,
                target_count,
                batch_size,
            } => {
                assert_eq!(query, "Punjab");
                assert_eq!(json_output_dir, "/tmp/json");
                assert_eq!(target_count, Some(3));
                assert_eq!(batch_size, None);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_cli_keys_flag() {
        let cli = Cli::parse_from(["awful_local_news", "serve", "--gemini-api-keys", "a,b"]);
        assert_eq!(cli.gemini_api_keys.as_deref(), Some("a,b"));
    }
}
