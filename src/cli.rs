//! Command-line interface definitions for HallowWatch.
//!
//! Global options can come from flags or environment variables; every
//! action is a subcommand.

use clap::{Parser, Subcommand};

/// Command-line arguments for the HallowWatch scraper.
///
/// # Examples
///
/// ```sh
/// # Load the catalog declared in the config file
/// hallow_watch --config watch.yaml seed
///
/// # Scrape a single feed now
/// hallow_watch scrape --feed-id 3
///
/// # Keep dispatching every feed on the configured interval
/// HALLOW_WATCH_CONFIG=watch.yaml hallow_watch run
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to the YAML config file (missing file means defaults)
    #[arg(short, long, env = "HALLOW_WATCH_CONFIG", default_value = "hallow_watch.yaml", global = true)]
    pub config: String,

    /// SQLite database path, overriding the config file
    #[arg(short, long, env = "HALLOW_WATCH_DATABASE", global = true)]
    pub database: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Upsert the tags, sources and feeds declared in the config file
    Seed,

    /// Scrape one feed and store new contents
    Scrape {
        #[arg(long)]
        feed_id: i64,
    },

    /// Dispatch one job per feed and wait for all of them
    Dispatch,

    /// Dispatch on the configured schedule until Ctrl-C
    Run,

    /// List configured feeds
    Feeds,

    /// List the most recent contents
    Contents {
        #[arg(short, long, default_value_t = 20)]
        limit: i64,
    },

    /// List tags with the number of contents carrying each
    Tags,

    /// Show the stored content for a URL
    Show {
        #[arg(long)]
        url: String,
    },

    /// Mark a content as viewed (or unviewed with --unviewed)
    View {
        id: i64,
        #[arg(long)]
        unviewed: bool,
    },

    /// Toggle the bookmark flag of a content
    Bookmark { id: i64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from(&[
            "hallow_watch",
            "--config",
            "./watch.yaml",
            "--database",
            "./watch.db",
            "scrape",
            "--feed-id",
            "3",
        ]);

        assert_eq!(cli.config, "./watch.yaml");
        assert_eq!(cli.database.as_deref(), Some("./watch.db"));
        assert_eq!(cli.command, Command::Scrape { feed_id: 3 });
    }

    #[test]
    fn test_cli_short_flags_after_subcommand() {
        let cli = Cli::parse_from(&["hallow_watch", "contents", "-l", "5", "-c", "/tmp/w.yaml"]);

        assert_eq!(cli.config, "/tmp/w.yaml");
        assert_eq!(cli.command, Command::Contents { limit: 5 });
    }

    #[test]
    fn test_cli_contents_default_limit() {
        let cli = Cli::parse_from(&["hallow_watch", "contents"]);
        assert_eq!(cli.command, Command::Contents { limit: 20 });
    }

    #[test]
    fn test_cli_content_flags() {
        let cli = Cli::parse_from(&["hallow_watch", "view", "7"]);
        assert_eq!(cli.command, Command::View { id: 7, unviewed: false });

        let cli = Cli::parse_from(&["hallow_watch", "view", "7", "--unviewed"]);
        assert_eq!(cli.command, Command::View { id: 7, unviewed: true });

        let cli = Cli::parse_from(&["hallow_watch", "bookmark", "3"]);
        assert_eq!(cli.command, Command::Bookmark { id: 3 });

        let cli = Cli::parse_from(&["hallow_watch", "show", "--url", "https://a.tld/x"]);
        assert_eq!(cli.command, Command::Show { url: "https://a.tld/x".into() });

        let cli = Cli::parse_from(&["hallow_watch", "tags"]);
        assert_eq!(cli.command, Command::Tags);
    }

    #[test]
    fn test_cli_requires_subcommand() {
        assert!(Cli::try_parse_from(&["hallow_watch"]).is_err());
    }
}
