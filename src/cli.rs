//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Batch download pixiv artworks, metadata, and tags.
///
/// Pixivfetch discovers artwork identifiers from a source (rankings,
/// bookmarks, keyword search, artist galleries), resolves them into image
/// URLs, and downloads everything to local storage. Re-running is safe:
/// anything already on disk is skipped.
#[derive(Parser, Debug)]
#[command(name = "pixivfetch")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to a JSON configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Output directory for downloaded artworks
    #[arg(short, long, global = true)]
    pub output: Option<PathBuf>,

    /// Worker pool size for collection and download (1-64)
    #[arg(short = 't', long, global = true, value_parser = clap::value_parser!(u8).range(1..=64))]
    pub threads: Option<u8>,

    /// Delay between downloads within one worker, in seconds
    #[arg(short = 'd', long, global = true)]
    pub delay: Option<u64>,

    /// Record resolved URLs without downloading image bytes
    #[arg(long, global = true)]
    pub url_only: bool,

    /// Also collect metadata.json and tags.json per artwork
    #[arg(long, global = true)]
    pub with_tag: bool,

    /// Also collect bookmark_data.json per artwork
    #[arg(long, global = true)]
    pub bookmark_data: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Which source driver to run.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Download artworks from the ranking pages
    Ranking {
        /// Ranking modes, comma separated (daily, weekly, monthly, male,
        /// female, or their _r18 variants)
        #[arg(long, default_value = "daily", value_delimiter = ',')]
        modes: Vec<String>,

        /// First ranking date, YYYY-MM-DD (defaults to yesterday)
        #[arg(long)]
        date: Option<String>,

        /// Number of consecutive dates to walk
        #[arg(long, default_value_t = 1)]
        days: u32,

        /// Maximum artworks to take per date
        #[arg(long, default_value_t = 500)]
        per_date: usize,
    },

    /// Download the viewer's bookmarked artworks (requires cookie)
    Bookmark {
        /// Maximum bookmarks to download
        #[arg(short = 'n', long, default_value_t = 200)]
        count: usize,

        /// Walk private bookmarks instead of public ones
        #[arg(long)]
        private: bool,
    },

    /// Download keyword search results
    Keyword {
        /// Search query; pixiv advanced syntax is supported
        keyword: String,

        /// Order by popularity instead of date (requires premium)
        #[arg(long)]
        popular: bool,

        /// Content filter
        #[arg(long, value_enum, default_value_t = ModeArg::Safe)]
        mode: ModeArg,

        /// Maximum results to download
        #[arg(short = 'n', long, default_value_t = 200)]
        count: usize,
    },

    /// Download every artwork of one artist
    User {
        /// Numeric artist id (from the profile URL)
        artist_id: String,
    },
}

/// CLI-side content filter, mapped to the library's search mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    /// All-ages results only
    Safe,
    /// R18 results only (requires cookie)
    R18,
    /// No filter
    All,
}

impl From<ModeArg> for pixivfetch_core::crawlers::SearchMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Safe => Self::Safe,
            ModeArg::R18 => Self::R18,
            ModeArg::All => Self::All,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_ranking_defaults() {
        let args = Args::try_parse_from(["pixivfetch", "ranking"]).unwrap();
        assert_eq!(args.verbose, 0);
        assert!(!args.quiet);
        assert!(!args.url_only);
        match args.command {
            Command::Ranking {
                modes,
                date,
                days,
                per_date,
            } => {
                assert_eq!(modes, vec!["daily".to_string()]);
                assert!(date.is_none());
                assert_eq!(days, 1);
                assert_eq!(per_date, 500);
            }
            _ => panic!("expected ranking subcommand"),
        }
    }

    #[test]
    fn test_cli_ranking_mode_list() {
        let args =
            Args::try_parse_from(["pixivfetch", "ranking", "--modes", "daily,weekly"]).unwrap();
        match args.command {
            Command::Ranking { modes, .. } => {
                assert_eq!(modes, vec!["daily".to_string(), "weekly".to_string()]);
            }
            _ => panic!("expected ranking subcommand"),
        }
    }

    #[test]
    fn test_cli_keyword_flags() {
        let args = Args::try_parse_from([
            "pixivfetch",
            "keyword",
            "landscape",
            "--popular",
            "--mode",
            "all",
            "-n",
            "20",
        ])
        .unwrap();
        match args.command {
            Command::Keyword {
                keyword,
                popular,
                mode,
                count,
            } => {
                assert_eq!(keyword, "landscape");
                assert!(popular);
                assert_eq!(mode, ModeArg::All);
                assert_eq!(count, 20);
            }
            _ => panic!("expected keyword subcommand"),
        }
    }

    #[test]
    fn test_cli_global_flags_after_subcommand() {
        let args =
            Args::try_parse_from(["pixivfetch", "user", "32548944", "--url-only", "-t", "4"])
                .unwrap();
        assert!(args.url_only);
        assert_eq!(args.threads, Some(4));
        match args.command {
            Command::User { artist_id } => assert_eq!(artist_id, "32548944"),
            _ => panic!("expected user subcommand"),
        }
    }

    #[test]
    fn test_cli_requires_subcommand() {
        let result = Args::try_parse_from(["pixivfetch"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_thread_range_enforced() {
        let result = Args::try_parse_from(["pixivfetch", "user", "1", "-t", "0"]);
        assert!(result.is_err());
        let result = Args::try_parse_from(["pixivfetch", "user", "1", "-t", "65"]);
        assert!(result.is_err());
    }
}
