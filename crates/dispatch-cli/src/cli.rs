//! Command-line interface definition using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use dispatch_core::config::STATE_DIR_ENV;
use dispatch_metrics::DEFAULT_REPORT_DAYS;

/// Dispatch - route prompts to the agents best suited to answer them
#[derive(Parser, Debug)]
#[command(name = "dispatch")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to state directory
    #[arg(short, long, env = STATE_DIR_ENV, global = true)]
    pub state_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Route a prompt and print the response as JSON
    Ask {
        /// Prompt to route
        #[arg(required = true)]
        prompt: String,

        /// Earlier turns, oldest first ("user: ...", "assistant: ...")
        #[arg(long = "history", value_name = "TEXT")]
        history: Vec<String>,
    },

    /// List configured agents and tools
    Capabilities {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Usage reports from recorded requests
    Metrics {
        #[command(subcommand)]
        command: MetricsCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum MetricsCommands {
    /// Request totals
    Summary {
        /// Days to look back
        #[arg(long, default_value_t = DEFAULT_REPORT_DAYS)]
        days: u32,
    },

    /// Per-agent statistics
    Agents {
        /// Days to look back
        #[arg(long, default_value_t = DEFAULT_REPORT_DAYS)]
        days: u32,

        /// Only this agent
        #[arg(long)]
        agent: Option<String>,
    },

    /// Per-tool statistics
    Tools {
        /// Days to look back
        #[arg(long, default_value_t = DEFAULT_REPORT_DAYS)]
        days: u32,

        /// Only this tool
        #[arg(long)]
        tool: Option<String>,
    },

    /// Full record of one request
    Request {
        /// Request ID
        #[arg(required = true)]
        id: String,
    },
}

impl Cli {
    /// Returns the state directory path, using default if not specified.
    pub fn state_dir(&self) -> PathBuf {
        self.state_dir
            .clone()
            .unwrap_or_else(dispatch_core::state_dir)
    }

    /// Returns the log level based on verbosity.
    pub fn log_level(&self) -> tracing::Level {
        match self.verbose {
            0 => tracing::Level::WARN,
            1 => tracing::Level::INFO,
            2 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parse_ask() {
        let cli = Cli::parse_from([
            "dispatch",
            "ask",
            "translate hello",
            "--history",
            "user: hi",
            "--history",
            "assistant: hello",
        ]);
        match cli.command {
            Commands::Ask { prompt, history } => {
                assert_eq!(prompt, "translate hello");
                assert_eq!(history, vec!["user: hi", "assistant: hello"]);
            }
            _ => panic!("Expected Ask command"),
        }
    }

    #[test]
    fn test_cli_parse_metrics_defaults() {
        let cli = Cli::parse_from(["dispatch", "metrics", "agents"]);
        match cli.command {
            Commands::Metrics {
                command: MetricsCommands::Agents { days, agent },
            } => {
                assert_eq!(days, DEFAULT_REPORT_DAYS);
                assert!(agent.is_none());
            }
            _ => panic!("Expected metrics agents command"),
        }
    }

    #[test]
    fn test_cli_parse_metrics_tool_filter() {
        let cli = Cli::parse_from([
            "dispatch",
            "metrics",
            "tools",
            "--days",
            "7",
            "--tool",
            "word_count",
        ]);
        match cli.command {
            Commands::Metrics {
                command: MetricsCommands::Tools { days, tool },
            } => {
                assert_eq!(days, 7);
                assert_eq!(tool.as_deref(), Some("word_count"));
            }
            _ => panic!("Expected metrics tools command"),
        }
    }

    #[test]
    fn test_cli_verbose() {
        let cli = Cli::parse_from(["dispatch", "-vv", "capabilities"]);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.log_level(), tracing::Level::DEBUG);
    }

    #[test]
    fn test_cli_state_dir_flag() {
        let cli = Cli::parse_from(["dispatch", "--state-dir", "/tmp/dispatch", "capabilities"]);
        assert_eq!(cli.state_dir(), PathBuf::from("/tmp/dispatch"));
    }

    #[test]
    fn test_cli_help() {
        Cli::command().debug_assert();
    }
}
