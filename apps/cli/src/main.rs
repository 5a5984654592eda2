mod commands;

use clap::error::ErrorKind;
use clap::{ArgAction, CommandFactory, Parser, Subcommand};
use commands::SitePaths;
use dapper_ssg::{ConfigOverrides, DEFAULT_CONFIG_PATH};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "dapper", version)]
#[command(about = "A small static site generator", long_about = None)]
#[command(disable_version_flag = true)]
struct Cli {
    /// Print version
    #[arg(short = 'v', long, action = ArgAction::Version)]
    version: (),

    /// Source directory (overrides `source` in the config file)
    #[arg(short, long, global = true)]
    source: Option<PathBuf>,

    /// Output directory (overrides `output` in the config file)
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Layout directory (overrides `layout` in the config file)
    #[arg(short, long, global = true)]
    layout: Option<PathBuf>,

    /// Config file
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log build details
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a starter site in the current directory
    Init,
    /// Build the site once
    Build {
        /// Remove the output directory first
        #[arg(long)]
        clean: bool,
    },
    /// Build, serve the output directory and rebuild on changes
    Serve {
        #[arg(short, long, default_value_t = 8000)]
        port: u16,

        /// Poll interval in milliseconds
        #[arg(long, default_value_t = 1000)]
        interval: u64,

        /// Remove the output directory before the initial build
        #[arg(long)]
        clean: bool,
    },
    /// Rebuild whenever the source, layouts or config change
    Watch {
        /// Poll interval in milliseconds
        #[arg(long, default_value_t = 1000)]
        interval: u64,
    },
}

impl Cli {
    fn paths(&self) -> SitePaths {
        SitePaths {
            config: self.config.clone(),
            overrides: ConfigOverrides {
                source: self.source.clone(),
                layout: self.layout.clone(),
                output: self.output.clone(),
            },
        }
    }
}

fn print_help() {
    if let Err(error) = Cli::command().print_help() {
        eprintln!("Error: {error}");
    }
}

#[tokio::main]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(error) if error.kind() == ErrorKind::InvalidSubcommand => {
            print_help();
            return;
        }
        Err(error) => error.exit(),
    };

    let filter = if cli.verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let paths = cli.paths();
    let Some(command) = cli.command else {
        print_help();
        return;
    };

    let result = match command {
        Commands::Init => commands::init_site(&std::env::current_dir().unwrap_or_default()),
        Commands::Build { clean } => commands::build_site(&paths, clean),
        Commands::Serve {
            port,
            interval,
            clean,
        } => commands::serve_site(paths, port, Duration::from_millis(interval), clean).await,
        Commands::Watch { interval } => {
            commands::watch_site(paths, Duration::from_millis(interval)).await
        }
    };

    if let Err(error) = result {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_before_command() {
        let cli = Cli::try_parse_from(["dapper", "-s", "src", "-o", "dist", "build"]).unwrap();
        let paths = cli.paths();
        assert_eq!(paths.overrides.source, Some(PathBuf::from("src")));
        assert_eq!(paths.overrides.output, Some(PathBuf::from("dist")));
        assert_eq!(paths.overrides.layout, None);
        assert_eq!(paths.config, PathBuf::from("_config.yml"));
        assert!(matches!(cli.command, Some(Commands::Build { clean: false })));
    }

    #[test]
    fn test_flags_after_command() {
        let cli = Cli::try_parse_from(["dapper", "watch", "-l", "layouts", "-c", "site.yml"])
            .unwrap();
        let paths = cli.paths();
        assert_eq!(paths.overrides.layout, Some(PathBuf::from("layouts")));
        assert_eq!(paths.config, PathBuf::from("site.yml"));
    }

    #[test]
    fn test_serve_defaults_to_port_8000() {
        let cli = Cli::try_parse_from(["dapper", "serve"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Serve {
                port: 8000,
                interval: 1000,
                clean: false
            })
        ));
    }

    #[test]
    fn test_watch_has_no_clean_flag() {
        let error = Cli::try_parse_from(["dapper", "watch", "--clean"]).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::UnknownArgument);
    }

    #[test]
    fn test_short_v_prints_version() {
        let error = Cli::try_parse_from(["dapper", "-v"]).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::DisplayVersion);
    }

    #[test]
    fn test_short_h_prints_help() {
        let error = Cli::try_parse_from(["dapper", "-h"]).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_unknown_command_is_invalid_subcommand() {
        let error = Cli::try_parse_from(["dapper", "publish"]).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidSubcommand);
    }

    #[test]
    fn test_no_command_parses() {
        let cli = Cli::try_parse_from(["dapper"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }
}
