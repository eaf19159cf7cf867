use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Never prompt; decline anything that needs confirmation
    #[arg(long, global = true)]
    pub unattended: bool,

    /// Folder to process (defaults to the current directory).
    /// A folder named like a subcommand needs `process <FOLDER>` or a `./` prefix
    pub folder: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Process every MKV file in a folder
    Process {
        /// Input folder (defaults to the current directory)
        folder: Option<PathBuf>,
    },

    /// Push local ledger records missing from the remote log
    Resync {
        /// Input folder (defaults to the current directory)
        folder: Option<PathBuf>,
    },

    /// Print the processed-files ledger of a folder
    Log {
        /// Input folder (defaults to the current directory)
        folder: Option<PathBuf>,
    },

    /// Check that ffmpeg and ffprobe are available
    Check,

    /// Manage persisted settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the settings file location
    Path,

    /// Print the effective settings (token masked)
    Show,

    /// Write the effective settings to the settings file
    Init,

    /// Delete the settings file
    Reset,
}

impl Args {
    /// The folder to process when no subcommand is given
    pub fn default_command(&self) -> Commands {
        Commands::Process {
            folder: self.folder.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_folder_means_process() {
        let args = Args::try_parse_from(["mkv-processor", "/media/movies"]).unwrap();
        assert!(args.command.is_none());
        match args.default_command() {
            Commands::Process { folder } => assert_eq!(folder, Some(PathBuf::from("/media/movies"))),
            _ => panic!("expected process"),
        }
    }

    #[test]
    fn test_no_arguments_uses_current_folder() {
        let args = Args::try_parse_from(["mkv-processor"]).unwrap();
        assert!(matches!(args.default_command(), Commands::Process { folder: None }));
    }

    #[test]
    fn test_subcommands_and_global_flags() {
        let args = Args::try_parse_from(["mkv-processor", "resync", "/media", "--unattended", "-v"]).unwrap();
        assert!(args.unattended);
        assert!(args.verbose);
        assert!(matches!(args.command, Some(Commands::Resync { folder: Some(_) })));

        let args = Args::try_parse_from(["mkv-processor", "config", "show"]).unwrap();
        assert!(matches!(args.command, Some(Commands::Config { action: ConfigAction::Show })));
    }

    #[test]
    fn test_folder_named_like_a_subcommand() {
        let bare = Args::try_parse_from(["mkv-processor", "log"]).unwrap();
        assert!(matches!(bare.command, Some(Commands::Log { folder: None })));

        let explicit = Args::try_parse_from(["mkv-processor", "process", "log"]).unwrap();
        match explicit.command {
            Some(Commands::Process { folder }) => assert_eq!(folder, Some(PathBuf::from("log"))),
            _ => panic!("expected process"),
        }

        let relative = Args::try_parse_from(["mkv-processor", "./check"]).unwrap();
        assert!(relative.command.is_none());
        assert_eq!(relative.folder, Some(PathBuf::from("./check")));
    }
}
