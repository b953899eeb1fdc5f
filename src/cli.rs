//! Command-line interface for docflow.
//!
//! Parses arguments, loads configuration, and drives either a sorting batch
//! (on a worker thread, with a live progress bar) or an undo.

use crate::classifier::{ClassifyError, OllamaClient};
use crate::config::{ConfigError, DocflowConfig};
use crate::output::OutputFormatter;
use crate::sorter::{SortError, SortEvent, SortOptions, Sorter};
use crate::undo::{UndoError, UndoManager};
use clap::{ArgAction, Parser};
use indicatif::ProgressBar;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Sort a directory into categories using extension rules and a local LLM.
#[derive(Debug, Parser)]
#[command(name = "docflow", version, about, long_about = None)]
pub struct Cli {
    /// Directory whose files should be sorted
    pub directory: PathBuf,

    /// Show where every file would go without moving anything
    #[arg(long, conflicts_with = "undo")]
    pub dry_run: bool,

    /// Move the files of the last run back to where they were
    #[arg(long)]
    pub undo: bool,

    /// Configuration file (defaults to .docflowrc.toml, then ~/.config/docflow/config.toml)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Model used for content classification
    #[arg(long, value_name = "NAME")]
    pub model: Option<String>,

    /// Ollama server address
    #[arg(long, value_name = "URL")]
    pub host: Option<String>,

    /// Per-request classification timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

/// What the binary was asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortCommand {
    Sort { dry_run: bool },
    Undo,
}

impl Cli {
    pub fn command(&self) -> SortCommand {
        if self.undo {
            SortCommand::Undo
        } else {
            SortCommand::Sort {
                dry_run: self.dry_run,
            }
        }
    }

    /// Loads the configuration and applies command-line overrides.
    pub fn load_config(&self) -> Result<DocflowConfig, CliError> {
        let mut config = DocflowConfig::load(self.config.as_deref())?;
        if let Some(model) = &self.model {
            config.classifier.model = model.clone();
        }
        if let Some(host) = &self.host {
            config.classifier.host = host.clone();
        }
        if let Some(timeout) = self.timeout {
            config.classifier.timeout_secs = timeout;
        }
        config.validate()?;
        Ok(config)
    }
}

/// Top-level failures reported by the binary.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Classifier(#[from] ClassifyError),
    #[error(transparent)]
    Sort(#[from] SortError),
    #[error(transparent)]
    Undo(#[from] UndoError),
}

/// Installs the stderr log subscriber. `RUST_LOG` wins over `-v`.
pub fn init_tracing(verbosity: u8) {
    let default_level = match verbosity {
        0 => "docflow=warn",
        1 => "docflow=info",
        _ => "docflow=debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

/// Runs the parsed command line.
pub fn run_cli(cli: &Cli) -> Result<(), CliError> {
    let config = cli.load_config()?;
    match cli.command() {
        SortCommand::Sort { dry_run } => sort_directory(&cli.directory, &config, dry_run),
        SortCommand::Undo => undo_sort(&cli.directory, &config),
    }
}

/// Sorts `source_root` on a worker thread, rendering events as they arrive.
pub fn sort_directory(
    source_root: &Path,
    config: &DocflowConfig,
    dry_run: bool,
) -> Result<(), CliError> {
    let client = OllamaClient::new(&config.classifier.client_settings())?;
    let sorter = Sorter::new(config, client)?.with_options(SortOptions { dry_run });
    let destination_root = sorter.destination_root(source_root);

    if dry_run {
        OutputFormatter::dry_run_notice(&format!("Analyzing {}", source_root.display()));
    } else {
        OutputFormatter::info(&format!(
            "Sorting {} into {}",
            source_root.display(),
            destination_root.display()
        ));
    }

    let handle = sorter.spawn(source_root.to_path_buf());
    let mut progress: Option<ProgressBar> = None;

    for event in handle.events.iter() {
        match event {
            SortEvent::Started { total } => {
                if total == 0 {
                    OutputFormatter::info("No files to sort.");
                } else {
                    progress = Some(OutputFormatter::create_progress_bar(total as u64));
                }
            }
            SortEvent::Processing { name } => {
                if let Some(pb) = &progress {
                    pb.set_message(name);
                }
            }
            SortEvent::Outcome(outcome) => {
                let line = OutputFormatter::outcome_line(&outcome, &destination_root);
                match &progress {
                    Some(pb) => {
                        pb.println(line);
                        pb.inc(1);
                    }
                    None => println!("{line}"),
                }
            }
            SortEvent::Completed(summary) => {
                if let Some(pb) = progress.take() {
                    pb.finish_and_clear();
                }
                if summary.total() > 0 || summary.unreadable > 0 {
                    OutputFormatter::summary_table(&summary, dry_run);
                }
                if dry_run {
                    OutputFormatter::dry_run_notice("No files were modified.");
                } else {
                    OutputFormatter::success("Done.");
                    if summary.moved > 0 {
                        OutputFormatter::info(&format!(
                            "Use 'docflow {} --undo' to revert.",
                            source_root.display()
                        ));
                    }
                }
                if summary.failed > 0 {
                    OutputFormatter::warning("Some files could not be sorted; see the errors above.");
                }
            }
        }
    }

    handle.join()?;
    Ok(())
}

fn undo_sort(source_root: &Path, config: &DocflowConfig) -> Result<(), CliError> {
    OutputFormatter::info("Undoing the last sorting run...");
    let report = UndoManager::undo(source_root, &config.sorting.destination_dir)?;
    OutputFormatter::undo_report(&report);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsStr;

    #[test]
    fn test_parse_sort_with_overrides() {
        let cli = Cli::try_parse_from([
            "docflow",
            "/tmp/downloads",
            "--dry-run",
            "--model",
            "mistral",
            "--timeout",
            "30",
            "-vv",
        ])
        .unwrap();

        assert_eq!(cli.command(), SortCommand::Sort { dry_run: true });
        assert_eq!(cli.model.as_deref(), Some("mistral"));
        assert_eq!(cli.timeout, Some(30));
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_undo_conflicts_with_dry_run() {
        let result = Cli::try_parse_from(["docflow", "/tmp/x", "--undo", "--dry-run"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_directory_is_required() {
        assert!(Cli::try_parse_from(["docflow"]).is_err());
    }

    #[test]
    fn test_overrides_applied_to_config() {
        let temp = tempfile::TempDir::new().unwrap();
        let config_path = temp.path().join("docflow.toml");
        std::fs::write(&config_path, "[classifier]\nmodel = \"llama3\"\n").unwrap();
        let cli = Cli::try_parse_from([
            OsStr::new("docflow"),
            temp.path().as_os_str(),
            OsStr::new("--config"),
            config_path.as_os_str(),
            OsStr::new("--host"),
            OsStr::new("http://gpu-box:11434"),
        ])
        .unwrap();

        let config = cli.load_config().unwrap();
        assert_eq!(config.classifier.host, "http://gpu-box:11434");
        assert_eq!(config.classifier.model, "llama3");
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let cli = Cli::try_parse_from(["docflow", "/tmp/x", "--timeout", "0"]).unwrap();
        assert!(matches!(cli.load_config(), Err(CliError::Config(_))));
    }
}
