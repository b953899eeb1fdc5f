//! docflow - sorts a directory of files into a category tree
//!
//! Files are routed by extension rules first (archives, installers, dated
//! media, config/log files). Everything else has a short text snippet
//! extracted and is classified by a local Ollama model, which also proposes
//! a new file name. Moves are recorded so the last run can be undone.

pub mod category;
pub mod classifier;
pub mod cli;
pub mod config;
pub mod extract;
pub mod file_task;
pub mod history;
pub mod output;
pub mod placement;
pub mod rules;
pub mod sorter;
pub mod undo;

pub use category::{Category, Taxonomy};
pub use classifier::{ClassificationResult, ContentClassifier, LlmClient, OllamaClient};
pub use config::{CompiledFilters, ConfigError, DocflowConfig};
pub use extract::ContentExtractor;
pub use file_task::FileTask;
pub use placement::PlacementResolver;
pub use rules::RuleClassifier;
pub use sorter::{BatchSummary, SortEvent, SortOptions, SortOutcome, Sorter};
pub use undo::{UndoManager, UndoReport};

pub use cli::{Cli, SortCommand, run_cli};
