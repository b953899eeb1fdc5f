/// The sorting pipeline.
///
/// For every direct-child file of the source directory, in file-name order:
///
/// 1. extension rules (archives, apps, media by date, config/log files);
/// 2. otherwise a content snippet is extracted and sent to the classifier,
///    whose media answers are downgraded to `Others`;
/// 3. a collision-free destination is resolved and the file is moved.
///
/// Each file ends in exactly one [`SortOutcome`]; a failure on one file never
/// stops the batch. Only an unreadable source directory aborts the run.
use crate::category::Category;
use crate::classifier::{Classification, ContentClassifier, LlmClient};
use crate::config::{CompiledFilters, ConfigError, DocflowConfig};
use crate::extract::ContentExtractor;
use crate::file_task::FileTask;
use crate::history::{Operation, OperationLog};
use crate::placement::{Destination, PlacementError, PlacementResolver, move_file};
use crate::rules::{Bucket, RuleClassifier, RuleDecision};
use std::any::Any;
use std::collections::{BTreeMap, HashSet};
use std::fs::{self, DirEntry};
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver};
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Batch-fatal errors.
#[derive(Debug, Error)]
pub enum SortError {
    /// The source directory is missing or unreadable.
    #[error("cannot read source directory {}: {source}", path.display())]
    Enumeration { path: PathBuf, source: io::Error },
    /// The worker thread panicked.
    #[error("sorting worker stopped unexpectedly")]
    WorkerPanicked,
}

/// Which branch of the pipeline decided a file's category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Matched an extension rule.
    Rule(Bucket),
    /// Chosen by the content classifier.
    Content,
    /// The classifier failed and the default was used.
    ContentFallback,
}

/// Final state of one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortOutcome {
    Moved {
        source: PathBuf,
        destination: PathBuf,
        category: Category,
        route: Route,
    },
    /// Dry-run counterpart of `Moved`; nothing was touched.
    Planned {
        source: PathBuf,
        destination: PathBuf,
        category: Category,
        route: Route,
    },
    Skipped {
        source: PathBuf,
        reason: String,
    },
    Failed {
        source: PathBuf,
        error: String,
    },
}

impl SortOutcome {
    pub fn source(&self) -> &Path {
        match self {
            SortOutcome::Moved { source, .. }
            | SortOutcome::Planned { source, .. }
            | SortOutcome::Skipped { source, .. }
            | SortOutcome::Failed { source, .. } => source,
        }
    }

    pub fn category(&self) -> Option<&Category> {
        match self {
            SortOutcome::Moved { category, .. } | SortOutcome::Planned { category, .. } => {
                Some(category)
            }
            _ => None,
        }
    }
}

/// Progress notifications, in the order they happen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortEvent {
    /// Enumeration finished.
    Started { total: usize },
    /// Work on a file is starting.
    Processing { name: String },
    /// A file reached its final state.
    Outcome(SortOutcome),
    /// The batch is over. Always the last event.
    Completed(BatchSummary),
}

/// Counts per outcome, plus files per category for moved/planned files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub moved: usize,
    pub planned: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Directory entries that could not be inspected; they get no outcome.
    pub unreadable: usize,
    pub by_category: BTreeMap<String, usize>,
}

impl BatchSummary {
    fn record(&mut self, outcome: &SortOutcome) {
        match outcome {
            SortOutcome::Moved { .. } => self.moved += 1,
            SortOutcome::Planned { .. } => self.planned += 1,
            SortOutcome::Skipped { .. } => self.skipped += 1,
            SortOutcome::Failed { .. } => self.failed += 1,
        }
        if let Some(category) = outcome.category() {
            *self.by_category.entry(category.to_string()).or_insert(0) += 1;
        }
    }

    pub fn total(&self) -> usize {
        self.moved + self.planned + self.skipped + self.failed
    }
}

/// Run-level switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SortOptions {
    /// Decide everything but move nothing.
    pub dry_run: bool,
}

/// Handle to a batch running on its worker thread.
pub struct SortHandle {
    pub events: Receiver<SortEvent>,
    worker: JoinHandle<Result<BatchSummary, SortError>>,
}

impl SortHandle {
    /// Waits for the worker to finish.
    pub fn join(self) -> Result<BatchSummary, SortError> {
        self.worker.join().map_err(|_| SortError::WorkerPanicked)?
    }
}

/// The files found by one directory scan.
#[derive(Debug, Default)]
pub struct Listing {
    /// Direct-child regular files, sorted by name.
    pub tasks: Vec<FileTask>,
    /// Entries the directory listing could not report on.
    pub unreadable: usize,
}

impl Listing {
    fn collect<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = io::Result<DirEntry>>,
    {
        let mut listing = Listing::default();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "unreadable directory entry");
                    listing.unreadable += 1;
                    continue;
                }
            };

            match entry.file_type() {
                Ok(file_type) if file_type.is_file() => {
                    listing.tasks.push(FileTask::from_entry(&entry))
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(entry = %entry.path().display(), error = %e, "cannot determine entry type");
                    listing.unreadable += 1;
                }
            }
        }
        listing.tasks.sort_by(|a, b| a.name.cmp(&b.name));
        listing
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unexpected panic".to_string())
}

/// The classification-and-placement engine.
pub struct Sorter<C> {
    rules: RuleClassifier,
    extractor: ContentExtractor,
    classifier: ContentClassifier<C>,
    filters: CompiledFilters,
    destination_dir: String,
    max_collision_probes: u32,
    options: SortOptions,
}

/// Per-batch mutable state.
struct BatchState {
    resolver: PlacementResolver,
    reserved: HashSet<PathBuf>,
    log: OperationLog,
}

impl<C: LlmClient> Sorter<C> {
    /// Builds a sorter from configuration and a classification client.
    pub fn new(config: &DocflowConfig, client: C) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            rules: RuleClassifier::default(),
            extractor: ContentExtractor::new(),
            classifier: ContentClassifier::new(client, config.classifier.taxonomy()?),
            filters: config.filters.compile()?,
            destination_dir: config.sorting.destination_dir.clone(),
            max_collision_probes: config.sorting.max_collision_probes,
            options: SortOptions::default(),
        })
    }

    pub fn with_options(mut self, options: SortOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_rules(mut self, rules: RuleClassifier) -> Self {
        self.rules = rules;
        self
    }

    /// The destination root for a source directory.
    pub fn destination_root(&self, source_root: &Path) -> PathBuf {
        source_root.join(&self.destination_dir)
    }

    /// Snapshots the direct-child regular files of `source_root`, sorted by name.
    pub fn enumerate(&self, source_root: &Path) -> Result<Listing, SortError> {
        let entries = fs::read_dir(source_root).map_err(|e| SortError::Enumeration {
            path: source_root.to_path_buf(),
            source: e,
        })?;
        Ok(Listing::collect(entries))
    }

    /// Runs the batch on the calling thread, reporting through `on_event`.
    pub fn run<F>(&self, source_root: &Path, mut on_event: F) -> Result<BatchSummary, SortError>
    where
        F: FnMut(SortEvent),
    {
        let Listing { tasks, unreadable } = self.enumerate(source_root)?;
        let destination_root = self.destination_root(source_root);
        info!(
            source = %source_root.display(),
            destination = %destination_root.display(),
            files = tasks.len(),
            dry_run = self.options.dry_run,
            "starting sort"
        );
        on_event(SortEvent::Started { total: tasks.len() });

        let mut state = BatchState {
            resolver: PlacementResolver::new(destination_root.clone())
                .with_max_probes(self.max_collision_probes),
            reserved: HashSet::new(),
            log: OperationLog::new(source_root.to_path_buf()),
        };
        let mut summary = BatchSummary {
            unreadable,
            ..BatchSummary::default()
        };

        for task in &tasks {
            on_event(SortEvent::Processing {
                name: task.name.clone(),
            });
            let outcome = self.process_isolated(task, &mut state);
            if let SortOutcome::Failed { error, .. } = &outcome {
                warn!(file = %task.name, %error, "file failed");
            }
            summary.record(&outcome);
            on_event(SortEvent::Outcome(outcome));
        }

        if !state.log.is_empty()
            && let Err(e) = state.log.save(&destination_root)
        {
            warn!(error = %e, "could not save sorting history; undo will not be available");
        }

        info!(
            moved = summary.moved,
            planned = summary.planned,
            skipped = summary.skipped,
            failed = summary.failed,
            unreadable = summary.unreadable,
            "sort complete"
        );
        on_event(SortEvent::Completed(summary.clone()));
        Ok(summary)
    }

    /// Runs [`process`](Self::process) and turns a panic into a `Failed` outcome.
    fn process_isolated(&self, task: &FileTask, state: &mut BatchState) -> SortOutcome {
        panic::catch_unwind(AssertUnwindSafe(|| self.process(task, state))).unwrap_or_else(
            |payload| SortOutcome::Failed {
                source: task.path.clone(),
                error: format!("internal error: {}", panic_message(payload.as_ref())),
            },
        )
    }

    /// Carries one file to its terminal state.
    fn process(&self, task: &FileTask, state: &mut BatchState) -> SortOutcome {
        if let Some(exclusion) = self.filters.exclusion_for(&task.name) {
            return SortOutcome::Skipped {
                source: task.path.clone(),
                reason: exclusion.to_string(),
            };
        }

        let (category, raw_name, route) = match self.rules.classify(task) {
            RuleDecision::Matched { bucket, category } => {
                debug!(file = %task.name, %category, bucket = bucket.label(), "rule matched");
                (category, task.name.clone(), Route::Rule(bucket))
            }
            RuleDecision::MissingTimestamp { bucket } => {
                warn!(
                    file = %task.name,
                    bucket = bucket.label(),
                    "no readable modification time, classifying by content"
                );
                self.classify_content(task)
            }
            RuleDecision::NoMatch => self.classify_content(task),
        };

        match self.place(task, &category, &raw_name, state) {
            Ok(destination) if self.options.dry_run => SortOutcome::Planned {
                source: task.path.clone(),
                destination: destination.path,
                category,
                route,
            },
            Ok(destination) => SortOutcome::Moved {
                source: task.path.clone(),
                destination: destination.path,
                category,
                route,
            },
            Err(e) => SortOutcome::Failed {
                source: task.path.clone(),
                error: e.to_string(),
            },
        }
    }

    /// Content path: snippet, classifier, media downgrade.
    fn classify_content(&self, task: &FileTask) -> (Category, String, Route) {
        let snippet = self.extractor.snippet(&task.path, &task.extension);
        let classification = self.classifier.classify(&task.name, &snippet);
        let route = match classification {
            Classification::Accepted(_) => Route::Content,
            Classification::Degraded { .. } => Route::ContentFallback,
        };

        let mut result = classification.into_result();
        if result.category.is_media() {
            debug!(file = %task.name, category = %result.category, "media category from classifier downgraded");
            result.category = Category::fallback();
        }

        (result.category, result.suggested_name, route)
    }

    /// Resolves the destination and, unless dry-running, moves the file.
    fn place(
        &self,
        task: &FileTask,
        category: &Category,
        raw_name: &str,
        state: &mut BatchState,
    ) -> Result<Destination, PlacementError> {
        let fallback_stem = task.stem();
        let suffix = task.original_suffix();

        if self.options.dry_run {
            let destination =
                state
                    .resolver
                    .plan(category, raw_name, &fallback_stem, &suffix, &state.reserved)?;
            state.reserved.insert(destination.path.clone());
            return Ok(destination);
        }

        let destination = state
            .resolver
            .resolve(category, raw_name, &fallback_stem, &suffix)?;
        move_file(&task.path, &destination.path)?;
        info!(
            file = %task.name,
            destination = %destination.path.display(),
            "moved"
        );

        state.log.add_operation(Operation {
            original_path: task.path.clone(),
            new_path: destination.path.clone(),
            category: category.to_string(),
        });
        Ok(destination)
    }
}

impl<C: LlmClient + Send + 'static> Sorter<C> {
    /// Runs the batch on a dedicated worker thread.
    ///
    /// Events arrive on the returned handle's receiver in processing order;
    /// the channel closes after [`SortEvent::Completed`] (or after the
    /// enumeration error, which is returned from [`SortHandle::join`]).
    pub fn spawn(self, source_root: PathBuf) -> SortHandle {
        let (tx, rx) = mpsc::channel();
        let worker = thread::spawn(move || {
            self.run(&source_root, |event| {
                // The receiver may have been dropped; the batch still completes.
                let _ = tx.send(event);
            })
        });

        SortHandle { events: rx, worker }
    }
}
