/// Deterministic, extension-based classification.
///
/// This module maps a file's extension (and, for media, its modification time)
/// to a category path without looking at the file's contents. Extensions are
/// looked up in a single table keyed by extension, and buckets are checked in a
/// fixed priority order so an extension can never land in two places.
///
/// # Examples
///
/// ```
/// use docflow::rules::{Bucket, RuleClassifier};
///
/// let rules = RuleClassifier::default();
/// assert_eq!(rules.bucket_for("zip"), Some(Bucket::Archive));
/// assert_eq!(rules.bucket_for("EXE"), Some(Bucket::App));
/// assert_eq!(rules.bucket_for("pdf"), None);
/// ```
use crate::category::{Category, FALLBACK_CATEGORY};
use crate::file_task::FileTask;
use chrono::{DateTime, Datelike, Local, Utc};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

/// A family of extensions with a fixed routing rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Bucket {
    /// Compressed archives and packages.
    Archive,
    /// Executables, installers, scripts and disk images.
    App,
    /// Still images, routed by date.
    Image,
    /// Videos, routed by date.
    Video,
    /// Configuration, logs and temporary files.
    Misc,
}

impl Bucket {
    /// Evaluation order. Earlier buckets win.
    pub const PRIORITY: [Bucket; 5] = [
        Bucket::Archive,
        Bucket::App,
        Bucket::Image,
        Bucket::Video,
        Bucket::Misc,
    ];

    /// Returns the category for the non-media buckets.
    pub fn fixed_category(&self) -> Option<&'static str> {
        match self {
            Bucket::Archive => Some("Archives"),
            Bucket::App => Some("Apps"),
            Bucket::Misc => Some(FALLBACK_CATEGORY),
            Bucket::Image | Bucket::Video => None,
        }
    }

    /// Returns the base category for the media buckets.
    pub fn media_root(&self) -> Option<&'static str> {
        match self {
            Bucket::Image => Some("Media/Images"),
            Bucket::Video => Some("Media/Videos"),
            _ => None,
        }
    }

    /// Short label used in progress output.
    pub fn label(&self) -> &'static str {
        match self {
            Bucket::Archive => "archive",
            Bucket::App => "app",
            Bucket::Image => "image",
            Bucket::Video => "video",
            Bucket::Misc => "config/log",
        }
    }

    fn rank(&self) -> usize {
        Self::PRIORITY
            .iter()
            .position(|b| b == self)
            .unwrap_or(Self::PRIORITY.len())
    }
}

/// Outcome of running the rule chain over one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleDecision {
    /// A rule claimed the file.
    Matched { bucket: Bucket, category: Category },
    /// A media rule matched the extension but could not date the file.
    MissingTimestamp { bucket: Bucket },
    /// No rule applies; defer to content classification.
    NoMatch,
}

/// Maps extensions to buckets and buckets to categories.
#[derive(Debug, Clone)]
pub struct RuleClassifier {
    extension_map: HashMap<String, Bucket>,
}

impl RuleClassifier {
    /// Creates a classifier with the standard extension table.
    pub fn new() -> Self {
        let mut rules = Self {
            extension_map: HashMap::new(),
        };
        rules.populate_standard_mappings();
        rules
    }

    fn populate_standard_mappings(&mut self) {
        for ext in ["zip", "rar", "7z", "tar", "gz", "pkg"] {
            self.add_extension_mapping(ext, Bucket::Archive);
        }
        for ext in ["exe", "msi", "bat", "sh", "iso", "dmg"] {
            self.add_extension_mapping(ext, Bucket::App);
        }
        for ext in ["jpg", "jpeg", "png", "gif", "bmp", "heic", "webp"] {
            self.add_extension_mapping(ext, Bucket::Image);
        }
        for ext in ["mp4", "mov", "avi", "mkv", "webm"] {
            self.add_extension_mapping(ext, Bucket::Video);
        }
        for ext in [
            "yml", "yaml", "ini", "cfg", "log", "tmp", "bak", "config", "xml",
        ] {
            self.add_extension_mapping(ext, Bucket::Misc);
        }
    }

    /// Adds an extension to the table.
    ///
    /// If the extension is already mapped, the higher-priority bucket is kept
    /// so the fixed evaluation order cannot be subverted by insertion order.
    pub fn add_extension_mapping(&mut self, ext: &str, bucket: Bucket) {
        let key = ext.trim_start_matches('.').to_lowercase();
        self.extension_map
            .entry(key)
            .and_modify(|existing| {
                if bucket.rank() < existing.rank() {
                    *existing = bucket;
                }
            })
            .or_insert(bucket);
    }

    /// Looks up the bucket for an extension (case-insensitive, dot optional).
    pub fn bucket_for(&self, ext: &str) -> Option<Bucket> {
        self.extension_map
            .get(&ext.trim_start_matches('.').to_lowercase())
            .copied()
    }

    /// Runs the rule chain for a file snapshot.
    ///
    /// The decision depends only on the snapshot's extension and modification
    /// time; the file itself is never opened.
    pub fn classify(&self, task: &FileTask) -> RuleDecision {
        let Some(bucket) = self.bucket_for(&task.extension) else {
            debug!(file = %task.name, "no extension rule");
            return RuleDecision::NoMatch;
        };

        if let Some(fixed) = bucket.fixed_category() {
            return match Category::parse(fixed) {
                Ok(category) => RuleDecision::Matched { bucket, category },
                Err(_) => RuleDecision::NoMatch,
            };
        }

        match task
            .modified
            .and_then(|modified| media_category(bucket, modified))
        {
            Some(category) => RuleDecision::Matched { bucket, category },
            None => {
                debug!(file = %task.name, "media rule declined: no usable modification time");
                RuleDecision::MissingTimestamp { bucket }
            }
        }
    }

    /// Convenience form of [`classify`](Self::classify) returning only the category.
    pub fn classify_by_rule(&self, task: &FileTask) -> Option<Category> {
        match self.classify(task) {
            RuleDecision::Matched { category, .. } => Some(category),
            _ => None,
        }
    }
}

impl Default for RuleClassifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds `Media/<Images|Videos>/<YYYY>/<MM>_<MonthName>` in local time.
///
/// Returns `None` when the timestamp cannot be dated with a four-digit year.
pub fn media_category(bucket: Bucket, modified: SystemTime) -> Option<Category> {
    let root = bucket.media_root()?;
    let date = local_date(modified)?;
    if !(0..=9999).contains(&date.year()) {
        return None;
    }
    let path = format!("{}/{}", root, date.format("%Y/%m_%B"));
    Category::parse(&path).ok()
}

/// Converts without panicking on timestamps outside chrono's range.
fn local_date(time: SystemTime) -> Option<DateTime<Local>> {
    let (secs, nanos) = match time.duration_since(UNIX_EPOCH) {
        Ok(after) => (i64::try_from(after.as_secs()).ok()?, after.subsec_nanos()),
        Err(before) => {
            let before = before.duration();
            let secs = i64::try_from(before.as_secs()).ok()?.checked_neg()?;
            match before.subsec_nanos() {
                0 => (secs, 0),
                n => (secs.checked_sub(1)?, 1_000_000_000 - n),
            }
        }
    };
    DateTime::<Utc>::from_timestamp(secs, nanos).map(|utc| utc.with_timezone(&Local))
}
