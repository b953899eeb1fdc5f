/// Category paths and the closed taxonomy the content classifier chooses from.
///
/// A category is a forward-slash delimited path such as `Career/CV` or
/// `Media/Images/2023/05_May`. It is always relative to the destination root
/// and never contains path-traversal segments.
///
/// # Examples
///
/// ```
/// use docflow::category::{Category, Taxonomy};
///
/// let taxonomy = Taxonomy::default();
/// assert!(taxonomy.contains("Programming/Python"));
/// assert!(Category::parse("Media/Images").unwrap().is_media());
/// assert!(Category::parse("../etc").is_err());
/// ```
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Category used whenever nothing better is known.
pub const FALLBACK_CATEGORY: &str = "Others";

/// Top-level segment reserved for the media-by-date rule.
const MEDIA_ROOT: &str = "Media";

/// Taxonomy the classifier is offered when the configuration does not override it.
pub const DEFAULT_TAXONOMY: &[&str] = &[
    "Career/CV",
    "Career/Contracts",
    "Career/Documents",
    "Programming/Python",
    "Programming/WebDev",
    "Programming/C_CPP",
    "Programming/DataScience",
    "University/Homework",
    "University/Projects",
    "University/Materials",
    "Media/Images",
    "Media/Videos",
    FALLBACK_CATEGORY,
];

/// Reasons a string is rejected as a category path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CategoryError {
    #[error("category is empty")]
    Empty,
    #[error("category '{0}' contains an empty segment")]
    EmptySegment(String),
    #[error("category '{0}' contains a path-traversal segment")]
    Traversal(String),
    #[error("category '{path}' contains reserved character '{character}'")]
    ReservedCharacter { path: String, character: char },
}

/// A validated, `/`-delimited category path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Category(String);

impl Category {
    /// Parses and validates a category path.
    ///
    /// Leading and trailing slashes and surrounding whitespace are trimmed.
    /// Segments may not be empty, `.` or `..`, and may not contain `\`, `:`
    /// or control characters.
    pub fn parse(raw: &str) -> Result<Self, CategoryError> {
        let trimmed = raw.trim().trim_matches('/');
        if trimmed.is_empty() {
            return Err(CategoryError::Empty);
        }

        for segment in trimmed.split('/') {
            let segment = segment.trim();
            if segment.is_empty() {
                return Err(CategoryError::EmptySegment(raw.to_string()));
            }
            if segment == "." || segment == ".." {
                return Err(CategoryError::Traversal(raw.to_string()));
            }
            if let Some(character) = segment
                .chars()
                .find(|c| matches!(c, '\\' | ':' | '\0') || c.is_control())
            {
                return Err(CategoryError::ReservedCharacter {
                    path: raw.to_string(),
                    character,
                });
            }
        }

        let normalized = trimmed
            .split('/')
            .map(str::trim)
            .collect::<Vec<_>>()
            .join("/");
        Ok(Self(normalized))
    }

    /// The catch-all `Others` category.
    pub fn fallback() -> Self {
        Self(FALLBACK_CATEGORY.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Iterates over the path segments.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }

    /// Returns true for anything under the `Media` branch.
    pub fn is_media(&self) -> bool {
        self.segments().next() == Some(MEDIA_ROOT)
    }

    /// Returns a new category with `segment` appended.
    pub fn join(&self, segment: &str) -> Result<Self, CategoryError> {
        Self::parse(&format!("{}/{}", self.0, segment))
    }

    /// Resolves this category as a directory below `root`.
    pub fn dir_under(&self, root: &Path) -> PathBuf {
        self.segments().fold(root.to_path_buf(), |dir, seg| dir.join(seg))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Category {
    type Error = CategoryError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Category> for String {
    fn from(category: Category) -> Self {
        category.0
    }
}

/// The closed, ordered list of categories offered to the content classifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Taxonomy {
    entries: Vec<Category>,
}

impl Taxonomy {
    /// Builds a taxonomy from raw strings, validating every entry.
    ///
    /// Duplicates are dropped and `Others` is appended when missing, so the
    /// fallback category is always a valid choice.
    pub fn new<I, S>(entries: I) -> Result<Self, CategoryError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut parsed: Vec<Category> = Vec::new();
        for entry in entries {
            let category = Category::parse(entry.as_ref())?;
            if !parsed.contains(&category) {
                parsed.push(category);
            }
        }

        let fallback = Category::fallback();
        if !parsed.contains(&fallback) {
            parsed.push(fallback);
        }

        Ok(Self { entries: parsed })
    }

    pub fn entries(&self) -> &[Category] {
        &self.entries
    }

    /// Looks up an exact taxonomy entry.
    pub fn get(&self, raw: &str) -> Option<&Category> {
        let wanted = raw.trim().trim_matches('/');
        self.entries.iter().find(|c| c.as_str() == wanted)
    }

    pub fn contains(&self, raw: &str) -> bool {
        self.get(raw).is_some()
    }
}

impl Default for Taxonomy {
    fn default() -> Self {
        Self {
            entries: DEFAULT_TAXONOMY
                .iter()
                .map(|entry| Category(entry.to_string()))
                .collect(),
        }
    }
}
