//! Class table and animal taxonomy.
//!
//! The detector reports integer class ids using the 1-based COCO convention: id `i`
//! names the entry at position `i - 1` in the class table. The taxonomy maps those ids onto
//! the animals this crate watches for, trying an ordered list of strategies and taking the
//! first label any of them produces.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::{Context, Result};

/// Primary id -> label table (COCO ids).
pub const DEFAULT_ANIMAL_IDS: &[(i32, &str)] = &[
    (16, "bird"),
    (17, "cat"),
    (18, "dog"),
    (19, "horse"),
    (20, "sheep"),
    (21, "cow"),
    (22, "elephant"),
    (23, "bear"),
    (24, "zebra"),
    (25, "giraffe"),
];

/// Ids some models use for turtles and tortoises.
pub const DEFAULT_TURTLE_IDS: &[i32] = &[86, 87];
pub const DEFAULT_TURTLE_LABEL: &str = "turtle";

/// Substrings that mark a class-table entry as an animal.
///
/// "animal" and "mammal" are broad and can match unrelated classes; kept as-is.
pub const DEFAULT_KEYWORDS: &[&str] = &[
    "turtle", "tortoise", "bird", "cat", "dog", "horse", "sheep", "cow", "elephant", "bear",
    "zebra", "giraffe", "animal", "mammal",
];

/// Labels that raise an alert instead of an ordinary detection event.
pub const ALERT_LABELS: &[&str] = &["turtle", "tortoise"];

pub fn is_alert_label(label: &str) -> bool {
    ALERT_LABELS.contains(&label)
}

/// Ordered class names loaded once at startup.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClassTable {
    names: Vec<String>,
}

impl ClassTable {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    /// Load a newline-delimited class file. Trailing blank lines are stripped.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read class table {}", path.display()))?;
        Ok(Self::parse(&raw))
    }

    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim_end_matches(['\n', '\r']);
        if trimmed.is_empty() {
            return Self::default();
        }
        let names = trimmed
            .split('\n')
            .map(|line| line.trim_end_matches('\r').to_string())
            .collect();
        Self { names }
    }

    /// Look up a 1-based detector id. Ids `<= 0` or past the end yield `None`.
    pub fn name_for_id(&self, class_id: i32) -> Option<&str> {
        if class_id <= 0 {
            return None;
        }
        self.names
            .get(class_id as usize - 1)
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// One step of the resolution chain.
pub trait ResolveStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn resolve(&self, class_id: i32, classes: &ClassTable) -> Option<String>;
}

/// Explicit id -> label table.
pub struct ExplicitIds {
    labels: BTreeMap<i32, String>,
}

impl ExplicitIds {
    pub fn new(labels: BTreeMap<i32, String>) -> Self {
        Self { labels }
    }
}

impl ResolveStrategy for ExplicitIds {
    fn name(&self) -> &'static str {
        "explicit_ids"
    }

    fn resolve(&self, class_id: i32, _classes: &ClassTable) -> Option<String> {
        self.labels.get(&class_id).cloned()
    }
}

/// A set of ids that all map to one label.
pub struct FixedLabelIds {
    ids: BTreeSet<i32>,
    label: String,
}

impl FixedLabelIds {
    pub fn new(ids: impl IntoIterator<Item = i32>, label: impl Into<String>) -> Self {
        Self {
            ids: ids.into_iter().collect(),
            label: label.into(),
        }
    }
}

impl ResolveStrategy for FixedLabelIds {
    fn name(&self) -> &'static str {
        "fixed_label_ids"
    }

    fn resolve(&self, class_id: i32, _classes: &ClassTable) -> Option<String> {
        self.ids.contains(&class_id).then(|| self.label.clone())
    }
}

/// Keyword substring match against the lowercased class-table name.
pub struct KeywordMatch {
    keywords: Vec<String>,
}

impl KeywordMatch {
    pub fn new(keywords: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            keywords: keywords
                .into_iter()
                .map(|k| k.into().to_lowercase())
                .collect(),
        }
    }
}

impl ResolveStrategy for KeywordMatch {
    fn name(&self) -> &'static str {
        "keyword_match"
    }

    fn resolve(&self, class_id: i32, classes: &ClassTable) -> Option<String> {
        let name = classes.name_for_id(class_id)?.to_lowercase();
        self.keywords
            .iter()
            .any(|keyword| name.contains(keyword.as_str()))
            .then_some(name)
    }
}

/// Overrides for the default taxonomy tables.
#[derive(Clone, Debug, Default)]
pub struct TaxonomyOverrides {
    pub animal_ids: Option<BTreeMap<i32, String>>,
    pub turtle_ids: Option<Vec<i32>>,
    pub turtle_label: Option<String>,
    pub keywords: Option<Vec<String>>,
}

/// Class id -> animal label resolver.
pub struct AnimalTaxonomy {
    classes: ClassTable,
    strategies: Vec<Box<dyn ResolveStrategy>>,
}

impl AnimalTaxonomy {
    /// Empty chain; every id resolves to `None` until strategies are pushed.
    pub fn new(classes: ClassTable) -> Self {
        Self {
            classes,
            strategies: Vec::new(),
        }
    }

    /// Default chain: explicit ids, turtle ids, keyword match.
    pub fn with_defaults(classes: ClassTable) -> Self {
        Self::with_overrides(classes, TaxonomyOverrides::default())
    }

    pub fn with_overrides(classes: ClassTable, overrides: TaxonomyOverrides) -> Self {
        let animal_ids = overrides.animal_ids.unwrap_or_else(|| {
            DEFAULT_ANIMAL_IDS
                .iter()
                .map(|(id, label)| (*id, label.to_string()))
                .collect()
        });
        let turtle_ids = overrides
            .turtle_ids
            .unwrap_or_else(|| DEFAULT_TURTLE_IDS.to_vec());
        let turtle_label = overrides
            .turtle_label
            .unwrap_or_else(|| DEFAULT_TURTLE_LABEL.to_string());
        let keywords = overrides.keywords.unwrap_or_else(|| {
            DEFAULT_KEYWORDS.iter().map(|k| k.to_string()).collect()
        });

        Self::new(classes)
            .push(ExplicitIds::new(animal_ids))
            .push(FixedLabelIds::new(turtle_ids, turtle_label))
            .push(KeywordMatch::new(keywords))
    }

    /// Append a strategy at the lowest priority.
    pub fn push<S: ResolveStrategy + 'static>(mut self, strategy: S) -> Self {
        self.strategies.push(Box::new(strategy));
        self
    }

    /// Resolve a class id. `None` means "not of interest".
    pub fn resolve(&self, class_id: i32) -> Option<String> {
        self.strategies
            .iter()
            .find_map(|strategy| strategy.resolve(class_id, &self.classes))
    }

    pub fn classes(&self) -> &ClassTable {
        &self.classes
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }
}
