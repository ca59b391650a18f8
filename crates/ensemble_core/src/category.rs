//! Static metadata describing result categories.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Importance of a result category.
///
/// Variants are ordered most important first, so an ascending sort puts
/// critical categories at the front.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CategoryPriority {
    /// The composite result is unusable without it.
    Critical,
    /// Important but not essential.
    High,
    /// Useful context.
    #[default]
    Medium,
    /// Nice to have.
    Low,
}

/// Per-category metadata.
///
/// ```toml
/// [categories.spread]
/// priority = "high"
/// depends_on = ["winner"]
/// has_fallback = true
/// default_value = 0.0
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CategorySpec {
    /// Importance of this category.
    #[serde(default)]
    pub priority: CategoryPriority,

    /// Categories a fallback value may be derived from.
    #[serde(default)]
    pub depends_on: Vec<String>,

    /// Whether any fallback may stand in for this category.
    #[serde(default)]
    pub has_fallback: bool,

    /// Static value used when nothing can be derived.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<JsonValue>,
}

impl CategorySpec {
    /// Spec with the given priority and no fallback.
    pub fn new(priority: CategoryPriority) -> Self {
        Self {
            priority,
            ..Self::default()
        }
    }

    /// Adds dependencies a fallback may be derived from.
    pub fn depends_on<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on.extend(categories.into_iter().map(Into::into));
        self.has_fallback = true;
        self
    }

    /// Enables fallback with a static default value.
    pub fn with_default(mut self, value: JsonValue) -> Self {
        self.default_value = Some(value);
        self.has_fallback = true;
        self
    }

    /// Whether this category is critical.
    pub fn is_critical(&self) -> bool {
        self.priority == CategoryPriority::Critical
    }
}
