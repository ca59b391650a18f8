//! Best-effort composite results from partially failed tasks.

use crate::{DependencyResolver, InheritResolver, RecoveryError, RecoveryErrorKind, RecoveryResult};
use derive_getters::Getters;
use ensemble_core::{CategoryPriority, CategorySpec};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument};

/// How much a composite result relies on fallback values.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DegradationLevel {
    /// Every category is live.
    None,
    /// A few non-critical categories failed.
    Minimal,
    /// More than three non-critical categories failed.
    Moderate,
    /// One critical category failed.
    Significant,
    /// Two or more critical categories failed.
    Severe,
}

impl DegradationLevel {
    /// Confidence penalty subtracted at this level.
    pub fn penalty(&self) -> f64 {
        match self {
            DegradationLevel::None => 0.0,
            DegradationLevel::Minimal => 0.1,
            DegradationLevel::Moderate => 0.2,
            DegradationLevel::Significant => 0.3,
            DegradationLevel::Severe => 0.5,
        }
    }
}

/// A category value with its confidence in `0..=1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryValue {
    /// The value.
    pub value: JsonValue,
    /// Confidence in the value.
    pub confidence: f64,
}

impl CategoryValue {
    /// Value with confidence clamped to `0..=1`.
    pub fn new(value: JsonValue, confidence: f64) -> Self {
        Self {
            value,
            confidence: if confidence.is_finite() {
                confidence.clamp(0.0, 1.0)
            } else {
                0.0
            },
        }
    }
}

/// Where a composite category's value came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValueSource {
    /// Returned by the provider (or served from cache).
    Live,
    /// Substituted by a fallback strategy after the call failed.
    Recovered {
        /// Strategy name
        strategy: String,
    },
    /// Derived from a successful dependency.
    Derived {
        /// Dependency category
        from: String,
    },
    /// Statically configured default.
    Default,
    /// No fallback defined; value is `null`.
    Unavailable,
}

impl ValueSource {
    /// Whether the value stands in for a failure.
    pub fn is_fallback(&self) -> bool {
        matches!(
            self,
            ValueSource::Recovered { .. } | ValueSource::Derived { .. } | ValueSource::Default
        )
    }
}

impl fmt::Display for ValueSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueSource::Live => write!(f, "live"),
            ValueSource::Recovered { strategy } => write!(f, "recovered by {}", strategy),
            ValueSource::Derived { from } => write!(f, "derived from {}", from),
            ValueSource::Default => write!(f, "default"),
            ValueSource::Unavailable => write!(f, "unavailable"),
        }
    }
}

/// One category of a composite result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Getters)]
pub struct ResolvedCategory {
    value: JsonValue,
    confidence: f64,
    source: ValueSource,
}

/// Which categories succeeded, failed, or were back-filled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Getters)]
pub struct DegradationResult {
    successful_categories: Vec<String>,
    failed_categories: Vec<String>,
    fallback_categories: Vec<String>,
    overall_success_rate: f64,
    level: DegradationLevel,
}

/// A single best-effort result covering every requested category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Getters)]
pub struct CompositeResult {
    job_id: String,
    categories: BTreeMap<String, ResolvedCategory>,
    degradation: DegradationResult,
    confidence: f64,
    explanation: String,
}

impl CompositeResult {
    /// Value of one category.
    pub fn value(&self, category: &str) -> Option<&JsonValue> {
        self.categories.get(category).map(|c| &c.value)
    }

    /// Source of one category.
    pub fn source(&self, category: &str) -> Option<&ValueSource> {
        self.categories.get(category).map(|c| &c.source)
    }
}

/// Per-category outcomes gathered for one job.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoryOutcomes {
    succeeded: BTreeMap<String, CategoryValue>,
    recovered: BTreeMap<String, (CategoryValue, String)>,
    failed: BTreeSet<String>,
}

impl CategoryOutcomes {
    /// Empty outcome set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a live value.
    pub fn succeed(&mut self, category: impl Into<String>, value: CategoryValue) -> &mut Self {
        let category = category.into();
        self.failed.remove(&category);
        self.recovered.remove(&category);
        self.succeeded.insert(category, value);
        self
    }

    /// Record a value substituted by `strategy` after a failure.
    ///
    /// Ignored if the category already has a live value.
    pub fn recover(
        &mut self,
        category: impl Into<String>,
        value: CategoryValue,
        strategy: impl Into<String>,
    ) -> &mut Self {
        let category = category.into();
        if !self.succeeded.contains_key(&category) {
            self.failed.remove(&category);
            self.recovered.insert(category, (value, strategy.into()));
        }
        self
    }

    /// Record a failure with no substitute.
    ///
    /// Ignored if the category already has a value.
    pub fn fail(&mut self, category: impl Into<String>) -> &mut Self {
        let category = category.into();
        if !self.succeeded.contains_key(&category) && !self.recovered.contains_key(&category) {
            self.failed.insert(category);
        }
        self
    }

    /// Live values.
    pub fn succeeded(&self) -> &BTreeMap<String, CategoryValue> {
        &self.succeeded
    }

    /// Every category mentioned.
    pub fn categories(&self) -> BTreeSet<String> {
        self.succeeded
            .keys()
            .chain(self.recovered.keys())
            .chain(self.failed.iter())
            .cloned()
            .collect()
    }
}

/// Floor for the overall confidence of a composite.
pub const MIN_CONFIDENCE: f64 = 0.1;

/// Confidence assigned to configured defaults.
pub const DEFAULT_VALUE_CONFIDENCE: f64 = 0.3;

/// Assembles composite results from category outcomes.
///
/// Every requested category appears in the output. Failed categories are
/// back-filled, most important first, from a fallback strategy's value,
/// a value derived from a successful dependency, or the configured
/// default; categories without a fallback are reported as unavailable.
pub struct DegradationManager {
    specs: BTreeMap<String, CategorySpec>,
    resolvers: HashMap<String, Arc<dyn DependencyResolver>>,
    default_resolver: Arc<dyn DependencyResolver>,
    default_confidence: f64,
    min_confidence: f64,
}

impl fmt::Debug for DegradationManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DegradationManager")
            .field("specs", &self.specs)
            .field("resolvers", &self.resolvers.keys().collect::<Vec<_>>())
            .field("default_confidence", &self.default_confidence)
            .field("min_confidence", &self.min_confidence)
            .finish()
    }
}

impl DegradationManager {
    /// Manager over a category table.
    pub fn new(specs: BTreeMap<String, CategorySpec>) -> Self {
        Self {
            specs,
            resolvers: HashMap::new(),
            default_resolver: Arc::new(InheritResolver::default()),
            default_confidence: DEFAULT_VALUE_CONFIDENCE,
            min_confidence: MIN_CONFIDENCE,
        }
    }

    /// Manager over a category table whose dependencies are all known.
    ///
    /// # Errors
    ///
    /// Returns an error if a category depends on a category with no spec.
    pub fn validated(specs: BTreeMap<String, CategorySpec>) -> RecoveryResult<Self> {
        for (name, spec) in &specs {
            if let Some(missing) = spec.depends_on.iter().find(|d| !specs.contains_key(*d)) {
                return Err(RecoveryError::new(RecoveryErrorKind::UnknownDependency {
                    category: name.clone(),
                    dependency: missing.clone(),
                }));
            }
        }
        Ok(Self::new(specs))
    }

    /// Use `resolver` when deriving `category`.
    pub fn with_resolver(
        mut self,
        category: impl Into<String>,
        resolver: Arc<dyn DependencyResolver>,
    ) -> Self {
        self.resolvers.insert(category.into(), resolver);
        self
    }

    /// Resolver used for categories without their own.
    pub fn with_default_resolver(mut self, resolver: Arc<dyn DependencyResolver>) -> Self {
        self.default_resolver = resolver;
        self
    }

    /// Confidence assigned to configured defaults.
    pub fn with_default_confidence(mut self, confidence: f64) -> Self {
        self.default_confidence = confidence.clamp(0.0, 1.0);
        self
    }

    /// Category table.
    pub fn specs(&self) -> &BTreeMap<String, CategorySpec> {
        &self.specs
    }

    fn priority(&self, category: &str) -> CategoryPriority {
        self.specs
            .get(category)
            .map(|spec| spec.priority)
            .unwrap_or_default()
    }

    /// Degradation level for a set of failed categories.
    pub fn compute_level<'a, I>(&self, failed: I) -> DegradationLevel
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut failures = 0usize;
        let mut critical = 0usize;
        for category in failed {
            failures += 1;
            if self.priority(category) == CategoryPriority::Critical {
                critical += 1;
            }
        }
        match (failures, critical) {
            (0, _) => DegradationLevel::None,
            (_, c) if c >= 2 => DegradationLevel::Severe,
            (_, 1) => DegradationLevel::Significant,
            (f, _) if f <= 3 => DegradationLevel::Minimal,
            _ => DegradationLevel::Moderate,
        }
    }

    /// Assemble the composite result for one job.
    ///
    /// `requested` lists the categories the job must report; categories
    /// mentioned only in `outcomes` are included as well.
    #[instrument(skip(self, requested, outcomes))]
    pub fn synthesize(&self, job_id: &str, requested: &[String], outcomes: &CategoryOutcomes) -> CompositeResult {
        let mut all: BTreeSet<String> = requested.iter().cloned().collect();
        all.extend(outcomes.categories());

        let failed: Vec<String> = all
            .iter()
            .filter(|c| !outcomes.succeeded.contains_key(*c))
            .cloned()
            .collect();
        let level = self.compute_level(failed.iter());

        let mut categories = BTreeMap::new();
        for (name, live) in &outcomes.succeeded {
            categories.insert(
                name.clone(),
                ResolvedCategory {
                    value: live.value.clone(),
                    confidence: live.confidence,
                    source: ValueSource::Live,
                },
            );
        }

        let mut ordered = failed.clone();
        ordered.sort_by(|a, b| self.priority(a).cmp(&self.priority(b)).then_with(|| a.cmp(b)));

        let mut fallback_categories = Vec::new();
        for name in &ordered {
            let resolved = self.backfill(name, outcomes);
            if resolved.source.is_fallback() {
                fallback_categories.push(name.clone());
            }
            debug!(category = %name, source = %resolved.source, "Back-filled failed category");
            categories.insert(name.clone(), resolved);
        }

        let successful: Vec<String> = outcomes.succeeded.keys().cloned().collect();
        let overall_success_rate = if all.is_empty() {
            1.0
        } else {
            successful.len() as f64 / all.len() as f64
        };

        let live_mean = if outcomes.succeeded.is_empty() {
            0.0
        } else {
            outcomes.succeeded.values().map(|v| v.confidence).sum::<f64>()
                / outcomes.succeeded.len() as f64
        };
        let confidence = (live_mean - level.penalty()).max(self.min_confidence);

        let explanation = explain(&categories, level, successful.len(), all.len());

        CompositeResult {
            job_id: job_id.to_string(),
            categories,
            degradation: DegradationResult {
                successful_categories: successful,
                failed_categories: failed,
                fallback_categories,
                overall_success_rate,
                level,
            },
            confidence,
            explanation,
        }
    }

    fn backfill(&self, name: &str, outcomes: &CategoryOutcomes) -> ResolvedCategory {
        if let Some((value, strategy)) = outcomes.recovered.get(name) {
            return ResolvedCategory {
                value: value.value.clone(),
                confidence: value.confidence,
                source: ValueSource::Recovered {
                    strategy: strategy.clone(),
                },
            };
        }

        let unavailable = ResolvedCategory {
            value: JsonValue::Null,
            confidence: 0.0,
            source: ValueSource::Unavailable,
        };
        let Some(spec) = self.specs.get(name) else {
            return unavailable;
        };
        if !spec.has_fallback {
            return unavailable;
        }

        let resolver = self
            .resolvers
            .get(name)
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.default_resolver));
        for dependency in &spec.depends_on {
            let Some(live) = outcomes.succeeded.get(dependency) else {
                continue;
            };
            if let Some(derived) = resolver.resolve(name, dependency, live) {
                return ResolvedCategory {
                    value: derived.value,
                    confidence: derived.confidence,
                    source: ValueSource::Derived {
                        from: dependency.clone(),
                    },
                };
            }
        }

        match &spec.default_value {
            Some(value) => ResolvedCategory {
                value: value.clone(),
                confidence: self.default_confidence,
                source: ValueSource::Default,
            },
            None => unavailable,
        }
    }
}

fn explain(
    categories: &BTreeMap<String, ResolvedCategory>,
    level: DegradationLevel,
    live: usize,
    total: usize,
) -> String {
    if level == DegradationLevel::None {
        return format!("All {} categories are live.", total);
    }
    let mut fallback = Vec::new();
    let mut unavailable = Vec::new();
    for (name, resolved) in categories {
        match &resolved.source {
            ValueSource::Live => {}
            ValueSource::Unavailable => unavailable.push(name.as_str()),
            source => fallback.push(format!("{} ({})", name, source)),
        }
    }
    let mut text = format!("{} degradation: {} of {} categories live.", level, live, total);
    if !fallback.is_empty() {
        text.push_str(&format!(" Fallback: {}.", fallback.join(", ")));
    }
    if !unavailable.is_empty() {
        text.push_str(&format!(" Unavailable: {}.", unavailable.join(", ")));
    }
    text
}
