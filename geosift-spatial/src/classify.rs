//! Land-cover classification.
//!
//! Maps the classification code stored on a land-cover feature to one of a
//! closed set of [`Category`] values. The mapping is table driven: adding a
//! code is a change to [`ClassificationTable`], not to code.

use crate::feature::Feature;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Land-cover category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Hydro,
    Forest,
    Building,
    Garden,
    Unknown,
}

impl Category {
    /// Every category, in report order.
    pub const ALL: [Category; 5] = [
        Category::Hydro,
        Category::Forest,
        Category::Building,
        Category::Garden,
        Category::Unknown,
    ];

    /// The four categories reported with percentages.
    pub const REPORTED: [Category; 4] = [
        Category::Hydro,
        Category::Forest,
        Category::Building,
        Category::Garden,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Hydro => "hydro",
            Category::Forest => "forest",
            Category::Building => "building",
            Category::Garden => "garden",
            Category::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the classification table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeMapping {
    pub code: String,
    pub category: Category,
}

impl CodeMapping {
    pub fn new(code: impl Into<String>, category: Category) -> Self {
        Self {
            code: code.into(),
            category,
        }
    }
}

/// Code → category table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassificationTable {
    pub mappings: Vec<CodeMapping>,
}

impl Default for ClassificationTable {
    fn default() -> Self {
        let mut mappings: Vec<CodeMapping> = ["hd1", "hd2", "hd3", "hd4", "hd5", "hd9"]
            .into_iter()
            .map(|code| CodeMapping::new(code, Category::Hydro))
            .collect();
        mappings.push(CodeMapping::new("ms0", Category::Forest));
        mappings.push(CodeMapping::new("ms4", Category::Garden));
        mappings.push(CodeMapping::new("pu0", Category::Building));
        Self { mappings }
    }
}

/// Table-driven land-cover classifier.
///
/// Total: a missing attribute, a non-text value or an unmapped code all
/// classify as [`Category::Unknown`].
#[derive(Debug, Clone)]
pub struct LandCoverClassifier {
    attribute: String,
    table: FxHashMap<String, Category>,
}

impl LandCoverClassifier {
    /// Build a classifier reading `attribute` and mapping through `table`.
    ///
    /// Later rows win when a code is listed twice.
    pub fn new(attribute: impl Into<String>, table: &ClassificationTable) -> Self {
        let table = table
            .mappings
            .iter()
            .map(|m| (m.code.clone(), m.category))
            .collect();
        Self {
            attribute: attribute.into(),
            table,
        }
    }

    /// Attribute holding the classification code.
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    /// Classify a raw code.
    pub fn classify_code(&self, code: &str) -> Category {
        self.table.get(code).copied().unwrap_or(Category::Unknown)
    }

    /// Classify a feature by its classification attribute.
    pub fn classify(&self, feature: &Feature) -> Category {
        feature
            .text(&self.attribute)
            .map(|code| self.classify_code(code))
            .unwrap_or(Category::Unknown)
    }
}

impl Default for LandCoverClassifier {
    fn default() -> Self {
        Self::new("GKODAS", &ClassificationTable::default())
    }
}
