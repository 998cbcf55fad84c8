//! Report options and the report document.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::common::error::{PrequelError, PrequelResult};

pub const DOC_VER: u32 = 1;

/// Report section. Declaration order is output order.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Global,
    ChunkHistory,
    ConfusionMatrix,
    GenerationHistory,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Global,
        Category::ChunkHistory,
        Category::ConfusionMatrix,
        Category::GenerationHistory,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Global => "global",
            Category::ChunkHistory => "chunk_history",
            Category::ConfusionMatrix => "confusion_matrix",
            Category::GenerationHistory => "generation_history",
        }
    }
}

/// Options accepted by `report_json`.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReportOptions {
    #[serde(default)]
    pub categories: Vec<Category>,
    /// Replace datetimes with their zero-based position.
    #[serde(default)]
    pub datetime_as_index: bool,
}

impl ReportOptions {
    /// Parse an options document; blank text means defaults.
    pub fn parse(text: &str) -> PrequelResult<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(text).map_err(|e| PrequelError::report(format!("invalid report option: {e}")))
    }

    /// Requested categories in output order; empty selects all.
    pub fn selected(&self) -> Vec<Category> {
        if self.categories.is_empty() {
            return Category::ALL.to_vec();
        }
        let mut selected = self.categories.clone();
        selected.sort();
        selected.dedup();
        selected
    }
}

impl FromStr for ReportOptions {
    type Err = PrequelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Options accepted by `report_plot`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlotOptions {
    pub terminal: Option<String>,
    pub terminal_option: Option<String>,
    pub font: Option<String>,
    pub output_filepath: Option<String>,
    pub plt_filepath: Option<String>,
}

impl PlotOptions {
    pub fn parse(text: &str) -> PrequelResult<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(text).map_err(|e| PrequelError::report(format!("invalid plot option: {e}")))
    }
}

/// Full report document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReportDoc {
    pub doc_ver: u32,
    pub error: bool,
    pub category: Sections,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Sections {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global: Option<GlobalSection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_history: Option<Vec<ChunkEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confusion_matrix: Option<ConfusionSection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_history: Option<Vec<GenerationEntry>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GlobalSection {
    pub instance_count: u64,
    pub updated_instance_count: u64,
    pub instance_correct_count: u64,
    pub instance_accuracy: f64,
    pub pending_instance_count: u64,
    pub chunk_count: u64,
    pub last_chunk_id: Option<u64>,
    pub generation_count: u64,
}

impl GlobalSection {
    /// Name/value pairs in field order, for text panels.
    pub fn properties(&self) -> Vec<(&'static str, String)> {
        vec![
            ("instance_count", self.instance_count.to_string()),
            ("updated_instance_count", self.updated_instance_count.to_string()),
            ("instance_correct_count", self.instance_correct_count.to_string()),
            ("instance_accuracy", format!("{:.6}", self.instance_accuracy)),
            ("pending_instance_count", self.pending_instance_count.to_string()),
            ("chunk_count", self.chunk_count.to_string()),
            (
                "last_chunk_id",
                self.last_chunk_id.map_or_else(|| "-".to_string(), |id| id.to_string()),
            ),
            ("generation_count", self.generation_count.to_string()),
        ]
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChunkEntry {
    pub datetime: u64,
    pub id: u64,
    pub instance_count: u64,
    pub processed: bool,
    pub initial_correct_count: u64,
    pub initial_accuracy: f64,
}

/// Rows are actual labels, columns predicted labels.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConfusionSection {
    pub label_name: Vec<String>,
    pub data: Vec<Vec<u64>>,
    /// Per actual label, scorings made before any model existed.
    #[serde(default)]
    pub unpredicted: Vec<u64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenerationEntry {
    pub datetime: u64,
    pub id: u64,
    pub instance_count: u64,
    pub before_instance_accuracy: f64,
    pub after_instance_accuracy: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_options_select_everything() {
        let opts = ReportOptions::parse("").unwrap();
        assert_eq!(opts.selected(), Category::ALL.to_vec());
        assert!(!opts.datetime_as_index);
    }

    #[test]
    fn categories_come_back_in_fixed_order() {
        let opts: ReportOptions =
            r#"{"categories":["generation_history","global","global"]}"#.parse().unwrap();
        assert_eq!(opts.selected(), vec![Category::Global, Category::GenerationHistory]);
    }

    #[test]
    fn unknown_category_or_option_is_rejected() {
        assert!(matches!(
            ReportOptions::parse(r#"{"categories":["weather"]}"#),
            Err(PrequelError::Report(_))
        ));
        assert!(ReportOptions::parse(r#"{"colour":true}"#).is_err());
        assert!(PlotOptions::parse(r#"{"terminal":"png","size":"1x1"}"#).is_err());
    }
}
