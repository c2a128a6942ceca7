//! Axis selection and cartesian expansion.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The identifiers chosen on each axis. Order is preserved and duplicates
/// are kept as given.
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, Default, PartialEq, Eq)]
pub struct AxisSelection {
    pub tones: Vec<String>,
    pub lengths: Vec<String>,
    pub formats: Vec<String>,
}

impl AxisSelection {
    pub fn new<T, L, F>(tones: T, lengths: L, formats: F) -> Self
    where
        T: IntoIterator,
        T::Item: Into<String>,
        L: IntoIterator,
        L::Item: Into<String>,
        F: IntoIterator,
        F::Item: Into<String>,
    {
        Self {
            tones: tones.into_iter().map(Into::into).collect(),
            lengths: lengths.into_iter().map(Into::into).collect(),
            formats: formats.into_iter().map(Into::into).collect(),
        }
    }

    /// `|tones| * |lengths| * |formats|`.
    pub fn total(&self) -> usize {
        self.tones.len() * self.lengths.len() * self.formats.len()
    }
}

/// One tone/length/format combination. Identified by its position in
/// enumeration order.
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, PartialEq, Eq, Hash)]
pub struct Cell {
    pub tone: String,
    pub length: String,
    pub format: String,
}

impl Cell {
    pub fn new(tone: impl Into<String>, length: impl Into<String>, format: impl Into<String>) -> Self {
        Self {
            tone: tone.into(),
            length: length.into(),
            format: format.into(),
        }
    }

    /// Short `tone/length/format` label for logs.
    pub fn label(&self) -> String {
        format!("{}/{}/{}", self.tone, self.length, self.format)
    }
}

/// Result of [`expand`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expansion {
    pub cells: Vec<Cell>,
    pub total: usize,
}

/// Enumerate the cartesian product: tone outer, length middle, format inner.
///
/// If any axis is empty the product is empty.
pub fn expand(axes: &AxisSelection) -> Expansion {
    let total = axes.total();
    let mut cells = Vec::with_capacity(total);
    for tone in &axes.tones {
        for length in &axes.lengths {
            for format in &axes.formats {
                cells.push(Cell::new(tone.as_str(), length.as_str(), format.as_str()));
            }
        }
    }
    debug_assert_eq!(cells.len(), total);
    Expansion { cells, total }
}
