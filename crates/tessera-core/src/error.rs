//! Build errors and non-fatal diagnostics
//!
//! Only a handful of conditions abort a build. Everything else is recorded as a
//! [`Diagnostic`] with enough context (submesh, group, triangle) to report it
//! after the build finishes.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fatal build errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BuildError {
    #[error("Input mesh contains no triangles")]
    EmptyInput,

    #[error("Invalid input mesh: {0}")]
    InvalidInput(String),

    #[error("Invalid build configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for build operations
pub type BuildResult<T> = Result<T, BuildError>;

/// Non-fatal conditions recorded while building
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Diagnostic {
    /// More parts were requested than the graph has nodes; the request was clamped.
    PartitionInfeasible { requested: usize, available: usize },
    /// A group could not be simplified to its budget; its members stay uncoarsened.
    SimplificationDidNotConverge {
        group: u32,
        target: u32,
        achieved: u32,
    },
    /// Zero-area triangle or a triangle with repeated corner positions.
    DegenerateGeometry { submesh: u32, triangle: u32 },
    /// A submesh with no triangles produced no clusters.
    EmptySubmesh { submesh: u32 },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PartitionInfeasible { requested, available } => write!(
                f,
                "requested {} partitions for {} nodes, clamped to {}",
                requested, available, available
            ),
            Self::SimplificationDidNotConverge { group, target, achieved } => write!(
                f,
                "group {} did not simplify to {} triangles (best {})",
                group, target, achieved
            ),
            Self::DegenerateGeometry { submesh, triangle } => {
                write!(f, "degenerate triangle {} in submesh {}", triangle, submesh)
            }
            Self::EmptySubmesh { submesh } => write!(f, "submesh {} has no triangles", submesh),
        }
    }
}

/// Accumulated diagnostics of one build
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    /// Create an empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a diagnostic
    pub fn push(&mut self, diagnostic: Diagnostic) {
        log::warn!("{}", diagnostic);
        self.entries.push(diagnostic);
    }

    /// Record several diagnostics
    pub fn extend<I: IntoIterator<Item = Diagnostic>>(&mut self, diagnostics: I) {
        for diagnostic in diagnostics {
            self.push(diagnostic);
        }
    }

    /// Iterate over recorded diagnostics
    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    /// Number of recorded diagnostics
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Groups that failed to simplify, in recording order
    pub fn unconverged_groups(&self) -> Vec<u32> {
        self.entries
            .iter()
            .filter_map(|d| match d {
                Diagnostic::SimplificationDidNotConverge { group, .. } => Some(*group),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostics_accumulate() {
        let mut diagnostics = Diagnostics::new();
        assert!(diagnostics.is_empty());

        diagnostics.push(Diagnostic::EmptySubmesh { submesh: 2 });
        diagnostics.extend([
            Diagnostic::SimplificationDidNotConverge { group: 7, target: 0, achieved: 2 },
            Diagnostic::PartitionInfeasible { requested: 10, available: 3 },
        ]);

        assert_eq!(diagnostics.len(), 3);
        assert_eq!(diagnostics.unconverged_groups(), vec![7]);
    }

    #[test]
    fn test_diagnostic_display() {
        let text = Diagnostic::PartitionInfeasible { requested: 10, available: 3 }.to_string();
        assert!(text.contains("10"));
        assert!(text.contains("clamped to 3"));
    }

    #[test]
    fn test_error_display() {
        assert_eq!(BuildError::EmptyInput.to_string(), "Input mesh contains no triangles");
        assert!(BuildError::InvalidConfig("x".into()).to_string().contains("x"));
    }
}
