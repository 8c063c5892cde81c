// SPDX-License-Identifier: LGPL-2.1-or-later
// Copyright (C) 2025 Sifter Contributors
//
// This file is part of Sifter.
//
// Sifter is free software: you can redistribute it and/or modify
// it under the terms of the GNU Lesser General Public License as published by
// the Free Software Foundation, either version 2.1 of the License, or
// (at your option) any later version.
//
// Sifter is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public License
// along with Sifter. If not, see <https://www.gnu.org/licenses/>.

//! Classification lattice.
//!
//! ## Purpose
//! Provides the lattice-max operation used when folding per-service result
//! classifications into the submission classification at finalization.

use tracing::warn;

/// Ordered classification lattice.
///
/// Levels are ordered least to most restrictive; `max_classification` picks
/// the more restrictive of two labels. Labels outside the lattice fold to
/// the other operand with a warning rather than failing finalization.
#[derive(Debug, Clone)]
pub struct ClassificationEngine {
    levels: Vec<String>,
}

impl ClassificationEngine {
    /// Create an engine over an ordered level list (least restrictive first).
    pub fn new(levels: Vec<String>) -> Self {
        Self { levels }
    }

    /// The least restrictive level of the lattice.
    pub fn unrestricted(&self) -> &str {
        self.levels.first().map(String::as_str).unwrap_or("")
    }

    fn index_of(&self, label: &str) -> Option<usize> {
        self.levels.iter().position(|l| l == label)
    }

    /// Lattice-max: the more restrictive of `a` and `b`.
    pub fn max_classification<'a>(&self, a: &'a str, b: &'a str) -> &'a str {
        match (self.index_of(a), self.index_of(b)) {
            (Some(ia), Some(ib)) => {
                if ia >= ib {
                    a
                } else {
                    b
                }
            }
            (Some(_), None) => {
                if !b.is_empty() {
                    warn!(label = b, "Unknown classification label, ignoring");
                }
                a
            }
            (None, Some(_)) => {
                if !a.is_empty() {
                    warn!(label = a, "Unknown classification label, ignoring");
                }
                b
            }
            (None, None) => a,
        }
    }
}

impl Default for ClassificationEngine {
    fn default() -> Self {
        Self::new(vec![
            "TLP:CLEAR".to_string(),
            "TLP:GREEN".to_string(),
            "TLP:AMBER".to_string(),
            "TLP:RED".to_string(),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_picks_more_restrictive() {
        let engine = ClassificationEngine::default();
        assert_eq!(engine.max_classification("TLP:CLEAR", "TLP:AMBER"), "TLP:AMBER");
        assert_eq!(engine.max_classification("TLP:RED", "TLP:GREEN"), "TLP:RED");
        assert_eq!(engine.max_classification("TLP:GREEN", "TLP:GREEN"), "TLP:GREEN");
    }

    #[test]
    fn test_unknown_label_falls_back() {
        let engine = ClassificationEngine::default();
        assert_eq!(engine.max_classification("bogus", "TLP:GREEN"), "TLP:GREEN");
        assert_eq!(engine.max_classification("TLP:AMBER", ""), "TLP:AMBER");
    }
}
