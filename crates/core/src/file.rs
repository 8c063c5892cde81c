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

//! Immutable file reference records.

use serde::{Deserialize, Serialize};

/// Reference to a file in storage, keyed by its SHA256.
///
/// ## Invariants
/// Immutable once recorded: two `FileRef`s with the same `sha256` describe
/// the same content and may be used interchangeably.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRef {
    /// SHA256 hex digest (primary identifier)
    pub sha256: String,
    /// File size in bytes
    pub size: u64,
    /// MIME type if known
    #[serde(default)]
    pub mime: Option<String>,
    /// Raw libmagic description
    #[serde(default)]
    pub magic: String,
    /// Normalized file type label used for schedule admission
    pub file_type: String,
    /// MD5 hex digest
    #[serde(default)]
    pub md5: String,
    /// SHA1 hex digest
    #[serde(default)]
    pub sha1: String,
}

impl FileRef {
    /// Create a minimal file reference with only the fields the dispatcher
    /// requires. Secondary digests default to empty.
    pub fn new(sha256: impl Into<String>, size: u64, file_type: impl Into<String>) -> Self {
        Self {
            sha256: sha256.into(),
            size,
            mime: None,
            magic: String::new(),
            file_type: file_type.into(),
            md5: String::new(),
            sha1: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_ref_roundtrip() {
        let file = FileRef::new("a".repeat(64), 1024, "document/pdf");
        let json = serde_json::to_string(&file).unwrap();
        let back: FileRef = serde_json::from_str(&json).unwrap();
        assert_eq!(back, file);
    }

    #[test]
    fn test_file_ref_defaults_on_sparse_input() {
        let back: FileRef = serde_json::from_str(
            r#"{"sha256": "abc", "size": 10, "file_type": "text/plain"}"#,
        )
        .unwrap();
        assert_eq!(back.magic, "");
        assert!(back.mime.is_none());
    }
}
