//! Tool catalog entries and manifest loading.
//!
//! Tools describe remote analysis capabilities (classifiers, clustering,
//! statistics). The catalog is loaded once at startup from a JSON manifest;
//! a malformed entry is a fatal load error, never silently skipped.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default width of a tool window when the manifest does not specify one.
pub const DEFAULT_WINDOW_WIDTH: u32 = 600;

/// Default height of a tool window when the manifest does not specify one.
pub const DEFAULT_WINDOW_HEIGHT: u32 = 400;

/// Errors raised while loading the tool manifest.
#[derive(Error, Debug)]
pub enum ManifestError {
    /// I/O error while reading the manifest file
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The manifest is not valid JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A manifest entry lacks a required field
    #[error("manifest entry {index} is missing required field '{field}'")]
    MissingField {
        /// Zero-based index of the offending entry
        index: usize,
        /// Name of the missing field
        field: &'static str,
    },
}

/// An immutable catalog entry describing one remote analysis capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    /// Stable tool identifier, unique within the catalog.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Short description shown in the tool list.
    #[serde(default)]
    pub description: String,
    /// Reference to the tool window template served by the backend.
    pub template_ref: String,
    /// Icon identifier.
    #[serde(default)]
    pub icon: String,
    /// Initial tool window width.
    pub default_window_width: u32,
    /// Initial tool window height.
    pub default_window_height: u32,
}

/// Raw manifest entry before validation. Required fields are optional here
/// so a missing one can be reported by name instead of as a parse failure.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManifestEntry {
    id: Option<String>,
    name: Option<String>,
    #[serde(default)]
    description: String,
    template_ref: Option<String>,
    #[serde(default)]
    icon: String,
    default_window_width: Option<u32>,
    default_window_height: Option<u32>,
}

impl ManifestEntry {
    fn into_tool(self, index: usize) -> Result<Tool, ManifestError> {
        let id = self
            .id
            .filter(|id| !id.is_empty())
            .ok_or(ManifestError::MissingField { index, field: "id" })?;
        let template_ref =
            self.template_ref
                .filter(|t| !t.is_empty())
                .ok_or(ManifestError::MissingField {
                    index,
                    field: "templateRef",
                })?;

        Ok(Tool {
            name: self.name.unwrap_or_else(|| id.clone()),
            id,
            description: self.description,
            template_ref,
            icon: self.icon,
            default_window_width: self.default_window_width.unwrap_or(DEFAULT_WINDOW_WIDTH),
            default_window_height: self.default_window_height.unwrap_or(DEFAULT_WINDOW_HEIGHT),
        })
    }
}

/// Parse the tool manifest from its JSON text.
///
/// Fails fatally on unparseable JSON or any entry missing `id` or
/// `templateRef`.
pub fn load_manifest(json: &str) -> Result<Vec<Tool>, ManifestError> {
    let entries: Vec<ManifestEntry> = serde_json::from_str(json)?;
    let tools = entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| entry.into_tool(index))
        .collect::<Result<Vec<_>, _>>()?;
    log::info!("Loaded tool manifest with {} tools", tools.len());
    Ok(tools)
}

/// Read and parse the tool manifest from a file.
pub fn load_manifest_file(path: &Path) -> Result<Vec<Tool>, ManifestError> {
    let json = std::fs::read_to_string(path)?;
    load_manifest(&json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_manifest() {
        let json = r#"[
            {
                "id": "classifier",
                "name": "Classifier",
                "description": "Supervised per-object classification",
                "templateRef": "tools/classifier.html",
                "icon": "C",
                "defaultWindowWidth": 800,
                "defaultWindowHeight": 600
            },
            {
                "id": "clustering",
                "templateRef": "tools/clustering.html"
            }
        ]"#;

        let tools = load_manifest(json).expect("valid manifest");
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0].id, "classifier");
        assert_eq!(tools[0].default_window_width, 800);
        // Omitted fields fall back to defaults
        assert_eq!(tools[1].name, "clustering");
        assert_eq!(tools[1].default_window_width, DEFAULT_WINDOW_WIDTH);
        assert_eq!(tools[1].default_window_height, DEFAULT_WINDOW_HEIGHT);
    }

    #[test]
    fn test_missing_id_is_fatal() {
        let json = r#"[{"name": "Nameless", "templateRef": "tools/x.html"}]"#;
        let err = load_manifest(json).expect_err("missing id");
        assert!(matches!(
            err,
            ManifestError::MissingField { index: 0, field: "id" }
        ));
    }

    #[test]
    fn test_missing_template_ref_is_fatal() {
        let json = r#"[
            {"id": "ok", "templateRef": "tools/ok.html"},
            {"id": "broken", "name": "Broken"}
        ]"#;
        let err = load_manifest(json).expect_err("missing templateRef");
        assert!(matches!(
            err,
            ManifestError::MissingField {
                index: 1,
                field: "templateRef"
            }
        ));
    }

    #[test]
    fn test_unparseable_manifest_is_fatal() {
        assert!(matches!(
            load_manifest("not json").expect_err("parse failure"),
            ManifestError::Json(_)
        ));
    }
}
