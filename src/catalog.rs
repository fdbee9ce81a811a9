//! Workspace catalog: the destinations users can upload into and the
//! metadata each one requires.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use thiserror::Error;

use crate::storage::models::{FieldType, MetadataField, Workspace};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid workspace catalog: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid workspace catalog: {0}")]
    Invalid(String),
}

/// Load a catalog from a JSON array of workspaces.
pub fn load_catalog<P: AsRef<Path>>(path: P) -> Result<Vec<Workspace>, CatalogError> {
    let text = std::fs::read_to_string(path)?;
    let workspaces: Vec<Workspace> = serde_json::from_str(&text)?;

    let mut seen = HashSet::new();
    for workspace in &workspaces {
        if workspace.id.trim().is_empty() {
            return Err(CatalogError::Invalid("workspace id must not be empty".into()));
        }
        if !seen.insert(workspace.id.as_str()) {
            return Err(CatalogError::Invalid(format!(
                "duplicate workspace id '{}'",
                workspace.id
            )));
        }
        for field in &workspace.metadata_fields {
            if field.field_type == FieldType::Select
                && field.options.as_ref().map_or(true, |o| o.is_empty())
            {
                return Err(CatalogError::Invalid(format!(
                    "select field '{}' in workspace '{}' has no options",
                    field.name, workspace.id
                )));
            }
        }
    }

    Ok(workspaces)
}

fn text(name: &str, label: &str, required: bool) -> MetadataField {
    MetadataField {
        name: name.to_string(),
        label: label.to_string(),
        field_type: FieldType::Text,
        required,
        options: None,
    }
}

fn select(name: &str, label: &str, options: &[&str]) -> MetadataField {
    MetadataField {
        name: name.to_string(),
        label: label.to_string(),
        field_type: FieldType::Select,
        required: true,
        options: Some(options.iter().map(|o| o.to_string()).collect()),
    }
}

fn workspace(id: &str, name: &str, description: &str, fields: Vec<MetadataField>) -> Workspace {
    Workspace {
        id: id.to_string(),
        name: name.to_string(),
        description: Some(description.to_string()),
        user_id: None,
        metadata_fields: fields,
    }
}

/// Built-in catalog used when no catalog file is configured
pub fn default_workspaces() -> Vec<Workspace> {
    vec![
        workspace(
            "ws-legal-001",
            "Legal Documents",
            "Corporate legal matter files",
            vec![
                select(
                    "documentType",
                    "Document Type",
                    &["contract", "invoice", "report", "correspondence"],
                ),
                text("matterNumber", "Matter Number", true),
                text("clientName", "Client Name", true),
                text("author", "Author", false),
                MetadataField {
                    name: "description".to_string(),
                    label: "Description".to_string(),
                    field_type: FieldType::Textarea,
                    required: false,
                    options: None,
                },
            ],
        ),
        workspace(
            "ws-hr-001",
            "HR Documents",
            "Human resources files and policies",
            vec![
                select(
                    "documentType",
                    "Document Type",
                    &["policy", "handbook", "form", "report"],
                ),
                text("department", "Department", true),
                text("author", "Author", false),
            ],
        ),
        workspace(
            "ws-finance-001",
            "Financial Reports",
            "Quarterly and annual financial documents",
            vec![
                select(
                    "reportType",
                    "Report Type",
                    &["quarterly", "annual", "budget", "audit"],
                ),
                text("period", "Period", true),
                text("author", "Author", false),
            ],
        ),
        workspace(
            "ws-marketing-001",
            "Marketing Assets",
            "Brand assets and marketing materials",
            vec![
                select(
                    "assetType",
                    "Asset Type",
                    &["brand", "campaign", "collateral", "presentation"],
                ),
                text("campaign", "Campaign", false),
                text("author", "Author", false),
            ],
        ),
    ]
}

impl Workspace {
    /// Check upload metadata against this workspace's schema.
    /// Returns a message suitable for a 400 response on the first problem found.
    pub fn validate_metadata(&self, metadata: &HashMap<String, String>) -> Result<(), String> {
        for key in metadata.keys() {
            if !self.metadata_fields.iter().any(|f| &f.name == key) {
                return Err(format!("Unknown metadata field '{key}'"));
            }
        }

        for field in &self.metadata_fields {
            let value = metadata
                .get(&field.name)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty());

            match value {
                None if field.required => {
                    return Err(format!("{} is required", field.label));
                }
                None => {}
                Some(value) => {
                    if let (FieldType::Select, Some(options)) = (field.field_type, &field.options) {
                        if !options.iter().any(|o| o == value) {
                            return Err(format!(
                                "{} must be one of: {}",
                                field.label,
                                options.join(", ")
                            ));
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn legal() -> Workspace {
        default_workspaces()
            .into_iter()
            .find(|w| w.id == "ws-legal-001")
            .unwrap()
    }

    fn metadata(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_default_catalog_has_four_workspaces() {
        let ids: Vec<String> = default_workspaces().into_iter().map(|w| w.id).collect();
        assert_eq!(
            ids,
            vec!["ws-legal-001", "ws-hr-001", "ws-finance-001", "ws-marketing-001"]
        );
    }

    #[test]
    fn test_valid_metadata() {
        let m = metadata(&[
            ("documentType", "contract"),
            ("matterNumber", "M-100"),
            ("clientName", "Acme"),
        ]);
        assert!(legal().validate_metadata(&m).is_ok());
    }

    #[test]
    fn test_missing_required_field() {
        let m = metadata(&[("documentType", "contract"), ("matterNumber", "M-100")]);
        assert_eq!(
            legal().validate_metadata(&m),
            Err("Client Name is required".to_string())
        );
    }

    #[test]
    fn test_blank_required_field_counts_as_missing() {
        let m = metadata(&[
            ("documentType", "contract"),
            ("matterNumber", "   "),
            ("clientName", "Acme"),
        ]);
        assert_eq!(
            legal().validate_metadata(&m),
            Err("Matter Number is required".to_string())
        );
    }

    #[test]
    fn test_select_value_must_be_an_option() {
        let m = metadata(&[
            ("documentType", "memo"),
            ("matterNumber", "M-100"),
            ("clientName", "Acme"),
        ]);
        let err = legal().validate_metadata(&m).unwrap_err();
        assert!(err.starts_with("Document Type must be one of"));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let m = metadata(&[
            ("documentType", "contract"),
            ("matterNumber", "M-100"),
            ("clientName", "Acme"),
            ("priority", "high"),
        ]);
        assert_eq!(
            legal().validate_metadata(&m),
            Err("Unknown metadata field 'priority'".to_string())
        );
    }
}
