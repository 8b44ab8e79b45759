// SPDX-License-Identifier: Apache-2.0

//! Canonical import/export bundle for violet-rails migrations.
//!
//! Normalization is lossy-but-explicit: anything outside the known field
//! set survives the trip as an `unsupported_fields` entry instead of being
//! silently dropped, and the checksum covers every field except
//! `bundle_id` and `checksum` itself.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use vda_core::{canonical_json_hash, stable_id};

pub const VIOLET_SOURCE_SYSTEM: &str = "violet-rails";
pub const DEFAULT_BUNDLE_VERSION: &str = "violet-export-v1";

const KNOWN_TOP_LEVEL: [&str; 12] = [
    "namespace",
    "api_namespace",
    "resources",
    "actions",
    "roles",
    "unsupported_fields",
    "source_system",
    "bundle_version",
    "policy_version",
    "data_version",
    "bundle_id",
    "checksum",
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VioletResource {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub records: Option<Vec<Map<String, Value>>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VioletAction {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub action_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VioletBundle {
    #[serde(default)]
    pub bundle_id: String,
    #[serde(default)]
    pub source_system: String,
    #[serde(default)]
    pub bundle_version: String,
    #[serde(default)]
    pub policy_version: String,
    #[serde(default)]
    pub data_version: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub resources: Vec<VioletResource>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<VioletAction>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unsupported_fields: Vec<String>,
    #[serde(default)]
    pub checksum: String,
}

#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("namespace is required")]
    NamespaceRequired,
    #[error("source_system must be violet-rails")]
    SourceSystemMismatch,
    #[error("{0} must be an array")]
    NotAnArray(&'static str),
    #[error("resources[{0}].name must be non-empty string")]
    ResourceName(usize),
    #[error("actions[{0}].name must be non-empty string")]
    ActionName(usize),
    #[error("checksum mismatch: expected={expected} got={got}")]
    ChecksumMismatch { expected: String, got: String },
    #[error("bundle serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Checksum over every field except `bundle_id` and `checksum`.
pub fn bundle_checksum(bundle: &VioletBundle) -> Result<String, MigrationError> {
    let core = json!({
        "source_system": bundle.source_system,
        "bundle_version": bundle.bundle_version,
        "policy_version": bundle.policy_version,
        "data_version": bundle.data_version,
        "namespace": bundle.namespace,
        "resources": bundle.resources,
        "actions": bundle.actions,
        "roles": bundle.roles,
        "unsupported_fields": bundle.unsupported_fields,
    });
    Ok(canonical_json_hash(&core)?)
}

/// Normalize an arbitrary source object into a checksummed bundle.
pub fn build_bundle(
    source: &Map<String, Value>,
    tenant_id: &str,
    bundle_version: &str,
    policy_version: &str,
    data_version: &str,
) -> Result<VioletBundle, MigrationError> {
    let normalized = normalize_source(source)?;
    if normalized.namespace.is_empty() {
        return Err(MigrationError::NamespaceRequired);
    }

    let mut bundle = VioletBundle {
        bundle_id: String::new(),
        source_system: VIOLET_SOURCE_SYSTEM.to_string(),
        bundle_version: bundle_version.to_string(),
        policy_version: policy_version.to_string(),
        data_version: data_version.to_string(),
        namespace: normalized.namespace,
        resources: normalized.resources,
        actions: normalized.actions,
        roles: normalized.roles,
        unsupported_fields: normalized.unsupported,
        checksum: String::new(),
    };
    bundle.checksum = bundle_checksum(&bundle)?;
    bundle.bundle_id = stable_id("mig", &[tenant_id, &bundle.checksum]);
    Ok(bundle)
}

/// Re-normalize an imported bundle and verify its declared checksum.
pub fn normalize_imported(
    input: &VioletBundle,
    tenant_id: &str,
    default_policy_version: &str,
    default_data_version: &str,
) -> Result<VioletBundle, MigrationError> {
    let declared_system = input.source_system.trim();
    if !declared_system.is_empty() && declared_system != VIOLET_SOURCE_SYSTEM {
        return Err(MigrationError::SourceSystemMismatch);
    }

    let bundle_version = non_empty_or(&input.bundle_version, DEFAULT_BUNDLE_VERSION);
    let policy_version = non_empty_or(&input.policy_version, default_policy_version);
    let data_version = non_empty_or(&input.data_version, default_data_version);

    let mut source = Map::new();
    source.insert("namespace".to_string(), json!(input.namespace));
    source.insert("resources".to_string(), serde_json::to_value(&input.resources)?);
    source.insert("actions".to_string(), serde_json::to_value(&input.actions)?);
    source.insert("roles".to_string(), json!(input.roles));
    source.insert(
        "unsupported_fields".to_string(),
        json!(input.unsupported_fields),
    );

    let out = build_bundle(
        &source,
        tenant_id,
        &bundle_version,
        &policy_version,
        &data_version,
    )?;
    let expected = input.checksum.trim();
    if !expected.is_empty() && expected != out.checksum {
        return Err(MigrationError::ChecksumMismatch {
            expected: expected.to_string(),
            got: out.checksum,
        });
    }
    Ok(out)
}

/// Write the normalized bundle into an app: top-level namespace, resources,
/// actions, and roles plus the full nested bundle for later re-export.
pub fn apply_to_app(app: &mut crate::App, bundle: &VioletBundle) -> Result<(), MigrationError> {
    app.name = bundle.namespace.clone();
    app.blueprint
        .insert("namespace".to_string(), json!(bundle.namespace));
    app.blueprint
        .insert("resources".to_string(), serde_json::to_value(&bundle.resources)?);
    app.blueprint
        .insert("actions".to_string(), serde_json::to_value(&bundle.actions)?);
    app.blueprint.insert("roles".to_string(), json!(bundle.roles));
    app.blueprint.insert(
        "migration_violet_bundle".to_string(),
        serde_json::to_value(bundle)?,
    );
    Ok(())
}

struct NormalizedSource {
    namespace: String,
    resources: Vec<VioletResource>,
    actions: Vec<VioletAction>,
    roles: Vec<String>,
    unsupported: Vec<String>,
}

fn normalize_source(source: &Map<String, Value>) -> Result<NormalizedSource, MigrationError> {
    let mut unsupported = Vec::new();

    let mut namespace = read_string(source, "namespace");
    if namespace.is_empty() {
        namespace = read_string(source, "api_namespace");
    }

    if let Some(raw) = source.get("unsupported_fields") {
        match raw.as_array() {
            Some(items) => {
                for (i, item) in items.iter().enumerate() {
                    match item.as_str() {
                        Some(v) if !v.trim().is_empty() => unsupported.push(v.trim().to_string()),
                        Some(_) => {}
                        None => unsupported.push(format!("unsupported_fields[{i}]")),
                    }
                }
            }
            None => unsupported.push("unsupported_fields".to_string()),
        }
    }

    let mut resources = normalize_resources(source.get("resources"), &mut unsupported)?;
    let mut actions = normalize_actions(source.get("actions"), &mut unsupported)?;
    let roles = normalize_roles(source.get("roles"), &mut unsupported)?;

    for key in source.keys() {
        if !KNOWN_TOP_LEVEL.contains(&key.as_str()) {
            unsupported.push(key.clone());
        }
    }

    resources.sort_by(|a, b| a.name.cmp(&b.name));
    actions.sort_by(|a, b| {
        a.name
            .cmp(&b.name)
            .then_with(|| a.resource.cmp(&b.resource))
            .then_with(|| a.action_type.cmp(&b.action_type))
    });

    Ok(NormalizedSource {
        namespace,
        resources,
        actions,
        roles: unique_sorted(roles),
        unsupported: unique_sorted(unsupported),
    })
}

fn normalize_resources(
    raw: Option<&Value>,
    unsupported: &mut Vec<String>,
) -> Result<Vec<VioletResource>, MigrationError> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    if raw.is_null() {
        return Ok(Vec::new());
    }
    let items = raw
        .as_array()
        .ok_or(MigrationError::NotAnArray("resources"))?;

    let mut resources = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let Some(obj) = item.as_object() else {
            unsupported.push(format!("resources[{i}]"));
            continue;
        };
        let mut resource = VioletResource::default();
        let mut fields = BTreeMap::new();
        let mut records = Vec::new();
        for (key, value) in obj {
            match key.as_str() {
                "name" => {
                    let name = value
                        .as_str()
                        .map(str::trim)
                        .filter(|v| !v.is_empty())
                        .ok_or(MigrationError::ResourceName(i))?;
                    resource.name = name.to_string();
                }
                "fields" => match value.as_object() {
                    Some(field_map) => {
                        for (field_name, field_type) in field_map {
                            match field_type.as_str().map(str::trim).filter(|v| !v.is_empty()) {
                                Some(ft) => {
                                    fields.insert(field_name.clone(), ft.to_string());
                                }
                                None => {
                                    unsupported.push(format!("resources[{i}].fields.{field_name}"));
                                }
                            }
                        }
                    }
                    None => unsupported.push(format!("resources[{i}].fields")),
                },
                "records" => match value.as_array() {
                    Some(rows) => {
                        for (j, row) in rows.iter().enumerate() {
                            match row.as_object() {
                                Some(record) => records.push(record.clone()),
                                None => unsupported.push(format!("resources[{i}].records[{j}]")),
                            }
                        }
                    }
                    None => unsupported.push(format!("resources[{i}].records")),
                },
                other => unsupported.push(format!("resources[{i}].{other}")),
            }
        }
        if resource.name.is_empty() {
            return Err(MigrationError::ResourceName(i));
        }
        resource.fields = (!fields.is_empty()).then_some(fields);
        resource.records = (!records.is_empty()).then_some(records);
        resources.push(resource);
    }
    Ok(resources)
}

fn normalize_actions(
    raw: Option<&Value>,
    unsupported: &mut Vec<String>,
) -> Result<Vec<VioletAction>, MigrationError> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    if raw.is_null() {
        return Ok(Vec::new());
    }
    let items = raw.as_array().ok_or(MigrationError::NotAnArray("actions"))?;

    let mut actions = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let Some(obj) = item.as_object() else {
            unsupported.push(format!("actions[{i}]"));
            continue;
        };
        let mut action = VioletAction::default();
        for (key, value) in obj {
            match key.as_str() {
                "name" => {
                    let name = value
                        .as_str()
                        .map(str::trim)
                        .filter(|v| !v.is_empty())
                        .ok_or(MigrationError::ActionName(i))?;
                    action.name = name.to_string();
                }
                "resource" => {
                    if let Some(v) = value.as_str().map(str::trim).filter(|v| !v.is_empty()) {
                        action.resource = Some(v.to_string());
                    }
                }
                "type" => {
                    if let Some(v) = value.as_str().map(str::trim).filter(|v| !v.is_empty()) {
                        action.action_type = Some(v.to_string());
                    }
                }
                "config" => match value.as_object() {
                    Some(cfg) => action.config = Some(cfg.clone()),
                    None => unsupported.push(format!("actions[{i}].config")),
                },
                other => unsupported.push(format!("actions[{i}].{other}")),
            }
        }
        if action.name.is_empty() {
            return Err(MigrationError::ActionName(i));
        }
        actions.push(action);
    }
    Ok(actions)
}

fn normalize_roles(
    raw: Option<&Value>,
    unsupported: &mut Vec<String>,
) -> Result<Vec<String>, MigrationError> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    if raw.is_null() {
        return Ok(Vec::new());
    }
    let items = raw.as_array().ok_or(MigrationError::NotAnArray("roles"))?;

    let mut roles = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        match item.as_str().map(str::trim).filter(|v| !v.is_empty()) {
            Some(role) => roles.push(role.to_string()),
            None => unsupported.push(format!("roles[{i}]")),
        }
    }
    Ok(roles)
}

fn unique_sorted(items: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    out.sort();
    out.dedup();
    out
}

fn read_string(values: &Map<String, Value>, key: &str) -> String {
    values
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default()
        .to_string()
}

fn non_empty_or(value: &str, fallback: &str) -> String {
    let v = value.trim();
    if v.is_empty() {
        fallback.to_string()
    } else {
        v.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_source() -> Map<String, Value> {
        serde_json::from_value(json!({
            "namespace": "marketing",
            "resources": [
                {"name": "page", "fields": {"title": "string"}},
                {"name": "campaign"},
            ],
            "actions": [
                {"name": "send", "resource": "campaign", "type": "email"},
                {"name": "archive"},
            ],
            "roles": ["editor", "admin", "editor"],
            "custom_widget": {"x": 1},
        }))
        .expect("source map")
    }

    #[test]
    fn export_sorts_and_collects_unsupported() {
        let bundle = build_bundle(&sample_source(), "t_acme", DEFAULT_BUNDLE_VERSION, "p1", "d1")
            .expect("bundle");
        assert_eq!(bundle.namespace, "marketing");
        assert_eq!(bundle.resources[0].name, "campaign");
        assert_eq!(bundle.resources[1].name, "page");
        assert_eq!(bundle.actions[0].name, "archive");
        assert_eq!(bundle.roles, vec!["admin", "editor"]);
        assert_eq!(bundle.unsupported_fields, vec!["custom_widget"]);
        assert!(bundle.bundle_id.starts_with("mig_"));
    }

    #[test]
    fn round_trip_preserves_checksum() {
        let exported = build_bundle(&sample_source(), "t_acme", DEFAULT_BUNDLE_VERSION, "p1", "d1")
            .expect("export");
        let imported =
            normalize_imported(&exported, "t_acme", "p1", "d1").expect("import normalized");
        assert_eq!(imported.checksum, exported.checksum);
    }

    #[test]
    fn checksum_mismatch_is_rejected() {
        let mut exported =
            build_bundle(&sample_source(), "t_acme", DEFAULT_BUNDLE_VERSION, "p1", "d1")
                .expect("export");
        exported.checksum = format!("{}0", &exported.checksum[..exported.checksum.len() - 1]);
        let err = normalize_imported(&exported, "t_acme", "p1", "d1").expect_err("must reject");
        assert!(matches!(err, MigrationError::ChecksumMismatch { .. }));
    }

    #[test]
    fn foreign_source_system_is_rejected() {
        let mut bundle = VioletBundle {
            namespace: "x".to_string(),
            ..VioletBundle::default()
        };
        bundle.source_system = "rails-classic".to_string();
        let err = normalize_imported(&bundle, "t", "p1", "d1").expect_err("must reject");
        assert!(matches!(err, MigrationError::SourceSystemMismatch));
    }

    #[test]
    fn namespace_is_required() {
        let source = Map::new();
        let err = build_bundle(&source, "t", DEFAULT_BUNDLE_VERSION, "p1", "d1")
            .expect_err("must reject");
        assert!(matches!(err, MigrationError::NamespaceRequired));
    }
}
