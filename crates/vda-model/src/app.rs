// SPDX-License-Identifier: Apache-2.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Mutation classes the control plane accepts. Anything else is denied by
/// policy before it reaches [`apply_mutation`].
pub const MUTATION_CLASSES: [&str; 4] = ["set_name", "set_plan", "set_region", "set_feature_flag"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct App {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    /// Always a JSON object, never absent.
    pub blueprint: Map<String, Value>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MutationError {
    #[error("set_name requires non-empty string value")]
    NameValue,
    #[error("set_plan requires non-empty string value")]
    PlanValue,
    #[error("set_region requires non-empty string value")]
    RegionValue,
    #[error("set_feature_flag requires path")]
    FeatureFlagPath,
    #[error("set_feature_flag requires bool value")]
    FeatureFlagValue,
    #[error("unsupported mutation class")]
    UnsupportedClass,
}

/// Apply one classed mutation in place. The caller snapshots the app
/// before and after and bumps the version on success.
pub fn apply_mutation(
    app: &mut App,
    class: &str,
    path: Option<&str>,
    value: &Value,
) -> Result<(), MutationError> {
    match class {
        "set_name" => {
            let v = non_empty_string(value).ok_or(MutationError::NameValue)?;
            app.name = v;
        }
        "set_plan" => {
            let v = non_empty_string(value).ok_or(MutationError::PlanValue)?;
            app.blueprint.insert("plan".to_string(), Value::String(v));
        }
        "set_region" => {
            let v = non_empty_string(value).ok_or(MutationError::RegionValue)?;
            app.blueprint.insert("region".to_string(), Value::String(v));
        }
        "set_feature_flag" => {
            let flag = path
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .ok_or(MutationError::FeatureFlagPath)?;
            let Value::Bool(enabled) = value else {
                return Err(MutationError::FeatureFlagValue);
            };
            let features = app
                .blueprint
                .entry("features".to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !features.is_object() {
                *features = Value::Object(Map::new());
            }
            if let Some(obj) = features.as_object_mut() {
                obj.insert(flag.to_string(), Value::Bool(*enabled));
            }
        }
        _ => return Err(MutationError::UnsupportedClass),
    }
    Ok(())
}

fn non_empty_string(value: &Value) -> Option<String> {
    let v = value.as_str()?.trim();
    if v.is_empty() {
        return None;
    }
    Some(v.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn app() -> App {
        App {
            id: "app_x".to_string(),
            tenant_id: "t".to_string(),
            name: "A".to_string(),
            blueprint: Map::new(),
            version: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn set_plan_writes_blueprint_key() {
        let mut app = app();
        apply_mutation(&mut app, "set_plan", None, &json!(" enterprise ")).expect("apply");
        assert_eq!(app.blueprint["plan"], json!("enterprise"));
    }

    #[test]
    fn set_feature_flag_requires_path_and_bool() {
        let mut app = app();
        assert_eq!(
            apply_mutation(&mut app, "set_feature_flag", None, &json!(true)),
            Err(MutationError::FeatureFlagPath)
        );
        assert_eq!(
            apply_mutation(&mut app, "set_feature_flag", Some("beta"), &json!("yes")),
            Err(MutationError::FeatureFlagValue)
        );
        apply_mutation(&mut app, "set_feature_flag", Some("beta"), &json!(true)).expect("apply");
        assert_eq!(app.blueprint["features"]["beta"], json!(true));
    }

    #[test]
    fn unknown_class_is_rejected() {
        let mut app = app();
        assert_eq!(
            apply_mutation(&mut app, "drop_tenant", None, &json!("x")),
            Err(MutationError::UnsupportedClass)
        );
    }
}
