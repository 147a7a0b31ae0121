//! Task schema, the JSON table of task definitions.
//!
//! ```json
//! {
//!   "blink": { "uid": 1, "params": { "period_ms": "u32" }, "return": {} },
//!   "probe": { "uid": "300", "params": {}, "return": { "value": "f32" } }
//! }
//! ```
//!
//! The only thing the codec needs from it is the task-id field width, which
//! is derived from the largest uid.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::packet::TaskIdWidth;

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("failed to read schema {0}: {1}")]
    Read(PathBuf, std::io::Error),
    #[error("invalid JSON in schema: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("schema must be a non-empty object of tasks")]
    Empty,
    #[error("task {task:?}: missing key {key:?}")]
    MissingKey { task: String, key: &'static str },
    #[error("task {task:?}: uid must be an unsigned integer below 2^64, got {value}")]
    InvalidUid { task: String, value: String },
    #[error("task {task:?}: {key:?} must map names to type strings")]
    InvalidSignature { task: String, key: &'static str },
}

/// One task definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDef {
    pub uid: u64,
    /// Parameter name → type name.
    pub params: BTreeMap<String, String>,
    /// Return value name → type name.
    pub returns: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSchema {
    tasks: BTreeMap<String, TaskDef>,
}

impl TaskSchema {
    pub fn load(path: &Path) -> Result<Self, SchemaError> {
        let text =
            std::fs::read_to_string(path).map_err(|e| SchemaError::Read(path.to_path_buf(), e))?;
        let schema = Self::from_json_str(&text)?;
        tracing::debug!(path = %path.display(), tasks = schema.tasks.len(), "schema loaded");
        Ok(schema)
    }

    pub fn from_json_str(text: &str) -> Result<Self, SchemaError> {
        let root: Value = serde_json::from_str(text)?;
        let entries = match root.as_object() {
            Some(map) if !map.is_empty() => map,
            _ => return Err(SchemaError::Empty),
        };

        let mut tasks = BTreeMap::new();
        for (name, body) in entries {
            tasks.insert(name.clone(), parse_task(name, body)?);
        }
        Ok(Self { tasks })
    }

    pub fn tasks(&self) -> &BTreeMap<String, TaskDef> {
        &self.tasks
    }

    pub fn get(&self, name: &str) -> Option<&TaskDef> {
        self.tasks.get(name)
    }

    /// Largest uid across all tasks.
    pub fn max_uid(&self) -> u64 {
        self.tasks.values().map(|t| t.uid).max().unwrap_or(0)
    }

    pub fn task_id_width(&self) -> TaskIdWidth {
        TaskIdWidth::for_max_uid(self.max_uid())
    }
}

fn parse_task(name: &str, body: &Value) -> Result<TaskDef, SchemaError> {
    let missing = |key: &'static str| SchemaError::MissingKey {
        task: name.to_string(),
        key,
    };
    let body = body.as_object().ok_or_else(|| missing("uid"))?;
    let uid = body.get("uid").ok_or_else(|| missing("uid"))?;
    let params = body.get("params").ok_or_else(|| missing("params"))?;
    let returns = body.get("return").ok_or_else(|| missing("return"))?;

    Ok(TaskDef {
        uid: parse_uid(name, uid)?,
        params: parse_signature(name, "params", params)?,
        returns: parse_signature(name, "return", returns)?,
    })
}

fn parse_uid(task: &str, value: &Value) -> Result<u64, SchemaError> {
    let uid = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    uid.ok_or_else(|| SchemaError::InvalidUid {
        task: task.to_string(),
        value: value.to_string(),
    })
}

fn parse_signature(
    task: &str,
    key: &'static str,
    value: &Value,
) -> Result<BTreeMap<String, String>, SchemaError> {
    let invalid = || SchemaError::InvalidSignature {
        task: task.to_string(),
        key,
    };
    let map: &Map<String, Value> = value.as_object().ok_or_else(invalid)?;
    map.iter()
        .map(|(name, ty)| {
            ty.as_str()
                .map(|ty| (name.clone(), ty.to_string()))
                .ok_or_else(invalid)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "blink": { "uid": 1, "params": { "period_ms": "u32" }, "return": {} },
        "probe": { "uid": "300", "params": {}, "return": { "value": "f32" } }
    }"#;

    #[test]
    fn parses_tasks_and_derives_width() {
        let schema = TaskSchema::from_json_str(SAMPLE).unwrap();
        assert_eq!(schema.tasks().len(), 2);
        let probe = schema.get("probe").unwrap();
        assert_eq!(probe.uid, 300);
        assert_eq!(probe.returns.get("value").map(String::as_str), Some("f32"));
        assert_eq!(schema.max_uid(), 300);
        assert_eq!(schema.task_id_width(), TaskIdWidth::U16);
    }

    #[test]
    fn width_boundary_is_inclusive() {
        let at = r#"{"t": {"uid": 255, "params": {}, "return": {}}}"#;
        let over = r#"{"t": {"uid": 256, "params": {}, "return": {}}}"#;
        let max = r#"{"t": {"uid": 18446744073709551615, "params": {}, "return": {}}}"#;
        assert_eq!(TaskSchema::from_json_str(at).unwrap().task_id_width(), TaskIdWidth::U8);
        assert_eq!(TaskSchema::from_json_str(over).unwrap().task_id_width(), TaskIdWidth::U16);
        assert_eq!(TaskSchema::from_json_str(max).unwrap().task_id_width(), TaskIdWidth::U64);
    }

    #[test]
    fn rejects_malformed_schemas() {
        assert!(matches!(TaskSchema::from_json_str("{}"), Err(SchemaError::Empty)));
        assert!(matches!(TaskSchema::from_json_str("[]"), Err(SchemaError::Empty)));
        assert!(matches!(TaskSchema::from_json_str("{"), Err(SchemaError::Parse(_))));
        assert!(matches!(
            TaskSchema::from_json_str(r#"{"t": {"uid": 1, "params": {}}}"#),
            Err(SchemaError::MissingKey { key: "return", .. })
        ));
        assert!(matches!(
            TaskSchema::from_json_str(r#"{"t": {"uid": -1, "params": {}, "return": {}}}"#),
            Err(SchemaError::InvalidUid { .. })
        ));
        assert!(matches!(
            TaskSchema::from_json_str(r#"{"t": {"uid": "x1", "params": {}, "return": {}}}"#),
            Err(SchemaError::InvalidUid { .. })
        ));
        assert!(matches!(
            TaskSchema::from_json_str(r#"{"t": {"uid": 1, "params": {"a": 3}, "return": {}}}"#),
            Err(SchemaError::InvalidSignature { key: "params", .. })
        ));
    }

    #[test]
    fn load_reports_missing_file() {
        let err = TaskSchema::load(Path::new("/nonexistent/etask-schema.json")).unwrap_err();
        assert!(matches!(err, SchemaError::Read(..)));
    }
}
