//! Chart loading and the JSON-backed context used by the runner.

use arbor_core::{is_truthy, CallbackError, Chart, Context, CoreError, StateRecord};
use serde_json::Value;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Context for charts run from files.
///
/// Named guards read the field of that name from `data`; a missing field is
/// false. Named actions are recorded in `trace` and their object arguments
/// are merged into `data`, so an event fired with `{"has_media": true}` can
/// open a guard for a later event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    pub data: Value,
    pub trace: Vec<String>,
}

impl Session {
    pub fn new(data: Value) -> Self {
        Self {
            data,
            trace: Vec::new(),
        }
    }

    /// Returns and clears the recorded actions.
    pub fn take_trace(&mut self) -> Vec<String> {
        std::mem::take(&mut self.trace)
    }

    fn merge(&mut self, payload: &Value) {
        let Value::Object(fields) = payload else {
            return;
        };
        if !self.data.is_object() {
            self.data = Value::Object(Default::default());
        }
        if let Value::Object(data) = &mut self.data {
            for (k, v) in fields {
                data.insert(k.clone(), v.clone());
            }
        }
    }
}

impl Context for Session {
    fn guard(&self, name: &str, _args: &[Value]) -> Option<Result<bool, CallbackError>> {
        Some(Ok(self.data.get(name).is_some_and(is_truthy)))
    }

    fn action(&mut self, name: &str, args: &[Value]) -> Option<Result<(), CallbackError>> {
        let rendered: Vec<String> = args.iter().map(Value::to_string).collect();
        self.trace.push(format!("{}({})", name, rendered.join(", ")));
        for arg in args {
            self.merge(arg);
        }
        Some(Ok(()))
    }
}

/// Chart file error.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read chart '{}': {1}", .0.display())]
    Io(PathBuf, std::io::Error),

    #[error("failed to parse chart '{}': {1}", .0.display())]
    Parse(PathBuf, String),

    #[error("unsupported chart format '{}' (expected .json, .yaml or .yml)", .0.display())]
    Format(PathBuf),

    #[error("invalid chart '{}': {1}", .0.display())]
    Chart(PathBuf, CoreError),
}

/// Reads a chart record from a JSON or YAML file, chosen by extension.
pub fn load_record(path: &Path) -> Result<StateRecord, LoadError> {
    let content =
        std::fs::read_to_string(path).map_err(|e| LoadError::Io(path.to_path_buf(), e))?;
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
    match extension {
        "json" => serde_json::from_str(&content)
            .map_err(|e| LoadError::Parse(path.to_path_buf(), e.to_string())),
        "yaml" | "yml" => serde_yaml::from_str(&content)
            .map_err(|e| LoadError::Parse(path.to_path_buf(), e.to_string())),
        _ => Err(LoadError::Format(path.to_path_buf())),
    }
}

/// Loads and builds a chart.
pub fn load_chart(path: &Path) -> Result<Chart<Session>, LoadError> {
    let record = load_record(path)?;
    Chart::from_record(record).map_err(|e| LoadError::Chart(path.to_path_buf(), e))
}

/// Parses a JSON argument; `@file.json` reads it from a file.
pub fn parse_json_arg(arg: &str) -> Result<Value, Box<dyn std::error::Error>> {
    if let Some(path) = arg.strip_prefix('@') {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    } else {
        Ok(serde_json::from_str(arg)?)
    }
}

/// Splits `event:json` into the event name and its arguments. A JSON array
/// supplies several arguments; any other value is a single argument.
pub fn parse_event_arg(arg: &str) -> Result<(String, Vec<Value>), Box<dyn std::error::Error>> {
    let Some((event, payload)) = arg.split_once(':') else {
        return Ok((arg.to_string(), Vec::new()));
    };
    let args = match parse_json_arg(payload)? {
        Value::Array(items) => items,
        value => vec![value],
    };
    Ok((event.to_string(), args))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_core::Instance;
    use serde_json::json;
    use tempfile::TempDir;

    const PLAYER_YAML: &str = r#"
name: player
initial: stopped
states:
  - stopped
  - name: active
    states: [playing, paused]
    transitions:
      - event: stop
        target: stopped
        action: rewind
transitions:
  - event: play
    target: active.playing
    guard: has_media
"#;

    #[test]
    fn test_load_yaml_chart() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("player.yaml");
        std::fs::write(&path, PLAYER_YAML).unwrap();

        let chart = load_chart(&path).unwrap();
        assert_eq!(chart.root_node().name(), "player");
        assert!(chart.checksum().is_some());
    }

    #[test]
    fn test_load_rejects_unknown_extension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("player.toml");
        std::fs::write(&path, "").unwrap();
        assert!(matches!(load_chart(&path).unwrap_err(), LoadError::Format(_)));
    }

    #[test]
    fn test_load_reports_invalid_chart() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"{"states": [{"name": "only", "states": ["one"]}]}"#).unwrap();
        assert!(matches!(load_chart(&path).unwrap_err(), LoadError::Chart(..)));
    }

    #[test]
    fn test_session_guards_and_actions() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("player.yml");
        std::fs::write(&path, PLAYER_YAML).unwrap();
        let chart = load_chart(&path).unwrap();

        let mut instance = Instance::new(&chart, Session::new(json!({}))).unwrap();
        let err = instance.fire_event("play", &[]).unwrap_err();
        assert!(matches!(err, CoreError::GuardNotSatisfied { .. }));

        instance.context_mut().data["has_media"] = json!(true);
        instance.fire_event("play", &[]).unwrap();
        assert_eq!(instance.current_path(), "active.playing");

        instance.fire_event("stop", &[json!({"position": 0})]).unwrap();
        assert_eq!(instance.context().trace, ["rewind({\"position\":0})"]);
        assert_eq!(instance.context().data["position"], json!(0));
    }

    #[test]
    fn test_parse_event_arg() {
        let (event, args) = parse_event_arg("play").unwrap();
        assert_eq!(event, "play");
        assert!(args.is_empty());

        let (event, args) = parse_event_arg(r#"seek:{"to": 10}"#).unwrap();
        assert_eq!(event, "seek");
        assert_eq!(args, vec![json!({"to": 10})]);

        let (_, args) = parse_event_arg("add:[1, 2]").unwrap();
        assert_eq!(args, vec![json!(1), json!(2)]);

        assert!(parse_event_arg("bad:{").is_err());
    }
}
