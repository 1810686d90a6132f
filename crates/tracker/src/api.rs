#![forbid(unsafe_code)]

//! Commands the host UI sends to the tracker.

use crate::domain::{Nozzle, PrintLogEntry};
use crate::error::Error;
use crate::payload::StatusPayload;
use crate::persistence::keys;
use crate::tracker::Tracker;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ApiCommand {
    SelectNozzle {
        #[serde(default)]
        nozzle_id: Option<String>,
    },
    GetStatus,
    GetLog,
    RetireNozzle {
        #[serde(default)]
        nozzle_id: Option<String>,
    },
    AddNozzle {
        #[serde(default)]
        size: Value,
        #[serde(default)]
        material: Value,
    },
    ExportLogCsv,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ApiResponse {
    Json(Value),
    /// `text/csv` body.
    Csv(String),
}

impl ApiResponse {
    fn failure(message: &str) -> Self {
        Self::Json(json!({"success": false, "error": message}))
    }
}

impl Tracker {
    /// Run one API command. Failures, including store errors, come back as
    /// `{"success": false, "error": ...}`.
    pub fn handle_command(&self, command: ApiCommand) -> ApiResponse {
        self.run_command(command).unwrap_or_else(|err| {
            warn!(%err, "api command failed");
            ApiResponse::failure(&err.to_string())
        })
    }

    fn run_command(&self, command: ApiCommand) -> Result<ApiResponse, Error> {
        match command {
            ApiCommand::SelectNozzle { nozzle_id } => self.select_nozzle(nozzle_id),
            ApiCommand::GetStatus => Ok(ApiResponse::Json(self.nozzle_status())),
            ApiCommand::GetLog => {
                let log = self.lock().print_log.clone();
                Ok(ApiResponse::Json(json!({"log": log})))
            }
            ApiCommand::RetireNozzle { nozzle_id } => self.retire_nozzle(nozzle_id),
            ApiCommand::AddNozzle { size, material } => self.add_nozzle(&size, &material),
            ApiCommand::ExportLogCsv => {
                let inner = self.lock();
                Ok(ApiResponse::Csv(write_csv(&inner.print_log)))
            }
        }
    }

    fn select_nozzle(&self, nozzle_id: Option<String>) -> Result<ApiResponse, Error> {
        let mut inner = self.lock();
        let Some(nozzle_id) = nozzle_id.filter(|id| {
            inner
                .nozzles
                .get(id)
                .is_some_and(|nozzle| !nozzle.retired)
        }) else {
            return Ok(ApiResponse::failure("Invalid or retired nozzle."));
        };

        inner
            .store
            .set(&[keys::DEFAULT_NOZZLE_ID], Value::String(nozzle_id.clone()));
        inner.store.save()?;
        info!(%nozzle_id, "nozzle selected");
        inner.current_nozzle = Some(nozzle_id);
        Ok(ApiResponse::Json(json!({"success": true})))
    }

    fn retire_nozzle(&self, nozzle_id: Option<String>) -> Result<ApiResponse, Error> {
        let mut inner = self.lock();
        let Some(nozzle_id) = nozzle_id else {
            return Ok(ApiResponse::failure("Nozzle not found."));
        };
        let Some(nozzle) = inner.nozzles.get_mut(&nozzle_id) else {
            return Ok(ApiResponse::failure("Nozzle not found."));
        };
        nozzle.retired = true;

        let nozzles = serde_json::to_value(&inner.nozzles)?;
        inner.store.set(&[keys::NOZZLES], nozzles);
        inner.store.save()?;
        info!(%nozzle_id, "nozzle retired");
        Ok(ApiResponse::Json(json!({"success": true})))
    }

    fn add_nozzle(&self, size: &Value, material: &Value) -> Result<ApiResponse, Error> {
        let size = field_text(size);
        let material = field_text(material);
        let mut inner = self.lock();

        let same_type = inner
            .nozzles
            .values()
            .filter(|n| n.size == size && n.material == material)
            .count();
        let name = format!("{size} {material} #{}", same_type + 1);
        let nozzle_id = uuid::Uuid::new_v4().to_string();

        inner.nozzles.insert(
            nozzle_id.clone(),
            Nozzle {
                size,
                material,
                name: name.clone(),
                ..Nozzle::default()
            },
        );
        let nozzles = serde_json::to_value(&inner.nozzles)?;
        inner.store.set(&[keys::NOZZLES], nozzles);
        inner.store.save()?;
        info!(%nozzle_id, %name, "nozzle added");
        Ok(ApiResponse::Json(
            json!({"success": true, "nozzle_id": nozzle_id, "name": name}),
        ))
    }

    /// Wear summary and nozzle fields from one snapshot.
    fn nozzle_status(&self) -> Value {
        let inner = self.lock();
        let generated_at = Value::String(inner.clock.now().to_rfc3339());
        let wear =
            StatusPayload::from_settings(&inner.settings, generated_at, &inner.config.defaults);

        let current = inner.current_nozzle.clone();
        let nozzle = current.as_ref().and_then(|id| inner.nozzles.get(id));
        let nozzle_name = match nozzle {
            Some(nozzle) if !nozzle.name.is_empty() => Some(nozzle.name.clone()),
            _ => current.clone(),
        };
        let prompt_enabled = inner
            .store
            .get(&[keys::PROMPT_BEFORE_PRINT])
            .unwrap_or(Value::Bool(inner.config.ui.prompt_before_print));
        let display_mode = inner
            .store
            .get(&[keys::DISPLAY_MODE])
            .unwrap_or_else(|| json!(inner.config.ui.display_mode));

        json!({
            "current_nozzle": current,
            "runtime": nozzle.map_or(0.0, |n| n.runtime),
            "expected": nozzle.map_or(0.0, |n| n.expected_life),
            "nozzle_name": nozzle_name,
            "prompt_enabled": prompt_enabled,
            "display_mode": display_mode,
            "wear": wear,
        })
    }
}

/// Text form of a loosely typed request field. Missing values render empty.
fn field_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// The print log as CSV with a header row. Fields containing a separator,
/// quote or line break are quoted.
pub fn write_csv(log: &[PrintLogEntry]) -> String {
    let mut out = String::from("timestamp,nozzle_id,nozzle_name,file,duration\r\n");
    for entry in log {
        out.push_str(&format!(
            "{},{},{},{},{:?}\r\n",
            csv_field(&entry.timestamp),
            csv_field(&entry.nozzle_id),
            csv_field(&entry.nozzle_name),
            csv_field(&entry.file),
            entry.duration,
        ));
    }
    out
}

fn csv_field(field: &str) -> String {
    if field.contains([',', '"', '\r', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn entry(file: &str, duration: f64) -> PrintLogEntry {
        PrintLogEntry {
            timestamp: "2026-01-02 03:04:05".into(),
            nozzle_id: "n1".into(),
            nozzle_name: "0.4 brass #1".into(),
            file: file.into(),
            duration,
        }
    }

    #[test]
    fn parses_commands() {
        let cmd: ApiCommand =
            serde_json::from_value(json!({"command": "select_nozzle", "nozzle_id": "abc"}))
                .unwrap();
        assert_eq!(
            cmd,
            ApiCommand::SelectNozzle {
                nozzle_id: Some("abc".into())
            }
        );

        let cmd: ApiCommand = serde_json::from_value(json!({"command": "export_log_csv"})).unwrap();
        assert_eq!(cmd, ApiCommand::ExportLogCsv);

        let cmd: ApiCommand =
            serde_json::from_value(json!({"command": "add_nozzle", "size": 0.6})).unwrap();
        assert_eq!(
            cmd,
            ApiCommand::AddNozzle {
                size: json!(0.6),
                material: Value::Null
            }
        );

        assert!(serde_json::from_value::<ApiCommand>(json!({"command": "explode"})).is_err());
    }

    #[test]
    fn csv_has_header_and_rows() {
        let csv = write_csv(&[entry("cube.gcode", 1.5)]);
        assert_eq!(
            csv,
            "timestamp,nozzle_id,nozzle_name,file,duration\r\n\
             2026-01-02 03:04:05,n1,0.4 brass #1,cube.gcode,1.5\r\n"
        );
    }

    #[test]
    fn csv_quotes_awkward_fields() {
        let csv = write_csv(&[entry("a,\"b\".gcode", 2.0)]);
        assert!(csv.ends_with(",\"a,\"\"b\"\".gcode\",2.0\r\n"));
    }

    #[test]
    fn empty_log_is_header_only() {
        assert_eq!(write_csv(&[]), "timestamp,nozzle_id,nozzle_name,file,duration\r\n");
    }
}
