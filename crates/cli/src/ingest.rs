//! JSON-lines protocol between the host and `nozzle-life run`.
//!
//! Each input line is one [`HostMessage`]. API requests get exactly one
//! [`Reply`] line on stdout; events and G-code get none.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};
use tracker::{ApiCommand, ApiResponse, Tracker};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostMessage {
    /// Print lifecycle event, e.g. `PrintStarted`.
    Event {
        event: String,
        #[serde(default)]
        payload: Value,
    },
    /// A line of G-code the host sent to the printer.
    Gcode { command: String },
    Api { request: ApiCommand },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Reply {
    Json(Value),
    Csv(String),
    Error(String),
}

impl From<ApiResponse> for Reply {
    fn from(response: ApiResponse) -> Self {
        match response {
            ApiResponse::Json(value) => Self::Json(value),
            ApiResponse::Csv(text) => Self::Csv(text),
        }
    }
}

/// Blank lines parse to `None`.
pub fn parse_line(line: &str) -> Result<Option<HostMessage>, Error> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(line)?))
}

pub fn dispatch(tracker: &Tracker, message: HostMessage) -> Option<Reply> {
    match message {
        HostMessage::Event { event, payload } => {
            tracker.on_event(&event, &payload);
            None
        }
        HostMessage::Gcode { command } => {
            if let Some(tool) = tracker.on_gcode_sent(&command) {
                debug!(%tool, "host switched tool");
            }
            None
        }
        HostMessage::Api { request } => Some(tracker.handle_command(request).into()),
    }
}

/// Handle one input line, writing a reply if it calls for one. Malformed
/// lines are answered with an error reply.
pub async fn process_line<W>(tracker: &Tracker, line: &str, out: &mut W) -> Result<(), Error>
where
    W: AsyncWrite + Unpin,
{
    let reply = match parse_line(line) {
        Ok(Some(message)) => dispatch(tracker, message),
        Ok(None) => None,
        Err(err) => {
            warn!(%err, "ignoring malformed host message");
            Some(Reply::Error(err.to_string()))
        }
    };

    if let Some(reply) = reply {
        let mut text = serde_json::to_string(&reply)?;
        text.push('\n');
        out.write_all(text.as_bytes()).await.map_err(Error::Reply)?;
        out.flush().await.map_err(Error::Reply)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::Config;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use std::sync::Arc;
    use tracker::clock::ManualClock;
    use tracker::persistence::MemoryStore;

    fn new_tracker() -> Tracker {
        Tracker::new(
            Config::default(),
            Box::new(MemoryStore::new()),
            Arc::new(ManualClock::at_epoch(0)),
        )
    }

    #[test]
    fn parses_every_message_kind() {
        assert_eq!(
            parse_line(r#"{"type": "event", "event": "PrintStarted"}"#).unwrap(),
            Some(HostMessage::Event {
                event: "PrintStarted".into(),
                payload: Value::Null
            })
        );
        assert_eq!(
            parse_line(r#"{"type": "gcode", "command": "T1"}"#).unwrap(),
            Some(HostMessage::Gcode {
                command: "T1".into()
            })
        );
        assert_eq!(
            parse_line(r#"{"type": "api", "request": {"command": "get_log"}}"#).unwrap(),
            Some(HostMessage::Api {
                request: ApiCommand::GetLog
            })
        );
        assert_eq!(parse_line("   ").unwrap(), None);
    }

    #[test]
    fn rejects_unknown_types() {
        assert!(parse_line(r#"{"type": "telemetry"}"#).is_err());
        assert!(parse_line("T0").is_err());
    }

    #[test]
    fn gcode_messages_switch_tools() {
        let tracker = new_tracker();
        let reply = dispatch(
            &tracker,
            HostMessage::Gcode {
                command: "T4".into(),
            },
        );
        assert_eq!(reply, None);
        assert_eq!(tracker.session().active_tool.as_str(), "T4");
    }

    #[tokio::test]
    async fn api_requests_get_one_reply_line() {
        let tracker = new_tracker();
        let mut out = Vec::new();
        process_line(
            &tracker,
            r#"{"type": "api", "request": {"command": "get_log"}}"#,
            &mut out,
        )
        .await
        .unwrap();
        process_line(&tracker, r#"{"type": "event", "event": "PrintStarted"}"#, &mut out)
            .await
            .unwrap();

        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "{\"json\":{\"log\":[]}}\n");
    }

    #[tokio::test]
    async fn malformed_lines_get_error_replies() {
        let tracker = new_tracker();
        let mut out = Vec::new();
        process_line(&tracker, "{oops", &mut out).await.unwrap();

        let reply: Value = serde_json::from_slice(&out).unwrap();
        assert!(reply.get("error").is_some());
        assert_eq!(reply.as_object().map(|o| o.len()), Some(1));
    }

    proptest! {
        #[test]
        fn parse_line_never_panics(line in ".*") {
            let _ = parse_line(&line);
        }
    }
}
