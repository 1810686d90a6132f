#![forbid(unsafe_code)]

use crate::error::Error;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{cmp::Ordering, fmt, str::FromStr, sync::LazyLock};

/// `T<digits>` with optional surrounding whitespace and an optional `;`
/// trailing comment, as found in outgoing G-code and in stored settings.
static TOOL_DIRECTIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^\s*T([0-9]+)\s*(?:;.*)?$").expect("valid tool directive regex")
});

/// Canonical tool identifier: `T` followed by the decimal index without
/// leading zeros.
///
/// Ordering is numeric on the index, so `T2 < T10`.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ToolId(String);

impl ToolId {
    /// Canonicalize `text`, returning `None` when it does not name a tool.
    ///
    /// ```
    /// # use tracker::domain::ToolId;
    /// assert_eq!(ToolId::parse("t1").unwrap().as_str(), "T1");
    /// assert_eq!(ToolId::parse(" T2 ; tool change").unwrap().as_str(), "T2");
    /// assert_eq!(ToolId::parse("T007").unwrap().as_str(), "T7");
    /// assert!(ToolId::parse("G1 X10").is_none());
    /// ```
    pub fn parse(text: &str) -> Option<Self> {
        let captures = TOOL_DIRECTIVE.captures(text)?;
        let digits = captures.get(1)?.as_str().trim_start_matches('0');
        let digits = if digits.is_empty() { "0" } else { digits };
        Some(Self(format!("T{digits}")))
    }

    pub fn zero() -> Self {
        Self("T0".into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decimal index without the `T` prefix.
    pub fn index(&self) -> &str {
        &self.0[1..]
    }
}

impl Default for ToolId {
    fn default() -> Self {
        Self::zero()
    }
}

impl Ord for ToolId {
    fn cmp(&self, other: &Self) -> Ordering {
        // canonical indices have no leading zeros, so length orders magnitude
        let (a, b) = (self.index(), other.index());
        a.len().cmp(&b.len()).then_with(|| a.cmp(b))
    }
}

impl PartialOrd for ToolId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl FromStr for ToolId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| Error::InvalidArgument(format!("invalid tool id: {s:?}")))
    }
}

impl PartialEq<str> for ToolId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for ToolId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl fmt::Display for ToolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ToolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ToolId").field(&self.0).finish()
    }
}

impl TryFrom<String> for ToolId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ToolId> for String {
    fn from(id: ToolId) -> Self {
        id.0
    }
}

/// Normalize an untyped settings value. Only strings can name a tool.
pub fn normalize_tool_id(value: &Value) -> Option<ToolId> {
    value.as_str().and_then(ToolId::parse)
}

/// Detect a tool-change directive in an outgoing command line. All other
/// commands yield `None`.
pub fn extract_tool_id_from_command(cmd: &str) -> Option<ToolId> {
    ToolId::parse(cmd)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonicalizes_known_spellings() {
        let cases = [
            ("T0", Some("T0")),
            ("t1", Some("T1")),
            ("T2 ; tool change", Some("T2")),
            (" T2 ", Some("T2")),
            ("T3;", Some("T3")),
            ("T4\n", Some("T4")),
            ("G1 X10", None),
            ("", None),
            ("T", None),
            ("X0", None),
            ("T1 G1", None),
            ("T-1", None),
        ];
        for (input, expected) in cases {
            assert_eq!(
                ToolId::parse(input).as_ref().map(ToolId::as_str),
                expected,
                "input {input:?}"
            );
        }
    }

    #[test]
    fn strips_leading_zeros() {
        assert_eq!(ToolId::parse("T01").unwrap(), "T1");
        assert_eq!(ToolId::parse("T000").unwrap(), "T0");
        assert_eq!(ToolId::parse("t0010").unwrap(), "T10");
    }

    #[test]
    fn very_large_indices_stay_textual() {
        let id = ToolId::parse("T000123456789012345678901234567890").unwrap();
        assert_eq!(id.as_str(), "T123456789012345678901234567890");
        assert!(ToolId::parse("T99").unwrap() < id);
    }

    #[test]
    fn rejects_non_ascii_digits() {
        assert!(ToolId::parse("T١").is_none());
    }

    #[test]
    fn orders_numerically() {
        let mut ids: Vec<ToolId> = ["T2", "T0", "T10", "T1"]
            .into_iter()
            .filter_map(ToolId::parse)
            .collect();
        ids.sort();
        let ids: Vec<&str> = ids.iter().map(ToolId::as_str).collect();
        assert_eq!(ids, ["T0", "T1", "T2", "T10"]);
    }

    #[test]
    fn normalizes_only_string_values() {
        assert_eq!(normalize_tool_id(&json!("t5")).unwrap(), "T5");
        assert!(normalize_tool_id(&Value::Null).is_none());
        assert!(normalize_tool_id(&json!(5)).is_none());
        assert!(normalize_tool_id(&json!({"tool_id": "T0"})).is_none());
    }

    #[test]
    fn extracts_tool_change_directives() {
        assert_eq!(extract_tool_id_from_command("T1").unwrap(), "T1");
        assert!(extract_tool_id_from_command("M104 S200 T1").is_none());
        assert!(extract_tool_id_from_command("G28").is_none());
    }

    #[test]
    fn deserializes_and_canonicalizes() {
        let id: ToolId = serde_json::from_value(json!("t02")).unwrap();
        assert_eq!(id, "T2");
        assert!(serde_json::from_value::<ToolId>(json!("X2")).is_err());
        assert_eq!(serde_json::to_value(&id).unwrap(), json!("T2"));
    }

    #[test]
    fn from_str_reports_invalid_argument() {
        let err = "nozzle".parse::<ToolId>().unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }
}
