//! Server response messages.

use std::collections::HashMap;

use super::metadata::{Notification, QueryStats};
use super::tag;
use crate::bolt::error::{BoltError, BoltResult};
use crate::bolt::packstream::{PackStreamStructure, PackStreamValue};

/// Every response the server sends.
///
/// Each request ends with exactly one SUCCESS, FAILURE or IGNORED; RECORDs
/// may precede the terminal response of a PULL_ALL.
#[derive(Debug, Clone, PartialEq)]
pub enum BoltResponse {
    Success(SuccessMessage),
    Record(RecordMessage),
    Failure(FailureMessage),
    /// The server skipped the request because of an earlier failure
    Ignored,
}

impl BoltResponse {
    pub fn tag(&self) -> u8 {
        match self {
            BoltResponse::Success(_) => tag::SUCCESS,
            BoltResponse::Record(_) => tag::RECORD,
            BoltResponse::Failure(_) => tag::FAILURE,
            BoltResponse::Ignored => tag::IGNORED,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BoltResponse::Success(_) => "SUCCESS",
            BoltResponse::Record(_) => "RECORD",
            BoltResponse::Failure(_) => "FAILURE",
            BoltResponse::Ignored => "IGNORED",
        }
    }

    /// SUCCESS, FAILURE and IGNORED close out one request.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, BoltResponse::Record(_))
    }

    pub fn to_structure(&self) -> PackStreamStructure {
        let fields = match self {
            BoltResponse::Success(msg) => vec![PackStreamValue::Map(msg.metadata.clone())],
            BoltResponse::Record(msg) => vec![PackStreamValue::List(msg.fields.clone())],
            BoltResponse::Failure(msg) => {
                let mut map = HashMap::new();
                map.insert("code".to_string(), PackStreamValue::from(msg.code.as_str()));
                map.insert("message".to_string(), PackStreamValue::from(msg.message.as_str()));
                vec![PackStreamValue::Map(map)]
            }
            BoltResponse::Ignored => vec![],
        };
        PackStreamStructure::new(self.tag(), fields)
    }

    pub fn from_structure(s: PackStreamStructure) -> BoltResult<Self> {
        let tag = s.tag;
        let mut fields = s.fields.into_iter();
        let response = match (tag, fields.next(), fields.next()) {
            (tag::SUCCESS, None, None) => BoltResponse::Success(SuccessMessage::default()),
            (tag::SUCCESS, Some(PackStreamValue::Map(metadata)), None) => {
                BoltResponse::Success(SuccessMessage { metadata })
            }
            (tag::RECORD, Some(PackStreamValue::List(fields)), None) => {
                BoltResponse::Record(RecordMessage { fields })
            }
            (tag::FAILURE, Some(PackStreamValue::Map(metadata)), None) => {
                let text = |key: &str| {
                    metadata
                        .get(key)
                        .and_then(PackStreamValue::as_str)
                        .unwrap_or_default()
                        .to_string()
                };
                BoltResponse::Failure(FailureMessage {
                    code: text("code"),
                    message: text("message"),
                })
            }
            (tag::IGNORED, None, None) => BoltResponse::Ignored,
            (tag::SUCCESS | tag::RECORD | tag::FAILURE | tag::IGNORED, _, _) => {
                return Err(BoltError::Decode(format!(
                    "Malformed response message 0x{:02X}",
                    tag
                )))
            }
            (other, _, _) => {
                return Err(BoltError::Decode(format!(
                    "Unknown response message tag: 0x{:02X}",
                    other
                )))
            }
        };
        Ok(response)
    }
}

/// SUCCESS and its metadata map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SuccessMessage {
    pub metadata: HashMap<String, PackStreamValue>,
}

impl SuccessMessage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: &str, value: impl Into<PackStreamValue>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&PackStreamValue> {
        self.metadata.get(key)
    }

    fn text(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(PackStreamValue::as_str)
    }

    fn int(&self, key: &str) -> Option<i64> {
        self.metadata.get(key).and_then(PackStreamValue::as_int)
    }

    /// Column names announced by a RUN reply.
    pub fn fields(&self) -> Vec<String> {
        self.metadata
            .get("fields")
            .and_then(PackStreamValue::as_list)
            .map(|list| {
                list.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn server(&self) -> Option<&str> {
        self.text("server")
    }

    pub fn connection_id(&self) -> Option<&str> {
        self.text("connection_id")
    }

    pub fn bookmark(&self) -> Option<&str> {
        self.text("bookmark")
    }

    pub fn db(&self) -> Option<&str> {
        self.text("db")
    }

    /// `"r"`, `"w"`, `"rw"` or `"s"`.
    pub fn query_type(&self) -> Option<&str> {
        self.text("type")
    }

    /// Milliseconds until the first record was available. v3+ name, then v1 name.
    pub fn t_first(&self) -> Option<i64> {
        self.int("t_first").or_else(|| self.int("result_available_after"))
    }

    /// Milliseconds until the last record was consumed. v3+ name, then v1 name.
    pub fn t_last(&self) -> Option<i64> {
        self.int("t_last").or_else(|| self.int("result_consumed_after"))
    }

    pub fn has_more(&self) -> bool {
        self.metadata
            .get("has_more")
            .and_then(PackStreamValue::as_bool)
            .unwrap_or(false)
    }

    pub fn stats(&self) -> QueryStats {
        self.metadata
            .get("stats")
            .and_then(PackStreamValue::as_map)
            .map(QueryStats::from_map)
            .unwrap_or_default()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.metadata
            .get("notifications")
            .and_then(PackStreamValue::as_list)
            .map(|list| {
                list.iter()
                    .filter_map(PackStreamValue::as_map)
                    .filter_map(Notification::from_map)
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// One row of values, positionally matching the RUN reply's `fields`.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordMessage {
    pub fields: Vec<PackStreamValue>,
}

impl RecordMessage {
    pub fn new(fields: Vec<PackStreamValue>) -> Self {
        Self { fields }
    }
}

/// FAILURE: a status code such as `Neo.ClientError.Statement.SyntaxError` and a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureMessage {
    pub code: String,
    pub message: String,
}

impl FailureMessage {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_reply_accessors() {
        let msg = SuccessMessage::new()
            .with("fields", vec![PackStreamValue::from("x"), PackStreamValue::from("y")])
            .with("t_first", 3i64);
        assert_eq!(msg.fields(), vec!["x".to_string(), "y".to_string()]);
        assert_eq!(msg.t_first(), Some(3));
        assert_eq!(msg.t_last(), None);
    }

    #[test]
    fn test_legacy_timing_keys_are_understood() {
        let msg = SuccessMessage::new()
            .with("result_available_after", 5i64)
            .with("result_consumed_after", 9i64);
        assert_eq!(msg.t_first(), Some(5));
        assert_eq!(msg.t_last(), Some(9));
    }

    #[test]
    fn test_failure_decodes_code_and_message() {
        let wire = BoltResponse::Failure(FailureMessage::new(
            "Neo.ClientError.Statement.SyntaxError",
            "bad input",
        ))
        .to_structure();
        match BoltResponse::from_structure(wire).unwrap() {
            BoltResponse::Failure(f) => {
                assert_eq!(f.code, "Neo.ClientError.Statement.SyntaxError");
                assert_eq!(f.message, "bad input");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_record_with_wrong_shape_is_rejected() {
        let s = PackStreamStructure::new(tag::RECORD, vec![PackStreamValue::Integer(1)]);
        assert!(matches!(BoltResponse::from_structure(s), Err(BoltError::Decode(_))));
    }

    #[test]
    fn test_unknown_response_tag_is_rejected() {
        let s = PackStreamStructure::new(0x10, vec![]);
        let err = BoltResponse::from_structure(s).unwrap_err();
        assert!(err.to_string().contains("0x10"));
    }

    #[test]
    fn test_only_records_are_non_terminal() {
        assert!(!BoltResponse::Record(RecordMessage::new(vec![])).is_terminal());
        assert!(BoltResponse::Ignored.is_terminal());
        assert!(BoltResponse::Success(SuccessMessage::new()).is_terminal());
    }
}
