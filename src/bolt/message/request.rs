//! Client request messages and their version-specific encodings.

use std::collections::HashMap;
use std::fmt;

use super::tag;
use crate::bolt::error::{BoltError, BoltResult};
use crate::bolt::handshake::BoltVersion;
use crate::bolt::packstream::{PackStreamStructure, PackStreamValue};

/// Access mode sent with v4+ BEGIN and auto-commit RUN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessMode {
    #[default]
    Write,
    Read,
}

/// Credentials presented during INIT/HELLO.
///
/// `Debug` never prints the credentials field.
#[derive(Clone, PartialEq)]
pub struct AuthToken {
    pub scheme: String,
    pub principal: Option<String>,
    pub credentials: Option<String>,
    pub realm: Option<String>,
    pub parameters: HashMap<String, PackStreamValue>,
}

const AUTH_KEYS: [&str; 4] = ["scheme", "principal", "credentials", "realm"];

impl AuthToken {
    /// Username and password.
    pub fn basic(principal: impl Into<String>, credentials: impl Into<String>) -> Self {
        Self {
            scheme: "basic".to_string(),
            principal: Some(principal.into()),
            credentials: Some(credentials.into()),
            realm: None,
            parameters: HashMap::new(),
        }
    }

    /// A single opaque token, such as an SSO bearer token.
    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            scheme: "bearer".to_string(),
            principal: None,
            credentials: Some(token.into()),
            realm: None,
            parameters: HashMap::new(),
        }
    }

    /// No authentication.
    pub fn none() -> Self {
        Self {
            scheme: "none".to_string(),
            principal: None,
            credentials: None,
            realm: None,
            parameters: HashMap::new(),
        }
    }

    pub fn with_realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = Some(realm.into());
        self
    }

    pub fn to_map(&self) -> HashMap<String, PackStreamValue> {
        let mut map = self.parameters.clone();
        map.insert("scheme".to_string(), PackStreamValue::from(self.scheme.as_str()));
        let optional = [
            ("principal", &self.principal),
            ("credentials", &self.credentials),
            ("realm", &self.realm),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                map.insert(key.to_string(), PackStreamValue::from(value.as_str()));
            }
        }
        map
    }

    pub fn from_map(map: &HashMap<String, PackStreamValue>) -> Self {
        let text = |key: &str| map.get(key).and_then(PackStreamValue::as_str).map(str::to_string);
        Self {
            scheme: text("scheme").unwrap_or_else(|| "none".to_string()),
            principal: text("principal"),
            credentials: text("credentials"),
            realm: text("realm"),
            parameters: map
                .iter()
                .filter(|(k, _)| !AUTH_KEYS.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }
}

impl Default for AuthToken {
    fn default() -> Self {
        AuthToken::none()
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthToken")
            .field("scheme", &self.scheme)
            .field("principal", &self.principal)
            .field("credentials", &self.credentials.as_ref().map(|_| "<redacted>"))
            .field("realm", &self.realm)
            .finish_non_exhaustive()
    }
}

/// INIT (v1, v2) or HELLO (v3+).
#[derive(Debug, Clone, PartialEq)]
pub struct InitMessage {
    pub user_agent: String,
    pub auth: AuthToken,
}

/// RUN: statement text, parameters and, on v3+, an extra map
/// (bookmarks, tx_timeout, tx_metadata, mode, db).
#[derive(Debug, Clone, PartialEq)]
pub struct RunMessage {
    pub statement: String,
    pub parameters: HashMap<String, PackStreamValue>,
    pub extra: HashMap<String, PackStreamValue>,
}

impl RunMessage {
    pub fn new(statement: impl Into<String>) -> Self {
        Self {
            statement: statement.into(),
            parameters: HashMap::new(),
            extra: HashMap::new(),
        }
    }

    pub fn with_parameters(mut self, parameters: HashMap<String, PackStreamValue>) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_extra(mut self, extra: HashMap<String, PackStreamValue>) -> Self {
        self.extra = extra;
        self
    }
}

/// BEGIN (v3+) with its extra map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BeginMessage {
    pub extra: HashMap<String, PackStreamValue>,
}

/// Every request the client sends.
#[derive(Debug, Clone, PartialEq)]
pub enum BoltRequest {
    Init(InitMessage),
    Run(RunMessage),
    /// Stream all remaining records of the last RUN
    PullAll,
    /// Drop all remaining records of the last RUN
    DiscardAll,
    Begin(BeginMessage),
    Commit,
    Rollback,
    Reset,
    /// Clear a failure on v1/v2 without resetting the session
    AckFailure,
    Goodbye,
}

impl BoltRequest {
    pub fn tag(&self) -> u8 {
        match self {
            BoltRequest::Init(_) => tag::INIT,
            BoltRequest::Run(_) => tag::RUN,
            BoltRequest::PullAll => tag::PULL_ALL,
            BoltRequest::DiscardAll => tag::DISCARD_ALL,
            BoltRequest::Begin(_) => tag::BEGIN,
            BoltRequest::Commit => tag::COMMIT,
            BoltRequest::Rollback => tag::ROLLBACK,
            BoltRequest::Reset => tag::RESET,
            BoltRequest::AckFailure => tag::ACK_FAILURE,
            BoltRequest::Goodbye => tag::GOODBYE,
        }
    }

    /// Message name for logs. Carries no field content.
    pub fn name(&self) -> &'static str {
        match self {
            BoltRequest::Init(_) => "INIT",
            BoltRequest::Run(_) => "RUN",
            BoltRequest::PullAll => "PULL_ALL",
            BoltRequest::DiscardAll => "DISCARD_ALL",
            BoltRequest::Begin(_) => "BEGIN",
            BoltRequest::Commit => "COMMIT",
            BoltRequest::Rollback => "ROLLBACK",
            BoltRequest::Reset => "RESET",
            BoltRequest::AckFailure => "ACK_FAILURE",
            BoltRequest::Goodbye => "GOODBYE",
        }
    }

    /// Whether the server answers this request with anything at all.
    pub fn expects_response(&self) -> bool {
        !matches!(self, BoltRequest::Goodbye)
    }

    /// Encode for the negotiated `version`.
    ///
    /// Fails with [`BoltError::Encode`] when the version has no such message.
    pub fn to_structure(&self, version: BoltVersion) -> BoltResult<PackStreamStructure> {
        let explicit_tx = version.has_explicit_transactions();
        let fields = match self {
            BoltRequest::Init(init) if explicit_tx => {
                let mut extra = init.auth.to_map();
                extra.insert("user_agent".to_string(), PackStreamValue::from(init.user_agent.as_str()));
                vec![PackStreamValue::Map(extra)]
            }
            BoltRequest::Init(init) => vec![
                PackStreamValue::from(init.user_agent.as_str()),
                PackStreamValue::Map(init.auth.to_map()),
            ],
            BoltRequest::Run(run) => {
                let mut fields = vec![
                    PackStreamValue::from(run.statement.as_str()),
                    PackStreamValue::Map(run.parameters.clone()),
                ];
                if explicit_tx {
                    fields.push(PackStreamValue::Map(run.extra.clone()));
                } else if !run.extra.is_empty() {
                    return Err(unsupported("RUN metadata", version));
                }
                fields
            }
            BoltRequest::Begin(_) | BoltRequest::Commit | BoltRequest::Rollback | BoltRequest::Goodbye
                if !explicit_tx =>
            {
                return Err(unsupported(self.name(), version));
            }
            BoltRequest::AckFailure if explicit_tx => return Err(unsupported(self.name(), version)),
            BoltRequest::Begin(begin) => vec![PackStreamValue::Map(begin.extra.clone())],
            BoltRequest::PullAll | BoltRequest::DiscardAll if version.has_pull_n() => {
                let mut extra = HashMap::new();
                extra.insert("n".to_string(), PackStreamValue::Integer(-1));
                vec![PackStreamValue::Map(extra)]
            }
            BoltRequest::PullAll
            | BoltRequest::DiscardAll
            | BoltRequest::Commit
            | BoltRequest::Rollback
            | BoltRequest::Reset
            | BoltRequest::AckFailure
            | BoltRequest::Goodbye => vec![],
        };
        Ok(PackStreamStructure::new(self.tag(), fields))
    }

    /// Decode a request structure. The dialect is recognised from the field layout.
    pub fn from_structure(s: &PackStreamStructure) -> BoltResult<Self> {
        let request = match (s.tag, s.fields.as_slice()) {
            (tag::INIT, [PackStreamValue::String(agent), PackStreamValue::Map(auth)]) => {
                BoltRequest::Init(InitMessage {
                    user_agent: agent.clone(),
                    auth: AuthToken::from_map(auth),
                })
            }
            (tag::INIT, [PackStreamValue::Map(extra)]) => {
                let mut auth = extra.clone();
                let user_agent = match auth.remove("user_agent") {
                    Some(PackStreamValue::String(agent)) => agent,
                    _ => return Err(malformed(s, "HELLO without user_agent")),
                };
                BoltRequest::Init(InitMessage {
                    user_agent,
                    auth: AuthToken::from_map(&auth),
                })
            }
            (tag::RUN, [PackStreamValue::String(text), PackStreamValue::Map(params), rest @ ..]) => {
                let extra = match rest {
                    [] => HashMap::new(),
                    [PackStreamValue::Map(extra)] => extra.clone(),
                    _ => return Err(malformed(s, "RUN extra must be a map")),
                };
                BoltRequest::Run(RunMessage {
                    statement: text.clone(),
                    parameters: params.clone(),
                    extra,
                })
            }
            (tag::PULL_ALL, [] | [PackStreamValue::Map(_)]) => BoltRequest::PullAll,
            (tag::DISCARD_ALL, [] | [PackStreamValue::Map(_)]) => BoltRequest::DiscardAll,
            (tag::BEGIN, [PackStreamValue::Map(extra)]) => BoltRequest::Begin(BeginMessage { extra: extra.clone() }),
            (tag::COMMIT, []) => BoltRequest::Commit,
            (tag::ROLLBACK, []) => BoltRequest::Rollback,
            (tag::RESET, []) => BoltRequest::Reset,
            (tag::ACK_FAILURE, []) => BoltRequest::AckFailure,
            (tag::GOODBYE, []) => BoltRequest::Goodbye,
            (tag::INIT | tag::RUN | tag::PULL_ALL | tag::DISCARD_ALL | tag::BEGIN, _)
            | (tag::COMMIT | tag::ROLLBACK | tag::RESET | tag::ACK_FAILURE | tag::GOODBYE, _) => {
                return Err(malformed(s, "unexpected fields"));
            }
            (other, _) => {
                return Err(BoltError::Decode(format!("Unknown request tag: 0x{:02X}", other)))
            }
        };
        Ok(request)
    }
}

fn unsupported(what: &str, version: BoltVersion) -> BoltError {
    BoltError::Encode(format!("{} is not available in Bolt {}", what, version))
}

fn malformed(s: &PackStreamStructure, detail: &str) -> BoltError {
    BoltError::Decode(format!("Malformed request 0x{:02X}: {}", s.tag, detail))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hello() -> BoltRequest {
        BoltRequest::Init(InitMessage {
            user_agent: "boltwire/0.1".to_string(),
            auth: AuthToken::basic("neo4j", "secret"),
        })
    }

    #[test]
    fn test_init_layout_depends_on_version() {
        let v1 = hello().to_structure(BoltVersion::V1).unwrap();
        assert_eq!(v1.tag, tag::INIT);
        assert_eq!(v1.fields.len(), 2);
        assert_eq!(v1.fields[0], PackStreamValue::from("boltwire/0.1"));

        let v3 = hello().to_structure(BoltVersion::V3).unwrap();
        let extra = v3.fields[0].as_map().unwrap();
        assert_eq!(extra["user_agent"], PackStreamValue::from("boltwire/0.1"));
        assert_eq!(extra["scheme"], PackStreamValue::from("basic"));
        assert_eq!(extra["credentials"], PackStreamValue::from("secret"));
    }

    #[test]
    fn test_pull_all_carries_n_from_v4() {
        assert!(BoltRequest::PullAll.to_structure(BoltVersion::V3).unwrap().is_empty());
        let v4 = BoltRequest::DiscardAll.to_structure(BoltVersion::V4_4).unwrap();
        assert_eq!(v4.tag, tag::DISCARD_ALL);
        assert_eq!(v4.fields[0].as_map().unwrap()["n"], PackStreamValue::Integer(-1));
    }

    #[test]
    fn test_version_gated_messages_fail_to_encode() {
        for request in [BoltRequest::Commit, BoltRequest::Goodbye, BoltRequest::Begin(BeginMessage::default())] {
            assert!(matches!(request.to_structure(BoltVersion::V2), Err(BoltError::Encode(_))));
        }
        assert!(matches!(
            BoltRequest::AckFailure.to_structure(BoltVersion::V4_0),
            Err(BoltError::Encode(_))
        ));
        let mut extra = HashMap::new();
        extra.insert("db".to_string(), PackStreamValue::from("movies"));
        let run = BoltRequest::Run(RunMessage::new("RETURN 1").with_extra(extra));
        assert!(matches!(run.to_structure(BoltVersion::V1), Err(BoltError::Encode(_))));
    }

    #[test]
    fn test_requests_decode_back_to_themselves() {
        let mut params = HashMap::new();
        params.insert("x".to_string(), PackStreamValue::Integer(7));
        let mut extra = HashMap::new();
        extra.insert("bookmarks".to_string(), PackStreamValue::List(vec![]));
        let run = BoltRequest::Run(RunMessage::new("RETURN $x").with_parameters(params).with_extra(extra));

        for version in [BoltVersion::V3, BoltVersion::V4_4] {
            for request in [hello(), run.clone(), BoltRequest::PullAll, BoltRequest::Commit] {
                let s = request.to_structure(version).unwrap();
                assert_eq!(BoltRequest::from_structure(&s).unwrap(), request, "{}", version);
            }
        }
        let s = hello().to_structure(BoltVersion::V1).unwrap();
        assert_eq!(BoltRequest::from_structure(&s).unwrap(), hello());
    }

    #[test]
    fn test_unknown_tag_is_a_decode_error() {
        let s = PackStreamStructure::new(0x66, vec![]);
        assert!(matches!(BoltRequest::from_structure(&s), Err(BoltError::Decode(_))));
    }

    #[test]
    fn test_debug_hides_credentials() {
        let rendered = format!("{:?}", AuthToken::basic("neo4j", "hunter2"));
        assert!(rendered.contains("neo4j"));
        assert!(!rendered.contains("hunter2"));
    }
}
