//! Bolt messages: requests the client sends and responses the server returns.
//!
//! Both are PackStream structures whose tag identifies the message.

pub mod metadata;
pub mod request;
pub mod response;

pub use metadata::{InputPosition, Notification, NotificationSeverity, QueryStats};
pub use request::{AccessMode, AuthToken, BeginMessage, BoltRequest, InitMessage, RunMessage};
pub use response::{BoltResponse, FailureMessage, RecordMessage, SuccessMessage};

/// Message tags.
pub mod tag {
    /// INIT in v1/v2, HELLO from v3
    pub const INIT: u8 = 0x01;
    pub const GOODBYE: u8 = 0x02;
    pub const ACK_FAILURE: u8 = 0x0E;
    pub const RESET: u8 = 0x0F;
    pub const RUN: u8 = 0x10;
    pub const BEGIN: u8 = 0x11;
    pub const COMMIT: u8 = 0x12;
    pub const ROLLBACK: u8 = 0x13;
    /// DISCARD_ALL, or DISCARD with `{n}` from v4
    pub const DISCARD_ALL: u8 = 0x2F;
    /// PULL_ALL, or PULL with `{n}` from v4
    pub const PULL_ALL: u8 = 0x3F;

    pub const SUCCESS: u8 = 0x70;
    pub const RECORD: u8 = 0x71;
    pub const IGNORED: u8 = 0x7E;
    pub const FAILURE: u8 = 0x7F;
}
