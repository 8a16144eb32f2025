//! Typed views over SUCCESS metadata.

use std::collections::HashMap;

use crate::bolt::packstream::PackStreamValue;

macro_rules! query_stats {
    ($($field:ident => $key:literal),* $(,)?) => {
        /// Update counters reported in the `stats` map of a terminal SUCCESS.
        ///
        /// Absent keys count as zero.
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
        pub struct QueryStats {
            $(pub $field: i64,)*
            pub contains_system_updates: bool,
        }

        impl QueryStats {
            pub fn from_map(map: &HashMap<String, PackStreamValue>) -> Self {
                Self {
                    $($field: map.get($key).and_then(PackStreamValue::as_int).unwrap_or(0),)*
                    contains_system_updates: map
                        .get("contains-system-updates")
                        .and_then(PackStreamValue::as_bool)
                        .unwrap_or(false),
                }
            }

            /// Only non-zero counters are written.
            pub fn to_map(&self) -> HashMap<String, PackStreamValue> {
                let mut map = HashMap::new();
                $(
                    if self.$field != 0 {
                        map.insert($key.to_string(), PackStreamValue::Integer(self.$field));
                    }
                )*
                if self.contains_system_updates {
                    map.insert("contains-system-updates".to_string(), PackStreamValue::Boolean(true));
                }
                map
            }

            /// Whether the statement changed data or schema.
            pub fn contains_updates(&self) -> bool {
                $(self.$field > 0 ||)* false
            }
        }
    };
}

query_stats! {
    nodes_created => "nodes-created",
    nodes_deleted => "nodes-deleted",
    relationships_created => "relationships-created",
    relationships_deleted => "relationships-deleted",
    properties_set => "properties-set",
    labels_added => "labels-added",
    labels_removed => "labels-removed",
    indexes_added => "indexes-added",
    indexes_removed => "indexes-removed",
    constraints_added => "constraints-added",
    constraints_removed => "constraints-removed",
    system_updates => "system-updates",
}

/// A server notification attached to a result (deprecations, hints, warnings).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub code: String,
    pub title: String,
    pub description: String,
    pub severity: NotificationSeverity,
    pub position: Option<InputPosition>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationSeverity {
    Warning,
    Information,
    Unknown,
}

impl NotificationSeverity {
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "WARNING" => NotificationSeverity::Warning,
            "INFORMATION" => NotificationSeverity::Information,
            _ => NotificationSeverity::Unknown,
        }
    }
}

/// Where in the statement text a notification points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputPosition {
    pub offset: i64,
    pub line: i64,
    pub column: i64,
}

impl Notification {
    /// Parse one entry of the `notifications` list; entries without a code are dropped.
    pub fn from_map(map: &HashMap<String, PackStreamValue>) -> Option<Self> {
        let text = |key: &str| {
            map.get(key)
                .and_then(PackStreamValue::as_str)
                .map(str::to_string)
        };
        let position = map.get("position").and_then(PackStreamValue::as_map).and_then(|pos| {
            Some(InputPosition {
                offset: pos.get("offset").and_then(PackStreamValue::as_int).unwrap_or(0),
                line: pos.get("line").and_then(PackStreamValue::as_int)?,
                column: pos.get("column").and_then(PackStreamValue::as_int)?,
            })
        });
        Some(Self {
            code: text("code")?,
            title: text("title").unwrap_or_default(),
            description: text("description").unwrap_or_default(),
            severity: text("severity")
                .map(|s| NotificationSeverity::parse(&s))
                .unwrap_or(NotificationSeverity::Unknown),
            position,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_default_to_zero() {
        let stats = QueryStats::from_map(&HashMap::new());
        assert_eq!(stats, QueryStats::default());
        assert!(!stats.contains_updates());
    }

    #[test]
    fn test_stats_read_hyphenated_keys() {
        let mut map = HashMap::new();
        map.insert("nodes-created".to_string(), PackStreamValue::Integer(2));
        map.insert("properties-set".to_string(), PackStreamValue::Integer(4));
        let stats = QueryStats::from_map(&map);
        assert_eq!(stats.nodes_created, 2);
        assert_eq!(stats.properties_set, 4);
        assert!(stats.contains_updates());
        assert_eq!(QueryStats::from_map(&stats.to_map()), stats);
    }

    #[test]
    fn test_notification_with_position() {
        let mut pos = HashMap::new();
        pos.insert("line".to_string(), PackStreamValue::Integer(1));
        pos.insert("column".to_string(), PackStreamValue::Integer(9));
        let mut map = HashMap::new();
        map.insert(
            "code".to_string(),
            PackStreamValue::from("Neo.ClientNotification.Statement.CartesianProduct"),
        );
        map.insert("severity".to_string(), PackStreamValue::from("warning"));
        map.insert("position".to_string(), PackStreamValue::Map(pos));

        let n = Notification::from_map(&map).unwrap();
        assert_eq!(n.severity, NotificationSeverity::Warning);
        assert_eq!(n.position, Some(InputPosition { offset: 0, line: 1, column: 9 }));
        assert!(n.title.is_empty());
    }

    #[test]
    fn test_notification_requires_code() {
        assert!(Notification::from_map(&HashMap::new()).is_none());
    }
}
