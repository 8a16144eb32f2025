//! Result summaries built from the RUN and PULL_ALL replies.

use std::time::Duration;

use super::statement::Statement;
use crate::bolt::message::{Notification, QueryStats, SuccessMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    ReadOnly,
    ReadWrite,
    WriteOnly,
    SchemaWrite,
}

impl QueryType {
    /// Parse the `type` field: `r`, `rw`, `w` or `s`.
    pub fn parse(code: &str) -> Option<Self> {
        match code {
            "r" => Some(QueryType::ReadOnly),
            "rw" => Some(QueryType::ReadWrite),
            "w" => Some(QueryType::WriteOnly),
            "s" => Some(QueryType::SchemaWrite),
            _ => None,
        }
    }
}

/// What the server reported about one statement once its records were consumed.
#[derive(Debug, Clone)]
pub struct ResultSummary {
    pub statement: Statement,
    pub query_type: Option<QueryType>,
    pub counters: QueryStats,
    pub result_available_after: Option<Duration>,
    pub result_consumed_after: Option<Duration>,
    pub database: Option<String>,
    pub server: Option<String>,
    /// Set when an auto-commit statement committed
    pub bookmark: Option<String>,
    pub notifications: Vec<Notification>,
}

fn millis(value: Option<i64>) -> Option<Duration> {
    value.and_then(|ms| u64::try_from(ms).ok()).map(Duration::from_millis)
}

impl ResultSummary {
    /// Combine the RUN reply (timing to first record) with the PULL_ALL
    /// reply (everything else). Fields missing from one are looked up in the other.
    pub fn new(
        statement: Statement,
        run: &SuccessMessage,
        pull: &SuccessMessage,
        server: Option<String>,
    ) -> Self {
        let text = |f: fn(&SuccessMessage) -> Option<&str>| {
            f(pull).or_else(|| f(run)).map(str::to_string)
        };
        Self {
            statement,
            query_type: pull.query_type().or_else(|| run.query_type()).and_then(QueryType::parse),
            counters: pull.stats(),
            result_available_after: millis(run.t_first()),
            result_consumed_after: millis(pull.t_last()),
            database: text(SuccessMessage::db),
            server: server.or_else(|| text(SuccessMessage::server)),
            bookmark: pull.bookmark().map(str::to_string),
            notifications: pull.notifications(),
        }
    }

    /// The statement's tag, if the caller gave it one.
    pub fn tag(&self) -> Option<&str> {
        self.statement.tag.as_deref()
    }

    pub fn contains_updates(&self) -> bool {
        self.counters.contains_updates()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bolt::packstream::PackStreamValue;
    use std::collections::HashMap;

    #[test]
    fn test_summary_from_replies() {
        let run = SuccessMessage::new()
            .with("fields", vec![PackStreamValue::from("x")])
            .with("t_first", 3i64);
        let mut stats = HashMap::new();
        stats.insert("nodes-created".to_string(), PackStreamValue::Integer(2));
        let pull = SuccessMessage::new()
            .with("type", "rw")
            .with("t_last", 7i64)
            .with("db", "neo4j")
            .with("bookmark", "bm:42")
            .with("stats", stats);

        let summary = ResultSummary::new(
            Statement::new("CREATE (a), (b)").with_tag("create"),
            &run,
            &pull,
            Some("Neo4j/4.4.0".to_string()),
        );
        assert_eq!(summary.query_type, Some(QueryType::ReadWrite));
        assert_eq!(summary.counters.nodes_created, 2);
        assert!(summary.contains_updates());
        assert_eq!(summary.result_available_after, Some(Duration::from_millis(3)));
        assert_eq!(summary.result_consumed_after, Some(Duration::from_millis(7)));
        assert_eq!(summary.database.as_deref(), Some("neo4j"));
        assert_eq!(summary.bookmark.as_deref(), Some("bm:42"));
        assert_eq!(summary.tag(), Some("create"));
    }

    #[test]
    fn test_v1_timing_names_and_empty_stats() {
        let run = SuccessMessage::new().with("result_available_after", 1i64);
        let pull = SuccessMessage::new()
            .with("type", "r")
            .with("result_consumed_after", 2i64);
        let summary = ResultSummary::new(Statement::new("RETURN 1"), &run, &pull, None);
        assert_eq!(summary.query_type, Some(QueryType::ReadOnly));
        assert_eq!(summary.result_available_after, Some(Duration::from_millis(1)));
        assert!(!summary.contains_updates());
        assert_eq!(summary.counters, QueryStats::default());
    }
}
