//! Lazily pulled results.

use std::sync::Arc;

use futures::Stream;

use super::channel::Connector;
use super::error::{DriverError, DriverResult};
use super::failure::ServerFailure;
use super::record::{QueryResult, Record};
use super::session::Session;
use super::statement::Statement;
use super::summary::ResultSummary;
use super::types::Value;
use crate::bolt::message::{BoltResponse, SuccessMessage};

/// How the result ended.
#[derive(Debug)]
enum StreamEnd {
    Summary(ResultSummary),
    Failed(ServerFailure),
    Ignored,
}

/// Records of one RUN, read from the channel as they are asked for.
///
/// The stream borrows its session. Dropping it early is allowed; the
/// session discards the rest before its next request.
pub struct ResultStream<'s, C: Connector> {
    session: &'s mut Session<C>,
    statement: Statement,
    keys: Arc<[String]>,
    run: SuccessMessage,
    end: Option<StreamEnd>,
}

impl<'s, C: Connector> ResultStream<'s, C> {
    pub(crate) fn new(session: &'s mut Session<C>, statement: Statement, run: SuccessMessage) -> Self {
        let keys = run.fields().into_iter().collect();
        Self {
            session,
            statement,
            keys,
            run,
            end: None,
        }
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn statement(&self) -> &Statement {
        &self.statement
    }

    /// Available once the last record has been read.
    pub fn summary(&self) -> Option<&ResultSummary> {
        match &self.end {
            Some(StreamEnd::Summary(summary)) => Some(summary),
            _ => None,
        }
    }

    /// The next record, or `None` once the server sent its summary.
    ///
    /// A server failure is returned again on every later call.
    pub async fn next(&mut self) -> DriverResult<Option<Record>> {
        match &self.end {
            Some(StreamEnd::Summary(_)) => return Ok(None),
            Some(StreamEnd::Failed(failure)) => return Err(DriverError::Statement(failure.clone())),
            Some(StreamEnd::Ignored) => return Err(ignored()),
            None => {}
        }

        let channel = self.session.channel_mut()?;
        let response = match channel.receive().await {
            Ok(response) => response,
            Err(e) => return Err(self.session.transport_failed(e)),
        };
        match response {
            BoltResponse::Record(record) => {
                let values = record
                    .fields
                    .into_iter()
                    .map(Value::try_from)
                    .collect::<DriverResult<Vec<_>>>()?;
                Record::new(Arc::clone(&self.keys), values).map(Some)
            }
            BoltResponse::Success(pull) => {
                let server = self.session.server_agent().map(str::to_string);
                let summary = ResultSummary::new(self.statement.clone(), &self.run, &pull, server);
                self.session.finish_stream(summary.bookmark.clone());
                self.end = Some(StreamEnd::Summary(summary));
                Ok(None)
            }
            BoltResponse::Failure(failure) => {
                let failure = ServerFailure::from(failure);
                self.session.mark_failed();
                self.end = Some(StreamEnd::Failed(failure.clone()));
                Err(DriverError::Statement(failure))
            }
            BoltResponse::Ignored => {
                self.session.mark_failed();
                self.end = Some(StreamEnd::Ignored);
                Err(ignored())
            }
        }
    }

    /// Skip the remaining records and return the summary.
    pub async fn consume(mut self) -> DriverResult<ResultSummary> {
        while self.next().await?.is_some() {}
        match self.end.take() {
            Some(StreamEnd::Summary(summary)) => Ok(summary),
            _ => Err(DriverError::invalid_state("Result ended without a summary")),
        }
    }

    pub async fn collect(mut self) -> DriverResult<Vec<Record>> {
        let mut records = Vec::new();
        while let Some(record) = self.next().await? {
            records.push(record);
        }
        Ok(records)
    }

    /// Buffer every record together with the summary.
    pub async fn into_result(mut self) -> DriverResult<QueryResult> {
        let mut records = Vec::new();
        while let Some(record) = self.next().await? {
            records.push(record);
        }
        let keys = self.keys.to_vec();
        match self.end.take() {
            Some(StreamEnd::Summary(summary)) => Ok(QueryResult {
                keys,
                records,
                summary,
            }),
            _ => Err(DriverError::invalid_state("Result ended without a summary")),
        }
    }

    /// The only record; zero or several is an error.
    pub async fn single(self) -> DriverResult<Record> {
        let mut records = self.collect().await?;
        match records.len() {
            1 => Ok(records.remove(0)),
            n => Err(DriverError::invalid_state(format!(
                "Expected exactly one record, got {}",
                n
            ))),
        }
    }

    /// Adapt into a [`Stream`]. It ends after the first error.
    pub fn into_stream(self) -> impl Stream<Item = DriverResult<Record>> + 's {
        futures::stream::unfold(Some(self), |state| async move {
            let mut stream = state?;
            match stream.next().await {
                Ok(Some(record)) => Some((Ok(record), Some(stream))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        })
    }
}

fn ignored() -> DriverError {
    DriverError::Ignored("PULL_ALL skipped after an earlier failure".to_string())
}

impl<C: Connector> std::fmt::Debug for ResultStream<'_, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultStream")
            .field("statement", &self.statement.text)
            .field("keys", &self.keys)
            .field("finished", &self.end.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::bolt::handshake::BoltVersion;
    use crate::bolt::message::{BoltRequest, BoltResponse, SuccessMessage};
    use crate::bolt::packstream::{PackStreamStructure, PackStreamValue};
    use crate::driver::error::DriverError;
    use crate::driver::session::SessionState;
    use crate::driver::test_support::*;
    use crate::driver::types::Value;
    use std::collections::HashMap;
    use tokio_stream::StreamExt;

    fn node(id: i64, name: &str) -> PackStreamValue {
        let mut props = HashMap::new();
        props.insert("name".to_string(), PackStreamValue::from(name));
        PackStreamValue::Structure(PackStreamStructure::new(
            0x4E,
            vec![
                PackStreamValue::Integer(id),
                PackStreamValue::List(vec![PackStreamValue::from("Person")]),
                PackStreamValue::Map(props),
            ],
        ))
    }

    fn people(request: &BoltRequest) -> Reply {
        match request {
            BoltRequest::Run(_) => Reply::Send(vec![fields(&["p"])]),
            BoltRequest::PullAll => Reply::Send(vec![
                record(vec![node(1, "Alice")]),
                record(vec![node(2, "Bob")]),
                BoltResponse::Success(SuccessMessage::new().with("type", "r")),
            ]),
            other => baseline(other).unwrap_or(Reply::Send(vec![success()])),
        }
    }

    #[tokio::test]
    async fn test_records_carry_graph_values() {
        let (mut session, _server) = connected(BoltVersion::V4_4, people).await;
        let result = session
            .run("MATCH (p:Person) RETURN p")
            .await
            .unwrap()
            .into_result()
            .await
            .unwrap();
        assert_eq!(result.keys, vec!["p".to_string()]);
        let names: Vec<_> = result
            .records
            .iter()
            .map(|r| r.get_node("p").unwrap().get("name").cloned())
            .collect();
        assert_eq!(
            names,
            vec![Some(Value::from("Alice")), Some(Value::from("Bob"))]
        );
        assert!(result.records[0].get_node("p").unwrap().has_label("Person"));
        assert!(matches!(result.single(), Err(DriverError::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_into_stream() {
        let (mut session, _server) = connected(BoltVersion::V4_4, people).await;
        let stream = session.run("MATCH (p:Person) RETURN p").await.unwrap().into_stream();
        let records: Vec<_> = stream.collect().await;
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(Result::is_ok));
        assert_eq!(session.state(), SessionState::Ready);
    }

    #[tokio::test]
    async fn test_failure_mid_stream_is_sticky() {
        let (mut session, _server) = connected(BoltVersion::V4_4, |request| match request {
            BoltRequest::PullAll => Reply::Send(vec![
                record(vec![PackStreamValue::Integer(1)]),
                failure("Neo.ClientError.Statement.ArithmeticError", "/ by zero"),
            ]),
            BoltRequest::Run(_) => Reply::Send(vec![fields(&["x"])]),
            other => baseline(other).unwrap_or(Reply::Send(vec![success()])),
        })
        .await;

        let mut stream = session.run("UNWIND [1, 0] AS d RETURN 1 / d AS x").await.unwrap();
        assert!(stream.next().await.unwrap().is_some());
        for _ in 0..2 {
            let err = stream.next().await.unwrap_err();
            assert_eq!(err.status_code(), Some("Neo.ClientError.Statement.ArithmeticError"));
        }
        assert!(stream.summary().is_none());
        drop(stream);
        assert_eq!(session.state(), SessionState::Failed);
    }

    #[tokio::test]
    async fn test_single() {
        let (mut session, _server) = connected(BoltVersion::V3, |request| match request {
            BoltRequest::Run(_) => Reply::Send(vec![fields(&["n"])]),
            BoltRequest::PullAll => Reply::Send(vec![
                record(vec![PackStreamValue::Integer(7)]),
                BoltResponse::Success(SuccessMessage::new()),
            ]),
            other => baseline(other).unwrap_or(Reply::Send(vec![success()])),
        })
        .await;
        let record = session.run("RETURN 7 AS n").await.unwrap().single().await.unwrap();
        assert_eq!(record.get_int("n").unwrap(), 7);
    }

    #[tokio::test]
    async fn test_hang_up_mid_stream() {
        let (mut session, _server) = connected(BoltVersion::V4_4, |request| match request {
            BoltRequest::Run(_) => Reply::Send(vec![fields(&["x"])]),
            BoltRequest::PullAll => Reply::HangUp,
            other => baseline(other).unwrap_or(Reply::Send(vec![success()])),
        })
        .await;

        let mut stream = session.run("RETURN 1 AS x").await.unwrap();
        assert!(matches!(stream.next().await, Err(DriverError::Io(_))));
        assert!(matches!(stream.next().await, Err(DriverError::ChannelClosed)));
        drop(stream);
        assert_eq!(session.state(), SessionState::Failed);
    }
}
