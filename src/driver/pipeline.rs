//! Pipelined execution: many statements in one write.
//!
//! Every RUN + PULL_ALL pair is queued and flushed together, then the
//! replies are read back in order. After the first failure the server
//! IGNOREs the rest, so a collection looks like
//! `[Completed, .., Failed, Ignored, ..]`.

use std::sync::Arc;

use tracing::debug;

use super::channel::Connector;
use super::error::{DriverError, DriverResult};
use super::failure::ServerFailure;
use super::record::{QueryResult, Record};
use super::session::Session;
use super::statement::{Statement, StatementInput};
use super::summary::ResultSummary;
use super::types::Value;
use crate::bolt::error::{BoltError, BoltResult};
use crate::bolt::message::{BoltRequest, BoltResponse};

// ============================================================================
// Results
// ============================================================================

#[derive(Debug, Clone)]
pub enum StatementOutcome {
    Completed(QueryResult),
    Failed(ServerFailure),
    /// Skipped by the server after an earlier failure
    Ignored,
}

#[derive(Debug, Clone)]
pub struct StatementResult {
    pub statement: Statement,
    pub outcome: StatementOutcome,
}

impl StatementResult {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, StatementOutcome::Completed(_))
    }

    pub fn result(&self) -> Option<&QueryResult> {
        match &self.outcome {
            StatementOutcome::Completed(result) => Some(result),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&ServerFailure> {
        match &self.outcome {
            StatementOutcome::Failed(failure) => Some(failure),
            _ => None,
        }
    }
}

/// One result per statement, in the order the statements were pushed.
#[derive(Debug, Clone, Default)]
pub struct ResultCollection {
    results: Vec<StatementResult>,
}

impl ResultCollection {
    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&StatementResult> {
        self.results.get(index)
    }

    /// First result whose statement carries `tag`.
    pub fn by_tag(&self, tag: &str) -> Option<&StatementResult> {
        self.results
            .iter()
            .find(|r| r.statement.tag.as_deref() == Some(tag))
    }

    pub fn first_failure(&self) -> Option<&ServerFailure> {
        self.results.iter().find_map(StatementResult::failure)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, StatementResult> {
        self.results.iter()
    }

    /// All results, or the first failure as an error.
    pub fn into_result(self) -> DriverResult<Vec<QueryResult>> {
        self.results
            .into_iter()
            .map(|r| match r.outcome {
                StatementOutcome::Completed(result) => Ok(result),
                StatementOutcome::Failed(failure) => Err(DriverError::Statement(failure)),
                StatementOutcome::Ignored => Err(DriverError::Ignored(format!(
                    "'{}' skipped after an earlier failure",
                    r.statement.text
                ))),
            })
            .collect()
    }
}

impl IntoIterator for ResultCollection {
    type Item = StatementResult;
    type IntoIter = std::vec::IntoIter<StatementResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.into_iter()
    }
}

impl<'a> IntoIterator for &'a ResultCollection {
    type Item = &'a StatementResult;
    type IntoIter = std::slice::Iter<'a, StatementResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.iter()
    }
}

// ============================================================================
// Pipeline
// ============================================================================

pub struct Pipeline<'s, C: Connector> {
    session: &'s mut Session<C>,
    statements: Vec<Statement>,
}

impl<'s, C: Connector> Pipeline<'s, C> {
    pub(crate) fn new(session: &'s mut Session<C>) -> Self {
        Self {
            session,
            statements: Vec::new(),
        }
    }

    pub fn push(mut self, statement: impl Into<Statement>) -> Self {
        self.statements.push(statement.into());
        self
    }

    /// Push one statement or a whole stack.
    pub fn push_input(mut self, input: StatementInput) -> Self {
        self.statements.extend(input.into_statements());
        self
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Send everything in one flush and read every result.
    ///
    /// A statement failing does not make this return `Err`; it shows up in
    /// the collection and leaves the session Failed. `Err` means nothing
    /// could be sent or the transport broke.
    pub async fn run(self) -> DriverResult<ResultCollection> {
        let Pipeline { session, statements } = self;
        if statements.is_empty() {
            return Ok(ResultCollection::default());
        }
        if statements.iter().any(Statement::is_empty) {
            return Err(DriverError::invalid_argument("Expected only non-empty statements"));
        }
        session.settle().await?;
        session.ensure_runnable("run a pipeline")?;

        let mut requests = Vec::with_capacity(statements.len() * 2);
        for statement in &statements {
            requests.push(session.run_request(statement)?);
            requests.push(BoltRequest::PullAll);
        }
        session.channel_mut()?.queue_all(&requests)?;
        session.mark_streaming();
        debug!(statements = statements.len(), "pipeline sent");

        let server = session.server_agent().map(str::to_string);
        let channel = session.channel_mut()?;
        let read = async {
            channel.flush().await?;
            let mut results = Vec::with_capacity(statements.len());
            let mut malformed = None;
            for statement in statements {
                let outcome = read_outcome(channel, &statement, server.as_deref(), &mut malformed).await?;
                results.push(StatementResult { statement, outcome });
            }
            Ok::<_, BoltError>((results, malformed))
        }
        .await;

        let (results, malformed) = match read {
            Ok(read) => read,
            Err(e @ BoltError::Decode(_)) => return Err(session.protocol_violation(e.to_string())),
            Err(e) => return Err(session.transport_failed(e)),
        };
        if results.iter().all(StatementResult::is_success) {
            let bookmark = results
                .iter()
                .rev()
                .find_map(|r| r.result().and_then(|q| q.summary.bookmark.clone()));
            session.finish_stream(bookmark);
        } else {
            session.mark_failed();
        }
        match malformed {
            Some(err) => Err(err),
            None => Ok(ResultCollection { results }),
        }
    }
}

/// Read the RUN and PULL_ALL replies of one statement.
///
/// A record that cannot be converted is kept in `malformed` and reading
/// goes on, so the channel stays in step with the server.
async fn read_outcome<S>(
    channel: &mut super::channel::Channel<S>,
    statement: &Statement,
    server: Option<&str>,
    malformed: &mut Option<DriverError>,
) -> BoltResult<StatementOutcome>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send,
{
    let run = match channel.receive().await? {
        BoltResponse::Success(run) => run,
        BoltResponse::Record(_) => {
            return Err(BoltError::Decode("RECORD received before the RUN reply".to_string()))
        }
        other => {
            // the PULL_ALL reply is IGNORED once RUN did not succeed
            channel.receive().await?;
            return Ok(match other {
                BoltResponse::Failure(f) => StatementOutcome::Failed(ServerFailure::from(f)),
                _ => StatementOutcome::Ignored,
            });
        }
    };

    let keys: Arc<[String]> = run.fields().into_iter().collect();
    let mut records = Vec::new();
    loop {
        match channel.receive().await? {
            BoltResponse::Record(record) => {
                let converted = record
                    .fields
                    .into_iter()
                    .map(Value::try_from)
                    .collect::<DriverResult<Vec<_>>>()
                    .and_then(|values| Record::new(Arc::clone(&keys), values));
                match converted {
                    Ok(record) => records.push(record),
                    Err(e) => {
                        malformed.get_or_insert(e);
                    }
                }
            }
            BoltResponse::Success(pull) => {
                let summary =
                    ResultSummary::new(statement.clone(), &run, &pull, server.map(str::to_string));
                return Ok(StatementOutcome::Completed(QueryResult {
                    keys: keys.to_vec(),
                    records,
                    summary,
                }));
            }
            BoltResponse::Failure(f) => return Ok(StatementOutcome::Failed(ServerFailure::from(f))),
            BoltResponse::Ignored => return Ok(StatementOutcome::Ignored),
        }
    }
}

impl<C: Connector> std::fmt::Debug for Pipeline<'_, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("statements", &self.statements.len())
            .field("session", &self.session.state())
            .finish()
    }
}
