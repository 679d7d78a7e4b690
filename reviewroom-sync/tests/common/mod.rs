//! In-memory fake transports for exercising the sync engine.
#![allow(dead_code)]

use async_trait::async_trait;
use reviewroom_api::types::{MarkSubmission, ReviewsQuery};
use reviewroom_api::ClientMessage;
use reviewroom_core::{ReviewSnapshot, SyncError};
use reviewroom_sync::transport::{PushConnection, PushTransport, RestTransport, TransportEvent};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Server side of one scripted push connection.
pub struct ServerEnd {
    pub from_client: mpsc::Receiver<ClientMessage>,
    pub to_client: mpsc::Sender<TransportEvent>,
}

impl ServerEnd {
    /// Drain everything the client has sent so far.
    pub fn drain_client_messages(&mut self) -> Vec<ClientMessage> {
        let mut messages = Vec::new();
        while let Ok(message) = self.from_client.try_recv() {
            messages.push(message);
        }
        messages
    }
}

fn connection_pair() -> (PushConnection, ServerEnd) {
    let (outbound_tx, outbound_rx) = mpsc::channel(64);
    let (inbound_tx, inbound_rx) = mpsc::channel(64);
    (
        PushConnection {
            outbound: outbound_tx,
            inbound: inbound_rx,
        },
        ServerEnd {
            from_client: outbound_rx,
            to_client: inbound_tx,
        },
    )
}

/// Scripted push transport. Each `connect` pops the next outcome; once
/// the script runs dry, connects hang forever (the session stays in
/// `connecting` without burning reconnect attempts).
#[derive(Default)]
pub struct FakePushTransport {
    outcomes: Mutex<VecDeque<Result<PushConnection, SyncError>>>,
}

impl FakePushTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script_failure(&self, reason: &str) {
        self.outcomes
            .lock()
            .unwrap()
            .push_back(Err(SyncError::Connection {
                reason: reason.to_string(),
            }));
    }

    /// Script a successful connection and return its server end.
    pub fn script_connection(&self) -> ServerEnd {
        let (connection, server) = connection_pair();
        self.outcomes.lock().unwrap().push_back(Ok(connection));
        server
    }
}

#[async_trait]
impl PushTransport for FakePushTransport {
    async fn connect(&self) -> Result<PushConnection, SyncError> {
        let outcome = { self.outcomes.lock().unwrap().pop_front() };
        match outcome {
            Some(outcome) => outcome,
            None => std::future::pending().await,
        }
    }
}

/// One scripted REST response.
pub enum RestScript {
    Reply(ReviewSnapshot),
    Fail(SyncError),
    /// Never resolves; the pull timeout wins the race.
    Hang,
    /// Resolves with the snapshot once the gate fires.
    Gated(oneshot::Receiver<()>, ReviewSnapshot),
}

/// Scripted REST transport that records every query and submission.
#[derive(Default)]
pub struct FakeRestTransport {
    responses: Mutex<VecDeque<RestScript>>,
    queries: Mutex<Vec<ReviewsQuery>>,
    submissions: Mutex<Vec<MarkSubmission>>,
    submit_outcomes: Mutex<VecDeque<Result<(), SyncError>>>,
}

impl FakeRestTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, script: RestScript) {
        self.responses.lock().unwrap().push_back(script);
    }

    /// Script a gated reply; the returned sender releases it.
    pub fn script_gated(&self, snapshot: ReviewSnapshot) -> oneshot::Sender<()> {
        let (gate_tx, gate_rx) = oneshot::channel();
        self.script(RestScript::Gated(gate_rx, snapshot));
        gate_tx
    }

    pub fn script_submit(&self, outcome: Result<(), SyncError>) {
        self.submit_outcomes.lock().unwrap().push_back(outcome);
    }

    pub fn query_count(&self) -> usize {
        self.queries.lock().unwrap().len()
    }

    pub fn submissions(&self) -> Vec<MarkSubmission> {
        self.submissions.lock().unwrap().clone()
    }
}

#[async_trait]
impl RestTransport for FakeRestTransport {
    async fn fetch_reviews(&self, query: &ReviewsQuery) -> Result<ReviewSnapshot, SyncError> {
        self.queries.lock().unwrap().push(query.clone());
        let script = { self.responses.lock().unwrap().pop_front() };
        match script {
            Some(RestScript::Reply(snapshot)) => Ok(snapshot),
            Some(RestScript::Fail(err)) => Err(err),
            Some(RestScript::Hang) => std::future::pending().await,
            Some(RestScript::Gated(gate, snapshot)) => {
                let _ = gate.await;
                Ok(snapshot)
            }
            None => Err(SyncError::RequestFailed {
                reason: "no scripted response".to_string(),
            }),
        }
    }

    async fn submit_marks(&self, submission: &MarkSubmission) -> Result<(), SyncError> {
        self.submissions.lock().unwrap().push(submission.clone());
        let outcome = { self.submit_outcomes.lock().unwrap().pop_front() };
        outcome.unwrap_or(Ok(()))
    }
}

/// Let spawned tasks and auto-advanced timers settle.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

/// A snapshot distinguishable by a marker in its statistics payload.
pub fn marked_snapshot(marker: &str) -> ReviewSnapshot {
    ReviewSnapshot {
        statistics: Some(serde_json::json!({ "marker": marker })),
        ..ReviewSnapshot::default()
    }
}
