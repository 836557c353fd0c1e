//! In-memory service used by unit tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{
    ApiError, ApiResult, ConnectionCandidate, ConnectionList, ConnectionUpdate, ConnectionsApi,
    NewConnection, SaveReceipt,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Search {
        query: String,
        exclude: Option<String>,
    },
    Add(NewConnection),
    Update {
        id: String,
        update: ConnectionUpdate,
    },
    List(String),
    Delete(String),
}

/// Records every call and answers from canned data.
#[derive(Default)]
pub struct FakeApi {
    calls: Mutex<Vec<Call>>,
    users: Vec<ConnectionCandidate>,
    search_delays: HashMap<String, Duration>,
    search_error: Option<ApiError>,
    search_failures: HashMap<String, ApiError>,
    write_error: Option<ApiError>,
    write_delay: Option<Duration>,
    connections: ConnectionList,
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_users(mut self, users: Vec<ConnectionCandidate>) -> Self {
        self.users = users;
        self
    }

    /// Delay the answer for one specific query
    pub fn with_search_delay(mut self, query: &str, delay: Duration) -> Self {
        self.search_delays.insert(query.to_string(), delay);
        self
    }

    pub fn with_search_error(mut self, error: ApiError) -> Self {
        self.search_error = Some(error);
        self
    }

    /// Fail only the lookup for `query`
    pub fn with_search_failure(mut self, query: &str, error: ApiError) -> Self {
        self.search_failures.insert(query.to_string(), error);
        self
    }

    pub fn with_write_error(mut self, error: ApiError) -> Self {
        self.write_error = Some(error);
        self
    }

    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = Some(delay);
        self
    }

    pub fn with_connections(mut self, connections: ConnectionList) -> Self {
        self.connections = connections;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn search_queries(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Search { query, .. } => Some(query),
                _ => None,
            })
            .collect()
    }

    pub fn write_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, Call::Add(_) | Call::Update { .. } | Call::Delete(_)))
            .count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    async fn write_result(&self, id: &str) -> ApiResult<SaveReceipt> {
        if let Some(delay) = self.write_delay {
            tokio::time::sleep(delay).await;
        }
        match &self.write_error {
            Some(error) => Err(error.clone()),
            None => Ok(SaveReceipt {
                id: Some(id.to_string()),
                message: "ok".to_string(),
            }),
        }
    }
}

/// Candidate with the given status
pub fn candidate(id: &str, name: &str, status: super::ConnectionStatus) -> ConnectionCandidate {
    ConnectionCandidate {
        id: id.to_string(),
        name: name.to_string(),
        email: Some(format!("{}@example.com", id)),
        status,
    }
}

#[async_trait]
impl ConnectionsApi for FakeApi {
    async fn search_users(
        &self,
        query: &str,
        exclude_user_id: Option<&str>,
    ) -> ApiResult<Vec<ConnectionCandidate>> {
        self.record(Call::Search {
            query: query.to_string(),
            exclude: exclude_user_id.map(str::to_string),
        });
        if let Some(delay) = self.search_delays.get(query) {
            tokio::time::sleep(*delay).await;
        }
        if let Some(error) = self.search_failures.get(query).or(self.search_error.as_ref()) {
            return Err(error.clone());
        }
        let needle = query.to_lowercase();
        Ok(self
            .users
            .iter()
            .filter(|user| Some(user.id.as_str()) != exclude_user_id)
            .filter(|user| user.name.to_lowercase().contains(&needle))
            .cloned()
            .collect())
    }

    async fn add_connection(&self, payload: NewConnection) -> ApiResult<SaveReceipt> {
        self.record(Call::Add(payload));
        self.write_result("new").await
    }

    async fn update_connection(
        &self,
        contact_id: &str,
        update: ConnectionUpdate,
    ) -> ApiResult<SaveReceipt> {
        self.record(Call::Update {
            id: contact_id.to_string(),
            update,
        });
        self.write_result(contact_id).await
    }

    async fn list_connections(&self, user_id: &str) -> ApiResult<ConnectionList> {
        self.record(Call::List(user_id.to_string()));
        Ok(self.connections.clone())
    }

    async fn delete_connection(&self, connection_id: &str) -> ApiResult<SaveReceipt> {
        self.record(Call::Delete(connection_id.to_string()));
        self.write_result(connection_id).await
    }
}
