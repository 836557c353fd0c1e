//! REST client for the connections service.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::{
    ApiError, ApiResult, ConnectionCandidate, ConnectionList, ConnectionUpdate, ConnectionsApi,
    NewConnection, SaveReceipt,
};
use crate::config::ApiConfig;

/// HTTP implementation of the connections service
pub struct HttpApi {
    client: Client,
    base_url: String,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    users: Vec<ConnectionCandidate>,
}

/// Write acknowledgement as sent by the service
#[derive(Debug, Deserialize)]
struct WriteResponse {
    #[serde(default = "default_success")]
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    connection_id: Option<String>,
    #[serde(default)]
    contact_id: Option<String>,
    #[serde(default)]
    request_id: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

fn default_success() -> bool {
    true
}

#[derive(Debug, Serialize)]
struct LinkedBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    connected_user_id: Option<&'a str>,
    relationship: &'a str,
}

#[derive(Debug, Serialize)]
struct ExternalBody<'a> {
    name: &'a str,
    phone: &'a str,
    address: Option<&'a str>,
    relationship: &'a str,
}

impl HttpApi {
    pub fn new(config: &ApiConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let builder = self.client.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> ApiResult<T> {
        let response = builder.send().await.map_err(transport_error)?;
        decode(response).await
    }

    async fn write(&self, builder: RequestBuilder) -> ApiResult<SaveReceipt> {
        let body: WriteResponse = self.send(builder).await?;
        if !body.success {
            return Err(ApiError::Rejected(
                body.error.or(body.message).unwrap_or_default(),
            ));
        }
        Ok(SaveReceipt {
            id: body.connection_id.or(body.contact_id).or(body.request_id),
            message: body.message.unwrap_or_default(),
        })
    }
}

fn transport_error(err: reqwest::Error) -> ApiError {
    if err.is_decode() {
        ApiError::Decode(err.to_string())
    } else {
        ApiError::Network(err.to_string())
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> ApiResult<T> {
    let status = response.status();
    let text = response.text().await.map_err(transport_error)?;

    if !status.is_success() {
        return Err(ApiError::Rejected(error_detail(&text).unwrap_or_else(|| {
            format!("request failed with status {}", status.as_u16())
        })));
    }

    serde_json::from_str(&text).map_err(|err| ApiError::Decode(err.to_string()))
}

/// Pull the human-readable reason out of an error body (`detail` or `error`)
fn error_detail(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let detail = value.get("detail").or_else(|| value.get("error"))?;
    match detail {
        Value::String(text) => Some(text.clone()),
        Value::Object(map) => map
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string),
        // Validation failures arrive as a list of {msg: ...}
        Value::Array(items) => {
            let messages: Vec<&str> = items
                .iter()
                .filter_map(|item| item.get("msg").and_then(Value::as_str))
                .collect();
            if messages.is_empty() {
                None
            } else {
                Some(messages.join("; "))
            }
        }
        _ => None,
    }
}

fn external_body(draft: &crate::api::ExternalContactDraft) -> ExternalBody<'_> {
    ExternalBody {
        name: &draft.name,
        phone: &draft.phone,
        address: draft.address.as_deref(),
        relationship: &draft.relationship,
    }
}

#[async_trait]
impl ConnectionsApi for HttpApi {
    async fn search_users(
        &self,
        query: &str,
        exclude_user_id: Option<&str>,
    ) -> ApiResult<Vec<ConnectionCandidate>> {
        let mut params = vec![("q", query)];
        if let Some(user_id) = exclude_user_id {
            params.push(("current_user_id", user_id));
        }
        let builder = self.request(Method::GET, "/api/users/search").query(&params);
        let response: SearchResponse = self.send(builder).await?;
        Ok(response.users)
    }

    async fn add_connection(&self, payload: NewConnection) -> ApiResult<SaveReceipt> {
        let builder = match &payload {
            NewConnection::Linked {
                connected_user_id,
                relationship,
            } => self
                .request(Method::POST, "/api/connections/linked")
                .json(&LinkedBody {
                    connected_user_id: Some(connected_user_id.as_str()),
                    relationship,
                }),
            NewConnection::External(draft) => self
                .request(Method::POST, "/api/connections/external")
                .json(&external_body(draft)),
        };
        self.write(builder).await
    }

    async fn update_connection(
        &self,
        contact_id: &str,
        update: ConnectionUpdate,
    ) -> ApiResult<SaveReceipt> {
        let path = format!("/api/connections/{}/{}", update.kind().as_str(), contact_id);
        let builder = match &update {
            ConnectionUpdate::Linked { relationship } => {
                self.request(Method::PUT, &path).json(&LinkedBody {
                    connected_user_id: None,
                    relationship,
                })
            }
            ConnectionUpdate::External(draft) => {
                self.request(Method::PUT, &path).json(&external_body(draft))
            }
        };
        self.write(builder).await
    }

    async fn list_connections(&self, user_id: &str) -> ApiResult<ConnectionList> {
        let builder = self.request(Method::GET, &format!("/api/connections/{}", user_id));
        self.send(builder).await
    }

    async fn delete_connection(&self, connection_id: &str) -> ApiResult<SaveReceipt> {
        let builder = self.request(Method::DELETE, &format!("/api/connections/{}", connection_id));
        self.write(builder).await
    }
}
