//! HTTP client for the entries API.
//!
//! Every call takes the caller's bearer token explicitly; the client holds
//! no credential state of its own. Requests carry a random `x-request-id`
//! that is echoed in the debug log so a request can be matched with
//! server-side logs.

use crate::config::{http_client, ClientConfig};
use crate::error::{extract_error_message, ClientError, ClientResult, GENERIC_FAILURE_MESSAGE};
use crate::types::{EntryPayload, RawEntry, Stats};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

/// Header carrying the per-request correlation id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Only the id of a created entry is needed; the rest is known locally.
#[derive(Deserialize)]
struct CreatedEntry {
    id: i64,
}

/// HTTP client for `/entries` and `/stats`.
pub struct EntriesApiClient {
    client: Client,
    base_url: String,
    filter_by_account: bool,
}

impl EntriesApiClient {
    pub fn new(config: &ClientConfig) -> ClientResult<Self> {
        Ok(Self {
            client: http_client(config)?,
            base_url: config.api_base().to_string(),
            filter_by_account: config.filter_by_account,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `GET /entries`, scoped to the account when filtering is enabled.
    pub async fn list_entries(&self, token: &str, account_id: &str) -> ClientResult<Vec<RawEntry>> {
        let req = self.scoped(self.authed(Method::GET, "/entries", token), account_id);
        let resp = self.send(req, "GET /entries").await?;
        decode_json(resp, "entries").await
    }

    /// `GET /stats`, scoped like [`list_entries`](Self::list_entries).
    pub async fn get_stats(&self, token: &str, account_id: &str) -> ClientResult<Stats> {
        let req = self.scoped(self.authed(Method::GET, "/stats", token), account_id);
        let resp = self.send(req, "GET /stats").await?;
        decode_json(resp, "stats").await
    }

    /// `POST /entries` with an already-encrypted payload. Returns the
    /// server-assigned id.
    pub async fn create_entry(&self, token: &str, payload: &EntryPayload) -> ClientResult<i64> {
        let req = self.authed(Method::POST, "/entries", token).json(payload);
        let resp = self.send(req, "POST /entries").await?;
        let created: CreatedEntry = decode_json(resp, "created entry").await?;
        Ok(created.id)
    }

    /// `DELETE /entries/{id}`. The response body is ignored.
    pub async fn delete_entry(&self, token: &str, id: i64) -> ClientResult<()> {
        let path = format!("/entries/{id}");
        let req = self.authed(Method::DELETE, &path, token);
        self.send(req, &format!("DELETE {path}")).await?;
        Ok(())
    }

    fn authed(&self, method: Method, path: &str, token: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(token)
    }

    fn scoped(&self, req: RequestBuilder, account_id: &str) -> RequestBuilder {
        if self.filter_by_account {
            req.query(&[("user_id", account_id)])
        } else {
            req
        }
    }

    /// Sends a request and turns non-success statuses into errors.
    async fn send(&self, req: RequestBuilder, label: &str) -> ClientResult<Response> {
        let request_id = Uuid::new_v4().to_string();
        let resp = req
            .header(REQUEST_ID_HEADER, request_id.as_str())
            .send()
            .await?;

        let status = resp.status();
        debug!("{label} -> {status} [{request_id}]");

        if status.is_success() {
            return Ok(resp);
        }
        if status == StatusCode::UNAUTHORIZED {
            return Err(ClientError::AuthRequired);
        }

        let body = resp.text().await.unwrap_or_default();
        let message = extract_error_message(&body)
            .unwrap_or_else(|| GENERIC_FAILURE_MESSAGE.to_string());
        Err(ClientError::remote(status.as_u16(), message))
    }
}

async fn decode_json<T: DeserializeOwned>(resp: Response, what: &str) -> ClientResult<T> {
    let status = resp.status().as_u16();
    let body = resp.bytes().await?;
    serde_json::from_slice(&body).map_err(|e| ClientError::RemoteRequestFailed {
        status: Some(status),
        message: format!("malformed {what} response: {e}"),
    })
}
