//! Seam to the external batch lookup service.
//!
//! The collaborator itself is out of scope: it accepts a batch of item
//! payloads and returns an opaque response body or a transport failure.
//! Response parsing never fails the batch; junk items become placeholder
//! results instead.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::batch::Batch;
use crate::error::ServiceError;

/// Per-item outcome status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    /// Parsed successfully.
    Ok,
    /// Present in the response but not parseable; recorded with a placeholder.
    Unparseable,
    /// Absent from a well-formed response.
    NotFound,
}

/// Result for a single work item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemResult {
    pub id: String,
    /// Parsed payload; empty placeholder for unparseable and not-found items.
    pub output: String,
    pub status: ItemStatus,
}

impl ItemResult {
    pub fn ok(id: &str, output: String) -> Self {
        Self {
            id: id.to_string(),
            output,
            status: ItemStatus::Ok,
        }
    }

    pub fn unparseable(id: &str) -> Self {
        Self {
            id: id.to_string(),
            output: String::new(),
            status: ItemStatus::Unparseable,
        }
    }

    pub fn not_found(id: &str) -> Self {
        Self {
            id: id.to_string(),
            output: String::new(),
            status: ItemStatus::NotFound,
        }
    }
}

/// External-service collaborator: one request per batch.
#[async_trait]
pub trait BatchService: Send + Sync {
    /// Submit a batch and return the raw response body.
    async fn fetch(&self, batch: &Batch) -> Result<String, ServiceError>;
}

/// Turns a response body into one result per batch item.
pub trait ResponseParser: Send + Sync {
    /// Parse the body against the submitted batch.
    ///
    /// Returns `None` when the body is not a recognizable response envelope,
    /// which the retry controller classifies as transient. Otherwise every
    /// batch item gets exactly one result; parsing itself never fails.
    fn parse(&self, batch: &Batch, body: &str) -> Option<Vec<ItemResult>>;
}

/// Parser for newline-delimited JSON responses.
///
/// Expected line shape: `{"id": "...", "record": {...}}`. A line whose JSON
/// is invalid contributes nothing; an id with a line but no `record` field is
/// unparseable; an id with no line at all is not found.
pub struct JsonLinesParser;

impl ResponseParser for JsonLinesParser {
    fn parse(&self, batch: &Batch, body: &str) -> Option<Vec<ItemResult>> {
        // id -> Some(record json) for usable lines, None for junk lines
        let mut records: HashMap<String, Option<String>> = HashMap::new();
        let mut any_line = false;

        for line in body.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let Ok(value) = serde_json::from_str::<serde_json::Value>(line) else {
                continue;
            };
            any_line = true;
            let Some(id) = value.get("id").and_then(|v| v.as_str()) else {
                continue;
            };
            let record = value.get("record").map(|r| r.to_string());
            records.insert(id.to_string(), record);
        }

        if !any_line {
            return None;
        }

        let results = batch
            .items
            .iter()
            .map(|item| match records.get(&item.id) {
                Some(Some(record)) => ItemResult::ok(&item.id, record.clone()),
                Some(None) => {
                    debug!(id = %item.id, "Unparseable record, recording placeholder");
                    ItemResult::unparseable(&item.id)
                }
                None => {
                    debug!(id = %item.id, "Item absent from response");
                    ItemResult::not_found(&item.id)
                }
            })
            .collect();

        Some(results)
    }
}

/// Batch service that POSTs the item payloads to an HTTP endpoint.
pub struct HttpBatchService {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpBatchService {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl BatchService for HttpBatchService {
    async fn fetch(&self, batch: &Batch) -> Result<String, ServiceError> {
        let ids: Vec<&str> = batch.items.iter().map(|item| item.payload.as_str()).collect();

        let response = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({ "ids": ids }))
            .send()
            .await
            .map_err(|e| ServiceError::Transport {
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ServiceError::Rejected {
                code: status.as_u16(),
                message,
            });
        }

        let body = response.text().await.map_err(|e| ServiceError::Transport {
            message: e.to_string(),
        })?;

        if body.trim().is_empty() {
            return Err(ServiceError::EmptyResponse);
        }

        Ok(body)
    }
}
