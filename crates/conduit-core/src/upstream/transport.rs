use async_trait::async_trait;
use serde_json::Value;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use crate::{
    config::ProviderConfig,
    types::{ContractCall, JsonRpcRequest, JsonRpcResponse},
    upstream::{http_client::HttpClient, ProviderError},
    utils::parse_hex_u64,
};

/// Per-member outcome of a multicall.
pub type MulticallResult = Vec<Result<Value, ProviderError>>;

/// A network path to one blockchain node.
///
/// `multicall` returns `Err` only when the whole round trip failed; otherwise the
/// vector has exactly one entry per input call, in input order.
#[async_trait]
pub trait Transport: Send + Sync {
    fn name(&self) -> &str;

    async fn call(&self, call: &ContractCall) -> Result<Value, ProviderError>;

    async fn multicall(&self, calls: &[ContractCall]) -> Result<MulticallResult, ProviderError>;

    /// Cheap liveness probe returning the latest block number.
    async fn block_number(&self) -> Result<u64, ProviderError>;
}

/// JSON-RPC over HTTP transport.
///
/// Reads are `eth_call` at `latest`; a multicall is one JSON-RPC batch array
/// whose responses are matched back by id.
pub struct HttpTransport {
    name: String,
    url: String,
    timeout: Duration,
    max_retries: u32,
    client: Arc<HttpClient>,
    next_id: AtomicU64,
}

impl HttpTransport {
    #[must_use]
    pub fn new(config: &ProviderConfig, client: Arc<HttpClient>) -> Self {
        Self {
            name: config.name.clone(),
            url: config.url.clone(),
            timeout: config.timeout(),
            max_retries: config.max_retries,
            client,
            next_id: AtomicU64::new(1),
        }
    }

    fn reserve_ids(&self, count: usize) -> u64 {
        self.next_id.fetch_add(count as u64, Ordering::Relaxed)
    }

    fn calldata(call: &ContractCall) -> Result<&str, ProviderError> {
        call.calldata.as_deref().ok_or_else(|| {
            ProviderError::InvalidRequest(format!(
                "call {} on {} has no calldata",
                call.function_name, call.address
            ))
        })
    }

    async fn post<T: serde::Serialize + ?Sized>(&self, payload: &T) -> Result<bytes::Bytes, ProviderError> {
        let body = serde_json::to_vec(payload).map_err(|e| {
            ProviderError::InvalidRequest(format!("Failed to serialize request: {e}"))
        })?;
        self.client
            .send_request(&self.url, bytes::Bytes::from(body), self.timeout, self.max_retries)
            .await
    }

    fn into_result(response: JsonRpcResponse) -> Result<Value, ProviderError> {
        if let Some(error) = response.error {
            return Err(ProviderError::RpcError(error.code, error.message));
        }
        response
            .result
            .ok_or_else(|| ProviderError::InvalidResponse("response has neither result nor error".to_string()))
    }

    async fn send_single(&self, request: &JsonRpcRequest) -> Result<Value, ProviderError> {
        let bytes = self.post(request).await?;
        let response: JsonRpcResponse = serde_json::from_slice(&bytes)
            .map_err(|e| ProviderError::InvalidResponse(format!("Invalid JSON: {e}")))?;
        Self::into_result(response)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn name(&self) -> &str {
        &self.name
    }

    async fn call(&self, call: &ContractCall) -> Result<Value, ProviderError> {
        let data = Self::calldata(call)?;
        let request = JsonRpcRequest::eth_call(&call.address, data, self.reserve_ids(1));
        self.send_single(&request).await
    }

    async fn multicall(&self, calls: &[ContractCall]) -> Result<MulticallResult, ProviderError> {
        let base_id = self.reserve_ids(calls.len());

        let mut results: MulticallResult = Vec::with_capacity(calls.len());
        let mut batch = Vec::with_capacity(calls.len());
        for (index, call) in calls.iter().enumerate() {
            match Self::calldata(call) {
                Ok(data) => {
                    batch.push(JsonRpcRequest::eth_call(&call.address, data, base_id + index as u64));
                    results.push(Err(ProviderError::InvalidResponse(
                        "no response for call in batch".to_string(),
                    )));
                }
                Err(e) => results.push(Err(e)),
            }
        }

        if batch.is_empty() {
            return Ok(results);
        }

        let bytes = self.post(&batch).await?;

        let responses: Vec<JsonRpcResponse> = match serde_json::from_slice(&bytes) {
            Ok(responses) => responses,
            Err(array_err) => {
                // Some providers answer a rejected batch with a single error object.
                let single: JsonRpcResponse = serde_json::from_slice(&bytes).map_err(|_| {
                    ProviderError::InvalidResponse(format!("Invalid batch JSON: {array_err}"))
                })?;
                return match single.error {
                    Some(error) => Err(ProviderError::RpcError(error.code, error.message)),
                    None => Err(ProviderError::InvalidResponse(
                        "expected a batch array response".to_string(),
                    )),
                };
            }
        };

        let mut by_id: HashMap<u64, JsonRpcResponse> = responses
            .into_iter()
            .filter_map(|response| response.id.as_u64().map(|id| (id, response)))
            .collect();

        for (index, slot) in results.iter_mut().enumerate() {
            if slot.as_ref().err().is_some_and(|e| matches!(e, ProviderError::InvalidRequest(_))) {
                continue;
            }
            if let Some(response) = by_id.remove(&(base_id + index as u64)) {
                *slot = Self::into_result(response);
            }
        }

        Ok(results)
    }

    async fn block_number(&self) -> Result<u64, ProviderError> {
        let request = JsonRpcRequest::new("eth_blockNumber", None, Value::from(self.reserve_ids(1)));
        let result = self.send_single(&request).await?;
        result
            .as_str()
            .and_then(parse_hex_u64)
            .ok_or_else(|| ProviderError::InvalidResponse(format!("invalid block number: {result}")))
    }
}
