//! algod v2 REST client

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::{
    AccountInfo, AssetHolding, LedgerClient, LedgerError, SignedTransfer, SuggestedParams,
    TransactionStatus, VALIDITY_WINDOW_ROUNDS,
};
use crate::common::LedgerConfig;

/// algod HTTP client
#[derive(Debug, Clone)]
pub struct AlgodClient {
    client: Client,
    base_url: String,
    token_header: String,
    token: String,
}

impl AlgodClient {
    /// Create a client for `base_url`; an empty token sends no auth header
    pub fn new(base_url: &str, token_header: &str, token: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token_header: token_header.to_string(),
            token: token.to_string(),
        }
    }

    pub fn from_config(config: &LedgerConfig) -> Self {
        Self::new(&config.algod_url, &config.token_header, &config.token)
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        if self.token.is_empty() {
            request
        } else {
            request.header(self.token_header.as_str(), self.token.as_str())
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, LedgerError> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self.authorized(self.client.get(&url)).send().await?;
        parse_json(check_status(resp).await?).await
    }
}

async fn check_status(resp: Response) -> Result<Response, LedgerError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let message = resp.text().await.unwrap_or_default();
    if status.is_server_error() {
        return Err(LedgerError::Unavailable(format!("{}: {}", status, message)));
    }
    Err(LedgerError::Api {
        status: status.as_u16(),
        message,
    })
}

async fn parse_json<T: DeserializeOwned>(resp: Response) -> Result<T, LedgerError> {
    let body = resp.text().await?;
    serde_json::from_str(&body).map_err(|e| LedgerError::Parse(e.to_string()))
}

#[async_trait]
impl LedgerClient for AlgodClient {
    async fn suggested_params(&self) -> Result<SuggestedParams, LedgerError> {
        let params: ParamsResponse = self.get_json("/v2/transactions/params").await?;
        Ok(params.into())
    }

    async fn account_info(&self, address: &str) -> Result<AccountInfo, LedgerError> {
        let account: AccountResponse = self.get_json(&format!("/v2/accounts/{}", address)).await?;
        Ok(account.into())
    }

    async fn submit(&self, signed: &SignedTransfer) -> Result<String, LedgerError> {
        let url = format!("{}/v2/transactions", self.base_url);
        let resp = self
            .authorized(self.client.post(&url))
            .header(reqwest::header::CONTENT_TYPE, "application/x-binary")
            .body(signed.bytes.clone())
            .send()
            .await?;

        let submitted: SubmitResponse = parse_json(check_status(resp).await?).await?;
        if submitted.tx_id != signed.tx_id {
            tracing::warn!(
                expected = %signed.tx_id,
                returned = %submitted.tx_id,
                "node returned a different transaction id"
            );
        }
        Ok(submitted.tx_id)
    }

    async fn transaction_status(&self, tx_id: &str) -> Result<TransactionStatus, LedgerError> {
        let url = format!("{}/v2/transactions/pending/{}", self.base_url, tx_id);
        let resp = self.authorized(self.client.get(&url)).send().await?;

        // Dropped from the node's recent-transaction cache: nothing known yet
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(TransactionStatus::default());
        }

        let pending: PendingResponse = parse_json(check_status(resp).await?).await?;
        Ok(pending.into())
    }

    async fn current_round(&self) -> Result<u64, LedgerError> {
        let status: NodeStatusResponse = self.get_json("/v2/status").await?;
        Ok(status.last_round)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct NodeStatusResponse {
    last_round: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ParamsResponse {
    fee: u64,
    genesis_hash: String,
    genesis_id: String,
    last_round: u64,
    min_fee: u64,
}

impl From<ParamsResponse> for SuggestedParams {
    fn from(p: ParamsResponse) -> Self {
        Self {
            fee: p.fee,
            min_fee: p.min_fee,
            first_valid: p.last_round,
            last_valid: p.last_round + VALIDITY_WINDOW_ROUNDS,
            genesis_id: p.genesis_id,
            genesis_hash: p.genesis_hash,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct AccountResponse {
    address: String,
    amount: u64,
    #[serde(default)]
    assets: Vec<HoldingResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct HoldingResponse {
    asset_id: u64,
    amount: u64,
}

impl From<AccountResponse> for AccountInfo {
    fn from(a: AccountResponse) -> Self {
        Self {
            address: a.address,
            amount: a.amount,
            assets: a
                .assets
                .into_iter()
                .map(|h| AssetHolding {
                    asset_id: h.asset_id,
                    amount: h.amount,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    #[serde(rename = "txId")]
    tx_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct PendingResponse {
    #[serde(default)]
    confirmed_round: Option<u64>,
    #[serde(default)]
    pool_error: Option<String>,
}

impl From<PendingResponse> for TransactionStatus {
    fn from(p: PendingResponse) -> Self {
        Self {
            confirmed_round: p.confirmed_round,
            pool_error: p.pool_error.filter(|e| !e.is_empty()),
        }
    }
}
