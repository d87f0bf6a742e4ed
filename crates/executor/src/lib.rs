//! HTTP transfer executor.
//!
//! Approved transfers are handed to a remote signer service that owns the
//! wallet keys. The executor never signs anything itself.

use async_trait::async_trait;
use base64::Engine;
use engine::{TransferError, TransferExecutor, TransferReceipt, Usd};
use reqwest::{Client, StatusCode, header};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const DEFAULT_EXPLORER_URL: &str = "https://basescan.org/tx/";
const DEFAULT_TOKEN: &str = "USDC";
const CONFIRMED: &str = "confirmed";

#[derive(Debug, Serialize)]
struct TransferRequest<'a> {
    amount_usd: String,
    amount_base_units: i64,
    token: &'a str,
    destination: &'a str,
    idempotency_key: String,
}

#[derive(Debug, Deserialize)]
struct TransferResponse {
    tx_hash: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Clone, Debug)]
pub struct HttpTransferExecutor {
    client: Client,
    base_url: String,
    token: String,
    explorer_url: String,
}

impl HttpTransferExecutor {
    pub fn builder() -> HttpTransferExecutorBuilder {
        HttpTransferExecutorBuilder::default()
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn explorer_link(&self, tx_hash: &str) -> String {
        if self.explorer_url.ends_with('/') {
            format!("{}{tx_hash}", self.explorer_url)
        } else {
            format!("{}/{tx_hash}", self.explorer_url)
        }
    }

    /// Turn the signer's answer into a receipt. Only a 2xx carrying a
    /// confirmed transaction counts as success.
    fn interpret(&self, status: StatusCode, body: &str) -> Result<TransferReceipt, TransferError> {
        if status.is_success() {
            let response: TransferResponse = serde_json::from_str(body).map_err(|err| {
                TransferError::Unavailable(format!("invalid signer response: {err}"))
            })?;
            if response.status != CONFIRMED {
                return Err(TransferError::Rejected(format!(
                    "transaction {} is {}",
                    response.tx_hash, response.status
                )));
            }
            let explorer_url = self.explorer_link(&response.tx_hash);
            return Ok(TransferReceipt::new(response.tx_hash).explorer_url(explorer_url));
        }

        let message = match serde_json::from_str::<ErrorBody>(body) {
            Ok(err) => err.error,
            Err(_) => "signer error".to_string(),
        };
        let message = format!("{status}: {message}");
        if status.is_server_error() {
            Err(TransferError::Unavailable(message))
        } else {
            Err(TransferError::Rejected(message))
        }
    }
}

#[async_trait]
impl TransferExecutor for HttpTransferExecutor {
    async fn transfer(
        &self,
        amount: Usd,
        destination: &str,
    ) -> Result<TransferReceipt, TransferError> {
        let amount_base_units = amount
            .to_base_units()
            .map_err(|err| TransferError::Rejected(err.to_string()))?;
        let request = TransferRequest {
            amount_usd: amount.amount().to_string(),
            amount_base_units,
            token: &self.token,
            destination,
            idempotency_key: Uuid::new_v4().to_string(),
        };
        tracing::debug!(
            amount = %amount,
            idempotency_key = %request.idempotency_key,
            "sending transfer to signer"
        );

        let resp = self
            .client
            .post(self.url("/transfers"))
            .json(&request)
            .send()
            .await
            .map_err(|err| TransferError::Unavailable(format!("network error: {err}")))?;
        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|err| TransferError::Unavailable(format!("network error: {err}")))?;

        let result = self.interpret(status, &body);
        if let Err(err) = &result {
            tracing::warn!(%status, "signer refused transfer: {err}");
        }
        result
    }
}

#[derive(Default, Debug)]
pub struct HttpTransferExecutorBuilder {
    url: String,
    username: String,
    password: String,
    token: Option<String>,
    explorer_url: Option<String>,
}

impl HttpTransferExecutorBuilder {
    pub fn url(mut self, url: &str) -> HttpTransferExecutorBuilder {
        self.url = url.to_string();
        self
    }

    pub fn credentials(mut self, username: &str, password: &str) -> HttpTransferExecutorBuilder {
        self.username = username.to_string();
        self.password = password.to_string();
        self
    }

    /// Token symbol sent to the signer. Defaults to `USDC`.
    pub fn token(mut self, token: &str) -> HttpTransferExecutorBuilder {
        self.token = Some(token.to_string());
        self
    }

    /// Prefix the transaction hash is appended to.
    pub fn explorer_url(mut self, explorer_url: &str) -> HttpTransferExecutorBuilder {
        self.explorer_url = Some(explorer_url.to_string());
        self
    }

    pub fn build(self) -> Result<HttpTransferExecutor, String> {
        if self.url.trim().is_empty() {
            return Err("signer url must not be empty".to_string());
        }

        // Basic authorization is in the form "Basic `secret`" where `secret` is
        // the base64 of the string "username:password".
        let secret = format!("{}:{}", self.username, self.password);
        let secret = format!("Basic {}", base64::prelude::BASE64_STANDARD.encode(secret));

        let mut auth = header::HeaderValue::try_from(secret)
            .map_err(|err| format!("invalid auth header value: {err}"))?;
        auth.set_sensitive(true);

        let mut headers = header::HeaderMap::new();
        headers.insert(header::AUTHORIZATION, auth);

        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|err| format!("failed to build http client: {err}"))?;

        Ok(HttpTransferExecutor {
            client,
            base_url: self.url,
            token: self.token.unwrap_or_else(|| DEFAULT_TOKEN.to_string()),
            explorer_url: self
                .explorer_url
                .unwrap_or_else(|| DEFAULT_EXPLORER_URL.to_string()),
        })
    }
}
