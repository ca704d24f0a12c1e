//! LI.FI aggregator integration.
//!
//! Sources routes across every DEX LI.FI indexes and returns the best
//! estimated output together with a ready-to-sign transaction.
//!
//! API docs: https://docs.li.fi/
//! Base URL: https://li.quest/v1
//! Rate limit: undocumented for anonymous use, 429 under load.
//! Auth: optional `x-lifi-api-key` header raises the limit.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, Secret};
use std::time::Duration;
use tracing::debug;

use super::{AggregatorError, QuoteRequest, QuoteResponse, QuoteSource};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

pub const DEFAULT_BASE_URL: &str = "https://li.quest/v1";

const DEFAULT_TIMEOUT_SECS: u64 = 30;

const API_KEY_HEADER: &str = "x-lifi-api-key";

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// LI.FI `/quote` client.
pub struct LifiClient {
    http: Client,
    base_url: String,
    api_key: Option<Secret<String>>,
}

impl LifiClient {
    /// Create a new client.
    ///
    /// `api_key` is optional; anonymous requests work but are throttled
    /// sooner.
    pub fn new(
        base_url: Option<String>,
        api_key: Option<Secret<String>>,
        timeout_secs: Option<u64>,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)))
            .user_agent("alpha-hunter/0.1.0")
            .build()
            .context("Failed to build HTTP client for LI.FI")?;

        Ok(Self {
            http,
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key,
        })
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Full `/quote` URL for a request.
    fn quote_url(&self, req: &QuoteRequest) -> String {
        format!(
            "{}/quote?fromChain={}&toChain={}&fromToken={}&toToken={}&fromAmount={}&fromAddress={}&slippage={}",
            self.base_url,
            req.from_chain,
            req.to_chain,
            urlencoding::encode(&req.from_token),
            urlencoding::encode(&req.to_token),
            req.from_amount,
            urlencoding::encode(&req.from_address),
            req.slippage,
        )
    }
}

#[async_trait]
impl QuoteSource for LifiClient {
    async fn fetch_quote(&self, request: &QuoteRequest) -> Result<QuoteResponse, AggregatorError> {
        let url = self.quote_url(request);
        debug!(url = %url, "Requesting LI.FI quote");

        let mut builder = self.http.get(&url);
        if let Some(key) = &self.api_key {
            builder = builder.header(API_KEY_HEADER, key.expose_secret().as_str());
        }

        let resp = builder
            .send()
            .await
            .map_err(|e| AggregatorError::Transport(e.to_string()))?;

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(AggregatorError::Throttled);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AggregatorError::Http {
                status: status.as_u16(),
                body,
            });
        }

        resp.json::<QuoteResponse>()
            .await
            .map_err(|e| AggregatorError::Malformed(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn request() -> QuoteRequest {
        QuoteRequest {
            from_chain: 56,
            to_chain: 56,
            from_token: "0xToken".into(),
            to_token: "0x0000000000000000000000000000000000000000".into(),
            from_amount: 50_000_000_000_000_000,
            from_address: "0xWallet".into(),
            slippage: dec!(0.15),
        }
    }

    #[test]
    fn test_new_client_defaults() {
        let client = LifiClient::new(None, None, None).unwrap();
        assert_eq!(client.base_url, DEFAULT_BASE_URL);
        assert!(!client.has_api_key());
    }

    #[test]
    fn test_new_client_trims_trailing_slash() {
        let client = LifiClient::new(Some("http://localhost:8080/v1/".into()), None, Some(5)).unwrap();
        assert_eq!(client.base_url, "http://localhost:8080/v1");
    }

    #[test]
    fn test_new_client_with_key() {
        let client = LifiClient::new(None, Some(Secret::new("k".to_string())), None).unwrap();
        assert!(client.has_api_key());
    }

    #[test]
    fn test_quote_url() {
        let client = LifiClient::new(None, None, None).unwrap();
        let url = client.quote_url(&request());
        assert!(url.starts_with("https://li.quest/v1/quote?"));
        assert!(url.contains("fromChain=56"));
        assert!(url.contains("fromToken=0xToken"));
        assert!(url.contains("fromAmount=50000000000000000"));
        assert!(url.contains("fromAddress=0xWallet"));
        assert!(url.contains("slippage=0.15"));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transport_error() {
        let client = LifiClient::new(Some("http://127.0.0.1:1".into()), None, Some(2)).unwrap();
        let err = client.fetch_quote(&request()).await.unwrap_err();
        assert!(matches!(err, AggregatorError::Transport(_)));
    }
}
