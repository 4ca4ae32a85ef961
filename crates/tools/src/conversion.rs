//! Crypto conversion tool: live quotes from the FreeCryptoAPI conversion
//! endpoint.
//!
//! One GET per call to `{base_url}/getConversion?from=..&to=..&amount=..`.
//! Remote failures never surface as errors: a non-200 status or a transport
//! failure becomes descriptive text that the model reads and explains to the
//! user. Only arguments that cannot form a request are rejected up front.
//! Without an API key no request is sent and the lookup reports that instead.

use async_trait::async_trait;
use atlas_config::ConversionConfig;
use atlas_core::error::ToolError;
use atlas_core::tool::{Tool, ToolResult};
use serde::Serialize;
use tracing::{debug, warn};

/// Name the model uses to call this tool.
pub const TOOL_NAME: &str = "get_crypto_conversion";

/// Amount used when the model omits one.
pub const DEFAULT_AMOUNT: f64 = 1.0;

/// What a conversion lookup produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionOutcome {
    /// Raw response body of a successful lookup.
    Quote(String),
    /// Human-readable description of a failed lookup.
    Failed(String),
}

impl ConversionOutcome {
    pub fn is_quote(&self) -> bool {
        matches!(self, ConversionOutcome::Quote(_))
    }

    /// The text handed to the model, whichever way the lookup went.
    pub fn text(&self) -> &str {
        match self {
            ConversionOutcome::Quote(text) | ConversionOutcome::Failed(text) => text,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            ConversionOutcome::Quote(text) | ConversionOutcome::Failed(text) => text,
        }
    }
}

/// Validated tool arguments, symbols already uppercased.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversionRequest {
    pub from_coin: String,
    pub to_coin: String,
    pub amount: f64,
}

impl ConversionRequest {
    pub fn new(from_coin: &str, to_coin: &str, amount: f64) -> Self {
        Self {
            from_coin: from_coin.trim().to_uppercase(),
            to_coin: to_coin.trim().to_uppercase(),
            amount,
        }
    }

    /// Decode the model's JSON arguments.
    ///
    /// `amount` may be a number or a numeric string and defaults to 1.0.
    pub fn from_arguments(arguments: &serde_json::Value) -> Result<Self, ToolError> {
        let from_coin = symbol_argument(arguments, "from_coin")?;
        let to_coin = symbol_argument(arguments, "to_coin")?;

        let amount = match arguments.get("amount") {
            None | Some(serde_json::Value::Null) => DEFAULT_AMOUNT,
            Some(serde_json::Value::Number(n)) => n.as_f64().ok_or_else(|| {
                ToolError::InvalidArguments(format!("'amount' is out of range: {n}"))
            })?,
            Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().map_err(|_| {
                ToolError::InvalidArguments(format!("'amount' is not a number: {s:?}"))
            })?,
            Some(other) => {
                return Err(ToolError::InvalidArguments(format!(
                    "'amount' must be a number, got {other}"
                )));
            }
        };

        if !amount.is_finite() {
            return Err(ToolError::InvalidArguments(format!(
                "'amount' must be finite, got {amount}"
            )));
        }

        Ok(Self::new(from_coin, to_coin, amount))
    }

    fn query(&self) -> [(&'static str, String); 3] {
        [
            ("from", self.from_coin.clone()),
            ("to", self.to_coin.clone()),
            ("amount", self.amount.to_string()),
        ]
    }
}

fn symbol_argument<'a>(arguments: &'a serde_json::Value, key: &str) -> Result<&'a str, ToolError> {
    arguments[key]
        .as_str()
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ToolError::InvalidArguments(format!("Missing '{key}' argument")))
}

/// Conversion lookup against a fixed pricing endpoint.
pub struct CryptoConversionTool {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl CryptoConversionTool {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: Some(api_key.into()),
            client: reqwest::Client::new(),
        }
    }

    /// Build from configuration. A missing key is not an error here; every
    /// lookup then fails with a message naming the variable to set.
    pub fn from_config(config: &ConversionConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone().filter(|key| !key.trim().is_empty()),
            client: reqwest::Client::new(),
        }
    }

    /// Quote `amount` of `from_coin` in `to_coin`.
    pub async fn convert(&self, from_coin: &str, to_coin: &str, amount: f64) -> ConversionOutcome {
        self.lookup(&ConversionRequest::new(from_coin, to_coin, amount))
            .await
    }

    /// Issue the GET for an already-normalized request.
    pub async fn lookup(&self, request: &ConversionRequest) -> ConversionOutcome {
        let Some(api_key) = self.api_key.as_deref() else {
            warn!("Conversion requested without an API key");
            return ConversionOutcome::Failed(
                "Conversion unavailable: FREECRYPTO_API_KEY is not set".into(),
            );
        };

        let url = format!("{}/getConversion", self.base_url);
        debug!(
            from = %request.from_coin,
            to = %request.to_coin,
            amount = request.amount,
            "Requesting conversion quote"
        );

        let response = self
            .client
            .get(&url)
            .header("api_key", api_key)
            .header("Authorization", format!("Bearer {api_key}"))
            .query(&request.query())
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Conversion request failed");
                return ConversionOutcome::Failed(format!("Exception during conversion: {e}"));
            }
        };

        let status = response.status().as_u16();
        match response.text().await {
            Ok(body) if status == 200 => ConversionOutcome::Quote(body),
            Ok(body) => {
                warn!(status, "Conversion API returned an error");
                ConversionOutcome::Failed(format!("Error from Conversion API: {status} - {body}"))
            }
            Err(e) => {
                warn!(status, error = %e, "Conversion response body unreadable");
                ConversionOutcome::Failed(format!(
                    "Exception during conversion: status {status}, unreadable body: {e}"
                ))
            }
        }
    }
}

#[async_trait]
impl Tool for CryptoConversionTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        "Convert between any two cryptocurrencies or from crypto to fiat. \
         Example: from_coin=\"BTC\", to_coin=\"USD\", amount=0.5"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "from_coin": {
                    "type": "string",
                    "description": "Symbol of the asset to convert from (e.g. BTC)"
                },
                "to_coin": {
                    "type": "string",
                    "description": "Symbol of the asset to convert to (e.g. USD, ETH)"
                },
                "amount": {
                    "type": "number",
                    "description": "Amount of from_coin to convert (default: 1.0)",
                    "default": DEFAULT_AMOUNT
                }
            },
            "required": ["from_coin", "to_coin"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let request = ConversionRequest::from_arguments(&arguments)?;
        let outcome = self.lookup(&request).await;

        Ok(ToolResult {
            call_id: String::new(),
            success: outcome.is_quote(),
            output: outcome.into_text(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Query, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::get;
    use axum::Router;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    type Seen = Arc<Mutex<Vec<(HashMap<String, String>, Option<String>)>>>;

    /// Fake pricing endpoint recording every query and `api_key` header.
    async fn fake_pricing_api(status: StatusCode, body: &'static str) -> (String, Seen) {
        let seen: Seen = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new()
            .route(
                "/getConversion",
                get(
                    move |State(seen): State<Seen>,
                          headers: HeaderMap,
                          Query(query): Query<HashMap<String, String>>| async move {
                        let key = headers
                            .get("api_key")
                            .and_then(|v| v.to_str().ok())
                            .map(String::from);
                        seen.lock().unwrap().push((query, key));
                        (status, body)
                    },
                ),
            )
            .with_state(seen.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), seen)
    }

    #[tokio::test]
    async fn success_returns_raw_body() {
        let (base_url, seen) =
            fake_pricing_api(StatusCode::OK, r#"{"status":"success","result":"64000.5"}"#).await;
        let tool = CryptoConversionTool::new(base_url, "fc-key");

        let outcome = tool.convert("BTC", "USD", 1.0).await;
        assert_eq!(
            outcome,
            ConversionOutcome::Quote(r#"{"status":"success","result":"64000.5"}"#.into())
        );

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].1.as_deref(), Some("fc-key"));
        assert_eq!(seen[0].0["from"], "BTC");
        assert_eq!(seen[0].0["to"], "USD");
    }

    #[tokio::test]
    async fn symbols_are_uppercased_before_dispatch() {
        let (base_url, seen) = fake_pricing_api(StatusCode::OK, "{}").await;
        let tool = CryptoConversionTool::new(base_url, "fc-key");

        tool.convert("btc", "usd", 1.0).await;
        tool.convert("BTC", "USD", 1.0).await;

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], seen[1]);
        assert_eq!(seen[0].0["from"], "BTC");
        assert_eq!(seen[0].0["to"], "USD");
    }

    #[tokio::test]
    async fn not_found_is_reported_as_text() {
        let (base_url, _seen) = fake_pricing_api(StatusCode::NOT_FOUND, "Unknown pair").await;
        let tool = CryptoConversionTool::new(base_url, "fc-key");

        let outcome = tool.convert("FOO", "BAR", 1.0).await;
        assert!(!outcome.is_quote());
        assert!(outcome.text().contains("404"));
        assert!(outcome.text().contains("Unknown pair"));
    }

    #[tokio::test]
    async fn transport_failure_is_reported_as_text() {
        // Bind then drop to get a port nobody listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let tool = CryptoConversionTool::new(format!("http://{addr}"), "fc-key");
        let outcome = tool.convert("BTC", "USD", 1.0).await;
        assert!(outcome.text().starts_with("Exception during conversion"));
    }

    #[tokio::test]
    async fn execute_marks_failures_unsuccessful() {
        let (base_url, _seen) =
            fake_pricing_api(StatusCode::INTERNAL_SERVER_ERROR, "upstream down").await;
        let tool = CryptoConversionTool::new(base_url, "fc-key");

        let result = tool
            .execute(serde_json::json!({"from_coin": "eth", "to_coin": "btc"}))
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.output.contains("500"));
    }

    #[test]
    fn arguments_default_amount() {
        let request =
            ConversionRequest::from_arguments(&serde_json::json!({"from_coin": "sol", "to_coin": "eur"}))
                .unwrap();
        assert_eq!(request, ConversionRequest::new("SOL", "EUR", 1.0));
    }

    #[test]
    fn arguments_accept_numeric_string_amount() {
        let request = ConversionRequest::from_arguments(
            &serde_json::json!({"from_coin": "btc", "to_coin": "usd", "amount": "0.5"}),
        )
        .unwrap();
        assert_eq!(request.amount, 0.5);
    }

    #[test]
    fn arguments_reject_non_numeric_amount() {
        let err = ConversionRequest::from_arguments(
            &serde_json::json!({"from_coin": "btc", "to_coin": "usd", "amount": "lots"}),
        )
        .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));

        let err = ConversionRequest::from_arguments(
            &serde_json::json!({"from_coin": "btc", "to_coin": "usd", "amount": [1]}),
        )
        .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[test]
    fn arguments_require_symbols() {
        let err = ConversionRequest::from_arguments(&serde_json::json!({"to_coin": "usd"}))
            .unwrap_err();
        assert!(err.to_string().contains("from_coin"));

        let err =
            ConversionRequest::from_arguments(&serde_json::json!({"from_coin": "btc", "to_coin": " "}))
                .unwrap_err();
        assert!(err.to_string().contains("to_coin"));
    }

    #[tokio::test]
    async fn truncated_body_keeps_the_status() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        // Promises 100 bytes, sends 5, hangs up.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let _ = socket
                .write_all(b"HTTP/1.1 502 Bad Gateway\r\ncontent-length: 100\r\n\r\nshort")
                .await;
        });

        let tool = CryptoConversionTool::new(format!("http://{addr}"), "fc-key");
        let outcome = tool.convert("BTC", "USD", 1.0).await;
        assert!(!outcome.is_quote());
        assert!(outcome.text().starts_with("Exception during conversion: status 502"));
    }

    #[tokio::test]
    async fn missing_key_is_reported_without_a_request() {
        let (base_url, seen) = fake_pricing_api(StatusCode::OK, "{}").await;
        let config = ConversionConfig {
            base_url,
            api_key: None,
        };
        let tool = CryptoConversionTool::from_config(&config);

        let result = tool
            .execute(serde_json::json!({"from_coin": "btc", "to_coin": "usd"}))
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.output.contains("FREECRYPTO_API_KEY is not set"));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn configured_key_is_sent() {
        let (base_url, seen) = fake_pricing_api(StatusCode::OK, "{}").await;
        let config = ConversionConfig {
            base_url: format!("{base_url}/"),
            api_key: Some("fc-config".into()),
        };

        let outcome = CryptoConversionTool::from_config(&config)
            .convert("eth", "usd", 2.0)
            .await;
        assert!(outcome.is_quote());
        assert_eq!(seen.lock().unwrap()[0].1.as_deref(), Some("fc-config"));
    }

    #[test]
    fn tool_definition() {
        let tool = CryptoConversionTool::new("http://localhost", "k");
        let def = tool.to_definition();
        assert_eq!(def.name, "get_crypto_conversion");
        assert_eq!(def.parameters["required"], serde_json::json!(["from_coin", "to_coin"]));
    }
}
