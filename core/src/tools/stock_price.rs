use super::{extract_string_arg, http_client};
use crate::traits::{Tool, ToolResult};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Value, json};

const CHART_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";

/// Latest quote for a ticker from Yahoo Finance's public chart endpoint.
pub struct StockPriceTool {
    client: reqwest::Client,
}

impl StockPriceTool {
    pub fn new() -> Self {
        Self {
            client: http_client(),
        }
    }
}

impl Default for StockPriceTool {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Quote {
    pub symbol: String,
    pub price: f64,
    pub currency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_close: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub day_high: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub day_low: Option<f64>,
}

/// Reads `chart.result[0].meta` from a chart response.
pub fn parse_quote(body: &Value) -> anyhow::Result<Quote> {
    if let Some(description) = body
        .pointer("/chart/error/description")
        .and_then(Value::as_str)
    {
        anyhow::bail!("{description}");
    }

    let meta = body
        .pointer("/chart/result/0/meta")
        .ok_or_else(|| anyhow::anyhow!("Quote response has no data"))?;
    let number = |key: &str| meta.get(key).and_then(Value::as_f64);

    let price = number("regularMarketPrice")
        .ok_or_else(|| anyhow::anyhow!("Quote response has no market price"))?;
    let previous_close = number("chartPreviousClose").or_else(|| number("previousClose"));
    let change_percent = previous_close
        .filter(|p| *p != 0.0)
        .map(|p| ((price - p) / p * 10_000.0).round() / 100.0);

    Ok(Quote {
        symbol: meta
            .get("symbol")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        price,
        currency: meta
            .get("currency")
            .and_then(Value::as_str)
            .map(str::to_string),
        previous_close,
        change_percent,
        day_high: number("regularMarketDayHigh"),
        day_low: number("regularMarketDayLow"),
    })
}

#[async_trait]
impl Tool for StockPriceTool {
    fn name(&self) -> &str {
        "get_stock_price"
    }

    fn description(&self) -> &str {
        "Get the current stock price for a ticker symbol, with previous close and daily range."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "symbol": {
                    "type": "string",
                    "description": "Ticker symbol, e.g. AAPL or NVDA"
                }
            },
            "required": ["symbol"]
        })
    }

    async fn execute(&self, args: Value) -> anyhow::Result<ToolResult> {
        let symbol = extract_string_arg(&args, "symbol")?.to_uppercase();

        let response = match self
            .client
            .get(format!("{CHART_URL}/{symbol}"))
            .query(&[("range", "1d"), ("interval", "1d")])
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return Ok(ToolResult::error(format!("Quote request failed: {e}"))),
        };

        let body: Value = match response.json().await {
            Ok(b) => b,
            Err(e) => return Ok(ToolResult::error(format!("Invalid quote response: {e}"))),
        };

        match parse_quote(&body) {
            Ok(mut quote) => {
                if quote.symbol.is_empty() {
                    quote.symbol = symbol;
                }
                Ok(ToolResult::success(serde_json::to_string(&quote)?))
            }
            Err(e) => Ok(ToolResult::error(format!("No quote for {symbol}: {e}"))),
        }
    }
}
