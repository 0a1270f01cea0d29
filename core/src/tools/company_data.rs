use super::{extract_string_arg, extract_usize_arg_opt, http_client};
use crate::traits::{Tool, ToolResult};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Value, json};

const QUOTE_SUMMARY_URL: &str = "https://query2.finance.yahoo.com/v10/finance/quoteSummary";
const SEARCH_URL: &str = "https://query1.finance.yahoo.com/v1/finance/search";
const DEFAULT_NEWS: usize = 5;
const MAX_NEWS: usize = 10;

fn symbol_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "symbol": {
                "type": "string",
                "description": "Ticker symbol, e.g. AMZN or NFLX"
            }
        },
        "required": ["symbol"]
    })
}

async fn get_json(
    client: &reqwest::Client,
    url: &str,
    query: &[(&str, String)],
) -> Result<Value, String> {
    let response = client
        .get(url)
        .query(query)
        .send()
        .await
        .map_err(|e| format!("Finance request failed: {e}"))?;
    response
        .json()
        .await
        .map_err(|e| format!("Invalid finance response: {e}"))
}

/// Yahoo wraps most numbers as `{ "raw": 1.5, "fmt": "1.50" }`.
fn raw_number(data: &Value, key: &str) -> Option<f64> {
    let value = data.get(key)?;
    value
        .get("raw")
        .and_then(Value::as_f64)
        .or_else(|| value.as_f64())
}

fn text(data: &Value, key: &str) -> Option<String> {
    data.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Returns `quoteSummary.result[0].<module>`.
fn summary_module<'a>(body: &'a Value, module: &str) -> anyhow::Result<&'a Value> {
    if let Some(description) = body
        .pointer("/quoteSummary/error/description")
        .and_then(Value::as_str)
    {
        anyhow::bail!("{description}");
    }
    body.pointer("/quoteSummary/result/0")
        .and_then(|result| result.get(module))
        .ok_or_else(|| anyhow::anyhow!("Response has no {module} data"))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecommendationTrend {
    pub period: String,
    pub strong_buy: u64,
    pub buy: u64,
    pub hold: u64,
    pub sell: u64,
    pub strong_sell: u64,
}

pub fn parse_recommendations(body: &Value) -> anyhow::Result<Vec<RecommendationTrend>> {
    let trend = summary_module(body, "recommendationTrend")?
        .get("trend")
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow::anyhow!("Response has no recommendation trend"))?;

    let count = |row: &Value, key: &str| raw_number(row, key).map_or(0, |n| n as u64);
    Ok(trend
        .iter()
        .map(|row| RecommendationTrend {
            period: text(row, "period").unwrap_or_default(),
            strong_buy: count(row, "strongBuy"),
            buy: count(row, "buy"),
            hold: count(row, "hold"),
            sell: count(row, "sell"),
            strong_sell: count(row, "strongSell"),
        })
        .collect())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Fundamentals {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_mean_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_high_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_low_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analyst_opinions: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_revenue: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revenue_growth: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gross_margins: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profit_margins: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_on_equity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debt_to_equity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub free_cashflow: Option<f64>,
}

pub fn parse_fundamentals(body: &Value) -> anyhow::Result<Fundamentals> {
    let data = summary_module(body, "financialData")?;
    Ok(Fundamentals {
        currency: text(data, "financialCurrency"),
        current_price: raw_number(data, "currentPrice"),
        target_mean_price: raw_number(data, "targetMeanPrice"),
        target_high_price: raw_number(data, "targetHighPrice"),
        target_low_price: raw_number(data, "targetLowPrice"),
        recommendation: text(data, "recommendationKey"),
        analyst_opinions: raw_number(data, "numberOfAnalystOpinions"),
        total_revenue: raw_number(data, "totalRevenue"),
        revenue_growth: raw_number(data, "revenueGrowth"),
        gross_margins: raw_number(data, "grossMargins"),
        profit_margins: raw_number(data, "profitMargins"),
        return_on_equity: raw_number(data, "returnOnEquity"),
        debt_to_equity: raw_number(data, "debtToEquity"),
        free_cashflow: raw_number(data, "freeCashflow"),
    })
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CompanyProfile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sector: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub employees: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

pub fn parse_company_profile(body: &Value) -> anyhow::Result<CompanyProfile> {
    let data = summary_module(body, "assetProfile")?;
    Ok(CompanyProfile {
        sector: text(data, "sector"),
        industry: text(data, "industry"),
        country: text(data, "country"),
        website: text(data, "website"),
        employees: raw_number(data, "fullTimeEmployees").map(|n| n as u64),
        summary: text(data, "longBusinessSummary"),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SummaryKind {
    Recommendations,
    Fundamentals,
    Profile,
}

impl SummaryKind {
    fn module(self) -> &'static str {
        match self {
            SummaryKind::Recommendations => "recommendationTrend",
            SummaryKind::Fundamentals => "financialData",
            SummaryKind::Profile => "assetProfile",
        }
    }

    fn render(self, body: &Value) -> anyhow::Result<Value> {
        Ok(match self {
            SummaryKind::Recommendations => serde_json::to_value(parse_recommendations(body)?)?,
            SummaryKind::Fundamentals => serde_json::to_value(parse_fundamentals(body)?)?,
            SummaryKind::Profile => serde_json::to_value(parse_company_profile(body)?)?,
        })
    }
}

/// One Yahoo Finance `quoteSummary` module exposed as a tool.
pub struct QuoteSummaryTool {
    client: reqwest::Client,
    kind: SummaryKind,
}

impl QuoteSummaryTool {
    fn new(kind: SummaryKind) -> Self {
        Self {
            client: http_client(),
            kind,
        }
    }

    pub fn analyst_recommendations() -> Self {
        Self::new(SummaryKind::Recommendations)
    }

    pub fn fundamentals() -> Self {
        Self::new(SummaryKind::Fundamentals)
    }

    pub fn company_info() -> Self {
        Self::new(SummaryKind::Profile)
    }
}

#[async_trait]
impl Tool for QuoteSummaryTool {
    fn name(&self) -> &str {
        match self.kind {
            SummaryKind::Recommendations => "get_analyst_recommendations",
            SummaryKind::Fundamentals => "get_stock_fundamentals",
            SummaryKind::Profile => "get_company_info",
        }
    }

    fn description(&self) -> &str {
        match self.kind {
            SummaryKind::Recommendations => {
                "Get analyst buy/hold/sell recommendation counts for a ticker, by month."
            }
            SummaryKind::Fundamentals => {
                "Get fundamentals for a ticker: price targets, consensus rating, revenue, margins and cash flow."
            }
            SummaryKind::Profile => {
                "Get a company's profile: sector, industry, country, website, employees and business summary."
            }
        }
    }

    fn parameters_schema(&self) -> Value {
        symbol_schema()
    }

    async fn execute(&self, args: Value) -> anyhow::Result<ToolResult> {
        let symbol = extract_string_arg(&args, "symbol")?.to_uppercase();
        let url = format!("{QUOTE_SUMMARY_URL}/{symbol}");

        let query = [("modules", self.kind.module().to_string())];
        let body = match get_json(&self.client, &url, &query).await {
            Ok(body) => body,
            Err(e) => return Ok(ToolResult::error(e)),
        };

        match self.kind.render(&body) {
            Ok(mut data) => {
                if let Value::Object(map) = &mut data {
                    map.insert("symbol".into(), Value::String(symbol));
                    return Ok(ToolResult::success(serde_json::to_string(&data)?));
                }
                Ok(ToolResult::success(
                    json!({ "symbol": symbol, "trend": data }).to_string(),
                ))
            }
            Err(e) => Ok(ToolResult::error(format!("No data for {symbol}: {e}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewsItem {
    pub title: String,
    pub publisher: Option<String>,
    pub link: String,
    pub published: Option<String>,
}

/// Reads `news[]` from a finance search response. Entries without a title or
/// link are skipped.
pub fn parse_news(body: &Value, limit: usize) -> Vec<NewsItem> {
    body.get("news")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|item| {
            Some(NewsItem {
                title: text(item, "title")?,
                link: text(item, "link")?,
                publisher: text(item, "publisher"),
                published: item
                    .get("providerPublishTime")
                    .and_then(Value::as_i64)
                    .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0))
                    .map(|at| at.format("%Y-%m-%d").to_string()),
            })
        })
        .take(limit)
        .collect()
}

/// Recent headlines about a company from Yahoo Finance search.
pub struct CompanyNewsTool {
    client: reqwest::Client,
}

impl CompanyNewsTool {
    pub fn new() -> Self {
        Self {
            client: http_client(),
        }
    }
}

impl Default for CompanyNewsTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for CompanyNewsTool {
    fn name(&self) -> &str {
        "get_company_news"
    }

    fn description(&self) -> &str {
        "Get recent news headlines about a company by ticker symbol."
    }

    fn parameters_schema(&self) -> Value {
        let mut schema = symbol_schema();
        schema["properties"]["max_results"] = json!({
            "type": "integer",
            "description": "Number of headlines (default 5, max 10)"
        });
        schema
    }

    async fn execute(&self, args: Value) -> anyhow::Result<ToolResult> {
        let symbol = extract_string_arg(&args, "symbol")?.to_uppercase();
        let limit = extract_usize_arg_opt(&args, "max_results", DEFAULT_NEWS).clamp(1, MAX_NEWS);

        let query = [
            ("q", symbol.clone()),
            ("quotesCount", "0".to_string()),
            ("newsCount", limit.to_string()),
        ];
        let body = match get_json(&self.client, SEARCH_URL, &query).await {
            Ok(body) => body,
            Err(e) => return Ok(ToolResult::error(e)),
        };

        let news = parse_news(&body, limit);
        if news.is_empty() {
            return Ok(ToolResult::success(format!("No recent news found for {symbol}.")));
        }

        let rendered: Vec<String> = news
            .iter()
            .map(|item| {
                let source = [item.publisher.as_deref(), item.published.as_deref()]
                    .into_iter()
                    .flatten()
                    .collect::<Vec<_>>()
                    .join(" · ");
                format!("**{}**\n{}\nURL: {}", item.title, source, item.link)
            })
            .collect();
        Ok(ToolResult::success(rendered.join("\n\n")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(module: &str, data: Value) -> Value {
        json!({ "quoteSummary": { "result": [{ module: data }], "error": null } })
    }

    #[test]
    fn parses_recommendation_trend() {
        let body = summary(
            "recommendationTrend",
            json!({
                "trend": [
                    { "period": "0m", "strongBuy": 18, "buy": 42, "hold": 4, "sell": 0, "strongSell": 0 },
                    { "period": "-1m", "strongBuy": { "raw": 17, "fmt": "17" }, "buy": 41, "hold": 5 }
                ]
            }),
        );

        let trend = parse_recommendations(&body).unwrap();
        assert_eq!(trend.len(), 2);
        assert_eq!(trend[0].period, "0m");
        assert_eq!(trend[0].buy, 42);
        assert_eq!(trend[1].strong_buy, 17);
        assert_eq!(trend[1].strong_sell, 0);
    }

    #[test]
    fn parses_wrapped_fundamentals() {
        let body = summary(
            "financialData",
            json!({
                "financialCurrency": "USD",
                "currentPrice": { "raw": 185.5, "fmt": "185.50" },
                "targetMeanPrice": { "raw": 220.1, "fmt": "220.10" },
                "recommendationKey": "buy",
                "profitMargins": { "raw": 0.0735, "fmt": "7.35%" },
                "debtToEquity": {}
            }),
        );

        let data = parse_fundamentals(&body).unwrap();
        assert_eq!(data.current_price, Some(185.5));
        assert_eq!(data.target_mean_price, Some(220.1));
        assert_eq!(data.recommendation.as_deref(), Some("buy"));
        assert_eq!(data.profit_margins, Some(0.0735));
        assert_eq!(data.debt_to_equity, None);

        let rendered = serde_json::to_value(&data).unwrap();
        assert!(rendered.get("free_cashflow").is_none());
    }

    #[test]
    fn parses_company_profile() {
        let body = summary(
            "assetProfile",
            json!({
                "sector": "Communication Services",
                "industry": "Entertainment",
                "fullTimeEmployees": 13000,
                "longBusinessSummary": "Netflix, Inc. provides entertainment services.",
                "website": "  "
            }),
        );

        let profile = parse_company_profile(&body).unwrap();
        assert_eq!(profile.industry.as_deref(), Some("Entertainment"));
        assert_eq!(profile.employees, Some(13000));
        assert_eq!(profile.website, None);
    }

    #[test]
    fn summary_errors_are_reported() {
        let body = json!({
            "quoteSummary": {
                "result": null,
                "error": { "code": "Not Found", "description": "Quote not found for symbol: ZZZZ" }
            }
        });
        let err = parse_fundamentals(&body).unwrap_err();
        assert!(err.to_string().contains("ZZZZ"));

        let missing = summary("assetProfile", json!({}));
        assert!(parse_recommendations(&missing).is_err());
    }

    #[test]
    fn news_skips_incomplete_items_and_respects_limit() {
        let body = json!({
            "news": [
                { "title": "Amazon expands AWS", "publisher": "Reuters", "link": "https://example.com/a", "providerPublishTime": 1717200000 },
                { "title": "No link here" },
                { "title": "Prime Day dates", "link": "https://example.com/b" },
                { "title": "Third", "link": "https://example.com/c" }
            ]
        });

        let news = parse_news(&body, 2);
        assert_eq!(news.len(), 2);
        assert_eq!(news[0].publisher.as_deref(), Some("Reuters"));
        assert_eq!(news[0].published.as_deref(), Some("2024-06-01"));
        assert_eq!(news[1].title, "Prime Day dates");
        assert_eq!(news[1].published, None);

        assert!(parse_news(&json!({}), 5).is_empty());
    }

    #[test]
    fn tools_have_distinct_names() {
        let names = [
            QuoteSummaryTool::analyst_recommendations().name().to_string(),
            QuoteSummaryTool::fundamentals().name().to_string(),
            QuoteSummaryTool::company_info().name().to_string(),
            CompanyNewsTool::new().name().to_string(),
        ];
        assert_eq!(
            names,
            [
                "get_analyst_recommendations",
                "get_stock_fundamentals",
                "get_company_info",
                "get_company_news"
            ]
        );
    }
}
