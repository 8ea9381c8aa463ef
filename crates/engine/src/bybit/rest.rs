use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use hmac::{Hmac, Mac};
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::Sha256;
use tracing::{debug, info};

use common::config::ApiCredentials;
use common::{
    Bar, Error, ExchangeClient, OrderAck, OrderRequest, Position, Result, Side, TradeConfig,
};

/// Largest kline page the exchange serves.
pub const MAX_KLINE_LIMIT: usize = 1000;

/// "leverage not modified", returned when the requested leverage is already set.
const LEVERAGE_NOT_MODIFIED: i64 = 110043;

type HmacSha256 = Hmac<Sha256>;

/// Bybit v5 REST client. Market data endpoints are public; account and order
/// endpoints need credentials.
pub struct BybitClient {
    base_url: String,
    credentials: Option<ApiCredentials>,
    recv_window: u64,
    http: Client,
}

impl BybitClient {
    pub fn new(
        base_url: impl Into<String>,
        credentials: Option<ApiCredentials>,
        recv_window: u64,
    ) -> Result<Self> {
        let http = Client::builder()
            .use_rustls_tls()
            .build()
            .map_err(|e| Error::Http(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
            recv_window,
            http,
        })
    }

    fn url(&self, path: &str, query: &str) -> String {
        if query.is_empty() {
            format!("{}{path}", self.base_url)
        } else {
            format!("{}{path}?{query}", self.base_url)
        }
    }

    async fn public_get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<T> {
        let query = encode_query(params);
        let resp = self
            .http
            .get(self.url(path, &query))
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;
        let body: ApiResponse = resp.json().await.map_err(|e| Error::Http(e.to_string()))?;
        body.into_result(path)
    }

    /// Signed request. The signature covers timestamp, key, receive window and
    /// then the query string for GET or the JSON body otherwise.
    async fn signed(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, &str)],
        body: Value,
    ) -> Result<ApiResponse> {
        let creds = self
            .credentials
            .as_ref()
            .ok_or_else(|| Error::Config(format!("{path} requires API credentials")))?;
        let timestamp = Utc::now().timestamp_millis();
        let query = encode_query(params);
        let payload = if method == Method::GET {
            query.clone()
        } else {
            body.to_string()
        };
        let signature = sign(
            &creds.api_secret,
            &format!("{timestamp}{}{}{payload}", creds.api_key, self.recv_window),
        )?;

        let mut request = self
            .http
            .request(method.clone(), self.url(path, &query))
            .header("X-BAPI-API-KEY", &creds.api_key)
            .header("X-BAPI-TIMESTAMP", timestamp.to_string())
            .header("X-BAPI-SIGN", signature)
            .header("X-BAPI-RECV-WINDOW", self.recv_window.to_string())
            .header("Content-Type", "application/json");
        if method != Method::GET {
            request = request.body(payload);
        }

        let resp = request.send().await.map_err(|e| Error::Http(e.to_string()))?;
        let status = resp.status();
        let text = resp.text().await.map_err(|e| Error::Http(e.to_string()))?;
        if !status.is_success() {
            return Err(Error::Exchange(format!("HTTP {status}: {text}")));
        }
        Ok(serde_json::from_str(&text)?)
    }
}

pub fn sign(secret: &str, payload: &str) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| Error::Other(format!("failed to create signing key: {e}")))?;
    mac.update(payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn encode_query(params: &[(&str, &str)]) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params)
        .finish()
}

#[async_trait]
impl ExchangeClient for BybitClient {
    async fn mark_price(&self, config: &TradeConfig) -> Result<f64> {
        let result: TickerResult = self
            .public_get(
                "/v5/market/tickers",
                &[("category", config.channel.as_str()), ("symbol", config.symbol.as_str())],
            )
            .await?;
        result.price(&config.symbol)
    }

    async fn open_positions(&self, config: &TradeConfig) -> Result<Vec<Position>> {
        let result: PositionResult = self
            .signed(
                Method::GET,
                "/v5/position/list",
                &[("category", config.channel.as_str()), ("symbol", config.symbol.as_str())],
                Value::Null,
            )
            .await?
            .into_result("/v5/position/list")?;
        result.positions()
    }

    async fn place_order(&self, config: &TradeConfig, order: &OrderRequest) -> Result<OrderAck> {
        let body = order_body(config, order)?;
        debug!(
            symbol = %order.symbol,
            side = %order.side,
            body = %body,
            "Submitting order to Bybit"
        );

        let resp = self
            .signed(Method::POST, "/v5/order/create", &[], body)
            .await?;
        let code = resp.ret_code;
        let result: CreateOrderResult = resp.into_result("/v5/order/create")?;
        Ok(OrderAck {
            code,
            order_id: result.order_id,
            timestamp: Utc::now(),
        })
    }

    async fn historical_bars(&self, config: &TradeConfig, limit: usize) -> Result<Vec<Bar>> {
        // One extra row covers the in-progress bar dropped below.
        let request_limit = (limit + 1).min(MAX_KLINE_LIMIT).to_string();
        let result: KlineResult = self
            .public_get(
                "/v5/market/kline",
                &[
                    ("category", config.channel.as_str()),
                    ("symbol", config.symbol.as_str()),
                    ("interval", config.interval.as_str()),
                    ("limit", request_limit.as_str()),
                ],
            )
            .await?;
        let mut bars = result.closed_bars()?;
        let start = bars.len().saturating_sub(limit);
        Ok(bars.split_off(start))
    }

    async fn set_leverage(&self, config: &TradeConfig, leverage: u32) -> Result<()> {
        let leverage = leverage.to_string();
        let body = json!({
            "category": config.channel,
            "symbol": config.symbol,
            "buyLeverage": leverage,
            "sellLeverage": leverage,
        });
        let resp = self
            .signed(Method::POST, "/v5/position/set-leverage", &[], body)
            .await?;
        if resp.ret_code == LEVERAGE_NOT_MODIFIED {
            info!(symbol = %config.symbol, "Leverage already set");
            return Ok(());
        }
        resp.ensure_success("/v5/position/set-leverage")
    }
}

fn order_body(config: &TradeConfig, order: &OrderRequest) -> Result<Value> {
    let side = order
        .side
        .as_exchange()
        .ok_or_else(|| Error::Exchange("cannot place an order without a side".into()))?;
    let mut body = json!({
        "category": config.channel,
        "symbol": order.symbol,
        "side": side,
        "orderType": order.order_type.as_exchange(),
        "qty": order.quantity.to_string(),
        "orderLinkId": order.link_id,
    });
    if let Some(tp) = order.take_profit {
        body["takeProfit"] = json!(tp.to_string());
    }
    if let Some(sl) = order.stop_loss {
        body["stopLoss"] = json!(sl.to_string());
    }
    if order.reduce_only {
        body["reduceOnly"] = json!(true);
    }
    Ok(body)
}

// ─── Response types ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct ApiResponse {
    #[serde(rename = "retCode")]
    ret_code: i64,
    #[serde(rename = "retMsg", default)]
    ret_msg: String,
    #[serde(default)]
    result: Value,
}

impl ApiResponse {
    fn ensure_success(&self, path: &str) -> Result<()> {
        if self.ret_code == 0 {
            Ok(())
        } else {
            Err(Error::Exchange(format!(
                "{path} failed: {} (code {})",
                self.ret_msg, self.ret_code
            )))
        }
    }

    fn into_result<T: DeserializeOwned>(self, path: &str) -> Result<T> {
        self.ensure_success(path)?;
        Ok(serde_json::from_value(self.result)?)
    }
}

#[derive(Deserialize)]
struct TickerResult {
    list: Vec<Ticker>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Ticker {
    #[serde(default)]
    mark_price: Option<String>,
    last_price: String,
}

impl TickerResult {
    /// Mark price where the market has one, last trade price for spot.
    fn price(&self, symbol: &str) -> Result<f64> {
        let ticker = self
            .list
            .first()
            .ok_or_else(|| Error::Exchange(format!("no ticker for '{symbol}'")))?;
        let raw = ticker
            .mark_price
            .as_deref()
            .filter(|p| !p.is_empty())
            .unwrap_or(&ticker.last_price);
        parse_number("markPrice", raw)
    }
}

#[derive(Deserialize)]
struct PositionResult {
    list: Vec<PositionItem>,
}

#[derive(Deserialize)]
struct PositionItem {
    symbol: String,
    side: String,
    size: String,
}

impl PositionResult {
    fn positions(self) -> Result<Vec<Position>> {
        self.list
            .into_iter()
            .map(|p| {
                Ok(Position {
                    side: Side::from_exchange(&p.side),
                    size: parse_number("size", &p.size)?,
                    symbol: p.symbol,
                })
            })
            .collect()
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateOrderResult {
    order_id: String,
}

#[derive(Deserialize)]
struct KlineResult {
    /// `[start, open, high, low, close, volume, turnover]`, newest first.
    list: Vec<Vec<String>>,
}

impl KlineResult {
    /// Oldest first, with the newest row (the bar still in progress) removed.
    fn closed_bars(self) -> Result<Vec<Bar>> {
        let mut bars = self
            .list
            .iter()
            .rev()
            .map(|row| parse_kline_row(row))
            .collect::<Result<Vec<_>>>()?;
        bars.pop();
        Ok(bars)
    }
}

fn parse_kline_row(row: &[String]) -> Result<Bar> {
    let [start, open, high, low, close, volume, turnover] = row else {
        return Err(Error::Data(format!(
            "kline row has {} fields, expected 7",
            row.len()
        )));
    };
    let timestamp = start
        .parse::<i64>()
        .map_err(|e| Error::Data(format!("bad kline start '{start}': {e}")))?;
    if Utc.timestamp_millis_opt(timestamp).single().is_none() {
        return Err(Error::Data(format!("kline start {timestamp} out of range")));
    }
    Ok(Bar {
        timestamp,
        open: parse_number("open", open)?,
        high: parse_number("high", high)?,
        low: parse_number("low", low)?,
        close: parse_number("close", close)?,
        volume: parse_number("volume", volume)?,
        turnover: parse_number("turnover", turnover)?,
    })
}

fn parse_number(field: &str, value: &str) -> Result<f64> {
    value
        .parse::<f64>()
        .map_err(|e| Error::Data(format!("bad {field} '{value}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Interval;

    #[test]
    fn signature_matches_known_vector() {
        let payload = format!(
            "{}{}{}{}",
            1_658_385_579_423i64, "XXXXXXXXXX", 5_000, "category=linear&symbol=BTCUSDT"
        );
        assert_eq!(
            sign(&"sec".repeat(10), &payload).unwrap(),
            "334fa6702f86167e92dd130bc9d8234e797619db09011f306c0f7a038742c782"
        );
    }

    #[test]
    fn kline_list_is_reversed_and_drops_open_bar() {
        let body = r#"{"retCode":0,"retMsg":"OK","result":{"category":"linear","symbol":"BTCUSDT",
            "list":[["1700000120000","3","3","3","3","1","3"],
                    ["1700000060000","2","2","2","2","1","2"],
                    ["1700000000000","1","1","1","1","1","1"]]}}"#;
        let resp: ApiResponse = serde_json::from_str(body).unwrap();
        let result: KlineResult = resp.into_result("/v5/market/kline").unwrap();
        let bars = result.closed_bars().unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].timestamp, 1_700_000_000_000);
        assert_eq!(bars[1].close, 2.0);
    }

    #[test]
    fn short_kline_row_is_a_data_error() {
        let row: Vec<String> = vec!["1".into(), "2".into()];
        assert!(matches!(parse_kline_row(&row), Err(Error::Data(_))));
    }

    #[test]
    fn nonzero_ret_code_is_exchange_error() {
        let resp: ApiResponse =
            serde_json::from_str(r#"{"retCode":10001,"retMsg":"params error","result":{}}"#)
                .unwrap();
        assert!(matches!(
            resp.into_result::<TickerResult>("/v5/market/tickers"),
            Err(Error::Exchange(_))
        ));
    }

    #[test]
    fn spot_ticker_falls_back_to_last_price() {
        let linear: TickerResult = serde_json::from_str(
            r#"{"list":[{"symbol":"BTCUSDT","lastPrice":"100.5","markPrice":"100.7"}]}"#,
        )
        .unwrap();
        assert_eq!(linear.price("BTCUSDT").unwrap(), 100.7);

        let spot: TickerResult =
            serde_json::from_str(r#"{"list":[{"symbol":"BTCUSDT","lastPrice":"100.5"}]}"#)
                .unwrap();
        assert_eq!(spot.price("BTCUSDT").unwrap(), 100.5);
    }

    #[test]
    fn positions_map_exchange_sides() {
        let result: PositionResult = serde_json::from_str(
            r#"{"list":[{"symbol":"BTCUSDT","side":"Sell","size":"0.5"},
                        {"symbol":"BTCUSDT","side":"","size":"0"}]}"#,
        )
        .unwrap();
        let positions = result.positions().unwrap();
        assert_eq!(positions[0].side, Side::Sell);
        assert_eq!(positions[0].size, 0.5);
        assert!(!positions[1].is_open());
    }

    #[test]
    fn order_body_carries_levels_and_reduce_only() {
        let config = TradeConfig::new("BTCUSDT", Interval::Min1, "linear");
        let entry = OrderRequest::market("BTCUSDT", Side::Buy, 0.001).with_levels(
            common::ProtectiveLevels {
                take_profit: 101.2,
                stop_loss: 99.1,
            },
        );
        let body = order_body(&config, &entry).unwrap();
        assert_eq!(body["side"], "Buy");
        assert_eq!(body["orderType"], "Market");
        assert_eq!(body["qty"], "0.001");
        assert_eq!(body["takeProfit"], "101.2");
        assert_eq!(body["stopLoss"], "99.1");
        assert!(body.get("reduceOnly").is_none());
        assert!(body.get("price").is_none());

        let close = OrderRequest::close(&Position {
            symbol: "BTCUSDT".into(),
            side: Side::Buy,
            size: 0.5,
        });
        let body = order_body(&config, &close).unwrap();
        assert_eq!(body["side"], "Sell");
        assert_eq!(body["orderType"], "Market");
        assert_eq!(body["reduceOnly"], true);

        let neutral = OrderRequest::market("BTCUSDT", Side::Neutral, 1.0);
        assert!(order_body(&config, &neutral).is_err());
    }
}
