use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Method;
use rust_decimal::Decimal;
use serde_json::{json, Value};

use exchanges::BitvavoApi;
use interface::{
    btc_to_satoshis, satoshis_to_btc, BuyOrderResult, CompletedBuyOrder, CompletedWithdraw,
    ExchangeError, WalletBalance,
};

use crate::service::{
    json_str, weighted_average_price, BalanceService, BuyService, Fill, SupportsExchange,
    WithdrawService,
};

const EXCHANGE: &str = "bitvavo";

pub struct BitvavoBuyService {
    client: Arc<dyn BitvavoApi>,
    base_currency: String,
    trading_pair: String,
}

impl BitvavoBuyService {
    pub fn new(client: Arc<dyn BitvavoApi>, base_currency: String) -> Self {
        let trading_pair = format!("BTC-{}", base_currency);
        Self {
            client,
            base_currency,
            trading_pair,
        }
    }

    fn completed_order_from(&self, order_info: &Value) -> Result<CompletedBuyOrder, ExchangeError> {
        let filled_amount = json_str(EXCHANGE, order_info, "/filledAmount")?;
        let fee_paid = json_str(EXCHANGE, order_info, "/feePaid")?;
        let fee_currency = json_str(EXCHANGE, order_info, "/feeCurrency")?;
        let amount_in_satoshis = btc_to_satoshis(filled_amount)?;

        let mut fills = Vec::new();
        if let Some(list) = order_info.pointer("/fills").and_then(Value::as_array) {
            for fill in list {
                let price: Decimal = json_str(EXCHANGE, fill, "/price")?
                    .parse()
                    .map_err(|_| ExchangeError::MalformedResponse {
                        exchange: EXCHANGE,
                        message: "fill price is not a decimal".to_owned(),
                    })?;
                fills.push(Fill {
                    price,
                    filled_satoshis: btc_to_satoshis(json_str(EXCHANGE, fill, "/amount")?)?,
                });
            }
        }
        let average_price =
            weighted_average_price(&fills, amount_in_satoshis).unwrap_or(Decimal::ZERO);

        Ok(CompletedBuyOrder {
            amount_in_satoshis,
            fees_in_satoshis: if fee_currency == "BTC" {
                btc_to_satoshis(fee_paid)?
            } else {
                0
            },
            purchase_made_at: Utc::now(),
            display_amount_bought: format!("{} BTC", filled_amount),
            display_amount_spent: format!(
                "{} {}",
                json_str(EXCHANGE, order_info, "/filledAmountQuote")?,
                self.base_currency
            ),
            display_amount_spent_currency: self.base_currency.clone(),
            display_average_price: format!("{} {}", average_price, self.base_currency),
            display_fees_spent: format!("{} {}", fee_paid, fee_currency),
        })
    }
}

impl SupportsExchange for BitvavoBuyService {
    fn supports_exchange(&self, exchange: &str) -> bool {
        exchange == EXCHANGE
    }
}

#[async_trait]
impl BuyService for BitvavoBuyService {
    async fn initiate_buy(&self, amount: u64) -> Result<BuyOrderResult, ExchangeError> {
        let order_info = self
            .client
            .api_call(
                Method::POST,
                "order",
                &[],
                Some(json!({
                    "market": self.trading_pair,
                    "side": "buy",
                    "orderType": "market",
                    "amountQuote": amount.to_string(),
                })),
            )
            .await?;

        if json_str(EXCHANGE, &order_info, "/status")? != "filled" {
            return Ok(BuyOrderResult::Pending {
                order_id: json_str(EXCHANGE, &order_info, "/orderId")?.to_owned(),
            });
        }

        Ok(BuyOrderResult::Filled(self.completed_order_from(&order_info)?))
    }

    async fn check_if_order_is_filled(
        &self,
        order_id: &str,
    ) -> Result<BuyOrderResult, ExchangeError> {
        let order_info = self
            .client
            .api_call(
                Method::GET,
                "order",
                &[
                    ("market", self.trading_pair.clone()),
                    ("orderId", order_id.to_owned()),
                ],
                None,
            )
            .await?;

        if json_str(EXCHANGE, &order_info, "/status")? != "filled" {
            return Ok(BuyOrderResult::Pending {
                order_id: order_id.to_owned(),
            });
        }

        Ok(BuyOrderResult::Filled(self.completed_order_from(&order_info)?))
    }

    async fn cancel_buy_order(&self, order_id: &str) -> Result<(), ExchangeError> {
        self.client
            .api_call(
                Method::DELETE,
                "order",
                &[
                    ("market", self.trading_pair.clone()),
                    ("orderId", order_id.to_owned()),
                ],
                None,
            )
            .await?;

        Ok(())
    }
}

pub struct BitvavoWithdrawService {
    client: Arc<dyn BitvavoApi>,
}

impl BitvavoWithdrawService {
    pub fn new(client: Arc<dyn BitvavoApi>) -> Self {
        Self { client }
    }
}

impl SupportsExchange for BitvavoWithdrawService {
    fn supports_exchange(&self, exchange: &str) -> bool {
        exchange == EXCHANGE
    }
}

#[async_trait]
impl WithdrawService for BitvavoWithdrawService {
    async fn withdraw(
        &self,
        balance_to_withdraw: i64,
        address: &str,
    ) -> Result<CompletedWithdraw, ExchangeError> {
        let net_amount = balance_to_withdraw - self.get_withdraw_fee_in_satoshis().await?;
        self.client
            .api_call(
                Method::POST,
                "withdrawal",
                &[],
                Some(json!({
                    "symbol": "BTC",
                    "address": address,
                    "amount": satoshis_to_btc(net_amount),
                    "addWithdrawalFee": true,
                })),
            )
            .await?;

        // Bitvavo는 출금 ID를 주지 않아서 타임스탬프로 합성한다
        Ok(CompletedWithdraw {
            id: Utc::now().timestamp().to_string(),
            recipient_address: address.to_owned(),
            net_amount,
        })
    }

    async fn get_available_balance(&self) -> Result<i64, ExchangeError> {
        let response = self
            .client
            .api_call(
                Method::GET,
                "balance",
                &[("symbol", "BTC".to_owned())],
                None,
            )
            .await?;

        let Some(row) = response.get(0) else {
            return Ok(0);
        };
        if row.pointer("/symbol").and_then(Value::as_str) != Some("BTC") {
            return Ok(0);
        }

        let available = btc_to_satoshis(json_str(EXCHANGE, row, "/available")?)?;
        let in_order = btc_to_satoshis(json_str(EXCHANGE, row, "/inOrder")?)?;

        Ok(available - in_order)
    }

    async fn get_withdraw_fee_in_satoshis(&self) -> Result<i64, ExchangeError> {
        let response = self
            .client
            .api_call(
                Method::GET,
                "assets",
                &[("symbol", "BTC".to_owned())],
                None,
            )
            .await?;

        btc_to_satoshis(json_str(EXCHANGE, &response, "/withdrawalFee")?)
    }
}

pub struct BitvavoBalanceService {
    client: Arc<dyn BitvavoApi>,
}

impl BitvavoBalanceService {
    pub fn new(client: Arc<dyn BitvavoApi>) -> Self {
        Self { client }
    }
}

impl SupportsExchange for BitvavoBalanceService {
    fn supports_exchange(&self, exchange: &str) -> bool {
        exchange == EXCHANGE
    }
}

#[async_trait]
impl BalanceService for BitvavoBalanceService {
    async fn get_balances(&self) -> Result<Vec<WalletBalance>, ExchangeError> {
        let response = self
            .client
            .api_call(Method::GET, "balance", &[], None)
            .await?;

        let rows = response
            .as_array()
            .ok_or_else(|| ExchangeError::MalformedResponse {
                exchange: EXCHANGE,
                message: "balance response is not a list".to_owned(),
            })?;

        let mut balances = Vec::new();
        for row in rows {
            let symbol = json_str(EXCHANGE, row, "/symbol")?;
            let available: Decimal =
                json_str(EXCHANGE, row, "/available")?
                    .parse()
                    .map_err(|_| ExchangeError::MalformedResponse {
                        exchange: EXCHANGE,
                        message: "balance is not a decimal".to_owned(),
                    })?;
            let in_order: Decimal =
                json_str(EXCHANGE, row, "/inOrder")?
                    .parse()
                    .map_err(|_| ExchangeError::MalformedResponse {
                        exchange: EXCHANGE,
                        message: "balance is not a decimal".to_owned(),
                    })?;

            balances.push(WalletBalance {
                symbol: symbol.to_owned(),
                total: format!("{} {}", available, symbol),
                available: format!("{} {}", available - in_order, symbol),
            });
        }

        Ok(balances)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    type RecordedCall = (Method, String, Vec<(String, String)>, Option<Value>);

    struct StubBitvavoClient {
        calls: Mutex<Vec<RecordedCall>>,
        responses: Mutex<Vec<Value>>,
    }

    impl StubBitvavoClient {
        fn new(responses: Vec<Value>) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                responses: Mutex::new(responses),
            })
        }

        fn calls(&self) -> Vec<RecordedCall> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl BitvavoApi for StubBitvavoClient {
        async fn api_call(
            &self,
            method: Method,
            path: &str,
            query: &[(&str, String)],
            body: Option<Value>,
        ) -> Result<Value, ExchangeError> {
            self.calls.lock().unwrap().push((
                method,
                path.to_owned(),
                query
                    .iter()
                    .map(|(key, value)| ((*key).to_owned(), value.clone()))
                    .collect(),
                body,
            ));
            Ok(self.responses.lock().unwrap().remove(0))
        }
    }

    fn filled_order() -> Value {
        json!({
            "orderId": "95d92d6c-ecf0-4960-a608-9953ef71652e",
            "status": "filled",
            "filledAmount": "0.01000000",
            "filledAmountQuote": "100.00",
            "feePaid": "0.25",
            "feeCurrency": "EUR",
            "fills": [
                {"price": "10000", "amount": "0.01000000"}
            ]
        })
    }

    #[tokio::test]
    async fn market_buy_sends_quote_amount_as_json() {
        let client = StubBitvavoClient::new(vec![filled_order()]);
        let service = BitvavoBuyService::new(client.clone(), "EUR".to_owned());

        let BuyOrderResult::Filled(order) = service.initiate_buy(100).await.unwrap() else {
            panic!("expected filled order");
        };

        assert_eq!(order.amount_in_satoshis, 1_000_000);
        assert_eq!(order.fees_in_satoshis, 0);
        assert_eq!(order.display_fees_spent, "0.25 EUR");

        let (method, path, query, body) = &client.calls()[0];
        assert_eq!(*method, Method::POST);
        assert_eq!(path, "order");
        assert!(query.is_empty());
        assert_eq!(
            *body,
            Some(json!({
                "market": "BTC-EUR",
                "side": "buy",
                "orderType": "market",
                "amountQuote": "100",
            }))
        );
    }

    #[tokio::test]
    async fn unfilled_order_reports_pending() {
        let client = StubBitvavoClient::new(vec![json!({
            "orderId": "95d92d6c",
            "status": "new"
        })]);
        let service = BitvavoBuyService::new(client, "EUR".to_owned());

        assert!(matches!(
            service.initiate_buy(100).await.unwrap(),
            BuyOrderResult::Pending { order_id } if order_id == "95d92d6c"
        ));
    }

    #[tokio::test]
    async fn check_queries_order_by_id() {
        let client = StubBitvavoClient::new(vec![filled_order()]);
        let service = BitvavoBuyService::new(client.clone(), "EUR".to_owned());

        service.check_if_order_is_filled("95d92d6c").await.unwrap();

        let (method, path, query, body) = &client.calls()[0];
        assert_eq!(*method, Method::GET);
        assert_eq!(path, "order");
        assert_eq!(
            *query,
            vec![
                ("market".to_owned(), "BTC-EUR".to_owned()),
                ("orderId".to_owned(), "95d92d6c".to_owned()),
            ]
        );
        assert_eq!(*body, None);
    }

    #[tokio::test]
    async fn withdraw_subtracts_live_fee_and_synthesizes_id() {
        let assets = json!({"symbol": "BTC", "withdrawalFee": "0.0003"});
        let withdrawal = json!({"success": true});
        let client = StubBitvavoClient::new(vec![assets, withdrawal]);
        let service = BitvavoWithdrawService::new(client.clone());

        let completed = service.withdraw(300_000, "bc1qexample").await.unwrap();

        assert_eq!(completed.net_amount, 270_000);
        assert!(!completed.id.is_empty());

        let calls = client.calls();
        assert_eq!(calls[1].1, "withdrawal");
        assert_eq!(
            calls[1].3,
            Some(json!({
                "symbol": "BTC",
                "address": "bc1qexample",
                "amount": "0.00270000",
                "addWithdrawalFee": true,
            }))
        );
    }

    #[tokio::test]
    async fn available_balance_subtracts_in_order_amount() {
        let client = StubBitvavoClient::new(vec![json!([
            {"symbol": "BTC", "available": "0.00500000", "inOrder": "0.00100000"}
        ])]);
        let service = BitvavoWithdrawService::new(client);

        assert_eq!(service.get_available_balance().await.unwrap(), 400_000);
    }

    #[tokio::test]
    async fn missing_btc_balance_row_reads_as_zero() {
        let client = StubBitvavoClient::new(vec![json!([])]);
        let service = BitvavoWithdrawService::new(client);

        assert_eq!(service.get_available_balance().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn balances_show_available_and_free_columns() {
        let client = StubBitvavoClient::new(vec![json!([
            {"symbol": "BTC", "available": "0.005", "inOrder": "0.001"}
        ])]);
        let service = BitvavoBalanceService::new(client);

        let balances = service.get_balances().await.unwrap();
        assert_eq!(balances[0].symbol, "BTC");
        assert_eq!(balances[0].total, "0.005 BTC");
        assert_eq!(balances[0].available, "0.004 BTC");
    }
}
