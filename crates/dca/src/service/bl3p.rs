use std::sync::Arc;

use async_trait::async_trait;

use exchanges::Bl3pApi;
use interface::{
    BuyOrderResult, CompletedBuyOrder, CompletedWithdraw, ExchangeError, WalletBalance,
};

use crate::service::{
    json_id, json_int, json_str, BalanceService, BuyService, SupportsExchange, WithdrawService,
};

const EXCHANGE: &str = "bl3p";

/// BL3P 고정 출금 수수료 (사토시)
pub const WITHDRAW_FEE_IN_SATOSHIS: i64 = 30_000;

/// BL3P 시장가 매수. 주문 직후 결과 조회로 상태를 확인하므로 보통
/// 동기적으로 체결된다.
pub struct Bl3pBuyService {
    client: Arc<dyn Bl3pApi>,
    base_currency: String,
    trading_pair: String,
}

impl Bl3pBuyService {
    pub fn new(client: Arc<dyn Bl3pApi>, base_currency: String) -> Self {
        let trading_pair = format!("BTC{}", base_currency);
        Self {
            client,
            base_currency,
            trading_pair,
        }
    }
}

impl SupportsExchange for Bl3pBuyService {
    fn supports_exchange(&self, exchange: &str) -> bool {
        exchange == EXCHANGE
    }
}

#[async_trait]
impl BuyService for Bl3pBuyService {
    async fn initiate_buy(&self, amount: u64) -> Result<BuyOrderResult, ExchangeError> {
        // amount_funds_int는 1e-5 법정화폐 단위
        let data = self
            .client
            .api_call(
                &format!("{}/money/order/add", self.trading_pair),
                &[
                    ("type", "bid".to_owned()),
                    ("amount_funds_int", (amount * 100_000).to_string()),
                    ("fee_currency", "BTC".to_owned()),
                ],
            )
            .await?;

        let order_id = json_id(EXCHANGE, &data, "/order_id")?;
        self.check_if_order_is_filled(&order_id).await
    }

    async fn check_if_order_is_filled(
        &self,
        order_id: &str,
    ) -> Result<BuyOrderResult, ExchangeError> {
        let data = self
            .client
            .api_call(
                &format!("{}/money/order/result", self.trading_pair),
                &[("order_id", order_id.to_owned())],
            )
            .await?;

        if json_str(EXCHANGE, &data, "/status")? != "closed" {
            return Ok(BuyOrderResult::Pending {
                order_id: order_id.to_owned(),
            });
        }

        let fee_is_btc = json_str(EXCHANGE, &data, "/total_fee/currency")? == "BTC";

        Ok(BuyOrderResult::Filled(CompletedBuyOrder {
            amount_in_satoshis: json_int(EXCHANGE, &data, "/total_amount/value_int")?,
            fees_in_satoshis: if fee_is_btc {
                json_int(EXCHANGE, &data, "/total_fee/value_int")?
            } else {
                0
            },
            purchase_made_at: chrono::Utc::now(),
            display_amount_bought: json_str(EXCHANGE, &data, "/total_amount/display")?.to_owned(),
            display_amount_spent: json_str(EXCHANGE, &data, "/total_spent/display_short")?
                .to_owned(),
            display_amount_spent_currency: self.base_currency.clone(),
            display_average_price: json_str(EXCHANGE, &data, "/avg_cost/display_short")?.to_owned(),
            display_fees_spent: json_str(EXCHANGE, &data, "/total_fee/display")?.to_owned(),
        }))
    }

    async fn cancel_buy_order(&self, order_id: &str) -> Result<(), ExchangeError> {
        self.client
            .api_call(
                &format!("{}/money/order/cancel", self.trading_pair),
                &[("order_id", order_id.to_owned())],
            )
            .await?;

        Ok(())
    }
}

pub struct Bl3pWithdrawService {
    client: Arc<dyn Bl3pApi>,
}

impl Bl3pWithdrawService {
    pub fn new(client: Arc<dyn Bl3pApi>) -> Self {
        Self { client }
    }
}

impl SupportsExchange for Bl3pWithdrawService {
    fn supports_exchange(&self, exchange: &str) -> bool {
        exchange == EXCHANGE
    }
}

#[async_trait]
impl WithdrawService for Bl3pWithdrawService {
    async fn withdraw(
        &self,
        balance_to_withdraw: i64,
        address: &str,
    ) -> Result<CompletedWithdraw, ExchangeError> {
        let net_amount = balance_to_withdraw - self.get_withdraw_fee_in_satoshis().await?;
        let data = self
            .client
            .api_call(
                "GENMKT/money/withdraw",
                &[
                    ("currency", "BTC".to_owned()),
                    ("address", address.to_owned()),
                    ("amount_int", net_amount.to_string()),
                ],
            )
            .await?;

        Ok(CompletedWithdraw {
            id: json_id(EXCHANGE, &data, "/id")?,
            recipient_address: address.to_owned(),
            net_amount,
        })
    }

    async fn get_available_balance(&self) -> Result<i64, ExchangeError> {
        let data = self.client.api_call("GENMKT/money/info", &[]).await?;

        Ok(json_int(EXCHANGE, &data, "/wallets/BTC/available/value_int").unwrap_or(0))
    }

    async fn get_withdraw_fee_in_satoshis(&self) -> Result<i64, ExchangeError> {
        Ok(WITHDRAW_FEE_IN_SATOSHIS)
    }
}

pub struct Bl3pBalanceService {
    client: Arc<dyn Bl3pApi>,
}

impl Bl3pBalanceService {
    pub fn new(client: Arc<dyn Bl3pApi>) -> Self {
        Self { client }
    }
}

impl SupportsExchange for Bl3pBalanceService {
    fn supports_exchange(&self, exchange: &str) -> bool {
        exchange == EXCHANGE
    }
}

#[async_trait]
impl BalanceService for Bl3pBalanceService {
    async fn get_balances(&self) -> Result<Vec<WalletBalance>, ExchangeError> {
        let data = self.client.api_call("GENMKT/money/info", &[]).await?;

        let wallets = data
            .pointer("/wallets")
            .and_then(|wallets| wallets.as_object())
            .ok_or_else(|| ExchangeError::MalformedResponse {
                exchange: EXCHANGE,
                message: "missing wallets object".to_owned(),
            })?;

        let mut rows = Vec::new();
        for (currency, wallet) in wallets {
            // 잔고가 정확히 0인 지갑은 숨긴다
            if json_int(EXCHANGE, wallet, "/balance/value_int").unwrap_or(0) == 0 {
                continue;
            }

            rows.push(WalletBalance {
                symbol: currency.clone(),
                total: json_str(EXCHANGE, wallet, "/balance/display")?.to_owned(),
                available: json_str(EXCHANGE, wallet, "/available/display")?.to_owned(),
            });
        }

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::sync::Mutex;

    /// 호출을 기록하고 준비된 응답을 차례로 돌려주는 스텁 클라이언트
    struct StubBl3pClient {
        calls: Mutex<Vec<(String, Vec<(String, String)>)>>,
        responses: Mutex<Vec<Value>>,
    }

    impl StubBl3pClient {
        fn new(responses: Vec<Value>) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                responses: Mutex::new(responses),
            })
        }

        fn calls(&self) -> Vec<(String, Vec<(String, String)>)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Bl3pApi for StubBl3pClient {
        async fn api_call(
            &self,
            path: &str,
            parameters: &[(&str, String)],
        ) -> Result<Value, ExchangeError> {
            self.calls.lock().unwrap().push((
                path.to_owned(),
                parameters
                    .iter()
                    .map(|(key, value)| ((*key).to_owned(), value.clone()))
                    .collect(),
            ));
            Ok(self.responses.lock().unwrap().remove(0))
        }
    }

    fn closed_order() -> Value {
        json!({
            "status": "closed",
            "total_amount": {"value_int": "1234567", "display": "0.01234567 BTC"},
            "total_fee": {"currency": "BTC", "value_int": "2500", "display": "0.00002500 BTC"},
            "total_spent": {"display_short": "100.00 EUR"},
            "avg_cost": {"display_short": "8100.00 EUR"}
        })
    }

    #[tokio::test]
    async fn buy_places_bid_and_reads_closed_order() {
        let client = StubBl3pClient::new(vec![json!({"order_id": 4321}), closed_order()]);
        let service = Bl3pBuyService::new(client.clone(), "EUR".to_owned());

        let result = service.initiate_buy(100).await.unwrap();

        let BuyOrderResult::Filled(order) = result else {
            panic!("expected filled order");
        };
        assert_eq!(order.amount_in_satoshis, 1_234_567);
        assert_eq!(order.fees_in_satoshis, 2_500);
        assert_eq!(order.display_amount_spent, "100.00 EUR");
        assert_eq!(order.display_amount_spent_currency, "EUR");

        let calls = client.calls();
        assert_eq!(calls[0].0, "BTCEUR/money/order/add");
        assert!(calls[0].1.contains(&("amount_funds_int".to_owned(), "10000000".to_owned())));
        assert!(calls[0].1.contains(&("fee_currency".to_owned(), "BTC".to_owned())));
        assert_eq!(calls[1].0, "BTCEUR/money/order/result");
        assert_eq!(calls[1].1, vec![("order_id".to_owned(), "4321".to_owned())]);
    }

    #[tokio::test]
    async fn open_order_reports_pending_with_same_id() {
        let client = StubBl3pClient::new(vec![json!({"status": "open"})]);
        let service = Bl3pBuyService::new(client, "EUR".to_owned());

        let result = service.check_if_order_is_filled("4321").await.unwrap();
        assert!(matches!(
            result,
            BuyOrderResult::Pending { order_id } if order_id == "4321"
        ));
    }

    #[tokio::test]
    async fn non_btc_fee_is_not_credited_as_satoshis() {
        let mut order = closed_order();
        order["total_fee"] = json!({"currency": "EUR", "value_int": "25", "display": "0.25 EUR"});
        let client = StubBl3pClient::new(vec![order]);
        let service = Bl3pBuyService::new(client, "EUR".to_owned());

        let BuyOrderResult::Filled(order) = service.check_if_order_is_filled("4321").await.unwrap()
        else {
            panic!("expected filled order");
        };
        assert_eq!(order.fees_in_satoshis, 0);
        assert_eq!(order.display_fees_spent, "0.25 EUR");
    }

    #[tokio::test]
    async fn withdraw_sends_net_amount_after_fixed_fee() {
        let client = StubBl3pClient::new(vec![json!({"id": 777})]);
        let service = Bl3pWithdrawService::new(client.clone());

        let completed = service.withdraw(300_000, "bc1qexample").await.unwrap();

        assert_eq!(completed.net_amount, 270_000);
        assert_eq!(completed.id, "777");

        let calls = client.calls();
        assert_eq!(calls[0].0, "GENMKT/money/withdraw");
        assert!(calls[0].1.contains(&("amount_int".to_owned(), "270000".to_owned())));
    }

    #[tokio::test]
    async fn available_balance_defaults_to_zero_when_wallet_missing() {
        let client = StubBl3pClient::new(vec![json!({"wallets": {}})]);
        let service = Bl3pWithdrawService::new(client);

        assert_eq!(service.get_available_balance().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn balances_hide_zero_wallets() {
        let client = StubBl3pClient::new(vec![json!({
            "wallets": {
                "BTC": {
                    "balance": {"value_int": "1234567", "display": "0.01234567 BTC"},
                    "available": {"value_int": "1234567", "display": "0.01234567 BTC"}
                },
                "EUR": {
                    "balance": {"value_int": "0", "display": "0.00 EUR"},
                    "available": {"value_int": "0", "display": "0.00 EUR"}
                }
            }
        })]);
        let service = Bl3pBalanceService::new(client);

        let balances = service.get_balances().await.unwrap();
        assert_eq!(balances.len(), 1);
        assert_eq!(balances[0].symbol, "BTC");
        assert_eq!(balances[0].total, "0.01234567 BTC");
    }
}
