use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use rust_decimal::{Decimal, RoundingStrategy};

use exchanges::KrakenApi;
use interface::{
    btc_to_satoshis, satoshis_to_btc, BuyOrderResult, CompletedBuyOrder, CompletedWithdraw,
    ExchangeError, WalletBalance, BITCOIN_DECIMALS,
};
use serde_json::Value;

use crate::service::{json_str, BalanceService, BuyService, SupportsExchange, WithdrawService};

const EXCHANGE: &str = "kraken";

/// Kraken 내부 BTC 자산 코드
const ASSET_NAME: &str = "XXBT";

/// Kraken 시장가 매수. 주문 추적은 32비트 userref로 하고,
/// 체결 내역은 최근 거래 히스토리에서 주문 ID로 찾는다.
pub struct KrakenBuyService {
    client: Arc<dyn KrakenApi>,
    base_currency: String,
    trading_pair: String,
    user_refs: Mutex<HashMap<String, String>>,
}

impl KrakenBuyService {
    pub fn new(client: Arc<dyn KrakenApi>, base_currency: String) -> Self {
        let trading_pair = format!("XBT{}", base_currency);
        Self {
            client,
            base_currency,
            trading_pair,
            user_refs: Mutex::new(HashMap::new()),
        }
    }

    async fn current_price(&self) -> Result<Decimal, ExchangeError> {
        let ticker = self
            .client
            .query_public("Ticker", &[("pair", self.trading_pair.clone())])
            .await?;

        // 응답 키는 요청한 페어의 내부 표기라 첫 항목을 쓴다
        let first = ticker
            .as_object()
            .and_then(|pairs| pairs.values().next())
            .ok_or_else(|| ExchangeError::MalformedResponse {
                exchange: EXCHANGE,
                message: "ticker response carries no pairs".to_owned(),
            })?;

        json_str(EXCHANGE, first, "/a/0")?
            .parse()
            .map_err(|_| ExchangeError::MalformedResponse {
                exchange: EXCHANGE,
                message: "ask price is not a decimal".to_owned(),
            })
    }

    async fn completed_buy_order(&self, order_id: &str) -> Result<CompletedBuyOrder, ExchangeError> {
        let start = (Utc::now().timestamp() - 900).to_string();
        let history = self
            .client
            .query_private("TradesHistory", &[("start", start)])
            .await?;

        let trades = history
            .pointer("/trades")
            .and_then(Value::as_object)
            .ok_or_else(|| ExchangeError::MalformedResponse {
                exchange: EXCHANGE,
                message: "trades history carries no trades".to_owned(),
            })?;

        let order_info = trades
            .values()
            .find(|trade| {
                trade.pointer("/ordertxid").and_then(Value::as_str) == Some(order_id)
            })
            .ok_or_else(|| ExchangeError::Api {
                exchange: EXCHANGE,
                code: None,
                message: "no open orders left yet order was not found, you should investigate this"
                    .to_owned(),
            })?;

        let volume = json_str(EXCHANGE, order_info, "/vol")?;

        Ok(CompletedBuyOrder {
            amount_in_satoshis: btc_to_satoshis(volume)?,
            // Kraken은 수수료를 항상 호가 통화로 청구한다 (fciq)
            fees_in_satoshis: 0,
            purchase_made_at: Utc::now(),
            display_amount_bought: format!("{} BTC", volume),
            display_amount_spent: format!(
                "{} {}",
                json_str(EXCHANGE, order_info, "/cost")?,
                self.base_currency
            ),
            display_amount_spent_currency: self.base_currency.clone(),
            display_average_price: format!(
                "{} {}",
                json_str(EXCHANGE, order_info, "/price")?,
                self.base_currency
            ),
            display_fees_spent: format!(
                "{} {}",
                json_str(EXCHANGE, order_info, "/fee")?,
                self.base_currency
            ),
        })
    }
}

impl SupportsExchange for KrakenBuyService {
    fn supports_exchange(&self, exchange: &str) -> bool {
        exchange == EXCHANGE
    }
}

#[async_trait]
impl BuyService for KrakenBuyService {
    async fn initiate_buy(&self, amount: u64) -> Result<BuyOrderResult, ExchangeError> {
        // 이 주문을 추적할 32비트 양수 userref
        let user_ref = rand::thread_rng().gen_range(0..=i32::MAX).to_string();

        let price = self.current_price().await?;
        if price <= Decimal::ZERO {
            return Err(ExchangeError::MalformedResponse {
                exchange: EXCHANGE,
                message: "ticker returned a non-positive price".to_owned(),
            });
        }
        let volume = (Decimal::from(amount) / price)
            .round_dp_with_strategy(BITCOIN_DECIMALS, RoundingStrategy::ToZero)
            .normalize();

        let added = self
            .client
            .query_private(
                "AddOrder",
                &[
                    ("pair", self.trading_pair.clone()),
                    ("type", "buy".to_owned()),
                    ("ordertype", "market".to_owned()),
                    ("volume", volume.to_string()),
                    // 수수료는 호가 통화로
                    ("oflags", "fciq".to_owned()),
                    ("userref", user_ref.clone()),
                ],
            )
            .await?;

        let order_id = json_str(EXCHANGE, &added, "/txid/0")?.to_owned();
        self.user_refs
            .lock()
            .map_err(|_| ExchangeError::Other("user ref table is poisoned".to_owned()))?
            .insert(order_id.clone(), user_ref);

        self.check_if_order_is_filled(&order_id).await
    }

    async fn check_if_order_is_filled(
        &self,
        order_id: &str,
    ) -> Result<BuyOrderResult, ExchangeError> {
        let user_ref = self
            .user_refs
            .lock()
            .map_err(|_| ExchangeError::Other("user ref table is poisoned".to_owned()))?
            .get(order_id)
            .cloned();

        let mut arguments = Vec::new();
        if let Some(user_ref) = user_ref {
            arguments.push(("userref", user_ref));
        }

        let open_orders = self.client.query_private("OpenOrders", &arguments).await?;
        let still_open = open_orders
            .pointer("/open")
            .and_then(Value::as_object)
            .map(|open| !open.is_empty())
            .unwrap_or(false);

        if still_open {
            return Ok(BuyOrderResult::Pending {
                order_id: order_id.to_owned(),
            });
        }

        Ok(BuyOrderResult::Filled(
            self.completed_buy_order(order_id).await?,
        ))
    }

    async fn cancel_buy_order(&self, order_id: &str) -> Result<(), ExchangeError> {
        self.client
            .query_private("CancelOrder", &[("txid", order_id.to_owned())])
            .await?;

        Ok(())
    }
}

pub struct KrakenWithdrawService {
    client: Arc<dyn KrakenApi>,
    withdraw_key: Option<String>,
}

impl KrakenWithdrawService {
    /// withdraw_key는 Kraken 웹에서 미리 등록한 출금 주소의 이름
    pub fn new(client: Arc<dyn KrakenApi>, withdraw_key: Option<String>) -> Self {
        Self {
            client,
            withdraw_key,
        }
    }

    fn require_withdraw_key(&self) -> Result<&str, ExchangeError> {
        self.withdraw_key.as_deref().ok_or_else(|| {
            ExchangeError::Other("no Kraken withdraw key configured".to_owned())
        })
    }
}

impl SupportsExchange for KrakenWithdrawService {
    fn supports_exchange(&self, exchange: &str) -> bool {
        exchange == EXCHANGE
    }
}

#[async_trait]
impl WithdrawService for KrakenWithdrawService {
    async fn withdraw(
        &self,
        balance_to_withdraw: i64,
        address: &str,
    ) -> Result<CompletedWithdraw, ExchangeError> {
        let net_amount = balance_to_withdraw - self.get_withdraw_fee_in_satoshis().await?;
        let response = self
            .client
            .query_private(
                "Withdraw",
                &[
                    ("asset", ASSET_NAME.to_owned()),
                    ("key", self.require_withdraw_key()?.to_owned()),
                    ("amount", satoshis_to_btc(net_amount)),
                ],
            )
            .await?;

        Ok(CompletedWithdraw {
            id: json_str(EXCHANGE, &response, "/refid")?.to_owned(),
            recipient_address: address.to_owned(),
            net_amount,
        })
    }

    async fn get_available_balance(&self) -> Result<i64, ExchangeError> {
        let response = match self.client.query_private("Balance", &[]).await {
            Ok(response) => response,
            // 빈 계정은 오류로 오기도 한다
            Err(ExchangeError::Api { .. }) => return Ok(0),
            Err(e) => return Err(e),
        };

        match response.pointer(&format!("/{}", ASSET_NAME)).and_then(Value::as_str) {
            Some(amount) => btc_to_satoshis(amount),
            None => Ok(0),
        }
    }

    async fn get_withdraw_fee_in_satoshis(&self) -> Result<i64, ExchangeError> {
        let available = self.get_available_balance().await?;
        let response = self
            .client
            .query_private(
                "WithdrawInfo",
                &[
                    ("asset", ASSET_NAME.to_owned()),
                    ("key", self.require_withdraw_key()?.to_owned()),
                    ("amount", satoshis_to_btc(available)),
                ],
            )
            .await?;

        btc_to_satoshis(json_str(EXCHANGE, &response, "/fee")?)
    }
}

pub struct KrakenBalanceService {
    client: Arc<dyn KrakenApi>,
}

impl KrakenBalanceService {
    pub fn new(client: Arc<dyn KrakenApi>) -> Self {
        Self { client }
    }
}

impl SupportsExchange for KrakenBalanceService {
    fn supports_exchange(&self, exchange: &str) -> bool {
        exchange == EXCHANGE
    }
}

#[async_trait]
impl BalanceService for KrakenBalanceService {
    async fn get_balances(&self) -> Result<Vec<WalletBalance>, ExchangeError> {
        let response = self.client.query_private("Balance", &[]).await?;

        let assets = response
            .as_object()
            .ok_or_else(|| ExchangeError::MalformedResponse {
                exchange: EXCHANGE,
                message: "balance response is not an object".to_owned(),
            })?;

        let mut rows = Vec::new();
        for (symbol, amount) in assets {
            let amount = amount.as_str().unwrap_or_default();
            rows.push(WalletBalance {
                symbol: symbol.clone(),
                total: format!("{} {}", amount, symbol),
                available: format!("{} {}", amount, symbol),
            });
        }

        Ok(rows)
    }
}
