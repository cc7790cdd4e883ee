use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use rust_decimal::Decimal;
use serde_json::Value;

use exchanges::{BinanceApi, SecurityType};
use interface::{
    btc_to_satoshis, BuyOrderResult, CompletedBuyOrder, CompletedWithdraw, ExchangeError,
    WalletBalance,
};

use crate::service::{
    json_id, json_str, sum_fill_commissions, weighted_average_price, BalanceService, BuyService,
    Fill, SupportsExchange, WithdrawService,
};

const EXCHANGE: &str = "binance";
const ORDER_PATH: &str = "/api/v3/order";

pub struct BinanceBuyService {
    client: Arc<dyn BinanceApi>,
    base_currency: String,
    trading_pair: String,
}

impl BinanceBuyService {
    pub fn new(client: Arc<dyn BinanceApi>, base_currency: String) -> Self {
        let trading_pair = format!("BTC{}", base_currency);
        Self {
            client,
            base_currency,
            trading_pair,
        }
    }

    /// 주문 응답과 체결 목록으로 정규화된 매수 결과를 만든다
    fn completed_order_from(
        &self,
        order_info: &Value,
        fills: &Value,
    ) -> Result<CompletedBuyOrder, ExchangeError> {
        let executed_qty = json_str(EXCHANGE, order_info, "/executedQty")?;
        let quote_qty = json_str(EXCHANGE, order_info, "/cummulativeQuoteQty")?;
        let amount_in_satoshis = btc_to_satoshis(executed_qty)?;

        let fill_list = fills
            .as_array()
            .ok_or_else(|| ExchangeError::MalformedResponse {
                exchange: EXCHANGE,
                message: "order fills are not a list".to_owned(),
            })?;

        let mut weighted = Vec::with_capacity(fill_list.len());
        let mut commissions = Vec::with_capacity(fill_list.len());
        for fill in fill_list {
            let price: Decimal = json_str(EXCHANGE, fill, "/price")?
                .parse()
                .map_err(|_| ExchangeError::MalformedResponse {
                    exchange: EXCHANGE,
                    message: "fill price is not a decimal".to_owned(),
                })?;
            let commission: Decimal = json_str(EXCHANGE, fill, "/commission")?
                .parse()
                .map_err(|_| ExchangeError::MalformedResponse {
                    exchange: EXCHANGE,
                    message: "fill commission is not a decimal".to_owned(),
                })?;

            weighted.push(Fill {
                price,
                filled_satoshis: btc_to_satoshis(json_str(EXCHANGE, fill, "/qty")?)?,
            });
            commissions.push((
                commission,
                json_str(EXCHANGE, fill, "/commissionAsset")?.to_owned(),
            ));
        }

        let (fee_total, fee_currency) = sum_fill_commissions(EXCHANGE, &commissions)?;
        let fee_currency = fee_currency.unwrap_or_default();
        let average_price =
            weighted_average_price(&weighted, amount_in_satoshis).unwrap_or(Decimal::ZERO);

        Ok(CompletedBuyOrder {
            amount_in_satoshis,
            fees_in_satoshis: if fee_currency == "BTC" {
                btc_to_satoshis(&fee_total.to_string())?
            } else {
                0
            },
            purchase_made_at: chrono::Utc::now(),
            display_amount_bought: format!("{} BTC", executed_qty),
            display_amount_spent: format!("{} {}", quote_qty, self.base_currency),
            display_amount_spent_currency: self.base_currency.clone(),
            display_average_price: format!("{} {}", average_price, self.base_currency),
            display_fees_spent: format!("{} {}", fee_total, fee_currency),
        })
    }
}

impl SupportsExchange for BinanceBuyService {
    fn supports_exchange(&self, exchange: &str) -> bool {
        exchange == EXCHANGE
    }
}

#[async_trait]
impl BuyService for BinanceBuyService {
    async fn initiate_buy(&self, amount: u64) -> Result<BuyOrderResult, ExchangeError> {
        let response = self
            .client
            .request(
                Method::POST,
                ORDER_PATH,
                SecurityType::Trade,
                &[
                    ("symbol", self.trading_pair.clone()),
                    ("side", "BUY".to_owned()),
                    ("type", "MARKET".to_owned()),
                    ("quoteOrderQty", amount.to_string()),
                    ("newOrderRespType", "FULL".to_owned()),
                ],
            )
            .await?;

        if json_str(EXCHANGE, &response, "/status")? != "FILLED" {
            return Ok(BuyOrderResult::Pending {
                order_id: json_id(EXCHANGE, &response, "/orderId")?,
            });
        }

        let fills = response.pointer("/fills").cloned().unwrap_or(Value::Null);
        Ok(BuyOrderResult::Filled(
            self.completed_order_from(&response, &fills)?,
        ))
    }

    async fn check_if_order_is_filled(
        &self,
        order_id: &str,
    ) -> Result<BuyOrderResult, ExchangeError> {
        let response = self
            .client
            .request(
                Method::GET,
                ORDER_PATH,
                SecurityType::Trade,
                &[
                    ("symbol", self.trading_pair.clone()),
                    ("orderId", order_id.to_owned()),
                ],
            )
            .await?;

        if json_str(EXCHANGE, &response, "/status")? != "FILLED" {
            return Ok(BuyOrderResult::Pending {
                order_id: order_id.to_owned(),
            });
        }

        // 주문 상태 응답에는 체결 내역이 없어서 따로 조회한다
        let fills = self
            .client
            .request(
                Method::GET,
                "/api/v3/myTrades",
                SecurityType::UserData,
                &[
                    ("symbol", self.trading_pair.clone()),
                    ("startTime", json_id(EXCHANGE, &response, "/time")?),
                ],
            )
            .await?;

        Ok(BuyOrderResult::Filled(
            self.completed_order_from(&response, &fills)?,
        ))
    }

    async fn cancel_buy_order(&self, order_id: &str) -> Result<(), ExchangeError> {
        self.client
            .request(
                Method::DELETE,
                ORDER_PATH,
                SecurityType::Trade,
                &[
                    ("symbol", self.trading_pair.clone()),
                    ("orderId", order_id.to_owned()),
                ],
            )
            .await?;

        Ok(())
    }
}

pub struct BinanceWithdrawService {
    client: Arc<dyn BinanceApi>,
}

impl BinanceWithdrawService {
    pub fn new(client: Arc<dyn BinanceApi>) -> Self {
        Self { client }
    }
}

impl SupportsExchange for BinanceWithdrawService {
    fn supports_exchange(&self, exchange: &str) -> bool {
        exchange == EXCHANGE
    }
}

#[async_trait]
impl WithdrawService for BinanceWithdrawService {
    async fn withdraw(
        &self,
        balance_to_withdraw: i64,
        address: &str,
    ) -> Result<CompletedWithdraw, ExchangeError> {
        let net_amount = balance_to_withdraw - self.get_withdraw_fee_in_satoshis().await?;
        let response = self
            .client
            .request(
                Method::POST,
                "/sapi/v1/capital/withdraw/apply",
                SecurityType::UserData,
                &[
                    ("coin", "BTC".to_owned()),
                    ("address", address.to_owned()),
                    ("amount", interface::satoshis_to_btc(net_amount)),
                ],
            )
            .await?;

        Ok(CompletedWithdraw {
            id: json_id(EXCHANGE, &response, "/id")?,
            recipient_address: address.to_owned(),
            net_amount,
        })
    }

    async fn get_available_balance(&self) -> Result<i64, ExchangeError> {
        let response = self
            .client
            .request(Method::GET, "/api/v3/account", SecurityType::UserData, &[])
            .await?;

        let Some(balances) = response.pointer("/balances").and_then(Value::as_array) else {
            return Ok(0);
        };

        for balance in balances {
            if balance.pointer("/asset").and_then(Value::as_str) == Some("BTC") {
                return btc_to_satoshis(json_str(EXCHANGE, balance, "/free")?);
            }
        }

        Ok(0)
    }

    async fn get_withdraw_fee_in_satoshis(&self) -> Result<i64, ExchangeError> {
        let response = self
            .client
            .request(
                Method::GET,
                "/sapi/v1/asset/assetDetail",
                SecurityType::UserData,
                &[],
            )
            .await?;

        let details = response
            .pointer("/BTC")
            .ok_or_else(|| ExchangeError::Api {
                exchange: EXCHANGE,
                code: None,
                message: "BTC asset appears to be unknown on Binance".to_owned(),
            })?;

        if details.pointer("/withdrawStatus").and_then(Value::as_bool) != Some(true) {
            return Err(ExchangeError::Api {
                exchange: EXCHANGE,
                code: None,
                message: "withdrawal for BTC is disabled on Binance".to_owned(),
            });
        }

        btc_to_satoshis(json_str(EXCHANGE, details, "/withdrawFee")?)
    }
}

pub struct BinanceBalanceService {
    client: Arc<dyn BinanceApi>,
}

impl BinanceBalanceService {
    pub fn new(client: Arc<dyn BinanceApi>) -> Self {
        Self { client }
    }
}

impl SupportsExchange for BinanceBalanceService {
    fn supports_exchange(&self, exchange: &str) -> bool {
        exchange == EXCHANGE
    }
}

#[async_trait]
impl BalanceService for BinanceBalanceService {
    async fn get_balances(&self) -> Result<Vec<WalletBalance>, ExchangeError> {
        let response = self
            .client
            .request(Method::GET, "/api/v3/account", SecurityType::UserData, &[])
            .await?;

        let balances = response
            .pointer("/balances")
            .and_then(Value::as_array)
            .ok_or_else(|| ExchangeError::MalformedResponse {
                exchange: EXCHANGE,
                message: "missing balances list".to_owned(),
            })?;

        let mut rows = Vec::new();
        for asset in balances {
            let free: Decimal = json_str(EXCHANGE, asset, "/free")?.parse().map_err(|_| {
                ExchangeError::MalformedResponse {
                    exchange: EXCHANGE,
                    message: "balance is not a decimal".to_owned(),
                }
            })?;
            let locked: Decimal = json_str(EXCHANGE, asset, "/locked")?.parse().map_err(|_| {
                ExchangeError::MalformedResponse {
                    exchange: EXCHANGE,
                    message: "balance is not a decimal".to_owned(),
                }
            })?;

            // 잔고 없는 잡코인 수백 개는 숨긴다
            if free <= Decimal::ZERO {
                continue;
            }

            rows.push(WalletBalance {
                symbol: json_str(EXCHANGE, asset, "/asset")?.to_owned(),
                total: (free + locked).to_string(),
                available: free.to_string(),
            });
        }

        Ok(rows)
    }
}
