use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use rust_decimal::{Decimal, RoundingStrategy};

use interface::{
    btc_to_satoshis, BuyOrderResult, CompletedBuyOrder, CompletedWithdraw, ExchangeError,
    BITCOIN_DECIMALS,
};

use crate::service::{BuyService, SupportsExchange, WithdrawService};

/// 네트워크 없이 통합 시나리오를 돌리기 위한 모의 매수 서비스.
/// 실거래소와 같은 사토시/수수료 산술을 수행하므로 테스트 대역으로
/// 유효하다. 픽스처는 setter로 주입한다.
pub struct MockExchangeBuyService {
    enabled: bool,
    base_currency: String,
    bitcoin_price: i64,
    fee_amount: String,
    fee_currency: String,
}

impl MockExchangeBuyService {
    pub fn new(enabled: bool, base_currency: String) -> Self {
        let mut rng = rand::thread_rng();
        Self {
            enabled,
            base_currency,
            bitcoin_price: rng.gen_range(10_000..=50_000),
            fee_amount: interface::satoshis_to_btc(rng.gen_range(100..=200)),
            fee_currency: "BTC".to_owned(),
        }
    }

    pub fn set_bitcoin_price(&mut self, bitcoin_price: i64) -> &mut Self {
        self.bitcoin_price = bitcoin_price;
        self
    }

    pub fn set_fee_amount(&mut self, fee_amount: String) -> &mut Self {
        self.fee_amount = fee_amount;
        self
    }

    pub fn set_fee_currency(&mut self, fee_currency: String) -> &mut Self {
        self.fee_currency = fee_currency;
        self
    }
}

impl SupportsExchange for MockExchangeBuyService {
    fn supports_exchange(&self, _exchange: &str) -> bool {
        self.enabled
    }
}

#[async_trait]
impl BuyService for MockExchangeBuyService {
    async fn initiate_buy(&self, amount: u64) -> Result<BuyOrderResult, ExchangeError> {
        let bitcoin_bought = (Decimal::from(amount) / Decimal::from(self.bitcoin_price))
            .round_dp_with_strategy(BITCOIN_DECIMALS, RoundingStrategy::ToZero);

        Ok(BuyOrderResult::Filled(CompletedBuyOrder {
            amount_in_satoshis: btc_to_satoshis(&bitcoin_bought.to_string())?,
            fees_in_satoshis: if self.fee_currency == "BTC" {
                btc_to_satoshis(&self.fee_amount)?
            } else {
                0
            },
            purchase_made_at: Utc::now(),
            display_amount_bought: format!("{} BTC", bitcoin_bought),
            display_amount_spent: amount.to_string(),
            display_amount_spent_currency: self.base_currency.clone(),
            display_average_price: format!("{} {}", self.bitcoin_price, self.base_currency),
            display_fees_spent: format!("{} {}", self.fee_amount, self.fee_currency),
        }))
    }

    async fn check_if_order_is_filled(
        &self,
        _order_id: &str,
    ) -> Result<BuyOrderResult, ExchangeError> {
        // 모의 주문은 항상 동기 체결이라 재확인할 주문이 없다
        Err(ExchangeError::Other(
            "mock exchange does not track pending orders".to_owned(),
        ))
    }

    async fn cancel_buy_order(&self, _order_id: &str) -> Result<(), ExchangeError> {
        Ok(())
    }
}

/// 모의 출금 서비스. 출금 호출이 자체 잔고를 바꾸지 않는다.
pub struct MockExchangeWithdrawService {
    enabled: bool,
    available_balance: i64,
    withdraw_fee_in_satoshis: i64,
}

impl MockExchangeWithdrawService {
    pub fn new(enabled: bool) -> Self {
        let mut rng = rand::thread_rng();
        Self {
            enabled,
            available_balance: rng.gen_range(100_000..=500_000),
            withdraw_fee_in_satoshis: rng.gen_range(30_000..=50_000),
        }
    }

    pub fn set_available_balance(&mut self, available_balance: i64) -> &mut Self {
        self.available_balance = available_balance;
        self
    }

    pub fn set_withdraw_fee_in_satoshis(&mut self, withdraw_fee_in_satoshis: i64) -> &mut Self {
        self.withdraw_fee_in_satoshis = withdraw_fee_in_satoshis;
        self
    }
}

impl SupportsExchange for MockExchangeWithdrawService {
    fn supports_exchange(&self, _exchange: &str) -> bool {
        self.enabled
    }
}

#[async_trait]
impl WithdrawService for MockExchangeWithdrawService {
    async fn withdraw(
        &self,
        balance_to_withdraw: i64,
        address: &str,
    ) -> Result<CompletedWithdraw, ExchangeError> {
        Ok(CompletedWithdraw {
            id: format!("MOCK_{}", Utc::now().timestamp()),
            recipient_address: address.to_owned(),
            net_amount: balance_to_withdraw - self.withdraw_fee_in_satoshis,
        })
    }

    async fn get_available_balance(&self) -> Result<i64, ExchangeError> {
        Ok(self.available_balance)
    }

    async fn get_withdraw_fee_in_satoshis(&self) -> Result<i64, ExchangeError> {
        Ok(self.withdraw_fee_in_satoshis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn buy_computes_the_same_satoshi_arithmetic_as_real_exchanges() {
        let mut service = MockExchangeBuyService::new(true, "EUR".to_owned());
        service
            .set_bitcoin_price(20_000)
            .set_fee_amount("0.00000150".to_owned())
            .set_fee_currency("BTC".to_owned());

        let BuyOrderResult::Filled(order) = service.initiate_buy(100).await.unwrap() else {
            panic!("expected filled order");
        };

        // 100 EUR / 20000 EUR = 0.005 BTC
        assert_eq!(order.amount_in_satoshis, 500_000);
        assert_eq!(order.fees_in_satoshis, 150);
        assert_eq!(order.display_average_price, "20000 EUR");
    }

    #[tokio::test]
    async fn non_btc_fee_currency_is_not_credited() {
        let mut service = MockExchangeBuyService::new(true, "EUR".to_owned());
        service
            .set_bitcoin_price(20_000)
            .set_fee_amount("0.25".to_owned())
            .set_fee_currency("EUR".to_owned());

        let BuyOrderResult::Filled(order) = service.initiate_buy(100).await.unwrap() else {
            panic!("expected filled order");
        };
        assert_eq!(order.fees_in_satoshis, 0);
    }

    #[tokio::test]
    async fn withdraw_all_subtracts_fee_and_keeps_balance_untouched() {
        let mut service = MockExchangeWithdrawService::new(true);
        service
            .set_available_balance(500_000)
            .set_withdraw_fee_in_satoshis(30_000);

        let balance = service.get_available_balance().await.unwrap();
        let completed = service.withdraw(balance, "bc1qexample").await.unwrap();

        assert_eq!(completed.net_amount, 470_000);
        assert!(completed.id.starts_with("MOCK_"));
        // 모의 잔고는 출금 호출로 변하지 않는다
        assert_eq!(service.get_available_balance().await.unwrap(), 500_000);
    }

    #[tokio::test]
    async fn disabled_mock_supports_no_exchange() {
        let service = MockExchangeBuyService::new(false, "EUR".to_owned());
        assert!(!service.supports_exchange("bl3p"));

        let service = MockExchangeBuyService::new(true, "EUR".to_owned());
        assert!(service.supports_exchange("anything"));
    }
}
