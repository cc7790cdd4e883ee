use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::Value;

use interface::{BuyOrderResult, CompletedWithdraw, ExchangeError, WalletBalance};

pub mod balance;
pub mod binance;
pub mod bitvavo;
pub mod bl3p;
pub mod buy;
pub mod kraken;
pub mod mock;
pub mod withdraw;

pub use balance::BalanceRouter;
pub use buy::BuyRouter;
pub use withdraw::WithdrawRouter;

/// 런타임 디스패치 키. 타입 태그가 아니라 이름 매칭 술어다.
pub trait SupportsExchange {
    fn supports_exchange(&self, exchange: &str) -> bool;
}

/// 거래소별 매수 서비스 계약.
/// 시장가 주문이 동기적으로 체결되지 않으면 Pending을 돌려주고,
/// 호출자(라우터)가 order_id로 재확인한다.
#[async_trait]
pub trait BuyService: SupportsExchange + Send + Sync {
    /// amount는 법정화폐 단위의 정수 (예: 100 EUR)
    async fn initiate_buy(&self, amount: u64) -> Result<BuyOrderResult, ExchangeError>;
    async fn check_if_order_is_filled(&self, order_id: &str)
        -> Result<BuyOrderResult, ExchangeError>;
    /// 최선 노력 취소. 로컬 상태 정리는 없다.
    async fn cancel_buy_order(&self, order_id: &str) -> Result<(), ExchangeError>;
}

/// 거래소별 출금 서비스 계약. 수량은 전부 사토시 정수.
#[async_trait]
pub trait WithdrawService: SupportsExchange + Send + Sync {
    async fn withdraw(
        &self,
        balance_to_withdraw: i64,
        address: &str,
    ) -> Result<CompletedWithdraw, ExchangeError>;
    async fn get_available_balance(&self) -> Result<i64, ExchangeError>;
    async fn get_withdraw_fee_in_satoshis(&self) -> Result<i64, ExchangeError>;
}

/// 거래소별 잔고 서비스 계약
#[async_trait]
pub trait BalanceService: SupportsExchange + Send + Sync {
    async fn get_balances(&self) -> Result<Vec<WalletBalance>, ExchangeError>;
}

/// 등록 순서대로 훑어서 첫 번째로 지원하는 구현을 고른다.
/// 세 라우터가 모두 이 헬퍼를 공유한다.
pub(crate) fn find_supported<'a, S>(
    services: &'a [Box<S>],
    exchange: &str,
) -> Result<&'a S, ExchangeError>
where
    S: SupportsExchange + ?Sized,
{
    services
        .iter()
        .map(AsRef::as_ref)
        .find(|service| service.supports_exchange(exchange))
        .ok_or_else(|| ExchangeError::NoExchangeAvailable(exchange.to_owned()))
}

/// 부분 체결 한 건: 체결가와 체결량(사토시)
#[derive(Debug, Clone)]
pub(crate) struct Fill {
    pub price: Decimal,
    pub filled_satoshis: i64,
}

/// 사토시 가중 평균 체결가. 체결량이 0이면 None.
pub(crate) fn weighted_average_price(fills: &[Fill], total_satoshis: i64) -> Option<Decimal> {
    if total_satoshis <= 0 {
        return None;
    }

    let total = Decimal::from(total_satoshis);
    let mean = fills
        .iter()
        .map(|fill| fill.price * Decimal::from(fill.filled_satoshis) / total)
        .sum();

    Some(mean)
}

/// 체결 수수료 합산. 모든 체결이 같은 통화로 수수료를 내야 한다.
/// 통화가 섞이면 마지막 통화로 덮어쓰는 대신 오류를 돌려준다.
pub(crate) fn sum_fill_commissions(
    exchange: &'static str,
    fills: &[(Decimal, String)],
) -> Result<(Decimal, Option<String>), ExchangeError> {
    let mut total = Decimal::ZERO;
    let mut currency: Option<String> = None;

    for (commission, asset) in fills {
        match &currency {
            Some(current) if current != asset => {
                return Err(ExchangeError::MalformedResponse {
                    exchange,
                    message: format!(
                        "order fills mix commission currencies ({} and {})",
                        current, asset
                    ),
                });
            }
            Some(_) => {}
            None => currency = Some(asset.clone()),
        }

        total += commission;
    }

    Ok((total, currency))
}

/// 응답에서 문자열 필드를 꺼낸다. 없으면 MalformedResponse.
pub(crate) fn json_str<'a>(
    exchange: &'static str,
    value: &'a Value,
    pointer: &str,
) -> Result<&'a str, ExchangeError> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .ok_or_else(|| ExchangeError::MalformedResponse {
            exchange,
            message: format!("missing string field {}", pointer),
        })
}

/// 정수 필드. 거래소에 따라 숫자 또는 숫자 문자열로 온다.
pub(crate) fn json_int(
    exchange: &'static str,
    value: &Value,
    pointer: &str,
) -> Result<i64, ExchangeError> {
    let field = value
        .pointer(pointer)
        .ok_or_else(|| ExchangeError::MalformedResponse {
            exchange,
            message: format!("missing integer field {}", pointer),
        })?;

    match field {
        Value::Number(number) => number.as_i64().ok_or_else(|| ExchangeError::MalformedResponse {
            exchange,
            message: format!("field {} is not an integer", pointer),
        }),
        Value::String(raw) => raw.parse().map_err(|_| ExchangeError::MalformedResponse {
            exchange,
            message: format!("field {} is not an integer", pointer),
        }),
        _ => Err(ExchangeError::MalformedResponse {
            exchange,
            message: format!("field {} is not an integer", pointer),
        }),
    }
}

/// 주문 ID는 숫자로 오기도 하고 문자열로 오기도 한다
pub(crate) fn json_id(
    exchange: &'static str,
    value: &Value,
    pointer: &str,
) -> Result<String, ExchangeError> {
    match value.pointer(pointer) {
        Some(Value::String(id)) => Ok(id.clone()),
        Some(Value::Number(id)) => Ok(id.to_string()),
        _ => Err(ExchangeError::MalformedResponse {
            exchange,
            message: format!("missing id field {}", pointer),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    struct Named {
        name: &'static str,
        probed: std::sync::atomic::AtomicBool,
    }

    impl SupportsExchange for Named {
        fn supports_exchange(&self, exchange: &str) -> bool {
            self.probed
                .store(true, std::sync::atomic::Ordering::SeqCst);
            self.name == exchange
        }
    }

    fn named(name: &'static str) -> Box<Named> {
        Box::new(Named {
            name,
            probed: std::sync::atomic::AtomicBool::new(false),
        })
    }

    #[test]
    fn dispatcher_selects_first_supporting_service() {
        let services = vec![named("bl3p"), named("kraken")];

        let selected = find_supported(&services, "kraken").unwrap();
        assert_eq!(selected.name, "kraken");
    }

    #[test]
    fn dispatcher_stops_probing_after_a_match() {
        let services = vec![named("bl3p"), named("kraken")];

        find_supported(&services, "bl3p").unwrap();
        assert!(!services[1].probed.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[test]
    fn dispatcher_exhaustion_is_a_typed_error() {
        let services = vec![named("bl3p"), named("kraken")];

        match find_supported(&services, "bitfinex") {
            Err(ExchangeError::NoExchangeAvailable(exchange)) => {
                assert_eq!(exchange, "bitfinex");
            }
            other => panic!("expected NoExchangeAvailable, got {:?}", other.map(|s| s.name)),
        }
    }

    #[test]
    fn average_price_is_weighted_by_satoshi_share() {
        let fills = [
            Fill { price: dec!(100), filled_satoshis: 600 },
            Fill { price: dec!(200), filled_satoshis: 400 },
        ];

        assert_eq!(weighted_average_price(&fills, 1000), Some(dec!(140)));
    }

    #[test]
    fn average_price_of_zero_quantity_is_none() {
        assert_eq!(weighted_average_price(&[], 0), None);
    }

    #[test]
    fn commissions_sum_in_a_single_currency() {
        let fills = [
            (dec!(0.001), "BTC".to_owned()),
            (dec!(0.002), "BTC".to_owned()),
        ];

        let (total, currency) = sum_fill_commissions("binance", &fills).unwrap();
        assert_eq!(total, dec!(0.003));
        assert_eq!(currency.as_deref(), Some("BTC"));
    }

    #[test]
    fn mixed_commission_currencies_are_rejected() {
        let fills = [
            (dec!(0.001), "BTC".to_owned()),
            (dec!(1.5), "BNB".to_owned()),
        ];

        assert!(matches!(
            sum_fill_commissions("binance", &fills),
            Err(ExchangeError::MalformedResponse { .. })
        ));
    }

    #[test]
    fn empty_fill_list_has_no_commission_currency() {
        let (total, currency) = sum_fill_commissions("binance", &[]).unwrap();
        assert_eq!(total, Decimal::ZERO);
        assert_eq!(currency, None);
    }

    #[test]
    fn json_int_accepts_numbers_and_numeric_strings() {
        let body = json!({"a": 42, "b": "43", "c": {"d": "44"}});

        assert_eq!(json_int("bl3p", &body, "/a").unwrap(), 42);
        assert_eq!(json_int("bl3p", &body, "/b").unwrap(), 43);
        assert_eq!(json_int("bl3p", &body, "/c/d").unwrap(), 44);
        assert!(json_int("bl3p", &body, "/missing").is_err());
    }

    #[test]
    fn json_id_stringifies_numeric_ids() {
        let body = json!({"orderId": 12345, "ref": "abc"});

        assert_eq!(json_id("binance", &body, "/orderId").unwrap(), "12345");
        assert_eq!(json_id("binance", &body, "/ref").unwrap(), "abc");
    }
}
