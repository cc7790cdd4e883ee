use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::ExchangeError;

/// 1 BTC = 10^8 사토시. 금액 변환의 고정 상수.
pub const SATOSHIS_PER_BITCOIN: i64 = 100_000_000;
pub const BITCOIN_DECIMALS: u32 = 8;

/// 거래소가 주는 BTC 십진 문자열을 사토시 정수로 변환한다.
/// 부동소수점을 쓰지 않고, 8자리 아래 잔여분은 반올림 없이 버린다.
pub fn btc_to_satoshis(amount: &str) -> Result<i64, ExchangeError> {
    let value: Decimal = amount.trim().parse().map_err(|e| ExchangeError::Other(format!(
        "invalid decimal amount '{}': {}",
        amount, e
    )))?;

    let satoshis = (value * Decimal::from(SATOSHIS_PER_BITCOIN)).trunc();
    satoshis.to_i64().ok_or_else(|| {
        ExchangeError::Other(format!("amount '{}' does not fit in satoshi range", amount))
    })
}

/// 사토시 정수를 8자리 고정 소수점 BTC 문자열로 변환한다.
pub fn satoshis_to_btc(satoshis: i64) -> String {
    Decimal::new(satoshis, BITCOIN_DECIMALS).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_decimal_string_to_satoshis() {
        assert_eq!(btc_to_satoshis("1").unwrap(), 100_000_000);
        assert_eq!(btc_to_satoshis("0.00012345").unwrap(), 12_345);
        assert_eq!(btc_to_satoshis("21.5").unwrap(), 2_150_000_000);
        assert_eq!(btc_to_satoshis("0").unwrap(), 0);
    }

    #[test]
    fn truncates_instead_of_rounding() {
        // 8자리 아래는 버린다. 반올림이면 2가 됐을 값.
        assert_eq!(btc_to_satoshis("0.000000019").unwrap(), 1);
        assert_eq!(btc_to_satoshis("0.999999999").unwrap(), 99_999_999);
    }

    #[test]
    fn rejects_garbage_input() {
        assert!(btc_to_satoshis("not-a-number").is_err());
        assert!(btc_to_satoshis("").is_err());
    }

    #[test]
    fn formats_satoshis_with_fixed_precision() {
        assert_eq!(satoshis_to_btc(100_000_000), "1.00000000");
        assert_eq!(satoshis_to_btc(12_345), "0.00012345");
        assert_eq!(satoshis_to_btc(0), "0.00000000");
    }

    #[test]
    fn round_trips_at_native_precision() {
        for amount in ["0.00012345", "1.00000000", "0.30000000", "20.99999999"] {
            let satoshis = btc_to_satoshis(amount).unwrap();
            assert_eq!(btc_to_satoshis(&satoshis_to_btc(satoshis)).unwrap(), satoshis);
        }
    }
}
