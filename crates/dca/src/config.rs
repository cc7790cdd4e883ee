use std::env;
use std::path::PathBuf;

/// CLI 경계에서 한 번만 읽는 전역 설정.
/// 클라이언트와 서비스는 환경 변수를 직접 읽지 않고 생성자로 값을 받는다.
#[derive(Debug, Clone)]
pub struct DcaConfig {
    /// 활성 거래소 이름 (bl3p / binance / bitvavo / kraken)
    pub exchange: String,
    /// 매수에 쓰는 법정화폐 (EUR 등)
    pub base_currency: String,
    /// 출금 대상 주소
    pub withdraw_address: Option<String>,
    /// 매수 체결 대기 타임아웃 (초)
    pub buy_timeout: u64,
    /// 태그별 잔고 저장 파일
    pub balance_file: PathBuf,
    /// 모의 거래소 활성화 (테스트/드라이런)
    pub mock_exchange: bool,
}

impl DcaConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            exchange: lookup("EXCHANGE").unwrap_or_else(|| "bl3p".to_owned()),
            base_currency: lookup("BASE_CURRENCY").unwrap_or_else(|| "EUR".to_owned()),
            withdraw_address: lookup("WITHDRAW_ADDRESS").filter(|address| !address.is_empty()),
            buy_timeout: lookup("BUY_TIMEOUT")
                .and_then(|timeout| timeout.parse().ok())
                .unwrap_or(30),
            balance_file: lookup("BALANCE_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("balance.json")),
            mock_exchange: lookup("MOCK_EXCHANGE")
                .map(|flag| flag == "1" || flag.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        }
    }
}

/// Kraken은 키 쌍 외에 사전 등록된 출금 키 이름을 추가로 요구한다
#[derive(Debug, Clone)]
pub struct KrakenCredentials {
    pub api_key: String,
    pub private_key: String,
    pub withdraw_key: Option<String>,
}

/// 거래소별 자격 증명. 설정된 거래소만 Some이 된다.
#[derive(Debug, Clone, Default)]
pub struct ExchangeCredentials {
    pub bl3p: Option<(String, String)>,
    pub binance: Option<(String, String)>,
    pub bitvavo: Option<(String, String)>,
    pub kraken: Option<KrakenCredentials>,
}

impl ExchangeCredentials {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok().filter(|value| !value.is_empty()))
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let pair = |key: &str, secret: &str| Some((lookup(key)?, lookup(secret)?));

        Self {
            bl3p: pair("BL3P_PUBLIC_KEY", "BL3P_PRIVATE_KEY"),
            binance: pair("BINANCE_API_KEY", "BINANCE_API_SECRET"),
            bitvavo: pair("BITVAVO_API_KEY", "BITVAVO_API_SECRET"),
            kraken: match (lookup("KRAKEN_API_KEY"), lookup("KRAKEN_PRIVATE_KEY")) {
                (Some(api_key), Some(private_key)) => Some(KrakenCredentials {
                    api_key,
                    private_key,
                    withdraw_key: lookup("KRAKEN_WITHDRAW_KEY"),
                }),
                _ => None,
            },
        }
    }
}
