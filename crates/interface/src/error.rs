use thiserror::Error;

/// 거래소 연동에서 발생하는 오류 분류.
/// Transport/MalformedResponse는 호출 자체의 실패, Api는 거래소가
/// 정상 응답으로 알려준 비즈니스 오류다. 서비스 계층은 이들을 잡아서
/// 숨기지 않고 그대로 위로 전파한다.
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// 네트워크/HTTP 전송 계층 실패
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// JSON 파싱 실패 등 응답 형식이 깨진 경우
    #[error("malformed response from {exchange}: {message}")]
    MalformedResponse {
        exchange: &'static str,
        message: String,
    },

    /// 거래소가 에러 코드/메시지로 알려준 실패
    #[error("{exchange} API error: {message}")]
    Api {
        exchange: &'static str,
        code: Option<String>,
        message: String,
    },

    /// 설정된 거래소 이름을 지원하는 구현체가 등록되어 있지 않음
    #[error("no exchange available: {0}")]
    NoExchangeAvailable(String),

    /// 모든 출금 주소 공급자가 실패함
    #[error("no recipient address available: {0}")]
    NoRecipientAddress(String),

    /// 매수 주문이 제한 시간 내에 체결되지 않음 (주문은 취소된 상태)
    #[error("buy did not fill within {0} seconds")]
    BuyTimeout(u64),

    #[error("{0}")]
    Other(String),
}
