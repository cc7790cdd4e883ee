use chrono::{DateTime, Utc};

/// 체결 완료된 매수 주문의 정규화 결과.
/// 정산에는 사토시 정수 필드만 쓰고, display_* 문자열은 거래소가 준
/// 원본 정밀도 그대로 알림/리포트에만 쓴다 (다시 파싱하지 않는다).
#[derive(Debug, Clone)]
pub struct CompletedBuyOrder {
    /// 순매수량 (사토시)
    pub amount_in_satoshis: i64,
    /// BTC로 청구된 수수료 (사토시). 수수료 통화가 BTC가 아니면 0.
    pub fees_in_satoshis: i64,
    /// 생성 시점에 고정
    pub purchase_made_at: DateTime<Utc>,
    pub display_amount_bought: String,
    pub display_amount_spent: String,
    pub display_amount_spent_currency: String,
    pub display_average_price: String,
    pub display_fees_spent: String,
}

/// 시장가 매수는 거래소에 따라 비동기로 체결된다.
/// Pending은 실패가 아니라 "주문 ID로 나중에 다시 확인하라"는 신호다.
#[derive(Debug, Clone)]
pub enum BuyOrderResult {
    Filled(CompletedBuyOrder),
    Pending { order_id: String },
}

/// 성공한 출금의 결과. 출금 ID가 없는 거래소는 합성 ID를 채워 넣는다.
#[derive(Debug, Clone)]
pub struct CompletedWithdraw {
    pub id: String,
    pub recipient_address: String,
    /// 출금 수수료를 뺀 실제 전송량 (사토시). 호출 전에 계산된다.
    pub net_amount: i64,
}

/// 거래소 지갑 잔고 한 줄. total/available은 거래소 원본 표시 문자열.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletBalance {
    pub symbol: String,
    pub total: String,
    pub available: String,
}
