use std::sync::Arc;

use tracing::{error, info};

use interface::{CompletedBuyOrder, CompletedWithdraw};

use crate::repository::TaggedIntegerRepository;

/// 매수 성공 이벤트. 라우터가 성공 직후 리스너에게 전달한다.
pub struct BuySuccess {
    pub order: CompletedBuyOrder,
    pub tag: Option<String>,
}

/// 출금 성공 이벤트
pub struct WithdrawSuccess {
    pub withdraw: CompletedWithdraw,
    pub tag: Option<String>,
}

/// 성공 이벤트 리스너. 알림/장부 기록 등 부수 작업을 연결하는 지점이다.
/// 리스너 실패는 본 작업을 되돌릴 수 없으므로 로그만 남긴다.
pub trait EventListener: Send + Sync {
    fn on_buy_success(&self, _event: &BuySuccess) {}
    fn on_withdraw_success(&self, _event: &WithdrawSuccess) {}
}

/// 태그 잔고 장부 리스너: 매수는 순매수량만큼 태그 잔고를 늘리고,
/// 출금은 해당 태그 잔고를 0으로 되돌린다.
pub struct TaggedBalanceListener {
    repository: Arc<dyn TaggedIntegerRepository>,
}

impl TaggedBalanceListener {
    pub fn new(repository: Arc<dyn TaggedIntegerRepository>) -> Self {
        Self { repository }
    }
}

impl EventListener for TaggedBalanceListener {
    fn on_buy_success(&self, event: &BuySuccess) {
        let Some(tag) = &event.tag else {
            return;
        };

        let net_amount = event.order.amount_in_satoshis - event.order.fees_in_satoshis;
        match self.repository.increase(tag, net_amount) {
            Ok(()) => info!(
                "increased balance for tag {} with {} satoshis",
                tag, net_amount
            ),
            Err(e) => error!("failed to increase balance for tag {}: {}", tag, e),
        }
    }

    fn on_withdraw_success(&self, event: &WithdrawSuccess) {
        let Some(tag) = &event.tag else {
            return;
        };

        match self.repository.set(tag, 0) {
            Ok(()) => info!("reset tagged balance for tag {}", tag),
            Err(e) => error!("failed to reset balance for tag {}: {}", tag, e),
        }
    }
}
