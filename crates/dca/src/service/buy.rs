use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{error, info};

use interface::{BuyOrderResult, CompletedBuyOrder, ExchangeError};

use crate::event::{BuySuccess, EventListener};
use crate::service::{find_supported, BuyService};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// 설정된 거래소의 매수 서비스를 골라 주문을 넣고, 체결될 때까지
/// 폴링하는 라우터. 타임아웃이 지나면 주문을 취소하고 실패로 돌려준다.
pub struct BuyRouter {
    services: Vec<Box<dyn BuyService>>,
    listeners: Vec<Box<dyn EventListener>>,
    configured_exchange: String,
    timeout: Duration,
    poll_interval: Duration,
}

impl BuyRouter {
    pub fn new(
        services: Vec<Box<dyn BuyService>>,
        configured_exchange: String,
        timeout_secs: u64,
    ) -> Self {
        Self {
            services,
            listeners: Vec::new(),
            configured_exchange,
            timeout: Duration::from_secs(timeout_secs),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// 테스트에서 폴링 간격을 줄이기 위한 훅
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn add_listener(&mut self, listener: Box<dyn EventListener>) {
        self.listeners.push(listener);
    }

    pub async fn buy(
        &self,
        amount: u64,
        tag: Option<&str>,
    ) -> Result<CompletedBuyOrder, ExchangeError> {
        info!(
            "performing buy for {} on {}",
            amount, self.configured_exchange
        );

        let service = find_supported(&self.services, &self.configured_exchange).map_err(|e| {
            error!("no exchange was available to perform this buy");
            e
        })?;

        let order = self.buy_at_service(service, amount).await?;

        for listener in &self.listeners {
            listener.on_buy_success(&BuySuccess {
                order: order.clone(),
                tag: tag.map(str::to_owned),
            });
        }

        Ok(order)
    }

    async fn buy_at_service(
        &self,
        service: &dyn BuyService,
        amount: u64,
    ) -> Result<CompletedBuyOrder, ExchangeError> {
        let deadline = Instant::now() + self.timeout;

        let mut pending_id = match service.initiate_buy(amount).await? {
            BuyOrderResult::Filled(order) => return Ok(order),
            BuyOrderResult::Pending { order_id } => order_id,
        };

        loop {
            if Instant::now() >= deadline {
                info!("buy timeout reached, cancelling order {}", pending_id);
                service.cancel_buy_order(&pending_id).await?;

                error!("buy did not fill within given timeout");
                return Err(ExchangeError::BuyTimeout(self.timeout.as_secs()));
            }

            sleep(self.poll_interval).await;

            match service.check_if_order_is_filled(&pending_id).await? {
                BuyOrderResult::Filled(order) => return Ok(order),
                BuyOrderResult::Pending { order_id } => pending_id = order_id,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::SupportsExchange;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    fn order(amount: i64) -> CompletedBuyOrder {
        CompletedBuyOrder {
            amount_in_satoshis: amount,
            fees_in_satoshis: 0,
            purchase_made_at: Utc::now(),
            display_amount_bought: "0.01 BTC".to_owned(),
            display_amount_spent: "100 EUR".to_owned(),
            display_amount_spent_currency: "EUR".to_owned(),
            display_average_price: "10000 EUR".to_owned(),
            display_fees_spent: "0 BTC".to_owned(),
        }
    }

    /// pending_checks번 Pending을 돌려준 뒤 체결되는 스텁
    struct StubBuyService {
        pending_checks: usize,
        checks_seen: AtomicUsize,
        cancelled: Arc<Mutex<Vec<String>>>,
    }

    impl StubBuyService {
        fn new(pending_checks: usize) -> Self {
            Self {
                pending_checks,
                checks_seen: AtomicUsize::new(0),
                cancelled: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    impl SupportsExchange for StubBuyService {
        fn supports_exchange(&self, exchange: &str) -> bool {
            exchange == "stub"
        }
    }

    #[async_trait]
    impl BuyService for StubBuyService {
        async fn initiate_buy(&self, _amount: u64) -> Result<BuyOrderResult, ExchangeError> {
            if self.pending_checks == 0 {
                return Ok(BuyOrderResult::Filled(order(1_000_000)));
            }
            Ok(BuyOrderResult::Pending { order_id: "X".to_owned() })
        }

        async fn check_if_order_is_filled(
            &self,
            order_id: &str,
        ) -> Result<BuyOrderResult, ExchangeError> {
            assert_eq!(order_id, "X");

            let seen = self.checks_seen.fetch_add(1, Ordering::SeqCst) + 1;
            if seen >= self.pending_checks {
                Ok(BuyOrderResult::Filled(order(1_000_000)))
            } else {
                Ok(BuyOrderResult::Pending { order_id: order_id.to_owned() })
            }
        }

        async fn cancel_buy_order(&self, order_id: &str) -> Result<(), ExchangeError> {
            self.cancelled.lock().unwrap().push(order_id.to_owned());
            Ok(())
        }
    }

    fn router(service: StubBuyService, timeout_secs: u64) -> BuyRouter {
        BuyRouter::new(vec![Box::new(service)], "stub".to_owned(), timeout_secs)
            .with_poll_interval(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn synchronous_fill_returns_immediately() {
        let router = router(StubBuyService::new(0), 30);

        let order = router.buy(100, None).await.unwrap();
        assert_eq!(order.amount_in_satoshis, 1_000_000);
    }

    #[tokio::test]
    async fn pending_order_is_polled_until_filled() {
        let router = router(StubBuyService::new(3), 30);

        let order = router.buy(100, None).await.unwrap();
        assert_eq!(order.amount_in_satoshis, 1_000_000);
    }

    #[tokio::test]
    async fn timeout_cancels_the_pending_order() {
        // 영원히 Pending인 스텁과 즉시 만료되는 타임아웃
        let service = StubBuyService::new(usize::MAX);
        let cancelled = Arc::clone(&service.cancelled);
        let router = router(service, 0);

        match router.buy(100, None).await {
            Err(ExchangeError::BuyTimeout(secs)) => assert_eq!(secs, 0),
            other => panic!("expected BuyTimeout, got {:?}", other.map(|o| o.amount_in_satoshis)),
        }

        assert_eq!(*cancelled.lock().unwrap(), vec!["X".to_owned()]);
    }

    #[tokio::test]
    async fn unsupported_exchange_fails_without_buying() {
        let router = BuyRouter::new(
            vec![Box::new(StubBuyService::new(0))],
            "binance".to_owned(),
            30,
        );

        assert!(matches!(
            router.buy(100, None).await,
            Err(ExchangeError::NoExchangeAvailable(_))
        ));
    }
}
