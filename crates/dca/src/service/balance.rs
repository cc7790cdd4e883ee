use interface::{ExchangeError, WalletBalance};

use crate::service::{find_supported, BalanceService};

/// 설정된 거래소의 잔고 서비스로 위임하는 라우터
pub struct BalanceRouter {
    services: Vec<Box<dyn BalanceService>>,
    configured_exchange: String,
}

impl BalanceRouter {
    pub fn new(services: Vec<Box<dyn BalanceService>>, configured_exchange: String) -> Self {
        Self {
            services,
            configured_exchange,
        }
    }

    pub async fn get_balances(&self) -> Result<Vec<WalletBalance>, ExchangeError> {
        find_supported(&self.services, &self.configured_exchange)?
            .get_balances()
            .await
    }
}
