use std::sync::Arc;

use tracing::{error, info, warn};

use interface::{CompletedWithdraw, ExchangeError};

use crate::event::{EventListener, WithdrawSuccess};
use crate::provider::WithdrawAddressProvider;
use crate::repository::TaggedIntegerRepository;
use crate::service::{find_supported, WithdrawService};

/// 설정된 거래소의 출금 서비스를 고르고, 주소 공급자 체인과 태그 잔고
/// 장부를 묶어주는 라우터.
pub struct WithdrawRouter {
    services: Vec<Box<dyn WithdrawService>>,
    address_providers: Vec<Box<dyn WithdrawAddressProvider>>,
    listeners: Vec<Box<dyn EventListener>>,
    repository: Arc<dyn TaggedIntegerRepository>,
    configured_exchange: String,
}

impl WithdrawRouter {
    pub fn new(
        services: Vec<Box<dyn WithdrawService>>,
        address_providers: Vec<Box<dyn WithdrawAddressProvider>>,
        repository: Arc<dyn TaggedIntegerRepository>,
        configured_exchange: String,
    ) -> Self {
        Self {
            services,
            address_providers,
            listeners: Vec::new(),
            repository,
            configured_exchange,
        }
    }

    pub fn add_listener(&mut self, listener: Box<dyn EventListener>) {
        self.listeners.push(listener);
    }

    fn active_service(&self) -> Result<&dyn WithdrawService, ExchangeError> {
        find_supported(&self.services, &self.configured_exchange).map_err(|e| {
            error!("no exchange was available to perform this withdraw");
            e
        })
    }

    pub async fn get_withdraw_fee_in_satoshis(&self) -> Result<i64, ExchangeError> {
        self.active_service()?.get_withdraw_fee_in_satoshis().await
    }

    /// 태그가 있으면 태그 잔고와 거래소 잔고 중 작은 쪽으로 제한한다
    pub async fn get_balance(&self, tag: Option<&str>) -> Result<i64, ExchangeError> {
        let max_available = self.active_service()?.get_available_balance().await?;

        if let Some(tag) = tag {
            let tag_balance = self.repository.get(tag);
            return Ok(tag_balance.min(max_available));
        }

        Ok(max_available)
    }

    /// 공급자를 순서대로 시도한다. 개별 실패는 다음 공급자로 넘어가는
    /// 것으로 처리하고, 전부 실패하면 NoRecipientAddress.
    pub fn get_recipient_address(&self) -> Result<String, ExchangeError> {
        for provider in &self.address_providers {
            match provider.provide() {
                Ok(address) => return Ok(address),
                Err(e) => warn!("address provider failed, trying next: {}", e),
            }
        }

        Err(ExchangeError::NoRecipientAddress(
            "unable to determine address to withdraw to, did you configure any?".to_owned(),
        ))
    }

    pub async fn withdraw(
        &self,
        balance_to_withdraw: i64,
        address: &str,
        tag: Option<&str>,
    ) -> Result<CompletedWithdraw, ExchangeError> {
        let completed = self
            .active_service()?
            .withdraw(balance_to_withdraw, address)
            .await
            .map_err(|e| {
                error!("withdraw to {} failed: {}", address, e);
                e
            })?;

        info!(
            "withdraw to {} successful, processing as ID {}",
            address, completed.id
        );

        for listener in &self.listeners {
            listener.on_withdraw_success(&WithdrawSuccess {
                withdraw: completed.clone(),
                tag: tag.map(str::to_owned),
            });
        }

        Ok(completed)
    }
}
