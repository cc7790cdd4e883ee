use std::sync::Arc;

use exchanges::{BinanceClient, BitvavoClient, Bl3pClient, KrakenClient};

use crate::config::{DcaConfig, ExchangeCredentials};
use crate::event::TaggedBalanceListener;
use crate::provider::{SimpleWithdrawAddressProvider, WithdrawAddressProvider};
use crate::repository::{JsonFileTaggedIntegerRepository, TaggedIntegerRepository};
use crate::service::balance::BalanceRouter;
use crate::service::binance::{BinanceBalanceService, BinanceBuyService, BinanceWithdrawService};
use crate::service::bitvavo::{BitvavoBalanceService, BitvavoBuyService, BitvavoWithdrawService};
use crate::service::bl3p::{Bl3pBalanceService, Bl3pBuyService, Bl3pWithdrawService};
use crate::service::buy::BuyRouter;
use crate::service::kraken::{KrakenBalanceService, KrakenBuyService, KrakenWithdrawService};
use crate::service::mock::{MockExchangeBuyService, MockExchangeWithdrawService};
use crate::service::withdraw::WithdrawRouter;
use crate::service::{BalanceService, BuyService, WithdrawService};

/// 설정과 자격 증명으로 조립한 세 라우터
pub struct Services {
    pub buy: BuyRouter,
    pub withdraw: WithdrawRouter,
    pub balance: BalanceRouter,
}

/// 자격 증명이 있는 거래소만 등록한다. 모의 거래소가 켜져 있으면
/// 맨 앞에 등록해서 모든 이름을 가로채게 한다.
pub fn build_services(config: &DcaConfig, credentials: &ExchangeCredentials) -> Services {
    let mut buy_services: Vec<Box<dyn BuyService>> = Vec::new();
    let mut withdraw_services: Vec<Box<dyn WithdrawService>> = Vec::new();
    let mut balance_services: Vec<Box<dyn BalanceService>> = Vec::new();

    if config.mock_exchange {
        buy_services.push(Box::new(MockExchangeBuyService::new(
            true,
            config.base_currency.clone(),
        )));
        withdraw_services.push(Box::new(MockExchangeWithdrawService::new(true)));
    }

    if let Some((public_key, private_key)) = &credentials.bl3p {
        let client: Arc<dyn exchanges::Bl3pApi> =
            Arc::new(Bl3pClient::new(public_key.clone(), private_key.clone()));
        buy_services.push(Box::new(Bl3pBuyService::new(
            Arc::clone(&client),
            config.base_currency.clone(),
        )));
        withdraw_services.push(Box::new(Bl3pWithdrawService::new(Arc::clone(&client))));
        balance_services.push(Box::new(Bl3pBalanceService::new(client)));
    }

    if let Some((api_key, api_secret)) = &credentials.binance {
        let client: Arc<dyn exchanges::BinanceApi> =
            Arc::new(BinanceClient::new(api_key.clone(), api_secret.clone()));
        buy_services.push(Box::new(BinanceBuyService::new(
            Arc::clone(&client),
            config.base_currency.clone(),
        )));
        withdraw_services.push(Box::new(BinanceWithdrawService::new(Arc::clone(&client))));
        balance_services.push(Box::new(BinanceBalanceService::new(client)));
    }

    if let Some((api_key, api_secret)) = &credentials.bitvavo {
        let client: Arc<dyn exchanges::BitvavoApi> =
            Arc::new(BitvavoClient::new(api_key.clone(), api_secret.clone()));
        buy_services.push(Box::new(BitvavoBuyService::new(
            Arc::clone(&client),
            config.base_currency.clone(),
        )));
        withdraw_services.push(Box::new(BitvavoWithdrawService::new(Arc::clone(&client))));
        balance_services.push(Box::new(BitvavoBalanceService::new(client)));
    }

    if let Some(kraken) = &credentials.kraken {
        let client: Arc<dyn exchanges::KrakenApi> = Arc::new(KrakenClient::new(
            kraken.api_key.clone(),
            kraken.private_key.clone(),
        ));
        buy_services.push(Box::new(KrakenBuyService::new(
            Arc::clone(&client),
            config.base_currency.clone(),
        )));
        withdraw_services.push(Box::new(KrakenWithdrawService::new(
            Arc::clone(&client),
            kraken.withdraw_key.clone(),
        )));
        balance_services.push(Box::new(KrakenBalanceService::new(client)));
    }

    let repository: Arc<dyn TaggedIntegerRepository> = Arc::new(
        JsonFileTaggedIntegerRepository::new(config.balance_file.clone()),
    );

    let address_providers: Vec<Box<dyn WithdrawAddressProvider>> = vec![Box::new(
        SimpleWithdrawAddressProvider::new(config.withdraw_address.clone()),
    )];

    let mut buy = BuyRouter::new(
        buy_services,
        config.exchange.clone(),
        config.buy_timeout,
    );
    buy.add_listener(Box::new(TaggedBalanceListener::new(Arc::clone(&repository))));

    let mut withdraw = WithdrawRouter::new(
        withdraw_services,
        address_providers,
        Arc::clone(&repository),
        config.exchange.clone(),
    );
    withdraw.add_listener(Box::new(TaggedBalanceListener::new(repository)));

    let balance = BalanceRouter::new(balance_services, config.exchange.clone());

    Services {
        buy,
        withdraw,
        balance,
    }
}
