mod bitcoin;
mod error;
mod model;

pub use bitcoin::{btc_to_satoshis, satoshis_to_btc, BITCOIN_DECIMALS, SATOSHIS_PER_BITCOIN};
pub use error::ExchangeError;
pub use model::{BuyOrderResult, CompletedBuyOrder, CompletedWithdraw, WalletBalance};
