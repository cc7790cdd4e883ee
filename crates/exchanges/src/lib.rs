pub mod binance;
pub mod bitvavo;
pub mod bl3p;
pub mod kraken;

// Convenience re-exports
pub use binance::{BinanceApi, BinanceClient, SecurityType};
pub use bitvavo::{BitvavoApi, BitvavoClient};
pub use bl3p::{Bl3pApi, Bl3pClient};
pub use kraken::{KrakenApi, KrakenClient};

/// 모든 클라이언트가 붙이는 User-Agent
pub const USER_AGENT: &str = concat!(
    "Mozilla/4.0 (compatible; bitcoin-dca Rust client; ",
    env!("CARGO_PKG_NAME"),
    "/",
    env!("CARGO_PKG_VERSION"),
    ")"
);

/// 오류 메시지에 넣을 응답 본문 발췌 (최대 200자)
pub(crate) fn excerpt(body: &str) -> String {
    body.chars().take(200).collect()
}
