pub mod bybit;
pub mod lifecycle;
pub mod trader;

pub use bybit::{BybitClient, BybitFeed};
pub use lifecycle::{CandleHandler, CandleLifecycle};
pub use trader::Trader;
