pub mod config;
pub mod error;
pub mod exchange;
pub mod frame;
pub mod types;
pub mod wire;

pub use config::{cfg_as_dict, get_configuration_files, load_risk_parameters, Config, RawConfig};
pub use error::{Error, Result};
pub use exchange::{ExchangeClient, FeedCloser, FeedEvent, FeedSubscription, MarketFeed};
pub use frame::Frame;
pub use types::*;
pub use wire::{KlineEntry, KlinePush};
