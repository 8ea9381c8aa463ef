pub mod manager;

pub use manager::{protective_levels, round_price, OrderManager};
