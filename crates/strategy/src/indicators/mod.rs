pub mod moving_average;
pub mod rolling;
pub mod rsi;

pub use moving_average::{ema, sma, MaKind};
pub use rolling::{rolling_apply, rolling_skew, rolling_std};
pub use rsi::wilder_rsi;
