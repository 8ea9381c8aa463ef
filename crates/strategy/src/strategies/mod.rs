pub mod demo;
pub mod ma_cross;
pub mod mean_reversion;
pub mod risk_premia;
pub mod rsi;

pub use demo::Demo;
pub use ma_cross::{MaCross, MaCrossParams};
pub use mean_reversion::{MeanReversion, MeanReversionParams};
pub use risk_premia::{RiskPremia, RiskPremiaParams};
pub use rsi::{Rsi, RsiParams};
