pub mod binance;
pub mod lifecycle;

pub use binance::{BinanceRest, BinanceStream};
pub use lifecycle::{BackfillReport, Engine, EngineHandle};
