pub mod candle_builder;
pub mod historical;
pub mod renko;
pub mod tick;
pub mod tick_hub;
pub mod upstream;

pub use candle_builder::{Candle, CandleBuilder};
pub use renko::{RenkoAccumulator, RenkoState};
pub use tick::{InstrumentMeta, Tick, TickMode};
pub use tick_hub::TickHub;
pub use upstream::UpstreamClient;
