pub mod source;
pub mod types;
pub mod yahoo;

pub use source::MarketDataProvider;
pub use types::{ProviderBatch, ProviderError, RawBar};
pub use yahoo::{ProviderConfig, YahooChartProvider};
