pub mod search;
pub mod weather;

pub use search::{PerplexityAdapter, PerplexityConfig};
pub use weather::WeatherAdapter;
