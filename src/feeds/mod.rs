pub mod cancel;
pub mod draw_api; // Draw feed trait + REST client
pub mod price_api;
pub mod prize_fetcher; // Batched, TTL-cached prize tiers
pub mod static_dataset;

pub use cancel::{guarded, CancelToken};
pub use draw_api::{DrawApiClient, DrawFeed};
pub use price_api::{PriceApiClient, PriceFeed};
pub use prize_fetcher::{PrizeBook, PrizeFetcher};
pub use static_dataset::{load_static_dataset, parse_static_dataset};
