pub mod attribution; // One-period-lag NGR attribution
pub mod delta;
pub mod jackpot;
pub mod sanity; // Stored vs prize-delta audit
pub mod store;
pub mod timeline;

pub use attribution::{attribute_draw, resolve_attribution, NgrAttribution, PostedFigures};
pub use delta::{estimate_from_book, prize_delta, PrizeDelta};
pub use jackpot::{apply_jackpot_adjustments, detect_jackpot};
pub use sanity::{
    classify, SanityChecker, SanityReport, SanityResult, SanityScope, SanityStatus, SanitySummary,
};
pub use store::DrawRecordStore;
pub use timeline::Timeline;
