pub mod classifier;
pub mod scorer;

pub use classifier::{classify, matches_keywords, ChangeType};
pub use scorer::{calculate_severity, is_price_decrease, SeverityResult};
