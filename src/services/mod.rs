pub mod admission;
pub mod ai;
pub mod outlier;
pub mod processor;
pub mod queue;
pub mod scraper;
pub mod session;
pub mod viral;
