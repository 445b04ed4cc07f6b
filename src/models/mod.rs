pub mod analysis;
pub mod api;
pub mod content;
pub mod profile;
pub mod queue;
