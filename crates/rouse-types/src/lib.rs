pub mod api;
pub mod clock;
pub mod error;
pub mod models;
pub mod task;
