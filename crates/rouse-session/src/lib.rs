pub mod reaper;
pub mod store;

pub use store::SessionStore;
