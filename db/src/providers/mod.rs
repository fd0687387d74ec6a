pub mod cache;
pub mod provider;
pub mod store;

pub use cache::*;
pub use provider::*;
pub use store::*;
