pub mod config;
pub mod discover;
pub mod extract;
pub mod load;
pub mod pipeline;
pub mod reconcile;
pub mod schema;
pub mod transform;
