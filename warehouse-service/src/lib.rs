pub mod api;
pub mod error;
pub mod models;
pub mod registry;
pub mod schema;
pub mod services;
pub mod store;
