//! HTTP API handlers for the research service

pub mod events;
pub mod health;
pub mod research;

pub use events::event_routes;
pub use health::health_routes;
pub use research::research_routes;
