pub mod app;
pub mod cache;
pub mod config;
pub mod error;
pub mod mailer;
pub mod model;
pub mod normalize;
pub mod orchestrator;
pub mod pipeline;
pub mod policy;
pub mod render;
pub mod retry;
pub mod scheduler;
pub mod sources;
