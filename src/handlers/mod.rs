mod health;
mod metrics;
mod recommend;

pub use health::health_handler;
pub use metrics::metrics_handler;
pub use recommend::recommend_handler;
