pub mod catch_up;
pub mod chunking;
pub mod orchestrator;
pub mod quality;
pub mod rate_limiter;
pub mod scheduler;
