pub mod gate;
pub mod limiter;
pub mod middleware;
