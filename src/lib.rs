pub mod bookings;
pub mod config;
pub mod engine;
pub mod executor;
pub mod limits;
pub mod lock;
pub mod model;
pub mod observability;
pub mod pool;
pub mod sink;
pub mod summary;
pub mod workload;
