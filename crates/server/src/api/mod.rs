pub mod dlq;
pub mod handlers;
pub mod middleware;
pub mod orchestrator;
pub mod routes;
pub mod runs;

pub use routes::create_router;
