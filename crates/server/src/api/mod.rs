pub mod audit;
pub mod batches;
pub mod handlers;
pub mod middleware;
pub mod orchestrator;
pub mod orders;
pub mod routes;

pub use routes::create_router;
