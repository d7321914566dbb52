pub mod dispatchers;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod queues;
pub mod routes;
pub mod tickets;
pub mod ws;

pub use error::{ApiError, ErrorResponse};
pub use routes::create_router;
