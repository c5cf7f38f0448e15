// HTTP shell for the reports service: router, handlers and shared state

pub mod handlers;
pub mod routes;
pub mod state;

pub use routes::create_router;
pub use state::AppState;
