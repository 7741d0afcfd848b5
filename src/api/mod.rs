pub mod quiz_routes;
pub mod quiz_websocket;

pub use quiz_routes::routes;
