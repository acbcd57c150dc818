//! JSON and MJPEG access to the running monitor

mod handlers;
mod server;
#[cfg(test)]
mod tests;

pub use handlers::resolve_window;
pub use server::{ApiServer, ServerState};
