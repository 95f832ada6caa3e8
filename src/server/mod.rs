// Server module entry
// Listener creation, the accept loop, per-connection tasks and signals

pub mod connection;
pub mod idle;
pub mod listener;
pub mod signal;

// `loop` is a keyword, so the module is named server_loop
#[path = "loop.rs"]
pub mod server_loop;

pub use listener::create_listener;
pub use server_loop::start_server_loop;
pub use signal::shutdown_signal;
