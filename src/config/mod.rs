mod server;

pub use server::{Backend, ServerConfig};
