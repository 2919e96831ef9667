mod models;
mod status;
mod username;

pub use models::*;
pub use status::TopicStatus;
pub use username::{Username, canonical_key};
