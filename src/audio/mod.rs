pub mod route;

pub use route::{AudioMode, AudioRoute};
