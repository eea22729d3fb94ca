pub mod api;
pub mod config;
pub mod error;
pub mod hierarchy;
pub mod model;
pub mod service;
pub mod store;
pub mod utils;

pub use error::{Error, Result};
pub use model::{Comment, CommentId, CommentNode};
pub use service::CommentService;
