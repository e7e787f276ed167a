pub mod client;
pub mod error;
mod store;
pub mod types;

pub use client::GitHubClient;
pub use error::GitHubError;
pub use store::GitHubStore;
pub use types::{Comment, Issue, Label};
