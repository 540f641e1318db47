pub mod adapter;
pub mod api;
pub mod auth;
pub mod event;
pub mod mime;
pub mod wire;

pub use adapter::GoogleAdapter;
pub use api::{GoogleApi, HttpGoogleApi};
pub use auth::{OAuthClient, OAuthConfig};
