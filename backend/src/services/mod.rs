// services/mod.rs
pub mod credentials;

pub use credentials::{CredentialStore, TokenSource};
