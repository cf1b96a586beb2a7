//! Credential models exchanged between the provider, the coordinator, and the store.

pub mod credentials;
pub mod secret;

pub use credentials::*;
pub use secret::*;
