// Encryption at rest for the portal session token

pub mod crypto;
pub mod secret_protector;
pub mod token_store;

pub use secret_protector::SecretProtector;
pub use token_store::TokenStore;
