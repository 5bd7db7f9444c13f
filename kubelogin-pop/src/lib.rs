//! kubelogin-pop library
//!
//! Acquires access tokens for Kubernetes clusters backed by Microsoft Entra
//! ID, optionally bound to a proof-of-possession key via [`oauth_pop`].

pub mod cloud;
pub mod credential;
pub mod env;
pub mod exchange;
pub mod exec;
pub mod keystore;
pub mod options;
pub mod token;

pub use exchange::{
    acquire_pop_token_confidential, get_key, AcquireError, AcquiredToken, ClientOptions,
    ConfidentialClient,
};
pub use options::{ConfigError, KeySource, LoginMethod, Options};
pub use token::get_token;
