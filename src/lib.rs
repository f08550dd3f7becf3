pub mod channels;
pub mod config;
pub mod daemon;
pub mod domains;
pub mod email;
pub mod error;
pub mod interfaces;
pub mod logging;
pub mod notify;
pub mod prompt;
pub mod providers;
pub mod services;
pub mod store;

pub type Result<T> = std::result::Result<T, error::ConciergeError>;
