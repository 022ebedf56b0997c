// Error taxonomy
pub mod error;

// Encrypted credential vault and storage
pub mod credentials;

// OAuth authorization flow (PKCE + anti-forgery state)
pub mod oauth;

// Token lifecycle management (exchange, refresh)
pub mod tokens;

// Schema discovery and exposure probing
pub mod scan;

// AI risk classification (optional)
pub mod classifier;

// Configuration
pub mod config;

pub use error::{Error, Result};
