//! OAuth 2.0 authorization flow initiation (PKCE, S256).
//!
//! The flow:
//! 1. `begin_authorization` produces the provider authorize URL plus the
//!    verifier and state the caller must hold client-side (10-minute expiry)
//! 2. User authorizes on the provider's site
//! 3. Provider redirects back with `code` and `state`
//! 4. Caller checks the state with [`verify_state`], then hands the code and
//!    verifier to the token manager for exchange
//!
//! Nothing here is stateful: verifier and state live with the caller.

pub mod pkce;
pub mod state;

pub use state::{verify_state, StateToken, STATE_TTL_SECONDS};

use crate::config::SupabaseConfig;

/// Everything the caller needs to start an authorization round trip.
#[derive(Clone, Debug)]
pub struct AuthorizeRequest {
    /// Full provider authorization URL to redirect the user to
    pub url: String,
    /// PKCE code verifier, held until the callback exchange
    pub verifier: String,
    /// Encoded anti-forgery state, matched byte-for-byte at callback time
    pub state: String,
}

/// Builds an authorization request for an identity.
///
/// Generates a fresh verifier and state on every call.
pub fn begin_authorization(
    config: &SupabaseConfig,
    user_id: &str,
    redirect_uri: &str,
) -> AuthorizeRequest {
    let verifier = pkce::generate_verifier();
    let challenge = pkce::code_challenge(&verifier);
    let state = StateToken::issue(user_id).encode();
    let scopes = config.scopes.join(" ");

    let url = format!(
        "{}?client_id={}&redirect_uri={}&response_type=code&state={}&code_challenge={}&code_challenge_method=S256&scope={}",
        config.auth_url,
        urlencoding::encode(&config.client_id),
        urlencoding::encode(redirect_uri),
        urlencoding::encode(&state),
        urlencoding::encode(&challenge),
        urlencoding::encode(&scopes)
    );

    AuthorizeRequest {
        url,
        verifier,
        state,
    }
}
