pub mod callback;
pub mod caller;
pub mod provider;
pub mod redirect;

pub use callback::{validate_callback, CallbackExchanger, CallbackQuery};
pub use caller::{extract_bearer, verify_caller};
pub use provider::{ProviderClient, TokenGrant, API_KEY_HEADER};
pub use redirect::{
    build_authorization_redirect, clear_state_cookie, extract_state_cookie, state_cookie,
    AuthorizationRedirect, STATE_COOKIE_NAME,
};
