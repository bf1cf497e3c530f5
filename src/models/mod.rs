pub mod token;

pub use token::{
    ProviderTokenResponse, TokenRecord, TokenResponse, DEFAULT_EXPIRES_IN_SECS,
    DEFAULT_TOKEN_TYPE,
};
