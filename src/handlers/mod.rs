pub mod authorize;
pub mod health;
pub mod pages;
pub mod token;

pub use authorize::{auth_callback, auth_start};
pub use health::health_check;
pub use token::get_token;
