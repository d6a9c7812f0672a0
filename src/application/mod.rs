pub mod app_error;
pub mod entitlement;
pub mod password;
pub mod prompt_router;
pub mod session;
pub mod signing;
pub mod use_cases;
pub mod validators;
