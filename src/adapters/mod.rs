pub mod email;
pub mod http;
pub mod llm;
pub mod payment_gateway;
pub mod persistence;
pub mod sms;
