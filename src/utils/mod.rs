pub mod error;
pub mod logger;
pub mod requirements;
pub mod validation;
