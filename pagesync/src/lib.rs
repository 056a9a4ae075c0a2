pub mod config;
pub mod convert;
pub mod credentials;
pub mod push;
pub mod sync;
