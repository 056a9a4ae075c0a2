pub mod engine;
pub mod markdown;
pub mod paths;
pub mod session;
pub mod state;
