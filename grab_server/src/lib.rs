pub mod api_types;
pub mod auth;
pub mod path_sanitizer;
pub mod server;
