pub mod backends;
pub mod canvas;
pub mod credentials;
