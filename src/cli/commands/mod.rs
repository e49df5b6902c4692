pub mod server;
pub mod tenant;
pub mod token;
