pub mod http;
pub mod local;
pub mod memory;
pub mod mock;
pub mod postgres;
