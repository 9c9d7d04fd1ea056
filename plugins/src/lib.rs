pub mod backend;
pub mod factory;
