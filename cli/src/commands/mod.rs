pub mod cli;
pub mod operator;
