pub mod command;
pub mod error;
pub mod fs;
pub mod system;
pub mod time;
