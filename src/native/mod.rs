pub mod process;
pub mod time;
