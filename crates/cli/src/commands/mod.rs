pub mod chat;
pub mod jobs;
pub mod run_tool;
pub mod status;
pub mod tools;
