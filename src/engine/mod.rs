pub mod downloader;
pub mod scheduler;
