pub mod async_task;
pub mod cluster;
pub mod file_io;
