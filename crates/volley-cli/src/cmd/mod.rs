pub mod config;
pub mod gate;
pub mod init;
pub mod list;
pub mod load;
pub mod run;
pub mod session;
