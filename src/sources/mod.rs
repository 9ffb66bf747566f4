pub mod syslog;
pub mod tcp;
