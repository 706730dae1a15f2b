pub mod account;
pub mod memory;
pub mod preference;
pub mod processed_email;
pub mod scan_state;
pub mod subscription;
