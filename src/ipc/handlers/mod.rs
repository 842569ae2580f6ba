pub mod attendance;
pub mod backup_exchange;
pub mod core;
pub mod departments;
pub mod import;
pub mod personnel;
pub mod reports;
pub mod schedule;
pub mod sections;
pub mod setup;
pub mod staff;
pub mod students;
pub mod subjects;
pub mod summary;
