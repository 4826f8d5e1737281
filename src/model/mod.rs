pub mod attendance;
pub mod employee;
pub mod leave;
pub mod role;
pub mod schedule;
