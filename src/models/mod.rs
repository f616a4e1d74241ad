pub mod booking;
pub mod leave;
pub mod menu;
pub mod policy;
