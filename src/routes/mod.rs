pub mod bookings;
pub mod health;
pub mod policy;
pub mod reports;
