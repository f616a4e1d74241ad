pub mod bookings;
pub mod coordinator;
pub mod directory;
pub mod leaves;
pub mod menu;
pub mod notifications;
pub mod policy;
pub mod reporting;
pub mod scheduler;
pub mod validator;
