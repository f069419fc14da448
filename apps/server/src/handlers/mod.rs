pub mod admin;
pub mod analytics;
pub mod availability;
pub mod booking;
pub mod health;
pub mod session;
