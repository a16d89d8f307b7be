pub mod chat;
pub mod gifts;
pub mod health;
pub mod testimonials;
