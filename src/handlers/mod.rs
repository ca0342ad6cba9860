pub mod health_handlers;
pub mod portal_handlers;
