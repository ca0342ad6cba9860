pub mod directory_index;
pub mod portal_service;
