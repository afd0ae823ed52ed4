pub mod plan_service;
pub mod sync_service;
