pub mod auth;
pub mod drive_service;
pub mod import_service;
pub mod report_service;
pub mod rules;
pub mod student_service;
pub mod vaccination_service;
