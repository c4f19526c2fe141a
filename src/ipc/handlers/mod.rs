pub mod core;
pub mod dashboard;
pub mod import_export;
pub mod prefs;
pub mod schools;
pub mod setup;
pub mod students;
pub mod teachers;
