pub mod core;
pub mod migrations;
pub mod students;
pub mod subjects;
