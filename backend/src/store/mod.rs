pub mod drives;
pub mod students;
