pub mod assistant;
pub mod tools;
