pub mod active_workout;
pub mod exercise_definition;
pub mod exercise_instance;
pub mod gym_set;
pub mod user;
pub mod workout;
