//! Reference stepping engines for the spatium playback pipeline.
//!
//! The only engine today is the food grid: a square world with one block and
//! one piece of food, explored by a tabular Q-learning agent whose exploration
//! rate decays over episodes. It is synchronous and allocation-light; hosts
//! drive it from a blocking task.

pub mod engine;
pub mod food_grid;
pub mod prng;
pub mod qtable;
pub mod stats;

pub use engine::{FoodGridEngine, FoodGridParams};
