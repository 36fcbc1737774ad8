//! Tabular Q-learning with an epsilon-greedy policy.

use crate::food_grid::{GridAction, StateKey};
use crate::prng::Prng;
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

pub const DEFAULT_LEARNING_RATE: f32 = 0.8;
pub const DEFAULT_DISCOUNT_FACTOR: f32 = 0.95;

/// Linear decay of the exploration rate from `initial_rate` at episode 0 to
/// `final_rate` at `final_episode`, flat afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplorationSchedule {
    pub initial_rate: f64,
    pub final_rate: f64,
    pub final_episode: u64,
}

impl Default for ExplorationSchedule {
    fn default() -> Self {
        Self {
            initial_rate: 1.0,
            final_rate: 0.05,
            final_episode: 500,
        }
    }
}

impl ExplorationSchedule {
    pub fn rate(&self, episode: u64) -> f64 {
        if episode >= self.final_episode {
            return self.final_rate;
        }
        let t = episode as f64 / self.final_episode as f64;
        self.initial_rate + (self.final_rate - self.initial_rate) * t
    }

    /// First episode at which the rate has reached its floor.
    pub fn floor_episode(&self) -> u64 {
        self.final_episode
    }
}

#[derive(Debug, Clone)]
pub struct QTable {
    q: HashMap<StateKey, [f32; 4]>,
    learning_rate: f32,
    discount: f32,
}

impl Default for QTable {
    fn default() -> Self {
        Self::new(DEFAULT_LEARNING_RATE, DEFAULT_DISCOUNT_FACTOR)
    }
}

impl QTable {
    pub fn new(learning_rate: f32, discount: f32) -> Self {
        Self {
            q: HashMap::new(),
            learning_rate,
            discount,
        }
    }

    /// Number of states visited so far.
    pub fn len(&self) -> usize {
        self.q.len()
    }

    pub fn is_empty(&self) -> bool {
        self.q.is_empty()
    }

    pub fn values(&self, state: &StateKey) -> [f32; 4] {
        self.q.get(state).copied().unwrap_or([0.0; 4])
    }

    pub fn greedy(&self, state: &StateKey) -> GridAction {
        let (i, _) = argmax(&self.values(state));
        GridAction::from_index(i).unwrap_or(GridAction::Up)
    }

    pub fn select(&self, state: &StateKey, exploration_rate: f64, rng: &mut Prng) -> GridAction {
        if rng.chance(exploration_rate) {
            GridAction::ALL[rng.gen_range_usize(0, GridAction::ALL.len())]
        } else {
            self.greedy(state)
        }
    }

    /// One Bellman update. Terminal transitions don't bootstrap from `next`.
    pub fn update(
        &mut self,
        state: StateKey,
        action: GridAction,
        reward: f32,
        next: &StateKey,
        done: bool,
    ) {
        let future = if done {
            0.0
        } else {
            argmax(&self.values(next)).1
        };
        let row = self.q.entry(state).or_insert([0.0; 4]);
        let existing = row[action.index()];
        row[action.index()] =
            existing + self.learning_rate * (reward + self.discount * future - existing);
    }
}

fn argmax(values: &[f32; 4]) -> (usize, f32) {
    values
        .iter()
        .enumerate()
        .fold((0, f32::MIN), |(best_i, best), (i, &v)| {
            if v > best {
                (i, v)
            } else {
                (best_i, best)
            }
        })
}
