use serde::{Deserialize, Serialize};

const RECENT_WINDOW: usize = 100;

/// Running per-episode outcome counters for the food grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeStats {
    pub episodes: u32,
    pub food_found: u32,
    pub timeouts: u32,
    /// Fewest steps any food-reaching episode took.
    pub best_steps: Option<u32>,
    pub recent: Vec<bool>,
    pub first_food_at_episode: Option<u32>,
}

impl EpisodeStats {
    pub fn new() -> Self {
        Self {
            episodes: 0,
            food_found: 0,
            timeouts: 0,
            best_steps: None,
            recent: Vec::with_capacity(RECENT_WINDOW),
            first_food_at_episode: None,
        }
    }

    /// Record one finished episode. Returns true if it set a new best.
    pub fn record_episode(&mut self, reached_food: bool, steps: u32) -> bool {
        let mut new_best = false;
        if reached_food {
            self.food_found += 1;
            if self.first_food_at_episode.is_none() {
                self.first_food_at_episode = Some(self.episodes);
            }
            if self.best_steps.map_or(true, |best| steps < best) {
                self.best_steps = Some(steps);
                new_best = true;
            }
        } else {
            self.timeouts += 1;
        }

        self.recent.push(reached_food);
        if self.recent.len() > RECENT_WINDOW {
            self.recent.remove(0);
        }

        self.episodes += 1;
        new_best
    }

    pub fn success_rate(&self) -> f32 {
        if self.episodes == 0 {
            0.0
        } else {
            self.food_found as f32 / self.episodes as f32
        }
    }

    pub fn recent_rate(&self) -> f32 {
        if self.recent.is_empty() {
            return 0.0;
        }
        let found = self.recent.iter().filter(|&&x| x).count();
        found as f32 / self.recent.len() as f32
    }
}

impl Default for EpisodeStats {
    fn default() -> Self {
        Self::new()
    }
}
