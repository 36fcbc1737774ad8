//! The food grid driven by a Q-table agent, exposed as a [`spatium::engine::Engine`].

use crate::food_grid::{FoodGrid, GridAction, GridEvent};
use crate::prng::Prng;
use crate::qtable::{
    ExplorationSchedule, QTable, DEFAULT_DISCOUNT_FACTOR, DEFAULT_LEARNING_RATE,
};
use crate::stats::EpisodeStats;
use serde::{Deserialize, Serialize};
use spatium::engine::{Engine, EngineError};
use spatium::step::Step;

const PROGRESS_EVERY: u64 = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FoodGridParams {
    pub size: u32,
    /// Defaults to `4 * size`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_steps: Option<u32>,
    /// Place the food at random; otherwise it sits in the far corner.
    pub random: bool,
    pub max_episodes: u64,
    pub learning_rate: f32,
    pub discount_factor: f32,
    pub exploration: ExplorationSchedule,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for FoodGridParams {
    fn default() -> Self {
        Self {
            size: 5,
            max_steps: None,
            random: true,
            max_episodes: 3000,
            learning_rate: DEFAULT_LEARNING_RATE,
            discount_factor: DEFAULT_DISCOUNT_FACTOR,
            exploration: ExplorationSchedule::default(),
            seed: None,
        }
    }
}

impl FoodGridParams {
    pub fn max_steps(&self) -> u32 {
        self.max_steps.unwrap_or(self.size.saturating_mul(4))
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        let invalid = |msg: String| -> Result<(), EngineError> {
            Err(EngineError::InvalidParameters(msg))
        };
        if self.size < 2 {
            return invalid(format!("size must be at least 2, got {}", self.size));
        }
        if !self.random && self.size < 3 {
            return invalid("fixed food placement needs size of at least 3".to_string());
        }
        if self.max_steps() == 0 {
            return invalid("maxSteps must be positive".to_string());
        }
        if self.max_episodes == 0 {
            return invalid("maxEpisodes must be positive".to_string());
        }
        for (name, v) in [
            ("learningRate", f64::from(self.learning_rate)),
            ("discountFactor", f64::from(self.discount_factor)),
            ("exploration.initialRate", self.exploration.initial_rate),
            ("exploration.finalRate", self.exploration.final_rate),
        ] {
            if !(0.0..=1.0).contains(&v) {
                return invalid(format!("{name} must be within [0, 1], got {v}"));
            }
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct FoodGridEngine {
    params: Option<FoodGridParams>,
    rng: Prng,
    q: QTable,
    stats: EpisodeStats,
    episode: u64,
    // `None` between episodes: the next step opens a fresh grid.
    grid: Option<FoodGrid>,
    floor_announced: bool,
    finished: bool,
    logs: Vec<String>,
}

impl Default for FoodGridEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl FoodGridEngine {
    pub fn new() -> Self {
        Self {
            params: None,
            rng: Prng::from_clock(),
            q: QTable::default(),
            stats: EpisodeStats::new(),
            episode: 0,
            grid: None,
            floor_announced: false,
            finished: false,
            logs: Vec::new(),
        }
    }

    pub fn stats(&self) -> &EpisodeStats {
        &self.stats
    }

    pub fn episode(&self) -> u64 {
        self.episode
    }

    fn open_episode(&mut self, params: &FoodGridParams) -> Step {
        let grid = FoodGrid::new(
            params.size,
            params.max_steps(),
            params.random,
            &mut self.rng,
        );
        let mut step =
            Step::new(self.episode, 0, "start").with_rendering_info(grid.rendering_info());
        if !self.floor_announced && self.episode >= params.exploration.floor_episode() {
            self.floor_announced = true;
            step = step.with_annotation("Exploration floor reached");
        }
        self.grid = Some(grid);
        step
    }

    fn close_episode(
        &mut self,
        action: GridAction,
        reached_food: bool,
        steps: u32,
        params: &FoodGridParams,
    ) -> Step {
        let mut step = Step::new(self.episode, steps, action.as_str());
        if self.stats.record_episode(reached_food, steps) {
            step = step.with_annotation(format!("New best: {steps} steps"));
        }
        self.grid = None;
        self.episode += 1;
        if self.episode % PROGRESS_EVERY == 0 {
            self.logs.push(format!(
                "Episode {}: food found in {:.0}% of the last {} episodes, {} states known",
                self.episode,
                self.stats.recent_rate() * 100.0,
                self.stats.recent.len(),
                self.q.len()
            ));
        }
        if self.episode >= params.max_episodes {
            self.finished = true;
            self.logs.push(format!(
                "Finished {} episodes, food found in {:.0}%, best {} steps",
                self.episode,
                self.stats.success_rate() * 100.0,
                self.stats
                    .best_steps
                    .map_or("-".to_string(), |b| b.to_string())
            ));
            step = step.terminal();
        }
        step.with_episode_result(f64::from(steps), steps)
    }
}

impl Engine for FoodGridEngine {
    fn configure(&mut self, parameters: &serde_json::Value) -> Result<(), EngineError> {
        let params: FoodGridParams = serde_json::from_value(parameters.clone())
            .map_err(|e| EngineError::InvalidParameters(e.to_string()))?;
        params.validate()?;

        self.rng = params.seed.map_or_else(Prng::from_clock, Prng::new);
        self.q = QTable::new(params.learning_rate, params.discount_factor);
        self.stats = EpisodeStats::new();
        self.episode = 0;
        self.grid = None;
        self.floor_announced = false;
        self.finished = false;
        self.logs.push(format!(
            "Configured food grid: size={} maxSteps={} random={} maxEpisodes={}",
            params.size,
            params.max_steps(),
            params.random,
            params.max_episodes
        ));
        self.params = Some(params);
        Ok(())
    }

    fn step(&mut self) -> Result<Option<Step>, EngineError> {
        let params = self.params.clone().ok_or(EngineError::NotConfigured)?;
        if self.finished {
            return Ok(None);
        }
        let Some(grid) = self.grid.as_mut() else {
            return Ok(Some(self.open_episode(&params)));
        };

        let state = grid.state_key();
        let action = self
            .q
            .select(&state, params.exploration.rate(self.episode), &mut self.rng);
        let reward_before = grid.reward();
        let event = grid.step(action);
        let reward = (grid.reward() - reward_before) as f32;
        let next = grid.state_key();
        let steps = grid.steps_taken();
        let rendering = grid.rendering_info();
        let done = event.ends_episode();
        self.q.update(state, action, reward, &next, done);

        let step = if done {
            self.close_episode(action, event == GridEvent::ReachedFood, steps, &params)
        } else {
            Step::new(self.episode, steps, action.as_str())
        };
        Ok(Some(step.with_rendering_info(rendering)))
    }

    fn take_logs(&mut self) -> Vec<String> {
        std::mem::take(&mut self.logs)
    }
}
