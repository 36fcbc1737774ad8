//! Square grid world: the agent starts in the top-left corner and looks for a
//! single piece of food, walking around a fixed block.

use crate::prng::Prng;
use spatium::step::{GridPoint, RenderingInfo, RenderingLayer};

pub const FOOD_REWARD: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GridAction {
    Up,
    Right,
    Down,
    Left,
}

impl GridAction {
    pub const ALL: [GridAction; 4] = [
        GridAction::Up,
        GridAction::Right,
        GridAction::Down,
        GridAction::Left,
    ];

    pub fn index(self) -> usize {
        match self {
            GridAction::Up => 0,
            GridAction::Right => 1,
            GridAction::Down => 2,
            GridAction::Left => 3,
        }
    }

    pub fn from_index(i: usize) -> Option<Self> {
        Self::ALL.get(i).copied()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GridAction::Up => "up",
            GridAction::Right => "right",
            GridAction::Down => "down",
            GridAction::Left => "left",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridEvent {
    Moved,
    /// Tried to leave the grid.
    Bump,
    /// Tried to walk into a block.
    Blocked,
    ReachedFood,
    Timeout,
    /// The episode was already over; nothing happened.
    Idle,
}

impl GridEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            GridEvent::Moved => "moved",
            GridEvent::Bump => "bump",
            GridEvent::Blocked => "blocked",
            GridEvent::ReachedFood => "reached_food",
            GridEvent::Timeout => "timeout",
            GridEvent::Idle => "idle",
        }
    }

    pub fn ends_episode(self) -> bool {
        matches!(self, GridEvent::ReachedFood | GridEvent::Timeout)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cell {
    pub x: u32,
    pub y: u32,
}

impl Cell {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

impl From<Cell> for GridPoint {
    fn from(c: Cell) -> Self {
        GridPoint { x: c.x, y: c.y }
    }
}

/// What the agent can observe: its own cell and, when food placement is
/// random, the food's cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateKey {
    pub agent: u32,
    pub food: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct FoodGrid {
    size: u32,
    max_steps: u32,
    random: bool,
    step: u32,
    agent: Cell,
    blocks: Vec<Cell>,
    food: Vec<Cell>,
    reward: u32,
    done: bool,
}

impl FoodGrid {
    /// Sizes below 2 are raised to 2. Fixed food placement needs at least 3,
    /// otherwise the food lands on the block.
    pub fn new(size: u32, max_steps: u32, random: bool, rng: &mut Prng) -> Self {
        let size = size.max(2);
        let mut grid = Self {
            size,
            max_steps,
            random,
            step: 0,
            agent: Cell::new(0, 0),
            blocks: vec![Cell::new(1, 1)],
            food: Vec::new(),
            reward: 0,
            done: false,
        };
        let food = if random {
            grid.random_empty_cell(rng)
        } else {
            Cell::new(size - 1, size - 1)
        };
        grid.food.push(food);
        grid
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn steps_taken(&self) -> u32 {
        self.step
    }

    pub fn reward(&self) -> u32 {
        self.reward
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn agent(&self) -> Cell {
        self.agent
    }

    pub fn food(&self) -> &[Cell] {
        &self.food
    }

    fn is_free(&self, cell: Cell) -> bool {
        cell != self.agent && !self.food.contains(&cell) && !self.blocks.contains(&cell)
    }

    fn random_empty_cell(&self, rng: &mut Prng) -> Cell {
        loop {
            let cell = Cell::new(
                rng.gen_range_usize(0, self.size as usize) as u32,
                rng.gen_range_usize(0, self.size as usize) as u32,
            );
            if self.is_free(cell) {
                return cell;
            }
        }
    }

    fn index(&self, cell: Cell) -> u32 {
        cell.y * self.size + cell.x
    }

    pub fn state_key(&self) -> StateKey {
        StateKey {
            agent: self.index(self.agent),
            food: if self.random {
                self.food.first().map(|&f| self.index(f))
            } else {
                None
            },
        }
    }

    pub fn step(&mut self, action: GridAction) -> GridEvent {
        if self.done {
            return GridEvent::Idle;
        }

        let Cell { x, y } = self.agent;
        let target = match action {
            GridAction::Up if y > 0 => Some(Cell::new(x, y - 1)),
            GridAction::Right if x + 1 < self.size => Some(Cell::new(x + 1, y)),
            GridAction::Down if y + 1 < self.size => Some(Cell::new(x, y + 1)),
            GridAction::Left if x > 0 => Some(Cell::new(x - 1, y)),
            _ => None,
        };

        let moved = match target {
            None => GridEvent::Bump,
            Some(cell) if self.blocks.contains(&cell) => GridEvent::Blocked,
            Some(cell) => {
                self.agent = cell;
                GridEvent::Moved
            }
        };

        self.step += 1;
        if self.food.contains(&self.agent) {
            self.reward += FOOD_REWARD;
            self.done = true;
            return GridEvent::ReachedFood;
        }
        if self.step >= self.max_steps {
            self.done = true;
            return GridEvent::Timeout;
        }
        moved
    }

    pub fn rendering_info(&self) -> RenderingInfo {
        let layer = |name: &str, cells: &[Cell]| RenderingLayer {
            name: name.to_string(),
            points: cells.iter().map(|&c| c.into()).collect(),
        };
        RenderingInfo::Layers {
            width: self.size,
            height: self.size,
            layers: vec![
                layer("food", &self.food),
                layer("agent", &[self.agent]),
                layer("block", &self.blocks),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed(size: u32, max_steps: u32) -> FoodGrid {
        FoodGrid::new(size, max_steps, false, &mut Prng::new(1))
    }

    #[test]
    fn fixed_food_sits_in_the_far_corner() {
        let g = fixed(4, 16);
        assert_eq!(g.food(), &[Cell::new(3, 3)]);
        assert_eq!(g.agent(), Cell::new(0, 0));
        assert_eq!(g.state_key().food, None);
    }

    #[test]
    fn edges_and_blocks_stop_the_agent() {
        let mut g = fixed(4, 16);
        assert_eq!(g.step(GridAction::Up), GridEvent::Bump);
        assert_eq!(g.step(GridAction::Left), GridEvent::Bump);
        assert_eq!(g.step(GridAction::Right), GridEvent::Moved);
        assert_eq!(g.step(GridAction::Down), GridEvent::Blocked);
        assert_eq!(g.agent(), Cell::new(1, 0));
        assert_eq!(g.steps_taken(), 4);
    }

    #[test]
    fn reaching_food_ends_the_episode_with_reward() {
        let mut g = fixed(3, 12);
        assert_eq!(g.step(GridAction::Right), GridEvent::Moved);
        assert_eq!(g.step(GridAction::Right), GridEvent::Moved);
        assert_eq!(g.step(GridAction::Down), GridEvent::Moved);
        assert_eq!(g.step(GridAction::Down), GridEvent::ReachedFood);
        assert!(g.is_done());
        assert_eq!(g.reward(), FOOD_REWARD);
        assert_eq!(g.step(GridAction::Left), GridEvent::Idle);
        assert_eq!(g.steps_taken(), 4);
    }

    #[test]
    fn times_out_after_max_steps() {
        let mut g = fixed(5, 3);
        assert_eq!(g.step(GridAction::Up), GridEvent::Bump);
        assert_eq!(g.step(GridAction::Up), GridEvent::Bump);
        assert_eq!(g.step(GridAction::Up), GridEvent::Timeout);
        assert!(g.is_done());
        assert_eq!(g.reward(), 0);
    }

    #[test]
    fn random_food_never_overlaps() {
        let mut rng = Prng::new(99);
        for _ in 0..200 {
            let g = FoodGrid::new(2, 8, true, &mut rng);
            let food = g.food()[0];
            assert_ne!(food, Cell::new(0, 0));
            assert_ne!(food, Cell::new(1, 1));
            assert!(g.state_key().food.is_some());
        }
    }

    #[test]
    fn rendering_layers_are_named() {
        let g = fixed(3, 12);
        match g.rendering_info() {
            RenderingInfo::Layers {
                width,
                height,
                layers,
            } => {
                assert_eq!((width, height), (3, 3));
                let names: Vec<&str> = layers.iter().map(|l| l.name.as_str()).collect();
                assert_eq!(names, ["food", "agent", "block"]);
                assert_eq!(layers[1].points, vec![GridPoint { x: 0, y: 0 }]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn actions_round_trip_through_index() {
        for a in GridAction::ALL {
            assert_eq!(GridAction::from_index(a.index()), Some(a));
        }
        assert_eq!(GridAction::from_index(4), None);
    }
}
