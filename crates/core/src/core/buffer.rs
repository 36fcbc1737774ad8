//! Append-only step storage shared (by ownership, not by locking) between the
//! engine side of a session and the playback scheduler.

use crate::step::Step;
use std::ops::Range;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BufferError {
    #[error("step {index} not found (buffer holds {len} steps)")]
    NotFound { index: usize, len: usize },
}

/// Ordered store of produced steps.
///
/// Indices are stable once assigned and the only mutation is [`StepBuffer::append`].
/// Appending takes `&mut self`, so a reader can never observe a length that is
/// ahead of the stored steps.
#[derive(Debug, Clone, Default)]
pub struct StepBuffer {
    steps: Vec<Step>,
    terminated: bool,
}

impl StepBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            steps: Vec::with_capacity(capacity),
            terminated: false,
        }
    }

    /// Append a batch in arrival order. Returns the number of steps appended.
    pub fn append<I>(&mut self, steps: I) -> usize
    where
        I: IntoIterator<Item = Step>,
    {
        let before = self.steps.len();
        for step in steps {
            if step.kind().is_terminal() {
                self.terminated = true;
            }
            self.steps.push(step);
        }
        self.steps.len() - before
    }

    pub fn get(&self, index: usize) -> Result<&Step, BufferError> {
        self.steps.get(index).ok_or(BufferError::NotFound {
            index,
            len: self.steps.len(),
        })
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn last(&self) -> Option<&Step> {
        self.steps.last()
    }

    /// Steps in `range`, clamped to what has been produced so far.
    pub fn range(&self, range: Range<usize>) -> &[Step] {
        let end = range.end.min(self.steps.len());
        let start = range.start.min(end);
        &self.steps[start..end]
    }

    /// Whether the engine's end-of-stream step has been appended.
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_preserves_arrival_order() {
        let mut buf = StepBuffer::new();
        assert_eq!(buf.append(vec![Step::new(0, 0, "a"), Step::new(0, 1, "b")]), 2);
        assert_eq!(buf.append(vec![Step::new(1, 0, "c")]), 1);
        assert_eq!(buf.append(Vec::new()), 0);

        let actions: Vec<&str> = buf.range(0..10).iter().map(|s| s.action.as_str()).collect();
        assert_eq!(actions, ["a", "b", "c"]);
        assert_eq!(buf.get(2).unwrap().episode, 1);
        assert_eq!(buf.last().map(|s| s.action.as_str()), Some("c"));
    }

    #[test]
    fn get_past_end_is_not_found() {
        let mut buf = StepBuffer::new();
        assert_eq!(buf.get(0), Err(BufferError::NotFound { index: 0, len: 0 }));
        buf.append(vec![Step::new(0, 0, "")]);
        assert_eq!(buf.get(1), Err(BufferError::NotFound { index: 1, len: 1 }));
        assert!(buf.range(5..9).is_empty());
    }

    #[test]
    fn terminal_step_marks_end_of_stream() {
        let mut buf = StepBuffer::new();
        buf.append(vec![Step::new(0, 0, "")]);
        assert!(!buf.is_terminated());
        buf.append(vec![Step::new(0, 1, "").with_episode_result(1.0, 1).terminal()]);
        assert!(buf.is_terminated());
    }
}
