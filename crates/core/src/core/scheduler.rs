//! Frame-paced playback over a [`StepBuffer`].
//!
//! The scheduler is driven by an external clock: whoever owns it calls
//! [`PlaybackScheduler::tick`] periodically with the current instant. Each tick
//! either advances the cursor once or defers; it never blocks and never sleeps.

use crate::buffer::StepBuffer;
use std::time::{Duration, Instant};

/// Numerator/denominator of the fast-forward target, as a fraction of the
/// buffer length.
const FAST_FORWARD_NUM: usize = 5;
const FAST_FORWARD_DEN: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferReason {
    /// Nothing has been produced yet.
    Waiting,
    /// Not enough time has passed since the last advance.
    Throttled,
    /// The cursor already sits on the newest step.
    Underrun,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advance {
    pub from: usize,
    pub to: usize,
    /// The end-of-episode rule moved the cursor further than one step.
    pub fast_forwarded: bool,
    /// Steps consumed by this advance, in index order. Starts at the first step
    /// not seen by an earlier advance and ends at `to` inclusive.
    pub consumed: std::ops::Range<usize>,
    /// The cursor landed on the end-of-stream step.
    pub reached_end: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// `running` is false; the owner should stop scheduling ticks.
    Halted,
    Deferred(DeferReason),
    Advanced(Advance),
    /// The end-of-stream step is displayed and nothing is left to play.
    Finished,
}

#[derive(Debug, Clone)]
pub struct PlaybackScheduler {
    running: bool,
    fps: u32,
    cursor: usize,
    // Number of leading buffer steps already consumed by advances.
    consumed: usize,
    last_advance: Option<Instant>,
    pending_single_steps: u32,
    finished: bool,
}

impl PlaybackScheduler {
    pub fn new(fps: u32) -> Self {
        Self {
            running: false,
            fps,
            cursor: 0,
            consumed: 0,
            last_advance: None,
            pending_single_steps: 0,
            finished: false,
        }
    }

    /// Begin (or resume) continuous playback. `now` is the pacing baseline, so
    /// the first advance happens one frame interval later.
    pub fn start(&mut self, now: Instant) {
        self.running = true;
        self.last_advance = Some(now);
    }

    pub fn stop(&mut self) {
        self.running = false;
        self.pending_single_steps = 0;
    }

    /// Queue one advance that ignores both the running flag and the frame
    /// interval. It waits (as an underrun) until a new step is available.
    /// While running it plays the next step right away instead of on the
    /// next frame.
    pub fn request_single_step(&mut self) {
        self.pending_single_steps = self.pending_single_steps.saturating_add(1);
    }

    pub fn set_fps(&mut self, fps: u32) {
        self.fps = fps;
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn pending_single_steps(&self) -> u32 {
        self.pending_single_steps
    }

    /// Whether the owner should keep delivering ticks.
    pub fn wants_tick(&self) -> bool {
        !self.finished && (self.running || self.pending_single_steps > 0)
    }

    /// `None` when throttling is disabled (`fps == 0`).
    pub fn frame_interval(&self) -> Option<Duration> {
        if self.fps == 0 {
            None
        } else {
            Some(Duration::from_nanos(1_000_000_000 / u64::from(self.fps)))
        }
    }

    pub fn tick(&mut self, now: Instant, buffer: &StepBuffer) -> TickOutcome {
        if self.finished {
            return TickOutcome::Finished;
        }
        let single = self.pending_single_steps > 0;
        if !self.running && !single {
            return TickOutcome::Halted;
        }
        if buffer.is_empty() {
            return TickOutcome::Deferred(DeferReason::Waiting);
        }

        if !single {
            if let Some(interval) = self.frame_interval() {
                match self.last_advance {
                    Some(last) if now.saturating_duration_since(last) <= interval => {
                        return TickOutcome::Deferred(DeferReason::Throttled);
                    }
                    Some(_) => {}
                    None => {
                        self.last_advance = Some(now);
                        return TickOutcome::Deferred(DeferReason::Throttled);
                    }
                }
            }
        }

        let len = buffer.len();
        let mut next = (self.cursor + 1).min(len - 1);
        if next < self.consumed {
            // Already showing the newest step.
            if buffer.is_terminated() && self.cursor == len - 1 {
                self.finished = true;
                return TickOutcome::Finished;
            }
            return TickOutcome::Deferred(DeferReason::Underrun);
        }

        let mut fast_forwarded = false;
        let lands_on_episode_end = buffer
            .get(next)
            .map(|s| s.kind().ends_episode())
            .unwrap_or(false);
        if lands_on_episode_end {
            let ideal_min = len * FAST_FORWARD_NUM / FAST_FORWARD_DEN;
            if ideal_min > next {
                next = ideal_min;
                fast_forwarded = true;
            }
        }

        let from = self.cursor;
        let consumed = self.consumed..next + 1;
        self.cursor = next;
        self.consumed = next + 1;
        self.last_advance = Some(now);
        if single {
            self.pending_single_steps -= 1;
        }

        let reached_end = buffer
            .get(next)
            .map(|s| s.kind().is_terminal())
            .unwrap_or(false);
        if reached_end {
            self.finished = true;
        }

        TickOutcome::Advanced(Advance {
            from,
            to: next,
            fast_forwarded,
            consumed,
            reached_end,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::Step;

    fn regular(n: usize) -> Vec<Step> {
        (0..n).map(|i| Step::new(0, i as u32, "")).collect()
    }

    fn advanced(outcome: TickOutcome) -> Advance {
        match outcome {
            TickOutcome::Advanced(a) => a,
            other => panic!("expected an advance, got {other:?}"),
        }
    }

    #[test]
    fn halted_when_not_running() {
        let mut s = PlaybackScheduler::new(10);
        let mut buf = StepBuffer::new();
        buf.append(regular(3));
        assert_eq!(s.tick(Instant::now(), &buf), TickOutcome::Halted);
        assert!(!s.wants_tick());
    }

    #[test]
    fn empty_buffer_waits() {
        let mut s = PlaybackScheduler::new(0);
        s.start(Instant::now());
        let buf = StepBuffer::new();
        assert_eq!(
            s.tick(Instant::now(), &buf),
            TickOutcome::Deferred(DeferReason::Waiting)
        );
        assert!(s.wants_tick());
    }

    #[test]
    fn throttles_by_time_since_last_advance() {
        let t0 = Instant::now();
        let mut s = PlaybackScheduler::new(10);
        let mut buf = StepBuffer::new();
        buf.append(regular(10));
        s.start(t0);

        let at = |ms: u64| t0 + Duration::from_millis(ms);
        assert_eq!(
            s.tick(at(50), &buf),
            TickOutcome::Deferred(DeferReason::Throttled)
        );
        assert_eq!(
            s.tick(at(100), &buf),
            TickOutcome::Deferred(DeferReason::Throttled)
        );
        assert_eq!(advanced(s.tick(at(101), &buf)).to, 1);
        // Interval restarts from the advance, not from the last tick.
        assert_eq!(
            s.tick(at(180), &buf),
            TickOutcome::Deferred(DeferReason::Throttled)
        );
        assert_eq!(advanced(s.tick(at(202), &buf)).to, 2);
    }

    #[test]
    fn zero_fps_advances_on_every_tick() {
        let t0 = Instant::now();
        let mut s = PlaybackScheduler::new(0);
        let mut buf = StepBuffer::new();
        buf.append(regular(4));
        s.start(t0);
        for want in 1..4 {
            assert_eq!(advanced(s.tick(t0, &buf)).to, want);
        }
        assert_eq!(
            s.tick(t0, &buf),
            TickOutcome::Deferred(DeferReason::Underrun)
        );
    }

    #[test]
    fn first_advance_consumes_from_the_start() {
        let t0 = Instant::now();
        let mut s = PlaybackScheduler::new(0);
        let mut buf = StepBuffer::new();
        buf.append(regular(5));
        s.start(t0);
        let a = advanced(s.tick(t0, &buf));
        assert_eq!((a.from, a.to, a.consumed), (0, 1, 0..2));
        let a = advanced(s.tick(t0, &buf));
        assert_eq!(a.consumed, 2..3);
    }

    #[test]
    fn single_buffered_step_is_shown_once() {
        let t0 = Instant::now();
        let mut s = PlaybackScheduler::new(0);
        let mut buf = StepBuffer::new();
        buf.append(regular(1));
        s.start(t0);
        let a = advanced(s.tick(t0, &buf));
        assert_eq!((a.from, a.to, a.consumed), (0, 0, 0..1));
        assert_eq!(
            s.tick(t0, &buf),
            TickOutcome::Deferred(DeferReason::Underrun)
        );
        buf.append(regular(1));
        assert_eq!(advanced(s.tick(t0, &buf)).to, 1);
    }

    #[test]
    fn fast_forwards_on_episode_end() {
        let t0 = Instant::now();
        let mut s = PlaybackScheduler::new(0);
        let mut buf = StepBuffer::new();
        buf.append(vec![
            Step::new(0, 0, ""),
            Step::new(0, 1, "").with_episode_result(4.0, 1),
            Step::new(1, 0, ""),
        ]);
        s.start(t0);
        let a = advanced(s.tick(t0, &buf));
        assert_eq!(a.to, 2);
        assert!(a.fast_forwarded);
        assert_eq!(a.consumed, 0..3);
        assert_eq!(s.cursor(), 2);
    }

    #[test]
    fn fast_forward_lands_at_five_sixths_of_the_buffer() {
        let t0 = Instant::now();
        let mut s = PlaybackScheduler::new(0);
        let mut buf = StepBuffer::new();
        let mut steps = regular(60);
        steps[1] = Step::new(0, 1, "").with_episode_result(1.0, 1);
        buf.append(steps);
        s.start(t0);
        let a = advanced(s.tick(t0, &buf));
        assert_eq!(a.to, 50);
        assert!(s.cursor() >= buf.len() * 5 / 6);
    }

    #[test]
    fn cursor_is_monotonic_and_in_bounds() {
        let t0 = Instant::now();
        let mut s = PlaybackScheduler::new(0);
        let mut buf = StepBuffer::new();
        s.start(t0);
        let mut last = 0;
        for round in 0..40u32 {
            let batch: Vec<Step> = (0..(round % 5))
                .map(|i| {
                    let step = Step::new(round as u64, i, "");
                    if i == 2 {
                        step.with_episode_result(i as f64, i)
                    } else {
                        step
                    }
                })
                .collect();
            buf.append(batch);
            for _ in 0..3 {
                s.tick(t0, &buf);
                if !buf.is_empty() {
                    assert!(s.cursor() < buf.len());
                }
                assert!(s.cursor() >= last);
                last = s.cursor();
            }
        }
    }

    #[test]
    fn single_step_ignores_running_flag_and_interval() {
        let t0 = Instant::now();
        let mut s = PlaybackScheduler::new(1);
        let mut buf = StepBuffer::new();
        buf.append(regular(1));
        s.request_single_step();
        assert!(s.wants_tick());
        assert_eq!(advanced(s.tick(t0, &buf)).to, 0);
        assert!(!s.wants_tick());
        assert_eq!(s.tick(t0, &buf), TickOutcome::Halted);

        // A second request waits for the engine to deliver.
        s.request_single_step();
        assert_eq!(
            s.tick(t0, &buf),
            TickOutcome::Deferred(DeferReason::Underrun)
        );
        buf.append(regular(1));
        assert_eq!(advanced(s.tick(t0, &buf)).to, 1);
        assert_eq!(s.pending_single_steps(), 0);
    }

    #[test]
    fn single_step_while_running_skips_the_interval() {
        let t0 = Instant::now();
        let mut s = PlaybackScheduler::new(1);
        let mut buf = StepBuffer::new();
        buf.append(regular(5));
        s.start(t0);
        let soon = t0 + Duration::from_millis(10);
        assert_eq!(
            s.tick(soon, &buf),
            TickOutcome::Deferred(DeferReason::Throttled)
        );

        s.request_single_step();
        assert_eq!(advanced(s.tick(soon, &buf)).to, 1);
        assert_eq!(s.pending_single_steps(), 0);
        assert!(s.is_running());
        // Pacing resumes from the forced advance.
        assert_eq!(
            s.tick(soon, &buf),
            TickOutcome::Deferred(DeferReason::Throttled)
        );
    }

    #[test]
    fn finishes_on_terminal_step() {
        let t0 = Instant::now();
        let mut s = PlaybackScheduler::new(0);
        let mut buf = StepBuffer::new();
        buf.append(vec![
            Step::new(0, 0, ""),
            Step::new(0, 1, ""),
            Step::new(0, 2, "").with_episode_result(2.0, 2).terminal(),
        ]);
        s.start(t0);
        assert!(!advanced(s.tick(t0, &buf)).reached_end);
        let a = advanced(s.tick(t0, &buf));
        assert!(a.reached_end);
        assert!(s.is_finished());
        assert!(!s.wants_tick());
        assert_eq!(s.tick(t0, &buf), TickOutcome::Finished);
    }
}
