//! Time-based value interpolation for blur amount, crossfade alpha, duotone
//! mix, and touch distortion decay.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Easing {
    Linear,
    /// Cosine ease-in-out: slow start, slow finish.
    EaseInOut,
}

impl Easing {
    fn apply(self, t: f32) -> f32 {
        match self {
            Self::Linear => t,
            Self::EaseInOut => 0.5 - 0.5 * (std::f32::consts::PI * t).cos(),
        }
    }
}

/// Eased ramp from `start` to `end` over `duration`. While running,
/// `current` always equals `start + easing(t) * (end - start)`; once the ramp
/// completes it is pinned at `end`. Retargeting via [`Animator::start`]
/// begins from the current (possibly mid-flight) value, which is the
/// system's only retarget mechanism.
#[derive(Debug, Clone)]
pub struct Animator {
    start: f32,
    end: f32,
    start_time: Instant,
    duration: Duration,
    easing: Easing,
    current: f32,
    running: bool,
}

impl Animator {
    pub fn new(initial: f32, duration: Duration, easing: Easing) -> Self {
        Self {
            start: initial,
            end: initial,
            start_time: Instant::now(),
            duration,
            easing,
            current: initial,
            running: false,
        }
    }

    /// Begins animating toward `to` from the current value. Restarting with
    /// the same target retriggers the ramp from `t = 0`.
    pub fn start(&mut self, to: f32, now: Instant) {
        self.start_from(self.current, to, now);
    }

    pub fn start_from(&mut self, from: f32, to: f32, now: Instant) {
        self.start = from;
        self.end = to;
        self.current = from;
        self.start_time = now;
        self.running = true;
        if self.duration.is_zero() {
            self.current = to;
            self.running = false;
        }
    }

    /// Advances the ramp. Returns `true` while still running; the tick that
    /// completes the ramp pins `current` to exactly `end` and returns
    /// `false`.
    pub fn tick(&mut self, now: Instant) -> bool {
        if !self.running {
            return false;
        }
        let elapsed = now.saturating_duration_since(self.start_time);
        let t = (elapsed.as_secs_f32() / self.duration.as_secs_f32()).clamp(0.0, 1.0);
        if t >= 1.0 {
            self.current = self.end;
            self.running = false;
        } else {
            self.current = self.start + self.easing.apply(t) * (self.end - self.start);
        }
        self.running
    }

    /// Pins the value without animating.
    pub fn snap_to(&mut self, value: f32) {
        self.start = value;
        self.end = value;
        self.current = value;
        self.running = false;
    }

    /// Jumps to the end of the current ramp.
    pub fn finish(&mut self) {
        self.current = self.end;
        self.running = false;
    }

    pub fn set_duration(&mut self, duration: Duration) {
        self.duration = duration;
    }

    pub fn value(&self) -> f32 {
        self.current
    }

    pub fn target(&self) -> f32 {
        self.end
    }

    pub fn is_running(&self) -> bool {
        self.running
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn anim(easing: Easing) -> (Animator, Instant) {
        let now = Instant::now();
        let mut a = Animator::new(0.0, Duration::from_millis(100), easing);
        a.start_from(0.0, 10.0, now);
        (a, now)
    }

    #[test]
    fn progresses_monotonically() {
        for easing in [Easing::Linear, Easing::EaseInOut] {
            let (mut a, now) = anim(easing);
            let mut last = a.value();
            for ms in (0..=100).step_by(5) {
                a.tick(now + Duration::from_millis(ms));
                assert!(a.value() >= last - 1e-6, "{easing:?} regressed at {ms}ms");
                assert!(a.value() <= 10.0);
                last = a.value();
            }
        }
    }

    #[test]
    fn final_tick_pins_exact_end() {
        let (mut a, now) = anim(Easing::EaseInOut);
        assert!(a.tick(now + Duration::from_millis(50)));
        assert!(!a.tick(now + Duration::from_millis(150)));
        assert_eq!(a.value(), 10.0);
        assert!(!a.is_running());
    }

    #[test]
    fn restart_with_same_bounds_retriggers() {
        let (mut a, now) = anim(Easing::Linear);
        a.tick(now + Duration::from_millis(150));
        assert_eq!(a.value(), 10.0);
        a.start_from(0.0, 10.0, now + Duration::from_millis(200));
        assert!(a.is_running());
        a.tick(now + Duration::from_millis(210));
        assert!((a.value() - 1.0).abs() < 1e-4);
    }

    #[test]
    fn retarget_starts_from_current_value() {
        let (mut a, now) = anim(Easing::Linear);
        a.tick(now + Duration::from_millis(40));
        let mid = a.value();
        assert!(mid > 0.0 && mid < 10.0);
        a.start(0.0, now + Duration::from_millis(40));
        assert_eq!(a.value(), mid);
        a.tick(now + Duration::from_millis(90));
        assert!(a.value() < mid);
    }

    #[test]
    fn snap_and_finish_stop_the_ramp() {
        let (mut a, now) = anim(Easing::Linear);
        a.snap_to(3.0);
        assert!(!a.is_running());
        assert_eq!(a.value(), 3.0);
        a.start(8.0, now);
        a.finish();
        assert_eq!(a.value(), 8.0);
        assert!(!a.is_running());
    }

    #[test]
    fn zero_duration_snaps() {
        let now = Instant::now();
        let mut a = Animator::new(0.0, Duration::ZERO, Easing::Linear);
        a.start_from(0.0, 5.0, now);
        assert!(!a.is_running());
        assert_eq!(a.value(), 5.0);
    }
}
