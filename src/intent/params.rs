//! Classifier timing parameters and movement disqualification

use std::fmt;
use std::time::Duration;

/// Decides whether a contact looks like pointing rather than a keystroke.
///
/// Evaluated on every contact frame and again when the contact ends. Once a
/// contact is disqualified it stays disqualified.
pub trait Disqualifier: Send {
    /// `elapsed` in seconds, `displacement` in normalized units,
    /// `velocity` in normalized units per second
    fn disqualify(&self, elapsed: f64, displacement: f32, velocity: f32) -> bool;
}

impl<F> Disqualifier for F
where
    F: Fn(f64, f32, f32) -> bool + Send,
{
    fn disqualify(&self, elapsed: f64, displacement: f32, velocity: f32) -> bool {
        self(elapsed, displacement, velocity)
    }
}

/// Threshold-based disqualifier
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionThresholds {
    /// Maximum travel from the landing point
    pub max_travel: f32,
    /// Maximum average speed since landing
    pub max_velocity: f32,
    /// Seconds of contact before speed is judged
    pub velocity_window: f64,
}

impl Default for MotionThresholds {
    fn default() -> Self {
        Self {
            max_travel: 0.04,
            max_velocity: 2.0,
            velocity_window: 0.05,
        }
    }
}

impl Disqualifier for MotionThresholds {
    fn disqualify(&self, elapsed: f64, displacement: f32, velocity: f32) -> bool {
        displacement > self.max_travel
            || (elapsed >= self.velocity_window && velocity > self.max_velocity)
    }
}

/// Never disqualifies anything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDisqualifier;

impl Disqualifier for NoDisqualifier {
    fn disqualify(&self, _elapsed: f64, _displacement: f32, _velocity: f32) -> bool {
        false
    }
}

/// Plain parameters handed to the classifier
pub struct ClassifierParams {
    /// Longest contact that still counts as a tap
    pub tap_max: Duration,
    /// Shortest contact that fires a hold action
    pub hold_min: Duration,
    pub disqualifier: Box<dyn Disqualifier>,
}

impl ClassifierParams {
    pub fn new(tap_max: Duration, hold_min: Duration) -> Self {
        Self {
            tap_max,
            hold_min,
            disqualifier: Box::new(MotionThresholds::default()),
        }
    }

    pub fn with_disqualifier<D>(mut self, disqualifier: D) -> Self
    where
        D: Disqualifier + 'static,
    {
        self.disqualifier = Box::new(disqualifier);
        self
    }

    pub(crate) fn tap_max_secs(&self) -> f64 {
        self.tap_max.as_secs_f64()
    }

    pub(crate) fn hold_min_secs(&self) -> f64 {
        self.hold_min.as_secs_f64()
    }
}

impl Default for ClassifierParams {
    fn default() -> Self {
        Self::new(Duration::from_millis(250), Duration::from_millis(400))
    }
}

impl fmt::Debug for ClassifierParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassifierParams")
            .field("tap_max", &self.tap_max)
            .field("hold_min", &self.hold_min)
            .finish_non_exhaustive()
    }
}
