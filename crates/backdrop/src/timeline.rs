use std::time::{Duration, Instant};

/// Opacity easing for the mount fade-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FadeCurve {
    Linear,
    Smoothstep,
    EaseInOut,
    /// CSS `ease`, i.e. `cubic-bezier(0.25, 0.1, 0.25, 1.0)`.
    #[default]
    Ease,
}

impl FadeCurve {
    pub fn sample(self, t: f32) -> f32 {
        let clamped = if t.is_nan() { 1.0 } else { t.clamp(0.0, 1.0) };
        match self {
            FadeCurve::Linear => clamped,
            FadeCurve::Smoothstep => clamped * clamped * (3.0 - 2.0 * clamped),
            FadeCurve::EaseInOut => {
                if clamped < 0.5 {
                    2.0 * clamped * clamped
                } else {
                    -1.0 + (4.0 - 2.0 * clamped) * clamped
                }
            }
            FadeCurve::Ease => cubic_bezier(0.25, 0.1, 0.25, 1.0, clamped),
        }
    }
}

fn bezier_component(p1: f32, p2: f32, t: f32) -> f32 {
    let inv = 1.0 - t;
    3.0 * inv * inv * t * p1 + 3.0 * inv * t * t * p2 + t * t * t
}

fn bezier_slope(p1: f32, p2: f32, t: f32) -> f32 {
    let inv = 1.0 - t;
    3.0 * inv * inv * p1 + 6.0 * inv * t * (p2 - p1) + 3.0 * t * t * (1.0 - p2)
}

/// Evaluates a CSS timing function at progress `x`.
fn cubic_bezier(x1: f32, y1: f32, x2: f32, y2: f32, x: f32) -> f32 {
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }

    // Newton first, bisection when the slope flattens out.
    let mut t = x;
    for _ in 0..8 {
        let error = bezier_component(x1, x2, t) - x;
        if error.abs() < 1e-6 {
            return bezier_component(y1, y2, t);
        }
        let slope = bezier_slope(x1, x2, t);
        if slope.abs() < 1e-6 {
            break;
        }
        t -= error / slope;
    }

    let (mut lo, mut hi) = (0.0_f32, 1.0_f32);
    t = x;
    for _ in 0..32 {
        let value = bezier_component(x1, x2, t);
        if (value - x).abs() < 1e-6 {
            break;
        }
        if value < x {
            lo = t;
        } else {
            hi = t;
        }
        t = (lo + hi) * 0.5;
    }
    bezier_component(y1, y2, t)
}

/// Wall-clock opacity transition started at mount.
///
/// Sampled whenever the layer is composited, not when the effect ticks, so the
/// fade runs even if the effect skips frames.
#[derive(Debug, Clone, Copy)]
pub struct FadeEnvelope {
    start: Instant,
    duration: Duration,
    curve: FadeCurve,
}

impl FadeEnvelope {
    /// Returns `None` for a zero duration, meaning "fully opaque at once".
    pub fn new(duration: Duration, curve: FadeCurve, now: Instant) -> Option<Self> {
        if duration <= Duration::ZERO {
            None
        } else {
            Some(Self {
                start: now,
                duration,
                curve,
            })
        }
    }

    pub fn progress(&self, now: Instant) -> f32 {
        let elapsed = now.saturating_duration_since(self.start);
        elapsed.as_secs_f32() / self.duration.as_secs_f32().max(f32::EPSILON)
    }

    pub fn opacity(&self, now: Instant) -> f32 {
        self.curve.sample(self.progress(now))
    }

    pub fn finished(&self, now: Instant) -> bool {
        self.progress(now) >= 1.0
    }
}

pub fn fade_opacity(envelope: Option<&FadeEnvelope>, now: Instant) -> f32 {
    envelope.map_or(1.0, |envelope| envelope.opacity(now))
}
