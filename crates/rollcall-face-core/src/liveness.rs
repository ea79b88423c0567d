//! Blink and head-motion liveness over a complete, caller-owned frame
//! sequence.
//!
//! A printed photo produces neither blinks nor pose change. A replayed video
//! usually moves but rarely blinks on cue, so the verdict keeps those two
//! cases apart in its [`LivenessReason`].

mod geometry;

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{AppError, AppResult};
use crate::faces::metric::finite_unit;

pub use geometry::{euler_angles, eye_aspect_ratio, LandmarkPoint, PoseAngles};

/// One observation in a liveness sequence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameSample {
    pub left_ear: f64,
    pub right_ear: f64,
    /// Degrees.
    pub yaw: f64,
    /// Degrees.
    pub pitch: f64,
    /// Degrees.
    pub roll: f64,
    /// Monotonic capture time in milliseconds.
    pub timestamp_ms: u64,
}

impl FrameSample {
    /// Builds a sample from six-point eye contours and a head rotation
    /// matrix, as produced by a 68-point landmark detector and a PnP solve.
    pub fn from_landmarks(
        left_eye: &[LandmarkPoint; 6],
        right_eye: &[LandmarkPoint; 6],
        rotation: &[[f64; 3]; 3],
        timestamp_ms: u64,
    ) -> Option<Self> {
        let left_ear = eye_aspect_ratio(left_eye)?;
        let right_ear = eye_aspect_ratio(right_eye)?;
        let pose = euler_angles(rotation);
        Some(Self {
            left_ear,
            right_ear,
            yaw: pose.yaw,
            pitch: pose.pitch,
            roll: pose.roll,
            timestamp_ms,
        })
    }

    pub fn mean_ear(&self) -> f64 {
        (self.left_ear + self.right_ear) / 2.0
    }

    fn is_finite(&self) -> bool {
        [self.left_ear, self.right_ear, self.yaw, self.pitch, self.roll]
            .iter()
            .all(|value| value.is_finite())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LivenessReason {
    InsufficientSamples,
    /// Likely a static photo.
    NoBlinkNoMotion,
    /// Possible video replay.
    MotionWithoutBlink,
    BlinkWithoutMotion,
    /// A signal was seen but the weighted score stayed under the threshold.
    BelowThreshold,
    Ok,
}

impl LivenessReason {
    pub fn as_str(self) -> &'static str {
        match self {
            LivenessReason::InsufficientSamples => "insufficient_samples",
            LivenessReason::NoBlinkNoMotion => "no_blink_no_motion",
            LivenessReason::MotionWithoutBlink => "motion_without_blink",
            LivenessReason::BlinkWithoutMotion => "blink_without_motion",
            LivenessReason::BelowThreshold => "below_threshold",
            LivenessReason::Ok => "ok",
        }
    }
}

impl fmt::Display for LivenessReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LivenessVerdict {
    pub is_live: bool,
    pub score: f64,
    pub reason: LivenessReason,
    pub blink_count: usize,
    /// Largest yaw or pitch range across the sequence, in degrees.
    pub pose_deviation: f64,
    pub frames: usize,
    pub span_ms: u64,
}

impl LivenessVerdict {
    /// A verdict supplied directly by a caller, e.g. an external liveness
    /// service.
    pub fn external(is_live: bool, score: f64, reason: LivenessReason) -> Self {
        Self {
            is_live,
            score: finite_unit(score),
            reason,
            blink_count: 0,
            pose_deviation: 0.0,
            frames: 0,
            span_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LivenessSettings {
    pub liveness_threshold: f64,
    pub blink_threshold: f64,
    pub head_pose_threshold: f64,
    pub min_frames: usize,
    pub min_span: Duration,
    pub min_closed_frames: usize,
    pub blink_weight: f64,
    pub pose_weight: f64,
}

impl Default for LivenessSettings {
    fn default() -> Self {
        Self {
            liveness_threshold: rollcall_config::DEFAULT_LIVENESS_THRESHOLD,
            blink_threshold: rollcall_config::DEFAULT_BLINK_THRESHOLD,
            head_pose_threshold: rollcall_config::DEFAULT_HEAD_POSE_THRESHOLD,
            min_frames: rollcall_config::DEFAULT_MIN_LIVENESS_FRAMES,
            min_span: Duration::from_millis(rollcall_config::DEFAULT_MIN_LIVENESS_SPAN_MS),
            min_closed_frames: rollcall_config::DEFAULT_MIN_CLOSED_FRAMES,
            blink_weight: rollcall_config::DEFAULT_BLINK_WEIGHT,
            pose_weight: rollcall_config::DEFAULT_POSE_WEIGHT,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LivenessAnalyzer {
    settings: LivenessSettings,
}

impl LivenessAnalyzer {
    pub fn new(settings: LivenessSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &LivenessSettings {
        &self.settings
    }

    pub fn evaluate(&self, frames: &[FrameSample]) -> AppResult<LivenessVerdict> {
        let (first, last) = match (frames.first(), frames.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => {
                return Err(AppError::InvalidInput(
                    "liveness frame sequence is empty".into(),
                ))
            }
        };
        validate_frames(frames)?;

        let span_ms = last.timestamp_ms - first.timestamp_ms;
        let min_span_ms = u64::try_from(self.settings.min_span.as_millis()).unwrap_or(u64::MAX);
        if frames.len() < self.settings.min_frames || span_ms < min_span_ms {
            debug!(
                frames = frames.len(),
                span_ms, "liveness sequence too short to judge"
            );
            return Ok(LivenessVerdict {
                is_live: false,
                score: 0.0,
                reason: LivenessReason::InsufficientSamples,
                blink_count: 0,
                pose_deviation: 0.0,
                frames: frames.len(),
                span_ms,
            });
        }

        let blink_count = count_blinks(
            frames,
            self.settings.blink_threshold,
            self.settings.min_closed_frames,
        );
        let pose_deviation = pose_deviation(frames);

        let blinked = blink_count > 0;
        let moved = pose_deviation >= self.settings.head_pose_threshold;

        let blink_component = if blinked { 1.0 } else { 0.0 };
        let pose_component = (pose_deviation / self.settings.head_pose_threshold).min(1.0);
        let total_weight = self.settings.blink_weight + self.settings.pose_weight;
        // zero or non-finite weights collapse to a score of 0
        let score = finite_unit(
            (self.settings.blink_weight * blink_component
                + self.settings.pose_weight * pose_component)
                / total_weight,
        );

        let is_live = (blinked || moved) && score >= self.settings.liveness_threshold;
        let reason = match (blinked, moved) {
            (false, false) => LivenessReason::NoBlinkNoMotion,
            _ if !is_live => LivenessReason::BelowThreshold,
            (true, true) => LivenessReason::Ok,
            (true, false) => LivenessReason::BlinkWithoutMotion,
            (false, true) => LivenessReason::MotionWithoutBlink,
        };

        debug!(
            blink_count,
            pose_deviation,
            score,
            is_live,
            reason = reason.as_str(),
            "liveness evaluated"
        );

        Ok(LivenessVerdict {
            is_live,
            score,
            reason,
            blink_count,
            pose_deviation,
            frames: frames.len(),
            span_ms,
        })
    }
}

fn validate_frames(frames: &[FrameSample]) -> AppResult<()> {
    for (index, frame) in frames.iter().enumerate() {
        if !frame.is_finite() {
            return Err(AppError::InvalidInput(format!(
                "frame {index} contains a non-finite measurement"
            )));
        }
    }
    if let Some(index) = frames
        .windows(2)
        .position(|pair| pair[1].timestamp_ms < pair[0].timestamp_ms)
    {
        return Err(AppError::InvalidInput(format!(
            "frame {} timestamp goes backwards",
            index + 1
        )));
    }
    Ok(())
}

/// Counts closures that start after an open-eye frame, last at least
/// `min_closed_frames` frames and reopen within the sequence.
pub fn count_blinks(frames: &[FrameSample], threshold: f64, min_closed_frames: usize) -> usize {
    let mut blinks = 0;
    let mut seen_open = false;
    let mut closed_run = 0usize;

    for frame in frames {
        if frame.mean_ear() < threshold {
            if seen_open {
                closed_run += 1;
            }
        } else {
            if closed_run >= min_closed_frames.max(1) {
                blinks += 1;
            }
            closed_run = 0;
            seen_open = true;
        }
    }

    blinks
}

/// Maximum pairwise deviation of yaw or pitch, i.e. the larger of the two
/// ranges.
pub fn pose_deviation(frames: &[FrameSample]) -> f64 {
    let yaw = value_range(frames.iter().map(|f| f.yaw));
    let pitch = value_range(frames.iter().map(|f| f.pitch));
    yaw.max(pitch)
}

fn value_range(values: impl Iterator<Item = f64>) -> f64 {
    let (min, max) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if min.is_finite() && max.is_finite() {
        max - min
    } else {
        0.0
    }
}
