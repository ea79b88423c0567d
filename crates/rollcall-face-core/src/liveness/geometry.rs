use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LandmarkPoint {
    pub x: f64,
    pub y: f64,
}

impl LandmarkPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    fn distance(self, other: Self) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoseAngles {
    pub yaw: f64,
    pub pitch: f64,
    pub roll: f64,
}

/// Eye aspect ratio over a six-point eye contour (corners at 0 and 3, upper
/// lid at 1 and 2, lower lid at 5 and 4). `None` for a degenerate contour.
pub fn eye_aspect_ratio(eye: &[LandmarkPoint; 6]) -> Option<f64> {
    let vertical_a = eye[1].distance(eye[5]);
    let vertical_b = eye[2].distance(eye[4]);
    let horizontal = eye[0].distance(eye[3]);
    if !horizontal.is_finite() || horizontal <= f64::EPSILON {
        return None;
    }
    let ear = (vertical_a + vertical_b) / (2.0 * horizontal);
    ear.is_finite().then_some(ear)
}

/// Decomposes a rotation matrix into degrees. Pitch is rotation about the
/// x axis, yaw about y and roll about z.
pub fn euler_angles(r: &[[f64; 3]; 3]) -> PoseAngles {
    let sy = (r[0][0] * r[0][0] + r[1][0] * r[1][0]).sqrt();
    let (pitch, yaw, roll) = if sy > 1e-6 {
        (
            r[2][1].atan2(r[2][2]),
            (-r[2][0]).atan2(sy),
            r[1][0].atan2(r[0][0]),
        )
    } else {
        // gimbal lock
        ((-r[1][2]).atan2(r[1][1]), (-r[2][0]).atan2(sy), 0.0)
    };
    PoseAngles {
        yaw: yaw.to_degrees(),
        pitch: pitch.to_degrees(),
        roll: roll.to_degrees(),
    }
}
