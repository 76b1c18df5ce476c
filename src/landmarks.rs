use serde::{Deserialize, Serialize};

/// Upper-body landmark ids tracked for display and recording (shoulders to thumbs)
pub const TARGET_LANDMARKS: std::ops::RangeInclusive<u32> = 11..=22;

const TARGET_NAMES: [&str; 12] = [
    "LEFT_SHOULDER",
    "RIGHT_SHOULDER",
    "LEFT_ELBOW",
    "RIGHT_ELBOW",
    "LEFT_WRIST",
    "RIGHT_WRIST",
    "LEFT_PINKY",
    "RIGHT_PINKY",
    "LEFT_INDEX",
    "RIGHT_INDEX",
    "LEFT_THUMB",
    "RIGHT_THUMB",
];

/// Pairs of landmark ids joined when drawing the full 33-point pose skeleton
pub const POSE_CONNECTIONS: [(u32, u32); 35] = [
    (0, 1),
    (1, 2),
    (2, 3),
    (3, 7),
    (0, 4),
    (4, 5),
    (5, 6),
    (6, 8),
    (9, 10),
    (11, 12),
    (11, 13),
    (13, 15),
    (15, 17),
    (15, 19),
    (15, 21),
    (17, 19),
    (12, 14),
    (14, 16),
    (16, 18),
    (16, 20),
    (16, 22),
    (18, 20),
    (11, 23),
    (12, 24),
    (23, 24),
    (23, 25),
    (24, 26),
    (25, 27),
    (26, 28),
    (27, 29),
    (28, 30),
    (29, 31),
    (30, 32),
    (27, 31),
    (28, 32),
];

/// Display name for a landmark id
pub fn landmark_name(id: u32) -> String {
    if TARGET_LANDMARKS.contains(&id) {
        TARGET_NAMES[(id - TARGET_LANDMARKS.start()) as usize].to_string()
    } else {
        format!("LANDMARK_{}", id)
    }
}

/// One pose keypoint. `x` and `y` are relative to the frame (0..1).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub id: u32,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub visibility: f64,
}

impl Landmark {
    pub fn new(id: u32, x: f64, y: f64, z: f64, visibility: f64) -> Self {
        Self {
            id,
            x,
            y,
            z,
            visibility,
        }
    }

    pub fn name(&self) -> String {
        landmark_name(self.id)
    }

    pub fn is_target(&self) -> bool {
        TARGET_LANDMARKS.contains(&self.id)
    }

    /// Pixel position in a frame of the given size
    pub fn to_pixel(&self, width: u32, height: u32) -> (i32, i32) {
        (
            (self.x * width as f64) as i32,
            (self.y * height as f64) as i32,
        )
    }
}

/// Landmarks reported by the pose detector for one frame
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LandmarkSet {
    landmarks: Vec<Landmark>,
}

impl LandmarkSet {
    pub fn new(landmarks: Vec<Landmark>) -> Self {
        Self { landmarks }
    }

    pub fn get(&self, id: u32) -> Option<&Landmark> {
        self.landmarks.iter().find(|l| l.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Landmark> {
        self.landmarks.iter()
    }

    /// Only the tracked upper-body landmarks
    pub fn targets(&self) -> impl Iterator<Item = &Landmark> {
        self.landmarks.iter().filter(|l| l.is_target())
    }

    pub fn len(&self) -> usize {
        self.landmarks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.landmarks.is_empty()
    }
}

impl FromIterator<Landmark> for LandmarkSet {
    fn from_iter<I: IntoIterator<Item = Landmark>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_landmark_names() {
        assert_eq!(landmark_name(11), "LEFT_SHOULDER");
        assert_eq!(landmark_name(16), "RIGHT_WRIST");
        assert_eq!(landmark_name(22), "RIGHT_THUMB");
        assert_eq!(landmark_name(0), "LANDMARK_0");
        assert_eq!(landmark_name(23), "LANDMARK_23");
    }

    #[test]
    fn test_targets_filter_and_lookup() {
        let set: LandmarkSet = (0..33)
            .map(|id| Landmark::new(id, 0.5, 0.25, 0.0, 0.9))
            .collect();
        assert_eq!(set.len(), 33);
        assert_eq!(set.targets().count(), 12);
        assert!(set.targets().all(|l| (11..=22).contains(&l.id)));
        assert_eq!(set.get(15).map(|l| l.name()), Some("LEFT_WRIST".to_string()));
        assert!(set.get(40).is_none());
    }

    #[test]
    fn test_pixel_projection() {
        let lm = Landmark::new(12, 0.5, 0.25, -0.1, 1.0);
        assert_eq!(lm.to_pixel(640, 480), (320, 120));
    }

    #[test]
    fn test_connections_reference_pose_ids() {
        assert!(POSE_CONNECTIONS.iter().all(|&(a, b)| a < 33 && b < 33));
    }
}
