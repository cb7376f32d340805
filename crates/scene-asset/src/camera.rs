use std::f32::consts::FRAC_PI_4;

#[derive(Debug, Clone, PartialEq)]
pub struct CameraAsset {
    /// Name of the node the camera is attached to.
    pub name: String,
    /// Horizontal field of view in radians.
    pub horizontal_fov: f32,
    pub clip_near: f32,
    pub clip_far: f32,
    /// Zero if the aspect ratio is left to the viewer.
    pub aspect: f32,
}

impl CameraAsset {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            horizontal_fov: FRAC_PI_4,
            clip_near: 0.1,
            clip_far: 1000.0,
            aspect: 0.0,
        }
    }
}
