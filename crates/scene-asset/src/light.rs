#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LightKind {
    #[default]
    Point,
    Directional,
    Spot,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LightAsset {
    /// Name of the node the light is attached to.
    pub name: String,
    pub kind: LightKind,
    pub diffuse_color: [f32; 3],
    pub specular_color: [f32; 3],
    pub attenuation_constant: f32,
    pub attenuation_linear: f32,
    pub attenuation_quadratic: f32,
    /// Cone angles in radians, only meaningful for spot lights.
    pub inner_cone: f32,
    pub outer_cone: f32,
}

impl LightAsset {
    pub fn new(name: impl Into<String>, kind: LightKind) -> Self {
        Self {
            name: name.into(),
            kind,
            diffuse_color: [1.0, 1.0, 1.0],
            specular_color: [1.0, 1.0, 1.0],
            attenuation_constant: 1.0,
            attenuation_linear: 0.0,
            attenuation_quadratic: 0.0,
            inner_cone: std::f32::consts::PI,
            outer_cone: std::f32::consts::PI,
        }
    }
}
