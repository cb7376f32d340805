#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureKind {
    Diffuse,
    Specular,
    Ambient,
    Emissive,
    Normals,
    Opacity,
}

/// UV transform applied before sampling a texture.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureAssetTransform {
    pub offset: [f32; 2],
    pub rotation: f32,
    pub scale: [f32; 2],
}

impl Default for TextureAssetTransform {
    fn default() -> Self {
        Self {
            offset: [0.0, 0.0],
            rotation: 0.0,
            scale: [1.0, 1.0],
        }
    }
}

impl TextureAssetTransform {
    pub fn is_identity(&self) -> bool {
        self.offset == [0.0, 0.0] && self.rotation == 0.0 && self.scale == [1.0, 1.0]
    }
}

/// A texture referenced by path from a material.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureSlot {
    pub kind: TextureKind,
    pub path: String,
    pub tex_coord: usize,
    pub transform: Option<TextureAssetTransform>,
}

impl TextureSlot {
    pub fn new(kind: TextureKind, path: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.into(),
            tex_coord: 0,
            transform: None,
        }
    }
}
