use crate::texture::{TextureKind, TextureSlot};

/// Name given to materials generated when a file defines none.
pub const DEFAULT_MATERIAL_NAME: &str = "DefaultMaterial";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShadingModel {
    Flat,
    #[default]
    Gouraud,
    Phong,
}

/// Classic ambient/diffuse/specular material.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialAsset {
    pub name: Option<String>,
    pub ambient_color: [f32; 3],
    pub diffuse_color: [f32; 3],
    pub specular_color: [f32; 3],
    pub emissive_color: [f32; 3],
    pub shininess: f32,
    /// 1.0 is fully opaque.
    pub opacity: f32,
    pub shading: ShadingModel,
    pub two_sided: bool,
    pub textures: Vec<TextureSlot>,
}

impl Default for MaterialAsset {
    fn default() -> Self {
        Self {
            name: Some(String::from(DEFAULT_MATERIAL_NAME)),
            ambient_color: [0.05, 0.05, 0.05],
            diffuse_color: [0.7, 0.7, 0.7],
            specular_color: [0.7, 0.7, 0.7],
            emissive_color: [0.0, 0.0, 0.0],
            shininess: 0.0,
            opacity: 1.0,
            shading: ShadingModel::Gouraud,
            two_sided: false,
            textures: Vec::new(),
        }
    }
}

impl MaterialAsset {
    pub fn texture(&self, kind: TextureKind) -> Option<&TextureSlot> {
        self.textures.iter().find(|slot| slot.kind == kind)
    }

    pub fn diffuse_texture(&self) -> Option<&TextureSlot> {
        self.texture(TextureKind::Diffuse)
    }
}
