use std::collections::BTreeSet;

use crate::{
    primitive::{Face, MeshAttributes, PrimitiveKind},
    skin::BoneAsset,
};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshAsset {
    pub name: Option<String>,
    pub attributes: MeshAttributes,
    pub faces: Vec<Face>,
    /// Index into the owning scene's material list.
    pub material: usize,
    pub bones: Vec<BoneAsset>,
}

impl MeshAsset {
    pub fn vertex_count(&self) -> usize {
        self.attributes.len()
    }

    pub fn primitive_kinds(&self) -> BTreeSet<PrimitiveKind> {
        self.faces.iter().filter_map(Face::kind).collect()
    }

    pub fn has_bones(&self) -> bool {
        !self.bones.is_empty()
    }
}
