use std::{
    collections::HashSet,
    error::Error,
    fmt::{self, Display, Formatter},
};

use glam::Mat4;

use crate::{
    animation::AnimationAsset, camera::CameraAsset, index::BundleIndex, light::LightAsset,
    material::MaterialAsset, mesh::MeshAsset, node::NodeAsset,
};

/// The canonical scene produced by every importer.
///
/// Cross references are index based: nodes reference `meshes` by index,
/// meshes reference `materials` by index, and bones, animation channels,
/// lights and cameras reference nodes by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SceneAsset {
    pub name: Option<String>,
    pub root: NodeAsset,
    pub meshes: Vec<MeshAsset>,
    pub materials: Vec<MaterialAsset>,
    pub animations: Vec<AnimationAsset>,
    pub lights: Vec<LightAsset>,
    pub cameras: Vec<CameraAsset>,
    /// Set for scenes without renderable geometry, such as animation-only files.
    pub incomplete: bool,
    pub source: Option<BundleIndex>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SceneValidationError {
    NoMaterials,
    MeshOutOfRange {
        node: String,
        mesh: usize,
        mesh_count: usize,
    },
    MaterialOutOfRange {
        mesh: usize,
        material: usize,
        material_count: usize,
    },
    EmptyFace {
        mesh: usize,
        face: usize,
    },
    FaceIndexOutOfRange {
        mesh: usize,
        face: usize,
        index: u32,
        vertex_count: usize,
    },
    AttributeLength {
        mesh: usize,
        attribute: &'static str,
        expected: usize,
        actual: usize,
    },
    WeightOutOfRange {
        mesh: usize,
        bone: String,
        vertex: u32,
    },
    UnknownBoneNode {
        mesh: usize,
        bone: String,
    },
    UnknownChannelNode {
        animation: usize,
        node: String,
    },
}

impl Display for SceneValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            SceneValidationError::NoMaterials => write!(f, "Scene has meshes but no materials"),
            SceneValidationError::MeshOutOfRange {
                node,
                mesh,
                mesh_count,
            } => write!(
                f,
                "Node {:?} references mesh {}, but there are only {} meshes",
                node, mesh, mesh_count
            ),
            SceneValidationError::MaterialOutOfRange {
                mesh,
                material,
                material_count,
            } => write!(
                f,
                "Mesh {} references material {}, but there are only {} materials",
                mesh, material, material_count
            ),
            SceneValidationError::EmptyFace { mesh, face } => {
                write!(f, "Face {} of mesh {} has no indices", face, mesh)
            }
            SceneValidationError::FaceIndexOutOfRange {
                mesh,
                face,
                index,
                vertex_count,
            } => write!(
                f,
                "Face {} of mesh {} references vertex {}, but the mesh has {} vertices",
                face, mesh, index, vertex_count
            ),
            SceneValidationError::AttributeLength {
                mesh,
                attribute,
                expected,
                actual,
            } => write!(
                f,
                "Mesh {} has {} {} entries, expected {}",
                mesh, actual, attribute, expected
            ),
            SceneValidationError::WeightOutOfRange { mesh, bone, vertex } => write!(
                f,
                "Bone {:?} of mesh {} weights vertex {}, which does not exist",
                bone, mesh, vertex
            ),
            SceneValidationError::UnknownBoneNode { mesh, bone } => {
                write!(f, "Bone {:?} of mesh {} has no matching node", bone, mesh)
            }
            SceneValidationError::UnknownChannelNode { animation, node } => write!(
                f,
                "Animation {} targets node {:?}, which does not exist",
                animation, node
            ),
        }
    }
}

impl Error for SceneValidationError {}

impl SceneAsset {
    pub fn node_names(&self) -> HashSet<String> {
        let mut names = HashSet::new();
        self.root.visit(|node, _| {
            names.insert(node.name.clone());
        });
        names
    }

    /// Replaces the root by its only child, if it has exactly one.
    ///
    /// Returns the transform of the removed root. The child keeps its own
    /// local transform.
    pub fn elide_single_child_root(&mut self) -> Option<Mat4> {
        if self.root.children.len() != 1 || !self.root.meshes.is_empty() {
            return None;
        }
        let child = self.root.children.pop()?;
        let wrapper = std::mem::replace(&mut self.root, child);
        Some(wrapper.transform)
    }

    /// Checks the cross reference invariants every importer guarantees.
    pub fn validate(&self) -> Result<(), SceneValidationError> {
        if !self.meshes.is_empty() && self.materials.is_empty() {
            return Err(SceneValidationError::NoMaterials);
        }

        let mut result = Ok(());
        self.root.visit(|node, _| {
            if result.is_err() {
                return;
            }
            if let Some(&mesh) = node.meshes.iter().find(|mesh| **mesh >= self.meshes.len()) {
                result = Err(SceneValidationError::MeshOutOfRange {
                    node: node.name.clone(),
                    mesh,
                    mesh_count: self.meshes.len(),
                });
            }
        });
        result?;

        let names = self.node_names();
        for (index, mesh) in self.meshes.iter().enumerate() {
            self.validate_mesh(index, mesh, &names)?;
        }

        for (index, animation) in self.animations.iter().enumerate() {
            if let Some(channel) = animation
                .channels
                .iter()
                .find(|channel| !names.contains(&channel.node_name))
            {
                return Err(SceneValidationError::UnknownChannelNode {
                    animation: index,
                    node: channel.node_name.clone(),
                });
            }
        }
        Ok(())
    }

    fn validate_mesh(
        &self,
        index: usize,
        mesh: &MeshAsset,
        names: &HashSet<String>,
    ) -> Result<(), SceneValidationError> {
        if mesh.material >= self.materials.len() {
            return Err(SceneValidationError::MaterialOutOfRange {
                mesh: index,
                material: mesh.material,
                material_count: self.materials.len(),
            });
        }

        let vertex_count = mesh.vertex_count();
        let check_length = |attribute: &'static str, actual: usize| {
            if actual == vertex_count {
                Ok(())
            } else {
                Err(SceneValidationError::AttributeLength {
                    mesh: index,
                    attribute,
                    expected: vertex_count,
                    actual,
                })
            }
        };
        if !mesh.attributes.normal.is_empty() {
            check_length("normal", mesh.attributes.normal.len())?;
        }
        for set in &mesh.attributes.tex_coords {
            check_length("texture coordinate", set.len())?;
        }
        for set in &mesh.attributes.colors {
            check_length("color", set.len())?;
        }

        for (face_index, face) in mesh.faces.iter().enumerate() {
            if face.indices.is_empty() {
                return Err(SceneValidationError::EmptyFace {
                    mesh: index,
                    face: face_index,
                });
            }
            if let Some(&vertex) = face
                .indices
                .iter()
                .find(|vertex| **vertex as usize >= vertex_count)
            {
                return Err(SceneValidationError::FaceIndexOutOfRange {
                    mesh: index,
                    face: face_index,
                    index: vertex,
                    vertex_count,
                });
            }
        }

        for bone in &mesh.bones {
            if !names.contains(&bone.name) {
                return Err(SceneValidationError::UnknownBoneNode {
                    mesh: index,
                    bone: bone.name.clone(),
                });
            }
            if let Some(weight) = bone
                .weights
                .iter()
                .find(|weight| weight.vertex as usize >= vertex_count)
            {
                return Err(SceneValidationError::WeightOutOfRange {
                    mesh: index,
                    bone: bone.name.clone(),
                    vertex: weight.vertex,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use glam::Vec3;

    use super::*;
    use crate::{
        animation::NodeAnimation,
        primitive::{Face, MeshAttributes},
        skin::{BoneAsset, VertexWeight},
    };

    fn triangle_scene() -> SceneAsset {
        let mut root = NodeAsset::new("root");
        root.children.push(NodeAsset {
            meshes: vec![0],
            ..NodeAsset::new("triangle")
        });
        SceneAsset {
            root,
            meshes: vec![MeshAsset {
                attributes: MeshAttributes {
                    position: vec![[0.0; 3], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
                    ..Default::default()
                },
                faces: vec![Face::from([0, 1, 2])],
                ..Default::default()
            }],
            materials: vec![MaterialAsset::default()],
            ..Default::default()
        }
    }

    #[test]
    fn valid_scene_passes() {
        assert_eq!(triangle_scene().validate(), Ok(()));
    }

    #[test]
    fn face_index_out_of_range() {
        let mut scene = triangle_scene();
        scene.meshes[0].faces.push(Face::from([0, 1, 3]));
        assert!(matches!(
            scene.validate(),
            Err(SceneValidationError::FaceIndexOutOfRange { index: 3, .. })
        ));
    }

    #[test]
    fn partial_uv_set_is_rejected() {
        let mut scene = triangle_scene();
        scene.meshes[0].attributes.tex_coords.push(vec![[0.0, 0.0]]);
        assert!(matches!(
            scene.validate(),
            Err(SceneValidationError::AttributeLength { actual: 1, expected: 3, .. })
        ));
    }

    #[test]
    fn material_and_mesh_references() {
        let mut scene = triangle_scene();
        scene.meshes[0].material = 1;
        assert!(matches!(
            scene.validate(),
            Err(SceneValidationError::MaterialOutOfRange { material: 1, .. })
        ));

        let mut scene = triangle_scene();
        scene.root.meshes.push(4);
        assert!(matches!(
            scene.validate(),
            Err(SceneValidationError::MeshOutOfRange { mesh: 4, .. })
        ));
    }

    #[test]
    fn bones_and_channels_must_name_nodes() {
        let mut scene = triangle_scene();
        scene.meshes[0].bones.push(BoneAsset {
            name: String::from("missing"),
            offset: Mat4::IDENTITY,
            weights: vec![VertexWeight { vertex: 0, weight: 1.0 }],
        });
        assert!(matches!(
            scene.validate(),
            Err(SceneValidationError::UnknownBoneNode { .. })
        ));

        let mut scene = triangle_scene();
        scene.animations.push(AnimationAsset {
            name: None,
            duration: 1.0,
            ticks_per_second: 25.0,
            channels: vec![NodeAnimation::new("nowhere")],
        });
        assert!(matches!(
            scene.validate(),
            Err(SceneValidationError::UnknownChannelNode { .. })
        ));
    }

    #[test]
    fn elide_single_child_root() {
        let mut scene = triangle_scene();
        scene.root.transform = Mat4::from_translation(Vec3::X);
        let removed = scene.elide_single_child_root();
        assert_eq!(removed, Some(Mat4::from_translation(Vec3::X)));
        assert_eq!(scene.root.name, "triangle");
        assert_eq!(scene.elide_single_child_root(), None);
    }
}
