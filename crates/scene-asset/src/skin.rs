use glam::Mat4;
use log::error;

/// Below this total, the missing weight of a vertex is given to its parent bone.
pub const WEIGHT_SUM_THRESHOLD: f32 = 0.975;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VertexWeight {
    pub vertex: u32,
    pub weight: f32,
}

/// A bone influencing a mesh. The name matches a node of the scene.
#[derive(Debug, Clone, PartialEq)]
pub struct BoneAsset {
    pub name: String,
    /// Transform from mesh space to bone space in bind pose.
    pub offset: Mat4,
    pub weights: Vec<VertexWeight>,
}

/// Name and bind offset of a bone known to the skeleton.
#[derive(Debug, Clone, PartialEq)]
pub struct BoneBinding {
    pub name: String,
    pub offset: Mat4,
}

/// Bone links of a single source vertex.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VertexInfluence {
    /// Bone the vertex is attached to as a whole.
    pub parent: Option<u32>,
    /// Explicit (bone, weight) pairs.
    pub links: Vec<(u32, f32)>,
}

impl VertexInfluence {
    pub fn parent(bone: u32) -> Self {
        Self {
            parent: Some(bone),
            links: Vec::new(),
        }
    }
}

/// Collects per-bone weight lists while mesh vertices are emitted.
#[derive(Debug, Clone)]
pub struct WeightAccumulator {
    per_bone: Vec<Vec<VertexWeight>>,
}

impl WeightAccumulator {
    pub fn new(bone_count: usize) -> Self {
        Self {
            per_bone: vec![Vec::new(); bone_count],
        }
    }

    pub fn add_vertex(&mut self, vertex: u32, influence: &VertexInfluence) {
        let bone_count = self.per_bone.len();
        let mut sum = 0.0;
        let mut appended = Vec::with_capacity(influence.links.len());
        for &(bone, weight) in &influence.links {
            let index = bone as usize;
            if index >= bone_count || Some(bone) == influence.parent {
                error!(
                    "Bone index {} of vertex {} is out of range or repeats the parent bone",
                    bone, vertex
                );
                continue;
            }
            appended.push((index, self.per_bone[index].len()));
            self.per_bone[index].push(VertexWeight { vertex, weight });
            sum += weight;
        }

        if sum >= WEIGHT_SUM_THRESHOLD {
            return;
        }
        let Some(parent) = influence.parent else {
            return;
        };
        let parent = parent as usize;
        if parent < bone_count {
            self.per_bone[parent].push(VertexWeight {
                vertex,
                weight: 1.0 - sum,
            });
        } else {
            error!(
                "Parent bone {} of vertex {} is out of range, renormalizing its weights",
                parent, vertex
            );
            if sum > 0.0 {
                let scale = 1.0 / sum;
                for (bone, position) in appended {
                    self.per_bone[bone][position].weight *= scale;
                }
            }
        }
    }

    /// Builds the bones that received at least one weight.
    pub fn into_bones(self, bindings: &[BoneBinding]) -> Vec<BoneAsset> {
        self.per_bone
            .into_iter()
            .zip(bindings)
            .filter(|(weights, _)| !weights.is_empty())
            .map(|(weights, binding)| BoneAsset {
                name: binding.name.clone(),
                offset: binding.offset,
                weights,
            })
            .collect()
    }
}
