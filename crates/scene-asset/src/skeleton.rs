//! Bone hierarchies from flat parent-indexed bone lists.

use std::{
    error::Error,
    fmt::{self, Display, Formatter},
};

use glam::{EulerRot, Mat4, Quat, Vec3};
use log::warn;

use crate::{
    animation::{AnimationAsset, AnimationKeyFrame, NodeAnimation},
    node::NodeAsset,
    skin::BoneBinding,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkeletonError {
    TooDeep(usize),
}

impl Display for SkeletonError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            SkeletonError::TooDeep(limit) => {
                write!(f, "Bone hierarchy is deeper than {} levels", limit)
            }
        }
    }
}

impl Error for SkeletonError {}

/// Rotation from XYZ Euler angles in radians, applied X first.
pub fn euler_xyz(rotation: Vec3) -> Quat {
    Quat::from_euler(EulerRot::ZYX, rotation.z, rotation.y, rotation.x)
}

/// A sampled bone pose.
#[derive(Debug, Clone, PartialEq)]
pub struct PoseKey {
    pub time: f64,
    pub position: Vec3,
    /// Euler angles in radians.
    pub rotation: Vec3,
    pub matrix: Mat4,
}

impl PoseKey {
    pub fn new(time: f64, position: Vec3, rotation: Vec3) -> Self {
        Self {
            time,
            position,
            rotation,
            matrix: Mat4::from_rotation_translation(euler_xyz(rotation), position),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SkeletonBone {
    pub name: String,
    pub parent: Option<u32>,
    pub keys: Vec<PoseKey>,
}

/// Flat bone list indexed by bone id, filled while a file is scanned.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Skeleton {
    pub bones: Vec<SkeletonBone>,
}

/// Node tree and bind offsets of a resolved skeleton.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSkeleton {
    pub root: NodeAsset,
    /// Indexed by bone id.
    pub bindings: Vec<BoneBinding>,
}

impl Skeleton {
    pub fn len(&self) -> usize {
        self.bones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    /// Returns the bone with `id`, growing the list with placeholders if needed.
    pub fn bone_mut(&mut self, id: u32) -> &mut SkeletonBone {
        let index = id as usize;
        if index >= self.bones.len() {
            self.bones.resize_with(index + 1, SkeletonBone::default);
        }
        &mut self.bones[index]
    }

    /// Names placeholder bones that were referenced but never declared.
    ///
    /// Returns whether every bone was declared.
    pub fn ensure_named(&mut self) -> bool {
        let mut complete = true;
        for (index, bone) in self.bones.iter_mut().enumerate() {
            if bone.name.is_empty() {
                complete = false;
                bone.name = format!("<bone_{}>", index);
            }
        }
        if !complete {
            warn!("Not all bones have been declared, placeholders were named");
        }
        complete
    }

    pub fn has_keys(&self) -> bool {
        self.bones.iter().any(|bone| !bone.keys.is_empty())
    }

    /// Shifts all key times so the earliest becomes zero, returning the
    /// largest shifted time.
    pub fn normalize_times(&mut self) -> f64 {
        let keys = || self.bones.iter().flat_map(|bone| bone.keys.iter());
        let Some(smallest) = keys().map(|key| key.time).reduce(f64::min) else {
            return 0.0;
        };
        let mut duration: f64 = 0.0;
        for key in self.bones.iter_mut().flat_map(|bone| bone.keys.iter_mut()) {
            key.time -= smallest;
            duration = duration.max(key.time);
        }
        duration
    }

    /// Builds the bone node tree below a root named `root_name`.
    ///
    /// Each node takes the first pose of its bone as local transform. A bone
    /// whose parent is out of range or unreachable is placed below the root.
    pub fn resolve(&self, root_name: &str, max_depth: usize) -> Result<ResolvedSkeleton, SkeletonError> {
        let mut builder = TreeBuilder {
            skeleton: self,
            absolute: vec![Mat4::IDENTITY; self.bones.len()],
            visited: vec![false; self.bones.len()],
            max_depth,
        };
        let mut root = NodeAsset::new(root_name);
        root.children = builder.children(None, Mat4::IDENTITY, 0)?;
        for index in 0..self.bones.len() {
            if !builder.visited[index] {
                warn!(
                    "Bone {} ({}) is not connected to the hierarchy, attaching it to the root",
                    index, self.bones[index].name
                );
                let node = builder.bone_node(index, Mat4::IDENTITY, 0)?;
                root.children.push(node);
            }
        }

        let bindings = self
            .bones
            .iter()
            .zip(&builder.absolute)
            .map(|(bone, absolute)| BoneBinding {
                name: bone.name.clone(),
                offset: absolute.inverse(),
            })
            .collect();
        Ok(ResolvedSkeleton { root, bindings })
    }

    /// One channel per bone with pose keys; bones without keys are skipped.
    pub fn animation(&self, name: Option<String>, duration: f64, ticks_per_second: f64) -> AnimationAsset {
        let channels = self
            .bones
            .iter()
            .filter(|bone| !bone.keys.is_empty())
            .map(|bone| NodeAnimation {
                node_name: bone.name.clone(),
                position_keys: bone
                    .keys
                    .iter()
                    .map(|key| AnimationKeyFrame::new(key.time, key.position))
                    .collect(),
                rotation_keys: bone
                    .keys
                    .iter()
                    .map(|key| AnimationKeyFrame::new(key.time, euler_xyz(key.rotation)))
                    .collect(),
                scaling_keys: Vec::new(),
            })
            .collect();
        AnimationAsset {
            name,
            duration,
            ticks_per_second,
            channels,
        }
    }
}

struct TreeBuilder<'a> {
    skeleton: &'a Skeleton,
    absolute: Vec<Mat4>,
    visited: Vec<bool>,
    max_depth: usize,
}

impl TreeBuilder<'_> {
    fn children(
        &mut self,
        parent: Option<usize>,
        parent_absolute: Mat4,
        depth: usize,
    ) -> Result<Vec<NodeAsset>, SkeletonError> {
        if depth > self.max_depth {
            return Err(SkeletonError::TooDeep(self.max_depth));
        }
        let bone_count = self.skeleton.bones.len();
        let mut nodes = Vec::new();
        for (index, bone) in self.skeleton.bones.iter().enumerate() {
            let bone_parent = bone
                .parent
                .map(|parent| parent as usize)
                .filter(|parent| *parent < bone_count && *parent != index);
            if bone_parent != parent || self.visited[index] {
                continue;
            }
            nodes.push(self.bone_node(index, parent_absolute, depth)?);
        }
        Ok(nodes)
    }

    fn bone_node(
        &mut self,
        index: usize,
        parent_absolute: Mat4,
        depth: usize,
    ) -> Result<NodeAsset, SkeletonError> {
        self.visited[index] = true;
        let bone = &self.skeleton.bones[index];
        let local = bone.keys.first().map_or(Mat4::IDENTITY, |key| key.matrix);
        let absolute = parent_absolute * local;
        self.absolute[index] = absolute;
        Ok(NodeAsset {
            name: bone.name.clone(),
            transform: local,
            meshes: Vec::new(),
            children: self.children(Some(index), absolute, depth + 1)?,
        })
    }
}
