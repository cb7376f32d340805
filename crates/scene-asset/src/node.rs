use glam::{Mat4, Quat, Vec3};

/// Transform split into its translation, rotation and scale parts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecomposedTransform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for DecomposedTransform {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl From<DecomposedTransform> for Mat4 {
    fn from(value: DecomposedTransform) -> Self {
        Mat4::from_scale_rotation_translation(value.scale, value.rotation, value.translation)
    }
}

impl From<Mat4> for DecomposedTransform {
    fn from(value: Mat4) -> Self {
        let (scale, rotation, translation) = value.to_scale_rotation_translation();
        Self {
            translation,
            rotation,
            scale,
        }
    }
}

/// A node of the scene tree.
///
/// Nodes own their children; the parent of a node is the node whose
/// `children` contains it, so a node never has two parents.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeAsset {
    pub name: String,
    /// Transform relative to the parent node.
    pub transform: Mat4,
    /// Indices into the owning scene's mesh list.
    pub meshes: Vec<usize>,
    pub children: Vec<NodeAsset>,
}

impl Default for NodeAsset {
    fn default() -> Self {
        Self {
            name: String::new(),
            transform: Mat4::IDENTITY,
            meshes: Vec::new(),
            children: Vec::new(),
        }
    }
}

impl NodeAsset {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_transform(mut self, transform: Mat4) -> Self {
        self.transform = transform;
        self
    }

    pub fn get(&self, path: &[usize]) -> Option<&NodeAsset> {
        path.iter()
            .try_fold(self, |node, index| node.children.get(*index))
    }

    pub fn get_mut(&mut self, path: &[usize]) -> Option<&mut NodeAsset> {
        let mut node = self;
        for index in path {
            node = node.children.get_mut(*index)?;
        }
        Some(node)
    }

    /// Visits every node in depth-first pre-order together with its depth.
    pub fn visit(&self, mut visitor: impl FnMut(&NodeAsset, usize)) {
        let mut stack = vec![(self, 0)];
        while let Some((node, depth)) = stack.pop() {
            visitor(node, depth);
            stack.extend(node.children.iter().rev().map(|child| (child, depth + 1)));
        }
    }

    pub fn visit_mut(&mut self, mut visitor: impl FnMut(&mut NodeAsset)) {
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            visitor(node);
            stack.extend(node.children.iter_mut().rev());
        }
    }

    pub fn find(&self, name: &str) -> Option<&NodeAsset> {
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            if node.name == name {
                return Some(node);
            }
            stack.extend(node.children.iter().rev());
        }
        None
    }

    pub fn node_count(&self) -> usize {
        let mut count = 0;
        self.visit(|_, _| count += 1);
        count
    }

    /// Accumulated transform of the node at `path`, including this node's own.
    pub fn global_transform(&self, path: &[usize]) -> Option<Mat4> {
        let mut node = self;
        let mut transform = self.transform;
        for index in path {
            node = node.children.get(*index)?;
            transform *= node.transform;
        }
        Some(transform)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn tree() -> NodeAsset {
        let mut root = NodeAsset::new("root");
        let mut arm = NodeAsset::new("arm").with_transform(Mat4::from_translation(Vec3::X));
        arm.children
            .push(NodeAsset::new("hand").with_transform(Mat4::from_translation(Vec3::Y)));
        root.children.push(arm);
        root.children.push(NodeAsset::new("leg"));
        root
    }

    #[test]
    fn paths_and_lookup() {
        let root = tree();
        assert_eq!(root.get(&[0, 0]).map(|node| node.name.as_str()), Some("hand"));
        assert!(root.get(&[2]).is_none());
        assert!(root.find("leg").is_some());
        assert_eq!(root.node_count(), 4);
    }

    #[test]
    fn visit_is_preorder() {
        let root = tree();
        let mut names = Vec::new();
        root.visit(|node, depth| names.push((node.name.clone(), depth)));
        let names: Vec<_> = names.iter().map(|(name, depth)| (name.as_str(), *depth)).collect();
        assert_eq!(names, [("root", 0), ("arm", 1), ("hand", 2), ("leg", 1)]);
    }

    #[test]
    fn global_transform_accumulates() {
        let root = tree();
        let global = root.global_transform(&[0, 0]).unwrap();
        assert!(global
            .transform_point3(Vec3::ZERO)
            .abs_diff_eq(Vec3::new(1.0, 1.0, 0.0), 1e-6));
    }

    #[test]
    fn decomposed_round_trip() {
        let decomposed = DecomposedTransform {
            translation: Vec3::new(1.0, 2.0, 3.0),
            rotation: Quat::from_rotation_y(0.5),
            scale: Vec3::splat(2.0),
        };
        let back = DecomposedTransform::from(Mat4::from(decomposed));
        assert!(back.translation.abs_diff_eq(decomposed.translation, 1e-5));
        assert!(back.rotation.abs_diff_eq(decomposed.rotation, 1e-5));
        assert!(back.scale.abs_diff_eq(decomposed.scale, 1e-5));
    }
}
