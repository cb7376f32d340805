//! Grafting of separately imported scenes into a master scene.

use std::{
    collections::HashMap,
    error::Error,
    fmt::{self, Display, Formatter},
};

use log::debug;

use crate::{index::NodePath, scene::SceneAsset};

/// A scene to graft below the node at `target`.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub scene: SceneAsset,
    pub target: NodePath,
    /// Replace a root with a single child by that child before grafting.
    pub elide_wrapper: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeOptions {
    pub unique_node_names: bool,
    /// Only rename nodes whose name is already taken.
    pub only_if_necessary: bool,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            unique_node_names: true,
            only_if_necessary: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeError {
    MissingTarget(NodePath),
}

impl Display for MergeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            MergeError::MissingTarget(path) => {
                write!(f, "Attachment node {} does not exist", path)
            }
        }
    }
}

impl Error for MergeError {}

fn qualify(prefix: &str, name: Option<String>, fallback: impl FnOnce() -> String) -> String {
    format!("{}{}", prefix, name.unwrap_or_else(fallback))
}

/// Moves the content of every attachment into `master`.
///
/// Meshes and materials always get a name prefix unique to their
/// attachment. Nodes are renamed according to `options`, and bones,
/// animation channels, lights and cameras follow the renamed nodes.
pub fn merge_scenes(
    mut master: SceneAsset,
    attachments: Vec<Attachment>,
    options: MergeOptions,
) -> Result<SceneAsset, MergeError> {
    if let Some(missing) = attachments
        .iter()
        .find(|attachment| master.root.get(&attachment.target.0).is_none())
    {
        return Err(MergeError::MissingTarget(missing.target.clone()));
    }

    let mut taken = master.node_names();
    for (index, attachment) in attachments.into_iter().enumerate() {
        let prefix = format!("sub{}_", index);
        let mut scene = attachment.scene;
        if attachment.elide_wrapper {
            if let Some(wrapper) = scene.elide_single_child_root() {
                scene.root.transform = wrapper * scene.root.transform;
            }
        }

        let mesh_offset = master.meshes.len();
        let material_offset = master.materials.len();
        let existing = taken.clone();
        let mut renamed: HashMap<String, String> = HashMap::new();
        scene.root.visit_mut(|node| {
            let rename = options.unique_node_names
                && (!options.only_if_necessary || existing.contains(&node.name));
            if rename {
                let name = format!("{}{}", prefix, node.name);
                renamed
                    .entry(node.name.clone())
                    .or_insert_with(|| name.clone());
                node.name = name;
            }
            taken.insert(node.name.clone());
            for mesh in &mut node.meshes {
                *mesh += mesh_offset;
            }
        });
        let rename = |name: &mut String| {
            if let Some(new_name) = renamed.get(name.as_str()) {
                *name = new_name.clone();
            }
        };

        for (mesh_index, mut mesh) in scene.meshes.into_iter().enumerate() {
            mesh.name = Some(qualify(&prefix, mesh.name.take(), || {
                format!("mesh{}", mesh_index)
            }));
            mesh.material += material_offset;
            mesh.bones.iter_mut().for_each(|bone| rename(&mut bone.name));
            master.meshes.push(mesh);
        }
        for (material_index, mut material) in scene.materials.into_iter().enumerate() {
            material.name = Some(qualify(&prefix, material.name.take(), || {
                format!("material{}", material_index)
            }));
            master.materials.push(material);
        }
        for mut animation in scene.animations {
            animation.name = animation.name.map(|name| format!("{}{}", prefix, name));
            animation
                .channels
                .iter_mut()
                .for_each(|channel| rename(&mut channel.node_name));
            master.animations.push(animation);
        }
        for mut light in scene.lights {
            rename(&mut light.name);
            master.lights.push(light);
        }
        for mut camera in scene.cameras {
            rename(&mut camera.name);
            master.cameras.push(camera);
        }

        debug!(
            "Grafting {} below {} with {} renamed nodes",
            scene.root.name,
            attachment.target,
            renamed.len()
        );
        let target = master
            .root
            .get_mut(&attachment.target.0)
            .ok_or_else(|| MergeError::MissingTarget(attachment.target.clone()))?;
        target.children.push(scene.root);
    }
    Ok(master)
}
