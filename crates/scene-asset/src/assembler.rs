//! Conversion of intermediate [`Object`] trees into nodes, meshes and materials.
//!
//! Geometry is partitioned by material: every material referenced by the
//! surfaces of an object yields one mesh holding exactly the faces using it.
//! Face and vertex totals are computed before any buffer is written, and a
//! written mesh must match its precomputed totals.

use std::{
    error::Error,
    fmt::{self, Display, Formatter},
};

use glam::{Mat4, Vec3};
use log::{debug, error, info, warn};

use crate::{
    material::{MaterialAsset, ShadingModel},
    mesh::MeshAsset,
    node::NodeAsset,
    primitive::{Face, MeshAttributes, Normal, Position, TexCoord},
    records::{Object, ObjectKind, SourceMaterial, Surface, SurfaceRef, SurfaceTopology},
    skin::{BoneBinding, WeightAccumulator},
    texture::{TextureAssetTransform, TextureKind, TextureSlot},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssembleError {
    NoFaces {
        object: String,
    },
    NoVertices {
        object: String,
    },
    VertexCountMismatch {
        object: String,
        expected: usize,
        written: usize,
    },
    TooDeep(usize),
}

impl Display for AssembleError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            AssembleError::NoFaces { object } => write!(f, "No faces in object {}", object),
            AssembleError::NoVertices { object } => write!(f, "No vertices in object {}", object),
            AssembleError::VertexCountMismatch {
                object,
                expected,
                written,
            } => write!(
                f,
                "Invalid number of vertices in object {}: expected {}, written {}",
                object, expected, written
            ),
            AssembleError::TooDeep(limit) => {
                write!(f, "Object hierarchy is deeper than {} levels", limit)
            }
        }
    }
}

impl Error for AssembleError {}

/// External subdivision surface evaluation.
pub trait Subdivider {
    /// Returns the meshes that replace `meshes` after `levels` subdivision steps.
    fn subdivide(&self, meshes: Vec<MeshAsset>, levels: u32) -> Vec<MeshAsset>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssembleOptions {
    pub split_double_sided: bool,
    pub eval_subdivision: bool,
    pub max_depth: usize,
}

impl Default for AssembleOptions {
    fn default() -> Self {
        Self {
            split_double_sided: true,
            eval_subdivision: true,
            max_depth: 1000,
        }
    }
}

/// How surface material indices map to output materials.
#[derive(Debug, Clone, Copy)]
pub enum MaterialBinding<'a> {
    /// Every (object, source material) pair in use is converted into its own
    /// output material carrying the object's texture.
    PerObject(&'a [SourceMaterial]),
    /// Surface material indices already are indices into the scene's materials.
    Shared { count: usize },
}

/// Counters for names of unnamed nodes, per object kind.
#[derive(Debug, Clone, Default)]
pub struct NameCounters {
    prefix: String,
    world: usize,
    group: usize,
    poly: usize,
    light: usize,
}

impl NameCounters {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Default::default()
        }
    }

    pub fn next(&mut self, kind: ObjectKind) -> String {
        let counter = match kind {
            ObjectKind::World => &mut self.world,
            ObjectKind::Group => &mut self.group,
            ObjectKind::Poly => &mut self.poly,
            ObjectKind::Light => &mut self.light,
        };
        let name = format!("{}{}_{}", self.prefix, kind.label(), counter);
        *counter += 1;
        name
    }
}

/// Converts a source material for use by one object.
pub fn convert_material(object: &Object, source: &SourceMaterial) -> MaterialAsset {
    let textures = object
        .textures
        .first()
        .map(|path| {
            let mut slot = TextureSlot::new(TextureKind::Diffuse, path.clone());
            if object.tex_repeat != [1.0, 1.0] || object.tex_offset != [0.0, 0.0] {
                slot.transform = Some(TextureAssetTransform {
                    offset: object.tex_offset,
                    rotation: 0.0,
                    scale: object.tex_repeat,
                });
            }
            slot
        })
        .into_iter()
        .collect();

    MaterialAsset {
        name: source.name.clone(),
        ambient_color: source.ambient,
        diffuse_color: source.diffuse,
        specular_color: source.specular,
        emissive_color: source.emissive,
        shininess: source.shininess,
        opacity: 1.0 - source.transparency,
        shading: if source.shininess != 0.0 {
            ShadingModel::Phong
        } else {
            ShadingModel::Gouraud
        },
        two_sided: false,
        textures,
    }
}

fn object_label(object: &Object) -> String {
    match &object.name {
        Some(name) if !name.is_empty() => name.clone(),
        _ => format!("<unnamed {}>", object.kind.label()),
    }
}

/// Builds the scene content of one import.
pub struct SceneAssembler<'a> {
    options: AssembleOptions,
    binding: MaterialBinding<'a>,
    bones: &'a [BoneBinding],
    subdivider: Option<&'a dyn Subdivider>,
    counters: NameCounters,
    meshes: Vec<MeshAsset>,
    materials: Vec<MaterialAsset>,
}

impl<'a> SceneAssembler<'a> {
    pub fn new(options: AssembleOptions, binding: MaterialBinding<'a>) -> Self {
        Self {
            options,
            binding,
            bones: &[],
            subdivider: None,
            counters: NameCounters::default(),
            meshes: Vec::new(),
            materials: Vec::new(),
        }
    }

    pub fn with_bones(mut self, bones: &'a [BoneBinding]) -> Self {
        self.bones = bones;
        self
    }

    pub fn with_subdivider(mut self, subdivider: Option<&'a dyn Subdivider>) -> Self {
        self.subdivider = subdivider;
        self
    }

    pub fn with_counters(mut self, counters: NameCounters) -> Self {
        self.counters = counters;
        self
    }

    pub fn meshes(&self) -> &[MeshAsset] {
        &self.meshes
    }

    /// Materials converted so far; always empty with [`MaterialBinding::Shared`].
    pub fn materials(&self) -> &[MaterialAsset] {
        &self.materials
    }

    pub fn finish(self) -> (Vec<MeshAsset>, Vec<MaterialAsset>) {
        (self.meshes, self.materials)
    }

    /// Converts `object` and all of its descendants into a node tree.
    pub fn assemble_tree(&mut self, object: &mut Object) -> Result<NodeAsset, AssembleError> {
        self.assemble_node(object, 0)
    }

    fn assemble_node(
        &mut self,
        object: &mut Object,
        depth: usize,
    ) -> Result<NodeAsset, AssembleError> {
        if depth > self.options.max_depth {
            return Err(AssembleError::TooDeep(self.options.max_depth));
        }

        let meshes = self.assemble_meshes(object)?;
        let name = match &object.name {
            Some(name) if !name.is_empty() => name.clone(),
            _ => self.counters.next(object.kind),
        };

        let mut transform = Mat4::from_mat3(object.rotation);
        if object.kind == ObjectKind::Group || object.reference_count() == 0 {
            transform.w_axis = object.translation.extend(1.0);
        }

        let mut children = Vec::with_capacity(object.children.len());
        for child in &mut object.children {
            children.push(self.assemble_node(child, depth + 1)?);
        }

        Ok(NodeAsset {
            name,
            transform,
            meshes,
            children,
        })
    }

    /// Converts the geometry of a single object, returning the new mesh indices.
    pub fn assemble_meshes(&mut self, object: &mut Object) -> Result<Vec<usize>, AssembleError> {
        if object.vertices.is_empty() {
            return Ok(Vec::new());
        }
        if object.surfaces.is_empty() || object.reference_count() == 0 {
            info!(
                "No surfaces reference the vertices of object {}, a point list is returned",
                object_label(object)
            );
            let start = self.meshes.len();
            self.emit_point_cloud(object);
            return Ok(self.subdivide(object, start));
        }

        let label = object_label(object);
        let material_count = self.material_count().max(1);
        sanitize_surfaces(object, material_count, &label);

        let split = self.options.split_double_sided;
        let mut budgets = vec![(0usize, 0usize); material_count];
        let mut double_sided = vec![false; material_count];
        for surface in &object.surfaces {
            let (faces, vertices) = surface_budget(surface, split);
            budgets[surface.material].0 += faces;
            budgets[surface.material].1 += vertices;
            double_sided[surface.material] |= surface.double_sided;
        }

        let object: &Object = object;
        let offset = if object.kind == ObjectKind::Group {
            Vec3::ZERO
        } else {
            object.translation
        };
        let start = self.meshes.len();
        for (material, &(face_count, vertex_count)) in budgets.iter().enumerate() {
            if face_count == 0 {
                continue;
            }
            if vertex_count == 0 {
                return Err(AssembleError::NoVertices { object: label });
            }

            let mut writer = MeshWriter::new(object, offset, vertex_count, self.bones.len());
            for surface in object
                .surfaces
                .iter()
                .filter(|surface| surface.material == material)
            {
                writer.emit_surface(surface, split, &label)?;
            }
            let mut mesh = writer.finish(face_count, self.bones, &label)?;
            mesh.material = self.bind_material(object, material, double_sided[material] && !split);
            self.meshes.push(mesh);
        }
        Ok(self.subdivide(object, start))
    }

    fn material_count(&self) -> usize {
        match self.binding {
            MaterialBinding::PerObject(sources) => sources.len(),
            MaterialBinding::Shared { count } => count,
        }
    }

    fn bind_material(&mut self, object: &Object, source: usize, two_sided: bool) -> usize {
        match self.binding {
            MaterialBinding::PerObject(sources) => {
                let source = sources.get(source).cloned().unwrap_or_default();
                let mut material = convert_material(object, &source);
                material.two_sided = two_sided;
                self.materials.push(material);
                self.materials.len() - 1
            }
            MaterialBinding::Shared { .. } => source,
        }
    }

    fn emit_point_cloud(&mut self, object: &Object) {
        let mut weights = (!object.influences.is_empty() && !self.bones.is_empty())
            .then(|| WeightAccumulator::new(self.bones.len()));
        let mut faces = Vec::with_capacity(object.vertices.len());
        for index in 0..object.vertices.len() as u32 {
            faces.push(Face::new(vec![index]));
            if let (Some(weights), Some(influence)) =
                (&mut weights, object.influences.get(index as usize))
            {
                weights.add_vertex(index, influence);
            }
        }

        let material = match self.binding {
            MaterialBinding::PerObject(sources) => {
                if self.materials.is_empty() {
                    let source = sources.first().cloned().unwrap_or_default();
                    self.materials.push(convert_material(object, &source));
                }
                0
            }
            MaterialBinding::Shared { .. } => 0,
        };

        let normal = if object.normals.len() == object.vertices.len() {
            object.normals.iter().map(|normal| normal.to_array()).collect()
        } else {
            Vec::new()
        };
        self.meshes.push(MeshAsset {
            name: object.name.clone(),
            attributes: MeshAttributes {
                position: object.vertices.iter().map(|vertex| vertex.to_array()).collect(),
                normal,
                ..Default::default()
            },
            faces,
            material,
            bones: weights
                .map(|weights| weights.into_bones(self.bones))
                .unwrap_or_default(),
        });
    }

    fn subdivide(&mut self, object: &Object, start: usize) -> Vec<usize> {
        if object.subdivision > 0 && start < self.meshes.len() {
            match (self.options.eval_subdivision, self.subdivider) {
                (true, Some(subdivider)) => {
                    let meshes = self.meshes.split_off(start);
                    let subdivided = subdivider.subdivide(meshes, object.subdivision);
                    self.meshes.extend(subdivided);
                }
                (true, None) => info!(
                    "No subdivider available, object {} keeps its control mesh",
                    object_label(object)
                ),
                (false, _) => debug!(
                    "Subdivision disabled, ignoring level {} of object {}",
                    object.subdivision,
                    object_label(object)
                ),
            }
        }
        (start..self.meshes.len()).collect()
    }
}

fn sanitize_surfaces(object: &mut Object, material_count: usize, label: &str) {
    let vertex_count = object.vertices.len();
    for surface in &mut object.surfaces {
        if surface.material >= material_count {
            warn!(
                "Material index {} of object {} is out of range, using material 0",
                surface.material, label
            );
            surface.material = 0;
        }
        if let SurfaceTopology::Unknown(flags) = surface.topology {
            warn!(
                "Unknown surface type {:#x} in object {}, treating it as polygon",
                flags, label
            );
            surface.topology = SurfaceTopology::Polygon;
        }
        if surface.refs.is_empty() {
            warn!("Surface of object {} references no vertices", label);
        }
        for reference in &mut surface.refs {
            if reference.vertex >= vertex_count {
                error!(
                    "Vertex index {} of object {} is out of range, using vertex 0",
                    reference.vertex, label
                );
                reference.vertex = 0;
            }
        }
    }
}

/// Faces and vertices a surface contributes to its mesh.
fn surface_budget(surface: &Surface, split_double_sided: bool) -> (usize, usize) {
    let count = surface.refs.len();
    let sides = if surface.double_sided && split_double_sided {
        2
    } else {
        1
    };
    match surface.topology {
        SurfaceTopology::Polygon | SurfaceTopology::Unknown(_) => {
            if count == 0 {
                (0, 0)
            } else {
                (sides, count * sides)
            }
        }
        SurfaceTopology::ClosedLine => {
            if count < 2 {
                (0, 0)
            } else {
                (count, count * 2)
            }
        }
        SurfaceTopology::OpenLine => {
            let faces = count.saturating_sub(1);
            (faces, faces * 2)
        }
        SurfaceTopology::TriangleStrip => {
            let faces = count.saturating_sub(2);
            (faces * sides, faces * 3 * sides)
        }
    }
}

struct MeshWriter<'o> {
    object: &'o Object,
    offset: Vec3,
    expected_vertices: usize,
    position: Vec<Position>,
    normal: Option<Vec<Normal>>,
    tex_coord: Option<Vec<TexCoord>>,
    faces: Vec<Face>,
    weights: Option<WeightAccumulator>,
}

impl<'o> MeshWriter<'o> {
    fn new(object: &'o Object, offset: Vec3, expected_vertices: usize, bone_count: usize) -> Self {
        let has_normals =
            !object.normals.is_empty() && object.normals.len() == object.vertices.len();
        let has_weights = bone_count > 0 && !object.influences.is_empty();
        Self {
            object,
            offset,
            expected_vertices,
            position: Vec::with_capacity(expected_vertices),
            normal: has_normals.then(|| Vec::with_capacity(expected_vertices)),
            tex_coord: object
                .has_tex_coords
                .then(|| Vec::with_capacity(expected_vertices)),
            faces: Vec::new(),
            weights: has_weights.then(|| WeightAccumulator::new(bone_count)),
        }
    }

    fn push_vertex(&mut self, reference: &SurfaceRef, label: &str) -> Result<u32, AssembleError> {
        let index = self.position.len();
        if index >= self.expected_vertices {
            return Err(AssembleError::VertexCountMismatch {
                object: label.to_string(),
                expected: self.expected_vertices,
                written: index + 1,
            });
        }

        let vertex = reference.vertex;
        let position = self.object.vertices.get(vertex).copied().unwrap_or_default();
        self.position.push((position + self.offset).to_array());
        if let Some(normal) = &mut self.normal {
            normal.push(self.object.normals.get(vertex).copied().unwrap_or_default().to_array());
        }
        if let Some(tex_coord) = &mut self.tex_coord {
            tex_coord.push(reference.uv);
        }
        if let (Some(weights), Some(influence)) =
            (&mut self.weights, self.object.influences.get(vertex))
        {
            weights.add_vertex(index as u32, influence);
        }
        Ok(index as u32)
    }

    fn push_face(&mut self, refs: &[SurfaceRef], label: &str) -> Result<(), AssembleError> {
        let mut indices = Vec::with_capacity(refs.len());
        for reference in refs {
            indices.push(self.push_vertex(reference, label)?);
        }
        self.faces.push(Face::new(indices));
        Ok(())
    }

    fn emit_surface(
        &mut self,
        surface: &Surface,
        split_double_sided: bool,
        label: &str,
    ) -> Result<(), AssembleError> {
        let refs = surface.refs.as_slice();
        let back = surface.double_sided && split_double_sided;
        match surface.topology {
            SurfaceTopology::Polygon | SurfaceTopology::Unknown(_) => {
                if refs.is_empty() {
                    return Ok(());
                }
                self.push_face(refs, label)?;
                if back {
                    let reversed: Vec<SurfaceRef> = refs.iter().rev().copied().collect();
                    self.push_face(&reversed, label)?;
                }
            }
            SurfaceTopology::ClosedLine => {
                if refs.len() >= 2 {
                    for (index, reference) in refs.iter().enumerate() {
                        let next = refs[(index + 1) % refs.len()];
                        self.push_face(&[*reference, next], label)?;
                    }
                }
            }
            SurfaceTopology::OpenLine => {
                for segment in refs.windows(2) {
                    self.push_face(segment, label)?;
                }
            }
            SurfaceTopology::TriangleStrip => {
                for (step, window) in refs.windows(3).enumerate() {
                    let triangle = if step % 2 == 0 {
                        [window[0], window[1], window[2]]
                    } else {
                        [window[1], window[0], window[2]]
                    };
                    self.push_face(&triangle, label)?;
                    if back {
                        self.push_face(&[triangle[2], triangle[1], triangle[0]], label)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn finish(
        self,
        expected_faces: usize,
        bones: &[BoneBinding],
        label: &str,
    ) -> Result<MeshAsset, AssembleError> {
        if self.faces.is_empty() {
            return Err(AssembleError::NoFaces {
                object: label.to_string(),
            });
        }
        if self.position.len() != self.expected_vertices || self.faces.len() != expected_faces {
            return Err(AssembleError::VertexCountMismatch {
                object: label.to_string(),
                expected: self.expected_vertices,
                written: self.position.len(),
            });
        }
        Ok(MeshAsset {
            name: self.object.name.clone(),
            attributes: MeshAttributes {
                position: self.position,
                normal: self.normal.unwrap_or_default(),
                tex_coords: self.tex_coord.into_iter().collect(),
                colors: Vec::new(),
            },
            faces: self.faces,
            material: 0,
            bones: self
                .weights
                .map(|weights| weights.into_bones(bones))
                .unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod test {
    use std::cell::Cell;

    use glam::Mat3;

    use super::*;
    use crate::skin::VertexInfluence;

    fn square_object() -> Object {
        let mut object = Object::new(ObjectKind::Poly);
        object.name = Some(String::from("square"));
        object.vertices = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        ];
        object
    }

    fn refs(indices: &[usize]) -> Vec<SurfaceRef> {
        indices
            .iter()
            .map(|index| SurfaceRef::new(*index, [*index as f32 * 0.25, 0.0]))
            .collect()
    }

    fn surface(topology: SurfaceTopology, indices: &[usize]) -> Surface {
        Surface {
            topology,
            double_sided: false,
            material: 0,
            refs: refs(indices),
        }
    }

    fn sources(count: usize) -> Vec<SourceMaterial> {
        (0..count)
            .map(|index| SourceMaterial {
                name: Some(format!("material{}", index)),
                ..Default::default()
            })
            .collect()
    }

    #[test]
    fn point_cloud_fallback() {
        let materials = sources(1);
        let mut assembler =
            SceneAssembler::new(AssembleOptions::default(), MaterialBinding::PerObject(&materials));
        let mut object = square_object();
        let meshes = assembler.assemble_meshes(&mut object).unwrap();
        assert_eq!(meshes, [0]);
        let mesh = &assembler.meshes()[0];
        assert_eq!(mesh.faces.len(), 4);
        assert!(mesh.faces.iter().all(|face| face.indices.len() == 1));
        assert_eq!(mesh.material, 0);
        assert_eq!(assembler.materials().len(), 1);
    }

    #[test]
    fn double_sided_polygon_gets_back_face() {
        let materials = sources(1);
        let mut assembler =
            SceneAssembler::new(AssembleOptions::default(), MaterialBinding::PerObject(&materials));
        let mut object = square_object();
        let mut polygon = surface(SurfaceTopology::Polygon, &[0, 1, 2, 3]);
        polygon.double_sided = true;
        object.has_tex_coords = true;
        object.surfaces.push(polygon);
        assembler.assemble_meshes(&mut object).unwrap();

        let mesh = &assembler.meshes()[0];
        assert_eq!(mesh.faces.len(), 2);
        assert_eq!(mesh.vertex_count(), 8);
        assert_eq!(mesh.attributes.tex_coords[0].len(), 8);
        let position = |index: u32| mesh.attributes.position[index as usize];
        let front: Vec<_> = mesh.faces[0].indices.iter().map(|i| position(*i)).collect();
        let mut back: Vec<_> = mesh.faces[1].indices.iter().map(|i| position(*i)).collect();
        back.reverse();
        assert_eq!(front, back);
        assert!(mesh.faces[1].indices.iter().all(|index| *index >= 4));
    }

    #[test]
    fn double_sided_without_split_flags_material() {
        let materials = sources(1);
        let options = AssembleOptions {
            split_double_sided: false,
            ..Default::default()
        };
        let mut assembler = SceneAssembler::new(options, MaterialBinding::PerObject(&materials));
        let mut object = square_object();
        let mut polygon = surface(SurfaceTopology::Polygon, &[0, 1, 2]);
        polygon.double_sided = true;
        object.surfaces.push(polygon);
        assembler.assemble_meshes(&mut object).unwrap();
        assert_eq!(assembler.meshes()[0].faces.len(), 1);
        assert!(assembler.materials()[0].two_sided);
    }

    #[test]
    fn triangle_strip_alternates_winding() {
        let materials = sources(1);
        let mut assembler =
            SceneAssembler::new(AssembleOptions::default(), MaterialBinding::PerObject(&materials));
        let mut object = square_object();
        object.vertices.push(Vec3::new(2.0, 0.0, 0.0));
        object
            .surfaces
            .push(surface(SurfaceTopology::TriangleStrip, &[0, 1, 2, 3, 4]));
        assembler.assemble_meshes(&mut object).unwrap();

        let mesh = &assembler.meshes()[0];
        assert_eq!(mesh.faces.len(), 3);
        assert_eq!(mesh.vertex_count(), 9);
        let source = |face: usize| -> Vec<[f32; 3]> {
            mesh.faces[face]
                .indices
                .iter()
                .map(|index| mesh.attributes.position[*index as usize])
                .collect()
        };
        let vertex = |index: usize| object.vertices[index].to_array();
        assert_eq!(source(0), [vertex(0), vertex(1), vertex(2)]);
        assert_eq!(source(1), [vertex(2), vertex(1), vertex(3)]);
        assert_eq!(source(2), [vertex(2), vertex(3), vertex(4)]);
    }

    #[test]
    fn polylines() {
        let materials = sources(1);
        let mut assembler =
            SceneAssembler::new(AssembleOptions::default(), MaterialBinding::PerObject(&materials));
        let mut object = square_object();
        object
            .surfaces
            .push(surface(SurfaceTopology::ClosedLine, &[0, 1, 2, 3]));
        object
            .surfaces
            .push(surface(SurfaceTopology::OpenLine, &[0, 1, 2, 3]));
        assembler.assemble_meshes(&mut object).unwrap();
        let mesh = &assembler.meshes()[0];
        assert_eq!(mesh.faces.len(), 4 + 3);
        assert_eq!(mesh.vertex_count(), 14);
        assert!(mesh.faces.iter().all(|face| face.indices.len() == 2));
    }

    #[test]
    fn partition_by_material_and_clamp() {
        let materials = sources(2);
        let mut assembler =
            SceneAssembler::new(AssembleOptions::default(), MaterialBinding::PerObject(&materials));
        let mut object = square_object();
        object.textures.push(String::from("wood.png"));
        object.tex_repeat = [2.0, 2.0];
        let mut first = surface(SurfaceTopology::Polygon, &[0, 1, 2]);
        first.material = 1;
        let mut second = surface(SurfaceTopology::Polygon, &[0, 2, 9]);
        second.material = 7;
        object.surfaces.push(first);
        object.surfaces.push(second);

        let meshes = assembler.assemble_meshes(&mut object).unwrap();
        assert_eq!(meshes.len(), 2);
        assert_eq!(object.surfaces[1].material, 0);
        assert_eq!(object.surfaces[1].refs[2].vertex, 0);

        let (meshes, materials) = assembler.finish();
        assert_eq!(materials.len(), 2);
        assert_eq!(materials[meshes[0].material].name.as_deref(), Some("material0"));
        assert_eq!(materials[meshes[1].material].name.as_deref(), Some("material1"));
        let texture = materials[0].diffuse_texture().unwrap();
        assert_eq!(texture.path, "wood.png");
        assert_eq!(texture.transform.as_ref().unwrap().scale, [2.0, 2.0]);
    }

    #[test]
    fn unknown_topology_is_polygon() {
        let materials = sources(1);
        let mut assembler =
            SceneAssembler::new(AssembleOptions::default(), MaterialBinding::PerObject(&materials));
        let mut object = square_object();
        object
            .surfaces
            .push(surface(SurfaceTopology::Unknown(7), &[0, 1, 2]));
        assembler.assemble_meshes(&mut object).unwrap();
        assert_eq!(assembler.meshes()[0].faces, [Face::from([0, 1, 2])]);
    }

    #[test]
    fn translation_is_baked_for_poly_objects() {
        let materials = sources(1);
        let mut assembler =
            SceneAssembler::new(AssembleOptions::default(), MaterialBinding::PerObject(&materials));
        let mut object = square_object();
        object.translation = Vec3::new(0.0, 0.0, 5.0);
        object.rotation = Mat3::from_rotation_z(1.0);
        object
            .surfaces
            .push(surface(SurfaceTopology::Polygon, &[0, 1, 2]));
        let node = assembler.assemble_tree(&mut object).unwrap();
        assert_eq!(assembler.meshes()[0].attributes.position[0], [0.0, 0.0, 5.0]);
        assert_eq!(node.transform.w_axis, glam::Vec4::W);
        assert_eq!(node.transform, Mat4::from_mat3(object.rotation));

        let mut group = Object::new(ObjectKind::Group);
        group.translation = Vec3::X;
        let node = assembler.assemble_tree(&mut group).unwrap();
        assert_eq!(node.name, "Group_0");
        assert_eq!(node.transform.w_axis, glam::Vec4::new(1.0, 0.0, 0.0, 1.0));
    }

    #[test]
    fn counters_name_unnamed_nodes() {
        let materials = sources(1);
        let mut assembler =
            SceneAssembler::new(AssembleOptions::default(), MaterialBinding::PerObject(&materials))
                .with_counters(NameCounters::new("AC"));
        let mut world = Object::new(ObjectKind::World);
        world.children.push(Object::new(ObjectKind::Poly));
        world.children.push(Object::new(ObjectKind::Poly));
        let node = assembler.assemble_tree(&mut world).unwrap();
        assert_eq!(node.name, "ACWorld_0");
        assert_eq!(node.children[0].name, "ACPoly_0");
        assert_eq!(node.children[1].name, "ACPoly_1");
    }

    #[test]
    fn depth_is_capped() {
        let materials = sources(1);
        let options = AssembleOptions {
            max_depth: 2,
            ..Default::default()
        };
        let mut assembler = SceneAssembler::new(options, MaterialBinding::PerObject(&materials));
        let mut root = Object::new(ObjectKind::Group);
        let mut current = &mut root;
        for _ in 0..3 {
            current.children.push(Object::new(ObjectKind::Group));
            current = &mut current.children[0];
        }
        assert_eq!(
            assembler.assemble_tree(&mut root),
            Err(AssembleError::TooDeep(2))
        );
    }

    #[test]
    fn shared_binding_with_weights() {
        let bones = vec![
            BoneBinding {
                name: String::from("root"),
                offset: Mat4::IDENTITY,
            },
            BoneBinding {
                name: String::from("child"),
                offset: Mat4::IDENTITY,
            },
        ];
        let mut assembler = SceneAssembler::new(
            AssembleOptions::default(),
            MaterialBinding::Shared { count: 2 },
        )
        .with_bones(&bones);
        let mut object = square_object();
        object.influences = vec![
            VertexInfluence::parent(0),
            VertexInfluence {
                parent: Some(0),
                links: vec![(1, 0.5)],
            },
            VertexInfluence::parent(1),
            VertexInfluence::parent(1),
        ];
        let mut triangle = surface(SurfaceTopology::Polygon, &[0, 1, 2]);
        triangle.material = 1;
        object.surfaces.push(triangle);
        let meshes = assembler.assemble_meshes(&mut object).unwrap();
        let mesh = &assembler.meshes()[meshes[0]];
        assert_eq!(mesh.material, 1);
        assert!(assembler.materials().is_empty());
        let total: f32 = mesh
            .bones
            .iter()
            .flat_map(|bone| bone.weights.iter())
            .filter(|weight| weight.vertex == 1)
            .map(|weight| weight.weight)
            .sum();
        assert!((total - 1.0).abs() < 1e-6);
    }

    struct CountingSubdivider(Cell<u32>);

    impl Subdivider for CountingSubdivider {
        fn subdivide(&self, meshes: Vec<MeshAsset>, levels: u32) -> Vec<MeshAsset> {
            self.0.set(self.0.get() + levels);
            meshes
        }
    }

    #[test]
    fn subdivision_hook() {
        let materials = sources(1);
        let subdivider = CountingSubdivider(Cell::new(0));
        let mut assembler =
            SceneAssembler::new(AssembleOptions::default(), MaterialBinding::PerObject(&materials))
                .with_subdivider(Some(&subdivider));
        let mut object = square_object();
        object.subdivision = 2;
        object
            .surfaces
            .push(surface(SurfaceTopology::Polygon, &[0, 1, 2, 3]));
        let meshes = assembler.assemble_meshes(&mut object).unwrap();
        assert_eq!(meshes, [0]);
        assert_eq!(subdivider.0.get(), 2);
    }
}
