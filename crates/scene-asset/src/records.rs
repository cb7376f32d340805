//! Intermediate records shared by the text loaders.
//!
//! A loader scans its file into these plain structs and hands them to the
//! [`crate::assembler`], which never sees format-specific syntax.

use glam::{Mat3, Vec3};

use crate::skin::VertexInfluence;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    World,
    Group,
    Poly,
    Light,
}

impl ObjectKind {
    pub fn label(&self) -> &'static str {
        match self {
            ObjectKind::World => "World",
            ObjectKind::Group => "Group",
            ObjectKind::Poly => "Poly",
            ObjectKind::Light => "Light",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceTopology {
    Polygon,
    ClosedLine,
    OpenLine,
    TriangleStrip,
    /// Raw type bits the loader could not map.
    Unknown(u8),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceRef {
    pub vertex: usize,
    pub uv: [f32; 2],
}

impl SurfaceRef {
    pub fn new(vertex: usize, uv: [f32; 2]) -> Self {
        Self { vertex, uv }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Surface {
    pub topology: SurfaceTopology,
    pub double_sided: bool,
    pub material: usize,
    pub refs: Vec<SurfaceRef>,
}

impl Surface {
    pub fn polygon(material: usize, refs: Vec<SurfaceRef>) -> Self {
        Self {
            topology: SurfaceTopology::Polygon,
            double_sided: false,
            material,
            refs,
        }
    }
}

/// Material as declared in the source file, before conversion.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceMaterial {
    pub name: Option<String>,
    pub diffuse: [f32; 3],
    pub ambient: [f32; 3],
    pub emissive: [f32; 3],
    pub specular: [f32; 3],
    pub shininess: f32,
    pub transparency: f32,
}

impl Default for SourceMaterial {
    fn default() -> Self {
        Self {
            name: None,
            diffuse: [0.6, 0.6, 0.6],
            ambient: [0.0, 0.0, 0.0],
            emissive: [0.0, 0.0, 0.0],
            specular: [1.0, 1.0, 1.0],
            shininess: 0.0,
            transparency: 0.0,
        }
    }
}

/// A node of the source hierarchy together with its geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct Object {
    pub kind: ObjectKind,
    pub name: Option<String>,
    pub vertices: Vec<Vec3>,
    /// Either empty or parallel to `vertices`.
    pub normals: Vec<Vec3>,
    /// Either empty or parallel to `vertices`.
    pub influences: Vec<VertexInfluence>,
    /// Whether surface references carry meaningful texture coordinates.
    pub has_tex_coords: bool,
    pub surfaces: Vec<Surface>,
    pub children: Vec<Object>,
    pub translation: Vec3,
    pub rotation: Mat3,
    pub textures: Vec<String>,
    pub tex_repeat: [f32; 2],
    pub tex_offset: [f32; 2],
    pub subdivision: u32,
    pub crease: f32,
}

impl Object {
    pub fn new(kind: ObjectKind) -> Self {
        Self {
            kind,
            name: None,
            vertices: Vec::new(),
            normals: Vec::new(),
            influences: Vec::new(),
            has_tex_coords: false,
            surfaces: Vec::new(),
            children: Vec::new(),
            translation: Vec3::ZERO,
            rotation: Mat3::IDENTITY,
            textures: Vec::new(),
            tex_repeat: [1.0, 1.0],
            tex_offset: [0.0, 0.0],
            subdivision: 0,
            crease: 0.0,
        }
    }

    /// Total number of vertex references over all surfaces.
    pub fn reference_count(&self) -> usize {
        self.surfaces.iter().map(|surface| surface.refs.len()).sum()
    }
}
