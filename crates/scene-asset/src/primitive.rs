pub type Position = [f32; 3];
pub type Normal = [f32; 3];
pub type TexCoord = [f32; 2];
pub type VertexColor = [f32; 4];

/// Primitive type of a face, derived from its index count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PrimitiveKind {
    Point,
    Line,
    Triangle,
    Polygon,
}

impl PrimitiveKind {
    pub fn from_arity(count: usize) -> Option<Self> {
        match count {
            0 => None,
            1 => Some(PrimitiveKind::Point),
            2 => Some(PrimitiveKind::Line),
            3 => Some(PrimitiveKind::Triangle),
            _ => Some(PrimitiveKind::Polygon),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Face {
    pub indices: Vec<u32>,
}

impl Face {
    pub fn new(indices: Vec<u32>) -> Self {
        Self { indices }
    }

    pub fn kind(&self) -> Option<PrimitiveKind> {
        PrimitiveKind::from_arity(self.indices.len())
    }
}

impl From<[u32; 3]> for Face {
    fn from(indices: [u32; 3]) -> Self {
        Self {
            indices: indices.to_vec(),
        }
    }
}

/// Per-vertex data of a mesh.
///
/// Every attribute array is parallel to `position`. An attribute a format
/// does not provide is left out entirely instead of being partially filled.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshAttributes {
    pub position: Vec<Position>,
    pub normal: Vec<Normal>,
    pub tex_coords: Vec<Vec<TexCoord>>,
    pub colors: Vec<Vec<VertexColor>>,
}

impl MeshAttributes {
    pub fn len(&self) -> usize {
        self.position.len()
    }

    pub fn is_empty(&self) -> bool {
        self.position.is_empty()
    }
}
