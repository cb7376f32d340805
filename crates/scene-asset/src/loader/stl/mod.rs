use std::{
    error::Error,
    fmt::{self, Display, Formatter},
    io::Cursor,
};

use binrw::BinRead;
use log::{info, warn};

use crate::{
    material::MaterialAsset,
    mesh::MeshAsset,
    node::NodeAsset,
    primitive::{Face, MeshAttributes, Normal, Position},
    scene::SceneAsset,
};

use super::cursor::{CursorError, TextCursor};

pub mod format;

use format::{binary_size, StlBinaryFile, HEADER_SIZE};

const DEFAULT_COLOR: [f32; 4] = [0.6, 0.6, 0.6, 0.6];

#[derive(Debug)]
pub enum StlLoadError {
    UnknownRepresentation,
    Format(binrw::Error),
    Cursor(CursorError),
    Empty,
    InvalidVertexCount { solid: String },
    NormalCountMismatch { solid: String },
}

impl Display for StlLoadError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            StlLoadError::UnknownRepresentation => {
                write!(f, "Failed to determine STL storage representation")
            }
            StlLoadError::Format(err) => Display::fmt(err, f),
            StlLoadError::Cursor(err) => Display::fmt(err, f),
            StlLoadError::Empty => write!(f, "File is empty, there are no facets defined"),
            StlLoadError::InvalidVertexCount { solid } => {
                write!(f, "Invalid number of vertices in solid {}", solid)
            }
            StlLoadError::NormalCountMismatch { solid } => write!(
                f,
                "Normal count does not match vertex count in solid {}",
                solid
            ),
        }
    }
}

impl Error for StlLoadError {}

impl From<binrw::Error> for StlLoadError {
    fn from(value: binrw::Error) -> Self {
        Self::Format(value)
    }
}

impl From<CursorError> for StlLoadError {
    fn from(value: CursorError) -> Self {
        Self::Cursor(value)
    }
}

/// Whether `data` has exactly the size its facet count announces.
pub fn is_binary(data: &[u8]) -> bool {
    let Some(count) = data.get(HEADER_SIZE..HEADER_SIZE + 4) else {
        return false;
    };
    let count = u32::from_le_bytes([count[0], count[1], count[2], count[3]]);
    binary_size(count) == data.len() as u64
}

fn is_ascii(data: &[u8]) -> bool {
    let start = data
        .iter()
        .position(|byte| !matches!(byte, b' ' | b'\t'))
        .unwrap_or(data.len());
    let text = &data[start..];
    text.len() > 5 && text.starts_with(b"solid") && text.iter().take(500).all(u8::is_ascii)
}

fn triangle_faces(vertex_count: usize) -> Vec<Face> {
    (0..vertex_count as u32 / 3)
        .map(|face| Face::from([face * 3, face * 3 + 1, face * 3 + 2]))
        .collect()
}

fn default_material(diffuse: [f32; 3]) -> MaterialAsset {
    MaterialAsset {
        diffuse_color: diffuse,
        specular_color: diffuse,
        ..Default::default()
    }
}

/// Loads a binary or ASCII STL file.
pub fn load(data: &[u8]) -> Result<SceneAsset, StlLoadError> {
    if is_binary(data) {
        load_binary(data)
    } else if is_ascii(data) {
        load_ascii(data)
    } else {
        Err(StlLoadError::UnknownRepresentation)
    }
}

fn load_binary(data: &[u8]) -> Result<SceneAsset, StlLoadError> {
    let file = StlBinaryFile::read(&mut Cursor::new(data))?;
    if file.facets.is_empty() {
        return Err(StlLoadError::Empty);
    }

    let materialise = file.header.materialise_color();
    let default_color = match materialise {
        Some(color) => {
            info!("STL: taking code path for Materialise files");
            color.map(|channel| channel as f32 / 255.0)
        }
        None => DEFAULT_COLOR,
    };

    let vertex_count = file.facets.len() * 3;
    let mut position: Vec<Position> = Vec::with_capacity(vertex_count);
    let mut normal: Vec<Normal> = Vec::with_capacity(vertex_count);
    let mut colors = None;
    for (index, facet) in file.facets.iter().enumerate() {
        position.extend(facet.vertices);
        normal.extend([facet.normal; 3]);
        if facet.color.valid() {
            let colors = colors.get_or_insert_with(|| {
                info!("STL: mesh has vertex colors");
                vec![default_color; vertex_count]
            });
            let color = facet.color.to_rgba(materialise.is_some());
            colors[index * 3..index * 3 + 3].fill(color);
        }
    }

    let diffuse = match (materialise, &colors) {
        (Some(_), None) => [default_color[0], default_color[1], default_color[2]],
        _ => [1.0, 1.0, 1.0],
    };
    let mesh = MeshAsset {
        name: None,
        attributes: MeshAttributes {
            position,
            normal,
            colors: colors.into_iter().collect(),
            ..Default::default()
        },
        faces: triangle_faces(vertex_count),
        ..Default::default()
    };

    let mut root = NodeAsset::new("<STL_BINARY>");
    root.children.push(NodeAsset {
        meshes: vec![0],
        ..Default::default()
    });
    Ok(SceneAsset {
        root,
        meshes: vec![mesh],
        materials: vec![default_material(diffuse)],
        ..Default::default()
    })
}

fn load_ascii(data: &[u8]) -> Result<SceneAsset, StlLoadError> {
    let mut cursor = TextCursor::new(data);
    let mut root = NodeAsset::new("<STL_ASCII>");
    let mut meshes = Vec::new();

    while cursor.skip_spaces_and_line_end() && cursor.match_token_ignore_case("solid") {
        let name = cursor.read_token().unwrap_or_default().to_string();
        cursor.skip_line();

        let mut position: Vec<Position> = Vec::new();
        let mut normal: Vec<Normal> = Vec::new();
        let mut facet_vertices = 3;
        loop {
            if !cursor.skip_spaces_and_line_end() {
                warn!("STL: unexpected end of file, 'endsolid' was expected");
                break;
            }
            if cursor.match_token("facet") {
                if facet_vertices != 3 {
                    warn!(
                        "STL: line {}: a new facet begins but the old is not yet complete",
                        cursor.line()
                    );
                }
                facet_vertices = 0;
                if cursor.match_token("normal") {
                    let value = cursor.expect_floats::<3>("facet normal")?;
                    normal.extend([value; 3]);
                } else {
                    warn!(
                        "STL: line {}: a facet normal vector was expected but not found",
                        cursor.line()
                    );
                }
            } else if cursor.match_token("vertex") {
                if facet_vertices >= 3 {
                    warn!(
                        "STL: line {}: a facet with more than 3 vertices has been found",
                        cursor.line()
                    );
                    cursor.skip_line();
                } else {
                    position.push(cursor.expect_floats::<3>("vertex")?);
                    facet_vertices += 1;
                }
            } else if cursor.match_token("endsolid") {
                cursor.skip_line();
                break;
            } else {
                cursor.read_token();
            }
        }

        if position.len() % 3 != 0 {
            return Err(StlLoadError::InvalidVertexCount { solid: name });
        }
        if normal.len() != position.len() {
            return Err(StlLoadError::NormalCountMismatch { solid: name });
        }

        let mut node = NodeAsset::new(name.clone());
        if position.is_empty() {
            warn!("STL: solid {} is empty or invalid, no data loaded", name);
        } else {
            node.meshes.push(meshes.len());
            meshes.push(MeshAsset {
                name: (!name.is_empty()).then_some(name),
                faces: triangle_faces(position.len()),
                attributes: MeshAttributes {
                    position,
                    normal,
                    ..Default::default()
                },
                ..Default::default()
            });
        }
        root.children.push(node);
    }

    if root.children.is_empty() {
        return Err(StlLoadError::UnknownRepresentation);
    }
    if meshes.is_empty() {
        return Err(StlLoadError::Empty);
    }
    Ok(SceneAsset {
        root,
        meshes,
        materials: vec![default_material([1.0, 1.0, 1.0])],
        ..Default::default()
    })
}

#[cfg(test)]
mod test {
    use super::*;

    fn binary_file(header: &[u8], facets: &[([f32; 3], [[f32; 3]; 3], u16)]) -> Vec<u8> {
        let mut data = vec![0u8; HEADER_SIZE];
        data[..header.len()].copy_from_slice(header);
        data.extend((facets.len() as u32).to_le_bytes());
        for (normal, vertices, color) in facets {
            for value in normal.iter().chain(vertices.iter().flatten()) {
                data.extend(value.to_le_bytes());
            }
            data.extend(color.to_le_bytes());
        }
        data
    }

    const TRIANGLE: [[f32; 3]; 3] = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];

    #[test]
    fn binary_facets() {
        let data = binary_file(
            b"plain",
            &[
                ([0.0, 0.0, 1.0], TRIANGLE, 0),
                ([0.0, 0.0, -1.0], TRIANGLE, 0x8000 | (31 << 10)),
            ],
        );
        assert!(is_binary(&data));
        let scene = load(&data).unwrap();
        assert_eq!(scene.root.name, "<STL_BINARY>");
        assert_eq!(scene.root.children[0].meshes, vec![0]);

        let mesh = &scene.meshes[0];
        assert_eq!(mesh.faces.len(), 2);
        assert_eq!(mesh.faces[1].indices, vec![3, 4, 5]);
        assert_eq!(mesh.attributes.normal[4], [0.0, 0.0, -1.0]);
        let colors = &mesh.attributes.colors[0];
        assert_eq!(colors[0], DEFAULT_COLOR);
        assert_eq!(colors[3], [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(scene.materials[0].diffuse_color, [1.0, 1.0, 1.0]);
        scene.validate().unwrap();
    }

    #[test]
    fn materialise_colors() {
        let mut header = b"COLOR=".to_vec();
        header.extend([255, 0, 0, 255]);
        let data = binary_file(&header, &[([0.0, 0.0, 1.0], TRIANGLE, 0)]);
        let scene = load(&data).unwrap();
        assert!(scene.meshes[0].attributes.colors.is_empty());
        assert_eq!(scene.materials[0].diffuse_color, [1.0, 0.0, 0.0]);

        let data = binary_file(&header, &[([0.0, 0.0, 1.0], TRIANGLE, 0x8000 | 31)]);
        let scene = load(&data).unwrap();
        assert_eq!(scene.meshes[0].attributes.colors[0][0], [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(scene.materials[0].diffuse_color, [1.0, 1.0, 1.0]);
    }

    #[test]
    fn empty_binary_is_fatal() {
        let data = binary_file(b"", &[]);
        assert!(matches!(load(&data), Err(StlLoadError::Empty)));
    }

    const ASCII: &str = "solid cube
  facet normal 0 0 1
    outer loop
      vertex 0 0 0
      vertex 1 0 0
      vertex 0 1 0
    endloop
  endfacet
endsolid cube
solid lid
  facet normal 0 1 0
    outer loop
      vertex 0 0 0
      vertex 0 0 1
      vertex 1 0 0
    endloop
  endfacet
endsolid lid
";

    #[test]
    fn ascii_solids() {
        let scene = load(ASCII.as_bytes()).unwrap();
        assert_eq!(scene.root.name, "<STL_ASCII>");
        assert_eq!(scene.root.children.len(), 2);
        assert_eq!(scene.root.children[1].name, "lid");
        assert_eq!(scene.root.children[1].meshes, vec![1]);

        let mesh = &scene.meshes[1];
        assert_eq!(mesh.name.as_deref(), Some("lid"));
        assert_eq!(mesh.attributes.normal, vec![[0.0, 1.0, 0.0]; 3]);
        assert_eq!(mesh.attributes.position[1], [0.0, 0.0, 1.0]);
        assert_eq!(scene.materials.len(), 1);
        scene.validate().unwrap();
    }

    #[test]
    fn empty_solids() {
        assert!(matches!(
            load(b"solid a\nendsolid a\n"),
            Err(StlLoadError::Empty)
        ));

        let with_empty = format!("solid empty\nendsolid empty\n{}", ASCII);
        let scene = load(with_empty.as_bytes()).unwrap();
        assert_eq!(scene.root.children.len(), 3);
        assert!(scene.root.children[0].meshes.is_empty());
        assert_eq!(scene.root.children[1].meshes, vec![0]);
        assert_eq!(scene.meshes.len(), 2);
    }

    #[test]
    fn ascii_errors() {
        let broken = "solid a\nfacet normal 0 0 1\nouter loop\nvertex 0 0 0\nvertex 1 0 0\nendloop\nendfacet\nendsolid a\n";
        assert!(matches!(
            load(broken.as_bytes()),
            Err(StlLoadError::InvalidVertexCount { solid }) if solid == "a"
        ));

        let no_normal = "solid b\nfacet\nvertex 0 0 0\nvertex 1 0 0\nvertex 0 1 0\nendsolid b\n";
        assert!(matches!(
            load(no_normal.as_bytes()),
            Err(StlLoadError::NormalCountMismatch { .. })
        ));

        assert!(matches!(
            load(b"PLY format"),
            Err(StlLoadError::UnknownRepresentation)
        ));
    }
}
