use std::{
    error::Error,
    fmt::{self, Display, Formatter},
};

use glam::{Mat3, Vec3};
use log::{debug, error, info, warn};
use modular_bitfield::prelude::*;

use crate::{
    assembler::{AssembleError, MaterialBinding, NameCounters, SceneAssembler, Subdivider},
    light::{LightAsset, LightKind},
    records::{Object, ObjectKind, SourceMaterial, Surface, SurfaceRef, SurfaceTopology},
    scene::SceneAsset,
};

use super::{
    cursor::{CursorError, TextCursor},
    ImportParams,
};

const ROOT_NAME: &str = "<AC3DWorld>";

#[derive(Debug)]
pub enum AcLoadError {
    BadMagic,
    Cursor(CursorError),
    TooManyVertices { line: usize, count: u32 },
    SurfaceIncomplete { line: usize },
    TooDeep(usize),
    NoObjects,
    NoMeshes,
    Assemble(AssembleError),
}

impl Display for AcLoadError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            AcLoadError::BadMagic => write!(f, "No valid AC3D file, magic sequence not found"),
            AcLoadError::Cursor(err) => Display::fmt(err, f),
            AcLoadError::TooManyVertices { line, count } => {
                write!(f, "Line {}: too many vertices ({})", line, count)
            }
            AcLoadError::SurfaceIncomplete { line } => {
                write!(f, "Line {}: unexpected end of file, surface is incomplete", line)
            }
            AcLoadError::TooDeep(limit) => {
                write!(f, "Objects are nested deeper than {} levels", limit)
            }
            AcLoadError::NoObjects => write!(f, "No objects have been loaded"),
            AcLoadError::NoMeshes => write!(f, "No meshes have been loaded"),
            AcLoadError::Assemble(err) => Display::fmt(err, f),
        }
    }
}

impl Error for AcLoadError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            AcLoadError::Cursor(err) => Some(err),
            AcLoadError::Assemble(err) => Some(err),
            _ => None,
        }
    }
}

impl From<CursorError> for AcLoadError {
    fn from(value: CursorError) -> Self {
        Self::Cursor(value)
    }
}

impl From<AssembleError> for AcLoadError {
    fn from(value: AssembleError) -> Self {
        Self::Assemble(value)
    }
}

#[bitfield]
#[derive(Debug, Clone, Copy)]
struct SurfaceFlags {
    kind: B4,
    shaded: bool,
    double_sided: bool,
    #[skip]
    __: B2,
}

impl SurfaceFlags {
    fn topology(&self) -> SurfaceTopology {
        match self.kind() {
            0 => SurfaceTopology::Polygon,
            1 => SurfaceTopology::ClosedLine,
            2 => SurfaceTopology::OpenLine,
            4 => SurfaceTopology::TriangleStrip,
            kind => SurfaceTopology::Unknown(kind),
        }
    }
}

fn parse_flags(token: &str) -> Option<u32> {
    match token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
    {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => token.parse().ok(),
    }
}

struct AcParser<'a> {
    cursor: TextCursor<'a>,
    line_start: TextCursor<'a>,
    replay: bool,
    data_len: usize,
    max_depth: usize,
    object_count: usize,
    lights: Vec<LightAsset>,
}

impl<'a> AcParser<'a> {
    fn new(data: &'a [u8], max_depth: usize) -> Self {
        let cursor = TextCursor::new(data);
        Self {
            line_start: cursor.clone(),
            cursor,
            replay: false,
            data_len: data.len(),
            max_depth,
            object_count: 0,
            lights: Vec::new(),
        }
    }

    /// Moves to the next non-empty line, or stays on the current one if it
    /// was handed back with [`Self::replay_line`].
    fn advance(&mut self) -> bool {
        if std::mem::take(&mut self.replay) {
            return true;
        }
        if !(self.cursor.skip_line() && self.cursor.skip_spaces_and_line_end()) {
            return false;
        }
        self.line_start = self.cursor.clone();
        true
    }

    fn replay_line(&mut self) {
        self.cursor = self.line_start.clone();
        self.replay = true;
    }

    fn line(&self) -> usize {
        self.cursor.line()
    }

    fn read_floats<const N: usize>(&mut self, expected: &'static str) -> Result<[f32; N], AcLoadError> {
        Ok(self.cursor.expect_floats::<N>(expected)?)
    }

    fn read_material(&mut self) -> Result<SourceMaterial, AcLoadError> {
        let mut material = SourceMaterial::default();
        if self.cursor.clone().rest_of_line().starts_with('"') {
            material.name = self.cursor.read_quoted_or_bare();
        }

        // Format: rgb %f %f %f amb %f %f %f emis %f %f %f spec %f %f %f shi %d trans %f
        macro_rules! field {
            ($key:literal, $count:literal) => {{
                if !self.cursor.match_token($key) {
                    error!("AC3D: line {}: {} was expected", self.line(), $key);
                    return Ok(material);
                }
                self.read_floats::<$count>($key)?
            }};
        }

        material.diffuse = field!("rgb", 3);
        material.ambient = field!("amb", 3);
        material.emissive = field!("emis", 3);
        material.specular = field!("spec", 3);
        material.shininess = field!("shi", 1)[0];
        material.transparency = field!("trans", 1)[0];
        Ok(material)
    }

    /// Reads an `OBJECT` section; the cursor is past the `OBJECT` token.
    fn read_object(&mut self, depth: usize) -> Result<Object, AcLoadError> {
        if depth > self.max_depth {
            return Err(AcLoadError::TooDeep(self.max_depth));
        }
        self.object_count += 1;

        let kind = match self.cursor.read_token().map(str::to_ascii_lowercase).as_deref() {
            Some("light") => ObjectKind::Light,
            Some("group") => ObjectKind::Group,
            Some("world") => ObjectKind::World,
            _ => ObjectKind::Poly,
        };
        let mut object = Object::new(kind);
        let mut light = None;
        if kind == ObjectKind::Light {
            let asset = LightAsset::new(format!("ACLight_{}", self.lights.len()), LightKind::Point);
            object.name = Some(asset.name.clone());
            debug!("AC3D: light source encountered");
            self.lights.push(asset);
            light = Some(self.lights.len() - 1);
        }

        while self.advance() {
            if self.cursor.match_token("kids") {
                let count = self.cursor.read_u32().unwrap_or(0);
                for _ in 0..count {
                    if !self.advance() {
                        warn!("AC3D: wrong number of kids");
                        break;
                    }
                    if !self.cursor.match_token("OBJECT") {
                        warn!("AC3D: line {}: wrong number of kids", self.line());
                        self.replay_line();
                        break;
                    }
                    let child = self.read_object(depth + 1)?;
                    object.children.push(child);
                }
                object.has_tex_coords = !object.textures.is_empty();
                return Ok(object);
            } else if self.cursor.match_token("name") {
                let name = self.cursor.read_quoted_or_bare().unwrap_or_default();
                if let Some(index) = light {
                    self.lights[index].name = name.clone();
                }
                object.name = Some(name);
            } else if self.cursor.match_token("data") {
                debug!("AC3D: line {}: skipping object data", self.line());
                self.advance();
            } else if self.cursor.match_token("texture") {
                let texture = self.cursor.read_quoted_or_bare().unwrap_or_default();
                object.textures.push(texture);
            } else if self.cursor.match_token("texrep") {
                let repeat = self.read_floats::<2>("texture repeat")?;
                object.tex_repeat = if repeat[0] == 0.0 || repeat[1] == 0.0 {
                    [1.0, 1.0]
                } else {
                    repeat
                };
            } else if self.cursor.match_token("texoff") {
                object.tex_offset = self.read_floats::<2>("texture offset")?;
            } else if self.cursor.match_token("rot") {
                let rows = self.read_floats::<9>("rotation")?;
                object.rotation = Mat3::from_cols_array(&rows).transpose();
            } else if self.cursor.match_token("loc") {
                object.translation = Vec3::from_array(self.read_floats::<3>("location")?);
            } else if self.cursor.match_token("subdiv") {
                object.subdivision = self.cursor.read_u32().unwrap_or(0);
            } else if self.cursor.match_token("crease") {
                object.crease = self.cursor.read_f32().unwrap_or(0.0);
            } else if self.cursor.match_token("numvert") {
                self.read_vertices(&mut object)?;
            } else if self.cursor.match_token("numsurf") {
                self.read_surfaces(&mut object)?;
            } else {
                debug!("AC3D: line {}: ignoring unknown token", self.line());
            }
        }
        error!("AC3D: unexpected end of file, 'kids' line was expected");
        object.has_tex_coords = !object.textures.is_empty();
        Ok(object)
    }

    fn read_vertices(&mut self, object: &mut Object) -> Result<(), AcLoadError> {
        let count = self.cursor.expect_u32("vertex count")?;
        if count as usize > self.data_len / 2 {
            return Err(AcLoadError::TooManyVertices {
                line: self.line(),
                count,
            });
        }
        object.vertices.reserve(count as usize);
        for _ in 0..count {
            if !self.advance() {
                error!("AC3D: unexpected end of file, not all vertices have been parsed yet");
                break;
            }
            let Some(x) = self.cursor.read_f32() else {
                error!(
                    "AC3D: line {}: unexpected token, not all vertices have been parsed yet",
                    self.line()
                );
                self.replay_line();
                break;
            };
            let [y, z] = self.read_floats::<2>("vertex")?;
            object.vertices.push(Vec3::new(x, y, z));
        }
        Ok(())
    }

    fn read_surfaces(&mut self, object: &mut Object) -> Result<(), AcLoadError> {
        let count = self.cursor.expect_u32("surface count")?;
        let mut quick3d = false;
        object.surfaces.reserve((count as usize).min(self.data_len));
        for _ in 0..count {
            if !self.advance() {
                return Err(AcLoadError::SurfaceIncomplete { line: self.line() });
            }
            let flags = if self.cursor.match_token("SURF") {
                self.cursor.read_token().and_then(parse_flags).unwrap_or(0)
            } else {
                if !quick3d {
                    warn!("AC3D: line {}: SURF token was expected", self.line());
                    debug!("AC3D: continuing with Quick3D workaround enabled");
                }
                quick3d = true;
                self.replay_line();
                0
            };
            let flags = SurfaceFlags::from_bytes([(flags & 0xff) as u8]);
            let mut surface = Surface {
                topology: flags.topology(),
                double_sided: flags.double_sided(),
                material: 0,
                refs: Vec::new(),
            };

            loop {
                if !self.advance() {
                    return Err(AcLoadError::SurfaceIncomplete { line: self.line() });
                }
                if self.cursor.match_token("mat") {
                    surface.material = self.cursor.read_u32().unwrap_or(0) as usize;
                } else if self.cursor.match_token("refs") {
                    if quick3d && !surface.refs.is_empty() {
                        self.replay_line();
                        break;
                    }
                    let count = self.cursor.expect_u32("reference count")?;
                    surface.refs.reserve((count as usize).min(self.data_len));
                    for _ in 0..count {
                        if !self.advance() {
                            error!("AC3D: unexpected end of file, surface references are incomplete");
                            break;
                        }
                        let vertex = self.cursor.expect_u32("vertex reference")? as usize;
                        let uv = [
                            self.cursor.read_f32().unwrap_or(0.0),
                            self.cursor.read_f32().unwrap_or(0.0),
                        ];
                        surface.refs.push(SurfaceRef::new(vertex, uv));
                    }
                } else {
                    self.replay_line();
                    break;
                }
            }
            object.surfaces.push(surface);
        }
        Ok(())
    }
}

/// Loads an AC3D file.
pub fn load(
    data: &[u8],
    params: &ImportParams,
    subdivider: Option<&dyn Subdivider>,
) -> Result<SceneAsset, AcLoadError> {
    if !data.starts_with(b"AC3D") {
        return Err(AcLoadError::BadMagic);
    }
    let version = data
        .get(4)
        .and_then(|digit| (*digit as char).to_digit(16))
        .unwrap_or(0);
    info!("AC3D file format version: {}", version);

    let mut parser = AcParser::new(data, params.max_depth);
    let mut materials = Vec::new();
    let mut roots = Vec::new();
    while parser.advance() {
        if parser.cursor.match_token("MATERIAL") {
            materials.push(parser.read_material()?);
        } else if parser.cursor.match_token("OBJECT") {
            roots.push(parser.read_object(0)?);
        } else {
            debug!("AC3D: line {}: ignoring unknown token", parser.line());
        }
    }

    if roots.is_empty() || parser.object_count == 0 {
        return Err(AcLoadError::NoObjects);
    }
    if materials.is_empty() {
        warn!("AC3D: no material has been found");
        materials.push(SourceMaterial::default());
    }

    let mut root = if roots.len() == 1 {
        roots.remove(0)
    } else {
        let mut world = Object::new(ObjectKind::World);
        world.children = roots;
        world
    };
    let unnamed_root = root.name.as_deref().map_or(true, str::is_empty);

    let mut assembler =
        SceneAssembler::new(params.assemble_options(), MaterialBinding::PerObject(&materials))
            .with_subdivider(subdivider)
            .with_counters(NameCounters::new("AC"));
    let mut node = assembler.assemble_tree(&mut root)?;
    if unnamed_root && root.kind == ObjectKind::World {
        node.name = String::from(ROOT_NAME);
    }
    let (meshes, materials) = assembler.finish();
    if meshes.is_empty() {
        return Err(AcLoadError::NoMeshes);
    }

    Ok(SceneAsset {
        root: node,
        meshes,
        materials,
        lights: parser.lights,
        ..Default::default()
    })
}

#[cfg(test)]
mod test {
    use glam::Mat4;

    use super::*;
    use crate::{material::ShadingModel, primitive::PrimitiveKind};

    const QUAD: &str = r#"AC3Db
MATERIAL "red" rgb 1 0 0  amb 0.2 0.2 0.2  emis 0 0 0  spec 0.5 0.5 0.5  shi 10  trans 0.25
OBJECT world
kids 1
OBJECT poly
name "quad"
loc 1 0 0
numvert 4
0 0 0
1 0 0
1 1 0
0 1 0
numsurf 1
SURF 0x10
mat 0
refs 4
0 0 0
1 1 0
2 1 1
3 0 1
kids 0
"#;

    fn load_str(text: &str) -> Result<SceneAsset, AcLoadError> {
        load(text.as_bytes(), &ImportParams::default(), None)
    }

    #[test]
    fn quad_with_material() {
        let scene = load_str(QUAD).unwrap();
        assert_eq!(scene.root.name, ROOT_NAME);
        assert_eq!(scene.root.children.len(), 1);

        let quad = &scene.root.children[0];
        assert_eq!(quad.name, "quad");
        assert_eq!(quad.transform, Mat4::IDENTITY);
        assert_eq!(quad.meshes, vec![0]);

        let mesh = &scene.meshes[0];
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.faces.len(), 1);
        assert_eq!(mesh.attributes.position[0], [1.0, 0.0, 0.0]);
        assert_eq!(mesh.attributes.position[2], [2.0, 1.0, 0.0]);
        assert!(mesh.attributes.tex_coords.is_empty());

        let material = &scene.materials[mesh.material];
        assert_eq!(material.name.as_deref(), Some("red"));
        assert_eq!(material.diffuse_color, [1.0, 0.0, 0.0]);
        assert_eq!(material.shading, ShadingModel::Phong);
        assert!((material.opacity - 0.75).abs() < 1e-6);
        scene.validate().unwrap();
    }

    const TWO_SIDED: &str = "AC3Db
OBJECT poly
numvert 3
0 0 0
1 0 0
0 1 0
numsurf 1
SURF 0x20
mat 0
refs 3
0 0 0
1 0 0
2 0 0
kids 0
";

    #[test]
    fn double_sided_surfaces() {
        let scene = load_str(TWO_SIDED).unwrap();
        let mesh = &scene.meshes[0];
        assert_eq!(mesh.faces.len(), 2);
        assert_eq!(mesh.vertex_count(), 6);
        assert_eq!(scene.materials.len(), 1);
        assert!(!scene.materials[0].two_sided);

        let params = ImportParams {
            split_double_sided: false,
            ..Default::default()
        };
        let scene = load(TWO_SIDED.as_bytes(), &params, None).unwrap();
        assert_eq!(scene.meshes[0].faces.len(), 1);
        assert!(scene.materials[0].two_sided);
    }

    #[test]
    fn partitions_by_material() {
        let text = "AC3Db
MATERIAL \"a\" rgb 1 1 1  amb 0 0 0  emis 0 0 0  spec 0 0 0  shi 0  trans 0
MATERIAL \"b\" rgb 0 0 1  amb 0 0 0  emis 0 0 0  spec 0 0 0  shi 0  trans 0
OBJECT poly
texture \"wood.png\"
texrep 0 2
numvert 4
0 0 0
1 0 0
1 1 0
0 1 0
numsurf 3
SURF 0
mat 0
refs 3
0 0 0
1 1 0
2 1 1
SURF 0
mat 1
refs 3
0 0 0
2 1 1
3 0 1
SURF 2
mat 7
refs 3
0 0 0
1 0 0
2 0 0
kids 0
";
        let scene = load_str(text).unwrap();
        assert_eq!(scene.root.name, "ACPoly_0");
        assert_eq!(scene.meshes.len(), 2);
        assert_eq!(scene.root.meshes, vec![0, 1]);

        let first = &scene.meshes[0];
        assert_eq!(first.faces.len(), 3);
        assert_eq!(
            first.primitive_kinds().into_iter().collect::<Vec<_>>(),
            vec![PrimitiveKind::Line, PrimitiveKind::Triangle]
        );
        assert_eq!(first.attributes.tex_coords[0].len(), first.vertex_count());

        let second = &scene.materials[scene.meshes[1].material];
        assert_eq!(second.name.as_deref(), Some("b"));
        let texture = second.diffuse_texture().unwrap();
        assert_eq!(texture.path, "wood.png");
        assert!(texture.transform.is_none());
        assert_eq!(second.shading, ShadingModel::Gouraud);
    }

    #[test]
    fn quick3d_surfaces_without_surf_tokens() {
        let text = "AC3Db
OBJECT poly
numvert 4
0 0 0
1 0 0
1 1 0
0 1 0
numsurf 2
mat 0
refs 3
0 0 0
1 0 0
2 0 0
refs 3
0 0 0
2 0 0
3 0 0
kids 0
";
        let scene = load_str(text).unwrap();
        assert_eq!(scene.meshes.len(), 1);
        assert_eq!(scene.meshes[0].faces.len(), 2);
        assert_eq!(scene.materials[0].name.as_deref(), None);
    }

    #[test]
    fn lights_and_multiple_roots() {
        let text = "AC3Db
OBJECT light
loc 0 5 0
kids 0
OBJECT poly
numvert 2
0 0 0
1 1 1
kids 0
";
        let scene = load_str(text).unwrap();
        assert_eq!(scene.root.name, ROOT_NAME);
        assert_eq!(scene.root.children.len(), 2);
        assert_eq!(scene.lights.len(), 1);
        assert_eq!(scene.lights[0].name, "ACLight_0");

        let light = &scene.root.children[0];
        assert_eq!(light.name, "ACLight_0");
        assert_eq!(light.transform.w_axis, glam::Vec4::new(0.0, 5.0, 0.0, 1.0));

        let points = &scene.root.children[1];
        assert_eq!(points.name, "ACPoly_0");
        let mesh = &scene.meshes[points.meshes[0]];
        assert_eq!(mesh.faces.len(), 2);
        assert_eq!(mesh.primitive_kinds().into_iter().collect::<Vec<_>>(), vec![PrimitiveKind::Point]);
        assert_eq!(mesh.material, 0);
        scene.validate().unwrap();
    }

    #[test]
    fn fatal_errors() {
        assert!(matches!(load_str("OBJ\n"), Err(AcLoadError::BadMagic)));
        assert!(matches!(load_str("AC3Db\n"), Err(AcLoadError::NoObjects)));
        assert!(matches!(
            load_str("AC3Db\nOBJECT group\nkids 0\n"),
            Err(AcLoadError::NoMeshes)
        ));
        assert!(matches!(
            load_str("AC3Db\nOBJECT poly\nnumvert 100000\n0 0 0\n"),
            Err(AcLoadError::TooManyVertices { line: 3, .. })
        ));
        assert!(matches!(
            load_str("AC3Db\nOBJECT poly\nnumvert 1\n0 0 0\nnumsurf 1\nSURF 0\n"),
            Err(AcLoadError::SurfaceIncomplete { .. })
        ));
    }

    #[test]
    fn nesting_is_capped() {
        let params = ImportParams {
            max_depth: 2,
            ..Default::default()
        };
        let text = "AC3Db\nOBJECT group\nkids 1\nOBJECT group\nkids 1\nOBJECT group\nkids 1\nOBJECT poly\nkids 0\n";
        assert!(matches!(
            load(text.as_bytes(), &params, None),
            Err(AcLoadError::TooDeep(2))
        ));
    }
}
