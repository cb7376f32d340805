use std::{
    error::Error,
    fmt::{self, Display, Formatter},
};

use glam::Vec3;
use log::{debug, error, info, warn};

use crate::{
    animation::AnimationAsset,
    archive::{file_stem, join_path, parent_dir, Archive},
    assembler::{AssembleError, MaterialBinding, SceneAssembler},
    material::MaterialAsset,
    mesh::MeshAsset,
    records::{Object, ObjectKind, Surface, SurfaceRef},
    scene::SceneAsset,
    skeleton::{PoseKey, Skeleton, SkeletonError},
    skin::{BoneBinding, VertexInfluence},
    texture::{TextureKind, TextureSlot},
};

use super::{
    cursor::{CursorError, TextCursor},
    ImportError, ImportParams, Importer,
};

const ROOT_NAME: &str = "<SMD_root>";
const TICKS_PER_SECOND: f64 = 25.0;

#[derive(Debug)]
pub enum SmdLoadError {
    Cursor(CursorError),
    Empty,
    Skeleton(SkeletonError),
    Assemble(AssembleError),
}

impl Display for SmdLoadError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            SmdLoadError::Cursor(err) => Display::fmt(err, f),
            SmdLoadError::Empty => write!(
                f,
                "No triangles and no bones have been found in the file"
            ),
            SmdLoadError::Skeleton(err) => Display::fmt(err, f),
            SmdLoadError::Assemble(err) => Display::fmt(err, f),
        }
    }
}

impl Error for SmdLoadError {}

impl From<CursorError> for SmdLoadError {
    fn from(value: CursorError) -> Self {
        Self::Cursor(value)
    }
}

impl From<SkeletonError> for SmdLoadError {
    fn from(value: SkeletonError) -> Self {
        Self::Skeleton(value)
    }
}

impl From<AssembleError> for SmdLoadError {
    fn from(value: AssembleError) -> Self {
        Self::Assemble(value)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SmdVertex {
    pub parent: Option<u32>,
    pub position: Vec3,
    pub normal: Vec3,
    pub uv: [f32; 2],
    pub links: Vec<(u32, f32)>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SmdTriangle {
    pub texture: usize,
    pub vertices: [SmdVertex; 3],
}

/// Contents of one SMD or VTA file.
#[derive(Debug, Clone, PartialEq)]
pub struct SmdFile {
    pub skeleton: Skeleton,
    pub textures: Vec<String>,
    pub triangles: Vec<SmdTriangle>,
    pub has_uvs: bool,
}

impl Default for SmdFile {
    fn default() -> Self {
        Self {
            skeleton: Skeleton::default(),
            textures: Vec::new(),
            triangles: Vec::new(),
            has_uvs: true,
        }
    }
}

impl SmdFile {
    fn texture_index(&mut self, name: &str) -> usize {
        if let Some(index) = self
            .textures
            .iter()
            .position(|texture| texture.eq_ignore_ascii_case(name))
        {
            return index;
        }
        self.textures.push(name.to_string());
        self.textures.len() - 1
    }
}

struct SmdParser<'a> {
    cursor: TextCursor<'a>,
    data_len: usize,
    keyframe: u32,
    file: SmdFile,
}

impl<'a> SmdParser<'a> {
    fn parse(mut self) -> Result<SmdFile, SmdLoadError> {
        while self.cursor.skip_spaces_and_line_end() {
            if self.cursor.match_token("version") {
                if self.cursor.read_u32() != Some(1) {
                    warn!("SMD: version is not 1, this file format is not known, continuing");
                }
                self.cursor.skip_line();
            } else if self.cursor.match_token("nodes") {
                self.parse_nodes()?;
            } else if self.cursor.match_token("triangles") {
                self.parse_triangles();
            } else if self.cursor.match_token("vertexanimation") {
                self.file.has_uvs = false;
                self.parse_vertex_animation();
            } else if self.cursor.match_token("skeleton") {
                self.parse_skeleton();
            } else {
                self.cursor.skip_line();
            }
        }
        Ok(self.file)
    }

    fn line(&self) -> usize {
        self.cursor.line()
    }

    fn parse_nodes(&mut self) -> Result<(), SmdLoadError> {
        self.cursor.skip_line();
        loop {
            self.cursor.skip_spaces_and_line_end();
            if self.cursor.match_token_ignore_case("end") {
                self.cursor.skip_line();
                return Ok(());
            }

            let id = self.cursor.expect_u32("bone index")?;
            if id as usize > self.data_len {
                error!("SMD: line {}: bone index {} is out of range", self.line(), id);
                self.cursor.skip_line();
                continue;
            }
            if !self.cursor.clone().rest_of_line().starts_with('"') {
                warn!(
                    "SMD: line {}: bone name is expected to be enclosed in double quotation marks",
                    self.line()
                );
            }
            let Some(name) = self.cursor.read_quoted_or_bare() else {
                error!("SMD: line {}: unexpected end of line while parsing bone name", self.line());
                self.cursor.skip_line();
                continue;
            };
            let parent = match self.cursor.read_i32() {
                Some(parent) => u32::try_from(parent).ok(),
                None => {
                    error!(
                        "SMD: line {}: unexpected end of line while parsing bone parent index, assuming -1",
                        self.line()
                    );
                    None
                }
            };
            let bone = self.file.skeleton.bone_mut(id);
            bone.name = name;
            bone.parent = parent;
            self.cursor.skip_line();
        }
    }

    fn parse_skeleton(&mut self) {
        self.cursor.skip_line();
        let mut time = 0;
        while self.cursor.skip_spaces_and_line_end() {
            if self.cursor.match_token("end") {
                self.cursor.skip_line();
                return;
            }
            if self.cursor.match_token("time") {
                match self.cursor.read_i32() {
                    Some(value) => time = value,
                    None => return,
                }
                self.cursor.skip_line();
                continue;
            }

            let line = self.line();
            match self.cursor.read_u32() {
                None => error!("SMD: line {}: unexpected end of line while parsing bone index", line),
                Some(id) if id as usize >= self.file.skeleton.len() => {
                    error!("SMD: line {}: bone index in skeleton section is out of range", line)
                }
                Some(id) => match self.read_floats::<6>() {
                    Some([px, py, pz, rx, ry, rz]) => {
                        let key = PoseKey::new(
                            time as f64,
                            Vec3::new(px, py, pz),
                            Vec3::new(rx, ry, rz),
                        );
                        self.file.skeleton.bones[id as usize].keys.push(key);
                    }
                    None => error!("SMD: line {}: unexpected end of line while parsing bone pose", line),
                },
            }
            self.cursor.skip_line();
        }
    }

    fn read_floats<const N: usize>(&mut self) -> Option<[f32; N]> {
        let mut values = [0.0; N];
        for value in &mut values {
            *value = self.cursor.read_f32()?;
        }
        Some(values)
    }

    fn parse_triangles(&mut self) {
        self.cursor.skip_line();
        while self.cursor.skip_spaces_and_line_end() {
            if self.cursor.match_token("end") {
                self.cursor.skip_line();
                return;
            }
            let texture = self.cursor.read_token().unwrap_or_default();
            let texture = self.file.texture_index(texture);
            self.cursor.skip_line();

            let mut triangle = SmdTriangle {
                texture,
                ..Default::default()
            };
            for vertex in &mut triangle.vertices {
                *vertex = self.parse_vertex(false);
            }
            self.file.triangles.push(triangle);
        }
    }

    fn parse_vertex_animation(&mut self) {
        self.cursor.skip_line();
        let mut vertices = Vec::new();
        while self.cursor.skip_spaces_and_line_end() {
            if self.cursor.match_token("end") {
                self.cursor.skip_line();
                break;
            }
            if self.cursor.match_token("time") {
                if self.cursor.read_i32() != i32::try_from(self.keyframe).ok() {
                    break;
                }
                self.cursor.skip_line();
                continue;
            }
            vertices.push(self.parse_vertex(true));
        }

        if vertices.len() % 3 != 0 {
            warn!("SMD: vertex animation ends with an incomplete triangle, dropping it");
            vertices.truncate(vertices.len() - vertices.len() % 3);
        }
        let mut vertices = vertices.into_iter();
        while let (Some(first), Some(second), Some(third)) =
            (vertices.next(), vertices.next(), vertices.next())
        {
            self.file.triangles.push(SmdTriangle {
                texture: 0,
                vertices: [first, second, third],
            });
        }
    }

    fn parse_vertex(&mut self, animation: bool) -> SmdVertex {
        self.cursor.skip_spaces_and_line_end();
        let mut vertex = SmdVertex::default();
        if self.read_vertex(&mut vertex, animation).is_none() {
            error!("SMD: line {}: unexpected end of line while parsing a vertex", self.line());
        }
        self.cursor.skip_line();
        vertex
    }

    fn read_vertex(&mut self, vertex: &mut SmdVertex, animation: bool) -> Option<()> {
        let parent = self.cursor.read_i32()?;
        // Vertex animation lines start with a vertex index instead of a bone.
        if !animation {
            vertex.parent = u32::try_from(parent).ok();
        }
        let [px, py, pz, nx, ny, nz] = self.read_floats::<6>()?;
        vertex.position = Vec3::new(px, py, pz);
        vertex.normal = Vec3::new(nx, ny, nz);
        if animation {
            return Some(());
        }

        vertex.uv = self.read_floats::<2>()?;
        let Some(count) = self.cursor.read_u32() else {
            return Some(());
        };
        for _ in 0..count {
            let bone = self.cursor.read_u32()?;
            let weight = self.cursor.read_f32()?;
            vertex.links.push((bone, weight));
        }
        Some(())
    }
}

/// Parses an SMD or VTA file; `keyframe` selects the vertex animation frame.
pub fn parse(data: &[u8], keyframe: u32) -> Result<SmdFile, SmdLoadError> {
    SmdParser {
        cursor: TextCursor::new(data),
        data_len: data.len(),
        keyframe,
        file: SmdFile::default(),
    }
    .parse()
}

fn build_meshes(
    file: &SmdFile,
    bindings: &[BoneBinding],
    params: &ImportParams,
) -> Result<(Vec<MeshAsset>, Vec<MaterialAsset>), SmdLoadError> {
    let mut textures = file.textures.clone();
    if textures.is_empty() {
        textures.push(String::new());
    }

    let mut object = Object::new(ObjectKind::Poly);
    object.has_tex_coords = file.has_uvs;
    for triangle in &file.triangles {
        let first = object.vertices.len();
        let mut refs = Vec::with_capacity(3);
        for (corner, vertex) in triangle.vertices.iter().enumerate() {
            object.vertices.push(vertex.position);
            object.normals.push(vertex.normal);
            object.influences.push(VertexInfluence {
                parent: vertex.parent,
                links: vertex.links.clone(),
            });
            refs.push(SurfaceRef::new(first + corner, vertex.uv));
        }
        object.surfaces.push(Surface::polygon(triangle.texture, refs));
    }

    let mut assembler = SceneAssembler::new(
        params.assemble_options(),
        MaterialBinding::Shared {
            count: textures.len(),
        },
    )
    .with_bones(bindings);
    assembler.assemble_meshes(&mut object)?;
    let (meshes, _) = assembler.finish();

    let materials = textures
        .iter()
        .enumerate()
        .map(|(index, texture)| MaterialAsset {
            name: Some(format!("Texture_{}", index)),
            textures: (!texture.is_empty())
                .then(|| TextureSlot::new(TextureKind::Diffuse, texture.clone()))
                .into_iter()
                .collect(),
            ..Default::default()
        })
        .collect();
    Ok((meshes, materials))
}

/// Reads `<stem>_animation.txt` next to `path`.
///
/// Each line holds an animation file, optionally preceded by the animation
/// name; the file stem is used when no name is given.
fn animation_list<A: Archive>(
    importer: &mut Importer<'_, A>,
    path: &str,
) -> Result<Vec<(String, String)>, ImportError<A::Error>> {
    let base = parent_dir(path);
    let list_path = join_path(base, &format!("{}_animation.txt", file_stem(path)));
    let Some(data) = importer.read(&list_path)? else {
        return Ok(Vec::new());
    };
    debug!("SMD: reading animation list {}", list_path);

    let text = String::from_utf8_lossy(&data);
    let list = text
        .lines()
        .filter_map(|line| {
            let mut words = line.split_whitespace();
            let first = words.next()?;
            Some(match words.next() {
                Some(file) => (first.to_string(), join_path(base, file)),
                None => (file_stem(first).to_string(), join_path(base, first)),
            })
        })
        .collect();
    Ok(list)
}

fn load_listed_animation<A: Archive>(
    importer: &mut Importer<'_, A>,
    scene: &SceneAsset,
    name: String,
    path: &str,
) -> Result<Option<AnimationAsset>, ImportError<A::Error>> {
    let Some(data) = importer.read(path)? else {
        warn!("SMD: animation file {} not found", path);
        return Ok(None);
    };
    let mut file = parse(&data, importer.params().keyframe)?;
    if file.skeleton.is_empty() {
        return Ok(None);
    }
    file.skeleton.ensure_named();
    let duration = file.skeleton.normalize_times();
    let mut animation = file
        .skeleton
        .animation(Some(name), duration, TICKS_PER_SECOND);

    let nodes = scene.node_names();
    animation.channels.retain(|channel| {
        let known = nodes.contains(&channel.node_name);
        if !known {
            warn!(
                "SMD: animation {} animates unknown bone {}, dropping the channel",
                path, channel.node_name
            );
        }
        known
    });
    Ok(Some(animation))
}

pub(crate) fn load<A: Archive>(
    importer: &mut Importer<'_, A>,
    path: &str,
    data: &[u8],
) -> Result<SceneAsset, ImportError<A::Error>> {
    let params = importer.params().clone();
    let mut file = parse(data, params.keyframe)?;
    if file.triangles.is_empty() && file.skeleton.is_empty() {
        return Err(SmdLoadError::Empty.into());
    }
    let incomplete = file.triangles.is_empty();

    file.skeleton.ensure_named();
    let duration = file.skeleton.normalize_times();
    let resolved = file
        .skeleton
        .resolve(ROOT_NAME, params.max_depth)
        .map_err(SmdLoadError::from)?;

    let mut scene = SceneAsset {
        root: resolved.root,
        incomplete,
        ..Default::default()
    };
    if incomplete {
        info!("SMD: no triangles, {} only holds a skeleton", path);
        let _ = scene.elide_single_child_root();
    } else {
        let (meshes, materials) = build_meshes(&file, &resolved.bindings, &params)?;
        scene.root.meshes = (0..meshes.len()).collect();
        scene.meshes = meshes;
        scene.materials = materials;
    }

    if file.skeleton.has_keys() {
        scene
            .animations
            .push(file.skeleton.animation(None, duration, TICKS_PER_SECOND));
    }
    if params.load_animation_list {
        for (name, animation_path) in animation_list(importer, path)? {
            if let Some(animation) =
                load_listed_animation(importer, &scene, name, &animation_path)?
            {
                scene.animations.push(animation);
            }
        }
    }
    Ok(scene)
}

#[cfg(test)]
mod test {
    use glam::Mat4;

    use super::*;
    use crate::archive::memory::MemoryArchive;

    const MODEL: &str = r#"version 1
nodes
0 "pelvis" -1
1 "spine" 0
end
skeleton
time 2
0 0 0 0 0 0 0
1 0 1 0 0 0 0
time 4
1 0 2 0 0 0 0
end
triangles
skin.bmp
0 0 0 0 0 0 1 0 0 1 1 0.5
0 1 0 0 0 0 1 1 0
1 0 1 0 0 0 1 0 1
SKIN.BMP
0 0 0 1 0 0 1 0 0
0 1 0 1 0 0 1 1 0
0 0 1 1 0 0 1 0 1
eye.bmp
1 0 0 2 0 0 1 0 0 2 0 0.5 1 0.6
1 1 0 2 0 0 1 1 0
1 0 1 2 0 0 1 0 1
end
"#;

    fn import(archive: &mut MemoryArchive, path: &str) -> SceneAsset {
        Importer::new(archive, ImportParams::default())
            .import_file(path)
            .unwrap()
    }

    #[test]
    fn model_with_skeleton() {
        let mut archive = MemoryArchive::new().with_file("hero.smd", MODEL);
        let scene = import(&mut archive, "hero.smd");

        assert_eq!(scene.root.name, ROOT_NAME);
        assert_eq!(scene.root.meshes, vec![0, 1]);
        let pelvis = &scene.root.children[0];
        assert_eq!(pelvis.name, "pelvis");
        assert_eq!(pelvis.children[0].name, "spine");
        assert_eq!(
            pelvis.children[0].transform,
            Mat4::from_translation(Vec3::new(0.0, 1.0, 0.0))
        );

        assert_eq!(scene.materials.len(), 2);
        assert_eq!(scene.materials[0].name.as_deref(), Some("Texture_0"));
        assert_eq!(scene.materials[0].diffuse_texture().unwrap().path, "skin.bmp");

        let skin = &scene.meshes[0];
        assert_eq!(skin.faces.len(), 2);
        assert_eq!(skin.attributes.tex_coords[0].len(), 6);
        let total = |mesh: &MeshAsset, vertex: u32| -> f32 {
            mesh.bones
                .iter()
                .flat_map(|bone| bone.weights.iter())
                .filter(|weight| weight.vertex == vertex)
                .map(|weight| weight.weight)
                .sum()
        };
        assert!((total(skin, 0) - 1.0).abs() < 1e-6);
        let spine = skin.bones.iter().find(|bone| bone.name == "spine").unwrap();
        assert!(spine
            .offset
            .abs_diff_eq(Mat4::from_translation(Vec3::new(0.0, -1.0, 0.0)), 1e-6));

        // A link repeating the parent bone is dropped; the parent takes the rest.
        let eye = &scene.meshes[1];
        assert_eq!(eye.material, 1);
        assert!((total(eye, 0) - 1.0).abs() < 1e-6);

        let animation = &scene.animations[0];
        assert_eq!(animation.duration, 2.0);
        assert_eq!(animation.ticks_per_second, TICKS_PER_SECOND);
        assert_eq!(animation.channels.len(), 2);
        let spine_channel = &animation.channels[1];
        assert_eq!(spine_channel.position_keys[0].time, 0.0);
        assert_eq!(spine_channel.position_keys[1].time, 2.0);
    }

    #[test]
    fn skeleton_only_elides_root() {
        let text = "version 1\nnodes\n0 \"root\" -1\n1 \"tip\" 0\nend\nskeleton\ntime -5\n0 0 0 0 0 0 0\ntime 10\n1 1 0 0 0 0 0\ntime 3\n0 0 0 0 0 0 0\nend\n";
        let mut archive = MemoryArchive::new().with_file("idle.smd", text);
        let params = ImportParams {
            no_skeleton_mesh: true,
            ..Default::default()
        };
        let scene = Importer::new(&mut archive, params).import_file("idle.smd").unwrap();
        assert!(scene.incomplete);
        assert_eq!(scene.root.name, "root");
        assert_eq!(scene.root.children[0].name, "tip");
        assert!(scene.meshes.is_empty());

        let animation = &scene.animations[0];
        assert_eq!(animation.duration, 15.0);
        let times: Vec<f64> = animation.channels[0]
            .position_keys
            .iter()
            .map(|key| key.time)
            .collect();
        assert_eq!(times, vec![0.0, 8.0]);
    }

    #[test]
    fn placeholder_bones_are_named() {
        let text = "nodes\n2 \"late\" -1\nend\ntriangles\ntex.bmp\n2 0 0 0 0 0 1 0 0\n2 1 0 0 0 0 1 0 0\n2 0 1 0 0 0 1 0 0\nend\n";
        let file = parse(text.as_bytes(), 0).unwrap();
        assert_eq!(file.skeleton.len(), 3);
        assert!(file.skeleton.bones[0].name.is_empty());

        let mut archive = MemoryArchive::new().with_file("late.smd", text);
        let scene = import(&mut archive, "late.smd");
        assert!(scene.root.find("<bone_0>").is_some());
        assert_eq!(scene.meshes[0].bones.len(), 1);
        assert_eq!(scene.meshes[0].bones[0].name, "late");
    }

    #[test]
    fn vertex_animation_frame() {
        let text = "version 1
nodes
0 \"root\" -1
end
skeleton
time 0
0 0 0 0 0 0 0
end
vertexanimation
time 0
0 0 0 0 0 0 1
1 1 0 0 0 0 1
2 0 1 0 0 0 1
3 1 1 0 0 0 1
time 1
0 5 5 5 0 0 1
end
";
        let file = parse(text.as_bytes(), 0).unwrap();
        assert!(!file.has_uvs);
        assert_eq!(file.triangles.len(), 1);
        assert_eq!(file.triangles[0].vertices[1].position, Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(file.triangles[0].vertices[0].parent, None);

        let mut archive = MemoryArchive::new().with_file("face.vta", text);
        let scene = import(&mut archive, "face.vta");
        assert!(scene.meshes[0].attributes.tex_coords.is_empty());
        assert_eq!(scene.materials[0].name.as_deref(), Some("Texture_0"));
        assert!(scene.materials[0].textures.is_empty());
    }

    #[test]
    fn animation_list_is_loaded() {
        let run = "version 1\nnodes\n0 \"pelvis\" -1\n5 \"ghost\" -1\nend\nskeleton\ntime 0\n0 0 0 0 0 0 0\n5 0 0 0 0 0 0\ntime 10\n0 0 1 0 0 0 0\nend\n";
        let mut archive = MemoryArchive::new()
            .with_file("models/hero.smd", MODEL)
            .with_file("models/hero_animation.txt", "run anim/run.smd\r\nwalk.smd\n")
            .with_file("models/anim/run.smd", run);
        let scene = import(&mut archive, "models/hero.smd");

        assert_eq!(scene.animations.len(), 2);
        let listed = &scene.animations[1];
        assert_eq!(listed.name.as_deref(), Some("run"));
        assert_eq!(listed.duration, 10.0);
        assert_eq!(listed.channels.len(), 1);
        assert_eq!(listed.channels[0].node_name, "pelvis");

        let params = ImportParams {
            load_animation_list: false,
            ..Default::default()
        };
        let scene = Importer::new(&mut archive, params)
            .import_file("models/hero.smd")
            .unwrap();
        assert_eq!(scene.animations.len(), 1);
    }

    #[test]
    fn empty_file_is_fatal() {
        assert!(matches!(
            Importer::new(
                &mut MemoryArchive::new().with_file("empty.smd", "version 1\n"),
                ImportParams::default()
            )
            .import_file("empty.smd"),
            Err(ImportError::Smd(SmdLoadError::Empty))
        ));
    }
}
