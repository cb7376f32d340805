//! LightWave scenes.
//!
//! A scene file is a flat list of items (objects, lights and cameras), each
//! followed by the keywords that configure it. Objects usually reference a
//! model file; those files are imported through a [`BatchLoader`] once the
//! whole document has been read, and grafted below their item's node.

use std::{
    error::Error,
    fmt::{self, Display, Formatter},
    slice,
};

use glam::{Mat4, Vec3, Vec4};
use log::{debug, error, info, warn};

use crate::{
    animation::{AnimationAsset, NodeAnimation},
    archive::{file_stem, join_path, parent_dir, Archive},
    batch::{BatchError, BatchLoader, ParamOverrides},
    camera::CameraAsset,
    envelope::{
        Envelope, EnvelopeChannel, EnvelopeKey, EnvelopeResolver, KeyInterpolation,
        PrePostBehaviour,
    },
    hierarchy::{resolve_parents, Hierarchy, HierarchyError, ParentLink},
    index::{NodePath, RequestId},
    light::{LightAsset, LightKind},
    merge::{merge_scenes, Attachment, MergeError},
    node::NodeAsset,
    scene::SceneAsset,
};

use super::{cursor::TextCursor, ImportError, ImportParams, Importer};

pub mod element;

use element::Element;

/// Bits of an item id holding the item number; the top bits hold the kind.
const ID_MASK: u32 = 0x0fff_ffff;
const DEFAULT_FPS: f64 = 25.0;
const DEFAULT_LAST_FRAME: i32 = 60;
const ROOT_NAME: &str = "<LWSRoot>";
/// Upper bound on frames sampled over all animated items of one scene.
const MAX_SAMPLED_FRAMES: i64 = 1 << 21;
pub const MASTER_ANIMATION_NAME: &str = "LWSMasterAnim";

#[derive(Debug)]
pub enum LwsLoadError {
    NotAScene,
    MissingVersion,
    TooDeep(usize),
    FrameNumber(i32),
    FrameRange { first: i32, last: i32 },
    Batch(BatchError),
    Hierarchy(HierarchyError),
    Merge(MergeError),
}

impl Display for LwsLoadError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            LwsLoadError::NotAScene => {
                write!(f, "Not a LightWave scene, magic tag LWSC not found")
            }
            LwsLoadError::MissingVersion => write!(f, "Scene file has no format version"),
            LwsLoadError::TooDeep(limit) => {
                write!(f, "Blocks are nested deeper than {} levels", limit)
            }
            LwsLoadError::FrameNumber(frame) => write!(f, "Frame number {} is out of range", frame),
            LwsLoadError::FrameRange { first, last } => write!(
                f,
                "Animation range {}..={} needs more than {} sampled frames",
                first, last, MAX_SAMPLED_FRAMES
            ),
            LwsLoadError::Batch(err) => write!(f, "Invalid object reference: {}", err),
            LwsLoadError::Hierarchy(err) => Display::fmt(err, f),
            LwsLoadError::Merge(err) => Display::fmt(err, f),
        }
    }
}

impl Error for LwsLoadError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            LwsLoadError::Batch(err) => Some(err),
            LwsLoadError::Hierarchy(err) => Some(err),
            LwsLoadError::Merge(err) => Some(err),
            _ => None,
        }
    }
}

impl From<BatchError> for LwsLoadError {
    fn from(value: BatchError) -> Self {
        Self::Batch(value)
    }
}

impl From<HierarchyError> for LwsLoadError {
    fn from(value: HierarchyError) -> Self {
        Self::Hierarchy(value)
    }
}

impl From<MergeError> for LwsLoadError {
    fn from(value: MergeError) -> Self {
        Self::Merge(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Object = 1,
    Light = 2,
    Camera = 3,
}

impl ItemKind {
    fn counter(self) -> usize {
        self as usize - 1
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectReference {
    pub path: String,
    /// Layer of the model file, for `LoadObjectLayer`.
    pub layer: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LightSettings {
    pub color: Vec3,
    pub intensity: f32,
    pub kind: u32,
    pub falloff: u32,
    /// Degrees.
    pub cone_angle: f32,
    pub edge_angle: f32,
}

impl Default for LightSettings {
    fn default() -> Self {
        Self {
            color: Vec3::ONE,
            intensity: 1.0,
            kind: 0,
            falloff: 0,
            cone_angle: 45.0,
            edge_angle: 0.0,
        }
    }
}

impl LightSettings {
    fn to_asset(&self, name: &str) -> LightAsset {
        let kind = match self.kind {
            1 => LightKind::Directional,
            2 => LightKind::Spot,
            _ => LightKind::Point,
        };
        let mut light = LightAsset::new(name, kind);
        let color = (self.color * self.intensity).to_array();
        light.diffuse_color = color;
        light.specular_color = color;
        if kind == LightKind::Spot {
            light.inner_cone = self.cone_angle.to_radians();
            light.outer_cone = light.inner_cone + self.edge_angle.to_radians();
        }
        (
            light.attenuation_constant,
            light.attenuation_linear,
            light.attenuation_quadratic,
        ) = match self.falloff {
            1 => (1.0, 0.0, 0.0),
            2 => (0.0, 1.0, 0.0),
            _ => (0.0, 0.0, 1.0),
        };
        light
    }
}

/// An object, light or camera declared by the scene file.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneItem {
    pub kind: ItemKind,
    pub number: u32,
    pub name: String,
    pub object: Option<ObjectReference>,
    /// Full id of the parent item, kind bits included.
    pub parent: Option<u32>,
    pub channels: Vec<Envelope>,
    pub pivot: Option<Vec3>,
    pub light: LightSettings,
}

impl SceneItem {
    pub fn new(kind: ItemKind, number: u32) -> Self {
        Self {
            kind,
            number,
            name: String::new(),
            object: None,
            parent: None,
            channels: Vec::new(),
            pivot: None,
            light: LightSettings::default(),
        }
    }

    pub fn full_id(&self) -> u32 {
        (self.number & ID_MASK) | ((self.kind as u32) << 28)
    }

    /// Unique node name: the model file stem for objects loaded from a file,
    /// the item name otherwise, followed by the full id.
    pub fn node_name(&self) -> String {
        let base = match &self.object {
            Some(object) if !object.path.is_empty() => file_stem(&object.path),
            _ => self.name.as_str(),
        };
        format!("{}_({:08X})", base, self.full_id())
    }
}

impl ParentLink for SceneItem {
    fn id(&self) -> u32 {
        self.full_id()
    }

    fn parent_id(&self) -> Option<u32> {
        self.parent
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SceneDocument {
    pub version: u32,
    /// Zero based.
    pub first_frame: Option<i32>,
    pub last_frame: Option<i32>,
    pub fps: Option<f64>,
    pub items: Vec<SceneItem>,
}

impl SceneDocument {
    /// Frame range to sample, explicit import parameters taking precedence.
    fn frame_range(&self, params: &ImportParams) -> (i32, i32) {
        let (start, end) = params.animation_range();
        let first = start.or(self.first_frame).unwrap_or(0);
        let last = end.or(self.last_frame).unwrap_or(DEFAULT_LAST_FRAME);
        if last < first {
            (last, first)
        } else {
            (first, last)
        }
    }
}

/// Number of frames in the inclusive range, which may exceed `i32`.
fn frame_span(first: i32, last: i32) -> i64 {
    i64::from(last) - i64::from(first) + 1
}

fn leading_u32(text: &str) -> u32 {
    TextCursor::new(text.as_bytes()).read_u32().unwrap_or(0)
}

struct DocumentReader {
    document: SceneDocument,
    motion_file: bool,
    counters: [u32; 3],
    bad_frame: Option<i32>,
}

impl DocumentReader {
    /// Reads a one based frame number as zero based.
    fn frame_number(&mut self, cursor: &mut TextCursor<'_>) -> Option<i32> {
        let frame = cursor.read_i32()?;
        let zero_based = frame.checked_sub(1);
        if zero_based.is_none() {
            self.bad_frame = Some(frame);
        }
        zero_based
    }

    fn item_number(&mut self, kind: ItemKind, cursor: &mut TextCursor<'_>) -> u32 {
        if self.document.version >= 4 {
            return cursor.read_hex_u32().unwrap_or(0) & ID_MASK;
        }
        let counter = &mut self.counters[kind.counter()];
        *counter += 1;
        *counter - 1
    }

    fn last_item(&mut self, keyword: &str) -> Option<&mut SceneItem> {
        let item = self.document.items.last_mut();
        if item.is_none() {
            error!("LWS: unexpected keyword '{}' before the first item", keyword);
        }
        item
    }

    fn last_of_kind(&mut self, kind: ItemKind, keyword: &str) -> Option<&mut SceneItem> {
        match self.document.items.last_mut() {
            Some(item) if item.kind == kind => Some(item),
            _ => {
                error!("LWS: unexpected keyword '{}'", keyword);
                None
            }
        }
    }

    fn read_element(&mut self, element: &Element, rest: &mut slice::Iter<'_, Element>) {
        let mut cursor = TextCursor::new(element.value.as_bytes());
        let version = self.document.version;
        match element.key.as_str() {
            "FirstFrame" => self.document.first_frame = self.frame_number(&mut cursor),
            "LastFrame" => self.document.last_frame = self.frame_number(&mut cursor),
            "FramesPerSecond" => self.document.fps = cursor.read_f32().map(f64::from),
            "LoadObjectLayer" => {
                let layer = cursor.read_u32().unwrap_or(0);
                let number = self.item_number(ItemKind::Object, &mut cursor);
                let mut item = SceneItem::new(ItemKind::Object, number);
                item.object = Some(ObjectReference {
                    path: cursor.rest_of_line(),
                    layer: Some(layer),
                });
                self.document.items.push(item);
            }
            "LoadObject" => {
                let number = self.item_number(ItemKind::Object, &mut cursor);
                let mut item = SceneItem::new(ItemKind::Object, number);
                item.object = Some(ObjectReference {
                    path: cursor.rest_of_line(),
                    layer: None,
                });
                self.document.items.push(item);
            }
            "AddNullObject" => {
                let number = self.item_number(ItemKind::Object, &mut cursor);
                let mut item = SceneItem::new(ItemKind::Object, number);
                item.name = cursor.rest_of_line();
                self.document.items.push(item);
            }
            "Channel" => {
                if self.document.items.is_empty() && self.motion_file {
                    // Motion files hold the channels of a single implicit item.
                    let number = self.item_number(ItemKind::Object, &mut TextCursor::new(b""));
                    let mut item = SceneItem::new(ItemKind::Object, number);
                    item.name = element.value.clone();
                    self.document.items.push(item);
                }
                let index = cursor.read_u32().unwrap_or(0);
                if let Some(item) = self.last_item("Channel") {
                    item.channels
                        .push(Envelope::new(EnvelopeChannel::from_index(index)));
                }
            }
            "Envelope" => {
                match self
                    .document
                    .items
                    .last_mut()
                    .and_then(|item| item.channels.last_mut())
                {
                    Some(envelope) => read_envelope(element, envelope),
                    None => error!("LWS: unexpected keyword 'Envelope'"),
                }
            }
            "ObjectMotion" | "CameraMotion" | "LightMotion" if version < 3 => {
                if let Some(item) = self.last_item(&element.key) {
                    read_motion(rest, &mut item.channels);
                }
            }
            "Pre/PostBehavior" if version == 2 => {
                if let Some(item) = self.last_item("Pre/PostBehavior") {
                    for envelope in &mut item.channels {
                        let (Some(pre), Some(post)) = (cursor.read_u32(), cursor.read_u32()) else {
                            break;
                        };
                        envelope.pre = PrePostBehaviour::from_index(pre);
                        envelope.post = PrePostBehaviour::from_index(post);
                    }
                }
            }
            "ParentItem" => {
                let parent = cursor.read_hex_u32();
                if let Some(item) = self.last_item("ParentItem") {
                    item.parent = parent;
                }
            }
            "ParentObject" if version < 3 => {
                let parent = cursor.read_u32().map(|number| number | (1 << 28));
                if let Some(item) = self.last_item("ParentObject") {
                    item.parent = parent;
                }
            }
            "AddCamera" => {
                let number = self.item_number(ItemKind::Camera, &mut cursor);
                self.document
                    .items
                    .push(SceneItem::new(ItemKind::Camera, number));
            }
            "CameraName" => {
                if let Some(item) = self.last_of_kind(ItemKind::Camera, "CameraName") {
                    item.name = element.value.clone();
                }
            }
            "AddLight" => {
                let number = self.item_number(ItemKind::Light, &mut cursor);
                self.document
                    .items
                    .push(SceneItem::new(ItemKind::Light, number));
            }
            "LightName" => {
                if let Some(item) = self.last_of_kind(ItemKind::Light, "LightName") {
                    item.name = element.value.clone();
                }
            }
            "LightIntensity" | "LgtIntensity" => {
                let intensity = if element.value.starts_with("(envelope)") {
                    error!("LWS: envelopes for LightIntensity are not supported, using 1.0");
                    1.0
                } else {
                    cursor.read_f32().unwrap_or(1.0)
                };
                if let Some(item) = self.last_of_kind(ItemKind::Light, "LightIntensity") {
                    item.light.intensity = intensity;
                }
            }
            "LightType" => {
                if let Some(item) = self.last_of_kind(ItemKind::Light, "LightType") {
                    item.light.kind = cursor.read_u32().unwrap_or(0);
                }
            }
            "LightFalloffType" => {
                if let Some(item) = self.last_of_kind(ItemKind::Light, "LightFalloffType") {
                    item.light.falloff = cursor.read_u32().unwrap_or(0);
                }
            }
            "LightConeAngle" => {
                if let Some(item) = self.last_of_kind(ItemKind::Light, "LightConeAngle") {
                    item.light.cone_angle = cursor.read_f32().unwrap_or(0.0);
                }
            }
            "LightEdgeAngle" => {
                if let Some(item) = self.last_of_kind(ItemKind::Light, "LightEdgeAngle") {
                    item.light.edge_angle = cursor.read_f32().unwrap_or(0.0);
                }
            }
            "LightColor" => {
                if let Some(item) = self.last_of_kind(ItemKind::Light, "LightColor") {
                    item.light.color = read_vec3(&mut cursor);
                }
            }
            "PivotPosition" | "PivotPoint" => {
                if let Some(item) = self.last_item("PivotPosition") {
                    item.pivot = Some(read_vec3(&mut cursor));
                }
            }
            _ => {}
        }
    }
}

fn read_vec3(cursor: &mut TextCursor<'_>) -> Vec3 {
    let mut values = [0.0; 3];
    for value in &mut values {
        *value = cursor.read_f32().unwrap_or(0.0);
    }
    Vec3::from_array(values)
}

fn read_envelope(element: &Element, envelope: &mut Envelope) {
    // The first line holds the key count.
    let Some((_, lines)) = element.children.split_first() else {
        error!("LWS: envelope descriptions must not be empty");
        return;
    };
    for line in lines {
        let mut cursor = TextCursor::new(line.value.as_bytes());
        match line.key.as_str() {
            "Key" => {
                let value = cursor.read_f32().unwrap_or(0.0);
                let time = cursor.read_f32().unwrap_or(0.0);
                let span = cursor.read_u32().unwrap_or(0);
                let (interpolation, count) = KeyInterpolation::from_span(span).unwrap_or_else(|| {
                    error!("LWS: unknown span type {}", span);
                    (KeyInterpolation::Linear, 0)
                });
                let mut key = EnvelopeKey::new(f64::from(time), value, interpolation);
                for param in key.params.iter_mut().take(count) {
                    *param = cursor.read_f32().unwrap_or(0.0);
                }
                envelope.keys.push(key);
            }
            "Behaviors" => {
                envelope.pre = PrePostBehaviour::from_index(cursor.read_u32().unwrap_or(1));
                envelope.post = PrePostBehaviour::from_index(cursor.read_u32().unwrap_or(1));
            }
            _ => {}
        }
    }
    envelope.sort_keys();
}

/// Reads the motion block of old scene files: a channel count, then per
/// channel a key count followed by one `value time ...` line per key.
fn read_motion(rest: &mut slice::Iter<'_, Element>, channels: &mut Vec<Envelope>) {
    let Some(count) = rest.next() else {
        error!("LWS: unexpected end of file while parsing object motion");
        return;
    };
    for channel in 0..leading_u32(&count.key) {
        let Some(key_count) = rest.next() else {
            error!("LWS: unexpected end of file while parsing object motion");
            return;
        };
        let mut envelope = Envelope::new(EnvelopeChannel::from_index(channel));
        for _ in 0..leading_u32(&key_count.key) {
            let Some(line) = rest.next() else {
                error!("LWS: unexpected end of file while parsing object motion");
                break;
            };
            let value = line.key.parse().unwrap_or(0.0);
            let time = TextCursor::new(line.value.as_bytes())
                .read_f32()
                .unwrap_or(0.0);
            envelope
                .keys
                .push(EnvelopeKey::new(f64::from(time), value, KeyInterpolation::Linear));
        }
        envelope.sort_keys();
        channels.push(envelope);
    }
}

/// Reads the items of a parsed scene file.
pub fn read_document(root: &Element) -> Result<SceneDocument, LwsLoadError> {
    let mut elements = root.children.iter();
    let motion_file = match elements.next().map(|element| element.key.as_str()) {
        Some("LWSC") => false,
        Some("LWMO") => true,
        _ => return Err(LwsLoadError::NotAScene),
    };
    let version = elements.next().ok_or(LwsLoadError::MissingVersion)?;
    info!("LWS: file format version is {}", version.key);

    let mut reader = DocumentReader {
        document: SceneDocument {
            version: leading_u32(&version.key),
            ..Default::default()
        },
        motion_file,
        counters: [0; 3],
        bad_frame: None,
    };
    while let Some(element) = elements.next() {
        reader.read_element(element, &mut elements);
    }
    if let Some(frame) = reader.bad_frame {
        return Err(LwsLoadError::FrameNumber(frame));
    }
    Ok(reader.document)
}

/// Locates a referenced model file relative to the scene directory. Packaged
/// scenes keep their models one or two directories further up.
fn find_object_file<A: Archive>(
    importer: &mut Importer<'_, A>,
    base: &str,
    path: &str,
) -> Result<String, ImportError<A::Error>> {
    let mut path = path.to_string();
    // `C:dir` lacks the separator after the drive letter.
    let bytes = path.as_bytes();
    if bytes.len() > 3 && bytes[1] == b':' && bytes[2] != b'\\' && bytes[2] != b'/' {
        path.insert(2, '/');
    }

    let direct = join_path(base, &path);
    for candidate in [
        direct.clone(),
        join_path(base, &format!("../{}", path)),
        join_path(base, &format!("../../{}", path)),
    ] {
        if importer.exists(&candidate)? {
            return Ok(candidate);
        }
    }
    Ok(direct)
}

struct GraphBuilder<'d> {
    items: &'d [SceneItem],
    hierarchy: &'d Hierarchy,
    requests: &'d [Option<RequestId>],
    batch: &'d mut BatchLoader,
    first: i32,
    last: i32,
    fps: f64,
    max_depth: usize,
    attachments: Vec<Attachment>,
    channels: Vec<NodeAnimation>,
    lights: Vec<LightAsset>,
    cameras: Vec<CameraAsset>,
}

impl GraphBuilder<'_> {
    fn build(&mut self, index: usize, path: NodePath, depth: usize) -> Result<NodeAsset, LwsLoadError> {
        if depth > self.max_depth {
            return Err(LwsLoadError::TooDeep(self.max_depth));
        }
        let items = self.items;
        let item = &items[index];
        let name = item.node_name();
        let resolver = EnvelopeResolver::new(&item.channels);
        let mut node = NodeAsset::new(name.clone()).with_transform(resolver.bind_pose());

        // Objects get a pivot node carrying the animation and an attachment
        // child offset by the pivot, which receives the model and the children.
        let mut parent_path = path.clone();
        match item.kind {
            ItemKind::Object => {
                let mut pivot = item.pivot;
                let mut model = None;
                if let Some(request) = self.requests[index] {
                    match self.batch.take(request) {
                        Some(mut scene) => {
                            if let Some(wrapper) = scene.elide_single_child_root() {
                                pivot = pivot.or(Some(wrapper.w_axis.truncate()));
                                scene.root.transform.w_axis = Vec4::W;
                            }
                            model = Some(scene);
                        }
                        None => error!(
                            "LWS: failed to read external file {}",
                            self.batch.path(request).unwrap_or_default()
                        ),
                    }
                }

                node.name = format!("Pivot:{}", name);
                let offset = -pivot.unwrap_or(Vec3::ZERO);
                node.children
                    .push(NodeAsset::new(name).with_transform(Mat4::from_translation(offset)));
                parent_path = path.child(0);
                if let Some(scene) = model {
                    self.attachments.push(Attachment {
                        scene,
                        target: parent_path.clone(),
                        elide_wrapper: false,
                    });
                }
            }
            ItemKind::Light => self.lights.push(item.light.to_asset(&name)),
            ItemKind::Camera => self.cameras.push(CameraAsset::new(name)),
        }

        if self.first != self.last {
            if let Some(channel) = resolver.sample(&node.name, self.first, self.last, self.fps) {
                self.channels.push(channel);
            }
        }

        let hierarchy = self.hierarchy;
        let mut children = Vec::with_capacity(hierarchy.children[index].len());
        for &child in &hierarchy.children[index] {
            let child_path = parent_path.child(children.len());
            children.push(self.build(child, child_path, depth + 1)?);
        }
        match item.kind {
            ItemKind::Object => node.children[0].children.extend(children),
            _ => node.children.extend(children),
        }
        Ok(node)
    }
}

pub(crate) fn load<A: Archive>(
    importer: &mut Importer<'_, A>,
    path: &str,
    data: &[u8],
) -> Result<SceneAsset, ImportError<A::Error>> {
    let params = importer.params().clone();
    let root = element::parse(&String::from_utf8_lossy(data), params.max_depth)?;
    let document = read_document(&root)?;
    let (first, last) = document.frame_range(&params);
    let span = frame_span(first, last);
    let animated = document
        .items
        .iter()
        .filter(|item| EnvelopeResolver::new(&item.channels).has_keys())
        .count();
    if first != last && span.saturating_mul(animated as i64) > MAX_SAMPLED_FRAMES {
        return Err(LwsLoadError::FrameRange { first, last }.into());
    }

    let base = parent_dir(path);
    let mut batch = BatchLoader::new(path);
    let mut requests = Vec::with_capacity(document.items.len());
    for item in &document.items {
        let Some(object) = &item.object else {
            requests.push(None);
            continue;
        };
        let resolved = if object.path.trim().is_empty() {
            String::new()
        } else {
            find_object_file(importer, base, &object.path)?
        };
        let overrides: ParamOverrides = object
            .layer
            .map(|layer| ("layer".to_string(), i64::from(layer)))
            .into_iter()
            .collect();
        let request = batch
            .add_load_request(&resolved, overrides)
            .map_err(LwsLoadError::from)?;
        requests.push(Some(request));
    }

    let hierarchy = resolve_parents(&document.items).map_err(LwsLoadError::from)?;
    let reachable = hierarchy
        .depth_first(params.max_depth)
        .map_err(LwsLoadError::from)?
        .len();
    if reachable < document.items.len() {
        warn!(
            "LWS: {} items are part of a parent cycle and are dropped",
            document.items.len() - reachable
        );
    }

    debug!("LWS: loading {} referenced files", batch.len());
    batch.load_all(importer);

    let fps = document.fps.unwrap_or(DEFAULT_FPS);
    let mut builder = GraphBuilder {
        items: &document.items,
        hierarchy: &hierarchy,
        requests: &requests,
        batch: &mut batch,
        first,
        last,
        fps,
        max_depth: params.max_depth,
        attachments: Vec::new(),
        channels: Vec::new(),
        lights: Vec::new(),
        cameras: Vec::new(),
    };
    let mut root = NodeAsset::new(ROOT_NAME);
    for (position, &item) in hierarchy.roots.iter().enumerate() {
        root.children
            .push(builder.build(item, NodePath::root().child(position), 0)?);
    }

    let GraphBuilder {
        attachments,
        channels,
        lights,
        cameras,
        ..
    } = builder;
    let mut master = SceneAsset {
        root,
        lights,
        cameras,
        ..Default::default()
    };
    if !channels.is_empty() {
        master.animations.push(AnimationAsset {
            name: Some(MASTER_ANIMATION_NAME.to_string()),
            duration: span as f64,
            ticks_per_second: fps,
            channels,
        });
    }

    let mut scene =
        merge_scenes(master, attachments, params.merge_options()).map_err(LwsLoadError::from)?;
    scene.incomplete = scene.meshes.is_empty() || scene.materials.is_empty();
    Ok(scene)
}

#[cfg(test)]
mod test {
    use std::convert::Infallible;

    use super::*;
    use crate::archive::memory::MemoryArchive;

    const BOX: &str = r#"AC3Db
MATERIAL "red" rgb 1 0 0  amb 0.2 0.2 0.2  emis 0 0 0  spec 0.5 0.5 0.5  shi 10  trans 0
OBJECT world
kids 1
OBJECT poly
name "box"
numvert 3
0 0 0
1 0 0
0 1 0
numsurf 1
SURF 0x10
mat 0
refs 3
0 0 0
1 0 0
2 0 0
kids 0
"#;

    const SCENE: &str = "LWSC
4

FirstFrame 1
LastFrame 3
FramesPerSecond 30

LoadObjectLayer 1 10000000 objects/box.ac
PivotPosition 1 0 0
NumChannels 1
Channel 0
{ Envelope
  2
  Key 6 0.1 3
  Key 0 0 3
  Behaviors 1 1
}
Plugin ItemMotionHandler 1 Noise
{ garbage
EndPlugin

AddLight 20000000
LightName Spot
ParentItem 10000000
LightColor 1 0.5 0
LightIntensity 0.5
LightType 2
LightConeAngle 30
LightEdgeAngle 5
LightFalloffType 2

AddCamera 30000000
CameraName Cam
";

    fn archive() -> MemoryArchive {
        MemoryArchive::new()
            .with_file("scenes/demo.lws", SCENE)
            .with_file("objects/box.ac", BOX)
    }

    fn import(archive: &mut MemoryArchive, path: &str) -> Result<SceneAsset, ImportError<Infallible>> {
        Importer::new(archive, ImportParams::default()).import_file(path)
    }

    #[test]
    fn reads_items() {
        let root = element::parse(SCENE, 1000).unwrap();
        let document = read_document(&root).unwrap();
        assert_eq!(document.version, 4);
        assert_eq!(document.first_frame, Some(0));
        assert_eq!(document.last_frame, Some(2));
        assert_eq!(document.fps, Some(30.0));
        assert_eq!(document.items.len(), 3);

        let object = &document.items[0];
        assert_eq!(object.full_id(), 0x1000_0000);
        assert_eq!(object.node_name(), "box_(10000000)");
        assert_eq!(
            object.object,
            Some(ObjectReference {
                path: "objects/box.ac".to_string(),
                layer: Some(1),
            })
        );
        assert_eq!(object.pivot, Some(Vec3::X));
        let envelope = &object.channels[0];
        assert_eq!(envelope.channel, EnvelopeChannel::PositionX);
        assert_eq!(envelope.keys[0].time, 0.0);
        assert_eq!(envelope.keys[1].value, 6.0);
        assert_eq!(envelope.post, PrePostBehaviour::Constant);

        let light = &document.items[1];
        assert_eq!(light.parent, Some(0x1000_0000));
        assert_eq!(light.node_name(), "Spot_(20000000)");
        assert_eq!(light.light.color, Vec3::new(1.0, 0.5, 0.0));
        assert_eq!(document.items[2].node_name(), "Cam_(30000000)");
    }

    #[test]
    fn builds_scene_with_external_objects() {
        let mut archive = archive();
        let scene = import(&mut archive, "scenes/demo.lws").unwrap();
        assert!(!scene.incomplete);
        assert_eq!(scene.root.name, ROOT_NAME);
        assert_eq!(scene.root.children.len(), 2);

        let pivot = &scene.root.children[0];
        assert_eq!(pivot.name, "Pivot:box_(10000000)");
        let attachment = &pivot.children[0];
        assert_eq!(attachment.name, "box_(10000000)");
        assert_eq!(attachment.transform, Mat4::from_translation(-Vec3::X));
        assert_eq!(attachment.children[0].name, "Spot_(20000000)");
        let model = &attachment.children[1];
        assert_eq!(model.name, "box");
        assert_eq!(model.meshes, vec![0]);

        assert_eq!(scene.meshes.len(), 1);
        assert!(scene.materials[0].name.as_deref().unwrap().starts_with("sub0_"));

        let light = &scene.lights[0];
        assert_eq!(light.kind, LightKind::Spot);
        assert_eq!(light.diffuse_color, [0.5, 0.25, 0.0]);
        assert!((light.inner_cone - 30f32.to_radians()).abs() < 1e-6);
        assert!((light.outer_cone - 35f32.to_radians()).abs() < 1e-6);
        assert_eq!(light.attenuation_linear, 1.0);
        assert_eq!(scene.cameras[0].name, "Cam_(30000000)");

        let animation = &scene.animations[0];
        assert_eq!(animation.name.as_deref(), Some(MASTER_ANIMATION_NAME));
        assert_eq!(animation.duration, 3.0);
        assert_eq!(animation.ticks_per_second, 30.0);
        assert_eq!(animation.channels.len(), 1);
        let channel = &animation.channels[0];
        assert_eq!(channel.node_name, "Pivot:box_(10000000)");
        assert_eq!(channel.position_keys.len(), 3);
        assert!((channel.position_keys[1].value.x - 2.0).abs() < 1e-4);
    }

    #[test]
    fn animation_range_override() {
        let mut archive = archive();
        let params = ImportParams {
            animation_start: Some(2),
            animation_end: Some(1),
            ..Default::default()
        };
        let scene = Importer::new(&mut archive, params)
            .import_file("scenes/demo.lws")
            .unwrap();
        let animation = &scene.animations[0];
        assert_eq!(animation.duration, 2.0);
        assert_eq!(animation.channels[0].position_keys.len(), 2);
    }

    #[test]
    fn invalid_references_are_fatal() {
        let mut archive = MemoryArchive::new()
            .with_file("scenes/self.lws", "LWSC\n3\nLoadObject self.lws\n")
            .with_file("empty.lws", "LWSC\n3\nLoadObject\n");
        assert!(matches!(
            import(&mut archive, "scenes/self.lws"),
            Err(ImportError::Lws(LwsLoadError::Batch(BatchError::SelfReference(_))))
        ));
        assert!(matches!(
            import(&mut archive, "empty.lws"),
            Err(ImportError::Lws(LwsLoadError::Batch(BatchError::EmptyPath)))
        ));
    }

    #[test]
    fn document_errors() {
        let mut archive = MemoryArchive::new()
            .with_file("loop.lws", "LWSC\n3\nAddNullObject A\nParentItem 10000001\nAddNullObject B\nParentItem 10000000\n")
            .with_file("magic.lws", "LWSC\n");
        assert!(matches!(
            import(&mut archive, "loop.lws"),
            Err(ImportError::Lws(LwsLoadError::Hierarchy(HierarchyError::NoRoot)))
        ));
        assert!(matches!(
            import(&mut archive, "magic.lws"),
            Err(ImportError::Lws(LwsLoadError::MissingVersion))
        ));
        assert!(matches!(
            read_document(&element::parse("LWXX\n3\n", 10).unwrap()),
            Err(LwsLoadError::NotAScene)
        ));
    }

    #[test]
    fn frame_numbers_out_of_range_are_fatal() {
        let mut archive = MemoryArchive::new()
            .with_file("first.lws", "LWSC\n3\nFirstFrame -2147483648\nAddNullObject A\n")
            .with_file("last.lws", "LWSC\n3\nLastFrame -2147483648\nAddNullObject A\n");
        assert!(matches!(
            import(&mut archive, "first.lws"),
            Err(ImportError::Lws(LwsLoadError::FrameNumber(i32::MIN)))
        ));
        assert!(matches!(
            import(&mut archive, "last.lws"),
            Err(ImportError::Lws(LwsLoadError::FrameNumber(i32::MIN)))
        ));
    }

    #[test]
    fn oversized_animation_ranges_are_fatal() {
        const ANIMATED: &str = "LWSC\n3\nFirstFrame 1\nLastFrame 2000000000\nAddNullObject A\nNumChannels 1\nChannel 0\n{ Envelope\n  1\n  Key 1 0 0 0 0 0 0 0\n}\n";
        let mut archive = MemoryArchive::new()
            .with_file("animated.lws", ANIMATED)
            .with_file("still.lws", "LWSC\n3\nFirstFrame 1\nLastFrame 2000000000\nAddNullObject A\n");
        assert!(matches!(
            import(&mut archive, "animated.lws"),
            Err(ImportError::Lws(LwsLoadError::FrameRange { first: 0, last: 1999999999 }))
        ));

        // Without keys nothing is sampled, so the range is harmless.
        let scene = import(&mut archive, "still.lws").unwrap();
        assert!(scene.animations.is_empty());

        let params = ImportParams {
            animation_start: Some(i32::MIN),
            animation_end: Some(i32::MAX),
            ..Default::default()
        };
        let mut demo = self::archive();
        assert!(matches!(
            Importer::new(&mut demo, params).import_file("scenes/demo.lws"),
            Err(ImportError::Lws(LwsLoadError::FrameRange { .. }))
        ));
    }

    #[test]
    fn missing_objects_leave_empty_attachments() {
        let mut archive = MemoryArchive::new().with_file(
            "scene.lws",
            "LWSC\n2\nLoadObject missing.ac\nAddNullObject Helper\nParentObject 0\n",
        );
        let scene = import(&mut archive, "scene.lws").unwrap();
        assert!(scene.incomplete);
        let attachment = &scene.root.children[0].children[0];
        assert_eq!(attachment.name, "missing_(10000000)");
        assert_eq!(attachment.children.len(), 1);
        assert_eq!(attachment.children[0].name, "Pivot:Helper_(10000001)");
        assert!(scene.animations.is_empty());
    }

    #[test]
    fn old_motion_blocks() {
        let text = "LWSC\n2\nAddNullObject Null\nObjectMotion (unnamed)\n  2\n  1\n  5 0 0 0 0\n  2\n  1 0 0 0 0\n  3 10 0 0 0\nEndBehavior 1\nPre/PostBehavior 0 0 2 2\n";
        let document = read_document(&element::parse(text, 1000).unwrap()).unwrap();
        let channels = &document.items[0].channels;
        assert_eq!(channels.len(), 2);
        assert_eq!(channels[0].keys[0].value, 5.0);
        assert_eq!(channels[1].channel, EnvelopeChannel::PositionY);
        assert_eq!(channels[1].keys[1].time, 10.0);
        assert_eq!(channels[0].pre, PrePostBehaviour::Reset);
        assert_eq!(channels[1].post, PrePostBehaviour::Repeat);
    }

    #[test]
    fn motion_files_get_an_implicit_item() {
        let text = "LWMO\n3\nNumChannels 1\nChannel 0\n{ Envelope\n  1\n  Key 1 0 0 0 0 0 0 0\n}\n";
        let document = read_document(&element::parse(text, 1000).unwrap()).unwrap();
        assert_eq!(document.items.len(), 1);
        assert_eq!(document.items[0].channels[0].keys.len(), 1);
    }

    #[test]
    fn cyclic_scene_references_are_skipped() {
        let mut archive = MemoryArchive::new()
            .with_file("a.lws", "LWSC\n3\nLoadObject b.lws\n")
            .with_file("b.lws", "LWSC\n3\nLoadObject a.lws\n");
        let scene = import(&mut archive, "a.lws").unwrap();
        assert!(scene.root.find("Pivot:b_(10000000)").is_some());
        assert!(scene.root.find("Pivot:a_(10000000)").is_some());
        assert!(scene.root.find("a_(10000000)").unwrap().children.is_empty());
    }
}
