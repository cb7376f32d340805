use std::{
    error::Error,
    fmt::{self, Display, Formatter},
};

use log::debug;

use crate::{
    archive::{extension, normalize_path, read_file, Archive},
    assembler::{AssembleOptions, Subdivider},
    batch::{ParamOverrides, SceneSource},
    merge::MergeOptions,
    scene::{SceneAsset, SceneValidationError},
};

/// AC3D loader.
pub mod ac;
pub mod cursor;
/// LightWave scene loader.
pub mod lws;
/// Valve SMD and VTA loader.
pub mod smd;
/// Binary and ASCII STL loader.
pub mod stl;

use ac::AcLoadError;
use lws::LwsLoadError;
use smd::SmdLoadError;
use stl::StlLoadError;

/// Settings read once at the start of an import.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ImportParams {
    /// Emit double-sided surfaces as separate front and back faces.
    pub split_double_sided: bool,
    /// Pass objects with a subdivision level to the subdivider hook.
    pub eval_subdivision: bool,
    pub animation_start: Option<i32>,
    pub animation_end: Option<i32>,
    /// Skip the skeleton mesh hook for scenes without geometry.
    pub no_skeleton_mesh: bool,
    /// Load `<name>_animation.txt` lists next to SMD files.
    pub load_animation_list: bool,
    /// Frame of VTA vertex animation sections to load.
    pub keyframe: u32,
    pub unique_node_names: bool,
    pub unique_names_if_necessary: bool,
    pub max_depth: usize,
}

impl Default for ImportParams {
    fn default() -> Self {
        Self {
            split_double_sided: true,
            eval_subdivision: true,
            animation_start: None,
            animation_end: None,
            no_skeleton_mesh: false,
            load_animation_list: true,
            keyframe: 0,
            unique_node_names: true,
            unique_names_if_necessary: true,
            max_depth: 1000,
        }
    }
}

impl ImportParams {
    /// Copy of these params with the overrides of a nested import applied.
    pub fn with_overrides(&self, overrides: &ParamOverrides) -> Self {
        let mut params = self.clone();
        for (key, value) in overrides {
            let value = *value;
            match key.as_str() {
                "split_double_sided" => params.split_double_sided = value != 0,
                "eval_subdivision" => params.eval_subdivision = value != 0,
                "animation_start" => params.animation_start = i32::try_from(value).ok(),
                "animation_end" => params.animation_end = i32::try_from(value).ok(),
                "no_skeleton_mesh" => params.no_skeleton_mesh = value != 0,
                "load_animation_list" => params.load_animation_list = value != 0,
                "keyframe" => params.keyframe = u32::try_from(value).unwrap_or(0),
                "unique_node_names" => params.unique_node_names = value != 0,
                "unique_names_if_necessary" => params.unique_names_if_necessary = value != 0,
                "max_depth" => {
                    params.max_depth = usize::try_from(value).unwrap_or(params.max_depth)
                }
                _ => debug!("Ignoring unknown import parameter {}", key),
            }
        }
        params
    }

    /// Explicit animation range, ordered.
    pub fn animation_range(&self) -> (Option<i32>, Option<i32>) {
        match (self.animation_start, self.animation_end) {
            (Some(start), Some(end)) if end < start => (Some(end), Some(start)),
            range => range,
        }
    }

    pub(crate) fn assemble_options(&self) -> AssembleOptions {
        AssembleOptions {
            split_double_sided: self.split_double_sided,
            eval_subdivision: self.eval_subdivision,
            max_depth: self.max_depth,
        }
    }

    pub(crate) fn merge_options(&self) -> MergeOptions {
        MergeOptions {
            unique_node_names: self.unique_node_names,
            only_if_necessary: self.unique_names_if_necessary,
        }
    }
}

/// Processing applied to a finished scene, such as skeleton mesh synthesis.
pub trait SceneProcess {
    fn process(&self, scene: &mut SceneAsset);
}

/// Optional external collaborators of an import.
#[derive(Clone, Copy, Default)]
pub struct ImportHooks<'h> {
    pub subdivider: Option<&'h dyn Subdivider>,
    pub skeleton_mesh: Option<&'h dyn SceneProcess>,
}

#[derive(Debug)]
pub enum ImportError<E> {
    Io(E),
    FileNotFound(String),
    UnknownFormat(String),
    RecursionLimit(usize),
    CyclicReference(String),
    Ac(AcLoadError),
    Smd(SmdLoadError),
    Stl(StlLoadError),
    Lws(LwsLoadError),
    Validation(SceneValidationError),
}

impl<E: Display> Display for ImportError<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ImportError::Io(err) => Display::fmt(err, f),
            ImportError::FileNotFound(path) => write!(f, "File {} not found", path),
            ImportError::UnknownFormat(path) => write!(f, "Unknown file format: {}", path),
            ImportError::RecursionLimit(limit) => {
                write!(f, "More than {} nested imports", limit)
            }
            ImportError::CyclicReference(path) => {
                write!(f, "File {} is already being imported", path)
            }
            ImportError::Ac(err) => write!(f, "AC3D: {}", err),
            ImportError::Smd(err) => write!(f, "SMD: {}", err),
            ImportError::Stl(err) => write!(f, "STL: {}", err),
            ImportError::Lws(err) => write!(f, "LWS: {}", err),
            ImportError::Validation(err) => write!(f, "Invalid scene: {}", err),
        }
    }
}

impl<E: Error> Error for ImportError<E> {}

impl<E> From<AcLoadError> for ImportError<E> {
    fn from(value: AcLoadError) -> Self {
        Self::Ac(value)
    }
}

impl<E> From<SmdLoadError> for ImportError<E> {
    fn from(value: SmdLoadError) -> Self {
        Self::Smd(value)
    }
}

impl<E> From<StlLoadError> for ImportError<E> {
    fn from(value: StlLoadError) -> Self {
        Self::Stl(value)
    }
}

impl<E> From<LwsLoadError> for ImportError<E> {
    fn from(value: LwsLoadError) -> Self {
        Self::Lws(value)
    }
}

impl<E> From<SceneValidationError> for ImportError<E> {
    fn from(value: SceneValidationError) -> Self {
        Self::Validation(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Ac,
    Smd,
    Stl,
    Lws,
}

impl Format {
    pub fn from_extension(path: &str) -> Option<Self> {
        match extension(path)?.as_str() {
            "ac" | "acc" | "ac3d" => Some(Format::Ac),
            "smd" | "vta" => Some(Format::Smd),
            "stl" => Some(Format::Stl),
            "lws" | "mot" => Some(Format::Lws),
            _ => None,
        }
    }

    pub fn from_magic(data: &[u8]) -> Option<Self> {
        if data.starts_with(b"AC3D") {
            return Some(Format::Ac);
        }
        if data.starts_with(b"LWSC") || data.starts_with(b"LWMO") {
            return Some(Format::Lws);
        }
        if stl::is_binary(data) {
            return Some(Format::Stl);
        }
        let start = data
            .iter()
            .position(|byte| !byte.is_ascii_whitespace())
            .unwrap_or(data.len());
        let text = &data[start..];
        if text.len() >= 5 && text[..5].eq_ignore_ascii_case(b"solid") {
            Some(Format::Stl)
        } else if text.starts_with(b"version") {
            Some(Format::Smd)
        } else {
            None
        }
    }

    pub fn detect(path: &str, data: &[u8]) -> Option<Self> {
        Self::from_extension(path).or_else(|| Self::from_magic(data))
    }
}

/// Imports files from an archive, including the files they reference.
pub struct Importer<'a, A: Archive> {
    archive: &'a mut A,
    params: ImportParams,
    hooks: ImportHooks<'a>,
    stack: Vec<String>,
}

impl<'a, A: Archive> Importer<'a, A> {
    pub fn new(archive: &'a mut A, params: ImportParams) -> Self {
        Self {
            archive,
            params,
            hooks: ImportHooks::default(),
            stack: Vec::new(),
        }
    }

    pub fn with_hooks(mut self, hooks: ImportHooks<'a>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn params(&self) -> &ImportParams {
        &self.params
    }

    pub(crate) fn hooks(&self) -> ImportHooks<'a> {
        self.hooks
    }

    pub fn import_file(&mut self, path: &str) -> Result<SceneAsset, ImportError<A::Error>> {
        let path = normalize_path(path);
        if self.stack.len() > self.params.max_depth {
            return Err(ImportError::RecursionLimit(self.params.max_depth));
        }
        if self.stack.contains(&path) {
            return Err(ImportError::CyclicReference(path));
        }
        let data = self
            .read(&path)?
            .ok_or_else(|| ImportError::FileNotFound(path.clone()))?;
        let format =
            Format::detect(&path, &data).ok_or_else(|| ImportError::UnknownFormat(path.clone()))?;
        debug!("Importing {} as {:?}", path, format);

        self.stack.push(path.clone());
        let result = self.import_data(format, &path, &data);
        self.stack.pop();
        let mut scene = result?;

        #[cfg(feature = "digest")]
        {
            scene.source = Some(crate::index::BundleIndex::digest_from_buffer(&data));
        }
        if scene.incomplete && !self.params.no_skeleton_mesh {
            match self.hooks.skeleton_mesh {
                Some(process) => process.process(&mut scene),
                None => debug!("No skeleton mesh hook, {} stays without geometry", path),
            }
        }
        scene.validate()?;
        Ok(scene)
    }

    fn import_data(
        &mut self,
        format: Format,
        path: &str,
        data: &[u8],
    ) -> Result<SceneAsset, ImportError<A::Error>> {
        match format {
            Format::Ac => Ok(ac::load(data, &self.params, self.hooks.subdivider)?),
            Format::Stl => Ok(stl::load(data)?),
            Format::Smd => smd::load(self, path, data),
            Format::Lws => lws::load(self, path, data),
        }
    }

    pub(crate) fn read(&mut self, path: &str) -> Result<Option<Vec<u8>>, ImportError<A::Error>> {
        read_file(self.archive, path).map_err(ImportError::Io)
    }

    pub(crate) fn exists(&mut self, path: &str) -> Result<bool, ImportError<A::Error>> {
        self.archive.exists(path).map_err(ImportError::Io)
    }

    /// Imports `path` with `overrides` applied on top of the current params.
    pub fn import_nested(
        &mut self,
        path: &str,
        overrides: &ParamOverrides,
    ) -> Result<SceneAsset, ImportError<A::Error>> {
        let saved = self.params.with_overrides(overrides);
        let saved = std::mem::replace(&mut self.params, saved);
        let result = self.import_file(path);
        self.params = saved;
        result
    }
}

impl<A: Archive> SceneSource for Importer<'_, A> {
    type Error = ImportError<A::Error>;

    fn load_scene(
        &mut self,
        path: &str,
        overrides: &ParamOverrides,
    ) -> Result<SceneAsset, Self::Error> {
        self.import_nested(path, overrides)
    }
}
