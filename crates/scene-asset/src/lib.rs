//! Scene reconstruction for triangle-based model formats.
//!
//! Loaders in this crate parse a format into intermediate records, and the
//! shared stages here turn those records into a [`scene::SceneAsset`]: the
//! assembler partitions geometry into per-material meshes, the skeleton
//! resolver builds bone hierarchies and animation tracks, and the batch
//! loader plus [`merge`] graft externally referenced scenes into a master
//! scene. Files are read through the [`archive::Archive`] trait so that
//! scenes can be loaded from directories, memory or packed archives.

pub mod animation;
pub mod archive;
pub mod assembler;
pub mod batch;
pub mod camera;
pub mod envelope;
pub mod hierarchy;
pub mod index;
pub mod light;
/// Scene importers for AC3D, SMD, STL and LWS files.
pub mod loader;
pub mod material;
pub mod merge;
pub mod mesh;
pub mod node;
pub mod primitive;
pub mod records;
pub mod scene;
pub mod skeleton;
pub mod skin;
pub mod texture;
