use std::{env, fs, fs::File, path::Path};

use anyhow::{anyhow, bail, Context};
use log::info;
use scene_asset::{
    archive::{directory::Directory, zip::ZipArchive, Archive},
    loader::{ImportParams, Importer},
    node::NodeAsset,
    scene::SceneAsset,
};

const MAX_PRINT_DEPTH: usize = 64;

struct Args {
    config: Option<String>,
    zip: Option<String>,
    path: String,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut config = None;
    let mut zip = None;
    let mut path = None;
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => config = Some(args.next().context("--config needs a file")?),
            "--zip" => zip = Some(args.next().context("--zip needs an archive")?),
            _ if path.is_none() => path = Some(arg),
            _ => bail!("Unexpected argument {}", arg),
        }
    }
    let path = path.context("Usage: scene-inspect [--config params.toml] [--zip archive.zip] <scene>")?;
    Ok(Args { config, zip, path })
}

fn load_params(path: Option<&str>) -> anyhow::Result<ImportParams> {
    let Some(path) = path else {
        return Ok(ImportParams::default());
    };
    let text = fs::read_to_string(path).with_context(|| format!("Reading {}", path))?;
    let params: ImportParams = toml::from_str(&text).with_context(|| format!("Parsing {}", path))?;
    info!("Import params from {}: {:?}", path, params);
    Ok(params)
}

fn import<A: Archive>(archive: &mut A, params: ImportParams, path: &str) -> anyhow::Result<SceneAsset> {
    Importer::new(archive, params)
        .import_file(path)
        .map_err(|err| anyhow!("Unable to import {}: {}", path, err))
}

fn print_node(node: &NodeAsset, depth: usize) {
    if depth > MAX_PRINT_DEPTH {
        println!("{:indent$}...", "", indent = depth * 2);
        return;
    }
    if node.meshes.is_empty() {
        println!("{:indent$}{}", "", node.name, indent = depth * 2);
    } else {
        println!("{:indent$}{} meshes={:?}", "", node.name, node.meshes, indent = depth * 2);
    }
    for child in &node.children {
        print_node(child, depth + 1);
    }
}

fn print_scene(scene: &SceneAsset) {
    if let Some(source) = &scene.source {
        println!("source: {}", source);
    }
    if scene.incomplete {
        println!("incomplete: no renderable geometry");
    }

    println!("nodes ({}):", scene.root.node_count());
    print_node(&scene.root, 1);

    println!("meshes ({}):", scene.meshes.len());
    for (index, mesh) in scene.meshes.iter().enumerate() {
        println!(
            "  {} {}: {} vertices, {} faces, material {}, {} bones",
            index,
            mesh.name.as_deref().unwrap_or("<unnamed>"),
            mesh.vertex_count(),
            mesh.faces.len(),
            mesh.material,
            mesh.bones.len()
        );
    }

    println!("materials ({}):", scene.materials.len());
    for (index, material) in scene.materials.iter().enumerate() {
        let texture = material
            .diffuse_texture()
            .map(|texture| texture.path.as_str())
            .unwrap_or("-");
        println!(
            "  {} {}: diffuse {:?}, texture {}",
            index,
            material.name.as_deref().unwrap_or("<unnamed>"),
            material.diffuse_color,
            texture
        );
    }

    for animation in &scene.animations {
        println!(
            "animation {}: {} ticks at {} per second, {} channels",
            animation.name.as_deref().unwrap_or("<unnamed>"),
            animation.duration,
            animation.ticks_per_second,
            animation.channels.len()
        );
    }
    for light in &scene.lights {
        println!("light {}: {:?}", light.name, light.kind);
    }
    for camera in &scene.cameras {
        println!("camera {}", camera.name);
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = parse_args()?;
    let params = load_params(args.config.as_deref())?;

    let scene = match &args.zip {
        Some(zip) => {
            let file = File::open(zip).with_context(|| format!("Opening {}", zip))?;
            let mut archive = ZipArchive::new(file).map_err(|err| anyhow!("{}: {}", zip, err))?;
            import(&mut archive, params, &args.path)?
        }
        None => {
            let path = Path::new(&args.path);
            let root = path.parent().unwrap_or_else(|| Path::new(""));
            let name = path
                .file_name()
                .and_then(|name| name.to_str())
                .context("Scene path has no file name")?;
            let mut archive = Directory::new(root);
            import(&mut archive, params, name)?
        }
    };
    print_scene(&scene);
    Ok(())
}
