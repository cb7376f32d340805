use std::{borrow::Cow, error::Error};

pub mod directory;
pub mod memory;
#[cfg(feature = "zip")]
pub mod zip;

pub trait Entry<'a> {
    type Error: Error;

    fn name(&self) -> Result<Cow<'_, str>, Self::Error>;
    fn unpack(&mut self) -> Result<Vec<u8>, Self::Error>;
}

/// Source of the files an import reads, addressed by `/` separated paths.
pub trait Archive {
    type Error: Error;
    type Entry<'a>: Entry<'a, Error = Self::Error>
    where
        Self: 'a;

    fn by_path(&mut self, path: &str) -> Result<Option<Self::Entry<'_>>, Self::Error>;

    fn exists(&mut self, path: &str) -> Result<bool, Self::Error> {
        Ok(self.by_path(path)?.is_some())
    }
}

/// Reads a whole file, or `None` if the archive has no such file.
pub fn read_file<A: Archive>(archive: &mut A, path: &str) -> Result<Option<Vec<u8>>, A::Error> {
    match archive.by_path(path)? {
        Some(mut entry) => Ok(Some(entry.unpack()?)),
        None => Ok(None),
    }
}

/// Uses `/` separators and resolves `.` and `..` components.
pub fn normalize_path(path: &str) -> String {
    let path = path.trim().replace('\\', "/");
    let absolute = path.starts_with('/');
    let mut components: Vec<&str> = Vec::new();
    for component in path.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                if matches!(components.last(), Some(last) if *last != "..") {
                    components.pop();
                } else if !absolute {
                    components.push("..");
                }
            }
            component => components.push(component),
        }
    }
    let joined = components.join("/");
    if absolute {
        format!("/{}", joined)
    } else {
        joined
    }
}

/// Directory part of `path`, empty for a bare file name.
pub fn parent_dir(path: &str) -> &str {
    match path.rfind(['/', '\\']) {
        Some(index) => &path[..index],
        None => "",
    }
}

/// Resolves `relative` against the directory `base`.
pub fn join_path(base: &str, relative: &str) -> String {
    let relative = relative.replace('\\', "/");
    if base.is_empty() || relative.starts_with('/') {
        normalize_path(&relative)
    } else {
        normalize_path(&format!("{}/{}", base, relative))
    }
}

pub fn file_name(path: &str) -> &str {
    match path.rfind(['/', '\\']) {
        Some(index) => &path[index + 1..],
        None => path,
    }
}

pub fn file_stem(path: &str) -> &str {
    let name = file_name(path);
    match name.rfind('.') {
        Some(0) | None => name,
        Some(index) => &name[..index],
    }
}

/// Lower case extension without the dot.
pub fn extension(path: &str) -> Option<String> {
    let name = file_name(path);
    match name.rfind('.') {
        Some(index) if index + 1 < name.len() => Some(name[index + 1..].to_ascii_lowercase()),
        _ => None,
    }
}

pub fn paths_equal(first: &str, second: &str) -> bool {
    normalize_path(first) == normalize_path(second)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn normalize() {
        assert_eq!(normalize_path("scenes\\..\\objects/./box.lwo"), "objects/box.lwo");
        assert_eq!(normalize_path("../box.lwo"), "../box.lwo");
        assert_eq!(normalize_path("/a/../b"), "/b");
        assert!(paths_equal("a/b.lws", "./a//b.lws"));
    }

    #[test]
    fn path_parts() {
        assert_eq!(parent_dir("scenes/walk.smd"), "scenes");
        assert_eq!(parent_dir("walk.smd"), "");
        assert_eq!(file_stem("scenes/walk.smd"), "walk");
        assert_eq!(file_stem(".hidden"), ".hidden");
        assert_eq!(extension("Model.STL").as_deref(), Some("stl"));
        assert_eq!(extension("README"), None);
        assert_eq!(join_path("scenes", "../objects/box.ac"), "objects/box.ac");
        assert_eq!(join_path("", "box.ac"), "box.ac");
    }
}
