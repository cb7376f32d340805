use std::{
    borrow::Cow,
    fs, io,
    path::{Path, PathBuf},
};

use super::{Archive, Entry};

/// Files below a directory of the local file system.
#[derive(Debug, Clone)]
pub struct Directory {
    root: PathBuf,
}

impl Directory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

pub struct DirectoryEntry {
    name: String,
    path: PathBuf,
}

impl<'a> Entry<'a> for DirectoryEntry {
    type Error = io::Error;

    fn name(&self) -> Result<Cow<'_, str>, Self::Error> {
        Ok(Cow::Borrowed(&self.name))
    }

    fn unpack(&mut self) -> Result<Vec<u8>, Self::Error> {
        fs::read(&self.path)
    }
}

impl Archive for Directory {
    type Error = io::Error;
    type Entry<'a> = DirectoryEntry
    where
        Self: 'a;

    fn by_path(&mut self, path: &str) -> Result<Option<Self::Entry<'_>>, Self::Error> {
        let full = self.root.join(path.trim_start_matches('/'));
        match fs::metadata(&full) {
            Ok(metadata) if metadata.is_file() => Ok(Some(DirectoryEntry {
                name: path.to_string(),
                path: full,
            })),
            Ok(_) => Ok(None),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(error),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::archive::read_file;

    #[test]
    fn reads_files_below_root() {
        let root = std::env::temp_dir().join(format!("scene-asset-directory-{}", std::process::id()));
        fs::create_dir_all(root.join("objects")).unwrap();
        fs::write(root.join("objects/box.ac"), b"AC3Db").unwrap();

        let mut archive = Directory::new(&root);
        let file = read_file(&mut archive, "/objects/box.ac").unwrap();
        assert_eq!(file.as_deref(), Some(b"AC3Db".as_slice()));
        assert!(!archive.exists("objects").unwrap());
        assert!(!archive.exists("objects/missing.ac").unwrap());

        fs::remove_dir_all(&root).unwrap();
    }
}
