use std::{borrow::Cow, collections::HashMap, convert::Infallible};

use super::{normalize_path, Archive, Entry};

/// Files held in memory, keyed by normalized path.
#[derive(Debug, Clone, Default)]
pub struct MemoryArchive {
    files: HashMap<String, Vec<u8>>,
}

impl MemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: &str, data: impl Into<Vec<u8>>) {
        self.files.insert(normalize_path(path), data.into());
    }

    pub fn with_file(mut self, path: &str, data: impl Into<Vec<u8>>) -> Self {
        self.insert(path, data);
        self
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

pub struct MemoryEntry<'a> {
    name: &'a str,
    data: &'a [u8],
}

impl<'a> Entry<'a> for MemoryEntry<'a> {
    type Error = Infallible;

    fn name(&self) -> Result<Cow<'_, str>, Self::Error> {
        Ok(Cow::Borrowed(self.name))
    }

    fn unpack(&mut self) -> Result<Vec<u8>, Self::Error> {
        Ok(self.data.to_vec())
    }
}

impl Archive for MemoryArchive {
    type Error = Infallible;
    type Entry<'a> = MemoryEntry<'a>
    where
        Self: 'a;

    fn by_path(&mut self, path: &str) -> Result<Option<Self::Entry<'_>>, Self::Error> {
        Ok(self
            .files
            .get_key_value(&normalize_path(path))
            .map(|(name, data)| MemoryEntry {
                name: name.as_str(),
                data: data.as_slice(),
            }))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::archive::read_file;

    #[test]
    fn lookup_is_normalized() {
        let mut archive = MemoryArchive::new().with_file("models\\cube.stl", b"solid".to_vec());
        assert_eq!(
            read_file(&mut archive, "./models/cube.stl"),
            Ok(Some(b"solid".to_vec()))
        );
        assert_eq!(read_file(&mut archive, "models/sphere.stl"), Ok(None));
        assert!(archive.exists("models/cube.stl").unwrap());
    }
}
