use std::{
    borrow::Cow,
    error::Error,
    fmt::{self, Display, Formatter},
    io::{self, Read, Seek},
};

use zip::read::ZipFile;

use super::{normalize_path, Archive, Entry};

#[derive(Debug)]
pub enum ZipError {
    Zip(zip::result::ZipError),
    FileTooLarge(u64),
}

impl Display for ZipError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ZipError::Zip(error) => Display::fmt(error, f),
            ZipError::FileTooLarge(size) => write!(f, "File size {} is too large", size),
        }
    }
}

impl Error for ZipError {}

impl From<zip::result::ZipError> for ZipError {
    fn from(value: zip::result::ZipError) -> Self {
        Self::Zip(value)
    }
}

impl From<io::Error> for ZipError {
    fn from(value: io::Error) -> Self {
        Self::Zip(zip::result::ZipError::Io(value))
    }
}

/// Scene files packed into a zip archive.
pub struct ZipArchive<R> {
    inner: zip::ZipArchive<R>,
}

impl<R: Read + Seek> ZipArchive<R> {
    pub fn new(stream: R) -> Result<Self, ZipError> {
        Ok(Self {
            inner: zip::ZipArchive::new(stream)?,
        })
    }
}

impl<'a> Entry<'a> for ZipFile<'a> {
    type Error = ZipError;

    fn name(&self) -> Result<Cow<'_, str>, Self::Error> {
        Ok(ZipFile::name(self).into())
    }

    fn unpack(&mut self) -> Result<Vec<u8>, Self::Error> {
        let file_size = self.size();
        let file_size: usize = file_size
            .try_into()
            .map_err(|_| ZipError::FileTooLarge(file_size))?;
        let mut buffer = Vec::with_capacity(file_size);
        self.read_to_end(&mut buffer)?;
        Ok(buffer)
    }
}

impl<R: Read + Seek> Archive for ZipArchive<R> {
    type Error = ZipError;

    type Entry<'a> = ZipFile<'a>
    where
        Self: 'a;

    fn by_path(&mut self, path: &str) -> Result<Option<Self::Entry<'_>>, Self::Error> {
        match self.inner.by_name(&normalize_path(path)) {
            Ok(entry) => Ok(Some(entry)),
            Err(zip::result::ZipError::FileNotFound) => Ok(None),
            Err(error) => Err(error.into()),
        }
    }
}
