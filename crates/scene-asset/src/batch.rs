//! Deferred loading of externally referenced files.
//!
//! A scene loader registers every file it references while parsing, and all
//! requests are imported once parsing is done. Requests are independent of
//! each other; results are kept until the loader takes them for merging.

use std::{
    collections::BTreeMap,
    error::Error,
    fmt::{self, Display, Formatter},
};

use log::{debug, error};

use crate::{archive::paths_equal, index::RequestId, scene::SceneAsset};

/// Import parameter overrides for one nested import, by parameter name.
pub type ParamOverrides = BTreeMap<String, i64>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchError {
    EmptyPath,
    SelfReference(String),
}

impl Display for BatchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            BatchError::EmptyPath => write!(f, "Load request with an empty path"),
            BatchError::SelfReference(path) => {
                write!(f, "File {} references itself", path)
            }
        }
    }
}

impl Error for BatchError {}

/// Something that can import a file as a scene.
pub trait SceneSource {
    type Error: Display;

    fn load_scene(
        &mut self,
        path: &str,
        overrides: &ParamOverrides,
    ) -> Result<SceneAsset, Self::Error>;
}

#[derive(Debug)]
enum RequestState {
    Pending,
    Loaded(SceneAsset),
    Failed,
    Taken,
}

#[derive(Debug)]
struct LoadRequest {
    path: String,
    overrides: ParamOverrides,
    state: RequestState,
    references: usize,
}

#[derive(Debug)]
pub struct BatchLoader {
    importing: String,
    requests: Vec<LoadRequest>,
}

impl BatchLoader {
    /// Creates a batch for the file at `importing`.
    pub fn new(importing: impl Into<String>) -> Self {
        Self {
            importing: importing.into(),
            requests: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Registers a file to import later.
    ///
    /// A request for the file being imported fails immediately. Requests for
    /// the same path with the same overrides share one import.
    pub fn add_load_request(
        &mut self,
        path: &str,
        overrides: ParamOverrides,
    ) -> Result<RequestId, BatchError> {
        if path.trim().is_empty() {
            return Err(BatchError::EmptyPath);
        }
        if paths_equal(path, &self.importing) {
            return Err(BatchError::SelfReference(path.to_string()));
        }
        if let Some(index) = self
            .requests
            .iter()
            .position(|request| paths_equal(&request.path, path) && request.overrides == overrides)
        {
            self.requests[index].references += 1;
            debug!("Reusing load request {} for {}", index, path);
            return Ok(RequestId(index));
        }
        self.requests.push(LoadRequest {
            path: path.to_string(),
            overrides,
            state: RequestState::Pending,
            references: 1,
        });
        Ok(RequestId(self.requests.len() - 1))
    }

    /// Imports every pending request in registration order.
    ///
    /// A failed import is logged and leaves its request without a scene.
    pub fn load_all<S: SceneSource>(&mut self, source: &mut S) {
        for (index, request) in self.requests.iter_mut().enumerate() {
            if !matches!(request.state, RequestState::Pending) {
                continue;
            }
            debug!("Loading request {}: {}", index, request.path);
            request.state = match source.load_scene(&request.path, &request.overrides) {
                Ok(scene) => RequestState::Loaded(scene),
                Err(err) => {
                    error!("Unable to load {}: {}", request.path, err);
                    RequestState::Failed
                }
            };
        }
    }

    pub fn path(&self, id: RequestId) -> Option<&str> {
        self.requests.get(id.0).map(|request| request.path.as_str())
    }

    /// Hands out the scene of a request. Shared requests hand out copies
    /// until the last reference takes the original.
    pub fn take(&mut self, id: RequestId) -> Option<SceneAsset> {
        let request = self.requests.get_mut(id.0)?;
        if request.references > 1 {
            if let RequestState::Loaded(scene) = &request.state {
                request.references -= 1;
                return Some(scene.clone());
            }
            return None;
        }
        match std::mem::replace(&mut request.state, RequestState::Taken) {
            RequestState::Loaded(scene) => Some(scene),
            other => {
                request.state = other;
                None
            }
        }
    }
}
