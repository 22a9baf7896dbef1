use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("I/O error on {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("cannot (de)serialize {path}: {source}")]
    Serde {
        path: PathBuf,
        source: serde_json::Error,
    },
}

pub trait PersistenceLayer<S> {
    /// `Ok(None)` when nothing has been saved yet.
    fn load(&self) -> Result<Option<S>, PersistenceError>;
    fn save(&mut self, data: &S) -> Result<(), PersistenceError>;
}

/// Stores a value as a JSON document. Saves go to a sibling `.tmp` file which
/// is then renamed over the target, so readers see either the old or the new
/// document and never a torn one.
#[derive(Debug, Clone)]
pub struct JsonFile<S> {
    path: PathBuf,
    _data: PhantomData<fn() -> S>,
}

impl<S> JsonFile<S> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _data: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(".tmp");
        PathBuf::from(name)
    }

    fn io_error(&self, source: io::Error) -> PersistenceError {
        PersistenceError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl<S: Serialize + DeserializeOwned> PersistenceLayer<S> for JsonFile<S> {
    fn load(&self) -> Result<Option<S>, PersistenceError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(e)),
        };
        serde_json::from_reader(BufReader::new(file))
            .map(Some)
            .map_err(|source| PersistenceError::Serde {
                path: self.path.clone(),
                source,
            })
    }

    fn save(&mut self, data: &S) -> Result<(), PersistenceError> {
        let temp_path = self.temp_path();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&temp_path)
            .map_err(|e| self.io_error(e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, data).map_err(|source| PersistenceError::Serde {
            path: temp_path.clone(),
            source,
        })?;
        writer.flush().map_err(|e| self.io_error(e))?;
        writer.get_ref().sync_all().map_err(|e| self.io_error(e))?;

        fs::rename(&temp_path, &self.path).map_err(|e| self.io_error(e))
    }
}
