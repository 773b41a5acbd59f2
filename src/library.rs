use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;
use uuid::Uuid;

use crate::core::Routine;
use crate::error::StoreError;

/// Storage for saved routines
///
/// Routines are validated on the way in, so anything fetched is playable.
pub trait RoutineRepository {
    /// All routines, most recently updated first
    fn fetch_routines(&self) -> Result<Vec<Routine>, StoreError>;

    fn insert(&mut self, routine: Routine) -> Result<(), StoreError>;

    /// Replace a stored routine and bump its `updated_at`
    fn update(&mut self, routine: Routine) -> Result<(), StoreError>;

    fn delete(&mut self, id: Uuid) -> Result<(), StoreError>;

    fn find(&self, id: Uuid) -> Result<Option<Routine>, StoreError> {
        Ok(self.fetch_routines()?.into_iter().find(|r| r.id == id))
    }
}

fn sorted(mut routines: Vec<Routine>) -> Vec<Routine> {
    routines.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    routines
}

fn insert_into(routines: &mut Vec<Routine>, routine: Routine) -> Result<(), StoreError> {
    routine.validate()?;
    if routines.iter().any(|r| r.id == routine.id) {
        return Err(StoreError::Duplicate(routine.id));
    }
    routines.push(routine);
    Ok(())
}

fn update_in(routines: &mut [Routine], mut routine: Routine) -> Result<(), StoreError> {
    routine.validate()?;
    let slot = routines
        .iter_mut()
        .find(|r| r.id == routine.id)
        .ok_or(StoreError::NotFound(routine.id))?;
    routine.updated_at = Utc::now();
    *slot = routine;
    Ok(())
}

fn delete_from(routines: &mut Vec<Routine>, id: Uuid) -> Result<(), StoreError> {
    let before = routines.len();
    routines.retain(|r| r.id != id);
    if routines.len() == before {
        return Err(StoreError::NotFound(id));
    }
    Ok(())
}

/// Routine library kept in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryRoutineStore {
    routines: Vec<Routine>,
}

impl MemoryRoutineStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RoutineRepository for MemoryRoutineStore {
    fn fetch_routines(&self) -> Result<Vec<Routine>, StoreError> {
        Ok(sorted(self.routines.clone()))
    }

    fn insert(&mut self, routine: Routine) -> Result<(), StoreError> {
        insert_into(&mut self.routines, routine)
    }

    fn update(&mut self, routine: Routine) -> Result<(), StoreError> {
        update_in(&mut self.routines, routine)
    }

    fn delete(&mut self, id: Uuid) -> Result<(), StoreError> {
        delete_from(&mut self.routines, id)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LibraryFile {
    #[serde(default)]
    routines: Vec<Routine>,
}

/// Routine library stored as a single JSON file
///
/// Every write replaces the file through a uniquely named temporary sibling,
/// so a crash mid-write leaves the previous library intact.
#[derive(Debug, Clone)]
pub struct JsonRoutineStore {
    path: PathBuf,
}

impl JsonRoutineStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Default location under the user's data directory
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_dir().map(|p| p.join("stepwise").join("routines.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Vec<Routine>, StoreError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let contents = fs::read_to_string(&self.path)?;
        if contents.trim().is_empty() {
            return Ok(Vec::new());
        }
        let file: LibraryFile = serde_json::from_str(&contents)?;
        Ok(file.routines)
    }

    fn save(&self, routines: Vec<Routine>) -> Result<(), StoreError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, &LibraryFile { routines })?;
        tmp.flush()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        debug!(path = %self.path.display(), "Routine library saved");
        Ok(())
    }

    fn modify(
        &mut self,
        change: impl FnOnce(&mut Vec<Routine>) -> Result<(), StoreError>,
    ) -> Result<(), StoreError> {
        let mut routines = self.load()?;
        change(&mut routines)?;
        self.save(routines)
    }
}

impl RoutineRepository for JsonRoutineStore {
    fn fetch_routines(&self) -> Result<Vec<Routine>, StoreError> {
        Ok(sorted(self.load()?))
    }

    fn insert(&mut self, routine: Routine) -> Result<(), StoreError> {
        self.modify(|routines| insert_into(routines, routine))
    }

    fn update(&mut self, routine: Routine) -> Result<(), StoreError> {
        self.modify(|routines| update_in(routines, routine))
    }

    fn delete(&mut self, id: Uuid) -> Result<(), StoreError> {
        self.modify(|routines| delete_from(routines, id))
    }
}
