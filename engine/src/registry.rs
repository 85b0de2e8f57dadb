//! Profile Registry - Store and reuse table profiles
//!
//! Saves profiles to disk as JSON and finds the ones whose header anchor is
//! present in a grid. Built-in profiles are always available and cannot be
//! overwritten or deleted.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{ProfileError, ProfileResult};
use crate::grid::Grid;
use crate::logs::{log_success, log_warning};
use crate::profile::{builtin, TableProfile, BUILTIN_PROFILES};

/// Directory where profiles are stored (relative to current dir)
pub const DEFAULT_REGISTRY_DIR: &str = ".statnorm/profiles";

/// Environment variable overriding the registry directory
pub const REGISTRY_DIR_ENV: &str = "STATNORM_PROFILE_DIR";

/// A stored profile with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredProfile {
    /// Unique identifier (slug of the name)
    pub id: String,
    pub profile: TableProfile,
    /// Creation timestamp
    pub created_at: String,
}

/// Where a resolved profile came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileOrigin {
    Builtin,
    Stored,
    File,
}

/// Registry of table profiles
pub struct ProfileRegistry {
    registry_dir: PathBuf,
    profiles: BTreeMap<String, StoredProfile>,
}

impl ProfileRegistry {
    /// Registry in `$STATNORM_PROFILE_DIR`, or the default directory
    pub fn new() -> Self {
        match std::env::var(REGISTRY_DIR_ENV) {
            Ok(dir) if !dir.trim().is_empty() => Self::with_dir(dir),
            _ => Self::with_dir(DEFAULT_REGISTRY_DIR),
        }
    }

    /// Create a registry with a custom directory
    pub fn with_dir(dir: impl AsRef<Path>) -> Self {
        let mut registry = Self {
            registry_dir: dir.as_ref().to_path_buf(),
            profiles: BTreeMap::new(),
        };
        registry.load_all();
        registry
    }

    pub fn dir(&self) -> &Path {
        &self.registry_dir
    }

    /// Load all profiles from the registry directory. Unreadable files are
    /// reported and skipped.
    fn load_all(&mut self) {
        let entries = match fs::read_dir(&self.registry_dir) {
            Ok(e) => e,
            Err(_) => return,
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if !path.extension().is_some_and(|e| e == "json") {
                continue;
            }
            let loaded = fs::read_to_string(&path)
                .map_err(ProfileError::from)
                .and_then(|content| Ok(serde_json::from_str::<StoredProfile>(&content)?));
            match loaded {
                Ok(stored) => {
                    self.profiles.insert(stored.id.clone(), stored);
                }
                Err(e) => log_warning(format!("Skipping profile {}: {}", path.display(), e)),
            }
        }
    }

    /// Stored profiles, ordered by id
    pub fn list(&self) -> Vec<&StoredProfile> {
        self.profiles.values().collect()
    }

    /// Stored profile by id, or a built-in by name
    pub fn get(&self, id: &str) -> Option<TableProfile> {
        builtin(id).or_else(|| self.profiles.get(id).map(|s| s.profile.clone()))
    }

    /// Resolve a built-in name, a stored id, or a path to a profile JSON file.
    pub fn resolve(&self, name_or_path: &str) -> ProfileResult<(TableProfile, ProfileOrigin)> {
        if let Some(profile) = builtin(name_or_path) {
            return Ok((profile, ProfileOrigin::Builtin));
        }
        if let Some(stored) = self.profiles.get(name_or_path) {
            return Ok((stored.profile.clone(), ProfileOrigin::Stored));
        }
        let path = Path::new(name_or_path);
        if path.is_file() {
            let profile = TableProfile::from_json(&fs::read_to_string(path)?)?;
            return Ok((profile, ProfileOrigin::File));
        }
        Err(ProfileError::NotFound(name_or_path.to_string()))
    }

    /// Save a profile; returns its id. Re-saving a name replaces it.
    pub fn save(&mut self, profile: TableProfile) -> ProfileResult<String> {
        profile.validate()?;
        let id = slugify(&profile.name);
        if id.is_empty() {
            return Err(ProfileError::Invalid(format!("cannot derive an id from '{}'", profile.name)));
        }
        if BUILTIN_PROFILES.contains(&id.as_str()) {
            return Err(ProfileError::Invalid(format!("'{}' is a built-in profile", id)));
        }

        fs::create_dir_all(&self.registry_dir)?;

        let stored = StoredProfile {
            id: id.clone(),
            profile,
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        let content = serde_json::to_string_pretty(&stored)?;
        fs::write(self.path_for(&id), content)?;

        self.profiles.insert(id.clone(), stored);
        log_success(format!("Saved profile '{}'", id));
        Ok(id)
    }

    /// Import a profile from a JSON file, optionally renaming it
    pub fn import(&mut self, path: &Path, name: Option<&str>) -> ProfileResult<String> {
        let content = fs::read_to_string(path)?;
        let mut profile = TableProfile::from_json(&content)?;

        if let Some(name) = name {
            profile.name = name.to_string();
        }
        self.save(profile)
    }

    /// Delete a stored profile
    pub fn delete(&mut self, id: &str) -> ProfileResult<()> {
        if BUILTIN_PROFILES.contains(&id) {
            return Err(ProfileError::Invalid(format!("built-in profile '{}' cannot be deleted", id)));
        }
        if self.profiles.remove(id).is_none() {
            return Err(ProfileError::NotFound(id.to_string()));
        }
        fs::remove_file(self.path_for(id))?;
        Ok(())
    }

    /// Ids accepted by [`resolve`](Self::resolve) (built-ins first) of the
    /// profiles whose header anchor is in the grid
    pub fn find_matching(&self, grid: &Grid) -> Vec<String> {
        let builtins = BUILTIN_PROFILES
            .iter()
            .filter_map(|name| builtin(name).map(|p| (name.to_string(), p)));
        let stored = self.profiles.values().map(|s| (s.id.clone(), s.profile.clone()));

        builtins
            .chain(stored)
            .filter(|(_, p)| p.layout.header_anchor(grid).is_some())
            .map(|(id, _)| id)
            .collect()
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.registry_dir.join(format!("{}.json", id))
    }
}

impl Default for ProfileRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Lowercase slug of alphanumerics joined by '-'
fn slugify(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchor::Pattern;
    use crate::grid::Cell;
    use crate::layout::{LayoutRules, MetricRule};
    use tempfile::tempdir;

    fn custom(name: &str) -> TableProfile {
        TableProfile::new(
            name,
            LayoutRules::new(
                Pattern::substring("Time code"),
                vec![MetricRule::new("value", Some(Pattern::substring("Value")), 2)],
            ),
        )
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempdir().unwrap();
        let mut registry = ProfileRegistry::with_dir(dir.path());
        let id = registry.save(custom("Housing Starts")).unwrap();
        assert_eq!(id, "housing-starts");

        let reloaded = ProfileRegistry::with_dir(dir.path());
        assert_eq!(reloaded.list().len(), 1);
        assert_eq!(reloaded.get("housing-starts").unwrap().name, "Housing Starts");
    }

    #[test]
    fn test_builtins_protected() {
        let dir = tempdir().unwrap();
        let mut registry = ProfileRegistry::with_dir(dir.path());

        assert!(registry.save(custom("cpi")).is_err());
        assert!(registry.delete("cpi").is_err());
        assert!(registry.get("cpi").is_some());
    }

    #[test]
    fn test_delete() {
        let dir = tempdir().unwrap();
        let mut registry = ProfileRegistry::with_dir(dir.path());
        let id = registry.save(custom("tmp")).unwrap();

        registry.delete(&id).unwrap();
        assert!(registry.get(&id).is_none());
        assert!(matches!(registry.delete(&id), Err(ProfileError::NotFound(_))));
        assert!(!dir.path().join("tmp.json").exists());
    }

    #[test]
    fn test_import_and_resolve_file() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("housing.json");
        fs::write(&file, custom("housing").to_json().unwrap()).unwrap();

        let registry_dir = dir.path().join("registry");
        let mut registry = ProfileRegistry::with_dir(&registry_dir);

        let (profile, origin) = registry.resolve(file.to_str().unwrap()).unwrap();
        assert_eq!(origin, ProfileOrigin::File);
        assert_eq!(profile.name, "housing");

        let id = registry.import(&file, Some("Housing v2")).unwrap();
        let (_, origin) = registry.resolve(&id).unwrap();
        assert_eq!(origin, ProfileOrigin::Stored);

        let (_, origin) = registry.resolve("business-cycle").unwrap();
        assert_eq!(origin, ProfileOrigin::Builtin);

        assert!(matches!(registry.resolve("nope"), Err(ProfileError::NotFound(_))));
    }

    #[test]
    fn test_corrupt_file_skipped() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("broken.json"), "{ not json").unwrap();
        let registry = ProfileRegistry::with_dir(dir.path());
        assert!(registry.list().is_empty());
    }

    #[test]
    fn test_find_matching() {
        let dir = tempdir().unwrap();
        let mut registry = ProfileRegistry::with_dir(dir.path());
        let id = registry.save(custom("Housing Starts")).unwrap();

        let grid = Grid::from_rows(vec![
            vec![Cell::from("時間軸コード"), Cell::from("Time code")],
            vec![Cell::from("先行指数"), Cell::from("一致指数")],
        ]);
        let matches = registry.find_matching(&grid);
        assert!(matches.contains(&"cpi".to_string()));
        assert!(matches.contains(&id));
        assert!(registry.resolve(&id).is_ok());
        // Header present, but not on a row that also has 遅行指数.
        assert!(!matches.contains(&"business-cycle".to_string()));
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("CPI 2025 (総合)"), "cpi-2025-総合");
        assert_eq!(slugify("--"), "");
    }
}
