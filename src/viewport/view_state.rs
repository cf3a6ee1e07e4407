use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Reading position of one document
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ViewState {
    pub current_page: usize,
    pub zoom: f32,
    pub saved_at: chrono::DateTime<chrono::Utc>,
}

/// View states keyed by document path, persisted as JSON
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ViewStates {
    documents: HashMap<String, ViewState>,
    #[serde(skip)]
    file_path: Option<String>,
}

impl ViewStates {
    pub fn ephemeral() -> Self {
        Self::default()
    }

    pub fn with_file(file_path: &str) -> Self {
        Self {
            documents: HashMap::new(),
            file_path: Some(file_path.to_string()),
        }
    }

    pub fn load_or_ephemeral(file_path: Option<&str>) -> Self {
        match file_path {
            Some(path) => Self::load_from_file(path).unwrap_or_else(|e| {
                log::error!("Failed to load view states from {}: {}", path, e);
                Self::with_file(path)
            }),
            None => Self::ephemeral(),
        }
    }

    pub fn load_from_file(file_path: &str) -> anyhow::Result<Self> {
        let path = Path::new(file_path);
        if path.exists() {
            let content = fs::read_to_string(path)?;
            let mut states: Self = serde_json::from_str(&content)?;
            states.file_path = Some(file_path.to_string());
            Ok(states)
        } else {
            Ok(Self::with_file(file_path))
        }
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let Some(path) = &self.file_path else {
            return Ok(());
        };
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn get(&self, document: &str) -> Option<&ViewState> {
        self.documents.get(document)
    }

    pub fn most_recent(&self) -> Option<(&str, &ViewState)> {
        self.documents
            .iter()
            .max_by_key(|(_, state)| state.saved_at)
            .map(|(path, state)| (path.as_str(), state))
    }

    /// Stores the state and writes the file when one is attached
    pub fn update(&mut self, document: &str, state: ViewState) {
        self.documents.insert(document.to_string(), state);
        if self.file_path.is_some() {
            if let Err(e) = self.save() {
                log::error!("Failed to save view state: {}", e);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn state(page: usize, zoom: f32) -> ViewState {
        ViewState {
            current_page: page,
            zoom,
            saved_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn update_persists_and_reloads() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state").join("views.json");
        let path = path.to_str().unwrap();

        let mut states = ViewStates::load_or_ephemeral(Some(path));
        states.update("/docs/a.pdf", state(12, 2.0));

        let reloaded = ViewStates::load_from_file(path).unwrap();
        let saved = reloaded.get("/docs/a.pdf").unwrap();
        assert_eq!(saved.current_page, 12);
        assert_eq!(saved.zoom, 2.0);
    }

    #[test]
    fn corrupt_file_falls_back_to_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("views.json");
        fs::write(&path, "{ not json").unwrap();

        let states = ViewStates::load_or_ephemeral(path.to_str());
        assert!(states.is_empty());
    }

    #[test]
    fn ephemeral_never_writes() {
        let mut states = ViewStates::ephemeral();
        states.update("a", state(1, 1.0));
        assert!(states.save().is_ok());
        assert_eq!(states.len(), 1);
    }

    #[test]
    fn most_recent_picks_latest() {
        let mut states = ViewStates::ephemeral();
        let mut old = state(1, 1.0);
        old.saved_at -= chrono::Duration::hours(1);
        states.update("old", old);
        states.update("new", state(2, 1.0));
        assert_eq!(states.most_recent().map(|(path, _)| path), Some("new"));
    }
}
