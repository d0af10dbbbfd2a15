// Trail project models
// Shape of project.json as published in the storage bucket

use serde::{Deserialize, Serialize};
use indexmap::IndexMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrailError {
    #[error("failed to read project file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse project: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("attraction not found: {0}")]
    UnknownAttraction(String),
}

/// A published project (one place with one or more trails)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Project {
    pub name: String,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub trails: IndexMap<String, Trail>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Trail {
    #[serde(default)]
    pub attractions: IndexMap<String, Attraction>,
}

/// A stop on a trail: narration, pictures and a map pin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Attraction {
    pub name: String,
    // The bucket data spells it "Lattitude"
    #[serde(rename = "Lattitude", alias = "Latitude", default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_extension: Option<String>,
}

impl Attraction {
    /// Files to fetch for offline use: images first, then narration
    pub fn media_files(&self) -> Vec<&str> {
        self.images
            .iter()
            .map(String::as_str)
            .chain(self.audio.as_deref())
            .collect()
    }
}

impl Project {
    pub fn from_json(json: &str) -> Result<Self, TrailError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self, TrailError> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// The trail shown on the map (first in the document)
    pub fn first_trail(&self) -> Option<&Trail> {
        self.trails.values().next()
    }

    /// Every attraction of every trail, keyed by attraction key
    pub fn attractions(&self) -> impl Iterator<Item = (&str, &Attraction)> {
        self.trails
            .values()
            .flat_map(|trail| trail.attractions.iter())
            .map(|(key, attraction)| (key.as_str(), attraction))
    }

    pub fn attraction(&self, key: &str) -> Result<&Attraction, TrailError> {
        self.trails
            .values()
            .find_map(|trail| trail.attractions.get(key))
            .ok_or_else(|| TrailError::UnknownAttraction(key.to_string()))
    }
}
