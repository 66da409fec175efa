use std::collections::BTreeMap;

use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const PROPERTIES_BEGIN: &str = "#BEGIN_PROPERTIES#";
const PROPERTIES_END: &str = "#END_PROPERTIES#";
const EDITABLE_BEGIN: &str = "#BEGIN_EDITABLE#";
const EDITABLE_END: &str = "#END_EDITABLE#";

#[derive(Debug, Error)]
pub enum EditorError {
    #[error("no level code is loaded")]
    NothingLoaded,
    #[error("level properties are not valid JSON: {0}")]
    MalformedProperties(#[from] serde_json::Error),
    #[error("properties block is not terminated")]
    UnterminatedProperties,
    #[error("editable region markers are unbalanced at line {line}")]
    UnbalancedRegions { line: usize },
    #[error("code outside the editable regions was changed")]
    ScaffoldingModified,
}

/// Metadata a level file declares about itself.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LevelProperties {
    pub commands_introduced: Vec<String>,
    pub items_introduced: Vec<String>,
    pub music: Option<String>,
    pub map_properties: serde_json::Value,
}

/// Holds the current level's code, split into fixed scaffolding and the
/// regions the player may edit.
#[derive(Resource, Default)]
pub struct CodeEditor {
    level: Option<u32>,
    code: String,
    scaffolding: Vec<String>,
    properties: LevelProperties,
    good_states: BTreeMap<u32, String>,
}

impl CodeEditor {
    /// Replaces the editor content with a freshly fetched level file.
    pub fn load_code(&mut self, level: u32, text: &str) -> Result<(), EditorError> {
        let (properties, code) = split_properties(text)?;
        let scaffolding = scaffolding_of(&code)?;
        self.level = Some(level);
        self.properties = properties;
        self.scaffolding = scaffolding;
        self.code = code;
        Ok(())
    }

    /// Replaces the code of the loaded level, refusing edits to the scaffolding.
    pub fn set_code(&mut self, text: &str) -> Result<(), EditorError> {
        if self.level.is_none() {
            return Err(EditorError::NothingLoaded);
        }
        let scaffolding = scaffolding_of(text)?;
        if scaffolding != self.scaffolding {
            return Err(EditorError::ScaffoldingModified);
        }
        self.code = text.to_string();
        Ok(())
    }

    pub fn get_code(&self) -> &str {
        &self.code
    }

    pub fn get_player_code(&self) -> String {
        let mut inside = false;
        let mut lines = Vec::new();
        for line in self.code.lines() {
            if line.contains(EDITABLE_BEGIN) {
                inside = true;
            } else if line.contains(EDITABLE_END) {
                inside = false;
            } else if inside {
                lines.push(line);
            }
        }
        lines.join("\n")
    }

    pub fn get_properties(&self) -> &LevelProperties {
        &self.properties
    }

    pub fn level(&self) -> Option<u32> {
        self.level
    }

    pub fn save_good_state(&mut self) {
        if let Some(level) = self.level {
            self.good_states.insert(level, self.code.clone());
        }
    }

    pub fn good_state(&self, level: u32) -> Option<&str> {
        self.good_states.get(&level).map(String::as_str)
    }
}

fn split_properties(text: &str) -> Result<(LevelProperties, String), EditorError> {
    let Some(start) = text.find(PROPERTIES_BEGIN) else {
        return Ok((LevelProperties::default(), text.to_string()));
    };
    let body_start = start + PROPERTIES_BEGIN.len();
    let Some(body_len) = text[body_start..].find(PROPERTIES_END) else {
        return Err(EditorError::UnterminatedProperties);
    };
    let body = text[body_start..body_start + body_len].trim();
    let properties = if body.is_empty() {
        LevelProperties::default()
    } else {
        serde_json::from_str(body)?
    };

    // Only the block itself goes; code sharing a line with a marker stays.
    let before = text[..start].trim_end_matches([' ', '\t']);
    let after =
        text[body_start + body_len + PROPERTIES_END.len()..].trim_start_matches([' ', '\t']);
    let after = after
        .strip_prefix("\r\n")
        .or_else(|| after.strip_prefix('\n'))
        .unwrap_or(after);
    let code = if before.is_empty() || before.ends_with('\n') {
        format!("{before}{after}")
    } else {
        format!("{before}\n{after}")
    };
    Ok((properties, code))
}

fn scaffolding_of(code: &str) -> Result<Vec<String>, EditorError> {
    let mut inside = false;
    let mut fixed = Vec::new();
    for (idx, line) in code.lines().enumerate() {
        if line.contains(EDITABLE_BEGIN) {
            if inside {
                return Err(EditorError::UnbalancedRegions { line: idx + 1 });
            }
            inside = true;
            fixed.push(line.trim_end().to_string());
        } else if line.contains(EDITABLE_END) {
            if !inside {
                return Err(EditorError::UnbalancedRegions { line: idx + 1 });
            }
            inside = false;
            fixed.push(line.trim_end().to_string());
        } else if !inside {
            fixed.push(line.trim_end().to_string());
        }
    }
    if inside {
        return Err(EditorError::UnbalancedRegions {
            line: code.lines().count(),
        });
    }
    Ok(fixed)
}
