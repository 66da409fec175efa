use bevy::prelude::*;
use serde::Serialize;

use crate::config::GameConfig;

const MAX_AUDIO_EVENTS: usize = 256;

pub const CUE_STATIC: &str = "static";
pub const CUE_BLIP: &str = "blip";
pub const CUE_COMPLETE: &str = "complete";
pub const CUE_PICKUP: &str = "pickup";

#[derive(Clone, Debug, Serialize)]
pub struct AudioEventLog {
    pub frame: u64,
    #[serde(rename = "type")]
    pub event_type: String,
    pub name: String,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<u32>,
    pub muted: bool,
}

#[derive(Clone, Serialize)]
pub struct AudioStateSnapshot {
    pub current_track: Option<String>,
    pub muted: bool,
    pub tracks: Vec<String>,
    pub recent_events: Vec<AudioEventLog>,
}

/// Fire-and-forget playback. Every request is recorded, muted or not, so the
/// lifecycle's cue ordering stays observable.
#[derive(Resource)]
pub struct AudioManager {
    pub tracks: Vec<String>,
    pub cues: Vec<String>,
    pub current_track: Option<String>,
    pub muted: bool,
    pub frame: u64,
    pub recent_events: Vec<AudioEventLog>,
}

impl Default for AudioManager {
    fn default() -> Self {
        Self {
            tracks: Vec::new(),
            cues: [CUE_STATIC, CUE_BLIP, CUE_COMPLETE, CUE_PICKUP]
                .iter()
                .map(|c| c.to_string())
                .collect(),
            current_track: None,
            muted: false,
            frame: 0,
            recent_events: Vec::new(),
        }
    }
}

impl AudioManager {
    pub fn from_config(config: &GameConfig) -> Self {
        Self {
            tracks: config.music_tracks.clone(),
            muted: config.debug_mode,
            ..Self::default()
        }
    }

    pub fn snapshot(&self) -> AudioStateSnapshot {
        AudioStateSnapshot {
            current_track: self.current_track.clone(),
            muted: self.muted,
            tracks: self.tracks.clone(),
            recent_events: self.recent_events.clone(),
        }
    }

    pub fn play_sfx(&mut self, name: &str) {
        if !self.cues.iter().any(|c| c == name) {
            warn!("[Cellblock audio] Unknown cue '{name}'");
            return;
        }
        self.push_event("sfx", name.to_string(), "play", None);
    }

    /// Starts `name` if it is a known track, otherwise falls back to the
    /// level's numbered track.
    pub fn play_track_by_name(&mut self, level: u32, name: &str) {
        if self.tracks.iter().any(|t| t == name) {
            self.start_track(level, name.to_string());
        } else {
            warn!("[Cellblock audio] Unknown track '{name}' for level {level}");
            self.play_track_by_num(level);
        }
    }

    pub fn play_track_by_num(&mut self, level: u32) {
        if self.tracks.is_empty() {
            return;
        }
        let index = (level.max(1) as usize - 1) % self.tracks.len();
        let track = self.tracks[index].clone();
        self.start_track(level, track);
    }

    pub fn count_played(&self, cue: &str) -> usize {
        self.recent_events
            .iter()
            .filter(|e| e.event_type == "sfx" && e.name == cue)
            .count()
    }

    fn start_track(&mut self, level: u32, name: String) {
        if self.current_track.as_deref() == Some(name.as_str()) {
            return;
        }
        self.current_track = Some(name.clone());
        self.push_event("music", name, "start", Some(level));
    }

    fn push_event(&mut self, event_type: &str, name: String, action: &str, level: Option<u32>) {
        self.recent_events.push(AudioEventLog {
            frame: self.frame,
            event_type: event_type.to_string(),
            name,
            action: action.to_string(),
            level,
            muted: self.muted,
        });
        if self.recent_events.len() > MAX_AUDIO_EVENTS {
            let excess = self.recent_events.len() - MAX_AUDIO_EVENTS;
            self.recent_events.drain(0..excess);
        }
    }
}

pub struct AudioPlugin;

impl Plugin for AudioPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(First, tick_audio_frame);
    }
}

fn tick_audio_frame(audio: Option<ResMut<AudioManager>>) {
    if let Some(mut audio) = audio {
        audio.frame = audio.frame.saturating_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> AudioManager {
        AudioManager {
            tracks: vec!["a".into(), "b".into(), "c".into()],
            ..AudioManager::default()
        }
    }

    #[test]
    fn play_sfx_records_event() {
        let mut audio = manager();
        audio.frame = 10;
        audio.play_sfx(CUE_BLIP);
        audio.play_sfx("nonsense");

        assert_eq!(audio.recent_events.len(), 1);
        let ev = &audio.recent_events[0];
        assert_eq!(ev.event_type, "sfx");
        assert_eq!(ev.name, CUE_BLIP);
        assert_eq!(ev.frame, 10);
        assert_eq!(audio.count_played(CUE_BLIP), 1);
    }

    #[test]
    fn numbered_tracks_wrap_around() {
        let mut audio = manager();
        audio.play_track_by_num(1);
        assert_eq!(audio.current_track.as_deref(), Some("a"));
        audio.play_track_by_num(5);
        assert_eq!(audio.current_track.as_deref(), Some("b"));
        audio.play_track_by_num(3);
        assert_eq!(audio.current_track.as_deref(), Some("c"));
    }

    #[test]
    fn unknown_named_track_falls_back_to_number() {
        let mut audio = manager();
        audio.play_track_by_name(2, "c");
        assert_eq!(audio.current_track.as_deref(), Some("c"));
        audio.play_track_by_name(2, "missing");
        assert_eq!(audio.current_track.as_deref(), Some("b"));
    }

    #[test]
    fn replaying_current_track_is_not_restarted() {
        let mut audio = manager();
        audio.play_track_by_num(1);
        audio.play_track_by_num(1);
        assert_eq!(
            audio
                .recent_events
                .iter()
                .filter(|e| e.action == "start")
                .count(),
            1
        );
    }
}
