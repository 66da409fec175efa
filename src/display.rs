use std::collections::VecDeque;

use bevy::prelude::*;
use serde::Serialize;

use crate::map::LevelMap;

const MAX_SAVED_GRIDS: usize = 64;

pub struct DisplayPlugin;

impl Plugin for DisplayPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<Display>()
            .add_systems(Update, tick_fades.in_set(DisplaySet::Fades));
    }
}

#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub enum DisplaySet {
    Fades,
}

/// One saved frame of the play field, for scroll-back.
#[derive(Clone, Debug, Serialize)]
pub struct GridSnapshot {
    pub level: Option<u32>,
    pub rows: Vec<String>,
    pub chapter: Option<String>,
    pub status: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ActiveFade {
    pub ticket: u64,
    pub duration: u32,
    pub elapsed: u32,
}

impl ActiveFade {
    pub fn progress(&self) -> f32 {
        if self.duration == 0 {
            1.0
        } else {
            (self.elapsed as f32 / self.duration as f32).clamp(0.0, 1.0)
        }
    }
}

#[derive(Resource, Default)]
pub struct Display {
    history: VecDeque<GridSnapshot>,
    pub canvas_visible: bool,
    pub clear_count: u64,
    pub focused: bool,
    pub overlay_alpha: f32,
    active_fade: Option<ActiveFade>,
    completed: Vec<u64>,
}

impl Display {
    pub fn save_grid(&mut self, map: &LevelMap, level: Option<u32>) {
        self.history.push_back(GridSnapshot {
            level,
            rows: map.render_rows(),
            chapter: map.chapter.clone(),
            status: map.status.clone(),
        });
        while self.history.len() > MAX_SAVED_GRIDS {
            self.history.pop_front();
        }
    }

    pub fn history(&self) -> impl Iterator<Item = &GridSnapshot> {
        self.history.iter()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn clear_canvas(&mut self) {
        self.clear_count += 1;
    }

    pub fn hide_canvas(&mut self) {
        self.canvas_visible = false;
    }

    pub fn show_canvas(&mut self) {
        self.canvas_visible = true;
    }

    pub fn focus(&mut self) {
        self.focused = true;
    }

    /// Starts a fade-in tagged with `ticket`. A fade already running is
    /// dropped and will never report completion.
    pub fn fade_in(&mut self, ticket: u64, units: u32) {
        if let Some(old) = self.active_fade.take() {
            debug!(
                "[Cellblock display] Fade {} superseded by {} at {}/{}",
                old.ticket, ticket, old.elapsed, old.duration
            );
        }
        self.overlay_alpha = 1.0;
        self.active_fade = Some(ActiveFade {
            ticket,
            duration: units,
            elapsed: 0,
        });
    }

    pub fn active_fade(&self) -> Option<&ActiveFade> {
        self.active_fade.as_ref()
    }

    /// Advances the running fade by one unit.
    pub fn advance_fade(&mut self) {
        let Some(fade) = self.active_fade.as_mut() else {
            return;
        };
        fade.elapsed = fade.elapsed.saturating_add(1);
        self.overlay_alpha = 1.0 - fade.progress();
        if fade.elapsed >= fade.duration {
            self.completed.push(fade.ticket);
            self.overlay_alpha = 0.0;
            self.active_fade = None;
        }
    }

    pub fn take_completed(&mut self) -> Vec<u64> {
        std::mem::take(&mut self.completed)
    }
}

pub fn tick_fades(mut display: ResMut<Display>) {
    display.advance_fade();
}

pub fn display_state(display: &Display) -> serde_json::Value {
    serde_json::json!({
        "canvas_visible": display.canvas_visible,
        "clear_count": display.clear_count,
        "focused": display.focused,
        "saved_grids": display.history_len(),
        "active_fade": display.active_fade().map(|f| serde_json::json!({
            "ticket": f.ticket,
            "duration": f.duration,
            "elapsed": f.elapsed,
            "progress": f.progress(),
        })),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fade_completes_after_its_units() {
        let mut display = Display::default();
        display.fade_in(7, 3);
        display.advance_fade();
        display.advance_fade();
        assert!(display.take_completed().is_empty());
        assert!(display.overlay_alpha > 0.0);
        display.advance_fade();
        assert_eq!(display.take_completed(), vec![7]);
        assert!(display.active_fade().is_none());
        assert_eq!(display.overlay_alpha, 0.0);
    }

    #[test]
    fn superseded_fade_never_completes() {
        let mut display = Display::default();
        display.fade_in(1, 2);
        display.advance_fade();
        display.fade_in(2, 2);
        display.advance_fade();
        display.advance_fade();
        assert_eq!(display.take_completed(), vec![2]);
    }

    #[test]
    fn grid_history_is_bounded() {
        let mut display = Display::default();
        let map = LevelMap::new(2, 2);
        for _ in 0..(MAX_SAVED_GRIDS + 10) {
            display.save_grid(&map, Some(1));
        }
        assert_eq!(display.history_len(), MAX_SAVED_GRIDS);
    }
}
