use std::collections::VecDeque;

use bevy::prelude::*;
use serde::Serialize;

const MAX_EVENTS: usize = 500;

#[derive(Serialize, Clone, Debug)]
pub struct LevelEvent {
    pub seq: u64,
    pub name: String,
    pub level: Option<u32>,
    pub data: serde_json::Value,
    pub frame: u64,
}

/// Bounded record of what the level lifecycle did, newest last.
#[derive(Resource, Default)]
pub struct LevelEventLog {
    pub recent: VecDeque<LevelEvent>,
    pub frame: u64,
    pub dropped_events: u64,
    next_seq: u64,
}

impl LevelEventLog {
    pub fn emit(&mut self, name: impl Into<String>, level: Option<u32>, data: serde_json::Value) {
        if self.recent.len() == MAX_EVENTS {
            self.recent.pop_front();
            self.dropped_events += 1;
            if self.dropped_events == 1 || self.dropped_events % 100 == 0 {
                warn!(
                    "[Cellblock events] Event log full; {} oldest events dropped so far",
                    self.dropped_events
                );
            }
        }
        self.next_seq += 1;
        self.recent.push_back(LevelEvent {
            seq: self.next_seq,
            name: name.into(),
            level,
            data,
            frame: self.frame,
        });
    }

    pub fn since(&self, seq: u64) -> Vec<LevelEvent> {
        self.recent.iter().filter(|e| e.seq > seq).cloned().collect()
    }

    pub fn count(&self, name: &str) -> usize {
        self.recent.iter().filter(|e| e.name == name).count()
    }

    pub fn last_named(&self, name: &str) -> Option<&LevelEvent> {
        self.recent.iter().rev().find(|e| e.name == name)
    }
}

pub struct LevelEventsPlugin;

impl Plugin for LevelEventsPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<LevelEventLog>()
            .add_systems(First, tick_event_frame);
    }
}

fn tick_event_frame(mut log: ResMut<LevelEventLog>) {
    log.frame = log.frame.saturating_add(1);
}
