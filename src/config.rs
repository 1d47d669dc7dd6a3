// Optional per-project settings, read from <project>/.backtrack/config.json.
// Every section and field has a default, so a partial file is fine.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::audio::{GraphSpec, GuitarSpec};
use crate::generator::LlmConfig;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub sequencer: SequencerConfig,
    pub graph: GraphSpec,
    pub guitar: GuitarSpec,
    pub generator: LlmConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequencerConfig {
    pub bpm: u32,
    pub lookahead_ms: u64, // gap between a tick and the audio time its step sounds at
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self { bpm: 120, lookahead_ms: 50 }
    }
}

impl SequencerConfig {
    pub fn lookahead(&self) -> Duration {
        Duration::from_millis(self.lookahead_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::track::TrackKind;

    #[test]
    fn partial_file_fills_in_defaults() {
        let config: AppConfig = serde_json::from_str(
            r#"{ "sequencer": { "bpm": 90 },
                "generator": { "enabled": true, "timeout_secs": 5 } }"#,
        )
        .unwrap();
        assert_eq!(config.sequencer.bpm, 90);
        assert_eq!(config.sequencer.lookahead_ms, 50);
        assert!(config.generator.enabled);
        assert_eq!(config.generator.timeout_secs, 5);
        assert_eq!(config.generator.api_key_env, "OPENAI_API_KEY");
        assert_eq!(config.graph, GraphSpec::default());
    }

    #[test]
    fn graph_overrides_by_track_id() {
        let config: AppConfig = serde_json::from_str(
            r#"{ "graph": { "strips": { "kick": { "offset_db": 6.0, "bus": "reverb" } } } }"#,
        )
        .unwrap();
        let kick = config.graph.strip(TrackKind::Kick);
        assert_eq!(kick.offset_db, 6.0);
        assert_eq!(kick.filter, None);
        assert_eq!(config.graph.strip(TrackKind::Hihat).offset_db, -10.0);
        assert_eq!(config.graph.master_volume, 0.7);
    }
}
