//! Turning a free-text description into a preset. The LLM path is optional;
//! whatever happens there, [`FallbackGenerator`] always comes back with a
//! playable preset from the deterministic patterns.

use crossbeam_channel::Sender;

use crate::pipeline::preset::Preset;

pub mod classify;
pub mod llm;

pub use classify::{Style, StyleClassifier};
pub use llm::{GenerateError, LlmConfig, LlmGenerator};

pub trait PresetGenerator {
    fn generate(&self, description: &str) -> anyhow::Result<Preset>;
}

/// Keyword classification into one of the fixed patterns. Never fails.
#[derive(Clone, Copy, Debug, Default)]
pub struct PatternGenerator {
    classifier: StyleClassifier,
}

impl PatternGenerator {
    pub fn preset_for(&self, description: &str) -> Preset {
        classify::pattern_preset(self.classifier.classify(description))
    }
}

impl PresetGenerator for PatternGenerator {
    fn generate(&self, description: &str) -> anyhow::Result<Preset> {
        Ok(self.preset_for(description))
    }
}

pub struct FallbackGenerator<P = LlmGenerator> {
    primary: Option<P>,
    patterns: PatternGenerator,
}

impl FallbackGenerator<LlmGenerator> {
    /// The LLM is only used when enabled and its API key is present.
    pub fn from_config(config: &LlmConfig) -> Self {
        if !config.enabled {
            return Self::patterns_only();
        }
        match LlmGenerator::new(config) {
            Ok(llm) => {
                log::info!(target: "generator", "using {} at {}", config.model, config.endpoint);
                Self::with_primary(llm)
            }
            Err(e) => {
                log::warn!(target: "generator", "LLM disabled: {e}");
                Self::patterns_only()
            }
        }
    }
}

impl<P: PresetGenerator> FallbackGenerator<P> {
    pub fn with_primary(primary: P) -> Self {
        Self { primary: Some(primary), patterns: PatternGenerator::default() }
    }

    pub fn patterns_only() -> Self {
        Self { primary: None, patterns: PatternGenerator::default() }
    }

    pub fn generate_or_fallback(&self, description: &str) -> Preset {
        if let Some(primary) = &self.primary {
            match primary.generate(description) {
                Ok(preset) => {
                    log::info!(target: "generator", "generated {:?}", preset.name);
                    return preset;
                }
                Err(e) => {
                    log::warn!(target: "generator", "generation failed, using patterns: {e:#}")
                }
            }
        }
        self.patterns.preset_for(description)
    }
}

impl<P: PresetGenerator> PresetGenerator for FallbackGenerator<P> {
    fn generate(&self, description: &str) -> anyhow::Result<Preset> {
        Ok(self.generate_or_fallback(description))
    }
}

/// Run `job` on its own thread; the result arrives on `done` exactly once.
pub fn spawn_job<T, F>(done: Sender<T>, job: F) -> std::io::Result<()>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    std::thread::Builder::new()
        .name("generator".to_string())
        .spawn(move || {
            let _ = done.send(job());
        })
        .map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    struct Broken;

    impl PresetGenerator for Broken {
        fn generate(&self, _: &str) -> anyhow::Result<Preset> {
            anyhow::bail!("model returned nonsense")
        }
    }

    struct Fixed(Preset);

    impl PresetGenerator for Fixed {
        fn generate(&self, _: &str) -> anyhow::Result<Preset> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn falls_back_when_primary_fails() {
        let generator = FallbackGenerator::with_primary(Broken);
        let preset = generator.generate_or_fallback("slow blues");
        assert_eq!(preset.bpm, 75);
        assert_eq!(preset.name, "Slow Backing Track");
    }

    #[test]
    fn primary_result_wins() {
        let custom = Preset::new("Mine", "hand made", 90);
        let generator = FallbackGenerator::with_primary(Fixed(custom.clone()));
        assert_eq!(generator.generate("rock").unwrap(), custom);
    }

    #[test]
    fn disabled_config_uses_patterns() {
        let generator = FallbackGenerator::from_config(&LlmConfig::default());
        assert!(generator.primary.is_none());
        assert_eq!(generator.generate_or_fallback("jazz").bpm, 110);
    }

    #[test]
    fn job_reports_once() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        spawn_job(tx, || PatternGenerator::default().preset_for("metal")).unwrap();
        let preset = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(preset.bpm, 140);
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    }
}
