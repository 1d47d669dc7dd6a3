//! The voice-agent boundary: a transcribed request in, a spoken-style reply
//! (and the preset to load) out. Never fails; problems become the apology.

use crate::generator::PresetGenerator;
use crate::pipeline::preset::Preset;

pub const APOLOGY: &str = "I'm sorry, I had trouble creating that backing track. \
                           Could you try describing what style of music you'd like again?";

#[derive(Clone, Debug, PartialEq)]
pub struct AgentReply {
    pub message: String,
    pub preset: Option<Preset>,
}

impl AgentReply {
    fn apology() -> Self {
        Self { message: APOLOGY.to_string(), preset: None }
    }
}

pub fn confirmation(preset: &Preset) -> String {
    format!(
        "I've created a custom backing track called \"{}\" for you. {} It's set to {} BPM. \
         The preset has been loaded and is ready to play!",
        preset.name, preset.description, preset.bpm
    )
}

pub struct VoiceAgent<G> {
    generator: G,
}

impl<G: PresetGenerator> VoiceAgent<G> {
    pub fn new(generator: G) -> Self {
        Self { generator }
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    pub fn respond(&self, utterance: &str) -> AgentReply {
        let utterance = utterance.trim();
        if utterance.is_empty() {
            return AgentReply::apology();
        }
        match self.generator.generate(utterance) {
            Ok(preset) => AgentReply { message: confirmation(&preset), preset: Some(preset) },
            Err(e) => {
                log::warn!(target: "generator", "voice request {utterance:?} failed: {e:#}");
                AgentReply::apology()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::{FallbackGenerator, PatternGenerator};

    struct Failing;

    impl PresetGenerator for Failing {
        fn generate(&self, _: &str) -> anyhow::Result<Preset> {
            anyhow::bail!("upstream returned 500")
        }
    }

    #[test]
    fn confirms_with_name_description_and_bpm() {
        let agent = VoiceAgent::new(PatternGenerator::default());
        let reply = agent.respond("give me some jazz");
        assert_eq!(
            reply.message,
            "I've created a custom backing track called \"Jazz Backing Track\" for you. \
             Generated jazz backing track at 110 BPM It's set to 110 BPM. \
             The preset has been loaded and is ready to play!"
        );
        assert_eq!(reply.preset.unwrap().bpm, 110);
    }

    #[test]
    fn failure_becomes_apology() {
        let reply = VoiceAgent::new(Failing).respond("rock");
        assert_eq!(reply.message, APOLOGY);
        assert!(reply.preset.is_none());
    }

    #[test]
    fn empty_utterance_is_apology() {
        let reply = VoiceAgent::new(PatternGenerator::default()).respond("   ");
        assert_eq!(reply, AgentReply::apology());
    }

    #[test]
    fn fallback_generator_never_apologises() {
        let agent = VoiceAgent::new(FallbackGenerator::with_primary(Failing));
        let reply = agent.respond("a slow ballad");
        assert!(reply.message.contains("Slow Backing Track"));
    }
}
