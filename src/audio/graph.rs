//! The fixed mixing topology: every instrument gets a strip (filter, then
//! gain) that feeds one shared bus; buses run their effect and sum into the
//! master gain. The shape is described by a serde [`GraphSpec`] and built once
//! with [`EffectGraph::build`]; afterwards only gains change.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::effect::{Effect, EffectSpec, Filter, FilterSpec};
use super::frame::{apply_gain, StereoFrame};
use crate::pipeline::instrument::{db_to_gain, gain_to_db};
use crate::pipeline::track::TrackKind;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusId {
    Dry,
    Reverb,
    Delay,
    Chorus,
}

impl BusId {
    pub const ALL: [BusId; 4] = [BusId::Dry, BusId::Reverb, BusId::Delay, BusId::Chorus];
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct StripSpec {
    pub offset_db: f32,
    #[serde(default)]
    pub filter: Option<FilterSpec>,
    pub bus: BusId,
}

impl StripSpec {
    pub fn default_for(kind: TrackKind) -> Self {
        let (offset_db, filter, bus) = match kind {
            TrackKind::Kick => (3.0, FilterSpec::low_pass(4000.0), BusId::Dry),
            TrackKind::Snare => (0.0, FilterSpec::high_pass(200.0), BusId::Dry),
            TrackKind::Hihat => (-10.0, FilterSpec::high_pass(6000.0), BusId::Dry),
            TrackKind::Bass => (0.0, FilterSpec::low_pass(1200.0), BusId::Dry),
            TrackKind::Piano => (0.0, FilterSpec::low_pass(6000.0), BusId::Reverb),
            TrackKind::Pad => (0.0, FilterSpec::low_pass(3000.0), BusId::Chorus),
            TrackKind::Lead => (-2.0, FilterSpec::low_pass(5000.0), BusId::Delay),
        };
        Self { offset_db, filter: Some(filter), bus }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphSpec {
    pub strips: BTreeMap<TrackKind, StripSpec>,
    pub buses: BTreeMap<BusId, EffectSpec>, // Dry has no entry
    pub master_volume: f32,
}

impl Default for GraphSpec {
    fn default() -> Self {
        let strips = TrackKind::ALL
            .into_iter()
            .map(|kind| (kind, StripSpec::default_for(kind)))
            .collect();
        let buses = BTreeMap::from([
            (BusId::Reverb, EffectSpec::Reverb { decay: 3.0, pre_delay: 0.1, wet: 0.3 }),
            (BusId::Delay, EffectSpec::Delay { time: 0.25, feedback: 0.3, wet: 0.25 }),
            (BusId::Chorus, EffectSpec::Chorus { rate: 1.5, depth: 0.5, wet: 0.4 }),
        ]);
        Self { strips, buses, master_volume: 0.7 }
    }
}

impl GraphSpec {
    /// Strip settings for `kind`, falling back to the built-in ones when the
    /// config leaves it out.
    pub fn strip(&self, kind: TrackKind) -> StripSpec {
        self.strips.get(&kind).copied().unwrap_or_else(|| StripSpec::default_for(kind))
    }
}

struct Strip {
    filter: Option<Filter>,
    gain: f32,
    bus: usize, // index into EffectGraph::buses
}

struct Bus {
    effect: Option<Box<dyn Effect>>,
    buf: Vec<StereoFrame>,
}

pub struct EffectGraph {
    strips: Vec<Strip>, // indexed by TrackKind::index
    buses: Vec<Bus>,    // in BusId::ALL order
    master_gain: f32,
}

impl EffectGraph {
    pub fn build(spec: &GraphSpec, sample_rate: f32, max_block: usize) -> Self {
        let buses = BusId::ALL
            .into_iter()
            .map(|id| Bus {
                effect: match id {
                    BusId::Dry => None,
                    _ => spec.buses.get(&id).map(|e| e.to_effect(sample_rate)),
                },
                buf: vec![StereoFrame::zero(); max_block],
            })
            .collect();
        let strips = TrackKind::ALL
            .into_iter()
            .map(|kind| {
                let s = spec.strip(kind);
                Strip {
                    filter: s.filter.map(|f| Filter::new(f, sample_rate)),
                    gain: db_to_gain(s.offset_db + gain_to_db(kind.default_volume())),
                    bus: BusId::ALL.iter().position(|b| *b == s.bus).unwrap_or(0),
                }
            })
            .collect();
        Self {
            strips,
            buses,
            master_gain: spec.master_volume.clamp(0.0, 1.0),
        }
    }

    pub fn set_strip_gain_db(&mut self, kind: TrackKind, gain_db: f32) {
        self.strips[kind.index()].gain = db_to_gain(gain_db);
    }

    pub fn set_master_gain(&mut self, gain: f32) {
        self.master_gain = gain.clamp(0.0, 1.0);
    }

    pub fn master_gain(&self) -> f32 {
        self.master_gain
    }

    /// Run one block. `inputs[kind.index()]` holds that instrument's raw
    /// output and is filtered in place; the mix is added into `out`.
    pub fn process(&mut self, inputs: &mut [Vec<StereoFrame>], out: &mut [StereoFrame]) {
        let n = out.len();
        for bus in self.buses.iter_mut() {
            if bus.buf.len() < n {
                bus.buf.resize(n, StereoFrame::zero());
            }
            bus.buf[..n].fill(StereoFrame::zero());
        }

        for (strip, input) in self.strips.iter_mut().zip(inputs.iter_mut()) {
            let input = &mut input[..n];
            if let Some(filter) = strip.filter.as_mut() {
                filter.process(input);
            }
            let bus = &mut self.buses[strip.bus].buf;
            for (b, x) in bus.iter_mut().zip(input.iter()) {
                *b += *x * strip.gain;
            }
        }

        for bus in self.buses.iter_mut() {
            let buf = &mut bus.buf[..n];
            if let Some(effect) = bus.effect.as_mut() {
                effect.process(buf);
            }
            for (o, x) in out.iter_mut().zip(buf.iter()) {
                *o += *x;
            }
        }

        apply_gain(out, self.master_gain);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn inputs(n: usize) -> Vec<Vec<StereoFrame>> {
        vec![vec![StereoFrame::zero(); n]; TrackKind::COUNT]
    }

    #[test]
    fn default_offsets_and_routing() {
        let spec = GraphSpec::default();
        assert_eq!(spec.strip(TrackKind::Kick).offset_db, 3.0);
        assert_eq!(spec.strip(TrackKind::Hihat).offset_db, -10.0);
        assert_eq!(spec.strip(TrackKind::Lead).offset_db, -2.0);
        assert_eq!(spec.strip(TrackKind::Piano).bus, BusId::Reverb);
        assert_eq!(spec.master_volume, 0.7);
    }

    #[test]
    fn missing_strips_fall_back_to_defaults() {
        let spec: GraphSpec = serde_json::from_str(r#"{ "master_volume": 0.5 }"#).unwrap();
        assert_eq!(spec.strip(TrackKind::Kick), StripSpec::default_for(TrackKind::Kick));
        assert_eq!(spec.master_volume, 0.5);
    }

    #[test]
    fn silence_in_silence_out() {
        let mut graph = EffectGraph::build(&GraphSpec::default(), 48_000.0, 256);
        let mut ins = inputs(256);
        let mut out = vec![StereoFrame::zero(); 256];
        graph.process(&mut ins, &mut out);
        assert!(out.iter().all(|f| *f == StereoFrame::zero()));
    }

    #[test]
    fn dry_strip_applies_gain_and_master() {
        let mut spec = GraphSpec::default();
        spec.strips.insert(
            TrackKind::Snare,
            StripSpec { offset_db: 0.0, filter: None, bus: BusId::Dry },
        );
        let mut graph = EffectGraph::build(&spec, 48_000.0, 64);
        graph.set_strip_gain_db(TrackKind::Snare, gain_to_db(0.5));
        graph.set_master_gain(0.5);
        let mut ins = inputs(64);
        ins[TrackKind::Snare.index()].fill(StereoFrame::mono(1.0));
        let mut out = vec![StereoFrame::zero(); 64];
        graph.process(&mut ins, &mut out);
        assert_relative_eq!(out[10].left, 0.25, epsilon = 1e-6);
    }

    #[test]
    fn master_gain_is_clamped() {
        let mut graph = EffectGraph::build(&GraphSpec::default(), 48_000.0, 64);
        graph.set_master_gain(3.0);
        assert_eq!(graph.master_gain(), 1.0);
    }

    #[test]
    fn grows_past_the_preallocated_block() {
        let mut graph = EffectGraph::build(&GraphSpec::default(), 48_000.0, 16);
        let mut ins = inputs(128);
        let mut out = vec![StereoFrame::zero(); 128];
        graph.process(&mut ins, &mut out);
        assert_eq!(out.len(), 128);
    }
}
