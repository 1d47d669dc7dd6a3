//! One sound generator per track kind. The bank turns `(kind, note, time)`
//! into an `AudioCommand::Trigger` and owns the only write path to each
//! instrument's gain on the audio side.

use thiserror::Error;

use crate::audio::GraphSpec;
use crate::audio_api::{AudioCommand, AudioError, AudioSink, AudioTime, TriggerParams};
use crate::pipeline::note::{self, InvalidPitch, Pitch};
use crate::pipeline::track::TrackKind;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TriggerError {
    #[error("no instrument for track {0:?}")]
    NoInstrument(TrackKind),
    #[error(transparent)]
    InvalidNote(#[from] InvalidPitch),
    #[error("could not reach the audio engine: {0}")]
    Audio(#[from] AudioError),
}

/// How an instrument reads the note text of a step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Voicing {
    Pitched,
    Chord,
    Unpitched(&'static str), // fixed pitch, the step's note is ignored
}

/// Note length in beats.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum NoteLength {
    Sixteenth,
    Eighth,
    Quarter,
    Half,
}

impl NoteLength {
    pub fn beats(self) -> f32 {
        match self {
            NoteLength::Sixteenth => 0.25,
            NoteLength::Eighth => 0.5,
            NoteLength::Quarter => 1.0,
            NoteLength::Half => 2.0,
        }
    }

    pub fn seconds(self, bpm: u32) -> f32 {
        self.beats() * 60.0 / bpm.max(1) as f32
    }
}

pub fn gain_to_db(gain: f32) -> f32 {
    if gain <= 0.0 { f32::NEG_INFINITY } else { 20.0 * gain.log10() }
}

pub fn db_to_gain(db: f32) -> f32 {
    if db == f32::NEG_INFINITY { 0.0 } else { 10f32.powf(db / 20.0) }
}

#[derive(Clone, Debug)]
struct Instrument {
    kind: TrackKind,
    voicing: Voicing,
    length: NoteLength,
    base_offset_db: f32,
    volume: f32,
}

impl Instrument {
    fn for_kind(kind: TrackKind, base_offset_db: f32) -> Self {
        let (voicing, length) = match kind {
            TrackKind::Kick => (Voicing::Pitched, NoteLength::Eighth),
            TrackKind::Snare => (Voicing::Unpitched("D2"), NoteLength::Eighth),
            TrackKind::Hihat => (Voicing::Unpitched("C4"), NoteLength::Sixteenth),
            TrackKind::Bass => (Voicing::Pitched, NoteLength::Quarter),
            TrackKind::Piano => (Voicing::Chord, NoteLength::Eighth),
            TrackKind::Pad => (Voicing::Chord, NoteLength::Half),
            TrackKind::Lead => (Voicing::Pitched, NoteLength::Eighth),
        };
        Self {
            kind,
            voicing,
            length,
            base_offset_db,
            volume: kind.default_volume(),
        }
    }

    fn effective_gain_db(&self) -> f32 {
        self.base_offset_db + gain_to_db(self.volume)
    }

    /// `Ok(None)` means "nothing to play" (unknown chord symbol).
    fn resolve(&self, note: &str) -> Result<Option<Vec<f32>>, InvalidPitch> {
        match self.voicing {
            Voicing::Pitched => Ok(Some(vec![note.parse::<Pitch>()?.frequency()])),
            Voicing::Chord => Ok(note::chord_frequencies(note)),
            Voicing::Unpitched(fixed) => Ok(Some(vec![fixed.parse::<Pitch>()?.frequency()])),
        }
    }
}

pub struct InstrumentBank<S: AudioSink> {
    sink: S,
    instruments: Vec<Instrument>,
    bpm: u32,
    master_volume: f32,
}

impl<S: AudioSink> InstrumentBank<S> {
    /// Voicing and note length are fixed here, once per kind.
    pub fn new(sink: S, graph: &GraphSpec, bpm: u32) -> Self {
        let instruments = TrackKind::ALL
            .into_iter()
            .map(|kind| Instrument::for_kind(kind, graph.strip(kind).offset_db))
            .collect();
        Self {
            sink,
            instruments,
            bpm,
            master_volume: graph.master_volume,
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn now(&self) -> AudioTime {
        self.sink.now()
    }

    pub fn set_tempo(&mut self, bpm: u32) {
        self.bpm = bpm;
    }

    fn instrument(&self, kind: TrackKind) -> Option<&Instrument> {
        self.instruments.iter().find(|i| i.kind == kind)
    }

    /// Sound a note (or chord) on `kind`. `at == None` plays immediately.
    pub fn trigger(
        &self,
        kind: TrackKind,
        note: &str,
        at: Option<AudioTime>,
    ) -> Result<(), TriggerError> {
        let instrument = self.instrument(kind).ok_or(TriggerError::NoInstrument(kind))?;
        let Some(pitches) = instrument.resolve(note)? else {
            log::trace!(target: "session", "{}: unknown chord {:?}, skipped", kind.id(), note);
            return Ok(());
        };
        self.sink.send(AudioCommand::Trigger(TriggerParams {
            instrument: kind,
            pitches,
            duration: instrument.length.seconds(self.bpm),
            at,
        }))?;
        Ok(())
    }

    pub fn effective_gain_db(&self, kind: TrackKind) -> Option<f32> {
        self.instrument(kind).map(Instrument::effective_gain_db)
    }

    /// The single writer of an instrument's gain.
    pub fn set_volume(&mut self, kind: TrackKind, volume: f32) -> Result<(), TriggerError> {
        let instrument = self
            .instruments
            .iter_mut()
            .find(|i| i.kind == kind)
            .ok_or(TriggerError::NoInstrument(kind))?;
        instrument.volume = volume.clamp(0.0, 1.0);
        let gain_db = instrument.effective_gain_db();
        self.sink.send(AudioCommand::SetInstrumentGain { instrument: kind, gain_db })?;
        Ok(())
    }

    pub fn master_volume(&self) -> f32 {
        self.master_volume
    }

    pub fn set_master_volume(&mut self, volume: f32) -> Result<(), AudioError> {
        self.master_volume = volume.clamp(0.0, 1.0);
        self.sink.send(AudioCommand::SetMasterGain(self.master_volume))
    }

    pub fn cancel_scheduled(&self) -> Result<(), AudioError> {
        self.sink.send(AudioCommand::CancelScheduled)
    }
}
