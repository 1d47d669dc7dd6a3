// Pitch names and chord symbols -> frequencies (equal temperament, A4 = 440 Hz)

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

const A4_HZ: f32 = 440.0;
const A4_MIDI: i32 = 69;

const CHORDS: [(&str, [&str; 3]); 8] = [
    ("C", ["C4", "E4", "G4"]),
    ("Dm", ["D4", "F4", "A4"]),
    ("Em", ["E4", "G4", "B4"]),
    ("F", ["F4", "A4", "C5"]),
    ("G", ["G4", "B4", "D5"]),
    ("Am", ["A4", "C5", "E5"]),
    ("Bdim", ["B4", "D5", "F5"]),
    ("C5", ["C5", "E5", "G5"]),
];

const NAMES: [&str; 12] = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];

#[derive(Debug, Error, PartialEq, Eq)]
#[error("not a pitch name: {0:?}")]
pub struct InvalidPitch(pub String);

/// A single pitch such as `C1`, `F#3` or `Bb4`, stored as a MIDI note number.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Pitch(i32);

impl Pitch {
    pub fn midi(self) -> i32 {
        self.0
    }

    pub fn frequency(self) -> f32 {
        A4_HZ * 2f32.powf((self.0 - A4_MIDI) as f32 / 12.0)
    }
}

impl FromStr for Pitch {
    type Err = InvalidPitch;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidPitch(s.to_string());
        let mut chars = s.chars();
        let letter = chars.next().ok_or_else(invalid)?.to_ascii_uppercase();
        let base = match letter {
            'C' => 0,
            'D' => 2,
            'E' => 4,
            'F' => 5,
            'G' => 7,
            'A' => 9,
            'B' => 11,
            _ => return Err(invalid()),
        };
        let rest = chars.as_str();
        let (accidental, octave) = match rest.chars().next() {
            Some('#') => (1, &rest[1..]),
            Some('b') => (-1, &rest[1..]),
            _ => (0, rest),
        };
        if octave.is_empty() || !octave.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        let octave: i32 = octave.parse().map_err(|_| invalid())?;
        if octave > 9 {
            return Err(invalid());
        }
        Ok(Self((octave + 1) * 12 + base + accidental))
    }
}

impl fmt::Display for Pitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = NAMES[self.0.rem_euclid(12) as usize];
        write!(f, "{}{}", name, self.0.div_euclid(12) - 1)
    }
}

/// Pitch names of a chord symbol from the static C-major table.
pub fn chord_notes(symbol: &str) -> Option<&'static [&'static str; 3]> {
    CHORDS.iter().find(|(name, _)| *name == symbol).map(|(_, notes)| notes)
}

/// Frequencies of a chord symbol, `None` when the symbol is not in the table.
pub fn chord_frequencies(symbol: &str) -> Option<Vec<f32>> {
    let notes = chord_notes(symbol)?;
    notes
        .iter()
        .map(|n| n.parse::<Pitch>().ok().map(Pitch::frequency))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn parses_naturals_sharps_and_flats() {
        assert_eq!("A4".parse::<Pitch>().unwrap().midi(), 69);
        assert_eq!("C4".parse::<Pitch>().unwrap().midi(), 60);
        assert_eq!("C1".parse::<Pitch>().unwrap().midi(), 24);
        assert_eq!("F#3".parse::<Pitch>(), "Gb3".parse::<Pitch>());
        assert_eq!("bb4".parse::<Pitch>().unwrap().midi(), 70);
    }

    #[test]
    fn rejects_garbage() {
        for bad in ["", "H2", "C", "Am", "C#", "C-1", "C10"] {
            assert!(bad.parse::<Pitch>().is_err(), "{bad} should not parse");
        }
    }

    #[test]
    fn frequencies_follow_equal_temperament() {
        assert_relative_eq!("A4".parse::<Pitch>().unwrap().frequency(), 440.0);
        assert_relative_eq!("A5".parse::<Pitch>().unwrap().frequency(), 880.0);
        assert_relative_eq!("C4".parse::<Pitch>().unwrap().frequency(), 261.63, epsilon = 0.01);
    }

    #[test]
    fn displays_as_pitch_name() {
        assert_eq!("Bb4".parse::<Pitch>().unwrap().to_string(), "A#4");
        assert_eq!("C1".parse::<Pitch>().unwrap().to_string(), "C1");
    }

    #[test]
    fn chords_resolve_to_three_notes() {
        assert_eq!(chord_notes("Am"), Some(&["A4", "C5", "E5"]));
        let freqs = chord_frequencies("C").unwrap();
        assert_eq!(freqs.len(), 3);
        assert_relative_eq!(freqs[2], 392.0, epsilon = 0.01);
        assert!(chord_frequencies("Xmaj13").is_none());
    }
}
