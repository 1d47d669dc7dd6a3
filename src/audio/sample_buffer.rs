use std::path::Path;

use anyhow::Context;

use super::frame::StereoFrame;

/// A recorded take as stereo frames, plus the rate it was captured at.
#[derive(Clone, Debug, PartialEq)]
pub struct SampleBuffer {
    pub data: Vec<StereoFrame>,
    pub sample_rate: u32,
}

impl SampleBuffer {
    pub fn new(data: Vec<StereoFrame>, sample_rate: u32) -> Self {
        Self { data, sample_rate }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn duration_secs(&self) -> f64 {
        self.data.len() as f64 / self.sample_rate.max(1) as f64
    }

    /// Write as 16-bit stereo PCM. Returns the file size in bytes.
    pub fn write_wav(&self, path: &Path) -> anyhow::Result<u64> {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec)
            .with_context(|| format!("creating {}", path.display()))?;
        for f in &self.data {
            writer.write_sample(to_i16(f.left))?;
            writer.write_sample(to_i16(f.right))?;
        }
        writer.finalize()?;
        Ok(std::fs::metadata(path)?.len())
    }
}

fn to_i16(x: f32) -> i16 {
    (x.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

/// `m:ss`
pub fn format_duration(secs: f64) -> String {
    let total = secs.max(0.0).round() as u64;
    format!("{}:{:02}", total / 60, total % 60)
}

pub fn format_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    let b = bytes as f64;
    if b < KB {
        format!("{bytes} B")
    } else if b < KB * KB {
        format!("{:.1} KB", b / KB)
    } else {
        format!("{:.1} MB", b / (KB * KB))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_duration() {
        assert_eq!(format_duration(0.0), "0:00");
        assert_eq!(format_duration(65.4), "1:05");
        assert_eq!(format_duration(600.0), "10:00");
    }

    #[test]
    fn formats_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(3 * 1024 * 1024 + 512 * 1024), "3.5 MB");
    }

    #[test]
    fn writes_16_bit_stereo_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("take-1.wav");
        let buf = SampleBuffer::new(vec![StereoFrame { left: 0.5, right: -0.5 }; 4410], 44_100);
        assert!((buf.duration_secs() - 0.1).abs() < 1e-9);
        let size = buf.write_wav(&path).unwrap();
        assert_eq!(size, 44 + 4410 * 4);

        let mut reader = hound::WavReader::open(&path).unwrap();
        let spec = reader.spec();
        assert_eq!((spec.channels, spec.sample_rate, spec.bits_per_sample), (2, 44_100, 16));
        let samples: Vec<i16> = reader.samples::<i16>().map(Result::unwrap).collect();
        assert_eq!(samples.len(), 4410 * 2);
        assert_eq!(samples[0], i16::MAX / 2);
        assert_eq!(samples[1], -(i16::MAX / 2));
    }
}
