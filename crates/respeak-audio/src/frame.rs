use std::time::{Duration, Instant};

/// One fixed-length block of interleaved samples.
///
/// Created by the capture loop and exclusively owned by whichever stage
/// currently holds it; never mutated after being pushed to the queue.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    pub samples: Vec<i16>,
    /// Strictly increases by one per successful read within a session.
    pub seq: u64,
    pub timestamp: Instant,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioFrame {
    pub fn samples_per_channel(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.samples_per_channel() as f64 / self.sample_rate as f64)
    }

    /// Fold interleaved channels down to mono by averaging, reusing `out`.
    /// Single-channel frames are copied through unchanged.
    pub fn fold_mono_into(&self, out: &mut Vec<i16>) {
        out.clear();
        let channels = self.channels.max(1) as usize;
        if channels == 1 {
            out.extend_from_slice(&self.samples);
            return;
        }
        out.reserve(self.samples.len() / channels);
        for group in self.samples.chunks_exact(channels) {
            let sum: i32 = group.iter().map(|&s| s as i32).sum();
            out.push((sum / channels as i32) as i16);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(samples: Vec<i16>, channels: u16) -> AudioFrame {
        AudioFrame {
            samples,
            seq: 0,
            timestamp: Instant::now(),
            sample_rate: 48_000,
            channels,
        }
    }

    #[test]
    fn stereo_folds_to_channel_average() {
        let f = frame(vec![100, 200, -100, 100, 0, 0], 2);
        let mut mono = Vec::new();
        f.fold_mono_into(&mut mono);
        assert_eq!(mono, vec![150, 0, 0]);
    }

    #[test]
    fn mono_passes_through() {
        let f = frame(vec![1, 2, 3], 1);
        let mut mono = Vec::new();
        f.fold_mono_into(&mut mono);
        assert_eq!(mono, vec![1, 2, 3]);
    }

    #[test]
    fn duration_uses_per_channel_length() {
        let f = frame(vec![0; 2048], 2);
        assert_eq!(f.samples_per_channel(), 1024);
        let ms = f.duration().as_secs_f64() * 1000.0;
        assert!((ms - 21.33).abs() < 0.1);
    }
}
