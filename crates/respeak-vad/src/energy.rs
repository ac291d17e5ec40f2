#[derive(Debug, Clone, Copy, Default)]
pub struct EnergyCalculator;

impl EnergyCalculator {
    pub fn new() -> Self {
        Self
    }

    /// Short-term RMS amplitude of a frame, normalized to [0, 1] over the
    /// i16 full scale.
    pub fn calculate_rms(&self, frame: &[i16]) -> f32 {
        if frame.is_empty() {
            return 0.0;
        }

        let sum_squares: i64 = frame
            .iter()
            .map(|&sample| {
                let s = sample as i64;
                s * s
            })
            .sum();

        let mean_square = sum_squares as f64 / frame.len() as f64;
        (mean_square.sqrt() / 32768.0) as f32
    }
}
