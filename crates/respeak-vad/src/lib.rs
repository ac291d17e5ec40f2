pub mod energy;
pub mod gate;

pub use energy::EnergyCalculator;
pub use gate::{GateConfig, GateDecision, ThresholdHandle, VoiceActivityGate};
