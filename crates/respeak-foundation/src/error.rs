use thiserror::Error;

#[derive(Error, Debug)]
pub enum AudioError {
    #[error("no capture device found (preferred: {preferred:?})")]
    NoDeviceFound { preferred: Option<String> },

    #[error("device '{device}' refused {sample_rate} Hz / {channels} ch: {reason}")]
    DeviceOpenError {
        device: String,
        sample_rate: u32,
        channels: u16,
        reason: String,
    },

    #[error("capture lost after {attempts} failed reads: {reason}")]
    CaptureLost { attempts: u32, reason: String },

    #[error("device enumeration error: {0}")]
    Devices(#[from] cpal::DevicesError),

    #[error("device name error: {0}")]
    DeviceName(#[from] cpal::DeviceNameError),

    #[error("supported stream configs error: {0}")]
    SupportedStreamConfigs(#[from] cpal::SupportedStreamConfigsError),

    #[error("build stream error: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("play stream error: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("fatal error, cannot recover: {0}")]
    Fatal(String),
}

impl AudioError {
    /// Fatal conditions terminate the capture session; everything else is
    /// absorbed by retry or the queue overflow accounting.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AudioError::NoDeviceFound { .. }
                | AudioError::DeviceOpenError { .. }
                | AudioError::CaptureLost { .. }
                | AudioError::Fatal(_)
        )
    }
}
