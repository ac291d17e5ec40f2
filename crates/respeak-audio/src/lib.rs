pub mod capture;
pub mod device;
pub mod frame;
pub mod queue;

pub use capture::{CaptureSession, CpalFrameSource, FrameSource, ReadError};
pub use device::{select_device, DeviceDescriptor, DeviceResolver};
pub use frame::AudioFrame;
pub use queue::{HandoffQueue, PushOutcome};
