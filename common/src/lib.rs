pub mod config;
pub mod device;
pub mod error;
pub mod orchestrator;
pub mod payload;
pub mod power;
pub mod protocol;
pub mod topics;
pub mod types;

pub use config::{BootstrapConfig, DeviceConfig, NetworkConfig, RuntimeConfig, SensorTopicConfig};
pub use device::{BoostSnapshot, ClimateDevice, DeviceState};
pub use error::{CommandError, FrameError, RestoreError, TransmitError};
pub use orchestrator::{
    BootstrapPhase, ClimateAction, ClimateOrchestrator, Diagnostics, IrTransceiver,
};
pub use payload::{extract_reading, DiscoveryPayload, StatePayload};
pub use power::{PowerClass, PowerTracker, PowerTrackerConfig, StablePower};
pub use protocol::{AcProtocol, CommandFrame, ModeConstraints};
pub use topics::*;
pub use types::{parse_toggle, CommandKind, FanLevel, Mode, ProtocolKind, SwingMode};
