//! liverec monitor
//!
//! Supervises up to five channels. Each channel runs its own
//! [`ChannelMonitor`] state machine that polls a [`LivenessProbe`], records
//! every live session through a
//! [`CaptureSession`](liverec_capture_engine::CaptureSession), and backs off
//! according to a [`RetryPolicy`] when something fails.

pub mod channel;
pub mod events;
pub mod fleet;
pub mod probe;
pub mod retry;
pub mod signals;
pub mod state;

pub use channel::{ChannelMonitor, MonitorReport};
pub use events::{EventBus, EventKind, MonitorEvent};
pub use fleet::{FleetReport, FleetSupervisor};
pub use probe::{resolve_target, LiveStatus, LivenessProbe, Target, YtDlpProbe};
pub use retry::{BackoffPolicy, RetryDecision, RetryPolicy};
pub use signals::{cancel_on_shutdown, wait_for_shutdown_signal, ShutdownSignals};
pub use state::{MonitorPhase, MonitorState, StopCause};
