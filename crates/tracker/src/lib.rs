pub mod device;
pub mod driver;
pub mod errors;
pub mod exit;
pub mod gate;
pub mod identity;
pub mod model;
pub mod navigation;
pub mod policy;
pub mod sequence;
pub mod session;
pub mod snapshot;
pub mod state;
pub mod tracker;

pub use device::{DeviceContext, DeviceProfile};
pub use driver::{DriverHandle, HostEvent, NavigationDriver, SharedTracker};
pub use errors::{TrackError, TrackResult};
pub use exit::{ExitCandidate, ExitCandidateManager, ExitState, Promotion};
pub use gate::{DomainGate, GateDecision};
pub use identity::{IdentityStore, VisitorIdentity, VisitorResolution};
pub use model::{EventType, PageContext, PageEvent};
pub use navigation::{NavigationEvent, NavigationObserver, PendingRoute};
pub use policy::TrackerPolicyView;
pub use sequence::{FlowStep, PageFlow, PageFlowState, PageSequenceState, PageSequenceTracker};
pub use session::{SessionAttribution, SessionManager, SessionRecord, SessionResolution};
pub use snapshot::StateSnapshot;
pub use tracker::{Pageview, SuppressReason, TrackOutcome, Tracker};
