pub mod errors;
pub mod facts;
pub mod host;
pub mod ids;
pub mod timing;

pub use errors::HostError;
pub use facts::{now_millis, Fact};
pub use ids::{FrameId, ListenerHandle, TabId};
pub use timing::{NavigationTiming, ResourceEntry, TimingRecord, UNKNOWN_IP};
