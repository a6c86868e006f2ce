pub mod event;
pub mod measurement;
pub mod page;
pub mod session;

pub use event::EventRecord;
pub use measurement::{Measurement, PacketSource, TrackPoint};
pub use page::{ListEnvelope, Page};
pub use session::SessionSummary;
