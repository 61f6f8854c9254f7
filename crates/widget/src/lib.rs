pub mod bubble;
pub mod compose;
pub mod error;
pub mod memory_view;
pub mod queue;
pub mod reconciler;
#[cfg(feature = "session")]
pub mod session;
pub mod settings;
pub mod view;

pub use bubble::{Bubble, BubbleRole};
pub use compose::{Composer, KeyAction, PendingSend, SendOutcome};
pub use error::{WidgetError, WidgetResult};
pub use memory_view::{MemoryNode, MemoryView, NodeId};
pub use queue::BatchQueue;
pub use reconciler::{Applied, BatchReport, Reconciler, RecordState};
#[cfg(feature = "session")]
pub use session::{ChatSession, SessionCommand, SessionExit};
pub use settings::WidgetSettings;
pub use view::{Placement, ViewSurface};
