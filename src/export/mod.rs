//! Export attempts: configuration, state machine and orchestration

pub mod config;
pub mod delegate;
pub mod state;
pub mod traits;

pub use config::{
    ExportConfiguration, PathRemap, PlaylistSort, PlaylistSortColumn, PlaylistSortMode,
    PlaylistSortOrder,
};
pub use delegate::{ExportDelegate, ExportHandle, ExportOutcome};
pub use state::{EventBus, ExportEvent, ExportState, StateMachine};
pub use traits::Exporter;
