//! Exporter capability

use super::config::ExportConfiguration;
use anyhow::Result;
use std::path::Path;

/// Reads the music library and serializes it - allows swapping the real
/// library reader for fakes in tests
///
/// Each call may take a long time; the export delegate always invokes them
/// from its worker thread.
pub trait Exporter: Send + Sync {
    /// In-memory (or on-disk) representation of the exported tracks
    type Tracks: Send;

    /// Playlists ready to be written, including the tracks they reference
    type Playlists: Send;

    fn generate_tracks(&self, config: &ExportConfiguration) -> Result<Self::Tracks>;

    fn generate_playlists(
        &self,
        config: &ExportConfiguration,
        tracks: Self::Tracks,
    ) -> Result<Self::Playlists>;

    /// Flush the generated library to `destination`
    fn write(&self, playlists: Self::Playlists, destination: &Path) -> Result<()>;
}
