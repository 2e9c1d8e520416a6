//! Export configuration

use crate::error::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

/// How playlist entries are ordered in the exported library
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlaylistSortMode {
    /// Keep the order the music library uses
    #[default]
    Default,
    /// Sort by `column` in `order`
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlaylistSortColumn {
    Title,
    Artist,
    AlbumArtist,
    DateAdded,
    #[default]
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlaylistSortOrder {
    Ascending,
    Descending,
    #[default]
    None,
}

/// Sort rule for a playlist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlaylistSort {
    pub mode: PlaylistSortMode,
    pub column: PlaylistSortColumn,
    pub order: PlaylistSortOrder,
}

impl PlaylistSort {
    /// Custom sort on `column` in `order`
    pub fn custom(column: PlaylistSortColumn, order: PlaylistSortOrder) -> Self {
        Self {
            mode: PlaylistSortMode::Custom,
            column,
            order,
        }
    }

    /// A custom sort must name a column or an order
    pub fn is_valid(&self) -> bool {
        match self.mode {
            PlaylistSortMode::Default => true,
            PlaylistSortMode::Custom => {
                self.column != PlaylistSortColumn::None || self.order != PlaylistSortOrder::None
            }
        }
    }
}

/// Rewrites the root of track locations in the exported file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathRemap {
    pub original: String,
    pub replacement: String,
}

/// What to export and where
///
/// An attempt works on a frozen copy of this; edits made while an export is
/// running only affect the next attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfiguration {
    /// Directory the library file is written to (may start with `~`)
    pub output_directory: PathBuf,

    /// Name of the exported library file
    pub output_file_name: String,

    /// Optional rewrite of track location prefixes
    pub remap: Option<PathRemap>,

    /// Export folder children as top-level playlists
    pub flatten_playlist_hierarchy: bool,

    /// Include the music library's built-in playlists (Music, Podcasts, ...)
    pub include_internal_playlists: bool,

    /// Sort applied to every playlist without an override
    pub playlist_sort: PlaylistSort,

    /// Per-playlist sort rules keyed by playlist identifier
    pub playlist_sort_overrides: BTreeMap<String, PlaylistSort>,

    /// Playlist identifiers to export (None = export all)
    pub included_playlists: Option<BTreeSet<String>>,
}

impl Default for ExportConfiguration {
    fn default() -> Self {
        Self {
            output_directory: PathBuf::new(),
            output_file_name: String::new(),
            remap: None,
            flatten_playlist_hierarchy: false,
            include_internal_playlists: true,
            playlist_sort: PlaylistSort::default(),
            playlist_sort_overrides: BTreeMap::new(),
            included_playlists: None,
        }
    }
}

impl ExportConfiguration {
    /// Create a new export configuration
    pub fn new(output_directory: impl Into<PathBuf>, output_file_name: impl Into<String>) -> Self {
        Self {
            output_directory: output_directory.into(),
            output_file_name: output_file_name.into(),
            ..Self::default()
        }
    }

    /// Set specific playlists to export
    pub fn with_playlists<I, S>(mut self, playlists: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.included_playlists = Some(playlists.into_iter().map(Into::into).collect());
        self
    }

    /// Set the sort used by every playlist without an override
    pub fn with_sort(mut self, sort: PlaylistSort) -> Self {
        self.playlist_sort = sort;
        self
    }

    /// Override the sort for a single playlist
    pub fn with_playlist_sort(mut self, playlist_id: impl Into<String>, sort: PlaylistSort) -> Self {
        self.playlist_sort_overrides.insert(playlist_id.into(), sort);
        self
    }

    /// Rewrite track locations starting with `original`
    pub fn with_remap(mut self, original: impl Into<String>, replacement: impl Into<String>) -> Self {
        self.remap = Some(PathRemap {
            original: original.into(),
            replacement: replacement.into(),
        });
        self
    }

    pub fn with_flattened_hierarchy(mut self, flatten: bool) -> Self {
        self.flatten_playlist_hierarchy = flatten;
        self
    }

    /// Check everything an export attempt relies on
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.output_directory.as_os_str().is_empty() {
            return Err(ConfigurationError::MissingOutputDirectory);
        }
        if self.output_file_name.trim().is_empty() {
            return Err(ConfigurationError::MissingOutputFileName);
        }
        if !self.playlist_sort.is_valid() {
            return Err(ConfigurationError::IncompleteCustomSort);
        }
        if let Some((id, _)) = self
            .playlist_sort_overrides
            .iter()
            .find(|(_, sort)| !sort.is_valid())
        {
            return Err(ConfigurationError::IncompletePlaylistSort(id.clone()));
        }
        if matches!(&self.remap, Some(remap) if remap.original.is_empty()) {
            return Err(ConfigurationError::EmptyRemapOriginal);
        }
        Ok(())
    }

    /// Full path of the exported file, with `~` expanded
    pub fn destination(&self) -> PathBuf {
        let directory = self.output_directory.to_string_lossy();
        let expanded = shellexpand::tilde(directory.as_ref());
        PathBuf::from(expanded.as_ref()).join(&self.output_file_name)
    }

    /// Sort rule for a playlist, falling back to the global one
    pub fn sort_for(&self, playlist_id: &str) -> &PlaylistSort {
        self.playlist_sort_overrides
            .get(playlist_id)
            .unwrap_or(&self.playlist_sort)
    }

    pub fn includes_playlist(&self, playlist_id: &str) -> bool {
        self.included_playlists
            .as_ref()
            .map_or(true, |ids| ids.contains(playlist_id))
    }

    /// Apply the configured remap to a track location
    pub fn remap_location(&self, location: &str) -> String {
        match &self.remap {
            Some(remap) if !remap.original.is_empty() => {
                match location.strip_prefix(remap.original.as_str()) {
                    Some(rest) => format!("{}{}", remap.replacement, rest),
                    None => location.to_string(),
                }
            }
            _ => location.to_string(),
        }
    }
}
