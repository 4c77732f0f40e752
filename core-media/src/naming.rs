//! Artifact naming.
//!
//! Cache artifacts: `{ownerId}_{pathTitle}.{typeExtension}`.
//! Extraction artifacts: `{ownerId}/{pathTitle}.{streamKind}{index}.{container}`.
//!
//! Names are deterministic so a fresh process rediscovers artifacts written
//! by an earlier run.

use bridge_traits::MediaKind;

use crate::model::{MediaItem, StreamId};

/// Extension used for cache artifacts of each media kind.
pub fn cache_extension(kind: MediaKind) -> &'static str {
    match kind {
        MediaKind::Audio => "acache",
        MediaKind::Video => "vcache",
        MediaKind::Subtitle => "scache",
        MediaKind::Generic => "cache",
    }
}

pub fn cache_file_name(item: &MediaItem) -> String {
    format!(
        "{}_{}.{}",
        sanitize_component(item.owner_id()),
        item.path_title(),
        cache_extension(item.kind())
    )
}

/// Per-owner directory holding extraction artifacts, so two owners playing
/// files with the same title never share an artifact.
pub fn extraction_dir_name(item: &MediaItem) -> String {
    sanitize_component(item.owner_id())
}

pub fn extraction_file_name(item: &MediaItem, stream: StreamId, container: &str) -> String {
    format!(
        "{}.{}.{}",
        item.path_title(),
        stream,
        sanitize_component(container)
    )
}

/// Replace anything outside `[A-Za-z0-9._-]` with `_`.
pub(crate) fn sanitize_component(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.is_empty() {
        "untitled".to_string()
    } else {
        cleaned
    }
}
