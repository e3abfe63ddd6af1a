//! Ontology mapping of probed technical metadata
//!
//! Translates the raw track records coming out of the probe into a flat set
//! of canonical ontology properties, and resolves the coarse media type and
//! the format label into target-system codes through fallback tables.
//!
//! # Classification priority
//! Video, Image and Text tracks classify the whole file and are never
//! displaced by later tracks (a video container with audio streams is a
//! video no matter the stream order). Audio classifies only while no final
//! type has been seen; General/Other fall back to `Unknown` as a last
//! resort.

use std::collections::HashMap;

use crate::types::{HarvestedMetadata, MediaType, Track, TrackType};

/// Canonical property carrying the format label, fed into format resolution
pub const FORMAT_PROPERTY: &str = "ebucore:hasFormat";

/// Canonical properties carrying pixel dimensions
pub const WIDTH_PROPERTY: &str = "ebucore:width";
pub const HEIGHT_PROPERTY: &str = "ebucore:height";

/// Reserved sentinel key in fallback tables
pub const UNKNOWN_ENTRY: &str = "Unknown";

/// Lookup table with a reserved `"Unknown"` sentinel entry.
///
/// Resolution is total: exact match first, then the sentinel entry, then the
/// raw value passes through unchanged.
#[derive(Debug, Clone, Default)]
pub struct FallbackTable {
    entries: HashMap<String, String>,
}

impl FallbackTable {
    pub fn new(entries: HashMap<String, String>) -> Self {
        Self { entries }
    }

    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        Self {
            entries: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    /// Resolve a raw value to a target code.
    pub fn resolve(&self, raw: &str) -> String {
        if let Some(code) = self.entries.get(raw) {
            return code.clone();
        }
        if let Some(code) = self.entries.get(UNKNOWN_ENTRY) {
            return code.clone();
        }
        raw.to_string()
    }
}

/// Mapping engine
///
/// Holds the per-track-type ontology field maps and the two fallback tables.
/// Loaded once and shared read-only across requests.
pub struct MetadataMapper {
    field_maps: HashMap<TrackType, HashMap<String, String>>,
    type_codes: FallbackTable,
    format_codes: FallbackTable,
}

impl MetadataMapper {
    pub fn new(
        field_maps: HashMap<TrackType, HashMap<String, String>>,
        type_codes: FallbackTable,
        format_codes: FallbackTable,
    ) -> Self {
        Self {
            field_maps,
            type_codes,
            format_codes,
        }
    }

    /// Engine with the compiled-in EBU Core field maps and default type
    /// codes. Deployments override these through configuration.
    pub fn with_defaults() -> Self {
        Self::new(
            build_default_field_maps(),
            default_type_codes(),
            FallbackTable::default(),
        )
    }

    /// Harvest a flat metadata set from the probe's tracks.
    ///
    /// Tracks are visited in report order. Fields present in the track
    /// type's ontology map are written into the property set, later tracks
    /// overwriting earlier values for the same canonical property. Track
    /// types without their own map use the General map.
    pub fn harvest(&self, tracks: &[Track]) -> HarvestedMetadata {
        let mut properties: HashMap<String, String> = HashMap::new();
        let mut media_type: Option<MediaType> = None;
        let mut finalized = false;

        for track in tracks {
            let field_map = self
                .field_maps
                .get(&track.track_type)
                .or_else(|| self.field_maps.get(&TrackType::General));

            if let Some(field_map) = field_map {
                for (key, value) in &track.fields {
                    if let Some(property) = field_map.get(key) {
                        properties.insert(property.clone(), value.clone());
                    }
                }
            }

            match track.track_type {
                TrackType::Video | TrackType::Image | TrackType::Text => {
                    let candidate = match track.track_type {
                        TrackType::Video => MediaType::Video,
                        TrackType::Image => MediaType::Image,
                        _ => MediaType::Text,
                    };
                    if !finalized {
                        media_type = Some(candidate);
                        finalized = true;
                    } else if media_type != Some(candidate) {
                        // First final type wins; the source never defined
                        // what two competing final types should mean.
                        tracing::debug!(
                            kept = media_type.map(|t| t.as_str()).unwrap_or("?"),
                            suppressed = candidate.as_str(),
                            "conflicting final track types, keeping first"
                        );
                    }
                }
                TrackType::Audio => {
                    if !finalized {
                        media_type = Some(MediaType::Audio);
                    }
                }
                TrackType::General | TrackType::Other => {
                    if media_type.is_none() {
                        media_type = Some(MediaType::Unknown);
                    }
                }
            }
        }

        HarvestedMetadata {
            properties,
            media_type: media_type.unwrap_or(MediaType::Unknown),
        }
    }

    /// Resolve the coarse media type into a target-system code.
    pub fn resolve_type(&self, media_type: MediaType) -> String {
        self.type_codes.resolve(media_type.as_str())
    }

    /// Resolve the harvested format label into a target-system code.
    ///
    /// Returns `None` when no format property was harvested at all; the
    /// host then records no format attribute.
    pub fn resolve_format(&self, metadata: &HarvestedMetadata) -> Option<String> {
        metadata
            .properties
            .get(FORMAT_PROPERTY)
            .map(|raw| self.format_codes.resolve(raw))
    }
}

/// Compiled-in EBU Core field maps, one per track type.
pub(crate) fn build_default_field_maps() -> HashMap<TrackType, HashMap<String, String>> {
    let mut maps = HashMap::new();

    maps.insert(
        TrackType::General,
        field_map(&[
            ("Format", FORMAT_PROPERTY),
            ("FileSize", "ebucore:fileSize"),
            ("Duration", "ebucore:duration"),
            ("OverallBitRate", "ebucore:bitRate"),
        ]),
    );

    maps.insert(
        TrackType::Video,
        field_map(&[
            ("Format", "ebucore:hasVideoCodec"),
            ("Width", WIDTH_PROPERTY),
            ("Height", HEIGHT_PROPERTY),
            ("FrameRate", "ebucore:frameRate"),
        ]),
    );

    maps.insert(
        TrackType::Audio,
        field_map(&[
            ("Format", "ebucore:hasAudioCodec"),
            ("Channels", "ebucore:audioChannelNumber"),
            ("SamplingRate", "ebucore:sampleRate"),
        ]),
    );

    maps.insert(
        TrackType::Image,
        field_map(&[
            ("Format", FORMAT_PROPERTY),
            ("Width", WIDTH_PROPERTY),
            ("Height", HEIGHT_PROPERTY),
        ]),
    );

    maps.insert(
        TrackType::Text,
        field_map(&[("Format", FORMAT_PROPERTY), ("Language", "dc:language")]),
    );

    maps
}

fn field_map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

pub(crate) fn default_type_codes() -> FallbackTable {
    FallbackTable::from_pairs(&[
        ("Video", "video"),
        ("Audio", "audio"),
        ("Image", "image"),
        ("Text", "text"),
        ("Unknown", "other"),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(track_type: TrackType, fields: &[(&str, &str)]) -> Track {
        let mut track = Track::new(track_type);
        for (k, v) in fields {
            track.fields.insert(k.to_string(), v.to_string());
        }
        track
    }

    /// Mapper matching the classic harvest scenario: the Video map carries
    /// format/dimensions, the Audio map deliberately maps only channels.
    fn scenario_mapper() -> MetadataMapper {
        let mut maps = HashMap::new();
        maps.insert(TrackType::General, field_map(&[("Format", FORMAT_PROPERTY)]));
        maps.insert(
            TrackType::Video,
            field_map(&[
                ("Format", FORMAT_PROPERTY),
                ("Width", WIDTH_PROPERTY),
                ("Height", HEIGHT_PROPERTY),
            ]),
        );
        maps.insert(
            TrackType::Audio,
            field_map(&[("Channels", "ebucore:audioChannelNumber")]),
        );
        MetadataMapper::new(
            maps,
            default_type_codes(),
            FallbackTable::from_pairs(&[("AVC", "H264"), ("Unknown", "OTHER")]),
        )
    }

    #[test]
    fn test_video_is_final_regardless_of_order() {
        let mapper = MetadataMapper::with_defaults();

        let orders: Vec<Vec<Track>> = vec![
            vec![track(TrackType::Video, &[]), track(TrackType::Audio, &[])],
            vec![track(TrackType::Audio, &[]), track(TrackType::Video, &[])],
            vec![
                track(TrackType::General, &[]),
                track(TrackType::Audio, &[]),
                track(TrackType::Video, &[]),
                track(TrackType::Audio, &[]),
            ],
        ];

        for tracks in orders {
            assert_eq!(mapper.harvest(&tracks).media_type, MediaType::Video);
        }
    }

    #[test]
    fn test_audio_and_general_only() {
        let mapper = MetadataMapper::with_defaults();

        let tracks = vec![track(TrackType::General, &[]), track(TrackType::Audio, &[])];
        assert_eq!(mapper.harvest(&tracks).media_type, MediaType::Audio);

        let tracks = vec![track(TrackType::Audio, &[]), track(TrackType::General, &[])];
        assert_eq!(mapper.harvest(&tracks).media_type, MediaType::Audio);

        let tracks = vec![track(TrackType::General, &[])];
        assert_eq!(mapper.harvest(&tracks).media_type, MediaType::Unknown);

        assert_eq!(mapper.harvest(&[]).media_type, MediaType::Unknown);
    }

    #[test]
    fn test_first_final_type_wins() {
        let mapper = MetadataMapper::with_defaults();

        let tracks = vec![track(TrackType::Video, &[]), track(TrackType::Text, &[])];
        assert_eq!(mapper.harvest(&tracks).media_type, MediaType::Video);

        let tracks = vec![track(TrackType::Image, &[]), track(TrackType::Video, &[])];
        assert_eq!(mapper.harvest(&tracks).media_type, MediaType::Image);
    }

    #[test]
    fn test_harvest_scenario_video_with_audio() {
        let mapper = scenario_mapper();
        let tracks = vec![
            track(
                TrackType::Video,
                &[("Format", "AVC"), ("Width", "1920"), ("Height", "1080")],
            ),
            track(TrackType::Audio, &[("Format", "AAC"), ("Channels", "2")]),
        ];

        let harvested = mapper.harvest(&tracks);
        assert_eq!(harvested.media_type, MediaType::Video);
        assert_eq!(harvested.properties.get(FORMAT_PROPERTY).unwrap(), "AVC");
        assert_eq!(harvested.properties.get(WIDTH_PROPERTY).unwrap(), "1920");
        assert_eq!(harvested.properties.get(HEIGHT_PROPERTY).unwrap(), "1080");
        assert_eq!(
            harvested
                .properties
                .get("ebucore:audioChannelNumber")
                .unwrap(),
            "2"
        );

        assert_eq!(mapper.resolve_format(&harvested), Some("H264".to_string()));
    }

    #[test]
    fn test_later_tracks_overwrite_same_property() {
        let mapper = scenario_mapper();
        // Both the General and Video maps route Format to the same property;
        // the later track wins.
        let tracks = vec![
            track(TrackType::General, &[("Format", "Matroska")]),
            track(TrackType::Video, &[("Format", "AVC")]),
        ];
        let harvested = mapper.harvest(&tracks);
        assert_eq!(harvested.properties.get(FORMAT_PROPERTY).unwrap(), "AVC");
    }

    #[test]
    fn test_unrecognized_type_uses_general_map() {
        let mapper = scenario_mapper();
        let tracks = vec![track(TrackType::Other, &[("Format", "Chapters")])];
        let harvested = mapper.harvest(&tracks);
        assert_eq!(
            harvested.properties.get(FORMAT_PROPERTY).unwrap(),
            "Chapters"
        );
    }

    #[test]
    fn test_fallback_resolution_is_total() {
        let with_sentinel = FallbackTable::from_pairs(&[("AVC", "H264"), ("Unknown", "OTHER")]);
        assert_eq!(with_sentinel.resolve("AVC"), "H264");
        assert_eq!(with_sentinel.resolve("HEVC"), "OTHER");

        let without_sentinel = FallbackTable::from_pairs(&[("AVC", "H264")]);
        // no sentinel entry: the raw value passes through
        assert_eq!(without_sentinel.resolve("HEVC"), "HEVC");

        let empty = FallbackTable::default();
        assert_eq!(empty.resolve("anything"), "anything");
    }

    #[test]
    fn test_fallback_resolution_is_idempotent() {
        let table = FallbackTable::from_pairs(&[("AVC", "H264"), ("Unknown", "OTHER")]);
        let once = table.resolve("HEVC");
        assert_eq!(table.resolve(&once), "OTHER");

        let passthrough = FallbackTable::default();
        let once = passthrough.resolve("HEVC");
        assert_eq!(passthrough.resolve(&once), once);
    }

    #[test]
    fn test_resolve_format_skipped_when_absent() {
        let mapper = scenario_mapper();
        let harvested = mapper.harvest(&[track(TrackType::Audio, &[("Channels", "2")])]);
        assert_eq!(mapper.resolve_format(&harvested), None);
    }

    #[test]
    fn test_resolve_type_uses_type_table() {
        let mapper = scenario_mapper();
        assert_eq!(mapper.resolve_type(MediaType::Video), "video");
        assert_eq!(mapper.resolve_type(MediaType::Unknown), "other");
    }
}
