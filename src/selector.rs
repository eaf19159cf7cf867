//! Audio and subtitle track selection.
//!
//! The policy is driven by the language of the *first* audio stream in probe
//! order:
//! - first audio is the target language: keep the best foreign track and
//!   route the remux to the original-language folder;
//! - otherwise: keep the best target-language track and route the remux to
//!   the dubbed folder.
//!
//! "Best" means most channels; ties keep probe order.

use crate::media::{ProbeResult, StreamDescriptor};
use crate::naming::language_abbreviation;

/// Subtitle codecs that can be written out as text
pub const TEXT_SUBTITLE_CODECS: [&str; 4] = ["srt", "subrip", "ass", "ssa"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioTrack {
    pub index: u32,
    pub channels: u32,
    pub language: String,
    /// Stream title, or the language abbreviation when untitled
    pub title: String,
}

impl AudioTrack {
    fn from_stream(stream: &StreamDescriptor) -> Self {
        Self {
            index: stream.index,
            channels: stream.channels.unwrap_or(0),
            language: stream.language.clone(),
            title: stream
                .title
                .clone()
                .unwrap_or_else(|| language_abbreviation(&stream.language)),
        }
    }
}

/// Output folder a remux is routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputRoute {
    /// The kept track is in the target language
    Dubbed,
    /// The kept track is the original/foreign language
    Original,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioDecision {
    /// The container has no audio streams
    NoAudio,
    /// No track in the wanted language exists
    NoAlternate { first_language: String },
    Remux {
        /// First audio stream in probe order; names the source file
        first: AudioTrack,
        /// Track kept in the new container
        selected: AudioTrack,
        route: OutputRoute,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtitleTrack {
    pub index: u32,
    pub language: String,
    pub title: Option<String>,
    pub codec: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubtitleDecision {
    Extract(SubtitleTrack),
    Skip { track: SubtitleTrack, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionPlan {
    pub audio: AudioDecision,
    /// Target-language subtitle streams only, in probe order
    pub subtitles: Vec<SubtitleDecision>,
}

impl SelectionPlan {
    pub fn extractable_subtitles(&self) -> impl Iterator<Item = &SubtitleTrack> {
        self.subtitles.iter().filter_map(|d| match d {
            SubtitleDecision::Extract(track) => Some(track),
            SubtitleDecision::Skip { .. } => None,
        })
    }
}

pub fn is_text_subtitle(codec: &str) -> bool {
    let codec = codec.to_ascii_lowercase();
    TEXT_SUBTITLE_CODECS.contains(&codec.as_str())
}

#[derive(Debug, Clone)]
pub struct TrackSelector {
    target_language: String,
}

impl TrackSelector {
    pub fn new<S: Into<String>>(target_language: S) -> Self {
        Self {
            target_language: target_language.into(),
        }
    }

    pub fn select(&self, probe: &ProbeResult) -> SelectionPlan {
        SelectionPlan {
            audio: self.select_audio(probe),
            subtitles: self.select_subtitles(probe),
        }
    }

    pub fn select_audio(&self, probe: &ProbeResult) -> AudioDecision {
        let mut tracks: Vec<AudioTrack> = probe.audio_streams().map(AudioTrack::from_stream).collect();
        let Some(first) = tracks.first().cloned() else {
            return AudioDecision::NoAudio;
        };

        // Stable: equal channel counts keep probe order
        tracks.sort_by(|a, b| b.channels.cmp(&a.channels));

        let first_is_target = first.language == self.target_language;
        let (selected, route) = if first_is_target {
            let foreign = tracks.into_iter().find(|t| t.language != self.target_language);
            (foreign, OutputRoute::Original)
        } else {
            let dubbed = tracks.into_iter().find(|t| t.language == self.target_language);
            (dubbed, OutputRoute::Dubbed)
        };

        match selected {
            Some(selected) => AudioDecision::Remux { first, selected, route },
            None => AudioDecision::NoAlternate {
                first_language: first.language,
            },
        }
    }

    pub fn select_subtitles(&self, probe: &ProbeResult) -> Vec<SubtitleDecision> {
        probe
            .subtitle_streams()
            .filter(|s| s.language == self.target_language)
            .map(|s| {
                let track = SubtitleTrack {
                    index: s.index,
                    language: s.language.clone(),
                    title: s.title.clone(),
                    codec: s.codec.clone(),
                };
                if is_text_subtitle(&track.codec) {
                    SubtitleDecision::Extract(track)
                } else {
                    let reason = format!("format {} is not text-based", track.codec);
                    SubtitleDecision::Skip { track, reason }
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{StreamDescriptor, StreamKind};

    fn audio(index: u32, language: &str, channels: u32, title: Option<&str>) -> StreamDescriptor {
        StreamDescriptor {
            index,
            kind: StreamKind::Audio,
            codec: "aac".to_string(),
            language: language.to_string(),
            title: title.map(str::to_string),
            channels: Some(channels),
            width: None,
            height: None,
        }
    }

    fn subtitle(index: u32, language: &str, codec: &str) -> StreamDescriptor {
        StreamDescriptor {
            index,
            kind: StreamKind::Subtitle,
            codec: codec.to_string(),
            language: language.to_string(),
            title: None,
            channels: None,
            width: None,
            height: None,
        }
    }

    fn probe(streams: Vec<StreamDescriptor>) -> ProbeResult {
        ProbeResult {
            streams,
            ..Default::default()
        }
    }

    #[test]
    fn test_foreign_first_selects_target_track_for_dubbed_folder() {
        let probe = probe(vec![audio(1, "eng", 6, None), audio(2, "vie", 2, None)]);
        let decision = TrackSelector::new("vie").select_audio(&probe);

        match decision {
            AudioDecision::Remux { first, selected, route } => {
                assert_eq!(first.index, 1);
                assert_eq!(selected.index, 2);
                assert_eq!(selected.title, "VIE");
                assert_eq!(route, OutputRoute::Dubbed);
            }
            other => panic!("unexpected decision: {:?}", other),
        }
    }

    #[test]
    fn test_target_first_selects_best_foreign_track() {
        let probe = probe(vec![
            audio(1, "vie", 2, Some("Thuyet Minh")),
            audio(2, "eng", 2, Some("Stereo")),
            audio(3, "jpn", 6, None),
            audio(4, "eng", 6, Some("Surround")),
        ]);
        let decision = TrackSelector::new("vie").select_audio(&probe);

        match decision {
            AudioDecision::Remux { first, selected, route } => {
                assert_eq!(first.title, "Thuyet Minh");
                // 6 channels, earlier in probe order than stream 4
                assert_eq!(selected.index, 3);
                assert_eq!(route, OutputRoute::Original);
            }
            other => panic!("unexpected decision: {:?}", other),
        }
    }

    #[test]
    fn test_first_language_comes_from_probe_order_not_channel_order() {
        // The 6-channel vie track sorts first but the first stream is eng
        let probe = probe(vec![audio(1, "eng", 2, None), audio(2, "vie", 6, None)]);
        let decision = TrackSelector::new("vie").select_audio(&probe);
        assert!(matches!(
            decision,
            AudioDecision::Remux { route: OutputRoute::Dubbed, ref selected, .. } if selected.index == 2
        ));
    }

    #[test]
    fn test_no_alternate_and_no_audio() {
        let only_target = probe(vec![audio(1, "vie", 2, None), audio(2, "vie", 6, None)]);
        assert_eq!(
            TrackSelector::new("vie").select_audio(&only_target),
            AudioDecision::NoAlternate { first_language: "vie".to_string() }
        );

        let silent = probe(vec![]);
        assert_eq!(TrackSelector::new("vie").select_audio(&silent), AudioDecision::NoAudio);
    }

    #[test]
    fn test_target_language_is_configurable() {
        let probe = probe(vec![audio(1, "vie", 2, None), audio(2, "eng", 2, None)]);
        let decision = TrackSelector::new("eng").select_audio(&probe);
        assert!(matches!(decision, AudioDecision::Remux { route: OutputRoute::Dubbed, .. }));
    }

    #[test]
    fn test_subtitle_selection_filters_language_and_codec() {
        let probe = probe(vec![
            subtitle(3, "vie", "subrip"),
            subtitle(4, "eng", "subrip"),
            subtitle(5, "vie", "hdmv_pgs_subtitle"),
            subtitle(6, "vie", "ASS"),
        ]);
        let plan = TrackSelector::new("vie").select(&probe);

        assert_eq!(plan.subtitles.len(), 3);
        let extract: Vec<u32> = plan.extractable_subtitles().map(|t| t.index).collect();
        assert_eq!(extract, vec![3, 6]);
        assert!(matches!(
            &plan.subtitles[1],
            SubtitleDecision::Skip { track, reason } if track.index == 5 && reason.contains("hdmv_pgs_subtitle")
        ));
        assert_eq!(plan.audio, AudioDecision::NoAudio);
    }
}
