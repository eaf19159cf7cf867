use serde::Deserialize;
use std::collections::HashMap;

use crate::error::{ProcessorError, Result};
use crate::naming::{resolution_label, UNKNOWN_RESOLUTION};

/// Language assumed for streams without a `language` tag.
pub const UNDEFINED_LANGUAGE: &str = "und";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Video,
    Audio,
    Subtitle,
    /// Data, attachment (fonts) and anything else ffprobe reports
    Other,
}

impl StreamKind {
    fn from_codec_type(codec_type: &str) -> Self {
        match codec_type {
            "video" => StreamKind::Video,
            "audio" => StreamKind::Audio,
            "subtitle" => StreamKind::Subtitle,
            _ => StreamKind::Other,
        }
    }
}

/// One container stream as reported by the prober
#[derive(Debug, Clone, PartialEq)]
pub struct StreamDescriptor {
    /// Absolute stream index inside the container (the `0:N` in `-map`)
    pub index: u32,
    pub kind: StreamKind,
    pub codec: String,
    pub language: String,
    pub title: Option<String>,
    pub channels: Option<u32>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Streams of one input file plus container-level metadata
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProbeResult {
    pub streams: Vec<StreamDescriptor>,
    /// Container duration exactly as the prober printed it (seconds)
    pub duration: Option<String>,
    pub tags: HashMap<String, String>,
}

impl ProbeResult {
    pub fn audio_streams(&self) -> impl Iterator<Item = &StreamDescriptor> {
        self.streams.iter().filter(|s| s.kind == StreamKind::Audio)
    }

    pub fn subtitle_streams(&self) -> impl Iterator<Item = &StreamDescriptor> {
        self.streams.iter().filter(|s| s.kind == StreamKind::Subtitle)
    }

    pub fn first_audio(&self) -> Option<&StreamDescriptor> {
        self.audio_streams().next()
    }

    pub fn first_video(&self) -> Option<&StreamDescriptor> {
        self.streams.iter().find(|s| s.kind == StreamKind::Video)
    }

    /// Resolution label of the first video stream.
    pub fn resolution_label(&self) -> String {
        match self.first_video().and_then(|v| v.width.zip(v.height)) {
            Some((width, height)) => resolution_label(width, height),
            None => UNKNOWN_RESOLUTION.to_string(),
        }
    }

    /// Container tag lookup, ignoring key case (`year`, `YEAR`).
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn year(&self) -> Option<&str> {
        self.tag("year")
    }
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    streams: Option<Vec<FfprobeStream>>,
    #[serde(default)]
    format: FfprobeFormat,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
    #[serde(default)]
    tags: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    index: Option<u32>,
    codec_type: Option<String>,
    codec_name: Option<String>,
    channels: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
    #[serde(default)]
    tags: HashMap<String, String>,
}

fn stream_tag<'a>(tags: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    tags.iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v.trim())
        .filter(|v| !v.is_empty())
}

/// Parse `ffprobe -print_format json -show_format -show_streams` output.
pub fn parse_probe_output(json: &str) -> Result<ProbeResult> {
    let output: FfprobeOutput = serde_json::from_str(json)
        .map_err(|e| ProcessorError::Probe(format!("Malformed probe output: {}", e)))?;

    let streams = output
        .streams
        .ok_or_else(|| ProcessorError::Probe("Probe output has no 'streams' key".to_string()))?;

    let streams = streams
        .into_iter()
        .enumerate()
        .map(|(position, stream)| {
            let kind = StreamKind::from_codec_type(stream.codec_type.as_deref().unwrap_or_default());
            let language = stream_tag(&stream.tags, "language")
                .unwrap_or(UNDEFINED_LANGUAGE)
                .to_string();
            let title = stream_tag(&stream.tags, "title").map(str::to_string);

            StreamDescriptor {
                index: stream.index.unwrap_or(position as u32),
                kind,
                codec: stream.codec_name.unwrap_or_default(),
                language,
                title,
                channels: if kind == StreamKind::Audio { stream.channels } else { None },
                width: if kind == StreamKind::Video { stream.width } else { None },
                height: if kind == StreamKind::Video { stream.height } else { None },
            }
        })
        .collect();

    Ok(ProbeResult {
        streams,
        duration: output.format.duration.map(|d| d.trim().to_string()),
        tags: output.format.tags,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "streams": [
            {"index": 0, "codec_name": "hevc", "codec_type": "video", "width": 3840, "height": 1608},
            {"index": 1, "codec_name": "eac3", "codec_type": "audio", "channels": 6,
             "tags": {"language": "eng", "title": "Atmos"}},
            {"index": 2, "codec_name": "aac", "codec_type": "audio", "channels": 2,
             "tags": {"LANGUAGE": "vie"}},
            {"index": 3, "codec_name": "subrip", "codec_type": "subtitle",
             "tags": {"language": "vie", "title": ""}},
            {"index": 4, "codec_name": "ttf", "codec_type": "attachment"}
        ],
        "format": {"duration": "5400.123000", "tags": {"YEAR": "2019 "}}
    }"#;

    #[test]
    fn test_parse_probe_output() {
        let probe = parse_probe_output(SAMPLE).unwrap();

        assert_eq!(probe.streams.len(), 5);
        assert_eq!(probe.resolution_label(), "4K");
        assert_eq!(probe.year(), Some("2019"));
        assert_eq!(probe.duration.as_deref(), Some("5400.123000"));

        let audio: Vec<_> = probe.audio_streams().collect();
        assert_eq!(audio.len(), 2);
        assert_eq!(audio[0].title.as_deref(), Some("Atmos"));
        assert_eq!(audio[0].channels, Some(6));
        assert_eq!(audio[1].language, "vie");

        let subtitle = probe.subtitle_streams().next().unwrap();
        assert_eq!(subtitle.codec, "subrip");
        assert_eq!(subtitle.title, None);
        assert_eq!(probe.streams[4].kind, StreamKind::Other);
    }

    #[test]
    fn test_missing_language_defaults_to_und() {
        let probe = parse_probe_output(
            r#"{"streams": [{"index": 0, "codec_type": "audio", "codec_name": "ac3"}]}"#,
        )
        .unwrap();
        assert_eq!(probe.first_audio().unwrap().language, UNDEFINED_LANGUAGE);
        assert_eq!(probe.resolution_label(), UNKNOWN_RESOLUTION);
        assert_eq!(probe.year(), None);
    }

    #[test]
    fn test_missing_streams_key_is_probe_error() {
        let err = parse_probe_output(r#"{"format": {"duration": "1.0"}}"#).unwrap_err();
        assert!(matches!(err, ProcessorError::Probe(_)));

        let err = parse_probe_output("not json").unwrap_err();
        assert!(matches!(err, ProcessorError::Probe(_)));
    }
}
