//! Title classification tables.
//!
//! Each table is an ordered `(label, pattern)` list. Patterns match
//! case-insensitively and must be bounded by a word boundary or `_` on both
//! sides, except in the codec tables where only the start is bounded: codec
//! tokens run straight into suffixes like `AAC2.0` or `HEVC10bit`, while a
//! short release token such as `ts` must not match inside `Tsunami`. When
//! several entries match a title, the one declared last wins, so tables go
//! from generic to specific.

use std::sync::LazyLock;

use regex::Regex;

use crate::util::compile_static_regex;

/// An ordered pattern table.
#[derive(Debug)]
pub struct ClassificationTable {
    name: &'static str,
    entries: Vec<(&'static str, Regex)>,
}

impl ClassificationTable {
    fn new(name: &'static str, entries: &[(&'static str, &str)]) -> Self {
        Self::build(name, entries, r"(?:\b|_)")
    }

    /// Bounded at the start only.
    fn prefix_bounded(name: &'static str, entries: &[(&'static str, &str)]) -> Self {
        Self::build(name, entries, "")
    }

    fn build(name: &'static str, entries: &[(&'static str, &str)], tail: &str) -> Self {
        Self {
            name,
            entries: entries
                .iter()
                .map(|(label, pattern)| {
                    (*label, compile_static_regex(&format!(r"(?i)(?:\b|_)(?:{pattern}){tail}")))
                })
                .collect(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Label of the last entry matching `title`.
    #[must_use]
    pub fn classify(&self, title: &str) -> Option<&'static str> {
        self.entries
            .iter()
            .rev()
            .find(|(_, pattern)| pattern.is_match(title))
            .map(|(label, _)| *label)
    }

    /// 1-based declaration position of `label`.
    #[must_use]
    pub fn position(&self, label: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(l, _)| *l == label)
            .map(|i| i + 1)
    }

    /// Labels in declaration order.
    pub fn labels(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|(label, _)| *label)
    }

    #[must_use]
    pub fn contains(&self, label: &str) -> bool {
        self.entries.iter().any(|(l, _)| *l == label)
    }
}

/// Video resolution; the position doubles as the ranking factor.
pub static RESOLUTIONS: LazyLock<ClassificationTable> = LazyLock::new(|| {
    ClassificationTable::new(
        "resolution",
        &[
            ("240p", r"240p?|tvrip|satrip|vhsrip"),
            ("480p", r"480p?|xvid|dvd|dvdrip|hdtv"),
            ("720p", r"720p?|hdrip|bluray|b[rd]rip"),
            ("1080p", r"1080p?|fullhd|fhd"),
            ("2K", r"2k|1440p?"),
            ("4K", r"4k|2160p?"),
        ],
    )
});

/// Declared generic to specific: `DVDScreener` follows `Screener` and the
/// rip labels follow the `CAM`/`TeleSync` family, so the last match is the
/// most specific one.
pub static RELEASE_TYPES: LazyLock<ClassificationTable> = LazyLock::new(|| {
    ClassificationTable::new(
        "release type",
        &[
            ("Workprint", r"workprint"),
            ("Trailer", r"trailer"),
            ("3D", r"3d"),
            ("CAM", r"cam|camrip|hdcam"),
            ("TeleSync", r"telesync|ts"),
            ("TeleCine", r"telecine|tc"),
            ("Screener", r"screener|scr"),
            ("DVDScreener", r"dvd[^a-zA-Z0-9]*scr"),
            ("VHSrip", r"vhsrip"),
            ("TVRip", r"(?:tv|sat)rip"),
            ("HDTV", r"hdtv"),
            ("DVDRip", r"dvd[^a-zA-Z0-9]*rip"),
            ("HDRip", r"hdrip"),
            ("WebDL", r"web[^a-zA-Z0-9]*(?:dl|rip)"),
            ("BRRip", r"b[rd]rip|bluray"),
        ],
    )
});

pub static SCENE_TAGS: LazyLock<ClassificationTable> = LazyLock::new(|| {
    ClassificationTable::new("scene tag", &[("Nuked", r"nuked"), ("Proper", r"proper")])
});

pub static VIDEO_CODECS: LazyLock<ClassificationTable> = LazyLock::new(|| {
    ClassificationTable::prefix_bounded(
        "video codec",
        &[("Xvid", r"xvid"), ("H.264", r"[hx]264"), ("H.265", r"[hx]265|hevc")],
    )
});

pub static AUDIO_CODECS: LazyLock<ClassificationTable> = LazyLock::new(|| {
    ClassificationTable::prefix_bounded(
        "audio codec",
        &[
            ("MP3", r"mp3"),
            ("AAC", r"aac"),
            ("AC3", r"ac3|[Dd]*5[^a-zA-Z0-9]+1"),
            ("DTS", r"dts"),
            ("DTS HD", r"dts[^a-zA-Z0-9]+hd"),
            ("DTS HD MA", r"dts[^a-zA-Z0-9]+hd[^a-zA-Z0-9]+ma"),
        ],
    )
});

/// Labels resolved for one title; `None` is unknown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Classification {
    pub resolution: Option<&'static str>,
    pub release_type: Option<&'static str>,
    pub scene_tag: Option<&'static str>,
    pub video_codec: Option<&'static str>,
    pub audio_codec: Option<&'static str>,
}

impl Classification {
    /// Classifies `title` for every field still unknown; resolved fields stay.
    pub fn fill_from(&mut self, title: &str) {
        let slots: [(&mut Option<&'static str>, &ClassificationTable); 5] = [
            (&mut self.resolution, &*RESOLUTIONS),
            (&mut self.release_type, &*RELEASE_TYPES),
            (&mut self.scene_tag, &*SCENE_TAGS),
            (&mut self.video_codec, &*VIDEO_CODECS),
            (&mut self.audio_codec, &*AUDIO_CODECS),
        ];
        for (slot, table) in slots {
            if slot.is_none() {
                *slot = table.classify(title);
            }
        }
    }
}
