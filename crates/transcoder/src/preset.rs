use thiserror::Error;

/// Audio tempo multiplier applied alongside every video chain
pub const AUDIO_TEMPO: f64 = 1.05;

/// A named, fixed combination of video and audio filter parameters
#[derive(Debug, Clone, PartialEq)]
pub struct FilterPreset {
    /// Display name, unique within the registry
    pub name: &'static str,
    /// Ordered filter-graph segments, joined with `,` when rendered
    pub video_segments: &'static [&'static str],
    /// Multiplier handed to the `atempo` audio filter
    pub audio_tempo: f64,
}

impl FilterPreset {
    /// Render the `-vf` argument. Whitespace is stripped from every segment.
    pub fn video_filter(&self) -> String {
        self.video_segments
            .iter()
            .map(|segment| segment.split_whitespace().collect::<String>())
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Render the `-af` argument
    pub fn audio_filter(&self) -> String {
        format!("atempo={}", self.audio_tempo)
    }
}

static PRESETS: [FilterPreset; 4] = [
    FilterPreset {
        name: "1. Cinematic (Darker, Sharper)",
        video_segments: &[
            "eq=brightness=-0.05:contrast=1.2:saturation=1.4",
            "unsharp=5:5:1.0:5:5:0.0",
            "setpts=PTS/1.05",
        ],
        audio_tempo: AUDIO_TEMPO,
    },
    FilterPreset {
        name: "2. Bright & Sharpened",
        video_segments: &[
            "unsharp=5:5:1.0:5:5:0.0",
            "eq=brightness=0.02:contrast=1.05:saturation=1.4",
            "setpts=PTS/1.05",
        ],
        audio_tempo: AUDIO_TEMPO,
    },
    FilterPreset {
        name: "3. 4K Look (High Detail & Contrast)",
        video_segments: &[
            "unsharp=5:5:1.5:5:5:0.0",
            "eq=saturation=1.5:contrast=1.2:gamma=1.1",
            "setpts=PTS/1.05",
        ],
        audio_tempo: AUDIO_TEMPO,
    },
    FilterPreset {
        name: "4. Simple Speed Change (Safe Bypass)",
        video_segments: &["setpts=PTS/1.05"],
        audio_tempo: AUDIO_TEMPO,
    },
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown filter preset \"{name}\"; available presets: {}", names().join(", "))]
pub struct UnknownPresetError {
    pub name: String,
}

/// All registered presets in display order
pub fn presets() -> &'static [FilterPreset] {
    &PRESETS
}

/// Registered display names in display order
pub fn names() -> Vec<&'static str> {
    PRESETS.iter().map(|p| p.name).collect()
}

/// Look up a preset by its display name
pub fn resolve(name: &str) -> Result<&'static FilterPreset, UnknownPresetError> {
    PRESETS
        .iter()
        .find(|p| p.name == name)
        .ok_or_else(|| UnknownPresetError {
            name: name.to_string(),
        })
}

/// Preset selected when nothing else is configured
pub fn default_preset() -> &'static FilterPreset {
    &PRESETS[0]
}

/// The speed-only chain, suggested whenever a heavier chain is rejected
pub fn fallback() -> &'static FilterPreset {
    &PRESETS[PRESETS.len() - 1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_registry_has_four_presets_in_order() {
        let names = names();
        assert_eq!(names.len(), 4);
        assert_eq!(names[0], "1. Cinematic (Darker, Sharper)");
        assert_eq!(names[3], "4. Simple Speed Change (Safe Bypass)");
        assert_eq!(default_preset().name, names[0]);
        assert_eq!(fallback().name, names[3]);
    }

    #[test]
    fn test_simple_speed_change_chain() {
        let preset = resolve("4. Simple Speed Change (Safe Bypass)").unwrap();
        assert_eq!(preset.video_filter(), "setpts=PTS/1.05");
        assert_eq!(preset.audio_filter(), "atempo=1.05");
    }

    #[test]
    fn test_cinematic_chain_joins_segments_in_order() {
        let preset = resolve("1. Cinematic (Darker, Sharper)").unwrap();
        assert_eq!(
            preset.video_filter(),
            "eq=brightness=-0.05:contrast=1.2:saturation=1.4,unsharp=5:5:1.0:5:5:0.0,setpts=PTS/1.05"
        );
    }

    #[test]
    fn test_every_preset_shares_the_audio_tempo() {
        for preset in presets() {
            assert_eq!(preset.audio_tempo, AUDIO_TEMPO);
            assert!(!preset.video_filter().contains(char::is_whitespace));
        }
    }

    #[test]
    fn test_unknown_preset_lists_alternatives() {
        let err = resolve("5. Does Not Exist").unwrap_err();
        assert_eq!(err.name, "5. Does Not Exist");
        let msg = err.to_string();
        assert!(msg.contains("5. Does Not Exist"));
        assert!(msg.contains("2. Bright & Sharpened"));
    }

    proptest! {
        /// Resolving the same name twice yields byte-identical chains
        #[test]
        fn test_resolve_is_pure(index in 0usize..4) {
            let name = names()[index];
            let first = resolve(name).unwrap().video_filter();
            let second = resolve(name).unwrap().video_filter();
            prop_assert_eq!(first.as_bytes(), second.as_bytes());
        }

        #[test]
        fn test_unregistered_names_never_resolve(name in "[a-zA-Z0-9 ]{0,40}") {
            prop_assume!(!names().contains(&name.as_str()));
            prop_assert!(resolve(&name).is_err());
        }
    }
}
