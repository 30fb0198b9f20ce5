use serde::ser::{Serialize, SerializeMap, Serializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct VoiceEntry {
    pub id: &'static str,
    pub name: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grade: Option<&'static str>,
}

const fn graded(id: &'static str, name: &'static str, grade: &'static str) -> VoiceEntry {
    VoiceEntry {
        id,
        name,
        grade: Some(grade),
    }
}

const fn ungraded(id: &'static str, name: &'static str) -> VoiceEntry {
    VoiceEntry {
        id,
        name,
        grade: None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct LanguageVoices {
    #[serde(skip_serializing)]
    pub lang: &'static str,
    pub female: &'static [VoiceEntry],
    pub male: &'static [VoiceEntry],
}

/// Voices selectable through `/synthesize`, keyed by language then gender.
///
/// Serializes as a JSON object that keeps declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoiceCatalog(&'static [LanguageVoices]);

impl Serialize for VoiceCatalog {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for lang in self.0 {
            map.serialize_entry(lang.lang, lang)?;
        }
        map.end()
    }
}

pub const CATALOG: VoiceCatalog = VoiceCatalog(&[
    LanguageVoices {
        lang: "en-us",
        female: &[
            graded("af_heart", "Heart", "A-"),
            graded("af_bella", "Bella", "A-"),
            graded("af_nicole", "Nicole", "B-"),
            graded("af_sarah", "Sarah", "C+"),
            graded("af_nova", "Nova", "C"),
            graded("af_sky", "Sky", "C-"),
            graded("af_alloy", "Alloy", "C"),
            graded("af_aoede", "Aoede", "C+"),
            graded("af_kore", "Kore", "C+"),
            graded("af_jessica", "Jessica", "D"),
            graded("af_river", "River", "D"),
        ],
        male: &[
            graded("am_fenrir", "Fenrir", "C+"),
            graded("am_puck", "Puck", "C+"),
            graded("am_michael", "Michael", "C+"),
            graded("am_adam", "Adam", "F+"),
            graded("am_echo", "Echo", "D"),
            graded("am_eric", "Eric", "D"),
            graded("am_liam", "Liam", "D"),
            graded("am_onyx", "Onyx", "D"),
            graded("am_santa", "Santa", "D-"),
        ],
    },
    LanguageVoices {
        lang: "en-gb",
        female: &[
            ungraded("bf_alice", "Alice"),
            ungraded("bf_emma", "Emma"),
            ungraded("bf_isabella", "Isabella"),
            ungraded("bf_lily", "Lily"),
        ],
        male: &[
            ungraded("bm_daniel", "Daniel"),
            ungraded("bm_fable", "Fable"),
            ungraded("bm_george", "George"),
            ungraded("bm_lewis", "Lewis"),
        ],
    },
]);
