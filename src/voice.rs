//! Voice selection: gender → ElevenLabs voice and fixed acoustic settings.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    #[default]
    Female,
}

impl Gender {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Male => "male",
            Self::Female => "female",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "male" => Some(Self::Male),
            "female" => Some(Self::Female),
            _ => None,
        }
    }

    pub fn profile(self) -> &'static VoiceProfile {
        match self {
            Self::Male => &ASAHI,
            Self::Female => &SAKURA,
        }
    }
}

impl std::fmt::Display for Gender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `voice_settings` object sent verbatim with every synthesis call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VoiceSettings {
    pub stability: f32,
    pub similarity_boost: f32,
    pub use_speaker_boost: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f32>,
}

#[derive(Debug)]
pub struct VoiceProfile {
    pub name: &'static str,
    pub voice_id: &'static str,
    pub settings: VoiceSettings,
}

static ASAHI: VoiceProfile = VoiceProfile {
    name: "Asahi",
    voice_id: "GKDaBI8TKSBJVhsCLD6n",
    settings: VoiceSettings {
        stability: 0.5,
        similarity_boost: 0.14,
        use_speaker_boost: true,
        speed: None,
    },
};

static SAKURA: VoiceProfile = VoiceProfile {
    name: "Sakura",
    voice_id: "RBnMinrYKeccY3vaUxlZ",
    settings: VoiceSettings {
        stability: 0.5,
        similarity_boost: 0.75,
        use_speaker_boost: true,
        speed: Some(0.9),
    },
};
