pub mod controller;
pub mod game;
pub mod oracle;
pub mod score;
pub mod shuffle;

use rand::Rng;

/// How many questions one session asks the generator for.
pub const BATCH_SIZE: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum GameMode {
    /// Show a character, pick its Bopomofo.
    #[serde(rename = "看字選音")]
    CharToSound,
    /// Show Bopomofo, pick the character.
    #[serde(rename = "看音選字")]
    SoundToChar,
}

impl GameMode {
    pub const ALL: [GameMode; 2] = [GameMode::CharToSound, GameMode::SoundToChar];

    /// The tag sent to the question service. Doubles as the button label.
    pub fn tag(&self) -> &'static str {
        match self {
            GameMode::CharToSound => "看字選音",
            GameMode::SoundToChar => "看音選字",
        }
    }

    pub fn from_tag(tag: &str) -> Option<GameMode> {
        GameMode::ALL.into_iter().find(|mode| mode.tag() == tag)
    }
}

impl std::fmt::Display for GameMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// A question as the generator returns it: three distractors, answer kept apart.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RawQuestion {
    pub question: String,
    pub options: Vec<String>,
    pub answer: String,
    pub hint: String,
}

/// A question ready to be played. `options` holds the four shuffled choices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub prompt: String,
    pub options: Vec<String>,
    pub answer: String,
    pub hint: String,
}

impl Question {
    pub fn new(prompt: String, options: Vec<String>, answer: String, hint: String) -> Self {
        Self {
            prompt,
            options,
            answer,
            hint,
        }
    }

    /// Mixes the answer in with the distractors. Shuffled once, here, and never again.
    pub fn from_raw<R: Rng + ?Sized>(raw: RawQuestion, rng: &mut R) -> Self {
        let options = shuffle::shuffle_options(&raw.options, &raw.answer, rng);
        Self::new(raw.question, options, raw.answer, raw.hint)
    }

    pub fn is_correct(&self, option: &str) -> bool {
        self.answer == option
    }

    pub fn has_option(&self, option: &str) -> bool {
        self.options.iter().any(|o| o == option)
    }
}
