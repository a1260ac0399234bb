//! Static phrase tables consulted by the text heuristics.
//!
//! Phrases are complete expressions rather than single words so that ads merely
//! mentioning animals or fees are not misread. Bump [`PHRASEBOOK_VERSION`] whenever
//! an entry is added or removed.

pub const PHRASEBOOK_VERSION: u32 = 3;

pub const PET_BAN_PHRASES: &[&str] = &[
    "без животных",
    "без домашних животных",
    "животные запрещены",
    "не с животными",
    "без питомцев",
    "питомцы запрещены",
    "животных не держать",
    "без кошек",
    "без собак",
    "кошек и собак не держать",
    "проживание с животными запрещено",
    "проживание с животными не допускается",
    "животных не заводить",
    "no pets",
    "without pets",
    "pets prohibited",
    "pets not allowed",
    "no animals",
    "no cats",
    "no dogs",
];

pub const NO_COMMISSION_MARKERS: &[&str] = &[
    "без комиссии",
    "без комиссий",
    "нет комиссии",
    "комиссии нет",
    "no commission",
    "commission free",
    "commission-free",
    "no agent fee",
];

/// Words a source may print in front of the fee itself ("комиссия 50%").
pub const COMMISSION_PREFIXES: &[&str] = &["комиссия", "commission", "agent fee"];

/// Versioned set of phrase tables handed to the matching engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhraseBook {
    pub version: u32,
    pub pet_ban: &'static [&'static str],
    pub no_commission: &'static [&'static str],
    pub commission_prefixes: &'static [&'static str],
}

impl PhraseBook {
    pub const CURRENT: PhraseBook = PhraseBook {
        version: PHRASEBOOK_VERSION,
        pet_ban: PET_BAN_PHRASES,
        no_commission: NO_COMMISSION_MARKERS,
        commission_prefixes: COMMISSION_PREFIXES,
    };

    pub fn mentions_pet_ban(&self, text: &str) -> bool {
        contains_any(text, self.pet_ban)
    }

    pub fn mentions_no_commission(&self, text: &str) -> bool {
        contains_any(text, self.no_commission)
    }
}

impl Default for PhraseBook {
    fn default() -> Self {
        Self::CURRENT
    }
}

/// Case-insensitive substring search over `phrases`.
pub fn contains_any(text: &str, phrases: &[&str]) -> bool {
    let lower = text.to_lowercase();
    phrases.iter().any(|phrase| lower.contains(phrase))
}
