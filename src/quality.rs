//! Quality tiers and their format fallback chains.
//!
//! A [`QualityTier`] is what the user asks for. The media endpoint is asked
//! for an ordered list of concrete [`CipherFormat`] candidates, most preferred
//! first, and grants the best one the account and catalog can serve. The
//! chains are kept as data in [`QualityTier::TABLE`] so that adding a tier
//! means adding a row.
//!
//! | Tier       | Candidates                    | Premium |
//! |------------|-------------------------------|---------|
//! | `Low`      | `MP3_128`                     | no      |
//! | `Standard` | `MP3_320`, `MP3_128`          | yes     |
//! | `Lossless` | `FLAC`, `MP3_320`, `MP3_128`  | yes     |

use std::{fmt, str::FromStr};

use crate::{
    error::Error,
    protocol::media::{Cipher, CipherFormat, Format},
};

/// User-facing audio quality preference.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum QualityTier {
    /// 128 kbps MP3
    #[default]
    Low,
    /// 320 kbps MP3
    Standard,
    /// FLAC
    Lossless,
}

const BF_CBC_STRIPE_MP3_128: CipherFormat = CipherFormat {
    cipher: Cipher::BF_CBC_STRIPE,
    format: Format::MP3_128,
};

const BF_CBC_STRIPE_MP3_320: CipherFormat = CipherFormat {
    cipher: Cipher::BF_CBC_STRIPE,
    format: Format::MP3_320,
};

const BF_CBC_STRIPE_FLAC: CipherFormat = CipherFormat {
    cipher: Cipher::BF_CBC_STRIPE,
    format: Format::FLAC,
};

/// One row of the fallback table.
#[derive(Copy, Clone, Debug)]
pub struct Tier {
    pub quality: QualityTier,
    pub premium: bool,
    pub candidates: &'static [CipherFormat],
}

impl QualityTier {
    /// Ordered table from tier to candidate list, lowest tier first.
    pub const TABLE: [Tier; 3] = [
        Tier {
            quality: Self::Low,
            premium: false,
            candidates: &[BF_CBC_STRIPE_MP3_128],
        },
        Tier {
            quality: Self::Standard,
            premium: true,
            candidates: &[BF_CBC_STRIPE_MP3_320, BF_CBC_STRIPE_MP3_128],
        },
        Tier {
            quality: Self::Lossless,
            premium: true,
            candidates: &[
                BF_CBC_STRIPE_FLAC,
                BF_CBC_STRIPE_MP3_320,
                BF_CBC_STRIPE_MP3_128,
            ],
        },
    ];

    fn tier(self) -> Tier {
        // Every variant has exactly one row, at the index of its discriminant.
        Self::TABLE[self as usize]
    }

    /// Format candidates to request, most preferred first.
    #[must_use]
    pub fn candidates(self) -> &'static [CipherFormat] {
        self.tier().candidates
    }

    /// The format this tier asks for first.
    #[must_use]
    pub fn preferred(self) -> Format {
        self.candidates()[0].format
    }

    /// Whether only premium accounts may request this tier.
    #[must_use]
    pub fn requires_premium(self) -> bool {
        self.tier().premium
    }
}

/// Maps a delivered format back to the tier it belongs to.
///
/// Unknown MP3 bitrates count as `Low`.
impl From<Format> for QualityTier {
    fn from(format: Format) -> Self {
        match format {
            Format::FLAC => Self::Lossless,
            Format::MP3_320 => Self::Standard,
            Format::MP3_128 | Format::MP3_64 | Format::MP3_MISC => Self::Low,
        }
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Low => "low",
            Self::Standard => "standard",
            Self::Lossless => "lossless",
        };
        write!(f, "{name}")
    }
}

impl FromStr for QualityTier {
    type Err = Error;

    /// Parses a tier by name or by its preferred format.
    ///
    /// Accepts `low`/`mp3_128`, `standard`/`mp3_320` and `lossless`/`flac`,
    /// case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" | "mp3_128" => Ok(Self::Low),
            "standard" | "mp3_320" => Ok(Self::Standard),
            "lossless" | "flac" => Ok(Self::Lossless),
            _ => Err(Error::invalid_argument(format!("invalid quality: {s}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_rows_match_their_tier() {
        for (index, tier) in QualityTier::TABLE.iter().enumerate() {
            assert_eq!(tier.quality as usize, index);
            assert!(!tier.candidates.is_empty());
            assert_eq!(QualityTier::from(tier.candidates[0].format), tier.quality);
        }
    }

    #[test]
    fn lossless_falls_back_through_lower_tiers() {
        let formats: Vec<Format> = QualityTier::Lossless
            .candidates()
            .iter()
            .map(|candidate| candidate.format)
            .collect();
        assert_eq!(formats, [Format::FLAC, Format::MP3_320, Format::MP3_128]);
    }

    #[test]
    fn only_low_is_free() {
        assert!(!QualityTier::Low.requires_premium());
        assert!(QualityTier::Standard.requires_premium());
        assert!(QualityTier::Lossless.requires_premium());
    }

    #[test]
    fn parses_names_and_formats() {
        assert_eq!("flac".parse::<QualityTier>().unwrap(), QualityTier::Lossless);
        assert_eq!("MP3_320".parse::<QualityTier>().unwrap(), QualityTier::Standard);
        assert_eq!("low".parse::<QualityTier>().unwrap(), QualityTier::Low);
        assert!("hifi".parse::<QualityTier>().is_err());
    }
}
