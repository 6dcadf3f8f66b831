//! Language codes understood by the translation layer.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::Error;

/// A language the platform can detect, store and translate between.
///
/// Stored and serialised as a lowercase BCP-47-ish code (`"ko"`, `"zh-tw"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LanguageCode {
  Ko,
  En,
  Ja,
  Zh,
  ZhTw,
  Vi,
  Th,
  Ru,
  Ar,
  Id,
  Mn,
}

impl LanguageCode {
  pub const ALL: [LanguageCode; 11] = [
    Self::Ko,
    Self::En,
    Self::Ja,
    Self::Zh,
    Self::ZhTw,
    Self::Vi,
    Self::Th,
    Self::Ru,
    Self::Ar,
    Self::Id,
    Self::Mn,
  ];

  pub fn code(self) -> &'static str {
    match self {
      Self::Ko => "ko",
      Self::En => "en",
      Self::Ja => "ja",
      Self::Zh => "zh",
      Self::ZhTw => "zh-tw",
      Self::Vi => "vi",
      Self::Th => "th",
      Self::Ru => "ru",
      Self::Ar => "ar",
      Self::Id => "id",
      Self::Mn => "mn",
    }
  }

  /// Human-readable English name, used when instructing the generator.
  pub fn english_name(self) -> &'static str {
    match self {
      Self::Ko => "Korean",
      Self::En => "English",
      Self::Ja => "Japanese",
      Self::Zh => "Simplified Chinese",
      Self::ZhTw => "Traditional Chinese",
      Self::Vi => "Vietnamese",
      Self::Th => "Thai",
      Self::Ru => "Russian",
      Self::Ar => "Arabic",
      Self::Id => "Indonesian",
      Self::Mn => "Mongolian",
    }
  }
}

impl fmt::Display for LanguageCode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.code()) }
}

impl FromStr for LanguageCode {
  type Err = Error;

  /// Accepts the canonical code plus the common provider spellings
  /// (`"KO"`, `"zh_TW"`, `"zh-Hant"`, `"en-US"`).
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let norm = s.trim().to_ascii_lowercase().replace('_', "-");
    let lang = match norm.as_str() {
      "zh-tw" | "zh-hant" | "zh-hk" => Self::ZhTw,
      "zh" | "zh-cn" | "zh-hans" => Self::Zh,
      other => {
        let primary = other.split('-').next().unwrap_or(other);
        match primary {
          "ko" => Self::Ko,
          "en" => Self::En,
          "ja" => Self::Ja,
          "vi" => Self::Vi,
          "th" => Self::Th,
          "ru" => Self::Ru,
          "ar" => Self::Ar,
          "id" => Self::Id,
          "mn" => Self::Mn,
          _ => return Err(Error::UnknownLanguage(s.to_owned())),
        }
      }
    };
    Ok(lang)
  }
}

impl Serialize for LanguageCode {
  fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(self.code())
  }
}

impl<'de> Deserialize<'de> for LanguageCode {
  fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
    let raw = String::deserialize(d)?;
    raw.parse().map_err(serde::de::Error::custom)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_provider_spellings() {
    assert_eq!("KO".parse::<LanguageCode>().unwrap(), LanguageCode::Ko);
    assert_eq!("en-US".parse::<LanguageCode>().unwrap(), LanguageCode::En);
    assert_eq!("zh_TW".parse::<LanguageCode>().unwrap(), LanguageCode::ZhTw);
    assert_eq!("ZH-HANS".parse::<LanguageCode>().unwrap(), LanguageCode::Zh);
    assert!("xx".parse::<LanguageCode>().is_err());
  }

  #[test]
  fn every_code_parses_back() {
    for lang in LanguageCode::ALL {
      assert_eq!(lang.code().parse::<LanguageCode>().unwrap(), lang);
    }
  }

  #[test]
  fn serde_uses_lowercase_code() {
    let json = serde_json::to_string(&LanguageCode::ZhTw).unwrap();
    assert_eq!(json, "\"zh-tw\"");
  }
}
