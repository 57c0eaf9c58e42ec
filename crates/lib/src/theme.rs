//! PDF theme and script selection by language.

use std::path::{Path, PathBuf};

/// Writing system a language is rendered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptGroup {
  Latin,
  Cyrillic,
  Cjk,
}

impl ScriptGroup {
  /// Prefix of the theme file shared by the group.
  pub fn theme_prefix(&self) -> &'static str {
    match self {
      ScriptGroup::Latin => "en",
      ScriptGroup::Cyrillic => "ukr",
      ScriptGroup::Cjk => "zh",
    }
  }
}

const LATIN: &[&str] = &["EN", "DE", "FR", "ES", "IT", "PT", "CZ", "NL"];
const CYRILLIC: &[&str] = &["RU", "UKR"];
const CJK: &[&str] = &["ZH", "JA", "KO"];

pub const DEFAULT_THEME: &str = "default-theme.yml";

pub fn script_group(language: &str) -> Option<ScriptGroup> {
  let lang = language.to_ascii_uppercase();
  if LATIN.contains(&lang.as_str()) {
    Some(ScriptGroup::Latin)
  } else if CYRILLIC.contains(&lang.as_str()) {
    Some(ScriptGroup::Cyrillic)
  } else if CJK.contains(&lang.as_str()) {
    Some(ScriptGroup::Cjk)
  } else {
    None
  }
}

/// Value of the asciidoctor-pdf `scripts` attribute, if the language needs one.
pub fn scripts_attribute(language: &str) -> Option<&'static str> {
  match script_group(language)? {
    ScriptGroup::Cjk => Some("cjk"),
    ScriptGroup::Cyrillic => Some("cyrillic"),
    ScriptGroup::Latin => None,
  }
}

/// Theme file names to try for `language`, most specific first.
pub fn theme_candidates(language: &str) -> Vec<String> {
  let mut names = vec![format!("{}-theme.yml", language.to_ascii_lowercase())];
  if let Some(group) = script_group(language) {
    let shared = format!("{}-theme.yml", group.theme_prefix());
    if !names.contains(&shared) {
      names.push(shared);
    }
  }
  names.push(DEFAULT_THEME.to_string());
  names
}

/// First existing theme in `theme_dir` for `language`.
///
/// `None` means the renderer's built-in theme is used.
pub fn resolve_theme(theme_dir: &Path, language: &str) -> Option<PathBuf> {
  theme_candidates(language)
    .into_iter()
    .map(|name| theme_dir.join(name))
    .find(|path| path.is_file())
}

#[cfg(test)]
mod tests {
  use tempfile::TempDir;

  use super::*;

  #[test]
  fn groups() {
    assert_eq!(script_group("de"), Some(ScriptGroup::Latin));
    assert_eq!(script_group("UKR"), Some(ScriptGroup::Cyrillic));
    assert_eq!(script_group("JA"), Some(ScriptGroup::Cjk));
    assert_eq!(script_group("XX"), None);
    assert_eq!(scripts_attribute("KO"), Some("cjk"));
    assert_eq!(scripts_attribute("RU"), Some("cyrillic"));
    assert_eq!(scripts_attribute("EN"), None);
  }

  #[test]
  fn candidates_dedupe_group_theme() {
    assert_eq!(theme_candidates("EN"), vec!["en-theme.yml", "default-theme.yml"]);
    assert_eq!(
      theme_candidates("RU"),
      vec!["ru-theme.yml", "ukr-theme.yml", "default-theme.yml"]
    );
    assert_eq!(theme_candidates("XX"), vec!["xx-theme.yml", "default-theme.yml"]);
  }

  #[test]
  fn resolution_order() {
    let temp = TempDir::new().unwrap();
    assert_eq!(resolve_theme(temp.path(), "RU"), None);

    std::fs::write(temp.path().join("default-theme.yml"), "").unwrap();
    assert_eq!(resolve_theme(temp.path(), "RU"), Some(temp.path().join("default-theme.yml")));

    std::fs::write(temp.path().join("ukr-theme.yml"), "").unwrap();
    assert_eq!(resolve_theme(temp.path(), "RU"), Some(temp.path().join("ukr-theme.yml")));

    std::fs::write(temp.path().join("ru-theme.yml"), "").unwrap();
    assert_eq!(resolve_theme(temp.path(), "RU"), Some(temp.path().join("ru-theme.yml")));
  }
}
