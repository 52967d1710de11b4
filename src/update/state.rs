//! Auto-update preference and the answers to the enable-updates prompt.

use std::fmt;

/// Persisted auto-update preference.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AutoUpdatePreference {
    /// Keep the cached engine current automatically.
    Enabled,
    /// Never contact the update channel.
    Disabled,
    /// The user has not been asked yet (default).
    #[default]
    Unset,
}

impl AutoUpdatePreference {
    /// Returns `true` unless the preference is [`Self::Unset`].
    pub fn is_set(self) -> bool {
        !matches!(self, Self::Unset)
    }
}

impl From<Option<bool>> for AutoUpdatePreference {
    fn from(value: Option<bool>) -> Self {
        match value {
            Some(true) => Self::Enabled,
            Some(false) => Self::Disabled,
            None => Self::Unset,
        }
    }
}

impl fmt::Display for AutoUpdatePreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Enabled => write!(f, "enabled"),
            Self::Disabled => write!(f, "disabled"),
            Self::Unset => write!(f, "unset"),
        }
    }
}

/// Answer to "Would you like to enable auto-updates?".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoUpdateAnswer {
    /// Enable and remember.
    Yes,
    /// Update this session only; nothing is persisted.
    JustOnce,
    /// Disable and remember.
    No,
}

impl AutoUpdateAnswer {
    /// Prompt options, in display order.
    pub const OPTIONS: [&'static str; 3] = ["Yes", "Just Once", "No"];

    /// Map a prompt choice back to an answer.
    pub fn from_choice(choice: &str) -> Option<Self> {
        match choice {
            "Yes" => Some(Self::Yes),
            "Just Once" => Some(Self::JustOnce),
            "No" => Some(Self::No),
            _ => None,
        }
    }

    /// Whether updates run this session.
    pub fn enables(self) -> bool {
        !matches!(self, Self::No)
    }

    /// The value to persist, if any.
    pub fn persisted(self) -> Option<bool> {
        match self {
            Self::Yes => Some(true),
            Self::No => Some(false),
            Self::JustOnce => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preference_default_is_unset() {
        assert_eq!(AutoUpdatePreference::default(), AutoUpdatePreference::Unset);
        assert!(!AutoUpdatePreference::Unset.is_set());
        assert!(AutoUpdatePreference::Disabled.is_set());
    }

    #[test]
    fn preference_from_stored_value() {
        assert_eq!(
            AutoUpdatePreference::from(Some(true)),
            AutoUpdatePreference::Enabled
        );
        assert_eq!(
            AutoUpdatePreference::from(Some(false)),
            AutoUpdatePreference::Disabled
        );
        assert_eq!(AutoUpdatePreference::from(None), AutoUpdatePreference::Unset);
    }

    #[test]
    fn preference_display() {
        assert_eq!(AutoUpdatePreference::Enabled.to_string(), "enabled");
        assert_eq!(AutoUpdatePreference::Disabled.to_string(), "disabled");
        assert_eq!(AutoUpdatePreference::Unset.to_string(), "unset");
    }

    #[test]
    fn every_option_maps_to_an_answer() {
        for option in AutoUpdateAnswer::OPTIONS {
            assert!(AutoUpdateAnswer::from_choice(option).is_some(), "{option}");
        }
        assert_eq!(AutoUpdateAnswer::from_choice("Maybe"), None);
    }

    #[test]
    fn just_once_enables_without_persisting() {
        let answer = AutoUpdateAnswer::JustOnce;
        assert!(answer.enables());
        assert_eq!(answer.persisted(), None);

        assert_eq!(AutoUpdateAnswer::Yes.persisted(), Some(true));
        assert!(!AutoUpdateAnswer::No.enables());
        assert_eq!(AutoUpdateAnswer::No.persisted(), Some(false));
    }
}
