//! Value completers.

use std::ops::BitOr;
use std::sync::Arc;

/// A value completer for an option or parameter.
///
/// The completer receives the value prefix the user has typed so far
/// and returns the candidate suffixes that would complete it, together
/// with presentation hints.
///
/// For example, with candidate values `Richard`, `Roger` and `Robert`:
///
/// ```text
/// "R"   -> ["ichard", "oger", "obert"]
/// "Ro"  -> ["ger", "bert"]
/// "Rog" -> ["er"]
/// "Rol" -> []
/// ```
pub type Completer = Arc<dyn Fn(&str) -> (Vec<String>, CompleterFlags) + Send + Sync>;

/// Hints returned by a [`Completer`] alongside its candidates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompleterFlags(u32);

impl CompleterFlags {
    /// No hints.
    pub const NONE: CompleterFlags = CompleterFlags(0);

    /// The shell should not append a space after the completion.
    ///
    /// Useful for completions that end at a path separator, where the
    /// user is expected to keep typing the rest of the path.
    pub const NO_SPACE: CompleterFlags = CompleterFlags(1);

    /// Returns true if all flags in `other` are set in `self`.
    pub fn contains(self, other: CompleterFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for CompleterFlags {
    type Output = CompleterFlags;

    fn bitor(self, rhs: CompleterFlags) -> CompleterFlags {
        CompleterFlags(self.0 | rhs.0)
    }
}

/// Returns a completer that chooses from a fixed set of strings.
pub fn complete_strings(set: &[&str]) -> Completer {
    // Own a copy so the completer does not borrow the caller's slice.
    let set: Vec<String> = set.iter().map(|s| s.to_string()).collect();

    Arc::new(move |prefix: &str| {
        let out = set
            .iter()
            .filter(|member| member.len() > prefix.len() && member.starts_with(prefix))
            .map(|member| member[prefix.len()..].to_string())
            .collect();
        (out, CompleterFlags::NONE)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complete_strings() {
        let complete = complete_strings(&["Richard", "Roger", "Robert"]);

        let (out, flags) = complete("R");
        assert_eq!(out, ["ichard", "oger", "obert"]);
        assert_eq!(flags, CompleterFlags::NONE);

        let (out, _) = complete("Ro");
        assert_eq!(out, ["ger", "bert"]);

        let (out, _) = complete("Rog");
        assert_eq!(out, ["er"]);

        let (out, _) = complete("Rol");
        assert!(out.is_empty());

        // A full match has nothing left to append.
        let (out, _) = complete("Richard");
        assert!(out.is_empty());
    }

    #[test]
    fn test_flags() {
        let flags = CompleterFlags::NONE | CompleterFlags::NO_SPACE;
        assert!(flags.contains(CompleterFlags::NO_SPACE));
        assert!(!CompleterFlags::NONE.contains(CompleterFlags::NO_SPACE));
    }
}
