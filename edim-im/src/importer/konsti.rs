//! Konsti signup system integration
//!
//! Konsti reads the `konsti` dimension to decide which programs it manages and
//! how. The dimension is hidden from listings and detail views.

use edim_common::dimensions::{DimensionSpec, DimensionValueSpec};
use edim_common::LocalizedText;

pub const KONSTI_DIMENSION_SLUG: &str = "konsti";

/// Program types understood by Konsti; slugs are Konsti's own identifiers
const KONSTI_PROGRAM_TYPES: &[(&str, &str, &str)] = &[
    ("tabletopRPG", "Pöytäroolipeli", "Tabletop RPG"),
    ("larp", "Larppi", "LARP"),
    ("tournament", "Turnaus", "Tournament"),
    ("workshop", "Työpaja", "Workshop"),
    ("experiencePoint", "Kokemuspiste", "Experience point"),
    ("other", "Muu", "Other"),
    ("fleamarket", "Kirpputori", "Flea market"),
];

pub fn konsti_dimension() -> DimensionSpec {
    DimensionSpec::new(
        KONSTI_DIMENSION_SLUG,
        LocalizedText::from_pairs([("fi", "Konsti-ohjelmatyyppi"), ("en", "Konsti program type")]),
    )
    .hidden()
    .choices(
        KONSTI_PROGRAM_TYPES
            .iter()
            .map(|(slug, fi, en)| {
                DimensionValueSpec::new(*slug, LocalizedText::from_pairs([("fi", *fi), ("en", *en)]))
            })
            .collect(),
    )
}

/// Whether a slug names a Konsti program type
pub fn is_konsti_program_type(slug: &str) -> bool {
    KONSTI_PROGRAM_TYPES.iter().any(|(s, _, _)| *s == slug)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_konsti_dimension_is_hidden() {
        let spec = konsti_dimension();
        assert!(!spec.is_list_filter);
        assert!(!spec.is_shown_in_detail);
        assert!(spec.choice_slugs().contains(&"fleamarket"));
        assert!(is_konsti_program_type("tabletopRPG"));
        assert!(!is_konsti_program_type("rpg"));
    }
}
