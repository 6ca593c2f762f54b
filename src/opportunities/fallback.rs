//! Static career pages used when no live posting can be found.

use crate::models::{FallbackLink, FallbackReason, OpportunitySection};

/// Known-good career pages of fusion organizations.
pub const FALLBACK_LINKS: &[FallbackLink] = &[
    FallbackLink {
        label: "ITER Organization (vacancies and traineeships)",
        url: "https://www.iter.org/jobs",
    },
    FallbackLink {
        label: "EUROfusion (PhD and engineering grants)",
        url: "https://euro-fusion.org/careers/",
    },
    FallbackLink {
        label: "Princeton Plasma Physics Laboratory (internships)",
        url: "https://www.pppl.gov/careers",
    },
    FallbackLink {
        label: "Max Planck Institute for Plasma Physics (theses and jobs)",
        url: "https://www.ipp.mpg.de/jobs",
    },
    FallbackLink {
        label: "UK Atomic Energy Authority (graduate scheme)",
        url: "https://careers.ukaea.uk/",
    },
    FallbackLink {
        label: "Commonwealth Fusion Systems",
        url: "https://cfs.energy/careers",
    },
    FallbackLink {
        label: "Tokamak Energy",
        url: "https://tokamakenergy.com/careers/",
    },
    FallbackLink {
        label: "General Fusion",
        url: "https://generalfusion.com/careers/",
    },
];

/// Fallback section carrying `reason`.
pub fn section(reason: FallbackReason) -> OpportunitySection {
    OpportunitySection::Fallback {
        reason,
        links: FALLBACK_LINKS.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_list_is_never_empty() {
        let s = section(FallbackReason::NoResults);
        assert!(s.is_fallback());
        assert_eq!(s.len(), 0);
        assert!(matches!(&s, OpportunitySection::Fallback { links, .. } if links.len() == FALLBACK_LINKS.len()));
        assert!(FALLBACK_LINKS.iter().all(|l| l.url.starts_with("https://")));
    }
}
