//! File-size distribution profiles.
//!
//! A [`Profile`] describes how a site's data is spread across file sizes:
//! an overall size range and a set of weighted categories. Building a
//! [`Distribution`] from a profile draws one overall total and splits it
//! between the categories by weight.
//!
//! | profile  | overall total      | large            | medium             | small              |
//! |----------|--------------------|------------------|--------------------|--------------------|
//! | `medium` | 300 MiB – 2000 MiB | 1–5 MiB, 10%     | 400 KiB–1 MiB, 60% | 150–400 KiB, 30%   |
//! | `large`  | 5 GiB – 10 GiB     | 1–20 MiB, 45%    | 400 KiB–1 MiB, 35% | 150–400 KiB, 20%   |

use rand::Rng;

use crate::category::SizeCategory;
use crate::{GIB, KIB, MIB};

/// Profile used when a name is empty or unknown.
pub const DEFAULT_PROFILE: &str = "medium";

/// One weighted category inside a [`Profile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CategorySpec {
    /// Category name.
    pub name: &'static str,
    /// Smallest file size in bytes.
    pub min_bytes: u64,
    /// Largest file size in bytes.
    pub max_bytes: u64,
    /// Share of the overall total, in percent.
    pub weight_percent: u64,
}

/// A named distribution template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Profile {
    /// Profile key as accepted on the command line.
    pub name: &'static str,
    /// Lower bound of the overall total (inclusive).
    pub min_total_bytes: u64,
    /// Upper bound of the overall total (inclusive).
    pub max_total_bytes: u64,
    /// Weighted categories; weights sum to 100.
    pub categories: &'static [CategorySpec],
}

const LARGE_FILES_SMALL_SITE: CategorySpec = CategorySpec {
    name: "large",
    min_bytes: MIB,
    max_bytes: 5 * MIB,
    weight_percent: 10,
};

const MEDIUM_FILES: CategorySpec = CategorySpec {
    name: "medium",
    min_bytes: 400 * KIB,
    max_bytes: MIB,
    weight_percent: 60,
};

const SMALL_FILES: CategorySpec = CategorySpec {
    name: "small",
    min_bytes: 150 * KIB,
    max_bytes: 400 * KIB,
    weight_percent: 30,
};

/// A typical site: 300 MiB to 2000 MiB, mostly medium-sized files.
pub const MEDIUM: Profile = Profile {
    name: "medium",
    min_total_bytes: 300 * MIB,
    max_total_bytes: 2000 * MIB,
    categories: &[LARGE_FILES_SMALL_SITE, MEDIUM_FILES, SMALL_FILES],
};

/// A heavy site: 5 GiB to 10 GiB, dominated by large media files.
pub const LARGE: Profile = Profile {
    name: "large",
    min_total_bytes: 5 * GIB,
    max_total_bytes: 10 * GIB,
    categories: &[
        CategorySpec {
            name: "large",
            min_bytes: MIB,
            max_bytes: 20 * MIB,
            weight_percent: 45,
        },
        CategorySpec {
            weight_percent: 35,
            ..MEDIUM_FILES
        },
        CategorySpec {
            weight_percent: 20,
            ..SMALL_FILES
        },
    ],
};

/// All built-in profiles, default first.
pub const PROFILES: &[Profile] = &[MEDIUM, LARGE];

impl Profile {
    /// Look up a profile by name (case-insensitive).
    pub fn lookup(name: &str) -> Option<&'static Profile> {
        let name = name.trim();
        PROFILES
            .iter()
            .find(|profile| profile.name.eq_ignore_ascii_case(name))
    }

    /// Look up a profile by name, falling back to [`DEFAULT_PROFILE`].
    pub fn from_name(name: &str) -> &'static Profile {
        Self::lookup(name).unwrap_or(&PROFILES[0])
    }

    /// Names of all built-in profiles.
    pub fn names() -> impl Iterator<Item = &'static str> {
        PROFILES.iter().map(|profile| profile.name)
    }

    /// Sum of the category weights (100 for every built-in profile).
    pub fn total_weight(&self) -> u64 {
        self.categories.iter().map(|c| c.weight_percent).sum()
    }
}

/// An ordered set of size categories sharing one randomized overall total.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Distribution {
    /// Name of the profile this distribution was built from.
    pub profile: &'static str,
    /// Overall total drawn from the profile's range.
    pub total_bytes: u64,
    /// Categories in profile order.
    pub categories: Vec<SizeCategory>,
}

impl Distribution {
    /// Build a distribution from a profile name.
    ///
    /// Empty or unknown names use the default profile; this never fails.
    pub fn build<R: Rng + ?Sized>(profile_name: &str, rng: &mut R) -> Self {
        Self::from_profile(Profile::from_name(profile_name), rng)
    }

    /// Build a distribution from a profile.
    ///
    /// Draws the overall total uniformly from
    /// `[min_total_bytes, max_total_bytes]` and gives each category
    /// `floor(total * weight / 100)` bytes.
    pub fn from_profile<R: Rng + ?Sized>(profile: &Profile, rng: &mut R) -> Self {
        let total_bytes = rng.gen_range(profile.min_total_bytes..=profile.max_total_bytes);
        Self::with_total(profile, total_bytes)
    }

    /// Split a known overall total between a profile's categories.
    pub fn with_total(profile: &Profile, total_bytes: u64) -> Self {
        let categories = profile
            .categories
            .iter()
            .map(|spec| {
                let target =
                    (u128::from(total_bytes) * u128::from(spec.weight_percent) / 100) as u64;
                SizeCategory::new(spec.name, spec.min_bytes, spec.max_bytes, target)
            })
            .collect();

        Self {
            profile: profile.name,
            total_bytes,
            categories,
        }
    }

    /// Sum of all category targets.
    ///
    /// Equals `total_bytes` up to integer rounding (less than one byte per
    /// category).
    pub fn target_total_bytes(&self) -> u64 {
        self.categories.iter().map(|c| c.target_total_bytes).sum()
    }

    /// Sum of bytes generated so far across all categories.
    pub fn generated_bytes(&self) -> u64 {
        self.categories.iter().map(SizeCategory::generated_bytes).sum()
    }

    /// True once every category has reached its target.
    pub fn is_done(&self) -> bool {
        self.categories.iter().all(SizeCategory::is_done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn weights(profile: &Profile) -> Vec<u64> {
        profile.categories.iter().map(|c| c.weight_percent).collect()
    }

    #[test]
    fn every_profile_weighs_one_hundred_percent() {
        for profile in PROFILES {
            assert_eq!(profile.total_weight(), 100, "profile {}", profile.name);
            assert!(profile.min_total_bytes <= profile.max_total_bytes);
        }
    }

    #[test]
    fn built_in_weights_match_site_shapes() {
        assert_eq!(weights(&MEDIUM), vec![10, 60, 30]);
        assert_eq!(weights(&LARGE), vec![45, 35, 20]);
    }

    #[test]
    fn unknown_and_empty_names_fall_back_to_medium() {
        assert_eq!(Profile::from_name("").name, "medium");
        assert_eq!(Profile::from_name("enormous").name, "medium");
        assert_eq!(Profile::from_name("large").name, "large");
        assert_eq!(Profile::from_name(" LARGE ").name, "large");
        assert!(Profile::lookup("enormous").is_none());
    }

    #[test]
    fn names_lists_default_first() {
        let names: Vec<_> = Profile::names().collect();
        assert_eq!(names, vec![DEFAULT_PROFILE, "large"]);
    }

    #[test]
    fn total_is_drawn_within_profile_bounds() {
        let mut rng = StdRng::seed_from_u64(99);
        for profile in PROFILES {
            for _ in 0..200 {
                let dist = Distribution::from_profile(profile, &mut rng);
                assert!(dist.total_bytes >= profile.min_total_bytes);
                assert!(dist.total_bytes <= profile.max_total_bytes);
            }
        }
    }

    #[test]
    fn category_targets_sum_to_total_within_rounding() {
        let mut rng = StdRng::seed_from_u64(7);
        for name in ["medium", "large", "unknown"] {
            for _ in 0..100 {
                let dist = Distribution::build(name, &mut rng);
                let sum = dist.target_total_bytes();
                assert!(sum <= dist.total_bytes);
                assert!(
                    dist.total_bytes - sum < dist.categories.len() as u64,
                    "rounding loss too large for {name}: total={} sum={sum}",
                    dist.total_bytes
                );
            }
        }
    }

    #[test]
    fn medium_split_is_ten_sixty_thirty() {
        let total = 1_000 * MIB;
        let dist = Distribution::with_total(&MEDIUM, total);

        let targets: Vec<u64> = dist.categories.iter().map(|c| c.target_total_bytes).collect();
        assert_eq!(targets, vec![total / 10, total * 6 / 10, total * 3 / 10]);

        let names: Vec<&str> = dist.categories.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["large", "medium", "small"]);
    }

    #[test]
    fn large_split_is_forty_five_thirty_five_twenty() {
        let total = 8 * GIB + 3;
        let dist = Distribution::with_total(&LARGE, total);

        let targets: Vec<u64> = dist.categories.iter().map(|c| c.target_total_bytes).collect();
        assert_eq!(
            targets,
            vec![total * 45 / 100, total * 35 / 100, total * 20 / 100]
        );
        assert_eq!(dist.categories[0].max_bytes(), 20 * MIB);
    }

    #[test]
    fn fresh_distribution_has_generated_nothing() {
        let mut rng = StdRng::seed_from_u64(3);
        let dist = Distribution::build("large", &mut rng);
        assert_eq!(dist.generated_bytes(), 0);
        assert!(!dist.is_done());
    }

    #[test]
    fn same_seed_builds_same_distribution() {
        let a = Distribution::build("medium", &mut StdRng::seed_from_u64(11));
        let b = Distribution::build("medium", &mut StdRng::seed_from_u64(11));
        assert_eq!(a, b);
    }
}
