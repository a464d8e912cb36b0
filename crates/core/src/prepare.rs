use std::collections::{BTreeSet, HashMap, HashSet};

use crate::types::{
    CategoryAssignment, CategoryId, ExperienceLevel, FieldId, JobPosting, SeekerProfile,
};

/// Seeker preferences exactly as stored, before any shaping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeekerPreferencesRecord {
    pub experience_level_id: Option<i64>,
    pub preferred_category_ids: Vec<CategoryId>,
    pub preferred_field_ids: Vec<FieldId>,
}

/// One category row attached to a stored job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobCategoryRecord {
    pub category_id: CategoryId,
    pub field_id: Option<FieldId>,
}

/// Job attributes exactly as stored, before any shaping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobRecord {
    pub required_experience_level_id: Option<i64>,
    pub categories: Vec<JobCategoryRecord>,
}

/// Resolves categories to the field they belong to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryFieldLookup {
    fields: HashMap<CategoryId, FieldId>,
}

impl CategoryFieldLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, category_id: CategoryId, field_id: FieldId) {
        self.fields.insert(category_id, field_id);
    }

    pub fn field_of(&self, category_id: CategoryId) -> Option<FieldId> {
        self.fields.get(&category_id).copied()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl FromIterator<(CategoryId, FieldId)> for CategoryFieldLookup {
    fn from_iter<I: IntoIterator<Item = (CategoryId, FieldId)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

/// Shapes stored seeker preferences into a [`SeekerProfile`].
///
/// Explicit field preferences win. When none are stored, the fields of the
/// preferred categories stand in for them. Unknown experience levels are
/// treated as unset.
pub fn prepare_seeker(
    record: &SeekerPreferencesRecord,
    lookup: &CategoryFieldLookup,
) -> SeekerProfile {
    let preferred_category_ids: BTreeSet<CategoryId> =
        record.preferred_category_ids.iter().copied().collect();

    let preferred_field_ids: BTreeSet<FieldId> = if record.preferred_field_ids.is_empty() {
        preferred_category_ids
            .iter()
            .filter_map(|&category_id| lookup.field_of(category_id))
            .collect()
    } else {
        record.preferred_field_ids.iter().copied().collect()
    };

    SeekerProfile {
        experience_level: known_level(record.experience_level_id),
        preferred_category_ids,
        preferred_field_ids,
    }
}

/// Shapes a stored job into a [`JobPosting`].
///
/// Repeated categories keep their first occurrence. Rows missing a field are
/// resolved through `lookup` and dropped when that fails too.
pub fn prepare_job(record: &JobRecord, lookup: &CategoryFieldLookup) -> JobPosting {
    let mut seen = HashSet::new();
    let category_assignments = record
        .categories
        .iter()
        .filter(|row| seen.insert(row.category_id))
        .filter_map(|row| {
            let field_id = row.field_id.or_else(|| lookup.field_of(row.category_id))?;
            Some(CategoryAssignment {
                category_id: row.category_id,
                field_id,
            })
        })
        .collect();

    JobPosting {
        category_assignments,
        required_experience_level: known_level(record.required_experience_level_id),
    }
}

fn known_level(id: Option<i64>) -> Option<ExperienceLevel> {
    id.and_then(|value| ExperienceLevel::try_from(value).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::score;

    fn lookup() -> CategoryFieldLookup {
        [(5, 2), (9, 2), (10, 3), (99, 7)].into_iter().collect()
    }

    #[test]
    fn seeker_keeps_explicit_fields() {
        let record = SeekerPreferencesRecord {
            experience_level_id: Some(2),
            preferred_category_ids: vec![5, 5, 10],
            preferred_field_ids: vec![4],
        };

        let profile = prepare_seeker(&record, &lookup());
        assert_eq!(profile.experience_level, Some(ExperienceLevel::Mid));
        assert_eq!(profile.preferred_category_ids, BTreeSet::from([5, 10]));
        assert_eq!(profile.preferred_field_ids, BTreeSet::from([4]));
    }

    #[test]
    fn seeker_fields_fall_back_to_category_fields() {
        let record = SeekerPreferencesRecord {
            experience_level_id: None,
            preferred_category_ids: vec![5, 10, 404],
            preferred_field_ids: Vec::new(),
        };

        let profile = prepare_seeker(&record, &lookup());
        assert_eq!(profile.preferred_field_ids, BTreeSet::from([2, 3]));
    }

    #[test]
    fn unknown_levels_are_unset() {
        let record = SeekerPreferencesRecord {
            experience_level_id: Some(12),
            ..SeekerPreferencesRecord::default()
        };
        assert_eq!(prepare_seeker(&record, &lookup()).experience_level, None);

        let job = JobRecord {
            required_experience_level_id: Some(0),
            categories: Vec::new(),
        };
        assert_eq!(prepare_job(&job, &lookup()).required_experience_level, None);
    }

    #[test]
    fn empty_seeker_prepares_to_empty_profile() {
        let profile = prepare_seeker(&SeekerPreferencesRecord::default(), &lookup());
        assert_eq!(profile, SeekerProfile::default());
    }

    #[test]
    fn job_drops_duplicates_and_resolves_missing_fields() {
        let record = JobRecord {
            required_experience_level_id: Some(3),
            categories: vec![
                JobCategoryRecord {
                    category_id: 9,
                    field_id: None,
                },
                JobCategoryRecord {
                    category_id: 5,
                    field_id: Some(2),
                },
                JobCategoryRecord {
                    category_id: 9,
                    field_id: Some(8),
                },
                JobCategoryRecord {
                    category_id: 404,
                    field_id: None,
                },
            ],
        };

        let job = prepare_job(&record, &lookup());
        assert_eq!(
            job.category_assignments,
            vec![
                CategoryAssignment {
                    category_id: 9,
                    field_id: 2,
                },
                CategoryAssignment {
                    category_id: 5,
                    field_id: 2,
                },
            ]
        );
        assert_eq!(job.required_experience_level, Some(ExperienceLevel::Senior));
    }

    #[test]
    fn derived_fields_enable_fallback_scoring() {
        let seeker = prepare_seeker(
            &SeekerPreferencesRecord {
                experience_level_id: None,
                preferred_category_ids: vec![5],
                preferred_field_ids: Vec::new(),
            },
            &lookup(),
        );
        let job = prepare_job(
            &JobRecord {
                required_experience_level_id: None,
                categories: vec![
                    JobCategoryRecord {
                        category_id: 9,
                        field_id: Some(2),
                    },
                    JobCategoryRecord {
                        category_id: 10,
                        field_id: Some(3),
                    },
                ],
            },
            &lookup(),
        );

        assert_eq!(score(&seeker, &job).value(), 50);
    }
}
