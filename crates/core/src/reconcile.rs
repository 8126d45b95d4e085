//! Cross-system reconciliation.
//!
//! Turns one date's registry encounters into a set of candidates, each an encounter without a
//! video joined to a unique patient identifier, and then resolves a candidate to exactly one
//! archive study and series.
//!
//! The pure steps ([`partition_encounters`], [`unique_tracked_entities`],
//! [`join_patient_identifiers`]) carry the decision logic and are tested without any HTTP; the
//! [`Reconciler`] only sequences them around the remote calls.

use crate::config::ProgramProfile;
use crate::error::DataQualityIssue;
use chrono::NaiveDate;
use cinelink_types::{ArchiveId, Uid};
use imaging::{ImagingClient, ImagingResult};
use registry::{Encounter, RegistryClient, RegistryResult, TrackedEntity};
use std::collections::{BTreeMap, HashMap};

/// An encounter without a video that can be matched against the archive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Candidate {
    pub encounter_id: String,
    pub tracked_entity: String,
    pub patient_identifier: String,
    pub classification: String,
    /// Video slots of the encounter's classification, in ordinal order.
    pub slots: Vec<Uid>,
}

/// Step 1 output.
#[derive(Debug, Default)]
pub struct Partition {
    pub with_video: Vec<Encounter>,
    pub without_video: Vec<PendingEncounter>,
    pub issues: Vec<DataQualityIssue>,
}

/// An encounter without a video, with its classification already validated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingEncounter {
    pub encounter: Encounter,
    pub classification: String,
    pub slots: Vec<Uid>,
}

/// Split encounters by whether their first video slot is populated.
///
/// Encounters with no classification, or one the slot map does not know, land in neither half.
pub fn partition_encounters(encounters: Vec<Encounter>, profile: &ProgramProfile) -> Partition {
    let mut partition = Partition::default();
    let pathology_field = profile.pathology_field.as_str();

    for encounter in encounters {
        let Some(classification) = encounter.value(pathology_field).map(|v| v.trim().to_string())
        else {
            partition.issues.push(DataQualityIssue::MissingPathology {
                encounter: encounter.id.clone(),
            });
            continue;
        };

        let Some(slots) = profile.slots.slots_for(&classification) else {
            partition.issues.push(DataQualityIssue::UnknownPathology {
                encounter: encounter.id.clone(),
                value: classification,
            });
            continue;
        };

        let first_slot_filled = slots
            .first()
            .is_some_and(|field| encounter.has_value(field.as_str()));
        if first_slot_filled {
            partition.with_video.push(encounter);
        } else {
            let slots = slots.to_vec();
            partition.without_video.push(PendingEncounter {
                encounter,
                classification,
                slots,
            });
        }
    }

    partition
}

/// Drop encounters whose tracked entity is referenced more than once, or not at all.
pub fn unique_tracked_entities(
    pending: Vec<PendingEncounter>,
) -> (Vec<PendingEncounter>, Vec<DataQualityIssue>) {
    let mut issues = Vec::new();
    let mut by_entity: BTreeMap<String, Vec<PendingEncounter>> = BTreeMap::new();

    for item in pending {
        match item.encounter.tracked_entity.clone() {
            Some(entity) => by_entity.entry(entity).or_default().push(item),
            None => issues.push(DataQualityIssue::MissingTrackedEntity {
                encounter: item.encounter.id.clone(),
            }),
        }
    }

    let mut unique = Vec::new();
    for (tracked_entity, mut items) in by_entity {
        if items.len() == 1 {
            unique.append(&mut items);
        } else {
            issues.push(DataQualityIssue::DuplicateTrackedEntity {
                tracked_entity,
                encounters: items.into_iter().map(|i| i.encounter.id).collect(),
            });
        }
    }

    (unique, issues)
}

/// Join pending encounters to their patient identifiers.
///
/// `pending` must hold one encounter per tracked entity. Identifiers shared by more than one
/// tracked entity exclude all of them.
pub fn join_patient_identifiers(
    pending: Vec<PendingEncounter>,
    entities: &[TrackedEntity],
    identifier_attribute: &Uid,
) -> (Vec<Candidate>, Vec<DataQualityIssue>) {
    let mut issues = Vec::new();
    let by_id: HashMap<&str, &TrackedEntity> =
        entities.iter().map(|e| (e.id.as_str(), e)).collect();
    let mut by_identifier: BTreeMap<String, Vec<Candidate>> = BTreeMap::new();

    for item in pending {
        // unique_tracked_entities guarantees a reference
        let Some(tracked_entity) = item.encounter.tracked_entity.clone() else {
            continue;
        };
        let Some(entity) = by_id.get(tracked_entity.as_str()) else {
            issues.push(DataQualityIssue::TrackedEntityNotReturned {
                tracked_entity,
                encounter: item.encounter.id,
            });
            continue;
        };
        let Some(identifier) = entity.attribute(identifier_attribute.as_str()) else {
            issues.push(DataQualityIssue::MissingPatientIdentifier {
                tracked_entity,
                encounter: item.encounter.id,
            });
            continue;
        };

        by_identifier
            .entry(identifier.to_string())
            .or_default()
            .push(Candidate {
                encounter_id: item.encounter.id,
                tracked_entity,
                patient_identifier: identifier.to_string(),
                classification: item.classification,
                slots: item.slots,
            });
    }

    let mut candidates = Vec::new();
    for (identifier, mut group) in by_identifier {
        if group.len() == 1 {
            candidates.append(&mut group);
        } else {
            issues.push(DataQualityIssue::DuplicatePatientIdentifier {
                identifier,
                encounters: group.into_iter().map(|c| c.encounter_id).collect(),
            });
        }
    }

    (candidates, issues)
}

/// Registry-side view of one date, ready for archive lookups.
#[derive(Debug)]
pub struct ReconciliationTable {
    pub date: NaiveDate,
    pub encounters: usize,
    pub with_video: usize,
    pub without_video: usize,
    pub candidates: Vec<Candidate>,
    pub issues: Vec<DataQualityIssue>,
}

/// The archive-side match for a candidate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatchedStudy {
    pub study: ArchiveId,
    pub series: ArchiveId,
    /// Instances in series order.
    pub instances: Vec<ArchiveId>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// No study on that date; nothing to do.
    NoStudy,
    Skipped(DataQualityIssue),
    Matched(MatchedStudy),
}

/// Matches registry encounters to archive studies.
pub struct Reconciler<'a> {
    registry: &'a RegistryClient,
    imaging: &'a ImagingClient,
    profile: &'a ProgramProfile,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        registry: &'a RegistryClient,
        imaging: &'a ImagingClient,
        profile: &'a ProgramProfile,
    ) -> Self {
        Self {
            registry,
            imaging,
            profile,
        }
    }

    /// Fetch and reconcile the registry side for `date`.
    ///
    /// Every issue found is logged as it is collected.
    ///
    /// # Errors
    ///
    /// Registry transport failures propagate; data problems never do.
    pub async fn prepare(&self, date: NaiveDate) -> RegistryResult<ReconciliationTable> {
        let encounters = self
            .registry
            .fetch_encounters(&self.profile.scope, &self.profile.date_field, date)
            .await?;
        let total = encounters.len();

        let partition = partition_encounters(encounters, self.profile);
        let mut issues = partition.issues;
        let with_video = partition.with_video.len();
        let without_video = partition.without_video.len();
        tracing::info!(
            %date,
            encounters = total,
            with_video,
            without_video,
            "partitioned encounters"
        );

        let (pending, duplicates) = unique_tracked_entities(partition.without_video);
        issues.extend(duplicates);

        let ids: Vec<String> = pending
            .iter()
            .filter_map(|p| p.encounter.tracked_entity.clone())
            .collect();
        let entities = if ids.is_empty() {
            Vec::new()
        } else {
            self.registry.fetch_tracked_entities(&ids).await?
        };

        let (candidates, join_issues) = join_patient_identifiers(
            pending,
            &entities,
            &self.profile.patient_identifier_attribute,
        );
        issues.extend(join_issues);

        for issue in &issues {
            issue.log();
        }
        tracing::info!(%date, candidates = candidates.len(), "reconciled registry encounters");

        Ok(ReconciliationTable {
            date,
            encounters: total,
            with_video,
            without_video,
            candidates,
            issues,
        })
    }

    /// Find the single study and series for a candidate on `date`.
    ///
    /// # Errors
    ///
    /// Archive transport failures propagate; ambiguity is reported as [`Resolution::Skipped`].
    pub async fn resolve(&self, candidate: &Candidate, date: NaiveDate) -> ImagingResult<Resolution> {
        let identifier = &candidate.patient_identifier;
        let studies = self.imaging.find_studies(identifier, date).await?;

        let study = match studies.as_slice() {
            [] => {
                tracing::info!(
                    encounter = %candidate.encounter_id,
                    patient = %identifier,
                    %date,
                    "no study found"
                );
                return Ok(Resolution::NoStudy);
            }
            [study] => study,
            _ => {
                return Ok(Resolution::Skipped(DataQualityIssue::AmbiguousStudy {
                    identifier: identifier.clone(),
                    studies: studies.iter().map(|s| s.id.to_string()).collect(),
                }));
            }
        };

        let series = match study.series.as_slice() {
            [series] => series,
            other => {
                return Ok(Resolution::Skipped(DataQualityIssue::AmbiguousSeries {
                    identifier: identifier.clone(),
                    study: study.id.to_string(),
                    series: other.len(),
                }));
            }
        };

        let instances = self.imaging.series_instances(series).await?;
        if instances.len() > candidate.slots.len() {
            return Ok(Resolution::Skipped(DataQualityIssue::TooManyInstances {
                encounter: candidate.encounter_id.clone(),
                instances: instances.len(),
                slots: candidate.slots.len(),
            }));
        }

        tracing::debug!(
            encounter = %candidate.encounter_id,
            study = %study.id,
            series = %series,
            instances = instances.len(),
            "matched study"
        );

        Ok(Resolution::Matched(MatchedStudy {
            study: study.id.clone(),
            series: series.clone(),
            instances,
        }))
    }
}
