//! Study lookup by patient identifier and acquisition date.

use crate::client::{read_json, ImagingClient};
use crate::ImagingResult;
use chrono::NaiveDate;
use cinelink_types::ArchiveId;
use reqwest::Method;
use serde::{Deserialize, Serialize};

/// One imaging session as returned by the archive's study query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Study {
    pub id: ArchiveId,
    pub parent_patient: ArchiveId,
    /// Acquisition date, when the archive reports a parseable one.
    pub date: Option<NaiveDate>,
    /// Series ids in archive order.
    pub series: Vec<ArchiveId>,
}

// ============================================================================
// Wire model
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct FindRequestWire<'a> {
    level: &'static str,
    expand: bool,
    query: FindQueryWire<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct FindQueryWire<'a> {
    #[serde(rename = "PatientID")]
    patient_id: &'a str,
    study_date: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StudyWire {
    #[serde(rename = "ID")]
    id: ArchiveId,
    parent_patient: ArchiveId,
    #[serde(default)]
    series: Vec<ArchiveId>,
    #[serde(default)]
    main_dicom_tags: StudyTagsWire,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StudyTagsWire {
    #[serde(default)]
    study_date: Option<String>,
}

impl From<StudyWire> for Study {
    fn from(wire: StudyWire) -> Self {
        let date = wire
            .main_dicom_tags
            .study_date
            .as_deref()
            .and_then(|d| NaiveDate::parse_from_str(d.trim(), "%Y%m%d").ok());

        Self {
            id: wire.id,
            parent_patient: wire.parent_patient,
            date,
            series: wire.series,
        }
    }
}

impl ImagingClient {
    /// Find the studies of `patient_identifier` acquired on `date`.
    ///
    /// An empty result is a normal outcome. Deciding what to do with several matches is left to
    /// the caller.
    pub async fn find_studies(
        &self,
        patient_identifier: &str,
        date: NaiveDate,
    ) -> ImagingResult<Vec<Study>> {
        let url = self.url("tools/find");
        let body = FindRequestWire {
            level: "Study",
            expand: true,
            query: FindQueryWire {
                patient_id: patient_identifier,
                study_date: date.format("%Y%m%d").to_string(),
            },
        };

        tracing::debug!(%url, patient = patient_identifier, %date, "querying studies");
        let response = self.request(Method::POST, &url).json(&body).send().await?;
        let wire: Vec<StudyWire> = read_json(response, &url).await?;

        Ok(wire.into_iter().map(Study::from).collect())
    }
}
