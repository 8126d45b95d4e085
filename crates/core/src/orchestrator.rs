//! Per-date sequencing of reconciliation, media generation and upload.
//!
//! Candidates are processed one at a time: resolve the study, generate one video per instance,
//! place the videos into slots, then upload and attach them in slot order. Cancellation is
//! checked before each candidate and during storage polls.

use crate::config::{CoreConfig, ProgramProfile};
use crate::error::{EncodeError, MediaError, PipelineError, PipelineResult, UploadError};
use crate::media::{assign_slots, FfmpegEncoder, MediaPipeline, VideoEncoder, VideoOutcome};
use crate::reconcile::{Candidate, MatchedStudy, Reconciler, Resolution};
use crate::shutdown::Shutdown;
use crate::upload::{PollPolicy, UploadCoordinator};
use chrono::{Days, NaiveDate};
use cinelink_files::ScratchSpace;
use imaging::ImagingClient;
use registry::RegistryClient;
use serde::Serialize;

/// What happened for one date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DateReport {
    pub date: NaiveDate,
    pub encounters: usize,
    pub with_video: usize,
    pub without_video: usize,
    pub candidates: usize,
    pub data_quality_issues: usize,
    pub no_study: usize,
    pub skipped_patients: usize,
    pub videos_generated: usize,
    pub rejected_instances: usize,
    pub encode_failures: usize,
    pub videos_attached: usize,
    pub upload_failures: usize,
}

impl DateReport {
    fn new(date: NaiveDate) -> Self {
        Self {
            date,
            encounters: 0,
            with_video: 0,
            without_video: 0,
            candidates: 0,
            data_quality_issues: 0,
            no_study: 0,
            skipped_patients: 0,
            videos_generated: 0,
            rejected_instances: 0,
            encode_failures: 0,
            videos_attached: 0,
            upload_failures: 0,
        }
    }
}

/// Outcome of a multi-date run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LookbackReport {
    pub reports: Vec<DateReport>,
    /// Dates that ended with an error.
    pub failed_dates: Vec<NaiveDate>,
    pub cancelled: bool,
}

/// Clients and scratch space built from a [`CoreConfig`], owned by the binaries for the
/// lifetime of a run.
pub struct Services {
    pub registry: RegistryClient,
    pub imaging: ImagingClient,
    pub scratch: ScratchSpace,
    pub encoder: FfmpegEncoder,
}

impl Services {
    pub fn from_config(config: &CoreConfig) -> PipelineResult<Self> {
        Ok(Self {
            registry: RegistryClient::new(config.registry().clone())?,
            imaging: ImagingClient::new(config.imaging().clone())?,
            scratch: ScratchSpace::new(config.scratch_dir())?,
            encoder: FfmpegEncoder::new(config.ffmpeg()),
        })
    }

    pub fn orchestrator<'a>(
        &'a self,
        profile: &'a ProgramProfile,
        shutdown: Shutdown,
    ) -> Orchestrator<'a> {
        Orchestrator::new(
            &self.registry,
            &self.imaging,
            &self.scratch,
            &self.encoder,
            profile,
            shutdown,
        )
    }
}

pub struct Orchestrator<'a> {
    registry: &'a RegistryClient,
    imaging: &'a ImagingClient,
    scratch: &'a ScratchSpace,
    encoder: &'a dyn VideoEncoder,
    profile: &'a ProgramProfile,
    shutdown: Shutdown,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        registry: &'a RegistryClient,
        imaging: &'a ImagingClient,
        scratch: &'a ScratchSpace,
        encoder: &'a dyn VideoEncoder,
        profile: &'a ProgramProfile,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            registry,
            imaging,
            scratch,
            encoder,
            profile,
            shutdown,
        }
    }

    /// Process every encounter of `date`.
    ///
    /// # Errors
    ///
    /// Transport failures outside the upload step end the date with
    /// [`PipelineError::Registry`] or [`PipelineError::Imaging`]; a failing encoder binary with
    /// [`PipelineError::Encode`]; shutdown with [`PipelineError::Cancelled`].
    pub async fn run_date(&self, date: NaiveDate) -> PipelineResult<DateReport> {
        tracing::info!(%date, "starting date");
        let mut report = DateReport::new(date);
        let reconciler = Reconciler::new(self.registry, self.imaging, self.profile);

        let table = reconciler.prepare(date).await?;
        report.encounters = table.encounters;
        report.with_video = table.with_video;
        report.without_video = table.without_video;
        report.candidates = table.candidates.len();
        report.data_quality_issues = table.issues.len();

        for candidate in &table.candidates {
            if self.shutdown.is_cancelled() {
                tracing::warn!(%date, "shutdown requested, stopping");
                return Err(PipelineError::Cancelled);
            }

            match reconciler.resolve(candidate, date).await? {
                Resolution::NoStudy => report.no_study += 1,
                Resolution::Skipped(issue) => {
                    issue.log();
                    report.data_quality_issues += 1;
                    report.skipped_patients += 1;
                }
                Resolution::Matched(matched) => {
                    self.process_candidate(candidate, matched, &mut report)
                        .await?;
                }
            }
        }

        tracing::info!(
            %date,
            candidates = report.candidates,
            generated = report.videos_generated,
            attached = report.videos_attached,
            rejected = report.rejected_instances,
            "finished date"
        );
        Ok(report)
    }

    async fn process_candidate(
        &self,
        candidate: &Candidate,
        matched: MatchedStudy,
        report: &mut DateReport,
    ) -> PipelineResult<()> {
        let encounter = candidate.encounter_id.as_str();
        let media = MediaPipeline::new(self.imaging, self.scratch, self.encoder, &self.profile.media);

        let mut videos = Vec::with_capacity(matched.instances.len());
        for instance in matched.instances {
            match media.generate_video(&instance).await {
                Ok(VideoOutcome::Generated(path)) => {
                    report.videos_generated += 1;
                    videos.push((instance, path));
                }
                Ok(VideoOutcome::Rejected(_)) => report.rejected_instances += 1,
                Err(MediaError::Encode(err @ EncodeError::Failed { .. })) => {
                    tracing::error!(encounter, %instance, error = %err, "encoding failed");
                    report.encode_failures += 1;
                }
                Err(err) => {
                    for (_, path) in &videos {
                        if let Err(discard) = self.scratch.discard_video(path) {
                            tracing::warn!(
                                video = %path.display(),
                                error = %discard,
                                "could not discard video"
                            );
                        }
                    }
                    return Err(err.into());
                }
            }
        }

        let (assigned, overflow) = assign_slots(encounter, videos, &candidate.slots);
        for path in &overflow {
            self.scratch.discard_video(path)?;
        }

        let mut uploader = UploadCoordinator::new(
            self.registry,
            self.scratch,
            &self.profile.scope.program,
            PollPolicy::from(&self.profile.upload),
            self.shutdown.clone(),
        );

        let mut pending = assigned.iter();
        while let Some(video) = pending.next() {
            match uploader
                .upload_and_attach(encounter, &video.path, &video.field)
                .await
            {
                Ok(handle) => {
                    report.videos_attached += 1;
                    tracing::info!(
                        encounter,
                        instance = %video.instance,
                        slot = video.slot_index,
                        field = %video.field,
                        file_resource = %handle,
                        "video attached"
                    );
                }
                Err(UploadError::Cancelled { .. }) => {
                    self.scratch.discard_video(&video.path)?;
                    for rest in pending.by_ref() {
                        self.scratch.discard_video(&rest.path)?;
                    }
                    return Err(PipelineError::Cancelled);
                }
                Err(err) => {
                    tracing::error!(
                        encounter,
                        slot = video.slot_index,
                        error = %err,
                        "upload failed, abandoning remaining slots"
                    );
                    report.upload_failures += 1;
                    self.scratch.discard_video(&video.path)?;
                    for rest in pending.by_ref() {
                        self.scratch.discard_video(&rest.path)?;
                    }
                    break;
                }
            }
        }

        Ok(())
    }

    /// Process `days` dates ending at `from`, newest first.
    ///
    /// A failing date is logged and the loop moves on; cancellation stops it.
    pub async fn run_lookback(&self, from: NaiveDate, days: u32) -> LookbackReport {
        let mut summary = LookbackReport::default();

        for offset in 0..days {
            let Some(date) = from.checked_sub_days(Days::new(u64::from(offset))) else {
                break;
            };

            match self.run_date(date).await {
                Ok(report) => summary.reports.push(report),
                Err(PipelineError::Cancelled) => {
                    summary.cancelled = true;
                    break;
                }
                Err(err) => {
                    tracing::error!(%date, error = %err, "date failed");
                    summary.failed_dates.push(date);
                }
            }
        }

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::test_profile;
    use crate::testing::{
        imaging_client, mount_instance, mount_status_sequence, mount_upload, registry_client,
        RecordingEncoder,
    };
    use cinelink_types::ArchiveId;
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PATHOLOGY: &str = "H2vzpa4ZFCf";
    const IDENTIFIER: &str = "ofdWjpgwzfe";

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()
    }

    fn event(id: &str, tei: &str, pathology: &str) -> Value {
        json!({
            "event": id,
            "trackedEntityInstance": tei,
            "dataValues": [{"dataElement": PATHOLOGY, "value": pathology}]
        })
    }

    fn tei(id: &str, identifier: &str) -> Value {
        json!({
            "trackedEntityInstance": id,
            "attributes": [{"attribute": IDENTIFIER, "value": identifier}]
        })
    }

    async fn mount_registry(server: &MockServer, events: Vec<Value>, teis: Vec<Value>) {
        Mock::given(method("GET"))
            .and(path("/api/events.json"))
            .and(query_param("filter", "aY2MfS8YVdd:eq:2024-03-05"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "pager": {"page": 1},
                "events": events
            })))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/trackedEntityInstances.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "trackedEntityInstances": teis
            })))
            .mount(server)
            .await;
    }

    async fn mount_study(server: &MockServer, patient: &str, series: &[&str], instances: &[&str]) {
        Mock::given(method("POST"))
            .and(path("/tools/find"))
            .and(body_partial_json(json!({"Query": {"PatientID": patient}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                "ID": format!("study-{patient}"),
                "ParentPatient": format!("patient-{patient}"),
                "MainDicomTags": {"StudyDate": "20240305"},
                "Series": series,
            }])))
            .mount(server)
            .await;
        for s in series {
            Mock::given(method("GET"))
                .and(path(format!("/series/{s}")))
                .respond_with(
                    ResponseTemplate::new(200).set_body_json(json!({"ID": s, "Instances": instances})),
                )
                .mount(server)
                .await;
        }
    }

    async fn mount_attach(server: &MockServer, event: &str, field: &str, expected: u64) {
        Mock::given(method("PUT"))
            .and(path(format!("/api/events/{event}/{field}")))
            .respond_with(ResponseTemplate::new(200))
            .expect(expected)
            .mount(server)
            .await;
    }

    struct Harness {
        registry_server: MockServer,
        imaging_server: MockServer,
        temp: TempDir,
        encoder: RecordingEncoder,
    }

    impl Harness {
        async fn new() -> Self {
            Self {
                registry_server: MockServer::start().await,
                imaging_server: MockServer::start().await,
                temp: TempDir::new().unwrap(),
                encoder: RecordingEncoder::default(),
            }
        }

        async fn run(&self) -> PipelineResult<DateReport> {
            self.run_with(Shutdown::never()).await
        }

        async fn run_with(&self, shutdown: Shutdown) -> PipelineResult<DateReport> {
            let registry = registry_client(&self.registry_server);
            let imaging = imaging_client(&self.imaging_server);
            let scratch = ScratchSpace::new(self.temp.path()).unwrap();
            let mut profile = test_profile();
            profile.upload.poll_interval = std::time::Duration::from_millis(1);
            Orchestrator::new(&registry, &imaging, &scratch, &self.encoder, &profile, shutdown)
                .run_date(date())
                .await
        }
    }

    #[tokio::test]
    async fn three_instances_fill_the_first_three_slots() {
        let h = Harness::new().await;
        mount_registry(
            &h.registry_server,
            vec![event("e1", "t1", "1")],
            vec![tei("t1", "P-100")],
        )
        .await;
        mount_study(&h.imaging_server, "P-100", &["s1"], &["i1", "i2", "i3"]).await;
        for instance in ["i1", "i2", "i3"] {
            mount_instance(&h.imaging_server, instance, 45).await;
        }
        mount_upload(&h.registry_server, "fr-1", "PENDING").await;
        mount_status_sequence(&h.registry_server, "fr-1", &["STORED"]).await;
        for field in ["rXdrl3bPegQ", "uZAhzWxZ7Er", "SZHbLco7bNr"] {
            mount_attach(&h.registry_server, "e1", field, 1).await;
        }
        for field in ["DZCtmkLFDRQ", "H8yuwsOTmgY"] {
            mount_attach(&h.registry_server, "e1", field, 0).await;
        }

        let report = h.run().await.unwrap();

        assert_eq!(report.candidates, 1);
        assert_eq!(report.videos_generated, 3);
        assert_eq!(report.videos_attached, 3);
        assert_eq!(h.encoder.jobs().len(), 3);
        assert!(h.encoder.jobs().iter().all(|job| job.frames.len() == 45));
    }

    #[tokio::test]
    async fn two_series_skip_the_patient() {
        let h = Harness::new().await;
        mount_registry(
            &h.registry_server,
            vec![event("e1", "t1", "2")],
            vec![tei("t1", "P-100")],
        )
        .await;
        mount_study(&h.imaging_server, "P-100", &["s1", "s2"], &["i1"]).await;
        mount_attach(&h.registry_server, "e1", "g33y4QmwHz7", 0).await;

        let report = h.run().await.unwrap();

        assert_eq!(report.skipped_patients, 1);
        assert_eq!(report.videos_generated, 0);
        assert!(h.encoder.jobs().is_empty());
    }

    #[tokio::test]
    async fn short_instance_is_rejected_without_upload() {
        let h = Harness::new().await;
        mount_registry(
            &h.registry_server,
            vec![event("e1", "t1", "2")],
            vec![tei("t1", "P-100")],
        )
        .await;
        mount_study(&h.imaging_server, "P-100", &["s1"], &["i1"]).await;
        mount_instance(&h.imaging_server, "i1", 10).await;
        Mock::given(method("POST"))
            .and(path("/api/fileResources"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&h.registry_server)
            .await;

        let report = h.run().await.unwrap();

        assert_eq!(report.rejected_instances, 1);
        assert_eq!(report.videos_attached, 0);
    }

    #[tokio::test]
    async fn shared_identifier_excludes_both_encounters() {
        let h = Harness::new().await;
        mount_registry(
            &h.registry_server,
            vec![event("e1", "t1", "1"), event("e2", "t2", "2")],
            vec![tei("t1", "P-100"), tei("t2", "P-100")],
        )
        .await;
        Mock::given(method("POST"))
            .and(path("/tools/find"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(0)
            .mount(&h.imaging_server)
            .await;

        let report = h.run().await.unwrap();

        assert_eq!(report.without_video, 2);
        assert_eq!(report.candidates, 0);
        assert_eq!(report.data_quality_issues, 1);
    }

    #[tokio::test]
    async fn failed_encode_skips_only_that_instance() {
        let h = Harness {
            encoder: RecordingEncoder::failing(),
            ..Harness::new().await
        };
        mount_registry(
            &h.registry_server,
            vec![event("e1", "t1", "2")],
            vec![tei("t1", "P-100")],
        )
        .await;
        mount_study(&h.imaging_server, "P-100", &["s1"], &["i1"]).await;
        mount_instance(&h.imaging_server, "i1", 30).await;

        let report = h.run().await.unwrap();

        assert_eq!(report.encode_failures, 1);
        assert_eq!(report.videos_attached, 0);
    }

    #[tokio::test]
    async fn failures_stay_with_their_own_patient() {
        let h = Harness::new().await;
        mount_registry(
            &h.registry_server,
            vec![
                event("e1", "t1", "2"),
                event("e2", "t2", "1"),
                event("e3", "t3", "2"),
            ],
            vec![tei("t1", "P-100"), tei("t2", "P-200"), tei("t3", "P-300")],
        )
        .await;
        mount_study(&h.imaging_server, "P-100", &["s1a", "s1b"], &["i0"]).await;
        mount_study(&h.imaging_server, "P-200", &["s2"], &["i1", "i2"]).await;
        mount_study(&h.imaging_server, "P-300", &["s3"], &["i3"]).await;
        for instance in ["i1", "i2", "i3"] {
            mount_instance(&h.imaging_server, instance, 45).await;
        }
        mount_upload(&h.registry_server, "fr-1", "STORED").await;
        Mock::given(method("PUT"))
            .and(path("/api/events/e2/rXdrl3bPegQ"))
            .respond_with(ResponseTemplate::new(500).set_body_string("conflict"))
            .expect(1)
            .mount(&h.registry_server)
            .await;
        mount_attach(&h.registry_server, "e2", "uZAhzWxZ7Er", 0).await;
        mount_attach(&h.registry_server, "e3", "g33y4QmwHz7", 1).await;

        let report = h.run().await.unwrap();

        assert_eq!(report.candidates, 3);
        assert_eq!(report.skipped_patients, 1);
        assert_eq!(report.videos_generated, 3);
        assert_eq!(report.upload_failures, 1);
        assert_eq!(report.videos_attached, 1);
        let scratch = ScratchSpace::new(h.temp.path()).unwrap();
        for instance in ["i1", "i2", "i3"] {
            let video = scratch.video_path(&ArchiveId::parse(instance).unwrap());
            assert!(!video.exists(), "{} left behind", video.display());
        }
    }

    #[tokio::test]
    async fn archive_outage_discards_videos_of_the_encounter() {
        let h = Harness::new().await;
        mount_registry(
            &h.registry_server,
            vec![event("e1", "t1", "1")],
            vec![tei("t1", "P-100")],
        )
        .await;
        mount_study(&h.imaging_server, "P-100", &["s1"], &["i1", "i2"]).await;
        mount_instance(&h.imaging_server, "i1", 45).await;
        Mock::given(method("GET"))
            .and(path("/instances/i2"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&h.imaging_server)
            .await;

        let result = h.run().await;

        assert!(matches!(result, Err(PipelineError::Imaging(_))));
        assert_eq!(h.encoder.jobs().len(), 1);
        let scratch = ScratchSpace::new(h.temp.path()).unwrap();
        assert!(!scratch.video_path(&ArchiveId::parse("i1").unwrap()).exists());
    }

    #[tokio::test]
    async fn registry_outage_ends_the_date() {
        let h = Harness::new().await;
        Mock::given(method("GET"))
            .and(path("/api/events.json"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&h.registry_server)
            .await;

        let result = h.run().await;

        assert!(matches!(result, Err(PipelineError::Registry(_))));
    }

    #[tokio::test]
    async fn cancelled_run_stops_before_the_next_patient() {
        let h = Harness::new().await;
        mount_registry(
            &h.registry_server,
            vec![event("e1", "t1", "2")],
            vec![tei("t1", "P-100")],
        )
        .await;
        let (trigger, shutdown) = Shutdown::new();
        trigger.trigger();

        let result = h.run_with(shutdown).await;

        assert!(matches!(result, Err(PipelineError::Cancelled)));
    }

    #[tokio::test]
    async fn lookback_continues_past_failed_dates() {
        let registry_server = MockServer::start().await;
        let imaging_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/events.json"))
            .and(query_param("filter", "aY2MfS8YVdd:eq:2024-03-04"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&registry_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/events.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"events": []})))
            .mount(&registry_server)
            .await;
        let registry = registry_client(&registry_server);
        let imaging = imaging_client(&imaging_server);
        let temp = TempDir::new().unwrap();
        let scratch = ScratchSpace::new(temp.path()).unwrap();
        let encoder = RecordingEncoder::default();
        let profile = test_profile();
        let orchestrator = Orchestrator::new(
            &registry,
            &imaging,
            &scratch,
            &encoder,
            &profile,
            Shutdown::never(),
        );

        let summary = orchestrator.run_lookback(date(), 3).await;

        let dates: Vec<NaiveDate> = summary.reports.iter().map(|r| r.date).collect();
        assert_eq!(
            dates,
            vec![date(), NaiveDate::from_ymd_opt(2024, 3, 3).unwrap()]
        );
        assert_eq!(
            summary.failed_dates,
            vec![NaiveDate::from_ymd_opt(2024, 3, 4).unwrap()]
        );
        assert!(!summary.cancelled);
    }
}
