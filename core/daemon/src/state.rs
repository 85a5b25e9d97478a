//! Shared daemon state: the store plus the core services wired over it.
//!
//! One `AppState` lives for the daemon's lifetime. The scan path builds
//! its resolver per request because the device fix and the scanner's IP
//! arrive with the request.

use std::sync::Arc;

use pawlink_core::{
    resume, ActivationRequest, ClaimCoordinator, ClaimOutcome, DeviceFix, EntryDecision,
    EntryRouter, LocationResolver, LostStateMachine, OwnerProfile, OwnerSession, PetRecord,
    Result, ScanAlertAggregator, ScanEvent, ScanLogStore, ScanRecorder, SessionSnapshot,
};
use pawlink_daemon_protocol::RecordScanParams;

use crate::config::DaemonConfig;
use crate::db::Db;
use crate::geo::{IpwhoClient, ProvidedFix};

pub struct AppState {
    db: Arc<Db>,
    config: DaemonConfig,
    claim: ClaimCoordinator,
    lost: LostStateMachine,
    entry: EntryRouter,
    alerts: ScanAlertAggregator,
}

impl AppState {
    pub fn new(db: Db, config: DaemonConfig) -> Self {
        let db = Arc::new(db);
        let claim = ClaimCoordinator::new(db.clone(), db.clone(), db.clone());
        let lost = LostStateMachine::new(db.clone());
        let entry = EntryRouter::new(db.clone(), db.clone(), db.clone());
        let alerts = ScanAlertAggregator::new(db.clone());
        AppState {
            db,
            config,
            claim,
            lost,
            entry,
            alerts,
        }
    }

    pub async fn entry_decision(&self, code: &str) -> Result<EntryDecision> {
        self.entry.entry_decision(code).await
    }

    pub async fn claim_or_authenticate(&self, code: &str, pin: &str) -> Result<ClaimOutcome> {
        self.claim.claim_or_authenticate(code, pin).await
    }

    pub async fn complete_claim(&self, owner: OwnerProfile) -> Result<OwnerSession> {
        self.claim.complete_claim(owner).await
    }

    pub async fn update_owner(
        &self,
        session: &OwnerSession,
        owner: OwnerProfile,
    ) -> Result<OwnerSession> {
        self.claim.update_owner(session, owner).await
    }

    pub async fn save_pet(&self, session: &OwnerSession, pet: PetRecord) -> Result<PetRecord> {
        self.claim.save_pet(session, pet).await
    }

    pub async fn activate_lost(
        &self,
        session: &OwnerSession,
        request: ActivationRequest,
    ) -> Result<PetRecord> {
        self.lost.activate(session, request).await
    }

    pub async fn deactivate_lost(&self, session: &OwnerSession, pin: &str) -> Result<PetRecord> {
        self.lost.deactivate(session, pin).await
    }

    /// Finder path. Never errors; a `None` means the scan log append
    /// failed, which the finder does not need to know about.
    pub async fn record_scan(&self, params: RecordScanParams) -> Option<String> {
        let fix = params.fix.map(|f| DeviceFix {
            lat: f.lat,
            lng: f.lng,
            accuracy_m: f.accuracy_m,
        });
        let ip_client = IpwhoClient::new(
            &self.config.ip_endpoint,
            params.device.remote_ip.clone(),
        );
        let resolver = LocationResolver::new(
            Arc::new(ProvidedFix::new(fix)),
            Arc::new(ip_client),
            self.config.resolver,
        );
        let log: Arc<dyn ScanLogStore> = self.db.clone();
        let recorder = ScanRecorder::new(resolver, log);
        recorder.record_scan(&params.code, params.device).await
    }

    pub async fn recent_scans(
        &self,
        session: &OwnerSession,
        limit: Option<usize>,
    ) -> Result<Vec<ScanEvent>> {
        self.alerts.recent_scans(session, limit).await
    }

    pub async fn resume_session(&self, session: &OwnerSession) -> Result<SessionSnapshot> {
        resume(session, self.db.as_ref(), &self.alerts).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pawlink_core::{
        DeviceMeta, GeoPoint, LoginPrompt, LostState, ResolverConfig, Visible,
    };
    use pawlink_daemon_protocol::ClientFix;

    fn test_state() -> (tempfile::TempDir, AppState) {
        let temp = tempfile::tempdir().unwrap();
        let db = Db::new(temp.path().join("state.db")).unwrap();
        db.insert_tag("S1A2B3", "482913").unwrap();
        // Unroutable endpoint; scan tests either supply a device fix or
        // expect the IP stage to fail fast.
        let config = DaemonConfig {
            resolver: ResolverConfig {
                gps_timeout_ms: 100,
                ip_timeout_ms: 100,
            },
            ip_endpoint: "http://127.0.0.1:9".to_string(),
        };
        (temp, AppState::new(db, config))
    }

    async fn claimed_session(state: &AppState) -> OwnerSession {
        let outcome = state
            .claim_or_authenticate("S1A2B3", "482913")
            .await
            .unwrap();
        let ClaimOutcome::NewClaim { owner } = outcome else {
            panic!("expected first claim");
        };
        state.complete_claim(owner).await.unwrap()
    }

    #[tokio::test]
    async fn test_full_owner_flow() {
        let (_temp, state) = test_state();

        // Scan an unclaimed tag, claim it, save the pet.
        let decision = state.entry_decision("S1A2B3").await.unwrap();
        assert_eq!(
            decision,
            EntryDecision::Login {
                prompt: LoginPrompt::NewTag
            }
        );

        let session = claimed_session(&state).await;
        let pet = PetRecord::new("S1A2B3", Visible::public("Pamuk".into()), "cat");
        state.save_pet(&session, pet).await.unwrap();

        // Broadcast lost; the entry decision flips to the finder fork.
        let pet = state
            .activate_lost(
                &session,
                ActivationRequest {
                    consent: true,
                    location: Some(GeoPoint { lat: 41.0, lng: 29.0 }),
                    message: Some("ran off near the park".into()),
                },
            )
            .await
            .unwrap();
        assert_eq!(pet.lost.state, LostState::Active);

        let decision = state.entry_decision("S1A2B3").await.unwrap();
        assert!(matches!(decision, EntryDecision::Lost { .. }));

        // A finder reports with a device fix; the owner sees it.
        let event_id = state
            .record_scan(RecordScanParams {
                code: "S1A2B3".to_string(),
                device: DeviceMeta::default(),
                fix: Some(ClientFix {
                    lat: 41.002,
                    lng: 29.001,
                    accuracy_m: 12.0,
                }),
            })
            .await
            .expect("scan should be recorded");

        let scans = state.recent_scans(&session, None).await.unwrap();
        assert_eq!(scans.len(), 1);
        assert_eq!(scans[0].id, event_id);
        assert!(scans[0].consent_given);

        // Wrong PIN cannot silence the alarm; the right one can.
        let err = state.deactivate_lost(&session, "000000").await.unwrap_err();
        assert_eq!(err.code(), "auth_failed");

        let pet = state.deactivate_lost(&session, "482913").await.unwrap();
        assert_eq!(pet.lost.state, LostState::Safe);
        assert!(pet.lost.last_seen.is_none());
    }

    #[tokio::test]
    async fn test_scan_without_fix_still_lands_in_the_log() {
        let (_temp, state) = test_state();
        let session = claimed_session(&state).await;

        state
            .record_scan(RecordScanParams {
                code: "S1A2B3".to_string(),
                device: DeviceMeta::default(),
                fix: None,
            })
            .await
            .expect("scan should be recorded without any location");

        let scans = state.recent_scans(&session, None).await.unwrap();
        assert_eq!(scans.len(), 1);
        assert!(scans[0].location.is_none());
        assert!(!scans[0].consent_given);
    }

    #[tokio::test]
    async fn test_resume_session_bundles_pet_and_feed() {
        let (_temp, state) = test_state();
        let session = claimed_session(&state).await;
        let pet = PetRecord::new("S1A2B3", Visible::public("Pamuk".into()), "cat");
        state.save_pet(&session, pet).await.unwrap();

        let snapshot = state.resume_session(&session).await.unwrap();
        assert_eq!(snapshot.owner.username, "S1A2B3");
        assert!(snapshot.pet.is_some());
        assert!(snapshot.recent_scans.is_empty());
    }
}
