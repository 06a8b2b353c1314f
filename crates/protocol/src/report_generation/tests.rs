use super::leader::LeaderPhase;
use super::*;
use crate::attested_report::{AttestedReportMany, AttestedReportOne, SignedObservation};
use crate::test_support::{context, TestCommittee, TestSender};
use ocr_core::OnchainKeyring;
use ocr_test_utils::{MedianPlugin, Outbound};
use ocr_types::{AttributedOnchainSignature, ReportContext, ReportTimestamp};

const QUERY: &[u8] = b"median";

struct Harness {
    committee: TestCommittee,
    plugin: Arc<MedianPlugin>,
    rg: ReportGeneration,
    net: TestSender,
    pacemaker_rx: mpsc::UnboundedReceiver<EventToPacemaker>,
    finalization_rx: mpsc::UnboundedReceiver<FinalizedReport>,
}

fn harness(id: OracleId, leader: OracleId) -> Harness {
    let committee = TestCommittee::new(4, 1);
    let plugin = Arc::new(MedianPlugin::new(100 + id as u64));
    let net = TestSender::new(id);
    let (to_pacemaker, pacemaker_rx) = mpsc::unbounded_channel();
    let (to_finalization, finalization_rx) = mpsc::unbounded_channel();
    let rg = ReportGeneration::new(
        context(&committee, id, plugin.clone()),
        net.sender.clone(),
        1,
        leader,
        to_pacemaker,
        to_finalization,
    );
    Harness {
        committee,
        plugin,
        rg,
        net,
        pacemaker_rx,
        finalization_rx,
    }
}

fn signed_observations(
    committee: &TestCommittee,
    ts: &ReportTimestamp,
    observers: &[OracleId],
) -> Vec<AttributedSignedObservation> {
    observers
        .iter()
        .map(|&observer| AttributedSignedObservation {
            observer,
            signed_observation: SignedObservation::sign(
                committee.offchain_keyring(observer).as_ref(),
                ts,
                QUERY,
                (10 * (observer as u64 + 1)).to_be_bytes().to_vec(),
            )
            .unwrap(),
        })
        .collect()
}

fn attested_many(
    committee: &TestCommittee,
    context: &ReportContext,
    report: &[u8],
    signers: &[OracleId],
) -> AttestedReportMany {
    let signatures = signers
        .iter()
        .map(|&signer| AttributedOnchainSignature {
            signer,
            signature: committee
                .onchain_keyring(signer)
                .sign(context, report)
                .unwrap(),
        })
        .collect();
    AttestedReportMany::new(report.to_vec(), signatures)
}

fn expected_median(observers: &[OracleId]) -> Vec<u8> {
    let mut values: Vec<u64> = observers.iter().map(|&o| 10 * (o as u64 + 1)).collect();
    values.sort_unstable();
    values[values.len() / 2].to_be_bytes().to_vec()
}

// =============================================================================
// Follower
// =============================================================================

#[tokio::test]
async fn test_follower_answers_observe_req() {
    let mut h = harness(1, 0);
    h.rg.on_observe_req(0, 1, QUERY.to_vec()).await;

    let sent = h.net.endpoint.take();
    assert_eq!(sent.len(), 1);
    let Outbound::To(
        0,
        ProtocolMessage::Observe {
            epoch,
            round,
            signed_observation,
        },
    ) = &sent[0]
    else {
        panic!("expected Observe to leader, got {:?}", sent[0]);
    };
    assert_eq!((*epoch, *round), (1, 1));
    assert_eq!(signed_observation.observation, 101u64.to_be_bytes().to_vec());

    let ts = h.committee.timestamp(1, 1);
    let pk = h.committee.identities()[1].offchain_public_key.clone();
    assert!(signed_observation.verify(h.committee.offchain_keyring(1).as_ref(), &pk, &ts, QUERY));
}

#[tokio::test]
async fn test_follower_ignores_non_leader_and_stale_rounds() {
    let mut h = harness(1, 0);

    h.rg.on_observe_req(2, 1, QUERY.to_vec()).await;
    assert!(h.net.endpoint.is_empty());
    assert_eq!(h.rg.follower.round, 0);

    h.rg.on_observe_req(0, 2, QUERY.to_vec()).await;
    h.rg.on_observe_req(0, 2, QUERY.to_vec()).await;
    h.rg.on_observe_req(0, 1, QUERY.to_vec()).await;
    assert_eq!(h.net.endpoint.take().len(), 1);
    assert_eq!(h.rg.follower.round, 2);
    assert_eq!(h.plugin.observation_count(), 1);
}

#[tokio::test]
async fn test_follower_drops_other_epoch() {
    let mut h = harness(1, 0);
    h.rg
        .handle_message(
            ProtocolMessage::ObserveReq {
                epoch: 2,
                round: 1,
                query: QUERY.to_vec(),
            },
            0,
        )
        .await;
    assert!(h.net.endpoint.is_empty());
    assert_eq!(h.rg.follower.round, 0);
}

#[tokio::test]
async fn test_round_past_limit_requests_leader_change() {
    let mut h = harness(1, 0);
    let r_max = h.committee.config().r_max;

    h.rg.on_observe_req(0, r_max + 1, QUERY.to_vec()).await;
    assert!(h.net.endpoint.is_empty());
    assert_eq!(
        h.pacemaker_rx.try_recv().unwrap(),
        EventToPacemaker::ChangeLeader { epoch: 1 }
    );

    h.rg.on_observe_req(0, r_max + 2, QUERY.to_vec()).await;
    assert!(h.pacemaker_rx.try_recv().is_err());
    assert_eq!(h.rg.follower.round, r_max + 1);
}

#[tokio::test]
async fn test_follower_signs_one_report_per_round() {
    let mut h = harness(1, 0);
    let ts = h.committee.timestamp(1, 1);
    h.rg.on_observe_req(0, 1, QUERY.to_vec()).await;
    h.net.endpoint.take();

    let observations = signed_observations(&h.committee, &ts, &[0, 1, 2]);
    let extra_hash = compute_extra_hash(QUERY, &observations);
    h.rg
        .on_report_req(0, 1, QUERY.to_vec(), observations.clone())
        .await;

    let sent = h.net.endpoint.take();
    let [Outbound::To(0, ProtocolMessage::Report { attested_report, .. })] = &sent[..] else {
        panic!("expected one Report, got {:?}", sent);
    };
    let AttestedReportOne::Attested { report, .. } = attested_report else {
        panic!("expected attested report");
    };
    assert_eq!(report, &expected_median(&[0, 1, 2]));
    let context = ReportContext::new(ts, extra_hash);
    assert!(attested_report.verify(
        h.committee.onchain_keyring(1).as_ref(),
        &h.committee.identities()[1].onchain_public_key,
        &context
    ));

    // a second request for the same round, even with other observations, is ignored
    let other = signed_observations(&h.committee, &ts, &[1, 2, 3]);
    h.rg.on_report_req(0, 1, QUERY.to_vec(), other).await;
    assert!(h.net.endpoint.is_empty());
    assert_eq!(h.plugin.report_count(), 1);
}

#[tokio::test]
async fn test_report_req_validation() {
    let mut h = harness(1, 0);
    let ts = h.committee.timestamp(1, 1);
    h.rg.on_observe_req(0, 1, QUERY.to_vec()).await;
    h.net.endpoint.take();

    // too few
    let few = signed_observations(&h.committee, &ts, &[0, 1]);
    h.rg.on_report_req(0, 1, QUERY.to_vec(), few).await;

    // duplicate observer
    let mut dup = signed_observations(&h.committee, &ts, &[0, 1, 2]);
    dup[2] = dup[1].clone();
    h.rg.on_report_req(0, 1, QUERY.to_vec(), dup).await;

    // signature from the wrong oracle
    let mut forged = signed_observations(&h.committee, &ts, &[0, 1, 3]);
    forged[2].observer = 2;
    h.rg.on_report_req(0, 1, QUERY.to_vec(), forged).await;

    // unknown observer
    let mut stranger = signed_observations(&h.committee, &ts, &[0, 1, 2]);
    stranger[2].observer = 9;
    h.rg.on_report_req(0, 1, QUERY.to_vec(), stranger).await;

    // signed for another query
    let valid = signed_observations(&h.committee, &ts, &[0, 1, 2]);
    h.rg.on_report_req(0, 1, b"other".to_vec(), valid.clone()).await;

    // from a non-leader
    h.rg.on_report_req(3, 1, QUERY.to_vec(), valid.clone()).await;

    // for a round not started
    h.rg.on_report_req(0, 2, QUERY.to_vec(), valid.clone()).await;

    assert!(h.net.endpoint.is_empty());
    assert_eq!(h.plugin.report_count(), 0);
    assert!(!h.rg.follower.sent_report);

    h.rg.on_report_req(0, 1, QUERY.to_vec(), valid).await;
    assert_eq!(h.net.endpoint.take().len(), 1);
}

#[tokio::test]
async fn test_messages_for_earlier_round_are_dropped() {
    let mut h = harness(1, 0);
    let ts = h.committee.timestamp(1, 1);
    h.rg.on_observe_req(0, 1, QUERY.to_vec()).await;
    h.rg.on_observe_req(0, 2, QUERY.to_vec()).await;
    h.net.endpoint.take();
    let before = h.rg.follower;
    assert_eq!(before.round, 2);

    let observations = signed_observations(&h.committee, &ts, &[0, 1, 2]);
    h.rg.on_report_req(0, 1, QUERY.to_vec(), observations).await;

    let extra_hash = [4u8; 32];
    let context = ReportContext::new(ts, extra_hash);
    let report = attested_many(&h.committee, &context, b"report", &[0, 2, 3]);
    h.rg.on_final(0, 1, extra_hash, report);

    assert_eq!(h.rg.follower, before);
    assert!(!h.rg.follower.sent_report);
    assert!(!h.rg.follower.completed_round);
    assert!(h.net.endpoint.is_empty());
    assert_eq!(h.plugin.report_count(), 0);
    assert!(h.finalization_rx.try_recv().is_err());
    assert!(h.pacemaker_rx.try_recv().is_err());
}

#[tokio::test]
async fn test_skip_completes_round() {
    let mut h = harness(1, 0);
    let ts = h.committee.timestamp(1, 1);
    h.plugin.set_skip_reports(true);
    h.rg.on_observe_req(0, 1, QUERY.to_vec()).await;
    h.net.endpoint.take();

    let observations = signed_observations(&h.committee, &ts, &[0, 1, 2]);
    h.rg.on_report_req(0, 1, QUERY.to_vec(), observations).await;

    let sent = h.net.endpoint.take();
    assert!(matches!(
        &sent[..],
        [Outbound::To(0, ProtocolMessage::Report { attested_report: AttestedReportOne::Skip, .. })]
    ));
    assert!(h.rg.follower.completed_round);
    assert_eq!(
        h.pacemaker_rx.try_recv().unwrap(),
        EventToPacemaker::Progress { epoch: 1 }
    );
}

#[tokio::test]
async fn test_final_is_verified_and_forwarded_once() {
    let mut h = harness(1, 0);
    let ts = h.committee.timestamp(1, 1);
    h.rg.on_observe_req(0, 1, QUERY.to_vec()).await;

    let extra_hash = [4u8; 32];
    let context = ReportContext::new(ts, extra_hash);

    // two signatures is below the quorum of three
    let short = attested_many(&h.committee, &context, b"report", &[0, 1]);
    h.rg.on_final(0, 1, extra_hash, short);
    assert!(h.finalization_rx.try_recv().is_err());

    let report = attested_many(&h.committee, &context, b"report", &[0, 2, 3]);
    h.rg.on_final(0, 1, extra_hash, report.clone());

    let finalized = h.finalization_rx.try_recv().unwrap();
    assert_eq!(finalized.timestamp, ts);
    assert_eq!(finalized.extra_hash, extra_hash);
    assert_eq!(finalized.attested_report, report);
    assert_eq!(
        h.pacemaker_rx.try_recv().unwrap(),
        EventToPacemaker::Progress { epoch: 1 }
    );

    h.rg.on_final(0, 1, extra_hash, report);
    assert!(h.finalization_rx.try_recv().is_err());
    assert!(h.pacemaker_rx.try_recv().is_err());
}

#[tokio::test]
async fn test_final_with_wrong_context_rejected() {
    let mut h = harness(2, 0);
    let ts = h.committee.timestamp(1, 1);
    h.rg.on_observe_req(0, 1, QUERY.to_vec()).await;

    let context = ReportContext::new(ts, [4u8; 32]);
    let report = attested_many(&h.committee, &context, b"report", &[0, 1, 3]);
    h.rg.on_final(0, 1, [5u8; 32], report);
    assert!(h.finalization_rx.try_recv().is_err());
    assert!(!h.rg.follower.completed_round);
}

// =============================================================================
// Leader
// =============================================================================

#[tokio::test]
async fn test_leader_round_to_final() {
    let mut h = harness(0, 0);
    let ts = h.committee.timestamp(1, 1);

    h.rg.start_round().await;
    assert_eq!(
        h.net.endpoint.take(),
        vec![Outbound::Broadcast(ProtocolMessage::ObserveReq {
            epoch: 1,
            round: 1,
            query: QUERY.to_vec(),
        })]
    );
    assert_eq!(h.net.looped_back().len(), 1);

    for aso in signed_observations(&h.committee, &ts, &[3, 1]) {
        h.rg.on_observe(aso.observer, 1, aso.signed_observation);
    }
    assert_eq!(h.rg.leader_state.as_ref().unwrap().phase, LeaderPhase::Observe);

    // an observation attributed to the wrong sender does not verify
    let misattributed = signed_observations(&h.committee, &ts, &[2]).remove(0);
    h.rg.on_observe(0, 1, misattributed.signed_observation);
    assert_eq!(h.rg.leader_state.as_ref().unwrap().observations.len(), 2);

    let third = signed_observations(&h.committee, &ts, &[2]).remove(0);
    h.rg.on_observe(2, 1, third.signed_observation);
    let leader = h.rg.leader_state.as_ref().unwrap();
    assert_eq!(leader.phase, LeaderPhase::Grace);
    assert!(leader.grace_deadline.is_some());

    // late observation during grace is kept
    let late = signed_observations(&h.committee, &ts, &[0]).remove(0);
    h.rg.on_observe(0, 1, late.signed_observation);

    h.rg.on_grace_expired();
    let sent = h.net.endpoint.take();
    let [Outbound::Broadcast(ProtocolMessage::ReportReq {
        attributed_signed_observations,
        ..
    })] = &sent[..]
    else {
        panic!("expected ReportReq, got {:?}", sent);
    };
    let observers: Vec<_> = attributed_signed_observations.iter().map(|a| a.observer).collect();
    assert_eq!(observers, vec![0, 1, 2, 3]);
    let extra_hash = h.rg.leader_state.as_ref().unwrap().extra_hash.unwrap();
    assert_eq!(extra_hash, compute_extra_hash(QUERY, attributed_signed_observations));

    let context = ReportContext::new(ts, extra_hash);
    let attest = |signer: OracleId, report: &[u8]| {
        AttestedReportOne::attest(
            h.committee.onchain_keyring(signer).as_ref(),
            &context,
            report.to_vec(),
        )
        .unwrap()
    };
    let reports = [(3, attest(3, b"r")), (1, attest(1, b"r")), (2, attest(2, b"other"))];
    for (from, report) in reports {
        h.rg.on_report(from, 1, report);
    }
    // forged: signed by 2, sent as 0
    h.rg.on_report(0, 1, attest(2, b"r"));
    assert!(h.net.endpoint.is_empty());

    h.rg.on_report(0, 1, attest(0, b"r"));
    let sent = h.net.endpoint.take();
    let [Outbound::Broadcast(ProtocolMessage::Final {
        round,
        extra_hash: eh,
        attested_report,
        ..
    })] = &sent[..]
    else {
        panic!("expected Final, got {:?}", sent);
    };
    assert_eq!(*round, 1);
    assert_eq!(*eh, extra_hash);
    let signers: Vec<_> = attested_report.attributed_signatures.iter().map(|s| s.signer).collect();
    assert_eq!(signers, vec![0, 1, 3]);
    assert!(attested_report
        .verify_signatures(
            h.committee.onchain_keyring(0).as_ref(),
            h.committee.identities(),
            &context,
            3
        )
        .is_ok());
    assert_eq!(h.rg.leader_state.as_ref().unwrap().phase, LeaderPhase::Final);
}

#[tokio::test]
async fn test_leader_stops_after_round_limit() {
    let mut h = harness(0, 0);
    let r_max = h.committee.config().r_max;
    h.rg.leader_state.as_mut().unwrap().round = r_max;

    h.rg.start_round().await;
    assert!(matches!(
        &h.net.endpoint.take()[..],
        [Outbound::Broadcast(ProtocolMessage::ObserveReq { round, .. })] if *round == r_max + 1
    ));

    h.rg.start_round().await;
    assert!(h.net.endpoint.is_empty());
    assert!(h.rg.leader_state.as_ref().unwrap().round_deadline.is_none());
}

#[tokio::test]
async fn test_follower_role_drops_leader_messages() {
    let mut h = harness(1, 0);
    let ts = h.committee.timestamp(1, 1);
    let aso = signed_observations(&h.committee, &ts, &[2]).remove(0);
    h.rg.on_observe(2, 1, aso.signed_observation);
    h.rg.on_report(2, 1, AttestedReportOne::Skip);
    assert!(h.rg.leader_state.is_none());
    assert!(h.net.endpoint.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_run_returns_inbound_on_cancel() {
    let h = harness(1, 0);
    let (tx, rx) = mpsc::channel(8);
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(h.rg.run(rx, cancel.clone()));

    cancel.cancel();
    let mut rx = handle.await.unwrap();
    tx.send((ProtocolMessage::NewEpoch { epoch: 1 }, 0)).await.unwrap();
    assert!(rx.recv().await.is_some());
}
