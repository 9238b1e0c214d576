//! End-to-end token lifecycle scenarios, exercised against the public crate
//! API the way an embedding application would use it.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use poa_core::audit::{AuditLog, InMemoryAuditSink};
use poa_core::config::Config;
use poa_core::context::Ctx;
use poa_core::crypto::{Hmac256Key, KeyManager};
use poa_core::delegation::ChainValidator;
use poa_core::issuer::{IssueRequest, Issuer};
use poa_core::model::poa::{
    ActionSets, AuthorizationScope, AuthorizedClient, ClientType, FormalRequirements, GeoType,
    GeographicScope, OperationalStatus, PowerLimits, Principal, RepresentationType,
    ReportingLiability, ValidityPeriod,
};
use poa_core::model::scope::parse_many;
use poa_core::model::{DelegationLink, DelegationType, Metadata, PoADefinition};
use poa_core::revocation::InMemoryRevocationRegistry;
use poa_core::scope::ScopeEngine;
use poa_core::security::SecurityMonitor;
use poa_core::store::InMemoryStore;
use poa_core::Error;

const PRIV: &[u8] = include_bytes!("fixtures/rsa_priv1_pkcs1.pem");
const PUB: &[u8] = include_bytes!("fixtures/rsa_pub1_spki.pem");

fn sample_poa(now: DateTime<Utc>) -> PoADefinition {
    PoADefinition {
        id: "poa-1".into(),
        principal: Principal::Individual { id: "alice".into(), name: None },
        authorized_client: AuthorizedClient {
            client_type: ClientType::AgenticAi,
            identity: "agent-1".into(),
            version: "1.0".into(),
            operational_status: OperationalStatus::Active,
        },
        scope: AuthorizationScope {
            representation_type: RepresentationType::Sole,
            industry_sectors: Vec::new(),
            geographic_scopes: vec![GeographicScope { geo_type: GeoType::Global, detail: None }],
            actions: ActionSets::default(),
        },
        validity: ValidityPeriod {
            start: now - chrono::Duration::hours(1),
            end: now + chrono::Duration::hours(23),
            time_windows: Vec::new(),
            auto_renew: false,
            terminated: false,
        },
        formal_requirements: FormalRequirements::default(),
        power_limits: PowerLimits::default(),
        reporting_liability: ReportingLiability::default(),
        jurisdiction: "FI".into(),
        governing_law: "Finnish law".into(),
        conflict_resolution: "arbitration".into(),
    }
}

fn build_issuer() -> Issuer {
    let mut config = Config::default();
    config.issuer.min_issuance_duration = Duration::from_millis(0);
    let store = Arc::new(InMemoryStore::new());
    let revocation = Arc::new(InMemoryRevocationRegistry::new());
    let chain_validator = Arc::new(ChainValidator::new(config.delegation.clone()));
    let scope_engine = Arc::new(ScopeEngine::new(&config.scope));
    let audit = Arc::new(AuditLog::new(Hmac256Key::generate(), true, Arc::new(InMemoryAuditSink::new()), None));
    let monitor = Arc::new(SecurityMonitor::new(config.monitor.clone()));
    let keys = Arc::new(KeyManager::from_rsa_pem(PRIV, PUB).unwrap());
    Issuer::new(&config, store, revocation, chain_validator, scope_engine, audit, monitor, keys)
}

fn base_request(now: DateTime<Utc>, nonce: &str) -> IssueRequest {
    IssueRequest {
        client_id: "agent-1".into(),
        subject: "alice".into(),
        audience: vec!["resource-api".into()],
        requested_scopes: parse_many(["read"]).unwrap(),
        base_scopes: Vec::new(),
        poa: sample_poa(now),
        poa_ref: Some("poa-1".into()),
        delegation_chain: vec![DelegationLink::root("alice", "agent-1", DelegationType::HumanToAi, now)],
        nonce: nonce.to_string(),
        is_system_token: false,
        ttl: Some(Duration::from_secs(3600)),
        metadata: Metadata::new(),
    }
}

#[tokio::test]
async fn happy_path_issue_validate_revoke() {
    let issuer = build_issuer();
    let ctx = Ctx::background();

    let token = issuer.issue(&ctx, base_request(Utc::now(), "it-1")).await.unwrap();
    let claims = issuer.validate(&ctx, &token.value).await.unwrap();
    assert_eq!(claims.sub, "alice");
    assert_eq!(claims.scopes, vec!["read".to_string()]);

    issuer.revoke(&ctx, &token.value, "no longer needed").await.unwrap();
    let result = issuer.validate(&ctx, &token.value).await;
    assert_eq!(result, Err(Error::Revoked));
}

#[tokio::test]
async fn concurrent_issuance_for_the_same_client_rejects_the_second() {
    let issuer = Arc::new(build_issuer());
    let ctx = Ctx::background();
    let now = Utc::now();

    // Issue once up front so the in-flight marker from a prior call cannot
    // race with this test's own pair.
    let issuer_a = issuer.clone();
    let ctx_a = ctx.clone();
    let req_a = base_request(now, "race-a");
    let issuer_b = issuer.clone();
    let ctx_b = ctx.clone();
    let req_b = base_request(now, "race-b");

    let (a, b) = tokio::join!(
        tokio::spawn(async move { issuer_a.issue(&ctx_a, req_a).await }),
        tokio::spawn(async move { issuer_b.issue(&ctx_b, req_b).await }),
    );
    let a = a.unwrap();
    let b = b.unwrap();

    let outcomes = [a, b];
    let duplicate_count = outcomes.iter().filter(|r| *r == &Err(Error::DuplicateIssuance)).count();
    let success_count = outcomes.iter().filter(|r| r.is_ok()).count();
    assert_eq!(success_count, 1, "exactly one of the two concurrent siblings should succeed");
    assert_eq!(duplicate_count, 1, "the other must be rejected as a duplicate issuance, not queued");
}

#[tokio::test]
async fn scope_escalation_beyond_base_scope_is_blocked() {
    let issuer = build_issuer();
    let ctx = Ctx::background();

    let mut req = base_request(Utc::now(), "it-escalate");
    req.requested_scopes = parse_many(["system"]).unwrap();
    req.base_scopes = parse_many(["read"]).unwrap();

    let result = issuer.issue(&ctx, req).await;
    assert_eq!(result, Err(Error::ScopeEscalation));
}

#[tokio::test]
async fn forbidden_scope_combination_is_blocked_even_without_escalation() {
    let issuer = build_issuer();
    let ctx = Ctx::background();

    let mut req = base_request(Utc::now(), "it-forbidden");
    req.requested_scopes = parse_many(["read"]).unwrap();
    req.base_scopes = parse_many(["admin"]).unwrap();

    let result = issuer.issue(&ctx, req).await;
    assert_eq!(result, Err(Error::ForbiddenCombination));
}

#[tokio::test]
async fn a_cyclic_delegation_chain_blocks_issuance() {
    let issuer = build_issuer();
    let ctx = Ctx::background();
    let now = Utc::now();

    let mut req = base_request(now, "it-cycle");
    req.delegation_chain = vec![
        DelegationLink { from_id: "alice".into(), to_id: "agent-1".into(), kind: DelegationType::HumanToAi, level: 1, time: now },
        DelegationLink { from_id: "agent-1".into(), to_id: "alice".into(), kind: DelegationType::AiToAi, level: 2, time: now },
    ];

    let result = issuer.issue(&ctx, req).await;
    assert_eq!(result, Err(Error::ChainCycle));
}

#[tokio::test]
async fn revocation_survives_reopening_the_persistent_log() {
    use poa_core::revocation::{PersistentRevocationLog, RevocationRegistry};

    let dir = std::env::temp_dir().join(format!("poa-core-it-{}", uuid::Uuid::new_v4()));
    let path = dir.join("revocations.log");

    {
        let log = PersistentRevocationLog::open(&path).await.unwrap();
        log.revoke("jti-survives-restart", Utc::now(), "compromised", "admin").await.unwrap();
    }

    let reopened = PersistentRevocationLog::open(&path).await.unwrap();
    assert!(reopened.is_revoked("jti-survives-restart").await);
}

#[tokio::test]
async fn duplicate_nonce_is_rejected_across_separate_requests() {
    let issuer = build_issuer();
    let ctx = Ctx::background();
    let now = Utc::now();

    issuer.issue(&ctx, base_request(now, "shared-nonce")).await.unwrap();
    let result = issuer.issue(&ctx, base_request(now, "shared-nonce")).await;
    assert_eq!(result, Err(Error::NonceReplay));
}
