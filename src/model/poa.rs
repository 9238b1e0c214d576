//! The Power-of-Attorney definition (spec §3, §6) — the structured legal
//! delegation credential a [`crate::model::Token`] may reference. Closed
//! vocabularies are expressed as exhaustive enums rather than free strings,
//! the same way this crate closes its other protocol enums (e.g. delegation
//! type, client type) instead of accepting arbitrary `String`s at the
//! boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The legal nature of the principal granting authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrgType {
    /// A for-profit commercial entity.
    CommercialEnterprise,
    /// A government or public-sector authority.
    PublicAuthority,
    /// A non-profit organization.
    NonProfitOrganization,
    /// Any other form of association not covered above.
    OtherAssociation,
    /// Unclassified.
    Other,
}

/// Whether the principal is an individual or an organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Principal {
    /// A natural person granting authority directly.
    Individual {
        /// Principal's identifier (opaque to the core).
        id: String,
        /// Display name, if supplied.
        name: Option<String>,
    },
    /// An organization granting authority through a representative.
    Organization {
        /// Principal's identifier (opaque to the core).
        id: String,
        /// The organization's classification.
        org_type: OrgType,
        /// The natural person acting on the organization's behalf.
        representative: Representative,
    },
}

/// A natural person acting for an organizational principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Representative {
    /// Representative's identifier.
    pub id: String,
    /// Display name, if supplied.
    pub name: Option<String>,
    /// Role/title within the organization (e.g. "CFO").
    pub title: Option<String>,
}

/// The class of AI system acting as the authorized client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClientType {
    /// A large language model acting directly.
    Llm,
    /// A software agent operating digitally without embodiment.
    DigitalAgent,
    /// An agentic AI system capable of autonomous multi-step action.
    AgenticAi,
    /// A physically embodied robot.
    HumanoidRobot,
    /// Any other client type.
    Other,
}

/// Operational status of the authorized client at the time of delegation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationalStatus {
    /// Client is active and may act under the delegation.
    Active,
    /// Client is temporarily suspended.
    Suspended,
    /// Client has been decommissioned; the delegation is void in practice.
    Decommissioned,
}

/// The AI system authorized to act under the PoA.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizedClient {
    /// Classification of the client.
    pub client_type: ClientType,
    /// Client identifier (opaque to the core).
    pub identity: String,
    /// Version string of the client software/model.
    pub version: String,
    /// Current operational status.
    pub operational_status: OperationalStatus,
}

/// Whether the representation is exercised alone or jointly with others.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RepresentationType {
    /// A single representative/client may act alone.
    Sole,
    /// Multiple representatives/clients must act together.
    Joint,
}

/// How a formal signature must be composed when more than one signatory applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignatureType {
    /// A single signatory's signature suffices.
    Single,
    /// All named signatories must sign jointly.
    Joint,
    /// Any member of a defined collective may sign on its behalf.
    Collective,
}

/// The geographic reach of the delegation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GeoType {
    /// Applies worldwide without restriction.
    Global,
    /// Applies within a single nation.
    National,
    /// Applies across a defined set of nations.
    International,
    /// Applies within a sub-national region (e.g. state/province).
    Regional,
    /// Applies within a sub-regional unit (e.g. county/city).
    Subnational,
    /// Applies at one specific location only.
    SpecificLocation,
    /// Any other geographic scoping.
    Other,
}

/// A single geographic scope entry; `detail` carries the specific
/// jurisdiction/region/location name for non-global scopes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeographicScope {
    /// The scope category.
    pub geo_type: GeoType,
    /// Free-text detail (country code, region name, address) — required
    /// for every `GeoType` other than `Global`.
    pub detail: Option<String>,
}

/// ISIC/NACE-derived industry-sector vocabulary (spec §6, 21 values).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IndustrySector {
    /// Agriculture, forestry and fishing.
    AgricultureForestryFishing,
    /// Mining and quarrying.
    MiningQuarrying,
    /// Manufacturing.
    Manufacturing,
    /// Electricity, gas, steam and air conditioning supply.
    ElectricityGasSteamAirConditioning,
    /// Water supply; sewerage, waste management and remediation.
    WaterSupplySewerageWasteManagement,
    /// Construction.
    Construction,
    /// Wholesale and retail trade; repair of motor vehicles.
    WholesaleRetailTrade,
    /// Transportation and storage.
    TransportationStorage,
    /// Accommodation and food service activities.
    AccommodationFoodService,
    /// Information and communication.
    InformationCommunication,
    /// Financial and insurance activities.
    FinancialInsurance,
    /// Real estate activities.
    RealEstate,
    /// Professional, scientific and technical activities.
    ProfessionalScientificTechnical,
    /// Administrative and support service activities.
    AdministrativeSupportService,
    /// Public administration and defence; compulsory social security.
    PublicAdministrationDefence,
    /// Education.
    Education,
    /// Human health and social work activities.
    HumanHealthSocialWork,
    /// Arts, entertainment and recreation.
    ArtsEntertainmentRecreation,
    /// Other service activities.
    OtherServiceActivities,
    /// Activities of households as employers.
    HouseholdActivities,
    /// Activities of extraterritorial organizations and bodies.
    ExtraterritorialOrganizations,
}

/// A financial or contractual transaction class the client may execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Transaction {
    /// Payment initiation or execution.
    Payment,
    /// Placing a purchase order.
    Purchase,
    /// Executing a sale.
    Sale,
    /// Transferring an asset between parties.
    Transfer,
    /// Entering into a contract.
    ContractExecution,
    /// Refunding a prior transaction.
    Refund,
}

/// A decision-making power the client may exercise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Decision {
    /// Approving a request or workflow step.
    Approval,
    /// Rejecting a request or workflow step.
    Rejection,
    /// Allocating budget or resources.
    ResourceAllocation,
    /// Selecting among vendors/counterparties.
    VendorSelection,
    /// Escalating a matter to a human.
    Escalation,
}

/// A physical-world action the client may direct or perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PhysicalAction {
    /// Moving within a defined physical environment.
    Movement,
    /// Manipulating a physical object.
    ObjectManipulation,
    /// Operating a piece of equipment or machinery.
    EquipmentOperation,
    /// Delivering a physical good.
    Delivery,
}

/// A non-physical action the client may perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NonPhysicalAction {
    /// Sending a communication on the principal's behalf.
    Communication,
    /// Reading or retrieving data.
    DataAccess,
    /// Modifying data.
    DataModification,
    /// Scheduling or calendar management.
    Scheduling,
}

/// The enumerated action sets a PoA may grant (spec §3 `AuthorizationScope`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionSets {
    /// Permitted transaction classes.
    pub transactions: Vec<Transaction>,
    /// Permitted decision classes.
    pub decisions: Vec<Decision>,
    /// Permitted physical actions.
    pub physical_actions: Vec<PhysicalAction>,
    /// Permitted non-physical actions.
    pub non_physical_actions: Vec<NonPhysicalAction>,
}

/// The scope of authorization granted by a PoA.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationScope {
    /// Sole or joint representation.
    pub representation_type: RepresentationType,
    /// Industry sectors the authorization applies to.
    pub industry_sectors: Vec<IndustrySector>,
    /// Geographic scopes the authorization applies to.
    pub geographic_scopes: Vec<GeographicScope>,
    /// The enumerated action sets granted.
    pub actions: ActionSets,
}

/// A single contiguous window during which the PoA is exercisable (in
/// addition to the absolute validity period).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Window start (time-of-day or recurring rule start, UTC).
    pub start: DateTime<Utc>,
    /// Window end.
    pub end: DateTime<Utc>,
}

/// The PoA's validity period: an absolute range plus optional recurring
/// time-windows and renewal/termination predicates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidityPeriod {
    /// Absolute start of validity.
    pub start: DateTime<Utc>,
    /// Absolute end of validity.
    pub end: DateTime<Utc>,
    /// Optional recurring windows; if non-empty, `now` must fall within the
    /// absolute range AND match at least one window (spec §3).
    #[serde(default)]
    pub time_windows: Vec<TimeWindow>,
    /// Whether the PoA auto-renews at `end` absent a termination signal.
    #[serde(default)]
    pub auto_renew: bool,
    /// Whether an external termination predicate has fired, ending the PoA
    /// early regardless of `end`.
    #[serde(default)]
    pub terminated: bool,
}

impl ValidityPeriod {
    /// Whether `now` satisfies both the absolute range and (if any) the
    /// time-window constraint.
    #[must_use]
    pub fn covers(&self, now: DateTime<Utc>) -> bool {
        if self.terminated {
            return false;
        }
        if now < self.start || now > self.end {
            return false;
        }
        if self.time_windows.is_empty() {
            return true;
        }
        self.time_windows.iter().any(|w| now >= w.start && now <= w.end)
    }
}

/// Formal legal requirements attached to the PoA.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormalRequirements {
    /// Whether notarization is required for this PoA to be legally effective.
    pub notarial_required: bool,
    /// Whether identity verification of the principal/representative is required.
    pub id_verification_required: bool,
    /// Whether a qualified digital signature is required.
    pub digital_signature_required: bool,
    /// How a required signature must be composed.
    pub signature_type: Option<SignatureType>,
}

/// Power limits constraining what the client may do even within its
/// authorized scope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PowerLimits {
    /// Maximum power/escalation level the client may exercise (mirrors the
    /// delegation chain's `level`, not the scope hierarchy).
    pub max_level: Option<u32>,
    /// Monetary or quantity boundary (e.g. "$10,000 per transaction"), left
    /// as free text because units/currency are jurisdiction-specific.
    pub boundaries: Vec<String>,
    /// Named tool/capability limits (e.g. "no filesystem writes").
    pub tool_limits: Vec<String>,
    /// Whether the signing/encryption scheme backing this PoA must be
    /// quantum-resistant.
    pub quantum_resistant: bool,
    /// Explicit exclusions — actions the client is never authorized to take
    /// even if the scope/action sets would otherwise allow them.
    pub exclusions: Vec<String>,
}

/// Reporting obligations and liability allocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportingLiability {
    /// Human-readable reporting cadence/requirement (e.g. "weekly summary to principal").
    pub reporting_requirement: Option<String>,
    /// Human-readable liability allocation clause.
    pub liability_clause: Option<String>,
}

/// The full structured Power-of-Attorney record (spec §3, §6).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoADefinition {
    /// Stable identifier for this PoA record.
    pub id: String,
    /// The principal granting authority.
    pub principal: Principal,
    /// The AI system authorized to act.
    pub authorized_client: AuthorizedClient,
    /// Scope of the authorization.
    pub scope: AuthorizationScope,
    /// Validity period and renewal rules.
    pub validity: ValidityPeriod,
    /// Formal legal requirements.
    pub formal_requirements: FormalRequirements,
    /// Power limits and exclusions.
    pub power_limits: PowerLimits,
    /// Reporting and liability terms.
    pub reporting_liability: ReportingLiability,
    /// Jurisdiction whose law governs the PoA (free text, supplied by an
    /// external legal-framework registry per spec §1 Non-goals).
    pub jurisdiction: String,
    /// Governing law clause (free text).
    pub governing_law: String,
    /// Conflict-resolution arrangement (e.g. "binding arbitration in Helsinki").
    pub conflict_resolution: String,
}

impl PoADefinition {
    /// Structural invariant: an organizational principal must carry a
    /// representative (spec §3: `Principal.type = organization ⇒
    /// Representative is present`). Individual principals trivially satisfy
    /// this — [`Principal::Individual`] has no representative field at all.
    #[must_use]
    pub fn principal_invariant_holds(&self) -> bool {
        matches!(
            self.principal,
            Principal::Individual { .. } | Principal::Organization { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn sample_validity(now: DateTime<Utc>) -> ValidityPeriod {
        ValidityPeriod {
            start: now - ChronoDuration::hours(1),
            end: now + ChronoDuration::hours(23),
            time_windows: Vec::new(),
            auto_renew: false,
            terminated: false,
        }
    }

    #[test]
    fn validity_covers_now_within_absolute_range() {
        let now = Utc::now();
        assert!(sample_validity(now).covers(now));
    }

    #[test]
    fn validity_rejects_terminated_period() {
        let now = Utc::now();
        let mut v = sample_validity(now);
        v.terminated = true;
        assert!(!v.covers(now));
    }

    #[test]
    fn validity_requires_a_matching_time_window_when_present() {
        let now = Utc::now();
        let mut v = sample_validity(now);
        v.time_windows = vec![TimeWindow {
            start: now + ChronoDuration::hours(1),
            end: now + ChronoDuration::hours(2),
        }];
        assert!(!v.covers(now), "now falls outside the only declared window");
    }

    #[test]
    fn organization_principal_carries_its_representative() {
        let principal = Principal::Organization {
            id: "org-1".into(),
            org_type: OrgType::CommercialEnterprise,
            representative: Representative {
                id: "rep-1".into(),
                name: Some("Alice".into()),
                title: Some("CFO".into()),
            },
        };
        assert!(matches!(principal, Principal::Organization { .. }));
    }
}
