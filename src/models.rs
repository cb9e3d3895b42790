//! Data models for dossiers, signatures, evidence and comments

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Role held by a registered user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Sends and receives dossiers
    Worker,
    /// Countersigns every dossier and reviews the queues
    ZoneManager,
    /// Sees a dossier only through their own signature
    Witness,
    Administrator,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Worker => "worker",
            Role::ZoneManager => "zone_manager",
            Role::Witness => "witness",
            Role::Administrator => "administrator",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "worker" => Ok(Role::Worker),
            "zone_manager" => Ok(Role::ZoneManager),
            "witness" => Ok(Role::Witness),
            "administrator" => Ok(Role::Administrator),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

/// Authenticated identity supplied by the access layer for one call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: Uuid,
    pub roles: HashSet<Role>,
}

impl Caller {
    pub fn new(user_id: Uuid, roles: impl IntoIterator<Item = Role>) -> Self {
        Self {
            user_id,
            roles: roles.into_iter().collect(),
        }
    }

    pub fn has(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn has_any(&self, roles: &[Role]) -> bool {
        roles.iter().any(|r| self.roles.contains(r))
    }
}

/// The eight free-text sections of a dossier
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Narrative {
    pub general_data: String,
    pub procedure_report: String,
    pub other_facts: String,
    pub financial_resources: String,
    pub human_resources: String,
    pub material_resources: String,
    pub area_budget_status: String,
    pub programmatic_status: String,
}

/// A handover record from a maker to a receiving worker
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dossier {
    pub id: Uuid,
    pub maker_id: Uuid,
    pub receiver_id: Uuid,
    #[serde(flatten)]
    pub narrative: Narrative,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Tri-state acceptance of one signer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Acceptance {
    Unset,
    Granted,
    Denied,
}

impl Acceptance {
    /// Column encoding: NULL, 1, 0
    pub fn from_column(value: Option<bool>) -> Self {
        match value {
            None => Acceptance::Unset,
            Some(true) => Acceptance::Granted,
            Some(false) => Acceptance::Denied,
        }
    }

    pub fn to_column(self) -> Option<bool> {
        match self {
            Acceptance::Unset => None,
            Acceptance::Granted => Some(true),
            Acceptance::Denied => Some(false),
        }
    }
}

/// One required signer of a dossier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureRecord {
    pub dossier_id: Uuid,
    pub signer_id: Uuid,
    pub accepted: Acceptance,
}

/// Lifecycle status derived from the signature ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DossierStatus {
    Pending,
    InProcess,
    Released,
}

impl DossierStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DossierStatus::Pending => "pending",
            DossierStatus::InProcess => "in_process",
            DossierStatus::Released => "released",
        }
    }
}

impl std::str::FromStr for DossierStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DossierStatus::Pending),
            "in_process" => Ok(DossierStatus::InProcess),
            "released" => Ok(DossierStatus::Released),
            _ => Err(format!("Invalid dossier status: {}", s)),
        }
    }
}

/// Seeded evidence/comment taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceCategory {
    Report,
    Finance,
    Human,
    Material,
    Budget,
    Programmatic,
    /// Comments only
    Data,
    /// Comments only
    Other,
}

impl EvidenceCategory {
    /// Categories every dossier must carry one attachment for
    pub const REQUIRED: [EvidenceCategory; 6] = [
        EvidenceCategory::Report,
        EvidenceCategory::Finance,
        EvidenceCategory::Human,
        EvidenceCategory::Material,
        EvidenceCategory::Budget,
        EvidenceCategory::Programmatic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EvidenceCategory::Report => "report",
            EvidenceCategory::Finance => "finance",
            EvidenceCategory::Human => "human",
            EvidenceCategory::Material => "material",
            EvidenceCategory::Budget => "budget",
            EvidenceCategory::Programmatic => "programmatic",
            EvidenceCategory::Data => "data",
            EvidenceCategory::Other => "other",
        }
    }
}

impl std::str::FromStr for EvidenceCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "report" => Ok(EvidenceCategory::Report),
            "finance" => Ok(EvidenceCategory::Finance),
            "human" => Ok(EvidenceCategory::Human),
            "material" => Ok(EvidenceCategory::Material),
            "budget" => Ok(EvidenceCategory::Budget),
            "programmatic" => Ok(EvidenceCategory::Programmatic),
            "data" => Ok(EvidenceCategory::Data),
            "other" => Ok(EvidenceCategory::Other),
            _ => Err(format!("Invalid evidence category: {}", s)),
        }
    }
}

/// A row of the category lookup table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Category {
    pub id: i64,
    pub name: String,
}

/// Attachment as received on the wire, content base64-encoded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceUpload {
    pub category: String,
    pub name: String,
    pub content: String,
}

/// Attachment after boundary decoding, content is opaque bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvidenceFile {
    pub category: String,
    pub name: String,
    pub content: Vec<u8>,
}

/// Attachment as returned to readers, content base64-encoded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedEvidence {
    pub category: String,
    pub name: String,
    pub content: String,
}

/// The six attachment slots of a dossier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DossierFiles<T> {
    pub procedure_report_file: T,
    pub financial_resources_file: T,
    pub human_resources_file: T,
    pub material_resources_file: T,
    pub area_budget_status_file: T,
    pub programmatic_status_file: T,
}

impl<T> DossierFiles<T> {
    pub fn into_array(self) -> [T; 6] {
        [
            self.procedure_report_file,
            self.financial_resources_file,
            self.human_resources_file,
            self.material_resources_file,
            self.area_budget_status_file,
            self.programmatic_status_file,
        ]
    }

    pub fn try_map<U, E>(self, mut f: impl FnMut(T) -> Result<U, E>) -> Result<DossierFiles<U>, E> {
        Ok(DossierFiles {
            procedure_report_file: f(self.procedure_report_file)?,
            financial_resources_file: f(self.financial_resources_file)?,
            human_resources_file: f(self.human_resources_file)?,
            material_resources_file: f(self.material_resources_file)?,
            area_budget_status_file: f(self.area_budget_status_file)?,
            programmatic_status_file: f(self.programmatic_status_file)?,
        })
    }
}

/// Request to create a new dossier
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDossierRequest {
    #[serde(flatten)]
    pub narrative: Narrative,
    #[serde(flatten)]
    pub files: DossierFiles<EvidenceUpload>,
    pub employee_number_receiver: String,
}

/// Request to replace the narrative and attachments of a pending dossier
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDossierRequest {
    #[serde(flatten)]
    pub narrative: Narrative,
    #[serde(flatten)]
    pub files: DossierFiles<EvidenceUpload>,
}

/// Request to annotate a dossier section
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCommentRequest {
    pub text: String,
    pub category_name: String,
}

/// Largest page a listing returns
pub const MAX_PAGE_SIZE: i64 = 12;

/// Raw listing parameters
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub query: Option<String>,
}

/// Listing parameters after defaults are applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub limit: usize,
    pub offset: usize,
    pub query: Option<String>,
}

impl ListQuery {
    pub fn page(&self) -> Page {
        let limit = match self.limit {
            Some(l) if (1..=MAX_PAGE_SIZE).contains(&l) => l,
            _ => MAX_PAGE_SIZE,
        };
        let offset = self.offset.filter(|o| *o >= 0).unwrap_or(0);
        let query = self
            .query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(str::to_string);

        Page {
            limit: limit as usize,
            offset: offset as usize,
            query,
        }
    }
}

impl Page {
    /// Case-insensitive substring match against any of the fields
    pub fn matches(&self, fields: &[&str]) -> bool {
        match &self.query {
            None => true,
            Some(q) => {
                let q = q.to_lowercase();
                fields.iter().any(|f| f.to_lowercase().contains(&q))
            }
        }
    }

    pub fn apply<T>(&self, items: Vec<T>) -> Vec<T> {
        items.into_iter().skip(self.offset).take(self.limit).collect()
    }
}

/// Public identity of a user taking part in a dossier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: Uuid,
    pub employee_number: String,
    pub full_name: String,
}

/// One entry of a dossier listing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DossierSummary {
    pub dossier_id: Uuid,
    pub maker: Participant,
    pub receiver: Participant,
    pub status: DossierStatus,
    pub created_at: DateTime<Utc>,
}

/// Full view of one dossier
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DossierDetail {
    #[serde(flatten)]
    pub dossier: Dossier,
    #[serde(flatten)]
    pub files: DossierFiles<EncodedEvidence>,
    pub maker: Participant,
    pub receiver: Participant,
    pub status: DossierStatus,
}

/// Free-text annotation left by a zone manager
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: Uuid,
    pub dossier_id: Uuid,
    pub author_id: Uuid,
    pub category_id: i64,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// Comment joined with its category and author
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentView {
    pub id: Uuid,
    pub text: String,
    pub category_name: String,
    pub author: Participant,
    pub created_at: DateTime<Utc>,
}
