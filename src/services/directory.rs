use crate::core::stores::{ProfessionalStore, RejectedRecord, RequestStore, Roster, StoreResult};
use crate::error::StoreError;
use crate::models::{
    AvailabilityWindow, DemandType, DemandeRecord, LicenseStatus, PopulationCategory,
    ProfessionAssignment, Professional, Proficiency, UrgencyLevel,
};
use chrono::NaiveDate;
use futures_util::future::BoxFuture;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

/// Collection IDs in the directory service
#[derive(Debug, Clone)]
pub struct DirectoryCollections {
    pub demandes: String,
    pub professionals: String,
    pub availability_slots: String,
}

/// Document-store client for requests, the professional roster and
/// availability slots
pub struct DirectoryClient {
    base_url: String,
    api_key: String,
    project_id: String,
    database_id: String,
    client: Client,
    collections: DirectoryCollections,
}

impl DirectoryClient {
    pub fn new(
        base_url: String,
        api_key: String,
        project_id: String,
        database_id: String,
        collections: DirectoryCollections,
        timeout: Duration,
    ) -> Result<Self, StoreError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            base_url,
            api_key,
            project_id,
            database_id,
            client,
            collections,
        })
    }

    fn documents_url(&self, collection: &str, queries: &[String]) -> Result<String, StoreError> {
        let base = format!(
            "{}/databases/{}/collections/{}/documents",
            self.base_url.trim_end_matches('/'),
            self.database_id,
            collection
        );

        if queries.is_empty() {
            return Ok(base);
        }

        let queries_json = serde_json::to_string(queries)?;
        Ok(format!("{}?query={}", base, urlencoding::encode(&queries_json)))
    }

    /// GET a document list, returning `None` on 404
    async fn list_documents(&self, url: &str) -> Result<Option<Value>, StoreError> {
        let response = self
            .client
            .get(url)
            .header("X-Appwrite-Key", &self.api_key)
            .header("X-Appwrite-Project", &self.project_id)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(StoreError::Unavailable(format!(
                "directory returned {} for {}",
                status,
                url.split('?').next().unwrap_or(url)
            )));
        }

        Ok(Some(response.json().await?))
    }

    /// Fetch one request by id
    pub async fn get_demande(&self, request_id: &str) -> Result<Option<DemandeRecord>, StoreError> {
        // No stored id can contain the query quote characters
        if !is_query_safe(request_id) {
            tracing::debug!("Rejecting demande id with reserved characters");
            return Ok(None);
        }

        let queries = vec![
            format!("equal(\"$id\", \"{}\")", request_id),
            "limit(1)".to_string(),
        ];
        let url = self.documents_url(&self.collections.demandes, &queries)?;

        tracing::debug!("Fetching demande {}", request_id);

        let json = match self.list_documents(&url).await? {
            Some(json) => json,
            None => return Ok(None),
        };

        match documents(&json)?.first() {
            Some(doc) => map_demande_document(doc).map(Some),
            None => Ok(None),
        }
    }

    /// Fetch every active professional. Documents that fail validation are
    /// returned in `Roster::rejected` instead of failing the roster.
    pub async fn list_active_professionals(&self) -> Result<Roster, StoreError> {
        let queries = vec![
            "equal(\"isActive\", true)".to_string(),
            "limit(1000)".to_string(),
        ];
        let url = self.documents_url(&self.collections.professionals, &queries)?;

        let json = self
            .list_documents(&url)
            .await?
            .ok_or_else(|| StoreError::NotFound("professionals collection".to_string()))?;

        let mut roster = Roster::default();
        for (index, doc) in documents(&json)?.iter().enumerate() {
            match map_professional_document(doc) {
                Ok(professional) => roster.professionals.push(professional),
                Err(e) => {
                    let professional_id = document_id(doc)
                        .unwrap_or_else(|| format!("document #{}", index));
                    tracing::warn!("Rejecting professional document {}: {}", professional_id, e);
                    roster.rejected.push(RejectedRecord {
                        professional_id,
                        detail: e.to_string(),
                    });
                }
            }
        }

        tracing::debug!(
            "Fetched {} active professionals ({} rejected)",
            roster.professionals.len(),
            roster.rejected.len()
        );

        Ok(roster)
    }

    /// Count open slots for a professional within the window
    pub async fn count_open_slots(
        &self,
        professional_id: &str,
        window: AvailabilityWindow,
    ) -> Result<u32, StoreError> {
        if !is_query_safe(professional_id) {
            return Err(StoreError::schema(
                "professional",
                format!("id {:?} contains reserved characters", professional_id),
            ));
        }

        let queries = vec![
            format!("equal(\"professionalId\", \"{}\")", professional_id),
            "equal(\"status\", \"open\")".to_string(),
            format!("greaterThanEqual(\"startsAt\", \"{}\")", window.start.to_rfc3339()),
            format!("lessThan(\"startsAt\", \"{}\")", window.end.to_rfc3339()),
            "limit(1)".to_string(),
        ];
        let url = self.documents_url(&self.collections.availability_slots, &queries)?;

        let json = self
            .list_documents(&url)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("availability for {}", professional_id)))?;

        map_slot_total(&json)
    }
}

impl RequestStore for DirectoryClient {
    fn fetch_request<'a>(
        &'a self,
        request_id: &'a str,
    ) -> BoxFuture<'a, StoreResult<Option<DemandeRecord>>> {
        Box::pin(self.get_demande(request_id))
    }
}

impl ProfessionalStore for DirectoryClient {
    fn fetch_active_professionals(&self) -> BoxFuture<'_, StoreResult<Roster>> {
        Box::pin(self.list_active_professionals())
    }

    fn fetch_availability<'a>(
        &'a self,
        professional_id: &'a str,
        window: AvailabilityWindow,
    ) -> BoxFuture<'a, StoreResult<u32>> {
        Box::pin(self.count_open_slots(professional_id, window))
    }
}

/// Ids are interpolated into quoted query strings
fn is_query_safe(id: &str) -> bool {
    !id.is_empty() && !id.contains(['"', '\\'])
}

fn documents(json: &Value) -> Result<&Vec<Value>, StoreError> {
    json.get("documents")
        .and_then(Value::as_array)
        .ok_or_else(|| StoreError::schema("document list", "missing documents array"))
}

/// Documents may nest their fields under `data`
fn document_body(doc: &Value) -> &Value {
    doc.get("data").unwrap_or(doc)
}

fn document_id(doc: &Value) -> Option<String> {
    [doc, document_body(doc)]
        .iter()
        .find_map(|v| v.get("$id").or_else(|| v.get("id")))
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DemandeDocument {
    #[serde(rename = "$id", alias = "id")]
    id: String,
    demand_type: String,
    urgency: String,
    #[serde(default)]
    motif_keys: Vec<String>,
    #[serde(default)]
    required_specialties: Vec<String>,
    #[serde(default)]
    preferred_specialties: Vec<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    clinical_notes: Option<String>,
    #[serde(default)]
    legal_context: bool,
    #[serde(default)]
    participant_birthdates: Vec<String>,
}

/// Map a raw request document, failing on any field that does not fit
pub fn map_demande_document(doc: &Value) -> Result<DemandeRecord, StoreError> {
    let raw: DemandeDocument = serde_json::from_value(document_body(doc).clone())
        .map_err(|e| StoreError::schema("demande", e.to_string()))?;

    let demand_type = DemandType::parse(&raw.demand_type).ok_or_else(|| {
        StoreError::schema("demande", format!("unknown demand type '{}'", raw.demand_type))
    })?;
    let urgency = UrgencyLevel::parse(&raw.urgency).ok_or_else(|| {
        StoreError::schema("demande", format!("unknown urgency '{}'", raw.urgency))
    })?;
    let participant_birthdates = raw
        .participant_birthdates
        .iter()
        .map(|value| parse_date(value))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(DemandeRecord {
        id: raw.id,
        demand_type,
        urgency,
        motif_keys: normalize_keys(raw.motif_keys),
        required_specialties: normalize_keys(raw.required_specialties),
        preferred_specialties: normalize_keys(raw.preferred_specialties),
        description: raw.description,
        clinical_notes: raw.clinical_notes,
        legal_context: raw.legal_context,
        participant_birthdates,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfessionDocument {
    profession: String,
    #[serde(default)]
    is_primary: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpecialtyDocument {
    code: String,
    proficiency: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfessionalDocument {
    #[serde(rename = "$id", alias = "id")]
    id: String,
    display_name: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    phone: Option<String>,
    #[serde(default)]
    professions: Vec<ProfessionDocument>,
    #[serde(default)]
    specialties: Vec<SpecialtyDocument>,
    years_experience: i64,
    #[serde(default)]
    motifs: Vec<String>,
    #[serde(default)]
    clienteles: Vec<String>,
    #[serde(default)]
    demand_types: Vec<String>,
    #[serde(default)]
    co_treatment: bool,
    #[serde(default)]
    accepts_legal_mandates: bool,
    license_status: String,
}

/// Map a raw professional document, failing on any field that does not fit
pub fn map_professional_document(doc: &Value) -> Result<Professional, StoreError> {
    let raw: ProfessionalDocument = serde_json::from_value(document_body(doc).clone())
        .map_err(|e| StoreError::schema("professional", e.to_string()))?;

    let years_experience = u32::try_from(raw.years_experience).map_err(|_| {
        StoreError::schema(
            "professional",
            format!("{}: invalid years of experience {}", raw.id, raw.years_experience),
        )
    })?;

    let mut specialties = BTreeMap::new();
    for specialty in raw.specialties {
        let proficiency = Proficiency::parse(&specialty.proficiency).ok_or_else(|| {
            StoreError::schema(
                "professional",
                format!("{}: unknown proficiency '{}'", raw.id, specialty.proficiency),
            )
        })?;
        specialties.insert(specialty.code.trim().to_lowercase(), proficiency);
    }

    let clienteles = raw
        .clienteles
        .iter()
        .map(|value| {
            PopulationCategory::parse(value).ok_or_else(|| {
                StoreError::schema(
                    "professional",
                    format!("{}: unknown clientele '{}'", raw.id, value),
                )
            })
        })
        .collect::<Result<BTreeSet<_>, _>>()?;

    let demand_types = raw
        .demand_types
        .iter()
        .map(|value| {
            DemandType::parse(value).ok_or_else(|| {
                StoreError::schema(
                    "professional",
                    format!("{}: unknown demand type '{}'", raw.id, value),
                )
            })
        })
        .collect::<Result<BTreeSet<_>, _>>()?;

    let license_status = match raw.license_status.trim().to_lowercase().as_str() {
        "active" | "actif" => LicenseStatus::Active,
        "suspended" | "suspendu" => LicenseStatus::Suspended,
        "inactive" | "inactif" | "expired" => LicenseStatus::Inactive,
        other => {
            return Err(StoreError::schema(
                "professional",
                format!("{}: unknown license status '{}'", raw.id, other),
            ))
        }
    };

    Ok(Professional {
        id: raw.id,
        display_name: raw.display_name,
        email: raw.email,
        phone: raw.phone,
        professions: raw
            .professions
            .into_iter()
            .map(|p| ProfessionAssignment {
                profession: p.profession,
                is_primary: p.is_primary,
            })
            .collect(),
        specialties,
        years_experience,
        motifs: normalize_keys(raw.motifs),
        clienteles,
        demand_types,
        co_treatment: raw.co_treatment,
        accepts_legal_mandates: raw.accepts_legal_mandates,
        license_status,
    })
}

/// Read the slot count from a list response
pub fn map_slot_total(json: &Value) -> Result<u32, StoreError> {
    let total = json
        .get("total")
        .and_then(Value::as_u64)
        .ok_or_else(|| StoreError::schema("availability", "missing or negative total"))?;

    u32::try_from(total)
        .map_err(|_| StoreError::schema("availability", format!("total {} out of range", total)))
}

fn parse_date(value: &str) -> Result<NaiveDate, StoreError> {
    // Accept plain dates and timestamps
    let date_part = value.get(..10).unwrap_or(value);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .map_err(|_| StoreError::schema("demande", format!("invalid birthdate '{}'", value)))
}

fn normalize_keys(keys: Vec<String>) -> BTreeSet<String> {
    keys.into_iter()
        .map(|key| key.trim().to_lowercase())
        .filter(|key| !key.is_empty())
        .collect()
}
