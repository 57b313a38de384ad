use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Coarse listing status of a pet.
///
/// `Adopted` is entered as soon as the tutor nominates a candidate and never
/// reverts to `Available`, even when the nomination is later rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PetStatus {
    Available,
    Adopted,
}

impl PetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PetStatus::Available => "AVAILABLE",
            PetStatus::Adopted => "ADOPTED",
        }
    }
}

/// The authoritative row for a pet, carrying the adoption-lifecycle fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PetRecord {
    pub id: String,
    /// The tutor who listed the pet.
    pub owner_id: String,
    pub name: String,
    pub status: PetStatus,
    /// Candidate adopter nominated by the tutor. Cleared on finalization or rejection.
    pub pending_adopter_id: Option<String>,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub marked_adopted_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub adopter_confirmed_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub adoption_rejected_at: Option<OffsetDateTime>,
    pub adoption_rejection_reason: Option<String>,
    /// Platform confirmation badge.
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub adopet_confirmed_at: Option<OffsetDateTime>,
    /// Optimistic concurrency counter; 0 on insert, +1 on every update.
    pub version: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl PetRecord {
    /// A freshly listed pet: available, no lifecycle stamps, version 0.
    pub fn listed(
        id: impl Into<String>,
        owner_id: impl Into<String>,
        name: impl Into<String>,
        listed_at: OffsetDateTime,
    ) -> Self {
        Self {
            id: id.into(),
            owner_id: owner_id.into(),
            name: name.into(),
            status: PetStatus::Available,
            pending_adopter_id: None,
            marked_adopted_at: None,
            adopter_confirmed_at: None,
            adoption_rejected_at: None,
            adoption_rejection_reason: None,
            adopet_confirmed_at: None,
            version: 0,
            updated_at: listed_at,
        }
    }

    pub fn is_rejected(&self) -> bool {
        self.adoption_rejected_at.is_some()
    }
}

/// Immutable fact recording a finalized adoption. At most one per pet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdoptionRecord {
    pub id: String,
    pub pet_id: String,
    pub tutor_id: String,
    pub adopter_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub adopted_at: OffsetDateTime,
}

impl AdoptionRecord {
    /// Record key derived from the pet, so a second record for the same pet
    /// collides on the primary key as well as on `pet_id`.
    pub fn id_for_pet(pet_id: &str) -> String {
        format!("adoption-{pet_id}")
    }
}
