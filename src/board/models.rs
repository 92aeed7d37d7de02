use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StageColor {
    Blue,
    Cyan,
    Purple,
    Orange,
    Yellow,
    Green,
    Red,
    Pink,
}

impl StageColor {
    pub const ALL: [StageColor; 8] = [
        Self::Blue,
        Self::Cyan,
        Self::Purple,
        Self::Orange,
        Self::Yellow,
        Self::Green,
        Self::Red,
        Self::Pink,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blue => "blue",
            Self::Cyan => "cyan",
            Self::Purple => "purple",
            Self::Orange => "orange",
            Self::Yellow => "yellow",
            Self::Green => "green",
            Self::Red => "red",
            Self::Pink => "pink",
        }
    }

    pub fn hex(&self) -> &'static str {
        match self {
            Self::Blue => "#3b82f6",
            Self::Cyan => "#06b6d4",
            Self::Purple => "#8b5cf6",
            Self::Orange => "#f97316",
            Self::Yellow => "#eab308",
            Self::Green => "#22c55e",
            Self::Red => "#ef4444",
            Self::Pink => "#ec4899",
        }
    }
}

impl FromStr for StageColor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "blue" => Ok(Self::Blue),
            "cyan" => Ok(Self::Cyan),
            "purple" => Ok(Self::Purple),
            "orange" => Ok(Self::Orange),
            "yellow" => Ok(Self::Yellow),
            "green" => Ok(Self::Green),
            "red" => Ok(Self::Red),
            "pink" => Ok(Self::Pink),
            _ => Err(format!("Invalid stage color: {}", s)),
        }
    }
}

impl std::fmt::Display for StageColor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One column of an owner's pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Stage {
    pub id: Uuid,
    pub owner_id: String,
    /// Slug of `name`, unique per owner.
    pub key: String,
    pub name: String,
    pub icon: String,
    pub color: StageColor,
    /// Display order. Not necessarily contiguous.
    pub position: i32,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
}

/// Input for a user-created stage. `position: None` appends after the last stage.
#[derive(Debug, Clone)]
pub struct NewStage {
    pub name: String,
    pub icon: String,
    pub color: StageColor,
    pub position: Option<i32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StagePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<StageColor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<i32>,
}

/// Record update as sent to persistence. `key` is derived by the registry, never by callers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageRecordPatch {
    pub key: Option<String>,
    pub name: Option<String>,
    pub icon: Option<String>,
    pub color: Option<StageColor>,
    pub position: Option<i32>,
}

impl StagePatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.icon.is_none() && self.color.is_none() && self.position.is_none()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    #[default]
    Note,
    Call,
    Email,
    Meeting,
    Message,
}

impl InteractionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Note => "note",
            Self::Call => "call",
            Self::Email => "email",
            Self::Meeting => "meeting",
            Self::Message => "message",
        }
    }
}

impl FromStr for InteractionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "note" => Ok(Self::Note),
            "call" => Ok(Self::Call),
            "email" => Ok(Self::Email),
            "meeting" => Ok(Self::Meeting),
            "message" => Ok(Self::Message),
            _ => Err(format!("Invalid interaction kind: {}", s)),
        }
    }
}

/// One entry in a lead's contact history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Interaction {
    pub at: DateTime<Utc>,
    pub kind: InteractionKind,
    pub description: String,
    #[serde(default)]
    pub next_step: String,
}

/// One prospect tracked through the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Lead {
    pub id: Uuid,
    pub owner_id: String,
    pub name: String,
    pub company: Option<String>,
    pub email: Option<String>,
    pub contact_number: Option<String>,
    pub estimated_value: f64,
    pub next_action: Option<String>,
    /// Canonical reference is the stage key. Older rows may hold a stage name or id.
    pub stage_key: String,
    #[serde(default)]
    pub interactions: Vec<Interaction>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewLead {
    pub name: String,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub contact_number: Option<String>,
    #[serde(default)]
    pub estimated_value: f64,
    #[serde(default)]
    pub next_action: Option<String>,
    /// Landing stage; defaults to the intake stage.
    #[serde(default)]
    pub stage_key: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LeadPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_key: Option<String>,
}

impl LeadPatch {
    pub fn stage_only(stage_key: &str) -> Self {
        Self {
            stage_key: Some(stage_key.to_string()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.company.is_none()
            && self.email.is_none()
            && self.contact_number.is_none()
            && self.estimated_value.is_none()
            && self.next_action.is_none()
            && self.stage_key.is_none()
    }

    /// Apply to an in-memory lead, mirroring what persistence does to the row.
    pub fn apply_to(&self, lead: &mut Lead) {
        if let Some(name) = &self.name {
            lead.name = name.clone();
        }
        if let Some(company) = &self.company {
            lead.company = non_blank(company);
        }
        if let Some(email) = &self.email {
            lead.email = non_blank(email);
        }
        if let Some(number) = &self.contact_number {
            lead.contact_number = non_blank(number);
        }
        if let Some(value) = self.estimated_value {
            lead.estimated_value = value;
        }
        if let Some(action) = &self.next_action {
            lead.next_action = non_blank(action);
        }
        if let Some(key) = &self.stage_key {
            lead.stage_key = key.clone();
        }
    }
}

/// Optional text fields are stored as `None` rather than empty strings.
pub fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

// Board view types

/// A lead as rendered on the board.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LeadCard {
    #[serde(flatten)]
    pub lead: Lead,
    pub age_in_days: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StageSummary {
    pub key: String,
    pub name: String,
    pub lead_count: usize,
    pub total_value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BoardSummary {
    pub stages: Vec<StageSummary>,
    pub lead_count: usize,
    pub total_value: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_lead() -> Lead {
        let now = Utc::now();
        Lead {
            id: Uuid::new_v4(),
            owner_id: "u1".into(),
            name: "Ana Silva".into(),
            company: Some("Tech Solutions".into()),
            email: None,
            contact_number: None,
            estimated_value: 5000.0,
            next_action: None,
            stage_key: "lead".into(),
            interactions: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn stage_color_round_trips_through_str() {
        for color in StageColor::ALL {
            assert_eq!(color.as_str().parse::<StageColor>(), Ok(color));
        }
        assert!("magenta".parse::<StageColor>().is_err());
    }

    #[test]
    fn stage_color_serializes_lowercase() {
        let json = serde_json::to_string(&StageColor::Purple).unwrap();
        assert_eq!(json, "\"purple\"");
    }

    #[test]
    fn lead_patch_applies_only_present_fields() {
        let mut lead = sample_lead();
        let patch = LeadPatch {
            email: Some("ana@tech.com".into()),
            company: Some("   ".into()),
            ..LeadPatch::default()
        };
        patch.apply_to(&mut lead);
        assert_eq!(lead.email.as_deref(), Some("ana@tech.com"));
        assert_eq!(lead.company, None);
        assert_eq!(lead.name, "Ana Silva");
        assert_eq!(lead.stage_key, "lead");
    }

    #[test]
    fn stage_only_patch_is_not_empty() {
        let patch = LeadPatch::stage_only("proposal");
        assert!(!patch.is_empty());
        assert_eq!(patch.stage_key.as_deref(), Some("proposal"));
        assert!(LeadPatch::default().is_empty());
    }

    #[test]
    fn lead_card_flattens_lead_fields() {
        let card = LeadCard {
            lead: sample_lead(),
            age_in_days: 3,
        };
        let value = serde_json::to_value(&card).unwrap();
        assert_eq!(value["name"], "Ana Silva");
        assert_eq!(value["age_in_days"], 3);
    }
}
