use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum WorkoutStatus {
    Draft,
    Active,
    Archived,
}

impl WorkoutStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Archived => "archived",
        }
    }

    pub fn parse(value: &str) -> Result<Self, AppError> {
        match value {
            "draft" => Ok(Self::Draft),
            "active" => Ok(Self::Active),
            "archived" => Ok(Self::Archived),
            other => Err(AppError::ConsistencyViolation(format!(
                "unknown workout status '{other}'"
            ))),
        }
    }
}

/// How an exercise instance takes part in a superset.
///
/// Stored as three nullable columns; at most one of partner/group is set.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub enum Superset {
    #[default]
    None,
    /// Performed back-to-back with another exercise of the same workout.
    Partner(i64),
    /// Member of a named group, ordered by `order` within the group.
    Group { group_id: String, order: i32 },
}

impl Superset {
    pub fn from_columns(
        partner_id: Option<i64>,
        group_id: Option<&str>,
        order: Option<i32>,
    ) -> Self {
        if let Some(partner_id) = partner_id {
            return Self::Partner(partner_id);
        }
        match group_id {
            Some(group_id) if !group_id.is_empty() => Self::Group {
                group_id: group_id.to_string(),
                order: order.unwrap_or(0),
            },
            _ => Self::None,
        }
    }

    pub fn into_columns(self) -> (Option<i64>, Option<String>, Option<i32>) {
        match self {
            Self::None => (None, None, None),
            Self::Partner(id) => (Some(id), None, None),
            Self::Group { group_id, order } => (None, Some(group_id), Some(order)),
        }
    }

    pub fn partner_id(&self) -> Option<i64> {
        match self {
            Self::Partner(id) => Some(*id),
            _ => None,
        }
    }

    pub fn group_id(&self) -> Option<&str> {
        match self {
            Self::Group { group_id, .. } => Some(group_id.as_str()),
            _ => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DefinitionInput {
    pub name: String,
    pub description: Option<String>,
    pub target_muscle_group: Option<String>,
    pub equipment: Option<String>,
    pub video_url: Option<String>,
    pub image_url: Option<String>,
}

impl DefinitionInput {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            target_muscle_group: None,
            equipment: None,
            video_url: None,
            image_url: None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SetInput {
    pub reps: i32,
    pub weight_kg: f64,
    pub set_type: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SetChanges {
    pub reps: Option<i32>,
    pub weight_kg: Option<f64>,
    pub set_type: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct WorkoutChanges {
    pub name: Option<String>,
    pub notes: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn superset_columns_prefer_partner_link() {
        let value = Superset::from_columns(Some(7), Some("a"), Some(2));
        assert_eq!(value, Superset::Partner(7));
    }

    #[test]
    fn superset_empty_group_id_is_none() {
        assert_eq!(Superset::from_columns(None, Some(""), Some(1)), Superset::None);
        assert_eq!(Superset::from_columns(None, None, Some(1)), Superset::None);
    }

    #[test]
    fn superset_group_round_trips_through_columns() {
        let group = Superset::Group {
            group_id: "legs".to_string(),
            order: 3,
        };
        let (partner, group_id, order) = group.clone().into_columns();
        assert_eq!(partner, None);
        assert_eq!(
            Superset::from_columns(partner, group_id.as_deref(), order),
            group
        );
    }

    #[test]
    fn workout_status_rejects_unknown_values() {
        assert_eq!(WorkoutStatus::parse("active").unwrap(), WorkoutStatus::Active);
        assert!(matches!(
            WorkoutStatus::parse("paused"),
            Err(AppError::ConsistencyViolation(_))
        ));
    }
}
