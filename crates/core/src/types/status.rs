//! Role, meal, and workflow status enums.
//!
//! The two status enums encode the meal workflow state machines:
//!
//! ```text
//! preparation_status: pending -> preparing -> ready        (terminal)
//! delivery_status:    pending -> in_progress -> delivered  (terminal)
//! ```
//!
//! Both machines move strictly forward one step at a time. Reaching
//! `ready` does not transition the preparation machine further; it
//! unlocks delivery-staff assignment on the owning delivery.

use serde::{Deserialize, Serialize};

/// Staff role, used for authorization and notification routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Creates patients and diet charts, sees every delivery.
    Manager,
    /// Prepares meals, drives `preparation_status`.
    PantryStaff,
    /// Carries meals to wards, drives `delivery_status`.
    Delivery,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Manager => write!(f, "manager"),
            Self::PantryStaff => write!(f, "pantry_staff"),
            Self::Delivery => write!(f, "delivery"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manager" => Ok(Self::Manager),
            "pantry_staff" => Ok(Self::PantryStaff),
            "delivery" => Ok(Self::Delivery),
            _ => Err(format!("invalid role: {s}")),
        }
    }
}

/// Meal slot a diet chart is prescribed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MealType {
    #[default]
    Morning,
    Evening,
    Night,
}

impl std::fmt::Display for MealType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Morning => write!(f, "morning"),
            Self::Evening => write!(f, "evening"),
            Self::Night => write!(f, "night"),
        }
    }
}

impl std::str::FromStr for MealType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "morning" => Ok(Self::Morning),
            "evening" => Ok(Self::Evening),
            "night" => Ok(Self::Night),
            _ => Err(format!("invalid meal type: {s}")),
        }
    }
}

/// Patient gender as recorded on admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    #[default]
    Male,
    Female,
    Other,
}

impl std::fmt::Display for Gender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Male => write!(f, "male"),
            Self::Female => write!(f, "female"),
            Self::Other => write!(f, "other"),
        }
    }
}

impl std::str::FromStr for Gender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "male" => Ok(Self::Male),
            "female" => Ok(Self::Female),
            "other" => Ok(Self::Other),
            _ => Err(format!("invalid gender: {s}")),
        }
    }
}

/// Pantry-side meal readiness state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PreparationStatus {
    #[default]
    Pending,
    Preparing,
    Ready,
}

impl PreparationStatus {
    /// The single forward step from this state, if any.
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Pending => Some(Self::Preparing),
            Self::Preparing => Some(Self::Ready),
            Self::Ready => None,
        }
    }

    /// Whether `target` is exactly one forward step from this state.
    #[must_use]
    pub fn can_advance_to(self, target: Self) -> bool {
        self.next() == Some(target)
    }

    /// Whether the machine accepts no further forward steps.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Ready)
    }
}

impl std::fmt::Display for PreparationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Preparing => write!(f, "preparing"),
            Self::Ready => write!(f, "ready"),
        }
    }
}

impl std::str::FromStr for PreparationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "preparing" => Ok(Self::Preparing),
            "ready" => Ok(Self::Ready),
            _ => Err(format!("invalid preparation status: {s}")),
        }
    }
}

/// Courier-side fulfillment state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    #[default]
    Pending,
    InProgress,
    Delivered,
}

impl DeliveryStatus {
    /// The single forward step from this state, if any.
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Pending => Some(Self::InProgress),
            Self::InProgress => Some(Self::Delivered),
            Self::Delivered => None,
        }
    }

    /// Whether `target` is exactly one forward step from this state.
    #[must_use]
    pub fn can_advance_to(self, target: Self) -> bool {
        self.next() == Some(target)
    }

    /// Whether the machine accepts no further forward steps.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered)
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Delivered => write!(f, "delivered"),
        }
    }
}

impl std::str::FromStr for DeliveryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "delivered" => Ok(Self::Delivered),
            _ => Err(format!("invalid delivery status: {s}")),
        }
    }
}
