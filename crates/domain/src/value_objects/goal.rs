use crate::DomainError;

/// Shape of a navigation goal.
///
/// `Near` is the default because requesting the exact block tends to fail
/// when the target is occupied or the bot's hitbox overlaps a neighbour.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GoalShape {
    /// Stand in the target block.
    Exact,
    /// Stand anywhere within `range` blocks of the target.
    Near { range: f64 },
    /// Stand next to the target block (for interacting with it).
    Adjacent,
}

/// Reach of an adjacent goal, measured between block origins.
const ADJACENT_REACH: f64 = 1.5;

impl GoalShape {
    /// Distance from the target at which this goal counts as satisfied.
    pub fn tolerance(&self) -> f64 {
        match self {
            GoalShape::Exact => 0.0,
            GoalShape::Near { range } => range.max(0.0),
            GoalShape::Adjacent => ADJACENT_REACH,
        }
    }

    /// Wire name of the goal type.
    pub fn kind(&self) -> &'static str {
        match self {
            GoalShape::Exact => "exact",
            GoalShape::Near { .. } => "near",
            GoalShape::Adjacent => "adjacent",
        }
    }

    /// Range carried on the wire, if any.
    pub fn range(&self) -> Option<f64> {
        match self {
            GoalShape::Near { range } => Some(*range),
            _ => None,
        }
    }

    /// Build a goal from its wire name and optional range.
    ///
    /// A missing name means `near`; a missing range means `default_range`.
    pub fn from_wire(
        kind: Option<&str>,
        range: Option<f64>,
        default_range: f64,
    ) -> Result<Self, DomainError> {
        match kind.unwrap_or("near") {
            "exact" | "block" => Ok(GoalShape::Exact),
            "adjacent" => Ok(GoalShape::Adjacent),
            "near" => {
                let range = range.unwrap_or(default_range);
                if !range.is_finite() || range < 0.0 {
                    return Err(DomainError::validation(format!(
                        "goal range must be a non-negative number, got {range}"
                    )));
                }
                Ok(GoalShape::Near { range })
            }
            other => Err(DomainError::parse(format!("unknown goal type '{other}'"))),
        }
    }
}
