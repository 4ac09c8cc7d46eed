//! Wizard state, one variant per step, each carrying only the fields that
//! step has already collected.

use serde::{Deserialize, Serialize};

/// A driver paired with the place they cover. Both are option values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub person: String,
    pub place: String,
}

/// Selected people and every place assigned so far.
///
/// `assignments[i]` always pairs with `people[i]`, and there are never more
/// assignments than people.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Crew {
    pub people: Vec<String>,
    pub assignments: Vec<Assignment>,
}

impl Crew {
    pub fn new(people: Vec<String>) -> Self {
        Self {
            people,
            assignments: Vec::new(),
        }
    }

    /// The person whose place is asked next, if any are still unassigned.
    pub fn next_unassigned(&self) -> Option<&str> {
        self.people
            .get(self.assignments.len())
            .map(String::as_str)
    }

    /// Append a place for the next unassigned person.
    ///
    /// Returns `false` (and changes nothing) when everyone already has a place.
    pub fn assign(&mut self, place: String) -> bool {
        let Some(person) = self.next_unassigned().map(str::to_string) else {
            return false;
        };
        self.assignments.push(Assignment { person, place });
        true
    }

    pub fn is_fully_assigned(&self) -> bool {
        self.assignments.len() == self.people.len()
    }
}

/// Everything the summary needs, collected by a finished wizard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedPlan {
    pub crew: Crew,
    pub workload_percentage: u32,
    pub goal_percentage: u32,
    pub days_inactive: u32,
    /// `None` when the comment window closed without a reply.
    pub comment: Option<String>,
}

/// The wizard's current position plus the data gathered to get there.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum WizardState {
    #[default]
    AwaitingPeople,
    AwaitingPlace {
        crew: Crew,
    },
    AwaitingWorkloadPercentage {
        crew: Crew,
    },
    AwaitingGoalPercentage {
        crew: Crew,
        workload_percentage: u32,
    },
    AwaitingDaysInactive {
        crew: Crew,
        workload_percentage: u32,
        goal_percentage: u32,
    },
    AwaitingComment {
        crew: Crew,
        workload_percentage: u32,
        goal_percentage: u32,
        days_inactive: u32,
    },
    Complete(CompletedPlan),
}

impl WizardState {
    pub fn step(&self) -> Step {
        match self {
            Self::AwaitingPeople => Step::People,
            Self::AwaitingPlace { crew } => Step::Place(crew.assignments.len()),
            Self::AwaitingWorkloadPercentage { .. } => Step::WorkloadPercentage,
            Self::AwaitingGoalPercentage { .. } => Step::GoalPercentage,
            Self::AwaitingDaysInactive { .. } => Step::DaysInactive,
            Self::AwaitingComment { .. } => Step::Comment,
            Self::Complete(_) => Step::Complete,
        }
    }

    pub fn crew(&self) -> Option<&Crew> {
        match self {
            Self::AwaitingPeople => None,
            Self::AwaitingPlace { crew }
            | Self::AwaitingWorkloadPercentage { crew }
            | Self::AwaitingGoalPercentage { crew, .. }
            | Self::AwaitingDaysInactive { crew, .. }
            | Self::AwaitingComment { crew, .. } => Some(crew),
            Self::Complete(plan) => Some(&plan.crew),
        }
    }

    /// Selected people, empty until the people step completes.
    pub fn people(&self) -> &[String] {
        self.crew().map(|c| c.people.as_slice()).unwrap_or_default()
    }

    pub fn assignments(&self) -> &[Assignment] {
        self.crew()
            .map(|c| c.assignments.as_slice())
            .unwrap_or_default()
    }

    pub fn workload_percentage(&self) -> Option<u32> {
        match self {
            Self::AwaitingGoalPercentage {
                workload_percentage,
                ..
            }
            | Self::AwaitingDaysInactive {
                workload_percentage,
                ..
            }
            | Self::AwaitingComment {
                workload_percentage,
                ..
            } => Some(*workload_percentage),
            Self::Complete(plan) => Some(plan.workload_percentage),
            _ => None,
        }
    }

    pub fn goal_percentage(&self) -> Option<u32> {
        match self {
            Self::AwaitingDaysInactive {
                goal_percentage, ..
            }
            | Self::AwaitingComment {
                goal_percentage, ..
            } => Some(*goal_percentage),
            Self::Complete(plan) => Some(plan.goal_percentage),
            _ => None,
        }
    }

    pub fn days_inactive(&self) -> Option<u32> {
        match self {
            Self::AwaitingComment { days_inactive, .. } => Some(*days_inactive),
            Self::Complete(plan) => Some(plan.days_inactive),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.step().is_terminal()
    }
}

/// Position in the fixed wizard order.
///
/// The derived ordering follows declaration order, so every `Place(i)` sorts
/// after `People` and before `WorkloadPercentage`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Step {
    People,
    Place(usize),
    WorkloadPercentage,
    GoalPercentage,
    DaysInactive,
    Comment,
    Complete,
}

impl Step {
    /// Next step for a crew of `people` drivers.
    pub fn next(&self, people: usize) -> Option<Step> {
        use Step::*;
        match *self {
            People if people == 0 => None,
            People => Some(Place(0)),
            Place(i) if i + 1 < people => Some(Place(i + 1)),
            Place(_) => Some(WorkloadPercentage),
            WorkloadPercentage => Some(GoalPercentage),
            GoalPercentage => Some(DaysInactive),
            DaysInactive => Some(Comment),
            Comment => Some(Complete),
            Complete => None,
        }
    }

    /// Only the immediate successor is reachable: no skipping, no going back.
    pub fn can_transition_to(&self, target: Step, people: usize) -> bool {
        self.next(people) == Some(target)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete)
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::People => write!(f, "people"),
            Self::Place(i) => write!(f, "place[{i}]"),
            Self::WorkloadPercentage => write!(f, "workload_percentage"),
            Self::GoalPercentage => write!(f, "goal_percentage"),
            Self::DaysInactive => write!(f, "days_inactive"),
            Self::Comment => write!(f, "comment"),
            Self::Complete => write!(f, "complete"),
        }
    }
}
