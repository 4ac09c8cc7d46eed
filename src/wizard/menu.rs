//! Menu payloads for each wizard step.
//!
//! Widget ids are stable per step (and per driver index for place menus), so
//! a selection can be matched against the step that issued it.

use serde::{Deserialize, Serialize};

use super::state::{Step, WizardState};
use crate::options::{MenuOption, find_by_value};

/// Workload percentages offered to the shift lead.
pub const WORKLOAD_PERCENTAGES: [u32; 4] = [30, 35, 40, 45];

/// Availability goals offered to the shift lead.
pub const GOAL_PERCENTAGES: [u32; 10] = [85, 87, 90, 92, 93, 94, 95, 96, 97, 98];

/// Inactivity windows, in days.
pub const DAYS_INACTIVE: [u32; 4] = [1, 2, 3, 4];

const WIDGET_PREFIX: &str = "opsplan";

/// One entry in a menu widget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuChoice {
    pub label: String,
    pub value: String,
}

impl From<&MenuOption> for MenuChoice {
    fn from(option: &MenuOption) -> Self {
        Self {
            label: option.label.clone(),
            value: option.value.clone(),
        }
    }
}

/// An enumerated-choice widget shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Menu {
    pub widget_id: String,
    pub placeholder: String,
    pub choices: Vec<MenuChoice>,
    pub min_values: usize,
    pub max_values: usize,
    /// Error annotation shown when the previous attempt was rejected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
}

impl Menu {
    pub fn is_multi_select(&self) -> bool {
        self.max_values > 1
    }

    pub fn with_notice(mut self, notice: impl Into<String>) -> Self {
        self.notice = Some(notice.into());
        self
    }
}

/// The option sources a session was started with.
#[derive(Debug, Clone, Copy)]
pub struct StepOptions<'a> {
    pub people: &'a [MenuOption],
    pub places: &'a [MenuOption],
}

impl StepOptions<'_> {
    /// Display label for a person value, falling back to the value itself.
    pub fn person_label<'v>(&'v self, value: &'v str) -> &'v str {
        find_by_value(self.people, value)
            .map(|o| o.label.as_str())
            .unwrap_or(value)
    }

    pub fn place_label<'v>(&'v self, value: &'v str) -> &'v str {
        find_by_value(self.places, value)
            .map(|o| o.label.as_str())
            .unwrap_or(value)
    }
}

/// Widget id issued for a step. `None` for steps that take no menu input.
pub fn widget_id(step: Step) -> Option<String> {
    let suffix = match step {
        Step::People => "people".to_string(),
        Step::Place(i) => format!("place:{i}"),
        Step::WorkloadPercentage => "workload".to_string(),
        Step::GoalPercentage => "goal".to_string(),
        Step::DaysInactive => "days_inactive".to_string(),
        Step::Comment | Step::Complete => return None,
    };
    Some(format!("{WIDGET_PREFIX}:{suffix}"))
}

fn percentage_choices(values: &[u32]) -> Vec<MenuChoice> {
    values
        .iter()
        .map(|v| MenuChoice {
            label: format!("{v}%"),
            value: v.to_string(),
        })
        .collect()
}

fn plain_choices(values: &[u32]) -> Vec<MenuChoice> {
    values
        .iter()
        .map(|v| MenuChoice {
            label: v.to_string(),
            value: v.to_string(),
        })
        .collect()
}

fn single(widget_id: String, placeholder: String, choices: Vec<MenuChoice>) -> Menu {
    Menu {
        widget_id,
        placeholder,
        choices,
        min_values: 1,
        max_values: 1,
        notice: None,
    }
}

/// The menu the current state expects an answer to.
pub fn menu_for(state: &WizardState, options: &StepOptions<'_>) -> Option<Menu> {
    let step = state.step();
    let id = widget_id(step)?;

    let menu = match state {
        WizardState::AwaitingPeople => Menu {
            widget_id: id,
            placeholder: "Select people".to_string(),
            choices: options.people.iter().map(MenuChoice::from).collect(),
            min_values: 1,
            max_values: options.people.len().max(1),
            notice: None,
        },
        WizardState::AwaitingPlace { crew } => {
            let driver = crew.next_unassigned().unwrap_or_default();
            single(
                id,
                format!("Where should {} drive?", options.person_label(driver)),
                options.places.iter().map(MenuChoice::from).collect(),
            )
        }
        WizardState::AwaitingWorkloadPercentage { .. } => single(
            id,
            "Select a percentage".to_string(),
            percentage_choices(&WORKLOAD_PERCENTAGES),
        ),
        WizardState::AwaitingGoalPercentage { .. } => single(
            id,
            "Select a goal percentage".to_string(),
            percentage_choices(&GOAL_PERCENTAGES),
        ),
        WizardState::AwaitingDaysInactive { .. } => single(
            id,
            "Inactive".to_string(),
            plain_choices(&DAYS_INACTIVE),
        ),
        WizardState::AwaitingComment { .. } | WizardState::Complete(_) => return None,
    };
    Some(menu)
}

/// Message text shown above the current menu.
pub fn prompt_for(state: &WizardState, options: &StepOptions<'_>) -> String {
    match state {
        WizardState::AwaitingPeople => {
            "Please select the people you want to assign places to:".to_string()
        }
        WizardState::AwaitingPlace { crew } => {
            let driver = crew.next_unassigned().unwrap_or_default();
            format!("Select a place for {}:", options.person_label(driver))
        }
        WizardState::AwaitingWorkloadPercentage { .. } => {
            "All drivers have been assigned places. Now, select a percentage:".to_string()
        }
        WizardState::AwaitingGoalPercentage { .. } => "Now, select a goal percentage:".to_string(),
        WizardState::AwaitingDaysInactive { .. } => {
            "Now, select how many days count as inactive:".to_string()
        }
        WizardState::AwaitingComment { .. } => {
            "All selections are complete! Please enter your comment below:".to_string()
        }
        WizardState::Complete(_) => "Ops plan complete.".to_string(),
    }
}

/// Echo of what was just accepted at `answered`, read back from the new state.
pub fn confirmation_for(
    answered: Step,
    state: &WizardState,
    options: &StepOptions<'_>,
) -> Option<String> {
    let picked = match answered {
        Step::People => state
            .people()
            .iter()
            .map(|p| options.person_label(p))
            .collect::<Vec<_>>()
            .join(", "),
        Step::Place(i) => {
            let assignment = state.assignments().get(i)?;
            format!(
                "{} for {}",
                options.place_label(&assignment.place),
                options.person_label(&assignment.person)
            )
        }
        Step::WorkloadPercentage => format!("{}%", state.workload_percentage()?),
        Step::GoalPercentage => format!("{}%", state.goal_percentage()?),
        Step::DaysInactive => match state.days_inactive()? {
            1 => "1 day".to_string(),
            n => format!("{n} days"),
        },
        Step::Comment | Step::Complete => return None,
    };
    Some(format!("You selected: {picked}"))
}

/// Parse a scalar answer, accepting only values from the offered set.
pub fn parse_scalar(value: &str, allowed: &[u32]) -> Option<u32> {
    value
        .trim()
        .trim_end_matches('%')
        .parse::<u32>()
        .ok()
        .filter(|v| allowed.contains(v))
}
