//! The single transition function of the wizard.
//!
//! `advance` is pure: it takes the current state and one event, and returns
//! the next state together with what happened. Events that do not match the
//! current step leave the state untouched and report `Outcome::Ignored`.

use std::collections::HashSet;

use super::menu::{
    DAYS_INACTIVE, GOAL_PERCENTAGES, StepOptions, WORKLOAD_PERCENTAGES, parse_scalar, widget_id,
};
use super::state::{CompletedPlan, Crew, WizardState};
use crate::error::WizardError;
use crate::options::find_by_value;

/// Input to the wizard, already stripped of transport details.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WizardEvent {
    /// Values picked in a menu widget.
    Selection {
        widget_id: String,
        values: Vec<String>,
    },
    /// Free text from the wizard's user in the wizard's channel.
    Comment(String),
    /// The comment collection window ran out.
    CommentWindowClosed,
}

/// Why an event left the state unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Selection for a widget the current step did not issue.
    WidgetMismatch {
        expected: Option<String>,
        received: String,
    },
    /// Text or timeout arriving outside the comment step.
    NotAwaitingComment,
    /// The wizard already finished.
    Finished,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The state moved to the next step.
    Advanced,
    /// Nothing changed; the event does not belong to this step.
    Ignored(IgnoreReason),
    /// The event targeted this step but its values were unusable. The same
    /// menu should be shown again with the error's notice.
    Rejected(WizardError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub state: WizardState,
    pub outcome: Outcome,
}

impl Transition {
    fn advanced(state: WizardState) -> Self {
        Self {
            state,
            outcome: Outcome::Advanced,
        }
    }

    fn ignored(state: WizardState, reason: IgnoreReason) -> Self {
        Self {
            state,
            outcome: Outcome::Ignored(reason),
        }
    }

    fn rejected(state: WizardState, widget_id: &str, reason: impl Into<String>) -> Self {
        Self {
            state,
            outcome: Outcome::Rejected(WizardError::InvalidSelection {
                widget_id: widget_id.to_string(),
                reason: reason.into(),
            }),
        }
    }
}

/// Apply one event to the wizard.
pub fn advance(state: WizardState, event: &WizardEvent, options: &StepOptions<'_>) -> Transition {
    if state.is_terminal() {
        return Transition::ignored(state, IgnoreReason::Finished);
    }

    match event {
        WizardEvent::Selection { widget_id: received, values } => {
            let expected = widget_id(state.step());
            if expected.as_deref() != Some(received.as_str()) {
                return Transition::ignored(
                    state,
                    IgnoreReason::WidgetMismatch {
                        expected,
                        received: received.clone(),
                    },
                );
            }
            apply_selection(state, received, values, options)
        }
        WizardEvent::Comment(text) => match state {
            WizardState::AwaitingComment {
                crew,
                workload_percentage,
                goal_percentage,
                days_inactive,
            } => Transition::advanced(WizardState::Complete(CompletedPlan {
                crew,
                workload_percentage,
                goal_percentage,
                days_inactive,
                comment: Some(text.clone()),
            })),
            other => Transition::ignored(other, IgnoreReason::NotAwaitingComment),
        },
        WizardEvent::CommentWindowClosed => match state {
            WizardState::AwaitingComment {
                crew,
                workload_percentage,
                goal_percentage,
                days_inactive,
            } => Transition::advanced(WizardState::Complete(CompletedPlan {
                crew,
                workload_percentage,
                goal_percentage,
                days_inactive,
                comment: None,
            })),
            other => Transition::ignored(other, IgnoreReason::NotAwaitingComment),
        },
    }
}

/// The widget already matched the current step; validate the values.
fn apply_selection(
    state: WizardState,
    widget: &str,
    values: &[String],
    options: &StepOptions<'_>,
) -> Transition {
    match state {
        WizardState::AwaitingPeople => {
            if values.is_empty() {
                return Transition::rejected(state, widget, "no people selected");
            }
            let mut seen = HashSet::new();
            for value in values {
                if find_by_value(options.people, value).is_none() {
                    return Transition::rejected(state, widget, format!("unknown person {value}"));
                }
                if !seen.insert(value.as_str()) {
                    return Transition::rejected(state, widget, format!("{value} selected twice"));
                }
            }
            Transition::advanced(WizardState::AwaitingPlace {
                crew: Crew::new(values.to_vec()),
            })
        }
        WizardState::AwaitingPlace { mut crew } => {
            let place = match single_value(values) {
                Some(v) if find_by_value(options.places, v).is_some() => v.to_string(),
                Some(v) => {
                    let reason = format!("unknown place {v}");
                    return Transition::rejected(WizardState::AwaitingPlace { crew }, widget, reason);
                }
                None => {
                    return Transition::rejected(
                        WizardState::AwaitingPlace { crew },
                        widget,
                        "exactly one place is required",
                    );
                }
            };
            crew.assign(place);
            if crew.is_fully_assigned() {
                Transition::advanced(WizardState::AwaitingWorkloadPercentage { crew })
            } else {
                Transition::advanced(WizardState::AwaitingPlace { crew })
            }
        }
        WizardState::AwaitingWorkloadPercentage { crew } => {
            match single_value(values).and_then(|v| parse_scalar(v, &WORKLOAD_PERCENTAGES)) {
                Some(workload_percentage) => {
                    Transition::advanced(WizardState::AwaitingGoalPercentage {
                        crew,
                        workload_percentage,
                    })
                }
                None => Transition::rejected(
                    WizardState::AwaitingWorkloadPercentage { crew },
                    widget,
                    "workload percentage out of range",
                ),
            }
        }
        WizardState::AwaitingGoalPercentage {
            crew,
            workload_percentage,
        } => match single_value(values).and_then(|v| parse_scalar(v, &GOAL_PERCENTAGES)) {
            Some(goal_percentage) => Transition::advanced(WizardState::AwaitingDaysInactive {
                crew,
                workload_percentage,
                goal_percentage,
            }),
            None => Transition::rejected(
                WizardState::AwaitingGoalPercentage {
                    crew,
                    workload_percentage,
                },
                widget,
                "goal percentage out of range",
            ),
        },
        WizardState::AwaitingDaysInactive {
            crew,
            workload_percentage,
            goal_percentage,
        } => match single_value(values).and_then(|v| parse_scalar(v, &DAYS_INACTIVE)) {
            Some(days_inactive) => Transition::advanced(WizardState::AwaitingComment {
                crew,
                workload_percentage,
                goal_percentage,
                days_inactive,
            }),
            None => Transition::rejected(
                WizardState::AwaitingDaysInactive {
                    crew,
                    workload_percentage,
                    goal_percentage,
                },
                widget,
                "days inactive out of range",
            ),
        },
        // No widget is issued for these, so `widget_id` never matches them.
        other @ (WizardState::AwaitingComment { .. } | WizardState::Complete(_)) => {
            Transition::ignored(
                other,
                IgnoreReason::WidgetMismatch {
                    expected: None,
                    received: widget.to_string(),
                },
            )
        }
    }
}

fn single_value(values: &[String]) -> Option<&str> {
    match values {
        [only] => Some(only.as_str()),
        _ => None,
    }
}
