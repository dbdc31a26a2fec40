//! Approval routes: who signs off, in which order.

use serde::{Deserialize, Serialize};

use tradeflow_core::{DomainError, DomainResult, UserId};

/// Who may act on an approval step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Approver {
    /// Any user holding the role.
    Role(String),
    /// One named user.
    User(UserId),
}

impl Approver {
    pub fn describe(&self) -> String {
        match self {
            Approver::Role(r) => format!("role:{r}"),
            Approver::User(u) => format!("user:{u}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalStep {
    pub sequence: u32,
    pub approver: Approver,
    #[serde(default)]
    pub label: Option<String>,
}

/// Ordered approval steps. An empty route means documents approve on submit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRoute {
    pub steps: Vec<ApprovalStep>,
}

impl ApprovalRoute {
    pub fn new(steps: Vec<ApprovalStep>) -> DomainResult<Self> {
        let route = Self { steps };
        route.validate()?;
        Ok(route)
    }

    /// Single-role route numbered from 1, e.g. `["manager", "director"]`.
    pub fn of_roles<I, S>(roles: I) -> DomainResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let steps = roles
            .into_iter()
            .enumerate()
            .map(|(i, role)| ApprovalStep {
                sequence: i as u32 + 1,
                approver: Approver::Role(role.into()),
                label: None,
            })
            .collect();
        Self::new(steps)
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn step(&self, index: usize) -> Option<&ApprovalStep> {
        self.steps.get(index)
    }

    pub fn validate(&self) -> DomainResult<()> {
        let mut last = 0u32;
        for step in &self.steps {
            if step.sequence <= last {
                return Err(DomainError::validation(
                    "approval step sequences must be positive and strictly increasing",
                ));
            }
            if let Approver::Role(role) = &step.approver {
                if role.trim().is_empty() {
                    return Err(DomainError::validation("approver role cannot be empty"));
                }
            }
            last = step.sequence;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn of_roles_numbers_steps_from_one() {
        let route = ApprovalRoute::of_roles(["manager", "director"]).unwrap();
        assert_eq!(route.steps[0].sequence, 1);
        assert_eq!(route.steps[1].sequence, 2);
    }

    #[test]
    fn rejects_out_of_order_sequences() {
        let steps = vec![
            ApprovalStep { sequence: 2, approver: Approver::Role("a".into()), label: None },
            ApprovalStep { sequence: 2, approver: Approver::Role("b".into()), label: None },
        ];
        assert!(matches!(ApprovalRoute::new(steps), Err(DomainError::Validation(_))));
    }

    #[test]
    fn rejects_blank_role() {
        assert!(ApprovalRoute::of_roles(["  "]).is_err());
    }
}
