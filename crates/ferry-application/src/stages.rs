//! Phase transition table for FerryApplication convergence
//!
//! The table is pure: given the current phase it names the next step and the
//! phases written before it runs, after it succeeds and after it fails. The
//! engine walks it in a loop; nothing here talks to the provider.

use std::fmt;
use std::str::FromStr;

use ferry_common::crd::ApplicationPhase;
use ferry_common::Error;

/// A provisioning stage that performs remote calls
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Create or adopt the load balancer
    LoadBalancer,
    /// Create the target groups
    TargetGroups,
    /// Attach the load balancer to the compute cluster
    LbAttach,
    /// Attach the target groups to the compute cluster
    TgAttach,
    /// Create or adopt the frontend
    Frontend,
    /// Install ACL and routing rules, or the network backend
    Acl,
}

impl Stage {
    /// Every stage, in the default order
    pub const ALL: [Stage; 6] = [
        Stage::LoadBalancer,
        Stage::TargetGroups,
        Stage::LbAttach,
        Stage::TgAttach,
        Stage::Frontend,
        Stage::Acl,
    ];

    /// Phase persisted before the stage runs
    pub fn pending(&self) -> ApplicationPhase {
        match self {
            Stage::LoadBalancer => ApplicationPhase::LbPending,
            Stage::TargetGroups => ApplicationPhase::TgPending,
            Stage::LbAttach => ApplicationPhase::LbAttachPending,
            Stage::TgAttach => ApplicationPhase::TgAttachPending,
            Stage::Frontend => ApplicationPhase::FrontendPending,
            Stage::Acl => ApplicationPhase::AclPending,
        }
    }

    /// Phase persisted after the stage succeeds
    pub fn created(&self) -> ApplicationPhase {
        match self {
            Stage::LoadBalancer => ApplicationPhase::LbCreated,
            Stage::TargetGroups => ApplicationPhase::TgCreated,
            Stage::LbAttach => ApplicationPhase::LbAttachCreated,
            Stage::TgAttach => ApplicationPhase::TgAttachCreated,
            Stage::Frontend => ApplicationPhase::FrontendCreated,
            Stage::Acl => ApplicationPhase::AclCreated,
        }
    }

    /// Phase persisted after the stage fails
    pub fn error(&self) -> ApplicationPhase {
        match self {
            Stage::LoadBalancer => ApplicationPhase::LbError,
            Stage::TargetGroups => ApplicationPhase::TgError,
            Stage::LbAttach => ApplicationPhase::LbAttachError,
            Stage::TgAttach => ApplicationPhase::TgAttachError,
            Stage::Frontend => ApplicationPhase::FrontendError,
            Stage::Acl => ApplicationPhase::AclError,
        }
    }

    /// Name used in `STAGE_ORDER` and in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::LoadBalancer => "lb",
            Stage::TargetGroups => "tg",
            Stage::LbAttach => "lb-attach",
            Stage::TgAttach => "tg-attach",
            Stage::Frontend => "frontend",
            Stage::Acl => "acl",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        Stage::ALL
            .into_iter()
            .find(|stage| stage.as_str() == normalized)
            .ok_or_else(|| {
                Error::validation_for_field(
                    "stage-order",
                    "STAGE_ORDER",
                    format!(
                        "unknown stage '{}', expected one of lb, tg, lb-attach, tg-attach, frontend, acl",
                        s.trim()
                    ),
                )
            })
    }
}

/// What the engine does for a phase
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    /// Run a provisioning stage
    Stage(Stage),
    /// Record Running; no remote call
    EnterRunning,
    /// Reconcile drift against the live resources
    Drift,
}

/// One row of the transition table
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transition {
    /// Step to execute
    pub step: Step,
    /// Phase written before the step, if any
    pub pending: Option<ApplicationPhase>,
    /// Phase written when the step succeeds
    pub success: ApplicationPhase,
    /// Phase written when the step fails, if the step can fail into one
    pub failure: Option<ApplicationPhase>,
}

/// A validated ordering of the provisioning stages
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StageOrder {
    stages: Vec<Stage>,
}

impl Default for StageOrder {
    fn default() -> Self {
        Self {
            stages: Stage::ALL.to_vec(),
        }
    }
}

impl StageOrder {
    /// Validate an ordering
    ///
    /// Each stage must appear exactly once, the load balancer comes first,
    /// ACL comes last, target groups precede their attachment and the
    /// frontend precedes ACL.
    pub fn new(stages: Vec<Stage>) -> Result<Self, Error> {
        let invalid = |msg: String| Error::validation_for_field("stage-order", "STAGE_ORDER", msg);

        for stage in Stage::ALL {
            let count = stages.iter().filter(|s| **s == stage).count();
            if count != 1 {
                return Err(invalid(format!(
                    "stage {stage} must appear exactly once, found {count}"
                )));
            }
        }
        if stages.len() != Stage::ALL.len() {
            return Err(invalid(format!("expected 6 stages, got {}", stages.len())));
        }

        let position = |stage: Stage| stages.iter().position(|s| *s == stage).unwrap_or(0);
        if position(Stage::LoadBalancer) != 0 {
            return Err(invalid("lb must be the first stage".to_string()));
        }
        if position(Stage::Acl) != stages.len() - 1 {
            return Err(invalid("acl must be the last stage".to_string()));
        }
        if position(Stage::TargetGroups) > position(Stage::TgAttach) {
            return Err(invalid("tg must come before tg-attach".to_string()));
        }
        if position(Stage::Frontend) > position(Stage::Acl) {
            return Err(invalid("frontend must come before acl".to_string()));
        }

        Ok(Self { stages })
    }

    /// Parse a comma-separated ordering such as `lb,tg,frontend,lb-attach,tg-attach,acl`
    pub fn parse(s: &str) -> Result<Self, Error> {
        let stages = s
            .split(',')
            .filter(|part| !part.trim().is_empty())
            .map(Stage::from_str)
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(stages)
    }

    /// Stages in execution order
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Look up the transition for a phase
    ///
    /// Returns `None` for deletion phases, which belong to teardown.
    pub fn transition(&self, phase: ApplicationPhase) -> Option<Transition> {
        if phase == ApplicationPhase::Running {
            return Some(Transition {
                step: Step::Drift,
                pending: None,
                success: ApplicationPhase::Running,
                failure: None,
            });
        }

        let last = self.stages.last()?;
        if phase == last.created() {
            return Some(Transition {
                step: Step::EnterRunning,
                pending: None,
                success: ApplicationPhase::Running,
                failure: None,
            });
        }

        self.stages.iter().enumerate().find_map(|(i, stage)| {
            let entered_from_previous = match i {
                0 => phase == ApplicationPhase::New,
                _ => phase == self.stages[i - 1].created(),
            };
            let entered = entered_from_previous || phase == stage.pending() || phase == stage.error();
            entered.then(|| Transition {
                step: Step::Stage(*stage),
                pending: Some(stage.pending()),
                success: stage.created(),
                failure: Some(stage.error()),
            })
        })
    }
}

impl fmt::Display for StageOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.stages.iter().map(Stage::as_str).collect();
        f.write_str(&names.join(","))
    }
}
