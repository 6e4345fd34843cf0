use async_trait::async_trait;

/// Injected confirmation capability standing in for ambient user dialogs.
///
/// Every state transition runs through a gate before any backend call, so
/// the workflow logic stays testable without an interactive environment.
/// `confirm` answers yes/no prompts; `cancellation_reason` collects the
/// mandatory free-text reason for cancel actions (`None` or an empty string
/// aborts the action).
#[async_trait]
pub trait ConfirmationGate: Send + Sync {
    async fn confirm(&self, prompt: &str) -> bool;

    async fn cancellation_reason(&self, prompt: &str) -> Option<String>;
}

/// Gate that approves every prompt. Cancel actions still abort, since it
/// supplies no reason text.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoConfirm;

#[async_trait]
impl ConfirmationGate for AutoConfirm {
    async fn confirm(&self, _prompt: &str) -> bool {
        true
    }

    async fn cancellation_reason(&self, _prompt: &str) -> Option<String> {
        None
    }
}

/// Gate with pre-seeded answers, for headless automation and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticGate {
    pub approve: bool,
    pub reason: Option<String>,
}

impl StaticGate {
    pub fn approving() -> Self {
        Self {
            approve: true,
            reason: None,
        }
    }

    pub fn declining() -> Self {
        Self {
            approve: false,
            reason: None,
        }
    }

    pub fn with_reason(reason: &str) -> Self {
        Self {
            approve: true,
            reason: Some(reason.to_string()),
        }
    }
}

#[async_trait]
impl ConfirmationGate for StaticGate {
    async fn confirm(&self, _prompt: &str) -> bool {
        self.approve
    }

    async fn cancellation_reason(&self, _prompt: &str) -> Option<String> {
        self.reason.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::mock;

    mock! {
        pub Gate {}

        #[async_trait]
        impl ConfirmationGate for Gate {
            async fn confirm(&self, prompt: &str) -> bool;
            async fn cancellation_reason(&self, prompt: &str) -> Option<String>;
        }
    }

    #[tokio::test]
    async fn auto_confirm_always_approves() {
        assert!(AutoConfirm.confirm("Approve transfer?").await);
        assert!(AutoConfirm.cancellation_reason("Reason?").await.is_none());
    }

    #[tokio::test]
    async fn static_gate_replays_seeded_answers() {
        let gate = StaticGate::with_reason("damaged stock");
        assert!(gate.confirm("anything").await);
        assert_eq!(
            gate.cancellation_reason("Reason?").await.as_deref(),
            Some("damaged stock")
        );
    }

    #[tokio::test]
    async fn mock_gate_wires_through_trait() {
        let mut gate = MockGate::new();
        gate.expect_confirm().times(1).return_const(false);

        assert!(!gate.confirm("Ship transfer?").await);
    }
}
