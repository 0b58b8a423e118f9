use crate::protocol::RadioStatus;
use tokio::sync::RwLock;

/// Read side of the appliance state.
///
/// The control loop is the only writer; HTTP handlers and anything else that
/// renders status take cheap snapshots.
#[derive(Default)]
pub struct StatusBoard {
    state: RwLock<RadioStatus>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_state(&self) -> RadioStatus {
        self.state.read().await.clone()
    }

    /// Replace everything but the revision counter, which is bumped.
    pub async fn publish(&self, status: RadioStatus) -> u64 {
        let mut state = self.state.write().await;
        let rev = state.rev + 1;
        *state = RadioStatus { rev, ..status };
        rev
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::RadioMode;

    #[tokio::test]
    async fn test_publish_bumps_revision() {
        let board = StatusBoard::new();
        assert_eq!(board.get_state().await.rev, 0);

        let rev = board
            .publish(RadioStatus {
                rev: 99,
                mode: RadioMode::Catalog,
                future: Some("RadioA".into()),
                ..Default::default()
            })
            .await;
        assert_eq!(rev, 1);

        let state = board.get_state().await;
        assert_eq!(state.rev, 1);
        assert_eq!(state.mode, RadioMode::Catalog);
        assert_eq!(state.future.as_deref(), Some("RadioA"));

        board.publish(state).await;
        assert_eq!(board.get_state().await.rev, 2);
    }
}
