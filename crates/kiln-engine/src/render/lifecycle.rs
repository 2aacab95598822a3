//! Device-loss detection and recovery.
//!
//! ```text
//! Active ──loss──▶ Lost ──recover──▶ Recovering ──ok──▶ Active (epoch + 1)
//!                   ▲                     │
//!                   └────────failed───────┘
//! ```
//!
//! The manager only sequences the transition. The caller supplies the
//! re-initialization step (re-acquire the device, allocate a fresh uniform
//! buffer, drop every cache) so the same machine drives any backend.

use crate::device::DeviceEpoch;
use crate::error::{DeviceLostError, InitializationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Active,
    Lost,
    Recovering,
}

#[derive(Debug)]
pub struct DeviceLifecycleManager {
    state: DeviceState,
    epoch: DeviceEpoch,
    last_loss: Option<DeviceLostError>,
    losses: u64,
    recoveries: u64,
    failed_recoveries: u64,
}

impl DeviceLifecycleManager {
    pub fn new(epoch: DeviceEpoch) -> Self {
        Self {
            state: DeviceState::Active,
            epoch,
            last_loss: None,
            losses: 0,
            recoveries: 0,
            failed_recoveries: 0,
        }
    }

    #[inline]
    pub fn state(&self) -> DeviceState {
        self.state
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.state == DeviceState::Active
    }

    #[inline]
    pub fn epoch(&self) -> DeviceEpoch {
        self.epoch
    }

    pub fn last_loss(&self) -> Option<&DeviceLostError> {
        self.last_loss.as_ref()
    }

    #[inline]
    pub fn losses(&self) -> u64 {
        self.losses
    }

    #[inline]
    pub fn recoveries(&self) -> u64 {
        self.recoveries
    }

    #[inline]
    pub fn failed_recoveries(&self) -> u64 {
        self.failed_recoveries
    }

    /// Enters `Lost`. A loss reported while already lost is not counted again.
    pub fn mark_lost(&mut self, err: DeviceLostError) {
        if self.state == DeviceState::Lost {
            log::debug!("device loss reported again while lost: {err}");
            return;
        }
        log::warn!("{err}; rendering suspended until recovery");
        self.state = DeviceState::Lost;
        self.losses += 1;
        self.last_loss = Some(err);
    }

    /// Runs one recovery attempt.
    ///
    /// `reinit` receives the epoch the fresh resources must be tagged with.
    /// On success the manager is `Active` at that epoch; on failure it stays
    /// `Lost` at the old epoch so a later call can retry.
    pub fn recover(
        &mut self,
        reinit: impl FnOnce(DeviceEpoch) -> Result<(), InitializationError>,
    ) -> Result<DeviceEpoch, InitializationError> {
        if self.state == DeviceState::Active {
            return Ok(self.epoch);
        }

        self.state = DeviceState::Recovering;
        let next = self.epoch.next();
        log::info!("recovering GPU device (epoch {} -> {next})", self.epoch);

        match reinit(next) {
            Ok(()) => {
                self.epoch = next;
                self.state = DeviceState::Active;
                self.recoveries += 1;
                log::info!("GPU device recovered at epoch {next}");
                Ok(next)
            }
            Err(err) => {
                self.state = DeviceState::Lost;
                self.failed_recoveries += 1;
                log::warn!("GPU device recovery failed: {err}");
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeviceLostReason;

    fn loss() -> DeviceLostError {
        DeviceLostError::new(DeviceLostReason::Simulated, "test")
    }

    #[test]
    fn successful_recovery_advances_epoch() {
        let mut lifecycle = DeviceLifecycleManager::new(DeviceEpoch::INITIAL);
        lifecycle.mark_lost(loss());
        assert_eq!(lifecycle.state(), DeviceState::Lost);

        let mut seen = None;
        let epoch = lifecycle
            .recover(|epoch| {
                seen = Some(epoch);
                Ok(())
            })
            .unwrap();

        assert_eq!(Some(epoch), seen);
        assert_eq!(epoch, DeviceEpoch::INITIAL.next());
        assert!(lifecycle.is_active());
        assert_eq!(lifecycle.recoveries(), 1);
    }

    #[test]
    fn failed_recovery_stays_lost_at_old_epoch() {
        let mut lifecycle = DeviceLifecycleManager::new(DeviceEpoch::INITIAL);
        lifecycle.mark_lost(loss());

        let result = lifecycle.recover(|_| Err(InitializationError::NoAdapter("gone".into())));
        assert!(result.is_err());
        assert_eq!(lifecycle.state(), DeviceState::Lost);
        assert_eq!(lifecycle.epoch(), DeviceEpoch::INITIAL);
        assert_eq!(lifecycle.failed_recoveries(), 1);

        lifecycle.recover(|_| Ok(())).unwrap();
        assert_eq!(lifecycle.epoch(), DeviceEpoch::INITIAL.next());
    }

    #[test]
    fn repeated_loss_signal_counts_once() {
        let mut lifecycle = DeviceLifecycleManager::new(DeviceEpoch::INITIAL);
        lifecycle.mark_lost(loss());
        lifecycle.mark_lost(loss());
        assert_eq!(lifecycle.losses(), 1);
    }

    #[test]
    fn recover_while_active_is_a_no_op() {
        let mut lifecycle = DeviceLifecycleManager::new(DeviceEpoch::INITIAL);
        let epoch = lifecycle
            .recover(|_| panic!("must not reinitialize an active device"))
            .unwrap();
        assert_eq!(epoch, DeviceEpoch::INITIAL);
    }
}
