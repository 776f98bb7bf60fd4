//! Host lifecycle signals driving session teardown and re-establishment.

use std::sync::Arc;

use serde::Deserialize;

use crate::session::SerialSession;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleEvent {
    Start,
    Pause,
    Resume,
    Destroy,
}

/// Applies host lifecycle transitions to the session it coordinates.
pub struct LifecycleCoordinator {
    session: Arc<SerialSession>,
}

impl LifecycleCoordinator {
    pub fn new(session: Arc<SerialSession>) -> Self {
        Self { session }
    }

    pub async fn handle(&self, event: LifecycleEvent) {
        match event {
            LifecycleEvent::Start => self.on_start().await,
            LifecycleEvent::Pause => self.on_pause().await,
            LifecycleEvent::Resume => self.on_resume().await,
            LifecycleEvent::Destroy => self.on_destroy().await,
        }
    }

    /// The transport backend is injected at construction; start confirms the
    /// core is live without opening any device.
    pub async fn on_start(&self) {
        log::info!("Serial session core started");
    }

    /// Stop the pump and close the port; negotiated parameters and the
    /// selected device survive for resume.
    pub async fn on_pause(&self) {
        self.session.suspend().await;
    }

    /// Reopen the suspended session with its retained parameters. Failure is
    /// logged and swallowed.
    pub async fn on_resume(&self) {
        self.session.resume().await;
    }

    /// Final teardown.
    pub async fn on_destroy(&self) {
        self.session.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permission::AutoGrantAuthority;
    use crate::session::{ConnectionParameters, SessionState};
    use crate::transport::mock::MockFactory;
    use crate::SerialCore;

    async fn open_core(factory: Arc<MockFactory>, params: ConnectionParameters) -> SerialCore {
        let core = SerialCore::new(factory, Arc::new(AutoGrantAuthority));
        core.request_permission(None).await.unwrap();
        core.session().open(params).await.unwrap();
        core
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn pause_then_resume_reapplies_negotiated_parameters() {
        let factory = MockFactory::with_device(0x0403, 0x6001, "ttyUSB0");
        let params = ConnectionParameters {
            baud_rate: 9600,
            dtr: true,
            ..ConnectionParameters::default()
        };
        let core = open_core(factory.clone(), params).await;
        let lifecycle = core.lifecycle();

        lifecycle.handle(LifecycleEvent::Pause).await;
        assert_eq!(core.session().state().await, SessionState::Suspended);
        assert!(!core.session().is_open().await);
        assert!(!core.session().pump_running().await);

        lifecycle.handle(LifecycleEvent::Resume).await;
        assert_eq!(core.session().state().await, SessionState::Open);
        assert!(core.session().pump_running().await);

        // reopened with the retained parameters, not the defaults
        let state = factory.last_port();
        let guard = match state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        assert_eq!(guard.settings.unwrap().baud_rate, 9600);
        assert!(guard.dtr);
        drop(guard);

        core.session().close().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn resume_failure_is_swallowed() {
        let factory = MockFactory::with_device(0x0403, 0x6001, "ttyUSB0");
        let core = open_core(factory.clone(), ConnectionParameters::default()).await;
        let lifecycle = core.lifecycle();

        lifecycle.handle(LifecycleEvent::Pause).await;
        factory.set_fail_open(true);
        lifecycle.handle(LifecycleEvent::Resume).await;

        assert_eq!(core.session().state().await, SessionState::Suspended);
        assert!(!core.session().is_open().await);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn resume_stays_suspended_when_line_settings_fail() {
        let factory = MockFactory::with_device(0x0403, 0x6001, "ttyUSB0");
        let core = open_core(factory.clone(), ConnectionParameters::default()).await;
        let lifecycle = core.lifecycle();

        lifecycle.handle(LifecycleEvent::Pause).await;
        factory.set_fail_configure(true);
        lifecycle.handle(LifecycleEvent::Resume).await;

        // same outcome as a failed backend open: still resumable
        assert_eq!(core.session().state().await, SessionState::Suspended);
        assert!(!core.session().is_open().await);
        assert!(!core.session().pump_running().await);

        factory.set_fail_configure(false);
        lifecycle.handle(LifecycleEvent::Resume).await;
        assert_eq!(core.session().state().await, SessionState::Open);
        core.session().close().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn resume_without_a_suspended_session_is_a_no_op() {
        let factory = MockFactory::with_device(0x0403, 0x6001, "ttyUSB0");
        let core = SerialCore::new(factory.clone(), Arc::new(AutoGrantAuthority));
        let lifecycle = core.lifecycle();

        lifecycle.handle(LifecycleEvent::Resume).await;
        assert_eq!(core.session().state().await, SessionState::Unopened);
        assert_eq!(factory.open_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn destroy_is_final() {
        let factory = MockFactory::with_device(0x0403, 0x6001, "ttyUSB0");
        let core = open_core(factory, ConnectionParameters::default()).await;
        let lifecycle = core.lifecycle();

        lifecycle.handle(LifecycleEvent::Destroy).await;
        assert_eq!(core.session().state().await, SessionState::Closed);
        assert!(!core.session().is_open().await);
        assert!(!core.session().pump_running().await);

        // destroy is not resumable
        lifecycle.handle(LifecycleEvent::Resume).await;
        assert_eq!(core.session().state().await, SessionState::Closed);
    }
}
